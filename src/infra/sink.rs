//! Where completed quotes go after pricing.
//!
//! The engine only needs `QuoteSink::store`; transactions and retention are
//! the sink's business.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use directories::ProjectDirs;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Error as SerdeError;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use crate::domain::QuoteResult;

const APP_QUALIFIER: &str = "com";
const APP_ORG: &str = "FreightServices";
const APP_NAME: &str = "FreightQuote";

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("storage directory unavailable")]
    StorageUnavailable,
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serde(#[from] SerdeError),
    #[error("failed to format timestamp: {0}")]
    Timestamp(#[from] time::error::Format),
}

/// Receipt for a stored quote.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredQuote {
    pub id: Uuid,
    /// RFC 3339, UTC.
    pub stored_at: String,
}

impl StoredQuote {
    fn issue() -> Result<Self, SinkError> {
        Ok(Self {
            id: Uuid::new_v4(),
            stored_at: OffsetDateTime::now_utc().format(&Rfc3339)?,
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct QuoteRecord {
    #[serde(flatten)]
    receipt: StoredQuote,
    quote: QuoteResult,
}

#[async_trait]
pub trait QuoteSink: Send + Sync {
    async fn store(&self, quote: &QuoteResult) -> Result<StoredQuote, SinkError>;
}

/// Keeps quotes in memory; used by tests and dry runs.
#[derive(Debug, Default)]
pub struct InMemoryQuoteSink {
    records: Mutex<Vec<(StoredQuote, QuoteResult)>>,
}

impl InMemoryQuoteSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    pub fn get(&self, id: Uuid) -> Option<QuoteResult> {
        self.records
            .lock()
            .iter()
            .find(|(receipt, _)| receipt.id == id)
            .map(|(_, quote)| quote.clone())
    }
}

#[async_trait]
impl QuoteSink for InMemoryQuoteSink {
    async fn store(&self, quote: &QuoteResult) -> Result<StoredQuote, SinkError> {
        let receipt = StoredQuote::issue()?;
        self.records.lock().push((receipt.clone(), quote.clone()));
        Ok(receipt)
    }
}

/// Writes one pretty-printed JSON file per quote, named by its id.
#[derive(Clone, Debug)]
pub struct JsonFileSink {
    dir: PathBuf,
}

impl JsonFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `quotes/` under the platform data directory.
    pub fn in_data_dir() -> Result<Self, SinkError> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORG, APP_NAME)
            .map(|dirs| Self::new(dirs.data_dir().join("quotes")))
            .ok_or(SinkError::StorageUnavailable)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    pub async fn load(&self, id: Uuid) -> Result<QuoteResult, SinkError> {
        let raw = tokio::fs::read_to_string(self.path_for(id)).await?;
        let record: QuoteRecord = serde_json::from_str(&raw)?;
        Ok(record.quote)
    }
}

#[async_trait]
impl QuoteSink for JsonFileSink {
    async fn store(&self, quote: &QuoteResult) -> Result<StoredQuote, SinkError> {
        let receipt = StoredQuote::issue()?;
        let record = QuoteRecord {
            receipt: receipt.clone(),
            quote: quote.clone(),
        };
        let json = serde_json::to_string_pretty(&record)?;

        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(receipt.id);
        tokio::fs::write(&path, json).await?;
        debug!(id = %receipt.id, path = %path.display(), "stored quote");
        Ok(receipt)
    }
}
