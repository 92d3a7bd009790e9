//! Road-distance lookups between ZIP centroids.
//!
//! - `DistanceProvider` is the seam the resolver depends on.
//! - `MapsDistanceClient` talks to a distance-matrix style HTTP API with a
//!   per-attempt timeout, bounded retries with exponential backoff, and an
//!   in-memory TTL cache of successful lookups.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, SystemTime},
};

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::Zip;
use crate::util::config::DistanceConfig;
use crate::util::version::user_agent;

const METERS_PER_MILE: f64 = 1609.344;

#[derive(Debug, Error)]
pub enum DistanceError {
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("http request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("distance service returned HTTP {0}")]
    Status(StatusCode),
    #[error("timed out after {attempts} attempt(s)")]
    Timeout { attempts: u32 },
    #[error("no route between ZIPs ({0})")]
    NoRoute(String),
    #[error("api error: {0}")]
    Api(String),
    #[error("distance service API key is not configured")]
    MissingApiKey,
    #[error("no answer within {0:?}")]
    Deadline(Duration),
}

impl DistanceError {
    /// Whether another attempt could plausibly succeed.
    fn is_transient(&self) -> bool {
        match self {
            Self::Http(error) => error.is_timeout() || error.is_connect(),
            Self::Status(status) => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            Self::Timeout { .. } => true,
            Self::Api(status) => {
                status.starts_with("OVER_QUERY_LIMIT") || status.starts_with("UNKNOWN_ERROR")
            }
            Self::InvalidUrl(_) | Self::NoRoute(_) | Self::MissingApiKey | Self::Deadline(_) => {
                false
            }
        }
    }
}

/// Source of road miles between two ZIP codes.
#[async_trait]
pub trait DistanceProvider: Send + Sync {
    async fn distance_miles(&self, origin: &Zip, destination: &Zip) -> Result<f64, DistanceError>;
}

#[derive(Clone)]
pub struct MapsDistanceClient {
    http: Client,
    base_url: Url,
    api_key: Option<String>,
    max_retries: u32,
    backoff: Duration,
    cache: Arc<Mutex<HashMap<(Zip, Zip), Cached>>>,
    ttl: Duration,
}

impl MapsDistanceClient {
    pub fn new(config: &DistanceConfig) -> Result<Self, DistanceError> {
        let base_url = Url::parse(&config.base_url)?;
        let http = Client::builder()
            .user_agent(user_agent())
            .timeout(config.timeout())
            .build()?;
        Ok(Self {
            http,
            base_url,
            api_key: config.api_key.clone().filter(|key| !key.trim().is_empty()),
            max_retries: config.max_retries,
            backoff: config.backoff(),
            cache: Arc::new(Mutex::new(HashMap::new())),
            ttl: config.cache_ttl(),
        })
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    async fn cached(&self, key: &(Zip, Zip)) -> Option<f64> {
        let cache = self.cache.lock().await;
        cache.get(key).and_then(|entry| entry.if_fresh(self.ttl))
    }

    /// Caches `miles` and drops every entry past its TTL.
    async fn store(&self, key: (Zip, Zip), miles: f64) {
        let mut cache = self.cache.lock().await;
        cache.retain(|_, entry| entry.if_fresh(self.ttl).is_some());
        cache.insert(key, Cached::new(miles, SystemTime::now()));
    }

    async fn fetch_with_retries(&self, origin: &Zip, destination: &Zip) -> Result<f64, DistanceError> {
        let api_key = self.api_key.as_deref().ok_or(DistanceError::MissingApiKey)?;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.fetch_once(origin, destination, api_key).await {
                Ok(miles) => return Ok(miles),
                Err(error) if error.is_transient() && attempt <= self.max_retries => {
                    let delay = self.backoff * 2u32.saturating_pow(attempt - 1);
                    warn!(
                        %origin, %destination, attempt, ?delay,
                        "distance lookup failed: {error}; retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(DistanceError::Http(error)) if error.is_timeout() => {
                    return Err(DistanceError::Timeout { attempts: attempt });
                }
                Err(error) => return Err(error),
            }
        }
    }

    async fn fetch_once(
        &self,
        origin: &Zip,
        destination: &Zip,
        api_key: &str,
    ) -> Result<f64, DistanceError> {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("origins", &format!("{origin},USA"))
            .append_pair("destinations", &format!("{destination},USA"))
            .append_pair("units", "imperial")
            .append_pair("key", api_key);

        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DistanceError::Status(status));
        }

        let matrix: MatrixDto = response.json().await?;
        matrix.into_miles()
    }
}

#[async_trait]
impl DistanceProvider for MapsDistanceClient {
    async fn distance_miles(&self, origin: &Zip, destination: &Zip) -> Result<f64, DistanceError> {
        let key = (origin.clone(), destination.clone());
        if let Some(miles) = self.cached(&key).await {
            debug!(%origin, %destination, miles, "serving cached distance");
            return Ok(miles);
        }

        let miles = self.fetch_with_retries(origin, destination).await?;
        debug!(%origin, %destination, miles, "distance service lookup");
        self.store(key, miles).await;
        Ok(miles)
    }
}

struct Cached {
    miles: f64,
    fetched_at: SystemTime,
}

impl Cached {
    fn new(miles: f64, fetched_at: SystemTime) -> Self {
        Self { miles, fetched_at }
    }

    fn if_fresh(&self, ttl: Duration) -> Option<f64> {
        self.fetched_at
            .elapsed()
            .map(|elapsed| elapsed <= ttl)
            .unwrap_or(false)
            .then_some(self.miles)
    }
}

#[derive(Debug, Deserialize)]
struct MatrixDto {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    rows: Vec<RowDto>,
}

#[derive(Debug, Deserialize)]
struct RowDto {
    #[serde(default)]
    elements: Vec<ElementDto>,
}

#[derive(Debug, Deserialize)]
struct ElementDto {
    status: String,
    #[serde(default)]
    distance: Option<ValueDto>,
}

#[derive(Debug, Deserialize)]
struct ValueDto {
    /// Meters.
    value: f64,
}

impl MatrixDto {
    fn into_miles(self) -> Result<f64, DistanceError> {
        if !self.status.eq_ignore_ascii_case("ok") {
            return Err(DistanceError::Api(match self.error_message {
                Some(message) => format!("{}: {message}", self.status),
                None => self.status,
            }));
        }

        let element = self
            .rows
            .into_iter()
            .next()
            .and_then(|row| row.elements.into_iter().next())
            .ok_or_else(|| DistanceError::Api("response missing matrix element".into()))?;

        if !element.status.eq_ignore_ascii_case("ok") {
            return Err(DistanceError::NoRoute(element.status));
        }

        element
            .distance
            .map(|distance| distance.value / METERS_PER_MILE)
            .ok_or_else(|| DistanceError::Api("element missing distance".into()))
    }
}
