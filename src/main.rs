use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};

use freight_quote::domain::Mode;
use freight_quote::engine::{
    ErrorPayload, QuoteEngine, QuotePayload, RateRepository, Readiness, SubmitError,
};
use freight_quote::infra::distance::MapsDistanceClient;
use freight_quote::infra::loader;
use freight_quote::infra::sink::JsonFileSink;
use freight_quote::util::config::EngineConfig;
use freight_quote::util::{logging, version};

#[derive(Parser)]
#[command(name = "freight-quote")]
#[command(about = "Price Hotshot and Air freight quotes from local rate tables")]
#[command(version)]
struct Cli {
    /// Engine config file (JSON). Defaults to the platform config directory.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the rate CSV files; overrides the config file.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Price a JSON quote payload and print the quote as JSON
    Quote {
        /// Payload file; reads stdin when omitted
        #[arg(long)]
        payload: Option<PathBuf>,

        /// Also store the quote as JSON in this directory
        #[arg(long, conflicts_with = "store_default")]
        store: Option<PathBuf>,

        /// Store the quote under the platform data directory
        #[arg(long)]
        store_default: bool,
    },

    /// Load the rate tables and report readiness
    Check,

    /// List the accessorial codes offered for a mode
    Accessorials {
        #[arg(long)]
        mode: Mode,
    },
}

#[derive(Serialize)]
struct CheckReport {
    readiness: Readiness,
    #[serde(skip_serializing_if = "Option::is_none")]
    tables: Option<freight_quote::engine::SnapshotSummary>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    logging::init();
    let cli = Cli::parse();

    match version::current_version() {
        Ok(current) => info!(app = version::APP_NAME, %current, "starting"),
        Err(error) => warn!("could not determine version: {error}"),
    }

    let mut config = EngineConfig::resolve(cli.config.as_deref())?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = Some(dir);
    }
    let data_dir = config
        .data_dir
        .clone()
        .context("no rate data directory; pass --data-dir or set data_dir in the config")?;

    let repository = Arc::new(RateRepository::new());
    let version = loader::reload(&repository, &data_dir)
        .with_context(|| format!("loading rate tables from {}", data_dir.display()))?;
    info!(version, "rate tables ready to serve");

    match cli.command {
        Command::Check => {
            let report = CheckReport {
                readiness: repository.readiness(),
                tables: repository.snapshot().map(|snapshot| snapshot.summary()),
            };
            print_json(&report)?;
            Ok(if report.readiness.is_ready() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Accessorials { mode } => {
            let snapshot = repository.snapshot().context("no rate snapshot loaded")?;
            print_json(&snapshot.accessorials().options(mode))?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Quote {
            payload,
            store,
            store_default,
        } => {
            let sink = match (store, store_default) {
                (Some(dir), _) => Some(JsonFileSink::new(dir)),
                (None, true) => Some(JsonFileSink::in_data_dir()?),
                (None, false) => None,
            };
            let distance = MapsDistanceClient::new(&config.distance)
                .context("building distance client")?;
            let engine = QuoteEngine::new(repository, Arc::new(distance), &config);
            run_quote(&engine, payload.as_deref(), sink.as_ref()).await
        }
    }
}

async fn run_quote(
    engine: &QuoteEngine,
    payload: Option<&Path>,
    sink: Option<&JsonFileSink>,
) -> Result<ExitCode> {
    let raw = read_payload(payload).await?;
    let request = match QuotePayload::from_json(&raw).and_then(QuotePayload::into_request) {
        Ok(request) => request,
        Err(error) => {
            print_json(&ErrorPayload::from(&error))?;
            return Ok(ExitCode::FAILURE);
        }
    };

    let outcome = match sink {
        Some(sink) => engine
            .quote_and_store(&request, sink)
            .await
            .map(|(quote, stored)| {
                info!(id = %stored.id, path = %sink.path_for(stored.id).display(), "quote saved");
                quote
            }),
        None => engine.quote(&request).await.map_err(SubmitError::from),
    };

    match outcome {
        Ok(quote) => {
            print_json(&quote)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(SubmitError::Quote(error)) => {
            print_json(&ErrorPayload::from(&error))?;
            Ok(ExitCode::FAILURE)
        }
        Err(SubmitError::Sink(error)) => Err(error).context("storing quote"),
    }
}

async fn read_payload(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading payload {}", path.display())),
        None => {
            let mut raw = String::new();
            tokio::io::stdin()
                .read_to_string(&mut raw)
                .await
                .context("reading payload from stdin")?;
            Ok(raw)
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
