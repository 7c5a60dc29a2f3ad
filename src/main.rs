use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use bugreel::console::SelfLogFilter;
use bugreel::instrumentation::{InstrumentationError, InstrumentationEvent, Observed};
use bugreel::network::{BodyFetcher, NetworkCorrelator, RequestId};
use bugreel::session::{FileStateStore, PersistedSession, StateStore};
use bugreel::util::{self, Clock, SystemClock};
use bugreel::{Config, SessionLogs};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "bugreel", version, about = "Bug-report capture toolkit")]
struct Cli {
    /// Data directory (defaults to ~/.bugreel)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fold a recorded instrumentation event stream (one JSON event per line)
    /// into console and network logs
    Correlate {
        events: PathBuf,
        /// JSON object mapping request ids to response bodies
        #[arg(long)]
        bodies: Option<PathBuf>,
    },
    /// Print the persisted session record
    State,
    /// Forget the persisted session record
    ResetState,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    util::init_data_dir(cli.data_dir.clone());

    // Initialize logging to file (~/.bugreel/logs/bugreel.log)
    fs::create_dir_all(util::logs_dir())?;

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(util::log_file_path())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .init();

    let config = Config::load();

    match cli.command {
        Command::Correlate { events, bodies } => {
            let logs = correlate(&config, &events, bodies.as_deref()).await?;
            println!("{}", serde_json::to_string_pretty(&logs)?);
        }
        Command::State => {
            let store = FileStateStore::at_default_location();
            let record = store.load().await?.unwrap_or_default();
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Command::ResetState => {
            let store = FileStateStore::at_default_location();
            store.clear().await?;
            println!("{}", serde_json::to_string_pretty(&PersistedSession::default())?);
        }
    }
    Ok(())
}

/// Response bodies captured alongside an event stream, keyed by request id
struct RecordedBodies(HashMap<String, String>);

#[async_trait]
impl BodyFetcher for RecordedBodies {
    async fn fetch_body(&self, request_id: &RequestId) -> Result<String, InstrumentationError> {
        self.0
            .get(request_id.as_str())
            .cloned()
            .ok_or_else(|| InstrumentationError::BodyFetch(format!("no body recorded for {request_id}")))
    }
}

async fn correlate(config: &Config, events: &Path, bodies: Option<&Path>) -> Result<SessionLogs> {
    let raw = fs::read_to_string(events)
        .with_context(|| format!("Failed to read {}", events.display()))?;
    let bodies: HashMap<String, String> = match bodies {
        Some(path) => {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Invalid bodies file {}", path.display()))?
        }
        None => HashMap::new(),
    };
    let bodies = RecordedBodies(bodies);

    let filter = SelfLogFilter::new(config.self_log_prefix.clone());
    let mut correlator = NetworkCorrelator::new(&config.network);
    let mut console_logs = Vec::new();

    for (index, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let event: InstrumentationEvent = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(line = index + 1, error = %err, "skipping unrecognized event");
                continue;
            }
        };
        match event.into_observed(SystemClock.now_ms()) {
            Observed::Console(entry) => {
                if filter.accepts(&entry.text) {
                    console_logs.push(entry);
                }
            }
            Observed::Network(network_event) => {
                correlator.ingest(network_event, &bodies).await;
            }
        }
    }

    Ok(SessionLogs {
        console_logs,
        network_logs: correlator.drain(),
        actions: Vec::new(),
    })
}
