use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use vitalsync::data::units::{display, display_fahrenheit, display_whole, MISSING};
use vitalsync::data::HistoryQuery;
use vitalsync::document::{DocumentFiller, PdfFormFiller};
use vitalsync::recorder::Recorder;
use vitalsync::server::{self, AppState};
use vitalsync::source::LiveReader;
use vitalsync::summary::{ChatSummarizer, SummaryPanel, SummaryRequest, Summarizer};
use vitalsync::{Settings, VitalsClient};
use vitalsync_store::rtdb::{AnonymousAuth, RtdbClient};

#[derive(Parser, Debug)]
#[command(name = "vitalsync")]
#[command(about = "Patient vitals reader, history recorder and backend API")]
struct Args {
    /// Configuration file (default: vitalsync.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the backend HTTP API
    Serve {
        /// Also run the history recorder in this process
        #[arg(long)]
        record: bool,
    },
    /// Subscribe to the sensor feeds and record changes until interrupted
    Record,
    /// Print the latest vitals
    Latest {
        /// Subject to read for
        #[arg(short, long, default_value = "default")]
        subject: String,

        /// Print a readable table instead of JSON
        #[arg(long)]
        table: bool,
    },
    /// Print recent history points
    History {
        /// Number of points (default: history.limit)
        #[arg(short, long)]
        limit: Option<usize>,

        #[arg(long, value_enum, default_value_t = Order::Desc)]
        order: Order,
    },
    /// Summarize the current transcript and vitals
    Summarize {
        #[arg(short, long, default_value = "default")]
        subject: String,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Order {
    Asc,
    Desc,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let settings = Settings::load(args.config.as_deref())?;

    match args.command {
        Command::Serve { record } => serve(&settings, record).await,
        Command::Record => record(&settings).await,
        Command::Latest { subject, table } => latest(&settings, &subject, table).await,
        Command::History { limit, order } => history(&settings, limit, order).await,
        Command::Summarize { subject } => summarize(&settings, &subject).await,
    }
}

/// Build the shared store client from settings.
fn connect(settings: &Settings) -> Result<Arc<VitalsClient>> {
    let timeout = settings.store_timeout()?;

    let store = RtdbClient::builder()
        .url(settings.store_url()?)
        .timeout(timeout)
        .build()
        .context("Failed to build store client")?;

    let mut auth = AnonymousAuth::builder().timeout(timeout);
    if let Some(key) = &settings.store.api_key {
        auth = auth.api_key(key);
    }
    if let Some(url) = &settings.store.auth_url {
        auth = auth.auth_url(url);
    }
    if let Some(url) = &settings.store.token_url {
        auth = auth.token_url(url);
    }
    let auth = auth.build().context("Failed to build identity provider")?;

    Ok(Arc::new(VitalsClient::new(Arc::new(store), Arc::new(auth))))
}

fn summarizer(settings: &Settings) -> Result<Option<Arc<dyn Summarizer>>> {
    let Some(key) = &settings.summary.api_key else {
        return Ok(None);
    };

    let summarizer = ChatSummarizer::builder()
        .endpoint(&settings.summary.endpoint)
        .api_key(key)
        .model(&settings.summary.model)
        .temperature(settings.summary.temperature)
        .max_tokens(settings.summary.max_tokens)
        .build()?;
    Ok(Some(Arc::new(summarizer)))
}

fn documents(settings: &Settings) -> Option<Arc<dyn DocumentFiller>> {
    let path = settings.server.template.as_ref()?;
    if !path.exists() {
        info!(path = %path.display(), "No prescription template, PDF generation disabled");
        return None;
    }

    match PdfFormFiller::from_path(path) {
        Ok(filler) => Some(Arc::new(filler)),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Unusable prescription template");
            None
        }
    }
}

async fn serve(settings: &Settings, record: bool) -> Result<()> {
    let client = connect(settings)?;
    let paths = settings.paths.clone();

    let summarizer = summarizer(settings)?;
    if summarizer.is_none() {
        warn!("OPENAI_API_KEY not set, summaries will fail");
    }

    let state = AppState {
        reader: LiveReader::new(Arc::clone(&client), paths.clone()),
        history: HistoryQuery::new(Arc::clone(&client), paths.history.clone()),
        history_limit: settings.history.limit,
        summarizer,
        documents: documents(settings),
        allow_origin: settings.server.allow_origin.clone(),
    };

    let mut recorder = if record {
        Some(Recorder::start(client, paths, settings.recorder_interval()?))
    } else {
        None
    };

    let result = tokio::select! {
        result = server::serve(&settings.server.listen, state) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            Ok(())
        }
    };

    if let Some(recorder) = recorder.as_mut() {
        recorder.stop();
        recorder.wait().await;
    }
    result
}

async fn record(settings: &Settings) -> Result<()> {
    let client = connect(settings)?;
    let interval = settings.recorder_interval()?;
    let mut recorder = Recorder::start(client, settings.paths.clone(), interval);

    tokio::signal::ctrl_c().await?;
    info!("Stopping recorder");
    recorder.stop();
    recorder.wait().await;
    Ok(())
}

async fn latest(settings: &Settings, subject: &str, table: bool) -> Result<()> {
    let client = connect(settings)?;
    let snapshot = LiveReader::new(client, settings.paths.clone())
        .fetch_latest(subject)
        .await;

    if !table {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    println!("Heart rate   {}", display_whole(snapshot.heart_rate, "bpm"));
    println!("SpO2         {}", display(snapshot.spo2, "%"));
    println!(
        "Skin temp    {} ({})",
        display(snapshot.skin_temperature_c, "°C"),
        display_fahrenheit(snapshot.skin_temperature_c)
    );
    println!("Transcript   {}", snapshot.transcript.as_deref().unwrap_or(MISSING));
    Ok(())
}

async fn history(settings: &Settings, limit: Option<usize>, order: Order) -> Result<()> {
    let client = connect(settings)?;
    let window = HistoryQuery::new(client, settings.paths.history.clone())
        .recent(limit.unwrap_or(settings.history.limit))
        .await;

    if window.is_empty() {
        println!("No history recorded");
        return Ok(());
    }

    let points: Vec<_> = match order {
        Order::Asc => window.ascending().iter().collect(),
        Order::Desc => window.descending().collect(),
    };

    println!("{:<15} {:>8} {:>7} {:>9}  TRANSCRIPT", "TS", "HR", "SPO2", "TEMP");
    for point in points {
        println!(
            "{:<15} {:>8} {:>7} {:>9}  {}",
            point.recorded_at,
            display_whole(point.heart_rate, "bpm"),
            display(point.spo2, "%"),
            display_fahrenheit(point.temperature_c),
            point.transcript.as_deref().unwrap_or(MISSING)
        );
    }
    Ok(())
}

async fn summarize(settings: &Settings, subject: &str) -> Result<()> {
    let summarizer = summarizer(settings)?.context("OPENAI_API_KEY not set")?;
    let client = connect(settings)?;
    let snapshot = LiveReader::new(client, settings.paths.clone())
        .fetch_latest(subject)
        .await;

    let request = SummaryRequest::from_snapshot(&snapshot);
    let mut panel = SummaryPanel::new();
    if !panel.can_generate(request.transcript()) {
        anyhow::bail!("No transcript to summarize");
    }

    panel.generate(summarizer.as_ref(), &request).await;
    match (panel.summary(), panel.error()) {
        (Some(summary), _) => {
            println!("{}", summary);
            Ok(())
        }
        (None, Some(error)) => anyhow::bail!("{}", error),
        (None, None) => anyhow::bail!("AI summary failed"),
    }
}
