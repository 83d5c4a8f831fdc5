//! lamco-remote-pad - Remote Input Engine
//!
//! Replays a JSON-lines script of pointer events through the engine and
//! prints every emitted command and haptic request as a JSON line.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::io::{BufReader, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use lamco_remote_pad::config::Config;
use lamco_remote_pad::engine::transport::{ChannelTransport, RecordingTransport};
use lamco_remote_pad::replay::{self, TimedOutput};
use lamco_remote_pad::utils::{format_user_error, MetricsCollector};

/// Statistics output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StatsFormat {
    /// One metric per line
    Text,
    /// Pretty JSON snapshot
    Json,
}

/// Command-line arguments for lamco-remote-pad
#[derive(Parser, Debug)]
#[command(name = "lamco-remote-pad")]
#[command(version, about = "Remote-control input surface engine", long_about = None)]
pub struct Args {
    /// Event script (JSON lines); reads stdin when absent or "-"
    pub script: Option<PathBuf>,

    /// Configuration file path (built-in layout when absent)
    #[arg(short, long, env = "LAMCO_PAD_CONFIG")]
    pub config: Option<String>,

    /// Initial ambient mode
    #[arg(short, long)]
    pub mode: Option<String>,

    /// Replay with real sleeps through the tokio driver
    #[arg(long)]
    pub realtime: bool,

    /// Time to keep firing timers after the last event (ms)
    #[arg(long, default_value = "1000")]
    pub settle_ms: u64,

    /// Print engine statistics to stderr when done
    #[arg(long, value_enum)]
    pub stats: Option<StatsFormat>,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    pub dump_config: bool,

    /// Verbose logging (can be specified multiple times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log format (json|pretty|compact)
    #[arg(long, default_value = "compact")]
    pub log_format: String,

    /// Also write daily rolling logs to this directory
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", format_user_error(&e));
            return Err(e);
        }
    };

    if args.dump_config {
        print!(
            "{}",
            toml::to_string_pretty(&config).context("Failed to serialize config")?
        );
        return Ok(());
    }

    let _guard = init_logging(&args, &config)?;

    info!("════════════════════════════════════════════════════════");
    info!("  lamco-remote-pad v{}", env!("CARGO_PKG_VERSION"));
    info!("  Built: {} {}", env!("BUILD_DATE"), env!("BUILD_TIME"));
    info!("  Commit: {}", env!("GIT_HASH"));
    info!("════════════════════════════════════════════════════════");
    debug!("Config: {:?}", config);

    if let Err(e) = run(&args, &config).await {
        eprintln!("{}", format_user_error(&e));
        return Err(e);
    }
    Ok(())
}

fn load_config(args: &Args) -> Result<Config> {
    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default_config()?,
    };
    Ok(config.with_overrides(args.mode.clone(), args.log_dir.clone()))
}

async fn run(args: &Args, config: &Config) -> Result<()> {
    let events = match &args.script {
        Some(path) if path.as_os_str() != "-" => {
            let file = std::fs::File::open(path)
                .with_context(|| format!("Failed to open script {}", path.display()))?;
            replay::parse_script(BufReader::new(file))?
        }
        _ => replay::parse_script(std::io::stdin().lock())?,
    };
    info!("Loaded {} events", events.len());

    let metrics = Arc::new(MetricsCollector::new());
    if args.realtime {
        run_realtime(config, events, args.settle_ms, Arc::clone(&metrics)).await?;
    } else {
        let mut pad = config
            .build_pad(RecordingTransport::new())?
            .with_metrics(Arc::clone(&metrics));
        let report = replay::replay(&mut pad, events, args.settle_ms);

        let mut stdout = std::io::stdout().lock();
        for output in &report.outputs {
            writeln!(stdout, "{}", serde_json::to_string(output)?)?;
        }
        info!(
            "Replay finished in modifier state {}, trackpad mode {:?}",
            pad.modifier_label(),
            pad.trackpad_mode()
        );
    }

    if config.logging.metrics {
        for line in metrics.export_text().lines() {
            debug!("metric {}", line);
        }
    }

    match args.stats {
        Some(StatsFormat::Text) => eprint!("{}", metrics.export_text()),
        Some(StatsFormat::Json) => eprintln!(
            "{}",
            metrics
                .export_json()
                .context("Failed to encode statistics")?
        ),
        None => {}
    }
    Ok(())
}

async fn run_realtime(
    config: &Config,
    events: Vec<lamco_remote_pad::engine::PadEvent>,
    settle_ms: u64,
    metrics: Arc<MetricsCollector>,
) -> Result<()> {
    let (transport, mut rx) = ChannelTransport::channel();
    let pad = config.build_pad(transport)?.with_metrics(metrics);
    let origin = Instant::now();

    let printer = tokio::spawn(async move {
        while let Some(output) = rx.recv().await {
            let line = TimedOutput {
                at_ms: origin.elapsed().as_millis() as u64,
                output,
            };
            match serde_json::to_string(&line) {
                Ok(json) => println!("{}", json),
                Err(e) => tracing::warn!("Failed to encode output: {}", e),
            }
        }
    });

    let pad = replay::replay_realtime(pad, events, settle_ms).await?;
    info!(
        "Replay finished in modifier state {}, trackpad mode {:?}",
        pad.modifier_label(),
        pad.trackpad_mode()
    );
    // Dropping the pad closes the output channel
    drop(pad);
    printer.await.context("Output task failed")?;
    Ok(())
}

fn init_logging(args: &Args, config: &Config) -> Result<Option<WorkerGuard>> {
    let log_level = match args.verbose {
        0 => config.logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("lamco_remote_pad={},warn", log_level))
    });

    // stdout carries command output, so logs go to stderr
    let stderr_layer = match args.log_format.as_str() {
        "json" => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed(),
        "pretty" => tracing_subscriber::fmt::layer()
            .pretty()
            .with_writer(std::io::stderr)
            .boxed(),
        _ => tracing_subscriber::fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .boxed(),
    };

    let (file_layer, guard) = match &config.logging.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "lamco-remote-pad.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    if let Some(dir) = &config.logging.log_dir {
        info!("Logging to directory: {}", dir.display());
    }
    Ok(guard)
}
