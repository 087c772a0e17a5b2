use std::{path::PathBuf, process::ExitCode, sync::Arc};

use clap::Parser;
use etherpad_toolkit::{
    config::{LogFormat, LogLevel, ToolkitConfig},
    etherpad::{EtherpadClient, PadService},
    observability,
    purge::{PurgeRun, Purger},
};
use tokio_util::sync::CancellationToken;

/// CLI arguments for the Etherpad toolkit
#[derive(Parser, Debug)]
#[command(version, about = "Maintenance toolkit for Etherpad", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to a TOML config file (all settings have defaults)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Base URL of the Etherpad instance
    #[arg(long, global = true, env = "ETHERPAD_URL")]
    etherpad_url: Option<String>,

    /// Etherpad API key
    #[arg(long, global = true, env = "ETHERPAD_APIKEY", hide_env_values = true)]
    etherpad_apikey: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "LOG_LEVEL")]
    log_level: Option<LogLevel>,

    /// Log format (text, compact, pretty, json)
    #[arg(long, global = true, env = "LOG_FORMAT")]
    log_format: Option<LogFormat>,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Delete pads whose retention window has expired
    Purge {
        /// Retention windows as `class:duration` pairs, e.g. "default:720h,temp:24h"
        #[arg(long)]
        expiration: Option<String>,
        /// Number of workers per pad class
        #[arg(long)]
        concurrency: Option<usize>,
        /// Only log the pads that would be deleted
        #[arg(long)]
        dry_run: bool,
        /// Write run metrics to this file in Prometheus text format
        #[arg(long)]
        metrics_file: Option<PathBuf>,
    },
    /// Delete a single pad
    DeletePad {
        /// Pad to delete
        pad: String,
    },
    /// Move a pad to a new name
    MovePad {
        source: String,
        destination: String,
        /// Overwrite the destination if it exists
        #[arg(long)]
        force: bool,
    },
    /// Copy a pad with its history
    CopyPad {
        source: String,
        destination: String,
        /// Overwrite the destination if it exists
        #[arg(long)]
        force: bool,
    },
    /// Serve pad counts per suffix as Prometheus metrics
    #[cfg(feature = "prometheus")]
    Metrics {
        /// Address to listen on
        #[arg(long)]
        listen_addr: Option<String>,
        /// Comma-separated suffixes to count pads by
        #[arg(long, value_delimiter = ',')]
        suffixes: Option<Vec<String>>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let mut config = load_config(&args);

    let ok = match args.command {
        Command::Purge {
            expiration,
            concurrency,
            dry_run,
            metrics_file,
        } => {
            if let Some(expiration) = expiration {
                config.purge.expiration = expiration;
            }
            if let Some(concurrency) = concurrency {
                config.purge.concurrency = concurrency;
            }
            config.purge.dry_run |= dry_run;
            if metrics_file.is_some() {
                config.observability.metrics.textfile = metrics_file;
            }
            if let Err(e) = config.purge.validate() {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
            let client = init(&config);
            run_purge(&config, client).await
        }
        Command::DeletePad { pad } => {
            let client = init(&config);
            run_delete_pad(&client, &pad).await
        }
        Command::MovePad {
            source,
            destination,
            force,
        } => {
            let client = init(&config);
            run_move_pad(&client, &source, &destination, force).await
        }
        Command::CopyPad {
            source,
            destination,
            force,
        } => {
            let client = init(&config);
            run_copy_pad(&client, &source, &destination, force).await
        }
        #[cfg(feature = "prometheus")]
        Command::Metrics {
            listen_addr,
            suffixes,
        } => {
            if let Some(listen_addr) = listen_addr {
                config.observability.metrics.listen_addr = listen_addr;
            }
            if let Some(suffixes) = suffixes {
                config.observability.metrics.suffixes = suffixes;
            }
            let client = init(&config);
            run_metrics(&config, client).await
        }
    };

    if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}

/// Load the config file, if any, and apply the global flag overrides.
fn load_config(args: &Args) -> ToolkitConfig {
    let mut config = match &args.config {
        Some(path) => match ToolkitConfig::from_file(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to load config from {}: {}", path, e);
                std::process::exit(1);
            }
        },
        None => ToolkitConfig::default(),
    };

    if let Some(url) = &args.etherpad_url {
        config.etherpad.url = url.clone();
    }
    if let Some(key) = &args.etherpad_apikey {
        config.etherpad.api_key = key.clone();
    }
    if let Some(level) = args.log_level {
        config.observability.logging.level = level;
    }
    if let Some(format) = args.log_format {
        config.observability.logging.format = format;
    }

    config
}

/// Validate the connection settings, start logging and build the API client.
fn init(config: &ToolkitConfig) -> EtherpadClient {
    if let Err(e) = config.etherpad.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = observability::init_tracing(&config.observability.logging) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    match EtherpadClient::from_config(&config.etherpad) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!(error = %e, "Failed to create Etherpad client");
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Run a retention purge until done or interrupted.
async fn run_purge(config: &ToolkitConfig, client: EtherpadClient) -> bool {
    let policy = match config.purge.policy() {
        Ok(policy) => policy,
        Err(e) => {
            eprintln!("Error: purge.expiration: {}", e);
            return false;
        }
    };

    let metrics = &config.observability.metrics;
    if metrics.textfile.is_some() && !metrics.enabled {
        tracing::warn!("Metrics are disabled, not writing the metrics textfile");
    }
    let textfile = metrics.textfile.as_deref().filter(|_| metrics.enabled);
    if textfile.is_some()
        && let Err(e) = observability::metrics::init_metrics(metrics)
    {
        tracing::error!(error = %e, "Failed to initialize metrics");
        return false;
    }

    tracing::info!(
        etherpad_url = %client.base_url(),
        expiration = %config.purge.expiration,
        concurrency = config.purge.concurrency,
        dry_run = config.purge.dry_run,
        "Starting purge"
    );

    let run = PurgeRun::new(policy, config.purge.concurrency, config.purge.dry_run);
    let cancel = CancellationToken::new();
    let purger = Purger::new(Arc::new(client), run).with_cancellation(cancel.clone());

    let signal = tokio::spawn(cancel_on_interrupt(cancel.clone()));

    let result = purger.purge_all().await;
    signal.abort();

    match result {
        Ok(report) => {
            if cancel.is_cancelled() {
                tracing::warn!(skipped = report.skipped(), "Purge interrupted");
            }
            match textfile.map(observability::metrics::write_textfile) {
                Some(Err(e)) => {
                    tracing::error!(error = %e, "Failed to write metrics");
                    false
                }
                Some(Ok(())) | None => true,
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to list pads");
            eprintln!("Error: failed to list pads: {}", e);
            false
        }
    }
}

/// Cancel the token on Ctrl+C or SIGTERM.
async fn cancel_on_interrupt(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Interrupt received, shutting down");
    token.cancel();
}

async fn run_delete_pad(client: &EtherpadClient, pad: &str) -> bool {
    match client.delete_pad(pad).await {
        Ok(()) => {
            tracing::info!(pad = %pad, "Deleted pad");
            true
        }
        Err(e) => {
            tracing::error!(pad = %pad, error = %e, "Failed to delete pad");
            false
        }
    }
}

async fn run_move_pad(
    client: &EtherpadClient,
    source: &str,
    destination: &str,
    force: bool,
) -> bool {
    match client.move_pad(source, destination, force).await {
        Ok(()) => {
            tracing::info!(source = %source, destination = %destination, "Moved pad");
            true
        }
        Err(e) => {
            tracing::error!(
                source = %source,
                destination = %destination,
                error = %e,
                "Failed to move pad"
            );
            false
        }
    }
}

async fn run_copy_pad(
    client: &EtherpadClient,
    source: &str,
    destination: &str,
    force: bool,
) -> bool {
    match client.copy_pad(source, destination, force).await {
        Ok(()) => {
            tracing::info!(source = %source, destination = %destination, "Copied pad");
            true
        }
        Err(e) => {
            tracing::error!(
                source = %source,
                destination = %destination,
                error = %e,
                "Failed to copy pad"
            );
            false
        }
    }
}

/// Serve the metrics endpoint until interrupted.
#[cfg(feature = "prometheus")]
async fn run_metrics(config: &ToolkitConfig, client: EtherpadClient) -> bool {
    use etherpad_toolkit::routes;

    let metrics = &config.observability.metrics;
    if !metrics.enabled {
        eprintln!("Error: metrics are disabled in the configuration");
        return false;
    }
    if let Err(e) = observability::metrics::init_metrics(metrics) {
        tracing::error!(error = %e, "Failed to initialize metrics");
        return false;
    }

    let service: Arc<dyn PadService> = Arc::new(client);
    let app = routes::build_app(service, metrics.suffixes.clone(), &metrics.path);

    let listener = match tokio::net::TcpListener::bind(&metrics.listen_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %metrics.listen_addr, error = %e, "Failed to bind");
            return false;
        }
    };

    tracing::info!(
        addr = %metrics.listen_addr,
        path = %metrics.path,
        suffixes = ?metrics.suffixes,
        "Serving metrics"
    );

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_interrupt(shutdown.clone()));

    match axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
    {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(error = %e, "Metrics server failed");
            false
        }
    }
}
