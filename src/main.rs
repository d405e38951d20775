use clap::{Parser, Subcommand};
use hwangsae_agent::config::{self, BusKind, Config, LoggingConfig};
use hwangsae_agent::dbus::DbusClient;
use hwangsae_agent::{agent, panic_handler, service, Container};
use std::path::PathBuf;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser)]
#[command(name = "hwangsae-agent")]
#[command(author, version, about = "Hwangsae recorder agent for D-Bus", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use this config file instead of the default location
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Use the system bus regardless of configuration
    #[arg(long, global = true)]
    system: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent in the foreground
    Run,

    /// Check whether the agent is running
    Status,

    /// Control recordings on a running agent
    Record {
        #[command(subcommand)]
        action: RecordAction,
    },

    /// Manage the systemd user service
    Service {
        #[command(subcommand)]
        action: ServiceAction,
    },

    /// Configure settings
    Config {
        /// Bus to register on (session, system)
        #[arg(long, value_enum)]
        bus: Option<BusKind>,

        /// Container for new recordings (mp4, ts)
        #[arg(long, value_enum)]
        container: Option<Container>,

        /// Log level (trace, debug, info, warn, error)
        #[arg(long)]
        log_level: Option<String>,

        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[derive(Subcommand)]
enum RecordAction {
    /// Start recording
    Start {
        /// Recording id
        id: String,
    },

    /// Stop recording
    Stop {
        /// Recording id
        id: String,
    },
}

#[derive(Subcommand)]
enum ServiceAction {
    /// Install the systemd unit and D-Bus activation file
    Install,

    /// Remove the systemd unit and D-Bus activation file
    Uninstall,

    /// Show service status
    Status,
}

fn init_logging(verbose: bool, logging: &LoggingConfig) -> Option<WorkerGuard> {
    let level = if verbose {
        "debug".to_string()
    } else {
        logging.level.to_lowercase()
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("hwangsae_agent={},zbus=warn", level)));

    let stderr_layer = if logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .boxed()
    };

    let (file_layer, guard) = match &logging.directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "hwangsae-agent.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    guard
}

async fn print_status(config: &Config) -> anyhow::Result<()> {
    let client = match DbusClient::connect(&config.bus).await {
        Ok(client) => client,
        Err(e) => {
            println!(
                "hwangsae-agent is not running ({} bus unavailable: {})",
                config.bus.kind, e
            );
            return Ok(());
        }
    };

    if !client.is_agent_running().await {
        println!(
            "hwangsae-agent is not running ({} not owned on the {} bus)",
            config.bus.name, config.bus.kind
        );
        return Ok(());
    }

    let status = client.status().await?;
    let version = client.version().await?;
    println!(
        "hwangsae-agent {} is running on the {} bus (status: {})",
        version, config.bus.kind, status
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    panic_handler::install();
    let cli = Cli::parse();

    let config_path = config::resolve_path(cli.config.as_deref())?;
    let mut config = Config::load_from(&config_path)?;
    if cli.system {
        config.bus.kind = BusKind::System;
    }
    let _log_guard = init_logging(cli.verbose, &config.logging);

    match cli.command {
        Commands::Run => {
            info!("Using config {}", config_path.display());
            agent::run(&config).await?;
        }

        Commands::Status => {
            print_status(&config).await?;
        }

        Commands::Record { action } => {
            let client = DbusClient::connect(&config.bus).await?;
            match action {
                RecordAction::Start { id } => {
                    let record_id = client.start(&id).await?;
                    println!("{}", record_id);
                }
                RecordAction::Stop { id } => {
                    client.stop(&id).await?;
                    println!("Stopped {}", id);
                }
            }
        }

        Commands::Service { action } => match action {
            ServiceAction::Install => service::install()?,
            ServiceAction::Uninstall => service::uninstall()?,
            ServiceAction::Status => print!("{}", service::status()?),
        },

        Commands::Config {
            bus,
            container,
            log_level,
            show,
        } => {
            if show {
                config::show(Some(config_path.as_path()))?;
            } else {
                config::update(Some(config_path.as_path()), bus, container, log_level)?;
            }
        }
    }

    Ok(())
}
