//! LivePoll daemon — entry point for the vote API and fanout servers.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use livepoll_admission::pipeline::SWEEP_INTERVAL;
use livepoll_admission::{AdmissionPipeline, NonceTracker, RateLimiter, RedisBackend};
use livepoll_fanout::FanoutServer;
use livepoll_publisher::{HttpPublisher, NoopPublisher, TallyPublisher};
use livepoll_server::{ApiServer, AppState, LivepollConfig, ShutdownController};
use livepoll_store::MemoryStore;

#[derive(Parser)]
#[command(name = "livepoll-daemon", about = "LivePoll vote admission daemon")]
struct Cli {
    /// Port for the vote-submission API.
    #[arg(long, env = "LIVEPOLL_API_PORT")]
    api_port: Option<u16>,

    /// Port for the real-time fanout server.
    #[arg(long, env = "LIVEPOLL_FANOUT_PORT")]
    fanout_port: Option<u16>,

    /// Redis URL for the shared nonce and rate-limit counters.
    /// Omit to run with in-process maps (single instance only).
    #[arg(long, env = "LIVEPOLL_REDIS_URL")]
    redis_url: Option<String>,

    /// Base URL of the fanout server, for tally notifications.
    /// Omit to disable publishing.
    #[arg(long, env = "LIVEPOLL_FANOUT_URL")]
    fanout_url: Option<String>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "LIVEPOLL_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format: "human" or "json".
    #[arg(long, env = "LIVEPOLL_LOG_FORMAT")]
    log_format: Option<String>,

    /// Path to a TOML configuration file. If provided, file settings
    /// are used as the base; CLI flags and env vars override them.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Run the vote-submission API.
    Serve,
    /// Run the real-time fanout server.
    Fanout,
}

/// Where the base configuration came from. Tracing is not initialized
/// while the config is being resolved, so load outcomes are reported
/// afterwards instead of logged inline.
enum ConfigSource {
    Defaults,
    File(String),
    FileError(String, String),
}

fn resolve_config(cli: &Cli) -> (LivepollConfig, ConfigSource) {
    let (base, source) = match cli.config {
        Some(ref config_path) => {
            let path = config_path.display().to_string();
            match LivepollConfig::from_toml_file(&path) {
                Ok(cfg) => (cfg, ConfigSource::File(path)),
                Err(e) => (
                    LivepollConfig::default(),
                    ConfigSource::FileError(path, e.to_string()),
                ),
            }
        }
        None => (LivepollConfig::default(), ConfigSource::Defaults),
    };

    let config = LivepollConfig {
        api_port: cli.api_port.unwrap_or(base.api_port),
        fanout_port: cli.fanout_port.unwrap_or(base.fanout_port),
        redis_url: cli.redis_url.clone().or(base.redis_url),
        fanout_url: cli.fanout_url.clone().or(base.fanout_url),
        log_level: cli.log_level.clone().unwrap_or(base.log_level),
        log_format: cli.log_format.clone().unwrap_or(base.log_format),
    };
    (config, source)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let (config, source) = resolve_config(&cli);
    livepoll_utils::init_tracing_with(&config.log_level, &config.log_format);

    match source {
        ConfigSource::Defaults => {}
        ConfigSource::File(path) => tracing::info!("loaded config from {}", path),
        ConfigSource::FileError(path, e) => {
            tracing::warn!("failed to load config file {}: {}, using defaults", path, e)
        }
    }

    match cli.command {
        Command::Serve => run_api(config).await,
        Command::Fanout => run_fanout(config).await,
    }
}

async fn run_api(config: LivepollConfig) -> anyhow::Result<()> {
    let (nonces, limiter) = match config.redis_url.as_deref() {
        Some(url) => {
            tracing::info!("using shared Redis counters at {}", url);
            let backend = RedisBackend::connect(url)?;
            (
                NonceTracker::with_redis(backend.clone()),
                RateLimiter::with_redis(backend),
            )
        }
        None => {
            tracing::info!("no redis_url configured, using in-process counters");
            (NonceTracker::in_memory(), RateLimiter::in_memory())
        }
    };

    let publisher: Arc<dyn TallyPublisher> = match config.fanout_url.as_deref() {
        Some(url) => {
            tracing::info!("publishing tally updates to {}", url);
            Arc::new(HttpPublisher::new(url))
        }
        None => {
            tracing::info!("no fanout_url configured, tally publishing disabled");
            Arc::new(NoopPublisher)
        }
    };

    let store = Arc::new(MemoryStore::new());
    let pipeline = Arc::new(AdmissionPipeline::new(
        store.clone(),
        store.clone(),
        nonces,
        limiter,
        publisher,
    ));

    let controller = ShutdownController::new();
    let sweeper = pipeline.spawn_sweeper(SWEEP_INTERVAL, controller.subscribe());

    let server = ApiServer::new(
        config.api_port,
        AppState {
            pipeline,
            polls: store.clone(),
            votes: store,
        },
    );
    let shutdown_rx = controller.subscribe();
    let server_task = tokio::spawn(async move { server.start(shutdown_rx).await });

    controller.wait_for_signal().await;
    server_task.await??;
    sweeper.await?;
    tracing::info!("vote API exited cleanly");
    Ok(())
}

async fn run_fanout(config: LivepollConfig) -> anyhow::Result<()> {
    let controller = ShutdownController::new();
    let server = FanoutServer::new(config.fanout_port);
    let shutdown_rx = controller.subscribe();
    let server_task = tokio::spawn(async move { server.start(shutdown_rx).await });

    controller.wait_for_signal().await;
    server_task.await??;
    tracing::info!("fanout server exited cleanly");
    Ok(())
}
