mod manifests;

use clap::Parser;
use pkg_constants::controller::{
    DEFAULT_MAX_BACKOFF_SECS, DEFAULT_NOT_FOUND_REQUEUE_SECS, DEFAULT_RECONCILE_TIMEOUT_SECS,
    DEFAULT_RESYNC_INTERVAL_SECS, DEFAULT_WORKERS,
};
use pkg_constants::paths::{DEFAULT_CONTROLLER_CONFIG, DEFAULT_CONTROLLER_DATA_DIR};
use pkg_controllers::hpax::controller::{ControllerSettings, HpaxController};
use pkg_state::Registry;
use pkg_state::client::StateStore;
use pkg_types::config::{ControllerConfigFile, load_config_file};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "hpax-controller",
    about = "Keeps HorizontalPodAutoscaler minReplicas at the floor requested by HorizontalPodAutoscalerX and HPAOverride objects"
)]
struct Cli {
    /// Path to YAML config file
    #[arg(long, short, default_value = DEFAULT_CONTROLLER_CONFIG)]
    config: String,

    /// Directory for SlateDB state storage
    #[arg(long)]
    data_dir: Option<String>,

    /// Number of concurrent reconcile workers
    #[arg(long)]
    workers: Option<usize>,

    /// Seconds between full resync passes
    #[arg(long)]
    resync_interval_secs: Option<u64>,

    /// Seconds to wait before retrying when the target hpa is missing
    #[arg(long)]
    not_found_requeue_secs: Option<u64>,

    /// Upper bound for a single reconciliation, in seconds
    #[arg(long)]
    reconcile_timeout_secs: Option<u64>,

    /// Cap for the per-object retry backoff, in seconds
    #[arg(long)]
    max_backoff_secs: Option<u64>,

    /// Log output format: "text" or "json"
    #[arg(long)]
    log_format: Option<String>,

    /// YAML manifests to apply before starting (repeatable)
    #[arg(long = "manifest", short = 'f')]
    manifests: Vec<String>,

    /// Reconcile every object once and exit
    #[arg(long, default_value_t = false)]
    once: bool,
}

fn init_tracing(format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load config file (returns defaults if file not found)
    let file_cfg: ControllerConfigFile = load_config_file(&cli.config)?;

    // Merge: CLI args > config file > defaults
    let log_format = cli
        .log_format
        .or(file_cfg.log_format)
        .unwrap_or_else(|| "text".to_string());
    init_tracing(&log_format);
    info!("Config file: {}", cli.config);

    let data_dir = cli
        .data_dir
        .or(file_cfg.data_dir)
        .unwrap_or_else(|| DEFAULT_CONTROLLER_DATA_DIR.to_string());
    let settings = ControllerSettings {
        workers: cli.workers.or(file_cfg.workers).unwrap_or(DEFAULT_WORKERS),
        resync_interval: Duration::from_secs(
            cli.resync_interval_secs
                .or(file_cfg.resync_interval_secs)
                .unwrap_or(DEFAULT_RESYNC_INTERVAL_SECS),
        ),
        not_found_requeue: Duration::from_secs(
            cli.not_found_requeue_secs
                .or(file_cfg.not_found_requeue_secs)
                .unwrap_or(DEFAULT_NOT_FOUND_REQUEUE_SECS),
        ),
        reconcile_timeout: Duration::from_secs(
            cli.reconcile_timeout_secs
                .or(file_cfg.reconcile_timeout_secs)
                .unwrap_or(DEFAULT_RECONCILE_TIMEOUT_SECS),
        ),
        max_backoff: Duration::from_secs(
            cli.max_backoff_secs
                .or(file_cfg.max_backoff_secs)
                .unwrap_or(DEFAULT_MAX_BACKOFF_SECS),
        ),
    };

    info!("Starting hpax-controller");
    info!("  Data dir:  {}", data_dir);
    info!("  Workers:   {}", settings.workers);
    info!("  Resync:    {}s", settings.resync_interval.as_secs());

    let store = StateStore::new(&data_dir).await?;
    let registry = Registry::new(store.clone());
    HpaxController::setup(&registry).await?;

    for path in &cli.manifests {
        let count = manifests::apply_file(&registry, path).await?;
        info!("Applied {} objects from {}", count, path);
    }

    let controller = HpaxController::new(registry, settings);
    if cli.once {
        let count = controller.run_once().await?;
        info!("Reconciled {} objects, exiting", count);
    } else {
        let handle = controller.start();
        tokio::signal::ctrl_c().await?;
        info!("Shutting down");
        handle.shutdown().await;
    }

    store.close().await?;
    Ok(())
}
