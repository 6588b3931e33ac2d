use anyhow::Result;
use certpulse_notify::channels::email::Mailer;
use certpulse_notify::channels::DeliveryFactory;
use certpulse_notify::dispatcher::Dispatcher;
use certpulse_storage::error::StorageError;
use certpulse_storage::{AccountRow, SqliteTrackingStore, TrackingStore};
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use certpulse_pulser::cert::orchestrator::PollOrchestrator;
use certpulse_pulser::cert::prober::{Prober, TlsProber, DEFAULT_PROBE_TIMEOUT};
use certpulse_pulser::cert::scheduler::{stop_on_signal, Scheduler};
use certpulse_pulser::config::PulserConfig;

const DEFAULT_CONFIG_PATH: &str = "config/pulser.toml";

#[allow(clippy::print_stderr)]
fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  certpulse-pulser [config.toml]                                Start polling tracked domains");
    eprintln!("  certpulse-pulser track <config.toml> <user_id> <email> <domain>...  Track domains for an account");
    eprintln!("  certpulse-pulser untrack <config.toml> <user_id> <domain>...  Stop tracking domains");
    eprintln!("  certpulse-pulser probe <domain> [port]                        Probe one domain and print the result");
}

#[tokio::main]
async fn main() -> Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|e| anyhow::anyhow!("Failed to install default CryptoProvider: {e:?}"))?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("certpulse=info".parse()?))
        .init();

    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("track") => {
            if args.len() < 6 {
                print_usage();
                anyhow::bail!("track requires <config.toml> <user_id> <email> and at least one <domain>");
            }
            run_track(&args[2], &args[3], &args[4], &args[5..])
        }
        Some("untrack") => {
            if args.len() < 5 {
                print_usage();
                anyhow::bail!("untrack requires <config.toml> <user_id> and at least one <domain>");
            }
            run_untrack(&args[2], &args[3], &args[4..])
        }
        Some("probe") => {
            let domain = args.get(2).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("probe requires a <domain> argument")
            })?;
            let port = match args.get(3) {
                Some(p) => p
                    .parse()
                    .map_err(|e| anyhow::anyhow!("Invalid port '{p}': {e}"))?,
                None => 443,
            };
            run_probe(domain, port).await
        }
        Some("--help" | "-h") => {
            print_usage();
            Ok(())
        }
        _ => {
            let config_path = args
                .get(1)
                .map(|s| s.as_str())
                .unwrap_or(DEFAULT_CONFIG_PATH);
            run_pulser(config_path).await
        }
    }
}

fn open_store(config: &PulserConfig) -> Result<SqliteTrackingStore> {
    SqliteTrackingStore::new(Path::new(&config.data_dir)).map_err(|e| {
        anyhow::anyhow!("Failed to open tracking store in '{}': {e}", config.data_dir)
    })
}

/// Creates or updates the account and adds the domains it does not track yet.
fn run_track(config_path: &str, user_id: &str, email: &str, domains: &[String]) -> Result<()> {
    let config = PulserConfig::load(config_path)?;
    let store = open_store(&config)?;

    store.upsert_account(&AccountRow::new(user_id, email))?;
    let inserted = store.create_trackings(user_id, domains)?;
    tracing::info!(
        user_id,
        requested = domains.len(),
        inserted,
        "Trackings created"
    );

    print_trackings(&store, user_id)
}

/// Removes the listed trackings. Domains the account does not track are
/// reported and skipped.
fn run_untrack(config_path: &str, user_id: &str, domains: &[String]) -> Result<()> {
    let config = PulserConfig::load(config_path)?;
    let store = open_store(&config)?;

    let mut removed = 0usize;
    for domain in domains {
        match store.delete_tracking(user_id, domain) {
            Ok(()) => removed += 1,
            Err(e @ StorageError::TrackingNotFound { .. }) => {
                tracing::warn!(error = %e, "Skipping untracked domain");
            }
            Err(e) => return Err(e.into()),
        }
    }
    tracing::info!(
        user_id,
        requested = domains.len(),
        removed,
        "Trackings removed"
    );

    print_trackings(&store, user_id)
}

/// One line per tracking. Never-polled trackings show as `pending`.
#[allow(clippy::print_stdout)]
fn print_trackings(store: &SqliteTrackingStore, user_id: &str) -> Result<()> {
    for tracking in store.list_trackings(user_id)? {
        println!(
            "{}\t{}\t{}",
            tracking.id,
            tracking.domain_name,
            tracking.status_label()
        );
    }
    Ok(())
}

#[allow(clippy::print_stdout)]
async fn run_probe(domain: &str, port: u16) -> Result<()> {
    let prober = TlsProber::new(port)?;
    let info = prober.probe(domain, DEFAULT_PROBE_TIMEOUT).await?;
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

async fn run_pulser(config_path: &str) -> Result<()> {
    let config = PulserConfig::load(config_path)?;
    tracing::info!(config = config_path, data_dir = %config.data_dir, "Starting certpulse pulser");

    if !config.monitor.enabled {
        tracing::warn!("Monitoring is disabled in config, exiting");
        return Ok(());
    }

    let store: Arc<dyn TrackingStore> = Arc::new(open_store(&config)?);
    let prober: Arc<dyn Prober> = Arc::new(TlsProber::new(config.monitor.port)?);

    let mailer = Mailer::from_settings(config.email.as_ref())?;
    if matches!(mailer, Mailer::Log) {
        tracing::warn!("No [email] section configured, email alerts will only be logged");
    }
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::new(DeliveryFactory::new(mailer)),
        config.monitor.notify_timeout(),
        tracing::info_span!("dispatcher"),
    ));

    let orchestrator = Arc::new(PollOrchestrator::new(
        store,
        prober,
        dispatcher,
        config.monitor.max_concurrent,
        config.monitor.probe_timeout(),
        tracing::info_span!("poll"),
    ));
    let scheduler = Scheduler::new(
        orchestrator,
        config.monitor.interval(),
        tracing::info_span!("scheduler"),
    );

    let last_completed = scheduler.start(stop_on_signal(signal::ctrl_c())).await?;
    tracing::info!(last_completed = ?last_completed, "Certpulse pulser stopped");
    Ok(())
}
