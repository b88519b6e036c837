use dotenvy::dotenv;
use log::{error, info, warn};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use std::{process, thread};
use structopt::StructOpt;
use tokio::sync::watch;
use tokio::time::{Interval, MissedTickBehavior};

mod alert;
mod cert_parser;
mod clock;
mod config;
mod error;
mod expiry;
mod fetcher;
mod runner;
mod sendgrid;
mod target;
#[cfg(test)]
mod testutil;

use alert::NotificationSender;
use clock::SystemClock;
use config::{load_config, AppConfig};
use fetcher::TlsFetcher;
use runner::{shutdown_requested, MonitorRunner, TargetOutcome};
use sendgrid::SendGridSender;

#[derive(StructOpt, Debug)]
#[structopt(name = "cert-watch", about = "Alerts when TLS certificates are close to expiry")]
struct Args {
    #[structopt(short = "c", long = "config", default_value = "config.yaml", parse(from_os_str))]
    config: PathBuf,

    #[structopt(long = "once", help = "Run a single pass even if interval_secs is configured")]
    once: bool,

    #[structopt(short = "t", long = "threshold", help = "Override days_remaining_threshold")]
    threshold: Option<u32>,
}

fn spawn_signal_listener(shutdown: watch::Sender<bool>) -> std::io::Result<()> {
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    thread::spawn(move || {
        if let Some(signal) = signals.forever().next() {
            warn!("🛑 Received signal {}, shutting down", signal);
            let _ = shutdown.send(true);
        }
    });
    Ok(())
}

/// A pass that overruns the interval delays the next one instead of triggering a burst of catch-up passes.
fn pass_interval(every: Duration) -> Interval {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

async fn monitor(config: AppConfig, once: bool, shutdown: watch::Receiver<bool>) -> i32 {
    let sender: Arc<dyn NotificationSender> =
        Arc::new(SendGridSender::new(config.sendgrid_api_key.clone(), config.from_email.clone()));
    let runner = MonitorRunner::new(Arc::new(TlsFetcher), config.notification_contact.clone())
        .with_concurrency(config.concurrency)
        .with_shutdown(shutdown.clone());
    let clock = SystemClock;

    let every = match config.interval {
        Some(every) if !once => every,
        _ => {
            let (outcomes, summary) = runner
                .run_pass(&config.targets, config.threshold, &clock, sender)
                .await;
            for outcome in &outcomes {
                if let TargetOutcome::Failed { kind, .. } = outcome {
                    warn!("   - {} failed ({})", outcome.target(), kind);
                }
            }
            return if summary.is_clean() { 0 } else { 1 };
        }
    };

    info!("🔄 Checking every {}s. Press Ctrl+C to stop.", every.as_secs());
    let mut interval = pass_interval(every);
    let mut stop = shutdown;
    loop {
        tokio::select! {
            _ = interval.tick() => {
                runner.run_pass(&config.targets, config.threshold, &clock, sender.clone()).await;
            }
            _ = shutdown_requested(&mut stop) => break,
        }
        if *stop.borrow() {
            break;
        }
    }
    info!("👋 Monitor stopped");
    0
}

fn main() {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::from_args();

    let mut config = match load_config(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("❌ {}", e);
            process::exit(2);
        }
    };
    if let Some(threshold) = args.threshold {
        config.threshold.days_remaining_threshold = threshold;
    }

    info!("🎯 Watching {} target(s)", config.targets.len());
    for target in &config.targets {
        info!("   - {} (timeout {}s)", target, target.timeout.as_secs());
    }
    info!(
        "📋 Alerting {} at <= {} days remaining",
        config.notification_contact, config.threshold.days_remaining_threshold
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    if let Err(e) = spawn_signal_listener(shutdown_tx) {
        warn!("⚠️ Could not install signal handlers: {}", e);
    }

    let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!("❌ Failed to start runtime: {}", e);
            process::exit(2);
        }
    };

    let code = rt.block_on(monitor(config, args.once, shutdown_rx));
    process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn overrunning_passes_skip_missed_ticks() {
        let interval = pass_interval(Duration::from_secs(3600));
        assert_eq!(interval.missed_tick_behavior(), MissedTickBehavior::Skip);
        assert_eq!(interval.period(), Duration::from_secs(3600));
    }

    #[test]
    fn cli_defaults() {
        let args = Args::from_iter(["cert-watch"]);
        assert_eq!(args.config, PathBuf::from("config.yaml"));
        assert!(!args.once);
        assert!(args.threshold.is_none());

        let args = Args::from_iter(["cert-watch", "--once", "-t", "14", "-c", "/etc/cert-watch.yaml"]);
        assert!(args.once);
        assert_eq!(args.threshold, Some(14));
        assert_eq!(args.config, PathBuf::from("/etc/cert-watch.yaml"));
    }
}
