use chrono::{DateTime, Utc};
use log::{error, info, warn};
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinError;

use crate::alert::{dispatch, DispatchOutcome, NotificationSender};
use crate::cert_parser;
use crate::clock::Clock;
use crate::error::{ErrorKind, MonitorError};
use crate::expiry::{evaluate, EvaluationResult, ThresholdConfig};
use crate::fetcher::CertificateFetcher;
use crate::target::Target;

pub const DEFAULT_CONCURRENCY: usize = 4;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TargetOutcome {
    Evaluated(EvaluationResult, Option<DispatchOutcome>),
    Failed {
        target: Target,
        kind: ErrorKind,
        message: String,
    },
}

impl TargetOutcome {
    fn failed(target: Target, err: MonitorError) -> Self {
        TargetOutcome::Failed {
            target,
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    pub fn target(&self) -> &Target {
        match self {
            TargetOutcome::Evaluated(result, _) => &result.target,
            TargetOutcome::Failed { target, .. } => target,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub evaluated: usize,
    pub alerted: usize,
    pub failed: usize,
    pub dispatch_failed: usize,
}

impl RunSummary {
    pub fn from_outcomes(outcomes: &[TargetOutcome]) -> Self {
        let mut summary = RunSummary::default();
        for outcome in outcomes {
            match outcome {
                TargetOutcome::Evaluated(_, dispatched) => {
                    summary.evaluated += 1;
                    match dispatched {
                        Some(d) if d.success => summary.alerted += 1,
                        Some(_) => summary.dispatch_failed += 1,
                        None => {}
                    }
                }
                TargetOutcome::Failed { .. } => summary.failed += 1,
            }
        }
        summary
    }

    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.dispatch_failed == 0
    }
}

/// Resolves once shutdown has been requested. A closed channel never resolves.
pub async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Drives fetch, parse, evaluate and dispatch for every configured target.
///
/// Targets run on separate tokio tasks, at most `concurrency` at a time. Outcomes come back
/// in input order no matter which target finishes first.
pub struct MonitorRunner {
    fetcher: Arc<dyn CertificateFetcher>,
    recipient: String,
    concurrency: usize,
    shutdown: Option<watch::Receiver<bool>>,
}

impl MonitorRunner {
    pub fn new(fetcher: Arc<dyn CertificateFetcher>, recipient: impl Into<String>) -> Self {
        MonitorRunner {
            fetcher,
            recipient: recipient.into(),
            concurrency: DEFAULT_CONCURRENCY,
            shutdown: None,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub async fn run(
        &self,
        targets: &[Target],
        threshold: ThresholdConfig,
        now: DateTime<Utc>,
        sender: Arc<dyn NotificationSender>,
    ) -> Vec<TargetOutcome> {
        let permits = Arc::new(Semaphore::new(self.concurrency));

        let handles: Vec<_> = targets
            .iter()
            .cloned()
            .map(|target| {
                let stage = Stage {
                    fetcher: self.fetcher.clone(),
                    sender: sender.clone(),
                    recipient: self.recipient.clone(),
                    threshold,
                    now,
                };
                let permits = permits.clone();
                let shutdown = self.shutdown.clone();
                tokio::spawn(async move {
                    let work = async {
                        // The semaphore is never closed, so acquiring only waits.
                        let _permit = permits.acquire().await.ok();
                        stage.process(&target).await
                    };
                    match shutdown {
                        Some(mut rx) => tokio::select! {
                            outcome = work => outcome,
                            _ = shutdown_requested(&mut rx) => {
                                warn!("🛑 {} cancelled by shutdown", target);
                                TargetOutcome::failed(
                                    target.clone(),
                                    MonitorError::Cancelled { endpoint: target.endpoint() },
                                )
                            }
                        },
                        None => work.await,
                    }
                })
            })
            .collect();

        futures::future::join_all(handles)
            .await
            .into_iter()
            .zip(targets)
            .map(|(joined, target)| joined_outcome(target, joined))
            .collect()
    }

    /// One full monitoring pass stamped with the clock's current time, followed by a summary log line.
    pub async fn run_pass(
        &self,
        targets: &[Target],
        threshold: ThresholdConfig,
        clock: &dyn Clock,
        sender: Arc<dyn NotificationSender>,
    ) -> (Vec<TargetOutcome>, RunSummary) {
        let now = clock.now();
        info!("🔍 Checking {} certificate(s) at {}", targets.len(), now.to_rfc3339());

        let outcomes = self.run(targets, threshold, now, sender).await;
        let summary = RunSummary::from_outcomes(&outcomes);
        info!(
            "📋 Pass complete: {} evaluated, {} alerted, {} failed, {} alert(s) undelivered",
            summary.evaluated, summary.alerted, summary.failed, summary.dispatch_failed
        );
        (outcomes, summary)
    }
}

/// A panicking target task is a bug and is re-raised; any other join failure means the task
/// never finished, which is reported as a cancellation of that target.
fn joined_outcome(target: &Target, joined: Result<TargetOutcome, JoinError>) -> TargetOutcome {
    match joined {
        Ok(outcome) => outcome,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => {
            warn!("🛑 {} task ended early: {}", target, e);
            TargetOutcome::failed(
                target.clone(),
                MonitorError::Cancelled {
                    endpoint: target.endpoint(),
                },
            )
        }
    }
}

/// Everything a single target's pipeline needs, owned so it can move into a task.
struct Stage {
    fetcher: Arc<dyn CertificateFetcher>,
    sender: Arc<dyn NotificationSender>,
    recipient: String,
    threshold: ThresholdConfig,
    now: DateTime<Utc>,
}

impl Stage {
    async fn process(&self, target: &Target) -> TargetOutcome {
        let raw = match self.fetcher.fetch(target).await {
            Ok(raw) => raw,
            Err(e) => {
                error!("❌ {}: {}", target, e);
                return TargetOutcome::failed(target.clone(), e);
            }
        };

        let certificate = match cert_parser::parse(&raw) {
            Ok(info) => info,
            Err(e) => {
                error!("❌ {}: {}", target, e);
                return TargetOutcome::failed(target.clone(), e);
            }
        };

        let result = evaluate(target.clone(), certificate, self.now, self.threshold);
        if !result.exceeds_threshold {
            info!(
                "✅ {} ({}) expires {} ({} days left)",
                target, result.certificate.common_name, result.certificate.not_after, result.days_remaining
            );
            return TargetOutcome::Evaluated(result, None);
        }

        warn!(
            "⏰ {} ({}) expires {} ({} days left, threshold {})",
            target,
            result.certificate.common_name,
            result.certificate.not_after,
            result.days_remaining,
            self.threshold.days_remaining_threshold
        );
        let outcome = dispatch(&result, &self.recipient, self.sender.as_ref()).await;
        TargetOutcome::Evaluated(result, Some(outcome))
    }
}
