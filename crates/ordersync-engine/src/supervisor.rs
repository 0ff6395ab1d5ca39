//! Live-mode supervisor
//!
//! Repeats sync cycles until shutdown. A successful cycle is followed by the
//! cycle interval; a failed one by an exponential backoff (or the delay the
//! source asked for) before restarting from the persisted checkpoint.

use std::future::Future;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};

use crate::config::SupervisorConfig;
use crate::orchestrator::SyncOrchestrator;

/// Doubling delay capped at a maximum
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            attempt: 0,
        }
    }

    /// Delay before the next retry; each call doubles the following one
    pub fn next_delay(&mut self) -> Duration {
        let factor = 1u32.checked_shl(self.attempt).unwrap_or(u32::MAX);
        self.attempt = self.attempt.saturating_add(1);
        self.base.saturating_mul(factor).min(self.max)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

/// Counters reported when the supervisor stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SupervisorSummary {
    pub cycles: u64,
    pub failures: u64,
}

pub struct Supervisor {
    orchestrator: SyncOrchestrator,
    config: SupervisorConfig,
}

impl Supervisor {
    pub fn new(orchestrator: SyncOrchestrator, config: SupervisorConfig) -> Self {
        Self {
            orchestrator,
            config,
        }
    }

    /// Run cycles until `shutdown` completes
    ///
    /// An in-flight cycle is dropped on shutdown. Upserts are idempotent and
    /// the checkpoint is written last, so the next start repeats at most the
    /// unfinished part.
    pub async fn run_until<F>(mut self, shutdown: F) -> SupervisorSummary
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut backoff = Backoff::new(self.config.retry_base(), self.config.retry_max());
        let mut summary = SupervisorSummary::default();

        loop {
            let cycle = tokio::select! {
                _ = &mut shutdown => {
                    warn!("Shutdown requested during cycle, abandoning it");
                    break;
                },
                result = self.orchestrator.run_cycle() => result,
            };
            summary.cycles += 1;

            let delay = match cycle {
                Ok(report) => {
                    backoff.reset();
                    info!(
                        run_id = %report.run.run_id,
                        normalized = report.run.normalized,
                        written = report.run.written,
                        checkpoint = ?report.checkpoint.since_id(),
                        next_in_secs = self.config.cycle_interval_secs,
                        "Sync cycle complete"
                    );
                    self.config.cycle_interval()
                },
                Err(e) => {
                    summary.failures += 1;
                    let delay = e.retry_after().unwrap_or_else(|| backoff.next_delay());
                    error!(
                        error = %e,
                        attempt = backoff.attempt(),
                        retry_in_secs = delay.as_secs_f64(),
                        "Sync cycle failed, restarting from stored checkpoint"
                    );
                    delay
                },
            };

            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(delay) => {},
            }
        }

        info!(cycles = summary.cycles, failures = summary.failures, "Supervisor stopped");
        summary
    }
}

/// Completes on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::checkpoint::{CheckpointManager, CheckpointStore};
    use crate::config::SyncSettings;
    use crate::error::{CheckpointError, SourceError};
    use crate::source::{OrderPage, OrderSource};
    use crate::store::MemoryDocumentStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    enum Behaviour {
        Empty,
        ServerError,
        RateLimited(Duration),
    }

    struct CountingSource {
        behaviour: Behaviour,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl OrderSource for CountingSource {
        async fn fetch_page(&self, _since_id: u64, limit: u32) -> Result<OrderPage, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behaviour {
                Behaviour::Empty => Ok(OrderPage::new(vec![], 0, limit)),
                Behaviour::ServerError => Err(SourceError::Status {
                    status: 503,
                    url: "test://orders".to_string(),
                    body: String::new(),
                }),
                Behaviour::RateLimited(after) => Err(SourceError::RateLimited {
                    retry_after: Some(after),
                }),
            }
        }
    }

    struct NoCheckpoint;

    #[async_trait]
    impl CheckpointStore for NoCheckpoint {
        async fn read(&self) -> Result<Option<u64>, CheckpointError> {
            Ok(None)
        }

        async fn write(&self, _since_id: u64) -> Result<(), CheckpointError> {
            Ok(())
        }
    }

    fn supervisor(source: Arc<CountingSource>) -> Supervisor {
        let store = Arc::new(MemoryDocumentStore::new());
        let manager = CheckpointManager::new(Arc::new(NoCheckpoint), store.clone(), 0, 3);
        let orchestrator =
            SyncOrchestrator::new(source, store, manager, SyncSettings::default());
        Supervisor::new(
            orchestrator,
            SupervisorConfig {
                cycle_interval_secs: 60,
                retry_base_secs: 5,
                retry_max_secs: 300,
            },
        )
    }

    fn source(behaviour: Behaviour) -> Arc<CountingSource> {
        Arc::new(CountingSource {
            behaviour,
            calls: AtomicUsize::new(0),
        })
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut backoff = Backoff::new(Duration::from_secs(5), Duration::from_secs(30));
        let delays: Vec<u64> = (0..5).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![5, 10, 20, 30, 30]);

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(5));
    }

    #[test]
    fn test_backoff_survives_many_attempts() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(300));
        for _ in 0..100 {
            assert!(backoff.next_delay() <= Duration::from_secs(300));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_back_off_exponentially() {
        let source = source(Behaviour::ServerError);
        let summary = supervisor(source.clone())
            .run_until(tokio::time::sleep(Duration::from_secs(30)))
            .await;

        // attempts at t=0, 5, 15; the next would be t=35
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        assert_eq!(summary.failures, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_delay_is_honoured() {
        let source = source(Behaviour::RateLimited(Duration::from_secs(60)));
        supervisor(source.clone())
            .run_until(tokio::time::sleep(Duration::from_secs(100)))
            .await;

        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_cycles_wait_interval() {
        let source = source(Behaviour::Empty);
        let summary = supervisor(source.clone())
            .run_until(tokio::time::sleep(Duration::from_secs(150)))
            .await;

        assert_eq!(summary.cycles, 3);
        assert_eq!(summary.failures, 0);
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }
}
