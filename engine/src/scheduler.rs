//! Periodic background sweep.
//!
//! # Example
//!
//! ```rust,ignore
//! let (shutdown_tx, _) = broadcast::channel(1);
//! let handle = SweepScheduler::new(engine.sweeper().clone(), Duration::from_secs(300))
//!     .spawn(shutdown_tx.subscribe());
//!
//! // ... on shutdown
//! let _ = shutdown_tx.send(());
//! handle.await?;
//! ```

use crate::sweep::{SweepMode, Sweeper};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

/// Runs a normal sweep every `interval` until shutdown.
#[derive(Debug)]
pub struct SweepScheduler {
    sweeper: Sweeper,
    interval: Duration,
}

impl SweepScheduler {
    /// Create a scheduler. A zero `interval` disables it.
    #[must_use]
    pub const fn new(sweeper: Sweeper, interval: Duration) -> Self {
        Self { sweeper, interval }
    }

    /// Spawn the loop as a background task.
    ///
    /// Sweep failures are logged and the loop keeps going. The task exits when
    /// `shutdown` fires or its sender is dropped.
    #[must_use]
    pub fn spawn(self, mut shutdown: broadcast::Receiver<()>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            if self.interval.is_zero() {
                info!("Sweep scheduler disabled");
                return;
            }

            info!(interval_secs = self.interval.as_secs(), "Sweep scheduler started");
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; sweep on the next one.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.recv() => {
                        info!("Sweep scheduler received shutdown signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        match self.sweeper.sweep(SweepMode::Normal).await {
                            Ok(report) => info!(cleaned = report.cleaned(), "Scheduled sweep finished"),
                            Err(e) => error!(error = %e, "Scheduled sweep failed"),
                        }
                    }
                }
            }
        })
    }
}
