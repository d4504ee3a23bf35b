//! Background timeout sweeper

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use super::evaluator::TimeoutEvaluator;
use crate::clock::Clock;

/// Runs [`TimeoutEvaluator::sweep`] on a fixed interval
pub struct TimeoutWorker {
    evaluator: Arc<TimeoutEvaluator>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    running: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
}

impl TimeoutWorker {
    pub fn new(evaluator: Arc<TimeoutEvaluator>, clock: Arc<dyn Clock>, interval: Duration) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            evaluator,
            clock,
            interval,
            running: AtomicBool::new(false),
            shutdown_tx,
        }
    }

    /// Start the background worker
    ///
    /// A sweep in progress always runs to completion; once [`stop`] is called
    /// no new sweep starts.
    ///
    /// [`stop`]: TimeoutWorker::stop
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            tracing::info!("Timeout worker started with interval {:?}", self.interval);

            let mut ticker = interval(self.interval);
            // A sweep that overruns the interval delays the next one instead
            // of triggering a burst of catch-up sweeps.
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                if *shutdown_rx.borrow() {
                    break;
                }

                tokio::select! {
                    biased;
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        let now = self.clock.now();
                        if let Err(e) = self.evaluator.sweep(now).await {
                            tracing::error!(error = %e, "Timeout sweep failed");
                        }
                    }
                }
            }

            self.running.store(false, Ordering::SeqCst);
            tracing::info!("Timeout worker stopped");
        })
    }

    /// Ask the worker to stop after the current sweep
    pub fn stop(&self) {
        self.shutdown_tx.send_replace(true);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
