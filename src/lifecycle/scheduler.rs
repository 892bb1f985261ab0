//! Recurring bulk clear of the request log.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::interceptor::UpdateInterceptor;

/// Runs the scheduled clear hook every `period` until shutdown.
pub struct ClearScheduler {
    interceptor: Arc<UpdateInterceptor>,
    period: Duration,
}

impl ClearScheduler {
    pub fn new(interceptor: Arc<UpdateInterceptor>, period: Duration) -> Self {
        Self { interceptor, period }
    }

    /// Scheduler using the configured interval.
    pub fn from_config(interceptor: Arc<UpdateInterceptor>) -> Self {
        let secs = interceptor.config().load().schedule.clear_interval_secs.max(1);
        Self::new(interceptor, Duration::from_secs(secs))
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        // first clear one full period after start
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(period = ?self.period, "Clear scheduler started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.interceptor.on_schedule_tick();
                }
                _ = shutdown.recv() => {
                    tracing::info!("Clear scheduler stopped");
                    break;
                }
            }
        }
    }
}
