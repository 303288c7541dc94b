//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe backends
//! - Spread the first sweep with a random delay
//! - Stop cleanly on shutdown

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::time::{self, MissedTickBehavior};

use crate::config::HealthCheckConfig;
use crate::lifecycle::Shutdown;
use crate::load_balancer::BackendPool;

pub struct HealthMonitor {
    pool: Arc<BackendPool>,
    config: HealthCheckConfig,
}

impl HealthMonitor {
    pub fn new(pool: Arc<BackendPool>, config: HealthCheckConfig) -> Self {
        Self { pool, config }
    }

    pub async fn run(self, shutdown: Shutdown) {
        if !self.config.enabled {
            tracing::info!("Active health checks disabled");
            return;
        }

        let jitter = self.initial_jitter();
        tracing::info!(
            interval = self.config.interval_secs,
            jitter_ms = jitter.as_millis() as u64,
            "Health monitor starting"
        );

        tokio::select! {
            _ = time::sleep(jitter) => {}
            _ = shutdown.wait() => {
                tracing::info!("Health monitor received shutdown signal before first sweep");
                return;
            }
        }

        let timeout = Duration::from_secs(self.config.timeout_secs);
        let mut ticker = time::interval(Duration::from_secs(self.config.interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.pool.health_check(timeout).await;
                }
                _ = shutdown.wait() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    fn initial_jitter(&self) -> Duration {
        match self.config.initial_jitter_ms {
            0 => Duration::ZERO,
            max => Duration::from_millis(rand::thread_rng().gen_range(0..=max)),
        }
    }
}
