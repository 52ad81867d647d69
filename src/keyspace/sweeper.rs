//! Background Expiry Sweeper
//!
//! Lazy expiry only reclaims a key when something reads it again. A key
//! that expires and is never touched would otherwise sit in memory
//! forever, so a background task periodically asks the keyspace to
//! evict a bounded batch of due keys.
//!
//! The batch bound keeps each critical section short: the sweeper takes
//! the same mutex as request handlers and must not starve them. When a
//! sweep evicts a full batch there is probably a backlog, so the next
//! sweep runs immediately instead of waiting out the interval.

use crate::keyspace::Keyspace;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Tuning knobs for the sweeper task.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// Pause between sweeps
    pub interval: Duration,
    /// Maximum heap entries popped per sweep
    pub batch: usize,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(50),
            batch: 20,
        }
    }
}

/// Spawns the sweeper as a background task.
///
/// The task runs until the shared shutdown signal fires. The returned
/// handle can be awaited to observe the task winding down; dropping it
/// detaches the task.
pub fn start_sweeper(
    keyspace: Arc<Keyspace>,
    config: SweeperConfig,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    info!(
        interval_ms = config.interval.as_millis() as u64,
        batch = config.batch,
        "expiry sweeper started"
    );
    tokio::spawn(sweeper_loop(keyspace, config, shutdown))
}

async fn sweeper_loop(
    keyspace: Arc<Keyspace>,
    config: SweeperConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(config.interval) => {}
            _ = shutdown.wait_for(|stop| *stop) => {
                debug!("expiry sweeper stopping");
                return;
            }
        }

        // A full batch means a backlog; keep draining without sleeping.
        loop {
            let evicted = keyspace.sweep(config.batch);
            if evicted > 0 {
                debug!(evicted, remaining = keyspace.len(), "reclaimed expired keys");
            }
            if evicted < config.batch {
                break;
            }
        }
    }
}
