//! Periodic background compaction.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::catalog::TableManager;

pub struct Compactor;

impl Compactor {
    /// Compact every table of `manager` each `period` on the current tokio runtime.
    ///
    /// The task holds only a weak reference and exits once the manager is dropped.
    pub fn spawn(manager: &Arc<TableManager>, period: Duration) -> JoinHandle<()> {
        let weak = Arc::downgrade(manager);
        let period = period.max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(manager) = weak.upgrade() else {
                    tracing::debug!("table manager dropped, stopping compactor");
                    break;
                };
                match tokio::task::spawn_blocking(move || manager.compact_all()).await {
                    Ok(Ok(0)) => {}
                    Ok(Ok(rebuilt)) => tracing::info!(segments = rebuilt, "background compaction finished"),
                    Ok(Err(e)) => tracing::warn!(error = %e, "background compaction failed"),
                    Err(e) => tracing::error!(error = %e, "compaction task panicked"),
                }
            }
        })
    }

    /// Like `spawn`, using the manager's configured `compaction.interval_ms`.
    pub fn spawn_configured(manager: &Arc<TableManager>) -> JoinHandle<()> {
        let period = Duration::from_millis(manager.config().compaction.interval_ms);
        Self::spawn(manager, period)
    }
}
