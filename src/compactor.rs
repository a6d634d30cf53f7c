use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::repository::DurableRepository;

/// Compact once the WAL has grown by `threshold` appends. Returns whether it ran.
pub async fn compact_if_needed(repo: &DurableRepository, threshold: u64) -> bool {
    let appends = repo.wal_appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    match repo.compact_wal().await {
        Ok(()) => {
            info!("compacted WAL after {appends} appends");
            true
        }
        Err(e) => {
            warn!("WAL compaction failed: {e}");
            false
        }
    }
}

/// Background task checking the compaction threshold every `every`.
pub async fn run_compactor(repo: Arc<DurableRepository>, threshold: u64, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        compact_if_needed(&repo, threshold).await;
    }
}
