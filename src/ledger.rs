use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use crate::availability::{AvailabilityError, AvailabilityFacade};
use crate::compactor;
use crate::config::Config;
use crate::repository::DurableRepository;
use crate::segment::SegmentInMinutes;

/// A durable ledger opened from [`Config`]: the WAL under `data_dir`, the
/// configured grid, and a background compactor. Requires a tokio runtime.
pub struct Ledger {
    facade: AvailabilityFacade<DurableRepository>,
    compactor: JoinHandle<()>,
}

impl Ledger {
    pub fn open(config: &Config) -> Result<Self, AvailabilityError> {
        let unit = SegmentInMinutes::of(config.segment_minutes)?;
        std::fs::create_dir_all(&config.data_dir)?;
        let wal_path = config.wal_path();
        let repo = Arc::new(DurableRepository::open(&wal_path)?);

        let compactor = tokio::spawn(compactor::run_compactor(
            repo.clone(),
            config.compact_threshold,
            config.compact_interval,
        ));
        info!(
            "ledger open at {} ({}-minute grid, compaction every {} appends)",
            wal_path.display(),
            unit.minutes(),
            config.compact_threshold
        );

        Ok(Self {
            facade: AvailabilityFacade::with_segment(repo, unit),
            compactor,
        })
    }

    pub fn facade(&self) -> &AvailabilityFacade<DurableRepository> {
        &self.facade
    }

    /// Stop the compactor and leave a compacted WAL behind.
    pub async fn shutdown(self) -> Result<(), AvailabilityError> {
        self.compactor.abort();
        self.facade.repository().compact_wal().await?;
        info!("ledger closed");
        Ok(())
    }
}
