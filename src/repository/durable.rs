use std::io;
use std::path::Path;

use async_trait::async_trait;
use tokio::sync::{RwLock, mpsc, oneshot};
use tracing::info;

use crate::availability::{AvailabilityError, GroupedAvailability};
use crate::model::*;
use crate::wal::Wal;

use super::{AvailabilityRepository, InMemoryStore};

// ── Group-commit WAL channel ─────────────────────────────

enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Background task that owns the WAL and batches appends for group commit.
/// Appends queued while a flush is pending share the next fsync; any other
/// command first flushes the batch in front of it.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };

        let mut batch = vec![(event, response)];
        let mut deferred = None;
        while let Ok(next) = rx.try_recv() {
            match next {
                WalCommand::Append { event, response } => batch.push((event, response)),
                other => {
                    deferred = Some(other);
                    break;
                }
            }
        }

        metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let flush_start = std::time::Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());
        if let Err(e) = &result {
            tracing::error!("WAL flush of {} events failed: {e}", batch.len());
        }
        respond_batch(batch, &result);

        if let Some(other) = deferred {
            handle_non_append(&mut wal, other);
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    let appended = batch.iter().try_for_each(|(event, _)| wal.append_buffered(event));
    // Flush even after an append error so half-buffered bytes don't leak into
    // the next batch; the whole batch is reported failed.
    let flushed = wal.flush_sync();
    appended.and(flushed)
}

fn respond_batch(batch: Vec<PendingAppend>, result: &io::Result<()>) {
    for (_, tx) in batch {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let _ = response.send(wal.compact(&events));
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the writer loop"),
    }
}

fn writer_gone<T>(_: T) -> AvailabilityError {
    AvailabilityError::Storage("WAL writer shut down".into())
}

/// In-memory ledger made durable by a write-ahead log.
///
/// Every mutation is appended (and fsynced by the group-commit writer) while the
/// touched resources are locked, and only applied to memory after the append
/// succeeds. Opening replays the log.
pub struct DurableRepository {
    store: InMemoryStore,
    wal_tx: mpsc::Sender<WalCommand>,
    /// Commits share it; compaction takes it exclusively so the snapshot it
    /// writes cannot miss a concurrent append.
    compaction_gate: RwLock<()>,
}

impl DurableRepository {
    /// Replay `wal_path` into memory and start the writer task. Requires a tokio runtime.
    pub fn open(wal_path: &Path) -> io::Result<Self> {
        let events = Wal::replay(wal_path)?;
        let store = InMemoryStore::new();
        for event in &events {
            store.apply_event(event);
        }
        info!(
            "replayed {} events from {}: {} records across {} resources",
            events.len(),
            wal_path.display(),
            store.record_count(),
            store.resource_count()
        );
        metrics::gauge!(crate::observability::RECORDS_STORED).set(store.record_count() as f64);

        let wal = Wal::open(wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        Ok(Self {
            store,
            wal_tx,
            compaction_gate: RwLock::new(()),
        })
    }

    pub fn store(&self) -> &InMemoryStore {
        &self.store
    }

    async fn wal_append(&self, event: &Event) -> Result<(), AvailabilityError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(writer_gone)?;
        rx.await.map_err(writer_gone)??;
        Ok(())
    }

    /// Rewrite the WAL as one `SlotsCreated` per resource holding current state.
    pub async fn compact_wal(&self) -> Result<(), AvailabilityError> {
        let _gate = self.compaction_gate.write().await;
        let events: Vec<Event> = self
            .store
            .snapshot_by_resource()
            .into_iter()
            .map(|records| Event::SlotsCreated { records })
            .collect();
        let resources = events.len();

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(writer_gone)?;
        rx.await.map_err(writer_gone)??;

        metrics::counter!(crate::observability::WAL_COMPACTIONS_TOTAL).increment(1);
        info!("compacted WAL to {resources} resources");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    /// Log, then apply. Caller holds the gate and the resource locks.
    async fn persist_and_apply(&self, event: Event) -> Result<(), AvailabilityError> {
        self.wal_append(&event).await?;
        self.store.apply_event(&event);
        Ok(())
    }
}

#[async_trait]
impl AvailabilityRepository for DurableRepository {
    async fn save_group(&self, records: Vec<AvailabilityRecord>) -> Result<(), AvailabilityError> {
        let _gate = self.compaction_gate.read().await;
        let _guards = self.store.lock(records.iter().map(|r| r.resource_id)).await;
        self.store.check_insert(&records)?;
        self.persist_and_apply(Event::SlotsCreated { records }).await?;
        metrics::gauge!(crate::observability::RECORDS_STORED).set(self.store.record_count() as f64);
        Ok(())
    }

    async fn save_checking_versions(&self, group: &GroupedAvailability) -> Result<bool, AvailabilityError> {
        let mutated = group.mutated();
        if mutated.is_empty() {
            return Ok(true);
        }
        let _gate = self.compaction_gate.read().await;
        let _guards = self.store.lock(mutated.iter().map(|r| r.resource_id)).await;
        if !self.store.versions_match(mutated) {
            return Ok(false);
        }
        self.persist_and_apply(Event::SlotsUpdated {
            records: InMemoryStore::bumped(mutated),
        })
        .await?;
        Ok(true)
    }

    async fn load_all_within_slot(
        &self,
        resource_id: ResourceId,
        segments: &[TimeSlot],
    ) -> Result<Vec<AvailabilityRecord>, AvailabilityError> {
        self.store.load_all_within_slot(resource_id, segments).await
    }

    async fn load_all_by_parent_id_within_slot(
        &self,
        parent_id: ResourceId,
        segments: &[TimeSlot],
    ) -> Result<Vec<AvailabilityRecord>, AvailabilityError> {
        self.store.load_all_by_parent_id_within_slot(parent_id, segments).await
    }

    async fn find_all_by_id(&self, ids: &[RecordId]) -> Result<Vec<AvailabilityRecord>, AvailabilityError> {
        self.store.find_all_by_id(ids).await
    }

    async fn exists_by_id(&self, id: RecordId) -> Result<bool, AvailabilityError> {
        self.store.exists_by_id(id).await
    }

    async fn find_by_resource_within(
        &self,
        resource_id: ResourceId,
        slot: TimeSlot,
    ) -> Result<Vec<AvailabilityRecord>, AvailabilityError> {
        self.store.find_by_resource_within(resource_id, slot).await
    }
}
