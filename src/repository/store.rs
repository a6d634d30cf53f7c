use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

use crate::availability::{AvailabilityError, GroupedAvailability};
use crate::limits::*;
use crate::model::*;

use super::AvailabilityRepository;

/// Ledger rows in `DashMap`s plus secondary indexes.
///
/// Every write (insert or versioned update) holds the commit locks of all
/// resources it touches exclusively; reads hold them shared. A multi-row save is
/// therefore atomic with respect to every other writer and every reader.
pub struct InMemoryStore {
    records: DashMap<RecordId, AvailabilityRecord>,
    /// Uniqueness index: (resource, segment) → record.
    by_segment: DashMap<(ResourceId, TimeSlot), RecordId>,
    /// Parent lookups: (parent, segment) → records of every child.
    by_parent: DashMap<(ResourceId, TimeSlot), Vec<RecordId>>,
    /// Per-resource timeline keyed by (segment.from, segment.to).
    timeline: DashMap<ResourceId, BTreeMap<(Ms, Ms), RecordId>>,
    commit_locks: DashMap<ResourceId, Arc<RwLock<()>>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            by_segment: DashMap::new(),
            by_parent: DashMap::new(),
            timeline: DashMap::new(),
            commit_locks: DashMap::new(),
        }
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn resource_count(&self) -> usize {
        self.timeline.len()
    }

    pub fn get(&self, id: &RecordId) -> Option<AvailabilityRecord> {
        self.records.get(id).map(|e| e.value().clone())
    }

    // ── Write phases ─────────────────────────────────────────

    /// Acquire the commit locks of `resources` in sorted order to prevent deadlocks.
    /// Hold the guards across check + apply (and any log append in between).
    pub(super) async fn lock(
        &self,
        resources: impl IntoIterator<Item = ResourceId>,
    ) -> Vec<OwnedRwLockWriteGuard<()>> {
        let mut guards = Vec::new();
        for id in sorted(resources) {
            guards.push(self.commit_lock(id).write_owned().await);
        }
        guards
    }

    /// Shared counterpart of [`lock`](Self::lock) for reads, same ordering.
    async fn lock_shared(
        &self,
        resources: impl IntoIterator<Item = ResourceId>,
    ) -> Vec<OwnedRwLockReadGuard<()>> {
        let mut guards = Vec::new();
        for id in sorted(resources) {
            guards.push(self.commit_lock(id).read_owned().await);
        }
        guards
    }

    fn commit_lock(&self, id: ResourceId) -> Arc<RwLock<()>> {
        self.commit_locks.entry(id).or_default().clone()
    }

    /// Caller holds the commit locks of every resource in `records`.
    pub(super) fn check_insert(&self, records: &[AvailabilityRecord]) -> Result<(), AvailabilityError> {
        if records.len() > MAX_GROUP_INSERT {
            return Err(AvailabilityError::LimitExceeded("too many records in one insert"));
        }
        let mut seen = HashSet::with_capacity(records.len());
        for r in records {
            if self.by_segment.contains_key(&(r.resource_id, r.segment))
                || !seen.insert((r.resource_id, r.segment))
            {
                return Err(AvailabilityError::DuplicateSlot {
                    resource_id: r.resource_id,
                    segment: r.segment,
                });
            }
        }
        Ok(())
    }

    /// True iff every record's stored version still equals the one it carries.
    /// Caller holds the commit locks of every resource in `records`.
    pub(super) fn versions_match(&self, records: &[AvailabilityRecord]) -> bool {
        records.iter().all(|r| {
            self.records
                .get(&r.id)
                .is_some_and(|stored| stored.version == r.version)
        })
    }

    /// The records as they will be stored after a successful compare-and-swap.
    pub(super) fn bumped(records: &[AvailabilityRecord]) -> Vec<AvailabilityRecord> {
        records
            .iter()
            .map(|r| AvailabilityRecord {
                version: r.version + 1,
                ..r.clone()
            })
            .collect()
    }

    /// Apply an event to the maps. Also used for WAL replay.
    pub(super) fn apply_event(&self, event: &Event) {
        match event {
            Event::SlotsCreated { records } => {
                for r in records {
                    self.records.insert(r.id, r.clone());
                    self.index(r);
                }
            }
            Event::SlotsUpdated { records } => {
                // Only blockade and version change; indexes stay valid.
                for r in records {
                    if let Some(mut stored) = self.records.get_mut(&r.id) {
                        stored.blockade = r.blockade;
                        stored.version = r.version;
                    }
                }
            }
        }
    }

    fn index(&self, r: &AvailabilityRecord) {
        self.by_segment.insert((r.resource_id, r.segment), r.id);
        if let Some(pid) = r.parent_id {
            self.by_parent.entry((pid, r.segment)).or_default().push(r.id);
        }
        self.timeline
            .entry(r.resource_id)
            .or_default()
            .insert((r.segment.from, r.segment.to), r.id);
    }

    /// Current state, one `Vec` per resource, each ordered by segment.
    pub(super) fn snapshot_by_resource(&self) -> Vec<Vec<AvailabilityRecord>> {
        let resource_ids: Vec<ResourceId> = self.timeline.iter().map(|e| *e.key()).collect();
        resource_ids
            .into_iter()
            .filter_map(|rid| {
                let ids: Vec<RecordId> = self.timeline.get(&rid)?.values().copied().collect();
                Some(self.collect(ids))
            })
            .collect()
    }

    fn collect(&self, ids: impl IntoIterator<Item = RecordId>) -> Vec<AvailabilityRecord> {
        ids.into_iter().filter_map(|id| self.get(&id)).collect()
    }

    /// Read `ids` while holding their resources' commit locks shared, so no
    /// commit is observed half-applied. A record's resource never changes.
    async fn collect_consistent(&self, ids: Vec<RecordId>) -> Vec<AvailabilityRecord> {
        let resources: Vec<ResourceId> = ids
            .iter()
            .filter_map(|id| self.records.get(id).map(|r| r.resource_id))
            .collect();
        let _guards = self.lock_shared(resources).await;
        self.collect(ids)
    }
}

fn sorted(resources: impl IntoIterator<Item = ResourceId>) -> Vec<ResourceId> {
    let mut ids: Vec<ResourceId> = resources.into_iter().collect();
    ids.sort();
    ids.dedup();
    ids
}

#[async_trait]
impl AvailabilityRepository for InMemoryStore {
    async fn save_group(&self, records: Vec<AvailabilityRecord>) -> Result<(), AvailabilityError> {
        let _guards = self.lock(records.iter().map(|r| r.resource_id)).await;
        self.check_insert(&records)?;
        self.apply_event(&Event::SlotsCreated { records });
        Ok(())
    }

    async fn save_checking_versions(&self, group: &GroupedAvailability) -> Result<bool, AvailabilityError> {
        let mutated = group.mutated();
        if mutated.is_empty() {
            return Ok(true);
        }
        let _guards = self.lock(mutated.iter().map(|r| r.resource_id)).await;
        if !self.versions_match(mutated) {
            return Ok(false);
        }
        self.apply_event(&Event::SlotsUpdated {
            records: Self::bumped(mutated),
        });
        Ok(true)
    }

    async fn load_all_within_slot(
        &self,
        resource_id: ResourceId,
        segments: &[TimeSlot],
    ) -> Result<Vec<AvailabilityRecord>, AvailabilityError> {
        let _guards = self.lock_shared([resource_id]).await;
        let ids: Vec<RecordId> = segments
            .iter()
            .filter_map(|s| self.by_segment.get(&(resource_id, *s)).map(|e| *e.value()))
            .collect();
        Ok(self.collect(ids))
    }

    async fn load_all_by_parent_id_within_slot(
        &self,
        parent_id: ResourceId,
        segments: &[TimeSlot],
    ) -> Result<Vec<AvailabilityRecord>, AvailabilityError> {
        let mut ids = Vec::new();
        for s in segments {
            if let Some(children) = self.by_parent.get(&(parent_id, *s)) {
                ids.extend_from_slice(children.value());
            }
        }
        Ok(self.collect_consistent(ids).await)
    }

    async fn find_all_by_id(&self, ids: &[RecordId]) -> Result<Vec<AvailabilityRecord>, AvailabilityError> {
        Ok(self.collect_consistent(ids.to_vec()).await)
    }

    async fn exists_by_id(&self, id: RecordId) -> Result<bool, AvailabilityError> {
        Ok(self.records.contains_key(&id))
    }

    async fn find_by_resource_within(
        &self,
        resource_id: ResourceId,
        slot: TimeSlot,
    ) -> Result<Vec<AvailabilityRecord>, AvailabilityError> {
        let _guards = self.lock_shared([resource_id]).await;
        let ids: Vec<RecordId> = match self.timeline.get(&resource_id) {
            // Everything starting at or after slot.to can't overlap.
            Some(line) => line
                .range(..(slot.to, Ms::MIN))
                .filter(|((_, to), _)| *to > slot.from)
                .map(|(_, id)| *id)
                .collect(),
            None => Vec::new(),
        };
        Ok(self.collect(ids))
    }
}
