use std::collections::BTreeSet;

use crate::model::*;

/// Working set of records covering one normalized request.
///
/// Transitions are all-or-nothing: the precondition is checked against every
/// record before any of them is touched. Versions are left as read so the
/// repository can compare them on commit.
#[derive(Debug, Clone, Default)]
pub struct GroupedAvailability {
    records: Vec<AvailabilityRecord>,
    dirty: bool,
}

impl GroupedAvailability {
    pub fn new(mut records: Vec<AvailabilityRecord>) -> Self {
        records.sort_by_key(|r| r.segment.from);
        Self {
            records,
            dirty: false,
        }
    }

    /// Fresh available records, one per segment.
    pub fn provision(
        resource_id: ResourceId,
        segments: &[TimeSlot],
        parent_id: Option<ResourceId>,
    ) -> Self {
        let records = segments
            .iter()
            .map(|segment| AvailabilityRecord::new(resource_id, *segment, parent_id))
            .collect();
        Self::new(records)
    }

    pub fn block(&mut self, requester: Owner) -> bool {
        self.transition(
            |r| r.is_available(),
            Blockade::BlockedBy(requester),
        )
    }

    pub fn release(&mut self, requester: Owner) -> bool {
        self.transition(|r| r.is_blocked_by(requester), Blockade::Available)
    }

    pub fn disable(&mut self, requester: Owner) -> bool {
        self.transition(
            |r| r.is_available(),
            Blockade::DisabledBy(requester),
        )
    }

    fn transition(&mut self, allowed: impl Fn(&AvailabilityRecord) -> bool, to: Blockade) -> bool {
        if self.records.is_empty() || !self.records.iter().all(allowed) {
            return false;
        }
        for record in &mut self.records {
            record.blockade = to;
        }
        self.dirty = true;
        true
    }

    // ── Views ────────────────────────────────────────────────

    pub fn size(&self) -> usize {
        self.records.len()
    }

    pub fn has_no_slots(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[AvailabilityRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<AvailabilityRecord> {
        self.records
    }

    /// Records changed by a successful transition, still carrying the version read.
    pub fn mutated(&self) -> &[AvailabilityRecord] {
        if self.dirty { &self.records } else { &[] }
    }

    /// The resource shared by every record, if the group is non-empty and uniform.
    pub fn resource_id(&self) -> Option<ResourceId> {
        let first = self.records.first()?.resource_id;
        self.records
            .iter()
            .all(|r| r.resource_id == first)
            .then_some(first)
    }

    pub fn blocked_entirely_by(&self, owner: Owner) -> bool {
        !self.records.is_empty() && self.records.iter().all(|r| r.is_blocked_by(owner))
    }

    pub fn is_disabled_entirely_by(&self, owner: Owner) -> bool {
        !self.records.is_empty() && self.records.iter().all(|r| r.is_disabled_by(owner))
    }

    pub fn is_entirely_available(&self) -> bool {
        !self.records.is_empty() && self.records.iter().all(|r| r.is_available())
    }

    pub fn is_entirely_with_parent_id(&self, parent_id: ResourceId) -> bool {
        !self.records.is_empty() && self.records.iter().all(|r| r.parent_id == Some(parent_id))
    }

    pub fn find_blocked_by(&self, owner: Owner) -> Vec<&AvailabilityRecord> {
        self.records.iter().filter(|r| r.is_blocked_by(owner)).collect()
    }

    /// Every owner holding at least one segment, blocked or disabled.
    pub fn owners(&self) -> BTreeSet<Owner> {
        self.records.iter().filter_map(|r| r.blocked_by()).collect()
    }
}
