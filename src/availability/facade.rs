use std::sync::Arc;

use tracing::debug;

use crate::limits::*;
use crate::model::*;
use crate::observability::*;
use crate::repository::AvailabilityRepository;
use crate::segment::{SegmentInMinutes, Segments};

use super::{AvailabilityError, GroupedAvailability};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Block,
    Release,
    Disable,
}

impl Operation {
    fn label(self) -> &'static str {
        match self {
            Operation::Block => "block",
            Operation::Release => "release",
            Operation::Disable => "disable",
        }
    }

    fn apply(self, group: &mut GroupedAvailability, requester: Owner) -> bool {
        match self {
            Operation::Block => group.block(requester),
            Operation::Release => group.release(requester),
            Operation::Disable => group.disable(requester),
        }
    }
}

fn validate_slot(slot: &TimeSlot) -> Result<(), AvailabilityError> {
    if slot.to <= slot.from {
        return Err(AvailabilityError::InvalidInterval {
            from: slot.from,
            to: slot.to,
        });
    }
    if slot.from < MIN_VALID_TIMESTAMP_MS || slot.to > MAX_VALID_TIMESTAMP_MS {
        return Err(AvailabilityError::LimitExceeded("timestamp out of range"));
    }
    Ok(())
}

/// Entry point of the availability ledger.
///
/// Mutations return `Ok(false)` both when the all-or-nothing precondition fails
/// and when a concurrent writer won the version check. Either way the caller
/// has to re-read and decide; nothing is retried here.
pub struct AvailabilityFacade<R> {
    repository: Arc<R>,
    unit: SegmentInMinutes,
}

impl<R> Clone for AvailabilityFacade<R> {
    fn clone(&self) -> Self {
        Self {
            repository: self.repository.clone(),
            unit: self.unit,
        }
    }
}

impl<R: AvailabilityRepository> AvailabilityFacade<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self::with_segment(repository, SegmentInMinutes::default_segment())
    }

    pub fn with_segment(repository: Arc<R>, unit: SegmentInMinutes) -> Self {
        Self { repository, unit }
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    pub fn segment(&self) -> SegmentInMinutes {
        self.unit
    }

    fn segments_of(&self, slot: &TimeSlot) -> Result<Vec<TimeSlot>, AvailabilityError> {
        validate_slot(slot)?;
        let segments = Segments::normalize(slot, self.unit)?;
        metrics::histogram!(SEGMENTS_PER_REQUEST).record(segments.len() as f64);
        Ok(segments)
    }

    pub async fn create_resource_slots(
        &self,
        resource_id: ResourceId,
        slot: TimeSlot,
    ) -> Result<(), AvailabilityError> {
        self.provision(resource_id, None, slot).await
    }

    pub async fn create_resource_slots_with_parent(
        &self,
        resource_id: ResourceId,
        parent_id: ResourceId,
        slot: TimeSlot,
    ) -> Result<(), AvailabilityError> {
        self.provision(resource_id, Some(parent_id), slot).await
    }

    async fn provision(
        &self,
        resource_id: ResourceId,
        parent_id: Option<ResourceId>,
        slot: TimeSlot,
    ) -> Result<(), AvailabilityError> {
        let segments = self.segments_of(&slot)?;
        let group = GroupedAvailability::provision(resource_id, &segments, parent_id);
        match self.repository.save_group(group.into_records()).await {
            Ok(()) => {
                metrics::counter!(SLOTS_CREATED_TOTAL).increment(segments.len() as u64);
                debug!("provisioned {} segments of {resource_id} over {slot}", segments.len());
                Ok(())
            }
            Err(e @ AvailabilityError::DuplicateSlot { .. }) => {
                metrics::counter!(DUPLICATE_SLOTS_TOTAL).increment(1);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn block(
        &self,
        resource_id: ResourceId,
        slot: TimeSlot,
        requester: Owner,
    ) -> Result<bool, AvailabilityError> {
        self.transition(Operation::Block, resource_id, slot, requester).await
    }

    pub async fn release(
        &self,
        resource_id: ResourceId,
        slot: TimeSlot,
        requester: Owner,
    ) -> Result<bool, AvailabilityError> {
        self.transition(Operation::Release, resource_id, slot, requester).await
    }

    pub async fn disable(
        &self,
        resource_id: ResourceId,
        slot: TimeSlot,
        requester: Owner,
    ) -> Result<bool, AvailabilityError> {
        self.transition(Operation::Disable, resource_id, slot, requester).await
    }

    async fn transition(
        &self,
        op: Operation,
        resource_id: ResourceId,
        slot: TimeSlot,
        requester: Owner,
    ) -> Result<bool, AvailabilityError> {
        let segments = self.segments_of(&slot)?;
        let records = self.repository.load_all_within_slot(resource_id, &segments).await?;
        let mut group = GroupedAvailability::new(records);

        // Segments never provisioned count as unavailable.
        let covered = group.size() == segments.len();
        if !covered || !op.apply(&mut group, requester) {
            debug!(
                "{} of {resource_id} over {slot} by {requester} rejected ({} of {} segments provisioned)",
                op.label(),
                group.size(),
                segments.len()
            );
            metrics::counter!(TRANSITIONS_TOTAL, "operation" => op.label(), "outcome" => OUTCOME_REJECTED)
                .increment(1);
            return Ok(false);
        }

        if !self.repository.save_checking_versions(&group).await? {
            debug!("{} of {resource_id} over {slot} by {requester} lost a version race", op.label());
            metrics::counter!(TRANSITIONS_TOTAL, "operation" => op.label(), "outcome" => OUTCOME_CONFLICT)
                .increment(1);
            return Ok(false);
        }

        metrics::counter!(TRANSITIONS_TOTAL, "operation" => op.label(), "outcome" => OUTCOME_COMMITTED)
            .increment(1);
        Ok(true)
    }

    pub async fn find(
        &self,
        resource_id: ResourceId,
        within: TimeSlot,
    ) -> Result<GroupedAvailability, AvailabilityError> {
        let segments = self.segments_of(&within)?;
        let records = self.repository.load_all_within_slot(resource_id, &segments).await?;
        Ok(GroupedAvailability::new(records))
    }

    pub async fn find_by_parent_id(
        &self,
        parent_id: ResourceId,
        within: TimeSlot,
    ) -> Result<GroupedAvailability, AvailabilityError> {
        let segments = self.segments_of(&within)?;
        let records = self
            .repository
            .load_all_by_parent_id_within_slot(parent_id, &segments)
            .await?;
        Ok(GroupedAvailability::new(records))
    }
}
