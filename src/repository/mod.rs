mod durable;
mod store;

pub use durable::DurableRepository;
pub use store::InMemoryStore;

use async_trait::async_trait;

use crate::availability::{AvailabilityError, GroupedAvailability};
use crate::model::*;

/// Persistence boundary of the availability ledger.
///
/// `save_checking_versions` is the only mutation path for existing records and
/// must be atomic across every row of the group: either all rows commit with
/// their version bumped, or none do.
#[async_trait]
pub trait AvailabilityRepository: Send + Sync {
    /// Bulk insert of freshly provisioned records. Fails with `DuplicateSlot`
    /// if any `(resource_id, segment)` is already present; nothing is inserted then.
    async fn save_group(&self, records: Vec<AvailabilityRecord>) -> Result<(), AvailabilityError>;

    /// Compare-and-swap every mutated record of `group` against the version it
    /// was read at. `Ok(false)` on any stale row.
    async fn save_checking_versions(&self, group: &GroupedAvailability) -> Result<bool, AvailabilityError>;

    /// Records of `resource_id` sitting exactly on the given segments.
    async fn load_all_within_slot(
        &self,
        resource_id: ResourceId,
        segments: &[TimeSlot],
    ) -> Result<Vec<AvailabilityRecord>, AvailabilityError>;

    /// Records stamped with `parent_id` sitting exactly on the given segments,
    /// across every child resource.
    async fn load_all_by_parent_id_within_slot(
        &self,
        parent_id: ResourceId,
        segments: &[TimeSlot],
    ) -> Result<Vec<AvailabilityRecord>, AvailabilityError>;

    /// Unknown ids are skipped.
    async fn find_all_by_id(&self, ids: &[RecordId]) -> Result<Vec<AvailabilityRecord>, AvailabilityError>;

    async fn exists_by_id(&self, id: RecordId) -> Result<bool, AvailabilityError>;

    /// Every record of `resource_id` overlapping `slot`, ordered by segment start.
    async fn find_by_resource_within(
        &self,
        resource_id: ResourceId,
        slot: TimeSlot,
    ) -> Result<Vec<AvailabilityRecord>, AvailabilityError>;
}
