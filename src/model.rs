use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::availability::AvailabilityError;

/// Unix milliseconds (UTC), the only time type.
pub type Ms = i64;

macro_rules! ulid_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub Ulid);

        impl $name {
            pub fn new() -> Self {
                Self(Ulid::new())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<Ulid> for $name {
            fn from(id: Ulid) -> Self {
                Self(id)
            }
        }
    };
}

ulid_newtype!(
    /// A schedulable resource (person, room, piece of equipment, team).
    ResourceId
);
ulid_newtype!(
    /// A requester entitled to hold a reservation.
    Owner
);
ulid_newtype!(
    /// Identity of one availability record. One resource owns many.
    RecordId
);

/// Half-open interval `[from, to)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeSlot {
    pub from: Ms,
    pub to: Ms,
}

impl TimeSlot {
    pub fn new(from: Ms, to: Ms) -> Result<Self, AvailabilityError> {
        if to <= from {
            return Err(AvailabilityError::InvalidInterval { from, to });
        }
        Ok(Self { from, to })
    }

    pub fn between(from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Self, AvailabilityError> {
        Self::new(from.timestamp_millis(), to.timestamp_millis())
    }

    /// The whole UTC calendar day `[00:00, 24:00)`. `None` for an invalid date.
    pub fn daily_utc(year: i32, month: u32, day: u32) -> Option<Self> {
        let start = NaiveDate::from_ymd_opt(year, month, day)?;
        let end = start.succ_opt()?;
        let from = start.and_hms_opt(0, 0, 0)?.and_utc().timestamp_millis();
        let to = end.and_hms_opt(0, 0, 0)?.and_utc().timestamp_millis();
        Some(Self { from, to })
    }

    /// Saturates at `Ms::MAX` for slots wider than `i64` can express.
    pub fn duration_ms(&self) -> Ms {
        self.to.saturating_sub(self.from)
    }

    pub fn overlaps(&self, other: &TimeSlot) -> bool {
        self.from < other.to && other.from < self.to
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.from <= t && t < self.to
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains_slot(&self, other: &TimeSlot) -> bool {
        self.from <= other.from && other.to <= self.to
    }

    pub fn intersection(&self, other: &TimeSlot) -> Option<TimeSlot> {
        let from = self.from.max(other.from);
        let to = self.to.min(other.to);
        (from < to).then_some(TimeSlot { from, to })
    }

    /// Smallest slot covering both `self` and `other`.
    pub fn stretched(&self, other: &TimeSlot) -> TimeSlot {
        TimeSlot {
            from: self.from.min(other.from),
            to: self.to.max(other.to),
        }
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.from, self.to)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Available,
    Blocked,
    Disabled,
}

/// Who, if anyone, holds a segment. The owner exists only for held segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Blockade {
    Available,
    BlockedBy(Owner),
    /// Terminal: unavailable to everyone, including the owner recorded here.
    DisabledBy(Owner),
}

impl Blockade {
    pub fn status(&self) -> Status {
        match self {
            Blockade::Available => Status::Available,
            Blockade::BlockedBy(_) => Status::Blocked,
            Blockade::DisabledBy(_) => Status::Disabled,
        }
    }

    pub fn owner(&self) -> Option<Owner> {
        match self {
            Blockade::Available => None,
            Blockade::BlockedBy(o) | Blockade::DisabledBy(o) => Some(*o),
        }
    }
}

/// One row of the ledger: one resource, one grid segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityRecord {
    pub id: RecordId,
    pub resource_id: ResourceId,
    pub segment: TimeSlot,
    pub parent_id: Option<ResourceId>,
    pub blockade: Blockade,
    /// Bumped on every persisted mutation.
    pub version: u64,
}

impl AvailabilityRecord {
    /// A fresh, available, never-persisted record.
    pub fn new(resource_id: ResourceId, segment: TimeSlot, parent_id: Option<ResourceId>) -> Self {
        Self {
            id: RecordId::new(),
            resource_id,
            segment,
            parent_id,
            blockade: Blockade::Available,
            version: 0,
        }
    }

    pub fn status(&self) -> Status {
        self.blockade.status()
    }

    pub fn blocked_by(&self) -> Option<Owner> {
        self.blockade.owner()
    }

    pub fn is_available(&self) -> bool {
        self.blockade == Blockade::Available
    }

    pub fn is_blocked_by(&self, owner: Owner) -> bool {
        self.blockade == Blockade::BlockedBy(owner)
    }

    pub fn is_disabled_by(&self, owner: Owner) -> bool {
        self.blockade == Blockade::DisabledBy(owner)
    }
}

/// The event types. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// Freshly provisioned records, all at version 0.
    SlotsCreated { records: Vec<AvailabilityRecord> },
    /// Records after a committed transition, carrying their new version.
    SlotsUpdated { records: Vec<AvailabilityRecord> },
}

impl Event {
    pub fn records(&self) -> &[AvailabilityRecord] {
        match self {
            Event::SlotsCreated { records } | Event::SlotsUpdated { records } => records,
        }
    }
}
