use crate::model::{Ms, ResourceId, TimeSlot};

#[derive(Debug)]
pub enum AvailabilityError {
    InvalidInterval { from: Ms, to: Ms },
    InvalidGranularity(u32),
    DuplicateSlot {
        resource_id: ResourceId,
        segment: TimeSlot,
    },
    LimitExceeded(&'static str),
    Storage(String),
}

impl std::fmt::Display for AvailabilityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AvailabilityError::InvalidInterval { from, to } => {
                write!(f, "invalid interval [{from}, {to}): end must be after start")
            }
            AvailabilityError::InvalidGranularity(minutes) => {
                write!(f, "invalid segment granularity: {minutes} minutes")
            }
            AvailabilityError::DuplicateSlot {
                resource_id,
                segment,
            } => write!(f, "slot {segment} already exists for resource {resource_id}"),
            AvailabilityError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            AvailabilityError::Storage(e) => write!(f, "storage error: {e}"),
        }
    }
}

impl std::error::Error for AvailabilityError {}

impl From<std::io::Error> for AvailabilityError {
    fn from(e: std::io::Error) -> Self {
        AvailabilityError::Storage(e.to_string())
    }
}
