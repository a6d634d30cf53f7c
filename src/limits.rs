use crate::model::Ms;

/// 2000-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// 2100-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;

/// One year of 15-minute segments.
pub const MAX_SEGMENTS_PER_REQUEST: usize = 366 * 96;

/// Upper bound on records accepted by a single `save_group` call.
pub const MAX_GROUP_INSERT: usize = MAX_SEGMENTS_PER_REQUEST;

pub const DEFAULT_SEGMENT_MINUTES: u32 = 15;

pub const MINUTES_PER_DAY: u32 = 24 * 60;
