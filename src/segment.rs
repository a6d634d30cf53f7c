use crate::availability::AvailabilityError;
use crate::limits::*;
use crate::model::{Ms, TimeSlot};

const MS_PER_MINUTE: Ms = 60_000;

/// Grid granularity. The grid is aligned at UTC midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentInMinutes {
    minutes: u32,
}

impl SegmentInMinutes {
    /// Fails unless `minutes` is positive and divides a day evenly.
    pub fn of(minutes: u32) -> Result<Self, AvailabilityError> {
        if minutes == 0 || MINUTES_PER_DAY % minutes != 0 {
            return Err(AvailabilityError::InvalidGranularity(minutes));
        }
        Ok(Self { minutes })
    }

    pub fn default_segment() -> Self {
        Self {
            minutes: DEFAULT_SEGMENT_MINUTES,
        }
    }

    pub fn minutes(&self) -> u32 {
        self.minutes
    }

    pub fn as_ms(&self) -> Ms {
        self.minutes as Ms * MS_PER_MINUTE
    }
}

impl Default for SegmentInMinutes {
    fn default() -> Self {
        Self::default_segment()
    }
}

pub struct Segments;

impl Segments {
    /// Walk from `slot.from` in `unit` steps until `slot.to` is covered.
    ///
    /// No rounding happens here: the first cell starts exactly at `slot.from`.
    /// If the length is not a multiple of `unit`, the last cell ends past `slot.to`.
    pub fn split(slot: &TimeSlot, unit: SegmentInMinutes) -> Result<Vec<TimeSlot>, AvailabilityError> {
        if slot.to <= slot.from {
            return Err(AvailabilityError::InvalidInterval {
                from: slot.from,
                to: slot.to,
            });
        }
        let step = unit.as_ms();
        let count = slot
            .to
            .checked_sub(slot.from)
            .and_then(|len| len.checked_add(step - 1))
            .map(|len| len / step)
            .ok_or(AvailabilityError::LimitExceeded("interval too wide"))?;
        if count as usize > MAX_SEGMENTS_PER_REQUEST {
            return Err(AvailabilityError::LimitExceeded("too many segments in request"));
        }
        // The last cell may end past `slot.to`; it must still be representable.
        slot.from
            .checked_add(count * step)
            .ok_or(AvailabilityError::LimitExceeded("interval outside the grid"))?;

        let mut segments = Vec::with_capacity(count as usize);
        let mut cursor = slot.from;
        while cursor < slot.to {
            segments.push(TimeSlot {
                from: cursor,
                to: cursor + step,
            });
            cursor += step;
        }
        Ok(segments)
    }

    /// Round `from` down and `to` up to the nearest grid boundaries.
    pub fn normalize_to_segment_boundaries(
        slot: &TimeSlot,
        unit: SegmentInMinutes,
    ) -> Result<TimeSlot, AvailabilityError> {
        if slot.to <= slot.from {
            return Err(AvailabilityError::InvalidInterval {
                from: slot.from,
                to: slot.to,
            });
        }
        let step = unit.as_ms();
        let ceil = slot.to.div_euclid(step) + Ms::from(slot.to.rem_euclid(step) != 0);
        match (slot.from.div_euclid(step).checked_mul(step), ceil.checked_mul(step)) {
            (Some(from), Some(to)) => Ok(TimeSlot { from, to }),
            _ => Err(AvailabilityError::LimitExceeded("interval outside the grid")),
        }
    }

    /// Boundary normalization followed by `split`: the smallest grid-aligned cover.
    pub fn normalize(slot: &TimeSlot, unit: SegmentInMinutes) -> Result<Vec<TimeSlot>, AvailabilityError> {
        let aligned = Self::normalize_to_segment_boundaries(slot, unit)?;
        Self::split(&aligned, unit)
    }
}
