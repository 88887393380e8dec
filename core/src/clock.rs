use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Utc};

/// Offset used when none is configured: UTC+1, without daylight saving.
pub const DEFAULT_UTC_OFFSET_HOURS: i32 = 1;

/// Source of the current local time. Entries are dated and slotted by this clock, never
/// by the host's local zone.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Wall clock shifted to a fixed UTC offset.
#[derive(Debug, Clone, Copy)]
pub struct FixedOffsetClock {
    offset: FixedOffset,
}

impl FixedOffsetClock {
    /// `None` when `hours` is outside the valid offset range.
    #[must_use]
    pub fn from_hours(hours: i32) -> Option<Self> {
        FixedOffset::east_opt(hours.checked_mul(3600)?).map(|offset| Self { offset })
    }

    #[must_use]
    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// `instant` as seen on this clock's wall.
    #[must_use]
    pub fn local(&self, instant: DateTime<Utc>) -> DateTime<FixedOffset> {
        instant.with_timezone(&self.offset)
    }
}

impl Default for FixedOffsetClock {
    fn default() -> Self {
        Self::from_hours(DEFAULT_UTC_OFFSET_HOURS).unwrap_or(Self {
            offset: Utc.fix(),
        })
    }
}

impl Clock for FixedOffsetClock {
    fn now(&self) -> DateTime<FixedOffset> {
        self.local(Utc::now())
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FrozenClock(pub DateTime<FixedOffset>);

impl FrozenClock {
    /// Frozen at `date` `time` in the given offset. `None` for an invalid offset.
    #[must_use]
    pub fn at(date: NaiveDate, time: NaiveTime, offset_hours: i32) -> Option<Self> {
        let offset = FixedOffset::east_opt(offset_hours.checked_mul(3600)?)?;
        offset
            .from_local_datetime(&date.and_time(time))
            .single()
            .map(Self)
    }
}

impl Clock for FrozenClock {
    fn now(&self) -> DateTime<FixedOffset> {
        self.0
    }
}
