//! Recurring intervals offered to the host scheduler.
//!
//! Every whole hour from 1 to 23 gets a generated `every_{N}_hours` entry;
//! 24 hours maps onto the scheduler's built-in `daily`.

use std::collections::BTreeMap;

use crate::settings::MAX_FREQUENCY_HOURS;

/// Name of the host scheduler's built-in 24-hour interval.
pub const DAILY_INTERVAL: &str = "daily";

const SECONDS_PER_HOUR: u64 = 3600;

/// A named recurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interval {
    /// Period in seconds.
    pub seconds: u64,
    /// Human-readable label.
    pub label: String,
}

impl Interval {
    /// Interval of `hours` whole hours.
    pub fn hours(hours: u8) -> Self {
        let label = if hours == 1 {
            "Every 1 Hour".to_owned()
        } else {
            format!("Every {hours} Hours")
        };
        Self {
            seconds: u64::from(hours).saturating_mul(SECONDS_PER_HOUR),
            label,
        }
    }
}

/// Interval name for a frequency in hours: `daily` for 24, else
/// `every_{N}_hours`.
pub fn resolve_interval_name(frequency_hours: u8) -> String {
    if frequency_hours == MAX_FREQUENCY_HOURS {
        DAILY_INTERVAL.to_owned()
    } else {
        format!("every_{frequency_hours}_hours")
    }
}

/// The generated intervals for 1..=23 hours.
pub fn custom_intervals() -> BTreeMap<String, Interval> {
    (1..MAX_FREQUENCY_HOURS)
        .map(|h| (resolve_interval_name(h), Interval::hours(h)))
        .collect()
}

/// Intervals every host scheduler knows without registration.
pub fn builtin_intervals() -> BTreeMap<String, Interval> {
    BTreeMap::from([
        (
            "hourly".to_owned(),
            Interval {
                seconds: SECONDS_PER_HOUR,
                label: "Once Hourly".to_owned(),
            },
        ),
        (
            "twicedaily".to_owned(),
            Interval {
                seconds: SECONDS_PER_HOUR.saturating_mul(12),
                label: "Twice Daily".to_owned(),
            },
        ),
        (
            DAILY_INTERVAL.to_owned(),
            Interval {
                seconds: SECONDS_PER_HOUR.saturating_mul(24),
                label: "Once Daily".to_owned(),
            },
        ),
    ])
}

/// Hands the generated intervals to the host scheduler once per process.
#[derive(Debug, Default)]
pub struct IntervalRegistry {
    registered: bool,
}

impl IntervalRegistry {
    /// A registry that has not yet registered anything.
    pub fn new() -> Self {
        Self::default()
    }

    /// The intervals to register, or `None` if this registry already did.
    pub fn register(&mut self) -> Option<BTreeMap<String, Interval>> {
        if self.registered {
            return None;
        }
        self.registered = true;
        Some(custom_intervals())
    }

    /// Whether [`register`](Self::register) has already handed out intervals.
    pub fn is_registered(&self) -> bool {
        self.registered
    }
}
