use chrono::{Days, Months, NaiveDate};

use crate::models::Frequency;

/// Length of one fixed-size step in days, for frequencies that have one.
pub(super) fn step_days(frequency: Frequency, interval: u32) -> Option<u64> {
    match frequency {
        Frequency::Daily | Frequency::Custom => Some(u64::from(interval)),
        Frequency::Weekly => Some(7 * u64::from(interval)),
        Frequency::Biweekly => Some(14),
        Frequency::Monthly | Frequency::Quarterly | Frequency::Yearly => None,
    }
}

/// Calendar months per step for month-based frequencies.
pub(super) fn step_months(frequency: Frequency, interval: u32) -> Option<u32> {
    match frequency {
        Frequency::Monthly => Some(interval),
        Frequency::Quarterly => interval.checked_mul(3),
        Frequency::Yearly => interval.checked_mul(12),
        Frequency::Daily | Frequency::Weekly | Frequency::Biweekly | Frequency::Custom => None,
    }
}

/// Add whole months, clamping to the last day of the target month when the
/// day does not exist there (Jan 31 + 1 month = Feb 28/29).
pub(super) fn add_months_clamped(date: NaiveDate, months: u32) -> Option<NaiveDate> {
    date.checked_add_months(Months::new(months))
}

pub(super) fn add_days(date: NaiveDate, days: u64) -> Option<NaiveDate> {
    date.checked_add_days(Days::new(days))
}
