//! Pure scheduling arithmetic for recurring payments.
//!
//! Nothing in here performs I/O. Month-based frequencies use calendar-month
//! arithmetic with month-end clamping, and the clamp is sticky: every step is
//! taken from the previously computed date, so a plan that started on the
//! 31st and was clamped to Feb 28 continues on the 28th (Mar 28, Apr 28, ...)
//! instead of snapping back to the 31st.

mod calendar;

use chrono::{Days, NaiveDate};
use thiserror::Error;

use crate::models::{Frequency, PaymentRecord, PaymentType};

const DAYS_PER_MONTH: f64 = 365.25 / 12.0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScheduleError {
    #[error("frequency interval must be at least 1, got {0}")]
    InvalidInterval(u32),

    #[error("start date {start} is after the reference date {reference}")]
    FutureStartDate {
        start: NaiveDate,
        reference: NaiveDate,
    },

    #[error("date arithmetic overflowed from {0}")]
    DateOverflow(NaiveDate),

    #[error("amount must not be negative, got {0}")]
    NegativeAmount(f64),

    #[error("'{0}' is not an installment plan")]
    NotInstallmentPlan(String),

    #[error("all installments of '{0}' are already paid")]
    InstallmentsComplete(String),

    #[error("'{0}' has no debt balance")]
    NotDebt(String),

    #[error("'{0}' is not a savings goal")]
    NotSavingsGoal(String),
}

pub type ScheduleResult<T> = std::result::Result<T, ScheduleError>;

fn step(date: NaiveDate, frequency: Frequency, interval: u32) -> ScheduleResult<NaiveDate> {
    let stepped = match calendar::step_months(frequency, interval) {
        Some(months) => calendar::add_months_clamped(date, months),
        None => calendar::step_days(frequency, interval).and_then(|d| calendar::add_days(date, d)),
    };
    stepped.ok_or(ScheduleError::DateOverflow(date))
}

/// First due date strictly after `reference`, advancing from `start` by whole
/// frequency units. A reference equal to a due date never satisfies itself.
pub fn compute_next_payment_date(
    start: NaiveDate,
    frequency: Frequency,
    interval: u32,
    reference: NaiveDate,
) -> ScheduleResult<NaiveDate> {
    if interval < 1 {
        return Err(ScheduleError::InvalidInterval(interval));
    }
    if start > reference {
        return Err(ScheduleError::FutureStartDate { start, reference });
    }

    // Fixed-length steps can jump straight to the answer.
    if let Some(days) = calendar::step_days(frequency, interval) {
        let elapsed = (reference - start).num_days() as u64;
        let steps = elapsed / days + 1;
        return steps
            .checked_mul(days)
            .and_then(|offset| calendar::add_days(start, offset))
            .ok_or(ScheduleError::DateOverflow(start));
    }

    let mut next = start;
    loop {
        next = step(next, frequency, interval)?;
        if next > reference {
            return Ok(next);
        }
    }
}

/// Next due date for a newly created payment: the start date itself when it
/// has not happened yet, otherwise the first occurrence after `today`.
pub fn initial_next_payment_date(
    start: NaiveDate,
    frequency: Frequency,
    interval: u32,
    today: NaiveDate,
) -> ScheduleResult<NaiveDate> {
    if interval < 1 {
        return Err(ScheduleError::InvalidInterval(interval));
    }
    if start >= today {
        return Ok(start);
    }
    compute_next_payment_date(start, frequency, interval, today)
}

/// The due date as of `today`: `due` itself when it has not passed,
/// otherwise the first occurrence on or after `today` stepping from `due`.
pub fn roll_forward(
    due: NaiveDate,
    frequency: Frequency,
    interval: u32,
    today: NaiveDate,
) -> ScheduleResult<NaiveDate> {
    if due >= today {
        return Ok(due);
    }
    let yesterday = today
        .checked_sub_days(Days::new(1))
        .ok_or(ScheduleError::DateOverflow(today))?;
    compute_next_payment_date(due, frequency, interval, yesterday)
}

/// Record one paid installment. Completing the final one deactivates the
/// plan and leaves `next_payment_date` where it was.
pub fn apply_installment_payment(record: &mut PaymentRecord) -> ScheduleResult<()> {
    let total = record
        .total_installments
        .ok_or_else(|| ScheduleError::NotInstallmentPlan(record.name.clone()))?;
    let completed = record.completed_installments.unwrap_or(0);

    if completed >= total {
        return Err(ScheduleError::InstallmentsComplete(record.name.clone()));
    }

    let completed = completed + 1;
    record.completed_installments = Some(completed);
    record.last_payment_date = Some(record.next_payment_date);

    if completed == total {
        record.is_active = false;
        return Ok(());
    }

    record.next_payment_date = compute_next_payment_date(
        record.next_payment_date,
        record.frequency,
        record.frequency_interval,
        record.next_payment_date,
    )?;
    Ok(())
}

fn check_amount(amount: f64) -> ScheduleResult<()> {
    if amount.is_nan() || amount < 0.0 {
        return Err(ScheduleError::NegativeAmount(amount));
    }
    Ok(())
}

/// Reduce the outstanding balance, never below zero.
pub fn apply_debt_payment(record: &mut PaymentRecord, amount: f64) -> ScheduleResult<()> {
    check_amount(amount)?;
    let remaining = record
        .remaining_balance
        .ok_or_else(|| ScheduleError::NotDebt(record.name.clone()))?;

    record.remaining_balance = Some((remaining - amount).max(0.0));
    Ok(())
}

/// Share of the debt already repaid, or `None` when nothing was owed.
pub fn debt_paid_percentage(record: &PaymentRecord) -> Option<f64> {
    let total = record.total_owed?;
    if total == 0.0 {
        return None;
    }
    let remaining = record.remaining_balance.unwrap_or(total);
    Some((total - remaining) / total * 100.0)
}

/// Add a contribution to a savings goal. Overshooting the target is allowed.
pub fn apply_contribution(record: &mut PaymentRecord, amount: f64) -> ScheduleResult<()> {
    check_amount(amount)?;
    if record.payment_type != PaymentType::Savings && record.target_amount.is_none() {
        return Err(ScheduleError::NotSavingsGoal(record.name.clone()));
    }

    record.current_saved = Some(record.current_saved.unwrap_or(0.0) + amount);
    Ok(())
}

/// Progress towards the savings target; values above 100 mean the goal was exceeded.
pub fn savings_progress_percentage(record: &PaymentRecord) -> Option<f64> {
    let target = record.target_amount?;
    if target == 0.0 {
        return None;
    }
    Some(record.current_saved.unwrap_or(0.0) / target * 100.0)
}

/// Amount normalised to an average calendar month, for summaries.
pub fn monthly_equivalent(amount: f64, frequency: Frequency, interval: u32) -> f64 {
    let interval = f64::from(interval.max(1));
    match frequency {
        Frequency::Daily => amount * DAYS_PER_MONTH / interval,
        Frequency::Weekly => amount * 52.0 / 12.0 / interval,
        Frequency::Biweekly => amount * 26.0 / 12.0,
        Frequency::Monthly => amount / interval,
        Frequency::Quarterly => amount / (3.0 * interval),
        Frequency::Yearly => amount / (12.0 * interval),
        Frequency::Custom => amount * DAYS_PER_MONTH / interval,
    }
}
