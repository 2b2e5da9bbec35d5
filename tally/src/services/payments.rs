use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Days, NaiveDate, Utc};
use nanoid::nanoid;

use crate::db::PaymentStore;
use crate::error::{Result, TallyError};
use crate::models::{
    NewPayment, PaymentChanges, PaymentRecord, PaymentSummary, PaymentType, TypeBreakdown,
};
use crate::scheduler::{self, ScheduleError};

/// Operations the command executor may perform on a user's payments.
///
/// Every method is scoped by `user_id`; a payment owned by someone else is
/// indistinguishable from one that does not exist. Payments are addressed by
/// name, matched case-insensitively.
#[async_trait]
pub trait PaymentDomain: Send + Sync {
    async fn create(&self, user_id: &str, payment: NewPayment) -> Result<PaymentRecord>;
    async fn get_by_name(&self, user_id: &str, name: &str) -> Result<PaymentRecord>;
    async fn list(&self, user_id: &str) -> Result<Vec<PaymentRecord>>;
    async fn update(
        &self,
        user_id: &str,
        name: &str,
        changes: PaymentChanges,
    ) -> Result<PaymentRecord>;
    /// Returns the record as it was before deletion.
    async fn delete(&self, user_id: &str, name: &str) -> Result<PaymentRecord>;
    async fn set_active(&self, user_id: &str, name: &str, active: bool) -> Result<PaymentRecord>;
    async fn summarize(&self, user_id: &str) -> Result<PaymentSummary>;
    /// Active payments due within the next `days` days, soonest first.
    async fn upcoming(&self, user_id: &str, days: u32) -> Result<Vec<PaymentRecord>>;
    /// Mark the current due date as paid and advance the schedule. Debts and
    /// savings goals also move their ledgers by `amount` (default: the
    /// regular payment amount).
    async fn record_payment(
        &self,
        user_id: &str,
        name: &str,
        amount: Option<f64>,
    ) -> Result<PaymentRecord>;
}

type Clock = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

/// Default [`PaymentDomain`] over a [`PaymentStore`], with the scheduling
/// rules from [`crate::scheduler`].
#[derive(Clone)]
pub struct PaymentService {
    store: Arc<dyn PaymentStore>,
    default_currency: String,
    today: Clock,
}

impl PaymentService {
    pub fn new(store: Arc<dyn PaymentStore>, default_currency: &str) -> Self {
        Self {
            store,
            default_currency: default_currency.to_uppercase(),
            today: Arc::new(|| Utc::now().date_naive()),
        }
    }

    /// Pin "today" for deterministic schedules.
    pub fn with_clock(mut self, today: impl Fn() -> NaiveDate + Send + Sync + 'static) -> Self {
        self.today = Arc::new(today);
        self
    }

    fn today(&self) -> NaiveDate {
        (self.today)()
    }

    async fn require(&self, user_id: &str, name: &str) -> Result<PaymentRecord> {
        self.store
            .find_payment_by_name(user_id, name)
            .await?
            .ok_or_else(|| TallyError::NotFound(format!("No payment called '{}'", name.trim())))
    }

    fn build_record(&self, user_id: &str, payment: NewPayment) -> Result<PaymentRecord> {
        let name = payment.name.trim();
        if name.is_empty() {
            return Err(TallyError::Validation("A payment needs a name".to_string()));
        }
        check_amount(payment.amount)?;

        let today = self.today();
        let start = payment.start_date.unwrap_or(today);
        let next = scheduler::initial_next_payment_date(
            start,
            payment.frequency,
            payment.frequency_interval,
            today,
        )?;

        let currency = payment
            .currency
            .map(|c| c.trim().to_uppercase())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| self.default_currency.clone());

        let mut record = PaymentRecord::new(
            nanoid!(),
            user_id.to_string(),
            name.to_string(),
            payment.amount,
            currency,
            start,
        );
        record.payment_type = payment.payment_type;
        record.frequency = payment.frequency;
        record.frequency_interval = payment.frequency_interval;
        record.next_payment_date = next;
        record.end_date = payment.end_date;

        record.total_owed = payment.total_owed;
        record.remaining_balance = payment.remaining_balance.or(payment.total_owed);
        record.creditor = payment.creditor;

        record.target_amount = payment.target_amount;
        record.current_saved = payment.current_saved.or(match payment.payment_type {
            PaymentType::Savings => Some(0.0),
            _ => None,
        });
        record.recipient = payment.recipient;

        record.total_installments = payment.total_installments;
        record.completed_installments = payment.total_installments.map(|_| 0);

        validate_ledgers(&record)?;
        Ok(record)
    }

    fn apply_changes(&self, record: &mut PaymentRecord, changes: PaymentChanges) -> Result<()> {
        let reschedule = changes.frequency.is_some() || changes.frequency_interval.is_some();

        if let Some(name) = changes.name.map(|n| n.trim().to_string()) {
            if name.is_empty() {
                return Err(TallyError::Validation("A payment needs a name".to_string()));
            }
            record.name = name;
        }
        if let Some(amount) = changes.amount {
            check_amount(amount)?;
            record.amount = amount;
        }
        if let Some(currency) = changes.currency {
            record.currency = currency.trim().to_uppercase();
        }
        if let Some(payment_type) = changes.payment_type {
            record.payment_type = payment_type;
            if payment_type == PaymentType::Savings && record.current_saved.is_none() {
                record.current_saved = Some(0.0);
            }
        }
        if let Some(frequency) = changes.frequency {
            record.frequency = frequency;
        }
        if let Some(interval) = changes.frequency_interval {
            record.frequency_interval = interval;
        }
        if let Some(end_date) = changes.end_date {
            record.end_date = Some(end_date);
        }
        if let Some(active) = changes.is_active {
            record.is_active = active;
        }
        if let Some(total_owed) = changes.total_owed {
            record.total_owed = Some(total_owed);
            if record.remaining_balance.is_none() {
                record.remaining_balance = Some(total_owed);
            }
        }
        if let Some(remaining) = changes.remaining_balance {
            record.remaining_balance = Some(remaining);
        }
        if let Some(target) = changes.target_amount {
            record.target_amount = Some(target);
        }

        if reschedule {
            record.next_payment_date = scheduler::initial_next_payment_date(
                record.start_date,
                record.frequency,
                record.frequency_interval,
                self.today(),
            )?;
        }

        validate_ledgers(record)
    }
}

fn check_amount(amount: f64) -> Result<()> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(ScheduleError::NegativeAmount(amount).into());
    }
    Ok(())
}

fn validate_ledgers(record: &PaymentRecord) -> Result<()> {
    for value in [
        record.total_owed,
        record.remaining_balance,
        record.target_amount,
        record.current_saved,
    ]
    .into_iter()
    .flatten()
    {
        check_amount(value)?;
    }

    if let (Some(total), Some(remaining)) = (record.total_owed, record.remaining_balance) {
        if remaining > total {
            return Err(TallyError::Validation(format!(
                "Remaining balance {remaining:.2} cannot exceed the total owed {total:.2}"
            )));
        }
    }

    if let (Some(total), Some(completed)) =
        (record.total_installments, record.completed_installments)
    {
        if total == 0 {
            return Err(TallyError::Validation(
                "An installment plan needs at least one installment".to_string(),
            ));
        }
        if completed > total {
            return Err(TallyError::Validation(format!(
                "{completed} installments completed out of {total}"
            )));
        }
    }

    Ok(())
}

#[async_trait]
impl PaymentDomain for PaymentService {
    async fn create(&self, user_id: &str, payment: NewPayment) -> Result<PaymentRecord> {
        if let Some(existing) = self
            .store
            .find_payment_by_name(user_id, &payment.name)
            .await?
        {
            return Err(TallyError::Validation(format!(
                "You already have a payment called '{}'",
                existing.name
            )));
        }

        let record = self.build_record(user_id, payment)?;
        self.store.insert_payment(&record).await?;
        tracing::info!(
            user_id,
            payment_id = %record.id,
            payment_type = %record.payment_type,
            "Payment created"
        );
        Ok(record)
    }

    async fn get_by_name(&self, user_id: &str, name: &str) -> Result<PaymentRecord> {
        self.require(user_id, name).await
    }

    async fn list(&self, user_id: &str) -> Result<Vec<PaymentRecord>> {
        self.store.list_payments(user_id).await
    }

    async fn update(
        &self,
        user_id: &str,
        name: &str,
        changes: PaymentChanges,
    ) -> Result<PaymentRecord> {
        if changes.is_empty() {
            return Err(TallyError::Validation("Nothing to change".to_string()));
        }

        let mut record = self.require(user_id, name).await?;
        if let Some(new_name) = changes.name.as_deref() {
            if !new_name.trim().eq_ignore_ascii_case(&record.name) {
                if let Some(clash) = self.store.find_payment_by_name(user_id, new_name).await? {
                    return Err(TallyError::Validation(format!(
                        "You already have a payment called '{}'",
                        clash.name
                    )));
                }
            }
        }

        self.apply_changes(&mut record, changes)?;
        record.updated_at = Utc::now();
        self.store.save_payment(&record).await?;
        tracing::info!(user_id, payment_id = %record.id, "Payment updated");
        Ok(record)
    }

    async fn delete(&self, user_id: &str, name: &str) -> Result<PaymentRecord> {
        let record = self.require(user_id, name).await?;
        if !self.store.delete_payment(user_id, &record.id).await? {
            return Err(TallyError::NotFound(format!(
                "No payment called '{}'",
                name.trim()
            )));
        }
        tracing::info!(user_id, payment_id = %record.id, "Payment deleted");
        Ok(record)
    }

    async fn set_active(&self, user_id: &str, name: &str, active: bool) -> Result<PaymentRecord> {
        let mut record = self.require(user_id, name).await?;
        if record.is_active == active {
            return Ok(record);
        }

        record.is_active = active;
        if active {
            let today = self.today();
            if record.next_payment_date <= today {
                record.next_payment_date = scheduler::compute_next_payment_date(
                    record.next_payment_date,
                    record.frequency,
                    record.frequency_interval,
                    today,
                )?;
            }
        }
        record.updated_at = Utc::now();
        self.store.save_payment(&record).await?;
        tracing::info!(user_id, payment_id = %record.id, active, "Payment active state changed");
        Ok(record)
    }

    async fn summarize(&self, user_id: &str) -> Result<PaymentSummary> {
        let records = self.store.list_payments(user_id).await?;

        let mut by_type: BTreeMap<usize, TypeBreakdown> = BTreeMap::new();
        let mut currencies: BTreeMap<&str, usize> = BTreeMap::new();
        let mut monthly_total = 0.0;
        let mut active_count = 0;

        for record in records.iter().filter(|r| r.is_active) {
            active_count += 1;
            *currencies.entry(record.currency.as_str()).or_default() += 1;

            let monthly = if record.payment_type == PaymentType::OneTime {
                0.0
            } else {
                scheduler::monthly_equivalent(
                    record.amount,
                    record.frequency,
                    record.frequency_interval,
                )
            };
            monthly_total += monthly;

            let position = PaymentType::ALL
                .iter()
                .position(|t| *t == record.payment_type)
                .unwrap_or(0);
            let entry = by_type.entry(position).or_insert(TypeBreakdown {
                payment_type: record.payment_type,
                count: 0,
                monthly_total: 0.0,
            });
            entry.count += 1;
            entry.monthly_total += monthly;
        }

        let currency = currencies
            .into_iter()
            .max_by_key(|(_, count)| *count)
            .map(|(currency, _)| currency.to_string())
            .unwrap_or_else(|| self.default_currency.clone());

        Ok(PaymentSummary {
            active_count,
            paused_count: records.len() - active_count,
            monthly_total,
            yearly_total: monthly_total * 12.0,
            currency,
            by_type: by_type.into_values().collect(),
            total_debt_remaining: records.iter().filter_map(|r| r.remaining_balance).sum(),
            total_saved: records.iter().filter_map(|r| r.current_saved).sum(),
        })
    }

    async fn upcoming(&self, user_id: &str, days: u32) -> Result<Vec<PaymentRecord>> {
        let today = self.today();
        let horizon = today
            .checked_add_days(Days::new(u64::from(days)))
            .ok_or(ScheduleError::DateOverflow(today))?;

        // Stored dates only move when a payment is recorded, so a missed due
        // date is rolled forward to its next occurrence first.
        let mut due = Vec::new();
        for mut record in self.store.list_payments(user_id).await? {
            if !record.is_active {
                continue;
            }
            record.next_payment_date = scheduler::roll_forward(
                record.next_payment_date,
                record.frequency,
                record.frequency_interval,
                today,
            )?;
            let date = record.next_payment_date;
            if date <= horizon && record.end_date.map_or(true, |end| date <= end) {
                due.push(record);
            }
        }

        due.sort_by(|a, b| {
            a.next_payment_date
                .cmp(&b.next_payment_date)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(due)
    }

    async fn record_payment(
        &self,
        user_id: &str,
        name: &str,
        amount: Option<f64>,
    ) -> Result<PaymentRecord> {
        let mut record = self.require(user_id, name).await?;
        let amount = amount.unwrap_or(record.amount);
        let today = self.today();

        if record.is_installment_plan() {
            scheduler::apply_installment_payment(&mut record)?;
        } else {
            record.last_payment_date = Some(record.next_payment_date);
            record.next_payment_date = scheduler::compute_next_payment_date(
                record.next_payment_date,
                record.frequency,
                record.frequency_interval,
                record.next_payment_date.max(today),
            )?;
        }

        match record.payment_type {
            PaymentType::Debt if record.remaining_balance.is_some() => {
                scheduler::apply_debt_payment(&mut record, amount)?;
                if record.remaining_balance == Some(0.0) {
                    record.is_active = false;
                }
            }
            PaymentType::Savings => scheduler::apply_contribution(&mut record, amount)?,
            _ => {}
        }

        record.updated_at = Utc::now();
        self.store.save_payment(&record).await?;
        tracing::info!(user_id, payment_id = %record.id, amount, "Payment recorded");
        Ok(record)
    }
}
