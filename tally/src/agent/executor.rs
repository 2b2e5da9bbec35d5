use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use unicode_segmentation::UnicodeSegmentation;

use crate::config::DomainConfig;
use crate::error::{Result, TallyError};
use crate::models::{
    keys, ConversationTurn, Entities, EntityValue, ExecutionResult, Intent, NewPayment, Outcome,
    ParsedCommand, PaymentChanges, RagContext, Role,
};
use crate::parser::classify;
use crate::rag::{RagContextService, SessionContext};
use crate::services::PaymentDomain;

use super::responses;

/// A handled command plus the payment it was about, if exactly one.
struct Handled {
    result: ExecutionResult,
    subject: Option<String>,
}

impl Handled {
    fn ok(intent: Intent, message: String, data: serde_json::Value, subject: Option<String>) -> Self {
        Self {
            result: ExecutionResult::success(intent, message, Some(data)),
            subject,
        }
    }

    fn failed(intent: Intent, outcome: Outcome, message: String) -> Self {
        Self {
            result: ExecutionResult::failure(Some(intent), outcome, message),
            subject: None,
        }
    }
}

/// Dispatches parsed commands to the payment domain and records each
/// exchange in the session.
#[derive(Clone)]
pub struct AgentExecutor {
    domain: Arc<dyn PaymentDomain>,
    rag: RagContextService,
    upcoming_days: u32,
}

impl AgentExecutor {
    pub fn new(domain: Arc<dyn PaymentDomain>, rag: RagContextService, config: &DomainConfig) -> Self {
        Self {
            domain,
            rag,
            upcoming_days: config.upcoming_days,
        }
    }

    /// Run one command for the session's user. Never fails; every outcome is
    /// reported in the result and the exchange is appended to the session.
    pub async fn execute(
        &self,
        command: &ParsedCommand,
        context: &RagContext,
        session: &mut SessionContext,
    ) -> ExecutionResult {
        let user_id = session.user_id().to_string();
        let handled = self.dispatch(&user_id, command, context).await;

        tracing::info!(
            user_id = %user_id,
            intent = %command.intent,
            outcome = ?handled.result.outcome,
            source = ?command.source,
            "Executed command"
        );

        self.remember(session, command, &handled).await;
        handled.result
    }

    async fn dispatch(&self, user_id: &str, command: &ParsedCommand, context: &RagContext) -> Handled {
        let intent = command.intent;

        let missing = command.missing_fields();
        if !missing.is_empty() {
            return Handled::failed(
                intent,
                Outcome::ValidationFailure,
                responses::missing_fields(intent, &missing),
            );
        }

        let handled = match intent {
            Intent::Create => self.create(user_id, command).await,
            Intent::Read => self.read(user_id, command, context).await,
            Intent::Update => self.update(user_id, command, context).await,
            Intent::Delete => self.delete(user_id, command, context).await,
            Intent::Summary => self.summary(user_id).await,
            Intent::Upcoming => self.upcoming(user_id, command).await,
            Intent::Convert => self.convert(user_id, command, context).await,
            Intent::Pause => self.set_active(user_id, command, context, false).await,
            Intent::Resume => self.set_active(user_id, command, context, true).await,
            Intent::Unknown => {
                return Handled::failed(intent, Outcome::Clarification, responses::help());
            }
        };

        handled.unwrap_or_else(|e| failure(intent, e))
    }

    async fn create(&self, user_id: &str, command: &ParsedCommand) -> Result<Handled> {
        let payment = new_payment(command)?;
        let record = self.domain.create(user_id, payment).await?;
        Ok(Handled::ok(
            Intent::Create,
            responses::created(&record),
            to_data(&record)?,
            Some(record.name),
        ))
    }

    async fn read(&self, user_id: &str, command: &ParsedCommand, context: &RagContext) -> Result<Handled> {
        if command.name().is_none() && command.reference().is_none() {
            let records = self.domain.list(user_id).await?;
            return Ok(Handled::ok(
                Intent::Read,
                responses::listed(&records),
                to_data(&records)?,
                None,
            ));
        }

        let name = target(command, context)?;
        let record = self.domain.get_by_name(user_id, &name).await?;
        Ok(Handled::ok(
            Intent::Read,
            responses::found(&record),
            to_data(&record)?,
            Some(record.name),
        ))
    }

    async fn update(&self, user_id: &str, command: &ParsedCommand, context: &RagContext) -> Result<Handled> {
        let name = target(command, context)?;
        let changes = changes(command)?;
        let record = self.domain.update(user_id, &name, changes).await?;
        Ok(Handled::ok(
            Intent::Update,
            responses::updated(&record),
            to_data(&record)?,
            Some(record.name),
        ))
    }

    async fn delete(&self, user_id: &str, command: &ParsedCommand, context: &RagContext) -> Result<Handled> {
        let name = target(command, context)?;
        let record = self.domain.delete(user_id, &name).await?;
        Ok(Handled::ok(
            Intent::Delete,
            responses::deleted(&record),
            to_data(&record)?,
            Some(record.name),
        ))
    }

    async fn summary(&self, user_id: &str) -> Result<Handled> {
        let summary = self.domain.summarize(user_id).await?;
        Ok(Handled::ok(
            Intent::Summary,
            responses::summary(&summary),
            to_data(&summary)?,
            None,
        ))
    }

    async fn upcoming(&self, user_id: &str, command: &ParsedCommand) -> Result<Handled> {
        let days = match command.number(keys::DAYS) {
            Some(days) => whole(keys::DAYS, days)?,
            None => self.upcoming_days,
        };
        let records = self.domain.upcoming(user_id, days).await?;
        Ok(Handled::ok(
            Intent::Upcoming,
            responses::upcoming(&records, days),
            to_data(&records)?,
            None,
        ))
    }

    async fn convert(&self, user_id: &str, command: &ParsedCommand, context: &RagContext) -> Result<Handled> {
        let name = target(command, context)?;
        let changes = PaymentChanges {
            payment_type: command.payment_type(),
            ..Default::default()
        };
        let record = self.domain.update(user_id, &name, changes).await?;
        Ok(Handled::ok(
            Intent::Convert,
            responses::converted(&record),
            to_data(&record)?,
            Some(record.name),
        ))
    }

    async fn set_active(
        &self,
        user_id: &str,
        command: &ParsedCommand,
        context: &RagContext,
        active: bool,
    ) -> Result<Handled> {
        let name = target(command, context)?;
        let record = self.domain.set_active(user_id, &name, active).await?;
        let (intent, message) = if active {
            (Intent::Resume, responses::resumed(&record))
        } else {
            (Intent::Pause, responses::paused(&record))
        };
        Ok(Handled::ok(intent, message, to_data(&record)?, Some(record.name)))
    }

    /// Append the user/assistant pair. The payment the exchange was about is
    /// stored as the `name` entity on both turns so later anaphors find it.
    async fn remember(&self, session: &mut SessionContext, command: &ParsedCommand, handled: &Handled) {
        let user_id = session.user_id().to_string();
        let session_id = session.session_id().to_string();

        let mut user_entities = command.entities.clone();
        let mut reply_entities = Entities::new();
        if let Some(subject) = &handled.subject {
            user_entities.insert(keys::NAME.to_string(), EntityValue::from(subject.as_str()));
            reply_entities.insert(keys::NAME.to_string(), EntityValue::from(subject.as_str()));
        }

        let question = ConversationTurn::new(
            &session_id,
            &user_id,
            Role::User,
            command.raw_input.clone(),
            user_entities,
        );
        let answer = ConversationTurn::new(
            &session_id,
            &user_id,
            Role::Assistant,
            handled.result.message.clone(),
            reply_entities,
        );

        self.rag.record_turn(session, question).await;
        self.rag.record_turn(session, answer).await;
    }
}

/// The payment a command acts on: its explicit name, else whatever its
/// anaphor resolved to.
fn target(command: &ParsedCommand, context: &RagContext) -> Result<String> {
    if let Some(name) = command.name() {
        return Ok(name.to_string());
    }
    match command.reference() {
        Some(reference) => Ok(context.resolve(reference)?.value.clone()),
        None => Err(TallyError::Validation("Which payment do you mean?".to_string())),
    }
}

fn failure(intent: Intent, error: TallyError) -> Handled {
    if error.is_domain_error() {
        tracing::debug!(intent = %intent, error = %error, "Command rejected");
    }
    match error {
        TallyError::NotFound(message) => Handled::failed(intent, Outcome::NotFound, message),
        TallyError::Validation(message) => {
            Handled::failed(intent, Outcome::ValidationFailure, message)
        }
        TallyError::Schedule(e) => Handled::failed(intent, Outcome::ValidationFailure, e.to_string()),
        TallyError::AmbiguousReference(reference) => {
            Handled::failed(intent, Outcome::Clarification, responses::clarify(&reference))
        }
        e => {
            tracing::error!(intent = %intent, error = %e, "Command failed");
            Handled::failed(intent, Outcome::Error, responses::try_again())
        }
    }
}

fn to_data<T: Serialize>(value: &T) -> Result<serde_json::Value> {
    Ok(serde_json::to_value(value)?)
}

fn whole(key: &str, value: f64) -> Result<u32> {
    if value.fract() != 0.0 || value < 0.0 || value > f64::from(u32::MAX) {
        return Err(TallyError::Validation(format!(
            "{} must be a whole number, got {value}",
            key.replace('_', " ")
        )));
    }
    Ok(value as u32)
}

fn date(command: &ParsedCommand, key: &str) -> Result<Option<NaiveDate>> {
    command
        .text(key)
        .map(|raw| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
                TallyError::Validation(format!("{} '{raw}' is not a YYYY-MM-DD date", key.replace('_', " ")))
            })
        })
        .transpose()
}

fn count(command: &ParsedCommand, key: &str) -> Result<Option<u32>> {
    command.number(key).map(|n| whole(key, n)).transpose()
}

fn new_payment(command: &ParsedCommand) -> Result<NewPayment> {
    let name = command
        .name()
        .ok_or_else(|| TallyError::Validation("A payment needs a name".to_string()))?;
    let amount = command
        .number(keys::AMOUNT)
        .ok_or_else(|| TallyError::Validation("A payment needs an amount".to_string()))?;

    let payment_type = command.payment_type().unwrap_or_else(|| {
        let words: Vec<String> = command.raw_input.unicode_words().map(str::to_lowercase).collect();
        classify(&words)
    });

    Ok(NewPayment {
        name: name.to_string(),
        amount,
        currency: command.text(keys::CURRENCY).map(str::to_uppercase),
        payment_type,
        frequency: command.frequency().unwrap_or_default(),
        frequency_interval: count(command, keys::FREQUENCY_INTERVAL)?.unwrap_or(1),
        start_date: date(command, keys::START_DATE)?,
        end_date: date(command, keys::END_DATE)?,
        total_owed: command.number(keys::TOTAL_OWED),
        remaining_balance: command.number(keys::REMAINING_BALANCE),
        creditor: command.text(keys::CREDITOR).map(str::to_string),
        target_amount: command.number(keys::TARGET_AMOUNT),
        current_saved: command.number(keys::CURRENT_SAVED),
        recipient: command.text(keys::RECIPIENT).map(str::to_string),
        total_installments: count(command, keys::TOTAL_INSTALLMENTS)?,
    })
}

fn changes(command: &ParsedCommand) -> Result<PaymentChanges> {
    Ok(PaymentChanges {
        amount: command.number(keys::AMOUNT),
        currency: command.text(keys::CURRENCY).map(str::to_uppercase),
        payment_type: command.payment_type(),
        frequency: command.frequency(),
        frequency_interval: count(command, keys::FREQUENCY_INTERVAL)?,
        end_date: date(command, keys::END_DATE)?,
        total_owed: command.number(keys::TOTAL_OWED),
        remaining_balance: command.number(keys::REMAINING_BALANCE),
        target_amount: command.number(keys::TARGET_AMOUNT),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        EntityKind, Frequency, ParseSource, PaymentRecord, PaymentSummary, PaymentType,
        ResolvedEntity,
    };
    use crate::test_support;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records every call; answers from a canned record.
    #[derive(Default)]
    struct SpyDomain {
        calls: Mutex<Vec<String>>,
        fail_with: Mutex<Option<TallyError>>,
    }

    impl SpyDomain {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) -> Result<()> {
            self.calls.lock().unwrap().push(call);
            match self.fail_with.lock().unwrap().take() {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }
    }

    fn record(name: &str) -> PaymentRecord {
        PaymentRecord::new(
            "p1".to_string(),
            "u1".to_string(),
            name.to_string(),
            15.99,
            "GBP".to_string(),
            NaiveDate::from_ymd_opt(2025, 4, 1).unwrap(),
        )
    }

    #[async_trait]
    impl PaymentDomain for SpyDomain {
        async fn create(&self, _user_id: &str, payment: NewPayment) -> Result<PaymentRecord> {
            self.record(format!("create {} {} {}", payment.name, payment.payment_type, payment.frequency))?;
            let mut created = record(&payment.name);
            created.payment_type = payment.payment_type;
            Ok(created)
        }

        async fn get_by_name(&self, _user_id: &str, name: &str) -> Result<PaymentRecord> {
            self.record(format!("get {name}"))?;
            Ok(record(name))
        }

        async fn list(&self, _user_id: &str) -> Result<Vec<PaymentRecord>> {
            self.record("list".to_string())?;
            Ok(vec![record("Netflix")])
        }

        async fn update(&self, _user_id: &str, name: &str, changes: PaymentChanges) -> Result<PaymentRecord> {
            self.record(format!("update {name} {}", serde_json::to_string(&changes).unwrap()))?;
            let mut updated = record(name);
            if let Some(payment_type) = changes.payment_type {
                updated.payment_type = payment_type;
            }
            Ok(updated)
        }

        async fn delete(&self, _user_id: &str, name: &str) -> Result<PaymentRecord> {
            self.record(format!("delete {name}"))?;
            Ok(record(name))
        }

        async fn set_active(&self, _user_id: &str, name: &str, active: bool) -> Result<PaymentRecord> {
            self.record(format!("set_active {name} {active}"))?;
            let mut changed = record(name);
            changed.is_active = active;
            Ok(changed)
        }

        async fn summarize(&self, _user_id: &str) -> Result<PaymentSummary> {
            self.record("summarize".to_string())?;
            Ok(PaymentSummary {
                active_count: 0,
                paused_count: 0,
                monthly_total: 0.0,
                yearly_total: 0.0,
                currency: "GBP".to_string(),
                by_type: Vec::new(),
                total_debt_remaining: 0.0,
                total_saved: 0.0,
            })
        }

        async fn upcoming(&self, _user_id: &str, days: u32) -> Result<Vec<PaymentRecord>> {
            self.record(format!("upcoming {days}"))?;
            Ok(Vec::new())
        }

        async fn record_payment(&self, _user_id: &str, name: &str, _amount: Option<f64>) -> Result<PaymentRecord> {
            self.record(format!("record_payment {name}"))?;
            Ok(record(name))
        }
    }

    fn executor(domain: Arc<SpyDomain>) -> AgentExecutor {
        AgentExecutor::new(domain, test_support::rag(), &DomainConfig::default())
    }

    fn command(intent: Intent, text: &str) -> ParsedCommand {
        ParsedCommand::new(intent, text, 1.0, ParseSource::Ai)
    }

    fn context_with(anaphor: &str, name: &str) -> RagContext {
        let mut context = RagContext::default();
        context.resolved_entities.insert(
            anaphor.to_string(),
            ResolvedEntity {
                kind: EntityKind::Payment,
                value: name.to_string(),
                source_turn_id: "t1".to_string(),
            },
        );
        context
    }

    #[tokio::test]
    async fn test_create_calls_domain_once_and_records_turns() {
        let domain = Arc::new(SpyDomain::default());
        let executor = executor(domain.clone());
        let mut session = SessionContext::new("u1", "s1", 20);

        let command = command(Intent::Create, "Add Netflix £15.99 monthly")
            .with(keys::NAME, "Netflix")
            .with(keys::AMOUNT, 15.99)
            .with(keys::FREQUENCY, "monthly");

        let result = executor.execute(&command, &RagContext::default(), &mut session).await;

        assert!(result.success);
        assert_eq!(result.outcome, Outcome::Success);
        assert_eq!(domain.calls(), vec!["create Netflix subscription monthly"]);

        let turns = session.turns();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[1].role, Role::Assistant);
        assert_eq!(turns[1].mentioned_payment(), Some("Netflix"));
    }

    #[tokio::test]
    async fn test_create_without_type_is_classified_from_text() {
        let domain = Arc::new(SpyDomain::default());
        let executor = executor(domain.clone());
        let mut session = SessionContext::new("u1", "s1", 20);

        let command = command(Intent::Create, "add car insurance £40")
            .with(keys::NAME, "Car Insurance")
            .with(keys::AMOUNT, 40.0);
        executor.execute(&command, &RagContext::default(), &mut session).await;

        assert_eq!(domain.calls(), vec!["create Car Insurance insurance monthly"]);
    }

    #[tokio::test]
    async fn test_missing_fields_never_reach_domain() {
        let domain = Arc::new(SpyDomain::default());
        let executor = executor(domain.clone());
        let mut session = SessionContext::new("u1", "s1", 20);

        let command = command(Intent::Create, "add something").with(keys::NAME, "Something");
        let result = executor.execute(&command, &RagContext::default(), &mut session).await;

        assert!(!result.success);
        assert_eq!(result.outcome, Outcome::ValidationFailure);
        assert!(domain.calls().is_empty());
        // Failed executions are still remembered.
        assert_eq!(session.len(), 2);
    }

    #[tokio::test]
    async fn test_reference_resolves_through_context() {
        let domain = Arc::new(SpyDomain::default());
        let executor = executor(domain.clone());
        let mut session = SessionContext::new("u1", "s1", 20);

        let command = command(Intent::Delete, "cancel it").with(keys::REFERENCE, "it");
        let result = executor
            .execute(&command, &context_with("it", "Netflix"), &mut session)
            .await;

        assert!(result.success);
        assert_eq!(domain.calls(), vec!["delete Netflix"]);
        assert_eq!(session.turns()[0].mentioned_payment(), Some("Netflix"));
    }

    #[tokio::test]
    async fn test_unresolved_reference_asks_for_clarification() {
        let domain = Arc::new(SpyDomain::default());
        let executor = executor(domain.clone());
        let mut session = SessionContext::new("u1", "s1", 20);

        let command = command(Intent::Pause, "pause that").with(keys::REFERENCE, "that");
        let result = executor.execute(&command, &RagContext::default(), &mut session).await;

        assert_eq!(result.outcome, Outcome::Clarification);
        assert!(result.message.contains("\"that\""));
        assert!(domain.calls().is_empty());
    }

    #[tokio::test]
    async fn test_domain_errors_map_to_outcomes() {
        let domain = Arc::new(SpyDomain::default());
        let executor = executor(domain.clone());
        let mut session = SessionContext::new("u1", "s1", 20);
        let command = command(Intent::Delete, "delete hulu").with(keys::NAME, "Hulu");

        *domain.fail_with.lock().unwrap() = Some(TallyError::NotFound("No payment called 'Hulu'".to_string()));
        let result = executor.execute(&command, &RagContext::default(), &mut session).await;
        assert_eq!(result.outcome, Outcome::NotFound);
        assert_eq!(result.message, "No payment called 'Hulu'");

        *domain.fail_with.lock().unwrap() = Some(TallyError::Internal("disk gone".to_string()));
        let result = executor.execute(&command, &RagContext::default(), &mut session).await;
        assert_eq!(result.outcome, Outcome::Error);
        assert!(!result.message.contains("disk"));
    }

    #[tokio::test]
    async fn test_read_without_target_lists() {
        let domain = Arc::new(SpyDomain::default());
        let executor = executor(domain.clone());
        let mut session = SessionContext::new("u1", "s1", 20);

        let result = executor
            .execute(&command(Intent::Read, "show my payments"), &RagContext::default(), &mut session)
            .await;

        assert!(result.success);
        assert_eq!(domain.calls(), vec!["list"]);
        assert!(result.data.unwrap().is_array());
    }

    #[tokio::test]
    async fn test_upcoming_defaults_to_configured_days() {
        let domain = Arc::new(SpyDomain::default());
        let executor = executor(domain.clone());
        let mut session = SessionContext::new("u1", "s1", 20);

        executor
            .execute(&command(Intent::Upcoming, "what's due"), &RagContext::default(), &mut session)
            .await;
        let explicit = command(Intent::Upcoming, "next 30 days").with(keys::DAYS, 30.0);
        executor.execute(&explicit, &RagContext::default(), &mut session).await;

        assert_eq!(domain.calls(), vec!["upcoming 7", "upcoming 30"]);
    }

    #[tokio::test]
    async fn test_convert_only_changes_type() {
        let domain = Arc::new(SpyDomain::default());
        let executor = executor(domain.clone());
        let mut session = SessionContext::new("u1", "s1", 20);

        let command = command(Intent::Convert, "make gym a debt")
            .with(keys::NAME, "Gym")
            .with(keys::PAYMENT_TYPE, "debt");
        let result = executor.execute(&command, &RagContext::default(), &mut session).await;

        assert_eq!(result.intent, Some(Intent::Convert));
        assert_eq!(domain.calls(), vec![r#"update Gym {"payment_type":"debt"}"#]);
    }

    #[tokio::test]
    async fn test_pause_and_resume() {
        let domain = Arc::new(SpyDomain::default());
        let executor = executor(domain.clone());
        let mut session = SessionContext::new("u1", "s1", 20);

        let pause = command(Intent::Pause, "pause spotify").with(keys::NAME, "Spotify");
        let resume = command(Intent::Resume, "resume spotify").with(keys::NAME, "Spotify");
        executor.execute(&pause, &RagContext::default(), &mut session).await;
        executor.execute(&resume, &RagContext::default(), &mut session).await;

        assert_eq!(domain.calls(), vec!["set_active Spotify false", "set_active Spotify true"]);
    }

    #[tokio::test]
    async fn test_unknown_gets_help_without_domain_call() {
        let domain = Arc::new(SpyDomain::default());
        let executor = executor(domain.clone());
        let mut session = SessionContext::new("u1", "s1", 20);

        let result = executor
            .execute(&command(Intent::Unknown, "blorp"), &RagContext::default(), &mut session)
            .await;

        assert_eq!(result.outcome, Outcome::Clarification);
        assert!(result.message.contains("Add Netflix"));
        assert!(domain.calls().is_empty());
    }

    #[test]
    fn test_fractional_interval_rejected() {
        let command = command(Intent::Create, "x")
            .with(keys::NAME, "X")
            .with(keys::AMOUNT, 1.0)
            .with(keys::FREQUENCY_INTERVAL, 1.5);
        assert!(matches!(new_payment(&command), Err(TallyError::Validation(_))));
    }

    #[test]
    fn test_new_payment_reads_ledgers_and_dates() {
        let command = command(Intent::Create, "x")
            .with(keys::NAME, "Visa")
            .with(keys::AMOUNT, 200.0)
            .with(keys::PAYMENT_TYPE, "debt")
            .with(keys::FREQUENCY, "weekly")
            .with(keys::TOTAL_OWED, 5000.0)
            .with(keys::START_DATE, "2025-05-01")
            .with(keys::CURRENCY, "usd");

        let payment = new_payment(&command).unwrap();
        assert_eq!(payment.payment_type, PaymentType::Debt);
        assert_eq!(payment.frequency, Frequency::Weekly);
        assert_eq!(payment.total_owed, Some(5000.0));
        assert_eq!(payment.currency.as_deref(), Some("USD"));
        assert_eq!(payment.start_date, NaiveDate::from_ymd_opt(2025, 5, 1));
    }
}
