//! Message templates, keyed by intent and outcome.

use chrono::NaiveDate;

use crate::models::{Frequency, Intent, PaymentRecord, PaymentSummary, PaymentType};
use crate::scheduler;

pub fn money(amount: f64, currency: &str) -> String {
    match currency {
        "GBP" => format!("£{amount:.2}"),
        "USD" => format!("${amount:.2}"),
        "EUR" => format!("€{amount:.2}"),
        _ => format!("{amount:.2} {currency}"),
    }
}

pub fn cadence(frequency: Frequency, interval: u32) -> String {
    let unit = match frequency {
        Frequency::Daily | Frequency::Custom => "day",
        Frequency::Weekly => "week",
        Frequency::Biweekly => return "every two weeks".to_string(),
        Frequency::Monthly => "month",
        Frequency::Quarterly => "quarter",
        Frequency::Yearly => "year",
    };
    if interval <= 1 {
        format!("every {unit}")
    } else {
        format!("every {interval} {unit}s")
    }
}

fn date(date: NaiveDate) -> String {
    date.format("%a %-d %b %Y").to_string()
}

fn type_label(payment_type: PaymentType) -> String {
    payment_type.as_str().replace('_', " ")
}

/// One line describing a payment: amount, cadence and the next due date.
pub fn describe(record: &PaymentRecord) -> String {
    let mut line = format!(
        "{}: {} {}",
        record.name,
        money(record.amount, &record.currency),
        cadence(record.frequency, record.frequency_interval)
    );

    if !record.is_active {
        line.push_str(" (paused)");
    } else {
        line.push_str(&format!(", next on {}", date(record.next_payment_date)));
    }

    match record.payment_type {
        PaymentType::Debt => {
            if let Some(remaining) = record.remaining_balance {
                line.push_str(&format!(", {} left", money(remaining, &record.currency)));
                if let Some(paid) = scheduler::debt_paid_percentage(record) {
                    line.push_str(&format!(" ({paid:.0}% paid)"));
                }
            }
        }
        PaymentType::Savings => {
            if let (Some(saved), Some(target)) = (record.current_saved, record.target_amount) {
                line.push_str(&format!(
                    ", {} of {} saved",
                    money(saved, &record.currency),
                    money(target, &record.currency)
                ));
                if let Some(progress) = scheduler::savings_progress_percentage(record) {
                    line.push_str(&format!(" ({progress:.0}%)"));
                }
            }
        }
        _ => {}
    }

    if let (Some(total), Some(done)) = (record.total_installments, record.completed_installments) {
        line.push_str(&format!(", installment {done} of {total}"));
    }

    line
}

pub fn created(record: &PaymentRecord) -> String {
    format!("Added {} as a {} payment. {}", record.name, type_label(record.payment_type), describe(record))
}

pub fn found(record: &PaymentRecord) -> String {
    describe(record)
}

pub fn listed(records: &[PaymentRecord]) -> String {
    if records.is_empty() {
        return "You don't have any payments yet.".to_string();
    }
    let lines: Vec<String> = records.iter().map(|r| format!("- {}", describe(r))).collect();
    format!("You have {} payments:\n{}", records.len(), lines.join("\n"))
}

pub fn updated(record: &PaymentRecord) -> String {
    format!("Updated {}. {}", record.name, describe(record))
}

pub fn deleted(record: &PaymentRecord) -> String {
    format!("Deleted {}.", record.name)
}

pub fn converted(record: &PaymentRecord) -> String {
    format!("{} is now a {} payment.", record.name, type_label(record.payment_type))
}

pub fn paused(record: &PaymentRecord) -> String {
    format!("Paused {}. It won't count towards your totals until you resume it.", record.name)
}

pub fn resumed(record: &PaymentRecord) -> String {
    format!("Resumed {}. Next payment on {}.", record.name, date(record.next_payment_date))
}

pub fn summary(summary: &PaymentSummary) -> String {
    if summary.active_count == 0 && summary.paused_count == 0 {
        return "You don't have any payments yet.".to_string();
    }

    let currency = summary.currency.as_str();
    let mut lines = vec![format!(
        "{} active payments: {} a month, {} a year.",
        summary.active_count,
        money(summary.monthly_total, currency),
        money(summary.yearly_total, currency)
    )];
    for breakdown in summary.by_type.iter().filter(|b| b.count > 0) {
        lines.push(format!(
            "- {}: {} ({}/month)",
            type_label(breakdown.payment_type),
            breakdown.count,
            money(breakdown.monthly_total, currency)
        ));
    }
    if summary.paused_count > 0 {
        lines.push(format!("{} paused.", summary.paused_count));
    }
    if summary.total_debt_remaining > 0.0 {
        lines.push(format!("Debt remaining: {}.", money(summary.total_debt_remaining, currency)));
    }
    if summary.total_saved > 0.0 {
        lines.push(format!("Saved so far: {}.", money(summary.total_saved, currency)));
    }
    lines.join("\n")
}

pub fn upcoming(records: &[PaymentRecord], days: u32) -> String {
    if records.is_empty() {
        return format!("Nothing due in the next {days} days.");
    }
    let lines: Vec<String> = records
        .iter()
        .map(|r| {
            format!(
                "- {} {}: {}",
                date(r.next_payment_date),
                r.name,
                money(r.amount, &r.currency)
            )
        })
        .collect();
    format!("Due in the next {days} days:\n{}", lines.join("\n"))
}

pub fn missing_fields(intent: Intent, fields: &[&str]) -> String {
    let fields: Vec<String> = fields.iter().map(|f| f.replace('_', " ")).collect();
    let action = match intent {
        Intent::Create => "add a payment",
        Intent::Update => "update a payment",
        Intent::Convert => "change a payment's type",
        Intent::Delete => "delete a payment",
        Intent::Pause => "pause a payment",
        Intent::Resume => "resume a payment",
        Intent::Read | Intent::Summary | Intent::Upcoming | Intent::Unknown => "do that",
    };
    format!("To {action} I need the {}.", fields.join(" and "))
}

pub fn clarify(reference: &str) -> String {
    format!("I'm not sure which payment \"{reference}\" means. Could you name it?")
}

pub fn help() -> String {
    "I didn't catch that. Try \"Add Netflix £15.99 monthly\", \"What's coming up this week?\", \
     \"Pause Spotify\" or \"Show my summary\"."
        .to_string()
}

pub fn try_again() -> String {
    "Something went wrong on my side. Please try again in a moment.".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn netflix() -> PaymentRecord {
        let start = NaiveDate::from_ymd_opt(2025, 3, 15).unwrap();
        PaymentRecord::new(
            "p1".to_string(),
            "u1".to_string(),
            "Netflix".to_string(),
            15.99,
            "GBP".to_string(),
            start,
        )
    }

    #[test]
    fn test_money_uses_symbol_for_known_currencies() {
        assert_eq!(money(15.99, "GBP"), "£15.99");
        assert_eq!(money(5.0, "CHF"), "5.00 CHF");
    }

    #[test]
    fn test_cadence() {
        assert_eq!(cadence(Frequency::Monthly, 1), "every month");
        assert_eq!(cadence(Frequency::Weekly, 3), "every 3 weeks");
        assert_eq!(cadence(Frequency::Biweekly, 2), "every two weeks");
    }

    #[test]
    fn test_describe_active_and_paused() {
        let mut record = netflix();
        assert_eq!(describe(&record), "Netflix: £15.99 every month, next on Sat 15 Mar 2025");

        record.is_active = false;
        assert_eq!(describe(&record), "Netflix: £15.99 every month (paused)");
    }

    #[test]
    fn test_describe_debt_progress() {
        let mut record = netflix();
        record.name = "Visa".to_string();
        record.payment_type = PaymentType::Debt;
        record.total_owed = Some(1000.0);
        record.remaining_balance = Some(750.0);
        assert!(describe(&record).ends_with("£750.00 left (25% paid)"));
    }

    #[test]
    fn test_describe_savings_progress() {
        let mut record = netflix();
        record.name = "Holiday".to_string();
        record.payment_type = PaymentType::Savings;
        record.target_amount = Some(2000.0);
        record.current_saved = Some(500.0);
        assert!(describe(&record).ends_with("£500.00 of £2000.00 saved (25%)"));
    }

    #[test]
    fn test_missing_fields_message() {
        assert_eq!(
            missing_fields(Intent::Create, &["name", "amount"]),
            "To add a payment I need the name and amount."
        );
    }

    #[test]
    fn test_empty_list() {
        assert_eq!(listed(&[]), "You don't have any payments yet.");
    }
}
