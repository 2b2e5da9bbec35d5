use chrono::{DateTime, NaiveDate, Utc};
use libsql::{params, Connection};

use crate::error::{Result, TallyError};
use crate::models::PaymentRecord;

const COLUMNS: &str = "id, user_id, name, amount, currency, payment_type, frequency,
    frequency_interval, start_date, end_date, next_payment_date, last_payment_date, is_active,
    total_owed, remaining_balance, creditor, target_amount, current_saved, recipient,
    total_installments, completed_installments, created_at, updated_at";

pub struct PaymentRepository;

impl PaymentRepository {
    pub async fn create(conn: &Connection, record: &PaymentRecord) -> Result<()> {
        conn.execute(
            &format!(
                "INSERT INTO payments ({COLUMNS}) VALUES (
                    ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                    ?17, ?18, ?19, ?20, ?21, ?22, ?23
                )"
            ),
            Self::record_params(record),
        )
        .await?;

        Ok(())
    }

    pub async fn get_by_id(
        conn: &Connection,
        user_id: &str,
        id: &str,
    ) -> Result<Option<PaymentRecord>> {
        let mut rows = conn
            .query(
                &format!("SELECT {COLUMNS} FROM payments WHERE user_id = ?1 AND id = ?2"),
                params![user_id, id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::row_to_record(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn get_by_name(
        conn: &Connection,
        user_id: &str,
        name: &str,
    ) -> Result<Option<PaymentRecord>> {
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {COLUMNS} FROM payments
                     WHERE user_id = ?1 AND name = ?2 COLLATE NOCASE
                     LIMIT 1"
                ),
                params![user_id, name.trim()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::row_to_record(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn list(conn: &Connection, user_id: &str) -> Result<Vec<PaymentRecord>> {
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {COLUMNS} FROM payments
                     WHERE user_id = ?1
                     ORDER BY next_payment_date ASC, name ASC"
                ),
                params![user_id],
            )
            .await?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(Self::row_to_record(&row)?);
        }

        Ok(records)
    }

    /// Overwrite every mutable column of an existing record.
    pub async fn update(conn: &Connection, record: &PaymentRecord) -> Result<()> {
        let changed = conn
            .execute(
                r#"
                UPDATE payments SET
                    name = ?3, amount = ?4, currency = ?5, payment_type = ?6, frequency = ?7,
                    frequency_interval = ?8, start_date = ?9, end_date = ?10,
                    next_payment_date = ?11, last_payment_date = ?12, is_active = ?13,
                    total_owed = ?14, remaining_balance = ?15, creditor = ?16,
                    target_amount = ?17, current_saved = ?18, recipient = ?19,
                    total_installments = ?20, completed_installments = ?21, updated_at = ?23
                WHERE id = ?1 AND user_id = ?2
                "#,
                Self::record_params(record),
            )
            .await?;

        if changed == 0 {
            return Err(TallyError::NotFound(format!("Payment {}", record.id)));
        }
        Ok(())
    }

    pub async fn delete(conn: &Connection, user_id: &str, id: &str) -> Result<bool> {
        let changed = conn
            .execute(
                "DELETE FROM payments WHERE user_id = ?1 AND id = ?2",
                params![user_id, id],
            )
            .await?;
        Ok(changed > 0)
    }

    fn record_params(record: &PaymentRecord) -> Vec<libsql::Value> {
        vec![
            record.id.clone().into(),
            record.user_id.clone().into(),
            record.name.clone().into(),
            record.amount.into(),
            record.currency.clone().into(),
            record.payment_type.as_str().into(),
            record.frequency.as_str().into(),
            i64::from(record.frequency_interval).into(),
            format_date(record.start_date).into(),
            record.end_date.map(format_date).into(),
            format_date(record.next_payment_date).into(),
            record.last_payment_date.map(format_date).into(),
            i64::from(record.is_active).into(),
            record.total_owed.into(),
            record.remaining_balance.into(),
            record.creditor.clone().into(),
            record.target_amount.into(),
            record.current_saved.into(),
            record.recipient.clone().into(),
            record.total_installments.map(i64::from).into(),
            record.completed_installments.map(i64::from).into(),
            record.created_at.to_rfc3339().into(),
            record.updated_at.to_rfc3339().into(),
        ]
    }

    pub fn row_to_record(row: &libsql::Row) -> Result<PaymentRecord> {
        Ok(PaymentRecord {
            id: row.get(0)?,
            user_id: row.get(1)?,
            name: row.get(2)?,
            amount: row.get(3)?,
            currency: row.get(4)?,
            payment_type: row.get::<String>(5)?.parse().unwrap_or_default(),
            frequency: row.get::<String>(6)?.parse().unwrap_or_default(),
            frequency_interval: row.get::<i64>(7)?.clamp(1, i64::from(u32::MAX)) as u32,
            start_date: parse_date(&row.get::<String>(8)?)?,
            end_date: row
                .get::<Option<String>>(9)?
                .map(|s| parse_date(&s))
                .transpose()?,
            next_payment_date: parse_date(&row.get::<String>(10)?)?,
            last_payment_date: row
                .get::<Option<String>>(11)?
                .map(|s| parse_date(&s))
                .transpose()?,
            is_active: row.get::<i64>(12)? != 0,
            total_owed: row.get(13)?,
            remaining_balance: row.get(14)?,
            creditor: row.get(15)?,
            target_amount: row.get(16)?,
            current_saved: row.get(17)?,
            recipient: row.get(18)?,
            total_installments: row.get::<Option<i64>>(19)?.map(|n| n.max(0) as u32),
            completed_installments: row.get::<Option<i64>>(20)?.map(|n| n.max(0) as u32),
            created_at: parse_timestamp(&row.get::<String>(21)?),
            updated_at: parse_timestamp(&row.get::<String>(22)?),
        })
    }
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| TallyError::Internal(format!("Corrupt date '{raw}' in payments table: {e}")))
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
