use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    #[default]
    Subscription,
    Housing,
    Utility,
    ProfessionalService,
    Insurance,
    Debt,
    Savings,
    Transfer,
    OneTime,
}

impl PaymentType {
    pub const ALL: [PaymentType; 9] = [
        Self::Subscription,
        Self::Housing,
        Self::Utility,
        Self::ProfessionalService,
        Self::Insurance,
        Self::Debt,
        Self::Savings,
        Self::Transfer,
        Self::OneTime,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Subscription => "subscription",
            Self::Housing => "housing",
            Self::Utility => "utility",
            Self::ProfessionalService => "professional_service",
            Self::Insurance => "insurance",
            Self::Debt => "debt",
            Self::Savings => "savings",
            Self::Transfer => "transfer",
            Self::OneTime => "one_time",
        }
    }
}

impl std::fmt::Display for PaymentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "subscription" => Ok(Self::Subscription),
            "housing" => Ok(Self::Housing),
            "utility" | "utilities" => Ok(Self::Utility),
            "professional_service" | "professional" | "service" => Ok(Self::ProfessionalService),
            "insurance" => Ok(Self::Insurance),
            "debt" | "loan" => Ok(Self::Debt),
            "savings" | "saving" => Ok(Self::Savings),
            "transfer" => Ok(Self::Transfer),
            "one_time" | "onetime" | "one_off" => Ok(Self::OneTime),
            _ => Err(format!("Unknown payment type: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Daily,
    Weekly,
    Biweekly,
    #[default]
    Monthly,
    Quarterly,
    Yearly,
    Custom,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Biweekly => "biweekly",
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
            Self::Yearly => "yearly",
            Self::Custom => "custom",
        }
    }
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "biweekly" | "fortnightly" => Ok(Self::Biweekly),
            "monthly" => Ok(Self::Monthly),
            "quarterly" => Ok(Self::Quarterly),
            "yearly" | "annually" | "annual" => Ok(Self::Yearly),
            "custom" => Ok(Self::Custom),
            _ => Err(format!("Unknown frequency: {s}")),
        }
    }
}

/// A recurring or one-off obligation owned by the domain service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentRecord {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub amount: f64,
    pub currency: String,
    pub payment_type: PaymentType,
    pub frequency: Frequency,
    pub frequency_interval: u32,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub next_payment_date: NaiveDate,
    pub last_payment_date: Option<NaiveDate>,
    pub is_active: bool,

    // Debt ledger
    pub total_owed: Option<f64>,
    pub remaining_balance: Option<f64>,
    pub creditor: Option<String>,

    // Savings goal
    pub target_amount: Option<f64>,
    pub current_saved: Option<f64>,
    pub recipient: Option<String>,

    // Installment plan
    pub total_installments: Option<u32>,
    pub completed_installments: Option<u32>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentRecord {
    pub fn new(
        id: String,
        user_id: String,
        name: String,
        amount: f64,
        currency: String,
        start_date: NaiveDate,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_id,
            name,
            amount,
            currency,
            payment_type: PaymentType::default(),
            frequency: Frequency::default(),
            frequency_interval: 1,
            start_date,
            end_date: None,
            next_payment_date: start_date,
            last_payment_date: None,
            is_active: true,
            total_owed: None,
            remaining_balance: None,
            creditor: None,
            target_amount: None,
            current_saved: None,
            recipient: None,
            total_installments: None,
            completed_installments: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_installment_plan(&self) -> bool {
        self.total_installments.is_some()
    }
}

/// Field-level changes applied by an UPDATE, CONVERT, PAUSE or RESUME.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PaymentChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_type: Option<PaymentType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<Frequency>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_interval: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_owed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_balance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_amount: Option<f64>,
}

impl PaymentChanges {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Input for creating a payment; the domain service fills in ids and dates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewPayment {
    pub name: String,
    pub amount: f64,
    pub currency: Option<String>,
    pub payment_type: PaymentType,
    pub frequency: Frequency,
    pub frequency_interval: u32,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub total_owed: Option<f64>,
    pub remaining_balance: Option<f64>,
    pub creditor: Option<String>,
    pub target_amount: Option<f64>,
    pub current_saved: Option<f64>,
    pub recipient: Option<String>,
    pub total_installments: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TypeBreakdown {
    pub payment_type: PaymentType,
    pub count: usize,
    pub monthly_total: f64,
}

/// Aggregate view over a user's active payments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentSummary {
    pub active_count: usize,
    pub paused_count: usize,
    pub monthly_total: f64,
    pub yearly_total: f64,
    pub currency: String,
    pub by_type: Vec<TypeBreakdown>,
    pub total_debt_remaining: f64,
    pub total_saved: f64,
}
