//! Keyword hints for classifying a payment from its description.

use crate::models::PaymentType;

/// Evaluated top to bottom; the first category with a matching phrase wins.
/// Debt comes first so "credit card" is not taken for a generic card
/// subscription, and subscription comes last as the catch-all.
const HINTS: &[(PaymentType, &[&str])] = &[
    (
        PaymentType::Debt,
        &[
            "credit card", "debt", "loan", "overdraft", "owe", "owed", "repayment", "repayments",
            "finance", "klarna", "borrowed", "iou",
        ],
    ),
    (
        PaymentType::Savings,
        &[
            "savings", "saving", "save", "goal", "emergency fund", "fund", "isa", "pension",
            "nest egg", "pot",
        ],
    ),
    (
        PaymentType::Housing,
        &["rent", "mortgage", "council tax", "landlord", "housing", "hoa", "service charge"],
    ),
    (
        PaymentType::Insurance,
        &["insurance", "premium", "policy", "cover", "assurance"],
    ),
    (
        PaymentType::Utility,
        &[
            "electric", "electricity", "gas", "water", "energy", "broadband", "internet", "wifi",
            "phone", "mobile", "utility", "utilities", "tv licence", "tv license",
        ],
    ),
    (
        PaymentType::ProfessionalService,
        &[
            "cleaner", "cleaning", "accountant", "lawyer", "solicitor", "therapist", "therapy",
            "tutor", "tutoring", "coach", "gardener", "nanny", "babysitter", "childcare",
            "dentist", "physio", "consultant", "dog walker",
        ],
    ),
    (
        PaymentType::Transfer,
        &[
            "transfer", "allowance", "pocket money", "remittance", "standing order", "send money",
        ],
    ),
    (
        PaymentType::OneTime,
        &["one time", "one off", "once", "single payment"],
    ),
    (
        PaymentType::Subscription,
        &[
            "subscription", "membership", "streaming", "netflix", "spotify", "prime", "disney",
            "youtube", "icloud", "gym", "card", "app", "software", "magazine", "newspaper",
        ],
    ),
];

/// True when the word sequence `phrase` appears in `words`.
pub fn contains_phrase(words: &[String], phrase: &str) -> bool {
    let parts: Vec<&str> = phrase.split(' ').collect();
    words.windows(parts.len()).any(|window| window == parts.as_slice())
}

/// Classify lowercased `words`; `Subscription` when nothing matches.
pub fn classify(words: &[String]) -> PaymentType {
    HINTS
        .iter()
        .find(|(_, phrases)| phrases.iter().any(|phrase| contains_phrase(words, phrase)))
        .map(|(payment_type, _)| *payment_type)
        .unwrap_or_default()
}
