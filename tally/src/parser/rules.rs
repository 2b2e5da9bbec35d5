//! Deterministic command parsing.
//!
//! Used whenever the model is unavailable, slow or gives an unusable answer.
//! Every step is a regex or a lookup table, so the same text always yields
//! the same command, and nothing here can fail on non-empty input.

use once_cell::sync::Lazy;

use chrono::NaiveDate;
use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

use super::hints::{classify, contains_phrase};
use crate::models::{keys, Frequency, Intent, ParseSource, ParsedCommand, PaymentType};
use crate::rag::find_anaphor;

/// Intent phrases. Earliest match in the text wins; equal positions fall
/// back to this order. READ is only used when nothing else matched.
const INTENT_PHRASES: &[(Intent, &[&str])] = &[
    (
        Intent::Upcoming,
        &[
            "upcoming", "due soon", "coming up", "what's due", "whats due", "due this week",
            "due next", "due in", "due within", "next payments",
        ],
    ),
    (
        Intent::Summary,
        &[
            "summary", "summarise", "summarize", "overview", "breakdown", "my total",
            "in total", "total spend", "total spending", "how much do i spend",
            "how much am i spending", "spending",
        ],
    ),
    (
        Intent::Convert,
        &["convert", "reclassify", "turn into", "change type", "recategorise", "recategorize"],
    ),
    (
        Intent::Pause,
        &["pause", "suspend", "freeze", "put on hold"],
    ),
    (
        Intent::Resume,
        &["resume", "unpause", "restart", "reactivate", "unfreeze"],
    ),
    (
        Intent::Delete,
        &[
            "delete", "remove", "cancel", "drop", "stop", "get rid of", "unsubscribe",
            "cancelled", "canceled",
        ],
    ),
    (
        Intent::Update,
        &[
            "update", "change", "edit", "modify", "set", "increase", "decrease", "raise",
            "lower", "went up", "went down", "now costs", "now cost",
        ],
    ),
    (
        Intent::Create,
        &[
            "add", "create", "new", "track", "start", "subscribe", "sign up", "signed up",
            "save", "i pay", "i owe", "i have", "started",
        ],
    ),
];

const READ_PHRASES: &[&str] = &[
    "show", "list", "view", "display", "details", "what", "which", "how much", "see", "tell me",
    "get", "find", "my payments", "my subscriptions",
];

/// Words that end a name run.
const NAME_BOUNDARIES: &[&str] = &[
    "a", "an", "the", "my", "our", "your", "for", "at", "of", "to", "into", "on", "with", "from",
    "by", "in", "every", "per", "each", "and", "also", "please", "i", "me", "it", "that", "this",
    "them", "one", "called", "named", "is", "are", "was", "now", "costs", "cost", "pay",
    "paying", "payment", "payments", "monthly", "weekly", "daily", "yearly", "annually",
    "annual", "quarterly", "fortnightly", "biweekly", "bi", "total", "owed", "owe", "remaining",
    "balance", "left", "target", "saved", "already", "amount", "price", "frequency", "type",
    "due", "days", "day", "weeks", "week", "months", "month", "years", "year", "installments",
    "instalments", "starting", "until", "over", "towards", "toward", "as", "be", "all", "again",
    "back", "up", "down", "next", "later", "off",
];

/// Trailing words that describe the kind of payment rather than name it.
const GENERIC_SUFFIXES: &[&str] = &[
    "subscription", "subscriptions", "bill", "bills", "debt", "goal", "plan", "membership",
    "savings", "fund", "payment", "payments",
];

const LABELS: &[(&str, &str)] = &[
    ("owed", keys::TOTAL_OWED),
    ("owe", keys::TOTAL_OWED),
    ("remaining", keys::REMAINING_BALANCE),
    ("balance", keys::REMAINING_BALANCE),
    ("left", keys::REMAINING_BALANCE),
    ("target", keys::TARGET_AMOUNT),
    ("goal", keys::TARGET_AMOUNT),
    ("saved", keys::CURRENT_SAVED),
];

static ISO_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{4}-\d{2}-\d{2}\b").expect("valid regex"));

static START_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:starting|start(?:s)?(?:\s+on)?|from|beginning)\s+(\d{4}-\d{2}-\d{2})\b")
        .expect("valid regex")
});

static END_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:until|till|ending|ends?(?:\s+on)?)\s+(\d{4}-\d{2}-\d{2})\b")
        .expect("valid regex")
});

static MONEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?ix)
        (?P<code_pre>\b(?:gbp|usd|eur|jpy|inr|cad|aud|chf)\s*)?
        (?P<sym>[£$€¥₹])?\s*
        (?P<num>\d{1,3}(?:,\d{3})+(?:\.\d+)?|\d+(?:\.\d+)?)
        (?P<suffix>k\b)?
        (?:\s*(?P<code>gbp|usd|eur|jpy|inr|cad|aud|chf|pounds?|quid|dollars?|bucks|euros?|yen|rupees?)\b)?",
    )
    .expect("valid regex")
});

static EVERY_N: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bevery\s+(\d+)\s+(day|week|month|quarter|year)s?\b").expect("valid regex")
});

static INSTALLMENTS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(\d+)\s+(?:monthly\s+|weekly\s+)?(?:installments?|instalments?|payments)\b|\bover\s+(\d+)\s+months\b",
    )
    .expect("valid regex")
});

static DAYS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:next|in|within|for|coming)\s+(\d+)\s+days?\b").expect("valid regex")
});

static QUOTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"["“]([^"”]+)["”]|(?:^|\s)'([^']+)'"#).expect("valid regex"));

static CREDITOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i:\bowed?\s+to|\bwith)\s+([A-Z][\w&]*(?:\s+[A-Z][\w&]*)*)").expect("valid regex")
});

/// Frequency phrases, most specific first.
const FREQUENCIES: &[(&str, Frequency)] = &[
    ("bi weekly", Frequency::Biweekly),
    ("biweekly", Frequency::Biweekly),
    ("fortnightly", Frequency::Biweekly),
    ("every fortnight", Frequency::Biweekly),
    ("every other week", Frequency::Biweekly),
    ("daily", Frequency::Daily),
    ("every day", Frequency::Daily),
    ("per day", Frequency::Daily),
    ("a day", Frequency::Daily),
    ("each day", Frequency::Daily),
    ("weekly", Frequency::Weekly),
    ("every week", Frequency::Weekly),
    ("per week", Frequency::Weekly),
    ("a week", Frequency::Weekly),
    ("each week", Frequency::Weekly),
    ("quarterly", Frequency::Quarterly),
    ("every quarter", Frequency::Quarterly),
    ("per quarter", Frequency::Quarterly),
    ("a quarter", Frequency::Quarterly),
    ("monthly", Frequency::Monthly),
    ("every month", Frequency::Monthly),
    ("per month", Frequency::Monthly),
    ("a month", Frequency::Monthly),
    ("each month", Frequency::Monthly),
    ("pcm", Frequency::Monthly),
    ("mo", Frequency::Monthly),
    ("yearly", Frequency::Yearly),
    ("annually", Frequency::Yearly),
    ("annual", Frequency::Yearly),
    ("every year", Frequency::Yearly),
    ("per year", Frequency::Yearly),
    ("a year", Frequency::Yearly),
    ("per annum", Frequency::Yearly),
    ("yr", Frequency::Yearly),
];

#[derive(Debug, Clone)]
struct Money {
    value: f64,
    currency: Option<&'static str>,
    /// Carries a currency marker or decimals, so it reads as a price.
    marked: bool,
    start: usize,
    end: usize,
}

/// Rule-based parser. Stateless apart from its confidence constants.
#[derive(Debug, Clone)]
pub struct RuleParser {
    confidence: f32,
    unknown_confidence: f32,
}

impl RuleParser {
    pub fn new(confidence: f32, unknown_confidence: f32) -> Self {
        Self {
            confidence,
            unknown_confidence,
        }
    }

    pub fn parse(&self, text: &str) -> ParsedCommand {
        let normalized = text.trim().replace(['’', '‘'], "'");
        let words = lower_words(&normalized);

        let (mut intent, intent_span) = detect_intent(&words);
        let confidence = if intent == Intent::Unknown {
            self.unknown_confidence
        } else {
            self.confidence
        };

        let start_date = capture_date(&START_DATE, &normalized);
        let end_date = capture_date(&END_DATE, &normalized);
        let without_dates = ISO_DATE.replace_all(&normalized, " ");
        let money = extract_money(&without_dates);

        let mut command = ParsedCommand::new(intent, text.trim(), confidence, ParseSource::Rules);

        // Labelled amounts go to their own keys. The regular amount is the
        // first marked price, or the first bare number when there is none.
        let mut currency = None;
        let mut amount: Option<&Money> = None;
        for m in &money {
            currency = currency.or(m.currency);
            match label_for(&without_dates, m) {
                Some(key) => {
                    command.entities.entry(key.to_string()).or_insert(m.value.into());
                }
                None => {
                    if amount.map_or(true, |best| m.marked && !best.marked) {
                        amount = Some(m);
                    }
                }
            }
        }
        if let Some(m) = amount {
            command = command.with(keys::AMOUNT, m.value);
        }
        if let Some(currency) = currency {
            command = command.with(keys::CURRENCY, currency);
        }

        if let Some((frequency, interval)) = detect_frequency(&normalized, &words) {
            command = command.with(keys::FREQUENCY, frequency.as_str());
            if interval > 1 {
                command = command.with(keys::FREQUENCY_INTERVAL, interval);
            }
        }

        if let Some(total) = capture_u32(&INSTALLMENTS, &without_dates) {
            command = command.with(keys::TOTAL_INSTALLMENTS, total);
        }

        if let Some(date) = start_date {
            command = command.with(keys::START_DATE, date.to_string());
        }
        if let Some(date) = end_date {
            command = command.with(keys::END_DATE, date.to_string());
        }

        if let Some(creditor) = CREDITOR
            .captures(&normalized)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
        {
            command = command.with(keys::CREDITOR, creditor);
        }

        let explicit_type = explicit_payment_type(&words);
        if intent == Intent::Update
            && explicit_type.is_some()
            && !command.entities.contains_key(keys::AMOUNT)
        {
            intent = Intent::Convert;
            command.intent = intent;
        }

        match intent {
            Intent::Create => {
                let payment_type = explicit_type.unwrap_or_else(|| classify(&words));
                command = command.with(keys::PAYMENT_TYPE, payment_type.as_str());
            }
            Intent::Convert | Intent::Update => {
                if let Some(payment_type) = explicit_type {
                    command = command.with(keys::PAYMENT_TYPE, payment_type.as_str());
                }
            }
            Intent::Upcoming => {
                if let Some(days) = detect_days(&normalized, &words) {
                    command = command.with(keys::DAYS, days);
                }
            }
            _ => {}
        }

        if !matches!(intent, Intent::Summary | Intent::Upcoming | Intent::Unknown) {
            if let Some(name) = extract_name(&normalized, intent_span) {
                command = command.with(keys::NAME, name);
            }
            if let Some(anaphor) = find_anaphor(&normalized) {
                command = command.with(keys::REFERENCE, anaphor);
            }
        }

        tracing::debug!(
            intent = %command.intent,
            entities = command.entities.len(),
            "Rule-based parse"
        );
        command
    }
}

fn lower_words(text: &str) -> Vec<String> {
    text.unicode_words().map(str::to_lowercase).collect()
}

/// First word index where `phrase` occurs.
fn phrase_position(words: &[String], phrase: &str) -> Option<usize> {
    let parts: Vec<&str> = phrase.split(' ').collect();
    words
        .windows(parts.len())
        .position(|window| window == parts.as_slice())
}

/// Intent plus the word span `(start, len)` of the phrase that selected it.
fn detect_intent(words: &[String]) -> (Intent, Option<(usize, usize)>) {
    let mut best: Option<(usize, Intent, usize)> = None;

    for (intent, phrases) in INTENT_PHRASES {
        for phrase in *phrases {
            if let Some(position) = phrase_position(words, phrase) {
                let len = phrase.split(' ').count();
                if best.map_or(true, |(p, _, _)| position < p) {
                    best = Some((position, *intent, len));
                }
            }
        }
    }

    if let Some((position, intent, len)) = best {
        return (intent, Some((position, len)));
    }

    READ_PHRASES
        .iter()
        .filter_map(|phrase| {
            phrase_position(words, phrase).map(|p| (p, phrase.split(' ').count()))
        })
        .min()
        .map(|(position, len)| (Intent::Read, Some((position, len))))
        .unwrap_or((Intent::Unknown, None))
}

fn capture_date(pattern: &Regex, text: &str) -> Option<NaiveDate> {
    pattern
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| NaiveDate::parse_from_str(m.as_str(), "%Y-%m-%d").ok())
}

fn capture_u32(pattern: &Regex, text: &str) -> Option<u32> {
    pattern.captures(text).and_then(|c| {
        c.iter()
            .skip(1)
            .flatten()
            .find_map(|m| m.as_str().parse::<u32>().ok())
    })
}

fn currency_code(symbol: &str) -> Option<&'static str> {
    Some(match symbol.trim().to_lowercase().as_str() {
        "£" | "gbp" | "pound" | "pounds" | "quid" => "GBP",
        "$" | "usd" | "dollar" | "dollars" | "bucks" => "USD",
        "€" | "eur" | "euro" | "euros" => "EUR",
        "¥" | "jpy" | "yen" => "JPY",
        "₹" | "inr" | "rupee" | "rupees" => "INR",
        "cad" => "CAD",
        "aud" => "AUD",
        "chf" => "CHF",
        _ => return None,
    })
}

/// Numbers that read as money: anything with a currency marker or decimals,
/// and bare integers that are not counts ("12 installments", "every 2 weeks").
/// A `k` suffix means thousands only next to a currency or an amount label;
/// on its own ("4K") it is part of a product name.
fn extract_money(text: &str) -> Vec<Money> {
    const COUNT_UNITS: &[&str] = &[
        "day", "days", "week", "weeks", "month", "months", "year", "years", "installment",
        "installments", "instalment", "instalments", "payments", "times", "x", "quarter",
        "quarters",
    ];
    const COUNT_PREFIXES: &[&str] = &["every", "next", "within", "over", "in", "for"];

    MONEY
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let num = caps.name("num")?;
            let value: f64 = num.as_str().replace(',', "").parse().ok()?;
            let thousands = caps.name("suffix").is_some();

            let currency = caps
                .name("sym")
                .or_else(|| caps.name("code"))
                .or_else(|| caps.name("code_pre"))
                .and_then(|m| currency_code(m.as_str()));

            if currency.is_none() && !num.as_str().contains('.') {
                let after = lower_words(&text[whole.end()..]);
                let before = lower_words(&text[..whole.start()]);
                let is_count = after
                    .first()
                    .is_some_and(|w| COUNT_UNITS.contains(&w.as_str()))
                    || before
                        .last()
                        .is_some_and(|w| COUNT_PREFIXES.contains(&w.as_str()));
                if is_count {
                    return None;
                }
            }

            let mut money = Money {
                value,
                currency,
                marked: currency.is_some() || num.as_str().contains('.'),
                start: whole.start(),
                end: whole.end(),
            };
            if thousands {
                if currency.is_none() && label_for(text, &money).is_none() {
                    return None;
                }
                money.value *= 1000.0;
            }
            Some(money)
        })
        .collect()
}

/// Entity key for a labelled amount, looking three words back and two ahead.
/// An amount directly followed by a frequency ("£250 monthly") is the
/// regular payment, so nothing after it counts as its label.
fn label_for(text: &str, money: &Money) -> Option<&'static str> {
    const FREQUENCY_WORDS: &[&str] = &[
        "monthly", "weekly", "daily", "yearly", "annually", "annual", "quarterly", "fortnightly",
        "biweekly", "a", "per", "every", "each",
    ];

    let before = lower_words(&text[..money.start]);
    let after = lower_words(&text[money.end..]);

    let behind = before.iter().rev().take(3);
    let ahead = after
        .iter()
        .take(2)
        .take_while(|word| !FREQUENCY_WORDS.contains(&word.as_str()));

    // Nearest word behind first, then the words ahead.
    behind
        .chain(ahead)
        .find_map(|word| {
            LABELS
                .iter()
                .find(|(label, _)| *label == word.as_str())
                .map(|(_, key)| *key)
        })
}

fn detect_frequency(text: &str, words: &[String]) -> Option<(Frequency, u32)> {
    if let Some(caps) = EVERY_N.captures(text) {
        let n: u32 = caps.get(1)?.as_str().parse().ok()?;
        let n = n.max(1);
        let unit = caps.get(2)?.as_str().to_lowercase();
        return Some(match unit.as_str() {
            "day" => (Frequency::Daily, n),
            "week" if n == 2 => (Frequency::Biweekly, 2),
            "week" => (Frequency::Weekly, n),
            "month" => (Frequency::Monthly, n),
            "quarter" => (Frequency::Quarterly, n),
            _ => (Frequency::Yearly, n),
        });
    }

    FREQUENCIES
        .iter()
        .find(|(phrase, _)| contains_phrase(words, phrase))
        .map(|(_, frequency)| (*frequency, 1))
}

fn detect_days(text: &str, words: &[String]) -> Option<u32> {
    if let Some(days) = capture_u32(&DAYS, text) {
        return Some(days);
    }
    if contains_phrase(words, "today") {
        Some(0)
    } else if contains_phrase(words, "tomorrow") {
        Some(1)
    } else if contains_phrase(words, "this week") || contains_phrase(words, "next week") {
        Some(7)
    } else if contains_phrase(words, "this month") || contains_phrase(words, "next month") {
        Some(30)
    } else {
        None
    }
}

/// Payment type named after "to"/"into"/"as", e.g. "convert gym to debt".
fn explicit_payment_type(words: &[String]) -> Option<PaymentType> {
    words.iter().enumerate().find_map(|(i, word)| {
        if !matches!(word.as_str(), "to" | "into" | "as") {
            return None;
        }
        let rest: Vec<&str> = words[i + 1..]
            .iter()
            .map(String::as_str)
            .filter(|w| !matches!(*w, "a" | "an"))
            .take(2)
            .collect();
        let pair = rest.join(" ");
        pair.parse()
            .ok()
            .or_else(|| rest.first().and_then(|w| w.parse().ok()))
    })
}

/// Name of the payment the command is about: a quoted string if present,
/// otherwise the first run of non-boundary words after the intent phrase.
fn extract_name(text: &str, intent_span: Option<(usize, usize)>) -> Option<String> {
    if let Some(caps) = QUOTED.captures(text) {
        let quoted = caps.get(1).or_else(|| caps.get(2))?.as_str().trim();
        if !quoted.is_empty() {
            return Some(quoted.to_string());
        }
    }

    let skip = intent_span.map_or(0, |(start, len)| start + len);

    let tokens = name_tokens(text);
    let mut run: Vec<&str> = Vec::new();
    let mut word_index = 0;
    for (i, &token) in tokens.iter().enumerate() {
        if let Token::Word(_) = token {
            word_index += 1;
            if word_index <= skip {
                continue;
            }
        }

        let boundary = match token {
            // A model number inside a name ("iPhone 15 insurance") stays in it.
            Token::Word(word) if word.chars().all(|c| c.is_ascii_digit()) => {
                run.is_empty()
                    || !matches!(
                        tokens.get(i + 1),
                        Some(Token::Word(next)) if is_name_word(next) && currency_code(next).is_none()
                    )
            }
            Token::Word(word) => !is_name_word(word),
            Token::Break => true,
        };

        if boundary {
            strip_generic_suffixes(&mut run);
            if !run.is_empty() {
                break;
            }
            continue;
        }

        if let Token::Word(word) = token {
            run.push(word);
        }
    }
    strip_generic_suffixes(&mut run);

    if run.is_empty() {
        return None;
    }

    let name = run.join(" ");
    Some(if name.chars().any(char::is_uppercase) {
        name
    } else {
        title_case(&name)
    })
}

#[derive(Debug, Clone, Copy)]
enum Token<'a> {
    Word(&'a str),
    Break,
}

/// Words with their original casing; punctuation and currency symbols
/// between words become breaks. The words are the same ones
/// [`lower_words`] yields for the text.
fn name_tokens(text: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut last_end = 0;
    for (offset, word) in text.unicode_word_indices() {
        let gap = &text[last_end..offset];
        if gap.chars().any(|c| matches!(c, ',' | ';' | ':' | '!' | '?' | '£' | '$' | '€' | '¥' | '₹')) {
            tokens.push(Token::Break);
        }
        tokens.push(Token::Word(word));
        last_end = offset + word.len();
    }
    tokens
}

/// A word that can be part of a name run.
fn is_name_word(word: &str) -> bool {
    let lower = word.to_lowercase();
    !(NAME_BOUNDARIES.contains(&lower.as_str())
        || is_intent_word(&lower)
        || word.chars().all(|c| c.is_ascii_digit() || c == '.' || c == ','))
}

fn is_intent_word(word: &str) -> bool {
    INTENT_PHRASES
        .iter()
        .flat_map(|(_, phrases)| phrases.iter())
        .chain(READ_PHRASES.iter())
        .any(|phrase| !phrase.contains(' ') && *phrase == word)
}

fn strip_generic_suffixes(run: &mut Vec<&str>) {
    while run
        .last()
        .is_some_and(|w| GENERIC_SUFFIXES.contains(&w.to_lowercase().as_str()))
    {
        run.pop();
    }
}

fn title_case(name: &str) -> String {
    name.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
