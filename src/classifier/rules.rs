//! Merchant pattern rules and keyword/amount heuristics.

use regex::{Regex, RegexBuilder};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{
    ClassificationInput, ClassificationResult, ClassificationSource, RecurringFrequency,
    TransactionKind,
};

/// Confidence of a merchant pattern match.
pub const MERCHANT_RULE_CONFIDENCE: f64 = 0.9;
/// Confidence of a type-specific keyword match.
pub const KEYWORD_CONFIDENCE: f64 = 0.85;

/// A merchant rule as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSpec {
    /// Regular expression matched case-insensitively against the
    /// normalized description.
    pub pattern: String,
    /// Category assigned on match.
    pub category: String,
    /// Optional subcategory.
    #[serde(default)]
    pub subcategory: Option<String>,
    /// Merchant name; defaults to the matched text.
    #[serde(default)]
    pub merchant: Option<String>,
    /// Recurrence hint for subscriptions.
    #[serde(default)]
    pub recurring: Option<RecurringFrequency>,
}

/// Built-in merchant rules, in priority order:
/// (pattern, category, subcategory, recurrence).
const BUILTIN_MERCHANTS: &[(&str, &str, &str, Option<RecurringFrequency>)] = &[
    (
        r"netflix|spotify|hulu|disney plus|hbo max|youtube premium|apple music",
        "Entertainment",
        "Streaming",
        Some(RecurringFrequency::Monthly),
    ),
    (
        r"doordash|uber ?eats|grubhub|deliveroo|postmates",
        "Food & Dining",
        "Delivery",
        None,
    ),
    (r"\b(?:uber|lyft|bolt)\b", "Transportation", "Rideshare", None),
    (
        r"starbucks|dunkin|costa coffee|peet'?s|\bcoffee\b|\bcafe\b",
        "Food & Dining",
        "Coffee",
        None,
    ),
    (
        r"mcdonald'?s|burger king|wendy'?s|\bkfc\b|taco bell|\bsubway\b|chipotle",
        "Food & Dining",
        "Fast Food",
        None,
    ),
    (
        r"whole foods|trader joe'?s|kroger|safeway|\baldi\b|\blidl\b|tesco|costco|supermarket|grocer",
        "Groceries",
        "Supermarket",
        None,
    ),
    (
        r"\b(?:shell|chevron|exxon|mobil|bp|texaco|valero)\b|gas station|\bfuel\b|petrol",
        "Transportation",
        "Fuel",
        None,
    ),
    (
        r"amazon|\bamzn\b|\bebay\b|\betsy\b|\btarget\b|best buy|\bikea\b|walmart",
        "Shopping",
        "General",
        None,
    ),
    (
        r"verizon|at&t|t-mobile|comcast|xfinity|vodafone",
        "Bills & Utilities",
        "Phone & Internet",
        Some(RecurringFrequency::Monthly),
    ),
    (
        r"airbnb|booking\.com|expedia|marriott|hilton|ryanair|easyjet|\bairlines?\b",
        "Travel",
        "Lodging & Flights",
        None,
    ),
    (
        r"\bcvs\b|walgreens|rite aid|pharmacy",
        "Health",
        "Pharmacy",
        None,
    ),
    (
        r"planet fitness|equinox|\bgym\b|fitness club",
        "Health",
        "Fitness",
        Some(RecurringFrequency::Monthly),
    ),
];

/// Built-in keyword heuristics: (kind, pattern, category, subcategory).
const BUILTIN_KEYWORDS: &[(TransactionKind, &str, &str, Option<&str>)] = &[
    (
        TransactionKind::Income,
        r"\b(?:salary|payroll|wages?|paycheck)\b",
        "Income",
        Some("Salary"),
    ),
    (
        TransactionKind::Income,
        r"\b(?:interest|dividends?)\b",
        "Income",
        Some("Investment"),
    ),
    (
        TransactionKind::Income,
        r"\brefund|\breimburs|cash ?back",
        "Income",
        Some("Refunds"),
    ),
    (
        TransactionKind::Expense,
        r"\b(?:rent|mortgage|landlord)\b",
        "Housing",
        Some("Rent"),
    ),
    (
        TransactionKind::Expense,
        r"\batm\b|withdrawal",
        "Cash",
        Some("ATM"),
    ),
    (
        TransactionKind::Expense,
        r"\b(?:fee|fees|overdraft)\b",
        "Bank Fees",
        None,
    ),
    (
        TransactionKind::Expense,
        r"\binsurance\b",
        "Insurance",
        None,
    ),
    (
        TransactionKind::Expense,
        r"\b(?:electric|electricity|utility|utilities|water bill|gas bill)\b",
        "Bills & Utilities",
        Some("Utilities"),
    ),
];

/// A compiled merchant rule.
#[derive(Debug, Clone)]
struct MerchantRule {
    /// Case-insensitive pattern.
    pattern: Regex,
    /// Category on match.
    category: String,
    /// Subcategory on match.
    subcategory: Option<String>,
    /// Fixed merchant name, if any.
    merchant: Option<String>,
    /// Recurrence hint.
    recurring: Option<RecurringFrequency>,
}

/// A compiled keyword heuristic.
#[derive(Debug, Clone)]
struct KeywordRule {
    /// Transaction kind the keyword applies to.
    kind: TransactionKind,
    /// Case-insensitive pattern.
    pattern: Regex,
    /// Category on match.
    category: &'static str,
    /// Subcategory on match.
    subcategory: Option<&'static str>,
}

/// Ordered merchant rules followed by heuristics.
#[derive(Debug, Clone)]
pub struct RuleSet {
    /// Merchant rules; first match wins.
    merchants: Vec<MerchantRule>,
    /// Keyword heuristics; first match wins.
    keywords: Vec<KeywordRule>,
}

impl RuleSet {
    /// The built-in rules.
    ///
    /// # Errors
    ///
    /// Returns [`crate::LedgerError::Pattern`] if a pattern fails to compile.
    #[inline]
    pub fn builtin() -> Result<Self> {
        Self::with_custom(&[])
    }

    /// Custom rules, in the given order, followed by the built-in rules.
    ///
    /// # Errors
    ///
    /// Returns [`crate::LedgerError::Pattern`] if a pattern fails to compile.
    #[inline]
    pub fn with_custom(custom: &[RuleSpec]) -> Result<Self> {
        let mut merchants = Vec::with_capacity(custom.len() + BUILTIN_MERCHANTS.len());
        for spec in custom {
            merchants.push(MerchantRule {
                pattern: compile(&spec.pattern)?,
                category: spec.category.clone(),
                subcategory: spec.subcategory.clone(),
                merchant: spec.merchant.clone(),
                recurring: spec.recurring,
            });
        }
        for &(pattern, category, subcategory, recurring) in BUILTIN_MERCHANTS {
            merchants.push(MerchantRule {
                pattern: compile(pattern)?,
                category: category.to_owned(),
                subcategory: Some(subcategory.to_owned()),
                merchant: None,
                recurring,
            });
        }
        let keywords = BUILTIN_KEYWORDS
            .iter()
            .map(|&(kind, pattern, category, subcategory)| {
                Ok(KeywordRule {
                    kind,
                    pattern: compile(pattern)?,
                    category,
                    subcategory,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            merchants,
            keywords,
        })
    }

    /// Number of merchant rules.
    #[inline]
    #[must_use]
    pub fn merchant_rule_count(&self) -> usize {
        self.merchants.len()
    }

    /// Classifies with merchant rules, then heuristics. Always produces a
    /// result.
    #[inline]
    #[must_use]
    pub fn classify(&self, input: &ClassificationInput) -> ClassificationResult {
        let description = normalize(&input.description);
        if input.kind != TransactionKind::Transfer
            && let Some(result) = self.match_merchant(&description)
        {
            return result;
        }
        self.heuristic(&description, input)
    }

    /// First matching merchant rule.
    fn match_merchant(&self, description: &str) -> Option<ClassificationResult> {
        self.merchants.iter().find_map(|rule| {
            let found = rule.pattern.find(description)?;
            let merchant = rule
                .merchant
                .clone()
                .unwrap_or_else(|| title_case(found.as_str()));
            let mut result = ClassificationResult::new(
                rule.category.clone(),
                MERCHANT_RULE_CONFIDENCE,
                ClassificationSource::MerchantRule,
            )
            .with_merchant(merchant);
            if let Some(subcategory) = rule.subcategory.as_ref() {
                result = result.with_subcategory(subcategory.clone());
            }
            if let Some(frequency) = rule.recurring {
                result = result.recurring(frequency);
            }
            Some(result)
        })
    }

    /// Keyword match for the transaction kind, else an amount-banded guess.
    fn heuristic(&self, description: &str, input: &ClassificationInput) -> ClassificationResult {
        if input.kind == TransactionKind::Transfer {
            return ClassificationResult::new("Transfer", KEYWORD_CONFIDENCE, ClassificationSource::Heuristic);
        }
        let keyword = self
            .keywords
            .iter()
            .find(|rule| rule.kind == input.kind && rule.pattern.is_match(description));
        if let Some(rule) = keyword {
            let result = ClassificationResult::new(rule.category, KEYWORD_CONFIDENCE, ClassificationSource::Heuristic);
            return match rule.subcategory {
                Some(subcategory) => result.with_subcategory(subcategory),
                None => result,
            };
        }
        amount_band(input.kind, input.amount)
    }
}

/// Coarse guess from the amount alone.
fn amount_band(kind: TransactionKind, amount: Decimal) -> ClassificationResult {
    let (category, subcategory, confidence) = match kind {
        TransactionKind::Income if amount >= Decimal::from(1000_u32) => ("Income", Some("Salary"), 0.5),
        TransactionKind::Income => ("Income", None, 0.3),
        TransactionKind::Expense if amount < Decimal::from(15_u32) => ("Food & Dining", None, 0.4),
        TransactionKind::Expense if amount < Decimal::from(100_u32) => ("Shopping", None, 0.35),
        TransactionKind::Expense if amount < Decimal::from(1000_u32) => ("Other", None, 0.3),
        TransactionKind::Expense => ("Housing", None, 0.5),
        TransactionKind::Transfer => ("Transfer", None, KEYWORD_CONFIDENCE),
    };
    let result = ClassificationResult::new(category, confidence, ClassificationSource::Heuristic);
    match subcategory {
        Some(sub) => result.with_subcategory(sub),
        None => result,
    }
}

/// Compiles a case-insensitive pattern.
fn compile(pattern: &str) -> Result<Regex> {
    Ok(RegexBuilder::new(pattern).case_insensitive(true).build()?)
}

/// Lowercases, trims and collapses whitespace.
#[must_use]
pub fn normalize(description: &str) -> String {
    description
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Upper-cases the first letter of each word.
fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars).collect()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}
