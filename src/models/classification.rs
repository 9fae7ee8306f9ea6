//! Classification value objects.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{ClassificationSource, RecurringFrequency, TransactionKind};

/// A category guess for a transaction, with how sure the producing
/// strategy was.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    /// Top-level category name.
    pub category: String,
    /// Optional finer-grained category.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Merchant recognised in the description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant_name: Option<String>,
    /// Whether the charge looks recurring.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_recurring: Option<bool>,
    /// Expected recurrence, when recurring.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurring_frequency: Option<RecurringFrequency>,
    /// Strategy that produced this result.
    pub source: ClassificationSource,
}

impl ClassificationResult {
    /// Creates a result with only a category, confidence and source.
    #[inline]
    #[must_use]
    pub fn new<T: Into<String>>(category: T, confidence: f64, source: ClassificationSource) -> Self {
        Self {
            category: category.into(),
            subcategory: None,
            confidence: clamp_confidence(confidence),
            merchant_name: None,
            is_recurring: None,
            recurring_frequency: None,
            source,
        }
    }

    /// Sets the subcategory.
    #[inline]
    #[must_use]
    pub fn with_subcategory<T: Into<String>>(mut self, subcategory: T) -> Self {
        self.subcategory = Some(subcategory.into());
        self
    }

    /// Sets the recognised merchant.
    #[inline]
    #[must_use]
    pub fn with_merchant<T: Into<String>>(mut self, merchant: T) -> Self {
        self.merchant_name = Some(merchant.into());
        self
    }

    /// Marks the result as recurring with the given frequency.
    #[inline]
    #[must_use]
    pub const fn recurring(mut self, frequency: RecurringFrequency) -> Self {
        self.is_recurring = Some(true);
        self.recurring_frequency = Some(frequency);
        self
    }
}

/// Clamps a confidence value into `[0, 1]`, mapping NaN to 0.
#[inline]
#[must_use]
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Input to the classification engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationInput {
    /// Free-text description (payee, memo, ...).
    pub description: String,
    /// Non-negative amount.
    pub amount: Decimal,
    /// Transaction direction.
    #[serde(rename = "type")]
    pub kind: TransactionKind,
}

impl ClassificationInput {
    /// Creates a classification input.
    #[inline]
    #[must_use]
    pub fn new<T: Into<String>>(description: T, amount: Decimal, kind: TransactionKind) -> Self {
        Self {
            description: description.into(),
            amount,
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_is_clamped() {
        let result = ClassificationResult::new("Food", 1.7, ClassificationSource::External);
        assert!((result.confidence - 1.0).abs() < f64::EPSILON);
        assert!(clamp_confidence(f64::NAN).abs() < f64::EPSILON);
        assert!(clamp_confidence(-0.2).abs() < f64::EPSILON);
    }

    #[test]
    fn optional_fields_are_skipped() {
        let result = ClassificationResult::new("Shopping", 0.35, ClassificationSource::Heuristic);
        let json = serde_json::to_string(&result).unwrap();
        assert!(!json.contains("subcategory"));
        assert!(json.contains(r#""source":"heuristic""#));
    }

    #[test]
    fn builder_methods_fill_fields() {
        let result = ClassificationResult::new("Entertainment", 0.9, ClassificationSource::MerchantRule)
            .with_subcategory("Streaming")
            .with_merchant("Netflix")
            .recurring(RecurringFrequency::Monthly);
        assert_eq!(result.subcategory.as_deref(), Some("Streaming"));
        assert_eq!(result.merchant_name.as_deref(), Some("Netflix"));
        assert_eq!(result.is_recurring, Some(true));
        let back: ClassificationResult =
            serde_json::from_str(&serde_json::to_string(&result).unwrap()).unwrap();
        assert_eq!(back, result);
    }
}
