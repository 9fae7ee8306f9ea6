//! Envelope budget models.

use core::fmt;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{BudgetCategoryId, OrganizationId};
use crate::error::{LedgerError, Result};

/// An envelope that money is allocated into each month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetCategory {
    /// Unique identifier.
    pub id: BudgetCategoryId,
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Display name.
    pub name: String,
    /// Optional parent group (e.g. "Bills").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl BudgetCategory {
    /// Creates a category with a fresh identifier.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidInput`] if the name is blank.
    #[inline]
    pub fn new(organization_id: OrganizationId, name: &str, group: Option<&str>) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LedgerError::invalid("category name must not be empty"));
        }
        Ok(Self {
            id: BudgetCategoryId::generate(),
            organization_id,
            name: name.to_owned(),
            group: group
                .map(str::trim)
                .filter(|g| !g.is_empty())
                .map(str::to_owned),
            created_at: Utc::now(),
        })
    }
}

/// A calendar month.
///
/// Ordering is chronological: year first, then month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BudgetPeriod {
    /// Calendar year.
    pub year: i32,
    /// Month number, 1 through 12.
    pub month: u32,
}

impl BudgetPeriod {
    /// Creates a period after checking the month.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidInput`] if `month` is outside `1..=12`.
    #[inline]
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if (1..=12).contains(&month) {
            Ok(Self { year, month })
        } else {
            Err(LedgerError::invalid(format!(
                "month must be between 1 and 12, got {month}"
            )))
        }
    }

    /// Period containing the given date.
    #[inline]
    #[must_use]
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// The month before this one; January wraps to December of the
    /// previous year.
    #[inline]
    #[must_use]
    pub const fn previous(self) -> Self {
        if self.month <= 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    /// The month after this one; December wraps to January of the next
    /// year.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        if self.month >= 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// Whether `date` falls inside this month.
    #[inline]
    #[must_use]
    pub fn contains(self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }
}

impl fmt::Display for BudgetPeriod {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Stored budget state of one category for one month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyBudget {
    /// Category this row belongs to.
    pub category_id: BudgetCategoryId,
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Month of the row.
    pub period: BudgetPeriod,
    /// Amount allocated this month.
    pub budgeted: Decimal,
    /// Net spending this month: expenses minus category-tagged income.
    pub activity: Decimal,
    /// Previous month's available amount at the time this row was set.
    pub carryover: Decimal,
    /// `budgeted + carryover - activity`.
    pub available: Decimal,
    /// Last recomputation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl MonthlyBudget {
    /// Creates a row and derives `available`.
    #[inline]
    #[must_use]
    pub fn new(
        category_id: BudgetCategoryId,
        organization_id: OrganizationId,
        period: BudgetPeriod,
        budgeted: Decimal,
        activity: Decimal,
        carryover: Decimal,
    ) -> Self {
        Self {
            category_id,
            organization_id,
            period,
            budgeted,
            activity,
            carryover,
            available: available(budgeted, carryover, activity),
            updated_at: Utc::now(),
        }
    }

    /// Replaces the activity and re-derives `available`.
    #[inline]
    #[must_use]
    pub fn with_activity(mut self, activity: Decimal) -> Self {
        self.activity = activity;
        self.available = available(self.budgeted, self.carryover, activity);
        self.updated_at = Utc::now();
        self
    }
}

/// `budgeted + carryover - activity`.
#[inline]
#[must_use]
pub fn available(budgeted: Decimal, carryover: Decimal, activity: Decimal) -> Decimal {
    budgeted + carryover - activity
}

/// One row of a monthly budget view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetLine {
    /// Category identifier.
    pub category_id: BudgetCategoryId,
    /// Category name.
    pub category: String,
    /// Category group, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Allocated amount (0 when no row is stored).
    pub budgeted: Decimal,
    /// Activity summed from the current transactions.
    pub activity: Decimal,
    /// Stored carryover (0 when no row is stored).
    pub carryover: Decimal,
    /// `budgeted + carryover - activity`.
    pub available: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn period_rejects_bad_month() {
        assert!(BudgetPeriod::new(2024, 0).is_err());
        assert!(BudgetPeriod::new(2024, 13).is_err());
        assert_eq!(BudgetPeriod::new(2024, 12).unwrap().month, 12);
    }

    #[test]
    fn period_wraps_across_years() {
        let jan = BudgetPeriod::new(2025, 1).unwrap();
        let dec = jan.previous();
        assert_eq!(dec, BudgetPeriod::new(2024, 12).unwrap());
        assert_eq!(dec.next(), jan);
        assert!(dec < jan);
    }

    #[test]
    fn period_contains_date() {
        let period = BudgetPeriod::new(2024, 2).unwrap();
        let leap_day = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert!(period.contains(leap_day));
        assert_eq!(BudgetPeriod::from_date(leap_day), period);
        assert!(!period.contains(NaiveDate::from_ymd_opt(2023, 2, 1).unwrap()));
        assert_eq!(period.to_string(), "2024-02");
    }

    #[test]
    fn available_formula() {
        let row = MonthlyBudget::new(
            "food".into(),
            "org".into(),
            BudgetPeriod::new(2024, 2).unwrap(),
            dec!(100),
            dec!(20),
            dec!(60),
        );
        assert_eq!(row.available, dec!(140));
        let row = row.with_activity(dec!(200));
        assert_eq!(row.available, dec!(-40));
    }

    #[test]
    fn category_requires_name() {
        assert!(BudgetCategory::new("org".into(), " ", None).is_err());
        let cat = BudgetCategory::new("org".into(), "Rent", Some("  ")).unwrap();
        assert!(cat.group.is_none());
    }
}
