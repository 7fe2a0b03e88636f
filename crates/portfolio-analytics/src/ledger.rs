//! Operation Classification and Expense Accounting
//!
//! Brokers report operation types as free-form, language-dependent labels
//! rather than a closed enum, so classification is a heuristic: an ordered
//! table of case-insensitive substring rules applied once per operation at
//! ingestion. The rules live in one place and are data, not scattered
//! string checks.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::model::{Account, Operation, OperationKind};

/// One classification rule: label substring -> operation kind.
pub struct ClassificationRule {
    pub needle: &'static str,
    /// Rule applies only when the payment is negative. Positive "tax"
    /// operations are refunds and must not be classified as tax debits.
    pub debit_only: bool,
    pub kind: OperationKind,
}

/// Ordered rule table, first match wins. `tax` is checked before the income
/// kinds so that withheld dividend/coupon taxes classify as taxes.
pub const CLASSIFICATION_RULES: &[ClassificationRule] = &[
    ClassificationRule { needle: "commission", debit_only: false, kind: OperationKind::Commission },
    ClassificationRule { needle: "fee", debit_only: false, kind: OperationKind::Commission },
    ClassificationRule { needle: "tax", debit_only: true, kind: OperationKind::Tax },
    ClassificationRule { needle: "purchase", debit_only: false, kind: OperationKind::Purchase },
    ClassificationRule { needle: "buy", debit_only: false, kind: OperationKind::Purchase },
    ClassificationRule { needle: "sell", debit_only: false, kind: OperationKind::Sale },
    ClassificationRule { needle: "sale", debit_only: false, kind: OperationKind::Sale },
    ClassificationRule { needle: "dividend", debit_only: false, kind: OperationKind::Dividend },
    ClassificationRule { needle: "coupon", debit_only: false, kind: OperationKind::Coupon },
    ClassificationRule { needle: "withdraw", debit_only: false, kind: OperationKind::Withdrawal },
];

/// Classify a broker label. Unmatched labels land in [`OperationKind::Other`].
pub fn classify(label: &str, payment: Decimal) -> OperationKind {
    let label = label.to_lowercase();
    for rule in CLASSIFICATION_RULES {
        if label.contains(rule.needle) && (!rule.debit_only || payment < Decimal::ZERO) {
            return rule.kind;
        }
    }
    OperationKind::Other
}

/// One account's classified operations for the analysis window.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccountOperations {
    pub account: Account,
    pub operations: Vec<Operation>,
    /// True when the fetch failed and the set degraded to empty.
    pub degraded: bool,
}

/// Classified operations across every account in one run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct OperationLedger {
    by_account: BTreeMap<String, AccountOperations>,
}

impl OperationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: AccountOperations) {
        self.by_account.insert(entry.account.id.clone(), entry);
    }

    pub fn account(&self, account_id: &str) -> Option<&AccountOperations> {
        self.by_account.get(account_id)
    }

    /// Per-account iteration, ordered by account id.
    pub fn accounts(&self) -> impl Iterator<Item = &AccountOperations> {
        self.by_account.values()
    }

    /// Flattened cross-account iteration.
    pub fn all_operations(&self) -> impl Iterator<Item = &Operation> {
        self.by_account.values().flat_map(|entry| entry.operations.iter())
    }

    pub fn len(&self) -> usize {
        self.by_account.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_account.is_empty()
    }
}

/// Sum, count and share of one expense category.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryExpense {
    pub sum: Decimal,
    pub count: u32,
    /// Share of total expenses, percent. Zero when the total is zero.
    pub percentage: Decimal,
}

/// Expenses split into four mutually exclusive categories.
/// Operations classified `Other` never appear here.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseBreakdown {
    pub total_expenses: Decimal,
    pub commissions: CategoryExpense,
    pub taxes: CategoryExpense,
    pub investments: CategoryExpense,
    pub withdrawals: CategoryExpense,
}

impl ExpenseBreakdown {
    /// Break the operation set down by expense category.
    pub fn of(operations: &[Operation]) -> Self {
        let mut breakdown = Self {
            commissions: category_total(operations, OperationKind::Commission),
            taxes: category_total(operations, OperationKind::Tax),
            investments: category_total(operations, OperationKind::Purchase),
            withdrawals: category_total(operations, OperationKind::Withdrawal),
            ..Self::default()
        };
        breakdown.total_expenses = breakdown.commissions.sum
            + breakdown.taxes.sum
            + breakdown.investments.sum
            + breakdown.withdrawals.sum;
        breakdown.recompute_percentages();
        breakdown
    }

    /// Fold another breakdown into this one. Percentages are left stale and
    /// must be recomputed once the accumulation is complete.
    pub(crate) fn accumulate(&mut self, other: &Self) {
        self.total_expenses += other.total_expenses;
        for (mine, theirs) in [
            (&mut self.commissions, &other.commissions),
            (&mut self.taxes, &other.taxes),
            (&mut self.investments, &other.investments),
            (&mut self.withdrawals, &other.withdrawals),
        ] {
            mine.sum += theirs.sum;
            mine.count += theirs.count;
        }
    }

    pub(crate) fn recompute_percentages(&mut self) {
        let total = self.total_expenses;
        for category in [
            &mut self.commissions,
            &mut self.taxes,
            &mut self.investments,
            &mut self.withdrawals,
        ] {
            category.percentage = percentage_of(category.sum, total);
        }
    }
}

fn category_total(operations: &[Operation], kind: OperationKind) -> CategoryExpense {
    let mut total = CategoryExpense::default();
    for op in operations.iter().filter(|op| op.kind == kind) {
        total.sum += op.payment.abs();
        total.count += 1;
    }
    total
}

fn percentage_of(value: Decimal, total: Decimal) -> Decimal {
    if total > Decimal::ZERO {
        (value / total * dec!(100)).round_dp(2)
    } else {
        Decimal::ZERO
    }
}
