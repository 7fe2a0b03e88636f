//! Domain Models
//!
//! Core data types for multi-account brokerage analytics.
//! Uses `rust_decimal` for all monetary values - never use f64 for money!
//! Statistical ratios (volatility, correlation, weights) are `f64`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A currency-tagged amount. Amounts stay in the currency they were sourced
/// in; no cross-currency netting happens anywhere in this crate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub currency: String,
    pub value: Decimal,
}

impl Money {
    pub fn new(currency: impl Into<String>, value: Decimal) -> Self {
        Self {
            currency: currency.into(),
            value,
        }
    }

    pub fn zero(currency: impl Into<String>) -> Self {
        Self::new(currency, Decimal::ZERO)
    }
}

/// A brokerage account. Immutable once fetched; scoped to one analytics run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Account {
    pub id: String,

    /// Display name (e.g. "Main brokerage").
    pub name: String,

    /// Account kind as reported by the broker (e.g. "broker", "iis").
    pub kind: String,

    pub status: String,

    pub opened_date: Option<DateTime<Utc>>,
    pub closed_date: Option<DateTime<Utc>>,
}

/// Classified operation category.
///
/// Produced once at ingestion from the broker's free-form type label by the
/// rule table in [`crate::ledger`]. Labels matching no rule land in `Other`,
/// which is excluded from expense categories but still counted in every
/// P&L and cash-flow total.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Purchase,
    Sale,
    Dividend,
    Coupon,
    Tax,
    Commission,
    Withdrawal,
    Other,
}

/// A single executed brokerage operation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Operation {
    pub id: String,

    pub account_id: String,
    pub account_name: String,

    /// Raw human-readable operation type from the broker.
    pub label: String,

    /// Category derived from `label` at ingestion.
    pub kind: OperationKind,

    pub date: DateTime<Utc>,

    /// Instrument key, absent for pure cash movements.
    pub figi: Option<String>,

    pub quantity: i64,

    /// Signed cash effect. Debits are negative.
    pub payment: Decimal,

    pub currency: String,

    /// Per-unit price when the operation is a trade.
    pub price: Decimal,
}

impl Operation {
    /// Build a cash operation, classifying the label in the process.
    pub fn new(
        account: &Account,
        label: impl Into<String>,
        date: DateTime<Utc>,
        payment: Decimal,
        currency: impl Into<String>,
    ) -> Self {
        let label = label.into();
        let kind = crate::ledger::classify(&label, payment);
        Self {
            id: Uuid::new_v4().to_string(),
            account_id: account.id.clone(),
            account_name: account.name.clone(),
            label,
            kind,
            date,
            figi: None,
            quantity: 0,
            payment,
            currency: currency.into(),
            price: Decimal::ZERO,
        }
    }

    /// Attach instrument details for trade and income operations.
    pub fn with_instrument(
        mut self,
        figi: impl Into<String>,
        quantity: i64,
        price: Decimal,
    ) -> Self {
        self.figi = Some(figi.into());
        self.quantity = quantity;
        self.price = price;
        self
    }
}

/// A position inside a portfolio snapshot.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Position {
    pub figi: String,

    pub quantity: Decimal,

    /// Average entry price per unit.
    pub average_price: Decimal,

    /// Value as reported by the broker, not recomputed from ticks.
    pub current_value: Decimal,
}

impl Position {
    pub fn new(figi: impl Into<String>, quantity: Decimal, average_price: Decimal) -> Self {
        Self {
            figi: figi.into(),
            quantity,
            average_price,
            current_value: quantity * average_price,
        }
    }

    /// Cost-basis value used for portfolio weights.
    pub fn value(&self) -> Decimal {
        self.quantity * self.average_price
    }
}

/// One account's portfolio at the time of the analytics run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub account_id: String,
    pub account_name: String,

    pub total_amount: Money,

    pub positions: Vec<Position>,

    /// True when the fetch failed and this is a zero-valued stand-in.
    pub degraded: bool,
}

impl PortfolioSnapshot {
    pub fn new(account: &Account, total_amount: Money, positions: Vec<Position>) -> Self {
        Self {
            account_id: account.id.clone(),
            account_name: account.name.clone(),
            total_amount,
            positions,
            degraded: false,
        }
    }

    /// Zero-valued snapshot for an account whose portfolio could not be
    /// fetched. Keeps the account visible in every report.
    pub fn unavailable(account: &Account, currency: impl Into<String>) -> Self {
        Self {
            account_id: account.id.clone(),
            account_name: account.name.clone(),
            total_amount: Money::zero(currency),
            positions: Vec::new(),
            degraded: true,
        }
    }
}

/// Candle resolution for historical price queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandleInterval {
    Hour,
    Day,
    Week,
}

/// One close of an instrument's historical price series.
/// Series are sorted ascending by time before any computation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PricePoint {
    pub figi: String,
    pub time: DateTime<Utc>,
    pub close: Decimal,
    pub volume: i64,
}

/// A single price level of an order book.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrderBookLevel {
    pub price: Decimal,
    pub quantity: i64,
}

/// Order book snapshot used for liquidity metrics.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrderBook {
    pub figi: String,
    pub depth: u32,
    pub bids: Vec<OrderBookLevel>,
    pub asks: Vec<OrderBookLevel>,
}

/// Reference data for one instrument.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InstrumentInfo {
    pub figi: String,
    pub ticker: String,
    pub name: String,
    pub instrument_type: String,
    pub sector: String,
    pub currency: String,
    pub lot: i64,
}

/// Risk metrics derived from one price series.
///
/// Volatility, drawdown and VaR are on the percent scale. All-zero when the
/// series has fewer than two points - a defined degenerate case, not an
/// error.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskMetrics {
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub max_drawdown: f64,
    pub var_95: f64,
    pub var_99: f64,
    pub skewness: f64,
    pub kurtosis: f64,
}

/// Liquidity metrics derived from one order book snapshot.
/// All-zero when the book is absent or one-sided.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LiquidityMetrics {
    pub spread_percentage: f64,
    pub depth_volume: f64,
    pub weighted_average_spread: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn account() -> Account {
        Account {
            id: "acc-1".into(),
            name: "Main".into(),
            kind: "broker".into(),
            status: "open".into(),
            opened_date: None,
            closed_date: None,
        }
    }

    #[test]
    fn test_operation_classified_at_ingestion() {
        let op = Operation::new(&account(), "Buy securities", Utc::now(), dec!(-1500), "USD");
        assert_eq!(op.kind, OperationKind::Purchase);
        assert_eq!(op.account_name, "Main");
        assert!(op.figi.is_none());

        let op = op.with_instrument("FG0000TEST01", 10, dec!(150));
        assert_eq!(op.figi.as_deref(), Some("FG0000TEST01"));
        assert_eq!(op.quantity, 10);
    }

    #[test]
    fn test_position_value() {
        let pos = Position::new("FG0000TEST01", dec!(40), dec!(430));
        assert_eq!(pos.value(), dec!(17200));
        assert_eq!(pos.current_value, dec!(17200));
    }

    #[test]
    fn test_unavailable_snapshot_is_zero_and_degraded() {
        let snapshot = PortfolioSnapshot::unavailable(&account(), "USD");
        assert!(snapshot.degraded);
        assert_eq!(snapshot.total_amount.value, Decimal::ZERO);
        assert!(snapshot.positions.is_empty());
    }
}
