//! # portfolio-analytics
//!
//! Multi-account brokerage analytics: consolidated P&L, categorized cash
//! flow, invested-vs-current performance and rule-based rebalancing
//! recommendations with risk and liquidity evidence.
//!
//! ## Data flow
//!
//! ```text
//! BrokerClient (collaborator)
//!     │
//!     ├── AccountAggregator ── accounts, portfolios, operations
//!     │         │
//!     │         └── OperationLedger ── classified operations per account
//!     │                   │
//!     │                   └── AnalyticsEngine ── P&L / cash flow / performance
//!     │
//!     └── MarketSignalAnalyzer ── risk metrics, liquidity, correlation
//!               │
//!               └── RecommendationEngine ── BUY / SELL / HOLD + substitutes
//! ```
//!
//! ## Failure policy
//!
//! - Account discovery failing is fatal to the run.
//! - Any per-account or per-instrument fetch failure is logged and absorbed
//!   as a zero-valued, degraded-flagged entry.
//! - Degenerate numerical inputs (short series, zero denominators) resolve
//!   to defined zero values, never to errors.
//!
//! Amounts stay in the currency they are sourced in; the crate performs no
//! currency conversion and persists no state of its own.

pub mod aggregate;
pub mod analytics;
pub mod broker;
pub mod error;
pub mod ledger;
pub mod model;
pub mod recommend;
pub mod signal;

pub use aggregate::AccountAggregator;
pub use analytics::{AnalyticsEngine, CashFlowReport, PerformanceReport, PnlReport};
pub use broker::{BrokerClient, MockBrokerClient};
pub use error::{AnalyticsError, Result};
pub use ledger::{AccountOperations, ExpenseBreakdown, OperationLedger};
pub use model::{
    Account, CandleInterval, InstrumentInfo, LiquidityMetrics, Money, Operation, OperationKind,
    OrderBook, OrderBookLevel, PortfolioSnapshot, Position, PricePoint, RiskMetrics,
};
pub use recommend::{
    AccountRecommendations, Action, Recommendation, RecommendationEngine, RiskProfile,
};
pub use signal::{
    CorrelationMatrix, MarketSignalAnalyzer, PortfolioRiskAnalysis, PositionSignals,
};
