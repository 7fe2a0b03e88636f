//! Brokerage Integration
//!
//! Abstraction over the brokerage wire client plus a deterministic mock.

mod mock;

pub use mock::MockBrokerClient;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::model::{
    Account, CandleInterval, InstrumentInfo, Operation, OrderBook, PortfolioSnapshot, PricePoint,
};

/// Brokerage client trait (Strategy pattern)
///
/// Implement this per broker backend. Transport concerns - authentication,
/// retries, backoff - belong to the implementation. Callers treat every
/// method except `get_accounts` as degradable: a failure is absorbed into a
/// zero or empty default instead of aborting the batch.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// List the investor's accounts. The analytics run cannot proceed
    /// without this call succeeding.
    async fn get_accounts(&self) -> Result<Vec<Account>>;

    /// Current portfolio snapshot for one account.
    async fn get_portfolio(&self, account_id: &str) -> Result<PortfolioSnapshot>;

    /// Executed operations for one account within a time window.
    async fn get_operations(
        &self,
        account_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Operation>>;

    /// Historical candles for one instrument. Order is not guaranteed.
    async fn get_candles(
        &self,
        figi: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        interval: CandleInterval,
    ) -> Result<Vec<PricePoint>>;

    /// Order book snapshot, `None` when the instrument has no book.
    async fn get_order_book(&self, figi: &str, depth: u32) -> Result<Option<OrderBook>>;

    /// Reference data for one instrument, `None` when unknown.
    async fn get_instrument_by(&self, figi: &str) -> Result<Option<InstrumentInfo>>;

    /// Tradable instrument universe, used as the substitute catalog.
    async fn list_instruments(&self) -> Result<Vec<InstrumentInfo>>;

    /// Check if the backend is reachable.
    async fn health_check(&self) -> bool;

    /// Backend name for logs and health reporting.
    fn name(&self) -> &str;
}
