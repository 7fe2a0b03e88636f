//! Account Aggregation
//!
//! Pulls per-account data from the brokerage collaborator for one analytics
//! run. Account discovery is the only fatal call; every per-account fetch
//! failure is logged and absorbed as a zero-valued, degraded-flagged entry
//! so one unreachable account never poisons the batch.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::broker::BrokerClient;
use crate::error::{AnalyticsError, Result};
use crate::ledger::{AccountOperations, OperationLedger};
use crate::model::{Account, PortfolioSnapshot};

/// Currency used for the zero-valued snapshot of an unreachable account.
const FALLBACK_CURRENCY: &str = "USD";

/// Fetches and merges per-account data for one run.
#[derive(Clone)]
pub struct AccountAggregator {
    broker: Arc<dyn BrokerClient>,
}

impl AccountAggregator {
    pub fn new(broker: Arc<dyn BrokerClient>) -> Self {
        Self { broker }
    }

    /// List the investor's accounts. Failure aborts the whole run.
    pub async fn list_accounts(&self) -> Result<Vec<Account>> {
        self.broker
            .get_accounts()
            .await
            .map_err(|e| AnalyticsError::AccountDiscovery(e.to_string()))
    }

    /// One portfolio snapshot per account, keyed by account id.
    pub async fn portfolios(&self) -> Result<BTreeMap<String, PortfolioSnapshot>> {
        let accounts = self.list_accounts().await?;
        let mut snapshots = BTreeMap::new();
        for account in &accounts {
            let snapshot = match self.broker.get_portfolio(&account.id).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    tracing::warn!(
                        account = %account.id,
                        error = %e,
                        "portfolio fetch failed, degrading to zero snapshot"
                    );
                    PortfolioSnapshot::unavailable(account, FALLBACK_CURRENCY)
                }
            };
            snapshots.insert(account.id.clone(), snapshot);
        }
        Ok(snapshots)
    }

    /// Classified operations per account over the window.
    pub async fn operations(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<OperationLedger> {
        let accounts = self.list_accounts().await?;
        let mut ledger = OperationLedger::new();
        for account in accounts {
            let entry = match self.broker.get_operations(&account.id, from, to).await {
                Ok(operations) => AccountOperations {
                    account,
                    operations,
                    degraded: false,
                },
                Err(e) => {
                    tracing::warn!(
                        account = %account.id,
                        error = %e,
                        "operations fetch failed, degrading to empty set"
                    );
                    AccountOperations {
                        account,
                        operations: Vec::new(),
                        degraded: true,
                    }
                }
            };
            ledger.insert(entry);
        }
        Ok(ledger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MockBrokerClient;
    use chrono::Duration;
    use rust_decimal::Decimal;

    fn window() -> (DateTime<Utc>, DateTime<Utc>) {
        let to = Utc::now();
        (to - Duration::days(365), to)
    }

    #[tokio::test]
    async fn test_portfolios_for_all_accounts() {
        let broker = Arc::new(MockBrokerClient::new());
        let aggregator = AccountAggregator::new(broker);

        let portfolios = aggregator.portfolios().await.unwrap();
        assert_eq!(portfolios.len(), 2);
        assert!(portfolios.values().all(|s| !s.degraded));
    }

    #[tokio::test]
    async fn test_failed_account_degrades_to_zero_snapshot() {
        let broker = Arc::new(MockBrokerClient::new());
        broker.fail_account("acc-001").await;
        let aggregator = AccountAggregator::new(broker);

        let portfolios = aggregator.portfolios().await.unwrap();
        assert_eq!(portfolios.len(), 2);

        let failed = &portfolios["acc-001"];
        assert!(failed.degraded);
        assert_eq!(failed.total_amount.value, Decimal::ZERO);
        assert!(failed.positions.is_empty());

        // The other account is unaffected.
        let healthy = &portfolios["acc-002"];
        assert!(!healthy.degraded);
        assert!(healthy.total_amount.value > Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_failed_operations_degrade_to_empty_set() {
        let broker = Arc::new(MockBrokerClient::new());
        broker.fail_account("acc-002").await;
        let aggregator = AccountAggregator::new(broker);

        let (from, to) = window();
        let ledger = aggregator.operations(from, to).await.unwrap();
        assert_eq!(ledger.len(), 2);

        let failed = ledger.account("acc-002").unwrap();
        assert!(failed.degraded);
        assert!(failed.operations.is_empty());

        let healthy = ledger.account("acc-001").unwrap();
        assert!(!healthy.degraded);
        assert!(!healthy.operations.is_empty());
    }

    #[tokio::test]
    async fn test_account_listing_failure_is_fatal() {
        let broker = Arc::new(MockBrokerClient::new());
        broker.fail_account_listing().await;
        let aggregator = AccountAggregator::new(broker);

        let (from, to) = window();
        assert!(matches!(
            aggregator.list_accounts().await,
            Err(AnalyticsError::AccountDiscovery(_))
        ));
        assert!(aggregator.portfolios().await.is_err());
        assert!(aggregator.operations(from, to).await.is_err());
    }
}
