//! Application State

use std::sync::Arc;

use portfolio_analytics::{AccountAggregator, BrokerClient, RecommendationEngine};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Brokerage backend the analytics run against.
    pub broker: Arc<dyn BrokerClient>,

    /// Account, portfolio and operation fetching.
    pub aggregator: AccountAggregator,

    /// Rebalancing recommendation engine.
    pub recommender: Arc<RecommendationEngine>,
}
