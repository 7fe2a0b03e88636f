//! Portfolio Analytics HTTP Server
//!
//! Axum-based server exposing consolidated multi-account reports and
//! rebalancing recommendations over a brokerage backend.

mod handlers;
mod state;

use std::sync::Arc;

use axum::{Router, routing::get};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use portfolio_analytics::{
    AccountAggregator, BrokerClient, MockBrokerClient, RecommendationEngine,
};

use crate::handlers::{
    cash_flow_report, health_check, list_accounts, performance_report, pnl_report, portfolio,
    recommendations,
};
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    // Initialize brokerage backend. The mock ships deterministic demo data;
    // a real backend plugs in behind the same trait.
    let broker: Arc<dyn BrokerClient> = Arc::new(MockBrokerClient::new());

    if broker.health_check().await {
        tracing::info!("✓ Connected to {}", broker.name());
    } else {
        tracing::warn!("⚠ {} not reachable - reports will fail", broker.name());
    }

    // Build application state
    let state = AppState {
        aggregator: AccountAggregator::new(broker.clone()),
        recommender: Arc::new(RecommendationEngine::new(broker.clone())),
        broker,
    };

    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build router
    let app = Router::new()
        // Health & info
        .route("/health", get(health_check))
        // Accounts & portfolio
        .route("/accounts", get(list_accounts))
        .route("/portfolio", get(portfolio))
        // Reports
        .route("/reports/pnl", get(pnl_report))
        .route("/reports/cash-flow", get(cash_flow_report))
        .route("/reports/portfolio-performance", get(performance_report))
        // Recommendations
        .route("/portfolio/recommendations", get(recommendations))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".into());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 analytics-server running on http://{}", addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("");
    tracing::info!("Endpoints:");
    tracing::info!("  GET /health                           - Health check");
    tracing::info!("  GET /accounts                         - List accounts");
    tracing::info!("  GET /portfolio                        - Portfolio per account");
    tracing::info!("  GET /reports/pnl                      - P&L report");
    tracing::info!("  GET /reports/cash-flow                - Cash flow report");
    tracing::info!("  GET /reports/portfolio-performance    - Performance report");
    tracing::info!("  GET /portfolio/recommendations        - Rebalancing advice");
    tracing::info!("");

    axum::serve(listener, app).await?;

    Ok(())
}
