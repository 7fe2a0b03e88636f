//! HTTP Handlers

use std::collections::BTreeMap;

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use portfolio_analytics::{
    Account, AccountRecommendations, AnalyticsEngine, AnalyticsError, CashFlowReport,
    PerformanceReport, PnlReport, PortfolioSnapshot, RiskProfile,
};

use crate::state::AppState;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub broker: String,
    pub broker_connected: bool,
}

#[derive(Serialize)]
pub struct AccountsResponse {
    pub accounts: Vec<Account>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Calendar-date window shared by every report endpoint.
#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct RecommendationQuery {
    #[serde(default)]
    pub risk_profile: Option<String>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn internal_error(err: AnalyticsError) -> ApiError {
    let code = match &err {
        AnalyticsError::AccountDiscovery(_) => "ACCOUNT_DISCOVERY_FAILED",
        _ => "INTERNAL_ERROR",
    };
    tracing::error!(error = %err, "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: err.to_string(),
            code: code.into(),
        }),
    )
}

/// Expand calendar dates into an inclusive UTC day range.
fn day_bounds(from: NaiveDate, to: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = Utc.from_utc_datetime(&from.and_time(NaiveTime::MIN));
    let next_day = to.succ_opt().unwrap_or(to);
    let end = Utc.from_utc_datetime(&next_day.and_time(NaiveTime::MIN))
        - chrono::Duration::microseconds(1);
    (start, end)
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let broker_connected = state.broker.health_check().await;

    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        broker: state.broker.name().to_string(),
        broker_connected,
    })
}

/// All of the investor's accounts.
pub async fn list_accounts(
    State(state): State<AppState>,
) -> Result<Json<AccountsResponse>, ApiError> {
    let accounts = state.aggregator.list_accounts().await.map_err(internal_error)?;
    Ok(Json(AccountsResponse { accounts }))
}

/// Current portfolio snapshot per account.
pub async fn portfolio(
    State(state): State<AppState>,
) -> Result<Json<BTreeMap<String, PortfolioSnapshot>>, ApiError> {
    let portfolios = state.aggregator.portfolios().await.map_err(internal_error)?;
    Ok(Json(portfolios))
}

/// Consolidated P&L over the date window.
pub async fn pnl_report(
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> Result<Json<PnlReport>, ApiError> {
    let (from, to) = day_bounds(query.from_date, query.to_date);
    let ledger = state.aggregator.operations(from, to).await.map_err(internal_error)?;
    Ok(Json(AnalyticsEngine::pnl(&ledger)))
}

/// Consolidated cash flow over the date window.
pub async fn cash_flow_report(
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> Result<Json<CashFlowReport>, ApiError> {
    let (from, to) = day_bounds(query.from_date, query.to_date);
    let ledger = state.aggregator.operations(from, to).await.map_err(internal_error)?;
    Ok(Json(AnalyticsEngine::cash_flow(&ledger)))
}

/// Invested-vs-current performance over the date window.
pub async fn performance_report(
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> Result<Json<PerformanceReport>, ApiError> {
    let (from, to) = day_bounds(query.from_date, query.to_date);
    let ledger = state.aggregator.operations(from, to).await.map_err(internal_error)?;
    let portfolios = state.aggregator.portfolios().await.map_err(internal_error)?;
    Ok(Json(AnalyticsEngine::performance(&ledger, &portfolios)))
}

/// Per-account rebalancing recommendation sets.
pub async fn recommendations(
    State(state): State<AppState>,
    Query(query): Query<RecommendationQuery>,
) -> Result<Json<Vec<AccountRecommendations>>, ApiError> {
    let profile = match query.risk_profile.as_deref() {
        None => RiskProfile::default(),
        Some(raw) => raw.parse::<RiskProfile>().map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: e.to_string(),
                    code: "INVALID_RISK_PROFILE".into(),
                }),
            )
        })?,
    };

    let portfolios = state.aggregator.portfolios().await.map_err(internal_error)?;
    Ok(Json(state.recommender.recommendations(&portfolios, profile).await))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_day_bounds_cover_the_whole_days() {
        let from = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2025, 1, 31).unwrap();
        let (start, end) = day_bounds(from, to);

        assert_eq!(start.to_rfc3339(), "2025-01-01T00:00:00+00:00");
        // End of the last day, not its midnight.
        assert!(end > Utc.with_ymd_and_hms(2025, 1, 31, 23, 59, 58).unwrap());
        assert!(end < Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_day_bounds_single_day() {
        let day = NaiveDate::from_ymd_opt(2025, 6, 15).unwrap();
        let (start, end) = day_bounds(day, day);
        assert!(start < end);
        assert_eq!(start.date_naive(), end.date_naive());
    }
}
