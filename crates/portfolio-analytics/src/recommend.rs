//! Rebalancing Recommendations
//!
//! Every held position is evaluated against a fixed-order table of risk and
//! liquidity rules. A triggered rule flips the action to SELL, compounds a
//! weight reduction (clamped at zero) and records its reasoning. Positions
//! flagged for sale get a different-sector substitute search over the
//! instrument catalog, scored by risk-adjusted return and liquidity.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::broker::BrokerClient;
use crate::error::AnalyticsError;
use crate::model::{InstrumentInfo, LiquidityMetrics, PortfolioSnapshot, PricePoint, RiskMetrics};
use crate::signal::{
    DEFAULT_ORDER_BOOK_DEPTH, DEFAULT_RISK_FREE_RATE, MarketSignalAnalyzer, PositionSignals,
    round2,
};

/// Trailing window for historical analysis, days.
pub const ANALYSIS_WINDOW_DAYS: i64 = 365;

/// Recommended action for one instrument.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

/// Requested risk appetite. Accepted and echoed in the response; the rule
/// thresholds are currently shared across profiles.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskProfile {
    Conservative,
    #[default]
    Moderate,
    Aggressive,
}

impl FromStr for RiskProfile {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "conservative" => Ok(Self::Conservative),
            "moderate" => Ok(Self::Moderate),
            "aggressive" => Ok(Self::Aggressive),
            other => Err(AnalyticsError::InvalidRiskProfile(other.to_string())),
        }
    }
}

/// Inputs a rebalancing rule can inspect.
pub struct RuleContext<'a> {
    pub risk: &'a RiskMetrics,
    pub liquidity: &'a LiquidityMetrics,
    pub sector: &'a str,
    /// Portfolio share of this position's sector, as a fraction.
    pub sector_exposure: f64,
}

/// One rebalancing heuristic.
pub struct RebalanceRule {
    pub name: &'static str,
    /// Target-weight reduction applied when the rule fires.
    pub weight_delta: f64,
    pub triggered: fn(&RuleContext) -> bool,
    pub reason: fn(&RuleContext) -> String,
}

/// Fixed evaluation order. Deltas of all triggered rules compound.
pub const REBALANCE_RULES: &[RebalanceRule] = &[
    RebalanceRule {
        name: "high_volatility",
        weight_delta: 0.05,
        triggered: |ctx| ctx.risk.volatility > 30.0,
        reason: |ctx| format!("High volatility ({:.2}%)", ctx.risk.volatility),
    },
    RebalanceRule {
        name: "low_sharpe",
        weight_delta: 0.03,
        triggered: |ctx| ctx.risk.sharpe_ratio < 0.5,
        reason: |ctx| format!("Low Sharpe ratio ({:.2})", ctx.risk.sharpe_ratio),
    },
    RebalanceRule {
        name: "deep_drawdown",
        weight_delta: 0.04,
        triggered: |ctx| ctx.risk.max_drawdown > 20.0,
        reason: |ctx| format!("Deep maximum drawdown ({:.2}%)", ctx.risk.max_drawdown),
    },
    RebalanceRule {
        name: "wide_spread",
        weight_delta: 0.02,
        triggered: |ctx| ctx.liquidity.spread_percentage > 1.0,
        reason: |ctx| format!("Wide bid-ask spread ({:.4}%)", ctx.liquidity.spread_percentage),
    },
    RebalanceRule {
        name: "sector_concentration",
        weight_delta: 0.05,
        triggered: |ctx| ctx.sector_exposure > 0.25,
        reason: |ctx| {
            format!(
                "Concentrated exposure to the {} sector ({:.1}%)",
                ctx.sector,
                ctx.sector_exposure * 100.0
            )
        },
    },
];

/// Outcome of running the rule table over one position.
pub struct RuleOutcome {
    pub action: Action,
    pub target_weight: f64,
    pub reasoning: Vec<String>,
}

/// Evaluate the rule table for a position at `current_weight`.
pub fn apply_rules(ctx: &RuleContext, current_weight: f64) -> RuleOutcome {
    let mut reasoning = Vec::new();
    let mut reduction = 0.0_f64;
    for rule in REBALANCE_RULES {
        if (rule.triggered)(ctx) {
            reasoning.push((rule.reason)(ctx));
            reduction += rule.weight_delta;
        }
    }
    let action = if reasoning.is_empty() { Action::Hold } else { Action::Sell };
    RuleOutcome {
        action,
        target_weight: (current_weight - reduction).max(0.0),
        reasoning,
    }
}

/// Instrument fields carried on a recommendation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InstrumentSummary {
    pub figi: String,
    pub ticker: String,
    pub name: String,
    pub instrument_type: String,
    pub sector: String,
    pub currency: String,
}

impl From<&InstrumentInfo> for InstrumentSummary {
    fn from(info: &InstrumentInfo) -> Self {
        Self {
            figi: info.figi.clone(),
            ticker: info.ticker.clone(),
            name: info.name.clone(),
            instrument_type: info.instrument_type.clone(),
            sector: info.sector.clone(),
            currency: info.currency.clone(),
        }
    }
}

/// Trailing-window performance evidence attached to a recommendation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoricalPerformance {
    /// Close-to-close return over the window, percent.
    pub return_1y: f64,
    /// Mean daily traded volume over the window.
    pub avg_daily_volume: f64,
}

/// One buy/sell/hold recommendation with its supporting evidence.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Recommendation {
    pub instrument: InstrumentSummary,
    pub action: Action,
    /// Weights as fractions of total portfolio value.
    pub current_weight: f64,
    pub target_weight: f64,
    pub quantity: i64,
    pub expected_price: Decimal,
    pub reasoning: Vec<String>,
    pub risk_metrics: RiskMetrics,
    pub liquidity_metrics: LiquidityMetrics,
    pub historical_performance: HistoricalPerformance,
}

/// Recommendation set for one account.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccountRecommendations {
    pub account_id: String,
    pub account_name: String,
    pub risk_profile: RiskProfile,
    pub recommendations: Vec<Recommendation>,
}

/// Produces per-account recommendation sets from portfolio composition and
/// market signals.
pub struct RecommendationEngine {
    broker: Arc<dyn BrokerClient>,
    signals: MarketSignalAnalyzer,
}

impl RecommendationEngine {
    pub fn new(broker: Arc<dyn BrokerClient>) -> Self {
        Self {
            signals: MarketSignalAnalyzer::new(broker.clone()),
            broker,
        }
    }

    /// Recommendation sets for every account, in account order.
    pub async fn recommendations(
        &self,
        portfolios: &BTreeMap<String, PortfolioSnapshot>,
        profile: RiskProfile,
    ) -> Vec<AccountRecommendations> {
        let mut sets = Vec::with_capacity(portfolios.len());
        for snapshot in portfolios.values() {
            sets.push(AccountRecommendations {
                account_id: snapshot.account_id.clone(),
                account_name: snapshot.account_name.clone(),
                risk_profile: profile,
                recommendations: self.evaluate_portfolio(snapshot).await,
            });
        }
        sets
    }

    /// Evaluate every resolvable position of one portfolio.
    pub async fn evaluate_portfolio(&self, snapshot: &PortfolioSnapshot) -> Vec<Recommendation> {
        let total = snapshot.total_amount.value.to_f64().unwrap_or(0.0);
        if total <= 0.0 || snapshot.positions.is_empty() {
            return Vec::new();
        }

        let to = Utc::now();
        let from = to - Duration::days(ANALYSIS_WINDOW_DAYS);

        // Resolve instrument reference data once per position; positions
        // without it cannot be evaluated and are skipped.
        let mut resolved = Vec::with_capacity(snapshot.positions.len());
        for position in &snapshot.positions {
            match self.broker.get_instrument_by(&position.figi).await {
                Ok(Some(info)) => resolved.push((position, info)),
                Ok(None) => {
                    tracing::warn!(figi = %position.figi, "instrument not found, skipping position");
                }
                Err(e) => {
                    tracing::warn!(figi = %position.figi, error = %e, "instrument lookup failed, skipping position");
                }
            }
        }

        let mut sector_exposure: BTreeMap<&str, f64> = BTreeMap::new();
        for (position, info) in &resolved {
            let weight = position.value().to_f64().unwrap_or(0.0) / total;
            *sector_exposure.entry(info.sector.as_str()).or_insert(0.0) += weight;
        }

        // Per-position metrics and the cross-holding correlation matrix.
        let analysis = self.signals.portfolio_risk(snapshot, from, to).await;

        let mut recommendations = Vec::new();
        for (position, info) in &resolved {
            let PositionSignals {
                risk_metrics: risk,
                liquidity_metrics: liquidity,
            } = analysis
                .position_analysis
                .get(&position.figi)
                .cloned()
                .unwrap_or_default();
            let history = self.signals.price_history(&position.figi, from, to).await;

            let current_weight = position.value().to_f64().unwrap_or(0.0) / total;
            let ctx = RuleContext {
                risk: &risk,
                liquidity: &liquidity,
                sector: &info.sector,
                sector_exposure: sector_exposure.get(info.sector.as_str()).copied().unwrap_or(0.0),
            };
            let outcome = apply_rules(&ctx, current_weight);

            if outcome.action == Action::Sell {
                if let Some(substitute) = self
                    .find_substitute(info, &risk, &liquidity, outcome.target_weight, total, from, to)
                    .await
                {
                    recommendations.push(substitute);
                }
            }

            recommendations.push(Recommendation {
                instrument: InstrumentSummary::from(info),
                action: outcome.action,
                current_weight,
                target_weight: outcome.target_weight,
                quantity: position.quantity.trunc().to_i64().unwrap_or(0),
                expected_price: position.average_price,
                reasoning: outcome.reasoning,
                risk_metrics: risk,
                liquidity_metrics: liquidity,
                historical_performance: historical_performance(&history),
            });
        }
        recommendations
    }

    /// Search the catalog for a better different-sector instrument.
    ///
    /// Candidates must beat the current position on Sharpe, volatility and
    /// spread simultaneously; among those the composite
    /// `(sharpe / volatility) * (1 / (1 + spread%))` decides.
    #[allow(clippy::too_many_arguments)]
    async fn find_substitute(
        &self,
        current: &InstrumentInfo,
        current_risk: &RiskMetrics,
        current_liquidity: &LiquidityMetrics,
        target_weight: f64,
        total_value: f64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Option<Recommendation> {
        let catalog = match self.broker.list_instruments().await {
            Ok(catalog) => catalog,
            Err(e) => {
                tracing::warn!(error = %e, "instrument catalog unavailable, skipping substitute search");
                return None;
            }
        };

        let mut best: Option<(f64, Recommendation)> = None;
        for candidate in catalog {
            if candidate.sector == current.sector || candidate.figi == current.figi {
                continue;
            }

            let history = self.signals.price_history(&candidate.figi, from, to).await;
            if history.len() < 2 {
                continue;
            }
            let closes: Vec<Decimal> = history.iter().map(|c| c.close).collect();
            let risk = MarketSignalAnalyzer::risk_metrics(&closes, DEFAULT_RISK_FREE_RATE);
            let book = self.signals.order_book(&candidate.figi, DEFAULT_ORDER_BOOK_DEPTH).await;
            let liquidity = MarketSignalAnalyzer::liquidity_metrics(book.as_ref());

            let qualifies = risk.sharpe_ratio > current_risk.sharpe_ratio
                && risk.volatility < current_risk.volatility
                && liquidity.spread_percentage < current_liquidity.spread_percentage;
            if !qualifies {
                continue;
            }

            let score = (risk.sharpe_ratio / risk.volatility)
                * (1.0 / (1.0 + liquidity.spread_percentage));
            if !score.is_finite() {
                continue;
            }
            if best.as_ref().is_some_and(|(s, _)| score <= *s) {
                continue;
            }

            let last_close = closes.last().copied().unwrap_or(Decimal::ZERO);
            let price = last_close.to_f64().unwrap_or(0.0);
            let quantity = if price > 0.0 {
                (target_weight * total_value / price).trunc() as i64
            } else {
                0
            };

            best = Some((
                score,
                Recommendation {
                    instrument: InstrumentSummary::from(&candidate),
                    action: Action::Buy,
                    current_weight: 0.0,
                    target_weight,
                    quantity,
                    expected_price: last_close,
                    reasoning: vec![
                        format!(
                            "Stronger risk metrics (Sharpe {:.2}, volatility {:.2}%)",
                            risk.sharpe_ratio, risk.volatility
                        ),
                        format!("Better liquidity (spread {:.4}%)", liquidity.spread_percentage),
                        format!(
                            "Diversifies out of the {} sector into {}",
                            current.sector, candidate.sector
                        ),
                    ],
                    risk_metrics: risk,
                    liquidity_metrics: liquidity,
                    historical_performance: historical_performance(&history),
                },
            ));
        }
        best.map(|(_, recommendation)| recommendation)
    }
}

/// Window return and mean daily volume of one price series.
fn historical_performance(history: &[PricePoint]) -> HistoricalPerformance {
    if history.len() < 2 {
        return HistoricalPerformance::default();
    }
    let first = history.first().and_then(|c| c.close.to_f64()).unwrap_or(0.0);
    let last = history.last().and_then(|c| c.close.to_f64()).unwrap_or(0.0);
    let return_1y = if first == 0.0 { 0.0 } else { (last / first - 1.0) * 100.0 };
    let avg_daily_volume =
        history.iter().map(|c| c.volume as f64).sum::<f64>() / history.len() as f64;
    HistoricalPerformance {
        return_1y: round2(return_1y),
        avg_daily_volume: round2(avg_daily_volume),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MockBrokerClient;
    use crate::model::{Account, Money, Position};
    use rust_decimal_macros::dec;

    fn metrics(volatility: f64, sharpe: f64, drawdown: f64) -> RiskMetrics {
        RiskMetrics {
            volatility,
            sharpe_ratio: sharpe,
            max_drawdown: drawdown,
            ..RiskMetrics::default()
        }
    }

    fn liquidity(spread: f64) -> LiquidityMetrics {
        LiquidityMetrics {
            spread_percentage: spread,
            ..LiquidityMetrics::default()
        }
    }

    #[test]
    fn test_single_volatility_trigger() {
        // A 60% position at 35% volatility, everything else healthy.
        let risk = metrics(35.0, 1.2, 10.0);
        let liq = liquidity(0.1);
        let ctx = RuleContext {
            risk: &risk,
            liquidity: &liq,
            sector: "energy",
            sector_exposure: 0.2,
        };

        let outcome = apply_rules(&ctx, 0.60);
        assert_eq!(outcome.action, Action::Sell);
        assert!((outcome.target_weight - 0.55).abs() < 1e-12);
        assert_eq!(outcome.reasoning.len(), 1);
        assert!(outcome.reasoning[0].contains("volatility"));
    }

    #[test]
    fn test_triggers_compound_in_order() {
        let risk = metrics(35.0, 0.4, 25.0);
        let liq = liquidity(1.5);
        let ctx = RuleContext {
            risk: &risk,
            liquidity: &liq,
            sector: "energy",
            sector_exposure: 0.3,
        };

        let outcome = apply_rules(&ctx, 0.60);
        assert_eq!(outcome.action, Action::Sell);
        assert_eq!(outcome.reasoning.len(), 5);
        // 0.60 - (0.05 + 0.03 + 0.04 + 0.02 + 0.05)
        assert!((outcome.target_weight - 0.41).abs() < 1e-12);
        // Reasons come out in rule-table order.
        assert!(outcome.reasoning[0].contains("volatility"));
        assert!(outcome.reasoning[4].contains("sector"));
    }

    #[test]
    fn test_target_weight_clamps_at_zero() {
        let risk = metrics(80.0, -0.5, 60.0);
        let liq = liquidity(3.0);
        let ctx = RuleContext {
            risk: &risk,
            liquidity: &liq,
            sector: "energy",
            sector_exposure: 0.9,
        };

        let outcome = apply_rules(&ctx, 0.10);
        assert_eq!(outcome.target_weight, 0.0);
    }

    #[test]
    fn test_healthy_position_holds() {
        let risk = metrics(15.0, 1.1, 8.0);
        let liq = liquidity(0.2);
        let ctx = RuleContext {
            risk: &risk,
            liquidity: &liq,
            sector: "utilities",
            sector_exposure: 0.1,
        };

        let outcome = apply_rules(&ctx, 0.20);
        assert_eq!(outcome.action, Action::Hold);
        assert!(outcome.reasoning.is_empty());
        assert!((outcome.target_weight - 0.20).abs() < 1e-12);
    }

    #[test]
    fn test_risk_profile_parsing() {
        assert_eq!("conservative".parse::<RiskProfile>().unwrap(), RiskProfile::Conservative);
        assert_eq!("AGGRESSIVE".parse::<RiskProfile>().unwrap(), RiskProfile::Aggressive);
        assert!("yolo".parse::<RiskProfile>().is_err());
        assert_eq!(RiskProfile::default(), RiskProfile::Moderate);
    }

    #[tokio::test]
    async fn test_flagged_position_gets_sell_and_substitute() {
        let broker = Arc::new(MockBrokerClient::new());
        let engine = RecommendationEngine::new(broker.clone());

        let portfolios = {
            let mut map = BTreeMap::new();
            for snapshot in [
                broker.get_portfolio("acc-001").await.unwrap(),
                broker.get_portfolio("acc-002").await.unwrap(),
            ] {
                map.insert(snapshot.account_id.clone(), snapshot);
            }
            map
        };

        let sets = engine.recommendations(&portfolios, RiskProfile::Moderate).await;
        assert_eq!(sets.len(), 2);
        assert!(sets.iter().all(|s| s.risk_profile == RiskProfile::Moderate));

        // The energy position is volatile, wide-spread and concentrated:
        // it must be flagged for sale with its reasons retained.
        let main = sets.iter().find(|s| s.account_id == "acc-001").unwrap();
        let energy = main
            .recommendations
            .iter()
            .find(|r| r.instrument.figi == "FG0000ENRG01")
            .unwrap();
        assert_eq!(energy.action, Action::Sell);
        assert!(energy.reasoning.len() >= 3);
        assert!(energy.target_weight < energy.current_weight);

        // A substitute from a different sector is proposed alongside.
        let substitute = main
            .recommendations
            .iter()
            .find(|r| r.action == Action::Buy)
            .unwrap();
        assert_ne!(substitute.instrument.sector, "energy");
        assert!(substitute.expected_price > Decimal::ZERO);
        assert!(substitute.quantity >= 0);
        assert!(substitute.risk_metrics.volatility < energy.risk_metrics.volatility);
        assert!(substitute.risk_metrics.sharpe_ratio > energy.risk_metrics.sharpe_ratio);
    }

    #[tokio::test]
    async fn test_diversified_calm_portfolio_holds() {
        let broker = Arc::new(MockBrokerClient::new());
        let engine = RecommendationEngine::new(broker.clone());

        let snapshot = broker.get_portfolio("acc-002").await.unwrap();
        let recommendations = engine.evaluate_portfolio(&snapshot).await;

        // Four calm, diversified positions: every evaluation holds and no
        // substitute purchase is proposed.
        assert_eq!(recommendations.len(), 4);
        assert!(recommendations.iter().all(|r| r.action == Action::Hold));
        assert!(recommendations.iter().all(|r| r.reasoning.is_empty()));
    }

    #[tokio::test]
    async fn test_empty_portfolio_yields_no_recommendations() {
        let broker = Arc::new(MockBrokerClient::new());
        let engine = RecommendationEngine::new(broker);

        let account = Account {
            id: "acc-x".into(),
            name: "Empty".into(),
            kind: "broker".into(),
            status: "open".into(),
            opened_date: None,
            closed_date: None,
        };
        let snapshot =
            PortfolioSnapshot::new(&account, Money::zero("USD"), vec![]);
        assert!(engine.evaluate_portfolio(&snapshot).await.is_empty());
    }

    #[tokio::test]
    async fn test_sell_without_qualifying_substitute_still_emitted() {
        let broker = Arc::new(MockBrokerClient::new());
        // Starve the substitute search: every catalog instrument except the
        // held one fails its history fetch.
        for figi in [
            "FG0000FINL02", "FG0000TECH03", "FG0000CONS04", "FG0000UTIL05",
            "FG0000HLTH06", "FG0000MATL07", "FG0000TLCM08", "FG0000GOVT09",
        ] {
            broker.fail_instrument(figi).await;
        }
        let engine = RecommendationEngine::new(broker.clone());

        let account = Account {
            id: "acc-y".into(),
            name: "Concentrated".into(),
            kind: "broker".into(),
            status: "open".into(),
            opened_date: None,
            closed_date: None,
        };
        let position = Position::new("FG0000ENRG01", dec!(40), dec!(430));
        let total = position.value();
        let snapshot = PortfolioSnapshot::new(&account, Money::new("USD", total), vec![position]);

        let recommendations = engine.evaluate_portfolio(&snapshot).await;
        assert_eq!(recommendations.len(), 1);
        assert_eq!(recommendations[0].action, Action::Sell);
        assert!(!recommendations[0].reasoning.is_empty());
    }

    #[test]
    fn test_historical_performance_over_series() {
        let mk = |close: f64, volume: i64| PricePoint {
            figi: "FG0000TEST01".into(),
            time: Utc::now(),
            close: Decimal::from_f64_retain(close).unwrap_or(Decimal::ZERO),
            volume,
        };
        let history = vec![mk(100.0, 1_000), mk(105.0, 3_000), mk(120.0, 2_000)];
        let perf = historical_performance(&history);
        assert_eq!(perf.return_1y, 20.0);
        assert_eq!(perf.avg_daily_volume, 2_000.0);

        assert_eq!(historical_performance(&[]), HistoricalPerformance::default());
    }
}
