//! Market Signals
//!
//! Per-instrument risk metrics from historical closes, liquidity metrics
//! from order books, and cross-instrument correlation. Every upstream fetch
//! failure degrades to "no data for this instrument" and never aborts a
//! batch; degenerate inputs resolve to zero-valued metrics.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::broker::BrokerClient;
use crate::model::{
    CandleInterval, LiquidityMetrics, OrderBook, PortfolioSnapshot, PricePoint, RiskMetrics,
};

/// Annualization base for daily returns.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Default annual risk-free rate for Sharpe/Sortino.
pub const DEFAULT_RISK_FREE_RATE: f64 = 0.045;

/// Default order book depth for liquidity queries.
pub const DEFAULT_ORDER_BOOK_DEPTH: u32 = 20;

/// Pairwise correlation of percentage changes between instruments.
/// Instruments without enough history are excluded; the diagonal of every
/// included instrument is 1.0, so a single survivor yields a 1x1 matrix.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    values: BTreeMap<String, BTreeMap<String, f64>>,
}

impl CorrelationMatrix {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn instruments(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        self.values.get(a).and_then(|row| row.get(b)).copied()
    }
}

/// Risk and liquidity evidence for one held instrument.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PositionSignals {
    pub risk_metrics: RiskMetrics,
    pub liquidity_metrics: LiquidityMetrics,
}

/// Per-position signals and cross-holding correlation of one portfolio.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PortfolioRiskAnalysis {
    pub position_analysis: BTreeMap<String, PositionSignals>,
    pub correlation_matrix: CorrelationMatrix,
}

/// Computes market signals over the brokerage collaborator.
#[derive(Clone)]
pub struct MarketSignalAnalyzer {
    broker: Arc<dyn BrokerClient>,
}

impl MarketSignalAnalyzer {
    pub fn new(broker: Arc<dyn BrokerClient>) -> Self {
        Self { broker }
    }

    /// Daily closes for the window, sorted ascending.
    /// A fetch failure is logged and degrades to an empty series.
    pub async fn price_history(
        &self,
        figi: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Vec<PricePoint> {
        match self.broker.get_candles(figi, from, to, CandleInterval::Day).await {
            Ok(mut candles) => {
                candles.sort_by_key(|c| c.time);
                candles
            }
            Err(e) => {
                tracing::warn!(figi, error = %e, "candle fetch failed, treating as no data");
                Vec::new()
            }
        }
    }

    /// Order book snapshot, `None` on failure or when absent.
    pub async fn order_book(&self, figi: &str, depth: u32) -> Option<OrderBook> {
        match self.broker.get_order_book(figi, depth).await {
            Ok(book) => book,
            Err(e) => {
                tracing::warn!(figi, error = %e, "order book fetch failed, treating as absent");
                None
            }
        }
    }

    /// Risk metrics over one close series.
    ///
    /// Volatility annualizes the sample deviation of simple returns by
    /// sqrt(252); Sortino uses the deviation of negative returns only; max
    /// drawdown is the worst peak-to-trough of the compounded return curve;
    /// VaR is the interpolated 5th/1st return percentile. Fewer than two
    /// points yields all zeros.
    pub fn risk_metrics(prices: &[Decimal], risk_free_rate: f64) -> RiskMetrics {
        let closes: Vec<f64> = prices.iter().filter_map(Decimal::to_f64).collect();
        if closes.len() < 2 {
            return RiskMetrics::default();
        }

        let returns: Vec<f64> = closes
            .windows(2)
            .filter(|w| w[0] != 0.0)
            .map(|w| w[1] / w[0] - 1.0)
            .collect();
        if returns.is_empty() {
            return RiskMetrics::default();
        }

        let volatility = sample_std(&returns) * TRADING_DAYS_PER_YEAR.sqrt();
        let annual_return = mean(&returns) * TRADING_DAYS_PER_YEAR;
        let excess_return = annual_return - risk_free_rate;
        let sharpe_ratio = if volatility == 0.0 { 0.0 } else { excess_return / volatility };

        let downside: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
        let downside_std = sample_std(&downside) * TRADING_DAYS_PER_YEAR.sqrt();
        let sortino_ratio = if downside_std == 0.0 { 0.0 } else { excess_return / downside_std };

        let mut cumulative = 1.0_f64;
        let mut peak = f64::MIN;
        let mut max_drawdown = 0.0_f64;
        for r in &returns {
            cumulative *= 1.0 + r;
            peak = peak.max(cumulative);
            max_drawdown = max_drawdown.max((peak - cumulative) / peak);
        }

        let var_95 = percentile(&returns, 5.0).abs();
        let var_99 = percentile(&returns, 1.0).abs();
        let (skewness, kurtosis) = shape_moments(&returns);

        RiskMetrics {
            volatility: round2(volatility * 100.0),
            sharpe_ratio: round2(sharpe_ratio),
            sortino_ratio: round2(sortino_ratio),
            max_drawdown: round2(max_drawdown * 100.0),
            var_95: round2(var_95 * 100.0),
            var_99: round2(var_99 * 100.0),
            skewness: round2(skewness),
            kurtosis: round2(kurtosis),
        }
    }

    /// Liquidity metrics over one order book snapshot.
    /// An absent or one-sided book yields all zeros.
    pub fn liquidity_metrics(book: Option<&OrderBook>) -> LiquidityMetrics {
        let Some(book) = book else {
            return LiquidityMetrics::default();
        };
        let (Some(best_bid), Some(best_ask)) = (book.bids.first(), book.asks.first()) else {
            return LiquidityMetrics::default();
        };

        let bid = best_bid.price.to_f64().unwrap_or(0.0);
        let ask = best_ask.price.to_f64().unwrap_or(0.0);
        let mid = (bid + ask) / 2.0;
        let spread_percentage = if mid == 0.0 { 0.0 } else { (ask - bid) / mid * 100.0 };

        let depth_volume: f64 = book
            .bids
            .iter()
            .chain(book.asks.iter())
            .map(|level| level.quantity as f64)
            .sum();

        let mut weighted = 0.0_f64;
        let mut weight = 0.0_f64;
        for (bid, ask) in book.bids.iter().zip(book.asks.iter()) {
            let volume = (bid.quantity + ask.quantity) as f64 / 2.0;
            let spread = (ask.price - bid.price).to_f64().unwrap_or(0.0);
            weighted += spread * volume;
            weight += volume;
        }
        let weighted_average_spread = if weight > 0.0 { weighted / weight } else { 0.0 };

        LiquidityMetrics {
            spread_percentage: round4(spread_percentage),
            depth_volume: round2(depth_volume),
            weighted_average_spread: round4(weighted_average_spread),
        }
    }

    /// Risk view of a whole portfolio: per-position risk and liquidity
    /// metrics plus the cross-holding correlation matrix.
    pub async fn portfolio_risk(
        &self,
        snapshot: &PortfolioSnapshot,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> PortfolioRiskAnalysis {
        let figis: Vec<String> = snapshot.positions.iter().map(|p| p.figi.clone()).collect();

        let mut position_analysis = BTreeMap::new();
        for figi in &figis {
            let history = self.price_history(figi, from, to).await;
            let closes: Vec<Decimal> = history.iter().map(|c| c.close).collect();
            let book = self.order_book(figi, DEFAULT_ORDER_BOOK_DEPTH).await;
            position_analysis.insert(
                figi.clone(),
                PositionSignals {
                    risk_metrics: Self::risk_metrics(&closes, DEFAULT_RISK_FREE_RATE),
                    liquidity_metrics: Self::liquidity_metrics(book.as_ref()),
                },
            );
        }

        PortfolioRiskAnalysis {
            position_analysis,
            correlation_matrix: self.correlation_matrix(&figis, from, to).await,
        }
    }

    /// Correlation of percentage changes between the given instruments over
    /// the window. Instruments whose series yields fewer than two returns
    /// are silently excluded.
    pub async fn correlation_matrix(
        &self,
        figis: &[String],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> CorrelationMatrix {
        let mut series: Vec<(String, Vec<f64>)> = Vec::new();
        for figi in figis {
            if series.iter().any(|(f, _)| f == figi) {
                continue;
            }
            let candles = self.price_history(figi, from, to).await;
            let closes: Vec<f64> = candles.iter().filter_map(|c| c.close.to_f64()).collect();
            let returns: Vec<f64> = closes
                .windows(2)
                .filter(|w| w[0] != 0.0)
                .map(|w| w[1] / w[0] - 1.0)
                .collect();
            if returns.len() < 2 {
                tracing::debug!(figi, "insufficient history, excluded from correlation matrix");
                continue;
            }
            series.push((figi.clone(), returns));
        }

        let mut values = BTreeMap::new();
        for (fa, ra) in &series {
            let mut row = BTreeMap::new();
            for (fb, rb) in &series {
                let c = if fa == fb { 1.0 } else { pearson(ra, rb) };
                row.insert(fb.clone(), round4(c));
            }
            values.insert(fa.clone(), row);
        }
        CorrelationMatrix { values }
    }
}

fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        0.0
    } else {
        xs.iter().sum::<f64>() / xs.len() as f64
    }
}

/// Sample standard deviation; zero for fewer than two observations.
fn sample_std(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let m = mean(xs);
    let variance = xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (xs.len() - 1) as f64;
    variance.sqrt()
}

/// Linearly interpolated percentile over unsorted data.
fn percentile(xs: &[f64], pct: f64) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    let mut sorted = xs.to_vec();
    sorted.sort_by(f64::total_cmp);
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = pct / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}

/// Standardized skewness and excess kurtosis.
fn shape_moments(xs: &[f64]) -> (f64, f64) {
    if xs.len() < 2 {
        return (0.0, 0.0);
    }
    let n = xs.len() as f64;
    let m = mean(xs);
    let m2 = xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / n;
    if m2 == 0.0 {
        return (0.0, 0.0);
    }
    let m3 = xs.iter().map(|x| (x - m).powi(3)).sum::<f64>() / n;
    let m4 = xs.iter().map(|x| (x - m).powi(4)).sum::<f64>() / n;
    (m3 / m2.powf(1.5), m4 / (m2 * m2) - 3.0)
}

/// Pearson correlation over the common prefix of two series.
/// Zero-variance inputs map to 0.0 to keep reports JSON-clean.
fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n < 2 {
        return 0.0;
    }
    let (a, b) = (&a[..n], &b[..n]);
    let (ma, mb) = (mean(a), mean(b));
    let mut cov = 0.0_f64;
    let mut va = 0.0_f64;
    let mut vb = 0.0_f64;
    for i in 0..n {
        let da = a[i] - ma;
        let db = b[i] - mb;
        cov += da * db;
        va += da * da;
        vb += db * db;
    }
    let denom = (va * vb).sqrt();
    if denom == 0.0 { 0.0 } else { cov / denom }
}

pub(crate) fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}
