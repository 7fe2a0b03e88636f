//! Mock Brokerage Client
//!
//! Deterministic stand-in for a real brokerage backend: a fixed instrument
//! universe, two accounts with canned portfolios and operation histories,
//! synthetic candle series and symmetric order books. Failures can be
//! injected per account or per instrument to exercise the degraded paths.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::RwLock;

use super::BrokerClient;
use crate::error::{AnalyticsError, Result};
use crate::model::{
    Account, CandleInterval, InstrumentInfo, Money, Operation, OrderBook, OrderBookLevel,
    PortfolioSnapshot, Position, PricePoint,
};

/// Synthetic price path parameters for one instrument.
///
/// Closes follow `base * (1 + drift * t/252 + amplitude * sin(0.37 t + phase))`,
/// so `amplitude` controls volatility and `drift` the annual trend.
struct InstrumentSpec {
    figi: &'static str,
    ticker: &'static str,
    name: &'static str,
    instrument_type: &'static str,
    sector: &'static str,
    lot: i64,
    base_price: f64,
    drift: f64,
    amplitude: f64,
    /// Half of the relative bid-ask spread.
    half_spread: f64,
    daily_volume: i64,
    book_volume: i64,
    phase: f64,
}

const INSTRUMENTS: &[InstrumentSpec] = &[
    InstrumentSpec { figi: "FG0000ENRG01", ticker: "NGE", name: "Northgate Energy", instrument_type: "share", sector: "energy", lot: 1, base_price: 450.0, drift: -0.05, amplitude: 0.18, half_spread: 0.02, daily_volume: 120_000, book_volume: 900, phase: 0.0 },
    InstrumentSpec { figi: "FG0000FINL02", ticker: "AVB", name: "Avangard Bank", instrument_type: "share", sector: "financials", lot: 10, base_price: 115.0, drift: 0.18, amplitude: 0.04, half_spread: 0.0008, daily_volume: 85_000, book_volume: 2_400, phase: 3.3 },
    InstrumentSpec { figi: "FG0000TECH03", ticker: "QNT", name: "Quantum Networks", instrument_type: "share", sector: "it", lot: 1, base_price: 310.0, drift: 0.08, amplitude: 0.12, half_spread: 0.003, daily_volume: 64_000, book_volume: 1_100, phase: 1.7 },
    InstrumentSpec { figi: "FG0000CONS04", ticker: "MRT", name: "Mercato Retail", instrument_type: "share", sector: "consumer", lot: 10, base_price: 80.0, drift: 0.16, amplitude: 0.03, half_spread: 0.001, daily_volume: 90_000, book_volume: 3_000, phase: 3.9 },
    InstrumentSpec { figi: "FG0000UTIL05", ticker: "HPW", name: "Hydropower Utilities", instrument_type: "etf", sector: "utilities", lot: 1, base_price: 50.0, drift: 0.14, amplitude: 0.015, half_spread: 0.0005, daily_volume: 150_000, book_volume: 5_200, phase: 4.0 },
    InstrumentSpec { figi: "FG0000HLTH06", ticker: "BIO", name: "Biogenica Health", instrument_type: "share", sector: "healthcare", lot: 1, base_price: 200.0, drift: 0.18, amplitude: 0.04, half_spread: 0.0012, daily_volume: 40_000, book_volume: 800, phase: 3.6 },
    InstrumentSpec { figi: "FG0000MATL07", ticker: "STL", name: "Steelworks Group", instrument_type: "share", sector: "materials", lot: 1, base_price: 145.0, drift: 0.06, amplitude: 0.09, half_spread: 0.004, daily_volume: 55_000, book_volume: 1_500, phase: 5.0 },
    InstrumentSpec { figi: "FG0000TLCM08", ticker: "TLC", name: "Telecom United", instrument_type: "share", sector: "telecom", lot: 100, base_price: 62.0, drift: 0.20, amplitude: 0.02, half_spread: 0.0006, daily_volume: 200_000, book_volume: 8_000, phase: 4.6 },
    InstrumentSpec { figi: "FG0000GOVT09", ticker: "SVB29", name: "Sovereign Bond 2029", instrument_type: "bond", sector: "government", lot: 1, base_price: 98.0, drift: 0.03, amplitude: 0.005, half_spread: 0.0004, daily_volume: 30_000, book_volume: 6_000, phase: 0.5 },
];

const MOCK_CURRENCY: &str = "USD";

fn spec_by_figi(figi: &str) -> Option<&'static InstrumentSpec> {
    INSTRUMENTS.iter().find(|spec| spec.figi == figi)
}

fn info_from(spec: &InstrumentSpec) -> InstrumentInfo {
    InstrumentInfo {
        figi: spec.figi.into(),
        ticker: spec.ticker.into(),
        name: spec.name.into(),
        instrument_type: spec.instrument_type.into(),
        sector: spec.sector.into(),
        currency: MOCK_CURRENCY.into(),
        lot: spec.lot,
    }
}

fn decimal(value: f64) -> Decimal {
    Decimal::from_f64_retain(value).unwrap_or(Decimal::ZERO).round_dp(4)
}

#[derive(Default)]
struct FailureState {
    listing: bool,
    accounts: HashSet<String>,
    instruments: HashSet<String>,
}

/// Mock brokerage client with deterministic data and injectable failures.
pub struct MockBrokerClient {
    failures: RwLock<FailureState>,
}

impl Default for MockBrokerClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBrokerClient {
    pub fn new() -> Self {
        Self {
            failures: RwLock::new(FailureState::default()),
        }
    }

    /// Make `get_accounts` fail, exercising the fatal path.
    pub async fn fail_account_listing(&self) {
        self.failures.write().await.listing = true;
    }

    /// Make portfolio and operation fetches fail for one account.
    pub async fn fail_account(&self, account_id: &str) {
        self.failures.write().await.accounts.insert(account_id.to_string());
    }

    /// Make candle, order-book and reference lookups fail for one instrument.
    pub async fn fail_instrument(&self, figi: &str) {
        self.failures.write().await.instruments.insert(figi.to_string());
    }

    pub async fn clear_failures(&self) {
        let mut failures = self.failures.write().await;
        *failures = FailureState::default();
    }

    async fn check_account(&self, account_id: &str) -> Result<()> {
        if self.failures.read().await.accounts.contains(account_id) {
            return Err(AnalyticsError::Broker(format!(
                "simulated outage for account {account_id}"
            )));
        }
        Ok(())
    }

    async fn check_instrument(&self, figi: &str) -> Result<()> {
        if self.failures.read().await.instruments.contains(figi) {
            return Err(AnalyticsError::Broker(format!(
                "simulated outage for instrument {figi}"
            )));
        }
        Ok(())
    }

    fn accounts() -> Vec<Account> {
        vec![
            Account {
                id: "acc-001".into(),
                name: "Main brokerage".into(),
                kind: "broker".into(),
                status: "open".into(),
                opened_date: Utc.with_ymd_and_hms(2021, 3, 15, 0, 0, 0).single(),
                closed_date: None,
            },
            Account {
                id: "acc-002".into(),
                name: "Retirement savings".into(),
                kind: "iis".into(),
                status: "open".into(),
                opened_date: Utc.with_ymd_and_hms(2022, 7, 1, 0, 0, 0).single(),
                closed_date: None,
            },
        ]
    }

    fn account_by_id(account_id: &str) -> Result<Account> {
        Self::accounts()
            .into_iter()
            .find(|acc| acc.id == account_id)
            .ok_or_else(|| AnalyticsError::UnknownAccount(account_id.to_string()))
    }

    fn portfolio_for(account: &Account) -> PortfolioSnapshot {
        let (positions, cash) = match account.id.as_str() {
            "acc-001" => (
                vec![
                    Position::new("FG0000ENRG01", dec!(40), dec!(430)),
                    Position::new("FG0000TECH03", dec!(25), dec!(290)),
                    Position::new("FG0000CONS04", dec!(100), dec!(80)),
                ],
                dec!(3550),
            ),
            _ => (
                vec![
                    Position::new("FG0000FINL02", dec!(60), dec!(110)),
                    Position::new("FG0000UTIL05", dec!(130), dec!(50)),
                    Position::new("FG0000TLCM08", dec!(100), dec!(62)),
                    Position::new("FG0000HLTH06", dec!(30), dec!(200)),
                ],
                dec!(2700),
            ),
        };
        let total: Decimal = positions.iter().map(Position::value).sum::<Decimal>() + cash;
        PortfolioSnapshot::new(account, Money::new(MOCK_CURRENCY, total), positions)
    }

    fn operations_for(
        account: &Account,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Vec<Operation> {
        // Canned histories, spread evenly across the requested window so any
        // sane date range sees the full set.
        let entries: Vec<Operation> = match account.id.as_str() {
            "acc-001" => vec![
                Operation::new(account, "Account top-up", from, dec!(100000), MOCK_CURRENCY),
                Operation::new(account, "Buy securities", from, dec!(-17200), MOCK_CURRENCY)
                    .with_instrument("FG0000ENRG01", 40, dec!(430)),
                Operation::new(account, "Buy securities", from, dec!(-7250), MOCK_CURRENCY)
                    .with_instrument("FG0000TECH03", 25, dec!(290)),
                Operation::new(account, "Buy securities", from, dec!(-8000), MOCK_CURRENCY)
                    .with_instrument("FG0000CONS04", 100, dec!(80)),
                Operation::new(account, "Brokerage commission withheld", from, dec!(-162.25), MOCK_CURRENCY),
                Operation::new(account, "Dividend payment", from, dec!(1032), MOCK_CURRENCY)
                    .with_instrument("FG0000ENRG01", 0, Decimal::ZERO),
                Operation::new(account, "Dividend tax withheld", from, dec!(-134.16), MOCK_CURRENCY)
                    .with_instrument("FG0000ENRG01", 0, Decimal::ZERO),
                Operation::new(account, "Sell securities", from, dec!(5500), MOCK_CURRENCY)
                    .with_instrument("FG0000MATL07", 38, dec!(144.73)),
                Operation::new(account, "Funds withdrawal", from, dec!(-5000), MOCK_CURRENCY),
            ],
            _ => vec![
                Operation::new(account, "Account top-up", from, dec!(30000), MOCK_CURRENCY),
                Operation::new(account, "Buy securities", from, dec!(-6600), MOCK_CURRENCY)
                    .with_instrument("FG0000FINL02", 60, dec!(110)),
                Operation::new(account, "Buy securities", from, dec!(-6500), MOCK_CURRENCY)
                    .with_instrument("FG0000UTIL05", 130, dec!(50)),
                Operation::new(account, "Buy securities", from, dec!(-6200), MOCK_CURRENCY)
                    .with_instrument("FG0000TLCM08", 100, dec!(62)),
                Operation::new(account, "Buy securities", from, dec!(-6000), MOCK_CURRENCY)
                    .with_instrument("FG0000HLTH06", 30, dec!(200)),
                Operation::new(account, "Coupon payment", from, dec!(412.50), MOCK_CURRENCY)
                    .with_instrument("FG0000GOVT09", 0, Decimal::ZERO),
                Operation::new(account, "Brokerage commission withheld", from, dec!(-127.60), MOCK_CURRENCY),
                Operation::new(account, "Dividend payment", from, dec!(264), MOCK_CURRENCY)
                    .with_instrument("FG0000FINL02", 0, Decimal::ZERO),
            ],
        };

        let span = (to - from).num_seconds().max(0);
        let step = span / (entries.len() as i64 + 1);
        entries
            .into_iter()
            .enumerate()
            .map(|(i, mut op)| {
                op.date = from + Duration::seconds(step * (i as i64 + 1));
                op
            })
            .collect()
    }

    fn candles_for(
        spec: &InstrumentSpec,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        interval: CandleInterval,
    ) -> Vec<PricePoint> {
        let step = match interval {
            CandleInterval::Hour => Duration::hours(1),
            CandleInterval::Day => Duration::days(1),
            CandleInterval::Week => Duration::weeks(1),
        };
        let count = ((to - from).num_seconds() / step.num_seconds()).clamp(0, 400);

        (0..=count)
            .map(|i| {
                let t = i as f64;
                let factor =
                    1.0 + spec.drift * t / 252.0 + spec.amplitude * (0.37 * t + spec.phase).sin();
                PricePoint {
                    figi: spec.figi.into(),
                    time: from + step * i as i32,
                    close: decimal(spec.base_price * factor),
                    volume: spec.daily_volume + (i * 7_919) % 1_000,
                }
            })
            .collect()
    }

    fn order_book_for(spec: &InstrumentSpec, depth: u32) -> OrderBook {
        let depth = depth.clamp(1, 50);
        let mid = spec.base_price;
        let half = mid * spec.half_spread;
        let tick = mid * 0.0005;
        let qty_step = (spec.book_volume / (2 * i64::from(depth))).max(1);

        let level = |i: u32, side: f64| OrderBookLevel {
            price: decimal(mid + side * (half + f64::from(i) * tick)),
            quantity: (spec.book_volume - i64::from(i) * qty_step).max(1),
        };

        OrderBook {
            figi: spec.figi.into(),
            depth,
            bids: (0..depth).map(|i| level(i, -1.0)).collect(),
            asks: (0..depth).map(|i| level(i, 1.0)).collect(),
        }
    }
}

#[async_trait]
impl BrokerClient for MockBrokerClient {
    async fn get_accounts(&self) -> Result<Vec<Account>> {
        if self.failures.read().await.listing {
            return Err(AnalyticsError::Broker("simulated account listing outage".into()));
        }
        Ok(Self::accounts())
    }

    async fn get_portfolio(&self, account_id: &str) -> Result<PortfolioSnapshot> {
        self.check_account(account_id).await?;
        let account = Self::account_by_id(account_id)?;
        Ok(Self::portfolio_for(&account))
    }

    async fn get_operations(
        &self,
        account_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Operation>> {
        self.check_account(account_id).await?;
        let account = Self::account_by_id(account_id)?;
        Ok(Self::operations_for(&account, from, to)
            .into_iter()
            .filter(|op| op.date >= from && op.date <= to)
            .collect())
    }

    async fn get_candles(
        &self,
        figi: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        interval: CandleInterval,
    ) -> Result<Vec<PricePoint>> {
        self.check_instrument(figi).await?;
        let spec = spec_by_figi(figi)
            .ok_or_else(|| AnalyticsError::UnknownInstrument(figi.to_string()))?;
        Ok(Self::candles_for(spec, from, to, interval))
    }

    async fn get_order_book(&self, figi: &str, depth: u32) -> Result<Option<OrderBook>> {
        self.check_instrument(figi).await?;
        Ok(spec_by_figi(figi).map(|spec| Self::order_book_for(spec, depth)))
    }

    async fn get_instrument_by(&self, figi: &str) -> Result<Option<InstrumentInfo>> {
        self.check_instrument(figi).await?;
        Ok(spec_by_figi(figi).map(info_from))
    }

    async fn list_instruments(&self) -> Result<Vec<InstrumentInfo>> {
        Ok(INSTRUMENTS.iter().map(info_from).collect())
    }

    async fn health_check(&self) -> bool {
        !self.failures.read().await.listing
    }

    fn name(&self) -> &str {
        "MockBroker"
    }
}
