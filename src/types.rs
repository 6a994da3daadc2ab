//! Core data types for the reconciliation engine

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fatal reconciliation errors, scoped to a single ticker's batch
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("{ticker}: sell {trade_id} exceeds holdings ({held} shares held, {sold} sold)")]
    NegativeInventory {
        ticker: Ticker,
        trade_id: String,
        held: i64,
        sold: i64,
    },

    #[error("position {position_id}: recorded {recorded} shares but trade history replays to {replayed}")]
    InconsistentPosition {
        position_id: String,
        recorded: i64,
        replayed: i64,
    },
}

/// Ticker symbol using Arc<str> for cheap cloning
///
/// Tickers key every per-symbol map in the engine and are cloned into each
/// trade and position, so clones must not allocate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ticker(#[serde(with = "arc_str_serde")] std::sync::Arc<str>);

mod arc_str_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::sync::Arc;

    pub fn serialize<S>(value: &Arc<str>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Arc<str>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Arc::from(s.as_str()))
    }
}

impl Ticker {
    pub fn new(s: impl AsRef<str>) -> Self {
        Ticker(std::sync::Arc::from(s.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Ticker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl std::str::FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(Side::Buy),
            "SELL" => Ok(Side::Sell),
            other => Err(format!("unknown trade side: {other}")),
        }
    }
}

/// A single broker execution. Immutable once created by the ingest stage.
///
/// `broker_date`/`broker_time` are the raw strings from the statement and are
/// display-only; every piece of business logic orders and buckets by
/// `actual_timestamp` and `sort_key` instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub account: String,
    pub ticker: Ticker,
    pub side: Side,
    pub quantity: u32,
    pub price: Money,
    pub actual_timestamp: NaiveDateTime,
    pub sort_key: i64,
    pub broker_date: String,
    pub broker_time: String,
}

impl Trade {
    /// Signed share delta: buys add, sells remove
    pub fn signed_quantity(&self) -> i64 {
        match self.side {
            Side::Buy => self.quantity as i64,
            Side::Sell => -(self.quantity as i64),
        }
    }

    /// Stable chronological ordering key (sort key, then id for ties)
    pub fn chrono_key(&self) -> (i64, &str) {
        (self.sort_key, &self.id)
    }
}

/// Position lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Active,
    Closed,
}

impl PositionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionStatus::Active => "ACTIVE",
            PositionStatus::Closed => "CLOSED",
        }
    }
}

impl std::str::FromStr for PositionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(PositionStatus::Active),
            "CLOSED" => Ok(PositionStatus::Closed),
            other => Err(format!("unknown position status: {other}")),
        }
    }
}

/// One contiguous holding period for a ticker, flat to flat (or still open).
///
/// Once `status` is `Closed` the engine never touches the value again; append
/// runs copy closed positions through verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub account: String,
    pub ticker: Ticker,
    pub status: PositionStatus,
    pub open_date: NaiveDate,
    pub close_date: Option<NaiveDate>,
    pub avg_buy_price: Money,
    pub total_shares: i64,
    pub max_shares: i64,
    pub realized_pnl: Money,
    /// Trades belonging exclusively to this position, in chrono_key order
    pub trades: Vec<Trade>,
}

impl Position {
    pub fn is_active(&self) -> bool {
        self.status == PositionStatus::Active
    }

    /// Trade ids in order, for the position/trade join table
    pub fn trade_ids(&self) -> Vec<String> {
        self.trades.iter().map(|t| t.id.clone()).collect()
    }
}

/// One day of the derived account-value series.
///
/// `cash_value`/`stock_value` are placeholders (total/zero) kept for the
/// persisted schema; the stock/cash split is computed from live position
/// state elsewhere, never from the equity curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityCurvePoint {
    pub date: NaiveDate,
    pub total_value: Money,
    pub daily_pnl: Money,
    pub cash_value: Money,
    pub stock_value: Money,
}

impl EquityCurvePoint {
    pub fn new(date: NaiveDate, total_value: Money, daily_pnl: Money) -> Self {
        EquityCurvePoint {
            date,
            total_value,
            daily_pnl,
            cash_value: total_value,
            stock_value: Money::ZERO,
        }
    }
}

/// Commission rates applied to each leg of a round trip
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CommissionRates {
    pub buy_rate: Decimal,
    pub sell_rate: Decimal,
}

impl Default for CommissionRates {
    fn default() -> Self {
        CommissionRates {
            buy_rate: dec!(0.0007),
            sell_rate: dec!(0.0007),
        }
    }
}

impl CommissionRates {
    pub fn buy_commission(&self, price: Money, quantity: u32) -> Money {
        price * Money::from_i64(quantity as i64) * Money::new(self.buy_rate)
    }

    pub fn sell_commission(&self, price: Money, quantity: u32) -> Money {
        price * Money::from_i64(quantity as i64) * Money::new(self.sell_rate)
    }
}

// ============================================================================
// Money Type - Precise Decimal Arithmetic for Monetary Values
// ============================================================================

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

/// Money type for precise decimal arithmetic in monetary calculations.
///
/// Wraps `rust_decimal::Decimal`. Every price, commission, P&L figure and
/// account value in the ledger goes through this type: the equity-curve
/// invariant (summing `daily_pnl` across points must reproduce adjacent
/// `total_value`s exactly) does not survive f64 rounding.
#[derive(Debug, Clone, Copy, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(#[serde(with = "rust_decimal::serde::str")] Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn new(value: Decimal) -> Self {
        Money(value)
    }

    pub fn from_i64(value: i64) -> Self {
        Money(Decimal::from(value))
    }

    /// Lossy conversion for display-layer ratios only
    pub fn to_f64(self) -> f64 {
        use rust_decimal::prelude::ToPrimitive;
        self.0.to_f64().unwrap_or(0.0)
    }

    pub fn abs(self) -> Self {
        Money(self.0.abs())
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    pub fn round_dp(self, dp: u32) -> Self {
        Money(self.0.round_dp(dp))
    }

    pub fn inner(self) -> Decimal {
        self.0
    }
}

impl std::str::FromStr for Money {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<Decimal>().map(Money)
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PartialEq for Money {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl PartialOrd for Money {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Money {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl Add for Money {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Money(self.0 - rhs.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Mul for Money {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self::Output {
        Money(self.0 * rhs.0)
    }
}

impl Div for Money {
    type Output = Self;
    fn div(self, rhs: Self) -> Self::Output {
        if rhs.0.is_zero() {
            Money::ZERO
        } else {
            Money(self.0 / rhs.0)
        }
    }
}

impl Neg for Money {
    type Output = Self;
    fn neg(self) -> Self::Output {
        Money(-self.0)
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Money(value)
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, x| acc + x)
    }
}

impl<'a> std::iter::Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, x| acc + *x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_precision() {
        // 0.1 + 0.2 != 0.3 in f64; the ledger cannot tolerate that
        let a: Money = "0.1".parse().unwrap();
        let b: Money = "0.2".parse().unwrap();
        let c: Money = "0.3".parse().unwrap();
        assert_eq!(a + b, c);
    }

    #[test]
    fn test_money_div_by_zero() {
        let a = Money::from_i64(100);
        assert_eq!(a / Money::ZERO, Money::ZERO);
    }

    #[test]
    fn test_money_sum() {
        let values = vec![Money::from_i64(10), Money::from_i64(20), Money::from_i64(30)];
        let total: Money = values.into_iter().sum();
        assert_eq!(total, Money::from_i64(60));
    }

    #[test]
    fn test_money_serde_as_string() {
        let money: Money = "123.456".parse().unwrap();
        let json = serde_json::to_string(&money).unwrap();
        assert_eq!(json, "\"123.456\"");
        let parsed: Money = serde_json::from_str(&json).unwrap();
        assert_eq!(money, parsed);
    }

    #[test]
    fn test_side_parsing() {
        assert_eq!("BUY".parse::<Side>().unwrap(), Side::Buy);
        assert_eq!("sell".parse::<Side>().unwrap(), Side::Sell);
        assert!("HOLD".parse::<Side>().is_err());
    }

    #[test]
    fn test_default_commission_rates() {
        let rates = CommissionRates::default();
        let commission = rates.buy_commission(Money::from_i64(10_000), 10);
        assert_eq!(commission, Money::new(dec!(70.0000)));
    }

    #[test]
    fn test_signed_quantity() {
        let trade = Trade {
            id: "t1".into(),
            account: "acc".into(),
            ticker: Ticker::new("AAPL"),
            side: Side::Sell,
            quantity: 7,
            price: Money::from_i64(100),
            actual_timestamp: chrono::NaiveDate::from_ymd_opt(2025, 8, 13)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap(),
            sort_key: 0,
            broker_date: "2025/08/13".into(),
            broker_time: "10:00:00".into(),
        };
        assert_eq!(trade.signed_quantity(), -7);
    }
}
