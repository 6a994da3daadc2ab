//! Equity curve reconstruction
//!
//! Derives the per-day account value series from realized P&L. Two entry
//! points share the daily bucketing helper: a historical import only knows
//! the *current* total and walks backward from it; an incremental import
//! extends forward from the last persisted point. Both directions agree on
//! overlapping ranges, and points before an append's cutoff are never
//! rewritten.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;

use crate::calc;
use crate::types::{CommissionRates, EquityCurvePoint, Money, Position, Side};

/// Realized P&L bucketed by calendar day, across all positions.
///
/// Each sell leg (with its pro-rata share of buy commission) is attributed to
/// the sell's normalized day. Days that traded without selling anything still
/// appear, with zero P&L, so the curve has a point for every trade day.
pub fn daily_realized_pnl<'a, I>(positions: I, rates: &CommissionRates) -> BTreeMap<NaiveDate, Money>
where
    I: IntoIterator<Item = &'a Position>,
{
    let mut by_day: BTreeMap<NaiveDate, Money> = BTreeMap::new();

    for position in positions {
        let avg = calc::avg_buy_price(&position.trades);

        let mut bought: i64 = 0;
        let mut buy_commission = Money::ZERO;
        for trade in position.trades.iter().filter(|t| t.side == Side::Buy) {
            bought += trade.quantity as i64;
            buy_commission += rates.buy_commission(trade.price, trade.quantity);
        }

        for trade in &position.trades {
            let day = trade.actual_timestamp.date();
            let entry = by_day.entry(day).or_insert(Money::ZERO);

            if trade.side == Side::Sell {
                let qty = Money::from_i64(trade.quantity as i64);
                let buy_share = if bought == 0 {
                    Money::ZERO
                } else {
                    buy_commission * qty / Money::from_i64(bought)
                };
                *entry += (trade.price - avg) * qty
                    - rates.sell_commission(trade.price, trade.quantity)
                    - buy_share;
            }
        }
    }

    by_day
}

/// Distinct trade days across all positions, ascending
fn trade_days<'a, I>(positions: I) -> BTreeSet<NaiveDate>
where
    I: IntoIterator<Item = &'a Position>,
{
    positions
        .into_iter()
        .flat_map(|p| p.trades.iter().map(|t| t.actual_timestamp.date()))
        .collect()
}

/// Historical reconstruction: walk backward from the known current total.
///
/// The most recent trade day is pinned to `current_total_assets`; each prior
/// day's value is the running total minus the later day's realized P&L. No
/// historical snapshot is needed. Returned ascending by date.
pub fn reconstruct_historical<'a, I>(
    positions: I,
    current_total_assets: Money,
    rates: &CommissionRates,
) -> Vec<EquityCurvePoint>
where
    I: IntoIterator<Item = &'a Position> + Clone,
{
    let days = trade_days(positions.clone());
    let pnl_by_day = daily_realized_pnl(positions, rates);

    let mut points = Vec::with_capacity(days.len());
    let mut running_total = current_total_assets;

    for day in days.iter().rev() {
        let daily = pnl_by_day.get(day).copied().unwrap_or(Money::ZERO);
        points.push(EquityCurvePoint::new(*day, running_total, daily));
        running_total -= daily;
    }

    points.reverse();
    points
}

/// Append reconstruction: extend forward from the last persisted point.
///
/// Only days strictly after `last_date` produce points; everything at or
/// before it already exists and stays untouched.
pub fn extend_from<'a, I>(
    positions: I,
    last_date: NaiveDate,
    last_total: Money,
    rates: &CommissionRates,
) -> Vec<EquityCurvePoint>
where
    I: IntoIterator<Item = &'a Position> + Clone,
{
    let pnl_by_day = daily_realized_pnl(positions.clone(), rates);

    let mut points = Vec::new();
    let mut running_total = last_total;

    for day in trade_days(positions).into_iter().filter(|d| *d > last_date) {
        let daily = pnl_by_day.get(&day).copied().unwrap_or(Money::ZERO);
        running_total += daily;
        points.push(EquityCurvePoint::new(day, running_total, daily));
    }

    points
}
