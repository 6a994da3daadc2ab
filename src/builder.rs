//! Full-mode position builder
//!
//! Scans one ticker's complete chronological trade list and splits it into
//! flat-to-flat holding periods. Inventory reaching exactly zero finalizes a
//! closed position; a trailing non-zero balance becomes the ticker's single
//! active position.

use chrono::NaiveDateTime;

use crate::calc;
use crate::types::{CommissionRates, Position, PositionStatus, ReconcileError, Side, Ticker, Trade};

/// Position id derived from the opening trade. Stable across rebuilds and
/// append runs: re-reconciling the same history yields the same ids.
pub fn position_id(account: &str, opened: NaiveDateTime, ticker: &Ticker) -> String {
    format!(
        "{}_{}_{}",
        account,
        opened.format("%Y%m%d%H%M%S"),
        ticker.as_str()
    )
}

/// Build all positions for one ticker from its full trade history.
///
/// Trades are re-sorted by `chrono_key` before the walk so callers only need
/// to hand over the right set. A sell that would drive inventory negative is
/// a data-integrity error; the whole ticker is rejected with the offending
/// trade id, nothing is clamped.
pub fn build_positions(
    mut trades: Vec<Trade>,
    rates: &CommissionRates,
) -> Result<Vec<Position>, ReconcileError> {
    trades.sort_by(|a, b| a.chrono_key().cmp(&b.chrono_key()));

    let mut positions = Vec::new();
    let mut buffer: Vec<Trade> = Vec::new();
    let mut current_shares: i64 = 0;

    for trade in trades {
        match trade.side {
            Side::Buy => {
                current_shares += trade.quantity as i64;
                buffer.push(trade);
            }
            Side::Sell => {
                let sold = trade.quantity as i64;
                if sold > current_shares {
                    return Err(ReconcileError::NegativeInventory {
                        ticker: trade.ticker.clone(),
                        trade_id: trade.id.clone(),
                        held: current_shares,
                        sold,
                    });
                }
                current_shares -= sold;
                buffer.push(trade);
                if current_shares == 0 {
                    positions.push(finalize(std::mem::take(&mut buffer), PositionStatus::Closed, rates));
                }
            }
        }
    }

    if current_shares > 0 {
        positions.push(finalize(buffer, PositionStatus::Active, rates));
    }

    Ok(positions)
}

/// Assemble a position from one completed (or still open) buffer of trades
fn finalize(trades: Vec<Trade>, status: PositionStatus, rates: &CommissionRates) -> Position {
    let last_date = trades.last().map(|t| t.actual_timestamp.date());
    let first = &trades[0];

    let close_date = match status {
        PositionStatus::Closed => last_date,
        PositionStatus::Active => None,
    };

    let total_shares = calc::net_shares(&trades);
    let avg_buy_price = calc::avg_buy_price(&trades);
    let max_shares = calc::max_shares(&trades);
    let realized_pnl = calc::realized_pnl(&trades, rates);

    Position {
        id: position_id(&first.account, first.actual_timestamp, &first.ticker),
        account: first.account.clone(),
        ticker: first.ticker.clone(),
        status,
        open_date: first.actual_timestamp.date(),
        close_date,
        avg_buy_price,
        total_shares,
        max_shares,
        realized_pnl,
        trades,
    }
}

/// Accumulated share count at the end of a trade list without building
/// positions. Used by the merger to reconcile a stored active position
/// against its recorded history.
pub fn replay_share_count(trades: &[Trade]) -> Result<i64, ReconcileError> {
    let mut current: i64 = 0;
    for trade in trades {
        let delta = trade.signed_quantity();
        if current + delta < 0 {
            return Err(ReconcileError::NegativeInventory {
                ticker: trade.ticker.clone(),
                trade_id: trade.id.clone(),
                held: current,
                sold: -delta,
            });
        }
        current += delta;
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Money;
    use chrono::NaiveDate;

    fn trade(side: Side, quantity: u32, price: i64, day: u32, hour: u32) -> Trade {
        let ts = NaiveDate::from_ymd_opt(2025, 8, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap();
        Trade {
            id: format!("{}-{:02}-{:02}-{}", side.as_str(), day, hour, quantity),
            account: "acc-1".into(),
            ticker: Ticker::new("NVDA"),
            side,
            quantity,
            price: Money::from_i64(price),
            actual_timestamp: ts,
            sort_key: ts.and_utc().timestamp(),
            broker_date: format!("2025/08/{day:02}"),
            broker_time: format!("{hour:02}:00:00"),
        }
    }

    fn rates() -> CommissionRates {
        CommissionRates::default()
    }

    #[test]
    fn test_single_round_trip_closes() {
        let trades = vec![trade(Side::Buy, 10, 100, 1, 10), trade(Side::Sell, 10, 120, 2, 10)];
        let positions = build_positions(trades, &rates()).unwrap();

        assert_eq!(positions.len(), 1);
        let pos = &positions[0];
        assert_eq!(pos.status, PositionStatus::Closed);
        assert_eq!(pos.total_shares, 0);
        assert_eq!(pos.max_shares, 10);
        assert_eq!(pos.open_date, NaiveDate::from_ymd_opt(2025, 8, 1).unwrap());
        assert_eq!(pos.close_date, Some(NaiveDate::from_ymd_opt(2025, 8, 2).unwrap()));
        assert_eq!(pos.trades.len(), 2);
    }

    #[test]
    fn test_trailing_balance_stays_active() {
        let trades = vec![trade(Side::Buy, 10, 100, 1, 10), trade(Side::Sell, 4, 120, 2, 10)];
        let positions = build_positions(trades, &rates()).unwrap();

        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].status, PositionStatus::Active);
        assert_eq!(positions[0].total_shares, 6);
        assert_eq!(positions[0].close_date, None);
    }

    #[test]
    fn test_two_cycles_two_positions() {
        let trades = vec![
            trade(Side::Buy, 10, 100, 1, 10),
            trade(Side::Sell, 10, 120, 2, 10),
            trade(Side::Buy, 5, 90, 3, 10),
            trade(Side::Sell, 5, 95, 4, 10),
        ];
        let positions = build_positions(trades, &rates()).unwrap();

        assert_eq!(positions.len(), 2);
        assert!(positions.iter().all(|p| p.status == PositionStatus::Closed));
        // Each cycle owns only its own trades and gets its own id
        assert_eq!(positions[0].trades.len(), 2);
        assert_eq!(positions[1].trades.len(), 2);
        assert_ne!(positions[0].id, positions[1].id);
    }

    #[test]
    fn test_oversell_is_fatal() {
        let trades = vec![trade(Side::Buy, 5, 100, 1, 10), trade(Side::Sell, 8, 120, 2, 10)];
        let err = build_positions(trades, &rates()).unwrap_err();

        match err {
            ReconcileError::NegativeInventory { held, sold, trade_id, .. } => {
                assert_eq!(held, 5);
                assert_eq!(sold, 8);
                assert!(trade_id.starts_with("SELL"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_sell_with_no_inventory_is_fatal() {
        let trades = vec![trade(Side::Sell, 1, 100, 1, 10)];
        assert!(build_positions(trades, &rates()).is_err());
    }

    #[test]
    fn test_out_of_order_input_is_sorted_first() {
        // Sell handed over before the buy that covers it; sort fixes it
        let trades = vec![trade(Side::Sell, 10, 120, 2, 10), trade(Side::Buy, 10, 100, 1, 10)];
        let positions = build_positions(trades, &rates()).unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].status, PositionStatus::Closed);
    }

    #[test]
    fn test_empty_input_yields_nothing() {
        assert!(build_positions(Vec::new(), &rates()).unwrap().is_empty());
    }

    #[test]
    fn test_replay_share_count() {
        let trades = vec![trade(Side::Buy, 10, 100, 1, 10), trade(Side::Sell, 3, 110, 2, 10)];
        assert_eq!(replay_share_count(&trades).unwrap(), 7);
    }
}
