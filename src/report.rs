//! Plain-text rendering of reconciliation results for the CLI

use std::collections::HashMap;

use itertools::Itertools;

use crate::types::{EquityCurvePoint, Money, Position};

const LINE_WIDTH: usize = 100;

/// Render the position set as a fixed-width table, tickers sorted, closed
/// cycles before the active one within a ticker
pub fn render_positions(positions: &HashMap<String, Position>) -> String {
    if positions.is_empty() {
        return "No positions.".to_string();
    }

    let mut output = String::new();
    output.push_str(&format!("{}\n", "=".repeat(LINE_WIDTH)));
    output.push_str("POSITIONS\n");
    output.push_str(&format!("{}\n", "=".repeat(LINE_WIDTH)));
    output.push_str(&format!(
        "{:<10} {:>8} {:>12} {:>12} {:>8} {:>8} {:>14} {:>14}\n",
        "Ticker", "Status", "Opened", "Closed", "Shares", "Max", "Avg Buy", "Realized P&L"
    ));
    output.push_str(&format!("{}\n", "-".repeat(LINE_WIDTH)));

    let sorted = positions
        .values()
        .sorted_by_key(|p| (p.ticker.clone(), p.open_date));

    let mut total_pnl = Money::ZERO;
    for pos in sorted {
        total_pnl += pos.realized_pnl;
        output.push_str(&format!(
            "{:<10} {:>8} {:>12} {:>12} {:>8} {:>8} {:>14} {:>14}\n",
            pos.ticker.as_str(),
            pos.status.as_str(),
            pos.open_date.to_string(),
            pos.close_date.map_or_else(|| "-".to_string(), |d| d.to_string()),
            pos.total_shares,
            pos.max_shares,
            pos.avg_buy_price.round_dp(2).to_string(),
            pos.realized_pnl.round_dp(2).to_string(),
        ));
    }

    output.push_str(&format!("{}\n", "-".repeat(LINE_WIDTH)));
    output.push_str(&format!(
        "{} positions, total realized P&L: {}\n",
        positions.len(),
        total_pnl.round_dp(2)
    ));
    output
}

/// Render the equity curve, one row per trade day
pub fn render_equity_curve(points: &[EquityCurvePoint]) -> String {
    if points.is_empty() {
        return "No equity points.".to_string();
    }

    let mut output = String::new();
    output.push_str(&format!("{}\n", "=".repeat(48)));
    output.push_str("EQUITY CURVE\n");
    output.push_str(&format!("{}\n", "=".repeat(48)));
    output.push_str(&format!("{:<12} {:>16} {:>16}\n", "Date", "Total", "Daily P&L"));

    for point in points {
        output.push_str(&format!(
            "{:<12} {:>16} {:>16}\n",
            point.date.to_string(),
            point.total_value.round_dp(2).to_string(),
            point.daily_pnl.round_dp(2).to_string(),
        ));
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build_positions;
    use crate::types::{CommissionRates, Side, Ticker, Trade};
    use chrono::NaiveDate;

    #[test]
    fn test_render_empty() {
        assert_eq!(render_positions(&HashMap::new()), "No positions.");
        assert_eq!(render_equity_curve(&[]), "No equity points.");
    }

    #[test]
    fn test_render_contains_ticker_and_total() {
        let ts = NaiveDate::from_ymd_opt(2025, 8, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        let trades = vec![Trade {
            id: "t1".into(),
            account: "acc-1".into(),
            ticker: Ticker::new("AAPL"),
            side: Side::Buy,
            quantity: 10,
            price: Money::from_i64(100),
            actual_timestamp: ts,
            sort_key: ts.and_utc().timestamp(),
            broker_date: "2025/08/01".into(),
            broker_time: "10:00:00".into(),
        }];
        let positions: HashMap<String, Position> =
            build_positions(trades, &CommissionRates::default())
                .unwrap()
                .into_iter()
                .map(|p| (p.id.clone(), p))
                .collect();

        let rendered = render_positions(&positions);
        assert!(rendered.contains("AAPL"));
        assert!(rendered.contains("ACTIVE"));
        assert!(rendered.contains("1 positions"));
    }
}
