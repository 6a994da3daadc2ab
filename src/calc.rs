//! Pure position arithmetic over an ordered trade list
//!
//! Cost basis is a single volume-weighted average across all buys, not
//! per-lot FIFO. Broker statements do not expose lot identity, so the
//! blended basis is a deliberate approximation; "fixing" it into discrete
//! lots would change historical P&L figures.

use crate::types::{CommissionRates, Money, Side, Trade};

/// Volume-weighted average buy price; zero when there are no buys
pub fn avg_buy_price(trades: &[Trade]) -> Money {
    let mut cost = Money::ZERO;
    let mut shares: i64 = 0;

    for trade in trades.iter().filter(|t| t.side == Side::Buy) {
        cost += trade.price * Money::from_i64(trade.quantity as i64);
        shares += trade.quantity as i64;
    }

    if shares == 0 {
        Money::ZERO
    } else {
        cost / Money::from_i64(shares)
    }
}

/// High-water mark of the running signed share count
pub fn max_shares(trades: &[Trade]) -> i64 {
    let mut current: i64 = 0;
    let mut max: i64 = 0;

    for trade in trades {
        current += trade.signed_quantity();
        max = max.max(current);
    }

    max
}

/// Net share count after the whole trade list
pub fn net_shares(trades: &[Trade]) -> i64 {
    trades.iter().map(Trade::signed_quantity).sum()
}

/// Cumulative realized P&L, commission-inclusive.
///
/// Each sell leg contributes `(sell - avg) * qty - sell_commission`. Buy
/// commission is apportioned pro-rata by `shares_sold / shares_bought`, so
/// shares still held have not yet paid their entry cost; for a closed
/// position the factor is one and the full buy commission is charged.
pub fn realized_pnl(trades: &[Trade], rates: &CommissionRates) -> Money {
    let avg = avg_buy_price(trades);

    let mut sell_leg = Money::ZERO;
    let mut bought: i64 = 0;
    let mut sold: i64 = 0;
    let mut buy_commission = Money::ZERO;

    for trade in trades {
        match trade.side {
            Side::Buy => {
                bought += trade.quantity as i64;
                buy_commission += rates.buy_commission(trade.price, trade.quantity);
            }
            Side::Sell => {
                sold += trade.quantity as i64;
                let qty = Money::from_i64(trade.quantity as i64);
                sell_leg += (trade.price - avg) * qty
                    - rates.sell_commission(trade.price, trade.quantity);
            }
        }
    }

    if sold == 0 {
        return Money::ZERO;
    }

    let apportioned = if bought == 0 {
        Money::ZERO
    } else {
        buy_commission * Money::from_i64(sold) / Money::from_i64(bought)
    };

    sell_leg - apportioned
}
