//! Append-mode position merger
//!
//! Integrates a freshly imported trade batch against already-persisted
//! positions. Closed positions are final and pass through verbatim; only the
//! tickers that actually received new trades are recomputed. A failure is
//! scoped to its ticker, the rest of the batch still reconciles.
//!
//! Average cost basis is not incrementally decomposable (the buy-commission
//! apportionment depends on the full buy history), so an affected active
//! position is replayed from scratch over its combined old + new trade list
//! rather than delta-updated. Position trade counts are small enough that
//! the re-walk is free in practice.

use std::collections::HashMap;

use itertools::Itertools;
use tracing::{debug, warn};

use crate::builder::{build_positions, replay_share_count};
use crate::types::{CommissionRates, Position, ReconcileError, Ticker, Trade};

/// Result of one reconciliation run (full rebuild or append)
#[derive(Debug, Default)]
pub struct ReconcileOutcome {
    pub positions: HashMap<String, Position>,
    /// Tickers whose batch was rejected, with the fatal error
    pub failures: Vec<(Ticker, ReconcileError)>,
}

impl ReconcileOutcome {
    /// Explicit position -> trade-id join table for the persistence layer
    pub fn position_trade_map(&self) -> HashMap<String, Vec<String>> {
        self.positions
            .iter()
            .map(|(id, pos)| (id.clone(), pos.trade_ids()))
            .collect()
    }

    fn insert_all(&mut self, positions: Vec<Position>) {
        for pos in positions {
            self.positions.insert(pos.id.clone(), pos);
        }
    }
}

/// Full-mode reconciliation of a complete trade history, all tickers.
///
/// Each ticker is built independently; an integrity violation rejects that
/// ticker only.
pub fn reconcile_full(trades: Vec<Trade>, rates: &CommissionRates) -> ReconcileOutcome {
    let mut outcome = ReconcileOutcome::default();

    let by_ticker = trades
        .into_iter()
        .map(|t| (t.ticker.clone(), t))
        .into_group_map();

    for (ticker, ticker_trades) in by_ticker {
        match build_positions(ticker_trades, rates) {
            Ok(positions) => outcome.insert_all(positions),
            Err(err) => {
                warn!("rejected {ticker}: {err}");
                outcome.failures.push((ticker, err));
            }
        }
    }

    outcome
}

/// Append-mode reconciliation of new trades against persisted state.
///
/// `new_trades` must already be deduplicated against stored trade ids.
/// `existing_trades_by_ticker` holds the persisted history the positions were
/// built from; it is only consulted for tickers with an active position.
pub fn merge_positions(
    new_trades: Vec<Trade>,
    existing_positions: &HashMap<String, Position>,
    existing_trades_by_ticker: &HashMap<Ticker, Vec<Trade>>,
    rates: &CommissionRates,
) -> ReconcileOutcome {
    let mut outcome = ReconcileOutcome::default();

    // Finalized history is immutable: every closed position survives as-is.
    for pos in existing_positions.values().filter(|p| !p.is_active()) {
        outcome.positions.insert(pos.id.clone(), pos.clone());
    }

    let active_by_ticker: HashMap<Ticker, &Position> = existing_positions
        .values()
        .filter(|p| p.is_active())
        .map(|p| (p.ticker.clone(), p))
        .collect();

    let mut new_by_ticker = new_trades
        .into_iter()
        .map(|t| (t.ticker.clone(), t))
        .into_group_map();

    // Active positions untouched by this batch pass through unchanged.
    for (ticker, pos) in &active_by_ticker {
        if !new_by_ticker.contains_key(ticker) {
            outcome.positions.insert(pos.id.clone(), (*pos).clone());
        }
    }

    for (ticker, ticker_trades) in new_by_ticker.drain() {
        let result = match active_by_ticker.get(&ticker) {
            Some(active) => merge_ticker(active, ticker_trades, existing_trades_by_ticker, rates),
            // No open inventory: the batch stands alone as fresh positions.
            None => build_positions(ticker_trades, rates),
        };

        match result {
            Ok(positions) => {
                debug!("{ticker}: {} position(s) after merge", positions.len());
                outcome.insert_all(positions);
            }
            Err(err) => {
                warn!("rejected {ticker}: {err}");
                outcome.failures.push((ticker, err));
            }
        }
    }

    outcome
}

/// Replay one active position's combined history with the new batch appended.
///
/// Outcomes fall out of the full-mode walk: still active (recomputed over the
/// combined list, same id since the opening trade is unchanged), exactly
/// closed, or closed then reopened — the reopening buy starts a brand-new
/// position with its own id, so a single batch can legitimately return two
/// positions here.
fn merge_ticker(
    active: &Position,
    new_trades: Vec<Trade>,
    existing_trades_by_ticker: &HashMap<Ticker, Vec<Trade>>,
    rates: &CommissionRates,
) -> Result<Vec<Position>, ReconcileError> {
    // The opening trade's chrono key bounds this position's history. A date
    // cutoff would also pull in a prior position closed earlier on the same
    // calendar day and make the prefix start with its closing sell.
    let Some(opening) = active.trades.first() else {
        return Err(ReconcileError::InconsistentPosition {
            position_id: active.id.clone(),
            recorded: active.total_shares,
            replayed: 0,
        });
    };
    let mut history: Vec<Trade> = existing_trades_by_ticker
        .get(&active.ticker)
        .map(|trades| {
            trades
                .iter()
                .filter(|t| t.chrono_key() >= opening.chrono_key())
                .cloned()
                .collect()
        })
        .unwrap_or_default();
    history.sort_by(|a, b| a.chrono_key().cmp(&b.chrono_key()));

    // The stored share count and the recorded history must agree before the
    // new batch is allowed to extend it.
    let replayed = replay_share_count(&history)?;
    if replayed != active.total_shares {
        return Err(ReconcileError::InconsistentPosition {
            position_id: active.id.clone(),
            recorded: active.total_shares,
            replayed,
        });
    }

    history.extend(new_trades);
    build_positions(history, rates)
}
