//! Trade batch ingestion
//!
//! Reads a broker execution export (CSV: account, ticker, side, quantity,
//! price, date, time), normalizes each timestamp through the session rules
//! and derives stable trade ids. A row that fails to parse is dropped with a
//! warning and counted; it never aborts the batch.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::session;
use crate::types::{Money, Side, Ticker, Trade};

/// Loaded batch plus the number of rows dropped as unparsable
#[derive(Debug)]
pub struct IngestResult {
    pub trades: Vec<Trade>,
    pub dropped: usize,
}

/// Stable trade id: hash of account, sort key, ticker, side and a duplicate
/// ordinal. Two executions that are byte-identical on the statement (same
/// second, same side, same ticker) get distinct ordinals, so re-importing the
/// same file reproduces the same ids and dedupe works across runs.
pub fn derive_trade_id(
    account: &str,
    sort_key: i64,
    ticker: &Ticker,
    side: Side,
    ordinal: u32,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(account.as_bytes());
    hasher.update(b"|");
    hasher.update(sort_key.to_be_bytes());
    hasher.update(b"|");
    hasher.update(ticker.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(side.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(ordinal.to_be_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..8])
}

/// Load and normalize a trade batch from a CSV export, using the default
/// after-hours boundary.
pub fn load_trades_csv(path: impl AsRef<Path>) -> Result<IngestResult> {
    load_trades_csv_with(path, session::AFTER_HOURS_BOUNDARY_HOUR)
}

/// Load and normalize a trade batch from a CSV export.
///
/// Returns trades sorted by their chronological key, ready for the builder
/// and merger.
pub fn load_trades_csv_with(path: impl AsRef<Path>, boundary_hour: u32) -> Result<IngestResult> {
    let mut reader = csv::Reader::from_path(path.as_ref()).context("Failed to open trades CSV")?;

    let mut trades = Vec::new();
    let mut dropped = 0usize;
    let mut dup_counter: HashMap<(String, i64, Ticker, Side), u32> = HashMap::new();

    for (row_idx, result) in reader.records().enumerate() {
        let row = row_idx + 2; // 1-based, after the header line
        let record = result.context(format!("Failed to read row {row}"))?;

        match parse_record(&record, boundary_hour, &mut dup_counter) {
            Some(trade) => trades.push(trade),
            None => {
                warn!("row {row}: unparsable trade record dropped: {record:?}");
                dropped += 1;
            }
        }
    }

    trades.sort_by(|a, b| a.chrono_key().cmp(&b.chrono_key()));

    info!(
        "Loaded {} trades from {} ({} dropped)",
        trades.len(),
        path.as_ref().display(),
        dropped
    );

    Ok(IngestResult { trades, dropped })
}

fn parse_record(
    record: &csv::StringRecord,
    boundary_hour: u32,
    dup_counter: &mut HashMap<(String, i64, Ticker, Side), u32>,
) -> Option<Trade> {
    let account = record.get(0)?.trim().to_string();
    let ticker = Ticker::new(record.get(1)?.trim());
    let side: Side = record.get(2)?.parse().ok()?;
    let quantity: u32 = record.get(3)?.trim().parse().ok()?;
    let price: Money = record.get(4)?.parse().ok()?;
    let broker_date = record.get(5)?.trim().to_string();
    let broker_time = record.get(6)?.trim().to_string();

    if account.is_empty() || ticker.as_str().is_empty() || quantity == 0 {
        return None;
    }
    if price.is_zero() || price.is_negative() {
        return None;
    }

    let literal = session::literal_instant(&broker_date, &broker_time)?;
    let actual_timestamp = session::normalize_with(&broker_date, &broker_time, boundary_hour)?;
    let sort_key = session::sort_key_with(literal, boundary_hour);

    let dup_key = (account.clone(), sort_key, ticker.clone(), side);
    let ordinal = dup_counter.entry(dup_key).or_insert(0);
    let id = derive_trade_id(&account, sort_key, &ticker, side, *ordinal);
    *ordinal += 1;

    Some(Trade {
        id,
        account,
        ticker,
        side,
        quantity,
        price,
        actual_timestamp,
        sort_key,
        broker_date,
        broker_time,
    })
}
