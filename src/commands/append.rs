//! Append command: integrate a new trade batch against persisted state

use std::collections::HashSet;

use anyhow::{bail, Result};
use tracing::{info, warn};

use trade_recon::store::StateStore;
use trade_recon::{equity, ingest, merger, report, Ticker};

pub fn run(csv_path: String, config_path: Option<String>, db_override: Option<String>) -> Result<()> {
    info!("Starting append import from {csv_path}");

    let config = super::load_config(config_path)?;
    let rates = config.commission_rates();

    let mut store = StateStore::open(super::resolve_db_path(db_override, &config))?;
    let Some(last_point) = store.last_equity_point()? else {
        bail!("No persisted state found; run a full import first");
    };
    let existing_positions = store.load_positions()?;
    let existing_trades = store.load_trades_by_ticker()?;
    let existing_ids = store.existing_trade_ids()?;

    let batch =
        ingest::load_trades_csv_with(&csv_path, config.session.after_hours_boundary_hour)?;
    if batch.dropped > 0 {
        warn!("{} unparsable rows dropped", batch.dropped);
    }

    let new_trades: Vec<_> = batch
        .trades
        .into_iter()
        .filter(|t| !existing_ids.contains(&t.id))
        .collect();
    if new_trades.is_empty() {
        info!("No new trades in batch, nothing to do");
        return Ok(());
    }
    info!("{} new trade(s) after dedupe", new_trades.len());

    let outcome =
        merger::merge_positions(new_trades.clone(), &existing_positions, &existing_trades, &rates);

    let failed: HashSet<Ticker> = outcome.failures.iter().map(|(t, _)| t.clone()).collect();
    let kept_trades: Vec<_> = new_trades
        .into_iter()
        .filter(|t| !failed.contains(&t.ticker))
        .collect();

    // Points at or before the stored anchor date are final; the batch only
    // extends the curve forward from there.
    let points = equity::extend_from(
        outcome.positions.values(),
        last_point.date,
        last_point.total_value,
        &rates,
    );

    store.save_trades(&kept_trades)?;
    store.save_positions(&outcome.positions)?;
    store.save_equity_points(&points)?;

    info!(
        "Append finished: {} new trade(s) persisted, {} ticker(s) failed, {} new equity point(s)",
        kept_trades.len(),
        outcome.failures.len(),
        points.len()
    );
    for (ticker, err) in &outcome.failures {
        warn!("{ticker}: {err}");
    }

    println!("{}", report::render_positions(&outcome.positions));
    Ok(())
}
