//! Full import command: rebuild all state from a complete trade history

use std::collections::HashSet;

use anyhow::{Context, Result};
use tracing::{info, warn};

use trade_recon::store::StateStore;
use trade_recon::{equity, ingest, merger, report, Money, Ticker};

pub fn run(
    csv_path: String,
    total_assets: String,
    config_path: Option<String>,
    db_override: Option<String>,
) -> Result<()> {
    info!("Starting full import from {csv_path}");

    let config = super::load_config(config_path)?;
    let rates = config.commission_rates();
    let total_assets: Money = total_assets
        .parse()
        .context("total-assets must be a decimal number")?;

    let batch =
        ingest::load_trades_csv_with(&csv_path, config.session.after_hours_boundary_hour)?;
    if batch.dropped > 0 {
        warn!("{} unparsable rows dropped", batch.dropped);
    }

    let outcome = merger::reconcile_full(batch.trades.clone(), &rates);

    // Trades of a rejected ticker are not persisted: the user fixes the
    // source CSV and re-imports, nothing half-written sticks around.
    let failed: HashSet<Ticker> = outcome.failures.iter().map(|(t, _)| t.clone()).collect();
    let kept_trades: Vec<_> = batch
        .trades
        .into_iter()
        .filter(|t| !failed.contains(&t.ticker))
        .collect();

    let points = equity::reconstruct_historical(outcome.positions.values(), total_assets, &rates);

    let mut store = StateStore::open(super::resolve_db_path(db_override, &config))?;
    store.clear_all()?;
    store.save_trades(&kept_trades)?;
    store.save_positions(&outcome.positions)?;
    store.save_equity_points(&points)?;

    let ok_tickers: HashSet<&Ticker> = outcome.positions.values().map(|p| &p.ticker).collect();
    info!(
        "Import finished: {} ticker(s) reconciled, {} failed, {} positions, {} equity points",
        ok_tickers.len(),
        outcome.failures.len(),
        outcome.positions.len(),
        points.len()
    );
    for (ticker, err) in &outcome.failures {
        warn!("{ticker}: {err}");
    }

    println!("{}", report::render_positions(&outcome.positions));
    Ok(())
}
