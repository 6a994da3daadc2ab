//! Show command: print persisted positions, metrics, and the equity curve

use anyhow::{Context, Result};

use trade_recon::metrics::{standard_registry, MetricContext};
use trade_recon::store::StateStore;
use trade_recon::{report, Money, Position};

pub fn run(
    total_assets: Option<String>,
    config_path: Option<String>,
    db_override: Option<String>,
) -> Result<()> {
    let config = super::load_config(config_path)?;
    let store = StateStore::open(super::resolve_db_path(db_override, &config))?;

    let positions = store.load_positions()?;
    let points = store.load_equity_points()?;

    println!("{}", report::render_positions(&positions));
    println!("{}", report::render_equity_curve(&points));

    let total_assets = total_assets
        .map(|s| s.parse::<Money>().context("total-assets must be a decimal number"))
        .transpose()?;

    let position_list: Vec<Position> = positions.into_values().collect();
    let ctx = MetricContext {
        positions: &position_list,
        total_assets,
    };

    let mut requested = vec![
        "total_positions",
        "closed_positions",
        "active_positions",
        "total_realized_pnl",
        "win_rate",
        "avg_pnl_per_closed",
    ];
    if total_assets.is_some() {
        requested.push("return_on_assets");
    }

    let results = standard_registry()
        .compute(&requested, &ctx)
        .map_err(anyhow::Error::from)?;

    println!("{}", "=".repeat(48));
    println!("METRICS");
    println!("{}", "=".repeat(48));
    for (name, value) in &results {
        println!("{name:<24} {value:>14.2}");
    }

    Ok(())
}
