//! SQLite persistence for reconciled state
//!
//! Holds the flat trade ledger, the position set with its position/trade
//! join table, and the equity curve. Monetary columns are stored as decimal
//! strings so nothing round-trips through floating point.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection};
use tracing::{debug, info};

use crate::types::{EquityCurvePoint, Money, Position, Ticker, Trade};

const DATE_FMT: &str = "%Y-%m-%d";
const DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

pub struct StateStore {
    conn: Connection,
}

impl StateStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let store = StateStore { conn };
        store.create_tables()?;
        info!("State store opened: {}", path.display());
        Ok(store)
    }

    /// Private in-memory database, used by tests
    pub fn open_in_memory() -> Result<Self> {
        let store = StateStore {
            conn: Connection::open_in_memory()?,
        };
        store.create_tables()?;
        Ok(store)
    }

    fn create_tables(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS trades (
                id TEXT PRIMARY KEY,
                account TEXT NOT NULL,
                ticker TEXT NOT NULL,
                side TEXT NOT NULL,
                quantity INTEGER NOT NULL,
                price TEXT NOT NULL,
                actual_timestamp TEXT NOT NULL,
                sort_key INTEGER NOT NULL,
                broker_date TEXT NOT NULL,
                broker_time TEXT NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS positions (
                id TEXT PRIMARY KEY,
                account TEXT NOT NULL,
                ticker TEXT NOT NULL,
                status TEXT NOT NULL,
                open_date TEXT NOT NULL,
                close_date TEXT,
                avg_buy_price TEXT NOT NULL,
                total_shares INTEGER NOT NULL,
                max_shares INTEGER NOT NULL,
                realized_pnl TEXT NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS position_trades (
                position_id TEXT NOT NULL,
                trade_id TEXT NOT NULL,
                seq INTEGER NOT NULL,
                PRIMARY KEY (position_id, trade_id)
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS equity_points (
                date TEXT PRIMARY KEY,
                total_value TEXT NOT NULL,
                daily_pnl TEXT NOT NULL,
                cash_value TEXT NOT NULL,
                stock_value TEXT NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_trades_ticker ON trades(ticker)",
            [],
        )?;
        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_position_trades_pos ON position_trades(position_id)",
            [],
        )?;

        debug!("Database schema created/verified");
        Ok(())
    }

    /// Drop everything; a full import rebuilds state from scratch
    pub fn clear_all(&mut self) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM position_trades", [])?;
        tx.execute("DELETE FROM positions", [])?;
        tx.execute("DELETE FROM trades", [])?;
        tx.execute("DELETE FROM equity_points", [])?;
        tx.commit()?;
        Ok(())
    }

    /// Trade ids already persisted, for upstream dedupe of an append batch
    pub fn existing_trade_ids(&self) -> Result<HashSet<String>> {
        let mut stmt = self.conn.prepare("SELECT id FROM trades")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<HashSet<_>>>()?;
        Ok(ids)
    }

    pub fn save_trades(&mut self, trades: &[Trade]) -> Result<()> {
        let tx = self.conn.transaction()?;
        for trade in trades {
            tx.execute(
                "INSERT OR REPLACE INTO trades
                 (id, account, ticker, side, quantity, price, actual_timestamp,
                  sort_key, broker_date, broker_time)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    trade.id,
                    trade.account,
                    trade.ticker.as_str(),
                    trade.side.as_str(),
                    trade.quantity,
                    trade.price.to_string(),
                    trade.actual_timestamp.format(DATETIME_FMT).to_string(),
                    trade.sort_key,
                    trade.broker_date,
                    trade.broker_time,
                ],
            )?;
        }
        tx.commit()?;
        debug!("Saved {} trades", trades.len());
        Ok(())
    }

    /// Upsert the result position set and its join table.
    ///
    /// Append runs hand over the complete replacement set (closed positions
    /// pass through the merger unchanged), so ids never need deleting; a
    /// ticker that failed reconciliation keeps its previously stored rows.
    pub fn save_positions(&mut self, positions: &HashMap<String, Position>) -> Result<()> {
        let tx = self.conn.transaction()?;
        for position in positions.values() {
            tx.execute(
                "INSERT OR REPLACE INTO positions
                 (id, account, ticker, status, open_date, close_date,
                  avg_buy_price, total_shares, max_shares, realized_pnl)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    position.id,
                    position.account,
                    position.ticker.as_str(),
                    position.status.as_str(),
                    position.open_date.format(DATE_FMT).to_string(),
                    position.close_date.map(|d| d.format(DATE_FMT).to_string()),
                    position.avg_buy_price.to_string(),
                    position.total_shares,
                    position.max_shares,
                    position.realized_pnl.to_string(),
                ],
            )?;

            tx.execute(
                "DELETE FROM position_trades WHERE position_id = ?1",
                params![position.id],
            )?;
            for (seq, trade_id) in position.trade_ids().into_iter().enumerate() {
                tx.execute(
                    "INSERT INTO position_trades (position_id, trade_id, seq)
                     VALUES (?1, ?2, ?3)",
                    params![position.id, trade_id, seq as i64],
                )?;
            }
        }
        tx.commit()?;
        debug!("Saved {} positions", positions.len());
        Ok(())
    }

    /// Load all positions with their owned trades attached, in chrono order
    pub fn load_positions(&self) -> Result<HashMap<String, Position>> {
        let trades_by_id = self.load_trades_by_id()?;

        let mut stmt = self.conn.prepare(
            "SELECT position_id, trade_id FROM position_trades ORDER BY position_id, seq",
        )?;
        let joins = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut trades_by_position: HashMap<String, Vec<Trade>> = HashMap::new();
        for (position_id, trade_id) in joins {
            let trade = trades_by_id
                .get(&trade_id)
                .ok_or_else(|| anyhow!("join table references missing trade {trade_id}"))?;
            trades_by_position
                .entry(position_id)
                .or_default()
                .push(trade.clone());
        }

        let mut stmt = self.conn.prepare(
            "SELECT id, account, ticker, status, open_date, close_date,
                    avg_buy_price, total_shares, max_shares, realized_pnl
             FROM positions",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, i64>(7)?,
                    row.get::<_, i64>(8)?,
                    row.get::<_, String>(9)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut positions = HashMap::with_capacity(rows.len());
        for (id, account, ticker, status, open, close, avg, total, max, pnl) in rows {
            let trades = trades_by_position.remove(&id).unwrap_or_default();
            positions.insert(
                id.clone(),
                Position {
                    account,
                    ticker: Ticker::new(ticker),
                    status: status
                        .parse()
                        .map_err(|e| anyhow!("position {id}: {e}"))?,
                    open_date: parse_date(&open)?,
                    close_date: close.as_deref().map(parse_date).transpose()?,
                    avg_buy_price: parse_money(&avg)?,
                    total_shares: total,
                    max_shares: max,
                    realized_pnl: parse_money(&pnl)?,
                    trades,
                    id,
                },
            );
        }

        debug!("Loaded {} positions", positions.len());
        Ok(positions)
    }

    fn load_trades_by_id(&self) -> Result<HashMap<String, Trade>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, account, ticker, side, quantity, price, actual_timestamp,
                    sort_key, broker_date, broker_time
             FROM trades",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, i64>(7)?,
                    row.get::<_, String>(8)?,
                    row.get::<_, String>(9)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut trades = HashMap::with_capacity(rows.len());
        for (id, account, ticker, side, quantity, price, ts, sort_key, bd, bt) in rows {
            trades.insert(
                id.clone(),
                Trade {
                    account,
                    ticker: Ticker::new(ticker),
                    side: side.parse().map_err(|e| anyhow!("trade {id}: {e}"))?,
                    quantity: u32::try_from(quantity)
                        .map_err(|_| anyhow!("trade {id}: bad quantity {quantity}"))?,
                    price: parse_money(&price)?,
                    actual_timestamp: parse_datetime(&ts)?,
                    sort_key,
                    broker_date: bd,
                    broker_time: bt,
                    id,
                },
            );
        }
        Ok(trades)
    }

    /// All persisted trades grouped by ticker, chrono-sorted within each
    pub fn load_trades_by_ticker(&self) -> Result<HashMap<Ticker, Vec<Trade>>> {
        let mut by_ticker: HashMap<Ticker, Vec<Trade>> = HashMap::new();
        for trade in self.load_trades_by_id()?.into_values() {
            by_ticker.entry(trade.ticker.clone()).or_default().push(trade);
        }
        for trades in by_ticker.values_mut() {
            trades.sort_by(|a, b| a.chrono_key().cmp(&b.chrono_key()));
        }
        Ok(by_ticker)
    }

    pub fn save_equity_points(&mut self, points: &[EquityCurvePoint]) -> Result<()> {
        let tx = self.conn.transaction()?;
        for point in points {
            tx.execute(
                "INSERT OR REPLACE INTO equity_points
                 (date, total_value, daily_pnl, cash_value, stock_value)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    point.date.format(DATE_FMT).to_string(),
                    point.total_value.to_string(),
                    point.daily_pnl.to_string(),
                    point.cash_value.to_string(),
                    point.stock_value.to_string(),
                ],
            )?;
        }
        tx.commit()?;
        debug!("Saved {} equity points", points.len());
        Ok(())
    }

    pub fn load_equity_points(&self) -> Result<Vec<EquityCurvePoint>> {
        let mut stmt = self.conn.prepare(
            "SELECT date, total_value, daily_pnl, cash_value, stock_value
             FROM equity_points ORDER BY date",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(date, total, daily, cash, stock)| {
                Ok(EquityCurvePoint {
                    date: parse_date(&date)?,
                    total_value: parse_money(&total)?,
                    daily_pnl: parse_money(&daily)?,
                    cash_value: parse_money(&cash)?,
                    stock_value: parse_money(&stock)?,
                })
            })
            .collect()
    }

    /// Most recent persisted equity point, the append-mode starting anchor
    pub fn last_equity_point(&self) -> Result<Option<EquityCurvePoint>> {
        Ok(self.load_equity_points()?.pop())
    }
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FMT).with_context(|| format!("bad stored date: {s}"))
}

fn parse_datetime(s: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, DATETIME_FMT)
        .with_context(|| format!("bad stored timestamp: {s}"))
}

fn parse_money(s: &str) -> Result<Money> {
    s.parse::<Money>()
        .map_err(|e| anyhow!("bad stored decimal '{s}': {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build_positions;
    use crate::types::{CommissionRates, Side};

    fn trade(side: Side, quantity: u32, price: i64, day: u32) -> Trade {
        let ts = NaiveDate::from_ymd_opt(2025, 8, day)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        Trade {
            id: format!("{}-{day:02}", side.as_str()),
            account: "acc-1".into(),
            ticker: Ticker::new("AAPL"),
            side,
            quantity,
            price: Money::from_i64(price),
            actual_timestamp: ts,
            sort_key: ts.and_utc().timestamp(),
            broker_date: format!("2025/08/{day:02}"),
            broker_time: "10:00:00".into(),
        }
    }

    #[test]
    fn test_trade_round_trip() {
        let mut store = StateStore::open_in_memory().unwrap();
        let trades = vec![trade(Side::Buy, 10, 100, 1), trade(Side::Sell, 10, 120, 2)];
        store.save_trades(&trades).unwrap();

        let ids = store.existing_trade_ids().unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("BUY-01"));

        let by_ticker = store.load_trades_by_ticker().unwrap();
        let loaded = &by_ticker[&Ticker::new("AAPL")];
        assert_eq!(loaded, &trades);
    }

    #[test]
    fn test_position_round_trip_with_trades() {
        let mut store = StateStore::open_in_memory().unwrap();
        let trades = vec![trade(Side::Buy, 10, 100, 1), trade(Side::Sell, 10, 120, 2)];
        let positions: HashMap<String, Position> =
            build_positions(trades.clone(), &CommissionRates::default())
                .unwrap()
                .into_iter()
                .map(|p| (p.id.clone(), p))
                .collect();

        store.save_trades(&trades).unwrap();
        store.save_positions(&positions).unwrap();

        let loaded = store.load_positions().unwrap();
        assert_eq!(loaded, positions);
    }

    #[test]
    fn test_equity_round_trip_and_last_point() {
        let mut store = StateStore::open_in_memory().unwrap();
        let points = vec![
            EquityCurvePoint::new(
                NaiveDate::from_ymd_opt(2025, 8, 1).unwrap(),
                "9850.25".parse().unwrap(),
                Money::ZERO,
            ),
            EquityCurvePoint::new(
                NaiveDate::from_ymd_opt(2025, 8, 2).unwrap(),
                Money::from_i64(10_050),
                "199.75".parse().unwrap(),
            ),
        ];
        store.save_equity_points(&points).unwrap();

        assert_eq!(store.load_equity_points().unwrap(), points);
        assert_eq!(store.last_equity_point().unwrap().unwrap(), points[1]);
    }

    #[test]
    fn test_clear_all() {
        let mut store = StateStore::open_in_memory().unwrap();
        store.save_trades(&[trade(Side::Buy, 10, 100, 1)]).unwrap();
        store.clear_all().unwrap();
        assert!(store.existing_trade_ids().unwrap().is_empty());
        assert!(store.last_equity_point().unwrap().is_none());
    }
}
