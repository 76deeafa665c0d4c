//! SQLite adapter: signal table reader and the daily PnL cache.

use crate::domain::aggregate::DayIndex;
use crate::domain::error::SigpnlError;
use crate::domain::signal::{Direction, Signal, Timeframe};
use crate::ports::cache_port::PnlCachePort;
use crate::ports::config_port::ConfigPort;
use crate::ports::signal_port::SignalPort;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use tracing::warn;

fn db_err(e: r2d2::Error) -> SigpnlError {
    SigpnlError::Database {
        reason: e.to_string(),
    }
}

fn query_err(e: rusqlite::Error) -> SigpnlError {
    SigpnlError::DatabaseQuery {
        reason: e.to_string(),
    }
}

#[derive(Clone)]
pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, SigpnlError> {
        let db_path =
            config
                .get_string("sqlite", "path")
                .ok_or_else(|| SigpnlError::ConfigMissing {
                    section: "sqlite".into(),
                    key: "path".into(),
                })?;

        let pool_size = config.get_int("sqlite", "pool_size", 4).max(1) as u32;

        // Workers write the cache concurrently; wait on the file lock instead of failing.
        let manager = SqliteConnectionManager::file(&db_path)
            .with_init(|c| c.execute_batch("PRAGMA busy_timeout = 5000;"));
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(db_err)?;

        Ok(Self { pool })
    }

    pub fn in_memory() -> Result<Self, SigpnlError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager).map_err(db_err)?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, SigpnlError> {
        self.pool.get().map_err(db_err)
    }

    pub fn initialize_schema(&self) -> Result<(), SigpnlError> {
        self.conn()?
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS signals (
                    symbol TEXT NOT NULL,
                    timeframe TEXT NOT NULL,
                    timestamp INTEGER NOT NULL,
                    price REAL NOT NULL,
                    signal TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_signals_tf_ts ON signals(timeframe, timestamp);
                CREATE TABLE IF NOT EXISTS daily_pnl_cache (
                    timeframe TEXT NOT NULL,
                    symbol TEXT NOT NULL,
                    day INTEGER NOT NULL,
                    pnl REAL NOT NULL,
                    PRIMARY KEY (timeframe, symbol, day)
                );",
            )
            .map_err(query_err)
    }

    pub fn insert_signals(&self, timeframe: Timeframe, signals: &[Signal]) -> Result<(), SigpnlError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;

        for s in signals {
            tx.execute(
                "INSERT INTO signals (symbol, timeframe, timestamp, price, signal)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    s.symbol,
                    timeframe.as_str(),
                    s.timestamp,
                    s.price,
                    s.direction.as_str()
                ],
            )
            .map_err(query_err)?;
        }

        tx.commit().map_err(query_err)
    }

    /// Cache handle scoped to one timeframe.
    pub fn pnl_cache(&self, timeframe: Timeframe) -> SqlitePnlCache {
        SqlitePnlCache {
            pool: self.pool.clone(),
            timeframe,
        }
    }

    /// Wipe cached PnL for every timeframe.
    pub fn clear_all_cache(&self) -> Result<usize, SigpnlError> {
        self.conn()?
            .execute("DELETE FROM daily_pnl_cache", [])
            .map_err(query_err)
    }
}

impl SignalPort for SqliteAdapter {
    fn fetch_signals(&self, timeframe: Timeframe, since: i64) -> Result<Vec<Signal>, SigpnlError> {
        let conn = self.conn()?;

        let query = "SELECT symbol, CAST(timestamp AS INTEGER), CAST(price AS REAL), signal
                     FROM signals
                     WHERE timeframe = ?1 AND timestamp >= ?2
                     ORDER BY timestamp ASC, rowid ASC";

        let mut stmt = conn.prepare(query).map_err(query_err)?;

        let rows = stmt
            .query_map(params![timeframe.as_str(), since], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .map_err(query_err)?;

        let mut signals = Vec::new();
        for row in rows {
            let (symbol, timestamp, price, raw_direction) = row.map_err(query_err)?;
            if !(price.is_finite() && price > 0.0) {
                warn!(symbol = %symbol, timestamp, price, "skipping signal with unusable price");
                continue;
            }
            match raw_direction.parse::<Direction>() {
                Ok(direction) => signals.push(Signal {
                    symbol,
                    timestamp,
                    price,
                    direction,
                }),
                Err(e) => warn!(symbol = %symbol, timestamp, "skipping signal: {e}"),
            }
        }

        Ok(signals)
    }
}

pub struct SqlitePnlCache {
    pool: Pool<SqliteConnectionManager>,
    timeframe: Timeframe,
}

impl PnlCachePort for SqlitePnlCache {
    fn get(&self, symbol: &str, day: DayIndex) -> Result<Option<f64>, SigpnlError> {
        let conn = self.pool.get().map_err(db_err)?;
        conn.query_row(
            "SELECT pnl FROM daily_pnl_cache WHERE timeframe = ?1 AND symbol = ?2 AND day = ?3",
            params![self.timeframe.as_str(), symbol, day],
            |row| row.get(0),
        )
        .optional()
        .map_err(query_err)
    }

    fn put(&self, symbol: &str, day: DayIndex, pnl: f64) -> Result<(), SigpnlError> {
        let conn = self.pool.get().map_err(db_err)?;
        conn.execute(
            "INSERT OR REPLACE INTO daily_pnl_cache (timeframe, symbol, day, pnl)
             VALUES (?1, ?2, ?3, ?4)",
            params![self.timeframe.as_str(), symbol, day, pnl],
        )
        .map_err(query_err)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), SigpnlError> {
        let conn = self.pool.get().map_err(db_err)?;
        conn.execute(
            "DELETE FROM daily_pnl_cache WHERE timeframe = ?1",
            params![self.timeframe.as_str()],
        )
        .map_err(query_err)?;
        Ok(())
    }
}
