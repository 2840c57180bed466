use crate::error::{Result, StorageError};
use crate::{MetricStorage, MetricValues};
use chrono::Utc;
use ometrics_common::types::{MetricKind, MetricSample, MetricValue};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS metric_values (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    metric_name TEXT NOT NULL,
    gauge_value REAL,
    counter_value INTEGER,
    source TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    CHECK ((gauge_value IS NULL) <> (counter_value IS NULL))
);
CREATE INDEX IF NOT EXISTS idx_metric_values_name_time
    ON metric_values(metric_name, created_at);
";

#[derive(Debug, Clone)]
pub struct SqliteStorageConfig {
    pub path: PathBuf,
    /// How long a statement waits on a locked database before failing busy.
    pub busy_timeout: Duration,
    /// Recorded on every row to tell writers apart.
    pub source: String,
}

/// Append-only metric history in SQLite.
///
/// Every update inserts one row; live values are derived on read: the newest
/// gauge row per name, and the sum of counter rows per name.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
    source: String,
}

impl SqliteStorage {
    pub fn open(config: &SqliteStorageConfig) -> Result<Self> {
        if let Some(dir) = config.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|source| StorageError::Persistence {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let conn = Connection::open(&config.path)?;
        Self::with_connection(conn, config)
    }

    fn with_connection(mut conn: Connection, config: &SqliteStorageConfig) -> Result<Self> {
        conn.busy_timeout(config.busy_timeout)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        let tx = conn.transaction()?;
        tx.execute_batch(SCHEMA)?;
        tx.commit()?;

        tracing::info!(path = %config.path.display(), source = %config.source, "Opened metrics database");
        Ok(Self {
            conn: Mutex::new(conn),
            source: config.source.clone(),
        })
    }

    /// Lock the connection, recovering from a poisoned Mutex if necessary.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn insert(&self, name: &str, gauge: Option<f64>, counter: Option<i64>) -> Result<()> {
        insert_row(
            &self.conn(),
            &self.source,
            name,
            gauge,
            counter,
            Utc::now().timestamp_millis(),
        )
    }
}

fn insert_row(
    conn: &Connection,
    source: &str,
    name: &str,
    gauge: Option<f64>,
    counter: Option<i64>,
    created_at: i64,
) -> Result<()> {
    conn.prepare_cached(
        "INSERT INTO metric_values (metric_name, gauge_value, counter_value, source, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?
    .execute(params![name, gauge, counter, source, created_at])?;
    Ok(())
}

/// Splits a sample into the two nullable value columns.
fn columns(sample: &MetricSample) -> Result<(Option<f64>, Option<i64>)> {
    match sample.value {
        MetricValue::Gauge(v) => {
            MetricValue::gauge(v)?;
            Ok((Some(v), None))
        }
        MetricValue::Counter(d) => Ok((None, Some(d))),
    }
}

impl MetricStorage for SqliteStorage {
    fn update_gauge(&self, name: &str, value: f64) -> Result<()> {
        MetricValue::gauge(value)?;
        self.insert(name, Some(value), None)
    }

    fn update_counter(&self, name: &str, delta: i64) -> Result<()> {
        self.insert(name, None, Some(delta))
    }

    /// Writes the batch in one transaction. Each row runs under its own
    /// savepoint, so a failing row is rolled back alone and reported in
    /// [`StorageError::Batch`] while the rest commit.
    fn update_metrics(&self, batch: &[MetricSample]) -> Result<()> {
        let conn = self.conn();
        let mut tx = conn.unchecked_transaction()?;
        let created_at = Utc::now().timestamp_millis();
        let mut errors = Vec::new();

        for sample in batch {
            let (gauge, counter) = match columns(sample) {
                Ok(cols) => cols,
                Err(e) => {
                    errors.push(e);
                    continue;
                }
            };
            let sp = tx.savepoint()?;
            match insert_row(&sp, &self.source, &sample.name, gauge, counter, created_at) {
                Ok(()) => sp.commit()?,
                Err(e) => errors.push(e),
            }
        }
        tx.commit()?;

        if errors.is_empty() {
            Ok(())
        } else {
            tracing::warn!(failed = errors.len(), total = batch.len(), "Batch partially applied");
            Err(StorageError::Batch(errors))
        }
    }

    fn get_gauge_value(&self, name: &str) -> Result<f64> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(
            "SELECT gauge_value FROM metric_values
             WHERE metric_name = ?1 AND gauge_value IS NOT NULL
             ORDER BY created_at DESC, id DESC LIMIT 1",
        )?;
        stmt.query_row(params![name], |row| row.get::<_, f64>(0))
            .optional()?
            .ok_or_else(|| StorageError::NotFound {
                kind: MetricKind::Gauge,
                name: name.to_string(),
            })
    }

    fn get_counter_value(&self, name: &str) -> Result<i64> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(
            "SELECT COUNT(*), COALESCE(SUM(counter_value), 0) FROM metric_values
             WHERE metric_name = ?1 AND counter_value IS NOT NULL",
        )?;
        let (rows, total): (i64, i64) =
            stmt.query_row(params![name], |row| Ok((row.get(0)?, row.get(1)?)))?;
        if rows == 0 {
            return Err(StorageError::NotFound {
                kind: MetricKind::Counter,
                name: name.to_string(),
            });
        }
        Ok(total)
    }

    fn get_all_values(&self) -> Result<MetricValues> {
        let conn = self.conn();
        let mut values = MetricValues::default();

        let mut gauges = conn.prepare_cached(
            "SELECT m.metric_name, m.gauge_value FROM metric_values m
             WHERE m.gauge_value IS NOT NULL AND m.id = (
                 SELECT l.id FROM metric_values l
                 WHERE l.metric_name = m.metric_name AND l.gauge_value IS NOT NULL
                 ORDER BY l.created_at DESC, l.id DESC LIMIT 1
             )",
        )?;
        let rows = gauges.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?)))?;
        for row in rows {
            let (name, value) = row?;
            values.gauges.insert(name, value);
        }

        let mut counters = conn.prepare_cached(
            "SELECT metric_name, SUM(counter_value) FROM metric_values
             WHERE counter_value IS NOT NULL
             GROUP BY metric_name",
        )?;
        let rows = counters.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
        for row in rows {
            let (name, total) = row?;
            values.counters.insert(name, total);
        }

        if values.is_empty() {
            return Err(StorageError::NotFound {
                kind: MetricKind::Gauge,
                name: "*".to_string(),
            });
        }
        Ok(values)
    }

    fn ping(&self) -> Result<()> {
        self.conn().query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }
}
