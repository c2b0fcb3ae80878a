//! JSON → SQL query layer.
//!
//! Reads the JSON cache artifacts and loads them into a persistent SQLite
//! database, providing a read-only SQL interface over the smart money
//! data:
//!
//!   JSON artifacts (written by collectors)
//!     ↓ refresh_all() / background watcher
//!   SQLite tables
//!     ↓ query()
//!   callers (who must be able to fall back to the JSON artifacts)
//!
//! One writer at a time (in-process mutex; a busy lock means refresh is
//! skipped and the last known counts are returned), any number of
//! concurrent readers. Lists and nested objects are JSON-serialized into
//! TEXT columns so the tables stay flat.

mod flatten;

use cache_store::CacheStore;
use dashmap::DashMap;
use serde_json::{Map, Value};
use signal_core::{Result, SignalError};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub use flatten::FILE_TABLES;

/// Poll interval of the background artifact watcher.
pub const WATCH_INTERVAL: Duration = Duration::from_secs(60);

/// SQLite-backed query layer over the JSON artifacts.
#[derive(Clone)]
pub struct ColumnarStore {
    pool: sqlx::SqlitePool,
    db_path: PathBuf,
    cache: CacheStore,
    write_lock: Arc<tokio::sync::Mutex<()>>,
    table_counts: Arc<DashMap<String, i64>>,
    last_refresh: Arc<AtomicI64>,
    watcher_started: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
}

impl ColumnarStore {
    /// Open (creating if needed) the database and bind it to a cache
    /// directory.
    pub async fn connect(db_path: impl AsRef<Path>, cache: CacheStore) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        let url = format!("sqlite:{}?mode=rwc", db_path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect(&url)
            .await
            .map_err(|e| SignalError::Database(format!("connect {}: {e}", db_path.display())))?;

        // WAL lets readers proceed while a refresh is writing.
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&pool)
            .await
            .map_err(|e| SignalError::Database(format!("WAL pragma: {e}")))?;

        Ok(ColumnarStore {
            pool,
            db_path,
            cache,
            write_lock: Arc::new(tokio::sync::Mutex::new(())),
            table_counts: Arc::new(DashMap::new()),
            last_refresh: Arc::new(AtomicI64::new(0)),
            watcher_started: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    // ── Refresh ────────────────────────────────────────────────────────

    /// Reload every artifact into its tables. Returns `{table: count}`.
    ///
    /// When another task holds the write lock the refresh is skipped and
    /// the last known counts come back unchanged.
    pub async fn refresh_all(&self) -> BTreeMap<String, i64> {
        let Ok(_guard) = self.write_lock.try_lock() else {
            tracing::info!("columnar refresh skipped: another writer is active");
            return self.current_counts();
        };

        for (filename, _tables) in FILE_TABLES {
            if !self.cache.exists(filename) {
                tracing::debug!("columnar: skipping missing artifact {filename}");
                continue;
            }
            let data = self.cache.read(filename).unwrap_or_default();
            for (table, rows) in flatten::tables_for(filename, &data) {
                match self.replace_table(&table, &rows).await {
                    Ok(count) => {
                        self.table_counts.insert(table, count);
                    }
                    Err(e) => tracing::error!("columnar: failed to load {table}: {e}"),
                }
            }
        }

        self.last_refresh
            .store(chrono::Utc::now().timestamp(), Ordering::Relaxed);
        let counts = self.current_counts();
        let total: i64 = counts.values().sum();
        tracing::info!(
            "columnar refresh complete: {total} rows in {} tables",
            counts.len()
        );
        counts
    }

    /// Refresh the single table derived from its source artifact.
    pub async fn refresh_table(&self, table: &str) -> Result<i64> {
        let source = FILE_TABLES
            .iter()
            .find(|(_, tables)| tables.contains(&table))
            .map(|(file, _)| *file)
            .ok_or_else(|| SignalError::ColumnarRefresh(format!("unknown table: {table}")))?;

        if !self.cache.exists(source) {
            return Err(SignalError::InputMissing(source.to_string()));
        }

        let Ok(_guard) = self.write_lock.try_lock() else {
            return Ok(self.table_counts.get(table).map(|c| *c).unwrap_or(0));
        };

        let data = self.cache.read(source).unwrap_or_default();
        let mut count = 0;
        for (t, rows) in flatten::tables_for(source, &data) {
            if t == table {
                count = self.replace_table(&t, &rows).await?;
                self.table_counts.insert(t, count);
            }
        }
        Ok(count)
    }

    /// Drop-and-recreate a table from flat JSON rows inside one
    /// transaction, so readers see either the old table or the new one.
    async fn replace_table(&self, table: &str, rows: &[Map<String, Value>]) -> Result<i64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| SignalError::Database(e.to_string()))?;

        sqlx::query(&format!("DROP TABLE IF EXISTS \"{table}\""))
            .execute(&mut *tx)
            .await
            .map_err(|e| SignalError::Database(e.to_string()))?;

        if rows.is_empty() {
            tx.commit()
                .await
                .map_err(|e| SignalError::Database(e.to_string()))?;
            tracing::debug!("columnar {table}: 0 rows (empty source)");
            return Ok(0);
        }

        // Column order: first row's keys, then anything new from later rows.
        let mut columns: Vec<String> = Vec::new();
        for row in rows {
            for key in row.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }

        let column_defs: Vec<String> = columns
            .iter()
            .map(|c| format!("\"{c}\" {}", infer_affinity(c, rows)))
            .collect();
        sqlx::query(&format!(
            "CREATE TABLE \"{table}\" ({})",
            column_defs.join(", ")
        ))
        .execute(&mut *tx)
        .await
        .map_err(|e| SignalError::Database(e.to_string()))?;

        let placeholders = vec!["?"; columns.len()].join(", ");
        let quoted: Vec<String> = columns.iter().map(|c| format!("\"{c}\"")).collect();
        let insert_sql = format!(
            "INSERT INTO \"{table}\" ({}) VALUES ({placeholders})",
            quoted.join(", ")
        );

        for row in rows {
            let mut query = sqlx::query(&insert_sql);
            for col in &columns {
                query = bind_value(query, row.get(col).unwrap_or(&Value::Null));
            }
            query
                .execute(&mut *tx)
                .await
                .map_err(|e| SignalError::Database(format!("{table}: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| SignalError::Database(e.to_string()))?;

        tracing::debug!("columnar {table}: {} rows loaded", rows.len());
        Ok(rows.len() as i64)
    }

    // ── Query interface ────────────────────────────────────────────────

    /// Execute an opaque read-only SQL query; rows come back as JSON maps.
    /// Callers catch errors and fall back to the JSON artifacts.
    pub async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Map<String, Value>>> {
        let mut query = sqlx::query(sql);
        for p in params {
            query = bind_value(query, p);
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SignalError::Database(e.to_string()))?;
        Ok(rows.iter().map(row_to_map).collect())
    }

    /// Execute several queries back to back, saving per-call overhead.
    pub async fn query_many(
        &self,
        queries: &[(&str, Vec<Value>)],
    ) -> Result<Vec<Vec<Map<String, Value>>>> {
        let mut results = Vec::with_capacity(queries.len());
        for (sql, params) in queries {
            results.push(self.query(sql, params).await?);
        }
        Ok(results)
    }

    /// First row of a query, or `None`.
    pub async fn query_one(
        &self,
        sql: &str,
        params: &[Value],
    ) -> Result<Option<Map<String, Value>>> {
        Ok(self.query(sql, params).await?.into_iter().next())
    }

    pub async fn table_exists(&self, table: &str) -> bool {
        self.query(
            "SELECT COUNT(*) AS n FROM sqlite_master WHERE type = 'table' AND name = ?",
            &[Value::String(table.to_string())],
        )
        .await
        .ok()
        .and_then(|rows| rows.first().and_then(|r| r.get("n").and_then(Value::as_i64)))
        .map(|n| n > 0)
        .unwrap_or(false)
    }

    // ── Status ─────────────────────────────────────────────────────────

    pub async fn status(&self) -> Value {
        let size_bytes = std::fs::metadata(&self.db_path).map(|m| m.len()).unwrap_or(0);

        // Live counts when readable; fall back to the cached counts.
        let mut counts = self.current_counts();
        for (_, tables) in FILE_TABLES {
            for table in *tables {
                if let Ok(Some(row)) = self
                    .query_one(&format!("SELECT COUNT(*) AS n FROM \"{table}\""), &[])
                    .await
                {
                    if let Some(n) = row.get("n").and_then(Value::as_i64) {
                        counts.insert((*table).to_string(), n);
                    }
                }
            }
        }

        let last = self.last_refresh.load(Ordering::Relaxed);
        let last_iso = (last > 0)
            .then(|| chrono::DateTime::from_timestamp(last, 0))
            .flatten()
            .map(|dt| dt.to_rfc3339());
        let total_rows: i64 = counts.values().sum();

        serde_json::json!({
            "db_path": self.db_path.display().to_string(),
            "size_mb": (size_bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0,
            "initialized": last > 0,
            "last_refresh": (last > 0).then_some(last),
            "last_refresh_iso": last_iso,
            "table_counts": counts,
            "total_rows": total_rows,
        })
    }

    fn current_counts(&self) -> BTreeMap<String, i64> {
        self.table_counts
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect()
    }

    // ── Background watcher ─────────────────────────────────────────────

    /// Spawn the mtime-polling refresh watcher. Idempotent: only the first
    /// call spawns a task. The task re-runs `refresh_all` whenever any
    /// watched artifact's mtime changes, and checks the shutdown flag
    /// between iterations.
    pub fn spawn_watcher(&self, interval: Duration) {
        if self.watcher_started.swap(true, Ordering::SeqCst) {
            return;
        }
        let store = self.clone();
        tokio::spawn(async move {
            let mut last_mtimes: BTreeMap<&str, f64> = BTreeMap::new();
            loop {
                if store.shutdown.load(Ordering::SeqCst) {
                    tracing::info!("columnar watcher shutting down");
                    break;
                }
                let mut changed = false;
                for (filename, _) in FILE_TABLES {
                    let mtime = store.cache.mtime(filename).unwrap_or(0.0);
                    let prev = last_mtimes.insert(*filename, mtime);
                    if prev != Some(mtime) {
                        changed = true;
                    }
                }
                if changed {
                    store.refresh_all().await;
                }
                tokio::time::sleep(interval).await;
            }
        });
        tracing::info!("columnar watcher started ({}s interval)", interval.as_secs());
    }

    /// Ask the watcher to stop at its next iteration.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

/// Pick a column affinity from the first non-null value seen.
fn infer_affinity(column: &str, rows: &[Map<String, Value>]) -> &'static str {
    for row in rows {
        match row.get(column) {
            Some(Value::Bool(_)) => return "INTEGER",
            Some(Value::Number(n)) => {
                return if n.is_i64() || n.is_u64() { "INTEGER" } else { "REAL" }
            }
            Some(Value::String(_)) => return "TEXT",
            Some(Value::Null) | None => continue,
            // Flattened rows never carry arrays/objects, but TEXT is the
            // safe affinity if one slips through.
            Some(_) => return "TEXT",
        }
    }
    "TEXT"
}

type SqliteQuery<'q> = sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>;

fn bind_value<'q>(query: SqliteQuery<'q>, value: &'q Value) -> SqliteQuery<'q> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else {
                query.bind(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => query.bind(s.as_str()),
        other => query.bind(other.to_string()),
    }
}

fn row_to_map(row: &SqliteRow) -> Map<String, Value> {
    let mut map = Map::new();
    for col in row.columns() {
        let i = col.ordinal();
        let value = match row.try_get_raw(i) {
            Ok(raw) if raw.is_null() => Value::Null,
            Ok(raw) => match raw.type_info().name() {
                "INTEGER" => row
                    .try_get::<i64, _>(i)
                    .map(Value::from)
                    .unwrap_or(Value::Null),
                "REAL" => row
                    .try_get::<f64, _>(i)
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
                "BOOLEAN" => row
                    .try_get::<bool, _>(i)
                    .map(Value::from)
                    .unwrap_or(Value::Null),
                _ => row
                    .try_get::<String, _>(i)
                    .map(Value::from)
                    .unwrap_or(Value::Null),
            },
            Err(_) => Value::Null,
        };
        map.insert(col.name().to_string(), value);
    }
    map
}
