//! SQLite sink.
//!
//! Each delivered batch is written in one transaction on a blocking thread.
//! Interval rows are keyed by interval id and inserted with `INSERT OR
//! IGNORE`, so redelivering a batch after a failure does not duplicate them.
//! With retention set, `flush` deletes rows whose `datetime` falls before the
//! retention cutoff, at most once per day.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use parking_lot::Mutex;
use rtm_core::{
    BoxFuture, DiagnosticRecord, IntervalRecord, PersistedRecord, Sink, SinkError, SinkRecord,
    SinkResult,
};
use rusqlite::{params, Connection};
use tracing::{debug, info};

use crate::error::{PersistenceError, PersistenceResult};
use crate::retention::RetentionPolicy;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS interval_records (
    id TEXT PRIMARY KEY,
    timestamp REAL NOT NULL,
    datetime TEXT NOT NULL,
    entity_class TEXT NOT NULL,
    game_type TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    round_id TEXT NOT NULL,
    from_kind TEXT NOT NULL,
    to_kind TEXT NOT NULL,
    interval_type TEXT NOT NULL,
    duration REAL NOT NULL,
    anomaly INTEGER NOT NULL,
    anomaly_score REAL
);
CREATE INDEX IF NOT EXISTS idx_interval_records_table
    ON interval_records (game_type, entity_id, interval_type);
CREATE TABLE IF NOT EXISTS diagnostic_records (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp REAL NOT NULL,
    datetime TEXT NOT NULL,
    severity TEXT NOT NULL,
    kind TEXT NOT NULL,
    message TEXT NOT NULL,
    context TEXT NOT NULL
);
";

type SharedConnection = Arc<Mutex<Option<Connection>>>;

/// Sink persisting records to a SQLite database file.
pub struct SqliteSink {
    name: String,
    path: PathBuf,
    conn: SharedConnection,
    retention: Mutex<Option<RetentionPolicy>>,
}

impl SqliteSink {
    /// Open (or create) the database at `path` and ensure the schema exists.
    pub fn open(name: &str, path: impl AsRef<Path>) -> PersistenceResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&path)?;
        let mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;
        info!(sink = %name, path = %path.display(), journal_mode = %mode, "Opened SQLite sink");

        Ok(Self {
            name: name.to_string(),
            path,
            conn: Arc::new(Mutex::new(Some(conn))),
            retention: Mutex::new(None),
        })
    }

    #[must_use]
    pub fn with_retention(self, days: Option<u32>) -> Self {
        *self.retention.lock() = days.map(RetentionPolicy::new);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn interval_count(&self) -> PersistenceResult<i64> {
        self.count("SELECT COUNT(*) FROM interval_records")
    }

    pub fn diagnostic_count(&self) -> PersistenceResult<i64> {
        self.count("SELECT COUNT(*) FROM diagnostic_records")
    }

    fn count(&self, sql: &str) -> PersistenceResult<i64> {
        let guard = self.conn.lock();
        let conn = guard.as_ref().ok_or(PersistenceError::Closed)?;
        Ok(conn.query_row(sql, [], |row| row.get(0))?)
    }
}

/// Delete rows recorded before `cutoff` (UTC midnight). Returns rows removed.
fn prune_before(conn: &SharedConnection, cutoff: NaiveDate) -> PersistenceResult<usize> {
    let mut guard = conn.lock();
    let conn = guard.as_mut().ok_or(PersistenceError::Closed)?;
    let bound = format!("{}T00:00:00.000Z", cutoff.format("%Y-%m-%d"));
    let tx = conn.transaction()?;
    let removed = tx.execute("DELETE FROM interval_records WHERE datetime < ?1", params![bound])?
        + tx.execute("DELETE FROM diagnostic_records WHERE datetime < ?1", params![bound])?;
    tx.commit()?;
    Ok(removed)
}

fn insert_batch(conn: &SharedConnection, rows: &[PersistedRecord]) -> PersistenceResult<usize> {
    let mut guard = conn.lock();
    let conn = guard.as_mut().ok_or(PersistenceError::Closed)?;
    let tx = conn.transaction()?;
    let mut inserted = 0;
    {
        let mut interval_stmt = tx.prepare_cached(
            "INSERT OR IGNORE INTO interval_records
             (id, timestamp, datetime, entity_class, game_type, entity_id, round_id,
              from_kind, to_kind, interval_type, duration, anomaly, anomaly_score)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        )?;
        let mut diagnostic_stmt = tx.prepare_cached(
            "INSERT INTO diagnostic_records
             (timestamp, datetime, severity, kind, message, context)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;

        for row in rows {
            inserted += match row {
                PersistedRecord::Interval(r) => insert_interval(&mut interval_stmt, r)?,
                PersistedRecord::Diagnostic(r) => insert_diagnostic(&mut diagnostic_stmt, r)?,
            };
        }
    }
    tx.commit()?;
    Ok(inserted)
}

fn insert_interval(
    stmt: &mut rusqlite::CachedStatement<'_>,
    r: &IntervalRecord,
) -> PersistenceResult<usize> {
    Ok(stmt.execute(params![
        r.id,
        r.timestamp,
        r.datetime,
        r.entity_class,
        r.game_type,
        r.entity_id,
        r.round_id,
        r.from_kind,
        r.to_kind,
        r.interval,
        r.duration_seconds,
        r.anomaly,
        r.anomaly_score,
    ])?)
}

fn insert_diagnostic(
    stmt: &mut rusqlite::CachedStatement<'_>,
    r: &DiagnosticRecord,
) -> PersistenceResult<usize> {
    let context = serde_json::to_string(&r.context)?;
    Ok(stmt.execute(params![
        r.timestamp,
        r.datetime,
        r.severity,
        r.kind,
        r.message,
        context,
    ])?)
}

impl Sink for SqliteSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn deliver<'a>(&'a self, records: &'a [Arc<SinkRecord>]) -> BoxFuture<'a, SinkResult<()>> {
        Box::pin(async move {
            let rows: Vec<PersistedRecord> = records.iter().map(|r| r.to_persisted()).collect();
            let conn = Arc::clone(&self.conn);
            let inserted = tokio::task::spawn_blocking(move || insert_batch(&conn, &rows))
                .await
                .map_err(|e| SinkError::Backend(format!("SQLite task failed: {e}")))??;
            debug!(sink = %self.name, records = records.len(), inserted, "Committed SQLite batch");
            Ok(())
        })
    }

    fn flush(&self) -> BoxFuture<'_, SinkResult<()>> {
        // Every batch is committed in `deliver`; flush only applies retention.
        Box::pin(async move {
            let cutoff = self.retention.lock().as_mut().and_then(RetentionPolicy::due_now);
            let Some(cutoff) = cutoff else {
                return Ok(());
            };
            let conn = Arc::clone(&self.conn);
            let removed = tokio::task::spawn_blocking(move || prune_before(&conn, cutoff))
                .await
                .map_err(|e| SinkError::Backend(format!("SQLite task failed: {e}")))??;
            if removed > 0 {
                info!(sink = %self.name, removed, %cutoff, "Pruned expired SQLite rows");
            }
            Ok(())
        })
    }

    fn close(&self) -> BoxFuture<'_, SinkResult<()>> {
        Box::pin(async move {
            let conn = self.conn.lock().take();
            if let Some(conn) = conn {
                conn.close()
                    .map_err(|(_, e)| SinkError::from(PersistenceError::from(e)))?;
                info!(sink = %self.name, "Closed SQLite sink");
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtm_core::{
        CheckpointKind, Diagnostic, DiagnosticKind, EntityClass, EntityKey, Interval, Severity,
        Timestamp,
    };
    use tempfile::TempDir;

    fn make_interval(round: &str, duration: f64) -> Arc<SinkRecord> {
        Arc::new(SinkRecord::Interval(
            Interval::new(
                EntityKey::new(EntityClass::SicboShaker, "sicbo", "SBO-001", round),
                CheckpointKind::ShakerStart,
                CheckpointKind::ShakerS0,
                duration,
                Timestamp::from_secs(100.0),
            )
            .annotated(true, Some(4.2)),
        ))
    }

    #[tokio::test]
    async fn test_deliver_persists_rows() {
        let temp_dir = TempDir::new().unwrap();
        let sink = SqliteSink::open("sqlite", temp_dir.path().join("rtm.db")).unwrap();

        let diag = Arc::new(SinkRecord::Diagnostic(
            Diagnostic::new(Severity::Error, DiagnosticKind::SinkDeliveryFailure, "down")
                .with_context("sink", "loki"),
        ));
        sink.deliver(&[make_interval("r1", 3.0), make_interval("r2", 4.0), diag])
            .await
            .unwrap();

        assert_eq!(sink.interval_count().unwrap(), 2);
        assert_eq!(sink.diagnostic_count().unwrap(), 1);

        let guard = sink.conn.lock();
        let conn = guard.as_ref().unwrap();
        let (interval, anomaly): (String, bool) = conn
            .query_row(
                "SELECT interval_type, anomaly FROM interval_records WHERE round_id = 'r2'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(interval, "shaker_start-to-shaker_s0");
        assert!(anomaly);
    }

    #[tokio::test]
    async fn test_redelivery_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let sink = SqliteSink::open("sqlite", temp_dir.path().join("rtm.db")).unwrap();
        let batch = vec![make_interval("r1", 3.0), make_interval("r2", 4.0)];

        sink.deliver(&batch).await.unwrap();
        sink.deliver(&batch).await.unwrap();
        assert_eq!(sink.interval_count().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_reopen_keeps_data_and_close_rejects() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("rtm.db");
        {
            let sink = SqliteSink::open("sqlite", &path).unwrap();
            sink.deliver(&[make_interval("r1", 3.0)]).await.unwrap();
            sink.close().await.unwrap();
            assert!(matches!(
                sink.deliver(&[make_interval("r2", 3.0)]).await,
                Err(SinkError::Closed)
            ));
        }
        let sink = SqliteSink::open("sqlite", &path).unwrap();
        assert_eq!(sink.interval_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_flush_prunes_expired_rows() {
        let temp_dir = TempDir::new().unwrap();
        let sink = SqliteSink::open("sqlite", temp_dir.path().join("rtm.db"))
            .unwrap()
            .with_retention(Some(30));

        let mut old = Interval::new(
            EntityKey::new(EntityClass::SicboShaker, "sicbo", "SBO-001", "old"),
            CheckpointKind::ShakerStart,
            CheckpointKind::ShakerS0,
            3.0,
            Timestamp::from_secs(1.0),
        );
        old.recorded_at = chrono::Utc::now() - chrono::Duration::days(40);
        let mut old_diag = Diagnostic::new(Severity::Warning, DiagnosticKind::SequenceGap, "old");
        old_diag.recorded_at = old.recorded_at;
        sink.deliver(&[
            Arc::new(SinkRecord::Interval(old)),
            Arc::new(SinkRecord::Diagnostic(old_diag)),
            make_interval("fresh", 4.0),
        ])
        .await
        .unwrap();
        assert_eq!(sink.interval_count().unwrap(), 2);

        sink.flush().await.unwrap();
        assert_eq!(sink.interval_count().unwrap(), 1);
        assert_eq!(sink.diagnostic_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_flush_without_retention_keeps_rows() {
        let temp_dir = TempDir::new().unwrap();
        let sink = SqliteSink::open("sqlite", temp_dir.path().join("rtm.db")).unwrap();
        let mut old = Interval::new(
            EntityKey::new(EntityClass::SicboShaker, "sicbo", "SBO-001", "old"),
            CheckpointKind::ShakerStart,
            CheckpointKind::ShakerS0,
            3.0,
            Timestamp::from_secs(1.0),
        );
        old.recorded_at = chrono::Utc::now() - chrono::Duration::days(400);
        sink.deliver(&[Arc::new(SinkRecord::Interval(old))]).await.unwrap();

        sink.flush().await.unwrap();
        assert_eq!(sink.interval_count().unwrap(), 1);
    }
}
