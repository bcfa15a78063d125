//! JSON Lines file sink.
//!
//! Uses JSON Lines format (.jsonl) for robustness:
//! - Each line is a complete JSON object
//! - Partial file corruption only affects individual lines
//! - Files are opened in append mode, so restarts never truncate data
//! - One file per UTC day (`{dir}/{prefix}_{YYYY-MM-DD}.jsonl`)
//! - With a retention period, files older than it are deleted on flush
//!
//! The sink runs all file I/O on the blocking thread pool.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use rtm_core::{BoxFuture, Sink, SinkError, SinkRecord, SinkResult};
use tracing::{debug, info, warn};

use crate::error::{PersistenceError, PersistenceResult};
use crate::retention::{prune_daily_files, RetentionPolicy};

const EXTENSION: &str = "jsonl";

/// Active writer state for the daily file.
struct ActiveFile {
    writer: BufWriter<File>,
    path: PathBuf,
    date: String,
    records_written: usize,
}

/// Append-only daily JSON Lines writer for sink records.
pub struct JsonLinesWriter {
    base_dir: PathBuf,
    prefix: String,
    active: Option<ActiveFile>,
    retention: Option<RetentionPolicy>,
}

impl JsonLinesWriter {
    /// Create a writer, creating `base_dir` if needed.
    pub fn new(base_dir: impl AsRef<Path>, prefix: &str) -> PersistenceResult<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self {
            base_dir,
            prefix: prefix.to_string(),
            active: None,
            retention: None,
        })
    }

    /// Delete daily files older than `days` days on flush.
    #[must_use]
    pub fn with_retention(mut self, days: Option<u32>) -> Self {
        self.retention = days.map(RetentionPolicy::new);
        self
    }

    /// Append records to today's file. Data reaches disk on `flush`.
    pub fn write_records(&mut self, records: &[Arc<SinkRecord>]) -> PersistenceResult<usize> {
        let today = Utc::now().format("%Y-%m-%d").to_string();
        self.write_records_for_date(&today, records)
    }

    pub(crate) fn write_records_for_date(
        &mut self,
        date: &str,
        records: &[Arc<SinkRecord>],
    ) -> PersistenceResult<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        let needs_rotation = self.active.as_ref().is_some_and(|a| a.date != date);
        if needs_rotation {
            self.close_active();
        }
        if self.active.is_none() {
            self.open(date)?;
        }
        let active = self.active.as_mut().ok_or(PersistenceError::Closed)?;

        for record in records {
            let json = serde_json::to_string(&record.to_persisted())?;
            writeln!(active.writer, "{}", json)?;
        }
        active.records_written += records.len();
        Ok(records.len())
    }

    /// Flush buffered lines, then apply retention if it is due today.
    pub fn flush(&mut self) -> PersistenceResult<()> {
        if let Some(active) = self.active.as_mut() {
            active.writer.flush()?;
        }
        let cutoff = self.retention.as_mut().and_then(RetentionPolicy::due_now);
        if let Some(cutoff) = cutoff {
            self.prune_before(cutoff)?;
        }
        Ok(())
    }

    /// Delete daily files dated before `cutoff`, closing the active file
    /// first if it is one of them.
    pub(crate) fn prune_before(&mut self, cutoff: NaiveDate) -> PersistenceResult<usize> {
        let active_expired = self
            .active
            .as_ref()
            .and_then(|a| NaiveDate::parse_from_str(&a.date, "%Y-%m-%d").ok())
            .is_some_and(|date| date < cutoff);
        if active_expired {
            self.close_active();
        }
        prune_daily_files(&self.base_dir, &self.prefix, EXTENSION, cutoff)
    }

    /// Flush and close the active file.
    pub fn close(&mut self) -> PersistenceResult<()> {
        self.flush()?;
        self.close_active();
        Ok(())
    }

    /// Path of the file currently open for writing.
    pub fn current_path(&self) -> Option<&Path> {
        self.active.as_ref().map(|a| a.path.as_path())
    }

    fn open(&mut self, date: &str) -> PersistenceResult<()> {
        let path = self
            .base_dir
            .join(format!("{}_{}.{}", self.prefix, date, EXTENSION));
        info!(path = %path.display(), "Opening JSON Lines file (append mode)");

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        self.active = Some(ActiveFile {
            writer: BufWriter::new(file),
            path,
            date: date.to_string(),
            records_written: 0,
        });
        Ok(())
    }

    fn close_active(&mut self) {
        if let Some(mut active) = self.active.take() {
            if let Err(e) = active.writer.flush() {
                warn!(?e, "Failed to flush writer on close");
            }
            info!(
                date = %active.date,
                records = active.records_written,
                "Closed JSON Lines file"
            );
        }
    }
}

impl Drop for JsonLinesWriter {
    fn drop(&mut self) {
        self.close_active();
    }
}

/// Sink writing every record as one JSON line.
pub struct JsonLinesSink {
    name: String,
    writer: Arc<Mutex<JsonLinesWriter>>,
    closed: AtomicBool,
}

impl JsonLinesSink {
    pub fn new(name: &str, base_dir: impl AsRef<Path>, prefix: &str) -> PersistenceResult<Self> {
        Ok(Self {
            name: name.to_string(),
            writer: Arc::new(Mutex::new(JsonLinesWriter::new(base_dir, prefix)?)),
            closed: AtomicBool::new(false),
        })
    }

    /// Keep only the last `days` days of files.
    #[must_use]
    pub fn with_retention(self, days: Option<u32>) -> Self {
        {
            let mut writer = self.writer.lock();
            writer.retention = days.map(RetentionPolicy::new);
        }
        self
    }

    pub fn current_path(&self) -> Option<PathBuf> {
        self.writer.lock().current_path().map(Path::to_path_buf)
    }

    async fn with_writer<T, F>(&self, op: F) -> SinkResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut JsonLinesWriter) -> PersistenceResult<T> + Send + 'static,
    {
        let writer = Arc::clone(&self.writer);
        let result = tokio::task::spawn_blocking(move || op(&mut writer.lock()))
            .await
            .map_err(|e| SinkError::Backend(format!("JSON Lines task failed: {e}")))?;
        Ok(result?)
    }
}

impl Sink for JsonLinesSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn deliver<'a>(&'a self, records: &'a [Arc<SinkRecord>]) -> BoxFuture<'a, SinkResult<()>> {
        Box::pin(async move {
            if self.closed.load(Ordering::Acquire) {
                return Err(SinkError::Closed);
            }
            let batch = records.to_vec();
            let written = self
                .with_writer(move |writer| writer.write_records(&batch))
                .await?;
            debug!(sink = %self.name, records = written, "Appended JSON lines");
            Ok(())
        })
    }

    fn flush(&self) -> BoxFuture<'_, SinkResult<()>> {
        Box::pin(async move { self.with_writer(JsonLinesWriter::flush).await })
    }

    fn close(&self) -> BoxFuture<'_, SinkResult<()>> {
        Box::pin(async move {
            self.closed.store(true, Ordering::Release);
            self.with_writer(JsonLinesWriter::close).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtm_core::{
        CheckpointKind, Diagnostic, DiagnosticKind, EntityClass, EntityKey, Interval,
        PersistedRecord, Severity, Timestamp,
    };
    use std::io::{BufRead, BufReader};
    use tempfile::TempDir;

    fn make_interval(round: usize) -> Arc<SinkRecord> {
        Arc::new(SinkRecord::Interval(
            Interval::new(
                EntityKey::new(EntityClass::TableApi, "baccarat", "BCR-01", format!("r{round}")),
                CheckpointKind::Start,
                CheckpointKind::BetStop,
                12.0,
                Timestamp::from_secs(12.0),
            )
            .annotated(false, None),
        ))
    }

    fn read_lines(path: &Path) -> Vec<String> {
        let file = File::open(path).unwrap();
        BufReader::new(file).lines().map_while(Result::ok).collect()
    }

    #[test]
    fn test_write_and_read() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = JsonLinesWriter::new(temp_dir.path(), "intervals").unwrap();

        let records: Vec<_> = (0..5).map(make_interval).collect();
        writer.write_records(&records).unwrap();
        writer
            .write_records(&[Arc::new(SinkRecord::Diagnostic(Diagnostic::new(
                Severity::Warning,
                DiagnosticKind::SequenceGap,
                "expected x3, got x4",
            )))])
            .unwrap();
        let path = writer.current_path().unwrap().to_path_buf();
        writer.close().unwrap();

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 6);

        let first: PersistedRecord = serde_json::from_str(&lines[0]).unwrap();
        match first {
            PersistedRecord::Interval(r) => {
                assert_eq!(r.round_id, "r0");
                assert_eq!(r.interval, "start-to-betstop");
            }
            PersistedRecord::Diagnostic(_) => panic!("expected interval"),
        }
        let last: serde_json::Value = serde_json::from_str(&lines[5]).unwrap();
        assert_eq!(last["record_type"], "diagnostic");
        assert_eq!(last["kind"], "sequence_gap");
    }

    #[test]
    fn test_append_mode() {
        let temp_dir = TempDir::new().unwrap();
        for _ in 0..2 {
            let mut writer = JsonLinesWriter::new(temp_dir.path(), "intervals").unwrap();
            let records: Vec<_> = (0..3).map(make_interval).collect();
            writer.write_records(&records).unwrap();
            writer.close().unwrap();
        }

        let entries: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(read_lines(&entries[0].path()).len(), 6);
    }

    #[test]
    fn test_rotates_on_date_change() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = JsonLinesWriter::new(temp_dir.path(), "rtm").unwrap();

        writer
            .write_records_for_date("2024-01-01", &[make_interval(1)])
            .unwrap();
        writer
            .write_records_for_date("2024-01-02", &[make_interval(2), make_interval(3)])
            .unwrap();
        writer.close().unwrap();

        assert_eq!(read_lines(&temp_dir.path().join("rtm_2024-01-01.jsonl")).len(), 1);
        assert_eq!(read_lines(&temp_dir.path().join("rtm_2024-01-02.jsonl")).len(), 2);
    }

    #[test]
    fn test_empty_write_creates_no_file() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = JsonLinesWriter::new(temp_dir.path(), "intervals").unwrap();
        writer.write_records(&[]).unwrap();
        writer.flush().unwrap();

        let entries = std::fs::read_dir(temp_dir.path()).unwrap().count();
        assert_eq!(entries, 0);
    }

    #[test]
    fn test_prune_closes_expired_active_file() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = JsonLinesWriter::new(temp_dir.path(), "rtm")
            .unwrap()
            .with_retention(Some(2));
        writer
            .write_records_for_date("2024-01-01", &[make_interval(1)])
            .unwrap();
        std::fs::write(temp_dir.path().join("rtm_2024-01-02.jsonl"), "").unwrap();

        let cutoff = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert_eq!(writer.prune_before(cutoff).unwrap(), 1);
        assert!(writer.current_path().is_none());
        assert!(!temp_dir.path().join("rtm_2024-01-01.jsonl").exists());
        assert!(temp_dir.path().join("rtm_2024-01-02.jsonl").exists());
    }

    #[tokio::test]
    async fn test_sink_flush_applies_retention() {
        let temp_dir = TempDir::new().unwrap();
        let expired = temp_dir.path().join("intervals_2020-01-01.jsonl");
        std::fs::write(&expired, "{}\n").unwrap();

        let sink = JsonLinesSink::new("jsonl", temp_dir.path(), "intervals")
            .unwrap()
            .with_retention(Some(30));
        sink.deliver(&[make_interval(1)]).await.unwrap();
        sink.flush().await.unwrap();

        assert!(!expired.exists());
        let path = sink.current_path().unwrap();
        assert_eq!(read_lines(&path).len(), 1);
    }

    #[tokio::test]
    async fn test_sink_rejects_after_close() {
        let temp_dir = TempDir::new().unwrap();
        let sink = JsonLinesSink::new("jsonl", temp_dir.path(), "intervals").unwrap();

        sink.deliver(&[make_interval(1)]).await.unwrap();
        sink.flush().await.unwrap();
        let path = sink.current_path().unwrap();
        assert_eq!(read_lines(&path).len(), 1);

        sink.close().await.unwrap();
        let result = sink.deliver(&[make_interval(2)]).await;
        assert!(matches!(result, Err(SinkError::Closed)));
    }
}
