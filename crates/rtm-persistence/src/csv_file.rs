//! CSV file sink.
//!
//! Writes one interval per row to `{dir}/{prefix}_{YYYY-MM-DD}.csv`, with a
//! header row whenever a new file is started. Files are opened in append
//! mode and rotate on UTC date change. Diagnostics have no CSV shape and are
//! skipped; route them to another sink.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use rtm_core::{BoxFuture, IntervalRecord, Sink, SinkError, SinkRecord, SinkResult};
use tracing::{debug, info, warn};

use crate::error::{PersistenceError, PersistenceResult};
use crate::retention::{prune_daily_files, RetentionPolicy};

const EXTENSION: &str = "csv";

struct ActiveCsv {
    writer: csv::Writer<File>,
    path: PathBuf,
    date: NaiveDate,
    rows_written: usize,
}

/// Append-only daily CSV writer for interval rows.
pub struct CsvWriter {
    base_dir: PathBuf,
    prefix: String,
    active: Option<ActiveCsv>,
    retention: Option<RetentionPolicy>,
}

impl CsvWriter {
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

    #[must_use]
    pub fn with_retention(mut self, days: Option<u32>) -> Self {
        self.retention = days.map(RetentionPolicy::new);
        self
    }

    /// Append the interval records of `records`; returns rows written.
    pub fn write_records(&mut self, records: &[Arc<SinkRecord>]) -> PersistenceResult<usize> {
        self.write_records_for_date(Utc::now().date_naive(), records)
    }

    pub(crate) fn write_records_for_date(
        &mut self,
        date: NaiveDate,
        records: &[Arc<SinkRecord>],
    ) -> PersistenceResult<usize> {
        let rows: Vec<IntervalRecord> = records
            .iter()
            .filter_map(|r| match r.as_ref() {
                SinkRecord::Interval(interval) => Some(IntervalRecord::from(interval)),
                SinkRecord::Diagnostic(_) => None,
            })
            .collect();
        if rows.is_empty() {
            return Ok(0);
        }

        if self.active.as_ref().is_some_and(|a| a.date != date) {
            self.close_active();
        }
        if self.active.is_none() {
            self.open(date)?;
        }
        let active = self.active.as_mut().ok_or(PersistenceError::Closed)?;

        for row in &rows {
            active.writer.serialize(row)?;
        }
        active.rows_written += rows.len();
        Ok(rows.len())
    }

    /// Flush buffered rows, then apply retention if it is due today.
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

    pub fn close(&mut self) -> PersistenceResult<()> {
        if let Some(active) = self.active.as_mut() {
            active.writer.flush()?;
        }
        self.close_active();
        Ok(())
    }

    pub fn current_path(&self) -> Option<&Path> {
        self.active.as_ref().map(|a| a.path.as_path())
    }

    pub(crate) fn prune_before(&mut self, cutoff: NaiveDate) -> PersistenceResult<usize> {
        if self.active.as_ref().is_some_and(|a| a.date < cutoff) {
            self.close_active();
        }
        prune_daily_files(&self.base_dir, &self.prefix, EXTENSION, cutoff)
    }

    fn open(&mut self, date: NaiveDate) -> PersistenceResult<()> {
        let path = self.base_dir.join(format!(
            "{}_{}.{}",
            self.prefix,
            date.format("%Y-%m-%d"),
            EXTENSION
        ));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let is_new = file.metadata()?.len() == 0;
        info!(path = %path.display(), header = is_new, "Opening CSV file (append mode)");

        let writer = csv::WriterBuilder::new()
            .has_headers(is_new)
            .from_writer(file);
        self.active = Some(ActiveCsv {
            writer,
            path,
            date,
            rows_written: 0,
        });
        Ok(())
    }

    fn close_active(&mut self) {
        if let Some(mut active) = self.active.take() {
            if let Err(e) = active.writer.flush() {
                warn!(?e, "Failed to flush CSV writer on close");
            }
            info!(date = %active.date, rows = active.rows_written, "Closed CSV file");
        }
    }
}

impl Drop for CsvWriter {
    fn drop(&mut self) {
        self.close_active();
    }
}

/// Sink writing intervals as CSV rows.
pub struct CsvSink {
    name: String,
    writer: Arc<Mutex<CsvWriter>>,
    closed: AtomicBool,
}

impl CsvSink {
    pub fn new(
        name: &str,
        base_dir: impl AsRef<Path>,
        prefix: &str,
        retention_days: Option<u32>,
    ) -> PersistenceResult<Self> {
        let writer = CsvWriter::new(base_dir, prefix)?.with_retention(retention_days);
        Ok(Self {
            name: name.to_string(),
            writer: Arc::new(Mutex::new(writer)),
            closed: AtomicBool::new(false),
        })
    }

    pub fn current_path(&self) -> Option<PathBuf> {
        self.writer.lock().current_path().map(Path::to_path_buf)
    }

    async fn with_writer<T, F>(&self, op: F) -> SinkResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut CsvWriter) -> PersistenceResult<T> + Send + 'static,
    {
        let writer = Arc::clone(&self.writer);
        let result = tokio::task::spawn_blocking(move || op(&mut *writer.lock()))
            .await
            .map_err(|e| SinkError::Backend(format!("CSV task failed: {e}")))?;
        Ok(result?)
    }
}

impl Sink for CsvSink {
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
            debug!(
                sink = %self.name,
                rows = written,
                skipped = records.len() - written,
                "Appended CSV rows"
            );
            Ok(())
        })
    }

    fn flush(&self) -> BoxFuture<'_, SinkResult<()>> {
        Box::pin(async move { self.with_writer(CsvWriter::flush).await })
    }

    fn close(&self) -> BoxFuture<'_, SinkResult<()>> {
        Box::pin(async move {
            self.closed.store(true, Ordering::Release);
            self.with_writer(CsvWriter::close).await
        })
    }
}
