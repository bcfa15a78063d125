//! Age-based retention for sinks that keep data on local disk.
//!
//! Retention runs from `flush`, at most once per UTC day. Daily-file sinks
//! delete `{prefix}_{YYYY-MM-DD}.{ext}` files older than the cutoff; the
//! SQLite sink deletes rows by their `datetime` column.

use std::path::Path;

use chrono::{Days, NaiveDate, Utc};
use tracing::{debug, info, warn};

use crate::error::PersistenceResult;

/// Keeps the last `days` days of data, today included.
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    days: u32,
    last_run: Option<NaiveDate>,
}

impl RetentionPolicy {
    pub fn new(days: u32) -> Self {
        Self {
            days: days.max(1),
            last_run: None,
        }
    }

    pub fn days(&self) -> u32 {
        self.days
    }

    /// Oldest date still kept when today is `today`.
    pub fn cutoff(&self, today: NaiveDate) -> NaiveDate {
        today
            .checked_sub_days(Days::new(u64::from(self.days - 1)))
            .unwrap_or(NaiveDate::MIN)
    }

    /// Cutoff to apply if retention has not run yet on `today`.
    pub fn due(&mut self, today: NaiveDate) -> Option<NaiveDate> {
        if self.last_run == Some(today) {
            return None;
        }
        self.last_run = Some(today);
        Some(self.cutoff(today))
    }

    /// Cutoff to apply now, if due.
    pub fn due_now(&mut self) -> Option<NaiveDate> {
        self.due(Utc::now().date_naive())
    }
}

/// Delete daily files in `dir` dated before `cutoff`.
///
/// Only names of the form `{prefix}_{YYYY-MM-DD}.{extension}` are touched.
pub fn prune_daily_files(
    dir: &Path,
    prefix: &str,
    extension: &str,
    cutoff: NaiveDate,
) -> PersistenceResult<usize> {
    let mut removed = 0;
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(date) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| file_date(n, prefix, extension))
        else {
            continue;
        };
        if date >= cutoff {
            continue;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "Removed expired file");
                removed += 1;
            }
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove expired file"),
        }
    }
    if removed > 0 {
        info!(dir = %dir.display(), removed, %cutoff, "Pruned expired daily files");
    }
    Ok(removed)
}

fn file_date(name: &str, prefix: &str, extension: &str) -> Option<NaiveDate> {
    let date = name
        .strip_prefix(prefix)?
        .strip_prefix('_')?
        .strip_suffix(extension)?
        .strip_suffix('.')?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}
