//! One-shot export of interval records to a JSON or CSV file.

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use chrono::{SecondsFormat, Utc};
use rtm_core::{Interval, IntervalRecord};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{PersistenceError, PersistenceResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    /// `csv` for a `.csv` path, JSON otherwise.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => Self::Csv,
            _ => Self::Json,
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => f.write_str("json"),
            Self::Csv => f.write_str("csv"),
        }
    }
}

impl FromStr for ExportFormat {
    type Err = PersistenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            other => Err(PersistenceError::Config(format!(
                "unsupported export format: {other}"
            ))),
        }
    }
}

#[derive(Debug, Serialize)]
struct ExportMetadata {
    exported: String,
    count: usize,
}

#[derive(Debug, Serialize)]
struct JsonExport<'a> {
    metadata: ExportMetadata,
    intervals: &'a [IntervalRecord],
}

/// Write `intervals` to `path`, replacing any existing file.
pub fn export_intervals(
    intervals: &[Interval],
    path: impl AsRef<Path>,
    format: ExportFormat,
) -> PersistenceResult<usize> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let rows: Vec<IntervalRecord> = intervals.iter().map(IntervalRecord::from).collect();

    match format {
        ExportFormat::Json => {
            let mut out = BufWriter::new(File::create(path)?);
            let export = JsonExport {
                metadata: ExportMetadata {
                    exported: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
                    count: rows.len(),
                },
                intervals: &rows,
            };
            serde_json::to_writer_pretty(&mut out, &export)?;
            out.flush()?;
        }
        ExportFormat::Csv => {
            let mut writer = csv::Writer::from_path(path)?;
            for row in &rows {
                writer.serialize(row)?;
            }
            writer.flush()?;
        }
    }

    info!(path = %path.display(), %format, count = rows.len(), "Exported intervals");
    Ok(rows.len())
}
