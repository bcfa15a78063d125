//! JSON Lines checkpoint replay.
//!
//! One checkpoint per line:
//!
//! ```json
//! {"entity_class":"tableapi","game_type":"baccarat","table":"BA-01","round_id":"r1","kind":"betstop","timestamp":1718000012.0}
//! ```
//!
//! `payload` is optional. Lines that do not parse are skipped with a warning.
//!
//! Replay is a batch ingest: after every batch it waits for the pipeline to
//! settle, so a file longer than the bus queues is not thinned out by
//! drop-oldest.

use std::path::Path;

use rtm_bus::PublishOutcome;
use rtm_core::{EntityClass, EntityKey, Payload, Timestamp};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};
use crate::pipeline::Pipeline;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayRecord {
    pub entity_class: String,
    pub game_type: String,
    pub table: String,
    pub round_id: String,
    pub kind: String,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
    #[serde(default)]
    pub payload: Payload,
}

impl ReplayRecord {
    fn entity_key(&self) -> AppResult<EntityKey> {
        let class: EntityClass = self
            .entity_class
            .parse()
            .map_err(|e| AppError::Replay(format!("{e}")))?;
        Ok(EntityKey::new(
            class,
            self.game_type.as_str(),
            self.table.as_str(),
            self.round_id.as_str(),
        ))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplaySummary {
    /// Non-blank lines read.
    pub lines: u64,
    /// Accepted by the pipeline bus.
    pub published: u64,
    /// Lines that could not be turned into a checkpoint.
    pub skipped: u64,
    /// Parsed but refused by the pipeline (not accepting).
    pub rejected: u64,
    /// Queued events dropped by the bus to make room for replayed ones.
    pub displaced: u64,
}

/// Checkpoints published between two settles: a quarter of the bus queue, so
/// the events one batch fans out into fit downstream queues.
fn batch_size(pipeline: &Pipeline) -> usize {
    (pipeline.config().bus.subscriber_queue_depth / 4).max(1)
}

/// Replay every checkpoint in `path` into `pipeline`.
pub async fn replay_file(pipeline: &Pipeline, path: impl AsRef<Path>) -> AppResult<ReplaySummary> {
    let path = path.as_ref();
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| AppError::Replay(format!("Failed to open {}: {e}", path.display())))?;

    info!(path = %path.display(), "Replaying checkpoints");
    replay_reader(pipeline, BufReader::new(file)).await
}

pub async fn replay_reader<R>(pipeline: &Pipeline, reader: R) -> AppResult<ReplaySummary>
where
    R: AsyncBufRead + Unpin,
{
    let mut summary = ReplaySummary::default();
    let batch = batch_size(pipeline);
    let settle_timeout = pipeline.config().shutdown_drain_timeout;
    let mut in_batch = 0;
    let mut line_no: u64 = 0;
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        summary.lines += 1;

        let record: ReplayRecord = match serde_json::from_str(line) {
            Ok(record) => record,
            Err(e) => {
                warn!(line = line_no, error = %e, "Skipping unparseable replay line");
                summary.skipped += 1;
                continue;
            }
        };
        let entity_key = match record.entity_key() {
            Ok(key) => key,
            Err(e) => {
                warn!(line = line_no, error = %e, "Skipping replay line");
                summary.skipped += 1;
                continue;
            }
        };

        let outcome = pipeline.publish_raw_checkpoint(
            entity_key,
            &record.kind,
            Timestamp::from_secs(record.timestamp),
            record.payload,
        );
        match outcome {
            PublishOutcome::Delivered { displaced, .. } => {
                summary.published += 1;
                summary.displaced += displaced as u64;
            }
            PublishOutcome::NoSubscribers => summary.published += 1,
            PublishOutcome::Closed => {
                summary.rejected += 1;
                continue;
            }
        }

        in_batch += 1;
        if in_batch >= batch {
            in_batch = 0;
            if !pipeline.settle(settle_timeout).await {
                debug!(line = line_no, "Pipeline still busy after replay batch");
            }
        }
    }

    if summary.displaced > 0 {
        warn!(displaced = summary.displaced, "Replay displaced queued events");
    }
    info!(
        lines = summary.lines,
        published = summary.published,
        skipped = summary.skipped,
        rejected = summary.rejected,
        displaced = summary.displaced,
        "Replay finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineConfig;
    use rtm_bus::BusConfig;
    use std::io::Cursor;

    #[test]
    fn test_record_entity_key() {
        let record: ReplayRecord = serde_json::from_str(
            r#"{"entity_class":"roulette","game_type":"roulette","table":"RO-02","round_id":"42","kind":"*X;3","timestamp":12.5}"#,
        )
        .unwrap();
        assert!(record.payload.is_empty());
        let key = record.entity_key().unwrap();
        assert_eq!(key.class, EntityClass::Roulette);
        assert_eq!(key.entity_id, "RO-02");
    }

    #[test]
    fn test_unknown_class_is_error() {
        let record = ReplayRecord {
            entity_class: "blackjack".to_string(),
            game_type: "blackjack".to_string(),
            table: "BJ-01".to_string(),
            round_id: "1".to_string(),
            kind: "start".to_string(),
            timestamp: 0.0,
            payload: Payload::new(),
        };
        assert!(matches!(record.entity_key(), Err(AppError::Replay(_))));
    }

    #[test]
    fn test_batch_size_follows_queue_depth() {
        let pipeline = |depth| {
            Pipeline::new(
                PipelineConfig {
                    bus: BusConfig {
                        subscriber_queue_depth: depth,
                    },
                    summary_interval: None,
                    ..Default::default()
                },
                Vec::new(),
            )
            .unwrap()
        };
        assert_eq!(batch_size(&pipeline(64)), 16);
        assert_eq!(batch_size(&pipeline(2)), 1);
    }

    #[tokio::test]
    async fn test_replay_into_stopped_pipeline_counts_rejections() {
        let pipeline = Pipeline::new(
            PipelineConfig {
                summary_interval: None,
                ..Default::default()
            },
            Vec::new(),
        )
        .unwrap();

        let input = concat!(
            r#"{"entity_class":"tableapi","game_type":"baccarat","table":"BA-01","round_id":"r1","kind":"start","timestamp":0.0}"#,
            "\n\n",
            "not json\n",
            r#"{"entity_class":"tableapi","game_type":"baccarat","table":"BA-01","round_id":"r1","kind":"betstop","timestamp":12.0}"#,
            "\n",
        );
        let summary = replay_reader(&pipeline, Cursor::new(input)).await.unwrap();
        assert_eq!(
            summary,
            ReplaySummary {
                lines: 3,
                published: 0,
                skipped: 1,
                rejected: 2,
                displaced: 0,
            }
        );
    }
}
