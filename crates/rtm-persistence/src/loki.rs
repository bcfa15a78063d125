//! Grafana Loki push sink.
//!
//! Records are grouped into streams by label set and pushed as one
//! `{"streams": [...]}` request per batch to `{url}/loki/api/v1/push`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use rtm_core::{BoxFuture, Sink, SinkRecord, SinkResult};
use serde::Serialize;
use tracing::debug;

use crate::error::{PersistenceError, PersistenceResult};

const JOB_LABEL: &str = "studio-roundtime-monitor";
const SERVICE_LABEL: &str = "time_monitor";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Push request body.
#[derive(Debug, Serialize)]
pub struct LokiPush {
    pub streams: Vec<LokiStream>,
}

#[derive(Debug, Serialize)]
pub struct LokiStream {
    pub stream: BTreeMap<String, String>,
    /// `[timestamp_ns, line]` pairs.
    pub values: Vec<[String; 2]>,
}

#[derive(Debug, Clone)]
enum LokiAuth {
    None,
    Basic { username: String, password: String },
    Bearer(String),
}

/// Connection settings for [`LokiSink`].
#[derive(Debug, Clone, Default)]
pub struct LokiOptions {
    pub url: String,
    pub instance_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub token: Option<String>,
}

pub struct LokiSink {
    name: String,
    push_url: String,
    instance_id: String,
    auth: LokiAuth,
    client: Client,
}

impl LokiSink {
    pub fn new(name: &str, options: LokiOptions) -> PersistenceResult<Self> {
        if options.url.trim().is_empty() {
            return Err(PersistenceError::Config("loki sink requires a url".to_string()));
        }
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| PersistenceError::Http(format!("Failed to create HTTP client: {e}")))?;

        let auth = match (options.token, options.username) {
            (Some(token), _) => LokiAuth::Bearer(token),
            (None, Some(username)) => LokiAuth::Basic {
                username,
                password: options.password.unwrap_or_default(),
            },
            (None, None) => LokiAuth::None,
        };

        Ok(Self {
            name: name.to_string(),
            push_url: format!("{}/loki/api/v1/push", options.url.trim_end_matches('/')),
            instance_id: options.instance_id,
            auth,
            client,
        })
    }

    pub fn push_url(&self) -> &str {
        &self.push_url
    }

    async fn push(&self, body: &LokiPush) -> PersistenceResult<()> {
        let mut request = self.client.post(&self.push_url).json(body);
        request = match &self.auth {
            LokiAuth::None => request,
            LokiAuth::Basic { username, password } => request.basic_auth(username, Some(password)),
            LokiAuth::Bearer(token) => request.bearer_auth(token),
        };

        let response = request
            .send()
            .await
            .map_err(|e| PersistenceError::Http(format!("Loki push failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PersistenceError::Http(format!("Loki HTTP {status}: {body}")));
        }
        Ok(())
    }
}

/// Group records into Loki streams.
pub fn build_push(records: &[Arc<SinkRecord>], instance_id: &str) -> LokiPush {
    let mut streams: BTreeMap<BTreeMap<String, String>, Vec<[String; 2]>> = BTreeMap::new();

    for record in records {
        let mut labels = BTreeMap::new();
        labels.insert("job".to_string(), JOB_LABEL.to_string());
        labels.insert("instance".to_string(), instance_id.to_string());
        labels.insert("service".to_string(), SERVICE_LABEL.to_string());

        let (at, line) = match record.as_ref() {
            SinkRecord::Interval(interval) => {
                let key = &interval.entity_key;
                let label = interval.label();
                let level = if interval.is_anomalous() { "WARNING" } else { "INFO" };
                labels.insert("level".to_string(), level.to_string());
                labels.insert("record_type".to_string(), "interval".to_string());
                labels.insert("game_type".to_string(), key.game_type.clone());
                labels.insert("table".to_string(), key.entity_id.clone());
                labels.insert("interval_type".to_string(), label.clone());

                let line = format!(
                    "Time interval: {} = {:.3}s for {} table {} round {} {}",
                    label,
                    interval.duration,
                    key.game_type,
                    key.entity_id,
                    key.round_id,
                    record.to_json_value()
                );
                (interval.recorded_at, line)
            }
            SinkRecord::Diagnostic(diagnostic) => {
                labels.insert(
                    "level".to_string(),
                    diagnostic.severity.as_str().to_ascii_uppercase(),
                );
                labels.insert("record_type".to_string(), "diagnostic".to_string());
                labels.insert("kind".to_string(), diagnostic.kind.to_string());

                let line = format!("{} {}", diagnostic.message, record.to_json_value());
                (diagnostic.recorded_at, line)
            }
        };

        streams
            .entry(labels)
            .or_default()
            .push([timestamp_ns(at), line]);
    }

    LokiPush {
        streams: streams
            .into_iter()
            .map(|(stream, values)| LokiStream { stream, values })
            .collect(),
    }
}

fn timestamp_ns(at: DateTime<Utc>) -> String {
    at.timestamp_nanos_opt()
        .unwrap_or_else(|| at.timestamp_millis().saturating_mul(1_000_000))
        .to_string()
}

impl Sink for LokiSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn deliver<'a>(&'a self, records: &'a [Arc<SinkRecord>]) -> BoxFuture<'a, SinkResult<()>> {
        Box::pin(async move {
            if records.is_empty() {
                return Ok(());
            }
            let body = build_push(records, &self.instance_id);
            self.push(&body).await?;
            debug!(
                sink = %self.name,
                records = records.len(),
                streams = body.streams.len(),
                "Pushed batch to Loki"
            );
            Ok(())
        })
    }

    fn flush(&self) -> BoxFuture<'_, SinkResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn close(&self) -> BoxFuture<'_, SinkResult<()>> {
        Box::pin(async { Ok(()) })
    }
}
