//! Prometheus Pushgateway sink.
//!
//! `deliver` updates the per-table interval metrics in the process registry.
//! `flush` pushes the whole registry to `{url}/metrics/job/{job}`. Without a
//! URL the sink only feeds the in-process registry.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use rtm_core::{BoxFuture, Sink, SinkRecord, SinkResult};
use rtm_telemetry::Metrics;
use tracing::debug;

use crate::error::{PersistenceError, PersistenceResult};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct PushgatewaySink {
    name: String,
    push_url: Option<String>,
    client: Client,
    /// Intervals recorded since the last successful push.
    pending: AtomicUsize,
}

impl PushgatewaySink {
    pub fn new(name: &str, url: Option<&str>, job_name: &str) -> PersistenceResult<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| PersistenceError::Http(format!("Failed to create HTTP client: {e}")))?;

        let push_url = url
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(|u| format!("{}/metrics/job/{}", u.trim_end_matches('/'), job_name));

        Ok(Self {
            name: name.to_string(),
            push_url,
            client,
            pending: AtomicUsize::new(0),
        })
    }

    pub fn push_url(&self) -> Option<&str> {
        self.push_url.as_deref()
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Relaxed)
    }

    async fn push(&self, url: &str) -> PersistenceResult<()> {
        let rendered = Metrics::render().map_err(|e| PersistenceError::Metrics(e.to_string()))?;

        let response = self
            .client
            .put(url)
            .header(reqwest::header::CONTENT_TYPE, rendered.content_type)
            .body(rendered.body)
            .send()
            .await
            .map_err(|e| PersistenceError::Http(format!("Pushgateway push failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PersistenceError::Http(format!(
                "Pushgateway HTTP {status}: {body}"
            )));
        }
        Ok(())
    }
}

impl Sink for PushgatewaySink {
    fn name(&self) -> &str {
        &self.name
    }

    fn deliver<'a>(&'a self, records: &'a [Arc<SinkRecord>]) -> BoxFuture<'a, SinkResult<()>> {
        Box::pin(async move {
            let mut recorded = 0;
            for record in records {
                if let SinkRecord::Interval(interval) = record.as_ref() {
                    Metrics::table_interval(
                        &interval.entity_key.game_type,
                        &interval.entity_key.entity_id,
                        &interval.label(),
                        interval.duration,
                        interval.is_anomalous(),
                    );
                    recorded += 1;
                }
            }
            self.pending.fetch_add(recorded, Ordering::Relaxed);
            Ok(())
        })
    }

    fn flush(&self) -> BoxFuture<'_, SinkResult<()>> {
        Box::pin(async move {
            let Some(url) = self.push_url.as_deref() else {
                self.pending.store(0, Ordering::Relaxed);
                return Ok(());
            };
            let pending = self.pending.load(Ordering::Relaxed);
            if pending == 0 {
                return Ok(());
            }
            self.push(url).await?;
            self.pending.fetch_sub(pending, Ordering::Relaxed);
            debug!(sink = %self.name, intervals = pending, "Pushed metrics to Pushgateway");
            Ok(())
        })
    }

    fn close(&self) -> BoxFuture<'_, SinkResult<()>> {
        self.flush()
    }
}
