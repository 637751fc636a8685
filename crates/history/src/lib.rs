//! Recommendation history sinks.
//!
//! Provides the `HistoryLogger` trait and its implementations. Each
//! recommendation appends at most one record: the top-ranked material and
//! the request that produced it. A failing sink never fails the
//! recommendation; `record_top` reports the outcome instead.

use std::future::Future;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use packwise_model::{RawRequest, RecommendationResult, ScoredCandidate};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Errors from history sink operations.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("Write failed: {0}")]
    Io(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Collector rejected record: {0}")]
    Rejected(String),

    #[error("Serialization failed: {0}")]
    Serialize(String),

    #[error("History sink not available")]
    Unavailable,
}

/// Snapshot of one recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Category as submitted
    pub category: String,

    /// Sub-category as submitted
    pub sub_category: String,

    /// Product weight in kilograms
    pub weight: f64,

    /// Top-ranked material
    pub recommended_material: String,

    pub predicted_cost: f64,

    pub predicted_co2: f64,

    pub recorded_at: DateTime<Utc>,
}

impl HistoryRecord {
    pub fn new(raw: &RawRequest, weight: f64, top: &ScoredCandidate) -> Self {
        Self {
            category: raw.category.clone(),
            sub_category: raw.sub_category.clone(),
            weight,
            recommended_material: top.material.material_name.clone(),
            predicted_cost: top.predicted_cost,
            predicted_co2: top.predicted_co2,
            recorded_at: Utc::now(),
        }
    }
}

/// Trait for history sinks (file, HTTP collector, etc.)
pub trait HistoryLogger {
    /// Append one record.
    fn record(&self, record: &HistoryRecord) -> impl Future<Output = Result<(), HistoryError>> + Send;

    /// Check if the sink is usable.
    fn health_check(&self) -> impl Future<Output = Result<(), HistoryError>> + Send;

    /// Get the sink name for logging.
    fn name(&self) -> &'static str;

    /// Whether records sent here are persisted at all.
    fn is_enabled(&self) -> bool {
        true
    }
}

/// What happened to the history of one recommendation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Recorded,
    /// Nothing was recommended or the sink is disabled, so nothing was recorded
    Skipped,
    Failed(String),
}

/// Record the top candidate of `result`, isolating any sink failure.
pub async fn record_top<L: HistoryLogger>(
    logger: &L,
    raw: &RawRequest,
    result: &RecommendationResult,
) -> RecordOutcome {
    if !logger.is_enabled() {
        return RecordOutcome::Skipped;
    }
    let Some(top) = result.top() else {
        return RecordOutcome::Skipped;
    };

    let record = HistoryRecord::new(raw, result.request.weight, top);
    match logger.record(&record).await {
        Ok(()) => {
            tracing::debug!(sink = logger.name(), material = %record.recommended_material, "Recorded recommendation");
            RecordOutcome::Recorded
        }
        Err(e) => {
            tracing::warn!(sink = logger.name(), error = %e, "Failed to record recommendation");
            RecordOutcome::Failed(e.to_string())
        }
    }
}

/// Appends records as JSON lines to a local file.
pub struct JsonlHistoryLogger {
    path: PathBuf,
    // serializes appends from concurrent requests
    write_lock: Mutex<()>,
}

impl JsonlHistoryLogger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl HistoryLogger for JsonlHistoryLogger {
    async fn record(&self, record: &HistoryRecord) -> Result<(), HistoryError> {
        let mut line =
            serde_json::to_string(record).map_err(|e| HistoryError::Serialize(e.to_string()))?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| HistoryError::Io(e.to_string()))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| HistoryError::Io(e.to_string()))?;
        file.flush().await.map_err(|e| HistoryError::Io(e.to_string()))
    }

    async fn health_check(&self) -> Result<(), HistoryError> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        match tokio::fs::metadata(&parent).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            _ => Err(HistoryError::Unavailable),
        }
    }

    fn name(&self) -> &'static str {
        "jsonl"
    }
}

/// HTTP collector configuration.
#[derive(Debug, Clone)]
pub struct HttpHistoryConfig {
    /// Base URL of the collector
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for HttpHistoryConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8087".to_string(),
            timeout_secs: 5,
        }
    }
}

/// Posts records to an HTTP collector.
pub struct HttpHistoryLogger {
    config: HttpHistoryConfig,
    client: reqwest::Client,
}

impl HttpHistoryLogger {
    pub fn new(config: HttpHistoryConfig) -> Result<Self, HistoryError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| HistoryError::Connection(e.to_string()))?;

        Ok(Self { config, client })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }
}

impl HistoryLogger for HttpHistoryLogger {
    async fn record(&self, record: &HistoryRecord) -> Result<(), HistoryError> {
        let url = self.endpoint("history");
        tracing::debug!(url = %url, "Posting history record");

        let response = self
            .client
            .post(url)
            .json(record)
            .send()
            .await
            .map_err(|e| HistoryError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(HistoryError::Rejected(format!("HTTP {}: {}", status, body)));
        }

        Ok(())
    }

    async fn health_check(&self) -> Result<(), HistoryError> {
        let response = self
            .client
            .get(self.endpoint("health"))
            .send()
            .await
            .map_err(|e| HistoryError::Connection(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(HistoryError::Unavailable)
        }
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// The sink selected at startup.
pub enum HistorySink {
    Disabled,
    File(JsonlHistoryLogger),
    Http(HttpHistoryLogger),
}

impl HistoryLogger for HistorySink {
    async fn record(&self, record: &HistoryRecord) -> Result<(), HistoryError> {
        match self {
            Self::Disabled => Ok(()),
            Self::File(logger) => logger.record(record).await,
            Self::Http(logger) => logger.record(record).await,
        }
    }

    async fn health_check(&self) -> Result<(), HistoryError> {
        match self {
            Self::Disabled => Ok(()),
            Self::File(logger) => logger.health_check().await,
            Self::Http(logger) => logger.health_check().await,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::File(logger) => logger.name(),
            Self::Http(logger) => logger.name(),
        }
    }

    fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use packwise_model::{
        CatalogScope, CategoryEncoding, EcoPreference, Encoded, MaterialCandidate, RequestInput,
    };

    struct FailingLogger;

    impl HistoryLogger for FailingLogger {
        async fn record(&self, _record: &HistoryRecord) -> Result<(), HistoryError> {
            Err(HistoryError::Io("disk full".to_string()))
        }

        async fn health_check(&self) -> Result<(), HistoryError> {
            Err(HistoryError::Unavailable)
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    fn raw() -> RawRequest {
        RawRequest::new(" electronics", "cables ", "0.5")
    }

    fn result(materials: &[&str]) -> RecommendationResult {
        RecommendationResult {
            request: RequestInput {
                category: "Electronics".to_string(),
                sub_category: "Cables".to_string(),
                weight: 0.5,
                is_fragile: false,
                eco_preference: EcoPreference::Both,
            },
            encoding: CategoryEncoding {
                category: Encoded::exact(1),
                sub_category: Encoded::exact(0),
            },
            scope: CatalogScope::Category("Electronics".to_string()),
            candidates: materials
                .iter()
                .enumerate()
                .map(|(i, name)| ScoredCandidate {
                    material: MaterialCandidate {
                        material_name: name.to_string(),
                        material_code: i as i64,
                        strength_code: 3,
                        strength_label: "Medium".to_string(),
                        mean_biodegradability_score: 0.7,
                        mean_recyclability_pct: 80.0,
                    },
                    predicted_cost: 10.0 + i as f64,
                    predicted_co2: 1.0,
                    env_score: 3.7 + i as f64,
                    is_biodegradable: true,
                    fragility_penalty: 0.0,
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_jsonl_appends_top_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let logger = JsonlHistoryLogger::new(dir.path().join("history.jsonl"));

        assert_eq!(
            record_top(&logger, &raw(), &result(&["Cardboard", "Paper"])).await,
            RecordOutcome::Recorded
        );
        assert_eq!(
            record_top(&logger, &raw(), &result(&["Jute"])).await,
            RecordOutcome::Recorded
        );

        let contents = std::fs::read_to_string(logger.path()).unwrap();
        let records: Vec<HistoryRecord> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].recommended_material, "Cardboard");
        assert_eq!(records[0].category, " electronics");
        assert_eq!(records[0].weight, 0.5);
        assert_eq!(records[0].predicted_cost, 10.0);
        assert_eq!(records[1].recommended_material, "Jute");
    }

    #[tokio::test]
    async fn test_empty_result_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let logger = JsonlHistoryLogger::new(dir.path().join("history.jsonl"));

        assert_eq!(record_top(&logger, &raw(), &result(&[])).await, RecordOutcome::Skipped);
        assert!(!logger.path().exists());
    }

    #[tokio::test]
    async fn test_failure_is_reported_not_propagated() {
        let outcome = record_top(&FailingLogger, &raw(), &result(&["Cardboard"])).await;
        assert_eq!(outcome, RecordOutcome::Failed("Write failed: disk full".to_string()));
    }

    #[tokio::test]
    async fn test_jsonl_health_check() {
        let dir = tempfile::tempdir().unwrap();
        assert!(JsonlHistoryLogger::new(dir.path().join("h.jsonl")).health_check().await.is_ok());
        assert!(JsonlHistoryLogger::new(dir.path().join("missing/h.jsonl"))
            .health_check()
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_disabled_sink_skips_recording() {
        let sink = HistorySink::Disabled;
        assert!(!sink.is_enabled());
        assert_eq!(record_top(&sink, &raw(), &result(&["Cardboard"])).await, RecordOutcome::Skipped);
        assert_eq!(sink.name(), "disabled");
    }

    #[tokio::test]
    async fn test_file_sink_is_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let sink = HistorySink::File(JsonlHistoryLogger::new(dir.path().join("h.jsonl")));
        assert!(sink.is_enabled());
        assert_eq!(record_top(&sink, &raw(), &result(&["Cardboard"])).await, RecordOutcome::Recorded);
    }

    #[test]
    fn test_http_endpoint() {
        let logger = HttpHistoryLogger::new(HttpHistoryConfig {
            base_url: "http://collector:9000/".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(logger.endpoint("history"), "http://collector:9000/history");
        assert_eq!(logger.endpoint("health"), "http://collector:9000/health");
    }

    #[tokio::test]
    async fn test_http_unreachable_collector_fails_softly() {
        let logger = HttpHistoryLogger::new(HttpHistoryConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            timeout_secs: 2,
        })
        .unwrap();
        let outcome = record_top(&logger, &raw(), &result(&["Cardboard"])).await;
        assert!(matches!(outcome, RecordOutcome::Failed(_)));
    }
}
