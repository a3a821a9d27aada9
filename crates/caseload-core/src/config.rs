//! Pipeline configuration and fluent builder.
//!
//! # Example
//!
//! ```rust
//! use caseload_core::PipelineBuilder;
//!
//! let config = PipelineBuilder::new()
//!     .workers(5)
//!     .batch_size(50)
//!     .index("covid")
//!     .build_config();
//! assert_eq!(config.queue_capacity(), 5);
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::enrich::RegionOverride;
use crate::error::PipelineError;

/// Log level per component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Global default level: "trace" | "debug" | "info" | "warn" | "error"
    pub level: String,
    /// Per-component override: crate name → level
    pub components: HashMap<String, String>,
    /// Emit JSON structured logs instead of human-readable text
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            components: HashMap::new(),
            json: false,
        }
    }
}

impl LogConfig {
    /// `EnvFilter` directive string, e.g. `"info,caseload_core=debug"`.
    pub fn directives(&self) -> String {
        let mut components: Vec<_> = self.components.iter().collect();
        components.sort();

        let mut directives = self.level.clone();
        for (component, level) in components {
            directives.push_str(&format!(",{}={}", component.replace('-', "_"), level));
        }
        directives
    }
}

/// Configuration for one load-and-publish run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// JSON dataset to load.
    pub input: PathBuf,
    /// Keep at most this many records from the start of the dataset.
    pub limit: usize,
    /// Number of concurrent upload workers.
    pub workers: usize,
    /// Records per batch.
    pub batch_size: usize,
    /// Pending batches the dispatch queue may hold. `None` = one per worker.
    pub queue_capacity: Option<usize>,
    /// Backend base URL.
    pub endpoint: String,
    /// Target index name.
    pub index: String,
    /// Ask the backend to make each document searchable immediately.
    pub refresh: bool,
    /// Timeout for a single index request (milliseconds).
    pub request_timeout_ms: u64,
    /// Deadline for indexing one record, retries included (milliseconds).
    /// `None` = `request_timeout_ms`.
    pub record_deadline_ms: Option<u64>,
    /// Extra region reference table merged over the built-in one.
    pub regions_file: Option<PathBuf>,
    /// Regions whose code is fixed instead of looked up (`[[overrides]]`).
    pub overrides: Vec<RegionOverride>,
    pub log: LogConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("us.data"),
            limit: 3000,
            workers: 10,
            batch_size: 50,
            queue_capacity: None,
            endpoint: "http://localhost:9200".into(),
            index: "covid".into(),
            refresh: true,
            request_timeout_ms: 30_000,
            record_deadline_ms: None,
            regions_file: None,
            overrides: RegionOverride::defaults(),
            log: LogConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Parse a TOML document; missing keys take their defaults.
    pub fn from_toml(s: &str) -> Result<Self, PipelineError> {
        toml::from_str(s).map_err(|e| PipelineError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.workers == 0 {
            return Err(PipelineError::Config("workers must be at least 1".into()));
        }
        if self.batch_size == 0 {
            return Err(PipelineError::Config("batch_size must be at least 1".into()));
        }
        if self.index.trim().is_empty() {
            return Err(PipelineError::Config("index must not be empty".into()));
        }
        if self.request_timeout_ms == 0 {
            return Err(PipelineError::Config("request_timeout_ms must be positive".into()));
        }
        if self.record_deadline_ms.is_some_and(|ms| ms < self.request_timeout_ms) {
            return Err(PipelineError::Config(
                "record_deadline_ms must not be shorter than request_timeout_ms".into(),
            ));
        }
        Ok(())
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity.unwrap_or(self.workers).max(1)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// How long a worker waits on a single record before giving up on it.
    pub fn record_deadline(&self) -> Duration {
        Duration::from_millis(self.record_deadline_ms.unwrap_or(self.request_timeout_ms))
    }
}

/// Fluent builder for [`PipelineConfig`].
#[derive(Default)]
pub struct PipelineBuilder {
    config: PipelineConfig,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
        }
    }

    pub fn input(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.input = path.into();
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.config.limit = limit;
        self
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.config.workers = n;
        self
    }

    pub fn batch_size(mut self, n: usize) -> Self {
        self.config.batch_size = n;
        self
    }

    pub fn queue_capacity(mut self, n: usize) -> Self {
        self.config.queue_capacity = Some(n);
        self
    }

    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.endpoint = url.into();
        self
    }

    pub fn index(mut self, index: impl Into<String>) -> Self {
        self.config.index = index.into();
        self
    }

    pub fn refresh(mut self, refresh: bool) -> Self {
        self.config.refresh = refresh;
        self
    }

    pub fn request_timeout_ms(mut self, ms: u64) -> Self {
        self.config.request_timeout_ms = ms;
        self
    }

    pub fn record_deadline_ms(mut self, ms: u64) -> Self {
        self.config.record_deadline_ms = Some(ms);
        self
    }

    pub fn regions_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.regions_file = Some(path.into());
        self
    }

    pub fn overrides(mut self, overrides: Vec<RegionOverride>) -> Self {
        self.config.overrides = overrides;
        self
    }

    pub fn build_config(self) -> PipelineConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.workers, 10);
        assert_eq!(cfg.batch_size, 50);
        assert_eq!(cfg.limit, 3000);
        assert_eq!(cfg.index, "covid");
        assert_eq!(cfg.queue_capacity(), 10);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn toml_partial_override() {
        let cfg = PipelineConfig::from_toml(
            r#"
            workers = 4
            index = "cases"

            [log]
            level = "debug"
            json = true
            "#,
        )
        .unwrap();
        assert_eq!(cfg.workers, 4);
        assert_eq!(cfg.index, "cases");
        assert_eq!(cfg.batch_size, 50);
        assert!(cfg.log.json);
        assert_eq!(cfg.log.level, "debug");
    }

    #[test]
    fn toml_replaces_overrides() {
        let cfg = PipelineConfig::from_toml(
            r#"
            [[overrides]]
            region = "Wuhan Evacuee"
            code = ""
            "#,
        )
        .unwrap();
        assert_eq!(cfg.overrides, vec![RegionOverride::new("Wuhan Evacuee", "")]);
        assert_eq!(PipelineConfig::default().overrides.len(), 3);
    }

    #[test]
    fn toml_unknown_type_rejected() {
        assert!(matches!(
            PipelineConfig::from_toml("workers = \"many\""),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn validation() {
        assert!(PipelineBuilder::new().workers(0).build_config().validate().is_err());
        assert!(PipelineBuilder::new().batch_size(0).build_config().validate().is_err());
        assert!(PipelineBuilder::new().index(" ").build_config().validate().is_err());
    }

    #[test]
    fn record_deadline_defaults_to_request_timeout() {
        let cfg = PipelineBuilder::new().request_timeout_ms(200).build_config();
        assert_eq!(cfg.record_deadline(), Duration::from_millis(200));

        let cfg = PipelineBuilder::new()
            .request_timeout_ms(200)
            .record_deadline_ms(1_500)
            .build_config();
        assert_eq!(cfg.record_deadline(), Duration::from_millis(1_500));
        assert!(cfg.validate().is_ok());

        let cfg = PipelineBuilder::new()
            .request_timeout_ms(200)
            .record_deadline_ms(100)
            .build_config();
        assert!(matches!(cfg.validate(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn builder_custom() {
        let cfg = PipelineBuilder::new()
            .input("data/sample.json")
            .limit(100)
            .workers(3)
            .batch_size(7)
            .queue_capacity(0)
            .endpoint("http://es:9200")
            .refresh(false)
            .build_config();
        assert_eq!(cfg.input, PathBuf::from("data/sample.json"));
        assert_eq!(cfg.queue_capacity(), 1);
        assert_eq!(cfg.endpoint, "http://es:9200");
        assert!(!cfg.refresh);
    }

    #[test]
    fn log_directives_are_sorted() {
        let mut log = LogConfig::default();
        log.components.insert("caseload-http".into(), "trace".into());
        log.components.insert("caseload-core".into(), "debug".into());
        assert_eq!(log.directives(), "info,caseload_core=debug,caseload_http=trace");
    }
}
