//! The `Backend` trait: the search/storage service records are indexed into.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BackendError;

/// Cluster identity returned by the startup health check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterInfo {
    pub cluster_name: String,
    /// Server version string, e.g. `"7.17.9"`.
    pub version: String,
}

/// A document store that accepts one JSON document per request.
///
/// Implementations must be safe to share across worker tasks as
/// `Arc<dyn Backend>`.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Health / identity check, called once before any batch is dispatched.
    async fn info(&self) -> Result<ClusterInfo, BackendError>;

    /// Index one serialized document into `index`.
    async fn index(&self, index: &str, document: String) -> Result<(), BackendError>;

    /// Identifier for logs (URL or name).
    fn endpoint(&self) -> &str;
}

type FailurePredicate = Box<dyn Fn(&Value) -> bool + Send + Sync>;

/// In-memory backend for tests and dry runs.
///
/// Documents are kept per index in arrival order.
pub struct MemoryBackend {
    docs: Mutex<HashMap<String, Vec<Value>>>,
    calls: AtomicUsize,
    available: bool,
    latency: Option<Duration>,
    fail_when: Option<FailurePredicate>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            docs: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            available: true,
            latency: None,
            fail_when: None,
        }
    }

    /// A backend whose health check always fails.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    /// Sleep for `latency` before answering each index request.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Reject (with a 500) every document for which `pred` returns `true`.
    pub fn fail_when<F>(mut self, pred: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.fail_when = Some(Box::new(pred));
        self
    }

    /// All documents stored in `index`.
    pub fn documents(&self, index: &str) -> Vec<Value> {
        self.docs
            .lock()
            .unwrap()
            .get(index)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of documents stored across all indices.
    pub fn document_count(&self) -> usize {
        self.docs.lock().unwrap().values().map(Vec::len).sum()
    }

    /// Number of `index` calls received, successful or not.
    pub fn index_calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn info(&self) -> Result<ClusterInfo, BackendError> {
        if !self.available {
            return Err(BackendError::Http("connection refused (memory backend)".into()));
        }
        Ok(ClusterInfo {
            cluster_name: "memory".into(),
            version: env!("CARGO_PKG_VERSION").into(),
        })
    }

    async fn index(&self, index: &str, document: String) -> Result<(), BackendError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let doc: Value = serde_json::from_str(&document)?;
        if self.fail_when.as_ref().is_some_and(|pred| pred(&doc)) {
            return Err(BackendError::Status {
                status: 500,
                body: "rejected by memory backend".into(),
            });
        }

        self.docs
            .lock()
            .unwrap()
            .entry(index.to_string())
            .or_default()
            .push(doc);
        Ok(())
    }

    fn endpoint(&self) -> &str {
        "memory"
    }
}
