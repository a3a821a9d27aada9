//! caseload-http: `Backend` implementation for Elasticsearch-compatible
//! document APIs.
//!
//! ```rust,no_run
//! use caseload_http::HttpBackend;
//!
//! let backend = HttpBackend::default_for("http://localhost:9200").unwrap();
//! ```

pub mod client;
pub mod retry;

pub use client::{HttpBackend, HttpBackendConfig};
pub use retry::{RetryConfig, RetryPolicy};
