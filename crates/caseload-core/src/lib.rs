//! caseload-core: enrichment and concurrent batch publishing of case records.
//!
//! # Architecture
//!
//! ```text
//! load_records → Enricher (RegionTable)
//!                   │
//!                   ▼
//!               Batcher ──► DispatchQueue ──► WorkerPool (N tasks) ──► Backend
//!                                                  │
//!                                                  ▼
//!                                          CompletionBarrier ──► PipelineReport
//! ```
//!
//! The barrier waits for as many [`BatchReport`]s as the [`Batcher`] actually
//! emitted, so the producer can never under- or over-count in-flight batches.

pub mod backend;
pub mod barrier;
pub mod batcher;
pub mod config;
pub mod enrich;
pub mod error;
pub mod loader;
pub mod pipeline;
pub mod pool;
pub mod queue;
pub mod region;
pub mod types;

pub use backend::{Backend, ClusterInfo, MemoryBackend};
pub use barrier::{completion_channel, CompletionBarrier, ReportSender};
pub use batcher::{expected_batches, Batcher};
pub use config::{LogConfig, PipelineBuilder, PipelineConfig};
pub use enrich::{Enricher, RegionOverride};
pub use error::{BackendError, EnrichError, PipelineError, RecordIndexError};
pub use loader::{load_records, parse_records};
pub use pipeline::{build_enricher, load_dataset, Pipeline, PipelineReport};
pub use pool::{process_batch, WorkerContext, WorkerPool};
pub use queue::{dispatch_queue, BatchReceiver, BatchSender};
pub use region::{RegionTable, StaticRegionTable};
pub use types::{Batch, BatchReport, Geo, NormalizedRecord, RawRecord};
