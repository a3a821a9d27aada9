//! Dataset loading.
//!
//! The whole file is parsed and enriched before anything is returned; one bad
//! record aborts the load so a partial dataset is never published.

use std::path::Path;

use serde_json::Value;
use tracing::{debug, info};

use crate::enrich::Enricher;
use crate::error::PipelineError;
use crate::types::{NormalizedRecord, RawRecord};

/// Read `path`, enrich every record, and keep the first `limit`.
pub fn load_records(
    path: &Path,
    limit: usize,
    enricher: &Enricher,
) -> Result<Vec<NormalizedRecord>, PipelineError> {
    let data = std::fs::read(path).map_err(|e| PipelineError::Input {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    debug!(path = %path.display(), bytes = data.len(), "read input file");

    parse_records(&data, limit, enricher).map_err(|e| match e {
        PipelineError::Input { reason, .. } => PipelineError::Input {
            path: path.display().to_string(),
            reason,
        },
        other => other,
    })
}

/// Parse a JSON array of raw records from memory.
pub fn parse_records(
    data: &[u8],
    limit: usize,
    enricher: &Enricher,
) -> Result<Vec<NormalizedRecord>, PipelineError> {
    let input_err = |reason: String| PipelineError::Input {
        path: "<memory>".into(),
        reason,
    };

    let doc: Value = serde_json::from_slice(data).map_err(|e| input_err(e.to_string()))?;
    let items = match doc {
        Value::Array(items) => items,
        _ => return Err(input_err("top-level value is not an array".into())),
    };

    let total = items.len();
    let mut records = Vec::with_capacity(total);
    for (index, item) in items.iter().enumerate() {
        let record = RawRecord::from_value(item)
            .and_then(|raw| enricher.enrich(&raw))
            .map_err(|source| PipelineError::Enrichment { index, source })?;
        records.push(record);
    }

    records.truncate(limit);
    info!(total, kept = records.len(), limit, "records loaded");
    Ok(records)
}
