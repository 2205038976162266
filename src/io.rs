//! JSON snapshots exchanged between pipeline stages
//!
//! Layout of a batch directory:
//!
//! ```text
//! manifest.json
//! batch_001.json            work unit (Batch)
//! batch_001_results.json    output of the external analysis job (BatchResult)
//! ...
//! ```

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::partition::{Batch, BatchManifest, Metadata};
use crate::record::{BatchResult, StockRecord};
use crate::{PipelineError, Result};

pub const MANIFEST_FILE: &str = "manifest.json";

pub fn batch_file_name(batch_id: u32) -> String {
    format!("batch_{batch_id:03}.json")
}

pub fn result_file_name(batch_id: u32) -> String {
    format!("batch_{batch_id:03}_results.json")
}

fn io_error(path: &Path, source: std::io::Error) -> PipelineError {
    PipelineError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Read and parse a JSON file
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let json = fs::read_to_string(path).map_err(|e| io_error(path, e))?;
    serde_json::from_str(&json).map_err(|source| PipelineError::Json {
        path: path.display().to_string(),
        source,
    })
}

/// Write `value` as pretty JSON with a trailing newline.
///
/// Output is byte-identical for equal values.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
    }
    let mut json = serde_json::to_string_pretty(value).map_err(|source| PipelineError::Json {
        path: path.display().to_string(),
        source,
    })?;
    json.push('\n');
    fs::write(path, json).map_err(|e| io_error(path, e))?;
    log::debug!("wrote {}", path.display());
    Ok(())
}

/// Universe entry that could not be read as a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRecord {
    /// Position in the input array
    pub index: usize,
    pub ticker: Option<String>,
    pub reason: String,
}

/// A loaded stock universe
#[derive(Debug, Clone, PartialEq)]
pub struct Universe {
    pub stocks: Vec<StockRecord>,
    pub metadata: Metadata,
    /// Entries skipped because they lack a ticker or entry date
    pub rejected: Vec<RejectedRecord>,
}

/// Load a stock universe.
///
/// Accepts either a bare array of records or an object with a `stocks`
/// array; the object's other fields are returned as metadata. Entries are
/// read one by one: an unreadable entry is reported in `rejected` and the
/// rest still load. Missing optional fields such as `year_discovered` are
/// left for [`crate::catalyst::validate`] to flag.
pub fn load_universe(path: &Path) -> Result<Universe> {
    let value: serde_json::Value = read_json(path)?;
    let (stocks, metadata) = match value {
        serde_json::Value::Array(_) => (value, Metadata::new()),
        serde_json::Value::Object(mut object) => match object.remove("stocks") {
            Some(stocks) => (stocks, object),
            None => {
                return Err(PipelineError::InvalidArgument(format!(
                    "{}: object has no `stocks` array",
                    path.display()
                )))
            }
        },
        _ => {
            return Err(PipelineError::InvalidArgument(format!(
                "{}: expected an array or an object with `stocks`",
                path.display()
            )))
        }
    };
    let serde_json::Value::Array(entries) = stocks else {
        return Err(PipelineError::InvalidArgument(format!(
            "{}: `stocks` is not an array",
            path.display()
        )));
    };

    let mut universe = Universe {
        stocks: Vec::with_capacity(entries.len()),
        metadata,
        rejected: Vec::new(),
    };
    for (index, entry) in entries.into_iter().enumerate() {
        let ticker = entry
            .get("ticker")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string);
        match serde_json::from_value::<StockRecord>(entry) {
            Ok(stock) => universe.stocks.push(stock),
            Err(e) => {
                log::warn!(
                    "{}: skipping entry {} ({}): {}",
                    path.display(),
                    index,
                    ticker.as_deref().unwrap_or("no ticker"),
                    e
                );
                universe.rejected.push(RejectedRecord {
                    index,
                    ticker,
                    reason: e.to_string(),
                });
            }
        }
    }

    log::info!(
        "loaded {} stocks from {} ({} rejected)",
        universe.stocks.len(),
        path.display(),
        universe.rejected.len()
    );
    Ok(universe)
}

/// Write one file per batch plus the manifest into `dir`.
pub fn write_batches(dir: &Path, batches: &[Batch]) -> Result<BatchManifest> {
    for batch in batches {
        write_json(&dir.join(batch_file_name(batch.batch_id)), batch)?;
    }
    let manifest = BatchManifest::from_batches(batches, batch_file_name);
    write_json(&dir.join(MANIFEST_FILE), &manifest)?;
    log::info!(
        "wrote {} batch files to {}",
        manifest.batch_count,
        dir.display()
    );
    Ok(manifest)
}

pub fn read_manifest(dir: &Path) -> Result<BatchManifest> {
    read_json(&dir.join(MANIFEST_FILE))
}

/// Load every batch result listed in `manifest`.
///
/// A result file that is missing, malformed, or labelled with another batch
/// id is replaced by [`BatchResult::missing`] built from the batch's work
/// unit, so the merge can still account for every stock. Only an unreadable
/// work unit is an error.
pub fn load_batch_results(dir: &Path, manifest: &BatchManifest) -> Result<Vec<BatchResult>> {
    manifest
        .batches
        .iter()
        .map(|entry| {
            let path = dir.join(result_file_name(entry.batch_id));
            let reason = match read_json::<BatchResult>(&path) {
                Ok(result) if result.batch_id == entry.batch_id => return Ok(result),
                Ok(result) => format!(
                    "result file is labelled batch {} instead of {}",
                    result.batch_id, entry.batch_id
                ),
                Err(e) => e.to_string(),
            };
            log::warn!("batch {} has no usable result: {}", entry.batch_id, reason);
            let batch: Batch = read_json(&dir.join(&entry.path))?;
            Ok(BatchResult::missing(
                entry.batch_id,
                batch.stocks,
                &format!("batch result missing: {reason}"),
            ))
        })
        .collect()
}

// ============================================================
// TESTS
// ============================================================
