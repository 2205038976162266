//! Balanced partitioning of a stock universe into batches
//!
//! Batches are contiguous slices taken in input order. With `n` stocks and `k`
//! batches the first `n % k` batches receive one extra stock, so sizes never
//! differ by more than one and the same input always yields the same batches.

use serde::{Deserialize, Serialize};

use crate::record::StockRecord;
use crate::{BatchCount, PipelineError, Result};

/// Universe-level metadata passed through to every batch
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Unit of parallel work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    /// 1-based position in slice order
    pub batch_id: u32,
    pub stocks: Vec<StockRecord>,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

impl Batch {
    #[inline]
    pub fn len(&self) -> usize {
        self.stocks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.stocks.is_empty()
    }

    pub fn tickers(&self) -> Vec<String> {
        self.stocks.iter().map(|s| s.ticker.clone()).collect()
    }
}

// ============================================================
// SLICING
// ============================================================

/// Split `items` into `count` contiguous, near-equal slices.
///
/// Fails if `items` is empty or `count` exceeds the number of items.
pub fn split_balanced<T>(items: &[T], count: BatchCount) -> Result<Vec<&[T]>> {
    let n = items.len();
    let k = count.get();
    if n == 0 {
        return Err(PipelineError::InvalidArgument(
            "cannot partition an empty universe".to_string(),
        ));
    }
    if k > n {
        return Err(PipelineError::InvalidArgument(format!(
            "batch count {k} exceeds universe size {n}"
        )));
    }

    let base = n / k;
    let remainder = n % k;
    let mut slices = Vec::with_capacity(k);
    let mut start = 0;
    for i in 0..k {
        let size = if i < remainder { base + 1 } else { base };
        slices.push(&items[start..start + size]);
        start += size;
    }
    debug_assert_eq!(start, n);
    Ok(slices)
}

// ============================================================
// PARTITIONER
// ============================================================

/// Partition `stocks` into `batch_count` balanced batches.
pub fn partition(stocks: &[StockRecord], batch_count: usize) -> Result<Vec<Batch>> {
    partition_with_metadata(stocks, batch_count, &Metadata::new())
}

/// Partition and attach `metadata` to every batch.
pub fn partition_with_metadata(
    stocks: &[StockRecord],
    batch_count: usize,
    metadata: &Metadata,
) -> Result<Vec<Batch>> {
    let count = BatchCount::new(batch_count)?;
    let batches: Vec<Batch> = split_balanced(stocks, count)?
        .into_iter()
        .enumerate()
        .map(|(i, slice)| Batch {
            batch_id: i as u32 + 1,
            stocks: slice.to_vec(),
            metadata: metadata.clone(),
        })
        .collect();

    log::info!(
        "partitioned {} stocks into {} batches ({}..={} per batch)",
        stocks.len(),
        batches.len(),
        batches.last().map_or(0, Batch::len),
        batches.first().map_or(0, Batch::len),
    );

    Ok(batches)
}

// ============================================================
// MANIFEST
// ============================================================

/// One manifest line per batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub batch_id: u32,
    pub path: String,
    pub stocks_count: usize,
    pub tickers: Vec<String>,
}

/// Listing of all batches written by one partitioning run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchManifest {
    pub total_stocks: usize,
    pub batch_count: usize,
    pub batches: Vec<ManifestEntry>,
}

impl BatchManifest {
    /// Build a manifest, naming each batch file with `path_for(batch_id)`.
    pub fn from_batches(batches: &[Batch], path_for: impl Fn(u32) -> String) -> Self {
        Self {
            total_stocks: batches.iter().map(Batch::len).sum(),
            batch_count: batches.len(),
            batches: batches
                .iter()
                .map(|b| ManifestEntry {
                    batch_id: b.batch_id,
                    path: path_for(b.batch_id),
                    stocks_count: b.len(),
                    tickers: b.tickers(),
                })
                .collect(),
        }
    }
}

// ============================================================
// TESTS
// ============================================================
