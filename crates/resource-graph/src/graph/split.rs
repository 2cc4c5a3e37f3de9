//! Size-bounded splitting of oversized graphs.
//!
//! The first chunk is always a full copy of the graph. When the graph is
//! too large, the largest process buckets are excluded from it: their
//! records keep their identity and links in the first chunk but lose every
//! sequence attribute, and the complete records travel in secondary,
//! edge-less chunks flagged `needsMatch = false`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::graph::object_graph::ObjectGraph;
use crate::limits::{
    DEFAULT_MAX_CHUNK_MB, DEFAULT_PRIMARY_BUDGET_MB, NEEDS_MATCH_FIELD, SEQUENCE_OVERHEAD,
};
use crate::model::{Record, TypeRegistry, Value};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Chunk size limits, in MB.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    /// Upper bound for one secondary chunk.
    pub max_chunk_mb: f64,
    /// The primary chunk is trimmed until it estimates below this size.
    pub primary_budget_mb: f64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            max_chunk_mb: DEFAULT_MAX_CHUNK_MB,
            primary_budget_mb: DEFAULT_PRIMARY_BUDGET_MB,
        }
    }
}

/// Approximate serialised size of a value in bytes.
///
/// Sequences are costed from their first element, maps entry by entry,
/// leaves by the UTF-16 length of their JSON text.
pub fn estimate_size(value: &Value) -> u64 {
    match value {
        Value::Null => 0,
        Value::Sequence(items) => sequence_size(items.first().map(estimate_size), items.len()),
        Value::Map(attrs) => attrs
            .iter()
            .map(|(k, v)| text_size(k) + estimate_size(v))
            .sum(),
        leaf => utf16_bytes(&leaf.canonical_text()),
    }
}

/// Estimated size of one record.
pub fn estimate_record(record: &Record) -> u64 {
    record
        .iter()
        .map(|(k, v)| text_size(k) + estimate_size(v))
        .sum()
}

/// Estimated size of a bucket of records.
pub fn estimate_bucket<'a>(records: impl ExactSizeIterator<Item = &'a Record>) -> u64 {
    let count = records.len();
    let mut records = records;
    sequence_size(records.next().map(estimate_record), count)
}

fn sequence_size(first: Option<u64>, count: usize) -> u64 {
    let sum = first.unwrap_or(0).saturating_mul(count as u64);
    sum + (sum as f64 * SEQUENCE_OVERHEAD) as u64
}

fn text_size(text: &str) -> u64 {
    // quoted JSON string
    utf16_bytes(text) + 4
}

fn utf16_bytes(text: &str) -> u64 {
    text.encode_utf16().count() as u64 * 2
}

fn to_mb(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_MB
}

/// Splits graphs along process buckets.
#[derive(Debug, Clone)]
pub struct SizeSplitter {
    registry: Arc<TypeRegistry>,
    config: SplitConfig,
}

impl SizeSplitter {
    pub fn new(registry: Arc<TypeRegistry>, config: SplitConfig) -> Self {
        Self { registry, config }
    }

    pub fn config(&self) -> &SplitConfig {
        &self.config
    }

    /// Splits `graph`; the source graph is not modified.
    ///
    /// Always yields at least one chunk, the first holding every record.
    pub fn split(&self, graph: &ObjectGraph) -> SplitChunks {
        let mut primary = graph.copy();
        let sizes: Vec<(String, u64)> = primary
            .typed_groups()
            .iter()
            .map(|(name, ixs)| {
                let records = ixs.iter().filter_map(|&ix| primary.record(ix));
                let records: Vec<&Record> = records.collect();
                (name.clone(), estimate_bucket(records.into_iter()))
            })
            .collect();

        let excluded = self.excluded_buckets(&sizes);
        let mut secondary = Vec::new();

        for (bucket, size) in sizes.iter().filter(|(name, _)| excluded.contains(name)) {
            let size_mb = to_mb(*size);
            if size_mb <= self.config.max_chunk_mb {
                continue;
            }
            let ixs = primary.group(bucket).to_vec();
            let parts = (size_mb / self.config.max_chunk_mb).ceil().max(1.0);
            let part_size = ((ixs.len() as f64 / parts).ceil() as usize).max(1);

            let mut copies = Vec::with_capacity(ixs.len());
            for ix in ixs {
                let Some(record) = primary.record_mut(ix) else { continue };
                let mut copy = record.clone();
                copy.insert(NEEDS_MATCH_FIELD, Value::Bool(false));
                record.null_sequences();
                copies.push(copy);
            }

            let before = secondary.len();
            for part in copies.chunks(part_size) {
                let mut chunk = ObjectGraph::new();
                for record in part {
                    if let Err(err) = chunk.add_record(record.clone()) {
                        debug!(%err, "record skipped in secondary chunk");
                    }
                }
                secondary.push(chunk);
            }
            info!(
                bucket = %bucket,
                size_mb,
                chunks = secondary.len() - before,
                part_size,
                "bucket moved to secondary chunks"
            );
        }

        let mut chunks = Vec::with_capacity(secondary.len() + 1);
        chunks.push(primary);
        chunks.extend(secondary);
        SplitChunks {
            inner: chunks.into_iter(),
        }
    }

    /// Process buckets removed from the primary chunk, largest first,
    /// until the remaining buckets fit the primary budget.
    fn excluded_buckets(&self, sizes: &[(String, u64)]) -> Vec<String> {
        let mut processes: Vec<&(String, u64)> = sizes
            .iter()
            .filter(|(name, _)| self.registry.is_process(name))
            .collect();
        processes.sort_by(|a, b| b.1.cmp(&a.1));

        let mut excluded: Vec<String> = Vec::new();
        for (name, _) in processes {
            let remaining: f64 = sizes
                .iter()
                .filter(|(n, _)| !excluded.contains(n))
                .map(|(_, s)| to_mb(*s))
                .sum();
            if remaining < self.config.primary_budget_mb {
                break;
            }
            debug!(bucket = %name, remaining_mb = remaining, "excluding bucket from primary chunk");
            excluded.push(name.clone());
        }
        excluded
    }
}

/// Chunks produced by [`SizeSplitter::split`]; finite, consumed once.
#[derive(Debug)]
pub struct SplitChunks {
    inner: std::vec::IntoIter<ObjectGraph>,
}

impl Iterator for SplitChunks {
    type Item = ObjectGraph;

    fn next(&mut self) -> Option<ObjectGraph> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for SplitChunks {}
