//! Fingerprint worker pool
//!
//! CPU-bound fan-out: each chunk is fingerprinted on its own task, every
//! channel independently, and the `(hash, offset)` tokens are merged into
//! one deduplicated set per chunk. Results are joined by chunk index, so
//! completion order never leaks into the output.

use rayon::prelude::*;
use std::collections::HashMap;
use std::time::Instant;

use crate::audio::AudioData;
use crate::chunker::ChunkSpan;
use crate::error::{EngineError, Result};
use crate::extract::Fingerprinter;
use crate::hash::HashToken;
use crate::recognizer::CancelFlag;

/// Token sets for one chunk
#[derive(Debug, Clone)]
pub struct ChunkHashes {
    pub index: usize,
    pub start_s: f64,
    /// A hash may occur at several local offsets within the chunk
    pub hash_to_offsets: HashMap<HashToken, Vec<i64>>,
    pub fingerprint_time_s: f64,
}

impl ChunkHashes {
    pub fn num_hashes(&self) -> usize {
        self.hash_to_offsets.len()
    }
}

/// Fingerprint all chunks on the given pool.
///
/// A failing chunk is logged and dropped; the remaining chunks proceed.
/// Raising the cancel flag aborts pending chunks and fails the whole call
/// with `Cancelled` - no partial results escape.
pub fn fingerprint_chunks(
    pool: &rayon::ThreadPool,
    audio: &AudioData,
    spans: &[ChunkSpan],
    fingerprinter: &dyn Fingerprinter,
    cancel: Option<&CancelFlag>,
) -> Result<Vec<ChunkHashes>> {
    let results: Vec<Option<ChunkHashes>> = pool.install(|| {
        spans
            .par_iter()
            .map(|span| {
                if cancel.map(|c| c.is_cancelled()).unwrap_or(false) {
                    return None;
                }
                match fingerprint_one(audio, span, fingerprinter) {
                    Ok(hashes) => Some(hashes),
                    Err(e) => {
                        log::warn!("chunk {} failed to fingerprint: {}", span.index, e);
                        None
                    }
                }
            })
            .collect()
    });

    if let Some(flag) = cancel {
        if flag.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
    }

    Ok(results.into_iter().flatten().collect())
}

fn fingerprint_one(
    audio: &AudioData,
    span: &ChunkSpan,
    fingerprinter: &dyn Fingerprinter,
) -> Result<ChunkHashes> {
    let started = Instant::now();

    // Merge across channels through a set so identical (hash, offset)
    // tuples from different channels collapse.
    let mut merged = std::collections::BTreeSet::new();
    for channel in &audio.channels {
        let tokens = fingerprinter.fingerprint(&channel[span.range()], audio.sample_rate)?;
        merged.extend(tokens);
    }

    let mut hash_to_offsets: HashMap<HashToken, Vec<i64>> = HashMap::new();
    for (hash, offset) in merged {
        hash_to_offsets.entry(hash).or_default().push(offset);
    }

    Ok(ChunkHashes {
        index: span.index,
        start_s: span.start_s,
        hash_to_offsets,
        fingerprint_time_s: started.elapsed().as_secs_f64(),
    })
}
