//! Query chunking
//!
//! Partitions a decoded waveform into fixed-length overlapping windows.
//! Chunk `i` spans samples `[i*step, i*step + chunk_len)` with
//! `step = (chunk - overlap) * fs`; the last chunk is emitted only when it
//! is fully contained in the input (tail truncation).

use crate::config::EngineConfig;

/// One planned chunk: sample range plus its position on the query timeline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkSpan {
    pub index: usize,
    pub start_sample: usize,
    pub end_sample: usize,
    /// `index * (chunk_size - overlap)` seconds
    pub start_s: f64,
}

impl ChunkSpan {
    pub fn range(&self) -> std::ops::Range<usize> {
        self.start_sample..self.end_sample
    }
}

/// Plan chunks over `len_samples` samples at `sample_rate`.
///
/// Empty input, or input shorter than one chunk, yields an empty plan.
pub fn plan_chunks(len_samples: usize, sample_rate: u32, config: &EngineConfig) -> Vec<ChunkSpan> {
    let chunk_len = (config.chunk_size_s * sample_rate as f64).round() as usize;
    let step = ((config.chunk_size_s - config.chunk_overlap_s) * sample_rate as f64).round() as usize;
    if chunk_len == 0 || step == 0 || len_samples < chunk_len {
        return Vec::new();
    }

    let mut spans = Vec::new();
    let mut index = 0;
    loop {
        let start_sample = index * step;
        let end_sample = start_sample + chunk_len;
        if end_sample > len_samples {
            break;
        }
        spans.push(ChunkSpan {
            index,
            start_sample,
            end_sample,
            start_s: start_sample as f64 / sample_rate as f64,
        });
        index += 1;
    }
    spans
}
