//! Timeline reduction
//!
//! Projects per-chunk top alignments onto the query timeline and collapses
//! the near-duplicate detections that overlapping chunks produce: bin by
//! `(song_id, floor(offset / bin_seconds))`, keep the earliest offset per
//! bin, average the match counts, sort by time.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A chunk's accepted top-1 detection, before binning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkDetection {
    pub chunk: usize,
    pub chunk_start_s: f64,
    pub song_id: i32,
    pub song_name: String,
    /// Estimated start of the reference within the query, in seconds
    #[serde(rename = "ofsset_detection")]
    pub detection_offset_s: f64,
    pub detection_time: String,
    pub avg_counts_hashes_matched: f64,
    pub fingerprint_time: f64,
    pub query_time: f64,
    pub align_time: f64,
}

/// One binned detection on the output timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub song_id: i32,
    pub song_name: String,
    #[serde(rename = "ofsset_detection")]
    pub detection_offset_s: f64,
    pub detection_time: String,
    pub avg_counts_hashes_matched: f64,
}

/// Format seconds as `MM:SS.mmm`. Negative offsets keep their sign; the
/// numeric field is the authoritative value.
pub fn format_detection_time(seconds: f64) -> String {
    let sign = if seconds < 0.0 { "-" } else { "" };
    let total_ms = (seconds.abs() * 1000.0).round() as u64;
    let minutes = total_ms / 60_000;
    let secs = (total_ms % 60_000) / 1000;
    let millis = total_ms % 1000;
    format!("{}{:02}:{:02}.{:03}", sign, minutes, secs, millis)
}

/// Reduce chunk detections into the final time-sorted timeline.
///
/// Detections with `avg_counts_hashes_matched <= threshold` are discarded.
/// Each bin keeps the earliest offset it saw (a true minimum) and the mean
/// of the match counts that fell into it.
pub fn reduce_timeline(
    detections: &[ChunkDetection],
    bin_seconds: f64,
    threshold: f64,
) -> Vec<Detection> {
    struct Bin {
        song_name: String,
        earliest_offset_s: f64,
        counts: Vec<f64>,
    }

    let mut bins: HashMap<(i32, i64), Bin> = HashMap::new();
    for detection in detections {
        if detection.avg_counts_hashes_matched <= threshold {
            continue;
        }
        let key = (
            detection.song_id,
            (detection.detection_offset_s / bin_seconds).floor() as i64,
        );
        let bin = bins.entry(key).or_insert_with(|| Bin {
            song_name: detection.song_name.clone(),
            earliest_offset_s: detection.detection_offset_s,
            counts: Vec::new(),
        });
        bin.earliest_offset_s = bin.earliest_offset_s.min(detection.detection_offset_s);
        bin.counts.push(detection.avg_counts_hashes_matched);
    }

    let mut results: Vec<Detection> = bins
        .into_iter()
        .map(|((song_id, _), bin)| Detection {
            song_id,
            song_name: bin.song_name,
            detection_offset_s: bin.earliest_offset_s,
            detection_time: format_detection_time(bin.earliest_offset_s),
            avg_counts_hashes_matched: bin.counts.iter().sum::<f64>() / bin.counts.len() as f64,
        })
        .collect();

    results.sort_by(|a, b| {
        a.detection_offset_s
            .partial_cmp(&b.detection_offset_s)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.song_id.cmp(&b.song_id))
    });
    results
}
