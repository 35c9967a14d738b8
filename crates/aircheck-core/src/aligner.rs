//! Offset-histogram alignment
//!
//! Per chunk: build a histogram of `db_offset - local_offset` per song,
//! take each song's dominant peak, rank songs, and attach confidence
//! metrics from the song metadata.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::Framing;
use crate::error::Result;
use crate::index::{HashIndex, Song};
use crate::matcher::ChunkMatches;

/// One ranked alignment of a chunk against a reference song
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alignment {
    pub song_id: i32,
    pub song_name: String,
    /// Histogram peak, in hash frames
    pub offset: i64,
    pub offset_seconds: f64,
    pub hashes_matched_in_input: u64,
    pub input_total_hashes: u64,
    pub fingerprinted_hashes_in_db: i64,
    pub input_confidence: f64,
    pub fingerprinted_confidence: f64,
    /// Count at the histogram peak. Historical name, kept for output
    /// compatibility.
    pub avg_counts_hashes_matched: f64,
}

/// A ranked candidate before metadata is attached
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub song_id: i32,
    pub offset: i64,
    pub peak_count: u64,
}

/// Rank songs by their histogram peaks.
///
/// Keyed flat by `(song_id, offset_diff)` rather than nested maps. Ranking
/// is peak count descending, then distinct-hash count descending, then
/// song id ascending; within a song, an equal-count peak resolves to the
/// smaller offset so the result is independent of map iteration order.
pub fn rank_candidates(matches: &[(i32, i64)], dedup_hashes: &HashMap<i32, u64>) -> Vec<Candidate> {
    let mut counts: HashMap<(i32, i64), u64> = HashMap::new();
    for &(song_id, diff) in matches {
        *counts.entry((song_id, diff)).or_insert(0) += 1;
    }

    let mut best: HashMap<i32, (i64, u64)> = HashMap::new();
    for (&(song_id, diff), &count) in &counts {
        let entry = best.entry(song_id).or_insert((diff, count));
        if count > entry.1 || (count == entry.1 && diff < entry.0) {
            *entry = (diff, count);
        }
    }

    let mut candidates: Vec<Candidate> = best
        .into_iter()
        .map(|(song_id, (offset, peak_count))| Candidate {
            song_id,
            offset,
            peak_count,
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.peak_count
            .cmp(&a.peak_count)
            .then_with(|| {
                let da = dedup_hashes.get(&a.song_id).copied().unwrap_or(0);
                let db = dedup_hashes.get(&b.song_id).copied().unwrap_or(0);
                db.cmp(&da)
            })
            .then_with(|| a.song_id.cmp(&b.song_id))
    });
    candidates
}

/// Memoized song metadata lookups for one recognition call
pub struct SongCache<'a> {
    index: &'a dyn HashIndex,
    cache: HashMap<i32, Option<Song>>,
}

impl<'a> SongCache<'a> {
    pub fn new(index: &'a dyn HashIndex) -> Self {
        Self {
            index,
            cache: HashMap::new(),
        }
    }

    pub async fn get(&mut self, song_id: i32) -> Result<Option<Song>> {
        if let Some(song) = self.cache.get(&song_id) {
            return Ok(song.clone());
        }
        let song = self.index.get_song(song_id).await?;
        self.cache.insert(song_id, song.clone());
        Ok(song)
    }
}

fn round5(value: f64) -> f64 {
    (value * 1e5).round() / 1e5
}

/// Align one chunk: rank its candidates and keep the top `topn` that carry
/// metadata and were hashed under the expected framing.
pub async fn align_chunk(
    songs: &mut SongCache<'_>,
    chunk: &ChunkMatches,
    expected_framing: Framing,
    frame_duration_s: f64,
    topn: usize,
) -> Result<Vec<Alignment>> {
    let candidates = rank_candidates(&chunk.matches, &chunk.dedup_hashes);

    let mut alignments = Vec::new();
    for candidate in candidates {
        if alignments.len() >= topn {
            break;
        }

        let Some(song) = songs.get(candidate.song_id).await? else {
            log::warn!("song {} has rows but no metadata, skipping", candidate.song_id);
            continue;
        };
        if song.framing != expected_framing {
            log::warn!(
                "song {} was fingerprinted under different framing constants, rejecting",
                song.song_id
            );
            continue;
        }

        let hashes_matched = chunk
            .dedup_hashes
            .get(&candidate.song_id)
            .copied()
            .unwrap_or(0);
        let input_total = chunk.input_hashes as u64;

        let input_confidence = if input_total > 0 {
            hashes_matched as f64 / input_total as f64
        } else {
            0.0
        };
        let fingerprinted_confidence = if song.total_hashes > 0 {
            hashes_matched as f64 / song.total_hashes as f64
        } else {
            0.0
        };

        alignments.push(Alignment {
            song_id: song.song_id,
            song_name: song.song_name.clone(),
            offset: candidate.offset,
            offset_seconds: round5(candidate.offset as f64 * frame_duration_s),
            hashes_matched_in_input: hashes_matched,
            input_total_hashes: input_total,
            fingerprinted_hashes_in_db: song.total_hashes,
            input_confidence: round5(input_confidence),
            fingerprinted_confidence: round5(fingerprinted_confidence),
            avg_counts_hashes_matched: candidate.peak_count as f64,
        });
    }

    Ok(alignments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractorConfig;
    use crate::index::{MemoryIndex, NewSong};

    #[test]
    fn test_peak_selection() {
        let matches = vec![(1, 10), (1, 10), (1, 10), (1, 4), (2, -3)];
        let dedup = HashMap::from([(1, 3), (2, 1)]);

        let ranked = rank_candidates(&matches, &dedup);
        assert_eq!(ranked[0].song_id, 1);
        assert_eq!(ranked[0].offset, 10);
        assert_eq!(ranked[0].peak_count, 3);
        assert_eq!(ranked[1].song_id, 2);
        assert_eq!(ranked[1].offset, -3);
    }

    #[test]
    fn test_equal_peaks_tie_break_on_dedup_then_id() {
        let matches = vec![(3, 0), (3, 0), (2, 5), (2, 5), (1, 9), (1, 9)];
        let dedup = HashMap::from([(1, 1), (2, 4), (3, 1)]);

        let ranked = rank_candidates(&matches, &dedup);
        assert_eq!(ranked[0].song_id, 2);
        // dedup tie between songs 1 and 3: lower id wins
        assert_eq!(ranked[1].song_id, 1);
        assert_eq!(ranked[2].song_id, 3);
    }

    #[test]
    fn test_equal_count_offsets_resolve_to_smaller_diff() {
        let matches = vec![(1, 20), (1, 7), (1, 20), (1, 7)];
        let ranked = rank_candidates(&matches, &HashMap::from([(1, 2)]));
        assert_eq!(ranked[0].offset, 7);
    }

    #[test]
    fn test_empty_matches_rank_empty() {
        assert!(rank_candidates(&[], &HashMap::new()).is_empty());
    }

    fn chunk_with(matches: Vec<(i32, i64)>, dedup: HashMap<i32, u64>, input: usize) -> ChunkMatches {
        ChunkMatches {
            index: 0,
            start_s: 0.0,
            matches,
            dedup_hashes: dedup,
            input_hashes: input,
            fingerprint_time_s: 0.0,
        }
    }

    #[tokio::test]
    async fn test_align_attaches_metadata_and_confidence() {
        let config = ExtractorConfig::default();
        let index = MemoryIndex::new();
        let song_id = index
            .insert_song(NewSong {
                song_name: "ref".to_string(),
                file_sha1: "00".to_string(),
                total_hashes: 40,
                duration_ms: 10_000,
                framing: config.framing(),
            })
            .await
            .unwrap();

        let chunk = chunk_with(
            vec![(song_id, 43); 8],
            HashMap::from([(song_id, 10)]),
            20,
        );
        let mut cache = SongCache::new(&index);
        let alignments = align_chunk(&mut cache, &chunk, config.framing(), config.frame_duration_s(), 2)
            .await
            .unwrap();

        assert_eq!(alignments.len(), 1);
        let top = &alignments[0];
        assert_eq!(top.song_id, song_id);
        assert_eq!(top.offset, 43);
        assert!((top.offset_seconds - round5(43.0 * 2048.0 / 44100.0)).abs() < 1e-9);
        assert!((top.input_confidence - 0.5).abs() < 1e-9);
        assert!((top.fingerprinted_confidence - 0.25).abs() < 1e-9);
        assert!((top.avg_counts_hashes_matched - 8.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_align_rejects_mismatched_framing() {
        let config = ExtractorConfig::default();
        let index = MemoryIndex::new();
        let mut other = config.framing();
        other.window_size = 8192;
        let song_id = index
            .insert_song(NewSong {
                song_name: "wrong-framing".to_string(),
                file_sha1: "00".to_string(),
                total_hashes: 40,
                duration_ms: 10_000,
                framing: other,
            })
            .await
            .unwrap();

        let chunk = chunk_with(vec![(song_id, 5); 4], HashMap::from([(song_id, 4)]), 4);
        let mut cache = SongCache::new(&index);
        let alignments = align_chunk(&mut cache, &chunk, config.framing(), config.frame_duration_s(), 2)
            .await
            .unwrap();
        assert!(alignments.is_empty());
    }

    #[tokio::test]
    async fn test_empty_rows_align_empty() {
        let index = MemoryIndex::new();
        let chunk = chunk_with(Vec::new(), HashMap::new(), 0);
        let mut cache = SongCache::new(&index);
        let config = ExtractorConfig::default();
        let alignments = align_chunk(&mut cache, &chunk, config.framing(), config.frame_duration_s(), 2)
            .await
            .unwrap();
        assert!(alignments.is_empty());
    }
}
