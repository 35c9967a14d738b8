//! Batched matcher
//!
//! Coalesces every chunk's hashes into one global union, runs the store
//! lookup once, then scatters the rows back to each chunk by hash-set
//! membership. Chunks overlap, so the union is far smaller than the sum of
//! the per-chunk sets; one coalesced scan replaces N independent ones.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Instant;

use crate::error::Result;
use crate::hash::HashToken;
use crate::index::HashIndex;
use crate::worker::ChunkHashes;

/// Matched rows for one chunk, reduced to offset differences
#[derive(Debug, Clone)]
pub struct ChunkMatches {
    pub index: usize,
    pub start_s: f64,
    /// `(song_id, db_offset - local_offset)` pairs; differences may be
    /// negative when the query leads the reference anchor
    pub matches: Vec<(i32, i64)>,
    /// Per song: distinct chunk hashes that produced at least one row
    pub dedup_hashes: HashMap<i32, u64>,
    /// `|chunk.hashes|` at fingerprint time
    pub input_hashes: usize,
    pub fingerprint_time_s: f64,
}

/// Match all chunks against the store with one coalesced lookup.
///
/// Returns the per-chunk matches (in chunk order) and the wall-clock time
/// spent in the store lookup.
pub async fn match_chunks(
    index: &dyn HashIndex,
    chunks: &[ChunkHashes],
    song_filter: Option<&HashSet<i32>>,
) -> Result<(Vec<ChunkMatches>, f64)> {
    let global: HashSet<HashToken> = chunks
        .iter()
        .flat_map(|c| c.hash_to_offsets.keys().cloned())
        .collect();

    let started = Instant::now();
    let rows = if global.is_empty() {
        Vec::new()
    } else {
        index.lookup(&global, song_filter).await?
    };
    let query_time_s = started.elapsed().as_secs_f64();

    log::debug!(
        "coalesced lookup: {} chunks, {} distinct hashes, {} rows in {:.3}s",
        chunks.len(),
        global.len(),
        rows.len(),
        query_time_s
    );

    // One pass over the row buffer builds the scatter map.
    let mut by_hash: HashMap<HashToken, Vec<(i32, i64)>> = HashMap::new();
    for row in rows {
        by_hash
            .entry(row.hash)
            .or_default()
            .push((row.song_id, row.db_offset));
    }

    let matched = chunks
        .iter()
        .map(|chunk| scatter_chunk(chunk, &by_hash))
        .collect();

    Ok((matched, query_time_s))
}

/// Scatter the global row buffer back onto one chunk.
///
/// For every row matching a chunk hash, each local offset of that hash
/// yields one `db_offset - local_offset` difference; the differences of a
/// single row are expanded as a set. `dedup_hashes` counts each chunk hash
/// once per song no matter how many rows or local offsets it produced.
fn scatter_chunk(
    chunk: &ChunkHashes,
    by_hash: &HashMap<HashToken, Vec<(i32, i64)>>,
) -> ChunkMatches {
    let mut matches = Vec::new();
    let mut dedup_hashes: HashMap<i32, u64> = HashMap::new();

    for (hash, local_offsets) in &chunk.hash_to_offsets {
        let Some(rows) = by_hash.get(hash) else {
            continue;
        };

        let songs_hit: HashSet<i32> = rows.iter().map(|&(song_id, _)| song_id).collect();
        for song_id in songs_hit {
            *dedup_hashes.entry(song_id).or_insert(0) += 1;
        }

        for &(song_id, db_offset) in rows {
            let diffs: BTreeSet<i64> = local_offsets.iter().map(|l| db_offset - l).collect();
            matches.extend(diffs.into_iter().map(|diff| (song_id, diff)));
        }
    }

    ChunkMatches {
        index: chunk.index,
        start_s: chunk.start_s,
        matches,
        dedup_hashes,
        input_hashes: chunk.num_hashes(),
        fingerprint_time_s: chunk.fingerprint_time_s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractorConfig;
    use crate::index::{MemoryIndex, NewSong};

    fn token(s: &str) -> HashToken {
        HashToken::parse(s).unwrap()
    }

    fn chunk(index: usize, start_s: f64, entries: &[(&str, &[i64])]) -> ChunkHashes {
        let mut hash_to_offsets = HashMap::new();
        for (hash, offsets) in entries {
            hash_to_offsets.insert(token(hash), offsets.to_vec());
        }
        ChunkHashes {
            index,
            start_s,
            hash_to_offsets,
            fingerprint_time_s: 0.0,
        }
    }

    async fn seeded_index() -> MemoryIndex {
        let index = MemoryIndex::new();
        for name in ["a", "b"] {
            index
                .insert_song(NewSong {
                    song_name: name.to_string(),
                    file_sha1: "00".to_string(),
                    total_hashes: 4,
                    duration_ms: 10_000,
                    framing: ExtractorConfig::default().framing(),
                })
                .await
                .unwrap();
        }
        // Song 1 owns AA and BB, song 2 owns BB and CC.
        index
            .insert_hashes(1, &[(token("AA"), 10), (token("BB"), 20)], 1000)
            .await
            .unwrap();
        index
            .insert_hashes(2, &[(token("BB"), 5), (token("CC"), 9)], 1000)
            .await
            .unwrap();
        index
    }

    fn sorted(mut pairs: Vec<(i32, i64)>) -> Vec<(i32, i64)> {
        pairs.sort();
        pairs
    }

    #[tokio::test]
    async fn test_empty_union_issues_no_query() {
        let index = MemoryIndex::new();
        let (matched, _) = match_chunks(&index, &[chunk(0, 0.0, &[])], None)
            .await
            .unwrap();
        assert_eq!(matched.len(), 1);
        assert!(matched[0].matches.is_empty());
        assert!(matched[0].dedup_hashes.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_hash_yields_no_rows() {
        let index = seeded_index().await;
        let (matched, _) = match_chunks(&index, &[chunk(0, 0.0, &[("FF", &[1])])], None)
            .await
            .unwrap();
        assert!(matched[0].matches.is_empty());
    }

    #[tokio::test]
    async fn test_offset_differences_and_dedup_counts() {
        let index = seeded_index().await;
        let chunks = vec![chunk(0, 0.0, &[("AA", &[3]), ("BB", &[2, 7])])];
        let (matched, _) = match_chunks(&index, &chunks, None).await.unwrap();

        let m = &matched[0];
        // AA: 10-3. BB for song 1: 20-2, 20-7. BB for song 2: 5-2, 5-7.
        assert_eq!(
            sorted(m.matches.clone()),
            vec![(1, 7), (1, 13), (1, 18), (2, -2), (2, 3)]
        );
        // Song 1 hit by two distinct hashes, song 2 by one.
        assert_eq!(m.dedup_hashes[&1], 2);
        assert_eq!(m.dedup_hashes[&2], 1);
        assert_eq!(m.input_hashes, 2);
    }

    #[tokio::test]
    async fn test_dedup_never_exceeds_chunk_hashes() {
        let index = seeded_index().await;
        let chunks = vec![
            chunk(0, 0.0, &[("AA", &[0]), ("BB", &[0, 1, 2])]),
            chunk(1, 5.0, &[("BB", &[4]), ("CC", &[4])]),
        ];
        let (matched, _) = match_chunks(&index, &chunks, None).await.unwrap();
        for m in &matched {
            for count in m.dedup_hashes.values() {
                assert!(*count as usize <= m.input_hashes);
            }
        }
    }

    #[tokio::test]
    async fn test_song_filter_excludes_at_store_boundary() {
        let index = seeded_index().await;
        let chunks = vec![chunk(0, 0.0, &[("AA", &[0]), ("BB", &[0]), ("CC", &[0])])];
        let filter: HashSet<i32> = [2].into_iter().collect();
        let (matched, _) = match_chunks(&index, &chunks, Some(&filter)).await.unwrap();

        for (song_id, _) in &matched[0].matches {
            assert_eq!(*song_id, 2);
        }
        assert!(!matched[0].dedup_hashes.contains_key(&1));
    }

    /// The coalesced matcher must produce the same per-chunk multiset of
    /// `(song_id, offset_diff)` as independent per-chunk lookups.
    #[tokio::test]
    async fn test_coalesced_equals_naive_per_chunk_lookup() {
        let index = seeded_index().await;
        let chunks = vec![
            chunk(0, 0.0, &[("AA", &[3]), ("BB", &[2, 7])]),
            chunk(1, 5.0, &[("BB", &[1]), ("CC", &[0]), ("FF", &[9])]),
            chunk(2, 10.0, &[]),
        ];

        let (coalesced, _) = match_chunks(&index, &chunks, None).await.unwrap();

        for chunk in &chunks {
            let alone = std::slice::from_ref(chunk);
            let (naive, _) = match_chunks(&index, alone, None).await.unwrap();
            let batched = coalesced.iter().find(|m| m.index == chunk.index).unwrap();
            assert_eq!(
                sorted(naive[0].matches.clone()),
                sorted(batched.matches.clone())
            );
            assert_eq!(naive[0].dedup_hashes, batched.dedup_hashes);
        }
    }
}
