//! Hash index client interface
//!
//! The narrow lookup interface over the persistent store of
//! `(hash, song_id, offset)` rows plus song metadata. `MemoryIndex` is the
//! in-process implementation; `store::PgIndex` adapts the PostgreSQL layer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Mutex;

use crate::config::Framing;
use crate::error::Result;
use crate::hash::HashToken;

/// A fingerprinted reference recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Song {
    pub song_id: i32,
    pub song_name: String,
    pub file_sha1: String,
    pub total_hashes: i64,
    pub duration_ms: i64,
    pub fingerprinted: bool,
    /// Framing constants the song was hashed under
    pub framing: Framing,
}

/// Input for registering a song ahead of its hashes
#[derive(Debug, Clone)]
pub struct NewSong {
    pub song_name: String,
    pub file_sha1: String,
    pub total_hashes: i64,
    pub duration_ms: i64,
    pub framing: Framing,
}

/// One stored fingerprint row
#[derive(Debug, Clone, PartialEq)]
pub struct HashRow {
    pub hash: HashToken,
    pub song_id: i32,
    /// Widened to i64 at the store boundary
    pub db_offset: i64,
}

/// Narrow interface over the fingerprint store.
///
/// During recognition the store is read-only. Ingestion of one song is the
/// ordered sequence `insert_song` -> `insert_hashes` -> `set_song_fingerprinted`;
/// concurrent ingestion of different songs is permitted.
#[async_trait]
pub trait HashIndex: Send + Sync {
    /// Register a song, returning its new identifier
    async fn insert_song(&self, song: NewSong) -> Result<i32>;

    /// Mark a song as having all of its hashes durable
    async fn set_song_fingerprinted(&self, song_id: i32) -> Result<()>;

    /// Insert hashes in batches of `batch_size`. Idempotent on
    /// `(hash, song_id, offset)`: duplicates are silently ignored.
    async fn insert_hashes(
        &self,
        song_id: i32,
        hashes: &[(HashToken, i64)],
        batch_size: usize,
    ) -> Result<()>;

    /// Delete songs and, by cascade, their hash rows
    async fn delete_songs(&self, song_ids: &[i32], batch_size: usize) -> Result<()>;

    /// Return every row whose hash is in the input set and whose song passes
    /// the optional allowlist. Row order is undefined.
    async fn lookup(
        &self,
        hashes: &HashSet<HashToken>,
        song_filter: Option<&HashSet<i32>>,
    ) -> Result<Vec<HashRow>>;

    async fn count_songs(&self) -> Result<i64>;

    async fn count_hashes(&self) -> Result<i64>;

    async fn get_song(&self, song_id: i32) -> Result<Option<Song>>;

    async fn list_fingerprinted_songs(&self) -> Result<Vec<Song>>;

    /// Called before the process forks. Backends whose connection handles
    /// cannot cross a fork drop them here; thread-based backends no-op.
    fn before_fork(&self) {}

    /// Called in the child after a fork; the counterpart of `before_fork`.
    fn after_fork(&self) {}
}

#[derive(Default)]
struct MemoryState {
    next_song_id: i32,
    songs: HashMap<i32, Song>,
    /// `(hash, song_id, offset)` rows, unique by construction
    rows: HashMap<HashToken, BTreeSet<(i32, i64)>>,
}

/// In-memory hash index
///
/// Song ids are assigned in insertion order starting at 1.
#[derive(Default)]
pub struct MemoryIndex {
    state: Mutex<MemoryState>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HashIndex for MemoryIndex {
    async fn insert_song(&self, song: NewSong) -> Result<i32> {
        let mut state = self.state.lock().expect("memory index poisoned");
        state.next_song_id += 1;
        let song_id = state.next_song_id;
        state.songs.insert(
            song_id,
            Song {
                song_id,
                song_name: song.song_name,
                file_sha1: song.file_sha1,
                total_hashes: song.total_hashes,
                duration_ms: song.duration_ms,
                fingerprinted: false,
                framing: song.framing,
            },
        );
        Ok(song_id)
    }

    async fn set_song_fingerprinted(&self, song_id: i32) -> Result<()> {
        let mut state = self.state.lock().expect("memory index poisoned");
        if let Some(song) = state.songs.get_mut(&song_id) {
            song.fingerprinted = true;
        }
        Ok(())
    }

    async fn insert_hashes(
        &self,
        song_id: i32,
        hashes: &[(HashToken, i64)],
        _batch_size: usize,
    ) -> Result<()> {
        let mut state = self.state.lock().expect("memory index poisoned");
        for (hash, offset) in hashes {
            state
                .rows
                .entry(hash.clone())
                .or_default()
                .insert((song_id, *offset));
        }
        Ok(())
    }

    async fn delete_songs(&self, song_ids: &[i32], _batch_size: usize) -> Result<()> {
        let mut state = self.state.lock().expect("memory index poisoned");
        let doomed: HashSet<i32> = song_ids.iter().copied().collect();
        for id in &doomed {
            state.songs.remove(id);
        }
        for rows in state.rows.values_mut() {
            rows.retain(|(sid, _)| !doomed.contains(sid));
        }
        state.rows.retain(|_, rows| !rows.is_empty());
        Ok(())
    }

    async fn lookup(
        &self,
        hashes: &HashSet<HashToken>,
        song_filter: Option<&HashSet<i32>>,
    ) -> Result<Vec<HashRow>> {
        let state = self.state.lock().expect("memory index poisoned");
        let mut out = Vec::new();
        for hash in hashes {
            if let Some(rows) = state.rows.get(hash) {
                for &(song_id, db_offset) in rows {
                    if let Some(filter) = song_filter {
                        if !filter.is_empty() && !filter.contains(&song_id) {
                            continue;
                        }
                    }
                    out.push(HashRow {
                        hash: hash.clone(),
                        song_id,
                        db_offset,
                    });
                }
            }
        }
        Ok(out)
    }

    async fn count_songs(&self) -> Result<i64> {
        let state = self.state.lock().expect("memory index poisoned");
        Ok(state.songs.len() as i64)
    }

    async fn count_hashes(&self) -> Result<i64> {
        let state = self.state.lock().expect("memory index poisoned");
        Ok(state.rows.values().map(|rows| rows.len() as i64).sum())
    }

    async fn get_song(&self, song_id: i32) -> Result<Option<Song>> {
        let state = self.state.lock().expect("memory index poisoned");
        Ok(state.songs.get(&song_id).cloned())
    }

    async fn list_fingerprinted_songs(&self) -> Result<Vec<Song>> {
        let state = self.state.lock().expect("memory index poisoned");
        let mut songs: Vec<Song> = state
            .songs
            .values()
            .filter(|s| s.fingerprinted)
            .cloned()
            .collect();
        songs.sort_by_key(|s| s.song_id);
        Ok(songs)
    }
}
