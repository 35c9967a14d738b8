//! PostgreSQL-backed hash index
//!
//! Adapts the `aircheck-db` operations to the `HashIndex` trait. This is
//! the boundary where store-native numerics widen to `i64` and where raw
//! hash text re-enters the engine through canonicalizing `HashToken::parse`.

use async_trait::async_trait;
use std::collections::HashSet;
use std::time::Duration;

use aircheck_db::{operations, DbPool, NewSongRow, SongRow};

use crate::config::{Framing, StoreConfig};
use crate::error::{EngineError, Result};
use crate::hash::HashToken;
use crate::index::{HashIndex, HashRow, NewSong, Song};

const LOOKUP_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

fn store_err(op: &str, err: &anyhow::Error) -> EngineError {
    EngineError::StoreUnavailable(format!("{}: {:#}", op, err))
}

fn song_from_row(row: SongRow) -> Song {
    Song {
        song_id: row.song_id,
        song_name: row.song_name,
        file_sha1: row.file_sha1,
        total_hashes: row.total_hashes,
        duration_ms: row.duration_ms,
        fingerprinted: row.fingerprinted,
        framing: Framing {
            sample_rate: row.sample_rate,
            window_size: row.window_size,
            overlap_ratio: row.overlap_ratio,
        },
    }
}

/// Hash index over a PostgreSQL store
pub struct PgIndex {
    pool: DbPool,
    lookup_batch_size: usize,
}

impl PgIndex {
    pub fn new(pool: DbPool, lookup_batch_size: usize) -> Self {
        Self {
            pool,
            lookup_batch_size: lookup_batch_size.max(1),
        }
    }

    /// Connect from configuration, verify the connection and make sure the
    /// schema exists
    pub async fn connect(config: &StoreConfig, lookup_batch_size: usize) -> Result<Self> {
        let pool = aircheck_db::create_pool(
            &config.host,
            config.port,
            &config.database,
            &config.user,
            &config.password,
            config.max_connections,
        )
        .map_err(|e| store_err("connect", &e))?;

        aircheck_db::test_connection(&pool)
            .await
            .map_err(|e| store_err("connect", &e))?;
        operations::ensure_schema(&pool)
            .await
            .map_err(|e| store_err("ensure_schema", &e))?;

        Ok(Self::new(pool, lookup_batch_size))
    }

    /// One lookup batch, retried with capped exponential backoff before a
    /// `StoreUnavailable` surfaces.
    async fn lookup_batch(
        &self,
        batch: &[String],
        song_filter: Option<&[i32]>,
    ) -> Result<Vec<(String, i32, i64)>> {
        let mut delay = RETRY_BASE_DELAY;
        let mut attempt = 1;
        loop {
            match operations::lookup_hashes(&self.pool, batch, song_filter).await {
                Ok(rows) => return Ok(rows),
                Err(e) if attempt < LOOKUP_ATTEMPTS => {
                    log::warn!(
                        "store lookup failed (attempt {}/{}): {:#}",
                        attempt,
                        LOOKUP_ATTEMPTS,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(Duration::from_secs(2));
                    attempt += 1;
                }
                Err(e) => return Err(store_err("lookup", &e)),
            }
        }
    }
}

#[async_trait]
impl HashIndex for PgIndex {
    async fn insert_song(&self, song: NewSong) -> Result<i32> {
        operations::insert_song(
            &self.pool,
            &NewSongRow {
                song_name: song.song_name,
                file_sha1: song.file_sha1,
                total_hashes: song.total_hashes,
                duration_ms: song.duration_ms,
                sample_rate: song.framing.sample_rate,
                window_size: song.framing.window_size,
                overlap_ratio: song.framing.overlap_ratio,
            },
        )
        .await
        .map_err(|e| store_err("insert_song", &e))
    }

    async fn set_song_fingerprinted(&self, song_id: i32) -> Result<()> {
        operations::set_song_fingerprinted(&self.pool, song_id)
            .await
            .map_err(|e| store_err("set_song_fingerprinted", &e))
    }

    async fn insert_hashes(
        &self,
        song_id: i32,
        hashes: &[(HashToken, i64)],
        batch_size: usize,
    ) -> Result<()> {
        let rows: Vec<(String, i64)> = hashes
            .iter()
            .map(|(hash, offset)| (hash.as_str().to_string(), *offset))
            .collect();
        operations::insert_hashes(&self.pool, song_id, &rows, batch_size)
            .await
            .map_err(|e| store_err("insert_hashes", &e))
    }

    async fn delete_songs(&self, song_ids: &[i32], batch_size: usize) -> Result<()> {
        operations::delete_songs(&self.pool, song_ids, batch_size)
            .await
            .map_err(|e| store_err("delete_songs", &e))
    }

    async fn lookup(
        &self,
        hashes: &HashSet<HashToken>,
        song_filter: Option<&HashSet<i32>>,
    ) -> Result<Vec<HashRow>> {
        let hash_strings: Vec<String> = hashes.iter().map(|h| h.as_str().to_string()).collect();
        let filter_ids: Option<Vec<i32>> =
            song_filter.map(|filter| filter.iter().copied().collect());

        let mut rows = Vec::new();
        for batch in hash_strings.chunks(self.lookup_batch_size) {
            let batch_rows = self.lookup_batch(batch, filter_ids.as_deref()).await?;
            for (hash, song_id, db_offset) in batch_rows {
                rows.push(HashRow {
                    hash: HashToken::parse(&hash)?,
                    song_id,
                    db_offset,
                });
            }
        }
        Ok(rows)
    }

    async fn count_songs(&self) -> Result<i64> {
        operations::count_songs(&self.pool)
            .await
            .map_err(|e| store_err("count_songs", &e))
    }

    async fn count_hashes(&self) -> Result<i64> {
        operations::count_hashes(&self.pool)
            .await
            .map_err(|e| store_err("count_hashes", &e))
    }

    async fn get_song(&self, song_id: i32) -> Result<Option<Song>> {
        let row = operations::get_song_by_id(&self.pool, song_id)
            .await
            .map_err(|e| store_err("get_song", &e))?;
        Ok(row.map(song_from_row))
    }

    async fn list_fingerprinted_songs(&self) -> Result<Vec<Song>> {
        let rows = operations::list_fingerprinted_songs(&self.pool)
            .await
            .map_err(|e| store_err("list_fingerprinted_songs", &e))?;
        Ok(rows.into_iter().map(song_from_row).collect())
    }

    // Both provided backends parallelize with threads, so the connection
    // pool never crosses a process boundary; the hooks stay no-ops.
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_song_row_conversion_carries_framing() {
        let song = song_from_row(SongRow {
            song_id: 3,
            song_name: "ref".to_string(),
            file_sha1: "AA".to_string(),
            total_hashes: 10,
            duration_ms: 9_000,
            fingerprinted: true,
            sample_rate: 44_100,
            window_size: 4_096,
            overlap_ratio: 0.5,
            created_at: chrono::Utc::now(),
        });
        assert_eq!(song.framing.sample_rate, 44_100);
        assert_eq!(song.framing.window_size, 4_096);
        assert!(song.fingerprinted);
    }
}
