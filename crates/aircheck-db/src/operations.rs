use anyhow::{Context, Result};
use deadpool_postgres::Pool;

use crate::models::*;

const CREATE_SONGS_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS songs (
        song_id       SERIAL PRIMARY KEY,
        song_name     TEXT NOT NULL,
        file_sha1     TEXT NOT NULL,
        total_hashes  BIGINT NOT NULL DEFAULT 0,
        duration_ms   BIGINT NOT NULL DEFAULT 0,
        fingerprinted BOOLEAN NOT NULL DEFAULT FALSE,
        sample_rate   INTEGER NOT NULL,
        window_size   INTEGER NOT NULL,
        overlap_ratio DOUBLE PRECISION NOT NULL,
        created_at    TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )";

const CREATE_FINGERPRINTS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS fingerprints (
        song_id  INTEGER NOT NULL REFERENCES songs(song_id) ON DELETE CASCADE,
        hash     TEXT NOT NULL,
        "offset" BIGINT NOT NULL,
        UNIQUE (song_id, hash, "offset")
    )"#;

const CREATE_HASH_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_fingerprints_hash ON fingerprints (hash)";

const SONG_COLUMNS: &str = "song_id, song_name, file_sha1, total_hashes, duration_ms, \
     fingerprinted, sample_rate, window_size, overlap_ratio, created_at";

/// Create tables and the hash index if they do not exist
pub async fn ensure_schema(pool: &Pool) -> Result<()> {
    let client = pool.get().await?;

    client
        .execute(CREATE_SONGS_TABLE, &[])
        .await
        .context("Failed to create songs table")?;
    client
        .execute(CREATE_FINGERPRINTS_TABLE, &[])
        .await
        .context("Failed to create fingerprints table")?;
    client
        .execute(CREATE_HASH_INDEX, &[])
        .await
        .context("Failed to create fingerprint hash index")?;

    Ok(())
}

/// Insert a new song, returning its identifier
pub async fn insert_song(pool: &Pool, song: &NewSongRow) -> Result<i32> {
    let client = pool.get().await?;

    let row = client
        .query_one(
            "INSERT INTO songs
             (song_name, file_sha1, total_hashes, duration_ms,
              sample_rate, window_size, overlap_ratio)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING song_id",
            &[
                &song.song_name,
                &song.file_sha1,
                &song.total_hashes,
                &song.duration_ms,
                &song.sample_rate,
                &song.window_size,
                &song.overlap_ratio,
            ],
        )
        .await
        .context("Failed to insert song")?;

    Ok(row.get(0))
}

/// Mark a song as fully fingerprinted
pub async fn set_song_fingerprinted(pool: &Pool, song_id: i32) -> Result<()> {
    let client = pool.get().await?;

    client
        .execute(
            "UPDATE songs SET fingerprinted = TRUE WHERE song_id = $1",
            &[&song_id],
        )
        .await
        .context("Failed to mark song fingerprinted")?;

    Ok(())
}

/// Batch insert hashes. Duplicate `(song_id, hash, offset)` rows are
/// silently ignored.
pub async fn insert_hashes(
    pool: &Pool,
    song_id: i32,
    hashes: &[(String, i64)],
    batch_size: usize,
) -> Result<()> {
    if hashes.is_empty() {
        return Ok(());
    }

    let client = pool.get().await?;

    for batch in hashes.chunks(batch_size.max(1)) {
        let hash_values: Vec<&str> = batch.iter().map(|(h, _)| h.as_str()).collect();
        let offset_values: Vec<i64> = batch.iter().map(|(_, o)| *o).collect();

        client
            .execute(
                r#"INSERT INTO fingerprints (song_id, hash, "offset")
                   SELECT $1, h, o FROM UNNEST($2::text[], $3::int8[]) AS t(h, o)
                   ON CONFLICT DO NOTHING"#,
                &[&song_id, &hash_values, &offset_values],
            )
            .await
            .context("Failed to batch insert fingerprints")?;
    }

    Ok(())
}

/// Delete songs; fingerprint rows follow by cascade
pub async fn delete_songs(pool: &Pool, song_ids: &[i32], batch_size: usize) -> Result<()> {
    if song_ids.is_empty() {
        return Ok(());
    }

    let client = pool.get().await?;

    for batch in song_ids.chunks(batch_size.max(1)) {
        let ids: Vec<i32> = batch.to_vec();
        client
            .execute("DELETE FROM songs WHERE song_id = ANY($1)", &[&ids])
            .await
            .context("Failed to delete songs")?;
    }

    Ok(())
}

/// Return every `(hash, song_id, offset)` row matching the given hashes,
/// optionally restricted to an allowlist of song ids. Row order is
/// unspecified.
pub async fn lookup_hashes(
    pool: &Pool,
    hashes: &[String],
    song_filter: Option<&[i32]>,
) -> Result<Vec<(String, i32, i64)>> {
    if hashes.is_empty() {
        return Ok(Vec::new());
    }

    let client = pool.get().await?;

    let rows = match song_filter {
        Some(filter) if !filter.is_empty() => {
            let ids: Vec<i32> = filter.to_vec();
            client
                .query(
                    r#"SELECT hash, song_id, "offset" FROM fingerprints
                       WHERE hash = ANY($1) AND song_id = ANY($2)"#,
                    &[&hashes, &ids],
                )
                .await
                .context("Failed to look up fingerprints with song filter")?
        }
        _ => client
            .query(
                r#"SELECT hash, song_id, "offset" FROM fingerprints
                   WHERE hash = ANY($1)"#,
                &[&hashes],
            )
            .await
            .context("Failed to look up fingerprints")?,
    };

    Ok(rows
        .iter()
        .map(|r| (r.get(0), r.get(1), r.get(2)))
        .collect())
}

/// Count stored songs
pub async fn count_songs(pool: &Pool) -> Result<i64> {
    let client = pool.get().await?;

    let row = client
        .query_one("SELECT COUNT(*) FROM songs", &[])
        .await
        .context("Failed to count songs")?;

    Ok(row.get(0))
}

/// Count stored fingerprint rows
pub async fn count_hashes(pool: &Pool) -> Result<i64> {
    let client = pool.get().await?;

    let row = client
        .query_one("SELECT COUNT(*) FROM fingerprints", &[])
        .await
        .context("Failed to count fingerprints")?;

    Ok(row.get(0))
}

fn song_from_row(row: &tokio_postgres::Row) -> SongRow {
    SongRow {
        song_id: row.get(0),
        song_name: row.get(1),
        file_sha1: row.get(2),
        total_hashes: row.get(3),
        duration_ms: row.get(4),
        fingerprinted: row.get(5),
        sample_rate: row.get(6),
        window_size: row.get(7),
        overlap_ratio: row.get(8),
        created_at: row.get(9),
    }
}

/// Get a song by id
pub async fn get_song_by_id(pool: &Pool, song_id: i32) -> Result<Option<SongRow>> {
    let client = pool.get().await?;

    let sql = format!("SELECT {} FROM songs WHERE song_id = $1", SONG_COLUMNS);
    let row = client
        .query_opt(sql.as_str(), &[&song_id])
        .await
        .context("Failed to get song")?;

    Ok(row.as_ref().map(song_from_row))
}

/// List all fully fingerprinted songs
pub async fn list_fingerprinted_songs(pool: &Pool) -> Result<Vec<SongRow>> {
    let client = pool.get().await?;

    let sql = format!(
        "SELECT {} FROM songs WHERE fingerprinted ORDER BY song_id",
        SONG_COLUMNS
    );
    let rows = client
        .query(sql.as_str(), &[])
        .await
        .context("Failed to list fingerprinted songs")?;

    Ok(rows.iter().map(song_from_row).collect())
}
