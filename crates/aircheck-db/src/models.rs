use serde::{Deserialize, Serialize};

/// A song row as stored in the database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SongRow {
    pub song_id: i32,
    pub song_name: String,
    pub file_sha1: String,
    pub total_hashes: i64,
    pub duration_ms: i64,
    pub fingerprinted: bool,
    /// Framing constants the song was hashed under
    pub sample_rate: i32,
    pub window_size: i32,
    pub overlap_ratio: f64,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Input structure for registering a new song
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSongRow {
    pub song_name: String,
    pub file_sha1: String,
    pub total_hashes: i64,
    pub duration_ms: i64,
    pub sample_rate: i32,
    pub window_size: i32,
    pub overlap_ratio: f64,
}
