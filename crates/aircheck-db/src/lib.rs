//! Aircheck Database Layer
//!
//! PostgreSQL persistence for the `songs` and `fingerprints` tables.

pub mod connection;
pub mod models;
pub mod operations;

// Re-export commonly used types
pub use connection::{create_pool, test_connection, DbPool};
pub use models::{NewSongRow, SongRow};
pub use operations::{
    count_hashes, count_songs, delete_songs, ensure_schema, get_song_by_id, insert_hashes,
    insert_song, list_fingerprinted_songs, lookup_hashes, set_song_fingerprinted,
};
