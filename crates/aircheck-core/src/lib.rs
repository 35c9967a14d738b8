//! Aircheck Core - Chunked Acoustic Recognition Engine
//!
//! Identifies segments of a query recording against a library of
//! fingerprinted references: the query is split into overlapping chunks,
//! each chunk is reduced to a set of time-stamped hash tokens, all chunks
//! share one coalesced store lookup, and per-chunk offset-histogram
//! alignment is reduced into a deduplicated timeline of detections.

pub mod aligner;
pub mod audio;
pub mod chunker;
pub mod config;
pub mod error;
pub mod extract;
pub mod hash;
pub mod index;
pub mod matcher;
pub mod recognizer;
pub mod store;
pub mod timeline;
pub mod worker;

pub use config::{AppConfig, EngineConfig, ExtractorConfig, Framing, StoreConfig};
pub use error::{EngineError, Result};
pub use extract::{Fingerprinter, SpectralFingerprinter};
pub use hash::HashToken;
pub use index::{HashIndex, HashRow, MemoryIndex, NewSong, Song};
pub use recognizer::{CancelFlag, Engine, RecognitionReport, RecognizeOptions};
pub use store::PgIndex;
pub use timeline::{ChunkDetection, Detection};
