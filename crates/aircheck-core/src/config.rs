//! Configuration for the recognition engine
//!
//! Loaded from a TOML file with three sections: `[store]` (postgres
//! connection), `[engine]` (chunking and matching), `[extractor]`
//! (spectral fingerprinting).

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{EngineError, Result};

/// Chunking and matching parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Chunk duration in seconds
    pub chunk_size_s: f64,
    /// Overlap between adjacent chunks in seconds
    pub chunk_overlap_s: f64,
    /// Parallel fingerprint workers
    pub chunk_workers: usize,

    /// Hashes per store query
    #[serde(default = "default_lookup_batch_size")]
    pub lookup_batch_size: usize,
    /// Hashes per ingestion write
    #[serde(default = "default_insert_batch_size")]
    pub insert_batch_size: usize,
    /// Alignments kept per chunk
    #[serde(default = "default_topn")]
    pub topn: usize,
    /// Timeline reducer bin width in seconds
    #[serde(default = "default_bin_seconds")]
    pub bin_seconds: f64,
    /// Minimum `avg_counts_hashes_matched` for a detection to be kept
    #[serde(default)]
    pub threshold: f64,
}

fn default_lookup_batch_size() -> usize {
    15_000
}
fn default_insert_batch_size() -> usize {
    1_000
}
fn default_topn() -> usize {
    2
}
fn default_bin_seconds() -> f64 {
    5.0
}

impl EngineConfig {
    /// Validate chunking and batching parameters
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size_s <= 0.0 {
            return Err(EngineError::Config("chunk_size_s must be > 0".into()));
        }
        if self.chunk_overlap_s < 0.0 || self.chunk_overlap_s >= self.chunk_size_s {
            return Err(EngineError::Config(
                "chunk_overlap_s must be in [0, chunk_size_s)".into(),
            ));
        }
        if self.chunk_workers == 0 {
            return Err(EngineError::Config("chunk_workers must be >= 1".into()));
        }
        if self.lookup_batch_size == 0 || self.insert_batch_size == 0 {
            return Err(EngineError::Config("batch sizes must be >= 1".into()));
        }
        if self.topn == 0 {
            return Err(EngineError::Config("topn must be >= 1".into()));
        }
        if self.bin_seconds <= 0.0 {
            return Err(EngineError::Config("bin_seconds must be > 0".into()));
        }
        Ok(())
    }
}

/// Spectral extractor parameters
///
/// The framing fields (`sample_rate`, `window_size`, `overlap_ratio`) also
/// drive the frame-to-seconds conversion in the aligner; they are stored
/// per song at ingestion and checked at query time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// FFT window size in samples
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    /// Ratio by which sequential windows overlap
    #[serde(default = "default_overlap_ratio")]
    pub overlap_ratio: f64,
    /// Target peaks paired with each anchor peak
    #[serde(default = "default_fan_value")]
    pub fan_value: usize,
    /// Minimum spectrogram amplitude (dB) considered a peak
    #[serde(default = "default_amp_min")]
    pub amp_min: f32,
    /// Half-width of the local-maximum neighborhood, in cells
    #[serde(default = "default_peak_neighborhood")]
    pub peak_neighborhood: usize,
    /// Frame-delta bounds for pairing peaks into a token
    #[serde(default)]
    pub min_hash_time_delta: i64,
    #[serde(default = "default_max_hash_time_delta")]
    pub max_hash_time_delta: i64,
    /// Sort peaks temporally before pairing
    #[serde(default = "default_peak_sort")]
    pub peak_sort: bool,
    /// Hex-character width of the truncated digest token
    #[serde(default = "default_fingerprint_reduction")]
    pub fingerprint_reduction: usize,
}

fn default_sample_rate() -> u32 {
    44_100
}
fn default_window_size() -> usize {
    4_096
}
fn default_overlap_ratio() -> f64 {
    0.5
}
fn default_fan_value() -> usize {
    15
}
fn default_amp_min() -> f32 {
    10.0
}
fn default_peak_neighborhood() -> usize {
    10
}
fn default_max_hash_time_delta() -> i64 {
    200
}
fn default_peak_sort() -> bool {
    true
}
fn default_fingerprint_reduction() -> usize {
    20
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            window_size: default_window_size(),
            overlap_ratio: default_overlap_ratio(),
            fan_value: default_fan_value(),
            amp_min: default_amp_min(),
            peak_neighborhood: default_peak_neighborhood(),
            min_hash_time_delta: 0,
            max_hash_time_delta: default_max_hash_time_delta(),
            peak_sort: default_peak_sort(),
            fingerprint_reduction: default_fingerprint_reduction(),
        }
    }
}

impl ExtractorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(EngineError::Config("sample_rate must be > 0".into()));
        }
        if self.window_size == 0 {
            return Err(EngineError::Config("window_size must be > 0".into()));
        }
        if !(0.0..1.0).contains(&self.overlap_ratio) {
            return Err(EngineError::Config("overlap_ratio must be in [0, 1)".into()));
        }
        if self.fingerprint_reduction == 0 || self.fingerprint_reduction > 40 {
            return Err(EngineError::Config(
                "fingerprint_reduction must be in 1..=40 hex chars".into(),
            ));
        }
        if self.min_hash_time_delta > self.max_hash_time_delta {
            return Err(EngineError::Config(
                "min_hash_time_delta must be <= max_hash_time_delta".into(),
            ));
        }
        Ok(())
    }

    /// Duration of one hash frame in seconds: `window · (1 − overlap) / fs`
    pub fn frame_duration_s(&self) -> f64 {
        self.window_size as f64 * (1.0 - self.overlap_ratio) / self.sample_rate as f64
    }

    /// Samples between successive FFT windows
    pub fn hop_size(&self) -> usize {
        ((self.window_size as f64) * (1.0 - self.overlap_ratio)).round() as usize
    }

    pub fn framing(&self) -> Framing {
        Framing {
            sample_rate: self.sample_rate as i32,
            window_size: self.window_size as i32,
            overlap_ratio: self.overlap_ratio,
        }
    }
}

/// Framing constants recorded with each song at ingestion.
///
/// Alignments are only meaningful when query and reference were hashed
/// under the same framing; mismatched candidates are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Framing {
    pub sample_rate: i32,
    pub window_size: i32,
    pub overlap_ratio: f64,
}

/// PostgreSQL connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default = "default_password")]
    pub password: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_host() -> String {
    "localhost".to_string()
}
fn default_port() -> u16 {
    5432
}
fn default_database() -> String {
    "aircheck".to_string()
}
fn default_user() -> String {
    "aircheck_user".to_string()
}
fn default_password() -> String {
    "aircheck_pass".to_string()
}
fn default_max_connections() -> u32 {
    10
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database: default_database(),
            user: default_user(),
            password: default_password(),
            max_connections: default_max_connections(),
        }
    }
}

/// Top-level application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub store: StoreConfig,
    pub engine: EngineConfig,
    #[serde(default)]
    pub extractor: ExtractorConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)
            .map_err(|e| EngineError::Config(format!("failed to parse {}: {}", path.display(), e)))?;
        config.engine.validate()?;
        config.extractor.validate()?;
        Ok(config)
    }
}
