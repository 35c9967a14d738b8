//! Recognition orchestration
//!
//! `Engine` is the explicit context value threaded through every call: it
//! owns the configuration, the hash index handle, the fingerprinter and the
//! worker pool. There is no process-wide state.

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;

use crate::aligner::{align_chunk, SongCache};
use crate::audio::{decode_audio, AudioData};
use crate::chunker::plan_chunks;
use crate::config::{EngineConfig, ExtractorConfig};
use crate::error::{EngineError, Result};
use crate::extract::{Fingerprinter, SpectralFingerprinter};
use crate::hash::HashToken;
use crate::index::{HashIndex, NewSong};
use crate::matcher::match_chunks;
use crate::timeline::{format_detection_time, reduce_timeline, ChunkDetection, Detection};
use crate::worker::fingerprint_chunks;

/// Cooperative cancellation flag.
///
/// Raising it aborts pending chunk tasks (tasks already executing run to
/// completion) and makes the call surface `Cancelled` with no partial
/// results.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-call options
#[derive(Debug, Clone, Default)]
pub struct RecognizeOptions {
    /// Restrict lookups to these song ids
    pub song_filter: Option<HashSet<i32>>,
    /// Override the configured detection threshold
    pub threshold: Option<f64>,
    /// Override the configured timeline bin width
    pub bin_seconds: Option<f64>,
    pub cancel: Option<CancelFlag>,
}

/// The result of one recognition call.
///
/// Serializes as `{"results": [...]}`; the per-chunk detections and timing
/// are carried for callers that want them but stay out of the canonical
/// JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionReport {
    pub results: Vec<Detection>,
    #[serde(skip)]
    pub chunks: Vec<ChunkDetection>,
    #[serde(skip)]
    pub total_time_s: f64,
}

/// The recognition engine
pub struct Engine {
    engine_config: EngineConfig,
    extractor_config: ExtractorConfig,
    index: Arc<dyn HashIndex>,
    fingerprinter: Arc<dyn Fingerprinter>,
    pool: rayon::ThreadPool,
}

impl Engine {
    pub fn new(
        engine_config: EngineConfig,
        extractor_config: ExtractorConfig,
        index: Arc<dyn HashIndex>,
        fingerprinter: Arc<dyn Fingerprinter>,
    ) -> Result<Self> {
        engine_config.validate()?;
        extractor_config.validate()?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(engine_config.chunk_workers)
            .build()
            .map_err(|e| EngineError::Config(format!("failed to build worker pool: {}", e)))?;

        Ok(Self {
            engine_config,
            extractor_config,
            index,
            fingerprinter,
            pool,
        })
    }

    /// Construct with the built-in spectral fingerprinter
    pub fn with_spectral_extractor(
        engine_config: EngineConfig,
        extractor_config: ExtractorConfig,
        index: Arc<dyn HashIndex>,
    ) -> Result<Self> {
        let fingerprinter = Arc::new(SpectralFingerprinter::new(extractor_config.clone()));
        Self::new(engine_config, extractor_config, index, fingerprinter)
    }

    pub fn index(&self) -> &Arc<dyn HashIndex> {
        &self.index
    }

    /// Fingerprint a reference file and make it durable in the store.
    ///
    /// Ordered per song: `insert_song`, then the hash batches, then
    /// `set_song_fingerprinted`. On failure partway through, the partial
    /// rows remain; clean up with `delete_songs`.
    pub async fn ingest_file(&self, path: &Path, song_name: Option<&str>) -> Result<i32> {
        let bytes = std::fs::read(path)?;
        let file_sha1 = HashToken::from_digest(Sha1::digest(&bytes).as_slice(), 40);

        let name = match song_name {
            Some(name) => name.to_string(),
            None => path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("unknown")
                .to_string(),
        };

        let audio = decode_audio(path, self.extractor_config.sample_rate)?;
        self.ingest_audio(&audio, &name, file_sha1.as_str()).await
    }

    /// Fingerprint decoded audio and make it durable in the store
    pub async fn ingest_audio(
        &self,
        audio: &AudioData,
        song_name: &str,
        file_sha1: &str,
    ) -> Result<i32> {
        let started = Instant::now();

        let per_channel: Vec<Vec<(HashToken, i64)>> = self.pool.install(|| {
            audio
                .channels
                .par_iter()
                .map(|channel| self.fingerprinter.fingerprint(channel, audio.sample_rate))
                .collect::<Result<Vec<_>>>()
        })?;

        let merged: std::collections::BTreeSet<(HashToken, i64)> =
            per_channel.into_iter().flatten().collect();
        let hashes: Vec<(HashToken, i64)> = merged.into_iter().collect();

        let song_id = self
            .index
            .insert_song(NewSong {
                song_name: song_name.to_string(),
                file_sha1: file_sha1.to_string(),
                total_hashes: hashes.len() as i64,
                duration_ms: audio.duration_ms as i64,
                framing: self.extractor_config.framing(),
            })
            .await?;

        self.index
            .insert_hashes(song_id, &hashes, self.engine_config.insert_batch_size)
            .await?;
        self.index.set_song_fingerprinted(song_id).await?;

        log::info!(
            "ingested \"{}\" as song {} ({} hashes in {:.2}s)",
            song_name,
            song_id,
            hashes.len(),
            started.elapsed().as_secs_f64()
        );
        Ok(song_id)
    }

    /// Recognize a query file
    pub async fn recognize_file(
        &self,
        path: &Path,
        options: &RecognizeOptions,
    ) -> Result<RecognitionReport> {
        let audio = decode_audio(path, self.extractor_config.sample_rate)?;
        self.recognize_audio(&audio, options).await
    }

    /// Recognize decoded query audio.
    ///
    /// The chunk fan-out runs on the engine's worker pool and blocks the
    /// calling task until it joins; the store lookup is sequential and
    /// coalesced across all chunks.
    pub async fn recognize_audio(
        &self,
        audio: &AudioData,
        options: &RecognizeOptions,
    ) -> Result<RecognitionReport> {
        let started = Instant::now();

        let spans = plan_chunks(audio.len_samples(), audio.sample_rate, &self.engine_config);
        log::info!(
            "query: {:.1}s of audio, {} chunks of {:.1}s (overlap {:.1}s)",
            audio.duration_s(),
            spans.len(),
            self.engine_config.chunk_size_s,
            self.engine_config.chunk_overlap_s
        );

        let chunk_hashes = fingerprint_chunks(
            &self.pool,
            audio,
            &spans,
            self.fingerprinter.as_ref(),
            options.cancel.as_ref(),
        )?;

        let (chunk_matches, query_time) = match_chunks(
            self.index.as_ref(),
            &chunk_hashes,
            options.song_filter.as_ref(),
        )
        .await?;

        if let Some(flag) = &options.cancel {
            if flag.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
        }

        let framing = self.extractor_config.framing();
        let frame_duration_s = self.extractor_config.frame_duration_s();
        let mut cache = SongCache::new(self.index.as_ref());
        let mut chunk_detections = Vec::new();

        for chunk in &chunk_matches {
            let align_started = Instant::now();
            let alignments = align_chunk(
                &mut cache,
                chunk,
                framing,
                frame_duration_s,
                self.engine_config.topn,
            )
            .await?;
            let align_time = align_started.elapsed().as_secs_f64();

            if let Some(top) = alignments.first() {
                // A positive offset means the match begins before the chunk
                // start within the reference.
                let detection_offset_s = chunk.start_s - top.offset_seconds;
                chunk_detections.push(ChunkDetection {
                    chunk: chunk.index,
                    chunk_start_s: chunk.start_s,
                    song_id: top.song_id,
                    song_name: top.song_name.clone(),
                    detection_offset_s,
                    detection_time: format_detection_time(detection_offset_s),
                    avg_counts_hashes_matched: top.avg_counts_hashes_matched,
                    fingerprint_time: chunk.fingerprint_time_s,
                    query_time,
                    align_time,
                });
            }
        }

        let results = reduce_timeline(
            &chunk_detections,
            options.bin_seconds.unwrap_or(self.engine_config.bin_seconds),
            options.threshold.unwrap_or(self.engine_config.threshold),
        );

        log::info!(
            "recognition finished: {} chunk detections, {} timeline bins in {:.2}s",
            chunk_detections.len(),
            results.len(),
            started.elapsed().as_secs_f64()
        );

        Ok(RecognitionReport {
            results,
            chunks: chunk_detections,
            total_time_s: started.elapsed().as_secs_f64(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_flag_is_shared() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_cancelled());
        flag.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_report_serializes_results_only() {
        let report = RecognitionReport {
            results: Vec::new(),
            chunks: Vec::new(),
            total_time_s: 1.5,
        };
        let json = serde_json::to_string(&report).unwrap();
        assert_eq!(json, "{\"results\":[]}");
    }
}
