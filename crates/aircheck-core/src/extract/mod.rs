//! Fingerprint extraction
//!
//! Reduces a sample buffer to a set of `(hash token, frame offset)` pairs:
//! STFT magnitude spectrogram, local-maximum peak picking, anchor/target
//! peak pairing, truncated SHA-1 tokens. The `Fingerprinter` trait is the
//! seam the rest of the engine depends on.

mod peaks;
mod spectrum;

pub use peaks::{find_peaks, Peak};
pub use spectrum::compute_spectrogram;

use sha1::{Digest, Sha1};

use crate::config::ExtractorConfig;
use crate::error::Result;
use crate::hash::HashToken;

/// A pure function from samples to time-stamped hash tokens.
///
/// Implementations must be deterministic: identical samples at an identical
/// rate yield an identical token set. Offsets are frame indices into the
/// hashed time axis, never sample indices.
pub trait Fingerprinter: Send + Sync {
    fn fingerprint(&self, samples: &[f32], sample_rate: u32) -> Result<Vec<(HashToken, i64)>>;
}

/// The spectral peak-pair fingerprinter
#[derive(Debug, Clone)]
pub struct SpectralFingerprinter {
    config: ExtractorConfig,
}

impl SpectralFingerprinter {
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    /// Pair peaks into hash tokens.
    ///
    /// Each anchor peak is combined with up to `fan_value` later peaks whose
    /// frame delta falls inside the configured window. The token digests
    /// `f1|f2|dt`, so it is invariant to absolute time; the anchor frame
    /// becomes the token offset.
    fn pair_peaks(&self, peaks: &[Peak]) -> Vec<(HashToken, i64)> {
        let mut tokens = std::collections::BTreeSet::new();

        for (i, anchor) in peaks.iter().enumerate() {
            let mut fanned = 0usize;
            for target in peaks.iter().skip(i + 1) {
                if fanned >= self.config.fan_value {
                    break;
                }

                let dt = target.time_idx as i64 - anchor.time_idx as i64;
                if dt < self.config.min_hash_time_delta {
                    continue;
                }
                if dt > self.config.max_hash_time_delta {
                    break;
                }

                let material = format!("{}|{}|{}", anchor.freq_idx, target.freq_idx, dt);
                let digest = Sha1::digest(material.as_bytes());
                let token =
                    HashToken::from_digest(digest.as_slice(), self.config.fingerprint_reduction);
                tokens.insert((token, anchor.time_idx as i64));
                fanned += 1;
            }
        }

        tokens.into_iter().collect()
    }
}

impl Fingerprinter for SpectralFingerprinter {
    fn fingerprint(&self, samples: &[f32], _sample_rate: u32) -> Result<Vec<(HashToken, i64)>> {
        let spectrogram =
            compute_spectrogram(samples, self.config.window_size, self.config.hop_size());
        if spectrogram.is_empty() {
            return Ok(Vec::new());
        }

        let mut peaks = find_peaks(
            &spectrogram,
            self.config.peak_neighborhood,
            self.config.amp_min,
        );
        if self.config.peak_sort {
            peaks.sort_by_key(|p| (p.time_idx, p.freq_idx));
        }

        Ok(self.pair_peaks(&peaks))
    }
}
