//! Audio decoding for multiple formats

use super::{resample_to_target, AudioFormat};
use std::path::Path;

use crate::error::{EngineError, Result};

/// Decoded audio, one sample buffer per channel
#[derive(Debug, Clone, PartialEq)]
pub struct AudioData {
    pub channels: Vec<Vec<f32>>,
    pub sample_rate: u32,
    pub duration_ms: u64,
}

impl AudioData {
    /// Wrap a single mono channel
    pub fn from_mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        let duration_ms = (samples.len() as f64 / sample_rate as f64 * 1000.0) as u64;
        Self {
            channels: vec![samples],
            sample_rate,
            duration_ms,
        }
    }

    /// Samples per channel
    pub fn len_samples(&self) -> usize {
        self.channels.first().map(|c| c.len()).unwrap_or(0)
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn duration_s(&self) -> f64 {
        self.duration_ms as f64 / 1000.0
    }
}

/// Decode an audio file and resample every channel to the target rate
pub fn decode_audio(path: &Path, target_sample_rate: u32) -> Result<AudioData> {
    if !path.exists() {
        return Err(EngineError::Decode(format!(
            "audio file not found: {}",
            path.display()
        )));
    }

    let format = AudioFormat::from_path(path);
    let (interleaved, sample_rate, num_channels) = match format {
        AudioFormat::Wav => decode_wav(path)?,
        AudioFormat::Mp3 => decode_mp3(path)?,
        AudioFormat::Flac => decode_flac(path)?,
        AudioFormat::Ogg => decode_ogg(path)?,
        AudioFormat::Unknown => {
            return Err(EngineError::Decode(format!(
                "unsupported audio format: {}",
                path.display()
            )));
        }
    };

    if num_channels == 0 {
        return Err(EngineError::Decode(format!(
            "no audio channels in {}",
            path.display()
        )));
    }

    let mut channels = deinterleave(&interleaved, num_channels);
    if sample_rate != target_sample_rate {
        channels = channels
            .iter()
            .map(|ch| resample_to_target(ch, sample_rate, target_sample_rate))
            .collect();
    }

    let duration_ms = channels
        .first()
        .map(|ch| (ch.len() as f64 / target_sample_rate as f64 * 1000.0) as u64)
        .unwrap_or(0);

    Ok(AudioData {
        channels,
        sample_rate: target_sample_rate,
        duration_ms,
    })
}

fn deinterleave(samples: &[f32], num_channels: usize) -> Vec<Vec<f32>> {
    let per_channel = samples.len() / num_channels;
    let mut channels = vec![Vec::with_capacity(per_channel); num_channels];
    for frame in samples.chunks_exact(num_channels) {
        for (ch, &sample) in channels.iter_mut().zip(frame.iter()) {
            ch.push(sample);
        }
    }
    channels
}

/// Decode WAV file
fn decode_wav(path: &Path) -> Result<(Vec<f32>, u32, usize)> {
    let mut reader = hound::WavReader::open(path)
        .map_err(|e| EngineError::Decode(format!("{}: {}", path.display(), e)))?;

    let spec = reader.spec();
    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| EngineError::Decode(e.to_string()))?,
        hound::SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| EngineError::Decode(e.to_string()))?
        }
    };

    Ok((samples, spec.sample_rate, spec.channels as usize))
}

/// Decode MP3 file
fn decode_mp3(path: &Path) -> Result<(Vec<f32>, u32, usize)> {
    let data = std::fs::read(path)?;

    let mut decoder = minimp3::Decoder::new(&data[..]);
    let mut samples = Vec::new();
    let mut sample_rate = 0;
    let mut channels = 0;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if sample_rate == 0 {
                    sample_rate = frame.sample_rate as u32;
                    channels = frame.channels;
                }
                for &sample in &frame.data {
                    samples.push(sample as f32 / 32768.0);
                }
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(EngineError::Decode(format!("mp3 decode error: {}", e))),
        }
    }

    if sample_rate == 0 {
        return Err(EngineError::Decode(format!(
            "no mp3 frames in {}",
            path.display()
        )));
    }

    Ok((samples, sample_rate, channels))
}

/// Decode FLAC file
fn decode_flac(path: &Path) -> Result<(Vec<f32>, u32, usize)> {
    let mut reader = claxon::FlacReader::open(path)
        .map_err(|e| EngineError::Decode(format!("{}: {}", path.display(), e)))?;

    let info = reader.streaminfo();
    let sample_rate = info.sample_rate;
    let channels = info.channels as usize;
    let max_val = (1i64 << (info.bits_per_sample - 1)) as f32;

    let samples: Vec<f32> = reader
        .samples()
        .map(|s| s.map(|v| v as f32 / max_val))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| EngineError::Decode(e.to_string()))?;

    Ok((samples, sample_rate, channels))
}

/// Decode OGG Vorbis file
fn decode_ogg(path: &Path) -> Result<(Vec<f32>, u32, usize)> {
    let file = std::fs::File::open(path)?;

    let mut reader = lewton::inside_ogg::OggStreamReader::new(file)
        .map_err(|e| EngineError::Decode(format!("{}: {}", path.display(), e)))?;

    let sample_rate = reader.ident_hdr.audio_sample_rate;
    let channels = reader.ident_hdr.audio_channels as usize;

    let mut samples = Vec::new();
    loop {
        match reader.read_dec_packet_itl() {
            Ok(Some(packet)) => {
                for &sample in &packet {
                    samples.push(sample as f32 / 32768.0);
                }
            }
            Ok(None) => break,
            Err(e) => return Err(EngineError::Decode(format!("ogg decode error: {}", e))),
        }
    }

    Ok((samples, sample_rate, channels))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deinterleave_stereo() {
        let interleaved = vec![0.0, 1.0, 0.1, 1.1, 0.2, 1.2];
        let channels = deinterleave(&interleaved, 2);
        assert_eq!(channels[0], vec![0.0, 0.1, 0.2]);
        assert_eq!(channels[1], vec![1.0, 1.1, 1.2]);
    }

    #[test]
    fn test_from_mono_duration() {
        let audio = AudioData::from_mono(vec![0.0; 44_100], 44_100);
        assert_eq!(audio.duration_ms, 1000);
        assert_eq!(audio.num_channels(), 1);
        assert_eq!(audio.len_samples(), 44_100);
    }

    #[test]
    fn test_decode_missing_file() {
        let err = decode_audio(Path::new("/nonexistent/file.wav"), 44_100).unwrap_err();
        assert!(matches!(err, EngineError::Decode(_)));
    }
}
