//! STFT magnitude spectrogram

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use std::f32::consts::PI;

fn hann_window(window_size: usize) -> Vec<f32> {
    if window_size <= 1 {
        return vec![1.0; window_size];
    }
    (0..window_size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / (window_size - 1) as f32).cos()))
        .collect()
}

/// Compute a Hann-windowed magnitude spectrogram in dB.
///
/// Returns one row per frame, `window_size / 2 + 1` bins per row. Input
/// shorter than one window yields no frames.
pub fn compute_spectrogram(samples: &[f32], window_size: usize, hop_size: usize) -> Vec<Vec<f32>> {
    if samples.len() < window_size || window_size == 0 || hop_size == 0 {
        return vec![];
    }

    let num_frames = (samples.len() - window_size) / hop_size + 1;
    let num_bins = window_size / 2 + 1;

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(window_size);
    let window_values = hann_window(window_size);

    let mut buffer: Vec<Complex<f32>> = vec![Complex::new(0.0, 0.0); window_size];
    let mut spectrogram: Vec<Vec<f32>> = Vec::with_capacity(num_frames);

    for frame in 0..num_frames {
        let start = frame * hop_size;
        for (j, sample) in samples[start..start + window_size].iter().enumerate() {
            buffer[j] = Complex::new(*sample * window_values[j], 0.0);
        }

        fft.process(&mut buffer);

        let mut magnitudes = Vec::with_capacity(num_bins);
        for bin in buffer.iter().take(num_bins) {
            // dB relative to unit amplitude, floored to keep log finite
            magnitudes.push(20.0 * bin.norm().max(1e-10).log10());
        }
        spectrogram.push(magnitudes);
    }

    spectrogram
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_too_short_input_yields_empty() {
        assert!(compute_spectrogram(&[0.0; 100], 4096, 2048).is_empty());
    }

    #[test]
    fn test_frame_and_bin_counts() {
        let samples = vec![0.0f32; 4096 + 3 * 2048];
        let spec = compute_spectrogram(&samples, 4096, 2048);
        assert_eq!(spec.len(), 4);
        assert_eq!(spec[0].len(), 2049);
    }

    #[test]
    fn test_tone_concentrates_energy_in_bin() {
        let sample_rate = 44_100f32;
        let freq = 1000.0f32;
        let samples: Vec<f32> = (0..8192)
            .map(|i| (2.0 * PI * freq * i as f32 / sample_rate).sin())
            .collect();

        let spec = compute_spectrogram(&samples, 4096, 2048);
        let expected_bin = (freq / sample_rate * 4096.0).round() as usize;
        let frame = &spec[0];

        let loudest = frame
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| i)
            .unwrap_or(0);
        assert!((loudest as i64 - expected_bin as i64).abs() <= 1);
    }
}
