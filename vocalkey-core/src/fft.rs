//! # Fast Fourier Transform (FFT) Module
//!
//! Frequency-domain helpers for the spectral-peak fallback estimator.
//!
//! Frames are mean-removed and Hann-tapered before the transform, and
//! magnitudes come back in the same units as sample amplitude.

use rustfft::{num_complex::Complex, FftPlanner};

/// Subtracts the mean so a microphone bias does not land in bin 0.
fn remove_mean(samples: &mut [f32]) {
    if samples.is_empty() {
        return;
    }
    let mean = samples.iter().sum::<f32>() / samples.len() as f32;
    samples.iter_mut().for_each(|s| *s -= mean);
}

/// Tapers both ends of the frame to zero with a Hann window.
fn taper(samples: &mut [f32]) {
    let last = samples.len().saturating_sub(1);
    if last == 0 {
        return;
    }
    let step = 2.0 * std::f32::consts::PI / last as f32;
    for (i, s) in samples.iter_mut().enumerate() {
        *s *= 0.5 - 0.5 * (step * i as f32).cos();
    }
}

/// Forward FFT of a mean-removed, Hann-tapered copy of `signal`.
///
/// Any length works; `planner` caches plans across frames of one size.
pub fn perform_fft(signal: &[f32], planner: &mut FftPlanner<f32>) -> Vec<Complex<f32>> {
    let mut samples = signal.to_vec();
    remove_mean(&mut samples);
    taper(&mut samples);

    let mut spectrum: Vec<Complex<f32>> = samples.into_iter().map(|re| Complex::new(re, 0.0)).collect();
    planner.plan_fft_forward(spectrum.len()).process(&mut spectrum);
    spectrum
}

/// Magnitudes of the bins below Nyquist, in amplitude units.
///
/// Scaled by `4 / N` (single-sided spectrum, Hann coherent gain of one half),
/// so a sine of amplitude `a` peaks near `a` whatever the frame length.
pub fn spectrum_to_magnitudes(spectrum: &[Complex<f32>]) -> Vec<f32> {
    let scale = 4.0 / spectrum.len().max(1) as f32;
    spectrum[..spectrum.len() / 2]
        .iter()
        .map(|c| c.norm() * scale)
        .collect()
}

/// Center frequency of an FFT bin.
pub fn bin_to_frequency(bin: f32, fft_size: usize, sample_rate: u32) -> f32 {
    bin * sample_rate as f32 / fft_size as f32
}

/// Nearest FFT bin for a frequency, rounded down.
pub fn frequency_to_bin(frequency: f32, fft_size: usize, sample_rate: u32) -> usize {
    (frequency * fft_size as f32 / sample_rate as f32).floor().max(0.0) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sine_peaks_in_expected_bin() {
        let sample_rate = 8_000;
        let size = 1024;
        // 500 Hz lands exactly on bin 64.
        let signal: Vec<f32> = (0..size)
            .map(|i| (2.0 * std::f32::consts::PI * 500.0 * i as f32 / sample_rate as f32).sin())
            .collect();

        let mut planner = FftPlanner::new();
        let magnitudes = spectrum_to_magnitudes(&perform_fft(&signal, &mut planner));
        assert_eq!(magnitudes.len(), size / 2);

        let (peak, _) = magnitudes
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .unwrap();
        assert_eq!(peak, 64);
        assert_eq!(frequency_to_bin(500.0, size, sample_rate), 64);
        assert!((bin_to_frequency(64.0, size, sample_rate) - 500.0).abs() < 1e-3);
    }

    #[test]
    fn magnitudes_do_not_depend_on_frame_length() {
        let sample_rate = 8_000;
        let mut planner = FftPlanner::new();
        for size in [512, 2048, 8192] {
            // 500 Hz sits on a bin centre for every size here.
            let signal: Vec<f32> = (0..size)
                .map(|i| 0.25 * (2.0 * std::f32::consts::PI * 500.0 * i as f32 / sample_rate as f32).sin())
                .collect();
            let magnitudes = spectrum_to_magnitudes(&perform_fft(&signal, &mut planner));
            let peak = magnitudes[frequency_to_bin(500.0, size, sample_rate)];
            assert!((peak - 0.25).abs() < 0.01, "size {size}: {peak}");
        }
    }

    #[test]
    fn constant_signal_has_no_dc_peak() {
        let signal = vec![0.3_f32; 256];
        let mut planner = FftPlanner::new();
        let magnitudes = spectrum_to_magnitudes(&perform_fft(&signal, &mut planner));
        assert!(magnitudes.iter().all(|&m| m < 1e-3));
    }
}
