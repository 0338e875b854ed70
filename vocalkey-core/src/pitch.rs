//! # Pitch Detection Module
//!
//! Fundamental-frequency estimation for a single monophonic voice.
//! The primary estimator is time-domain autocorrelation, which copes with the
//! harmonically rich waveform of the human voice far better than counting
//! zero crossings. A spectral-peak search serves as a fallback when
//! autocorrelation finds no usable period in an otherwise audible frame.
//!
//! ## Features
//! - RMS silence gate
//! - Edge trimming before correlation
//! - First-dip / global-peak period search
//! - Parabolic interpolation for sub-sample accuracy
//! - Hann-windowed spectral fallback with Gaussian sub-bin refinement

use rustfft::FftPlanner;
use serde::{Deserialize, Serialize};

use crate::audio::AudioFrame;
use crate::fft;

/// Tuning knobs for [`FrequencyEstimator`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Frames with an RMS below this level are treated as silence.
    pub silence_rms: f32,
    /// Fraction of the frame's peak amplitude used to trim the frame edges.
    pub trim_fraction: f32,
    /// Lowest accepted fundamental in Hz.
    pub min_frequency_hz: f32,
    /// Highest accepted fundamental in Hz.
    pub max_frequency_hz: f32,
    /// Run the spectral-peak search when autocorrelation finds nothing.
    pub spectral_fallback: bool,
    /// Lower edge of the spectral search band in Hz.
    pub spectral_min_hz: f32,
    /// Upper edge of the spectral search band in Hz.
    pub spectral_max_hz: f32,
    /// Minimum bin magnitude for a spectral peak to count.
    pub spectral_min_magnitude: f32,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            silence_rms: 0.01,
            trim_fraction: 0.2,
            min_frequency_hz: 50.0,
            max_frequency_hz: 1500.0,
            spectral_fallback: true,
            spectral_min_hz: 80.0,
            spectral_max_hz: 1200.0,
            spectral_min_magnitude: 0.01,
        }
    }
}

impl EstimatorConfig {
    /// Shortest period, in samples, of the highest accepted pitch.
    fn min_period(&self, sample_rate: u32) -> usize {
        (sample_rate as f32 / self.max_frequency_hz).floor() as usize
    }

    fn accepts(&self, frequency: f32) -> bool {
        frequency.is_finite()
            && frequency >= self.min_frequency_hz
            && frequency <= self.max_frequency_hz
    }
}

/// Which algorithm produced a [`PitchEstimate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EstimationMethod {
    None,
    Autocorrelation,
    SpectralPeak,
}

/// The outcome of analysing one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PitchEstimate {
    /// Estimated fundamental in Hz; `0.0` when there is no pitch.
    pub frequency_hz: f32,
    /// `false` for silence, noise or an out-of-range result.
    pub confidence: bool,
    pub method: EstimationMethod,
}

impl PitchEstimate {
    /// "No reliable pitch this frame."
    pub const fn none() -> Self {
        Self {
            frequency_hz: 0.0,
            confidence: false,
            method: EstimationMethod::None,
        }
    }

    pub fn detected(frequency_hz: f32, method: EstimationMethod) -> Self {
        Self {
            frequency_hz,
            confidence: true,
            method,
        }
    }

    /// The frequency, if this estimate can be trusted.
    pub fn frequency(&self) -> Option<f32> {
        (self.confidence && self.frequency_hz > 0.0).then_some(self.frequency_hz)
    }
}

/// Per-session pitch estimator.
///
/// Holds an FFT planner so the fallback path does not re-plan every frame.
pub struct FrequencyEstimator {
    config: EstimatorConfig,
    planner: FftPlanner<f32>,
}

impl std::fmt::Debug for FrequencyEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrequencyEstimator")
            .field("config", &self.config)
            .finish()
    }
}

impl FrequencyEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        Self {
            config,
            planner: FftPlanner::new(),
        }
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Estimates the fundamental frequency of one frame.
    ///
    /// Autocorrelation takes priority whenever it yields an in-range result.
    /// The two estimators are never averaged.
    pub fn estimate(&mut self, frame: &AudioFrame) -> PitchEstimate {
        let signal = frame.samples();
        let sample_rate = frame.sample_rate();

        if rms(signal) < self.config.silence_rms {
            return PitchEstimate::none();
        }

        // Half the frame must hold at least one period of the highest pitch.
        if signal.len() / 2 <= self.config.min_period(sample_rate) {
            return PitchEstimate::none();
        }

        if let Some(frequency) = autocorrelate(signal, sample_rate, &self.config) {
            return PitchEstimate::detected(frequency, EstimationMethod::Autocorrelation);
        }

        if self.config.spectral_fallback {
            if let Some(frequency) = spectral_peak(signal, sample_rate, &self.config, &mut self.planner) {
                return PitchEstimate::detected(frequency, EstimationMethod::SpectralPeak);
            }
        }

        PitchEstimate::none()
    }
}

/// Root-mean-square amplitude of a signal; `0.0` for an empty slice.
pub fn rms(signal: &[f32]) -> f32 {
    if signal.is_empty() {
        return 0.0;
    }
    (signal.iter().map(|&s| s * s).sum::<f32>() / signal.len() as f32).sqrt()
}

/// Trims leading and trailing samples above `fraction` of the peak.
///
/// Each end moves inward (searching at most half the frame) to the first
/// sample whose magnitude drops below the threshold, so the correlation
/// window starts and ends near a quiet point of the waveform.
fn trim_edges(signal: &[f32], fraction: f32) -> &[f32] {
    let len = signal.len();
    let peak = signal.iter().fold(0.0_f32, |acc, &s| acc.max(s.abs()));
    let threshold = peak * fraction;
    let half = len / 2;

    let start = (0..half)
        .find(|&i| signal[i].abs() < threshold)
        .unwrap_or(0);
    let end = (1..half)
        .find(|&i| signal[len - i].abs() < threshold)
        .map(|i| len - i)
        .unwrap_or(len);

    if start < end { &signal[start..end] } else { signal }
}

/// Estimates the fundamental with time-domain autocorrelation.
///
/// # Arguments
/// * `signal` - Input audio signal
/// * `sample_rate` - Sample rate in Hz
/// * `config` - Trimming fraction and accepted frequency range
///
/// # Returns
/// * `Some(frequency)` - Detected frequency in Hz inside the accepted range
/// * `None` - No periodicity found, buffer too short, or result out of range
pub fn autocorrelate(signal: &[f32], sample_rate: u32, config: &EstimatorConfig) -> Option<f32> {
    let buf = trim_edges(signal, config.trim_fraction);
    let max_lag = buf.len() / 2;

    if max_lag < 3 || max_lag <= config.min_period(sample_rate) {
        return None;
    }

    let correlation: Vec<f32> = (0..max_lag).map(|lag| lag_product(buf, lag)).collect();

    // Walk down the zero-lag peak to the first dip.
    let mut dip = 0;
    while dip + 1 < max_lag && correlation[dip] > correlation[dip + 1] {
        dip += 1;
    }
    if dip == 0 || dip + 1 >= max_lag {
        return None;
    }

    let (period, peak) = correlation[dip..]
        .iter()
        .enumerate()
        .fold((dip, f32::NEG_INFINITY), |best, (offset, &value)| {
            if value > best.1 { (dip + offset, value) } else { best }
        });

    // A period needs a positive correlation that rises into it and falls
    // after it. At the last lag the next value is computed just for the check.
    let next = correlation
        .get(period + 1)
        .copied()
        .unwrap_or_else(|| lag_product(buf, period + 1));
    if peak <= 0.0 || correlation[period - 1] > peak || next > peak {
        return None;
    }

    let frequency = sample_rate as f32 / interpolate_peak(&correlation, period);
    config.accepts(frequency).then_some(frequency)
}

/// Sum of `buf[j] * buf[j + lag]` over the full overlap.
fn lag_product(buf: &[f32], lag: usize) -> f32 {
    buf.iter().zip(&buf[lag..]).map(|(a, b)| a * b).sum()
}

/// Position of the vertex of the parabola through `values[index]` and its
/// neighbours. Without a neighbour on both sides the integer index is kept.
fn interpolate_peak(values: &[f32], index: usize) -> f32 {
    if index == 0 || index + 1 >= values.len() {
        return index as f32;
    }
    let (left, centre, right) = (values[index - 1], values[index], values[index + 1]);
    let curvature = left + right - 2.0 * centre;
    if curvature == 0.0 {
        return index as f32;
    }
    index as f32 + 0.5 * (left - right) / curvature
}

/// Finds the strongest spectral peak inside the configured search band.
///
/// The frame has to be long enough that one bin is at most half the lower
/// band edge, and the peak has to be a local maximum of the whole spectrum;
/// energy leaking in from outside the band rises toward an edge instead.
///
/// # Returns
/// * `Some(frequency)` - Refined peak frequency in Hz
/// * `None` - Frame too short, no qualifying peak, or result out of range
pub fn spectral_peak(
    signal: &[f32],
    sample_rate: u32,
    config: &EstimatorConfig,
    planner: &mut FftPlanner<f32>,
) -> Option<f32> {
    let fft_size = signal.len();
    if fft_size < 8 || fft::bin_to_frequency(1.0, fft_size, sample_rate) > config.spectral_min_hz / 2.0 {
        return None;
    }

    let magnitudes = fft::spectrum_to_magnitudes(&fft::perform_fft(signal, planner));
    let min_bin = fft::frequency_to_bin(config.spectral_min_hz, fft_size, sample_rate).max(1);
    let max_bin = fft::frequency_to_bin(config.spectral_max_hz, fft_size, sample_rate)
        .min(magnitudes.len().saturating_sub(2));
    if min_bin > max_bin {
        return None;
    }

    let peak_bin = (min_bin..=max_bin).max_by(|&a, &b| magnitudes[a].total_cmp(&magnitudes[b]))?;
    let peak = magnitudes[peak_bin];
    if peak <= config.spectral_min_magnitude
        || magnitudes[peak_bin - 1] >= peak
        || magnitudes[peak_bin + 1] > peak
    {
        return None;
    }

    let frequency = fft::bin_to_frequency(refine_bin(&magnitudes, peak_bin), fft_size, sample_rate);
    config.accepts(frequency).then_some(frequency)
}

/// Fractional bin of a spectral peak from a parabola through the log
/// magnitudes (a Gaussian fit, close to exact for a Hann main lobe).
///
/// `bin` must have a neighbour on each side. The offset is limited to half a
/// bin; degenerate shapes keep the integer bin.
fn refine_bin(magnitudes: &[f32], bin: usize) -> f32 {
    let [left, centre, right] = [bin - 1, bin, bin + 1].map(|i| magnitudes[i].ln());
    let curvature = left + right - 2.0 * centre;
    if !curvature.is_finite() || curvature.abs() < 1e-6 {
        return bin as f32;
    }
    let offset = 0.5 * (left - right) / curvature;
    bin as f32 + offset.clamp(-0.5, 0.5)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: u32 = 44_100;

    fn sine(frequency: f32, amplitude: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| {
                amplitude
                    * (2.0 * std::f32::consts::PI * frequency * i as f32 / SAMPLE_RATE as f32).sin()
            })
            .collect()
    }

    /// A voice-like tone: fundamental plus decaying harmonics.
    fn harmonic_tone(frequency: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| {
                let t = i as f32 / SAMPLE_RATE as f32;
                (1..=5)
                    .map(|h| {
                        let h = h as f32;
                        (0.4 / h) * (2.0 * std::f32::consts::PI * frequency * h * t).sin()
                    })
                    .sum()
            })
            .collect()
    }

    fn estimate(samples: Vec<f32>, config: EstimatorConfig) -> PitchEstimate {
        let frame = AudioFrame::new(samples, SAMPLE_RATE);
        FrequencyEstimator::new(config).estimate(&frame)
    }

    #[test]
    fn silent_frame_has_no_pitch() {
        let result = estimate(vec![0.0; 2048], EstimatorConfig::default());
        assert!(!result.confidence);
        assert_eq!(result.frequency(), None);
        assert_eq!(result.method, EstimationMethod::None);
    }

    #[test]
    fn quiet_frame_is_gated() {
        let result = estimate(sine(440.0, 0.005, 2048), EstimatorConfig::default());
        assert!(!result.confidence);
    }

    #[test]
    fn detects_a440_by_autocorrelation() {
        let samples = sine(440.0, 0.5, 2048);
        let result = estimate(samples.clone(), EstimatorConfig::default());
        assert!(result.confidence);
        assert_eq!(result.method, EstimationMethod::Autocorrelation);
        assert!((result.frequency_hz - 440.0).abs() < 2.0, "got {}", result.frequency_hz);

        // A valid autocorrelation result is reported as is, never blended.
        let direct = autocorrelate(&samples, SAMPLE_RATE, &EstimatorConfig::default());
        assert_eq!(Some(result.frequency_hz), direct);
    }

    #[test]
    fn detects_fundamental_of_harmonic_tone() {
        for &target in &[130.81_f32, 196.0, 261.63, 523.25] {
            let result = estimate(harmonic_tone(target, 4096), EstimatorConfig::default());
            assert!(result.confidence, "{target} Hz not detected");
            let cents = crate::tuning::calculate_cents_deviation(result.frequency_hz, target);
            assert!(cents.abs() < 20.0, "{target} Hz estimated as {}", result.frequency_hz);
        }
    }

    #[test]
    fn rejects_pitch_below_range_without_fallback() {
        let config = EstimatorConfig {
            spectral_fallback: false,
            ..EstimatorConfig::default()
        };
        // 30 Hz: period of 1470 samples, found inside an 8192-sample frame.
        let result = estimate(sine(30.0, 0.5, 8192), config);
        assert!(!result.confidence);
    }

    #[test]
    fn tones_below_range_have_no_pitch_in_a_default_frame() {
        // The true period does not fit the lag range, so the search runs off
        // the end while the correlation is still rising (or negative).
        for frequency in [30.0, 40.0] {
            let samples = sine(frequency, 0.5, 2048);
            assert_eq!(autocorrelate(&samples, SAMPLE_RATE, &EstimatorConfig::default()), None);

            let result = estimate(samples, EstimatorConfig::default());
            assert!(!result.confidence, "{frequency} Hz gave {result:?}");
        }
    }

    #[test]
    fn short_buffer_has_no_pitch() {
        for len in [40, 64, 128] {
            let result = estimate(sine(440.0, 0.5, len), EstimatorConfig::default());
            assert!(!result.confidence, "{len} samples gave {result:?}");
        }
    }

    #[test]
    fn spectral_fallback_takes_over_when_autocorrelation_fails() {
        // A large bias swamps the correlation, which then only falls with lag.
        let samples: Vec<f32> = sine(440.0, 0.03, 4096).iter().map(|s| s + 0.5).collect();
        assert_eq!(autocorrelate(&samples, SAMPLE_RATE, &EstimatorConfig::default()), None);

        let result = estimate(samples.clone(), EstimatorConfig::default());
        assert!(result.confidence);
        assert_eq!(result.method, EstimationMethod::SpectralPeak);
        assert!((result.frequency_hz - 440.0).abs() < 5.0, "got {}", result.frequency_hz);

        let config = EstimatorConfig {
            spectral_fallback: false,
            ..EstimatorConfig::default()
        };
        assert_eq!(estimate(samples, config), PitchEstimate::none());
    }

    #[test]
    fn peak_at_last_lag_uses_integer_period() {
        // Pulses every 99 samples in a 200-sample frame: lags run 0..100 and
        // the only correlation peak sits on lag 99, with no right neighbour.
        let mut samples = vec![0.0; 200];
        for i in [0, 99, 198] {
            samples[i] = 1.0;
        }
        let config = EstimatorConfig {
            trim_fraction: 0.0,
            spectral_fallback: false,
            ..EstimatorConfig::default()
        };

        let result = estimate(samples, config);
        assert_eq!(result.method, EstimationMethod::Autocorrelation);
        assert_eq!(result.frequency_hz, SAMPLE_RATE as f32 / 99.0);
    }

    #[test]
    fn parabola_vertex_needs_both_neighbours() {
        let values = [0.0, 1.0, 0.5];
        assert!((interpolate_peak(&values, 1) - 7.0 / 6.0).abs() < 1e-6);
        assert_eq!(interpolate_peak(&values, 2), 2.0);
        assert_eq!(interpolate_peak(&values, 0), 0.0);
        assert_eq!(interpolate_peak(&[1.0, 1.0, 1.0], 1), 1.0);
    }

    #[test]
    fn spectral_peak_finds_sine() {
        let signal = sine(440.0, 0.5, 4096);
        let mut planner = FftPlanner::new();
        let freq = spectral_peak(&signal, SAMPLE_RATE, &EstimatorConfig::default(), &mut planner)
            .expect("peak");
        assert!((freq - 440.0).abs() < 5.0, "got {freq}");
    }

    #[test]
    fn spectral_peak_ignores_out_of_band_energy() {
        let signal = sine(2000.0, 0.5, 4096);
        let mut planner = FftPlanner::new();
        assert_eq!(
            spectral_peak(&signal, SAMPLE_RATE, &EstimatorConfig::default(), &mut planner),
            None
        );
    }

    #[test]
    fn spectral_floor_is_an_amplitude() {
        let config = EstimatorConfig::default();
        let mut planner = FftPlanner::new();
        for len in [4096, 16384] {
            let faint = sine(440.0, 0.005, len);
            assert_eq!(spectral_peak(&faint, SAMPLE_RATE, &config, &mut planner), None, "{len}");
            let audible = sine(440.0, 0.05, len);
            assert!(spectral_peak(&audible, SAMPLE_RATE, &config, &mut planner).is_some(), "{len}");
        }
    }

    #[test]
    fn spectral_peak_needs_fine_enough_bins() {
        // 128 samples at 44.1 kHz: 345 Hz per bin.
        let signal = sine(440.0, 0.5, 128);
        let mut planner = FftPlanner::new();
        assert_eq!(
            spectral_peak(&signal, SAMPLE_RATE, &EstimatorConfig::default(), &mut planner),
            None
        );
    }

    #[test]
    fn gaussian_refinement_recovers_offset() {
        let magnitudes: Vec<f32> = (0..20).map(|i| (-(i as f32 - 10.3).powi(2)).exp()).collect();
        assert!((refine_bin(&magnitudes, 10) - 10.3).abs() < 1e-3);
    }

    #[test]
    fn trimming_loud_sine_keeps_most_of_frame() {
        let signal = sine(440.0, 0.5, 1024);
        let trimmed = trim_edges(&signal, 0.2);
        assert!(trimmed.len() > 900);
        assert!(trimmed.len() <= signal.len());
    }

    #[test]
    fn estimation_is_deterministic() {
        let samples = harmonic_tone(311.13, 2048);
        let a = estimate(samples.clone(), EstimatorConfig::default());
        let b = estimate(samples, EstimatorConfig::default());
        assert_eq!(a, b);
    }
}
