//! # Configuration Module
//!
//! All tunable parameters of a session in one serializable tree. Every section
//! falls back to its defaults, so a configuration file only needs the values
//! it changes.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use crate::audio::CaptureConfig;
use crate::error::{Result, SessionError};
use crate::matching::MatchConfig;
use crate::pitch::EstimatorConfig;
use crate::stability::GateConfig;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub capture: CaptureConfig,
    pub estimator: EstimatorConfig,
    pub gate: GateConfig,
    pub matching: MatchConfig,
}

impl SessionConfig {
    /// Checks that every value is usable before any device is touched.
    pub fn validate(&self) -> Result<()> {
        let capture = &self.capture;
        if capture.sample_rate == 0 {
            return Err(SessionError::invalid_config("capture.sample_rate must be positive"));
        }
        if capture.frame_size < 64 {
            return Err(SessionError::invalid_config("capture.frame_size must be at least 64"));
        }
        if capture.hop_size == 0 || capture.hop_size > capture.frame_size {
            return Err(SessionError::invalid_config(
                "capture.hop_size must be between 1 and capture.frame_size",
            ));
        }
        if capture.channel_capacity == 0 {
            return Err(SessionError::invalid_config("capture.channel_capacity must be positive"));
        }

        let estimator = &self.estimator;
        if estimator.silence_rms.is_nan() || estimator.silence_rms < 0.0 {
            return Err(SessionError::invalid_config("estimator.silence_rms must not be negative"));
        }
        if !(0.0..1.0).contains(&estimator.trim_fraction) {
            return Err(SessionError::invalid_config("estimator.trim_fraction must be in [0, 1)"));
        }
        if !(estimator.min_frequency_hz > 0.0 && estimator.min_frequency_hz < estimator.max_frequency_hz) {
            return Err(SessionError::invalid_config(
                "estimator frequency range must satisfy 0 < min < max",
            ));
        }
        if estimator.spectral_fallback
            && !(estimator.spectral_min_hz > 0.0 && estimator.spectral_min_hz < estimator.spectral_max_hz)
        {
            return Err(SessionError::invalid_config(
                "estimator spectral band must satisfy 0 < min < max",
            ));
        }

        if self.gate.lock_threshold == 0 {
            return Err(SessionError::invalid_config("gate.lock_threshold must be positive"));
        }
        if !(self.matching.tolerance_cents > 0.0 && self.matching.tolerance_cents <= 50.0) {
            return Err(SessionError::invalid_config("matching.tolerance_cents must be in (0, 50]"));
        }
        Ok(())
    }
}

/// Saves a session configuration to a JSON file.
///
/// # Arguments
/// * `config` - The configuration to save
/// * `path` - Destination file, e.g. "vocalkey.json"
pub fn save_config(config: &SessionConfig, path: impl AsRef<Path>) -> Result<()> {
    let json_string = serde_json::to_string_pretty(config)?;
    let mut file = File::create(path)?;
    file.write_all(json_string.as_bytes())?;
    Ok(())
}

/// Loads and validates a session configuration from a JSON file.
///
/// Missing fields take their default values.
pub fn load_config(path: impl AsRef<Path>) -> Result<SessionConfig> {
    let mut file = File::open(path)?;
    let mut data = String::new();
    file.read_to_string(&mut data)?;
    let config: SessionConfig = serde_json::from_str(&data)?;
    config.validate()?;
    Ok(config)
}
