//! # Error Module
//!
//! Session-lifecycle failures. Per-frame problems (silence, noise, pitches
//! outside the supported range) are never errors; they show up as a
//! `PitchEstimate` without confidence.

/// Result alias carrying [`SessionError`].
pub type Result<T> = std::result::Result<T, SessionError>;

/// Errors surfaced when starting, stopping or configuring a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No capture backend or input device is available on this host.
    /// Retrying after the user connects a device or grants access may succeed.
    #[error("audio capture is not supported: {0}")]
    Unsupported(String),

    /// The device refused access or the stream could not be built or started.
    #[error("audio capture failed: {0}")]
    Capture(String),

    /// A configuration value is out of its valid range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Reading or writing a configuration file failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A configuration file could not be (de)serialized.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl SessionError {
    pub fn invalid_config<T: Into<String>>(msg: T) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Returns `true` for failures the user can fix and retry, such as a
    /// missing device or a denied permission.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unsupported(_) | Self::Capture(_))
    }
}
