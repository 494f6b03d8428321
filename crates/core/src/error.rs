/// Result alias that carries the custom [`SequenceError`] type.
pub type Result<T> = std::result::Result<T, SequenceError>;

/// Common error type for the core crate.
///
/// None of these ever reach the end user: sequences are decorative, so every
/// caller either recovers locally (silent audio, degraded driver) or logs.
#[derive(Debug, thiserror::Error)]
pub enum SequenceError {
    /// Free-form message for failures without a dedicated variant.
    #[error("{0}")]
    Message(String),
    /// The audio context could not be created (no gesture yet, no device).
    #[error("audio unavailable: {0}")]
    AudioUnavailable(String),
    /// No rendering surface could be obtained for frame registration.
    #[error("rendering surface unavailable: {0}")]
    SurfaceUnavailable(String),
    /// An operation was attempted on an audio context that is already closed.
    #[error("audio context is closed")]
    ContextClosed,
    /// Caller supplied data that cannot be processed.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// Configuration could not be interpreted.
    #[error("config: {0}")]
    Config(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// JSON (de)serialisation failure.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    /// FFT planning or processing failure in the analysis probe.
    #[error("fft: {0}")]
    Fft(String),
}

impl SequenceError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for SequenceError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for SequenceError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

impl From<realfft::FftError> for SequenceError {
    fn from(value: realfft::FftError) -> Self {
        Self::Fft(value.to_string())
    }
}
