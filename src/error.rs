//! Codec error types

use std::path::PathBuf;
use thiserror::Error;

/// Result type for codec operations
pub type Result<T> = std::result::Result<T, Ft8Error>;

/// Errors surfaced by the message codec, the FEC layer and the session objects
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Ft8Error {
    /// Text matches no message grammar or overflows a field
    #[error("Invalid message format: {0}")]
    InvalidFormat(String),

    /// The 14-bit CRC carried with the payload does not match
    #[error("Checksum mismatch")]
    ChecksumInvalid,

    /// Message type bits or a field value outside its valid range
    #[error("Unknown message variant: {0}")]
    UnknownVariant(String),

    /// LDPC decoder ran out of iterations with parity checks still failing
    #[error("LDPC decoder did not converge ({errors} parity errors left)")]
    NotConverged { errors: usize },

    /// Decode abandoned through a cancel token
    #[error("Decode cancelled")]
    Cancelled,

    /// Audio buffer could not be allocated
    #[error("Failed to allocate buffer of {samples} samples")]
    Allocation { samples: usize },

    /// Base frequency outside the audio passband
    #[error("Base frequency {0} Hz out of range")]
    InvalidFrequency(f32),

    /// Spectrum transform rejected its buffers
    #[error("FFT error: {0}")]
    Fft(String),

    /// Waterfall image could not be drawn
    #[error("Plot error: {0}")]
    Plot(String),

    /// Worker pool could not be started
    #[error("Worker pool error: {0}")]
    ThreadPool(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    ReadError(PathBuf, String),

    #[error("Failed to parse config file {0}: {1}")]
    ParseError(PathBuf, String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<rayon::ThreadPoolBuildError> for Ft8Error {
    fn from(e: rayon::ThreadPoolBuildError) -> Self {
        Ft8Error::ThreadPool(e.to_string())
    }
}
