//! Error types for the reverb engine's non-real-time setup paths.
//!
//! `process()` itself never returns a `Result` — invalid host input falls
//! back to passing audio through unmodified rather than surfacing an
//! error on the audio thread. These types cover the paths that run
//! before any audio flows: engine initialization and IR-bank loading.

use std::fmt;

/// Error produced while (re)configuring the engine or loading an impulse
/// response, i.e. never on the audio thread itself.
#[derive(Debug)]
pub enum ReverbError {
    /// The requested engine configuration was rejected (e.g. an
    /// impulse response padded length did not land on a stage boundary).
    InvalidConfig(String),
    /// An impulse response was shorter than the engine can convolve with.
    IrTooShort { len: usize, min_len: usize },
    /// The IR-update worker thread could not be spawned.
    WorkerSpawn(std::io::Error),
    /// Failed to read a WAV file while building an impulse-response bank.
    IoError(std::io::Error),
    /// Failed to decode a WAV file while building an impulse-response bank.
    WavDecode(String),
}

impl fmt::Display for ReverbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReverbError::InvalidConfig(msg) => write!(f, "invalid engine configuration: {msg}"),
            ReverbError::IrTooShort { len, min_len } => write!(
                f,
                "impulse response too short: {len} samples, minimum is {min_len}"
            ),
            ReverbError::WorkerSpawn(e) => write!(f, "failed to spawn worker thread: {e}"),
            ReverbError::IoError(e) => write!(f, "IO error: {e}"),
            ReverbError::WavDecode(msg) => write!(f, "failed to decode WAV: {msg}"),
        }
    }
}

impl std::error::Error for ReverbError {}

impl From<std::io::Error> for ReverbError {
    fn from(e: std::io::Error) -> Self {
        ReverbError::IoError(e)
    }
}

impl From<hound::Error> for ReverbError {
    fn from(e: hound::Error) -> Self {
        match e {
            hound::Error::IoError(io) => ReverbError::IoError(io),
            other => ReverbError::WavDecode(other.to_string()),
        }
    }
}

pub type ReverbResult<T> = Result<T, ReverbError>;
