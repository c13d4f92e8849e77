//! Error types.

use thiserror::Error;

/// An audio source could not be acquired.
///
/// Acquisition failures are never retried automatically. The source stays
/// unregistered and feature reads for its id return a silent snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AcquireError {
    /// The user or platform refused access to the capture device.
    #[error("permission to use the capture device was denied")]
    PermissionDenied,
    /// No usable capture device.
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),
    /// The file could not be decoded into audio.
    #[error("could not decode audio: {0}")]
    Decode(String),
    /// The audio backend failed for another reason.
    #[error("audio backend error: {0}")]
    Backend(String),
    /// The engine was disposed with `release_all`.
    #[error("audio engine has been disposed")]
    Disposed,
}

/// A preset document could not be loaded.
#[derive(Debug, Error)]
pub enum PresetError {
    #[error("invalid preset document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("preset \"{0}\" has no output node")]
    NoOutput(String),
}
