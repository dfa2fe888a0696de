//! Error types for session-relay.
//!
//! Errors are split into two categories:
//! - **Fatal errors** ([`RelayError`]): Prevent the relay from starting
//! - **Recoverable errors** ([`TransportError`], [`EngineError`]): Runtime issues
//!   that the relay absorbs and surfaces via [`EventCallback`](crate::EventCallback)

use std::path::PathBuf;

/// Fatal errors that prevent a relay from being built or started.
///
/// Runtime issues (rejected frames, buffer overflow, unsupported channel
/// layouts) never surface here; they are reported through the event callback.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The relay configuration is inconsistent.
    #[error("invalid relay configuration: {reason}")]
    InvalidConfig {
        /// What is wrong with the configuration.
        reason: String,
    },

    /// No mixing engine was configured before building.
    #[error("no engine configured - call engine() before build()")]
    NoEngineConfigured,

    /// The requested audio device was not found.
    #[error("device not found: {name}")]
    DeviceNotFound {
        /// Name of the device that wasn't found.
        name: String,
    },

    /// No default input device is configured on this system.
    #[error("no default input device configured")]
    NoDefaultDevice,

    /// The device cannot deliver audio at the relay's sample rate.
    #[error("sample rate {requested}Hz not supported by device (native: {native}Hz)")]
    UnsupportedSampleRate {
        /// The sample rate the relay needs.
        requested: u32,
        /// The rate the device would deliver.
        native: u32,
    },

    /// The device's sample format cannot be captured.
    #[error("unsupported sample format: {format}")]
    UnsupportedFormat {
        /// The format that wasn't supported.
        format: String,
    },

    /// The engine already handed its capture slot to another relay.
    #[error("engine capture already attached")]
    CaptureAlreadyAttached,

    /// A transport failed while being attached.
    #[error("transport '{transport}' failed to start: {reason}")]
    TransportStartFailed {
        /// Name of the transport that failed.
        transport: String,
        /// Why it failed.
        reason: String,
    },

    /// An error from the underlying audio library (cpal).
    #[error("audio backend error: {0}")]
    BackendError(String),
}

impl RelayError {
    /// Creates an invalid configuration error with the given reason.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }
}

/// Errors a [`VoiceTransport`](crate::VoiceTransport) returns for a single frame.
///
/// These are recoverable: the scheduler keeps the frame at the head of the
/// buffer, emits [`RelayEvent::TransportRejected`] and stops draining for the
/// current tick.
///
/// [`RelayEvent::TransportRejected`]: crate::RelayEvent::TransportRejected
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The voice connection went away between the state check and the send.
    #[error("voice connection closed")]
    Disconnected,

    /// The transport's queue is full; try again next tick.
    #[error("transport backlog full")]
    Backpressure,

    /// The frame does not have the length the transport requires.
    #[error("frame has {actual} samples, transport requires {expected}")]
    FrameSize {
        /// Samples the transport expects per frame.
        expected: usize,
        /// Samples in the submitted frame.
        actual: usize,
    },

    /// File I/O error.
    #[error("file error: {path}: {source}")]
    File {
        /// Path to the file.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Custom error for user-implemented transports.
    #[error("{0}")]
    Custom(String),
}

impl TransportError {
    /// Creates a custom transport error with the given message.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    /// Creates a file error for the given path.
    pub fn file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::File {
            path: path.into(),
            source,
        }
    }
}

/// Errors a [`MixEngine`](crate::MixEngine) returns from its per-tick update.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The engine has no capture callback attached yet.
    #[error("capture callback not attached")]
    NotAttached,

    /// The engine's backend reported a failure.
    #[error("engine update failed: {0}")]
    Update(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_error_display() {
        let err = RelayError::DeviceNotFound {
            name: "Loopback".to_string(),
        };
        assert_eq!(err.to_string(), "device not found: Loopback");
    }

    #[test]
    fn test_invalid_config_helper() {
        let err = RelayError::invalid_config("frame_size must be even");
        assert_eq!(
            err.to_string(),
            "invalid relay configuration: frame_size must be even"
        );
    }

    #[test]
    fn test_unsupported_sample_rate_display() {
        let err = RelayError::UnsupportedSampleRate {
            requested: 48000,
            native: 44100,
        };
        assert!(err.to_string().contains("48000Hz"));
        assert!(err.to_string().contains("44100Hz"));
    }

    #[test]
    fn test_transport_error_frame_size() {
        let err = TransportError::FrameSize {
            expected: 5760,
            actual: 100,
        };
        assert_eq!(
            err.to_string(),
            "frame has 100 samples, transport requires 5760"
        );
    }

    #[test]
    fn test_transport_error_file() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = TransportError::file("/tmp/relay.wav", io_err);
        assert!(err.to_string().contains("/tmp/relay.wav"));
    }

    #[test]
    fn test_engine_error_display() {
        let err = EngineError::Update("bank not loaded".to_string());
        assert_eq!(err.to_string(), "engine update failed: bank not loaded");
    }
}
