//! Runtime events for monitoring relay health.
//!
//! Events are non-fatal notifications. The relay keeps running after any of
//! them; they exist for logging and metrics, not for error handling.

use std::sync::Arc;

/// Which end of the buffer lost audio when it overflowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowSide {
    /// The scheduler trimmed the oldest samples down to the high-water mark.
    Oldest,
    /// The ring was full when the engine delivered a block; the block was dropped.
    Newest,
}

/// Runtime events emitted while relaying audio.
///
/// # Example
///
/// ```
/// use session_relay::RelayEvent;
///
/// fn handle_event(event: RelayEvent) {
///     match event {
///         RelayEvent::BufferOverflow { dropped_samples, side, .. } => {
///             eprintln!("dropped {dropped_samples} samples ({side:?})");
///         }
///         RelayEvent::TransportRejected { transport, error } => {
///             eprintln!("transport '{transport}' rejected a frame: {error}");
///         }
///         other => eprintln!("{other:?}"),
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub enum RelayEvent {
    /// A voice transport was attached and the relay started accumulating audio.
    VoiceReady {
        /// Name of the attached transport.
        transport: String,
    },

    /// The voice transport was detached.
    VoiceDisconnected {
        /// Name of the detached transport.
        transport: String,
    },

    /// Buffered audio was thrown away because it belonged to a connection
    /// that no longer exists.
    StaleAudioDiscarded {
        /// Number of samples removed from the buffer.
        discarded_samples: usize,
    },

    /// Audio was dropped because the consumer fell behind.
    BufferOverflow {
        /// Number of samples dropped.
        dropped_samples: usize,
        /// Approximate playback time dropped.
        dropped_ms: u64,
        /// Which end of the buffer lost audio.
        side: OverflowSide,
    },

    /// The engine delivered blocks whose channel layout can't be mixed to stereo.
    ///
    /// Those blocks were skipped; the engine's output was still silenced.
    UnsupportedChannelLayout {
        /// Channel count of the most recent rejected block.
        channels: usize,
        /// Number of blocks skipped since the previous report.
        blocks: u64,
    },

    /// The transport refused a frame. The frame stays buffered and the
    /// current tick stops draining.
    TransportRejected {
        /// Name of the transport.
        transport: String,
        /// Description of the error.
        error: String,
    },

    /// The engine's per-tick update failed.
    EngineError {
        /// Description of the error.
        error: String,
    },

    /// Frames sent to the transport have carried only silence for a while.
    ///
    /// Informational only; frames keep flowing.
    SignalLost {
        /// How long the sent audio has been silent.
        silent_ms: u64,
    },

    /// Non-silent frames are flowing again after [`SignalLost`].
    ///
    /// [`SignalLost`]: RelayEvent::SignalLost
    SignalResumed,

    /// The remaining buffer was flushed at stream end.
    StreamFlushed {
        /// Frames sent during the flush.
        frames: u64,
        /// Silent samples appended to complete the final frame.
        padded_samples: usize,
    },
}

/// Callback type for receiving runtime events.
///
/// Register one via [`RelayBuilder::on_event()`].
///
/// [`RelayBuilder::on_event()`]: crate::RelayBuilder::on_event
pub type EventCallback = Arc<dyn Fn(RelayEvent) + Send + Sync>;

/// Creates an [`EventCallback`] from a closure.
///
/// # Example
///
/// ```
/// use session_relay::{event_callback, RelayEvent};
///
/// let callback = event_callback(|event| {
///     println!("Got event: {:?}", event);
/// });
/// callback(RelayEvent::SignalResumed);
/// ```
pub fn event_callback<F>(f: F) -> EventCallback
where
    F: Fn(RelayEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Invokes the callback if one is registered.
pub(crate) fn emit(callback: Option<&EventCallback>, event: RelayEvent) {
    if let Some(callback) = callback {
        callback(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_relay_event_debug() {
        let event = RelayEvent::BufferOverflow {
            dropped_samples: 960,
            dropped_ms: 10,
            side: OverflowSide::Oldest,
        };
        let debug = format!("{event:?}");
        assert!(debug.contains("BufferOverflow"));
        assert!(debug.contains("Oldest"));
    }

    #[test]
    fn test_relay_event_clone() {
        let event = RelayEvent::TransportRejected {
            transport: "voice".to_string(),
            error: "voice connection closed".to_string(),
        };
        if let RelayEvent::TransportRejected { transport, error } = event.clone() {
            assert_eq!(transport, "voice");
            assert_eq!(error, "voice connection closed");
        } else {
            panic!("Expected TransportRejected variant");
        }
    }

    #[test]
    fn test_emit_without_callback_is_noop() {
        emit(None, RelayEvent::SignalResumed);
    }

    #[test]
    fn test_emit_with_callback() {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        let callback = event_callback(move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        emit(Some(&callback), RelayEvent::SignalResumed);
        emit(Some(&callback), RelayEvent::SignalLost { silent_ms: 600 });
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
