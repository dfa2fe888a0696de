//! Voice transport trait and implementations.
//!
//! A [`VoiceTransport`] is whatever carries relayed frames to the voice
//! channel. The crate provides two built-in transports:
//!
//! - [`ChannelTransport`]: Hands frames to a tokio mpsc channel, e.g. the
//!   audio input of a gateway library
//! - [`WavTransport`]: Records the relayed stream to a WAV file
//!
//! Implement the trait yourself to feed a voice client directly.

mod channel;
mod file;

pub use channel::ChannelTransport;
pub use file::WavTransport;

use crate::{PcmFrame, TransportError};
use async_trait::async_trait;

/// A destination for relayed PCM frames.
///
/// # Implementation Notes
///
/// - Methods take `&self` - use interior mutability if needed
/// - `send_frame` is synchronous and called from the relay's tick; it must
///   not block for long. Return [`TransportError::Backpressure`] instead of
///   waiting for room
/// - A rejected frame stays buffered and is offered again on a later tick
/// - `on_start` runs when the transport is attached through
///   [`RelayLink::voice_ready()`](crate::RelayLink::voice_ready); an error
///   there keeps the relay disconnected
/// - `on_stop` runs when the transport is detached
///
/// # Example
///
/// ```
/// use session_relay::{PcmFrame, TransportError, VoiceTransport};
/// use async_trait::async_trait;
///
/// struct PrintTransport;
///
/// #[async_trait]
/// impl VoiceTransport for PrintTransport {
///     fn name(&self) -> &str {
///         "print"
///     }
///
///     fn send_frame(&self, frame: &PcmFrame) -> Result<(), TransportError> {
///         println!("frame #{}: {} samples", frame.sequence, frame.len());
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    /// Human-readable name for logging and events.
    fn name(&self) -> &str;

    /// Called once when the transport is attached.
    ///
    /// Default implementation does nothing.
    async fn on_start(&self) -> Result<(), TransportError> {
        Ok(())
    }

    /// Submits one frame of exactly the configured frame size.
    ///
    /// # Errors
    ///
    /// Any error leaves the frame at the head of the relay's buffer.
    fn send_frame(&self, frame: &PcmFrame) -> Result<(), TransportError>;

    /// Seconds of audio queued inside the transport but not yet played.
    ///
    /// Diagnostic only. Default implementation reports `0.0`.
    fn seconds_remaining(&self) -> f64 {
        0.0
    }

    /// Called when the transport is detached.
    ///
    /// Use this to flush buffers and close files. Default implementation
    /// does nothing.
    async fn on_stop(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingTransport {
        name: String,
        count: AtomicUsize,
    }

    impl CountingTransport {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                count: AtomicUsize::new(0),
            }
        }

        fn count(&self) -> usize {
            self.count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl VoiceTransport for CountingTransport {
        fn name(&self) -> &str {
            &self.name
        }

        fn send_frame(&self, _frame: &PcmFrame) -> Result<(), TransportError> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_transport_lifecycle_defaults() {
        let transport = CountingTransport::new("test");

        transport.on_start().await.unwrap();

        let frame = PcmFrame::new(vec![0i16; 1920], 0, 48000);
        transport.send_frame(&frame).unwrap();
        transport.send_frame(&frame).unwrap();

        assert_eq!(transport.count(), 2);
        assert_eq!(transport.seconds_remaining(), 0.0);

        transport.on_stop().await.unwrap();
    }

    #[test]
    fn test_transport_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Arc<dyn VoiceTransport>>();
    }
}
