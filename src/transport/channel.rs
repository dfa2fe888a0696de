//! Tokio mpsc channel transport implementation.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::transport::VoiceTransport;
use crate::{PcmFrame, TransportError};

/// A transport that hands frames to a tokio mpsc channel.
///
/// This is the usual way to connect the relay to a gateway library: a task
/// on the other end receives frames and feeds them to the voice client.
/// Sends never wait. A full channel is reported as
/// [`TransportError::Backpressure`], so the frame stays buffered in the relay
/// until the receiver catches up.
///
/// # Example
///
/// ```
/// use session_relay::{ChannelTransport, PcmFrame};
/// use tokio::sync::mpsc;
///
/// let (tx, mut rx) = mpsc::channel::<PcmFrame>(16);
/// let transport = ChannelTransport::new(tx);
///
/// // Attach with RelayLink::voice_ready(), then receive frames:
/// // while let Some(frame) = rx.recv().await { voice.send(frame.as_bytes()) }
/// ```
pub struct ChannelTransport {
    name: String,
    sender: mpsc::Sender<PcmFrame>,
    frame_size: Option<usize>,
    /// Duration of the most recently sent frame, in microseconds.
    frame_micros: AtomicU64,
}

impl ChannelTransport {
    /// Creates a new channel transport with the given sender.
    ///
    /// A capacity of a few frames is enough; the relay's own buffer absorbs
    /// short stalls.
    pub fn new(sender: mpsc::Sender<PcmFrame>) -> Self {
        Self::with_name("channel", sender)
    }

    /// Creates a new channel transport with a custom name.
    pub fn with_name(name: impl Into<String>, sender: mpsc::Sender<PcmFrame>) -> Self {
        Self {
            name: name.into(),
            sender,
            frame_size: None,
            frame_micros: AtomicU64::new(0),
        }
    }

    /// Rejects frames whose length differs from `frame_size`.
    #[must_use]
    pub fn require_frame_size(mut self, frame_size: usize) -> Self {
        self.frame_size = Some(frame_size);
        self
    }

    /// Number of frames waiting in the channel.
    pub fn queued_frames(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }
}

#[async_trait]
impl VoiceTransport for ChannelTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn on_start(&self) -> Result<(), TransportError> {
        if self.sender.is_closed() {
            return Err(TransportError::Disconnected);
        }
        Ok(())
    }

    fn send_frame(&self, frame: &PcmFrame) -> Result<(), TransportError> {
        if let Some(expected) = self.frame_size {
            if frame.len() != expected {
                return Err(TransportError::FrameSize {
                    expected,
                    actual: frame.len(),
                });
            }
        }

        match self.sender.try_send(frame.clone()) {
            Ok(()) => {
                self.frame_micros
                    .store(frame.duration().as_micros() as u64, Ordering::Relaxed);
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(TransportError::Backpressure),
            Err(TrySendError::Closed(_)) => Err(TransportError::Disconnected),
        }
    }

    fn seconds_remaining(&self) -> f64 {
        let frame_secs = self.frame_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0;
        self.queued_frames() as f64 * frame_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_transport_sends_frames() {
        let (tx, mut rx) = mpsc::channel::<PcmFrame>(10);
        let transport = ChannelTransport::new(tx);

        let frame = PcmFrame::new(vec![1, 2, 3, 4], 5, 48000);
        transport.send_frame(&frame).unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(*received.samples, vec![1, 2, 3, 4]);
        assert_eq!(received.sequence, 5);
    }

    #[tokio::test]
    async fn test_channel_transport_full_is_backpressure() {
        let (tx, _rx) = mpsc::channel::<PcmFrame>(1);
        let transport = ChannelTransport::new(tx);
        let frame = PcmFrame::new(vec![0; 4], 0, 48000);

        transport.send_frame(&frame).unwrap();
        let result = transport.send_frame(&frame);

        assert!(matches!(result, Err(TransportError::Backpressure)));
    }

    #[tokio::test]
    async fn test_channel_transport_closed() {
        let (tx, rx) = mpsc::channel::<PcmFrame>(10);
        let transport = ChannelTransport::new(tx);

        drop(rx);

        let frame = PcmFrame::new(vec![1, 2], 0, 48000);
        assert!(matches!(
            transport.send_frame(&frame),
            Err(TransportError::Disconnected)
        ));
        assert!(matches!(
            transport.on_start().await,
            Err(TransportError::Disconnected)
        ));
    }

    #[test]
    fn test_channel_transport_frame_size_check() {
        let (tx, _rx) = mpsc::channel::<PcmFrame>(10);
        let transport = ChannelTransport::new(tx).require_frame_size(1920);

        let result = transport.send_frame(&PcmFrame::new(vec![0; 100], 0, 48000));

        assert!(matches!(
            result,
            Err(TransportError::FrameSize {
                expected: 1920,
                actual: 100
            })
        ));
    }

    #[test]
    fn test_channel_transport_seconds_remaining() {
        let (tx, _rx) = mpsc::channel::<PcmFrame>(10);
        let transport = ChannelTransport::new(tx);
        assert_eq!(transport.seconds_remaining(), 0.0);

        let frame = PcmFrame::new(vec![0; 5760], 0, 48000);
        transport.send_frame(&frame).unwrap();
        transport.send_frame(&frame).unwrap();

        assert_eq!(transport.queued_frames(), 2);
        assert!((transport.seconds_remaining() - 0.12).abs() < 1e-9);
    }

    #[test]
    fn test_channel_transport_custom_name() {
        let (tx, _rx) = mpsc::channel::<PcmFrame>(10);
        let transport = ChannelTransport::with_name("voice", tx);
        assert_eq!(transport.name(), "voice");
    }
}
