//! Fixed-size PCM frame handed to voice transports.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{samples_to_duration, RELAY_CHANNELS};

/// One transport-sized slice of the shared PCM buffer.
///
/// Frames are interleaved stereo. During normal operation every frame holds
/// exactly the configured frame size; only the final frame flushed at stream
/// end is padded with silence to reach that size.
///
/// Samples are stored in an `Arc<Vec<i16>>` so a transport can keep or
/// forward the frame without copying.
///
/// # Example
///
/// ```
/// use session_relay::PcmFrame;
/// use std::time::Duration;
///
/// let frame = PcmFrame::new(vec![0i16; 5760], 0, 48000);
/// assert_eq!(frame.duration(), Duration::from_millis(60));
/// assert_eq!(frame.as_bytes().len(), 11520);
/// ```
#[derive(Debug, Clone)]
pub struct PcmFrame {
    /// Interleaved stereo samples.
    pub samples: Arc<Vec<i16>>,

    /// Position of this frame in the stream sent to the current connection.
    pub sequence: u64,

    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl PcmFrame {
    /// Creates a new frame.
    pub fn new(samples: Vec<i16>, sequence: u64, sample_rate: u32) -> Self {
        Self {
            samples: Arc::new(samples),
            sequence,
            sample_rate,
        }
    }

    /// Number of channels in the frame. Always stereo.
    pub fn channels(&self) -> u16 {
        RELAY_CHANNELS
    }

    /// Number of samples across all channels.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns `true` if this frame contains no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Returns the playback duration of this frame.
    pub fn duration(&self) -> Duration {
        samples_to_duration(self.samples.len(), self.sample_rate)
    }

    /// Returns `true` if any sample is non-zero.
    pub fn has_signal(&self) -> bool {
        self.samples.iter().any(|&s| s != 0)
    }

    /// Returns the samples as little-endian bytes, the layout raw voice
    /// sends expect.
    pub fn as_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }
}
