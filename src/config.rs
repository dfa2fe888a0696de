//! Configuration types for the relay.

use std::time::Duration;

use crate::RelayError;

/// Channel count of everything that enters the shared buffer.
///
/// Voice transports expect interleaved stereo, so the capture callback always
/// mixes to two channels.
pub const RELAY_CHANNELS: u16 = 2;

/// Sample rate voice transports expect.
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;

/// Ring capacity relative to the high-water mark, so the producer has room
/// between consumer ticks before it has to drop blocks.
const RING_HEADROOM_FACTOR: usize = 2;

/// High-water mark relative to the send threshold.
const HIGH_WATER_FACTOR: usize = 8;

/// Preset frame sizes for common voice transports.
///
/// A frame is the unit a transport accepts per send. Both presets describe
/// 48kHz interleaved stereo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FramePreset {
    /// 60ms frames: 5760 samples (11520 bytes). The largest raw chunk Discord
    /// voice clients accept in one call.
    #[default]
    Discord60ms,

    /// 20ms frames: 1920 samples, one Opus packet.
    Discord20ms,
}

impl FramePreset {
    /// Returns the frame size in samples (all channels).
    #[must_use]
    pub fn frame_size(&self) -> usize {
        match self {
            Self::Discord60ms => 5760,
            Self::Discord20ms => 1920,
        }
    }
}

/// Configuration for relay behavior.
///
/// Use [`RelayConfig::default()`] for Discord-compatible defaults, or
/// [`RelayConfig::from_preset()`] to size everything around another frame.
///
/// # Example
///
/// ```
/// use session_relay::RelayConfig;
/// use std::time::Duration;
///
/// let config = RelayConfig {
///     tick_interval: Duration::from_millis(10),
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Output sample rate in Hz. Default: 48000
    pub sample_rate: u32,

    /// Samples per frame handed to the transport (all channels).
    ///
    /// Default: 5760 (60ms of 48kHz stereo)
    pub frame_size: usize,

    /// Occupancy that must be exceeded before a tick starts draining.
    ///
    /// Draining stops once occupancy is at or below half of this value, or
    /// when less than one whole frame remains.
    /// Default: one frame
    pub send_threshold: usize,

    /// Occupancy above which the oldest samples are dropped.
    ///
    /// Guards against unbounded growth when ticks stall. Each drop emits a
    /// [`RelayEvent::BufferOverflow`].
    /// Default: 8x the send threshold (~480ms)
    ///
    /// [`RelayEvent::BufferOverflow`]: crate::RelayEvent::BufferOverflow
    pub high_water_mark: usize,

    /// Interval between scheduler ticks. Default: 20ms
    pub tick_interval: Duration,

    /// Gain applied to engine output before conversion, in dB. Default: 0.0
    pub gain_db: f32,

    /// Send whatever is buffered (tail padded with silence) when the relay
    /// stops while connected. Default: true
    pub flush_on_stop: bool,
}

impl RelayConfig {
    /// Creates a configuration sized around the given frame preset.
    #[must_use]
    pub fn from_preset(preset: FramePreset) -> Self {
        let frame_size = preset.frame_size();
        Self {
            frame_size,
            send_threshold: frame_size,
            high_water_mark: frame_size * HIGH_WATER_FACTOR,
            ..Self::default()
        }
    }

    /// Returns the playback duration of one frame.
    #[must_use]
    pub fn frame_duration(&self) -> Duration {
        samples_to_duration(self.frame_size, self.sample_rate)
    }

    /// Returns the capacity of the shared ring buffer in samples.
    #[must_use]
    pub fn ring_capacity(&self) -> usize {
        self.high_water_mark * RING_HEADROOM_FACTOR
    }

    /// Checks that the configuration is internally consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidConfig`] describing the first problem found.
    pub fn validate(&self) -> Result<(), RelayError> {
        let channels = usize::from(RELAY_CHANNELS);

        if self.sample_rate == 0 {
            return Err(RelayError::invalid_config("sample_rate must be non-zero"));
        }
        if self.frame_size == 0 || self.frame_size % channels != 0 {
            return Err(RelayError::invalid_config(format!(
                "frame_size must be a non-zero multiple of {channels}, got {}",
                self.frame_size
            )));
        }
        if self.send_threshold == 0 {
            return Err(RelayError::invalid_config("send_threshold must be non-zero"));
        }
        if self.high_water_mark % channels != 0 {
            return Err(RelayError::invalid_config(format!(
                "high_water_mark must be a multiple of {channels}, got {}",
                self.high_water_mark
            )));
        }
        if self.high_water_mark < self.send_threshold + self.frame_size {
            return Err(RelayError::invalid_config(format!(
                "high_water_mark ({}) must be at least send_threshold + frame_size ({})",
                self.high_water_mark,
                self.send_threshold + self.frame_size
            )));
        }
        if self.tick_interval.is_zero() {
            return Err(RelayError::invalid_config("tick_interval must be non-zero"));
        }
        if !self.gain_db.is_finite() {
            return Err(RelayError::invalid_config("gain_db must be finite"));
        }
        Ok(())
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        let frame_size = FramePreset::default().frame_size();
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            frame_size,
            send_threshold: frame_size,
            high_water_mark: frame_size * HIGH_WATER_FACTOR,
            tick_interval: Duration::from_millis(20),
            gain_db: 0.0,
            flush_on_stop: true,
        }
    }
}

/// Converts an interleaved stereo sample count to playback time.
pub(crate) fn samples_to_duration(samples: usize, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    let frames = (samples / usize::from(RELAY_CHANNELS)) as u64;
    Duration::from_nanos(frames * 1_000_000_000 / u64::from(sample_rate))
}
