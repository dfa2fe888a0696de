//! Mock engine for testing without hardware.

use crate::engine::MixEngine;
use crate::pipeline::{CaptureCallback, CaptureStatus};
use crate::{EngineError, RelayError};

/// Output channel count the mock engine's mixer pretends to drive.
const MOCK_OUTPUT_CHANNELS: usize = 2;

/// What the mock engine renders.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockSignal {
    /// All-zero blocks.
    Silence,
    /// A sine tone, identical on every channel.
    Sine {
        /// Tone frequency in Hz.
        frequency: f32,
        /// Peak amplitude, where 1.0 is full scale.
        amplitude: f32,
    },
    /// Every sample holds the same value.
    Constant(f32),
}

/// An engine that renders synthetic blocks into the capture callback.
///
/// Each call to [`update()`](MixEngine::update) renders `frames_per_update`
/// frames, split into blocks of at most `block_frames`, exactly like a mixer
/// thread delivering one tick's worth of audio. Output buffers are pre-filled
/// with `1.0` so tests can check the callback silenced them.
///
/// # Example
///
/// ```
/// use session_relay::{MockEngine, MockSignal};
///
/// let engine = MockEngine::new(1)
///     .with_signal(MockSignal::Sine { frequency: 440.0, amplitude: 0.5 })
///     .with_frames_per_update(960);
/// ```
pub struct MockEngine {
    channels: usize,
    block_frames: usize,
    frames_per_update: usize,
    signal: MockSignal,
    capture: Option<CaptureCallback>,
    sample_rate: u32,
    position: u64,
    input: Vec<f32>,
    output: Vec<f32>,
    last_status: Option<CaptureStatus>,
    blocks_rendered: u64,
}

impl MockEngine {
    /// Creates a mock engine rendering `channels` interleaved channels.
    ///
    /// Defaults: silence, 480-frame blocks, 960 frames (20ms at 48kHz) per update.
    pub fn new(channels: usize) -> Self {
        Self {
            channels,
            block_frames: 480,
            frames_per_update: 960,
            signal: MockSignal::Silence,
            capture: None,
            sample_rate: 0,
            position: 0,
            input: Vec::new(),
            output: Vec::new(),
            last_status: None,
            blocks_rendered: 0,
        }
    }

    /// Sets the rendered signal.
    #[must_use]
    pub fn with_signal(mut self, signal: MockSignal) -> Self {
        self.signal = signal;
        self
    }

    /// Sets the largest block handed to the capture callback at once.
    #[must_use]
    pub fn with_block_frames(mut self, frames: usize) -> Self {
        self.block_frames = frames.max(1);
        self
    }

    /// Sets how many frames each update renders.
    #[must_use]
    pub fn with_frames_per_update(mut self, frames: usize) -> Self {
        self.frames_per_update = frames;
        self
    }

    /// Returns the channel count.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Status the capture callback returned for the most recent block.
    pub fn last_status(&self) -> Option<CaptureStatus> {
        self.last_status
    }

    /// Output buffer of the most recent block, as the callback left it.
    pub fn last_output(&self) -> &[f32] {
        &self.output
    }

    /// Number of blocks rendered so far.
    pub fn blocks_rendered(&self) -> u64 {
        self.blocks_rendered
    }

    /// Renders a single block of `frames` frames.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotAttached`] if no capture callback is installed.
    pub fn render_block(&mut self, frames: usize) -> Result<CaptureStatus, EngineError> {
        let capture = self.capture.as_mut().ok_or(EngineError::NotAttached)?;

        self.input.clear();
        for i in 0..frames {
            let value = sample_at(self.signal, self.position + i as u64, self.sample_rate);
            for _ in 0..self.channels {
                self.input.push(value);
            }
        }
        self.output.clear();
        self.output.resize(frames * MOCK_OUTPUT_CHANNELS, 1.0);

        let status = capture.process(
            &self.input,
            &mut self.output,
            frames,
            self.channels,
            MOCK_OUTPUT_CHANNELS,
        );

        self.position += frames as u64;
        self.blocks_rendered += 1;
        self.last_status = Some(status);
        Ok(status)
    }
}

fn sample_at(signal: MockSignal, position: u64, sample_rate: u32) -> f32 {
    match signal {
        MockSignal::Silence => 0.0,
        MockSignal::Constant(value) => value,
        MockSignal::Sine {
            frequency,
            amplitude,
        } => {
            if sample_rate == 0 {
                return 0.0;
            }
            let t = position as f64 / f64::from(sample_rate);
            let phase = 2.0 * std::f64::consts::PI * f64::from(frequency) * t;
            (phase.sin() * f64::from(amplitude)) as f32
        }
    }
}

impl MixEngine for MockEngine {
    fn name(&self) -> &str {
        "mock"
    }

    fn attach_capture(&mut self, capture: CaptureCallback) -> Result<(), RelayError> {
        if self.capture.is_some() {
            return Err(RelayError::CaptureAlreadyAttached);
        }
        self.sample_rate = capture.sample_rate();
        self.capture = Some(capture);
        Ok(())
    }

    fn update(&mut self) -> Result<(), EngineError> {
        let mut remaining = self.frames_per_update;
        while remaining > 0 {
            let frames = remaining.min(self.block_frames);
            self.render_block(frames)?;
            remaining -= frames;
        }
        Ok(())
    }
}
