//! Capture callback - the producer half of the relay.
//!
//! Engines invoke [`CaptureCallback::process()`] from their real-time mixing
//! thread. Everything here is bounded and non-blocking:
//! - no locks, only atomics and the SPSC ring producer
//! - no allocation
//! - no logging (problems are counted and reported by the scheduler)

use std::sync::atomic::Ordering;
use std::sync::Arc;

use ringbuf::traits::{Observer, Producer};

use crate::config::RELAY_CHANNELS;
use crate::connection::ConnectionState;
use crate::format::{db_to_linear, f32_to_pcm};
use crate::pipeline::PcmProducer;
use crate::relay::RelayState;

/// Result of one capture callback invocation, reported back to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStatus {
    /// The engine's output buffer was filled with silence.
    Silence,
    /// The block could not be captured. The output was still silenced.
    Error,
}

/// Converts engine blocks to stereo PCM and appends them to the shared buffer.
///
/// Created by [`RelayBuilder::build()`](crate::RelayBuilder::build) and handed
/// to the engine through [`MixEngine::attach_capture()`](crate::MixEngine::attach_capture).
/// There is exactly one per relay: it owns the only producer of the ring.
pub struct CaptureCallback {
    producer: PcmProducer,
    connection: Arc<ConnectionState>,
    state: Arc<RelayState>,
    gain: f32,
    sample_rate: u32,
}

impl CaptureCallback {
    pub(crate) fn new(
        producer: PcmProducer,
        connection: Arc<ConnectionState>,
        state: Arc<RelayState>,
        gain_db: f32,
        sample_rate: u32,
    ) -> Self {
        Self {
            producer,
            connection,
            state,
            gain: db_to_linear(gain_db),
            sample_rate,
        }
    }

    /// Sample rate the relay expects blocks at.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Handles one block from the engine's mixing callback.
    ///
    /// `input` holds `length` frames of `in_channels` interleaved floats.
    /// The first `length * out_channels` samples of `output` are always
    /// zeroed so the engine's own device stays silent.
    ///
    /// While connected, mono blocks are duplicated to both channels and stereo
    /// blocks are copied as-is. Any other layout is skipped and counted.
    pub fn process(
        &mut self,
        input: &[f32],
        output: &mut [f32],
        length: usize,
        in_channels: usize,
        out_channels: usize,
    ) -> CaptureStatus {
        let silenced = length.saturating_mul(out_channels).min(output.len());
        output[..silenced].fill(0.0);

        self.append(input, length, in_channels)
    }

    /// Handles one block from an engine that has no output buffer to mute,
    /// such as an input stream.
    ///
    /// The block length is derived from the slice length.
    pub fn capture_input(&mut self, input: &[f32], in_channels: usize) -> CaptureStatus {
        let length = if in_channels == 0 {
            0
        } else {
            input.len() / in_channels
        };
        self.append(input, length, in_channels)
    }

    fn append(&mut self, input: &[f32], length: usize, in_channels: usize) -> CaptureStatus {
        let before = self.connection.snapshot();
        if !before.connected {
            return CaptureStatus::Silence;
        }

        let needed_input = length.saturating_mul(in_channels);
        if !(1..=2).contains(&in_channels) || input.len() < needed_input {
            self.state.unsupported_blocks.fetch_add(1, Ordering::Relaxed);
            self.state
                .last_unsupported_channels
                .store(in_channels as u64, Ordering::Relaxed);
            return CaptureStatus::Error;
        }

        let needed = length * usize::from(RELAY_CHANNELS);
        if self.producer.vacant_len() < needed {
            // Never split a block: the interleaving must stay aligned.
            self.state
                .newest_dropped
                .fetch_add(needed as u64, Ordering::Relaxed);
            return CaptureStatus::Silence;
        }

        // push_iter advances the write index once, so the consumer sees the
        // whole block or none of it.
        let gain = self.gain;
        let block = &input[..needed_input];
        let pushed = if in_channels == 1 {
            self.producer.push_iter(block.iter().flat_map(|&sample| {
                let pcm = f32_to_pcm(sample * gain);
                [pcm, pcm]
            }))
        } else {
            self.producer
                .push_iter(block.iter().map(|&sample| f32_to_pcm(sample * gain)))
        };

        if self.connection.snapshot().generation != before.generation {
            // The block may have landed after the scheduler purged the old
            // connection's audio.
            self.state.mark_stale_commit();
        }

        self.state
            .samples_captured
            .fetch_add(pushed as u64, Ordering::Relaxed);
        CaptureStatus::Silence
    }
}

impl std::fmt::Debug for CaptureCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureCallback")
            .field("gain", &self.gain)
            .field("sample_rate", &self.sample_rate)
            .field("vacant", &self.producer.vacant_len())
            .finish_non_exhaustive()
    }
}
