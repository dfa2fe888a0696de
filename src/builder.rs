//! Builder pattern for [`Relay`].

use std::sync::Arc;

use crate::connection::{ConnectionState, RelayLink};
use crate::engine::MixEngine;
use crate::pipeline::{create_pcm_buffer, CaptureCallback, PlaybackScheduler};
use crate::relay::{Relay, RelayState};
use crate::{event_callback, EventCallback, FramePreset, RelayConfig, RelayError, RelayEvent};

/// Builder for configuring and constructing a relay.
///
/// Use [`Relay::builder()`] to create a new builder.
///
/// # Example
///
/// ```
/// use session_relay::{FramePreset, MockEngine, Relay};
///
/// let relay = Relay::builder()
///     .preset(FramePreset::Discord20ms)
///     .gain_db(-10.0)
///     .engine(MockEngine::new(2))
///     .build()
///     .unwrap();
///
/// assert_eq!(relay.config().frame_size, 1920);
/// ```
#[must_use]
pub struct RelayBuilder {
    config: RelayConfig,
    engine: Option<Box<dyn MixEngine>>,
    event_callback: Option<EventCallback>,
}

impl Default for RelayBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: RelayConfig::default(),
            engine: None,
            event_callback: None,
        }
    }

    /// Sizes frames, threshold and high-water mark around a preset.
    ///
    /// Keeps the sample rate, tick interval, gain and flush setting.
    pub fn preset(mut self, preset: FramePreset) -> Self {
        let sized = RelayConfig::from_preset(preset);
        self.config.frame_size = sized.frame_size;
        self.config.send_threshold = sized.send_threshold;
        self.config.high_water_mark = sized.high_water_mark;
        self
    }

    /// Set a custom relay configuration.
    pub fn config(mut self, config: RelayConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the gain applied before conversion, in dB.
    pub fn gain_db(mut self, gain_db: f32) -> Self {
        self.config.gain_db = gain_db;
        self
    }

    /// Set the engine that produces the mixed audio.
    pub fn engine<E: MixEngine + 'static>(mut self, engine: E) -> Self {
        self.engine = Some(Box::new(engine));
        self
    }

    /// Set a callback to receive runtime events.
    ///
    /// Events include voice transitions, buffer overflows, transport
    /// rejections and signal changes.
    pub fn on_event<F>(mut self, callback: F) -> Self
    where
        F: Fn(RelayEvent) + Send + Sync + 'static,
    {
        self.event_callback = Some(event_callback(callback));
        self
    }

    /// Builds the relay and attaches its capture callback to the engine.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The configuration is invalid
    /// - No engine is configured
    /// - The engine can't accept the capture callback (device format, backend errors)
    pub fn build(self) -> Result<Relay, RelayError> {
        self.config.validate()?;
        let mut engine = self.engine.ok_or(RelayError::NoEngineConfigured)?;
        let config = self.config;

        let state = Arc::new(RelayState::new());
        let connection = Arc::new(ConnectionState::new());
        let (producer, buffer) = create_pcm_buffer(config.ring_capacity());

        let capture = CaptureCallback::new(
            producer,
            Arc::clone(&connection),
            Arc::clone(&state),
            config.gain_db,
            config.sample_rate,
        );
        engine.attach_capture(capture)?;

        let scheduler = PlaybackScheduler::new(
            buffer,
            &config,
            connection.snapshot(),
            Arc::clone(&state),
            self.event_callback.clone(),
        );
        let link = RelayLink::new(connection, Arc::clone(&state), self.event_callback.clone());

        tracing::info!(
            "Relay built: engine='{}', {}Hz, frame={} samples, threshold={}, ring={}",
            engine.name(),
            config.sample_rate,
            config.frame_size,
            config.send_threshold,
            config.ring_capacity()
        );

        Ok(Relay::new(
            engine,
            scheduler,
            link,
            config,
            state,
            self.event_callback,
        ))
    }
}
