//! The relay context and its statistics.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::builder::RelayBuilder;
use crate::connection::RelayLink;
use crate::engine::MixEngine;
use crate::event::{emit, EventCallback};
use crate::pipeline::{PlaybackScheduler, TickReport};
use crate::{RelayConfig, RelayEvent};

/// Statistics about a relay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Samples appended to the buffer by the capture callback.
    pub samples_captured: u64,
    /// Samples handed to transports.
    pub samples_sent: u64,
    /// Frames handed to transports.
    pub frames_sent: u64,
    /// Samples dropped at the high-water mark.
    pub oldest_dropped: u64,
    /// Samples dropped because the ring was full when the engine delivered them.
    pub newest_dropped: u64,
    /// Engine blocks skipped for their channel layout.
    pub unsupported_blocks: u64,
    /// Frames a transport refused.
    pub rejected_frames: u64,
    /// Samples discarded because their connection went away.
    pub stale_discarded: u64,
    /// Samples buffered at the end of the last tick.
    pub occupancy: u64,
    /// Scheduler ticks run.
    pub ticks: u64,
}

/// Counters shared between the capture callback, the scheduler and the link.
///
/// The capture callback only ever touches these with relaxed atomic adds.
pub(crate) struct RelayState {
    pub samples_captured: AtomicU64,
    pub newest_dropped: AtomicU64,
    pub unsupported_blocks: AtomicU64,
    pub last_unsupported_channels: AtomicU64,
    pub samples_sent: AtomicU64,
    pub frames_sent: AtomicU64,
    pub oldest_dropped: AtomicU64,
    pub rejections: AtomicU64,
    pub stale_discarded: AtomicU64,
    pub occupancy: AtomicU64,
    pub ticks: AtomicU64,
    /// Set when a block was committed across a connection transition.
    stale_commit: AtomicBool,
}

impl RelayState {
    pub fn new() -> Self {
        Self {
            samples_captured: AtomicU64::new(0),
            newest_dropped: AtomicU64::new(0),
            unsupported_blocks: AtomicU64::new(0),
            last_unsupported_channels: AtomicU64::new(0),
            samples_sent: AtomicU64::new(0),
            frames_sent: AtomicU64::new(0),
            oldest_dropped: AtomicU64::new(0),
            rejections: AtomicU64::new(0),
            stale_discarded: AtomicU64::new(0),
            occupancy: AtomicU64::new(0),
            ticks: AtomicU64::new(0),
            stale_commit: AtomicBool::new(false),
        }
    }

    /// Records that a block committed while the connection changed under it.
    #[inline]
    pub fn mark_stale_commit(&self) {
        self.stale_commit.store(true, Ordering::Release);
    }

    /// Clears the stale-commit marker, returning whether it was set.
    ///
    /// Call before discarding: every block marked before this returns is
    /// already visible to the consumer.
    pub fn take_stale_commit(&self) -> bool {
        self.stale_commit.swap(false, Ordering::AcqRel)
    }

    pub fn snapshot(&self) -> RelayStats {
        RelayStats {
            samples_captured: self.samples_captured.load(Ordering::Relaxed),
            samples_sent: self.samples_sent.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            oldest_dropped: self.oldest_dropped.load(Ordering::Relaxed),
            newest_dropped: self.newest_dropped.load(Ordering::Relaxed),
            unsupported_blocks: self.unsupported_blocks.load(Ordering::Relaxed),
            rejected_frames: self.rejections.load(Ordering::Relaxed),
            stale_discarded: self.stale_discarded.load(Ordering::Relaxed),
            occupancy: self.occupancy.load(Ordering::Relaxed),
            ticks: self.ticks.load(Ordering::Relaxed),
        }
    }
}

/// A running audio relay.
///
/// Owns the mixing engine, the consumer half of the shared buffer and the
/// playback scheduler. Created by [`Relay::builder()`]. Voice lifecycle
/// handlers talk to it through the cloneable [`RelayLink`] returned by
/// [`link()`](Relay::link).
///
/// # Lifecycle
///
/// 1. Built with [`RelayBuilder::build()`]; the engine's capture callback is
///    attached but nothing is buffered until a transport is ready
/// 2. [`run()`](Relay::run) ticks until [`RelayLink::request_exit()`] is called,
///    or the caller drives [`tick()`](Relay::tick) itself
/// 3. [`shutdown()`](Relay::shutdown) flushes the tail, detaches the transport
///    and releases the engine
///
/// # Example
///
/// ```ignore
/// let relay = Relay::builder()
///     .engine(DeviceEngine::open_by_name("Mixer Loopback")?)
///     .on_event(|event| tracing::debug!(?event))
///     .build()?;
///
/// let link = relay.link();
/// tokio::spawn(async move {
///     // gateway event loop calls link.voice_ready(..) / link.voice_disconnect()
/// });
///
/// let stats = relay.run().await;
/// ```
pub struct Relay {
    engine: Box<dyn MixEngine>,
    scheduler: PlaybackScheduler,
    link: RelayLink,
    config: RelayConfig,
    state: Arc<RelayState>,
    event_callback: Option<EventCallback>,
}

impl Relay {
    /// Creates a new builder for configuring a relay.
    pub fn builder() -> RelayBuilder {
        RelayBuilder::new()
    }

    pub(crate) fn new(
        engine: Box<dyn MixEngine>,
        scheduler: PlaybackScheduler,
        link: RelayLink,
        config: RelayConfig,
        state: Arc<RelayState>,
        event_callback: Option<EventCallback>,
    ) -> Self {
        Self {
            engine,
            scheduler,
            link,
            config,
            state,
            event_callback,
        }
    }

    /// Returns a handle for voice lifecycle events and the exit request.
    pub fn link(&self) -> RelayLink {
        self.link.clone()
    }

    /// Returns the relay configuration.
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Returns the name of the attached engine.
    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    /// Returns current relay statistics.
    pub fn stats(&self) -> RelayStats {
        self.state.snapshot()
    }

    /// Runs one engine update followed by one scheduler tick.
    ///
    /// [`run()`](Self::run) calls this at the configured interval; call it
    /// directly to drive the relay from your own loop.
    pub fn tick(&mut self) -> TickReport {
        if let Err(e) = self.engine.update() {
            tracing::warn!("Engine '{}' update failed: {}", self.engine.name(), e);
            emit(
                self.event_callback.as_ref(),
                RelayEvent::EngineError {
                    error: e.to_string(),
                },
            );
        }
        self.scheduler.tick(&self.link)
    }

    /// Ticks at the configured interval until an exit is requested, then
    /// shuts down.
    ///
    /// The future is not `Send` when the engine isn't; await it on the task
    /// that built the relay.
    pub async fn run(mut self) -> RelayStats {
        tracing::info!(
            "Relay running: engine='{}', tick={:?}, frame={} samples",
            self.engine.name(),
            self.config.tick_interval,
            self.config.frame_size
        );

        let mut interval = tokio::time::interval(self.config.tick_interval);
        while !self.link.exit_requested() {
            interval.tick().await;
            self.tick();
        }

        self.shutdown().await
    }

    /// Stops the relay.
    ///
    /// This will:
    /// 1. Flush the buffered tail to the transport if connected and
    ///    `flush_on_stop` is set
    /// 2. Detach the transport (calling its `on_stop()`)
    /// 3. Discard anything left in the buffer
    /// 4. Release the engine
    pub async fn shutdown(mut self) -> RelayStats {
        if self.config.flush_on_stop && self.link.is_connected() {
            self.scheduler.flush(&self.link);
        }
        self.link.voice_disconnect().await;
        self.scheduler.tick(&self.link);

        let stats = self.state.snapshot();
        tracing::info!(
            "Relay stopped: {} frames sent, {} samples dropped, {} frames rejected",
            stats.frames_sent,
            stats.oldest_dropped + stats.newest_dropped,
            stats.rejected_frames
        );
        stats
    }
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("engine", &self.engine.name())
            .field("config", &self.config)
            .field("link", &self.link)
            .finish_non_exhaustive()
    }
}
