//! Playback scheduler - the consumer half of the relay.
//!
//! Called once per tick from the relay's main loop. Each tick:
//! 1. Turns the capture callback's counters into log lines and events
//! 2. Discards audio that belongs to a connection that no longer exists
//! 3. Trims the buffer down to the high-water mark
//! 4. Drains whole frames to the attached transport

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{samples_to_duration, RelayConfig};
use crate::connection::{ConnectionSnapshot, RelayLink};
use crate::event::{emit, EventCallback};
use crate::pipeline::PcmBuffer;
use crate::relay::RelayState;
use crate::transport::VoiceTransport;
use crate::{OverflowSide, PcmFrame, RelayEvent};

/// Sent audio must stay silent this long before `SignalLost` is emitted.
const SILENCE_THRESHOLD: Duration = Duration::from_millis(500);

/// Tracks whether the frames handed to the transport carry any signal.
///
/// Time is measured in frame durations rather than wall-clock time, so the
/// result only depends on what was sent.
struct SignalMonitor {
    silent_for: Duration,
    is_flowing: bool,
}

impl SignalMonitor {
    fn new() -> Self {
        Self {
            silent_for: Duration::ZERO,
            // Assume flowing until proven otherwise
            is_flowing: true,
        }
    }

    /// Returns an event to emit if the state changed.
    fn observe(&mut self, has_signal: bool, duration: Duration) -> Option<RelayEvent> {
        if has_signal {
            self.silent_for = Duration::ZERO;
            if !self.is_flowing {
                self.is_flowing = true;
                return Some(RelayEvent::SignalResumed);
            }
            return None;
        }

        self.silent_for += duration;
        if self.is_flowing && self.silent_for >= SILENCE_THRESHOLD {
            self.is_flowing = false;
            return Some(RelayEvent::SignalLost {
                silent_ms: self.silent_for.as_millis() as u64,
            });
        }
        None
    }

    fn reset(&mut self) {
        *self = Self::new();
    }
}

/// What one call to [`PlaybackScheduler::tick()`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Frames the transport accepted.
    pub frames_sent: u64,
    /// Samples left in the buffer after the tick.
    pub occupancy: usize,
    /// Stale samples thrown away.
    pub discarded: usize,
    /// Oldest samples dropped at the high-water mark.
    pub trimmed: usize,
    /// Whether the transport refused a frame.
    pub rejected: bool,
}

/// Drains the shared buffer to the voice transport in fixed-size frames.
///
/// Draining starts once occupancy exceeds the send threshold `T` and pops one
/// frame at a time while at least one whole frame remains and occupancy is
/// above `T / 2`. A frame is only removed from the buffer after the transport
/// accepted it.
pub struct PlaybackScheduler {
    buffer: PcmBuffer,
    state: Arc<RelayState>,
    event_callback: Option<EventCallback>,
    sample_rate: u32,
    frame_size: usize,
    send_threshold: usize,
    high_water_mark: usize,
    last_snapshot: ConnectionSnapshot,
    sequence: u64,
    signal: SignalMonitor,
    reported_newest_dropped: u64,
    reported_unsupported_blocks: u64,
}

impl PlaybackScheduler {
    pub(crate) fn new(
        buffer: PcmBuffer,
        config: &RelayConfig,
        initial: ConnectionSnapshot,
        state: Arc<RelayState>,
        event_callback: Option<EventCallback>,
    ) -> Self {
        tracing::debug!(
            "PlaybackScheduler creating: frame={} samples, threshold={}, high_water={}",
            config.frame_size,
            config.send_threshold,
            config.high_water_mark
        );

        Self {
            buffer,
            state,
            event_callback,
            sample_rate: config.sample_rate,
            frame_size: config.frame_size,
            send_threshold: config.send_threshold,
            high_water_mark: config.high_water_mark,
            last_snapshot: initial,
            sequence: 0,
            signal: SignalMonitor::new(),
            reported_newest_dropped: 0,
            reported_unsupported_blocks: 0,
        }
    }

    /// Returns the number of samples currently buffered.
    pub fn occupancy(&self) -> usize {
        self.buffer.occupancy()
    }

    /// Runs one poll-and-drain step.
    pub fn tick(&mut self, link: &RelayLink) -> TickReport {
        self.report_capture_counters();

        let snapshot = link.connection().snapshot();
        let mut report = TickReport::default();

        if !snapshot.connected {
            // Purges writes that raced the disconnect.
            self.state.take_stale_commit();
            report.discarded = self.discard_stale();
            self.enter(snapshot);
            report.occupancy = self.finish_tick();
            return report;
        }

        report.discarded = self.follow_generation(snapshot);
        report.trimmed = self.trim_to_high_water();

        if self.buffer.occupancy() > self.send_threshold {
            if let Some(transport) = link.current_transport() {
                let (sent, rejected) = self.drain(transport.as_ref());
                report.frames_sent = sent;
                report.rejected = rejected;
                tracing::trace!(
                    transport = transport.name(),
                    frames_sent = sent,
                    occupancy = self.buffer.occupancy(),
                    backlog_s = transport.seconds_remaining(),
                    "Relay tick drained"
                );
            }
        }

        report.occupancy = self.finish_tick();
        report
    }

    /// Flushes everything buffered at stream end.
    ///
    /// Sends all whole frames, then pads the remaining tail with silence into
    /// one final frame. Does nothing but discard when disconnected. Stops at
    /// the first rejected frame.
    pub fn flush(&mut self, link: &RelayLink) -> u64 {
        self.report_capture_counters();

        let snapshot = link.connection().snapshot();
        let transport = match link.current_transport() {
            Some(transport) if snapshot.connected => transport,
            _ => {
                self.state.take_stale_commit();
                self.discard_stale();
                self.finish_tick();
                return 0;
            }
        };
        self.follow_generation(snapshot);
        self.trim_to_high_water();

        let mut frames = 0u64;
        while self.buffer.occupancy() >= self.frame_size {
            if !self.send_head(transport.as_ref()) {
                self.finish_tick();
                return frames;
            }
            frames += 1;
        }

        let mut padded_samples = 0;
        if let Some((samples, padded)) = self.buffer.take_padded(self.frame_size) {
            let frame = PcmFrame::new(samples, self.sequence, self.sample_rate);
            match transport.send_frame(&frame) {
                Ok(()) => {
                    self.record_sent(&frame);
                    frames += 1;
                    padded_samples = padded;
                }
                Err(e) => self.report_rejection(transport.name(), &e),
            }
        }

        tracing::info!(
            "Flushed {} frames to '{}' at stream end ({} samples padding)",
            frames,
            transport.name(),
            padded_samples
        );
        emit(
            self.event_callback.as_ref(),
            RelayEvent::StreamFlushed {
                frames,
                padded_samples,
            },
        );
        self.finish_tick();
        frames
    }

    /// Pops frames while occupancy is at least one frame and above `T / 2`.
    fn drain(&mut self, transport: &dyn VoiceTransport) -> (u64, bool) {
        let floor = self.send_threshold / 2;
        let mut sent = 0;
        while self.buffer.occupancy() >= self.frame_size && self.buffer.occupancy() > floor {
            if !self.send_head(transport) {
                return (sent, true);
            }
            sent += 1;
        }
        (sent, false)
    }

    /// Submits the frame at the head. It is removed only if accepted.
    fn send_head(&mut self, transport: &dyn VoiceTransport) -> bool {
        let Some(samples) = self.buffer.peek_frame(self.frame_size) else {
            return false;
        };
        let frame = PcmFrame::new(samples, self.sequence, self.sample_rate);

        match transport.send_frame(&frame) {
            Ok(()) => {
                self.buffer.consume(self.frame_size);
                self.record_sent(&frame);
                true
            }
            Err(e) => {
                self.report_rejection(transport.name(), &e);
                false
            }
        }
    }

    fn record_sent(&mut self, frame: &PcmFrame) {
        self.sequence += 1;
        self.state.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.state
            .samples_sent
            .fetch_add(frame.len() as u64, Ordering::Relaxed);

        if let Some(event) = self.signal.observe(frame.has_signal(), frame.duration()) {
            match &event {
                RelayEvent::SignalLost { silent_ms } => {
                    tracing::debug!("Relayed audio silent for {}ms", silent_ms);
                }
                _ => tracing::debug!("Relayed audio has signal again"),
            }
            emit(self.event_callback.as_ref(), event);
        }
    }

    fn report_rejection(&self, transport: &str, error: &crate::TransportError) {
        self.state.rejections.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            "Transport '{}' rejected frame #{}: {}",
            transport,
            self.sequence,
            error
        );
        emit(
            self.event_callback.as_ref(),
            RelayEvent::TransportRejected {
                transport: transport.to_string(),
                error: error.to_string(),
            },
        );
    }

    fn discard_stale(&mut self) -> usize {
        let discarded = self.buffer.discard_all();
        if discarded > 0 {
            self.state
                .stale_discarded
                .fetch_add(discarded as u64, Ordering::Relaxed);
            tracing::debug!("Discarded {} stale samples", discarded);
            emit(
                self.event_callback.as_ref(),
                RelayEvent::StaleAudioDiscarded {
                    discarded_samples: discarded,
                },
            );
        }
        discarded
    }

    fn trim_to_high_water(&mut self) -> usize {
        let dropped = self.buffer.trim_to(self.high_water_mark);
        if dropped > 0 {
            self.state
                .oldest_dropped
                .fetch_add(dropped as u64, Ordering::Relaxed);
            self.report_overflow(dropped, OverflowSide::Oldest);
        }
        dropped
    }

    /// Switches to the generation of a connected snapshot.
    ///
    /// Buffered audio survives only when this tick observed the connect
    /// itself and no capture block straddled a transition. Returns the number
    /// of samples discarded.
    fn follow_generation(&mut self, snapshot: ConnectionSnapshot) -> usize {
        let stale_commit = self.state.take_stale_commit();
        if snapshot.generation == self.last_snapshot.generation && !stale_commit {
            return 0;
        }
        let fresh = !stale_commit
            && !self.last_snapshot.connected
            && snapshot.generation == self.last_snapshot.generation.wrapping_add(1);
        // Otherwise a disconnect/reconnect pair happened between two ticks,
        // or a block from the old connection landed after the last purge.
        let discarded = if fresh { 0 } else { self.discard_stale() };
        self.enter(snapshot);
        discarded
    }

    /// Starts tracking a new connection generation.
    fn enter(&mut self, snapshot: ConnectionSnapshot) {
        if snapshot.generation != self.last_snapshot.generation {
            self.sequence = 0;
            self.signal.reset();
        }
        self.last_snapshot = snapshot;
    }

    /// Reports what the capture callback counted since the previous tick.
    fn report_capture_counters(&mut self) {
        let newest_dropped = self.state.newest_dropped.load(Ordering::Relaxed);
        let dropped = newest_dropped.saturating_sub(self.reported_newest_dropped);
        if dropped > 0 {
            self.reported_newest_dropped = newest_dropped;
            self.report_overflow(dropped as usize, OverflowSide::Newest);
        }

        let unsupported = self.state.unsupported_blocks.load(Ordering::Relaxed);
        let blocks = unsupported.saturating_sub(self.reported_unsupported_blocks);
        if blocks > 0 {
            self.reported_unsupported_blocks = unsupported;
            let channels = self.state.last_unsupported_channels.load(Ordering::Relaxed) as usize;
            tracing::warn!(
                channels,
                blocks,
                "Skipped engine blocks with unsupported channel layout"
            );
            emit(
                self.event_callback.as_ref(),
                RelayEvent::UnsupportedChannelLayout { channels, blocks },
            );
        }
    }

    fn report_overflow(&self, dropped_samples: usize, side: OverflowSide) {
        let dropped_ms = samples_to_duration(dropped_samples, self.sample_rate).as_millis() as u64;
        tracing::warn!(
            dropped_samples,
            dropped_ms,
            ?side,
            "Relay buffer overflow"
        );
        emit(
            self.event_callback.as_ref(),
            RelayEvent::BufferOverflow {
                dropped_samples,
                dropped_ms,
                side,
            },
        );
    }

    fn finish_tick(&self) -> usize {
        let occupancy = self.buffer.occupancy();
        self.state
            .occupancy
            .store(occupancy as u64, Ordering::Relaxed);
        self.state.ticks.fetch_add(1, Ordering::Relaxed);
        occupancy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionState;
    use crate::pipeline::{create_pcm_buffer, PcmProducer};
    use crate::TransportError;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use ringbuf::traits::Producer;
    use std::sync::atomic::AtomicBool;

    #[derive(Default)]
    struct RecordingTransport {
        frames: Mutex<Vec<PcmFrame>>,
        reject: AtomicBool,
    }

    #[async_trait]
    impl VoiceTransport for RecordingTransport {
        fn name(&self) -> &str {
            "recording"
        }

        fn send_frame(&self, frame: &PcmFrame) -> Result<(), TransportError> {
            if self.reject.load(Ordering::SeqCst) {
                return Err(TransportError::Backpressure);
            }
            self.frames.lock().push(frame.clone());
            Ok(())
        }
    }

    struct Harness {
        scheduler: PlaybackScheduler,
        producer: PcmProducer,
        link: RelayLink,
        transport: Arc<RecordingTransport>,
        events: Arc<Mutex<Vec<RelayEvent>>>,
    }

    impl Harness {
        fn new(frame_size: usize, send_threshold: usize, high_water_mark: usize) -> Self {
            let config = RelayConfig {
                frame_size,
                send_threshold,
                high_water_mark,
                ..Default::default()
            };
            let (producer, buffer) = create_pcm_buffer(config.ring_capacity());
            let connection = Arc::new(ConnectionState::new());
            let state = Arc::new(RelayState::new());
            let events = Arc::new(Mutex::new(Vec::new()));
            let events_clone = events.clone();
            let callback = crate::event_callback(move |e| events_clone.lock().push(e));
            let link = RelayLink::new(connection.clone(), state.clone(), Some(callback.clone()));
            let scheduler =
                PlaybackScheduler::new(buffer, &config, connection.snapshot(), state, Some(callback));
            Self {
                scheduler,
                producer,
                link,
                transport: Arc::new(RecordingTransport::default()),
                events,
            }
        }

        async fn connect(&self) {
            self.link.voice_ready(self.transport.clone()).await.unwrap();
        }

        fn push(&mut self, count: usize, value: i16) {
            for _ in 0..count {
                self.producer.try_push(value).unwrap();
            }
        }

        fn sent(&self) -> usize {
            self.transport.frames.lock().len()
        }

        fn has_event(&self, matches: impl Fn(&RelayEvent) -> bool) -> bool {
            self.events.lock().iter().any(matches)
        }
    }

    #[tokio::test]
    async fn test_no_drain_at_or_below_threshold() {
        let mut h = Harness::new(100, 100, 800);
        h.connect().await;
        h.scheduler.tick(&h.link);
        h.push(100, 1);

        let report = h.scheduler.tick(&h.link);

        assert_eq!(report.frames_sent, 0);
        assert_eq!(report.occupancy, 100);
    }

    #[tokio::test]
    async fn test_drain_sends_whole_frames_only() {
        let mut h = Harness::new(100, 100, 800);
        h.connect().await;
        h.push(350, 1);

        let report = h.scheduler.tick(&h.link);

        assert_eq!(report.frames_sent, 3);
        assert_eq!(report.occupancy, 50);
        assert!(h.transport.frames.lock().iter().all(|f| f.len() == 100));
    }

    #[tokio::test]
    async fn test_drain_stops_at_half_threshold() {
        let mut h = Harness::new(100, 400, 1600);
        h.connect().await;
        h.push(450, 1);

        let report = h.scheduler.tick(&h.link);

        // 450 -> 350 -> 250 -> 150, then 150 <= 200 stops it
        assert_eq!(report.frames_sent, 3);
        assert_eq!(report.occupancy, 150);
    }

    #[tokio::test]
    async fn test_sequence_numbers_increase() {
        let mut h = Harness::new(10, 10, 80);
        h.connect().await;
        h.push(30, 1);

        h.scheduler.tick(&h.link);

        let sequences: Vec<u64> = h.transport.frames.lock().iter().map(|f| f.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_disconnected_tick_discards_racing_writes() {
        let mut h = Harness::new(100, 100, 800);
        h.connect().await;
        h.push(40, 1);
        h.link.voice_disconnect().await;
        // A write that checked the state just before the disconnect
        h.push(20, 1);

        let report = h.scheduler.tick(&h.link);

        assert_eq!(report.discarded, 60);
        assert_eq!(report.occupancy, 0);
        assert_eq!(h.sent(), 0);
        assert!(h.has_event(|e| matches!(
            e,
            RelayEvent::StaleAudioDiscarded { discarded_samples: 60 }
        )));
    }

    #[tokio::test]
    async fn test_reconnect_between_ticks_discards_old_audio() {
        let mut h = Harness::new(100, 100, 800);
        h.connect().await;
        h.scheduler.tick(&h.link);
        h.push(90, 1);

        h.link.voice_disconnect().await;
        h.connect().await;
        let report = h.scheduler.tick(&h.link);

        assert_eq!(report.discarded, 90);
        assert_eq!(report.occupancy, 0);
    }

    #[tokio::test]
    async fn test_fresh_connection_keeps_new_audio() {
        let mut h = Harness::new(100, 100, 800);
        h.scheduler.tick(&h.link);
        h.connect().await;
        h.push(150, 1);

        let report = h.scheduler.tick(&h.link);

        assert_eq!(report.discarded, 0);
        assert_eq!(report.frames_sent, 1);
    }

    #[tokio::test]
    async fn test_block_committed_after_purge_is_not_replayed() {
        let mut h = Harness::new(100, 100, 800);
        h.connect().await;
        h.scheduler.tick(&h.link);
        h.link.voice_disconnect().await;
        h.scheduler.tick(&h.link);

        // A block that started before the disconnect commits after the purge
        h.push(40, 9);
        h.scheduler.state.mark_stale_commit();

        h.connect().await;
        h.push(120, 1);
        let report = h.scheduler.tick(&h.link);

        assert_eq!(report.discarded, 160);
        assert_eq!(report.frames_sent, 0);
        assert_eq!(h.sent(), 0);
    }

    #[tokio::test]
    async fn test_stale_commit_while_connected_discards() {
        let mut h = Harness::new(100, 100, 800);
        h.connect().await;
        h.scheduler.tick(&h.link);
        h.push(60, 9);
        h.scheduler.state.mark_stale_commit();

        let report = h.scheduler.tick(&h.link);

        assert_eq!(report.discarded, 60);
        assert!(!h.scheduler.state.take_stale_commit());
    }

    #[tokio::test]
    async fn test_high_water_trims_oldest() {
        let mut h = Harness::new(10, 10, 40);
        h.connect().await;
        h.transport.reject.store(true, Ordering::SeqCst);
        h.push(30, 1);
        h.push(30, 2);

        let report = h.scheduler.tick(&h.link);

        assert_eq!(report.trimmed, 20);
        assert!(h.has_event(|e| matches!(
            e,
            RelayEvent::BufferOverflow {
                dropped_samples: 20,
                side: OverflowSide::Oldest,
                ..
            }
        )));

        h.transport.reject.store(false, Ordering::SeqCst);
        h.scheduler.tick(&h.link);
        let frames = h.transport.frames.lock();
        // The 10 oldest remaining samples are the tail of the first batch
        assert!(frames[0].samples.iter().all(|&s| s == 1));
        assert!(frames[1].samples.iter().all(|&s| s == 2));
    }

    #[tokio::test]
    async fn test_rejection_keeps_frame_and_aborts() {
        let mut h = Harness::new(10, 10, 80);
        h.connect().await;
        h.push(10, 7);
        h.push(20, 8);
        h.transport.reject.store(true, Ordering::SeqCst);

        let report = h.scheduler.tick(&h.link);

        assert!(report.rejected);
        assert_eq!(report.frames_sent, 0);
        assert_eq!(report.occupancy, 30);
        assert!(h.has_event(|e| matches!(e, RelayEvent::TransportRejected { .. })));

        h.transport.reject.store(false, Ordering::SeqCst);
        h.scheduler.tick(&h.link);
        let frames = h.transport.frames.lock();
        assert!(frames[0].samples.iter().all(|&s| s == 7));
        assert_eq!(frames[0].sequence, 0);
    }

    #[tokio::test]
    async fn test_flush_pads_tail() {
        let mut h = Harness::new(10, 10, 80);
        h.connect().await;
        h.scheduler.tick(&h.link);
        h.push(25, 3);

        let frames = h.scheduler.flush(&h.link);

        assert_eq!(frames, 3);
        assert_eq!(h.scheduler.occupancy(), 0);
        let sent = h.transport.frames.lock();
        assert_eq!(sent[2].samples[..5], [3; 5]);
        assert_eq!(sent[2].samples[5..], [0; 5]);
        drop(sent);
        assert!(h.has_event(|e| matches!(
            e,
            RelayEvent::StreamFlushed {
                frames: 3,
                padded_samples: 5
            }
        )));
    }

    #[tokio::test]
    async fn test_flush_when_disconnected_discards() {
        let mut h = Harness::new(10, 10, 80);
        h.push(25, 3);

        assert_eq!(h.scheduler.flush(&h.link), 0);
        assert_eq!(h.scheduler.occupancy(), 0);
        assert_eq!(h.sent(), 0);
    }

    #[tokio::test]
    async fn test_capture_counters_reported_once() {
        let mut h = Harness::new(10, 10, 80);
        h.scheduler.state.newest_dropped.fetch_add(96, Ordering::Relaxed);
        h.scheduler.state.unsupported_blocks.fetch_add(2, Ordering::Relaxed);
        h.scheduler
            .state
            .last_unsupported_channels
            .store(6, Ordering::Relaxed);

        h.scheduler.tick(&h.link);
        h.scheduler.tick(&h.link);

        let events = h.events.lock();
        let overflows = events
            .iter()
            .filter(|e| matches!(e, RelayEvent::BufferOverflow { side: OverflowSide::Newest, .. }))
            .count();
        assert_eq!(overflows, 1);
        assert!(events.iter().any(|e| matches!(
            e,
            RelayEvent::UnsupportedChannelLayout {
                channels: 6,
                blocks: 2
            }
        )));
    }

    #[test]
    fn test_signal_monitor_lost_and_resumed() {
        let mut monitor = SignalMonitor::new();
        let frame = Duration::from_millis(60);

        assert!(monitor.observe(true, frame).is_none());
        for _ in 0..8 {
            assert!(monitor.observe(false, frame).is_none());
        }
        assert!(matches!(
            monitor.observe(false, frame),
            Some(RelayEvent::SignalLost { silent_ms: 540 })
        ));
        assert!(monitor.observe(false, frame).is_none());
        assert!(matches!(
            monitor.observe(true, frame),
            Some(RelayEvent::SignalResumed)
        ));
    }
}
