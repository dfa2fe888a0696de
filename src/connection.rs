//! Connection state and the handle voice lifecycle events drive.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::event::{emit, EventCallback};
use crate::relay::{RelayState, RelayStats};
use crate::transport::VoiceTransport;
use crate::{RelayError, RelayEvent};

/// Low bit of the packed state word: set while a transport is attached.
const CONNECTED_BIT: u64 = 1;

/// A consistent view of the connection at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ConnectionSnapshot {
    pub connected: bool,
    /// Bumped on every connect and disconnect.
    pub generation: u64,
}

/// Whether a live voice transport is attached.
///
/// The connected flag and a generation counter share one atomic word, so
/// readers on any thread get a consistent pair without locking. The
/// generation changes on every transition, which lets the scheduler notice a
/// disconnect/reconnect pair that happened entirely between two ticks.
#[derive(Debug, Default)]
pub(crate) struct ConnectionState {
    word: AtomicU64,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` while connected. Safe to call from the real-time thread.
    #[inline]
    pub fn is_connected(&self) -> bool {
        self.word.load(Ordering::Acquire) & CONNECTED_BIT != 0
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        let word = self.word.load(Ordering::Acquire);
        ConnectionSnapshot {
            connected: word & CONNECTED_BIT != 0,
            generation: word >> 1,
        }
    }

    /// Marks the state connected under a new generation.
    pub fn connect(&self) {
        self.transition(true);
    }

    /// Marks the state disconnected under a new generation. Returns `false`
    /// if it was already disconnected.
    pub fn disconnect(&self) -> bool {
        self.transition(false)
    }

    fn transition(&self, connected: bool) -> bool {
        let result = self
            .word
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |word| {
                let was_connected = word & CONNECTED_BIT != 0;
                if !connected && !was_connected {
                    return None;
                }
                let generation = (word >> 1).wrapping_add(1);
                Some((generation << 1) | u64::from(connected))
            });
        result.is_ok()
    }
}

struct LinkInner {
    connection: Arc<ConnectionState>,
    relay_state: Arc<RelayState>,
    transport: Mutex<Option<Arc<dyn VoiceTransport>>>,
    /// Held for the whole of `voice_ready` and `voice_disconnect`.
    lifecycle: tokio::sync::Mutex<()>,
    exit_requested: AtomicBool,
    event_callback: Option<EventCallback>,
}

/// Cloneable handle for the gateway side of the relay.
///
/// Voice lifecycle handlers call [`voice_ready()`](Self::voice_ready) and
/// [`voice_disconnect()`](Self::voice_disconnect); a shutdown command calls
/// [`request_exit()`](Self::request_exit). The handle is `Send + Sync` and can
/// be moved into any task, unlike the [`Relay`](crate::Relay) itself which
/// stays on the thread that drives the engine.
///
/// # Example
///
/// ```ignore
/// let link = relay.link();
///
/// // In the gateway's voice-ready handler:
/// link.voice_ready(Arc::new(ChannelTransport::new(frame_tx))).await?;
///
/// // In the voice-disconnect handler:
/// link.voice_disconnect().await;
///
/// // In the quit command handler:
/// link.request_exit();
/// ```
#[derive(Clone)]
pub struct RelayLink {
    inner: Arc<LinkInner>,
}

impl RelayLink {
    pub(crate) fn new(
        connection: Arc<ConnectionState>,
        relay_state: Arc<RelayState>,
        event_callback: Option<EventCallback>,
    ) -> Self {
        Self {
            inner: Arc::new(LinkInner {
                connection,
                relay_state,
                transport: Mutex::new(None),
                lifecycle: tokio::sync::Mutex::new(()),
                exit_requested: AtomicBool::new(false),
                event_callback,
            }),
        }
    }

    /// Attaches a voice transport and starts relaying.
    ///
    /// Calls the transport's `on_start()` first; if that fails the relay stays
    /// in its previous state. A transport that was already attached is
    /// detached and stopped.
    ///
    /// Lifecycle calls on clones of the same link run one at a time, in the
    /// order they acquire the link.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::TransportStartFailed`] if `on_start()` fails.
    pub async fn voice_ready(&self, transport: Arc<dyn VoiceTransport>) -> Result<(), RelayError> {
        let _lifecycle = self.inner.lifecycle.lock().await;

        transport
            .on_start()
            .await
            .map_err(|e| RelayError::TransportStartFailed {
                transport: transport.name().to_string(),
                reason: e.to_string(),
            })?;

        // Relaying stops before the slot changes hands.
        self.inner.connection.disconnect();

        let name = transport.name().to_string();
        let previous = self.inner.transport.lock().replace(transport);
        if let Some(previous) = previous {
            tracing::info!(
                "Replacing voice transport '{}' with '{}'",
                previous.name(),
                name
            );
            Self::stop_transport(previous.as_ref()).await;
        }

        self.inner.connection.connect();
        tracing::info!("Voice ready, relaying to '{}'", name);
        emit(
            self.inner.event_callback.as_ref(),
            RelayEvent::VoiceReady { transport: name },
        );
        Ok(())
    }

    /// Detaches the current transport and stops relaying.
    ///
    /// The connection flips to disconnected before anything else, so the
    /// capture callback stops appending immediately. Buffered audio is
    /// discarded by the relay on its next tick. Does nothing if no transport
    /// is attached.
    pub async fn voice_disconnect(&self) {
        let _lifecycle = self.inner.lifecycle.lock().await;

        self.inner.connection.disconnect();
        let transport = self.inner.transport.lock().take();
        if let Some(transport) = transport {
            tracing::info!("Voice disconnected from '{}'", transport.name());
            Self::stop_transport(transport.as_ref()).await;
            emit(
                self.inner.event_callback.as_ref(),
                RelayEvent::VoiceDisconnected {
                    transport: transport.name().to_string(),
                },
            );
        }
    }

    /// Asks the relay's main loop to finish after its current tick.
    pub fn request_exit(&self) {
        tracing::info!("Relay exit requested");
        self.inner.exit_requested.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once [`request_exit()`](Self::request_exit) was called.
    pub fn exit_requested(&self) -> bool {
        self.inner.exit_requested.load(Ordering::SeqCst)
    }

    /// Returns `true` while a transport is attached.
    pub fn is_connected(&self) -> bool {
        self.inner.connection.is_connected()
    }

    /// Returns current relay statistics.
    pub fn stats(&self) -> RelayStats {
        self.inner.relay_state.snapshot()
    }

    pub(crate) fn current_transport(&self) -> Option<Arc<dyn VoiceTransport>> {
        self.inner.transport.lock().clone()
    }

    pub(crate) fn connection(&self) -> &Arc<ConnectionState> {
        &self.inner.connection
    }

    async fn stop_transport(transport: &dyn VoiceTransport) {
        if let Err(e) = transport.on_stop().await {
            tracing::warn!("Transport '{}' failed to stop: {}", transport.name(), e);
        }
    }
}

impl std::fmt::Debug for RelayLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayLink")
            .field("connected", &self.is_connected())
            .field("exit_requested", &self.exit_requested())
            .finish_non_exhaustive()
    }
}
