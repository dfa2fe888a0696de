//! # session-relay
//!
//! Real-time audio relay from a mixing engine to a voice connection.
//!
//! `session-relay` takes the floating-point output of an audio mixer,
//! converts it to 16-bit stereo PCM on the mixer's own thread, and hands it
//! to a voice transport in fixed-size frames at a steady tick. It is the
//! piece that sits between an audio middleware engine and a chat gateway's
//! voice client.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use session_relay::{ChannelTransport, DeviceEngine, PcmFrame, Relay};
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//!
//! let relay = Relay::builder()
//!     .engine(DeviceEngine::open_by_name("Mixer Loopback")?)
//!     .gain_db(-10.0)
//!     .on_event(|e| tracing::warn!(?e, "relay event"))
//!     .build()?;
//!
//! let link = relay.link();
//! let (tx, mut rx) = mpsc::channel::<PcmFrame>(8);
//!
//! // When the gateway reports the voice connection is ready:
//! link.voice_ready(Arc::new(ChannelTransport::new(tx))).await?;
//!
//! // Feed frames to the voice client
//! tokio::spawn(async move {
//!     while let Some(frame) = rx.recv().await {
//!         // voice.send_pcm(&frame.as_bytes())
//!     }
//! });
//!
//! // Runs until link.request_exit() is called
//! let stats = relay.run().await;
//! ```
//!
//! ## Architecture
//!
//! The crate maintains a strict thread boundary:
//!
//! - **Engine Thread**: Real-time mixing callback that never blocks, allocates or logs
//! - **Ring Buffer**: Lock-free SPSC queue of interleaved `i16` samples
//! - **Main Loop**: Ticks the engine and drains whole frames to the transport
//!
//! Connection state is a single atomic shared by both sides. While no voice
//! connection is ready the capture callback drops audio, and anything that
//! slipped in around a disconnect is discarded before the next connection
//! sees it.

// unsafe_code lint is configured in Cargo.toml as "deny"
#![warn(missing_docs)]
// Audio code requires intentional numeric casts between sample formats
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_lossless
)]
// unwrap/expect allowed in tests only
#![allow(clippy::unwrap_used)]
// These doc lints are too strict for internal implementation details
#![allow(clippy::missing_panics_doc, clippy::missing_errors_doc)]

mod builder;
mod config;
mod connection;
mod engine;
mod error;
mod event;
pub mod format;
mod frame;
mod pipeline;
mod relay;
mod transport;

pub use builder::RelayBuilder;
pub use config::{FramePreset, RelayConfig, DEFAULT_SAMPLE_RATE, RELAY_CHANNELS};
pub use connection::RelayLink;
pub use engine::{list_input_devices, DeviceEngine, MixEngine, MockEngine, MockSignal};
pub use error::{EngineError, RelayError, TransportError};
pub use event::{event_callback, EventCallback, OverflowSide, RelayEvent};
pub use frame::PcmFrame;
pub use pipeline::{CaptureCallback, CaptureStatus, TickReport};
pub use relay::{Relay, RelayStats};
pub use transport::{ChannelTransport, VoiceTransport, WavTransport};
