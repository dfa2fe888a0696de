//! Mixing engines that feed the relay.
//!
//! A [`MixEngine`] owns whatever produces the mixed audio (an audio
//! middleware instance, an input device, a test tone) and invokes the
//! relay's [`CaptureCallback`] from its mixing thread.
//!
//! - [`DeviceEngine`]: Captures a cpal input device, such as a loopback of
//!   the mixer's output
//! - [`MockEngine`]: Renders deterministic blocks on each update, for tests
//!   and demos without hardware

mod device;
mod mock;

pub use device::{list_input_devices, DeviceEngine};
pub use mock::{MockEngine, MockSignal};

use crate::pipeline::CaptureCallback;
use crate::{EngineError, RelayError};

/// Source of mixed audio for the relay.
///
/// Engines are driven from the thread that owns the [`Relay`](crate::Relay):
/// `update()` is called once per tick before the scheduler drains. The
/// capture callback itself may run on any thread the engine likes. Engines
/// release their resources on `Drop`.
///
/// No `Send` bound: native audio streams are often tied to the thread that
/// created them.
pub trait MixEngine {
    /// Human-readable name for logging.
    fn name(&self) -> &str;

    /// Installs the capture callback.
    ///
    /// Called exactly once, by [`RelayBuilder::build()`](crate::RelayBuilder::build).
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::CaptureAlreadyAttached`] on a second call, or an
    /// engine-specific error if the audio path can't be set up.
    fn attach_capture(&mut self, capture: CaptureCallback) -> Result<(), RelayError>;

    /// Advances the engine by one tick.
    ///
    /// Default implementation does nothing, for engines that run on their
    /// own thread.
    ///
    /// # Errors
    ///
    /// Failures are reported as [`RelayEvent::EngineError`](crate::RelayEvent::EngineError);
    /// the relay keeps running.
    fn update(&mut self) -> Result<(), EngineError> {
        Ok(())
    }
}
