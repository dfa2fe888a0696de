//! Audio pipeline components.
//!
//! The pipeline connects the engine's mixing thread to the voice transport
//! through a ring buffer:
//!
//! ```text
//! Engine Thread → Capture Callback → Ring Buffer → Playback Scheduler → Transport
//! ```
//!
//! - **Capture Callback**: Converts engine blocks to stereo PCM, mutes the engine's output
//! - **Ring Buffer**: Lock-free SPSC queue between the two threads
//! - **Playback Scheduler**: Drains whole frames to the transport once per tick
//!
//! The ring buffer ensures the engine's callback never blocks.

mod capture;
mod pcm_buffer;
mod scheduler;

pub use capture::{CaptureCallback, CaptureStatus};
pub(crate) use pcm_buffer::{create_pcm_buffer, PcmBuffer, PcmProducer};
pub(crate) use scheduler::PlaybackScheduler;
pub use scheduler::TickReport;
