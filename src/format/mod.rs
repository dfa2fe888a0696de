//! Audio format conversion utilities.
//!
//! - Sample format conversion (f32 → i16 PCM with symmetric clamping)
//! - Level conversion (dB ↔ linear) for the output gain stage

mod convert;

pub use convert::{db_to_linear, f32_slice_to_pcm, f32_to_pcm, linear_to_db, PCM_FULL_SCALE};
