//! CPAL input device engine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SampleRate, Stream, StreamConfig as CpalStreamConfig};

use crate::engine::MixEngine;
use crate::pipeline::CaptureCallback;
use crate::{EngineError, RelayError};

/// Lists the names of all input devices on the default host.
///
/// # Errors
///
/// Returns `BackendError` if the host can't enumerate devices.
pub fn list_input_devices() -> Result<Vec<String>, RelayError> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .map_err(|e| RelayError::BackendError(e.to_string()))?;
    Ok(devices.filter_map(|device| device.name().ok()).collect())
}

/// Engine that captures a cpal input device.
///
/// Point it at a loopback of the mixer's output (a monitor source, a virtual
/// cable) to relay whatever the mixer plays. The stream starts when the
/// capture callback is attached and stops when the engine is dropped.
///
/// Only 32-bit float streams at the relay's sample rate are accepted; the
/// relay does not resample.
#[must_use]
pub struct DeviceEngine {
    device: Device,
    name: String,
    stream: Option<Stream>,
    stream_failed: Arc<AtomicBool>,
}

impl DeviceEngine {
    /// Opens the default input device.
    ///
    /// # Errors
    ///
    /// Returns `NoDefaultDevice` if no default input device is configured.
    pub fn open_default() -> Result<Self, RelayError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(RelayError::NoDefaultDevice)?;
        Ok(Self::from_device(device))
    }

    /// Opens a specific input device by name.
    ///
    /// # Errors
    ///
    /// Returns `DeviceNotFound` if no device with the given name exists.
    pub fn open_by_name(name: &str) -> Result<Self, RelayError> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| RelayError::BackendError(e.to_string()))?;

        for device in devices {
            if let Ok(device_name) = device.name() {
                if device_name == name {
                    return Ok(Self::from_device(device));
                }
            }
        }

        Err(RelayError::DeviceNotFound {
            name: name.to_string(),
        })
    }

    fn from_device(device: Device) -> Self {
        let name = device.name().unwrap_or_else(|_| "unknown".to_string());
        Self {
            device,
            name,
            stream: None,
            stream_failed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns `true` once the stream is running.
    pub fn is_running(&self) -> bool {
        self.stream.is_some()
    }

    /// Picks an f32 stream config at `sample_rate`, preferring stereo.
    fn select_config(&self, sample_rate: u32) -> Result<CpalStreamConfig, RelayError> {
        let ranges: Vec<_> = self
            .device
            .supported_input_configs()
            .map_err(|e| RelayError::BackendError(e.to_string()))?
            .filter(|range| {
                range.min_sample_rate().0 <= sample_rate && sample_rate <= range.max_sample_rate().0
            })
            .collect();

        let best = ranges
            .iter()
            .filter(|range| range.sample_format() == SampleFormat::F32)
            .filter(|range| (1..=2).contains(&range.channels()))
            .max_by_key(|range| range.channels());

        if let Some(range) = best {
            return Ok(range.clone().with_sample_rate(SampleRate(sample_rate)).config());
        }

        if let Some(range) = ranges.first() {
            return Err(RelayError::UnsupportedFormat {
                format: format!("{:?} x{}", range.sample_format(), range.channels()),
            });
        }

        let native = self
            .device
            .default_input_config()
            .map_err(|e| RelayError::BackendError(e.to_string()))?;
        Err(RelayError::UnsupportedSampleRate {
            requested: sample_rate,
            native: native.sample_rate().0,
        })
    }
}

impl MixEngine for DeviceEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn attach_capture(&mut self, mut capture: CaptureCallback) -> Result<(), RelayError> {
        if self.stream.is_some() {
            return Err(RelayError::CaptureAlreadyAttached);
        }

        let config = self.select_config(capture.sample_rate())?;
        let channels = usize::from(config.channels);
        let stream_failed = Arc::clone(&self.stream_failed);

        tracing::info!(
            "DeviceEngine '{}': capturing {}Hz/{}ch f32",
            self.name,
            config.sample_rate.0,
            channels
        );

        let stream = self
            .device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let _ = capture.capture_input(data, channels);
                },
                move |err| {
                    tracing::error!("Audio stream error: {}", err);
                    stream_failed.store(true, Ordering::SeqCst);
                },
                None,
            )
            .map_err(|e| RelayError::BackendError(e.to_string()))?;

        stream
            .play()
            .map_err(|e| RelayError::BackendError(e.to_string()))?;

        self.stream = Some(stream);
        Ok(())
    }

    fn update(&mut self) -> Result<(), EngineError> {
        if self.stream_failed.swap(false, Ordering::SeqCst) {
            return Err(EngineError::Update(format!(
                "input stream on '{}' reported an error",
                self.name
            )));
        }
        Ok(())
    }
}

impl Drop for DeviceEngine {
    fn drop(&mut self) {
        if self.stream.take().is_some() {
            tracing::debug!("DeviceEngine '{}': stream released", self.name);
        }
    }
}
