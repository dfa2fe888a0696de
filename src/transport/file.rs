//! WAV recording transport.

use std::fs::File;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::config::RELAY_CHANNELS;
use crate::transport::VoiceTransport;
use crate::{PcmFrame, TransportError};

/// Length of a canonical 16-bit PCM WAV header.
const HEADER_LEN: usize = 44;

/// Builds the header for `data_len` bytes of interleaved 16-bit samples.
fn wav_header(sample_rate: u32, channels: u16, data_len: u32) -> [u8; HEADER_LEN] {
    let block_align = channels * 2;
    let byte_rate = sample_rate * u32::from(block_align);

    let mut header = [0u8; HEADER_LEN];
    let mut at = 0;
    let mut put = |bytes: &[u8]| {
        header[at..at + bytes.len()].copy_from_slice(bytes);
        at += bytes.len();
    };

    put(b"RIFF");
    put(&data_len.saturating_add(HEADER_LEN as u32 - 8).to_le_bytes());
    put(b"WAVE");
    put(b"fmt ");
    put(&16u32.to_le_bytes());
    put(&1u16.to_le_bytes());
    put(&channels.to_le_bytes());
    put(&sample_rate.to_le_bytes());
    put(&byte_rate.to_le_bytes());
    put(&block_align.to_le_bytes());
    put(&16u16.to_le_bytes());
    put(b"data");
    put(&data_len.to_le_bytes());

    header
}

/// One voice session's worth of recording.
struct Recording {
    writer: BufWriter<File>,
    sample_rate: u32,
    data_len: u64,
}

impl Recording {
    /// Truncates `path` and reserves room for the header.
    fn create(path: &Path) -> io::Result<Self> {
        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_all(&[0u8; HEADER_LEN])?;
        Ok(Self {
            writer,
            sample_rate: 0,
            data_len: 0,
        })
    }

    fn append(&mut self, frame: &PcmFrame) -> io::Result<()> {
        if self.sample_rate == 0 {
            self.sample_rate = frame.sample_rate;
        }
        for sample in frame.samples.iter() {
            self.writer.write_all(&sample.to_le_bytes())?;
        }
        self.data_len += frame.len() as u64 * 2;
        Ok(())
    }

    /// Writes the real header over the placeholder. Returns the data length.
    fn finish(mut self) -> io::Result<u64> {
        let data_len = u32::try_from(self.data_len).unwrap_or(u32::MAX);
        self.writer.seek(SeekFrom::Start(0))?;
        self.writer
            .write_all(&wav_header(self.sample_rate, RELAY_CHANNELS, data_len))?;
        self.writer.flush()?;
        Ok(self.data_len)
    }
}

/// A transport that records the relayed stream to a WAV file.
///
/// Useful for checking what a voice channel would hear without connecting to
/// one. Each voice session (`on_start` to `on_stop`) truncates the file and
/// records from scratch; the header is written when the session stops.
/// Frames offered outside a session are refused with
/// [`TransportError::Disconnected`].
///
/// # Example
///
/// ```no_run
/// use session_relay::WavTransport;
///
/// let transport = WavTransport::new("session.wav");
/// // Attach with RelayLink::voice_ready()...
/// ```
pub struct WavTransport {
    name: String,
    path: PathBuf,
    recording: Arc<Mutex<Option<Recording>>>,
}

impl WavTransport {
    /// Creates a transport that records to `path`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        Self {
            name: format!("wav:{}", path.display()),
            path,
            recording: Arc::new(Mutex::new(None)),
        }
    }

    /// Path of the output file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Samples recorded in the current session, across both channels.
    pub fn samples_written(&self) -> u64 {
        self.recording.lock().as_ref().map_or(0, |r| r.data_len / 2)
    }
}

#[async_trait]
impl VoiceTransport for WavTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn on_start(&self) -> Result<(), TransportError> {
        let path = self.path.clone();
        let recording = tokio::task::spawn_blocking(move || {
            Recording::create(&path).map_err(|e| TransportError::file(&path, e))
        })
        .await
        .map_err(|e| TransportError::custom(format!("open task panicked: {e}")))??;

        if self.recording.lock().replace(recording).is_some() {
            tracing::warn!("{}: restarted without stop, previous take discarded", self.name);
        }
        tracing::debug!("{}: recording started", self.name);
        Ok(())
    }

    fn send_frame(&self, frame: &PcmFrame) -> Result<(), TransportError> {
        let mut recording = self.recording.lock();
        let recording = recording.as_mut().ok_or(TransportError::Disconnected)?;
        recording
            .append(frame)
            .map_err(|e| TransportError::file(&self.path, e))
    }

    async fn on_stop(&self) -> Result<(), TransportError> {
        let Some(recording) = self.recording.lock().take() else {
            return Ok(());
        };

        let path = self.path.clone();
        let data_len = tokio::task::spawn_blocking(move || {
            recording.finish().map_err(|e| TransportError::file(&path, e))
        })
        .await
        .map_err(|e| TransportError::custom(format!("finish task panicked: {e}")))??;

        tracing::info!("{}: recorded {} bytes of audio", self.name, data_len);
        Ok(())
    }
}
