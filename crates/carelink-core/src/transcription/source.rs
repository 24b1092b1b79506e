//! Audio inputs for a transcription session.

use std::io::{Cursor, Read};
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::error::{TranscriptionError, TranscriptionResult};

/// A stream of mono float samples in `[-1.0, 1.0]`.
#[async_trait]
pub trait AudioSource: Send {
    fn sample_rate(&self) -> u32;

    /// Next buffer, or `None` once the source is exhausted or stopped.
    async fn next_buffer(&mut self) -> TranscriptionResult<Option<Vec<f32>>>;

    /// Release the underlying input. Only the first call has an effect.
    fn stop(&mut self);
}

/// Plays back a WAV file in fixed-size buffers.
#[derive(Debug)]
pub struct WavFileSource {
    samples: Vec<f32>,
    position: usize,
    buffer_size: usize,
    sample_rate: u32,
    pacing: Option<Duration>,
    stopped: bool,
}

impl WavFileSource {
    pub fn open(path: impl AsRef<Path>, buffer_size: usize) -> TranscriptionResult<Self> {
        let reader = hound::WavReader::open(path)?;
        Self::from_reader(reader, buffer_size)
    }

    pub fn from_bytes(bytes: Vec<u8>, buffer_size: usize) -> TranscriptionResult<Self> {
        let reader = hound::WavReader::new(Cursor::new(bytes))?;
        Self::from_reader(reader, buffer_size)
    }

    fn from_reader<R: Read>(
        reader: hound::WavReader<R>,
        buffer_size: usize,
    ) -> TranscriptionResult<Self> {
        if buffer_size == 0 {
            return Err(TranscriptionError::InvalidConfiguration(
                "audio buffer size must be greater than zero".to_string(),
            ));
        }

        let spec = reader.spec();
        let interleaved = decode_samples(reader, spec)?;
        let channels = usize::from(spec.channels.max(1));
        #[allow(clippy::cast_precision_loss)]
        let samples = interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect::<Vec<_>>();

        tracing::debug!(
            "Loaded {} samples at {} Hz ({} channel(s))",
            samples.len(),
            spec.sample_rate,
            spec.channels
        );
        Ok(Self {
            samples,
            position: 0,
            buffer_size,
            sample_rate: spec.sample_rate,
            pacing: None,
            stopped: false,
        })
    }

    /// Wait one buffer's duration between buffers, like a live microphone.
    #[must_use]
    pub fn with_realtime_pacing(mut self) -> Self {
        let micros = (self.buffer_size as u64).saturating_mul(1_000_000)
            / u64::from(self.sample_rate.max(1));
        self.pacing = Some(Duration::from_micros(micros));
        self
    }

    pub fn duration(&self) -> Duration {
        let millis = (self.samples.len() as u64).saturating_mul(1_000)
            / u64::from(self.sample_rate.max(1));
        Duration::from_millis(millis)
    }
}

#[async_trait]
impl AudioSource for WavFileSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    async fn next_buffer(&mut self) -> TranscriptionResult<Option<Vec<f32>>> {
        if self.stopped || self.position >= self.samples.len() {
            return Ok(None);
        }
        if let Some(pacing) = self.pacing {
            if self.position > 0 {
                tokio::time::sleep(pacing).await;
            }
        }

        let end = (self.position + self.buffer_size).min(self.samples.len());
        let buffer = self.samples[self.position..end].to_vec();
        self.position = end;
        Ok(Some(buffer))
    }

    fn stop(&mut self) {
        self.stopped = true;
    }
}

#[allow(clippy::cast_precision_loss)]
fn decode_samples<R: Read>(
    reader: hound::WavReader<R>,
    spec: hound::WavSpec,
) -> TranscriptionResult<Vec<f32>> {
    match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .map(|sample| sample.map_err(TranscriptionError::from))
            .collect(),
        hound::SampleFormat::Int => {
            if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                return Err(TranscriptionError::Audio(format!(
                    "unsupported bit depth {}",
                    spec.bits_per_sample
                )));
            }
            let scale = 2_f32.powi(i32::from(spec.bits_per_sample) - 1);
            reader
                .into_samples::<i32>()
                .map(|sample| {
                    sample
                        .map(|value| value as f32 / scale)
                        .map_err(TranscriptionError::from)
                })
                .collect()
        }
    }
}

/// Buffers pushed by an embedding application (for example a capture thread).
#[derive(Debug)]
pub struct ChannelSource {
    receiver: mpsc::Receiver<Vec<f32>>,
    sample_rate: u32,
    stopped: bool,
}

impl ChannelSource {
    /// Create a source and the sender that feeds it.
    pub fn new(sample_rate: u32, capacity: usize) -> (mpsc::Sender<Vec<f32>>, Self) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            sender,
            Self {
                receiver,
                sample_rate,
                stopped: false,
            },
        )
    }
}

#[async_trait]
impl AudioSource for ChannelSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    async fn next_buffer(&mut self) -> TranscriptionResult<Option<Vec<f32>>> {
        if self.stopped {
            return Ok(None);
        }
        Ok(self.receiver.recv().await)
    }

    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.receiver.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcription::pcm::encode_wav;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[tokio::test(flavor = "multi_thread")]
    async fn wav_file_is_split_into_buffers() {
        let tmp = tempdir().unwrap();
        let wav_path = tmp.path().join("intake.wav");
        std::fs::write(&wav_path, encode_wav(&[0.0; 10], 16_000).unwrap()).unwrap();

        let mut source = WavFileSource::open(&wav_path, 4).unwrap();
        assert_eq!(source.sample_rate(), 16_000);

        let mut sizes = Vec::new();
        while let Some(buffer) = source.next_buffer().await.unwrap() {
            sizes.push(buffer.len());
        }
        assert_eq!(sizes, vec![4, 4, 2]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stereo_is_downmixed() {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for sample in [16_384_i16, 0, -16_384, -16_384] {
                writer.write_sample(sample).unwrap();
            }
            writer.finalize().unwrap();
        }

        let mut source = WavFileSource::from_bytes(cursor.into_inner(), 4096).unwrap();
        assert_eq!(
            source.next_buffer().await.unwrap(),
            Some(vec![0.25, -0.5])
        );
        assert_eq!(source.next_buffer().await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stopped_sources_yield_nothing() {
        let mut wav =
            WavFileSource::from_bytes(encode_wav(&[0.1; 8], 16_000).unwrap(), 2).unwrap();
        wav.stop();
        assert_eq!(wav.next_buffer().await.unwrap(), None);

        let (sender, mut channel) = ChannelSource::new(16_000, 4);
        sender.send(vec![0.5]).await.unwrap();
        assert_eq!(channel.next_buffer().await.unwrap(), Some(vec![0.5]));
        channel.stop();
        channel.stop();
        assert!(sender.send(vec![0.5]).await.is_err());
        assert_eq!(channel.next_buffer().await.unwrap(), None);
    }

    #[test]
    fn zero_buffer_size_is_rejected() {
        let bytes = encode_wav(&[0.0; 4], 16_000).unwrap();
        assert!(WavFileSource::from_bytes(bytes, 0).is_err());
    }
}
