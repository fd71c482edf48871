use std::io::Cursor;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use tracing::debug;

#[cfg(feature = "microphone")]
pub use microphone::MicrophoneSource;

/// Something that yields a WAV recording to upload. Implementations may
/// block, so callers run them off the async runtime.
pub trait AudioSource: Send {
    fn capture(&self) -> Result<Vec<u8>>;
}

/// Encode interleaved 16-bit PCM as an in-memory WAV file.
#[cfg_attr(not(feature = "microphone"), allow(dead_code))]
pub fn encode_wav(samples: &[i16], channels: u16, sample_rate: u32) -> Result<Vec<u8>> {
    if channels == 0 || sample_rate == 0 {
        bail!("invalid WAV format: {} ch, {} Hz", channels, sample_rate);
    }
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(cursor.into_inner())
}

/// Reads a pre-recorded WAV file, rejecting anything that isn't one.
pub struct WavFileSource {
    path: PathBuf,
}

impl WavFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl AudioSource for WavFileSource {
    fn capture(&self) -> Result<Vec<u8>> {
        let reader = hound::WavReader::open(&self.path)
            .with_context(|| format!("{} is not a readable WAV file", self.path.display()))?;

        let spec = reader.spec();
        if spec.sample_rate == 0 {
            bail!("{} has a zero sample rate", self.path.display());
        }
        let seconds = reader.duration() as f64 / spec.sample_rate as f64;
        debug!(
            "Recording {}: {} ch, {} Hz, {:.1}s",
            self.path.display(),
            spec.channels,
            spec.sample_rate,
            seconds
        );

        std::fs::read(&self.path).with_context(|| format!("failed to read {}", self.path.display()))
    }
}

#[cfg(feature = "microphone")]
mod microphone {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use anyhow::{Result, anyhow, bail};
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{FromSample, Sample};
    use tracing::{error, info};

    use super::{AudioSource, encode_wav};

    type Captured = Arc<Mutex<Vec<i16>>>;

    /// Records a fixed-length clip from the default input device.
    pub struct MicrophoneSource {
        duration: Duration,
    }

    impl MicrophoneSource {
        pub fn new(duration: Duration) -> Self {
            Self { duration }
        }
    }

    impl AudioSource for MicrophoneSource {
        fn capture(&self) -> Result<Vec<u8>> {
            let host = cpal::default_host();
            let device = host
                .default_input_device()
                .ok_or_else(|| anyhow!("No input device available"))?;
            let config = device
                .default_input_config()
                .map_err(|e| anyhow!("Failed to get default input config: {}", e))?;

            let channels = config.channels();
            let sample_rate = config.sample_rate().0;
            info!(
                "Recording {}s from {} ({} ch, {} Hz)",
                self.duration.as_secs(),
                device.name().unwrap_or_else(|_| "unknown device".into()),
                channels,
                sample_rate
            );

            let captured: Captured = Arc::new(Mutex::new(Vec::new()));
            let sink = captured.clone();
            let err_fn = |err| error!("Audio input stream error: {}", err);

            let stream = match config.sample_format() {
                cpal::SampleFormat::I16 => device.build_input_stream(
                    &config.into(),
                    move |data: &[i16], _: &cpal::InputCallbackInfo| push_samples(data, &sink),
                    err_fn,
                    None,
                )?,
                cpal::SampleFormat::I32 => device.build_input_stream(
                    &config.into(),
                    move |data: &[i32], _: &cpal::InputCallbackInfo| push_samples(data, &sink),
                    err_fn,
                    None,
                )?,
                cpal::SampleFormat::F32 => device.build_input_stream(
                    &config.into(),
                    move |data: &[f32], _: &cpal::InputCallbackInfo| push_samples(data, &sink),
                    err_fn,
                    None,
                )?,
                other => bail!("Unsupported sample format '{}'", other),
            };

            stream.play()?;
            std::thread::sleep(self.duration);
            drop(stream);

            let samples = captured
                .lock()
                .map_err(|_| anyhow!("recording buffer poisoned"))?
                .split_off(0);
            info!("Recording finished: {} samples", samples.len());
            encode_wav(&samples, channels, sample_rate)
        }
    }

    fn push_samples<T>(input: &[T], sink: &Captured)
    where
        T: Sample,
        i16: FromSample<T>,
    {
        if let Ok(mut buf) = sink.lock() {
            buf.extend(input.iter().map(|&s| i16::from_sample(s)));
        }
    }
}
