// src/audio_file/wav.rs

//! WAV reading and writing through `hound`.

use super::{
    check_channel_count, io_error_kind, AudioData, AudioFormat, PlanarAudio, SampleFormat,
};
use crate::error::{EngineError, EngineResult, ErrorKind};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub struct WavFile {
    pub(crate) data: AudioData,
}

fn hound_error(err: hound::Error, path: &Path, io_fallback: ErrorKind) -> EngineError {
    let kind = match &err {
        hound::Error::IoError(io) => io_error_kind(io, io_fallback),
        hound::Error::FormatError(_) | hound::Error::UnfinishedSample => {
            ErrorKind::CorruptedAudioData
        }
        hound::Error::TooWide | hound::Error::InvalidSampleFormat => ErrorKind::InvalidBitDepth,
        hound::Error::Unsupported => ErrorKind::UnsupportedFileFormat,
    };
    EngineError::new(kind, format!("{}: {}", path.display(), err))
}

/// Hound encodes every layout except 64-bit float.
pub(crate) fn check_write_format(format: SampleFormat) -> EngineResult<()> {
    if format == SampleFormat::Float64 {
        return Err(EngineError::new(
            ErrorKind::InvalidBitDepth,
            "64-bit float WAV output is not supported",
        ));
    }
    Ok(())
}

fn read_scaled<S>(
    reader: hound::WavReader<BufReader<File>>,
    scale: f32,
    path: &Path,
) -> EngineResult<Vec<f32>>
where
    S: hound::Sample + Into<f64>,
{
    reader
        .into_samples::<S>()
        .map(|s| {
            s.map(|v| (v.into() / scale as f64) as f32)
                .map_err(|e| hound_error(e, path, ErrorKind::FileReadError))
        })
        .collect()
}

/// Maps `[-1, 1]` onto a signed integer range of the given maximum.
fn quantize(sample: f32, max: f64) -> i32 {
    (sample.clamp(-1.0, 1.0) as f64 * max).round() as i32
}

impl WavFile {
    pub fn new(audio: PlanarAudio, sample_rate: u32) -> EngineResult<Self> {
        Ok(Self {
            data: AudioData::new(audio, sample_rate, 32, AudioFormat::Wav, true)?,
        })
    }

    /// Reads 8/16/24/32-bit PCM or 32-bit float WAV into planar `f32` samples in `[-1, 1]`.
    pub fn read(path: &Path) -> EngineResult<Self> {
        let file = File::open(path).map_err(|e| {
            EngineError::new(
                io_error_kind(&e, ErrorKind::FileOpenError),
                format!("{}: {}", path.display(), e),
            )
        })?;
        let reader = hound::WavReader::new(BufReader::new(file))
            .map_err(|e| hound_error(e, path, ErrorKind::FileReadError))?;
        let spec = reader.spec();
        check_channel_count(spec.channels as usize)?;

        let interleaved = match (spec.sample_format, spec.bits_per_sample) {
            (hound::SampleFormat::Float, 32) => reader
                .into_samples::<f32>()
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| hound_error(e, path, ErrorKind::FileReadError))?,
            (hound::SampleFormat::Int, 8) => read_scaled::<i8>(reader, 128.0, path)?,
            (hound::SampleFormat::Int, 16) => read_scaled::<i16>(reader, 32_768.0, path)?,
            (hound::SampleFormat::Int, 24) => read_scaled::<i32>(reader, 8_388_608.0, path)?,
            (hound::SampleFormat::Int, 32) => read_scaled::<i32>(reader, 2_147_483_648.0, path)?,
            (format, bits) => {
                return Err(EngineError::new(
                    ErrorKind::InvalidBitDepth,
                    format!(
                        "{}: {:?} samples of {} bits are not supported",
                        path.display(),
                        format,
                        bits
                    ),
                ))
            }
        };

        let audio = PlanarAudio::from_interleaved(&interleaved, spec.channels as usize)?;
        let mut data = AudioData::new(
            audio,
            spec.sample_rate,
            spec.bits_per_sample,
            AudioFormat::Wav,
            true,
        )?;
        data.source = Some(path.to_path_buf());
        Ok(Self { data })
    }

    /// Writes the samples with the configured path, rate and sample format.
    pub fn write(&self) -> EngineResult<()> {
        let info = self.data.write_info()?;
        check_write_format(info.sample_format)?;
        let audio = &self.data.audio;

        let spec = hound::WavSpec {
            channels: audio.channel_count() as u16,
            sample_rate: info.sample_rate,
            bits_per_sample: info.sample_format.bits(),
            sample_format: if info.sample_format.is_float() {
                hound::SampleFormat::Float
            } else {
                hound::SampleFormat::Int
            },
        };
        let path = info.path.as_path();
        let mut writer = hound::WavWriter::create(path, spec)
            .map_err(|e| hound_error(e, path, ErrorKind::FileOpenError))?;

        let write_err = |e: hound::Error| hound_error(e, path, ErrorKind::FileWriteError);
        for frame in 0..audio.frames() {
            for channel in audio.channels() {
                let sample = channel[frame];
                match info.sample_format {
                    SampleFormat::Pcm8 => writer
                        .write_sample(quantize(sample, 127.0) as i8)
                        .map_err(write_err)?,
                    SampleFormat::Pcm16 => writer
                        .write_sample(quantize(sample, i16::MAX as f64) as i16)
                        .map_err(write_err)?,
                    SampleFormat::Pcm24 => writer
                        .write_sample(quantize(sample, 8_388_607.0))
                        .map_err(write_err)?,
                    SampleFormat::Pcm32 => writer
                        .write_sample(quantize(sample, i32::MAX as f64))
                        .map_err(write_err)?,
                    SampleFormat::Float32 | SampleFormat::Float64 => {
                        writer.write_sample(sample).map_err(write_err)?
                    }
                }
            }
        }

        writer
            .finalize()
            .map_err(|e| hound_error(e, path, ErrorKind::FileClosingError))
    }
}
