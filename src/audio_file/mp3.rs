// src/audio_file/mp3.rs

//! MP3 decoding through `rodio` and encoding through LAME.

use super::{
    check_channel_count, check_sample_rate, io_error_kind, AudioData, AudioFormat, PlanarAudio,
    SampleFormat,
};
use crate::error::{EngineError, EngineResult, ErrorKind};
use mp3lame_encoder::{
    Builder as Mp3Builder, FlushNoGap, InterleavedPcm, MonoPcm, Quality as Mp3Quality,
};
use rodio::decoder::DecoderError;
use rodio::{Decoder, Source};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;

/// Room LAME asks for when flushing its last frames.
const FLUSH_RESERVE: usize = 7200;

#[derive(Debug, Clone, PartialEq)]
pub struct Mp3File {
    pub(crate) data: AudioData,
}

/// MP3 output always encodes from 16-bit PCM.
pub(crate) fn check_write_format(format: SampleFormat) -> EngineResult<()> {
    if format != SampleFormat::Pcm16 {
        return Err(EngineError::new(
            ErrorKind::InvalidBitDepth,
            format!("MP3 output encodes 16-bit PCM, got {:?}", format),
        ));
    }
    Ok(())
}

fn encode_error(what: &str, detail: impl std::fmt::Display) -> EngineError {
    EngineError::new(
        ErrorKind::FileWriteError,
        format!("failed to {} MP3: {}", what, detail),
    )
}

impl Mp3File {
    pub fn new(audio: PlanarAudio, sample_rate: u32) -> EngineResult<Self> {
        Ok(Self {
            data: AudioData::new(audio, sample_rate, 16, AudioFormat::Mp3, false)?,
        })
    }

    pub fn read(path: &Path) -> EngineResult<Self> {
        let file = File::open(path).map_err(|e| {
            EngineError::new(
                io_error_kind(&e, ErrorKind::FileOpenError),
                format!("{}: {}", path.display(), e),
            )
        })?;
        let source = Decoder::new(BufReader::new(file)).map_err(|e| {
            let kind = match e {
                DecoderError::UnrecognizedFormat => ErrorKind::UnsupportedFileFormat,
                _ => ErrorKind::CorruptedAudioData,
            };
            EngineError::new(kind, format!("{}: {}", path.display(), e))
        })?;

        let sample_rate = source.sample_rate();
        let num_channels = source.channels() as usize;
        check_channel_count(num_channels)?;
        // Rodio decoders decode to i16. We must map and convert to f32.
        let all_samples: Vec<f32> = source.map(|s| s as f32 / i16::MAX as f32).collect();
        if all_samples.is_empty() {
            return Err(EngineError::new(
                ErrorKind::EmptyAudioBuffer,
                format!("{} decoded to no samples", path.display()),
            ));
        }

        // A truncated last frame is dropped rather than rejected.
        let whole = all_samples.len() - all_samples.len() % num_channels;
        let audio = PlanarAudio::from_interleaved(&all_samples[..whole], num_channels)?;
        let mut data = AudioData::new(audio, sample_rate, 16, AudioFormat::Mp3, false)?;
        data.source = Some(path.to_path_buf());
        Ok(Self { data })
    }

    pub fn write(&self) -> EngineResult<()> {
        let info = self.data.write_info()?;
        check_write_format(info.sample_format)?;
        check_sample_rate(info.sample_rate)?;
        let audio = &self.data.audio;
        let channels = audio.channel_count();
        check_channel_count(channels)?;

        let samples: Vec<i16> = audio
            .interleaved()
            .iter()
            .map(|s| (s.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16)
            .collect();

        let mut builder = Mp3Builder::new()
            .ok_or_else(|| encode_error("initialise", "encoder allocation failed"))?;
        builder
            .set_sample_rate(info.sample_rate)
            .map_err(|err| encode_error("configure sample rate for", err))?;
        builder
            .set_num_channels(channels as u8)
            .map_err(|err| encode_error("configure channels for", err))?;
        builder
            .set_quality(Mp3Quality::Best)
            .map_err(|err| encode_error("configure quality for", err))?;
        let mut encoder = builder
            .build()
            .map_err(|err| encode_error("start", err))?;

        let mut output = Vec::new();
        output.reserve(mp3lame_encoder::max_required_buffer_size(audio.frames()));

        let encoded = if channels == 1 {
            encoder
                .encode(MonoPcm(&samples[..]), output.spare_capacity_mut())
                .map_err(|err| encode_error("encode", format!("{err:?}")))?
        } else {
            encoder
                .encode(InterleavedPcm(&samples[..]), output.spare_capacity_mut())
                .map_err(|err| encode_error("encode", format!("{err:?}")))?
        };
        // SAFETY: the encoder initialised exactly `encoded` bytes of the spare capacity.
        unsafe {
            output.set_len(output.len() + encoded);
        }

        output.reserve(FLUSH_RESERVE);
        let flushed = encoder
            .flush::<FlushNoGap>(output.spare_capacity_mut())
            .map_err(|err| encode_error("finalise", format!("{err:?}")))?;
        // SAFETY: as above, for the flushed bytes.
        unsafe {
            output.set_len(output.len() + flushed);
        }

        fs::write(&info.path, &output).map_err(|e| {
            EngineError::new(
                io_error_kind(&e, ErrorKind::FileWriteError),
                format!("{}: {}", info.path.display(), e),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_file::WriteInfo;

    #[test]
    fn encodes_and_decodes_a_stereo_tone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.mp3");
        let frames = 44_100 / 2;
        let tone: Vec<f32> = (0..frames)
            .map(|i| (i as f32 * 440.0 * std::f32::consts::TAU / 44_100.0).sin() * 0.5)
            .collect();
        let audio = PlanarAudio::from_channels(vec![tone.clone(), tone]).unwrap();

        let mut file = Mp3File::new(audio, 44_100).unwrap();
        file.data.write_info = Some(WriteInfo::new(&path, 44_100, SampleFormat::Pcm16));
        file.write().unwrap();

        let read = Mp3File::read(&path).unwrap();
        assert_eq!(read.data.metadata.sample_rate, 44_100);
        assert_eq!(read.data.metadata.channels, 2);
        assert_eq!(read.data.metadata.format, AudioFormat::Mp3);
        // Encoder delay and padding may change the length by up to a frame or two.
        assert!(read.data.audio.frames() + 2304 >= frames);
        let peak = read
            .data
            .audio
            .channel(0)
            .iter()
            .fold(0.0f32, |acc, s| acc.max(s.abs()));
        assert!(peak > 0.3 && peak < 0.7, "peak {}", peak);
    }

    #[test]
    fn only_pcm16_output_is_accepted() {
        assert!(check_write_format(SampleFormat::Pcm16).is_ok());
        assert_eq!(
            check_write_format(SampleFormat::Float32).unwrap_err().kind,
            ErrorKind::InvalidBitDepth
        );
    }
}
