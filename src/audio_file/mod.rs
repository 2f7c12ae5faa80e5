// src/audio_file/mod.rs

//! In-memory audio files: planar sample storage, format metadata and the WAV / MP3 codecs.

pub mod mp3;
pub mod wav;

pub use mp3::Mp3File;
pub use wav::WavFile;

use crate::error::{EngineError, EngineResult, ErrorKind, ErrorSink};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Sample rates accepted for recording, reverb and file output.
pub const SUPPORTED_SAMPLE_RATES: [u32; 9] =
    [8000, 11025, 12000, 16000, 22050, 24000, 32000, 44100, 48000];

pub fn is_supported_sample_rate(rate: u32) -> bool {
    SUPPORTED_SAMPLE_RATES.contains(&rate)
}

pub(crate) fn check_channel_count(channels: usize) -> EngineResult<()> {
    if channels == 1 || channels == 2 {
        Ok(())
    } else {
        Err(EngineError::new(
            ErrorKind::InvalidChannelCount,
            format!("only mono and stereo audio is supported, got {} channels", channels),
        ))
    }
}

pub(crate) fn check_sample_rate(rate: u32) -> EngineResult<()> {
    if is_supported_sample_rate(rate) {
        Ok(())
    } else {
        Err(EngineError::new(
            ErrorKind::InvalidSampleRate,
            format!("unsupported sample rate {} Hz", rate),
        ))
    }
}

// --- Planar storage ---

/// One `Vec<f32>` per channel, all of the same length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanarAudio {
    channels: Vec<Vec<f32>>,
}

impl PlanarAudio {
    /// `channel_count` channels of `frames` zeroed samples each.
    pub fn silent(channel_count: usize, frames: usize) -> Self {
        Self {
            channels: vec![vec![0.0; frames]; channel_count],
        }
    }

    pub fn from_channels(channels: Vec<Vec<f32>>) -> EngineResult<Self> {
        if let Some(first) = channels.first() {
            let frames = first.len();
            if let Some(bad) = channels.iter().position(|c| c.len() != frames) {
                return Err(EngineError::new(
                    ErrorKind::BufferSizeMismatch,
                    format!(
                        "channel {} has {} samples, channel 0 has {}",
                        bad,
                        channels[bad].len(),
                        frames
                    ),
                ));
            }
        }
        Ok(Self { channels })
    }

    /// Splits interleaved samples into channels. A trailing partial frame is an error.
    pub fn from_interleaved(samples: &[f32], channel_count: usize) -> EngineResult<Self> {
        if channel_count == 0 {
            return Err(EngineError::new(
                ErrorKind::InvalidChannelCount,
                "cannot deinterleave into zero channels",
            ));
        }
        if samples.len() % channel_count != 0 {
            return Err(EngineError::new(
                ErrorKind::CorruptedAudioData,
                format!(
                    "{} samples do not divide into {} channels",
                    samples.len(),
                    channel_count
                ),
            ));
        }
        let frames = samples.len() / channel_count;
        let mut channels = vec![Vec::with_capacity(frames); channel_count];
        for frame in samples.chunks_exact(channel_count) {
            for (channel, &sample) in channels.iter_mut().zip(frame) {
                channel.push(sample);
            }
        }
        Ok(Self { channels })
    }

    pub fn interleaved(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.frames() * self.channel_count());
        for frame in 0..self.frames() {
            out.extend(self.channels.iter().map(|c| c[frame]));
        }
        out
    }

    /// Frames per channel.
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Total samples across channels, `frames * channels`.
    pub fn len(&self) -> usize {
        self.frames() * self.channel_count()
    }

    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.channels[index]
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    /// Mutable access to the per-channel vectors. Callers that change lengths must keep every
    /// channel the same length.
    pub fn channels_mut(&mut self) -> &mut [Vec<f32>] {
        &mut self.channels
    }

    /// Empties every channel while keeping the channel count.
    pub fn clear(&mut self) {
        for channel in &mut self.channels {
            channel.clear();
        }
    }

    pub fn into_channels(self) -> Vec<Vec<f32>> {
        self.channels
    }
}

// --- Metadata ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioFormat {
    Wav,
    Mp3,
}

impl AudioFormat {
    pub fn extension(self) -> &'static str {
        match self {
            AudioFormat::Wav => "wav",
            AudioFormat::Mp3 => "mp3",
        }
    }

    pub fn from_path(path: &Path) -> EngineResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| {
                EngineError::new(
                    ErrorKind::InvalidFilePath,
                    format!("{} has no file extension", path.display()),
                )
            })?;
        ext.parse()
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for AudioFormat {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "wav" | "wave" => Ok(AudioFormat::Wav),
            "mp3" => Ok(AudioFormat::Mp3),
            other => Err(EngineError::new(
                ErrorKind::UnsupportedFileFormat,
                format!("unsupported audio format '{}'", other),
            )),
        }
    }
}

/// Per-file metadata. `length` counts interleaved samples (`frames * channels`).
#[derive(Debug, Clone, PartialEq)]
pub struct AudioMetadata {
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_depth: u16,
    pub length: usize,
    pub format: AudioFormat,
    pub seekable: bool,
}

/// Encoded sample layout for file output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    Pcm8,
    Pcm16,
    Pcm24,
    Pcm32,
    Float32,
    Float64,
}

impl SampleFormat {
    pub fn bits(self) -> u16 {
        match self {
            SampleFormat::Pcm8 => 8,
            SampleFormat::Pcm16 => 16,
            SampleFormat::Pcm24 => 24,
            SampleFormat::Pcm32 | SampleFormat::Float32 => 32,
            SampleFormat::Float64 => 64,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, SampleFormat::Float32 | SampleFormat::Float64)
    }
}

/// Where and how [`save_audio`] writes a file.
///
/// The sample rate is written to the header as-is; samples are not resampled.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteInfo {
    pub path: PathBuf,
    pub sample_rate: u32,
    pub sample_format: SampleFormat,
}

impl WriteInfo {
    pub fn new(path: impl Into<PathBuf>, sample_rate: u32, sample_format: SampleFormat) -> Self {
        Self {
            path: path.into(),
            sample_rate,
            sample_format,
        }
    }
}

// --- The file sum type ---

/// Samples, metadata and pending write configuration shared by every format.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioData {
    pub(crate) audio: PlanarAudio,
    pub(crate) metadata: AudioMetadata,
    pub(crate) source: Option<PathBuf>,
    pub(crate) write_info: Option<WriteInfo>,
}

impl AudioData {
    pub(crate) fn new(
        audio: PlanarAudio,
        sample_rate: u32,
        bit_depth: u16,
        format: AudioFormat,
        seekable: bool,
    ) -> EngineResult<Self> {
        check_channel_count(audio.channel_count())?;
        let metadata = AudioMetadata {
            sample_rate,
            channels: audio.channel_count() as u16,
            bit_depth,
            length: audio.len(),
            format,
            seekable,
        };
        Ok(Self {
            audio,
            metadata,
            source: None,
            write_info: None,
        })
    }

    pub(crate) fn write_info(&self) -> EngineResult<&WriteInfo> {
        self.write_info.as_ref().ok_or_else(|| {
            EngineError::new(
                ErrorKind::InvalidConfiguration,
                "no write destination configured; call set_write_info first",
            )
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AudioFile {
    Wav(WavFile),
    Mp3(Mp3File),
}

impl AudioFile {
    /// Reads `path` as the given format.
    pub fn open(path: &Path, format: AudioFormat) -> EngineResult<Self> {
        if !path.exists() {
            return Err(EngineError::new(
                ErrorKind::FileNotFound,
                format!("{} does not exist", path.display()),
            ));
        }
        if !path.is_file() {
            return Err(EngineError::new(
                ErrorKind::InvalidFilePath,
                format!("{} is not a file", path.display()),
            ));
        }
        match format {
            AudioFormat::Wav => Ok(AudioFile::Wav(WavFile::read(path)?)),
            AudioFormat::Mp3 => Ok(AudioFile::Mp3(Mp3File::read(path)?)),
        }
    }

    /// Wraps in-memory audio as a file of the given format.
    pub fn from_planar(
        audio: PlanarAudio,
        sample_rate: u32,
        format: AudioFormat,
    ) -> EngineResult<Self> {
        match format {
            AudioFormat::Wav => Ok(AudioFile::Wav(WavFile::new(audio, sample_rate)?)),
            AudioFormat::Mp3 => Ok(AudioFile::Mp3(Mp3File::new(audio, sample_rate)?)),
        }
    }

    fn data(&self) -> &AudioData {
        match self {
            AudioFile::Wav(file) => &file.data,
            AudioFile::Mp3(file) => &file.data,
        }
    }

    fn data_mut(&mut self) -> &mut AudioData {
        match self {
            AudioFile::Wav(file) => &mut file.data,
            AudioFile::Mp3(file) => &mut file.data,
        }
    }

    pub fn format(&self) -> AudioFormat {
        self.data().metadata.format
    }

    pub fn audio(&self) -> &PlanarAudio {
        &self.data().audio
    }

    /// Mutable planar samples. Length metadata is refreshed by [`AudioFile::sync_length`].
    pub fn audio_mut(&mut self) -> &mut PlanarAudio {
        &mut self.data_mut().audio
    }

    pub fn metadata(&self) -> &AudioMetadata {
        &self.data().metadata
    }

    pub fn frames(&self) -> usize {
        self.audio().frames()
    }

    pub fn channel_count(&self) -> usize {
        self.audio().channel_count()
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        self.audio().channel(index)
    }

    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        self.audio_mut().channel_mut(index)
    }

    /// The file this audio was read from, if any.
    pub fn source_path(&self) -> Option<&Path> {
        self.data().source.as_deref()
    }

    /// Recomputes `metadata.length` as `frames * channels`.
    pub fn sync_length(&mut self) {
        let data = self.data_mut();
        data.metadata.length = data.audio.len();
    }

    pub fn write_info(&self) -> Option<&WriteInfo> {
        self.data().write_info.as_ref()
    }

    /// Validates and stores the output configuration used by [`save_audio`].
    pub fn set_write_info(&mut self, info: WriteInfo) -> EngineResult<()> {
        check_sample_rate(info.sample_rate)?;
        check_channel_count(self.channel_count())?;
        match self {
            AudioFile::Wav(_) => wav::check_write_format(info.sample_format)?,
            AudioFile::Mp3(_) => mp3::check_write_format(info.sample_format)?,
        }
        self.data_mut().write_info = Some(info);
        Ok(())
    }

    /// Writes the file with its configured [`WriteInfo`].
    pub fn save(&self) -> EngineResult<()> {
        match self {
            AudioFile::Wav(file) => file.write(),
            AudioFile::Mp3(file) => file.write(),
        }
    }
}

/// Loads `path`, dispatching on `ext` (`"wav"` or `"mp3"`). Errors are reported to `sink`.
pub fn load_audio(path: &Path, ext: &str, sink: &dyn ErrorSink) -> Option<AudioFile> {
    let result = ext
        .parse::<AudioFormat>()
        .and_then(|format| AudioFile::open(path, format));
    match result {
        Ok(file) => {
            log::info!(
                "Loaded {} ({} ch, {} Hz, {} frames)",
                path.display(),
                file.channel_count(),
                file.metadata().sample_rate,
                file.frames()
            );
            Some(file)
        }
        Err(err) => {
            err.report(sink);
            None
        }
    }
}

/// Writes `file` with its configured [`WriteInfo`]. Errors are reported to `sink`.
pub fn save_audio(file: &AudioFile, sink: &dyn ErrorSink) -> bool {
    match file.save() {
        Ok(()) => {
            if let Some(info) = file.write_info() {
                log::info!("Saved {}", info.path.display());
            }
            true
        }
        Err(err) => {
            err.report(sink);
            false
        }
    }
}

pub(crate) fn io_error_kind(err: &std::io::Error, fallback: ErrorKind) -> ErrorKind {
    match err.kind() {
        std::io::ErrorKind::NotFound => ErrorKind::FileNotFound,
        std::io::ErrorKind::PermissionDenied => ErrorKind::InsufficientPermissions,
        _ => fallback,
    }
}
