// src/fx.rs

//! Host-facing effect API: effect kinds, the tagged parameter sum and the `apply_effect`
//! entry points.

use crate::audio_file::PlanarAudio;
use crate::error::{EngineError, EngineResult, ErrorKind, ErrorSink};
use crate::fx_components::{
    self, DistortionParams, EchoParams, FadeParams, GainParams, NormalizationParams, ReverbParams,
    ReverseParams,
};
use rayon::prelude::*;
use std::fmt;
use std::str::FromStr;

/// The effects the engine can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectKind {
    Gain,
    Echo,
    Fade,
    Normalization,
    Distortion,
    Reverse,
    Reverb,
}

impl EffectKind {
    pub const ALL: [EffectKind; 7] = [
        EffectKind::Gain,
        EffectKind::Echo,
        EffectKind::Fade,
        EffectKind::Normalization,
        EffectKind::Distortion,
        EffectKind::Reverse,
        EffectKind::Reverb,
    ];
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EffectKind::Gain => "gain",
            EffectKind::Echo => "echo",
            EffectKind::Fade => "fade",
            EffectKind::Normalization => "normalization",
            EffectKind::Distortion => "distortion",
            EffectKind::Reverse => "reverse",
            EffectKind::Reverb => "reverb",
        };
        f.write_str(name)
    }
}

impl FromStr for EffectKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gain" => Ok(EffectKind::Gain),
            "echo" => Ok(EffectKind::Echo),
            "fade" => Ok(EffectKind::Fade),
            "normalize" | "normalization" => Ok(EffectKind::Normalization),
            "distortion" | "softclip" => Ok(EffectKind::Distortion),
            "reverse" => Ok(EffectKind::Reverse),
            "reverb" => Ok(EffectKind::Reverb),
            _ => Err(EngineError::new(
                ErrorKind::UnknownEffect,
                format!("unknown effect '{}'", s),
            )),
        }
    }
}

/// An inclusive `[start, end]` range of per-channel sample indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleRange {
    start: usize,
    end: usize,
}

impl SampleRange {
    pub fn new(start: usize, end: usize) -> EngineResult<Self> {
        if start > end {
            return Err(EngineError::new(
                ErrorKind::InvalidProcessingRange,
                format!("range start {} is after end {}", start, end),
            ));
        }
        Ok(Self { start, end })
    }

    /// The whole of a buffer of `len` samples.
    pub fn full(len: usize) -> EngineResult<Self> {
        if len == 0 {
            return Err(EngineError::new(
                ErrorKind::EmptyAudioBuffer,
                "cannot build a range over an empty buffer",
            ));
        }
        Self::new(0, len - 1)
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    /// Samples covered, both ends included.
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    /// Checks `0 <= start <= end < len`.
    pub fn validate(&self, len: usize) -> EngineResult<()> {
        if self.end >= len {
            return Err(EngineError::new(
                ErrorKind::InvalidProcessingRange,
                format!(
                    "range [{}, {}] does not fit a buffer of {} samples",
                    self.start, self.end, len
                ),
            ));
        }
        Ok(())
    }

    pub fn slice_mut<'a>(&self, samples: &'a mut [f32]) -> &'a mut [f32] {
        &mut samples[self.start..=self.end]
    }
}

/// Validated parameters for one effect, one variant per effect.
#[derive(Debug, Clone, PartialEq)]
pub enum EffectParams {
    Gain(GainParams),
    Echo(EchoParams),
    Fade(FadeParams),
    Normalization(NormalizationParams),
    Distortion(DistortionParams),
    Reverse(ReverseParams),
    Reverb(ReverbParams),
}

impl EffectParams {
    pub fn kind(&self) -> EffectKind {
        match self {
            EffectParams::Gain(_) => EffectKind::Gain,
            EffectParams::Echo(_) => EffectKind::Echo,
            EffectParams::Fade(_) => EffectKind::Fade,
            EffectParams::Normalization(_) => EffectKind::Normalization,
            EffectParams::Distortion(_) => EffectKind::Distortion,
            EffectParams::Reverse(_) => EffectKind::Reverse,
            EffectParams::Reverb(_) => EffectKind::Reverb,
        }
    }

    pub fn range(&self) -> SampleRange {
        match self {
            EffectParams::Gain(p) => p.range(),
            EffectParams::Echo(p) => p.range(),
            EffectParams::Fade(p) => p.range(),
            EffectParams::Normalization(p) => p.range(),
            EffectParams::Distortion(p) => p.range(),
            EffectParams::Reverse(p) => p.range(),
            EffectParams::Reverb(p) => p.range(),
        }
    }
}

impl From<GainParams> for EffectParams {
    fn from(p: GainParams) -> Self {
        EffectParams::Gain(p)
    }
}

impl From<EchoParams> for EffectParams {
    fn from(p: EchoParams) -> Self {
        EffectParams::Echo(p)
    }
}

impl From<FadeParams> for EffectParams {
    fn from(p: FadeParams) -> Self {
        EffectParams::Fade(p)
    }
}

impl From<NormalizationParams> for EffectParams {
    fn from(p: NormalizationParams) -> Self {
        EffectParams::Normalization(p)
    }
}

impl From<DistortionParams> for EffectParams {
    fn from(p: DistortionParams) -> Self {
        EffectParams::Distortion(p)
    }
}

impl From<ReverseParams> for EffectParams {
    fn from(p: ReverseParams) -> Self {
        EffectParams::Reverse(p)
    }
}

impl From<ReverbParams> for EffectParams {
    fn from(p: ReverbParams) -> Self {
        EffectParams::Reverb(p)
    }
}

fn run_effect(samples: &mut [f32], kind: EffectKind, params: &EffectParams) -> EngineResult<()> {
    if params.kind() != kind {
        return Err(EngineError::new(
            ErrorKind::InvalidEffectParameters,
            format!("{} effect was given {} parameters", kind, params.kind()),
        ));
    }
    let mut effect = fx_components::create_effect(kind);
    effect.set_params(params.clone())?;
    effect.process(samples)
}

/// Runs one effect in place over a single channel.
///
/// Errors are reported to `sink`; on failure the samples are left untouched.
pub fn apply_effect(
    samples: &mut [f32],
    kind: EffectKind,
    params: &EffectParams,
    sink: &dyn ErrorSink,
) -> bool {
    match run_effect(samples, kind, params) {
        Ok(()) => true,
        Err(err) => {
            err.report(sink);
            false
        }
    }
}

/// Runs one effect over every channel of `audio`, channels in parallel.
///
/// The range is checked against every channel before any of them is touched, so a range that
/// fails on one channel leaves the whole file unchanged.
pub fn apply_effect_all_channels(
    audio: &mut PlanarAudio,
    kind: EffectKind,
    params: &EffectParams,
    sink: &dyn ErrorSink,
) -> bool {
    let result = (|| -> EngineResult<()> {
        if audio.channel_count() == 0 {
            return Err(EngineError::new(
                ErrorKind::EmptyAudioBuffer,
                "audio has no channels",
            ));
        }
        for channel in audio.channels() {
            params.range().validate(channel.len())?;
        }
        audio
            .channels_mut()
            .par_iter_mut()
            .map(|channel| run_effect(channel, kind, params))
            .collect::<EngineResult<Vec<()>>>()?;
        Ok(())
    })();

    match result {
        Ok(()) => true,
        Err(err) => {
            err.report(sink);
            false
        }
    }
}
