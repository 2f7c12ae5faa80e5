// src/fx_components/distortion.rs

//! Applies non-linear distortion to an audio signal.
use crate::error::{EngineError, EngineResult, ErrorKind, ErrorSink};
use crate::fx::{EffectKind, EffectParams, SampleRange};
use crate::fx_components::{finite, not_initialized, report_invalid, wrong_params, Effect};

pub const MAX_DRIVE: f32 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DistortionMode {
    /// `tanh(g * s) / tanh(g)`: unity at full scale, smooth saturation below it.
    SoftClipping,
    /// `clamp(g * s, -1, 1)`.
    HardClipping,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Params {
    range: SampleRange,
    gain: f32,
    mode: DistortionMode,
}

impl Params {
    pub fn new(
        range: SampleRange,
        gain: f32,
        mode: DistortionMode,
        sink: &dyn ErrorSink,
    ) -> Option<Self> {
        report_invalid(Self::try_new(range, gain, mode), sink)
    }

    /// `gain` must be strictly positive and is capped at [`MAX_DRIVE`].
    pub fn try_new(range: SampleRange, gain: f32, mode: DistortionMode) -> EngineResult<Self> {
        let gain = finite("drive", gain)?;
        if gain <= 0.0 {
            return Err(EngineError::new(
                ErrorKind::InvalidEffectParameters,
                format!("distortion drive must be positive, got {}", gain),
            ));
        }
        Ok(Self {
            range,
            gain: gain.min(MAX_DRIVE),
            mode,
        })
    }

    pub fn range(&self) -> SampleRange {
        self.range
    }

    pub fn set_range(&mut self, range: SampleRange) {
        self.range = range;
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn mode(&self) -> DistortionMode {
        self.mode
    }
}

#[derive(Debug, Default)]
pub struct Distortion {
    params: Option<Params>,
}

impl Distortion {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Effect for Distortion {
    fn kind(&self) -> EffectKind {
        EffectKind::Distortion
    }

    fn set_params(&mut self, params: EffectParams) -> EngineResult<()> {
        match params {
            EffectParams::Distortion(p) => {
                self.params = Some(p);
                Ok(())
            }
            other => Err(wrong_params(EffectKind::Distortion, &other)),
        }
    }

    fn process(&mut self, samples: &mut [f32]) -> EngineResult<()> {
        let params = self
            .params
            .as_ref()
            .ok_or_else(|| not_initialized(EffectKind::Distortion))?;
        params.range.validate(samples.len())?;

        let drive = params.gain;
        let region = params.range.slice_mut(samples);
        match params.mode {
            DistortionMode::SoftClipping => {
                let norm = drive.tanh();
                for sample in region.iter_mut() {
                    *sample = (drive * *sample).tanh() / norm;
                }
            }
            DistortionMode::HardClipping => {
                for sample in region.iter_mut() {
                    *sample = (drive * *sample).clamp(-1.0, 1.0);
                }
            }
        }
        Ok(())
    }
}
