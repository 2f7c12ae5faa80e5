// src/fx_components/normalization.rs

//! Peak / RMS normalization.
//!
//! Computes one gain for the whole range and applies it with the shared gain kernel.
use crate::error::{EngineResult, ErrorSink};
use crate::fx::{EffectKind, EffectParams, SampleRange};
use crate::fx_components::{finite, not_initialized, report_invalid, simd, wrong_params, Effect};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NormalizationMode {
    Peak,
    /// Scales towards a target RMS level, limited so the peak never passes the target.
    /// Sparse signals with a low RMS therefore end up peak-normalized.
    Rms,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Params {
    range: SampleRange,
    target: f32,
    mode: NormalizationMode,
}

impl Params {
    pub fn new(
        range: SampleRange,
        target: f32,
        mode: NormalizationMode,
        sink: &dyn ErrorSink,
    ) -> Option<Self> {
        report_invalid(Self::try_new(range, target, mode), sink)
    }

    pub fn try_new(range: SampleRange, target: f32, mode: NormalizationMode) -> EngineResult<Self> {
        let target = finite("target level", target)?.clamp(0.0, 1.0);
        Ok(Self {
            range,
            target,
            mode,
        })
    }

    pub fn range(&self) -> SampleRange {
        self.range
    }

    pub fn set_range(&mut self, range: SampleRange) {
        self.range = range;
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn mode(&self) -> NormalizationMode {
        self.mode
    }
}

#[derive(Debug, Default)]
pub struct Normalization {
    params: Option<Params>,
}

impl Normalization {
    pub fn new() -> Self {
        Self::default()
    }
}

fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
}

fn rms(samples: &[f32]) -> f32 {
    let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / samples.len() as f64).sqrt() as f32
}

impl Effect for Normalization {
    fn kind(&self) -> EffectKind {
        EffectKind::Normalization
    }

    fn set_params(&mut self, params: EffectParams) -> EngineResult<()> {
        match params {
            EffectParams::Normalization(p) => {
                self.params = Some(p);
                Ok(())
            }
            other => Err(wrong_params(EffectKind::Normalization, &other)),
        }
    }

    fn process(&mut self, samples: &mut [f32]) -> EngineResult<()> {
        let params = self
            .params
            .as_ref()
            .ok_or_else(|| not_initialized(EffectKind::Normalization))?;
        params.range.validate(samples.len())?;

        let region = params.range.slice_mut(samples);
        let peak = peak(region);
        if peak == 0.0 {
            // Silence stays silent.
            return Ok(());
        }
        let gain = match params.mode {
            NormalizationMode::Peak => params.target / peak,
            NormalizationMode::Rms => (params.target / rms(region)).min(params.target / peak),
        };

        (simd::kernels().gain)(region, gain);
        Ok(())
    }
}
