// src/fx_components/gain.rs

//! A simple audio gain component.
//!
//! Multiplies the selected range by a fixed factor and clamps the result to `[-1, 1]`.
use crate::error::{EngineResult, ErrorSink};
use crate::fx::{EffectKind, EffectParams, SampleRange};
use crate::fx_components::{finite, not_initialized, report_invalid, simd, wrong_params, Effect};

pub const MIN_GAIN: f32 = 0.0;
pub const MAX_GAIN: f32 = 5.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Params {
    range: SampleRange,
    gain: f32,
}

impl Params {
    /// Builds gain parameters, clamping `gain` into `[0, 5]`. Invalid input is reported.
    pub fn new(range: SampleRange, gain: f32, sink: &dyn ErrorSink) -> Option<Self> {
        report_invalid(Self::try_new(range, gain), sink)
    }

    pub fn try_new(range: SampleRange, gain: f32) -> EngineResult<Self> {
        let gain = finite("gain", gain)?.clamp(MIN_GAIN, MAX_GAIN);
        Ok(Self { range, gain })
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

    pub fn set_gain(&mut self, gain: f32) -> EngineResult<()> {
        self.gain = finite("gain", gain)?.clamp(MIN_GAIN, MAX_GAIN);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct Gain {
    params: Option<Params>,
}

impl Gain {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Effect for Gain {
    fn kind(&self) -> EffectKind {
        EffectKind::Gain
    }

    fn set_params(&mut self, params: EffectParams) -> EngineResult<()> {
        match params {
            EffectParams::Gain(p) => {
                self.params = Some(p);
                Ok(())
            }
            other => Err(wrong_params(EffectKind::Gain, &other)),
        }
    }

    fn process(&mut self, samples: &mut [f32]) -> EngineResult<()> {
        let params = self.params.as_ref().ok_or_else(|| not_initialized(self.kind()))?;
        params.range.validate(samples.len())?;

        // Unity gain still clamps, so out-of-range input is normalised into [-1, 1].
        (simd::kernels().gain)(params.range.slice_mut(samples), params.gain);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CollectingErrorSink, ErrorKind};

    fn gain(range: SampleRange, value: f32) -> Gain {
        let sink = CollectingErrorSink::new();
        let mut effect = Gain::new();
        effect
            .set_params(Params::new(range, value, &sink).unwrap().into())
            .unwrap();
        effect
    }

    #[test]
    fn clamps_the_factor_and_the_samples() {
        let sink = CollectingErrorSink::new();
        let params = Params::new(SampleRange::new(0, 0).unwrap(), 9.0, &sink).unwrap();
        assert_eq!(params.gain(), MAX_GAIN);

        let mut samples = [0.5, -0.5, 0.1];
        gain(SampleRange::full(3).unwrap(), 5.0)
            .process(&mut samples)
            .unwrap();
        assert_eq!(samples[0], 1.0);
        assert_eq!(samples[1], -1.0);
        assert!((samples[2] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn only_touches_the_range() {
        let mut samples = [0.1; 12];
        gain(SampleRange::new(2, 9).unwrap(), 2.0)
            .process(&mut samples)
            .unwrap();
        assert_eq!(samples[0], 0.1);
        assert_eq!(samples[11], 0.1);
        assert!(samples[2..=9].iter().all(|s| (s - 0.2).abs() < 1e-6));
    }

    #[test]
    fn nan_gain_is_reported() {
        let sink = CollectingErrorSink::new();
        assert!(Params::new(SampleRange::new(0, 1).unwrap(), f32::NAN, &sink).is_none());
        assert!(sink.contains(ErrorKind::InvalidEffectParameters));
    }
}
