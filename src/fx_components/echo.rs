// src/fx_components/echo.rs

//! A single-tap echo.
//!
//! Each sample past the first `delay_samples` of the range gets `decay` times the sample
//! `delay_samples` earlier mixed in. The mix reads the unprocessed input through a scratch
//! buffer, so the echo never feeds back into itself.
use crate::error::{EngineError, EngineResult, ErrorKind, ErrorSink};
use crate::fx::{EffectKind, EffectParams, SampleRange};
use crate::fx_components::{finite, not_initialized, report_invalid, simd, wrong_params, Effect};

#[derive(Debug, Clone, PartialEq)]
pub struct Params {
    range: SampleRange,
    delay_samples: usize,
    decay: f32,
}

impl Params {
    pub fn new(
        range: SampleRange,
        delay_samples: usize,
        decay: f32,
        sink: &dyn ErrorSink,
    ) -> Option<Self> {
        report_invalid(Self::try_new(range, delay_samples, decay), sink)
    }

    /// `delay_samples` must be positive; `decay` is clamped into `[0, 1]`.
    pub fn try_new(range: SampleRange, delay_samples: usize, decay: f32) -> EngineResult<Self> {
        if delay_samples == 0 {
            return Err(EngineError::new(
                ErrorKind::InvalidEffectParameters,
                "echo delay must be at least one sample",
            ));
        }
        let decay = finite("decay", decay)?.clamp(0.0, 1.0);
        Ok(Self {
            range,
            delay_samples,
            decay,
        })
    }

    pub fn range(&self) -> SampleRange {
        self.range
    }

    pub fn set_range(&mut self, range: SampleRange) {
        self.range = range;
    }

    pub fn delay_samples(&self) -> usize {
        self.delay_samples
    }

    pub fn decay(&self) -> f32 {
        self.decay
    }
}

#[derive(Debug, Default)]
pub struct Echo {
    params: Option<Params>,
    scratch: Vec<f32>,
}

impl Echo {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Effect for Echo {
    fn kind(&self) -> EffectKind {
        EffectKind::Echo
    }

    fn set_params(&mut self, params: EffectParams) -> EngineResult<()> {
        match params {
            EffectParams::Echo(p) => {
                self.params = Some(p);
                Ok(())
            }
            other => Err(wrong_params(EffectKind::Echo, &other)),
        }
    }

    fn process(&mut self, samples: &mut [f32]) -> EngineResult<()> {
        let params = self.params.as_ref().ok_or_else(|| not_initialized(EffectKind::Echo))?;
        params.range.validate(samples.len())?;
        if params.range.start() + params.delay_samples >= samples.len() {
            return Err(EngineError::new(
                ErrorKind::InsufficientSampleData,
                format!(
                    "echo of {} samples starting at {} needs more than {} samples",
                    params.delay_samples,
                    params.range.start(),
                    samples.len()
                ),
            ));
        }

        let region = params.range.slice_mut(samples);
        self.scratch.clear();
        self.scratch.resize(region.len(), 0.0);
        (simd::kernels().echo)(region, &mut self.scratch, params.delay_samples, params.decay);
        region.copy_from_slice(&self.scratch);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollectingErrorSink;

    fn echo(range: SampleRange, delay: usize, decay: f32) -> Echo {
        let sink = CollectingErrorSink::new();
        let mut effect = Echo::new();
        effect
            .set_params(Params::new(range, delay, decay, &sink).unwrap().into())
            .unwrap();
        effect
    }

    #[test]
    fn mixes_the_delayed_input() {
        let mut samples = [0.5, 0.0, 0.0, 0.2, 0.0];
        echo(SampleRange::full(5).unwrap(), 3, 0.5)
            .process(&mut samples)
            .unwrap();
        assert_eq!(&samples[..3], &[0.5, 0.0, 0.0]);
        assert!((samples[3] - 0.45).abs() < 1e-6);
        assert_eq!(samples[4], 0.0);
    }

    #[test]
    fn delay_past_the_buffer_is_insufficient_data() {
        let original = [0.1, 0.2, 0.3, 0.4];
        let mut samples = original;
        let err = echo(SampleRange::new(1, 3).unwrap(), 3, 0.5)
            .process(&mut samples)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InsufficientSampleData);
        assert_eq!(samples, original);
    }

    #[test]
    fn zero_delay_is_rejected() {
        let sink = CollectingErrorSink::new();
        assert!(Params::new(SampleRange::new(0, 3).unwrap(), 0, 0.5, &sink).is_none());
        assert!(sink.contains(ErrorKind::InvalidEffectParameters));
    }
}
