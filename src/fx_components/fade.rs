// src/fx_components/fade.rs

//! Linear fade in / fade out over a range.
use crate::error::{EngineError, EngineResult, ErrorKind, ErrorSink};
use crate::fx::{EffectKind, EffectParams, SampleRange};
use crate::fx_components::{finite, not_initialized, report_invalid, simd, wrong_params, Effect};

pub const MAX_FADE_GAIN: f32 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FadeMode {
    /// Ramp from the low gain up to the high gain.
    In,
    /// Ramp from the high gain down to the low gain.
    Out,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Params {
    range: SampleRange,
    low_gain: f32,
    high_gain: f32,
    mode: FadeMode,
}

impl Params {
    pub fn new(
        range: SampleRange,
        low_gain: f32,
        high_gain: f32,
        mode: FadeMode,
        sink: &dyn ErrorSink,
    ) -> Option<Self> {
        report_invalid(Self::try_new(range, low_gain, high_gain, mode), sink)
    }

    /// Both gains are clamped into `[0, 2]`; the clamped low gain may not exceed the high gain.
    pub fn try_new(
        range: SampleRange,
        low_gain: f32,
        high_gain: f32,
        mode: FadeMode,
    ) -> EngineResult<Self> {
        let low_gain = finite("low gain", low_gain)?.clamp(0.0, MAX_FADE_GAIN);
        let high_gain = finite("high gain", high_gain)?.clamp(0.0, MAX_FADE_GAIN);
        if low_gain > high_gain {
            return Err(EngineError::new(
                ErrorKind::InvalidEffectParameters,
                format!(
                    "fade low gain {} is above high gain {}",
                    low_gain, high_gain
                ),
            ));
        }
        Ok(Self {
            range,
            low_gain,
            high_gain,
            mode,
        })
    }

    pub fn range(&self) -> SampleRange {
        self.range
    }

    pub fn set_range(&mut self, range: SampleRange) {
        self.range = range;
    }

    pub fn low_gain(&self) -> f32 {
        self.low_gain
    }

    pub fn high_gain(&self) -> f32 {
        self.high_gain
    }

    pub fn mode(&self) -> FadeMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: FadeMode) {
        self.mode = mode;
    }
}

#[derive(Debug, Default)]
pub struct Fade {
    params: Option<Params>,
}

impl Fade {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Effect for Fade {
    fn kind(&self) -> EffectKind {
        EffectKind::Fade
    }

    fn set_params(&mut self, params: EffectParams) -> EngineResult<()> {
        match params {
            EffectParams::Fade(p) => {
                self.params = Some(p);
                Ok(())
            }
            other => Err(wrong_params(EffectKind::Fade, &other)),
        }
    }

    fn process(&mut self, samples: &mut [f32]) -> EngineResult<()> {
        let params = self.params.as_ref().ok_or_else(|| not_initialized(EffectKind::Fade))?;
        params.range.validate(samples.len())?;

        let steps = params.range.len() - 1;
        let step = if steps == 0 {
            0.0
        } else {
            (params.high_gain - params.low_gain) / steps as f32
        };
        let (start_gain, step) = match params.mode {
            FadeMode::In => (params.low_gain, step),
            FadeMode::Out => (params.high_gain, -step),
        };

        (simd::kernels().fade)(params.range.slice_mut(samples), start_gain, step);
        Ok(())
    }
}
