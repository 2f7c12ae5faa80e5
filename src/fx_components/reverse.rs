// src/fx_components/reverse.rs

//! Reverses the samples of an inclusive range in place.
use crate::error::{EngineResult, ErrorSink};
use crate::fx::{EffectKind, EffectParams, SampleRange};
use crate::fx_components::{not_initialized, wrong_params, Effect};

#[derive(Debug, Clone, PartialEq)]
pub struct Params {
    range: SampleRange,
}

impl Params {
    /// Reverse takes no settings beyond its range, so construction cannot fail.
    pub fn new(range: SampleRange, _sink: &dyn ErrorSink) -> Option<Self> {
        Some(Self { range })
    }

    pub fn range(&self) -> SampleRange {
        self.range
    }

    pub fn set_range(&mut self, range: SampleRange) {
        self.range = range;
    }
}

#[derive(Debug, Default)]
pub struct Reverse {
    params: Option<Params>,
}

impl Reverse {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Effect for Reverse {
    fn kind(&self) -> EffectKind {
        EffectKind::Reverse
    }

    fn set_params(&mut self, params: EffectParams) -> EngineResult<()> {
        match params {
            EffectParams::Reverse(p) => {
                self.params = Some(p);
                Ok(())
            }
            other => Err(wrong_params(EffectKind::Reverse, &other)),
        }
    }

    fn process(&mut self, samples: &mut [f32]) -> EngineResult<()> {
        let params = self.params.as_ref().ok_or_else(|| not_initialized(EffectKind::Reverse))?;
        params.range.validate(samples.len())?;
        params.range.slice_mut(samples).reverse();
        Ok(())
    }
}
