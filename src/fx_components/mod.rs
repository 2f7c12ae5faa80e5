// src/fx_components/mod.rs

// Declare all component modules
pub mod distortion;
pub mod echo;
pub mod fade;
pub mod gain;
pub mod normalization;
pub mod reverb;
pub mod reverse;
pub mod simd;

// Publicly export the primary struct and the Params struct from each module
pub use distortion::{Distortion, DistortionMode, Params as DistortionParams};
pub use echo::{Echo, Params as EchoParams};
pub use fade::{Fade, FadeMode, Params as FadeParams};
pub use gain::{Gain, Params as GainParams};
pub use normalization::{Normalization, NormalizationMode, Params as NormalizationParams};
pub use reverb::{Params as ReverbParams, Reverb};
pub use reverse::{Params as ReverseParams, Reverse};

use crate::error::{EngineError, EngineResult, ErrorKind};
use crate::fx::{EffectKind, EffectParams};

/// A common interface for every range-bounded, in-place effect.
///
/// Effects work on one channel's samples at a time; multi-channel files are processed by
/// calling `process` once per channel.
pub trait Effect: Send {
    fn kind(&self) -> EffectKind;

    /// Installs new parameters. Parameters for a different effect are rejected.
    fn set_params(&mut self, params: EffectParams) -> EngineResult<()>;

    /// Processes the configured range of `samples` in place.
    ///
    /// The range is re-validated against `samples` first; on any error nothing is written.
    fn process(&mut self, samples: &mut [f32]) -> EngineResult<()>;
}

/// Creates an unconfigured effect of the given kind.
pub fn create_effect(kind: EffectKind) -> Box<dyn Effect> {
    match kind {
        EffectKind::Gain => Box::new(Gain::new()),
        EffectKind::Echo => Box::new(Echo::new()),
        EffectKind::Fade => Box::new(Fade::new()),
        EffectKind::Normalization => Box::new(Normalization::new()),
        EffectKind::Distortion => Box::new(Distortion::new()),
        EffectKind::Reverse => Box::new(Reverse::new()),
        EffectKind::Reverb => Box::new(Reverb::new()),
    }
}

pub(crate) fn wrong_params(expected: EffectKind, got: &EffectParams) -> EngineError {
    EngineError::new(
        ErrorKind::InvalidEffectParameters,
        format!("{} effect was given {} parameters", expected, got.kind()),
    )
}

pub(crate) fn not_initialized(kind: EffectKind) -> EngineError {
    EngineError::new(
        ErrorKind::EffectNotInitialized,
        format!("{} effect has no parameters", kind),
    )
}

/// Rejects NaN and infinities before a value is clamped into its range.
pub(crate) fn finite(name: &str, value: f32) -> EngineResult<f32> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(EngineError::new(
            ErrorKind::InvalidEffectParameters,
            format!("{} must be a finite number, got {}", name, value),
        ))
    }
}

/// Runs a fallible parameter constructor and reports its error, if any, to `sink`.
pub(crate) fn report_invalid<T>(
    result: EngineResult<T>,
    sink: &dyn crate::error::ErrorSink,
) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            err.report(sink);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollectingErrorSink;
    use crate::fx::SampleRange;

    fn all_params(range: SampleRange, sink: &CollectingErrorSink) -> Vec<EffectParams> {
        vec![
            GainParams::new(range, 2.0, sink).unwrap().into(),
            EchoParams::new(range, 1, 0.5, sink).unwrap().into(),
            FadeParams::new(range, 0.0, 1.0, FadeMode::In, sink).unwrap().into(),
            NormalizationParams::new(range, 0.9, NormalizationMode::Peak, sink)
                .unwrap()
                .into(),
            DistortionParams::new(range, 3.0, DistortionMode::SoftClipping, sink)
                .unwrap()
                .into(),
            ReverseParams::new(range, sink).unwrap().into(),
            ReverbParams::new(range, 20.0, 0.5, 0.5, 0.5, 44_100, sink)
                .unwrap()
                .into(),
        ]
    }

    #[test]
    fn every_effect_rejects_out_of_buffer_ranges_without_writing() {
        let sink = CollectingErrorSink::new();
        let range = SampleRange::new(2, 40).unwrap();
        for params in all_params(range, &sink) {
            let mut effect = create_effect(params.kind());
            effect.set_params(params.clone()).unwrap();

            let original: Vec<f32> = (0..10).map(|i| i as f32 * 0.05).collect();
            let mut samples = original.clone();
            let err = effect.process(&mut samples).unwrap_err();
            assert_eq!(err.kind, ErrorKind::InvalidProcessingRange, "{}", params.kind());
            assert_eq!(
                samples.iter().map(|s| s.to_bits()).collect::<Vec<_>>(),
                original.iter().map(|s| s.to_bits()).collect::<Vec<_>>()
            );
        }
    }

    #[test]
    fn every_effect_requires_parameters() {
        for kind in EffectKind::ALL {
            let mut effect = create_effect(kind);
            assert_eq!(effect.kind(), kind);
            let err = effect.process(&mut [0.0; 4]).unwrap_err();
            assert_eq!(err.kind, ErrorKind::EffectNotInitialized);
        }
    }

    #[test]
    fn every_effect_rejects_foreign_parameters() {
        let sink = CollectingErrorSink::new();
        let range = SampleRange::new(0, 3).unwrap();
        let reverse: EffectParams = ReverseParams::new(range, &sink).unwrap().into();
        let gain: EffectParams = GainParams::new(range, 1.0, &sink).unwrap().into();
        for kind in EffectKind::ALL {
            let mut effect = create_effect(kind);
            let foreign = if kind == EffectKind::Reverse {
                gain.clone()
            } else {
                reverse.clone()
            };
            let err = effect.set_params(foreign).unwrap_err();
            assert_eq!(err.kind, ErrorKind::InvalidEffectParameters);
        }
    }
}
