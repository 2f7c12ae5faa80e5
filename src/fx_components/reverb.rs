// src/fx_components/reverb.rs

//! A Schroeder-style reverb effect component.
//!
//! Four comb filters run in parallel over the dry range and are averaged; the result is
//! diffused by two all-pass filters in series and mixed back with the dry signal.

use crate::audio_file::is_supported_sample_rate;
use crate::error::{EngineError, EngineResult, ErrorKind, ErrorSink};
use crate::fx::{EffectKind, EffectParams, SampleRange};
use crate::fx_components::{finite, not_initialized, report_invalid, wrong_params, Effect};

pub const MIN_DELAY_MS: f32 = 20.0;
pub const MAX_DELAY_MS: f32 = 1000.0;
pub const MAX_MIX: f32 = 2.0;
pub const MAX_FEEDBACK: f32 = 0.99;

/// Per-comb offsets from the base delay, in milliseconds.
pub const COMB_OFFSETS_MS: [f32; 4] = [0.0, -11.73, 19.31, -7.97];
pub const ALLPASS_DELAY_MS: f32 = 89.27;
pub const ALLPASS_GAIN: f32 = 0.131;

fn ms_to_samples(ms: f32, sample_rate: u32) -> usize {
    (ms * sample_rate as f32 / 1000.0).round().max(1.0) as usize
}

// --- Parameters ---

#[derive(Debug, Clone, PartialEq)]
pub struct Params {
    range: SampleRange,
    delay_ms: f32,
    wet_mix: f32,
    dry_mix: f32,
    gain: f32,
    sample_rate: u32,
}

impl Params {
    pub fn new(
        range: SampleRange,
        delay_ms: f32,
        wet_mix: f32,
        dry_mix: f32,
        gain: f32,
        sample_rate: u32,
        sink: &dyn ErrorSink,
    ) -> Option<Self> {
        report_invalid(
            Self::try_new(range, delay_ms, wet_mix, dry_mix, gain, sample_rate),
            sink,
        )
    }

    /// Clamps `delay_ms` into `[20, 1000]`, both mixes into `[-2, 2]` and the comb feedback
    /// `gain` into `[0, 0.99]`. The sample rate must be one of the supported rates.
    pub fn try_new(
        range: SampleRange,
        delay_ms: f32,
        wet_mix: f32,
        dry_mix: f32,
        gain: f32,
        sample_rate: u32,
    ) -> EngineResult<Self> {
        if !is_supported_sample_rate(sample_rate) {
            return Err(EngineError::new(
                ErrorKind::InvalidSampleRate,
                format!("reverb cannot run at {} Hz", sample_rate),
            ));
        }
        Ok(Self {
            range,
            delay_ms: finite("delay", delay_ms)?.clamp(MIN_DELAY_MS, MAX_DELAY_MS),
            wet_mix: finite("wet mix", wet_mix)?.clamp(-MAX_MIX, MAX_MIX),
            dry_mix: finite("dry mix", dry_mix)?.clamp(-MAX_MIX, MAX_MIX),
            gain: finite("feedback", gain)?.clamp(0.0, MAX_FEEDBACK),
            sample_rate,
        })
    }

    pub fn range(&self) -> SampleRange {
        self.range
    }

    pub fn set_range(&mut self, range: SampleRange) {
        self.range = range;
    }

    pub fn delay_ms(&self) -> f32 {
        self.delay_ms
    }

    pub fn wet_mix(&self) -> f32 {
        self.wet_mix
    }

    pub fn dry_mix(&self) -> f32 {
        self.dry_mix
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Samples that must follow the range start before the network is allowed to run.
    pub fn required_samples(&self) -> usize {
        let longest_comb = COMB_OFFSETS_MS
            .iter()
            .fold(0.0f32, |acc, offset| acc.max(offset.abs()));
        2 * ms_to_samples(
            self.delay_ms + longest_comb + ALLPASS_DELAY_MS,
            self.sample_rate,
        )
    }
}

// --- Internal Building Blocks for the Reverb ---

/// A delay line with feedback: `y[n] = x[n] + g * y[n - D]`.
#[derive(Debug, Clone)]
struct CombFilter {
    buffer: Vec<f32>,
    write_pos: usize,
}
impl CombFilter {
    fn new(delay_samples: usize) -> Self {
        Self {
            buffer: vec![0.0; delay_samples.max(1)],
            write_pos: 0,
        }
    }
    #[inline(always)]
    fn process(&mut self, input: f32, feedback: f32) -> f32 {
        let output = input + feedback * self.buffer[self.write_pos];
        self.buffer[self.write_pos] = output;
        self.write_pos = (self.write_pos + 1) % self.buffer.len();
        output
    }
}

/// `y[n] = -g * x[n] + x[n - M] + g * y[n - M]`, used to increase echo density.
#[derive(Debug, Clone)]
struct AllPassFilter {
    inputs: Vec<f32>,
    outputs: Vec<f32>,
    pos: usize,
}
impl AllPassFilter {
    fn new(delay_samples: usize) -> Self {
        let len = delay_samples.max(1);
        Self {
            inputs: vec![0.0; len],
            outputs: vec![0.0; len],
            pos: 0,
        }
    }
    #[inline(always)]
    fn process(&mut self, input: f32, gain: f32) -> f32 {
        let output = -gain * input + self.inputs[self.pos] + gain * self.outputs[self.pos];
        self.inputs[self.pos] = input;
        self.outputs[self.pos] = output;
        self.pos = (self.pos + 1) % self.inputs.len();
        output
    }
}

// --- Main Public Reverb Struct ---

#[derive(Debug, Default)]
pub struct Reverb {
    params: Option<Params>,
    wet: Vec<f32>,
}

impl Reverb {
    pub fn new() -> Self {
        Self::default()
    }

    fn render_wet(&mut self, dry: &[f32], params: &Params) {
        let mut combs = COMB_OFFSETS_MS
            .map(|offset| CombFilter::new(ms_to_samples(params.delay_ms + offset, params.sample_rate)));
        let allpass_delay = ms_to_samples(ALLPASS_DELAY_MS, params.sample_rate);
        let mut all_pass_filters = [
            AllPassFilter::new(allpass_delay),
            AllPassFilter::new(allpass_delay),
        ];

        self.wet.clear();
        self.wet.extend(dry.iter().map(|&input| {
            // Average the parallel comb filters
            let comb_out = combs
                .iter_mut()
                .map(|f| f.process(input, params.gain))
                .sum::<f32>()
                * 0.25;
            all_pass_filters
                .iter_mut()
                .fold(comb_out, |acc, f| f.process(acc, ALLPASS_GAIN))
        }));
    }
}

impl Effect for Reverb {
    fn kind(&self) -> EffectKind {
        EffectKind::Reverb
    }

    fn set_params(&mut self, params: EffectParams) -> EngineResult<()> {
        match params {
            EffectParams::Reverb(p) => {
                self.params = Some(p);
                Ok(())
            }
            other => Err(wrong_params(EffectKind::Reverb, &other)),
        }
    }

    fn process(&mut self, samples: &mut [f32]) -> EngineResult<()> {
        let params = self
            .params
            .clone()
            .ok_or_else(|| not_initialized(EffectKind::Reverb))?;
        params.range.validate(samples.len())?;

        let available = samples.len() - params.range.start();
        let required = params.required_samples();
        if available < required {
            return Err(EngineError::new(
                ErrorKind::InsufficientSampleData,
                format!(
                    "reverb at {} ms needs {} samples after the range start, found {}",
                    params.delay_ms, required, available
                ),
            ));
        }

        let region = params.range.slice_mut(samples);
        self.render_wet(region, &params);
        for (sample, wet) in region.iter_mut().zip(&self.wet) {
            *sample = (params.wet_mix * wet + params.dry_mix * *sample).clamp(-1.0, 1.0);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollectingErrorSink;

    const RATE: u32 = 8_000;

    fn reverb(range: SampleRange, wet: f32, dry: f32) -> Reverb {
        let sink = CollectingErrorSink::new();
        let mut effect = Reverb::new();
        effect
            .set_params(
                Params::new(range, 20.0, wet, dry, 0.5, RATE, &sink)
                    .unwrap()
                    .into(),
            )
            .unwrap();
        effect
    }

    #[test]
    fn sizing_uses_longest_comb_and_allpass() {
        let sink = CollectingErrorSink::new();
        let params =
            Params::new(SampleRange::new(0, 1).unwrap(), 20.0, 0.5, 0.5, 0.5, RATE, &sink).unwrap();
        // 20 + 19.31 + 89.27 ms at 8 kHz, doubled.
        assert_eq!(params.required_samples(), 2 * 1029);
    }

    #[test]
    fn short_buffers_are_rejected_untouched() {
        let original: Vec<f32> = (0..1000).map(|i| (i as f32 * 0.01).sin() * 0.5).collect();
        let mut samples = original.clone();
        let err = reverb(SampleRange::full(1000).unwrap(), 0.5, 0.5)
            .process(&mut samples)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InsufficientSampleData);
        assert_eq!(samples, original);
    }

    #[test]
    fn dry_only_mix_is_the_identity() {
        let original: Vec<f32> = (0..4000).map(|i| (i as f32 * 0.05).sin() * 0.5).collect();
        let mut samples = original.clone();
        reverb(SampleRange::full(4000).unwrap(), 0.0, 1.0)
            .process(&mut samples)
            .unwrap();
        assert_eq!(samples, original);
    }

    #[test]
    fn impulse_produces_a_tail() {
        let mut samples = vec![0.0; 4000];
        samples[0] = 1.0;
        reverb(SampleRange::full(4000).unwrap(), 1.0, 0.0)
            .process(&mut samples)
            .unwrap();
        // First sample: averaged comb output 1.0 through two all-passes at -g each.
        assert!((samples[0] - ALLPASS_GAIN * ALLPASS_GAIN).abs() < 1e-6);
        let tail_energy: f32 = samples[1000..].iter().map(|s| s * s).sum();
        assert!(tail_energy > 0.0);
        assert!(samples.iter().all(|s| (-1.0..=1.0).contains(s)));
    }

    #[test]
    fn unsupported_rates_are_rejected() {
        let sink = CollectingErrorSink::new();
        let range = SampleRange::new(0, 1).unwrap();
        assert!(Params::new(range, 20.0, 0.5, 0.5, 0.5, 12_345, &sink).is_none());
        assert!(sink.contains(ErrorKind::InvalidSampleRate));
    }
}
