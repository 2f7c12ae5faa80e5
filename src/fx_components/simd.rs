// src/fx_components/simd.rs

//! Scalar and 8-wide vector kernels shared by the gain, echo, fade and normalization effects.
//!
//! The vector kernels are picked once, on first use, by runtime CPU feature detection. Every
//! vector kernel produces the same result as its scalar twin up to float rounding.

use once_cell::sync::Lazy;

/// The kernel set selected for this machine.
pub struct Kernels {
    pub name: &'static str,
    /// `s <- clamp(s * gain, -1, 1)`
    pub gain: fn(&mut [f32], f32),
    /// `out[i] = in[i]` for `i < delay`, else `clamp(in[i] + decay * in[i - delay], -1, 1)`
    pub echo: fn(&[f32], &mut [f32], usize, f32),
    /// `s[i] <- clamp(s[i] * (start_gain + i * step), -1, 1)`
    pub fade: fn(&mut [f32], f32, f32),
}

static KERNELS: Lazy<Kernels> = Lazy::new(select_kernels);

pub fn kernels() -> &'static Kernels {
    &KERNELS
}

fn select_kernels() -> Kernels {
    #[cfg(target_arch = "x86_64")]
    {
        if std::arch::is_x86_feature_detected!("avx") {
            log::debug!("DSP kernels: avx (8 lanes)");
            return Kernels {
                name: "avx",
                gain: avx::gain,
                echo: avx::echo,
                fade: avx::fade,
            };
        }
    }

    log::debug!("DSP kernels: scalar");
    scalar_kernels()
}

pub fn scalar_kernels() -> Kernels {
    Kernels {
        name: "scalar",
        gain: scalar::gain,
        echo: scalar::echo,
        fade: scalar::fade,
    }
}

pub mod scalar {
    #[inline]
    pub fn gain(samples: &mut [f32], gain: f32) {
        for sample in samples.iter_mut() {
            *sample = (*sample * gain).clamp(-1.0, 1.0);
        }
    }

    #[inline]
    pub fn echo(input: &[f32], output: &mut [f32], delay: usize, decay: f32) {
        let len = input.len().min(output.len());
        let head = delay.min(len);
        output[..head].copy_from_slice(&input[..head]);
        for i in head..len {
            output[i] = (input[i] + decay * input[i - delay]).clamp(-1.0, 1.0);
        }
    }

    #[inline]
    pub fn fade(samples: &mut [f32], start_gain: f32, step: f32) {
        for (i, sample) in samples.iter_mut().enumerate() {
            let gain = start_gain + i as f32 * step;
            *sample = (*sample * gain).clamp(-1.0, 1.0);
        }
    }
}

#[cfg(target_arch = "x86_64")]
mod avx {
    use super::scalar;
    use std::arch::x86_64::*;

    const LANES: usize = 8;

    // The safe wrappers below are only installed in the kernel table after
    // `is_x86_feature_detected!("avx")` returned true.

    pub fn gain(samples: &mut [f32], gain: f32) {
        // SAFETY: AVX support was detected before this kernel was selected.
        unsafe { gain_avx(samples, gain) }
    }

    pub fn echo(input: &[f32], output: &mut [f32], delay: usize, decay: f32) {
        // SAFETY: see `gain`.
        unsafe { echo_avx(input, output, delay, decay) }
    }

    pub fn fade(samples: &mut [f32], start_gain: f32, step: f32) {
        // SAFETY: see `gain`.
        unsafe { fade_avx(samples, start_gain, step) }
    }

    #[target_feature(enable = "avx")]
    unsafe fn gain_avx(samples: &mut [f32], gain: f32) {
        let gain_vec = _mm256_set1_ps(gain);
        let lo = _mm256_set1_ps(-1.0);
        let hi = _mm256_set1_ps(1.0);

        let mut chunks = samples.chunks_exact_mut(LANES);
        for chunk in &mut chunks {
            // SAFETY: `chunk` holds exactly eight floats; unaligned loads/stores are used.
            unsafe {
                let src = _mm256_loadu_ps(chunk.as_ptr());
                let scaled = _mm256_mul_ps(src, gain_vec);
                let clamped = _mm256_min_ps(_mm256_max_ps(scaled, lo), hi);
                _mm256_storeu_ps(chunk.as_mut_ptr(), clamped);
            }
        }
        scalar::gain(chunks.into_remainder(), gain);
    }

    #[target_feature(enable = "avx")]
    unsafe fn echo_avx(input: &[f32], output: &mut [f32], delay: usize, decay: f32) {
        let len = input.len().min(output.len());
        let head = delay.min(len);
        output[..head].copy_from_slice(&input[..head]);

        let decay_vec = _mm256_set1_ps(decay);
        let lo = _mm256_set1_ps(-1.0);
        let hi = _mm256_set1_ps(1.0);

        let mut index = head;
        while index + LANES <= len {
            // SAFETY: `index + 8 <= len` and `index >= delay`, so both eight-float reads and
            // the eight-float write are in bounds.
            unsafe {
                let current = _mm256_loadu_ps(input.as_ptr().add(index));
                let delayed = _mm256_loadu_ps(input.as_ptr().add(index - delay));
                let mixed = _mm256_add_ps(current, _mm256_mul_ps(delayed, decay_vec));
                let clamped = _mm256_min_ps(_mm256_max_ps(mixed, lo), hi);
                _mm256_storeu_ps(output.as_mut_ptr().add(index), clamped);
            }
            index += LANES;
        }
        while index < len {
            output[index] = (input[index] + decay * input[index - delay]).clamp(-1.0, 1.0);
            index += 1;
        }
    }

    #[target_feature(enable = "avx")]
    unsafe fn fade_avx(samples: &mut [f32], start_gain: f32, step: f32) {
        let lane_offsets = _mm256_mul_ps(
            _mm256_setr_ps(0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0),
            _mm256_set1_ps(step),
        );
        let lo = _mm256_set1_ps(-1.0);
        let hi = _mm256_set1_ps(1.0);

        let len = samples.len();
        let mut index = 0usize;
        while index + LANES <= len {
            let current_gain = start_gain + index as f32 * step;
            // SAFETY: `index + 8 <= len`.
            unsafe {
                let gains = _mm256_add_ps(_mm256_set1_ps(current_gain), lane_offsets);
                let src = _mm256_loadu_ps(samples.as_ptr().add(index));
                let scaled = _mm256_mul_ps(src, gains);
                let clamped = _mm256_min_ps(_mm256_max_ps(scaled, lo), hi);
                _mm256_storeu_ps(samples.as_mut_ptr().add(index), clamped);
            }
            index += LANES;
        }
        let tail_gain = start_gain + index as f32 * step;
        scalar::fade(&mut samples[index..], tail_gain, step);
    }
}
