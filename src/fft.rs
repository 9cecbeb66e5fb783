//! FFT facade used by every convolution stage.
//!
//! Wraps a forward/inverse real-FFT pair from `realfft` behind the two
//! operations a convolution stage actually needs: transform a time-domain
//! block to/from its frequency-domain representation, and accumulate a
//! scaled complex product of two already-transformed blocks. Keeping this
//! behind one small facade means every stage shares the same scaling and
//! buffer-sizing conventions regardless of which FFT crate backs them.

use num_complex::Complex32;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use std::sync::Arc;

/// Number of complex bins a real FFT of `time_domain_len` samples produces.
#[inline]
pub fn freq_domain_len(time_domain_len: usize) -> usize {
    time_domain_len / 2 + 1
}

/// A forward/inverse real-FFT pair operating on blocks of a fixed size.
///
/// `fft_size` is the time-domain length (for the overlap-save stages this
/// is always twice the stage's block size); the frequency-domain length
/// is `fft_size / 2 + 1` complex bins.
pub struct Fft {
    fft_size: usize,
    forward: Arc<dyn RealToComplex<f32>>,
    inverse: Arc<dyn ComplexToReal<f32>>,
    forward_scratch: Vec<Complex32>,
    inverse_scratch: Vec<Complex32>,
}

impl Fft {
    pub fn new(fft_size: usize) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let forward = planner.plan_fft_forward(fft_size);
        let inverse = planner.plan_fft_inverse(fft_size);
        let forward_scratch = forward.make_scratch_vec();
        let inverse_scratch = inverse.make_scratch_vec();
        Self {
            fft_size,
            forward,
            inverse,
            forward_scratch,
            inverse_scratch,
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Transform a time-domain block (length `fft_size`) into
    /// `freq_domain_len(fft_size)` complex bins. `time_domain` is used as
    /// scratch space by the underlying planner and left in an unspecified
    /// state on return.
    pub fn forward(&mut self, time_domain: &mut [f32], freq_domain: &mut [Complex32]) {
        self.forward
            .process_with_scratch(time_domain, freq_domain, &mut self.forward_scratch)
            .expect("forward FFT buffer sizes derived from fft_size");
    }

    /// Transform `freq_domain_len(fft_size)` complex bins back into a
    /// `fft_size`-sample time-domain block. `freq_domain` is used as
    /// scratch space and left in an unspecified state on return.
    pub fn inverse(&mut self, freq_domain: &mut [Complex32], time_domain: &mut [f32]) {
        self.inverse
            .process_with_scratch(freq_domain, time_domain, &mut self.inverse_scratch)
            .expect("inverse FFT buffer sizes derived from fft_size");
    }

    /// `accum += (a * b) / fft_size`, bin by bin. `a` and `b` are the
    /// untouched outputs of two prior `forward()` calls at this FFT's
    /// size; the `1/fft_size` scaling here means a subsequent `inverse()`
    /// of `accum` yields a correctly-scaled linear convolution.
    pub fn convolve_accum(&self, accum: &mut [Complex32], a: &[Complex32], b: &[Complex32]) {
        let scale = 1.0 / self.fft_size as f32;
        for ((acc, &a), &b) in accum.iter_mut().zip(a.iter()).zip(b.iter()) {
            *acc += a * b * scale;
        }
    }
}
