//! Centralized constants for the convolution reverb engine.
//!
//! Every magic number used by more than one module lives here so the
//! relationships between them (e.g. the direct stage covering exactly the
//! first two longest-stage blocks) stay visible in one place.

/// Sample rate impulse responses in the built-in bank are authored at.
pub const DEFAULT_IR_SAMPLERATE: f64 = 48_000.0;

/// Highest host sample rate the engine will configure itself for.
pub const MAX_SAMPLERATE: f64 = 48_000.0 * 8.0;

/// Largest host audio block size supported.
pub const MAX_BLOCK_SIZE: usize = 8 * 1024;

/// Smallest host audio block size supported.
pub const MIN_BLOCK_SIZE: usize = 16;

/// Longest impulse response the engine will load, in seconds.
pub const MAX_IR_LEN_SECONDS: usize = 10;

/// Longest impulse response the engine will load, in samples.
pub const MAX_IR_LEN_SAMPLES: usize = (MAX_SAMPLERATE as usize) * MAX_IR_LEN_SECONDS;

/// Shortest impulse response accepted after sample-rate conversion; a
/// consequence of the stage ladder needing at least two longest-stage
/// blocks plus the blocks covered by the direct stage.
pub const IR_MIN_LEN_SAMPLES: usize = 3 * MAX_BLOCK_SIZE;

/// Block size of the shortest FFT stage.
pub const SMALLEST_STAGE_SIZE: usize = 64;

/// Block size of the longest FFT stage.
pub const LONGEST_STAGE_SIZE: usize = 16 * 1024;

/// Above this host block size the direct-form stage is replaced by a
/// zero-latency FFT stage.
pub const DIRECT_STAGE_MAX_BLOCK_SIZE: usize = 128;

/// Length of every parameter lookup table (volume, filter cutoffs, decay).
pub const PARAM_INTERPOL_ARRAY_LEN: usize = 1024;

/// Dry/wet smoothing time constant, in milliseconds.
pub const DRYWET_SMOOTH_LEN_MS: f32 = 5.0;

/// Number of samples between dry/wet gain-ramp recalculations; the ramp
/// itself still advances every sample, this just bounds how often the
/// target and increment are re-derived from the smoothed control value.
pub const DRYWET_RECALC_STRIDE_SAMPLES: usize = 32;

/// Lowest color-control low-pass cutoff, in Hz.
pub const COLOR_LPF_FREQ_MIN: f64 = 220.0;

/// Low-pass cutoff the color filter sits at when `color_control == 0`.
pub const COLOR_LPF_FREQ_MAX: f64 = 20_000.0;

/// High-pass cutoff the color filter sits at when `color_control == 0`.
pub const COLOR_HPF_FREQ_MIN: f64 = 20.0;

/// Highest color-control high-pass cutoff, in Hz.
pub const COLOR_HPF_FREQ_MAX: f64 = 3000.0;

/// Decay/color smoothing time constant, in milliseconds.
pub const DECAY_COLOR_SMOOTH_LEN_MS: f32 = 80.0;

/// Minimum decay-control value (1.5% of the full IR length).
pub const DECAY_MIN: f32 = 0.015;

/// Logarithmic taper applied to the decay knob.
pub const DECAY_KNOB_DECADES: f64 = 2.15;

/// Exponential decay tail length, as a fraction of the decay cut point.
pub const DECAY_ENVELOPE_PERCENTAGE: f32 = 2.3;

/// Hard cap on the decay tail's time constant, in seconds.
pub const DECAY_ENVELOPE_MAX_SECONDS: f32 = 1.5;

/// Floor applied to every dB-to-linear conversion.
pub const MIN_DB: f32 = -120.0;

/// Target RMS energy after impulse-response normalization.
pub const IR_NORMALIZATION_TARGET_RMS: f32 = 0.65;

/// Impulse responses quieter than this (sum of squares) are left
/// unnormalized rather than amplified to the target RMS.
pub const IR_NORMALIZATION_ENERGY_FLOOR: f64 = 1e-7;

/// Bounded join timeout for stopping an FFT stage's worker thread, in
/// milliseconds.
pub const STAGE_WORKER_STOP_TIMEOUT_MS: u64 = 1000;

/// Bounded join timeout for stopping the IR-update worker thread, in
/// milliseconds.
pub const IR_WORKER_STOP_TIMEOUT_MS: u64 = 2000;

#[inline]
pub fn is_pow_of_2(x: usize) -> bool {
    x != 0 && (x & (x - 1)) == 0
}
