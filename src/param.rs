//! Parameter-smoothing primitives shared by the dry/wet mixer and the IR
//! decay/color shaping pipeline, plus the precomputed lookup tables that
//! map a linear 0..1 control value onto the curve a knob actually needs.

use crate::constants::{MIN_DB, PARAM_INTERPOL_ARRAY_LEN};

/// One pole of exponential smoothing: moves `current` toward `target` at
/// `rate` (a per-call decay factor in `[0, 1)`, closer to 1 is slower).
#[inline]
pub fn exp_smoothing(target: f32, current: f32, rate: f32) -> f32 {
    target - target * rate + current * rate
}

/// Per-call decay factor that reaches ~1/e of the way to target after
/// `samples` calls.
#[inline]
pub fn time_constant_samples(samples: f32) -> f32 {
    (-2.2 / samples).exp()
}

/// Per-call decay factor that reaches ~1/e of the way to target after
/// `ms` milliseconds at sample rate `fs`.
#[inline]
pub fn time_constant_ms(ms: f32, fs: f32) -> f32 {
    (-2200.0 / (ms * fs)).exp()
}

#[inline]
fn linear_interpolate(y0: f32, y1: f32, mu: f32) -> f32 {
    debug_assert!((0.0..=1.0).contains(&mu));
    y0 * (1.0 - mu) + y1 * mu
}

/// Advances one smoothing step: reads the value already computed on the
/// previous call into `current`, recomputes the new target-bound value
/// into `future_current`, snapping to `target` once floating-point
/// precision makes further movement indistinguishable from standing
/// still, and derives the per-sample increment that ramps `current` to
/// `future_current` over `block_size` samples.
#[inline]
pub fn smooth_parameter(
    target: f32,
    future_current: &mut f32,
    current: &mut f32,
    incr: &mut f32,
    smoothing_factor: f32,
    block_size: u32,
) {
    *current = *future_current;
    *future_current = exp_smoothing(target, *current, smoothing_factor);
    if *future_current == *current {
        *future_current = target;
    }
    *incr = (*future_current - *current) / block_size as f32;
}

/// Converts a decibel value to a linear gain, clamping anything at or
/// below `min_db` to silence.
#[inline]
pub fn db_to_linear(db: f32, min_db: f32) -> f32 {
    if db > min_db {
        10f32.powf(db / 20.0)
    } else {
        0.0
    }
}

/// Maps a linear 0..1 control position onto a logarithmic 0..1 curve with
/// `decades` decades of taper (used by the decay knob).
#[inline]
pub fn log_ten_0to1(lin_0to1: f32, decades: f64) -> f32 {
    debug_assert!((0.0..=1.0).contains(&lin_0to1));
    let lin = lin_0to1 as f64;
    ((10f64.powf(decades * lin) - 1.0) / (10f64.powf(decades) - 1.0)) as f32
}

/// A precomputed `PARAM_INTERPOL_ARRAY_LEN`-entry lookup table mapping a
/// linear 0..1 control value onto whatever curve `f` describes, with
/// linear interpolation between table entries.
pub struct ParamTable {
    values: [f32; PARAM_INTERPOL_ARRAY_LEN],
}

impl ParamTable {
    pub fn build(mut f: impl FnMut(f32) -> f32) -> Self {
        let mut values = [0.0f32; PARAM_INTERPOL_ARRAY_LEN];
        for (i, slot) in values.iter_mut().enumerate() {
            let lin = i as f64 / (PARAM_INTERPOL_ARRAY_LEN - 1) as f64;
            *slot = f(lin as f32);
        }
        Self { values }
    }

    /// Looks up `pos_linear` (clamped to `[0, 1]`) with linear
    /// interpolation between adjacent table entries.
    pub fn lookup(&self, pos_linear: f32) -> f32 {
        debug_assert!((0.0..=1.0).contains(&pos_linear));
        let index = pos_linear * (PARAM_INTERPOL_ARRAY_LEN - 1) as f32;
        let index_int = index as usize;
        let mu = index - index_int as f32;

        let y0 = self.values[index_int];
        let y1 = if index_int == PARAM_INTERPOL_ARRAY_LEN - 1 {
            1.0
        } else {
            self.values[index_int + 1]
        };

        linear_interpolate(y0, y1, mu)
    }
}

/// Builds the volume lookup table: a control value of 1.0 maps to 0 dB,
/// tapering down to silence below `MIN_DB`.
pub fn build_volume_table() -> ParamTable {
    ParamTable::build(|control| {
        let db = if control > 0.000_001 {
            60.0 * control.log10()
        } else {
            MIN_DB
        };
        db_to_linear(db, MIN_DB)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exp_smoothing_converges_to_target() {
        let mut current = 0.0f32;
        let rate = time_constant_ms(10.0, 48_000.0);
        for _ in 0..10_000 {
            current = exp_smoothing(1.0, current, rate);
        }
        assert!((current - 1.0).abs() < 1e-4);
    }

    #[test]
    fn smooth_parameter_reaches_target_exactly() {
        let mut future_current = 0.0f32;
        let mut current = 0.0f32;
        let mut incr = 0.0f32;
        let rate = time_constant_ms(1.0, 48_000.0);
        for _ in 0..100_000 {
            smooth_parameter(1.0, &mut future_current, &mut current, &mut incr, rate, 64);
        }
        assert_eq!(future_current, 1.0);
    }

    #[test]
    fn db_to_linear_floor() {
        assert_eq!(db_to_linear(MIN_DB, MIN_DB), 0.0);
        assert_eq!(db_to_linear(MIN_DB - 10.0, MIN_DB), 0.0);
        assert!((db_to_linear(0.0, MIN_DB) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn param_table_endpoints() {
        let table = ParamTable::build(|x| x * 2.0);
        assert!((table.lookup(0.0) - 0.0).abs() < 1e-6);
        assert!((table.lookup(1.0) - 2.0).abs() < 1e-3);
    }

    #[test]
    fn volume_table_unity_at_one() {
        let table = build_volume_table();
        assert!((table.lookup(1.0) - 1.0).abs() < 1e-3);
        assert!(table.lookup(0.0) < 1e-4);
    }
}
