//! One-shot, offline sample-rate conversion used to bring a built-in
//! impulse response recorded at [`crate::constants::DEFAULT_IR_SAMPLERATE`]
//! to whatever rate the host is running at. This only ever runs from
//! `reconfigure()`, never on the audio thread, so a windowed-sinc
//! resampler's extra latency and allocation are not a concern.

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

fn sinc_params() -> SincInterpolationParameters {
    SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    }
}

/// Resamples `audio_in` (one slice per channel, all `audio_in_length`
/// samples long) from `fs_in` to `fs_out`, writing up to
/// `audio_out_length_max` samples per channel into `audio_out` and
/// returning the number of samples actually written.
///
/// Matches the one-shot contract every caller in this crate expects:
/// output length is `ceil(audio_in_length * fs_out / fs_in)`, clamped to
/// `audio_out_length_max`.
pub fn convert(
    fs_in: f64,
    fs_out: f64,
    audio_in: &[&[f32]],
    audio_out: &mut [&mut [f32]],
    audio_in_length: usize,
    audio_out_length_max: usize,
) -> usize {
    let num_channels = audio_in.len();
    debug_assert_eq!(audio_out.len(), num_channels);

    if fs_in == fs_out {
        let len = audio_in_length.min(audio_out_length_max);
        for ch in 0..num_channels {
            audio_out[ch][..len].copy_from_slice(&audio_in[ch][..len]);
        }
        return len;
    }

    let ratio = fs_out / fs_in;
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, sinc_params(), audio_in_length, num_channels)
        .expect("resampler parameters are valid for any finite sample-rate ratio");

    let waves_in: Vec<Vec<f32>> = audio_in
        .iter()
        .map(|ch| ch[..audio_in_length].to_vec())
        .collect();

    let waves_out = resampler
        .process(&waves_in, None)
        .expect("fixed-size input chunk matches the resampler's configured chunk size");

    let produced = waves_out.first().map(|ch| ch.len()).unwrap_or(0);
    let actual_len = produced.min(audio_out_length_max);

    for ch in 0..num_channels {
        audio_out[ch][..actual_len].copy_from_slice(&waves_out[ch][..actual_len]);
    }

    actual_len
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_ratio_is_a_copy() {
        let ch0 = vec![1.0f32, 2.0, 3.0, 4.0];
        let ch1 = vec![5.0f32, 6.0, 7.0, 8.0];
        let input: Vec<&[f32]> = vec![&ch0, &ch1];

        let mut out0 = vec![0.0f32; 4];
        let mut out1 = vec![0.0f32; 4];
        let mut output: Vec<&mut [f32]> = vec![&mut out0, &mut out1];

        let actual = convert(48_000.0, 48_000.0, &input, &mut output, 4, 4);
        assert_eq!(actual, 4);
        assert_eq!(out0, ch0);
        assert_eq!(out1, ch1);
    }

    #[test]
    fn upsampling_roughly_doubles_length() {
        let n = 2048;
        let ch0: Vec<f32> = (0..n)
            .map(|i| (i as f32 * 0.05).sin())
            .collect();
        let input: Vec<&[f32]> = vec![&ch0];

        let max_out = n * 3;
        let mut out0 = vec![0.0f32; max_out];
        let mut output: Vec<&mut [f32]> = vec![&mut out0];

        let actual = convert(48_000.0, 96_000.0, &input, &mut output, n, max_out);
        let expected = (n as f64 * 2.0).ceil() as usize;
        assert!(
            (actual as i64 - expected as i64).abs() <= 4,
            "actual={actual} expected~{expected}"
        );
        assert!(out0[..actual].iter().all(|s| s.is_finite()));
    }

    #[test]
    fn output_is_clamped_to_capacity() {
        let n = 1024;
        let ch0 = vec![0.1f32; n];
        let input: Vec<&[f32]> = vec![&ch0];

        let max_out = 64;
        let mut out0 = vec![0.0f32; max_out];
        let mut output: Vec<&mut [f32]> = vec![&mut out0];

        let actual = convert(48_000.0, 96_000.0, &input, &mut output, n, max_out);
        assert_eq!(actual, max_out);
    }
}
