//! The built-in bank of impulse responses the reverb controller loads
//! from by index.
//!
//! Real plugins of this kind ship impulse responses captured in actual
//! rooms and halls; this crate instead synthesizes a small bank of
//! plausible stereo impulse responses procedurally (exponentially
//! decaying filtered noise with a handful of early reflections), seeded
//! deterministically so the bank's contents — and therefore every demo
//! and test built against it — are reproducible across runs and
//! platforms.

use crate::constants::{DEFAULT_IR_SAMPLERATE, LONGEST_STAGE_SIZE};
use crate::error::{ReverbError, ReverbResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;

struct BuiltinIr {
    name: &'static str,
    /// Seconds of decaying tail to synthesize (before padding).
    duration_secs: f32,
    /// Exponential decay time constant, in seconds.
    decay_time_secs: f32,
    /// Stereo de-correlation: right channel's noise seed offset.
    stereo_spread: u64,
}

const BUILTIN_IRS: &[BuiltinIr] = &[
    BuiltinIr {
        name: "Small Room",
        duration_secs: 0.6,
        decay_time_secs: 0.15,
        stereo_spread: 1,
    },
    BuiltinIr {
        name: "Studio Booth",
        duration_secs: 0.9,
        decay_time_secs: 0.25,
        stereo_spread: 2,
    },
    BuiltinIr {
        name: "Chamber",
        duration_secs: 1.8,
        decay_time_secs: 0.55,
        stereo_spread: 3,
    },
    BuiltinIr {
        name: "Concert Hall",
        duration_secs: 3.5,
        decay_time_secs: 1.1,
        stereo_spread: 4,
    },
    BuiltinIr {
        name: "Cathedral",
        duration_secs: 6.0,
        decay_time_secs: 2.2,
        stereo_spread: 5,
    },
];

/// One bank entry: a stereo impulse response plus its unpadded length.
struct IrEntry {
    name: String,
    /// `audio[channel]`, padded to a multiple of [`LONGEST_STAGE_SIZE`].
    audio: [Vec<f32>; 2],
    len_without_zeros: usize,
}

/// The full built-in impulse-response bank, generated once at
/// construction.
pub struct ImpulseResponses {
    entries: Vec<IrEntry>,
}

impl ImpulseResponses {
    pub fn new() -> Self {
        let entries = BUILTIN_IRS.iter().map(generate_ir).collect();
        Self { entries }
    }

    /// Builds a bank from externally-captured stereo impulse responses
    /// instead of the procedurally synthesized built-in set. Each entry is
    /// `(display_name, left_channel_wav, right_channel_wav)`; both WAV
    /// files must share a sample count and are resampled to
    /// [`DEFAULT_IR_SAMPLERATE`] if recorded at a different rate, then
    /// padded to a multiple of [`LONGEST_STAGE_SIZE`]. A host that ships
    /// measured IRs (this crate's own bank ships only synthesized ones, for
    /// lack of real captures in this pack) constructs the bank this way at
    /// startup and hands it to [`crate::controller::ReverbController::new`]
    /// exactly like the built-in bank.
    pub fn from_wavs(sources: &[(&str, &Path, &Path)]) -> ReverbResult<Self> {
        let mut entries = Vec::with_capacity(sources.len());
        for (name, left_path, right_path) in sources {
            entries.push(load_ir_entry(name, left_path, right_path)?);
        }
        Ok(Self { entries })
    }

    pub fn ir_count(&self) -> usize {
        self.entries.len()
    }

    pub fn ir_name(&self, ir_index: usize) -> &str {
        &self.entries[ir_index].name
    }

    /// Length of the real (non-padding) impulse response content, in
    /// samples at [`DEFAULT_IR_SAMPLERATE`].
    pub fn ir_len(&self, ir_index: usize) -> usize {
        self.entries[ir_index].len_without_zeros
    }

    /// Length of the stored buffer including trailing zero padding,
    /// always a multiple of [`LONGEST_STAGE_SIZE`].
    pub fn ir_len_with_zeros(&self, ir_index: usize) -> usize {
        self.entries[ir_index].audio[0].len()
    }

    pub fn ir_audio_buffer(&self, ir_index: usize, channel: usize) -> &[f32] {
        &self.entries[ir_index].audio[channel]
    }
}

impl Default for ImpulseResponses {
    fn default() -> Self {
        Self::new()
    }
}

fn generate_ir(spec: &BuiltinIr) -> IrEntry {
    let len_without_zeros = (spec.duration_secs as f64 * DEFAULT_IR_SAMPLERATE) as usize;
    let len_with_zeros = pad_to_longest_stage(len_without_zeros);

    let audio = [
        synthesize_channel(spec, len_without_zeros, len_with_zeros, 0),
        synthesize_channel(spec, len_without_zeros, len_with_zeros, spec.stereo_spread),
    ];

    IrEntry {
        name: spec.name.to_string(),
        audio,
        len_without_zeros,
    }
}

/// Reads one stereo impulse response from a pair of mono WAV files,
/// resampling to [`DEFAULT_IR_SAMPLERATE`] if needed and zero-padding to a
/// [`LONGEST_STAGE_SIZE`] boundary, matching the shape every procedurally
/// generated bank entry already has.
fn load_ir_entry(name: &str, left_path: &Path, right_path: &Path) -> ReverbResult<IrEntry> {
    let (left_samples, left_fs) = read_mono_wav(left_path)?;
    let (right_samples, right_fs) = read_mono_wav(right_path)?;
    if left_fs != right_fs {
        return Err(ReverbError::WavDecode(format!(
            "{name}: left channel sample rate {left_fs} does not match right channel {right_fs}"
        )));
    }

    let source_len = left_samples.len().min(right_samples.len());
    let resampled_cap = ((source_len as f64) * (DEFAULT_IR_SAMPLERATE / left_fs as f64)).ceil() as usize
        + LONGEST_STAGE_SIZE;

    let mut left_out = vec![0.0f32; resampled_cap];
    let mut right_out = vec![0.0f32; resampled_cap];
    let len_without_zeros = {
        let source: Vec<&[f32]> = vec![&left_samples[..source_len], &right_samples[..source_len]];
        let mut dest: Vec<&mut [f32]> = vec![&mut left_out, &mut right_out];
        crate::resample::convert(left_fs as f64, DEFAULT_IR_SAMPLERATE, &source, &mut dest, source_len, resampled_cap)
    };

    let len_with_zeros = pad_to_longest_stage(len_without_zeros);
    left_out.resize(len_with_zeros, 0.0);
    right_out.resize(len_with_zeros, 0.0);

    Ok(IrEntry {
        name: name.to_string(),
        audio: [left_out, right_out],
        len_without_zeros,
    })
}

fn read_mono_wav(path: &Path) -> ReverbResult<(Vec<f32>, u32)> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let fs = spec.sample_rate;
    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let max_val = (1i32 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<Result<_, _>>()?
        }
    };
    Ok((samples, fs))
}

fn pad_to_longest_stage(len: usize) -> usize {
    let remainder = len % LONGEST_STAGE_SIZE;
    if remainder == 0 {
        len.max(2 * LONGEST_STAGE_SIZE)
    } else {
        (len + LONGEST_STAGE_SIZE - remainder).max(2 * LONGEST_STAGE_SIZE)
    }
}

/// A handful of early reflections followed by exponentially decaying
/// filtered noise, seeded deterministically per `(name, channel_seed)`.
fn synthesize_channel(
    spec: &BuiltinIr,
    len_without_zeros: usize,
    len_with_zeros: usize,
    channel_seed: u64,
) -> Vec<f32> {
    let seed = spec.name.bytes().fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64))
        ^ channel_seed.wrapping_mul(0x9E3779B97F4A7C15);
    let mut rng = StdRng::seed_from_u64(seed);

    let mut buffer = vec![0.0f32; len_with_zeros];

    buffer[0] = 1.0;

    let num_early_reflections = 6 + (channel_seed as usize % 4);
    for _ in 0..num_early_reflections {
        let delay = rng.gen_range(1..(len_without_zeros / 20).max(2));
        let amplitude: f32 = rng.gen_range(0.1..0.6);
        let sign: f32 = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
        buffer[delay] += sign * amplitude;
    }

    let decay_per_sample =
        (-1.0f64 / (spec.decay_time_secs as f64 * DEFAULT_IR_SAMPLERATE)).exp() as f32;
    let mut envelope = 1.0f32;
    // one-pole lowpass smoothing state for the noise, so the tail isn't
    // full-bandwidth hiss
    let mut lp_state = 0.0f32;
    let lp_coeff = 0.2f32;

    for sample in buffer.iter_mut().take(len_without_zeros).skip(1) {
        let noise: f32 = rng.gen_range(-1.0..1.0);
        lp_state += lp_coeff * (noise - lp_state);
        *sample += lp_state * envelope;
        envelope *= decay_per_sample;
    }

    buffer
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bank_is_nonempty_and_deterministic() {
        let bank_a = ImpulseResponses::new();
        let bank_b = ImpulseResponses::new();
        assert!(bank_a.ir_count() > 0);
        for i in 0..bank_a.ir_count() {
            assert_eq!(bank_a.ir_audio_buffer(i, 0), bank_b.ir_audio_buffer(i, 0));
            assert_eq!(bank_a.ir_audio_buffer(i, 1), bank_b.ir_audio_buffer(i, 1));
        }
    }

    #[test]
    fn padded_length_is_multiple_of_longest_stage() {
        let bank = ImpulseResponses::new();
        for i in 0..bank.ir_count() {
            assert_eq!(bank.ir_len_with_zeros(i) % LONGEST_STAGE_SIZE, 0);
            assert!(bank.ir_len(i) <= bank.ir_len_with_zeros(i));
        }
    }

    #[test]
    fn left_and_right_channels_differ() {
        let bank = ImpulseResponses::new();
        let left = bank.ir_audio_buffer(0, 0);
        let right = bank.ir_audio_buffer(0, 1);
        assert_ne!(left, right);
    }

    #[test]
    fn names_are_nonempty() {
        let bank = ImpulseResponses::new();
        for i in 0..bank.ir_count() {
            assert!(!bank.ir_name(i).is_empty());
        }
    }

    #[test]
    fn from_wavs_loads_a_measured_pair() {
        let dir = tempfile::tempdir().unwrap();
        let left_path = dir.path().join("left.wav");
        let right_path = dir.path().join("right.wav");

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 48_000,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        {
            let mut left_writer = hound::WavWriter::create(&left_path, spec).unwrap();
            let mut right_writer = hound::WavWriter::create(&right_path, spec).unwrap();
            for i in 0..4096 {
                let s = if i == 0 { 1.0f32 } else { 0.0f32 };
                left_writer.write_sample(s).unwrap();
                right_writer.write_sample(s * 0.5).unwrap();
            }
            left_writer.finalize().unwrap();
            right_writer.finalize().unwrap();
        }

        let bank = ImpulseResponses::from_wavs(&[("Measured Room", left_path.as_path(), right_path.as_path())]).unwrap();
        assert_eq!(bank.ir_count(), 1);
        assert_eq!(bank.ir_name(0), "Measured Room");
        assert_eq!(bank.ir_len_with_zeros(0) % LONGEST_STAGE_SIZE, 0);
        assert!((bank.ir_audio_buffer(0, 0)[0] - 1.0).abs() < 1e-3);
        assert!((bank.ir_audio_buffer(0, 1)[0] - 0.5).abs() < 1e-3);
    }

    #[test]
    fn from_wavs_rejects_mismatched_sample_rates() {
        let dir = tempfile::tempdir().unwrap();
        let left_path = dir.path().join("left.wav");
        let right_path = dir.path().join("right.wav");

        let spec_left = hound::WavSpec {
            channels: 1,
            sample_rate: 48_000,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut spec_right = spec_left;
        spec_right.sample_rate = 44_100;

        {
            let mut left_writer = hound::WavWriter::create(&left_path, spec_left).unwrap();
            let mut right_writer = hound::WavWriter::create(&right_path, spec_right).unwrap();
            for _ in 0..256 {
                left_writer.write_sample(0.0f32).unwrap();
                right_writer.write_sample(0.0f32).unwrap();
            }
            left_writer.finalize().unwrap();
            right_writer.finalize().unwrap();
        }

        let result = ImpulseResponses::from_wavs(&[("Mismatched", left_path.as_path(), right_path.as_path())]);
        assert!(result.is_err());
    }
}
