//! The reverb controller: the crate's single public entry point. Owns the
//! impulse-response preparation pipeline, the lock-free IR double buffer,
//! the dry/wet mixer, and the [`Engine`] that actually convolves.
//!
//! `process()` is the only method meant to run on a real-time thread;
//! everything it can't do in bounded time — resampling, normalizing,
//! decay/color shaping, tearing the engine down and rebuilding it — either
//! happens once per configuration change (`reconfigure`, called
//! synchronously but only on a block/rate/IR/channel-count change, never
//! per-block) or on the IR-update worker thread.

use crate::biquad::{Biquad, FilterKind};
use crate::constants::{
    is_pow_of_2, COLOR_HPF_FREQ_MAX, COLOR_HPF_FREQ_MIN, COLOR_LPF_FREQ_MAX, COLOR_LPF_FREQ_MIN,
    DECAY_COLOR_SMOOTH_LEN_MS, DECAY_ENVELOPE_MAX_SECONDS, DECAY_ENVELOPE_PERCENTAGE, DECAY_KNOB_DECADES,
    DECAY_MIN, DRYWET_RECALC_STRIDE_SAMPLES, DRYWET_SMOOTH_LEN_MS, IR_NORMALIZATION_ENERGY_FLOOR,
    IR_NORMALIZATION_TARGET_RMS, IR_WORKER_STOP_TIMEOUT_MS, LONGEST_STAGE_SIZE, MAX_BLOCK_SIZE,
    MAX_IR_LEN_SAMPLES, MAX_SAMPLERATE, MIN_BLOCK_SIZE,
};
use crate::engine::Engine;
use crate::ir_bank::ImpulseResponses;
use crate::ir_buffer::silent_ir_channel_set;
use crate::param::{exp_smoothing, log_ten_0to1, smooth_parameter, time_constant_ms, ParamTable};
use crate::resample::convert;
use crate::worker::Worker;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;

/// The (blockSize, sampleRate, numChannels, irIndex) tuple that determines
/// whether a call to [`ReverbController::process`] needs to tear down and
/// rebuild the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Config {
    block_size: usize,
    fs: f64,
    num_channels: usize,
    ir_index: usize,
}

/// Everything the IR-update worker needs every time it is notified, packed
/// into atomics it can read without blocking the audio thread that wrote
/// them. `decay`/`color` are stored as raw `f32` bits since neither
/// `AtomicF32` nor float CAS exists in `std`.
struct WorkerShared {
    decay_control_bits: AtomicU32,
    color_control_bits: AtomicU32,
    write_slot: AtomicU8,
    updating_ir: AtomicBool,
}

/// Real-time convolution reverb: IR selection, decay/color shaping,
/// dry/wet mixing, and the convolution engine itself behind one call.
pub struct ReverbController {
    ir_bank: Arc<ImpulseResponses>,
    volume_table: ParamTable,

    cfg: Option<Config>,
    engine: Option<Engine>,

    /// The selected IR, resampled to the host's sample rate, not yet
    /// decay/color shaped. One slice per channel.
    pre_ir: Vec<Vec<f32>>,
    pre_ir_len_without_zeros: usize,
    pre_ir_len_with_zeros: usize,

    /// Controller-retained handles into the same double buffer `engine`
    /// was built with, so the worker can publish into either slot
    /// directly without going through the engine at all.
    post_ir: [crate::ir_buffer::IrChannelSet; 2],
    ir_update_index: u8,

    shared: Arc<WorkerShared>,
    worker: Option<Worker>,

    dry_current: f32,
    dry_future: f32,
    dry_incr: f32,
    wet_current: f32,
    wet_future: f32,
    wet_incr: f32,
    drywet_smoothing_factor: f32,

    audio_dry: Vec<Vec<f32>>,
    audio_reverb_in: Vec<Vec<f32>>,
}

impl ReverbController {
    pub fn new(ir_bank: Arc<ImpulseResponses>) -> Self {
        Self {
            ir_bank,
            volume_table: crate::param::build_volume_table(),
            cfg: None,
            engine: None,
            pre_ir: Vec::new(),
            pre_ir_len_without_zeros: 0,
            pre_ir_len_with_zeros: 0,
            post_ir: [Vec::new(), Vec::new()],
            ir_update_index: 0,
            shared: Arc::new(WorkerShared {
                decay_control_bits: AtomicU32::new(0.5f32.to_bits()),
                color_control_bits: AtomicU32::new(0.0f32.to_bits()),
                write_slot: AtomicU8::new(1),
                updating_ir: AtomicBool::new(false),
            }),
            worker: None,
            dry_current: 0.0,
            dry_future: 0.0,
            dry_incr: 0.0,
            wet_current: 0.0,
            wet_future: 0.0,
            wet_incr: 0.0,
            drywet_smoothing_factor: 0.0,
            audio_dry: Vec::new(),
            audio_reverb_in: Vec::new(),
        }
    }

    /// Processes one host audio block. Never allocates, never blocks, and
    /// never returns an error: out-of-range parameters fall back to a
    /// pass-through (`out := in`) without disturbing any engine state
    /// besides recording the last-seen configuration.
    #[allow(clippy::too_many_arguments)]
    pub fn process(
        &mut self,
        audio_in: &[&[f32]],
        audio_out: &mut [&mut [f32]],
        stereo: bool,
        fs: f64,
        block_size: usize,
        decay: f32,
        color: f32,
        dry_wet: f32,
        ir_index: usize,
    ) {
        let num_channels = if stereo { 2 } else { 1 };

        if !Self::params_in_range(fs, block_size, decay, color, dry_wet, ir_index, self.ir_bank.ir_count()) {
            tracing::warn!(fs, block_size, decay, color, dry_wet, ir_index, "out-of-range reverb parameters, passing through");
            for ch in 0..num_channels.min(audio_in.len()).min(audio_out.len()) {
                audio_out[ch][..block_size.min(audio_in[ch].len()).min(audio_out[ch].len())]
                    .copy_from_slice(&audio_in[ch][..block_size.min(audio_in[ch].len()).min(audio_out[ch].len())]);
            }
            return;
        }

        let new_cfg = Config { block_size, fs, num_channels, ir_index };
        if self.cfg != Some(new_cfg) {
            if let Err(e) = self.reconfigure(new_cfg) {
                tracing::error!(error = %e, "reconfigure failed, falling back to pass-through");
                self.engine = None;
            }
            self.cfg = Some(new_cfg);
        }

        self.shared
            .decay_control_bits
            .store(decay.to_bits(), Ordering::Relaxed);
        self.shared
            .color_control_bits
            .store(color.to_bits(), Ordering::Relaxed);

        self.compute_drywet_ramps(num_channels, block_size, dry_wet, audio_in);

        let Some(engine) = &mut self.engine else {
            for ch in 0..num_channels {
                audio_out[ch][..block_size].copy_from_slice(&self.audio_dry[ch][..block_size]);
            }
            return;
        };

        if engine.can_update_ir() && !self.shared.updating_ir.load(Ordering::Acquire) {
            self.ir_update_index = 1 - self.ir_update_index;
            engine.update_ir(1 - self.ir_update_index);
            self.shared
                .write_slot
                .store(self.ir_update_index, Ordering::Relaxed);
            self.shared.updating_ir.store(true, Ordering::Release);
            if let Some(worker) = &self.worker {
                worker.notify();
            }
        }

        // Built as fixed-size stack arrays, not a `Vec`, so this per-block
        // repackaging of owned channel buffers into the slice-of-slices
        // shape `Engine::process` expects never touches the allocator.
        match num_channels {
            1 => {
                let reverb_in: [&[f32]; 1] = [&self.audio_reverb_in[0][..block_size]];
                let mut reverb_out: [&mut [f32]; 1] = [&mut audio_out[0][..block_size]];
                engine.process(&reverb_in, &mut reverb_out);
            }
            _ => {
                let reverb_in: [&[f32]; 2] = [
                    &self.audio_reverb_in[0][..block_size],
                    &self.audio_reverb_in[1][..block_size],
                ];
                let (out0, rest) = audio_out.split_at_mut(1);
                let mut reverb_out: [&mut [f32]; 2] = [&mut out0[0][..block_size], &mut rest[0][..block_size]];
                engine.process(&reverb_in, &mut reverb_out);
            }
        }

        for ch in 0..num_channels {
            for i in 0..block_size {
                audio_out[ch][i] += self.audio_dry[ch][i];
            }
        }
    }

    fn params_in_range(
        fs: f64,
        block_size: usize,
        decay: f32,
        color: f32,
        dry_wet: f32,
        ir_index: usize,
        ir_count: usize,
    ) -> bool {
        fs > 0.0
            && fs <= MAX_SAMPLERATE
            && is_pow_of_2(block_size)
            && (MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&block_size)
            && (0.0..=1.0).contains(&decay)
            && (-1.0..=1.0).contains(&color)
            && (-1.0..=1.0).contains(&dry_wet)
            && ir_index < ir_count
    }

    /// Tears the engine down (stopping the worker first) and rebuilds
    /// everything that depends on (block_size, fs, num_channels, ir_index):
    /// the pre-processed IR, the silent post-processed double buffer, the
    /// engine itself, and a freshly spawned IR-update worker.
    fn reconfigure(&mut self, cfg: Config) -> crate::error::ReverbResult<()> {
        tracing::info!(?cfg, "reconfiguring reverb engine");

        self.worker.take();
        self.engine = None;

        self.drywet_smoothing_factor = time_constant_ms(DRYWET_SMOOTH_LEN_MS, cfg.fs as f32);
        self.dry_current = 0.0;
        self.dry_future = 0.0;
        self.dry_incr = 0.0;
        self.wet_current = 0.0;
        self.wet_future = 0.0;
        self.wet_incr = 0.0;

        self.audio_dry = vec![vec![0.0f32; cfg.block_size]; cfg.num_channels];
        self.audio_reverb_in = vec![vec![0.0f32; cfg.block_size]; cfg.num_channels];

        let ir_len_without_zeros = self.ir_bank.ir_len(cfg.ir_index);
        let ir_len_with_zeros = self.ir_bank.ir_len_with_zeros(cfg.ir_index);

        let resampled_cap = ((ir_len_with_zeros as f64) * (cfg.fs / crate::constants::DEFAULT_IR_SAMPLERATE))
            .ceil() as usize
            + LONGEST_STAGE_SIZE;
        let resampled_cap = resampled_cap.min(MAX_IR_LEN_SAMPLES + LONGEST_STAGE_SIZE);

        let mut pre_ir = vec![vec![0.0f32; resampled_cap]; cfg.num_channels];
        let mut pre_len_without_zeros;

        {
            let source: Vec<&[f32]> = (0..cfg.num_channels)
                .map(|ch| self.ir_bank.ir_audio_buffer(cfg.ir_index, ch.min(1)))
                .collect();
            let mut dest: Vec<&mut [f32]> = pre_ir.iter_mut().map(|ch| ch.as_mut_slice()).collect();
            pre_len_without_zeros = convert(
                crate::constants::DEFAULT_IR_SAMPLERATE,
                cfg.fs,
                &source,
                &mut dest,
                ir_len_without_zeros,
                resampled_cap,
            );
        }

        Self::normalize_energy(&mut pre_ir, pre_len_without_zeros);

        let pre_len_with_zeros = pad_to_longest_stage(pre_len_without_zeros);
        if pre_len_with_zeros > pre_ir[0].len() {
            for ch in pre_ir.iter_mut() {
                ch.resize(pre_len_with_zeros, 0.0);
            }
        }
        if pre_len_without_zeros == 0 {
            pre_len_without_zeros = 1;
        }

        self.pre_ir = pre_ir;
        self.pre_ir_len_without_zeros = pre_len_without_zeros;
        self.pre_ir_len_with_zeros = pre_len_with_zeros;

        let post0 = silent_ir_channel_set(cfg.num_channels, pre_len_with_zeros);
        let post1 = silent_ir_channel_set(cfg.num_channels, pre_len_with_zeros);

        self.engine = match Engine::new(
            cfg.block_size,
            cfg.num_channels,
            crate::ir_buffer::clone_handles(&post0),
            crate::ir_buffer::clone_handles(&post1),
            pre_len_without_zeros,
            pre_len_with_zeros,
        ) {
            Ok(engine) => Some(engine),
            Err(e) => {
                tracing::warn!(error = %e, "engine refused this configuration, staying in pass-through");
                self.post_ir = [post0, post1];
                self.ir_update_index = 0;
                return Ok(());
            }
        };

        self.post_ir = [post0, post1];
        self.ir_update_index = 0;
        self.shared.updating_ir.store(false, Ordering::Release);
        self.shared
            .write_slot
            .store(self.ir_update_index, Ordering::Relaxed);

        self.spawn_worker(cfg)?;

        Ok(())
    }

    fn spawn_worker(&mut self, cfg: Config) -> crate::error::ReverbResult<()> {
        let shared = self.shared.clone();
        let post_ir = [
            crate::ir_buffer::clone_handles(&self.post_ir[0]),
            crate::ir_buffer::clone_handles(&self.post_ir[1]),
        ];
        let pre_ir = self.pre_ir.clone();
        let ir_len_without_zeros = self.pre_ir_len_without_zeros;
        let ir_len_with_zeros = self.pre_ir_len_with_zeros;
        let num_channels = cfg.num_channels;
        let fs = cfg.fs;

        let decay_color_rate = time_constant_ms(DECAY_COLOR_SMOOTH_LEN_MS, (fs / LONGEST_STAGE_SIZE as f64) as f32);

        let mut decay_current = log_ten_0to1(0.5, DECAY_KNOB_DECADES).max(DECAY_MIN);
        let mut lowpass: Vec<Biquad> = (0..num_channels).map(|_| Biquad::new(FilterKind::Lowpass)).collect();
        let mut highpass: Vec<Biquad> = (0..num_channels).map(|_| Biquad::new(FilterKind::Highpass)).collect();
        let mut shaped = vec![vec![0.0f32; ir_len_with_zeros]; num_channels];

        let worker = Worker::spawn(
            "ir-update",
            || {},
            move || {
                render_post_ir(
                    &shared,
                    &post_ir,
                    &pre_ir,
                    &mut shaped,
                    ir_len_without_zeros,
                    ir_len_with_zeros,
                    fs,
                    decay_color_rate,
                    &mut decay_current,
                    &mut lowpass,
                    &mut highpass,
                );
            },
            || {},
        )
        .map_err(crate::error::ReverbError::WorkerSpawn)?;

        self.worker = Some(worker);
        Ok(())
    }

    fn normalize_energy(pre_ir: &mut [Vec<f32>], len_without_zeros: usize) {
        if len_without_zeros == 0 {
            return;
        }
        let num_channels = pre_ir.len() as f64;
        let energy: f64 = pre_ir
            .iter()
            .flat_map(|ch| ch[..len_without_zeros].iter())
            .map(|s| (*s as f64) * (*s as f64))
            .sum();
        let mean_energy = energy / num_channels;
        if mean_energy < IR_NORMALIZATION_ENERGY_FLOOR {
            return;
        }
        let rms = mean_energy.sqrt();
        let gain = (IR_NORMALIZATION_TARGET_RMS as f64 / rms) as f32;
        for ch in pre_ir.iter_mut() {
            for s in ch[..len_without_zeros].iter_mut() {
                *s *= gain;
            }
        }
    }

    fn compute_drywet_ramps(&mut self, num_channels: usize, block_size: usize, dry_wet: f32, audio_in: &[&[f32]]) {
        let mut pos = 0;
        while pos < block_size {
            let stride = DRYWET_RECALC_STRIDE_SAMPLES.min(block_size - pos);

            let dry_control = if dry_wet < 0.0 { 1.0 } else { 1.0 - dry_wet };
            let wet_control = if dry_wet > 0.0 { 1.0 } else { 1.0 + dry_wet };
            let dry_target = self.volume_table.lookup(dry_control.clamp(0.0, 1.0));
            let wet_target = self.volume_table.lookup(wet_control.clamp(0.0, 1.0));

            smooth_parameter(
                dry_target,
                &mut self.dry_future,
                &mut self.dry_current,
                &mut self.dry_incr,
                self.drywet_smoothing_factor,
                stride as u32,
            );
            smooth_parameter(
                wet_target,
                &mut self.wet_future,
                &mut self.wet_current,
                &mut self.wet_incr,
                self.drywet_smoothing_factor,
                stride as u32,
            );

            let mut dry_gain = self.dry_current;
            let mut wet_gain = self.wet_current;
            for i in 0..stride {
                for ch in 0..num_channels {
                    let x = audio_in[ch][pos + i];
                    self.audio_dry[ch][pos + i] = x * dry_gain;
                    self.audio_reverb_in[ch][pos + i] = x * wet_gain;
                }
                dry_gain += self.dry_incr;
                wet_gain += self.wet_incr;
            }

            pos += stride;
        }
    }
}

fn pad_to_longest_stage(len: usize) -> usize {
    let remainder = len % LONGEST_STAGE_SIZE;
    if remainder == 0 {
        len.max(2 * LONGEST_STAGE_SIZE)
    } else {
        (len + LONGEST_STAGE_SIZE - remainder).max(2 * LONGEST_STAGE_SIZE)
    }
}

/// Maps a linear `0..1` position onto `[lo, hi]` on a logarithmic (exp)
/// scale, used for the color knob's filter-cutoff mapping.
fn exp_map(lin_0to1: f32, lo: f64, hi: f64) -> f32 {
    let lin = lin_0to1.clamp(0.0, 1.0) as f64;
    (lo * (hi / lo).powf(lin)) as f32
}

/// Runs once per `notify()`: reshapes a copy of the pre-processed IR with
/// the current decay envelope and color filters, then publishes it into
/// whichever post-processed slot isn't active, and finally clears
/// `updating_ir` so the audio thread can swap to it.
#[allow(clippy::too_many_arguments)]
fn render_post_ir(
    shared: &WorkerShared,
    post_ir: &[crate::ir_buffer::IrChannelSet; 2],
    pre_ir: &[Vec<f32>],
    shaped: &mut [Vec<f32>],
    ir_len_without_zeros: usize,
    ir_len_with_zeros: usize,
    fs: f64,
    decay_color_rate: f32,
    decay_current: &mut f32,
    lowpass: &mut [Biquad],
    highpass: &mut [Biquad],
) {
    let decay_control = f32::from_bits(shared.decay_control_bits.load(Ordering::Relaxed));
    let color_control = f32::from_bits(shared.color_control_bits.load(Ordering::Relaxed));
    let write_slot = shared.write_slot.load(Ordering::Relaxed) as usize;

    let decay_target = log_ten_0to1(decay_control.clamp(0.0, 1.0), DECAY_KNOB_DECADES).max(DECAY_MIN);
    *decay_current = exp_smoothing(decay_target, *decay_current, decay_color_rate);

    let cut_sample = ir_len_without_zeros as f32 * *decay_current;
    let tail_tau = (cut_sample * DECAY_ENVELOPE_PERCENTAGE).min(DECAY_ENVELOPE_MAX_SECONDS * fs as f32);
    let tail_rate = if tail_tau > 0.0 { (-1.0f32 / tail_tau).exp() } else { 0.0 };

    let (lp_cutoff, hp_cutoff) = if color_control <= 0.0 {
        (exp_map(1.0 + color_control, COLOR_LPF_FREQ_MIN, COLOR_LPF_FREQ_MAX), COLOR_HPF_FREQ_MIN as f32)
    } else {
        (COLOR_LPF_FREQ_MAX as f32, exp_map(color_control, COLOR_HPF_FREQ_MIN, COLOR_HPF_FREQ_MAX))
    };

    for (ch, buf) in shaped.iter_mut().enumerate() {
        let src = &pre_ir[ch.min(pre_ir.len() - 1)];
        buf[..ir_len_with_zeros].copy_from_slice(&src[..ir_len_with_zeros]);

        let mut envelope = 1.0f32;
        let cut = cut_sample.round() as usize;
        for (i, s) in buf.iter_mut().enumerate().take(ir_len_without_zeros) {
            if i >= cut {
                envelope *= tail_rate;
            }
            *s *= envelope;
        }
        for s in buf[ir_len_without_zeros..].iter_mut() {
            *s = 0.0;
        }

        lowpass[ch].clear_state();
        lowpass[ch].set_target_freq(lp_cutoff, decay_color_rate, fs);
        let mut tmp = vec![0.0f32; ir_len_with_zeros];
        lowpass[ch].process(&buf[..ir_len_with_zeros], &mut tmp);

        highpass[ch].clear_state();
        highpass[ch].set_target_freq(hp_cutoff, decay_color_rate, fs);
        highpass[ch].process(&tmp, &mut buf[..ir_len_with_zeros]);
    }

    for ch in 0..post_ir[write_slot].len() {
        post_ir[write_slot][ch].store(Arc::new(shaped[ch.min(shaped.len() - 1)].clone()));
    }

    shared.updating_ir.store(false, Ordering::Release);
}

impl Drop for ReverbController {
    fn drop(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.stop(IR_WORKER_STOP_TIMEOUT_MS);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_controller() -> ReverbController {
        ReverbController::new(Arc::new(ImpulseResponses::new()))
    }

    #[test]
    fn out_of_range_params_pass_through() {
        let mut controller = make_controller();
        let input = vec![0.3f32; 64];
        let mut output = vec![0.0f32; 64];
        {
            let ins: Vec<&[f32]> = vec![&input];
            let mut outs: Vec<&mut [f32]> = vec![&mut output];
            controller.process(&ins, &mut outs, false, 48_000.0, 100, 0.5, 0.0, 0.0, 0);
        }
        assert_eq!(output, input);
    }

    #[test]
    fn fully_dry_is_passthrough_after_settling() {
        let mut controller = make_controller();
        let input = vec![0.25f32; 64];

        for _ in 0..200 {
            let mut output = vec![0.0f32; 64];
            let ins: Vec<&[f32]> = vec![&input];
            let mut outs: Vec<&mut [f32]> = vec![&mut output];
            controller.process(&ins, &mut outs, false, 48_000.0, 64, 0.5, 0.0, -1.0, 0);
        }

        let mut output = vec![0.0f32; 64];
        {
            let ins: Vec<&[f32]> = vec![&input];
            let mut outs: Vec<&mut [f32]> = vec![&mut output];
            controller.process(&ins, &mut outs, false, 48_000.0, 64, 0.5, 0.0, -1.0, 0);
        }
        for s in output {
            assert!((s - 0.25).abs() < 1e-3);
        }
    }

    #[test]
    fn produces_finite_output_across_blocks_and_ir_switches() {
        let mut controller = make_controller();
        for block in 0..40u32 {
            let ir_index = (block / 10) as usize % 2;
            let input: Vec<f32> = (0..64).map(|i| ((i + block as usize) as f32 * 0.1).sin()).collect();
            let mut output = vec![0.0f32; 64];
            let ins: Vec<&[f32]> = vec![&input];
            let mut outs: Vec<&mut [f32]> = vec![&mut output];
            controller.process(&ins, &mut outs, false, 48_000.0, 64, 0.8, 0.2, 0.0, ir_index);
            assert!(output.iter().all(|s| s.is_finite()));
        }
    }

    #[test]
    fn block_size_change_keeps_producing_finite_output() {
        let mut controller = make_controller();
        let input64 = vec![0.1f32; 64];
        for _ in 0..5 {
            let mut output = vec![0.0f32; 64];
            let ins: Vec<&[f32]> = vec![&input64];
            let mut outs: Vec<&mut [f32]> = vec![&mut output];
            controller.process(&ins, &mut outs, false, 48_000.0, 64, 0.5, 0.0, 0.0, 0);
        }

        let input256 = vec![0.1f32; 256];
        for _ in 0..5 {
            let mut output = vec![0.0f32; 256];
            let ins: Vec<&[f32]> = vec![&input256];
            let mut outs: Vec<&mut [f32]> = vec![&mut output];
            controller.process(&ins, &mut outs, false, 48_000.0, 256, 0.5, 0.0, 0.0, 0);
            assert!(output.iter().all(|s| s.is_finite()));
        }
    }
}
