//! Assembles the direct-form stage and both families of FFT stages into
//! one non-uniform partitioned convolution ladder.
//!
//! The partition scheme doubles the block size at every step, starting
//! from [`SMALLEST_STAGE_SIZE`] and ending at [`LONGEST_STAGE_SIZE`]:
//!
//! ```text
//! FFT        FFT      FFT   FFT  FFT  DIRECT
//! 4BS        2BS      BS    BS   2BS
//! ...
//! ```
//!
//! Two families of FFT stages are built side by side. The "standard"
//! family always runs, contributes latency equal to its block size, and
//! together with the direct-form head covers the whole impulse response.
//! The "replacing" family starts at `2 * DIRECT_STAGE_MAX_BLOCK_SIZE` and
//! is only active in the single stage whose block size equals the host's
//! block size — there it contributes zero added latency and takes over
//! from the direct-form stage, which stops running once the host block
//! size exceeds [`DIRECT_STAGE_MAX_BLOCK_SIZE`].
//!
//! Every stage, active or not, is handed the same pair of shared,
//! double-buffered impulse-response buffers; `skip_this_stage` (computed
//! inside each [`FftStage`]) decides at runtime which ones actually do
//! work for a given host block size, so reconfiguring the engine never
//! needs to change which stages exist.

use crate::constants::{
    is_pow_of_2, DIRECT_STAGE_MAX_BLOCK_SIZE, LONGEST_STAGE_SIZE, MAX_BLOCK_SIZE, MIN_BLOCK_SIZE,
    SMALLEST_STAGE_SIZE,
};
use crate::error::{ReverbError, ReverbResult};
use crate::ir_buffer::{clone_handles, IrChannelSet};
use crate::stage::direct::DirectStage;
use crate::stage::fft_stage::FftStage;
use crate::stage::Stage;

/// The longest FFT stage's block count when it is not part of the
/// zero-latency replacing family: the IR's padded length minus the two
/// longest-stage blocks already covered by every smaller stage, in units
/// of `LONGEST_STAGE_SIZE`.
fn longest_stage_block_count(ir_len_padded: usize) -> usize {
    ir_len_padded / LONGEST_STAGE_SIZE - 2
}

/// The live convolution engine: a direct-form head (when the host block
/// is small enough to afford one) plus the standard and replacing FFT
/// stage ladders.
pub struct Engine {
    audio_processing_block_size: usize,
    num_channels: usize,
    direct_stage: Option<DirectStage>,
    standard_stages: Vec<Box<dyn Stage>>,
    replacing_stages: Vec<Box<dyn Stage>>,
}

impl Engine {
    /// Builds every stage for `audio_processing_block_size` against the
    /// shared double-buffered impulse response `ir0`/`ir1` (one
    /// [`IrChannelSet`] per buffer, covering `ir_len_with_zeros`
    /// samples of which only the first `ir_len_without_zeros` are real
    /// IR content — the rest is padding up to a `LONGEST_STAGE_SIZE`
    /// boundary).
    pub fn new(
        audio_processing_block_size: usize,
        num_channels: usize,
        ir0: IrChannelSet,
        ir1: IrChannelSet,
        ir_len_without_zeros: usize,
        ir_len_with_zeros: usize,
    ) -> ReverbResult<Self> {
        if !is_pow_of_2(audio_processing_block_size)
            || audio_processing_block_size < MIN_BLOCK_SIZE
            || audio_processing_block_size > MAX_BLOCK_SIZE
        {
            return Err(ReverbError::InvalidConfig(format!(
                "audio_processing_block_size {audio_processing_block_size} is not a supported power of two"
            )));
        }

        let ir_len_padded = if ir_len_without_zeros % LONGEST_STAGE_SIZE == 0 {
            ir_len_without_zeros
        } else {
            ir_len_without_zeros + LONGEST_STAGE_SIZE - (ir_len_without_zeros % LONGEST_STAGE_SIZE)
        };

        if ir_len_padded < ir_len_without_zeros || ir_len_padded > ir_len_with_zeros {
            return Err(ReverbError::InvalidConfig(format!(
                "impulse response padded length {ir_len_padded} does not fit between {ir_len_without_zeros} and {ir_len_with_zeros}"
            )));
        }

        if ir_len_padded < 2 * LONGEST_STAGE_SIZE {
            return Err(ReverbError::IrTooShort {
                len: ir_len_padded,
                min_len: 2 * LONGEST_STAGE_SIZE,
            });
        }

        let ir_block_count_lg = longest_stage_block_count(ir_len_padded);
        debug_assert_eq!(
            (ir_block_count_lg + 2) * LONGEST_STAGE_SIZE,
            ir_len_padded
        );

        let direct_stage = if audio_processing_block_size <= DIRECT_STAGE_MAX_BLOCK_SIZE {
            let direct_block_size = audio_processing_block_size.max(SMALLEST_STAGE_SIZE);
            Some(DirectStage::new(
                audio_processing_block_size,
                direct_block_size,
                num_channels,
                clone_handles(&ir0),
                clone_handles(&ir1),
            ))
        } else {
            None
        };

        let mut standard_stages: Vec<Box<dyn Stage>> = Vec::new();
        let mut block_size = SMALLEST_STAGE_SIZE;
        while block_size <= LONGEST_STAGE_SIZE {
            let block_count = if block_size == LONGEST_STAGE_SIZE {
                ir_block_count_lg
            } else {
                2
            };
            let stage = FftStage::new(
                block_size,
                block_count,
                false,
                audio_processing_block_size,
                num_channels,
                clone_handles(&ir0),
                clone_handles(&ir1),
            )
            .map_err(ReverbError::WorkerSpawn)?;
            standard_stages.push(Box::new(stage));
            block_size *= 2;
        }

        let mut replacing_stages: Vec<Box<dyn Stage>> = Vec::new();
        let mut block_size = 2 * DIRECT_STAGE_MAX_BLOCK_SIZE;
        while block_size <= LONGEST_STAGE_SIZE {
            let stage = FftStage::new(
                block_size,
                2,
                true,
                audio_processing_block_size,
                num_channels,
                clone_handles(&ir0),
                clone_handles(&ir1),
            )
            .map_err(ReverbError::WorkerSpawn)?;
            replacing_stages.push(Box::new(stage));
            block_size *= 2;
        }

        Ok(Self {
            audio_processing_block_size,
            num_channels,
            direct_stage,
            standard_stages,
            replacing_stages,
        })
    }

    /// Convolves `audio_in` with the active impulse response, writing
    /// the full wet signal (every stage's contribution summed) into
    /// `audio_out`, which is zeroed first.
    pub fn process(&mut self, audio_in: &[&[f32]], audio_out: &mut [&mut [f32]]) {
        for ch in 0..self.num_channels {
            audio_out[ch][..self.audio_processing_block_size].fill(0.0);
        }

        if let Some(direct_stage) = &mut self.direct_stage {
            direct_stage.process(audio_in, audio_out);
        }

        for stage in &mut self.replacing_stages {
            stage.process(audio_in, audio_out);
        }

        for stage in &mut self.standard_stages {
            stage.process(audio_in, audio_out);
        }
    }

    /// True once every stage has reached a safe point to start consuming
    /// a newly published impulse response — in practice, once every
    /// [`LONGEST_STAGE_SIZE`] samples.
    pub fn can_update_ir(&self) -> bool {
        let direct_ready = match &self.direct_stage {
            Some(stage) => stage.can_update_ir(),
            None => true,
        };
        direct_ready
            && self.replacing_stages.iter().all(|s| s.can_update_ir())
            && self.standard_stages.iter().all(|s| s.can_update_ir())
    }

    /// Publishes `ir_index` to every stage in the engine.
    pub fn update_ir(&mut self, ir_index: u8) {
        if let Some(direct_stage) = &mut self.direct_stage {
            direct_stage.update_ir(ir_index);
        }
        for stage in &mut self.replacing_stages {
            stage.update_ir(ir_index);
        }
        for stage in &mut self.standard_stages {
            stage.update_ir(ir_index);
        }
    }

    /// Sum of every stage's [`Stage::covered_len`] — the total impulse
    /// response length this engine's stage ladder actually convolves
    /// against. Should equal the padded IR length passed to [`Self::new`]
    /// with no gap and no double coverage.
    pub fn covered_ir_length(&self) -> usize {
        let direct_len = self
            .direct_stage
            .as_ref()
            .map(|s| s.covered_len())
            .unwrap_or(0);
        let replacing_len: usize = self.replacing_stages.iter().map(|s| s.covered_len()).sum();
        let standard_len: usize = self.standard_stages.iter().map(|s| s.covered_len()).sum();
        direct_len + replacing_len + standard_len
    }
}
