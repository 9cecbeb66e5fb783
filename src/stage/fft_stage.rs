//! Overlap-save FFT convolution stage, generic over block size and over
//! whether it sits in the "standard" ladder (latency of one block size,
//! optionally processed on a worker thread) or the "replacing" ladder
//! (inline only, zero extra latency, active only when the host's block
//! size matches this stage's exactly).
//!
//! A stage whose block size is larger than the host's audio block size
//! processes on its own worker thread, started once at construction and
//! woken with [`Worker::notify`] every time enough host blocks have
//! accumulated to fill this stage's window. The double-buffered input and
//! output hand-off between the audio thread and that worker is guarded by
//! a small per-slot mutex rather than raw shared pointers: the two sides
//! are constructed to never touch the same slot at the same instant, so
//! in the common case the lock is uncontended and merely establishes the
//! happens-before edge; if the worker ever falls behind, the audio thread
//! blocks briefly instead of racing it.

use super::Stage;
use crate::fft::{freq_domain_len, Fft};
use crate::ir_buffer::IrChannelSet;
use crate::worker::Worker;
use num_complex::Complex32;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

struct BufferSlot {
    input: Vec<Vec<f32>>,
    output: Vec<Vec<f32>>,
}

/// Everything touched only inside one offline convolution cycle — FFT
/// scratch, the per-partition frequency-domain history, and the overlap
/// tail. Either owned inline by the stage (small block sizes, processed
/// on the audio thread) or moved wholesale into the worker thread's
/// closure (large block sizes).
struct ConvState {
    block_size: usize,
    block_count: usize,
    block_offset: usize,
    num_channels: usize,
    fft: Fft,
    /// `ir[buffer][channel]`: the full padded, post-processed impulse
    /// response shared with every other stage in the engine. Content is
    /// published by the controller's IR-update worker through
    /// `ArcSwap::store`; this stage loads one snapshot per channel per
    /// offline processing cycle.
    ir: [IrChannelSet; 2],
    ir_index: Arc<AtomicU8>,
    audio_in_blocks: Vec<Vec<Vec<Complex32>>>,
    audio_in_blocks_write_ptr: usize,
    ir_block_time: Vec<f32>,
    ir_block_freq: Vec<Complex32>,
    conv_freq: Vec<Complex32>,
    conv_time: Vec<f32>,
    overlap: Vec<Vec<f32>>,
    time_scratch: Vec<f32>,
    buffers: Vec<Arc<Mutex<BufferSlot>>>,
}

impl ConvState {
    fn run(&mut self, slot_index: usize) {
        let block_size = self.block_size;
        let block_count = self.block_count;
        let block_offset = self.block_offset;
        let ir_index = self.ir_index.load(Ordering::Acquire) as usize;
        let write_ptr = self.audio_in_blocks_write_ptr;

        let mut slot = self.buffers[slot_index].lock().unwrap();

        for ch in 0..self.num_channels {
            self.time_scratch[..block_size].copy_from_slice(&slot.input[ch]);
            for sample in &mut self.time_scratch[block_size..] {
                *sample = 0.0;
            }
            self.fft
                .forward(&mut self.time_scratch, &mut self.audio_in_blocks[ch][write_ptr]);

            for bin in self.conv_freq.iter_mut() {
                *bin = Complex32::new(0.0, 0.0);
            }

            for b in 0..block_count {
                let read_ptr = if b <= write_ptr {
                    write_ptr - b
                } else {
                    write_ptr + block_count - b
                };

                let ir_buf = self.ir[ir_index][ch].load_full();
                let start = (b + block_offset) * block_size;
                self.ir_block_time[..block_size].copy_from_slice(&ir_buf[start..start + block_size]);
                for sample in &mut self.ir_block_time[block_size..] {
                    *sample = 0.0;
                }
                self.fft.forward(&mut self.ir_block_time, &mut self.ir_block_freq);

                self.fft
                    .convolve_accum(&mut self.conv_freq, &self.ir_block_freq, &self.audio_in_blocks[ch][read_ptr]);
            }

            self.fft.inverse(&mut self.conv_freq, &mut self.conv_time);

            for i in 0..block_size {
                slot.output[ch][i] = self.conv_time[i] + self.overlap[ch][i];
            }
            self.overlap[ch].copy_from_slice(&self.conv_time[block_size..]);
        }

        drop(slot);

        self.audio_in_blocks_write_ptr += 1;
        if self.audio_in_blocks_write_ptr >= block_count {
            self.audio_in_blocks_write_ptr = 0;
        }
    }
}

pub struct FftStage {
    block_size: usize,
    block_count: usize,
    num_channels: usize,
    audio_processing_block_size: usize,
    replaces_direct_stage: bool,
    skip_this_stage: bool,
    conv_processing_point_samples: usize,
    process_in_thread: bool,
    num_buffers: usize,

    audio_buffer_ptr: usize,
    audio_read_write_buffer_index: usize,

    buffers: Vec<Arc<Mutex<BufferSlot>>>,
    process_buffer_index: Arc<AtomicUsize>,
    ir_index: Arc<AtomicU8>,

    conv_state: Option<ConvState>,
    worker: Option<Worker>,
}

impl FftStage {
    /// `ir0`/`ir1` are the two double-buffered impulse responses, one
    /// `Vec<Arc<Vec<f32>>>` per channel, shared (by `Arc` clone, not
    /// copy) with every other stage in the engine.
    pub fn new(
        block_size: usize,
        block_count: usize,
        replaces_direct_stage: bool,
        audio_processing_block_size: usize,
        num_channels: usize,
        ir0: IrChannelSet,
        ir1: IrChannelSet,
    ) -> std::io::Result<Self> {
        let process_in_thread = !replaces_direct_stage && block_size > audio_processing_block_size;
        let conv_processing_point_samples = if process_in_thread || block_size <= audio_processing_block_size {
            block_size
        } else {
            block_size / 2
        };
        let skip_this_stage = if replaces_direct_stage {
            audio_processing_block_size != block_size
        } else {
            audio_processing_block_size > block_size
        };
        let num_buffers = if replaces_direct_stage { 1 } else { 2 };
        let block_offset = if replaces_direct_stage { 0 } else { 2 };

        for ir in ir0.iter().chain(ir1.iter()) {
            debug_assert!(ir.load().len() >= (block_offset + block_count) * block_size);
        }

        let fft_size = 2 * block_size;
        let freq_len = freq_domain_len(fft_size);

        let buffers: Vec<Arc<Mutex<BufferSlot>>> = (0..num_buffers)
            .map(|_| {
                Arc::new(Mutex::new(BufferSlot {
                    input: vec![vec![0.0f32; block_size]; num_channels],
                    output: vec![vec![0.0f32; block_size]; num_channels],
                }))
            })
            .collect();

        let ir_index = Arc::new(AtomicU8::new(0));
        let process_buffer_index = Arc::new(AtomicUsize::new(if num_buffers == 2 { 1 } else { 0 }));

        let conv_state = ConvState {
            block_size,
            block_count,
            block_offset,
            num_channels,
            fft: Fft::new(fft_size),
            ir: [ir0, ir1],
            ir_index: ir_index.clone(),
            audio_in_blocks: vec![vec![vec![Complex32::new(0.0, 0.0); freq_len]; block_count]; num_channels],
            audio_in_blocks_write_ptr: 0,
            ir_block_time: vec![0.0f32; fft_size],
            ir_block_freq: vec![Complex32::new(0.0, 0.0); freq_len],
            conv_freq: vec![Complex32::new(0.0, 0.0); freq_len],
            conv_time: vec![0.0f32; fft_size],
            overlap: vec![vec![0.0f32; block_size]; num_channels],
            time_scratch: vec![0.0f32; fft_size],
            buffers: buffers.clone(),
        };

        let (conv_state, worker) = if process_in_thread && !skip_this_stage {
            let process_buffer_index_worker = process_buffer_index.clone();
            let mut conv_state = conv_state;
            let worker = Worker::spawn(
                &format!("conv-fft-{block_size}"),
                || {},
                move || {
                    let idx = process_buffer_index_worker.load(Ordering::Acquire);
                    conv_state.run(idx);
                },
                || {},
            )?;
            (None, Some(worker))
        } else {
            (Some(conv_state), None)
        };

        Ok(Self {
            block_size,
            block_count,
            num_channels,
            audio_processing_block_size,
            replaces_direct_stage,
            skip_this_stage,
            conv_processing_point_samples,
            process_in_thread,
            num_buffers,
            audio_buffer_ptr: 0,
            audio_read_write_buffer_index: 0,
            buffers,
            process_buffer_index,
            ir_index,
            conv_state,
            worker,
        })
    }
}

impl Stage for FftStage {
    fn process(&mut self, audio_in: &[&[f32]], audio_out: &mut [&mut [f32]]) {
        if self.skip_this_stage {
            return;
        }

        let num_channels = self.num_channels;
        let audio_processing_block_size = self.audio_processing_block_size;
        let write_base = self.audio_buffer_ptr;
        let rw = self.audio_read_write_buffer_index;

        {
            let mut slot = self.buffers[rw].lock().unwrap();
            for ch in 0..num_channels {
                slot.input[ch][write_base..write_base + audio_processing_block_size]
                    .copy_from_slice(&audio_in[ch][..audio_processing_block_size]);

                if !self.replaces_direct_stage {
                    for i in 0..audio_processing_block_size {
                        audio_out[ch][i] += slot.output[ch][write_base + i];
                    }
                }
            }
        }

        let mut audio_buffer_ptr = write_base + audio_processing_block_size;

        if audio_buffer_ptr == self.conv_processing_point_samples {
            if self.process_in_thread {
                self.process_buffer_index.store(rw, Ordering::Release);
                if let Some(worker) = &self.worker {
                    worker.notify();
                }
            } else {
                let process_idx = if self.num_buffers == 2 { 1 - rw } else { rw };
                if let Some(conv_state) = &mut self.conv_state {
                    conv_state.run(process_idx);
                }
            }
        }

        let mut rw_next = rw;
        if audio_buffer_ptr >= self.block_size {
            debug_assert_eq!(audio_buffer_ptr, self.block_size);
            audio_buffer_ptr = 0;
            if self.num_buffers == 2 {
                rw_next = 1 - rw;
            }
        }

        if self.replaces_direct_stage {
            let slot = self.buffers[rw].lock().unwrap();
            for ch in 0..num_channels {
                for i in 0..audio_processing_block_size {
                    audio_out[ch][i] += slot.output[ch][write_base + i];
                }
            }
        }

        self.audio_read_write_buffer_index = rw_next;
        self.audio_buffer_ptr = audio_buffer_ptr;
    }

    fn can_update_ir(&self) -> bool {
        if self.skip_this_stage {
            true
        } else {
            self.audio_buffer_ptr
                == self
                    .conv_processing_point_samples
                    .saturating_sub(self.audio_processing_block_size)
        }
    }

    fn update_ir(&mut self, ir_index: u8) {
        self.ir_index.store(ir_index, Ordering::Release);
    }

    fn covered_len(&self) -> usize {
        if self.skip_this_stage {
            0
        } else {
            self.block_size * self.block_count
        }
    }
}

impl Drop for FftStage {
    fn drop(&mut self) {
        if let Some(worker) = &mut self.worker {
            worker.stop(crate::constants::STAGE_WORKER_STOP_TIMEOUT_MS);
        }
    }
}
