//! Renders a WAV file through `ReverbController` offline, block by block,
//! exercising exactly the `process()` contract a real host would use.

use clap::Parser;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use nupc_reverb::controller::ReverbController;
use nupc_reverb::ir_bank::ImpulseResponses;
use std::sync::Arc;

/// Render a mono or stereo WAV file through the convolution reverb engine.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input WAV file (mono or stereo, any sample rate)
    input: String,

    /// Output WAV file
    output: String,

    /// Impulse response index into the built-in bank
    #[arg(long, default_value_t = 0)]
    ir_index: usize,

    /// Decay control, 0..1
    #[arg(long, default_value_t = 0.5)]
    decay: f32,

    /// Color control, -1..1
    #[arg(long, default_value_t = 0.0)]
    color: f32,

    /// Dry/wet control, -1 (fully dry) .. 1 (fully wet)
    #[arg(long, default_value_t = 0.0)]
    dry_wet: f32,

    /// Host block size fed to the engine per call
    #[arg(long, default_value_t = 512)]
    block_size: usize,

    /// List the built-in impulse responses and exit
    #[arg(long, default_value_t = false)]
    list_irs: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let bank = Arc::new(ImpulseResponses::new());

    if args.list_irs {
        for i in 0..bank.ir_count() {
            println!("{i}: {} ({} samples)", bank.ir_name(i), bank.ir_len(i));
        }
        return Ok(());
    }

    let mut reader = WavReader::open(&args.input)?;
    let spec = reader.spec();
    let num_channels = spec.channels as usize;
    let fs = spec.sample_rate as f64;
    let stereo = num_channels >= 2;

    println!(
        "rendering {} ({} Hz, {} ch) with IR #{} \"{}\", decay={}, color={}, dry_wet={}",
        args.input,
        spec.sample_rate,
        num_channels,
        args.ir_index,
        bank.ir_name(args.ir_index),
        args.decay,
        args.color,
        args.dry_wet,
    );

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        SampleFormat::Int => {
            let max_val = (1i32 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<Result<_, _>>()?
        }
    };

    let frames = samples.len() / num_channels;
    let mut channels: Vec<Vec<f32>> = vec![vec![0.0f32; frames]; num_channels.min(2).max(1)];
    for (i, frame) in samples.chunks(num_channels).enumerate() {
        for ch in 0..channels.len() {
            channels[ch][i] = frame[ch.min(num_channels - 1)];
        }
    }

    let out_spec = WavSpec {
        channels: channels.len() as u16,
        sample_rate: spec.sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(&args.output, out_spec)?;

    let mut reverb = ReverbController::new(bank);
    let block_size = args.block_size;
    let mut pos = 0;
    let mut scratch_out: Vec<Vec<f32>> = vec![vec![0.0f32; block_size]; channels.len()];

    while pos < frames {
        let this_block = block_size.min(frames - pos);

        let mut in_bufs: Vec<Vec<f32>> = channels.iter().map(|ch| ch[pos..pos + this_block].to_vec()).collect();
        for buf in in_bufs.iter_mut() {
            buf.resize(block_size, 0.0);
        }
        for out in scratch_out.iter_mut() {
            out.fill(0.0);
        }

        let ins: Vec<&[f32]> = in_bufs.iter().map(|b| b.as_slice()).collect();
        let mut outs: Vec<&mut [f32]> = scratch_out.iter_mut().map(|b| b.as_mut_slice()).collect();

        reverb.process(
            &ins,
            &mut outs,
            stereo,
            fs,
            block_size,
            args.decay,
            args.color,
            args.dry_wet,
            args.ir_index,
        );

        for i in 0..this_block {
            for ch in scratch_out.iter() {
                writer.write_sample(ch[i])?;
            }
        }

        pos += this_block;
    }

    writer.finalize()?;
    println!("wrote {}", args.output);
    Ok(())
}
