//! Opens a live `cpal` audio loop for manually listening to the reverb.
//! Input passthrough isn't guaranteed on every platform (not every host
//! exposes a default input device, or one compatible with the output
//! stream's config), so this falls back to feeding a synthesized test
//! tone into the engine when no input stream can be built.

use clap::Parser;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use nupc_reverb::controller::ReverbController;
use nupc_reverb::ir_bank::ImpulseResponses;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::HeapRb;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Listen to the convolution reverb live through the default audio output.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Impulse response index into the built-in bank
    #[arg(long, default_value_t = 0)]
    ir_index: usize,

    #[arg(long, default_value_t = 0.5)]
    decay: f32,

    #[arg(long, default_value_t = 0.0)]
    color: f32,

    #[arg(long, default_value_t = 0.3)]
    dry_wet: f32,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let host = cpal::default_host();
    let output_device = host.default_output_device().ok_or("no audio output device found")?;
    let output_config = output_device.default_output_config()?;
    let fs = output_config.sample_rate().0 as f64;
    let channels = output_config.channels() as usize;
    let stereo = channels >= 2;

    eprintln!("🎵 output device: {}", output_device.name()?);
    eprintln!("🎵 {fs} Hz, {channels} channels");

    let bank = Arc::new(ImpulseResponses::new());
    eprintln!(
        "🎛️  IR #{} \"{}\", decay={}, color={}, dry_wet={}",
        args.ir_index,
        bank.ir_name(args.ir_index),
        args.decay,
        args.color,
        args.dry_wet
    );

    // Ring buffer of "dry" input frames; either fed by an input stream or
    // by a synthesized test tone, whichever this platform can give us.
    let ring_capacity = fs as usize * 2;
    let ring = HeapRb::<f32>::new(ring_capacity);
    let (mut dry_producer, mut dry_consumer) = ring.split();

    let input_stream = host.default_input_device().and_then(|device| {
        let config: cpal::StreamConfig = output_config.clone().into();
        let err_fn = |err| eprintln!("input stream error: {err}");
        device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let _ = dry_producer.push_slice(data);
                },
                err_fn,
                None,
            )
            .and_then(|stream| stream.play().map(|_| stream))
            .ok()
    });

    if let Some(stream) = input_stream {
        eprintln!("🎙️  capturing from default input device");
        // Leak the stream handle for the process lifetime; there is no
        // natural owner for it in this demo loop.
        std::mem::forget(stream);
    } else {
        eprintln!("⚠️  no usable input device, feeding a synthesized test tone instead");
        let ring = HeapRb::<f32>::new(ring_capacity);
        let (mut tone_producer, tone_consumer) = ring.split();
        dry_consumer = tone_consumer;
        thread::spawn(move || {
            let mut phase = 0.0f32;
            let freq = 220.0f32;
            loop {
                if tone_producer.vacant_len() > 512 {
                    let mut chunk = [0.0f32; 512];
                    for sample in chunk.iter_mut() {
                        *sample = (phase * std::f32::consts::TAU).sin() * 0.2;
                        phase = (phase + freq / fs as f32).fract();
                    }
                    tone_producer.push_slice(&chunk);
                } else {
                    thread::sleep(Duration::from_millis(2));
                }
            }
        });
    }

    let mut reverb = ReverbController::new(bank);
    let args_decay = args.decay;
    let args_color = args.color;
    let args_dry_wet = args.dry_wet;
    let ir_index = args.ir_index;
    let block_size: usize = 256;
    let mut in_buf = vec![0.0f32; block_size];
    let mut out_channels = vec![vec![0.0f32; block_size]; if stereo { 2 } else { 1 }];

    let err_fn = |err| eprintln!("stream error: {err}");

    let stream = output_device.build_output_stream(
        &output_config.clone().into(),
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            let frames = data.len() / channels;
            let mut pos = 0;
            while pos < frames {
                let this_block = block_size.min(frames - pos);

                let read = dry_consumer.pop_slice(&mut in_buf[..this_block]);
                for sample in in_buf[read..this_block].iter_mut() {
                    *sample = 0.0;
                }

                for out in out_channels.iter_mut() {
                    out[..this_block].fill(0.0);
                }

                let ins: Vec<&[f32]> = vec![&in_buf[..this_block]];
                let mut outs: Vec<&mut [f32]> = out_channels.iter_mut().map(|o| &mut o[..this_block]).collect();

                reverb.process(
                    &ins,
                    &mut outs,
                    stereo,
                    fs,
                    this_block,
                    args_decay,
                    args_color,
                    args_dry_wet,
                    ir_index,
                );

                for i in 0..this_block {
                    for ch in 0..channels {
                        data[(pos + i) * channels + ch] = out_channels[ch.min(out_channels.len() - 1)][i];
                    }
                }

                pos += this_block;
            }
        },
        err_fn,
        None,
    )?;

    stream.play()?;
    eprintln!("✅ streaming, press Ctrl+C to stop");

    loop {
        thread::sleep(Duration::from_secs(60));
    }
}
