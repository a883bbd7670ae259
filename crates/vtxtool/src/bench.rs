use bytesize::ByteSize;
use eyre_pretty::{Context, Result};
use nanorand::WyRand;
use std::time::{Duration, Instant};
use vtxdec::{DecoderOptions, VertexDecoder, VertexType};
use vtxjit::testing::{random_params, random_source};
use vtxjit::{Compiler, Settings};

fn measure(iterations: usize, mut decode: impl FnMut()) -> Duration {
    // warm up
    decode();

    let start = Instant::now();
    for _ in 0..iterations {
        decode();
    }

    start.elapsed()
}

fn report(name: &str, elapsed: Duration, vertices: usize, bytes: usize) {
    let seconds = elapsed.as_secs_f64();
    let throughput = (bytes as f64 / seconds) as u64;
    let rate = vertices as f64 / seconds / 1_000_000.0;

    println!(
        "{name:>12}: {elapsed:>10.2?} | {rate:>8.2} Mvtx/s | {}/s",
        ByteSize(throughput).display()
    );
}

pub fn bench(
    vtype: u32,
    vertices: usize,
    iterations: usize,
    options: DecoderOptions,
) -> Result<()> {
    let mut compiler = Compiler::new(Settings::default()).context("creating decoder compiler")?;
    let mut decoder = VertexDecoder::new(VertexType::from_bits(vtype), options);
    println!("{}", decoder.summary());

    let mut rng = WyRand::new_seed(0x5EED);
    let src = random_source(&mut rng, &decoder, vertices);
    let params = random_params(&mut rng, decoder.layout().morph_count as usize);
    let mut dst = vec![0; vertices * decoder.stride() as usize];

    let total = vertices * iterations;
    let bytes = src.len() * iterations;

    let elapsed = measure(iterations, || {
        decoder.decode_verts_interpreted(&mut dst, &src, 0..vertices, &params);
    });
    report("interpreted", elapsed, total, bytes);

    match vtxdec::DecoderCompiler::compile(&mut compiler, &decoder) {
        Ok(jitted) => {
            // SAFETY: the compiler outlives the decoder and is never cleared
            unsafe { decoder.attach_jitted(jitted) };

            let elapsed = measure(iterations, || {
                decoder.decode_verts(&mut dst, &src, 0..vertices, &params);
            });
            report("compiled", elapsed, total, bytes);
        }
        Err(e) => tracing::warn!("decoder is interpreted only: {e}"),
    }

    Ok(())
}
