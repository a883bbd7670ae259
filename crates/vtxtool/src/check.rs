use eyre_pretty::{Context, Result, bail};
use nanorand::{Rng, WyRand};
use vtxdec::{DecoderOptions, VertexDecoder, VertexReader, VertexType};
use vtxjit::testing::{random_params, random_source, random_vtype};
use vtxjit::{CompileError, Compiler, Settings};

const VERTICES: usize = 64;

enum Outcome {
    Match,
    Unsupported,
    Mismatch,
}

fn check_one(
    compiler: &mut Compiler,
    rng: &mut WyRand,
    vtype: u32,
    options: DecoderOptions,
) -> Result<Outcome> {
    let mut decoder = VertexDecoder::new(VertexType::from_bits(vtype), options);
    let jitted = match vtxdec::DecoderCompiler::compile(compiler, &decoder) {
        Ok(jitted) => jitted,
        Err(CompileError::Unsupported { step }) => {
            tracing::debug!("0x{vtype:08X}: step \"{step}\" is interpreted");
            return Ok(Outcome::Unsupported);
        }
        Err(e) => return Err(e).context(format!("compiling 0x{vtype:08X}")),
    };

    // SAFETY: the decoder is dropped before the code buffer is cleared
    unsafe { decoder.attach_jitted(jitted) };

    let src = random_source(rng, &decoder, VERTICES);
    let params = random_params(rng, decoder.layout().morph_count as usize);
    let stride = decoder.stride() as usize;

    let mut interpreted = vec![0xAA; VERTICES * stride];
    let mut compiled = vec![0x55; VERTICES * stride];
    decoder.decode_verts_interpreted(&mut interpreted, &src, 0..VERTICES, &params);
    decoder.decode_verts(&mut compiled, &src, 0..VERTICES, &params);

    let mismatch = interpreted
        .chunks_exact(stride)
        .zip(compiled.chunks_exact(stride))
        .position(|(a, b)| a != b);

    let Some(index) = mismatch else {
        return Ok(Outcome::Match);
    };

    let mut expected = VertexReader::new(&interpreted, *decoder.format(), decoder.vtype());
    let mut got = VertexReader::new(&compiled, *decoder.format(), decoder.vtype());
    expected.goto(index);
    got.goto(index);

    tracing::error!(
        "0x{vtype:08X} ({}) differs at vertex {index} with {options:?}",
        decoder.summary()
    );
    tracing::error!("interpreted: {expected}");
    tracing::error!("compiled:    {got}");

    Ok(Outcome::Mismatch)
}

pub fn check(
    vtypes: &[u32],
    count: usize,
    seed: Option<u64>,
    options: DecoderOptions,
) -> Result<()> {
    let seed = seed.unwrap_or_else(|| nanorand::tls_rng().generate());
    tracing::info!("checking with seed {seed}");

    let mut rng = WyRand::new_seed(seed);
    let mut compiler = Compiler::new(Settings::default()).context("creating decoder compiler")?;

    let vtypes: Vec<u32> = if vtypes.is_empty() {
        (0..count).map(|_| random_vtype(&mut rng)).collect()
    } else {
        vtypes.to_vec()
    };

    let (mut matches, mut unsupported, mut mismatches) = (0, 0, 0);
    for vtype in vtypes {
        if compiler.code_used() > compiler.settings().code_capacity / 2 {
            // SAFETY: every decoder compiled so far has been dropped
            unsafe { vtxdec::DecoderCompiler::clear(&mut compiler) };
        }

        match check_one(&mut compiler, &mut rng, vtype, options)? {
            Outcome::Match => matches += 1,
            Outcome::Unsupported => unsupported += 1,
            Outcome::Mismatch => mismatches += 1,
        }
    }

    tracing::info!("{matches} matched, {unsupported} interpreted only, {mismatches} mismatched");
    if mismatches > 0 {
        bail!("{mismatches} compiled decoders differ from the interpreter");
    }

    Ok(())
}
