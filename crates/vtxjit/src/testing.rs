//! Random vertex formats, parameters and sources for comparing compiled decoders against the
//! interpreter.
use nanorand::{Rng, WyRand};
use vtxdec::vtype::{Width, raw};
use vtxdec::{DecodeParams, DecoderOptions, UvScale, VertexDecoder};

/// A random float in `-range..range`.
pub fn random_float(rng: &mut WyRand, range: f32) -> f32 {
    let unit = (rng.generate::<u32>() >> 8) as f32 / (1 << 24) as f32;
    (unit * 2.0 - 1.0) * range
}

/// A random vertex type code. Always has a position and a valid color format.
pub fn random_vtype(rng: &mut WyRand) -> u32 {
    const COLORS: [u32; 5] = [0, raw::COL_565, raw::COL_5551, raw::COL_4444, raw::COL_8888];

    let mut bits = rng.generate_range(0..4u32)
        | COLORS[rng.generate_range(0..COLORS.len())]
        | rng.generate_range(0..4u32) << 5
        | rng.generate_range(1..4u32) << 7;

    if rng.generate_range(0..2u32) == 0 {
        bits |= rng.generate_range(1..4u32) << 9;
        bits |= raw::weight_count(rng.generate_range(1..9u32));
    }

    if rng.generate_range(0..3u32) == 0 {
        bits |= raw::morph_count(rng.generate_range(2..9u32));
    }

    if rng.generate_range(0..4u32) == 0 {
        bits |= raw::THROUGH;
    }

    bits
}

pub fn random_options(rng: &mut WyRand) -> DecoderOptions {
    DecoderOptions {
        expand_uv_to_float: rng.generate_range(0..2u32) == 0,
        expand_8bit_normals_to_float: rng.generate_range(0..2u32) == 0,
        prescale_uv: rng.generate_range(0..2u32) == 0,
        double_tex_coords: rng.generate_range(0..2u32) == 0,
    }
}

pub fn random_params(rng: &mut WyRand, morph_count: usize) -> DecodeParams {
    let weights: Vec<f32> = (0..morph_count)
        .map(|_| random_float(rng, 1.0))
        .collect();

    let mut params = DecodeParams::default()
        .with_morph_weights(&weights)
        .with_uv(UvScale {
            u_scale: random_float(rng, 4.0),
            v_scale: random_float(rng, 4.0),
            u_off: random_float(rng, 1.0),
            v_off: random_float(rng, 1.0),
        });

    for bone in 0..8 {
        params = params.with_bone(bone, std::array::from_fn(|_| random_float(rng, 2.0)));
    }

    params
}

/// Random source records for `vertices` vertices. Float components are always finite.
pub fn random_source(rng: &mut WyRand, decoder: &VertexDecoder, vertices: usize) -> Vec<u8> {
    let data = random_bytes(rng, vertices * decoder.layout().size as usize);
    fill_floats(decoder, vertices, data, || random_float(rng, 2.0))
}

/// Source records for `vertices` vertices where the `n`th float component is `value(n)`,
/// counting in memory order. Every other byte is random.
pub fn source_with_floats(
    rng: &mut WyRand,
    decoder: &VertexDecoder,
    vertices: usize,
    mut value: impl FnMut(usize) -> f32,
) -> Vec<u8> {
    let data = random_bytes(rng, vertices * decoder.layout().size as usize);
    let mut n = 0;
    fill_floats(decoder, vertices, data, || {
        n += 1;
        value(n - 1)
    })
}

fn random_bytes(rng: &mut WyRand, len: usize) -> Vec<u8> {
    (0..len).map(|_| rng.generate::<u8>()).collect()
}

fn fill_floats(
    decoder: &VertexDecoder,
    vertices: usize,
    mut data: Vec<u8>,
    mut value: impl FnMut() -> f32,
) -> Vec<u8> {
    let vtype = decoder.vtype();
    let layout = decoder.layout();

    // in memory order
    let floats = [
        (vtype.weights(), layout.weights, vtype.weight_count()),
        (vtype.tex_coords(), layout.tex_coords, 2),
        (vtype.normal(), layout.normal, 3),
        (vtype.position(), layout.position, 3),
    ];

    for vertex in 0..vertices {
        for target in 0..layout.morph_count {
            let record = vertex * layout.size as usize + (target * layout.one_size) as usize;
            for (width, offset, count) in floats {
                if width != Some(Width::Float) {
                    continue;
                }

                for i in 0..count as usize {
                    let start = record + offset as usize + 4 * i;
                    data[start..start + 4].copy_from_slice(&value().to_le_bytes());
                }
            }
        }
    }

    data
}
