//! Interpreter for decode steps.
use crate::codec::{self, Component};
use crate::decoder::{Stage, VertexDecoder, Warning};
use crate::params::DecodeParams;
use crate::step::{
    ColorStep, NormalMode, NormalStep, PositionMode, PositionStep, Step, TexCoordMode,
    TexCoordStep,
};
use crate::vtype::{PackedColor, Width};

/// A step of the interpreter.
pub type StepFn = fn(&Stage, &mut Cursor<'_>);

/// State of a single decode call.
pub struct Cursor<'a> {
    pub decoder: &'a VertexDecoder,
    pub params: &'a DecodeParams,
    /// Source record being decoded, including every morph target.
    pub src: &'a [u8],
    /// Canonical record being written.
    pub dst: &'a mut [u8],
    /// Skinning matrix of the current vertex.
    pub skin: [f32; 12],
}

impl<'a> Cursor<'a> {
    pub fn new(decoder: &'a VertexDecoder, params: &'a DecodeParams) -> Self {
        Self {
            decoder,
            params,
            src: &[],
            dst: &mut [],
            skin: [0.0; 12],
        }
    }

    /// Source data of the stage's attribute in the given morph target.
    #[inline(always)]
    fn source(&self, stage: &Stage, target: usize) -> &'a [u8] {
        let src: &'a [u8] = self.src;
        let start = target * self.decoder.layout().one_size as usize + stage.src as usize;
        &src[start..]
    }

    #[inline(always)]
    fn put(&mut self, stage: &Stage, bytes: &[u8]) {
        let start = stage.dst as usize;
        self.dst[start..start + bytes.len()].copy_from_slice(bytes);
    }

    #[inline(always)]
    fn put_floats<const N: usize>(&mut self, stage: &Stage, values: [f32; N]) {
        let start = stage.dst as usize;
        for (i, value) in values.into_iter().enumerate() {
            let offset = start + 4 * i;
            self.dst[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
        }
    }

    /// Weighted sum of the first `N` components of the stage's attribute over all morph targets.
    #[inline(always)]
    fn morph_sum<C: Component, const N: usize>(&self, stage: &Stage, scale: f32) -> [f32; N] {
        let weights = &self.params.morph_weights;
        let first = self.source(stage, 0);
        let mut sum: [f32; N] =
            std::array::from_fn(|i| C::read(first, i).morph_term(weights[0], scale));

        for target in 1..self.decoder.layout().morph_count as usize {
            let src = self.source(stage, target);
            for (i, sum) in sum.iter_mut().enumerate() {
                *sum += C::read(src, i).morph_term(weights[target], scale);
            }
        }

        sum
    }
}

fn weights<C: Component>(stage: &Stage, cursor: &mut Cursor<'_>) {
    let count = cursor.decoder.vtype().weight_count() as usize;
    let src = cursor.source(stage, 0);
    let bones = &cursor.params.bones;

    let weight = C::read(src, 0).normalize(C::SCALE);
    let mut matrix = bones[0].map(|value| weight * value);
    for (j, bone) in bones.iter().enumerate().take(count).skip(1) {
        let weight = C::read(src, j).normalize(C::SCALE);
        for (m, value) in matrix.iter_mut().zip(bone) {
            *m += weight * value;
        }
    }

    cursor.skin = matrix;
}

fn tc_raw_u8(stage: &Stage, cursor: &mut Cursor<'_>) {
    let src = cursor.source(stage, 0);
    cursor.put(stage, &[src[0], src[1], 0, 0]);
}

fn tc_raw_u16(stage: &Stage, cursor: &mut Cursor<'_>) {
    let src = cursor.source(stage, 0);
    cursor.put(stage, &src[..4]);
}

fn tc_float<C: Component>(stage: &Stage, cursor: &mut Cursor<'_>) {
    let src = cursor.source(stage, 0);
    let scale = cursor.decoder.tc_scale();
    let uv = std::array::from_fn::<_, 2, _>(|i| C::read(src, i).normalize(scale));
    cursor.put_floats(stage, uv);
}

fn tc_prescale<C: Component>(stage: &Stage, cursor: &mut Cursor<'_>) {
    let src = cursor.source(stage, 0);
    let scale = cursor.decoder.tc_scale();
    let uv = cursor.params.uv;
    let u = C::read(src, 0).normalize(scale) * uv.u_scale + uv.u_off;
    let v = C::read(src, 1).normalize(scale) * uv.v_scale + uv.v_off;
    cursor.put_floats(stage, [u, v]);
}

fn tc_through<C: Component>(stage: &Stage, cursor: &mut Cursor<'_>) {
    let src = cursor.source(stage, 0);
    let uv = std::array::from_fn::<_, 2, _>(|i| C::read(src, i).widen());
    cursor.put_floats(stage, uv);
}

fn tc_through_double(stage: &Stage, cursor: &mut Cursor<'_>) {
    let src = cursor.source(stage, 0);
    let uv = std::array::from_fn::<_, 2, _>(|i| u16::read(src, i).widen() * 2.0);
    cursor.put_floats(stage, uv);
}

fn tc_morph<C: Component>(stage: &Stage, cursor: &mut Cursor<'_>) {
    let uv = cursor.morph_sum::<C, 2>(stage, cursor.decoder.tc_scale());
    cursor.put_floats(stage, uv);
}

fn tc_morph_prescale<C: Component>(stage: &Stage, cursor: &mut Cursor<'_>) {
    let [u, v] = cursor.morph_sum::<C, 2>(stage, cursor.decoder.tc_scale());
    let uv = cursor.params.uv;
    cursor.put_floats(stage, [u * uv.u_scale + uv.u_off, v * uv.v_scale + uv.v_off]);
}

fn color_packed<const F: u8>(stage: &Stage, cursor: &mut Cursor<'_>) {
    let value = u16::read(cursor.source(stage, 0), 0);
    let rgba = match F {
        0 => codec::unpack_565(value),
        1 => codec::unpack_5551(value),
        _ => codec::unpack_4444(value),
    };

    cursor.put(stage, &rgba);
}

fn color_8888(stage: &Stage, cursor: &mut Cursor<'_>) {
    let src = cursor.source(stage, 0);
    cursor.put(stage, &src[..4]);
}

fn color_morph_packed<const F: u8>(stage: &Stage, cursor: &mut Cursor<'_>) {
    let channels = |value: u16| -> ([(u16, f32); 4], usize) {
        match F {
            0 => {
                let [r, g, b] = codec::morph_channels_565(value);
                ([r, g, b, (0, 0.0)], 3)
            }
            1 => (codec::morph_channels_5551(value), 4),
            _ => (codec::morph_channels_4444(value), 4),
        }
    };

    let weights = &cursor.params.morph_weights;
    let (first, len) = channels(u16::read(cursor.source(stage, 0), 0));
    let mut sum = first.map(|(c, factor)| codec::color_morph_term(c, weights[0], factor));
    for target in 1..cursor.decoder.layout().morph_count as usize {
        let (channels, _) = channels(u16::read(cursor.source(stage, target), 0));
        for (sum, (c, factor)) in sum.iter_mut().zip(channels) {
            *sum += codec::color_morph_term(c, weights[target], factor);
        }
    }

    let mut rgba = sum.map(codec::color_from_sum);
    if len == 3 {
        rgba[3] = 255;
    }

    cursor.put(stage, &rgba);
}

fn color_morph_8888(stage: &Stage, cursor: &mut Cursor<'_>) {
    let sum = cursor.morph_sum::<u8, 4>(stage, 1.0);
    cursor.put(stage, &sum.map(codec::color_from_sum));
}

fn color_invalid(stage: &Stage, cursor: &mut Cursor<'_>) {
    if cursor.decoder.should_warn(Warning::Color) {
        tracing::warn!(
            vtype = format_args!("0x{:08X}", cursor.decoder.vtype().to_bits()),
            format = ?cursor.decoder.vtype().color(),
            "unsupported color format, writing zeros"
        );
    }

    cursor.put(stage, &[0; 4]);
}

/// Copies a vec3 keeping its width, padding it to a word multiple.
fn vec3_copy<C: Component>(stage: &Stage, cursor: &mut Cursor<'_>) {
    let src = cursor.source(stage, 0);
    match C::SIZE {
        1 => cursor.put(stage, &[src[0], src[1], src[2], 0]),
        2 => {
            let mut out = [0; 8];
            out[..6].copy_from_slice(&src[..6]);
            cursor.put(stage, &out);
        }
        _ => cursor.put(stage, &src[..12]),
    }
}

fn vec3_normalize<C: Component>(stage: &Stage, cursor: &mut Cursor<'_>) {
    let src = cursor.source(stage, 0);
    let v = std::array::from_fn::<_, 3, _>(|i| C::read(src, i).normalize(C::SCALE));
    cursor.put_floats(stage, v);
}

fn vec3_morph<C: Component>(stage: &Stage, cursor: &mut Cursor<'_>) {
    let v = cursor.morph_sum::<C, 3>(stage, C::SCALE);
    cursor.put_floats(stage, v);
}

fn normal_skin<C: Component>(stage: &Stage, cursor: &mut Cursor<'_>) {
    let src = cursor.source(stage, 0);
    let v = std::array::from_fn(|i| C::read(src, i).normalize(C::SCALE));
    let v = codec::transform_normal(v, &cursor.skin);
    cursor.put_floats(stage, v);
}

fn normal_morph_skin<C: Component>(stage: &Stage, cursor: &mut Cursor<'_>) {
    let v = cursor.morph_sum::<C, 3>(stage, C::SCALE);
    let v = codec::transform_normal(v, &cursor.skin);
    cursor.put_floats(stage, v);
}

fn position_skin<C: Component>(stage: &Stage, cursor: &mut Cursor<'_>) {
    let src = cursor.source(stage, 0);
    let v = std::array::from_fn(|i| C::read(src, i).normalize(C::SCALE));
    let v = codec::transform_position(v, &cursor.skin);
    cursor.put_floats(stage, v);
}

fn position_morph_skin<C: Component>(stage: &Stage, cursor: &mut Cursor<'_>) {
    let v = cursor.morph_sum::<C, 3>(stage, C::SCALE);
    let v = codec::transform_position(v, &cursor.skin);
    cursor.put_floats(stage, v);
}

/// Through mode positions: X and Y are signed, Z is unsigned.
fn position_through<S: Component, U: Component>(stage: &Stage, cursor: &mut Cursor<'_>) {
    let src = cursor.source(stage, 0);
    let x = S::read(src, 0).widen();
    let y = S::read(src, 1).widen();
    let z = U::read(src, 2).widen();
    cursor.put_floats(stage, [x, y, z]);
}

fn position_invalid(stage: &Stage, cursor: &mut Cursor<'_>) {
    if cursor.decoder.should_warn(Warning::Position) {
        tracing::warn!(
            vtype = format_args!("0x{:08X}", cursor.decoder.vtype().to_bits()),
            "vertex type has no position, writing zeros"
        );
    }

    cursor.put_floats(stage, [0.0; 3]);
}

fn tex_coords(step: TexCoordStep) -> StepFn {
    use TexCoordMode as Mode;

    match (step.width, step.mode, step.morph) {
        (Width::Byte, Mode::Prescale, true) => tc_morph_prescale::<u8>,
        (Width::Short, Mode::Prescale, true) => tc_morph_prescale::<u16>,
        (Width::Float, Mode::Prescale, true) => tc_morph_prescale::<f32>,
        (Width::Byte, _, true) => tc_morph::<u8>,
        (Width::Short, _, true) => tc_morph::<u16>,
        (Width::Float, _, true) => tc_morph::<f32>,

        (Width::Byte, Mode::Raw, false) => tc_raw_u8,
        (Width::Short, Mode::Raw, false) => tc_raw_u16,
        (Width::Byte, Mode::Float, false) => tc_float::<u8>,
        (Width::Short, Mode::Float, false) => tc_float::<u16>,
        (Width::Float, Mode::Raw | Mode::Float, false) => tc_float::<f32>,

        (Width::Byte, Mode::Prescale, false) => tc_prescale::<u8>,
        (Width::Short, Mode::Prescale, false) => tc_prescale::<u16>,
        (Width::Float, Mode::Prescale, false) => tc_prescale::<f32>,

        (Width::Byte, Mode::Through, false) => tc_through::<u8>,
        (Width::Short, Mode::Through, false) if step.double => tc_through_double,
        (Width::Short, Mode::Through, false) => tc_through::<u16>,
        (Width::Float, Mode::Through, false) => tc_through::<f32>,
    }
}

fn color(step: ColorStep) -> StepFn {
    match (step.format, step.morph) {
        (PackedColor::Rgb565, false) => color_packed::<0>,
        (PackedColor::Rgba5551, false) => color_packed::<1>,
        (PackedColor::Rgba4444, false) => color_packed::<2>,
        (PackedColor::Rgba8888, false) => color_8888,
        (PackedColor::Rgb565, true) => color_morph_packed::<0>,
        (PackedColor::Rgba5551, true) => color_morph_packed::<1>,
        (PackedColor::Rgba4444, true) => color_morph_packed::<2>,
        (PackedColor::Rgba8888, true) => color_morph_8888,
    }
}

fn normal(step: NormalStep) -> StepFn {
    match (step.width, step.mode, step.morph) {
        (Width::Byte, NormalMode::Skin, true) => normal_morph_skin::<i8>,
        (Width::Short, NormalMode::Skin, true) => normal_morph_skin::<i16>,
        (Width::Float, NormalMode::Skin, true) => normal_morph_skin::<f32>,
        (Width::Byte, _, true) => vec3_morph::<i8>,
        (Width::Short, _, true) => vec3_morph::<i16>,
        (Width::Float, _, true) => vec3_morph::<f32>,

        (Width::Byte, NormalMode::Skin, false) => normal_skin::<i8>,
        (Width::Short, NormalMode::Skin, false) => normal_skin::<i16>,
        (Width::Float, NormalMode::Skin, false) => normal_skin::<f32>,
        (Width::Byte, NormalMode::ToFloat, false) => vec3_normalize::<i8>,
        (Width::Byte, NormalMode::Copy, false) => vec3_copy::<i8>,
        (Width::Short, _, false) => vec3_copy::<i16>,
        (Width::Float, _, false) => vec3_copy::<f32>,
    }
}

fn position(step: PositionStep) -> StepFn {
    match (step.width, step.mode, step.morph) {
        (Width::Byte, PositionMode::Through, _) => position_through::<i8, u8>,
        (Width::Short, PositionMode::Through, _) => position_through::<i16, u16>,
        (Width::Float, PositionMode::Through, _) => vec3_copy::<f32>,

        (Width::Byte, PositionMode::Skin, true) => position_morph_skin::<i8>,
        (Width::Short, PositionMode::Skin, true) => position_morph_skin::<i16>,
        (Width::Float, PositionMode::Skin, true) => position_morph_skin::<f32>,
        (Width::Byte, PositionMode::Copy, true) => vec3_morph::<i8>,
        (Width::Short, PositionMode::Copy, true) => vec3_morph::<i16>,
        (Width::Float, PositionMode::Copy, true) => vec3_morph::<f32>,

        (Width::Byte, PositionMode::Skin, false) => position_skin::<i8>,
        (Width::Short, PositionMode::Skin, false) => position_skin::<i16>,
        (Width::Float, PositionMode::Skin, false) => position_skin::<f32>,
        (Width::Byte, PositionMode::Copy, false) => vec3_copy::<i8>,
        (Width::Short, PositionMode::Copy, false) => vec3_copy::<i16>,
        (Width::Float, PositionMode::Copy, false) => vec3_copy::<f32>,
    }
}

impl Step {
    /// The interpreter function implementing this step.
    pub fn interpreter(&self) -> StepFn {
        match *self {
            Step::Weights(Width::Byte) => weights::<u8>,
            Step::Weights(Width::Short) => weights::<u16>,
            Step::Weights(Width::Float) => weights::<f32>,
            Step::TexCoord(step) => tex_coords(step),
            Step::Color(step) => color(step),
            Step::ColorInvalid => color_invalid,
            Step::Normal(step) => normal(step),
            Step::Position(step) => position(step),
            Step::PositionInvalid => position_invalid,
        }
    }
}
