//! Emitters of every step with a compiled form. Each one performs exactly the operations of its
//! interpreter counterpart, in the same order.
use super::{DecoderBuilder, Kind, Source};
use crate::target::{EmitFn, Target};
use cranelift::{
    codegen::ir,
    prelude::{InstBuilder, IntCC},
};
use vtxdec::Stage;
use vtxdec::codec::{MORPH_4BIT, MORPH_5BIT, MORPH_6BIT};
use vtxdec::step::{
    ColorStep, NormalMode, NormalStep, PositionMode, PositionStep, Step, TexCoordMode,
    TexCoordStep,
};
use vtxdec::vtype::{PackedColor, Width};

impl<T: Target> DecoderBuilder<'_, T> {
    /// Extracts a `bits` wide channel at `shift` of a packed color and expands it to 8 bits by
    /// replicating its high bits.
    fn expand_channel(&mut self, value: ir::Value, shift: i64, bits: i64) -> ir::Value {
        let channel = self.bd.ins().ushr_imm(value, shift);
        let channel = self.bd.ins().band_imm(channel, (1 << bits) - 1);

        let high = self.bd.ins().ishl_imm(channel, 8 - bits);
        let low = self.bd.ins().ushr_imm(channel, 2 * bits - 8);
        self.bd.ins().bor(high, low)
    }

    /// Packs four I32 channels in the 0..=255 range into a single RGBA word.
    fn pack_rgba(&mut self, rgba: [ir::Value; 4]) -> ir::Value {
        let [r, g, b, a] = rgba;
        let g = self.bd.ins().ishl_imm(g, 8);
        let b = self.bd.ins().ishl_imm(b, 16);
        let a = self.bd.ins().ishl_imm(a, 24);

        let rg = self.bd.ins().bor(r, g);
        let ba = self.bd.ins().bor(b, a);
        self.bd.ins().bor(rg, ba)
    }

    /// Converts a morphed channel sum to an integer, truncating toward zero and clamping to
    /// 0..=255.
    fn clamp_channel(&mut self, sum: ir::Value) -> ir::Value {
        let int = self.bd.ins().fcvt_to_sint_sat(ir::types::I32, sum);
        let min = self.bd.ins().iconst(ir::types::I32, 0);
        let max = self.bd.ins().iconst(ir::types::I32, 255);

        let gt_max = self.bd.ins().icmp(IntCC::SignedGreaterThan, int, max);
        let lt_min = self.bd.ins().icmp(IntCC::SignedLessThan, int, min);

        let clamped = self.bd.ins().select(gt_max, max, int);
        self.bd.ins().select(lt_min, min, clamped)
    }

    fn transform(&mut self, v: [ir::Value; 3], translate: bool) -> [ir::Value; 3] {
        let m = self.skin();
        std::array::from_fn(|i| {
            let x = self.bd.ins().fmul(v[0], m[i]);
            let y = self.bd.ins().fmul(v[1], m[3 + i]);
            let sum = self.bd.ins().fadd(x, y);
            let z = self.bd.ins().fmul(v[2], m[6 + i]);
            let sum = self.bd.ins().fadd(sum, z);

            if translate {
                self.bd.ins().fadd(sum, m[9 + i])
            } else {
                sum
            }
        })
    }
}

fn weights<T: Target, C: Source>(bd: &mut DecoderBuilder<'_, T>, stage: &Stage) {
    let count = bd.decoder().vtype().weight_count() as usize;
    let base = bd.source_offset(stage, 0);

    let weights: Vec<_> = (0..count)
        .map(|j| {
            let value = bd.load(C::KIND, base + j as i32 * C::KIND.size());
            bd.normalize(C::KIND, value, C::SCALE)
        })
        .collect();

    let skin = T::blend_bones(bd, &weights);
    bd.set_skin(skin);
}

fn tc_raw_u8<T: Target>(bd: &mut DecoderBuilder<'_, T>, stage: &Stage) {
    // both bytes zero extended, which leaves the padding zeroed
    let uv = bd.load(Kind::U16, bd.source_offset(stage, 0));
    bd.store(stage, 0, uv);
}

fn tc_raw_u16<T: Target>(bd: &mut DecoderBuilder<'_, T>, stage: &Stage) {
    let uv = bd.load_bits(ir::types::I32, bd.source_offset(stage, 0));
    bd.store(stage, 0, uv);
}

fn tc_float<T: Target, C: Source>(bd: &mut DecoderBuilder<'_, T>, stage: &Stage) {
    let base = bd.source_offset(stage, 0);
    let scale = bd.decoder().tc_scale();

    let u = bd.load(C::KIND, base);
    let u = bd.normalize(C::KIND, u, scale);
    let v = bd.load(C::KIND, base + C::KIND.size());
    let v = bd.normalize(C::KIND, v, scale);
    bd.store_floats(stage, &[u, v]);
}

fn prescale<T: Target>(
    bd: &mut DecoderBuilder<'_, T>,
    u: ir::Value,
    v: ir::Value,
) -> [ir::Value; 2] {
    let [u_scale, v_scale, u_off, v_off] = bd.uv();

    let u = bd.bd.ins().fmul(u, u_scale);
    let u = bd.bd.ins().fadd(u, u_off);
    let v = bd.bd.ins().fmul(v, v_scale);
    let v = bd.bd.ins().fadd(v, v_off);
    [u, v]
}

fn tc_prescale<T: Target, C: Source>(bd: &mut DecoderBuilder<'_, T>, stage: &Stage) {
    let base = bd.source_offset(stage, 0);
    let scale = bd.decoder().tc_scale();

    let u = bd.load(C::KIND, base);
    let u = bd.normalize(C::KIND, u, scale);
    let v = bd.load(C::KIND, base + C::KIND.size());
    let v = bd.normalize(C::KIND, v, scale);

    let uv = prescale(bd, u, v);
    bd.store_floats(stage, &uv);
}

fn tc_through<T: Target, C: Source>(bd: &mut DecoderBuilder<'_, T>, stage: &Stage) {
    let base = bd.source_offset(stage, 0);

    let u = bd.load(C::KIND, base);
    let u = bd.widen(C::KIND, u);
    let v = bd.load(C::KIND, base + C::KIND.size());
    let v = bd.widen(C::KIND, v);
    bd.store_floats(stage, &[u, v]);
}

fn tc_through_double<T: Target>(bd: &mut DecoderBuilder<'_, T>, stage: &Stage) {
    let base = bd.source_offset(stage, 0);
    let two = bd.f32const(2.0);

    let uv: [_; 2] = std::array::from_fn(|i| {
        let value = bd.load(Kind::U16, base + 2 * i as i32);
        let value = bd.widen(Kind::U16, value);
        bd.bd.ins().fmul(value, two)
    });
    bd.store_floats(stage, &uv);
}

fn tc_morph<T: Target, C: Source>(bd: &mut DecoderBuilder<'_, T>, stage: &Stage) {
    let scale = bd.decoder().tc_scale();
    let uv = bd.morph_sum::<2>(C::KIND, stage, scale);
    bd.store_floats(stage, &uv);
}

fn tc_morph_prescale<T: Target, C: Source>(bd: &mut DecoderBuilder<'_, T>, stage: &Stage) {
    let scale = bd.decoder().tc_scale();
    let [u, v] = bd.morph_sum::<2>(C::KIND, stage, scale);
    let uv = prescale(bd, u, v);
    bd.store_floats(stage, &uv);
}

fn color_packed<T: Target, const F: u8>(bd: &mut DecoderBuilder<'_, T>, stage: &Stage) {
    let value = bd.load(Kind::U16, bd.source_offset(stage, 0));
    let rgba = match F {
        0 => [
            bd.expand_channel(value, 0, 5),
            bd.expand_channel(value, 5, 6),
            bd.expand_channel(value, 11, 5),
            bd.bd.ins().iconst(ir::types::I32, 255),
        ],
        1 => {
            let alpha = bd.bd.ins().ushr_imm(value, 15);
            [
                bd.expand_channel(value, 0, 5),
                bd.expand_channel(value, 5, 5),
                bd.expand_channel(value, 10, 5),
                bd.bd.ins().imul_imm(alpha, 255),
            ]
        }
        _ => [
            bd.expand_channel(value, 0, 4),
            bd.expand_channel(value, 4, 4),
            bd.expand_channel(value, 8, 4),
            bd.expand_channel(value, 12, 4),
        ],
    };

    let rgba = bd.pack_rgba(rgba);
    bd.store(stage, 0, rgba);
}

fn color_8888<T: Target>(bd: &mut DecoderBuilder<'_, T>, stage: &Stage) {
    let rgba = bd.load_bits(ir::types::I32, bd.source_offset(stage, 0));
    bd.store(stage, 0, rgba);
}

fn color_morph_packed<T: Target, const F: u8>(bd: &mut DecoderBuilder<'_, T>, stage: &Stage) {
    // shift, mask and morph factor of each channel
    let channels: &[(i64, i64, f32)] = match F {
        0 => &[(0, 0x1F, MORPH_5BIT), (5, 0x3F, MORPH_6BIT), (11, 0x1F, MORPH_5BIT)],
        1 => &[
            (0, 0x1F, MORPH_5BIT),
            (5, 0x1F, MORPH_5BIT),
            (10, 0x1F, MORPH_5BIT),
            (15, 0x1, 255.0),
        ],
        _ => &[
            (0, 0xF, MORPH_4BIT),
            (4, 0xF, MORPH_4BIT),
            (8, 0xF, MORPH_4BIT),
            (12, 0xF, MORPH_4BIT),
        ],
    };

    let mut sums = [None; 4];
    for target in 0..bd.decoder().layout().morph_count as usize {
        let weight = bd.morph_weight(target);
        let value = bd.load(Kind::U16, bd.source_offset(stage, target));

        for (sum, &(shift, mask, factor)) in sums.iter_mut().zip(channels) {
            let channel = bd.bd.ins().ushr_imm(value, shift);
            let channel = bd.bd.ins().band_imm(channel, mask);
            let channel = bd.bd.ins().fcvt_from_sint(ir::types::F32, channel);

            let factor = bd.f32const(factor);
            let term = bd.bd.ins().fmul(channel, weight);
            let term = bd.bd.ins().fmul(term, factor);

            *sum = Some(match *sum {
                Some(sum) => bd.bd.ins().fadd(sum, term),
                None => term,
            });
        }
    }

    let rgba = std::array::from_fn(|i| match sums[i] {
        Some(sum) => bd.clamp_channel(sum),
        None => bd.bd.ins().iconst(ir::types::I32, 255),
    });

    let rgba = bd.pack_rgba(rgba);
    bd.store(stage, 0, rgba);
}

fn color_morph_8888<T: Target>(bd: &mut DecoderBuilder<'_, T>, stage: &Stage) {
    let sums = bd.morph_sum::<4>(Kind::U8, stage, 1.0);
    let rgba = sums.map(|sum| bd.clamp_channel(sum));
    let rgba = bd.pack_rgba(rgba);
    bd.store(stage, 0, rgba);
}

/// Copies a vec3 keeping its width, padding it to a word multiple.
fn vec3_copy<T: Target, C: Source>(bd: &mut DecoderBuilder<'_, T>, stage: &Stage) {
    let base = bd.source_offset(stage, 0);
    match C::KIND.size() {
        1 => {
            let low = bd.load(Kind::U16, base);
            let high = bd.load(Kind::U8, base + 2);
            let high = bd.bd.ins().ishl_imm(high, 16);
            let word = bd.bd.ins().bor(low, high);
            bd.store(stage, 0, word);
        }
        2 => {
            let first = bd.load_bits(ir::types::I32, base);
            let second = bd.load(Kind::U16, base + 4);
            bd.store(stage, 0, first);
            bd.store(stage, 4, second);
        }
        _ => {
            for i in 0..3 {
                let word = bd.load_bits(ir::types::I32, base + 4 * i);
                bd.store(stage, 4 * i, word);
            }
        }
    }
}

fn vec3_normalize<T: Target, C: Source>(bd: &mut DecoderBuilder<'_, T>, stage: &Stage) {
    let base = bd.source_offset(stage, 0);
    let v = T::normalize3(bd, C::KIND, base, C::SCALE);
    bd.store_floats(stage, &v);
}

fn vec3_morph<T: Target, C: Source>(bd: &mut DecoderBuilder<'_, T>, stage: &Stage) {
    let v = bd.morph_sum::<3>(C::KIND, stage, C::SCALE);
    bd.store_floats(stage, &v);
}

fn normal_skin<T: Target, C: Source>(bd: &mut DecoderBuilder<'_, T>, stage: &Stage) {
    let base = bd.source_offset(stage, 0);
    let v = T::normalize3(bd, C::KIND, base, C::SCALE);
    let v = bd.transform(v, false);
    bd.store_floats(stage, &v);
}

fn position_skin<T: Target, C: Source>(bd: &mut DecoderBuilder<'_, T>, stage: &Stage) {
    let base = bd.source_offset(stage, 0);
    let v = T::normalize3(bd, C::KIND, base, C::SCALE);
    let v = bd.transform(v, true);
    bd.store_floats(stage, &v);
}

/// Through mode positions: X and Y are signed, Z is unsigned.
fn position_through<T: Target, S: Source, U: Source>(
    bd: &mut DecoderBuilder<'_, T>,
    stage: &Stage,
) {
    let base = bd.source_offset(stage, 0);
    let size = S::KIND.size();

    let x = bd.load(S::KIND, base);
    let x = bd.widen(S::KIND, x);
    let y = bd.load(S::KIND, base + size);
    let y = bd.widen(S::KIND, y);
    let z = bd.load(U::KIND, base + 2 * size);
    let z = bd.widen(U::KIND, z);
    bd.store_floats(stage, &[x, y, z]);
}

fn tex_coords<T: Target>(step: TexCoordStep) -> EmitFn<T> {
    use TexCoordMode as Mode;

    match (step.width, step.mode, step.morph) {
        (Width::Byte, Mode::Prescale, true) => tc_morph_prescale::<T, u8>,
        (Width::Short, Mode::Prescale, true) => tc_morph_prescale::<T, u16>,
        (Width::Float, Mode::Prescale, true) => tc_morph_prescale::<T, f32>,
        (Width::Byte, _, true) => tc_morph::<T, u8>,
        (Width::Short, _, true) => tc_morph::<T, u16>,
        (Width::Float, _, true) => tc_morph::<T, f32>,

        (Width::Byte, Mode::Raw, false) => tc_raw_u8,
        (Width::Short, Mode::Raw, false) => tc_raw_u16,
        (Width::Byte, Mode::Float, false) => tc_float::<T, u8>,
        (Width::Short, Mode::Float, false) => tc_float::<T, u16>,
        (Width::Float, Mode::Raw | Mode::Float, false) => tc_float::<T, f32>,

        (Width::Byte, Mode::Prescale, false) => tc_prescale::<T, u8>,
        (Width::Short, Mode::Prescale, false) => tc_prescale::<T, u16>,
        (Width::Float, Mode::Prescale, false) => tc_prescale::<T, f32>,

        (Width::Byte, Mode::Through, false) => tc_through::<T, u8>,
        (Width::Short, Mode::Through, false) if step.double => tc_through_double,
        (Width::Short, Mode::Through, false) => tc_through::<T, u16>,
        (Width::Float, Mode::Through, false) => tc_through::<T, f32>,
    }
}

fn color<T: Target>(step: ColorStep) -> EmitFn<T> {
    match (step.format, step.morph) {
        (PackedColor::Rgb565, false) => color_packed::<T, 0>,
        (PackedColor::Rgba5551, false) => color_packed::<T, 1>,
        (PackedColor::Rgba4444, false) => color_packed::<T, 2>,
        (PackedColor::Rgba8888, false) => color_8888,
        (PackedColor::Rgb565, true) => color_morph_packed::<T, 0>,
        (PackedColor::Rgba5551, true) => color_morph_packed::<T, 1>,
        (PackedColor::Rgba4444, true) => color_morph_packed::<T, 2>,
        (PackedColor::Rgba8888, true) => color_morph_8888,
    }
}

fn normal<T: Target>(step: NormalStep) -> Option<EmitFn<T>> {
    let emit: EmitFn<T> = match (step.width, step.mode, step.morph) {
        (_, NormalMode::Skin, true) => return None,
        (Width::Byte, _, true) => vec3_morph::<T, i8>,
        (Width::Short, _, true) => vec3_morph::<T, i16>,
        (Width::Float, _, true) => vec3_morph::<T, f32>,

        (Width::Byte, NormalMode::Skin, false) => normal_skin::<T, i8>,
        (Width::Short, NormalMode::Skin, false) => normal_skin::<T, i16>,
        (Width::Float, NormalMode::Skin, false) => normal_skin::<T, f32>,
        (Width::Byte, NormalMode::ToFloat, false) => vec3_normalize::<T, i8>,
        (Width::Byte, NormalMode::Copy, false) => vec3_copy::<T, i8>,
        (Width::Short, _, false) => vec3_copy::<T, i16>,
        (Width::Float, _, false) => vec3_copy::<T, f32>,
    };

    Some(emit)
}

fn position<T: Target>(step: PositionStep) -> Option<EmitFn<T>> {
    let emit: EmitFn<T> = match (step.width, step.mode, step.morph) {
        (Width::Byte, PositionMode::Through, _) => position_through::<T, i8, u8>,
        (Width::Short, PositionMode::Through, _) => position_through::<T, i16, u16>,
        (Width::Float, PositionMode::Through, _) => vec3_copy::<T, f32>,

        (_, PositionMode::Skin, true) => return None,
        (Width::Byte, PositionMode::Copy, true) => vec3_morph::<T, i8>,
        (Width::Short, PositionMode::Copy, true) => vec3_morph::<T, i16>,
        (Width::Float, PositionMode::Copy, true) => vec3_morph::<T, f32>,

        (Width::Byte, PositionMode::Skin, false) => position_skin::<T, i8>,
        (Width::Short, PositionMode::Skin, false) => position_skin::<T, i16>,
        (Width::Float, PositionMode::Skin, false) => position_skin::<T, f32>,
        (Width::Byte, PositionMode::Copy, false) => vec3_copy::<T, i8>,
        (Width::Short, PositionMode::Copy, false) => vec3_copy::<T, i16>,
        (Width::Float, PositionMode::Copy, false) => vec3_copy::<T, f32>,
    };

    Some(emit)
}

/// The shared emitter of `step`. Morphed skinning and the steps for invalid attributes have no
/// compiled form.
pub(crate) fn emitter<T: Target>(step: &Step) -> Option<EmitFn<T>> {
    let emit: EmitFn<T> = match *step {
        Step::Weights(Width::Byte) => weights::<T, u8>,
        Step::Weights(Width::Short) => weights::<T, u16>,
        Step::Weights(Width::Float) => weights::<T, f32>,
        Step::TexCoord(step) => tex_coords(step),
        Step::Color(step) => color(step),
        Step::Normal(step) => return normal(step),
        Step::Position(step) => return position(step),
        Step::ColorInvalid | Step::PositionInvalid => return None,
    };

    Some(emit)
}
