//! Code generation strategies.
//!
//! Every target emits the same operations in the same order, so they all produce bit-identical
//! results. They only differ in how those operations are grouped into instructions.
use crate::builder::{self, DecoderBuilder, Kind, emit};
use cranelift::{codegen::ir, prelude::InstBuilder};
use std::mem::offset_of;
use vtxdec::step::Step;
use vtxdec::{DecodeParams, Stage};

/// Emits the IR of a single stage.
pub type EmitFn<T> = fn(&mut DecoderBuilder<'_, T>, &Stage);

/// A code generation strategy.
pub trait Target: Sized + 'static {
    const NAME: &'static str;

    /// Returns the emitter of `step`, if this target supports it.
    fn emitter(step: &Step) -> Option<EmitFn<Self>> {
        emit::emitter(step)
    }

    /// Loads three components at `offset` of the source record and normalizes them.
    fn normalize3(
        bd: &mut DecoderBuilder<'_, Self>,
        kind: Kind,
        offset: i32,
        scale: f32,
    ) -> [ir::Value; 3] {
        builder::normalize3_scalar(bd, kind, offset, scale)
    }

    /// Blends bone matrices by the given weights into a skinning matrix.
    fn blend_bones(bd: &mut DecoderBuilder<'_, Self>, weights: &[ir::Value]) -> [ir::Value; 12] {
        builder::blend_bones_scalar(bd, weights)
    }
}

/// Scalar instructions only. Works on every architecture Cranelift supports.
#[derive(Debug, Clone, Copy)]
pub struct Scalar;

impl Target for Scalar {
    const NAME: &'static str = "scalar";
}

/// Uses 128-bit vectors for integer conversions and skinning matrices.
#[derive(Debug, Clone, Copy)]
pub struct Simd;

impl Target for Simd {
    const NAME: &'static str = "simd";

    fn normalize3(
        bd: &mut DecoderBuilder<'_, Self>,
        kind: Kind,
        offset: i32,
        scale: f32,
    ) -> [ir::Value; 3] {
        if kind.is_float() {
            return builder::normalize3_scalar(bd, kind, offset, scale);
        }

        // 01. load the integer values, extended to I32
        let first = bd.load(kind, offset);
        let second = bd.load(kind, offset + kind.size());
        let third = bd.load(kind, offset + 2 * kind.size());

        // 02. put them in a I32X4
        let vector = bd.bd.ins().scalar_to_vector(ir::types::I32X4, first);
        let vector = bd.bd.ins().insertlane(vector, second, 1);
        let vector = bd.bd.ins().insertlane(vector, third, 2);

        // 03. convert to F32X4 and multiply by scale
        let vector = bd.bd.ins().fcvt_from_sint(ir::types::F32X4, vector);
        let scale = bd.f32const(scale);
        let scale = bd.bd.ins().splat(ir::types::F32X4, scale);
        let vector = bd.bd.ins().fmul(vector, scale);

        // 04. split it
        std::array::from_fn(|i| bd.bd.ins().extractlane(vector, i as u8))
    }

    fn blend_bones(bd: &mut DecoderBuilder<'_, Self>, weights: &[ir::Value]) -> [ir::Value; 12] {
        let bones = offset_of!(DecodeParams, bones);

        // each bone is three rows of four floats
        let mut rows = [bd.skin()[0]; 3];
        for (j, &weight) in weights.iter().enumerate() {
            let weight = bd.bd.ins().splat(ir::types::F32X4, weight);
            for (r, row) in rows.iter_mut().enumerate() {
                let value = bd.load_param(ir::types::F32X4, bones + 48 * j + 16 * r);
                let product = bd.bd.ins().fmul(weight, value);
                *row = if j == 0 {
                    product
                } else {
                    bd.bd.ins().fadd(*row, product)
                };
            }
        }

        std::array::from_fn(|i| bd.bd.ins().extractlane(rows[i / 4], (i % 4) as u8))
    }
}

/// The best target for the host architecture.
#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
pub type HostTarget = Simd;

/// The best target for the host architecture.
#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
pub type HostTarget = Scalar;

#[cfg(test)]
mod test {
    use super::*;
    use crate::{Compiler, Settings};
    use vtxdec::vtype::raw;
    use vtxdec::{DecoderOptions, VertexDecoder, VertexType};

    fn ir<T: Target>(bits: u32) -> String {
        let decoder = VertexDecoder::new(VertexType::from_bits(bits), DecoderOptions::default());
        let mut compiler = Compiler::new(Settings::default()).unwrap();
        compiler.build_ir::<T>(&decoder).unwrap().display().to_string()
    }

    #[test]
    fn simd_uses_vectors() {
        let bits = raw::POS_S16 | raw::NRM_S8 | raw::WEIGHT_U8 | raw::weight_count(4);

        let scalar = ir::<Scalar>(bits);
        assert!(!scalar.contains("f32x4"));
        assert!(!scalar.contains("i32x4"));

        let simd = ir::<Simd>(bits);
        assert!(simd.contains("f32x4"));
        assert!(simd.contains("i32x4"));
    }

    #[test]
    fn floats_stay_scalar() {
        let simd = ir::<Simd>(raw::POS_FLOAT | raw::NRM_FLOAT);
        assert!(!simd.contains("f32x4"));
    }

    #[test]
    fn same_emitters() {
        let decoder = VertexDecoder::new(
            VertexType::from_bits(raw::POS_S8 | raw::WEIGHT_U8 | raw::morph_count(2)),
            DecoderOptions::default(),
        );

        for stage in decoder.stages() {
            assert_eq!(
                Scalar::emitter(&stage.step).is_some(),
                Simd::emitter(&stage.step).is_some()
            );
        }
    }
}
