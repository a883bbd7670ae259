pub(crate) mod emit;

use crate::target::{EmitFn, Target};
use cranelift::{codegen::ir, frontend, prelude::InstBuilder};
use std::marker::PhantomData;
use std::mem::offset_of;
use vtxdec::codec::Component;
use vtxdec::{DecodeParams, Stage, VertexDecoder};

/// Flags of loads from the source records and the decode parameters, which are never written
/// while a decoder runs.
fn readonly_flags() -> ir::MemFlags {
    ir::MemFlags::new()
        .with_notrap()
        .with_can_move()
        .with_readonly()
        .with_endianness(ir::Endianness::Little)
}

/// Flags of stores to the canonical records.
fn store_flags() -> ir::MemFlags {
    ir::MemFlags::new()
        .with_notrap()
        .with_endianness(ir::Endianness::Little)
}

/// Type of a source component, as seen by the code generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    U8,
    S8,
    U16,
    S16,
    F32,
}

impl Kind {
    #[inline(always)]
    pub fn size(self) -> i32 {
        match self {
            Self::U8 | Self::S8 => 1,
            Self::U16 | Self::S16 => 2,
            Self::F32 => 4,
        }
    }

    #[inline(always)]
    pub fn is_float(self) -> bool {
        self == Self::F32
    }
}

/// A component type the code generator knows how to load.
pub trait Source: Component {
    const KIND: Kind;
}

impl Source for u8 {
    const KIND: Kind = Kind::U8;
}

impl Source for i8 {
    const KIND: Kind = Kind::S8;
}

impl Source for u16 {
    const KIND: Kind = Kind::U16;
}

impl Source for i16 {
    const KIND: Kind = Kind::S16;
}

impl Source for f32 {
    const KIND: Kind = Kind::F32;
}

struct Consts {
    ptr_type: ir::Type,

    src_ptr: ir::Value,
    dst_ptr: ir::Value,
    count: ir::Value,
    params_ptr: ir::Value,
    morph_weights: Vec<ir::Value>,
    /// U scale, V scale, U offset and V offset.
    uv: [ir::Value; 4],
}

struct Vars {
    src: ir::Value,
    dst: ir::Value,
    skin: [ir::Value; 12],
}

/// Builds the IR of a decoder: a loop over every vertex which runs the emitter of each stage.
pub struct DecoderBuilder<'ctx, T> {
    pub(crate) bd: frontend::FunctionBuilder<'ctx>,
    decoder: &'ctx VertexDecoder,
    consts: Consts,
    vars: Vars,
    _target: PhantomData<T>,
}

impl<'ctx, T> DecoderBuilder<'ctx, T>
where
    T: Target,
{
    pub(crate) fn new(
        ptr_type: ir::Type,
        mut bd: frontend::FunctionBuilder<'ctx>,
        decoder: &'ctx VertexDecoder,
    ) -> Self {
        let entry_bb = bd.create_block();
        bd.append_block_params_for_function_params(entry_bb);
        bd.switch_to_block(entry_bb);
        bd.seal_block(entry_bb);

        let params = bd.block_params(entry_bb);
        let src_ptr = params[0];
        let dst_ptr = params[1];
        let count = params[2];
        let params_ptr = params[3];

        let mut load_param = |offset: usize| {
            bd.ins()
                .load(ir::types::F32, readonly_flags(), params_ptr, offset as i32)
        };

        let morph_weights = (0..decoder.layout().morph_count as usize)
            .map(|i| load_param(offset_of!(DecodeParams, morph_weights) + 4 * i))
            .collect();
        let uv = std::array::from_fn(|i| load_param(offset_of!(DecodeParams, uv) + 4 * i));

        // skinning matrix before any weights are decoded
        let zero = bd.ins().f32const(0.0);

        let consts = Consts {
            ptr_type,

            src_ptr,
            dst_ptr,
            count,
            params_ptr,
            morph_weights,
            uv,
        };

        let vars = Vars {
            src: src_ptr,
            dst: dst_ptr,
            skin: [zero; 12],
        };

        Self {
            bd,
            decoder,
            consts,
            vars,
            _target: PhantomData,
        }
    }

    #[inline(always)]
    pub(crate) fn decoder(&self) -> &'ctx VertexDecoder {
        self.decoder
    }

    #[inline(always)]
    pub(crate) fn morph_weight(&self, target: usize) -> ir::Value {
        self.consts.morph_weights[target]
    }

    #[inline(always)]
    pub(crate) fn uv(&self) -> [ir::Value; 4] {
        self.consts.uv
    }

    #[inline(always)]
    pub(crate) fn skin(&self) -> [ir::Value; 12] {
        self.vars.skin
    }

    #[inline(always)]
    pub(crate) fn set_skin(&mut self, skin: [ir::Value; 12]) {
        self.vars.skin = skin;
    }

    /// Offset of the stage's attribute in the given morph target of the source record.
    #[inline(always)]
    pub(crate) fn source_offset(&self, stage: &Stage, target: usize) -> i32 {
        (target as u32 * self.decoder.layout().one_size + stage.src) as i32
    }

    pub(crate) fn f32const(&mut self, value: f32) -> ir::Value {
        self.bd.ins().f32const(value)
    }

    /// Loads a component from the source record. Integers are extended to I32.
    pub(crate) fn load(&mut self, kind: Kind, offset: i32) -> ir::Value {
        let flags = readonly_flags();
        let src = self.vars.src;
        let ins = self.bd.ins();

        match kind {
            Kind::U8 => ins.uload8(ir::types::I32, flags, src, offset),
            Kind::S8 => ins.sload8(ir::types::I32, flags, src, offset),
            Kind::U16 => ins.uload16(ir::types::I32, flags, src, offset),
            Kind::S16 => ins.sload16(ir::types::I32, flags, src, offset),
            Kind::F32 => ins.load(ir::types::F32, flags, src, offset),
        }
    }

    /// Loads raw bits from the source record.
    pub(crate) fn load_bits(&mut self, ty: ir::Type, offset: i32) -> ir::Value {
        self.bd
            .ins()
            .load(ty, readonly_flags(), self.vars.src, offset)
    }

    /// Loads a value of the decode parameters.
    pub(crate) fn load_param(&mut self, ty: ir::Type, offset: usize) -> ir::Value {
        self.bd
            .ins()
            .load(ty, readonly_flags(), self.consts.params_ptr, offset as i32)
    }

    /// Stores `value` at `offset` of the stage's attribute in the canonical record.
    pub(crate) fn store(&mut self, stage: &Stage, offset: i32, value: ir::Value) {
        self.bd
            .ins()
            .store(store_flags(), value, self.vars.dst, stage.dst as i32 + offset);
    }

    pub(crate) fn store_floats(&mut self, stage: &Stage, values: &[ir::Value]) {
        for (i, value) in values.iter().enumerate() {
            self.store(stage, 4 * i as i32, *value);
        }
    }

    /// Converts a loaded component to F32 without any scaling.
    pub(crate) fn widen(&mut self, kind: Kind, value: ir::Value) -> ir::Value {
        if kind.is_float() {
            value
        } else {
            self.bd.ins().fcvt_from_sint(ir::types::F32, value)
        }
    }

    /// Converts a loaded component to F32, applying `scale` if it is an integer.
    pub(crate) fn normalize(&mut self, kind: Kind, value: ir::Value, scale: f32) -> ir::Value {
        if kind.is_float() {
            return value;
        }

        let value = self.widen(kind, value);
        let scale = self.f32const(scale);
        self.bd.ins().fmul(value, scale)
    }

    /// Contribution of a loaded component to a morph sum.
    pub(crate) fn morph_term(
        &mut self,
        kind: Kind,
        value: ir::Value,
        weight: ir::Value,
        scale: f32,
    ) -> ir::Value {
        if kind.is_float() {
            return self.bd.ins().fmul(value, weight);
        }

        let scale = self.f32const(scale);
        let weight = self.bd.ins().fmul(weight, scale);
        let value = self.widen(kind, value);
        self.bd.ins().fmul(value, weight)
    }

    /// Weighted sum of the first `N` components of the stage's attribute over all morph targets.
    pub(crate) fn morph_sum<const N: usize>(
        &mut self,
        kind: Kind,
        stage: &Stage,
        scale: f32,
    ) -> [ir::Value; N] {
        let base = self.source_offset(stage, 0);
        let weight = self.morph_weight(0);
        let mut sum = std::array::from_fn(|i| {
            let value = self.load(kind, base + i as i32 * kind.size());
            self.morph_term(kind, value, weight, scale)
        });

        for target in 1..self.decoder.layout().morph_count as usize {
            let base = self.source_offset(stage, target);
            let weight = self.morph_weight(target);
            for (i, sum) in sum.iter_mut().enumerate() {
                let value = self.load(kind, base + i as i32 * kind.size());
                let term = self.morph_term(kind, value, weight, scale);
                *sum = self.bd.ins().fadd(*sum, term);
            }
        }

        sum
    }

    fn body(&mut self, emitters: &[(Stage, EmitFn<T>)]) {
        for (i, (stage, emit)) in emitters.iter().enumerate() {
            self.bd.set_srcloc(ir::SourceLoc::new(i as u32));
            emit(self, stage);
        }

        self.bd.set_srcloc(ir::SourceLoc::default());
    }

    pub(crate) fn build(mut self, emitters: &[(Stage, EmitFn<T>)]) {
        // setup the loop
        let iter_bb = self.bd.create_block();
        let body_bb = self.bd.create_block();
        let exit_bb = self.bd.create_block();

        self.bd.set_cold_block(exit_bb);
        self.bd.append_block_param(iter_bb, self.consts.ptr_type); // src ptr
        self.bd.append_block_param(iter_bb, self.consts.ptr_type); // dst ptr
        self.bd.append_block_param(iter_bb, ir::types::I32); // loop iter

        let zero = self.bd.ins().iconst(ir::types::I32, 0);
        self.bd.ins().jump(
            iter_bb,
            &[
                ir::BlockArg::Value(self.consts.src_ptr),
                ir::BlockArg::Value(self.consts.dst_ptr),
                ir::BlockArg::Value(zero),
            ],
        );

        // loop header: check if loop iter < count, otherwise exit
        self.bd.switch_to_block(iter_bb);
        let params = self.bd.block_params(iter_bb);
        self.vars.src = params[0];
        self.vars.dst = params[1];
        let loop_iter = params[2];

        let loop_cond = self.bd.ins().icmp(
            ir::condcodes::IntCC::UnsignedLessThan,
            loop_iter,
            self.consts.count,
        );
        self.bd.ins().brif(loop_cond, body_bb, &[], exit_bb, &[]);

        self.bd.seal_block(body_bb);
        self.bd.seal_block(exit_bb);

        // loop body: decode a single vertex
        self.bd.switch_to_block(body_bb);
        self.body(emitters);

        // advance to the next vertex
        let size = self.decoder.size() as i64;
        let stride = self.decoder.stride() as i64;
        let src = self.bd.ins().iadd_imm(self.vars.src, size);
        let dst = self.bd.ins().iadd_imm(self.vars.dst, stride);
        let loop_iter = self.bd.ins().iadd_imm(loop_iter, 1);
        self.bd.ins().jump(
            iter_bb,
            &[
                ir::BlockArg::Value(src),
                ir::BlockArg::Value(dst),
                ir::BlockArg::Value(loop_iter),
            ],
        );

        self.bd.seal_block(iter_bb);

        // exit
        self.bd.switch_to_block(exit_bb);
        self.bd.ins().return_(&[]);
        self.bd.finalize();
    }
}

/// Loads three components at `offset` of the source record and normalizes them one by one.
pub(crate) fn normalize3_scalar<T: Target>(
    bd: &mut DecoderBuilder<'_, T>,
    kind: Kind,
    offset: i32,
    scale: f32,
) -> [ir::Value; 3] {
    std::array::from_fn(|i| {
        let value = bd.load(kind, offset + i as i32 * kind.size());
        bd.normalize(kind, value, scale)
    })
}

/// Blends the first `weights.len()` bones into a skinning matrix one element at a time.
pub(crate) fn blend_bones_scalar<T: Target>(
    bd: &mut DecoderBuilder<'_, T>,
    weights: &[ir::Value],
) -> [ir::Value; 12] {
    let bones = offset_of!(DecodeParams, bones);
    let mut matrix = bd.skin();
    for (j, &weight) in weights.iter().enumerate() {
        for (i, m) in matrix.iter_mut().enumerate() {
            let value = bd.load_param(ir::types::F32, bones + 4 * (12 * j + i));
            let product = bd.bd.ins().fmul(weight, value);
            *m = if j == 0 {
                product
            } else {
                bd.bd.ins().fadd(*m, product)
            };
        }
    }

    matrix
}
