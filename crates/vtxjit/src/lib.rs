//! Compiles vertex decoder pipelines into native functions using Cranelift.
//!
//! A compiled decoder has the same observable behavior as the interpreter in [`vtxdec`], down to
//! the last bit of every float it writes. Steps that have no emitter for the selected [`Target`]
//! make the whole compilation fail, in which case the decoder keeps being interpreted.
mod builder;
pub mod target;

#[doc(hidden)]
pub mod testing;

pub use builder::{DecoderBuilder, Kind};

use cranelift::{
    codegen::{self, ir},
    frontend, native,
    prelude::{Configurable, isa::OwnedTargetIsa},
};
use easyerr::{Error, ResultExt};
use jitalloc::{AllocError, Arena, Exec};
use serde::{Deserialize, Serialize};
use target::{EmitFn, HostTarget, Target};
use vtxdec::{DecoderCompiler, DecoderFn, JittedDecoder, VertexDecoder, step::Step};

/// Alignment of every compiled function.
const FUNCTION_ALIGNMENT: usize = 64;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Size of the executable code buffer, in bytes.
    pub code_capacity: usize,
    /// Keep a listing of the generated code of each decoder.
    pub keep_disassembly: bool,
    /// Run the Cranelift IR verifier on every function.
    pub verify: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            code_capacity: 1 << 20,
            keep_disassembly: false,
            verify: cfg!(debug_assertions),
        }
    }
}

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("invalid code generation setting")]
    Setting { source: codegen::settings::SetError },
    #[error("host machine is not supported: {f0}")]
    UnsupportedHost(&'static str),
    #[error(transparent)]
    Isa { source: codegen::CodegenError },
}

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("no emitter for step \"{step}\"")]
    Unsupported { step: Step },
    #[error("code buffer is full")]
    BufferFull,
    #[error(transparent)]
    Alloc { source: AllocError },
    #[error(transparent)]
    Codegen { source: codegen::CodegenError },
}

/// Compiles decoders for the host machine.
pub struct Compiler {
    isa: OwnedTargetIsa,
    settings: Settings,
    arena: Arena<Exec>,
    code_ctx: codegen::Context,
    func_ctx: frontend::FunctionBuilderContext,
}

impl Compiler {
    pub fn new(settings: Settings) -> Result<Self, SetupError> {
        let verifier = if settings.verify { "true" } else { "false" };

        let mut codegen = codegen::settings::builder();
        let flags = [
            ("preserve_frame_pointers", "true"),
            ("use_colocated_libcalls", "false"),
            ("unwind_info", "false"),
            ("is_pic", "false"),
            // affect runtime performance
            ("opt_level", "speed"),
            ("enable_verifier", verifier),
            ("enable_alias_analysis", "true"),
            ("regalloc_algorithm", "backtracking"),
            ("regalloc_checker", "false"),
            ("enable_pinned_reg", "false"),
            ("enable_heap_access_spectre_mitigation", "false"),
            ("enable_table_access_spectre_mitigation", "false"),
        ];

        for (name, value) in flags {
            codegen.set(name, value).context(SetupCtx::Setting)?;
        }

        let isa_builder = native::builder().map_err(SetupError::UnsupportedHost)?;
        let isa = isa_builder
            .finish(codegen::settings::Flags::new(codegen))
            .context(SetupCtx::Isa)?;

        tracing::debug!(
            triple = %isa.triple(),
            emit = HostTarget::NAME,
            capacity = settings.code_capacity,
            "decoder compiler ready"
        );

        Ok(Self {
            isa,
            arena: Arena::new(settings.code_capacity),
            settings,
            code_ctx: codegen::Context::new(),
            func_ctx: frontend::FunctionBuilderContext::new(),
        })
    }

    #[inline(always)]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Bytes of the code buffer in use.
    #[inline(always)]
    pub fn code_used(&self) -> usize {
        self.arena.used()
    }

    fn signature(&self) -> ir::Signature {
        let ptr = self.isa.pointer_type();
        ir::Signature {
            // src, dst, count, params
            params: vec![
                ir::AbiParam::new(ptr),
                ir::AbiParam::new(ptr),
                ir::AbiParam::new(ir::types::I32),
                ir::AbiParam::new(ptr),
            ],
            returns: vec![],
            call_conv: self.isa.default_call_conv(),
        }
    }

    /// Builds the IR of the decoder for target `T`. Fails if any step has no emitter.
    pub fn build_ir<T: Target>(
        &mut self,
        decoder: &VertexDecoder,
    ) -> Result<ir::Function, CompileError> {
        let emitters = decoder
            .stages()
            .iter()
            .map(|stage| {
                T::emitter(&stage.step)
                    .map(|emit| (*stage, emit))
                    .ok_or(CompileError::Unsupported { step: stage.step })
            })
            .collect::<Result<Vec<(_, EmitFn<T>)>, _>>()?;

        let mut func = ir::Function::new();
        func.signature = self.signature();

        let func_builder = frontend::FunctionBuilder::new(&mut func, &mut self.func_ctx);
        let builder = DecoderBuilder::<T>::new(self.isa.pointer_type(), func_builder, decoder);
        builder.build(&emitters);

        Ok(func)
    }

    /// Compiles the decoder for target `T`.
    pub fn compile_for<T: Target>(
        &mut self,
        decoder: &VertexDecoder,
    ) -> Result<JittedDecoder, CompileError> {
        let func = self.build_ir::<T>(decoder)?;

        self.code_ctx.clear();
        self.code_ctx.want_disasm = self.settings.keep_disassembly;
        self.code_ctx.func = func;

        let compiled = self
            .code_ctx
            .compile(&*self.isa, &mut Default::default())
            .map_err(|e| e.inner)
            .context(CompileCtx::Codegen)?;

        let disassembly = compiled.vcode.clone();
        let code = compiled.code_buffer();
        let alloc = self
            .arena
            .allocate(FUNCTION_ALIGNMENT, code)
            .map_err(|e| match e {
                AllocError::Exhausted { .. } => CompileError::BufferFull,
                source => CompileError::Alloc { source },
            })?;

        // SAFETY: the allocation holds a function with the decoder signature, and it is only
        // called while the arena lives and is not cleared
        let func = unsafe {
            std::mem::transmute::<*mut u8, DecoderFn>(alloc.as_ptr().cast::<u8>().as_ptr())
        };

        tracing::trace!(
            emit = T::NAME,
            size = alloc.len(),
            used = self.arena.used(),
            "compiled {}",
            decoder.summary()
        );

        Ok(JittedDecoder {
            func,
            size: alloc.len(),
            disassembly,
        })
    }
}

impl DecoderCompiler for Compiler {
    type Error = CompileError;

    fn compile(&mut self, decoder: &VertexDecoder) -> Result<JittedDecoder, Self::Error> {
        self.compile_for::<HostTarget>(decoder)
    }

    fn is_exhausted(error: &Self::Error) -> bool {
        matches!(error, CompileError::BufferFull)
    }

    unsafe fn clear(&mut self) {
        // SAFETY: forwarded to the caller
        unsafe { self.arena.clear() };
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use target::{Scalar, Simd};
    use vtxdec::vtype::raw;
    use vtxdec::{DecoderOptions, VertexType};

    fn decoder(bits: u32) -> VertexDecoder {
        VertexDecoder::new(VertexType::from_bits(bits), DecoderOptions::default())
    }

    #[test]
    fn settings_default() {
        let settings = Settings::default();
        assert_eq!(settings.code_capacity, 1 << 20);
        assert!(!settings.keep_disassembly);
    }

    #[test]
    fn compiles() {
        let mut compiler = Compiler::new(Settings::default()).unwrap();
        let decoder = decoder(raw::POS_S16 | raw::NRM_S8 | raw::COL_8888 | raw::TC_U16);

        let jitted = compiler.compile_for::<Scalar>(&decoder).unwrap();
        assert!(jitted.size > 0);
        assert!(jitted.disassembly.is_none());
        assert_eq!(compiler.code_used(), jitted.size);
    }

    #[test]
    fn keeps_disassembly() {
        let settings = Settings {
            keep_disassembly: true,
            ..Default::default()
        };

        let mut compiler = Compiler::new(settings).unwrap();
        let decoder = decoder(raw::POS_FLOAT | raw::WEIGHT_FLOAT | raw::weight_count(2));
        let jitted = compiler.compile_for::<Simd>(&decoder).unwrap();
        assert!(jitted.disassembly.is_some_and(|d| !d.is_empty()));
    }

    #[test]
    fn morph_skin_is_unsupported() {
        let mut compiler = Compiler::new(Settings::default()).unwrap();
        let decoder = decoder(raw::POS_S16 | raw::WEIGHT_U8 | raw::morph_count(2));

        let err = compiler.compile_for::<HostTarget>(&decoder).unwrap_err();
        assert!(matches!(err, CompileError::Unsupported { step } if step.is_skin()));
        assert!(!Compiler::is_exhausted(&err));
    }

    #[test]
    fn invalid_steps_are_unsupported() {
        let mut compiler = Compiler::new(Settings::default()).unwrap();

        let no_position = decoder(raw::NRM_FLOAT);
        let err = compiler.compile_for::<HostTarget>(&no_position).unwrap_err();
        assert!(matches!(
            err,
            CompileError::Unsupported {
                step: Step::PositionInvalid
            }
        ));

        let reserved_color = decoder(raw::POS_FLOAT | (1 << 2));
        let err = compiler.compile_for::<HostTarget>(&reserved_color).unwrap_err();
        assert!(matches!(
            err,
            CompileError::Unsupported {
                step: Step::ColorInvalid
            }
        ));
    }

    #[test]
    fn exhaustion_is_reported() {
        let settings = Settings {
            code_capacity: 1024,
            ..Default::default()
        };

        let mut compiler = Compiler::new(settings).unwrap();
        let decoder = decoder(raw::POS_FLOAT | raw::COL_8888);

        let err = (0..64)
            .map(|_| compiler.compile(&decoder))
            .find_map(Result::err)
            .unwrap();
        assert!(Compiler::is_exhausted(&err));

        unsafe { compiler.clear() };
        assert_eq!(compiler.code_used(), 0);
        compiler.compile(&decoder).unwrap();
    }
}
