//! Process-wide cache of vertex decoders.
use crate::decoder::{DecoderOptions, JittedDecoder, VertexDecoder};
use crate::vtype::VertexType;
use easyerr::Error;
use rustc_hash::FxHashMap;

/// Something that compiles decoder pipelines into native functions.
pub trait DecoderCompiler {
    type Error: std::error::Error;

    /// Compiles the pipeline of `decoder`.
    fn compile(&mut self, decoder: &VertexDecoder) -> Result<JittedDecoder, Self::Error>;

    /// Whether `error` means the code buffer is full, in which case compiling again after a
    /// [`clear`](Self::clear) may succeed.
    fn is_exhausted(error: &Self::Error) -> bool;

    /// Releases the code buffer.
    ///
    /// # Safety
    /// Every function compiled so far becomes invalid and must not be called anymore.
    unsafe fn clear(&mut self);
}

#[derive(Debug, Error)]
pub enum NoCompilerError {
    #[error("compilation is disabled")]
    Disabled,
}

/// A compiler that never compiles anything, leaving every decoder interpreted.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCompiler;

impl DecoderCompiler for NoCompiler {
    type Error = NoCompilerError;

    fn compile(&mut self, _: &VertexDecoder) -> Result<JittedDecoder, Self::Error> {
        Err(NoCompilerError::Disabled)
    }

    fn is_exhausted(_: &Self::Error) -> bool {
        false
    }

    unsafe fn clear(&mut self) {}
}

/// Maps vertex types to their decoders, creating and compiling them on first use.
///
/// Lookups and compilations must be serialized by the owner: the cache is meant to be used by
/// the single thread processing GPU commands.
pub struct DecoderCache<C> {
    compiler: C,
    decoders: FxHashMap<(u32, DecoderOptions), VertexDecoder>,
    clears: u64,
}

impl<C> DecoderCache<C>
where
    C: DecoderCompiler,
{
    pub fn new(compiler: C) -> Self {
        Self {
            compiler,
            decoders: FxHashMap::default(),
            clears: 0,
        }
    }

    #[inline(always)]
    pub fn compiler(&self) -> &C {
        &self.compiler
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }

    /// How many times the code buffer has been cleared.
    #[inline(always)]
    pub fn clears(&self) -> u64 {
        self.clears
    }

    pub fn iter(&self) -> impl Iterator<Item = &VertexDecoder> {
        self.decoders.values()
    }

    /// Returns the decoder for the given vertex type and options, building it if needed.
    pub fn get(&mut self, vtype: VertexType, options: DecoderOptions) -> &VertexDecoder {
        let key = (vtype.to_bits(), options);
        if !self.decoders.contains_key(&key) {
            let decoder = self.build(vtype, options);
            self.decoders.insert(key, decoder);
        }

        &self.decoders[&key]
    }

    fn build(&mut self, vtype: VertexType, options: DecoderOptions) -> VertexDecoder {
        let mut decoder = VertexDecoder::new(vtype, options);

        let _span = tracing::debug_span!(
            "compile",
            vtype = format_args!("0x{:08X}", vtype.to_bits())
        )
        .entered();

        let jitted = match self.compiler.compile(&decoder) {
            Ok(jitted) => Some(jitted),
            Err(e) if C::is_exhausted(&e) => {
                tracing::debug!(
                    compiled = self.decoders.len(),
                    "code buffer exhausted, clearing it"
                );
                self.clear();

                match self.compiler.compile(&decoder) {
                    Ok(jitted) => Some(jitted),
                    Err(e) => {
                        tracing::debug!("compilation failed after clearing, interpreting: {e}");
                        None
                    }
                }
            }
            Err(e) => {
                tracing::debug!("compilation failed, interpreting: {e}");
                None
            }
        };

        if let Some(jitted) = jitted {
            tracing::trace!(size = jitted.size, "compiled {}", decoder.summary());

            // SAFETY: the compiler produced this function for this decoder, and the decoder is
            // dropped before the code buffer is ever cleared
            unsafe { decoder.attach_jitted(jitted) };
        }

        decoder
    }

    /// Drops every decoder and releases the code buffer.
    ///
    /// Decoders are rebuilt, and compiled again, the next time they are looked up.
    pub fn clear(&mut self) {
        self.decoders.clear();

        // SAFETY: the decoders holding compiled functions were all dropped
        unsafe { self.compiler.clear() };
        self.clears += 1;
    }
}

impl Default for DecoderCache<NoCompiler> {
    fn default() -> Self {
        Self::new(NoCompiler)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::params::DecodeParams;
    use crate::vtype::raw;

    #[derive(Debug, Error)]
    enum MockError {
        #[error("code buffer is full")]
        Full,
        #[error("unsupported step")]
        Unsupported,
    }

    /// Holds room for `capacity` functions and refuses to compile morphing decoders.
    struct MockCompiler {
        capacity: usize,
        live: usize,
        compiled: usize,
        attempts: usize,
    }

    unsafe extern "C" fn mark(_: *const u8, dst: *mut u8, _: u32, _: *const DecodeParams) {
        unsafe { *dst = 0x5A };
    }

    impl DecoderCompiler for MockCompiler {
        type Error = MockError;

        fn compile(&mut self, decoder: &VertexDecoder) -> Result<JittedDecoder, Self::Error> {
            self.attempts += 1;
            if decoder.vtype().is_morph() {
                return Err(MockError::Unsupported);
            }

            if self.live == self.capacity {
                return Err(MockError::Full);
            }

            self.live += 1;
            self.compiled += 1;
            Ok(JittedDecoder {
                func: mark,
                size: 16,
                disassembly: None,
            })
        }

        fn is_exhausted(error: &Self::Error) -> bool {
            matches!(error, MockError::Full)
        }

        unsafe fn clear(&mut self) {
            self.live = 0;
        }
    }

    fn vtype(bits: u32) -> VertexType {
        VertexType::from_bits(bits)
    }

    #[test]
    fn decoders_are_cached() {
        let mut cache = DecoderCache::default();
        let options = DecoderOptions::default();

        cache.get(vtype(raw::POS_S8), options);
        cache.get(vtype(raw::POS_S8), options);
        assert_eq!(cache.len(), 1);

        let other = DecoderOptions {
            prescale_uv: true,
            ..options
        };
        cache.get(vtype(raw::POS_S8), other);
        assert_eq!(cache.len(), 2);
        assert!(cache.iter().all(|d| d.jitted().is_none()));
    }

    #[test]
    fn compiled_function_is_used() {
        let compiler = MockCompiler {
            capacity: 4,
            live: 0,
            compiled: 0,
            attempts: 0,
        };
        let mut cache = DecoderCache::new(compiler);
        let decoder = cache.get(vtype(raw::POS_S8), DecoderOptions::default());
        assert!(decoder.jitted().is_some());

        let mut dst = [0; 4];
        decoder.decode_verts(&mut dst, &[1, 2, 3], 0..1, &DecodeParams::default());
        assert_eq!(dst, [0x5A, 0, 0, 0]);

        decoder.decode_verts_interpreted(&mut dst, &[1, 2, 3], 0..1, &DecodeParams::default());
        assert_eq!(dst, [1, 2, 3, 0]);
    }

    #[test]
    fn unsupported_falls_back() {
        let compiler = MockCompiler {
            capacity: 4,
            live: 0,
            compiled: 0,
            attempts: 0,
        };
        let mut cache = DecoderCache::new(compiler);
        let decoder = cache.get(vtype(raw::POS_S8 | raw::morph_count(2)), Default::default());
        assert!(decoder.jitted().is_none());
        assert_eq!(cache.clears(), 0);
    }

    #[test]
    fn exhaustion_clears_and_retries() {
        let compiler = MockCompiler {
            capacity: 2,
            live: 0,
            compiled: 0,
            attempts: 0,
        };
        let mut cache = DecoderCache::new(compiler);
        let options = DecoderOptions::default();

        cache.get(vtype(raw::POS_S8), options);
        cache.get(vtype(raw::POS_S16), options);
        assert_eq!(cache.clears(), 0);

        let third = cache.get(vtype(raw::POS_FLOAT), options);
        assert!(third.jitted().is_some());
        assert_eq!(cache.clears(), 1);
        assert_eq!(cache.compiler().compiled, 3);

        let cached: Vec<_> = cache.iter().map(|d| d.vtype()).collect();
        assert_eq!(cached, [vtype(raw::POS_FLOAT)]);
    }

    #[test]
    fn cleared_decoders_are_compiled_again() {
        let compiler = MockCompiler {
            capacity: 1,
            live: 0,
            compiled: 0,
            attempts: 0,
        };
        let mut cache = DecoderCache::new(compiler);
        let options = DecoderOptions::default();

        assert!(cache.get(vtype(raw::POS_S8), options).jitted().is_some());
        assert!(cache.get(vtype(raw::POS_S16), options).jitted().is_some());
        assert_eq!(cache.clears(), 1);

        let first = cache.get(vtype(raw::POS_S8), options);
        assert!(first.jitted().is_some());

        let mut dst = [0; 4];
        first.decode_verts(&mut dst, &[1, 2, 3], 0..1, &DecodeParams::default());
        assert_eq!(dst, [0x5A, 0, 0, 0]);

        assert_eq!(cache.clears(), 2);
        assert_eq!(cache.compiler().compiled, 3);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn unsupported_decoders_are_not_recompiled() {
        let compiler = MockCompiler {
            capacity: 4,
            live: 0,
            compiled: 0,
            attempts: 0,
        };
        let mut cache = DecoderCache::new(compiler);
        let morph = vtype(raw::POS_S8 | raw::morph_count(2));

        for _ in 0..3 {
            assert!(cache.get(morph, Default::default()).jitted().is_none());
        }

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.compiler().attempts, 1);
        assert_eq!(cache.clears(), 0);
    }
}
