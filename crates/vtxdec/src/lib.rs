//! Decoding of bit-packed console vertex streams into a canonical, fixed-layout vertex format.
//!
//! A [`VertexDecoder`] is built once per distinct [`VertexType`] and holds an ordered pipeline of
//! [`Step`]s. The pipeline is always executable by the interpreter in this crate, and may
//! optionally be accelerated by a compiled function produced by a [`DecoderCompiler`].
pub mod cache;
pub mod codec;
pub mod decoder;
pub mod format;
pub mod index;
pub mod interpreter;
pub mod params;
pub mod reader;
pub mod step;
pub mod vtype;

pub use cache::{DecoderCache, DecoderCompiler, NoCompiler};
pub use decoder::{
    DecoderFn, DecoderOptions, DescriptionKind, JittedDecoder, SourceLayout, Stage, VertexDecoder,
};
pub use format::{DecFormat, Field, FormatDescriptor};
pub use index::IndexConverter;
pub use params::{DecodeParams, UvScale};
pub use reader::VertexReader;
pub use step::Step;
pub use vtype::VertexType;
