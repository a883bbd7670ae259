//! Vertex decoders and the pipeline builder.
use crate::format::{DecFormat, FormatDescriptor};
use crate::interpreter::{Cursor, StepFn};
use crate::params::DecodeParams;
use crate::step::{
    ColorStep, NormalMode, NormalStep, PositionMode, PositionStep, Step, TexCoordMode,
    TexCoordStep,
};
use crate::vtype::{ColorFormat, IndexFormat, VertexType, Width};
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::ops::Range;
use std::sync::atomic::{AtomicU8, Ordering};
use tinyvec::ArrayVec;

/// Options that change the pipeline built for a vertex type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderOptions {
    /// Expand integer texture coordinates to floats. Otherwise, they're copied as-is when
    /// possible.
    pub expand_uv_to_float: bool,
    /// Expand 8-bit normals to floats.
    pub expand_8bit_normals_to_float: bool,
    /// Apply the per-call UV scale and offset while decoding.
    pub prescale_uv: bool,
    /// Double the range of 16-bit texture coordinates.
    pub double_tex_coords: bool,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            expand_uv_to_float: true,
            expand_8bit_normals_to_float: false,
            prescale_uv: false,
            double_tex_coords: false,
        }
    }
}

/// Offsets of each attribute in a source vertex record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceLayout {
    pub weights: u32,
    pub tex_coords: u32,
    pub color: u32,
    pub normal: u32,
    pub position: u32,
    /// Size of a single morph target, padded to the biggest component alignment.
    pub one_size: u32,
    /// Size of the whole record, including every morph target.
    pub size: u32,
    pub morph_count: u32,
}

/// A step of a decoder pipeline, bound to its source and destination offsets.
#[derive(Debug, Clone, Copy)]
pub struct Stage {
    pub step: Step,
    /// Offset of the attribute in the source record.
    pub src: u32,
    /// Offset of the attribute in the canonical record.
    pub dst: u32,
    pub(crate) run: StepFn,
}

impl Default for Stage {
    fn default() -> Self {
        Self {
            step: Step::PositionInvalid,
            src: 0,
            dst: 0,
            run: |_, _| (),
        }
    }
}

/// Signature of a compiled decoder: source, destination, vertex count and parameters.
pub type DecoderFn = unsafe extern "C" fn(*const u8, *mut u8, u32, *const DecodeParams);

/// A compiled decoder function.
pub struct JittedDecoder {
    pub func: DecoderFn,
    /// Size of the generated code, in bytes.
    pub size: usize,
    /// Listing of the generated code, if it was kept.
    pub disassembly: Option<String>,
}

impl std::fmt::Debug for JittedDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JittedDecoder")
            .field("func", &(self.func as *const ()))
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// Warnings a decoder emits at most once.
#[derive(Debug, Clone, Copy)]
#[repr(u8)]
pub(crate) enum Warning {
    Color = 1 << 0,
    Position = 1 << 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptionKind {
    Short,
    Detailed,
}

/// Decodes vertices of a specific vertex type into the canonical format.
pub struct VertexDecoder {
    vtype: VertexType,
    options: DecoderOptions,
    layout: SourceLayout,
    format: FormatDescriptor,
    stages: ArrayVec<[Stage; 5]>,
    tc_scale: f32,
    jitted: Option<JittedDecoder>,
    warned: AtomicU8,
}

/// Accumulates the source layout while the pipeline is built.
struct LayoutBuilder {
    size: u32,
    biggest: u32,
}

impl LayoutBuilder {
    /// Places a field with the given component size and count, returning its offset.
    fn place(&mut self, component: u32, count: u32) -> u32 {
        self.biggest = self.biggest.max(component);
        self.size = self.size.next_multiple_of(component);
        let offset = self.size;
        self.size += component * count;

        offset
    }
}

impl VertexDecoder {
    /// Builds the decoder for the given vertex type.
    pub fn new(vtype: VertexType, options: DecoderOptions) -> Self {
        let morph = vtype.is_morph();
        let skin = vtype.is_skinned();
        let through = vtype.through();

        let mut builder = LayoutBuilder {
            size: 0,
            biggest: 1,
        };
        let mut layout = SourceLayout {
            morph_count: vtype.morph_count(),
            ..Default::default()
        };

        let weights = vtype.weights().and_then(|width| {
            layout.weights = builder.place(width.size(), vtype.weight_count());
            skin.then_some((Step::Weights(width), layout.weights))
        });

        let tex_coords = vtype.tex_coords().map(|width| {
            layout.tex_coords = builder.place(width.size(), 2);

            let mode = if through {
                TexCoordMode::Through
            } else if options.prescale_uv {
                TexCoordMode::Prescale
            } else if options.expand_uv_to_float || morph {
                TexCoordMode::Float
            } else {
                TexCoordMode::Raw
            };

            let step = TexCoordStep {
                width,
                mode,
                double: options.double_tex_coords && width == Width::Short,
                morph: morph && !through,
            };

            (Step::TexCoord(step), layout.tex_coords)
        });

        let color = match vtype.color() {
            ColorFormat::None => None,
            format => Some(match format.packed() {
                Some(packed) => {
                    layout.color = builder.place(packed.size(), 1);
                    let step = ColorStep {
                        format: packed,
                        morph,
                    };

                    (Step::Color(step), layout.color)
                }
                None => {
                    layout.color = builder.size;
                    (Step::ColorInvalid, layout.color)
                }
            }),
        };

        let normal = vtype.normal().map(|width| {
            layout.normal = builder.place(width.size(), 3);

            let mode = if skin {
                NormalMode::Skin
            } else if width == Width::Byte && !morph && options.expand_8bit_normals_to_float {
                NormalMode::ToFloat
            } else {
                NormalMode::Copy
            };

            let step = NormalStep { width, mode, morph };
            (Step::Normal(step), layout.normal)
        });

        let position = match vtype.position() {
            Some(width) => {
                layout.position = builder.place(width.size(), 3);

                let mode = if through {
                    PositionMode::Through
                } else if skin {
                    PositionMode::Skin
                } else {
                    PositionMode::Copy
                };

                let step = PositionStep {
                    width,
                    mode,
                    morph: morph && !through,
                };

                (Step::Position(step), layout.position)
            }
            None => {
                layout.position = builder.size;
                (Step::PositionInvalid, layout.position)
            }
        };

        layout.one_size = builder.size.next_multiple_of(builder.biggest);
        layout.size = layout.one_size * layout.morph_count;

        let output = |step: Option<(Step, u32)>| step.map_or(DecFormat::None, |(s, _)| s.output());
        let format = FormatDescriptor::new(
            output(tex_coords),
            output(color),
            DecFormat::None,
            output(normal),
            output(Some(position)),
        );

        let tc_scale = match tex_coords {
            Some((Step::TexCoord(step), _)) => step.scale(),
            _ => 1.0,
        };

        let mut stages = ArrayVec::new();
        let steps = [
            (weights, 0),
            (tex_coords, format.uv.offset),
            (color, format.color0.offset),
            (normal, format.normal.offset),
            (Some(position), format.position.offset),
        ];

        for (step, dst) in steps {
            if let Some((step, src)) = step {
                stages.push(Stage {
                    step,
                    src,
                    dst,
                    run: step.interpreter(),
                });
            }
        }

        Self {
            vtype,
            options,
            layout,
            format,
            stages,
            tc_scale,
            jitted: None,
            warned: AtomicU8::new(0),
        }
    }

    #[inline(always)]
    pub fn vtype(&self) -> VertexType {
        self.vtype
    }

    #[inline(always)]
    pub fn options(&self) -> &DecoderOptions {
        &self.options
    }

    #[inline(always)]
    pub fn layout(&self) -> &SourceLayout {
        &self.layout
    }

    /// Canonical layout written by this decoder.
    #[inline(always)]
    pub fn format(&self) -> &FormatDescriptor {
        &self.format
    }

    #[inline(always)]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Size of a source vertex record, in bytes.
    #[inline(always)]
    pub fn size(&self) -> u32 {
        self.layout.size
    }

    /// Size of a canonical vertex record, in bytes.
    #[inline(always)]
    pub fn stride(&self) -> u32 {
        self.format.stride
    }

    /// Scale which normalizes texture coordinate components.
    #[inline(always)]
    pub fn tc_scale(&self) -> f32 {
        self.tc_scale
    }

    /// Returns whether the given warning should be emitted, marking it as emitted.
    pub(crate) fn should_warn(&self, warning: Warning) -> bool {
        let bit = warning as u8;
        self.warned.fetch_or(bit, Ordering::Relaxed) & bit == 0
    }

    #[inline(always)]
    pub fn jitted(&self) -> Option<&JittedDecoder> {
        self.jitted.as_ref()
    }

    /// Attaches a compiled function to this decoder, which is then used by
    /// [`decode_verts`](Self::decode_verts).
    ///
    /// # Safety
    /// `jitted` must implement this decoder's pipeline and remain valid for as long as it is
    /// attached.
    pub unsafe fn attach_jitted(&mut self, jitted: JittedDecoder) {
        self.jitted = Some(jitted);
    }

    /// Decodes the vertices in `range` of `src` into `dst`, using the compiled function if one
    /// is attached.
    ///
    /// # Panics
    /// Panics if `src` does not contain the vertices in `range` or if `dst` can't hold them.
    pub fn decode_verts(
        &self,
        dst: &mut [u8],
        src: &[u8],
        range: Range<usize>,
        params: &DecodeParams,
    ) {
        let count = range.len();
        let size = self.layout.size as usize;
        let stride = self.format.stride as usize;

        let src = &src[range.start * size..range.end * size];
        let dst = &mut dst[..count * stride];

        match &self.jitted {
            Some(jitted) => {
                assert!(count <= u32::MAX as usize);

                // SAFETY: the slices were bounds checked above and the function is valid while
                // attached
                unsafe { (jitted.func)(src.as_ptr(), dst.as_mut_ptr(), count as u32, params) }
            }
            None => self.interpret(dst, src, count, params),
        }
    }

    /// Decodes the vertices in `range` of `src` into `dst` using the interpreter, even if a
    /// compiled function is attached.
    ///
    /// # Panics
    /// Panics if `src` does not contain the vertices in `range` or if `dst` can't hold them.
    pub fn decode_verts_interpreted(
        &self,
        dst: &mut [u8],
        src: &[u8],
        range: Range<usize>,
        params: &DecodeParams,
    ) {
        let count = range.len();
        let size = self.layout.size as usize;
        let stride = self.format.stride as usize;

        let src = &src[range.start * size..range.end * size];
        let dst = &mut dst[..count * stride];
        self.interpret(dst, src, count, params);
    }

    fn interpret(&self, dst: &mut [u8], src: &[u8], count: usize, params: &DecodeParams) {
        let size = self.layout.size as usize;
        let stride = self.format.stride as usize;

        let mut cursor = Cursor::new(self, params);
        let sources = (0..count).map(|i| &src[i * size..(i + 1) * size]);
        for (src, dst) in sources.zip(dst.chunks_exact_mut(stride)) {
            cursor.src = src;
            cursor.dst = dst;

            for stage in self.stages.iter() {
                (stage.run)(stage, &mut cursor);
            }
        }
    }

    /// A short, deterministic description of the vertex type of this decoder.
    pub fn summary(&self) -> String {
        const POSITION: [&str; 4] = ["?", "s8", "s16", "f"];
        const NORMAL: [&str; 4] = ["", "s8", "s16", "f"];
        const UNSIGNED: [&str; 4] = ["", "u8", "u16", "f"];
        const COLOR: [&str; 8] = ["", "?", "?", "?", "565", "5551", "4444", "8888"];
        const INDEX: [&str; 4] = ["-", "u8", "u16", "?"];

        let code = |width: Option<Width>| width.map_or(0, |w| w as usize);
        let vtype = self.vtype;
        let mut out = String::new();

        _ = write!(out, "P: {}", POSITION[code(vtype.position())]);
        if vtype.normal().is_some() {
            _ = write!(out, " N: {}", NORMAL[code(vtype.normal())]);
        }
        if vtype.color() != ColorFormat::None {
            _ = write!(out, " C: {}", COLOR[vtype.color() as usize]);
        }
        if vtype.tex_coords().is_some() {
            _ = write!(out, " T: {}", UNSIGNED[code(vtype.tex_coords())]);
        }
        if vtype.weights().is_some() {
            _ = write!(
                out,
                " W: {} ({}x)",
                UNSIGNED[code(vtype.weights())],
                vtype.weight_count()
            );
        }
        if vtype.index() != IndexFormat::None {
            _ = write!(out, " I: {}", INDEX[vtype.index() as usize]);
        }
        if vtype.is_morph() {
            _ = write!(out, " Morph: {}", vtype.morph_count());
        }
        if vtype.through() {
            out.push_str(" (through)");
        }

        _ = write!(out, " (size: {})", self.layout.size);
        out
    }

    /// The summary, cut to at most `max` bytes.
    pub fn summary_truncated(&self, max: usize) -> String {
        let mut summary = self.summary();
        if summary.len() > max {
            let end = (0..=max)
                .rev()
                .find(|&i| summary.is_char_boundary(i))
                .unwrap_or(0);
            summary.truncate(end);
        }

        summary
    }

    pub fn describe(&self, kind: DescriptionKind) -> String {
        let mut out = self.summary();
        if kind == DescriptionKind::Short {
            return out;
        }

        _ = writeln!(out);
        _ = writeln!(out, "vertex type: 0x{:08X}", self.vtype.to_bits());
        _ = writeln!(out, "steps:");
        for (i, stage) in self.stages.iter().enumerate() {
            _ = writeln!(
                out,
                "  {i}: {} (src +{}, dst +{})",
                stage.step, stage.src, stage.dst
            );
        }

        _ = writeln!(out, "layout: {} (id 0x{:05X})", self.format, self.format.id());
        match &self.jitted {
            Some(jitted) => out.push_str(&format!("compiled: {} bytes", jitted.size)),
            None => out.push_str("compiled: no"),
        }

        out
    }
}

impl std::fmt::Debug for VertexDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VertexDecoder")
            .field("vtype", &self.vtype)
            .field("options", &self.options)
            .field("layout", &self.layout)
            .field("format", &self.format)
            .field("steps", &self.stages.iter().map(|s| s.step).collect::<Vec<_>>())
            .field("jitted", &self.jitted)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::params::{IDENTITY_4X3, UvScale};
    use crate::vtype::raw;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use tracing_subscriber::layer::SubscriberExt;

    fn decoder(vtype: u32) -> VertexDecoder {
        VertexDecoder::new(VertexType::from_bits(vtype), DecoderOptions::default())
    }

    fn decode(decoder: &VertexDecoder, src: &[u8], count: usize, params: &DecodeParams) -> Vec<u8> {
        let mut dst = vec![0xAA; count * decoder.stride() as usize];
        decoder.decode_verts(&mut dst, src, 0..count, params);
        dst
    }

    fn floats(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    fn float_bytes(values: &[f32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    struct CountWarnings(Arc<AtomicUsize>);

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for CountWarnings {
        fn on_event(
            &self,
            event: &tracing::Event<'_>,
            _: tracing_subscriber::layer::Context<'_, S>,
        ) {
            if *event.metadata().level() == tracing::Level::WARN {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn source_layout() {
        // u8 weights x3, u16 tc, 5551 color, s8 normal, float position
        let decoder = decoder(
            raw::WEIGHT_U8
                | raw::weight_count(3)
                | raw::TC_U16
                | raw::COL_5551
                | raw::NRM_S8
                | raw::POS_FLOAT,
        );

        let layout = decoder.layout();
        assert_eq!(layout.weights, 0);
        assert_eq!(layout.tex_coords, 4);
        assert_eq!(layout.color, 8);
        assert_eq!(layout.normal, 10);
        assert_eq!(layout.position, 16);
        assert_eq!(layout.one_size, 28);
        assert_eq!(decoder.size(), 28);

        let steps: Vec<_> = decoder.stages().iter().map(|s| s.step.to_string()).collect();
        assert_eq!(
            steps,
            [
                "weights u8 skin",
                "texcoord u16 to float",
                "color 5551",
                "normal s8 skin",
                "position float skin"
            ]
        );

        let format = decoder.format();
        assert_eq!(format.uv.format, DecFormat::Float2);
        assert_eq!(format.color0.format, DecFormat::U8x4);
        assert_eq!(format.normal.format, DecFormat::Float3);
        assert_eq!(format.position.format, DecFormat::Float3);
        assert_eq!(format.stride, 8 + 4 + 12 + 12);
    }

    #[test]
    fn morph_targets_are_padded() {
        let decoder = decoder(raw::COL_565 | raw::POS_S8 | raw::morph_count(3));
        assert_eq!(decoder.layout().position, 2);
        assert_eq!(decoder.layout().one_size, 6);
        assert_eq!(decoder.size(), 18);
    }

    #[test]
    fn through_disables_skinning() {
        let decoder = decoder(
            raw::WEIGHT_U16 | raw::weight_count(2) | raw::TC_U16 | raw::POS_S16 | raw::THROUGH,
        );

        // weights are still part of the record
        assert_eq!(decoder.layout().tex_coords, 4);
        assert_eq!(decoder.size(), 14);
        assert_eq!(decoder.stages().len(), 2);
        assert!(decoder.stages().iter().all(|s| !s.step.is_skin()));
    }

    #[test]
    fn raw_outputs() {
        let options = DecoderOptions {
            expand_uv_to_float: false,
            ..Default::default()
        };
        let vtype = VertexType::from_bits(raw::TC_U8 | raw::NRM_S16 | raw::POS_S8);
        let decoder = VertexDecoder::new(vtype, options);

        assert_eq!(decoder.format().uv.format, DecFormat::U8x2);
        assert_eq!(decoder.format().normal.format, DecFormat::S16x3);
        assert_eq!(decoder.format().position.format, DecFormat::S8x3);

        let src = [7, 9, 0x01, 0x80, 0xFF, 0x7F, 0x00, 0x00, 0x80, 0x01, 0xFF, 0];
        let dst = decode(&decoder, &src, 1, &DecodeParams::default());
        assert_eq!(
            dst,
            [7, 9, 0, 0, 0x01, 0x80, 0xFF, 0x7F, 0x00, 0x00, 0, 0, 0x80, 0x01, 0xFF, 0]
        );
    }

    #[test]
    fn rgb565_alpha_is_opaque() {
        let decoder = decoder(raw::COL_565 | raw::POS_FLOAT);
        let mut src = Vec::new();
        for color in [0x0000u16, 0x1234, 0xFFFF] {
            src.extend(color.to_le_bytes());
            src.extend([0, 0]);
            src.extend(float_bytes(&[1.0, 2.0, 3.0]));
        }

        let dst = decode(&decoder, &src, 3, &DecodeParams::default());
        for vertex in dst.chunks_exact(decoder.stride() as usize) {
            assert_eq!(vertex[3], 255);
        }

        assert_eq!(&dst[..4], &[0, 0, 0, 255]);
    }

    #[test]
    fn morph_blend() {
        let decoder = decoder(raw::COL_8888 | raw::POS_FLOAT | raw::morph_count(2));
        let mut src = Vec::new();
        for value in [10u8, 20] {
            src.extend([value; 4]);
            src.extend(float_bytes(&[value as f32; 3]));
        }

        let params = DecodeParams::default().with_morph_weights(&[0.5, 0.5]);
        let dst = decode(&decoder, &src, 1, &params);
        assert_eq!(&dst[..4], &[15; 4]);
        assert_eq!(floats(&dst[4..16]), [15.0; 3]);
    }

    #[test]
    fn morph_blend_packed() {
        let decoder = decoder(raw::COL_4444 | raw::POS_S16 | raw::morph_count(2));
        let mut src = Vec::new();
        for value in [0x0000u16, 0xFFFF] {
            src.extend(value.to_le_bytes());
            src.extend([0; 6]);
        }

        let params = DecodeParams::default().with_morph_weights(&[0.5, 0.5]);
        let dst = decode(&decoder, &src, 1, &params);

        // (15 * 0.5) * (255 / 15) truncates to 127
        assert_eq!(&dst[..4], &[127; 4]);
    }

    #[test]
    fn identity_skin() {
        let decoder = decoder(
            raw::WEIGHT_FLOAT | raw::weight_count(1) | raw::NRM_FLOAT | raw::POS_FLOAT,
        );

        let normal = [0.0, 0.6, -0.8];
        let position = [0.5, -2.0, 3.25];
        let mut src = float_bytes(&[1.0]);
        src.extend(float_bytes(&normal));
        src.extend(float_bytes(&position));

        let params = DecodeParams::default().with_bone(0, IDENTITY_4X3);
        let dst = decode(&decoder, &src, 1, &params);
        assert_eq!(floats(&dst), [normal, position].concat());
    }

    #[test]
    fn skin_translation() {
        let decoder = decoder(
            raw::WEIGHT_U8 | raw::weight_count(2) | raw::NRM_S8 | raw::POS_S16,
        );

        let mut moved = IDENTITY_4X3;
        moved[9..].copy_from_slice(&[1.0, 2.0, 3.0]);

        // weights 0.5 and 0.5, normal (64, 0, 0), position (16384, 0, -16384)
        let mut src = vec![64, 64, 64, 0, 0, 0];
        src.extend(16384i16.to_le_bytes());
        src.extend(0i16.to_le_bytes());
        src.extend((-16384i16).to_le_bytes());

        let params = DecodeParams::default()
            .with_bone(0, IDENTITY_4X3)
            .with_bone(1, moved);
        let dst = decode(&decoder, &src, 1, &params);
        assert_eq!(floats(&dst), [0.5, 0.0, 0.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn prescale() {
        let options = DecoderOptions {
            prescale_uv: true,
            ..Default::default()
        };
        let vtype = VertexType::from_bits(raw::TC_U8 | raw::POS_FLOAT);
        let decoder = VertexDecoder::new(vtype, options);

        let mut src = vec![64, 128, 0, 0];
        src.extend(float_bytes(&[0.0; 3]));

        let params = DecodeParams::default().with_uv(UvScale {
            u_scale: 2.0,
            v_scale: 0.5,
            u_off: 0.25,
            v_off: -1.0,
        });
        let dst = decode(&decoder, &src, 1, &params);
        assert_eq!(floats(&dst[..8]), [1.25, -0.5]);
    }

    #[test]
    fn through() {
        let decoder = decoder(raw::TC_U16 | raw::POS_S16 | raw::THROUGH);

        let mut src = Vec::new();
        src.extend(300u16.to_le_bytes());
        src.extend(400u16.to_le_bytes());
        src.extend((-5i16).to_le_bytes());
        src.extend(272i16.to_le_bytes());
        src.extend(65535u16.to_le_bytes());

        let dst = decode(&decoder, &src, 1, &DecodeParams::default());
        assert_eq!(floats(&dst), [300.0, 400.0, -5.0, 272.0, 65535.0]);
    }

    #[test]
    fn unsupported_color_warns_once() {
        let decoder = decoder((2 << 2) | raw::POS_S8);
        assert_eq!(decoder.stages()[0].step, Step::ColorInvalid);
        assert_eq!(decoder.format().color0.format, DecFormat::U8x4);

        let src = [1u8, 2, 3].repeat(16);
        let warnings = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(CountWarnings(warnings.clone()));
        let dst = tracing::subscriber::with_default(subscriber, || {
            let dst = decode(&decoder, &src, 16, &DecodeParams::default());
            decode(&decoder, &src, 16, &DecodeParams::default());
            dst
        });

        assert_eq!(warnings.load(Ordering::SeqCst), 1);
        for vertex in dst.chunks_exact(decoder.stride() as usize) {
            assert_eq!(vertex, [0, 0, 0, 0, 1, 2, 3, 0]);
        }
    }

    #[test]
    fn missing_position_writes_zeros() {
        let decoder = decoder(raw::COL_8888);
        assert_eq!(decoder.size(), 4);
        assert_eq!(decoder.format().position.format, DecFormat::Float3);

        let dst = decode(&decoder, &[1, 2, 3, 4], 1, &DecodeParams::default());
        assert_eq!(dst[..4], [1, 2, 3, 4]);
        assert_eq!(floats(&dst[4..]), [0.0; 3]);
    }

    #[test]
    fn decode_range() {
        let decoder = decoder(raw::POS_S8);
        let src = [0, 1, 2, 3, 4, 5, 6, 7, 8];
        let mut dst = vec![0; 8];
        decoder.decode_verts(&mut dst, &src, 1..3, &DecodeParams::default());
        assert_eq!(dst, [3, 4, 5, 0, 6, 7, 8, 0]);
    }

    #[test]
    fn summary() {
        let decoder = decoder(
            raw::POS_S16
                | raw::NRM_S8
                | raw::COL_8888
                | raw::TC_U16
                | raw::WEIGHT_U8
                | raw::weight_count(3)
                | raw::IDX_U16
                | raw::morph_count(2)
                | raw::THROUGH,
        );

        assert_eq!(
            decoder.summary(),
            "P: s16 N: s8 C: 8888 T: u16 W: u8 (3x) I: u16 Morph: 2 (through) (size: 48)"
        );
        assert_eq!(decoder.summary_truncated(6), "P: s16");
        assert_eq!(decoder.describe(DescriptionKind::Short), decoder.summary());
        assert!(
            decoder
                .describe(DescriptionKind::Detailed)
                .contains("position s16 through")
        );
    }
}
