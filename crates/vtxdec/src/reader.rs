//! Reading back canonical vertices, for software transform and debugging.
use crate::codec::Component;
use crate::format::{DecFormat, FormatDescriptor};
use crate::vtype::VertexType;
use std::fmt;

/// Logs a warning only the first time this call site is reached in the process.
macro_rules! warn_once {
    ($($arg:tt)*) => {{
        static WARNED: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(false);
        if !WARNED.swap(true, std::sync::atomic::Ordering::Relaxed) {
            tracing::warn!($($arg)*);
        }
    }};
}

#[inline(always)]
fn scaled<C: Component, const N: usize>(data: &[u8], scale: f32) -> [f32; N] {
    std::array::from_fn(|i| C::read(data, i).widen() * scale)
}

/// Reads attributes of canonical vertices.
pub struct VertexReader<'a> {
    base: &'a [u8],
    offset: usize,
    format: FormatDescriptor,
    vtype: VertexType,
}

impl<'a> VertexReader<'a> {
    /// Creates a reader positioned at the first vertex of `base`. The vertex type is only
    /// consulted for the through mode flag.
    pub fn new(base: &'a [u8], format: FormatDescriptor, vtype: VertexType) -> Self {
        Self {
            base,
            offset: 0,
            format,
            vtype,
        }
    }

    #[inline(always)]
    fn data(&self, offset: u32) -> &'a [u8] {
        let base: &'a [u8] = self.base;
        &base[self.offset + offset as usize..]
    }

    #[inline(always)]
    fn floats<const N: usize>(&self, offset: u32) -> [f32; N] {
        let data = self.data(offset);
        std::array::from_fn(|i| f32::read(data, i))
    }

    /// Moves the reader to the vertex with the given index.
    #[inline(always)]
    pub fn goto(&mut self, index: usize) {
        self.offset = index * self.format.stride as usize;
    }

    #[inline(always)]
    pub fn is_through(&self) -> bool {
        self.vtype.through()
    }

    #[inline(always)]
    pub fn has_color0(&self) -> bool {
        self.format.color0.is_present()
    }

    #[inline(always)]
    pub fn has_color1(&self) -> bool {
        self.format.color1.is_present()
    }

    #[inline(always)]
    pub fn has_normal(&self) -> bool {
        self.format.normal.is_present()
    }

    #[inline(always)]
    pub fn has_uv(&self) -> bool {
        self.format.uv.is_present()
    }

    /// Reads the position. In through mode, Z is normalized to the 0..=1 range.
    pub fn read_pos(&self) -> [f32; 3] {
        let field = self.format.position;
        let data = self.data(field.offset);

        match field.format {
            DecFormat::Float3 => {
                let mut pos = self.floats::<3>(field.offset);
                if self.is_through() {
                    let z = (pos[2] as i32) as f32 * (1.0 / 65535.0);
                    pos[2] = z.clamp(0.0, 1.0);
                }

                pos
            }
            DecFormat::S16x3 if self.is_through() => [
                i16::read(data, 0).widen(),
                i16::read(data, 1).widen(),
                u16::read(data, 2).widen() * (1.0 / 65535.0),
            ],
            DecFormat::S16x3 => scaled::<i16, 3>(data, 1.0 / 32768.0),
            DecFormat::S8x3 if self.is_through() => [
                i8::read(data, 0).widen(),
                i8::read(data, 1).widen(),
                u8::read(data, 2).widen() * (1.0 / 255.0),
            ],
            DecFormat::S8x3 => scaled::<i8, 3>(data, 1.0 / 128.0),
            format => {
                warn_once!(%format, "unsupported position format in reader");
                [0.0; 3]
            }
        }
    }

    /// Reads the position. In through mode, Z keeps its 16-bit integer range.
    pub fn read_pos_through_z16(&self) -> [f32; 3] {
        let field = self.format.position;
        let data = self.data(field.offset);

        match field.format {
            DecFormat::Float3 => {
                let mut pos = self.floats::<3>(field.offset);
                if self.is_through() {
                    let z = (pos[2] as i32) as f32;
                    pos[2] = z.clamp(0.0, 65535.0);
                }

                pos
            }
            DecFormat::S16x3 if self.is_through() => [
                i16::read(data, 0).widen(),
                i16::read(data, 1).widen(),
                u16::read(data, 2).widen(),
            ],
            DecFormat::S16x3 => scaled::<i16, 3>(data, 1.0 / 32768.0),
            DecFormat::S8x3 if self.is_through() => [
                i8::read(data, 0).widen(),
                i8::read(data, 1).widen(),
                u8::read(data, 2).widen(),
            ],
            DecFormat::S8x3 => scaled::<i8, 3>(data, 1.0 / 128.0),
            format => {
                warn_once!(%format, "unsupported position format in z16 reader");
                [0.0; 3]
            }
        }
    }

    pub fn read_nrm(&self) -> [f32; 3] {
        let field = self.format.normal;
        let data = self.data(field.offset);

        match field.format {
            DecFormat::Float3 => self.floats(field.offset),
            DecFormat::S16x3 => scaled::<i16, 3>(data, 1.0 / 32767.0),
            DecFormat::S8x3 => scaled::<i8, 3>(data, 1.0 / 127.0),
            format => {
                warn_once!(%format, "unsupported normal format in reader");
                [0.0; 3]
            }
        }
    }

    pub fn read_uv(&self) -> [f32; 2] {
        let field = self.format.uv;
        let data = self.data(field.offset);

        match field.format {
            DecFormat::U8x2 => scaled::<u8, 2>(data, 1.0 / 128.0),
            DecFormat::U16x2 => scaled::<u16, 2>(data, 1.0 / 32768.0),
            DecFormat::Float2 => self.floats(field.offset),
            format => {
                warn_once!(%format, "unsupported uv format in reader");
                [0.0; 2]
            }
        }
    }

    pub fn read_color0(&self) -> [f32; 4] {
        let field = self.format.color0;
        let data = self.data(field.offset);

        match field.format {
            DecFormat::U8x4 => scaled::<u8, 4>(data, 1.0 / 255.0),
            DecFormat::Float4 => self.floats(field.offset),
            format => {
                warn_once!(%format, "unsupported color0 format in reader");
                [0.0; 4]
            }
        }
    }

    pub fn read_color0_8888(&self) -> [u8; 4] {
        let field = self.format.color0;
        let data = self.data(field.offset);

        match field.format {
            DecFormat::U8x4 => [data[0], data[1], data[2], data[3]],
            DecFormat::Float4 => self.floats::<4>(field.offset).map(|c| (c * 255.0) as u8),
            format => {
                warn_once!(%format, "unsupported color0 format in 8888 reader");
                [0; 4]
            }
        }
    }

    pub fn read_color1(&self) -> [f32; 3] {
        let field = self.format.color1;
        let data = self.data(field.offset);

        match field.format {
            DecFormat::U8x4 => scaled::<u8, 3>(data, 1.0 / 255.0),
            DecFormat::Float4 => self.floats(field.offset),
            format => {
                warn_once!(%format, "unsupported color1 format in reader");
                [0.0; 3]
            }
        }
    }
}

impl fmt::Display for VertexReader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_normal() {
            let [x, y, z] = self.read_nrm();
            write!(f, "N: {x:.3} {y:.3} {z:.3} ")?;
        }

        if self.has_uv() {
            let [u, v] = self.read_uv();
            write!(f, "TC: {u:.3} {v:.3} ")?;
        }

        if self.has_color0() {
            let [r, g, b, a] = self.read_color0_8888();
            write!(f, "C0: {r:02X}{g:02X}{b:02X}{a:02X} ")?;
        }

        if self.has_color1() {
            let [r, g, b] = self.read_color1();
            write!(f, "C1: {r:.3} {g:.3} {b:.3} ")?;
        }

        let [x, y, z] = self.read_pos();
        write!(f, "P: {x:.3} {y:.3} {z:.3}")
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::decoder::{DecoderOptions, VertexDecoder};
    use crate::params::DecodeParams;
    use crate::vtype::raw;

    fn through_float(z: f32) -> (Vec<u8>, FormatDescriptor) {
        let format = FormatDescriptor::new(
            DecFormat::None,
            DecFormat::None,
            DecFormat::None,
            DecFormat::None,
            DecFormat::Float3,
        );
        let data = [10.0f32, 20.0, z]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();

        (data, format)
    }

    #[test]
    fn through_z_clamps() {
        let vtype = VertexType::from_bits(raw::POS_FLOAT | raw::THROUGH);

        let (data, format) = through_float(70000.0);
        let reader = VertexReader::new(&data, format, vtype);
        assert_eq!(reader.read_pos(), [10.0, 20.0, 1.0]);
        assert_eq!(reader.read_pos_through_z16(), [10.0, 20.0, 65535.0]);

        let (data, format) = through_float(-5.0);
        let reader = VertexReader::new(&data, format, vtype);
        assert_eq!(reader.read_pos(), [10.0, 20.0, 0.0]);
        assert_eq!(reader.read_pos_through_z16(), [10.0, 20.0, 0.0]);

        let (data, format) = through_float(1234.75);
        let reader = VertexReader::new(&data, format, vtype);
        assert_eq!(reader.read_pos_through_z16()[2], 1234.0);
    }

    #[test]
    fn through_z_special_values() {
        let vtype = VertexType::from_bits(raw::POS_FLOAT | raw::THROUGH);
        let cases = [
            (f32::NAN, 0.0, 0.0),
            (f32::INFINITY, 1.0, 65535.0),
            (f32::NEG_INFINITY, 0.0, 0.0),
            (-0.0, 0.0, 0.0),
            (f32::MIN_POSITIVE / 2.0, 0.0, 0.0),
        ];

        for (z, normalized, z16) in cases {
            let (data, format) = through_float(z);
            let reader = VertexReader::new(&data, format, vtype);
            assert_eq!(reader.read_pos()[2].to_bits(), f32::to_bits(normalized), "{z}");
            assert_eq!(reader.read_pos_through_z16()[2].to_bits(), f32::to_bits(z16), "{z}");
        }
    }

    #[test]
    fn z_is_raw_outside_through() {
        let vtype = VertexType::from_bits(raw::POS_FLOAT);
        let (data, format) = through_float(70000.0);
        let reader = VertexReader::new(&data, format, vtype);
        assert_eq!(reader.read_pos(), [10.0, 20.0, 70000.0]);
    }

    #[test]
    fn s8_round_trip() {
        let vtype = VertexType::from_bits(raw::NRM_S8 | raw::POS_S8);
        let decoder = VertexDecoder::new(vtype, DecoderOptions::default());

        let values: Vec<i8> = (i8::MIN..=i8::MAX).collect();
        let src: Vec<u8> = values
            .iter()
            .flat_map(|&v| {
                let b = v as u8;
                [b, b, b, b, b.wrapping_neg(), 0]
            })
            .collect();

        let mut dst = vec![0; values.len() * decoder.stride() as usize];
        decoder.decode_verts(&mut dst, &src, 0..values.len(), &DecodeParams::default());

        let mut reader = VertexReader::new(&dst, *decoder.format(), vtype);
        for (i, &value) in values.iter().enumerate() {
            reader.goto(i);

            let expected = value as f32 / 128.0;
            let [x, y, z] = reader.read_pos();
            assert!((x - expected).abs() <= 1.0 / 128.0);
            assert!((y - (value as u8).wrapping_neg() as i8 as f32 / 128.0).abs() <= 1.0 / 128.0);
            assert_eq!(z, 0.0);

            let [nx, ny, nz] = reader.read_nrm();
            assert!((nx - value as f32 / 127.0).abs() < 1e-6);
            assert_eq!(nx, ny);
            assert_eq!(ny, nz);
        }
    }

    #[test]
    fn uv_and_color() {
        let options = DecoderOptions {
            expand_uv_to_float: false,
            ..Default::default()
        };
        let vtype = VertexType::from_bits(raw::TC_U8 | raw::COL_565 | raw::POS_S16);
        let decoder = VertexDecoder::new(vtype, options);

        // tc (64, 255), color pure red, position zero
        let src = [64, 255, 0x1F, 0x00, 0, 0, 0, 0, 0, 0];
        let mut dst = vec![0; decoder.stride() as usize];
        decoder.decode_verts(&mut dst, &src, 0..1, &DecodeParams::default());

        let reader = VertexReader::new(&dst, *decoder.format(), vtype);
        assert!(reader.has_uv() && reader.has_color0());
        assert!(!reader.has_normal() && !reader.has_color1());
        assert_eq!(reader.read_uv(), [0.5, 255.0 / 128.0]);
        let color = reader.read_color0();
        for (channel, expected) in color.into_iter().zip([1.0, 0.0, 0.0, 1.0]) {
            assert!((channel - expected).abs() < 1e-6);
        }
        assert_eq!(reader.read_color0_8888(), [255, 0, 0, 255]);
        assert_eq!(reader.read_pos(), [0.0; 3]);
        assert_eq!(
            reader.to_string(),
            "TC: 0.500 1.992 C0: FF0000FF P: 0.000 0.000 0.000"
        );
    }
}
