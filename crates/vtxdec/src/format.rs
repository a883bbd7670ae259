//! Canonical vertex formats.
use std::fmt;
use strum::{FromRepr, VariantArray};

/// Format of a canonical vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, FromRepr, VariantArray)]
#[repr(u8)]
pub enum DecFormat {
    #[default]
    None = 0,
    Float1 = 1,
    Float2 = 2,
    Float3 = 3,
    Float4 = 4,
    /// Three signed bytes followed by a zero byte.
    S8x3 = 5,
    /// Three signed shorts followed by a zero short.
    S16x3 = 6,
    U8x1 = 7,
    /// Two unsigned bytes followed by two zero bytes.
    U8x2 = 8,
    U8x3 = 9,
    U8x4 = 10,
    U16x1 = 11,
    U16x2 = 12,
    U16x3 = 13,
    U16x4 = 14,
}

impl DecFormat {
    /// Size of an attribute in this format, in bytes.
    pub const fn size(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Float1 => 4,
            Self::Float2 => 8,
            Self::Float3 => 12,
            Self::Float4 => 16,
            Self::S8x3 => 4,
            Self::S16x3 => 8,
            Self::U8x1 | Self::U8x2 | Self::U8x3 | Self::U8x4 => 4,
            Self::U16x1 | Self::U16x2 => 4,
            Self::U16x3 | Self::U16x4 => 8,
        }
    }

    /// Alignment of an attribute in this format, in bytes.
    pub const fn alignment(self) -> u32 {
        match self {
            Self::None => 1,
            _ => 4,
        }
    }

    pub const fn is_present(self) -> bool {
        !matches!(self, Self::None)
    }
}

impl fmt::Display for DecFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Float1 => "f32x1",
            Self::Float2 => "f32x2",
            Self::Float3 => "f32x3",
            Self::Float4 => "f32x4",
            Self::S8x3 => "s8x3",
            Self::S16x3 => "s16x3",
            Self::U8x1 => "u8x1",
            Self::U8x2 => "u8x2",
            Self::U8x3 => "u8x3",
            Self::U8x4 => "u8x4",
            Self::U16x1 => "u16x1",
            Self::U16x2 => "u16x2",
            Self::U16x3 => "u16x3",
            Self::U16x4 => "u16x4",
        };

        f.write_str(name)
    }
}

/// A canonical attribute: its format and byte offset in the canonical record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Field {
    pub format: DecFormat,
    pub offset: u32,
}

impl Field {
    #[inline(always)]
    pub fn is_present(&self) -> bool {
        self.format.is_present()
    }

    /// Byte range of this field inside a canonical record.
    #[inline(always)]
    pub fn range(&self) -> std::ops::Range<usize> {
        let start = self.offset as usize;
        start..start + self.format.size() as usize
    }
}

/// Layout of a canonical vertex record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FormatDescriptor {
    pub uv: Field,
    pub color0: Field,
    pub color1: Field,
    pub normal: Field,
    pub position: Field,
    pub stride: u32,
}

impl FormatDescriptor {
    /// Builds a descriptor by laying out the given formats in canonical order.
    pub fn new(
        uv: DecFormat,
        color0: DecFormat,
        color1: DecFormat,
        normal: DecFormat,
        position: DecFormat,
    ) -> Self {
        let mut offset = 0;
        let mut biggest = 1;
        let mut place = |format: DecFormat| {
            if !format.is_present() {
                return Field::default();
            }

            biggest = biggest.max(format.alignment());
            offset = offset.next_multiple_of(format.alignment());
            let field = Field { format, offset };
            offset += format.size();

            field
        };

        let uv = place(uv);
        let color0 = place(color0);
        let color1 = place(color1);
        let normal = place(normal);
        let position = place(position);

        Self {
            uv,
            color0,
            color1,
            normal,
            position,
            stride: offset.next_multiple_of(biggest),
        }
    }

    /// Fields in canonical order.
    pub fn fields(&self) -> [(&'static str, Field); 5] {
        [
            ("uv", self.uv),
            ("color0", self.color0),
            ("color1", self.color1),
            ("normal", self.normal),
            ("position", self.position),
        ]
    }

    /// Identity of this layout. Each format fits in four bits and offsets follow from the
    /// formats, so distinct layouts always have distinct identities.
    pub fn id(&self) -> u32 {
        self.uv.format as u32
            | (self.color0.format as u32) << 4
            | (self.color1.format as u32) << 8
            | (self.normal.format as u32) << 12
            | (self.position.format as u32) << 16
    }
}

impl fmt::Display for FormatDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, field) in self.fields() {
            if field.is_present() {
                write!(f, "{name}: {} @ {}, ", field.format, field.offset)?;
            }
        }

        write!(f, "stride: {}", self.stride)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rustc_hash::FxHashSet;

    #[test]
    fn sizes_are_word_multiples() {
        for format in DecFormat::VARIANTS {
            assert_eq!(format.size() % 4, 0, "{format}");
            assert_eq!(DecFormat::from_repr(*format as u8), Some(*format));
        }
    }

    #[test]
    fn layout() {
        let desc = FormatDescriptor::new(
            DecFormat::Float2,
            DecFormat::U8x4,
            DecFormat::None,
            DecFormat::S8x3,
            DecFormat::Float3,
        );

        assert_eq!(desc.uv.offset, 0);
        assert_eq!(desc.color0.offset, 8);
        assert!(!desc.color1.is_present());
        assert_eq!(desc.normal.offset, 12);
        assert_eq!(desc.position.offset, 16);
        assert_eq!(desc.stride, 28);
        assert_eq!(desc.id(), 0x0003_50A2);
    }

    #[test]
    fn stride_is_sum_of_sizes() {
        let formats = DecFormat::VARIANTS;
        for &uv in formats {
            for &normal in formats {
                for &position in formats {
                    let color = DecFormat::U8x4;
                    let desc = FormatDescriptor::new(uv, color, DecFormat::None, normal, position);
                    let sum = uv.size() + 4 + normal.size() + position.size();
                    assert_eq!(desc.stride, sum);
                }
            }
        }
    }

    #[test]
    fn ids_are_unique() {
        let mut ids = FxHashSet::default();
        let formats = DecFormat::VARIANTS;
        for &uv in formats {
            for &color0 in formats {
                for &normal in formats {
                    for &position in formats {
                        let desc =
                            FormatDescriptor::new(uv, color0, DecFormat::None, normal, position);
                        assert!(ids.insert(desc.id()));
                    }
                }
            }
        }
    }
}
