//! The vertex type register.
use bitos::{bitos, integer::u3};
use std::fmt;

/// Width of a vertex attribute component.
#[bitos(2)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Width {
    #[default]
    Byte = 0b01,
    Short = 0b10,
    Float = 0b11,
}

impl Width {
    /// Size of a single component, in bytes.
    #[inline(always)]
    pub fn size(self) -> u32 {
        match self {
            Self::Byte => 1,
            Self::Short => 2,
            Self::Float => 4,
        }
    }

    /// Scale applied to integer components to normalize them.
    #[inline(always)]
    pub fn scale(self) -> f32 {
        match self {
            Self::Byte => 1.0 / 128.0,
            Self::Short => 1.0 / 32768.0,
            Self::Float => 1.0,
        }
    }
}

/// Format of the vertex color attribute.
#[bitos(3)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ColorFormat {
    #[default]
    None = 0b000,
    Reserved0 = 0b001,
    Reserved1 = 0b010,
    Reserved2 = 0b011,
    Rgb565 = 0b100,
    Rgba5551 = 0b101,
    Rgba4444 = 0b110,
    Rgba8888 = 0b111,
}

/// A color format that actually describes packed color data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackedColor {
    Rgb565,
    Rgba5551,
    Rgba4444,
    Rgba8888,
}

impl PackedColor {
    /// Size of a packed color, in bytes.
    #[inline(always)]
    pub fn size(self) -> u32 {
        match self {
            Self::Rgba8888 => 4,
            _ => 2,
        }
    }
}

impl ColorFormat {
    #[inline(always)]
    pub fn is_reserved(self) -> bool {
        matches!(self, Self::Reserved0 | Self::Reserved1 | Self::Reserved2)
    }

    /// Returns the packed color this format describes, if any.
    #[inline(always)]
    pub fn packed(self) -> Option<PackedColor> {
        Some(match self {
            Self::Rgb565 => PackedColor::Rgb565,
            Self::Rgba5551 => PackedColor::Rgba5551,
            Self::Rgba4444 => PackedColor::Rgba4444,
            Self::Rgba8888 => PackedColor::Rgba8888,
            _ => return None,
        })
    }
}

/// Width of the indices of an indexed draw.
#[bitos(2)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IndexFormat {
    #[default]
    None = 0b00,
    U8 = 0b01,
    U16 = 0b10,
    U32 = 0b11,
}

/// The vertex type register, which describes how vertices are laid out in memory.
#[bitos(32)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VertexType {
    #[bits(0..2)]
    pub tex_coords: Option<Width>,
    #[bits(2..5)]
    pub color: ColorFormat,
    #[bits(5..7)]
    pub normal: Option<Width>,
    #[bits(7..9)]
    pub position: Option<Width>,
    #[bits(9..11)]
    pub weights: Option<Width>,
    #[bits(11..13)]
    pub index: IndexFormat,
    #[bits(14..17)]
    pub weight_count_minus_one: u3,
    #[bits(18..21)]
    pub morph_count_minus_one: u3,
    #[bits(23)]
    pub through: bool,
}

impl VertexType {
    /// Number of skinning weights per vertex. Zero if weights are absent.
    #[inline(always)]
    pub fn weight_count(&self) -> u32 {
        if self.weights().is_some() {
            self.weight_count_minus_one().value() as u32 + 1
        } else {
            0
        }
    }

    /// Number of morph targets per vertex, at least one.
    #[inline(always)]
    pub fn morph_count(&self) -> u32 {
        self.morph_count_minus_one().value() as u32 + 1
    }

    #[inline(always)]
    pub fn is_morph(&self) -> bool {
        self.morph_count() > 1
    }

    /// Whether vertices are skinned by the decoder. Skinning is disabled in through mode.
    #[inline(always)]
    pub fn is_skinned(&self) -> bool {
        self.weights().is_some() && !self.through()
    }
}

impl fmt::Debug for VertexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VertexType")
            .field("raw", &format_args!("0x{:08X}", self.to_bits()))
            .field("tex_coords", &self.tex_coords())
            .field("color", &self.color())
            .field("normal", &self.normal())
            .field("position", &self.position())
            .field("weights", &self.weights())
            .field("weight_count", &self.weight_count())
            .field("morph_count", &self.morph_count())
            .field("index", &self.index())
            .field("through", &self.through())
            .finish()
    }
}

/// Raw field values of the vertex type register.
pub mod raw {
    pub const TC_U8: u32 = 1;
    pub const TC_U16: u32 = 2;
    pub const TC_FLOAT: u32 = 3;

    pub const COL_565: u32 = 4 << 2;
    pub const COL_5551: u32 = 5 << 2;
    pub const COL_4444: u32 = 6 << 2;
    pub const COL_8888: u32 = 7 << 2;

    pub const NRM_S8: u32 = 1 << 5;
    pub const NRM_S16: u32 = 2 << 5;
    pub const NRM_FLOAT: u32 = 3 << 5;

    pub const POS_S8: u32 = 1 << 7;
    pub const POS_S16: u32 = 2 << 7;
    pub const POS_FLOAT: u32 = 3 << 7;

    pub const WEIGHT_U8: u32 = 1 << 9;
    pub const WEIGHT_U16: u32 = 2 << 9;
    pub const WEIGHT_FLOAT: u32 = 3 << 9;

    pub const IDX_U8: u32 = 1 << 11;
    pub const IDX_U16: u32 = 2 << 11;
    pub const IDX_U32: u32 = 3 << 11;

    pub const THROUGH: u32 = 1 << 23;

    /// Encodes a weight count (1..=8).
    pub const fn weight_count(count: u32) -> u32 {
        (count - 1) << 14
    }

    /// Encodes a morph target count (1..=8).
    pub const fn morph_count(count: u32) -> u32 {
        (count - 1) << 18
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fields() {
        let vtype = VertexType::from_bits(
            raw::TC_U16
                | raw::COL_5551
                | raw::NRM_S8
                | raw::POS_FLOAT
                | raw::WEIGHT_U8
                | raw::weight_count(3)
                | raw::morph_count(2)
                | raw::IDX_U16
                | raw::THROUGH,
        );

        assert_eq!(vtype.tex_coords(), Some(Width::Short));
        assert_eq!(vtype.color(), ColorFormat::Rgba5551);
        assert_eq!(vtype.normal(), Some(Width::Byte));
        assert_eq!(vtype.position(), Some(Width::Float));
        assert_eq!(vtype.weights(), Some(Width::Byte));
        assert_eq!(vtype.weight_count(), 3);
        assert_eq!(vtype.morph_count(), 2);
        assert_eq!(vtype.index(), IndexFormat::U16);
        assert!(vtype.through());
        assert!(!vtype.is_skinned());
    }

    #[test]
    fn absent_fields() {
        let vtype = VertexType::from_bits(raw::COL_565 | raw::weight_count(4));
        assert_eq!(vtype.tex_coords(), None);
        assert_eq!(vtype.normal(), None);
        assert_eq!(vtype.position(), None);
        assert_eq!(vtype.weights(), None);
        assert_eq!(vtype.weight_count(), 0);
        assert_eq!(vtype.morph_count(), 1);
        assert_eq!(vtype.color().packed(), Some(PackedColor::Rgb565));
    }

    #[test]
    fn reserved_colors() {
        for code in 1..4 {
            let vtype = VertexType::from_bits(code << 2);
            assert!(vtype.color().is_reserved());
            assert_eq!(vtype.color().packed(), None);
        }
    }
}
