//! Numeric conversions shared by every decode step.
//!
//! The compiled decoders reproduce these exactly, so every operation here is written in the same
//! order the code generator emits it. In particular, sums always start from their first term.

/// Factor applied to 5-bit channels in morphed colors.
pub const MORPH_5BIT: f32 = 255.0 / 31.0;
/// Factor applied to 6-bit channels in morphed colors.
pub const MORPH_6BIT: f32 = 255.0 / 63.0;
/// Factor applied to 4-bit channels in morphed colors.
pub const MORPH_4BIT: f32 = 255.0 / 15.0;

/// A component of a source attribute.
pub trait Component: Copy {
    /// Size of the component, in bytes.
    const SIZE: usize;

    /// Scale which normalizes this component.
    const SCALE: f32;

    /// Reads the `index`-th component from little endian `data`.
    fn read(data: &[u8], index: usize) -> Self;

    /// Converts the component to a float without any scaling.
    fn widen(self) -> f32;

    /// Converts the component to a float, applying `scale` if the component is an integer.
    #[inline(always)]
    fn normalize(self, scale: f32) -> f32 {
        self.widen() * scale
    }

    /// Contribution of this component to a morph sum.
    #[inline(always)]
    fn morph_term(self, weight: f32, scale: f32) -> f32 {
        self.widen() * (weight * scale)
    }
}

macro_rules! int_component {
    ($($ty:ty => $scale:expr),*) => {
        $(
            impl Component for $ty {
                const SIZE: usize = size_of::<$ty>();
                const SCALE: f32 = $scale;

                #[inline(always)]
                fn read(data: &[u8], index: usize) -> Self {
                    let start = index * Self::SIZE;
                    <$ty>::from_le_bytes(std::array::from_fn(|i| data[start + i]))
                }

                #[inline(always)]
                fn widen(self) -> f32 {
                    self as f32
                }
            }
        )*
    };
}

int_component! {
    u8 => 1.0 / 128.0,
    i8 => 1.0 / 128.0,
    u16 => 1.0 / 32768.0,
    i16 => 1.0 / 32768.0
}

impl Component for f32 {
    const SIZE: usize = 4;
    const SCALE: f32 = 1.0;

    #[inline(always)]
    fn read(data: &[u8], index: usize) -> Self {
        let start = index * Self::SIZE;
        f32::from_le_bytes(std::array::from_fn(|i| data[start + i]))
    }

    #[inline(always)]
    fn widen(self) -> f32 {
        self
    }

    #[inline(always)]
    fn normalize(self, _: f32) -> f32 {
        self
    }

    #[inline(always)]
    fn morph_term(self, weight: f32, _: f32) -> f32 {
        self * weight
    }
}

/// Expands a 4-bit channel to 8 bits.
#[inline(always)]
pub fn expand4(value: u16) -> u8 {
    let value = value & 0xF;
    ((value << 4) | value) as u8
}

/// Expands a 5-bit channel to 8 bits.
#[inline(always)]
pub fn expand5(value: u16) -> u8 {
    let value = value & 0x1F;
    ((value << 3) | (value >> 2)) as u8
}

/// Expands a 6-bit channel to 8 bits.
#[inline(always)]
pub fn expand6(value: u16) -> u8 {
    let value = value & 0x3F;
    ((value << 2) | (value >> 4)) as u8
}

#[inline(always)]
pub fn unpack_565(value: u16) -> [u8; 4] {
    [
        expand5(value),
        expand6(value >> 5),
        expand5(value >> 11),
        255,
    ]
}

#[inline(always)]
pub fn unpack_5551(value: u16) -> [u8; 4] {
    [
        expand5(value),
        expand5(value >> 5),
        expand5(value >> 10),
        if value >> 15 != 0 { 255 } else { 0 },
    ]
}

#[inline(always)]
pub fn unpack_4444(value: u16) -> [u8; 4] {
    [
        expand4(value),
        expand4(value >> 4),
        expand4(value >> 8),
        expand4(value >> 12),
    ]
}

/// Raw channels of a 16-bit packed color together with the factor that scales each of them to
/// the 0..=255 range when morphing. A zero factor marks a constant channel.
#[inline(always)]
pub fn morph_channels_565(value: u16) -> [(u16, f32); 3] {
    [
        (value & 0x1F, MORPH_5BIT),
        ((value >> 5) & 0x3F, MORPH_6BIT),
        ((value >> 11) & 0x1F, MORPH_5BIT),
    ]
}

#[inline(always)]
pub fn morph_channels_5551(value: u16) -> [(u16, f32); 4] {
    [
        (value & 0x1F, MORPH_5BIT),
        ((value >> 5) & 0x1F, MORPH_5BIT),
        ((value >> 10) & 0x1F, MORPH_5BIT),
        (value >> 15, 255.0),
    ]
}

#[inline(always)]
pub fn morph_channels_4444(value: u16) -> [(u16, f32); 4] {
    [
        (value & 0xF, MORPH_4BIT),
        ((value >> 4) & 0xF, MORPH_4BIT),
        ((value >> 8) & 0xF, MORPH_4BIT),
        ((value >> 12) & 0xF, MORPH_4BIT),
    ]
}

/// Contribution of a raw color channel to a morph sum.
#[inline(always)]
pub fn color_morph_term(channel: u16, weight: f32, factor: f32) -> f32 {
    (channel as f32 * weight) * factor
}

/// Converts a morphed color channel sum back to a byte, truncating toward zero and clamping.
#[inline(always)]
pub fn color_from_sum(sum: f32) -> u8 {
    (sum as i32).clamp(0, 255) as u8
}

/// Applies a 4x3 matrix to a position.
#[inline(always)]
pub fn transform_position(v: [f32; 3], m: &[f32; 12]) -> [f32; 3] {
    std::array::from_fn(|i| v[0] * m[i] + v[1] * m[3 + i] + v[2] * m[6 + i] + m[9 + i])
}

/// Applies the 3x3 part of a 4x3 matrix to a normal.
#[inline(always)]
pub fn transform_normal(v: [f32; 3], m: &[f32; 12]) -> [f32; 3] {
    std::array::from_fn(|i| v[0] * m[i] + v[1] * m[3 + i] + v[2] * m[6 + i])
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn expansion() {
        assert_eq!(expand5(0), 0);
        assert_eq!(expand5(31), 255);
        assert_eq!(expand5(16), 132);
        assert_eq!(expand6(63), 255);
        assert_eq!(expand6(32), 130);
        assert_eq!(expand4(15), 255);
        assert_eq!(expand4(8), 0x88);
    }

    #[test]
    fn rgb565_is_opaque() {
        for value in [0u16, 0x1234, 0xFFFF, 0x8000] {
            assert_eq!(unpack_565(value)[3], 255);
        }

        assert_eq!(unpack_565(0xFFFF), [255; 4]);
        assert_eq!(unpack_565(0x001F), [255, 0, 0, 255]);
        assert_eq!(unpack_565(0x07E0), [0, 255, 0, 255]);
    }

    #[test]
    fn rgba5551_alpha() {
        assert_eq!(unpack_5551(0x7FFF), [255, 255, 255, 0]);
        assert_eq!(unpack_5551(0x8000), [0, 0, 0, 255]);
    }

    #[test]
    fn rgba4444() {
        assert_eq!(unpack_4444(0xF00F), [255, 0, 0, 255]);
        assert_eq!(unpack_4444(0x0F0F), [255, 0, 255, 0]);
    }

    #[test]
    fn components() {
        let data = [0x80, 0xFF, 0x00, 0x80, 0x00, 0x00, 0x80, 0x3F];
        assert_eq!(i8::read(&data, 0), -128);
        assert_eq!(u8::read(&data, 0), 128);
        assert_eq!(i16::read(&data, 0), -128);
        assert_eq!(u16::read(&data, 1), 0x8000);
        assert_eq!(f32::read(&data, 1), 1.0);

        assert_eq!(i8::read(&data, 0).normalize(i8::SCALE), -1.0);
        assert_eq!(u16::read(&data, 1).normalize(u16::SCALE), 1.0);
        assert_eq!(2.5f32.normalize(0.0), 2.5);
    }

    #[test]
    fn color_sums_saturate() {
        assert_eq!(color_from_sum(-3.5), 0);
        assert_eq!(color_from_sum(300.0), 255);
        assert_eq!(color_from_sum(f32::NAN), 0);
        assert_eq!(color_from_sum(14.99), 14);
    }

    #[test]
    fn identity_transform() {
        use crate::params::IDENTITY_4X3;

        let v = [0.25, -0.5, 3.0];
        assert_eq!(transform_position(v, &IDENTITY_4X3), v);
        assert_eq!(transform_normal(v, &IDENTITY_4X3), v);
    }
}
