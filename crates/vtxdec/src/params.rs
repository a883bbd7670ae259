//! Per-call decode parameters.
use static_assertions::const_assert_eq;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Maximum number of morph targets.
pub const MAX_MORPH_TARGETS: usize = 8;

/// Maximum number of bones (and therefore skinning weights).
pub const MAX_BONES: usize = 8;

/// Texture coordinate scale and offset applied by prescaling steps.
#[derive(Debug, Clone, Copy, PartialEq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct UvScale {
    pub u_scale: f32,
    pub v_scale: f32,
    pub u_off: f32,
    pub v_off: f32,
}

impl Default for UvScale {
    fn default() -> Self {
        Self {
            u_scale: 1.0,
            v_scale: 1.0,
            u_off: 0.0,
            v_off: 0.0,
        }
    }
}

/// State consulted by decode steps that is supplied per call rather than baked into a decoder.
///
/// Compiled decoders read this structure directly through a pointer, so its layout is fixed.
#[derive(Debug, Clone, Copy, PartialEq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct DecodeParams {
    /// Weight of each morph target.
    pub morph_weights: [f32; MAX_MORPH_TARGETS],
    /// Bone matrices, 4x3, stored as the x, y and z axes followed by the translation.
    pub bones: [[f32; 12]; MAX_BONES],
    pub uv: UvScale,
}

const_assert_eq!(size_of::<DecodeParams>(), 4 * (8 + 8 * 12 + 4));

/// The 4x3 identity matrix.
pub const IDENTITY_4X3: [f32; 12] = [
    1.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, //
    0.0, 0.0, 1.0, //
    0.0, 0.0, 0.0, //
];

impl Default for DecodeParams {
    fn default() -> Self {
        let mut morph_weights = [0.0; MAX_MORPH_TARGETS];
        morph_weights[0] = 1.0;

        Self {
            morph_weights,
            bones: [IDENTITY_4X3; MAX_BONES],
            uv: UvScale::default(),
        }
    }
}

impl DecodeParams {
    pub fn with_morph_weights(mut self, weights: &[f32]) -> Self {
        let len = weights.len().min(MAX_MORPH_TARGETS);
        self.morph_weights = [0.0; MAX_MORPH_TARGETS];
        self.morph_weights[..len].copy_from_slice(&weights[..len]);
        self
    }

    pub fn with_bone(mut self, index: usize, matrix: [f32; 12]) -> Self {
        self.bones[index] = matrix;
        self
    }

    pub fn with_uv(mut self, uv: UvScale) -> Self {
        self.uv = uv;
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::mem::offset_of;
    use zerocopy::IntoBytes;

    #[test]
    fn layout() {
        assert_eq!(offset_of!(DecodeParams, morph_weights), 0);
        assert_eq!(offset_of!(DecodeParams, bones), 32);
        assert_eq!(offset_of!(DecodeParams, uv), 32 + 384);
        assert_eq!(DecodeParams::default().as_bytes().len(), 432);
    }

    #[test]
    fn morph_weights_are_truncated() {
        let params = DecodeParams::default().with_morph_weights(&[0.25; 10]);
        assert_eq!(params.morph_weights, [0.25; 8]);

        let params = DecodeParams::default().with_morph_weights(&[0.5, 0.5]);
        assert_eq!(params.morph_weights[..3], [0.5, 0.5, 0.0]);
    }
}
