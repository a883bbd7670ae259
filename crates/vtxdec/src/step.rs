//! Decode steps.
use crate::format::DecFormat;
use crate::vtype::{PackedColor, Width};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TexCoordMode {
    /// Copied as-is, integers are kept as integers.
    Raw,
    /// Normalized to floats.
    Float,
    /// Normalized, then scaled and offset by the per-call UV scale.
    Prescale,
    /// Integers converted to floats without normalization.
    Through,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TexCoordStep {
    pub width: Width,
    pub mode: TexCoordMode,
    /// Doubles the range of 16-bit coordinates.
    pub double: bool,
    pub morph: bool,
}

impl TexCoordStep {
    /// Scale which normalizes a component of this step.
    pub fn scale(&self) -> f32 {
        match self.width {
            Width::Short if self.double => 1.0 / 16384.0,
            width => width.scale(),
        }
    }

    pub fn output(&self) -> DecFormat {
        match (self.mode, self.width) {
            (TexCoordMode::Raw, Width::Byte) if !self.morph => DecFormat::U8x2,
            (TexCoordMode::Raw, Width::Short) if !self.morph => DecFormat::U16x2,
            _ => DecFormat::Float2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorStep {
    pub format: PackedColor,
    pub morph: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NormalMode {
    /// Copied keeping the source width.
    Copy,
    /// 8-bit normals expanded to floats.
    ToFloat,
    /// Transformed by the skinning matrix.
    Skin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NormalStep {
    pub width: Width,
    pub mode: NormalMode,
    pub morph: bool,
}

impl NormalStep {
    pub fn output(&self) -> DecFormat {
        match (self.mode, self.width) {
            (NormalMode::Copy, Width::Byte) if !self.morph => DecFormat::S8x3,
            (NormalMode::Copy, Width::Short) if !self.morph => DecFormat::S16x3,
            _ => DecFormat::Float3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PositionMode {
    /// Copied keeping the source width.
    Copy,
    /// Transformed by the skinning matrix.
    Skin,
    /// Screen space coordinates, converted to floats without normalization.
    Through,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PositionStep {
    pub width: Width,
    pub mode: PositionMode,
    pub morph: bool,
}

impl PositionStep {
    pub fn output(&self) -> DecFormat {
        match (self.mode, self.width) {
            (PositionMode::Copy, Width::Byte) if !self.morph => DecFormat::S8x3,
            (PositionMode::Copy, Width::Short) if !self.morph => DecFormat::S16x3,
            _ => DecFormat::Float3,
        }
    }
}

/// A single unit of the decode pipeline, handling one attribute class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    /// Builds the skinning matrix from the vertex weights.
    Weights(Width),
    TexCoord(TexCoordStep),
    Color(ColorStep),
    /// Color with a reserved format code. Writes zeros.
    ColorInvalid,
    Normal(NormalStep),
    Position(PositionStep),
    /// Position absent from the vertex type. Writes zeros.
    PositionInvalid,
}

impl Step {
    /// Whether this step is a morph variant.
    pub fn is_morph(&self) -> bool {
        match self {
            Self::TexCoord(step) => step.morph,
            Self::Color(step) => step.morph,
            Self::Normal(step) => step.morph,
            Self::Position(step) => step.morph,
            _ => false,
        }
    }

    /// Whether this step applies the skinning matrix.
    pub fn is_skin(&self) -> bool {
        matches!(
            self,
            Self::Normal(NormalStep {
                mode: NormalMode::Skin,
                ..
            }) | Self::Position(PositionStep {
                mode: PositionMode::Skin,
                ..
            })
        )
    }

    /// Canonical format written by this step.
    pub fn output(&self) -> DecFormat {
        match self {
            Self::Weights(_) => DecFormat::None,
            Self::TexCoord(step) => step.output(),
            Self::Color(_) | Self::ColorInvalid => DecFormat::U8x4,
            Self::Normal(step) => step.output(),
            Self::Position(step) => step.output(),
            Self::PositionInvalid => DecFormat::Float3,
        }
    }
}

fn width_name(width: Width, signed: bool) -> &'static str {
    match (width, signed) {
        (Width::Byte, false) => "u8",
        (Width::Byte, true) => "s8",
        (Width::Short, false) => "u16",
        (Width::Short, true) => "s16",
        (Width::Float, _) => "float",
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Weights(width) => write!(f, "weights {} skin", width_name(*width, false)),
            Self::TexCoord(step) => {
                let mode = match step.mode {
                    TexCoordMode::Raw => "raw",
                    TexCoordMode::Float => "to float",
                    TexCoordMode::Prescale => "prescale",
                    TexCoordMode::Through => "through",
                };

                write!(f, "texcoord {} {mode}", width_name(step.width, false))?;
                if step.double && step.width == Width::Short {
                    f.write_str(" double")?;
                }
                if step.morph {
                    f.write_str(" morph")?;
                }

                Ok(())
            }
            Self::Color(step) => {
                let format = match step.format {
                    PackedColor::Rgb565 => "565",
                    PackedColor::Rgba5551 => "5551",
                    PackedColor::Rgba4444 => "4444",
                    PackedColor::Rgba8888 => "8888",
                };

                write!(f, "color {format}")?;
                if step.morph {
                    f.write_str(" morph")?;
                }

                Ok(())
            }
            Self::ColorInvalid => f.write_str("color invalid"),
            Self::Normal(step) => {
                let mode = match step.mode {
                    NormalMode::Copy => "copy",
                    NormalMode::ToFloat => "to float",
                    NormalMode::Skin => "skin",
                };

                write!(f, "normal {} {mode}", width_name(step.width, true))?;
                if step.morph {
                    f.write_str(" morph")?;
                }

                Ok(())
            }
            Self::Position(step) => {
                let mode = match step.mode {
                    PositionMode::Copy => "copy",
                    PositionMode::Skin => "skin",
                    PositionMode::Through => "through",
                };

                write!(f, "position {} {mode}", width_name(step.width, true))?;
                if step.morph {
                    f.write_str(" morph")?;
                }

                Ok(())
            }
            Self::PositionInvalid => f.write_str("position invalid"),
        }
    }
}
