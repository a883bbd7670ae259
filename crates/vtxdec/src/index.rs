//! Index buffers.
use crate::vtype::{IndexFormat, VertexType};

/// Converts positions in an index buffer to vertex indices.
#[derive(Debug, Clone, Copy)]
pub struct IndexConverter<'a> {
    format: IndexFormat,
    indices: &'a [u8],
}

impl<'a> IndexConverter<'a> {
    pub fn new(vtype: VertexType, indices: &'a [u8]) -> Self {
        Self {
            format: vtype.index(),
            indices,
        }
    }

    /// Returns the vertex index at position `i`. Without an index buffer, positions are vertex
    /// indices.
    ///
    /// # Panics
    /// Panics if `i` is out of bounds of the index buffer.
    #[inline]
    pub fn convert(&self, i: u32) -> u32 {
        let i = i as usize;
        let data = self.indices;

        match self.format {
            IndexFormat::None => i as u32,
            IndexFormat::U8 => data[i] as u32,
            IndexFormat::U16 => u16::from_le_bytes([data[2 * i], data[2 * i + 1]]) as u32,
            IndexFormat::U32 => u32::from_le_bytes([
                data[4 * i],
                data[4 * i + 1],
                data[4 * i + 2],
                data[4 * i + 3],
            ]),
        }
    }
}
