//! Vertex input layouts derived from a [`PrimitivePart`].
//!
//! Every attribute lives in its own vertex buffer binding. Bindings are assigned in stream order (position,
//! normal, tangent, texcoords, colors), skipping absent streams. Shader locations are fixed per stream so a
//! shader variant never has to renumber its inputs.

use ash::vk;

use crate::pipeline::id::PrimitivePart;

/// One vertex attribute stream of a primitive set.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum VertexStream {
    Position,
    Normal,
    Tangent,
    Texcoord(u32),
    Color(u32),
}

impl VertexStream {
    /// Shader input location.
    pub fn location(&self) -> u32 {
        match self {
            VertexStream::Position => 0,
            VertexStream::Normal => 1,
            VertexStream::Tangent => 2,
            VertexStream::Texcoord(i) => 3 + i,
            VertexStream::Color(i) => 3 + PrimitivePart::MAX_STREAMS + i,
        }
    }

    pub fn format(&self) -> vk::Format {
        match self {
            VertexStream::Position | VertexStream::Normal => vk::Format::R32G32B32_SFLOAT,
            VertexStream::Tangent | VertexStream::Color(_) => vk::Format::R32G32B32A32_SFLOAT,
            VertexStream::Texcoord(_) => vk::Format::R32G32_SFLOAT,
        }
    }

    /// Size of one element, in bytes.
    pub fn stride(&self) -> u32 {
        match self {
            VertexStream::Position | VertexStream::Normal => 12,
            VertexStream::Tangent | VertexStream::Color(_) => 16,
            VertexStream::Texcoord(_) => 8,
        }
    }

    /// Number of floats per element.
    pub fn components(&self) -> usize {
        self.stride() as usize / 4
    }
}

/// Streams present in `part`, in binding order.
pub fn streams(part: PrimitivePart) -> Vec<VertexStream> {
    let mut streams = Vec::new();
    if part.has_position() {
        streams.push(VertexStream::Position);
    }
    if part.has_normal() {
        streams.push(VertexStream::Normal);
    }
    if part.has_tangent() {
        streams.push(VertexStream::Tangent);
    }
    streams.extend((0..part.texcoord_count()).map(VertexStream::Texcoord));
    streams.extend((0..part.color_count()).map(VertexStream::Color));
    streams
}

#[derive(Debug, Clone, Default)]
pub struct VertexInput {
    pub bindings: Vec<vk::VertexInputBindingDescription>,
    pub attributes: Vec<vk::VertexInputAttributeDescription>,
}

impl VertexInput {
    pub fn from_part(part: PrimitivePart) -> Self {
        let streams = streams(part);
        let bindings = streams
            .iter()
            .enumerate()
            .map(|(binding, stream)| vk::VertexInputBindingDescription {
                binding: binding as u32,
                stride: stream.stride(),
                input_rate: vk::VertexInputRate::VERTEX,
            })
            .collect();
        let attributes = streams
            .iter()
            .enumerate()
            .map(|(binding, stream)| vk::VertexInputAttributeDescription {
                location: stream.location(),
                binding: binding as u32,
                format: stream.format(),
                offset: 0,
            })
            .collect();
        Self {
            bindings,
            attributes,
        }
    }
}
