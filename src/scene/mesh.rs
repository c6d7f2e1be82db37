//! Meshes made of primitive sets, each with its own vertex streams and default material.

use anyhow::Result;
use ash::vk;
use glam::{Vec2, Vec3, Vec4};

use crate::core::device::GraphicsDevice;
use crate::core::error::Error;
use crate::pipeline::id::{PrimitivePart, Topology};
use crate::pipeline::vertex::{self, VertexStream};
use crate::scene::buffer::GpuBuffer;
use crate::scene::MaterialKey;

/// Vertex and index data of one primitive set, before upload.
#[derive(Debug, Clone, Default)]
pub struct PrimitiveSetData {
    pub topology: Topology,
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub tangents: Vec<Vec4>,
    /// Up to three texcoord channels.
    pub texcoords: Vec<Vec<Vec2>>,
    /// Up to three color channels.
    pub colors: Vec<Vec<Vec4>>,
    pub indices: Option<Vec<u32>>,
    /// Material used when the node does not override it.
    pub material: Option<MaterialKey>,
}

impl PrimitiveSetData {
    /// The primitive part of the pipeline id for this data. Streams with no elements count as absent.
    pub fn primitive_part(&self) -> PrimitivePart {
        let mut part = PrimitivePart::new(self.topology);
        if !self.positions.is_empty() {
            part = part.with_position();
        }
        if !self.normals.is_empty() {
            part = part.with_normal();
        }
        if !self.tangents.is_empty() {
            part = part.with_tangent();
        }
        let texcoords = self.texcoords.iter().take_while(|channel| !channel.is_empty()).count();
        let colors = self.colors.iter().take_while(|channel| !channel.is_empty()).count();
        part.with_texcoords(texcoords as u32).with_colors(colors as u32)
    }

    fn stream_bytes(&self, stream: VertexStream) -> &[u8] {
        match stream {
            VertexStream::Position => bytemuck::cast_slice(&self.positions),
            VertexStream::Normal => bytemuck::cast_slice(&self.normals),
            VertexStream::Tangent => bytemuck::cast_slice(&self.tangents),
            VertexStream::Texcoord(i) => self
                .texcoords
                .get(i as usize)
                .map(|channel| bytemuck::cast_slice(channel))
                .unwrap_or_default(),
            VertexStream::Color(i) => self
                .colors
                .get(i as usize)
                .map(|channel| bytemuck::cast_slice(channel))
                .unwrap_or_default(),
        }
    }
}

/// How a primitive set is drawn.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DrawRange {
    Vertices { count: u32 },
    Indexed { count: u32, index_type: vk::IndexType },
}

/// An uploaded primitive set. The primitive part is computed once at build time.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct PrimitiveSet<D: GraphicsDevice> {
    part: PrimitivePart,
    streams: Vec<(VertexStream, GpuBuffer<D>)>,
    index_buffer: Option<GpuBuffer<D>>,
    range: DrawRange,
    material: Option<MaterialKey>,
}

impl<D: GraphicsDevice> PrimitiveSet<D> {
    pub fn primitive_part(&self) -> PrimitivePart {
        self.part
    }

    /// Default material of this set.
    pub fn material(&self) -> Option<MaterialKey> {
        self.material
    }

    pub fn set_material(&mut self, material: Option<MaterialKey>) {
        self.material = material;
    }

    /// Vertex buffers in binding order.
    pub fn vertex_buffers(&self) -> Vec<vk::Buffer> {
        self.streams.iter().map(|(_, buffer)| buffer.handle()).collect()
    }

    pub fn streams(&self) -> impl Iterator<Item = VertexStream> + '_ {
        self.streams.iter().map(|(stream, _)| *stream)
    }

    pub fn index_buffer(&self) -> Option<vk::Buffer> {
        self.index_buffer.as_ref().map(GpuBuffer::handle)
    }

    pub fn draw_range(&self) -> DrawRange {
        self.range
    }
}

/// A named list of primitive sets.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Mesh<D: GraphicsDevice> {
    name: String,
    primitive_sets: Vec<PrimitiveSet<D>>,
}

impl<D: GraphicsDevice> Mesh<D> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn primitive_sets(&self) -> &[PrimitiveSet<D>] {
        &self.primitive_sets
    }

    pub fn primitive_sets_mut(&mut self) -> &mut [PrimitiveSet<D>] {
        &mut self.primitive_sets
    }
}

/// Builds a [`Mesh`], uploading every stream to its own host-visible buffer.
///
/// # Example
/// ```
/// # use lugdunum::*;
/// # use anyhow::Result;
/// # fn example<D: GraphicsDevice>(device: D, material: MaterialKey) -> Result<()> {
/// let mesh = MeshBuilder::new(device, "triangle")
///     .primitive_set(PrimitiveSetData {
///         positions: vec![glam::Vec3::ZERO, glam::Vec3::X, glam::Vec3::Y],
///         material: Some(material),
///         ..Default::default()
///     })
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct MeshBuilder<D: GraphicsDevice> {
    device: D,
    name: String,
    sets: Vec<PrimitiveSetData>,
}

impl<D: GraphicsDevice> MeshBuilder<D> {
    pub fn new(device: D, name: impl Into<String>) -> Self {
        Self {
            device,
            name: name.into(),
            sets: Vec::new(),
        }
    }

    pub fn primitive_set(mut self, data: PrimitiveSetData) -> Self {
        self.sets.push(data);
        self
    }

    /// Upload all primitive sets.
    /// # Errors
    /// * Fails with [`Error::NoPositions`] if a primitive set has no positions.
    /// * Fails if a buffer cannot be created.
    pub fn build(self) -> Result<Mesh<D>> {
        let primitive_sets = self
            .sets
            .iter()
            .enumerate()
            .map(|(index, data)| self.upload(index, data))
            .collect::<Result<Vec<_>>>()?;
        Ok(Mesh {
            name: self.name,
            primitive_sets,
        })
    }

    fn upload(&self, index: usize, data: &PrimitiveSetData) -> Result<PrimitiveSet<D>> {
        if data.positions.is_empty() {
            return Err(Error::NoPositions.into());
        }
        let part = data.primitive_part();
        let streams = vertex::streams(part)
            .into_iter()
            .map(|stream| {
                let name = format!("{} set {} {:?}", self.name, index, stream);
                let buffer = GpuBuffer::with_data(
                    self.device.clone(),
                    &name,
                    vk::BufferUsageFlags::VERTEX_BUFFER,
                    data.stream_bytes(stream),
                )?;
                Ok((stream, buffer))
            })
            .collect::<Result<Vec<_>>>()?;

        let (index_buffer, range) = match &data.indices {
            Some(indices) => {
                let buffer = GpuBuffer::from_slice(
                    self.device.clone(),
                    &format!("{} set {} indices", self.name, index),
                    vk::BufferUsageFlags::INDEX_BUFFER,
                    indices,
                )?;
                (
                    Some(buffer),
                    DrawRange::Indexed {
                        count: indices.len() as u32,
                        index_type: vk::IndexType::UINT32,
                    },
                )
            }
            None => (
                None,
                DrawRange::Vertices {
                    count: data.positions.len() as u32,
                },
            ),
        };

        Ok(PrimitiveSet {
            part,
            streams,
            index_buffer,
            range,
            material: data.material,
        })
    }
}
