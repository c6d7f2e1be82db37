//! Uniform buffer layouts shared with the forward shaders (std140 compatible).

use anyhow::Result;
use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};
use static_assertions::const_assert_eq;

use crate::allocator::buffer_pool::{BufferPool, SubBuffer};
use crate::core::device::{DeviceLimits, GraphicsDevice};
use crate::scene::light::{Light, LightKind};
use crate::scene::material::Material;

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct CameraUniform {
    pub view: Mat4,
    pub projection: Mat4,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct MaterialUniform {
    pub base_color: Vec4,
    /// xyz: emissive color, w: normal scale.
    pub emissive: Vec4,
    /// x: metallic, y: roughness, z: occlusion strength, w: alpha cutoff.
    pub params: Vec4,
}

impl From<&Material> for MaterialUniform {
    fn from(material: &Material) -> Self {
        Self {
            base_color: material.base_color(),
            emissive: material.emissive().extend(material.normal_scale()),
            params: Vec4::new(
                material.metallic(),
                material.roughness(),
                material.occlusion_strength(),
                material.alpha_cutoff(),
            ),
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct LightUniform {
    /// xyz: world position, w: light kind.
    pub position: Vec4,
    /// xyz: world direction, w: range.
    pub direction: Vec4,
    /// xyz: color, w: intensity.
    pub color: Vec4,
    /// x: cosine of the inner cone angle, y: cosine of the outer cone angle.
    pub cone: Vec4,
}

impl LightUniform {
    pub fn new(light: &Light, world: Mat4) -> Self {
        let position = world.w_axis.truncate();
        let direction = world.transform_vector3(glam::Vec3::NEG_Z).normalize_or_zero();
        let (inner, outer) = light.cone();
        let kind = match light.kind() {
            LightKind::Directional => 0.0,
            LightKind::Point => 1.0,
            LightKind::Spot => 2.0,
        };
        Self {
            position: position.extend(kind),
            direction: direction.extend(light.range()),
            color: light.color().extend(light.intensity()),
            cone: Vec4::new(inner.cos(), outer.cos(), 0.0, 0.0),
        }
    }
}

/// Header of the light uniform buffer, followed by `max_lights` [`LightUniform`]s.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct LightHeader {
    pub count: u32,
    pub _padding: [u32; 3],
}

const_assert_eq!(std::mem::size_of::<CameraUniform>(), 128);
const_assert_eq!(std::mem::size_of::<MaterialUniform>(), 48);
const_assert_eq!(std::mem::size_of::<LightUniform>(), 64);
const_assert_eq!(std::mem::size_of::<LightHeader>(), 16);

/// Largest update `vkCmdUpdateBuffer` accepts.
pub const MAX_INLINE_UPDATE_SIZE: vk::DeviceSize = 65536;

/// Size of the light buffer for `max_lights` lights.
pub fn light_buffer_size(max_lights: usize) -> vk::DeviceSize {
    (std::mem::size_of::<LightHeader>() + max_lights.max(1) * std::mem::size_of::<LightUniform>()) as vk::DeviceSize
}

/// Most lights a light buffer can hold on this device. The buffer is written with one inline update and bound
/// as a single uniform buffer range, so both limits apply.
pub fn light_capacity(limits: &DeviceLimits) -> usize {
    let bytes = MAX_INLINE_UPDATE_SIZE.min(limits.max_uniform_buffer_range as vk::DeviceSize) as usize;
    bytes.saturating_sub(std::mem::size_of::<LightHeader>()) / std::mem::size_of::<LightUniform>()
}

/// Serialize a light array into the layout of the light buffer.
pub fn light_buffer_data(lights: &[LightUniform]) -> Vec<u8> {
    let header = LightHeader {
        count: lights.len() as u32,
        _padding: [0; 3],
    };
    let mut data = bytemuck::bytes_of(&header).to_vec();
    data.extend_from_slice(bytemuck::cast_slice(lights));
    data
}

/// An inline buffer update to record before any draw of the frame.
#[derive(Debug, Clone)]
pub struct PendingUpload {
    pub buffer: vk::Buffer,
    pub offset: vk::DeviceSize,
    pub data: Vec<u8>,
}

/// Take a reference to the sub-buffer backing `hash`, queueing an upload of `data()` if the pool reports the
/// contents need updating. `data` is only evaluated when an upload is needed.
pub fn upload_if_dirty<D: GraphicsDevice>(
    pool: &mut BufferPool<D>,
    hash: u64,
    dirty: bool,
    uploads: &mut Vec<PendingUpload>,
    data: impl FnOnce() -> Vec<u8>,
) -> Result<(bool, SubBuffer)> {
    let (updated, sub_buffer) = pool.allocate(hash, dirty)?;
    let sub_buffer = *sub_buffer;
    if updated {
        uploads.push(PendingUpload {
            buffer: sub_buffer.buffer(),
            offset: sub_buffer.offset(),
            data: data(),
        });
    }
    Ok((updated, sub_buffer))
}
