//! Metallic-roughness materials.

use glam::{Vec3, Vec4};

use crate::pipeline::id::{MaterialPart, TextureSlot};
use crate::scene::dirty::{DirtyObject, GpuBacked};
use crate::scene::TextureKey;

/// A texture bound to a material slot, sampled with a texcoord channel.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TextureBinding {
    pub texture: TextureKey,
    pub uv_channel: u32,
}

/// Material parameters and textures. The [`MaterialPart`] of the pipeline id is kept in sync with the texture
/// bindings. Every setter marks the material dirty.
#[derive(Debug, Clone)]
pub struct Material {
    name: String,
    base_color: Vec4,
    emissive: Vec3,
    metallic: f32,
    roughness: f32,
    normal_scale: f32,
    occlusion_strength: f32,
    alpha_cutoff: f32,
    textures: [Option<TextureBinding>; TextureSlot::COUNT],
    part: MaterialPart,
    dirty: DirtyObject,
}

impl Material {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_color(&self) -> Vec4 {
        self.base_color
    }

    pub fn emissive(&self) -> Vec3 {
        self.emissive
    }

    pub fn metallic(&self) -> f32 {
        self.metallic
    }

    pub fn roughness(&self) -> f32 {
        self.roughness
    }

    pub fn normal_scale(&self) -> f32 {
        self.normal_scale
    }

    pub fn occlusion_strength(&self) -> f32 {
        self.occlusion_strength
    }

    pub fn alpha_cutoff(&self) -> f32 {
        self.alpha_cutoff
    }

    pub fn texture(&self, slot: TextureSlot) -> Option<TextureBinding> {
        self.textures[slot.index()]
    }

    /// Bound textures with their slots.
    pub fn textures(&self) -> impl Iterator<Item = (TextureSlot, TextureBinding)> + '_ {
        TextureSlot::ALL
            .iter()
            .filter_map(|slot| self.textures[slot.index()].map(|binding| (*slot, binding)))
    }

    /// Precomputed material part of the pipeline id.
    pub fn material_part(&self) -> MaterialPart {
        self.part
    }

    pub fn set_base_color(&mut self, color: Vec4) {
        self.base_color = color;
        self.mark_dirty();
    }

    pub fn set_emissive(&mut self, emissive: Vec3) {
        self.emissive = emissive;
        self.mark_dirty();
    }

    pub fn set_metallic_roughness(&mut self, metallic: f32, roughness: f32) {
        self.metallic = metallic;
        self.roughness = roughness;
        self.mark_dirty();
    }

    pub fn set_alpha_cutoff(&mut self, cutoff: f32) {
        self.alpha_cutoff = cutoff;
        self.mark_dirty();
    }

    /// Bind or unbind a texture. This changes the pipeline variant used for the material.
    pub fn set_texture(&mut self, slot: TextureSlot, binding: Option<TextureBinding>) {
        self.textures[slot.index()] = binding;
        self.part = compute_part(&self.textures);
        self.mark_dirty();
    }
}

impl GpuBacked for Material {
    fn dirty(&self) -> &DirtyObject {
        &self.dirty
    }

    fn dirty_mut(&mut self) -> &mut DirtyObject {
        &mut self.dirty
    }
}

fn compute_part(textures: &[Option<TextureBinding>; TextureSlot::COUNT]) -> MaterialPart {
    TextureSlot::ALL.iter().fold(MaterialPart::unbound(), |part, slot| match textures[slot.index()] {
        Some(binding) => part.with_texture(*slot, binding.uv_channel),
        None => part,
    })
}

/// Builds a [`Material`].
///
/// # Example
/// ```
/// # use lugdunum::*;
/// # fn example(albedo: TextureKey) {
/// let material = MaterialBuilder::new("brick")
///     .base_color(glam::Vec4::ONE)
///     .metallic_roughness(0.0, 0.8)
///     .texture(TextureSlot::BaseColor, albedo, 0)
///     .build();
/// assert!(material.material_part().is_bound(TextureSlot::BaseColor));
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct MaterialBuilder {
    inner: Material,
}

impl MaterialBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Material {
                name: name.into(),
                base_color: Vec4::ONE,
                emissive: Vec3::ZERO,
                metallic: 1.0,
                roughness: 1.0,
                normal_scale: 1.0,
                occlusion_strength: 1.0,
                alpha_cutoff: 0.5,
                textures: [None; TextureSlot::COUNT],
                part: MaterialPart::unbound(),
                dirty: DirtyObject::new(),
            },
        }
    }

    pub fn base_color(mut self, color: Vec4) -> Self {
        self.inner.base_color = color;
        self
    }

    pub fn emissive(mut self, emissive: Vec3) -> Self {
        self.inner.emissive = emissive;
        self
    }

    pub fn metallic_roughness(mut self, metallic: f32, roughness: f32) -> Self {
        self.inner.metallic = metallic;
        self.inner.roughness = roughness;
        self
    }

    pub fn normal_scale(mut self, scale: f32) -> Self {
        self.inner.normal_scale = scale;
        self
    }

    pub fn occlusion_strength(mut self, strength: f32) -> Self {
        self.inner.occlusion_strength = strength;
        self
    }

    pub fn alpha_cutoff(mut self, cutoff: f32) -> Self {
        self.inner.alpha_cutoff = cutoff;
        self
    }

    /// Bind `texture` to `slot`, sampled with texcoord channel `uv_channel` (0-2).
    pub fn texture(mut self, slot: TextureSlot, texture: TextureKey, uv_channel: u32) -> Self {
        self.inner.textures[slot.index()] = Some(TextureBinding {
            texture,
            uv_channel: uv_channel.min(2),
        });
        self
    }

    pub fn build(mut self) -> Material {
        self.inner.part = compute_part(&self.inner.textures);
        self.inner
    }
}
