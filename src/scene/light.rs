use glam::Vec3;

use crate::scene::dirty::{DirtyObject, GpuBacked};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum LightKind {
    /// Shines along the node's -Z axis from infinitely far away.
    Directional = 0,
    Point = 1,
    /// Shines along the node's -Z axis, limited to a cone.
    Spot = 2,
}

/// A punctual light. Position and direction come from the node it is attached to.
#[derive(Debug, Clone)]
pub struct Light {
    kind: LightKind,
    color: Vec3,
    intensity: f32,
    /// Distance at which the light's contribution reaches zero. Zero means unlimited.
    range: f32,
    inner_cone: f32,
    outer_cone: f32,
    dirty: DirtyObject,
}

impl Light {
    fn new(kind: LightKind, color: Vec3, intensity: f32) -> Self {
        Self {
            kind,
            color,
            intensity,
            range: 0.0,
            inner_cone: 0.0,
            outer_cone: std::f32::consts::FRAC_PI_4,
            dirty: DirtyObject::new(),
        }
    }

    pub fn directional(color: Vec3, intensity: f32) -> Self {
        Self::new(LightKind::Directional, color, intensity)
    }

    pub fn point(color: Vec3, intensity: f32, range: f32) -> Self {
        Self {
            range,
            ..Self::new(LightKind::Point, color, intensity)
        }
    }

    /// Spot light with cone angles in radians.
    pub fn spot(color: Vec3, intensity: f32, range: f32, inner_cone: f32, outer_cone: f32) -> Self {
        Self {
            range,
            inner_cone,
            outer_cone,
            ..Self::new(LightKind::Spot, color, intensity)
        }
    }

    pub fn kind(&self) -> LightKind {
        self.kind
    }

    pub fn color(&self) -> Vec3 {
        self.color
    }

    pub fn intensity(&self) -> f32 {
        self.intensity
    }

    pub fn range(&self) -> f32 {
        self.range
    }

    /// Inner and outer cone angle, in radians.
    pub fn cone(&self) -> (f32, f32) {
        (self.inner_cone, self.outer_cone)
    }

    pub fn set_color(&mut self, color: Vec3) {
        self.color = color;
        self.mark_dirty();
    }

    pub fn set_intensity(&mut self, intensity: f32) {
        self.intensity = intensity;
        self.mark_dirty();
    }

    pub fn set_range(&mut self, range: f32) {
        self.range = range;
        self.mark_dirty();
    }
}

impl GpuBacked for Light {
    fn dirty(&self) -> &DirtyObject {
        &self.dirty
    }

    fn dirty_mut(&mut self) -> &mut DirtyObject {
        &mut self.dirty
    }
}
