use glam::Mat4;

use crate::scene::dirty::{DirtyObject, GpuBacked};

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Projection {
    /// Vertical field of view in radians.
    Perspective { fov_y: f32, near: f32, far: f32 },
    /// `height` is the visible height in world units, the width follows the aspect ratio.
    Orthographic { height: f32, near: f32, far: f32 },
}

/// A camera. Its position and orientation come from the node it is attached to, its aspect ratio from the view
/// it renders.
#[derive(Debug, Clone)]
pub struct Camera {
    name: String,
    projection: Projection,
    dirty: DirtyObject,
}

impl Camera {
    pub fn new(name: impl Into<String>, projection: Projection) -> Self {
        Self {
            name: name.into(),
            projection,
            dirty: DirtyObject::new(),
        }
    }

    /// Perspective camera with a 60 degree vertical field of view.
    pub fn perspective(name: impl Into<String>) -> Self {
        Self::new(
            name,
            Projection::Perspective {
                fov_y: 60f32.to_radians(),
                near: 0.1,
                far: 100.0,
            },
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn projection(&self) -> Projection {
        self.projection
    }

    pub fn set_projection(&mut self, projection: Projection) {
        self.projection = projection;
        self.mark_dirty();
    }

    /// Projection matrix into Vulkan clip space (Y down, depth 0 to 1).
    pub fn projection_matrix(&self, aspect_ratio: f32) -> Mat4 {
        let mut projection = match self.projection {
            Projection::Perspective { fov_y, near, far } => Mat4::perspective_rh(fov_y, aspect_ratio, near, far),
            Projection::Orthographic { height, near, far } => {
                let half_height = height / 2.0;
                let half_width = half_height * aspect_ratio;
                Mat4::orthographic_rh(-half_width, half_width, -half_height, half_height, near, far)
            }
        };
        projection.y_axis.y *= -1.0;
        projection
    }

    /// View matrix for a camera whose node has the world transform `world`.
    pub fn view_matrix(world: Mat4) -> Mat4 {
        world.inverse()
    }
}

impl GpuBacked for Camera {
    fn dirty(&self) -> &DirtyObject {
        &self.dirty
    }

    fn dirty_mut(&mut self) -> &mut DirtyObject {
        &mut self.dirty
    }
}
