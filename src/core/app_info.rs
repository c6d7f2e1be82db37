//! Exposes all structs needed to store initialization parameters.

use ash::vk;

use crate::core::window::Window;

/// Minimum requirements for the GPU. This will be used to determine what physical device is selected.
/// # Example
/// ```
/// # use lugdunum::*;
/// let requirements = GPURequirements {
///     dedicated: true,
///     min_video_memory: 1024 * 1024 * 1024,
///     ..Default::default()
/// };
/// ```
#[derive(Default, Debug, Clone)]
pub struct GPURequirements {
    /// Whether a dedicated GPU is required. Setting this to true will discard integrated GPUs.
    pub dedicated: bool,
    /// Minimum amount of video memory required, in bytes. Note that this might count shared memory if RAM is shared.
    pub min_video_memory: usize,
    /// Optional Vulkan 1.0 features that are required from the physical device.
    pub features: vk::PhysicalDeviceFeatures,
    /// Vulkan device extensions that should be present and enabled.
    pub device_extensions: Vec<String>,
}

/// Which part of the shading result ends up on screen. Used for debugging materials.
/// Selected in the shaders through the [`ExtraPart`](crate::pipeline::id::ExtraPart) of the pipeline id.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum DisplayMode {
    /// Regular, fully lit output.
    #[default]
    Full = 0,
    Albedo = 1,
    Normal = 2,
    Metallic = 3,
    Roughness = 4,
    Occlusion = 5,
    Emissive = 6,
}

impl DisplayMode {
    /// All display modes, in id order.
    pub const ALL: [DisplayMode; 7] = [
        DisplayMode::Full,
        DisplayMode::Albedo,
        DisplayMode::Normal,
        DisplayMode::Metallic,
        DisplayMode::Roughness,
        DisplayMode::Occlusion,
        DisplayMode::Emissive,
    ];

    /// Converts the packed 3-bit value back into a display mode.
    pub fn from_bits(bits: u32) -> Option<Self> {
        Self::ALL.get(bits as usize).copied()
    }
}

/// Antialiasing mode of the forward renderer.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Antialiasing {
    #[default]
    None = 0,
    Msaa2x = 1,
    Msaa4x = 2,
    Msaa8x = 3,
    Msaa16x = 4,
}

impl Antialiasing {
    /// All antialiasing modes, in id order.
    pub const ALL: [Antialiasing; 5] = [
        Antialiasing::None,
        Antialiasing::Msaa2x,
        Antialiasing::Msaa4x,
        Antialiasing::Msaa8x,
        Antialiasing::Msaa16x,
    ];

    /// Converts the packed 4-bit value back into an antialiasing mode.
    pub fn from_bits(bits: u32) -> Option<Self> {
        Self::ALL.get(bits as usize).copied()
    }

    /// Sample count used for the color and depth attachments.
    pub fn sample_count(&self) -> vk::SampleCountFlags {
        match self {
            Antialiasing::None => vk::SampleCountFlags::TYPE_1,
            Antialiasing::Msaa2x => vk::SampleCountFlags::TYPE_2,
            Antialiasing::Msaa4x => vk::SampleCountFlags::TYPE_4,
            Antialiasing::Msaa8x => vk::SampleCountFlags::TYPE_8,
            Antialiasing::Msaa16x => vk::SampleCountFlags::TYPE_16,
        }
    }

    /// Returns true if rendering needs separate multisampled attachments and a resolve step.
    pub fn is_multisampled(&self) -> bool {
        *self != Antialiasing::None
    }
}

/// Capacities of the renderer-owned resource pools.
///
/// Descriptor set pools do not grow on demand, so `*_max_sets` is a hard limit on the number of distinct
/// cameras, light sets, materials, IBL bindings and skyboxes that can be in flight at once.
///
/// The limits count objects, not descriptor sets. Uniform data is kept per swapchain image, so the
/// renderer creates `max_sets` sets for every swapchain image.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// Sub-buffers per chunk in the camera uniform pool.
    pub camera_sub_buffers_per_chunk: u32,
    /// Sub-buffers per chunk in the light uniform pool.
    pub light_sub_buffers_per_chunk: u32,
    /// Sub-buffers per chunk in the material uniform pool.
    pub material_sub_buffers_per_chunk: u32,
    pub camera_max_sets: u32,
    pub light_max_sets: u32,
    pub material_max_sets: u32,
    pub ibl_max_sets: u32,
    pub skybox_max_sets: u32,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            camera_sub_buffers_per_chunk: 8,
            light_sub_buffers_per_chunk: 8,
            material_sub_buffers_per_chunk: 16,
            camera_max_sets: 20,
            light_max_sets: 20,
            material_max_sets: 20,
            ibl_max_sets: 20,
            skybox_max_sets: 4,
        }
    }
}

/// Settings of the renderer itself. Display mode and antialiasing can be changed at runtime through
/// [`Renderer`](crate::render::renderer::Renderer).
#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub display_mode: DisplayMode,
    pub antialiasing: Antialiasing,
    /// Maximum number of lights per render queue. Extra lights are dropped.
    pub max_lights: usize,
    /// Requested number of swapchain images. The surface may clamp this.
    pub image_count: u32,
    /// Color the render area of every view is cleared to.
    pub clear_color: [f32; 4],
    pub pools: PoolSettings,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            display_mode: DisplayMode::default(),
            antialiasing: Antialiasing::default(),
            max_lights: 50,
            image_count: 3,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            pools: PoolSettings::default(),
        }
    }
}

/// Extra data that is stored within the AppSettings whenever we want to render to a window.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct SurfaceSettings<'a> {
    /// Optionally a preferred surface format. If set to None, `{BGRA8_SRGB, NONLINEAR_SRGB}` is chosen
    /// if it is available, otherwise the first reported format.
    pub surface_format: Option<vk::SurfaceFormatKHR>,
    /// Optionally a preferred present mode. Falls back to `FIFO`, which is always supported.
    pub present_mode: Option<vk::PresentModeKHR>,
    /// The window that we will use for rendering. This doesn't need to be a winit window.
    #[derivative(Debug = "ignore")]
    pub window: &'a dyn Window,
}

/// Application settings used to initialize the graphics device and the renderer.
#[derive(Debug)]
pub struct AppSettings<'a> {
    /// Application name. Possibly displayed in debugging tools, task manager, etc.
    pub name: String,
    /// Application version.
    pub version: (u32, u32, u32),
    /// Enable Vulkan validation layers for additional debug output.
    pub enable_validation: bool,
    /// Set to None for a headless device.
    pub surface_settings: Option<SurfaceSettings<'a>>,
    /// Minimum requirements the selected physical device should have.
    pub gpu_requirements: GPURequirements,
    pub render: RenderSettings,
}

/// The app builder is a convenience struct to easily create [`AppSettings`].
///
/// # Example
/// ```
/// # use lugdunum::*;
/// let info = AppBuilder::new()
///     .name("My lugdunum application")
///     .validation(true)
///     .antialiasing(Antialiasing::Msaa4x)
///     .max_lights(16)
///     .build();
/// ```
pub struct AppBuilder<'a> {
    inner: AppSettings<'a>,
}

impl<'a> Default for AppBuilder<'a> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> AppBuilder<'a> {
    /// Create a new app builder with default settings.
    pub fn new() -> Self {
        AppBuilder {
            inner: AppSettings {
                name: String::from(""),
                version: (0, 0, 0),
                enable_validation: false,
                surface_settings: None,
                gpu_requirements: GPURequirements::default(),
                render: RenderSettings::default(),
            },
        }
    }

    /// Sets the application name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.inner.name = name.into();
        self
    }

    /// Sets the application version.
    pub fn version(mut self, ver: impl Into<(u32, u32, u32)>) -> Self {
        self.inner.version = ver.into();
        self
    }

    /// Enable the Vulkan validation layers.
    pub fn validation(mut self, val: bool) -> Self {
        self.inner.enable_validation = val;
        self
    }

    /// The gpu requirements that the physical device must satisfy.
    pub fn gpu(mut self, gpu: GPURequirements) -> Self {
        self.inner.gpu_requirements = gpu;
        self
    }

    /// Render to a window surface. Without this the device is headless.
    pub fn window(mut self, window: &'a dyn Window) -> Self {
        match &mut self.inner.surface_settings {
            Some(surface) => surface.window = window,
            None => {
                self.inner.surface_settings = Some(SurfaceSettings {
                    surface_format: None,
                    present_mode: None,
                    window,
                })
            }
        }
        self
    }

    /// Preferred surface format. Ignored for a headless device.
    pub fn surface_format(mut self, format: vk::SurfaceFormatKHR) -> Self {
        if let Some(surface) = &mut self.inner.surface_settings {
            surface.surface_format = Some(format);
        }
        self
    }

    /// Preferred present mode. Ignored for a headless device.
    pub fn present_mode(mut self, mode: vk::PresentModeKHR) -> Self {
        if let Some(surface) = &mut self.inner.surface_settings {
            surface.present_mode = Some(mode);
        }
        self
    }

    /// Replace all renderer settings at once.
    pub fn render(mut self, render: RenderSettings) -> Self {
        self.inner.render = render;
        self
    }

    pub fn display_mode(mut self, mode: DisplayMode) -> Self {
        self.inner.render.display_mode = mode;
        self
    }

    pub fn antialiasing(mut self, aa: Antialiasing) -> Self {
        self.inner.render.antialiasing = aa;
        self
    }

    /// Maximum number of lights taken into account per view.
    pub fn max_lights(mut self, count: usize) -> Self {
        self.inner.render.max_lights = count;
        self
    }

    /// Requested swapchain image count.
    pub fn image_count(mut self, count: u32) -> Self {
        self.inner.render.image_count = count;
        self
    }

    pub fn clear_color(mut self, color: [f32; 4]) -> Self {
        self.inner.render.clear_color = color;
        self
    }

    /// Capacities of the renderer's buffer and descriptor set pools.
    pub fn pools(mut self, pools: PoolSettings) -> Self {
        self.inner.render.pools = pools;
        self
    }

    /// Build the resulting application settings.
    pub fn build(self) -> AppSettings<'a> {
        self.inner
    }
}
