//! Pipeline identity.
//!
//! Every draw is rendered with a pipeline variant selected by a [`PipelineId`], a 32 bit key packed from three
//! independently computed parts:
//!
//! | bits    | part             | contents                                                        |
//! |---------|------------------|-----------------------------------------------------------------|
//! | 0..10   | [`PrimitivePart`]| vertex attribute presence, texcoord and color counts, topology  |
//! | 10..20  | [`MaterialPart`] | per texture slot: bound UV channel, or `0b11` when unbound      |
//! | 20..29  | [`ExtraPart`]    | display mode, antialiasing, IBL map presence                    |
//! | 31      | skybox           | set for the skybox pipeline only                                |
//!
//! Primitive sets and materials precompute their part once when they are built. The renderer owns the extra part.
//! Two draws with the same id are always compatible with the same compiled pipeline.
//!
//! # Example
//! ```
//! # use lugdunum::*;
//! let primitive = PrimitivePart::new(Topology::TriangleList)
//!     .with_position()
//!     .with_normal()
//!     .with_texcoords(1);
//! let material = MaterialPart::unbound().with_texture(TextureSlot::BaseColor, 0);
//! let extra = ExtraPart::new(DisplayMode::Full, Antialiasing::None);
//! let id = PipelineId::new(primitive, material, extra);
//! assert_eq!(id.primitive(), primitive);
//! assert_eq!(id.material(), material);
//! ```

use std::fmt::{Display, Formatter};

use ash::vk;
use static_assertions::const_assert;

use crate::core::app_info::{Antialiasing, DisplayMode};

/// Primitive topology of a primitive set, as stored in the 3 bit topology field.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Topology {
    PointList = 0,
    LineList = 1,
    /// Rendered as a line strip. The closing segment must be part of the index data.
    LineLoop = 2,
    LineStrip = 3,
    #[default]
    TriangleList = 4,
    TriangleStrip = 5,
    TriangleFan = 6,
}

impl Topology {
    const ALL: [Topology; 7] = [
        Topology::PointList,
        Topology::LineList,
        Topology::LineLoop,
        Topology::LineStrip,
        Topology::TriangleList,
        Topology::TriangleStrip,
        Topology::TriangleFan,
    ];

    pub fn from_bits(bits: u32) -> Option<Self> {
        Self::ALL.get(bits as usize).copied()
    }

    pub fn to_vk(&self) -> vk::PrimitiveTopology {
        match self {
            Topology::PointList => vk::PrimitiveTopology::POINT_LIST,
            Topology::LineList => vk::PrimitiveTopology::LINE_LIST,
            Topology::LineLoop | Topology::LineStrip => vk::PrimitiveTopology::LINE_STRIP,
            Topology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
            Topology::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
            Topology::TriangleFan => vk::PrimitiveTopology::TRIANGLE_FAN,
        }
    }
}

/// Vertex layout half of a pipeline id.
///
/// | bit  | field              |
/// |------|--------------------|
/// | 0    | position           |
/// | 1    | normal             |
/// | 2    | tangent            |
/// | 3..5 | texcoord count 0-3 |
/// | 5..7 | color count 0-3    |
/// | 7..10| [`Topology`]       |
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PrimitivePart(u32);

impl PrimitivePart {
    pub const BITS: u32 = 10;
    pub const MASK: u32 = (1 << Self::BITS) - 1;
    /// Maximum number of texcoord or color streams.
    pub const MAX_STREAMS: u32 = 3;

    const POSITION: u32 = 1 << 0;
    const NORMAL: u32 = 1 << 1;
    const TANGENT: u32 = 1 << 2;
    const TEXCOORD_SHIFT: u32 = 3;
    const COLOR_SHIFT: u32 = 5;
    const TOPOLOGY_SHIFT: u32 = 7;

    /// Part with no vertex attributes.
    pub fn new(topology: Topology) -> Self {
        Self((topology as u32) << Self::TOPOLOGY_SHIFT)
    }

    pub fn from_bits(bits: u32) -> Self {
        Self(bits & Self::MASK)
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn with_position(self) -> Self {
        Self(self.0 | Self::POSITION)
    }

    pub fn with_normal(self) -> Self {
        Self(self.0 | Self::NORMAL)
    }

    pub fn with_tangent(self) -> Self {
        Self(self.0 | Self::TANGENT)
    }

    /// Set the number of texcoord streams. Counts above 3 are clamped.
    pub fn with_texcoords(self, count: u32) -> Self {
        let count = count.min(Self::MAX_STREAMS);
        Self((self.0 & !(0b11 << Self::TEXCOORD_SHIFT)) | (count << Self::TEXCOORD_SHIFT))
    }

    /// Set the number of color streams. Counts above 3 are clamped.
    pub fn with_colors(self, count: u32) -> Self {
        let count = count.min(Self::MAX_STREAMS);
        Self((self.0 & !(0b11 << Self::COLOR_SHIFT)) | (count << Self::COLOR_SHIFT))
    }

    pub fn has_position(&self) -> bool {
        self.0 & Self::POSITION != 0
    }

    pub fn has_normal(&self) -> bool {
        self.0 & Self::NORMAL != 0
    }

    pub fn has_tangent(&self) -> bool {
        self.0 & Self::TANGENT != 0
    }

    pub fn texcoord_count(&self) -> u32 {
        (self.0 >> Self::TEXCOORD_SHIFT) & 0b11
    }

    pub fn color_count(&self) -> u32 {
        (self.0 >> Self::COLOR_SHIFT) & 0b11
    }

    pub fn topology(&self) -> Topology {
        // The field is 3 bits wide and 7 is never written.
        Topology::from_bits((self.0 >> Self::TOPOLOGY_SHIFT) & 0b111).unwrap_or_default()
    }
}

/// Texture slots of a material, in bit order of the [`MaterialPart`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u32)]
pub enum TextureSlot {
    BaseColor = 0,
    MetallicRoughness = 1,
    Normal = 2,
    Occlusion = 3,
    Emissive = 4,
}

impl TextureSlot {
    pub const COUNT: usize = 5;
    pub const ALL: [TextureSlot; Self::COUNT] = [
        TextureSlot::BaseColor,
        TextureSlot::MetallicRoughness,
        TextureSlot::Normal,
        TextureSlot::Occlusion,
        TextureSlot::Emissive,
    ];

    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Binding of this slot's sampler in the material descriptor set. Binding 0 is the material uniform buffer.
    pub fn binding(&self) -> u32 {
        1 + *self as u32
    }
}

/// Material half of a pipeline id: a 2 bit code per [`TextureSlot`], holding the UV channel (0-2) the texture is
/// sampled with, or `0b11` if the slot has no texture.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialPart(u32);

impl Default for MaterialPart {
    fn default() -> Self {
        Self::unbound()
    }
}

impl MaterialPart {
    pub const BITS: u32 = 10;
    pub const MASK: u32 = (1 << Self::BITS) - 1;
    pub const UNBOUND: u32 = 0b11;

    /// Material without any textures.
    pub fn unbound() -> Self {
        Self(Self::MASK)
    }

    pub fn from_bits(bits: u32) -> Self {
        Self(bits & Self::MASK)
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    /// Bind a texture to `slot`, sampled with UV channel `uv_channel`. Channels above 2 are clamped to 2.
    pub fn with_texture(self, slot: TextureSlot, uv_channel: u32) -> Self {
        let shift = slot as u32 * 2;
        let code = uv_channel.min(2);
        Self((self.0 & !(0b11 << shift)) | (code << shift))
    }

    pub fn without_texture(self, slot: TextureSlot) -> Self {
        Self(self.0 | (Self::UNBOUND << (slot as u32 * 2)))
    }

    /// UV channel of the texture bound to `slot`, or None if the slot is unbound.
    pub fn uv_channel(&self, slot: TextureSlot) -> Option<u32> {
        match (self.0 >> (slot as u32 * 2)) & 0b11 {
            Self::UNBOUND => None,
            channel => Some(channel),
        }
    }

    pub fn is_bound(&self, slot: TextureSlot) -> bool {
        self.uv_channel(slot).is_some()
    }

    /// One bit per bound slot. Two materials with the same mask share descriptor set layouts.
    pub fn bound_mask(&self) -> u32 {
        TextureSlot::ALL
            .iter()
            .filter(|slot| self.is_bound(**slot))
            .fold(0, |mask, slot| mask | (1 << *slot as u32))
    }
}

/// Renderer-global part of a pipeline id.
///
/// | bit  | field            |
/// |------|------------------|
/// | 0..3 | [`DisplayMode`]  |
/// | 3..7 | [`Antialiasing`] |
/// | 7    | irradiance map   |
/// | 8    | prefiltered map  |
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExtraPart(u32);

impl ExtraPart {
    pub const BITS: u32 = 9;
    pub const MASK: u32 = (1 << Self::BITS) - 1;

    const ANTIALIASING_SHIFT: u32 = 3;
    const IRRADIANCE: u32 = 1 << 7;
    const PREFILTERED: u32 = 1 << 8;

    pub fn new(display_mode: DisplayMode, antialiasing: Antialiasing) -> Self {
        Self(display_mode as u32 | ((antialiasing as u32) << Self::ANTIALIASING_SHIFT))
    }

    pub fn from_bits(bits: u32) -> Self {
        Self(bits & Self::MASK)
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn with_irradiance_map(self, present: bool) -> Self {
        if present {
            Self(self.0 | Self::IRRADIANCE)
        } else {
            Self(self.0 & !Self::IRRADIANCE)
        }
    }

    pub fn with_prefiltered_map(self, present: bool) -> Self {
        if present {
            Self(self.0 | Self::PREFILTERED)
        } else {
            Self(self.0 & !Self::PREFILTERED)
        }
    }

    pub fn display_mode(&self) -> DisplayMode {
        DisplayMode::from_bits(self.0 & 0b111).unwrap_or_default()
    }

    pub fn antialiasing(&self) -> Antialiasing {
        Antialiasing::from_bits((self.0 >> Self::ANTIALIASING_SHIFT) & 0b1111).unwrap_or_default()
    }

    pub fn has_irradiance_map(&self) -> bool {
        self.0 & Self::IRRADIANCE != 0
    }

    pub fn has_prefiltered_map(&self) -> bool {
        self.0 & Self::PREFILTERED != 0
    }

    /// Whether image based lighting maps are bound in set 3.
    pub fn has_ibl(&self) -> bool {
        self.has_irradiance_map() || self.has_prefiltered_map()
    }
}

/// Bit-packed pipeline variant key. See the [module documentation](self) for the layout.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PipelineId(u32);

const_assert!(PrimitivePart::BITS + MaterialPart::BITS + ExtraPart::BITS < 32);
const_assert!(PipelineId::EXTRA_SHIFT + ExtraPart::BITS <= 31);

impl PipelineId {
    const MATERIAL_SHIFT: u32 = PrimitivePart::BITS;
    const EXTRA_SHIFT: u32 = PrimitivePart::BITS + MaterialPart::BITS;
    const SKYBOX: u32 = 1 << 31;

    pub fn new(primitive: PrimitivePart, material: MaterialPart, extra: ExtraPart) -> Self {
        Self(primitive.bits() | (material.bits() << Self::MATERIAL_SHIFT) | (extra.bits() << Self::EXTRA_SHIFT))
    }

    /// Id of the skybox pipeline. The skybox has no vertex streams and no material, only the display and
    /// antialiasing settings of the extra part are kept.
    pub fn skybox(extra: ExtraPart) -> Self {
        let extra = ExtraPart::new(extra.display_mode(), extra.antialiasing());
        Self(Self::SKYBOX | (extra.bits() << Self::EXTRA_SHIFT))
    }

    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }

    pub fn primitive(&self) -> PrimitivePart {
        PrimitivePart::from_bits(self.0)
    }

    pub fn material(&self) -> MaterialPart {
        MaterialPart::from_bits(self.0 >> Self::MATERIAL_SHIFT)
    }

    pub fn extra(&self) -> ExtraPart {
        ExtraPart::from_bits(self.0 >> Self::EXTRA_SHIFT)
    }

    pub fn is_skybox(&self) -> bool {
        self.0 & Self::SKYBOX != 0
    }
}

/// Formats as 8 lowercase hex digits, the name shader files are stored under.
impl Display for PipelineId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}
