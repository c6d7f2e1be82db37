//! Shader code lookup for pipeline variants.
//!
//! Shaders are compiled offline, one vertex and one fragment shader per pipeline id and technique. A
//! [`ShaderLoader`] returns the SPIR-V for a variant, [`SpirvDirectory`] reads it from disk.

use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

use anyhow::Result;
use ash::vk;

use crate::core::error::Error;
use crate::pipeline::id::PipelineId;

const SPIRV_MAGIC: u32 = 0x0723_0203;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn to_vk(&self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }

    /// File name suffix of the stage.
    pub fn extension(&self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vert",
            ShaderStage::Fragment => "frag",
        }
    }
}

impl Display for ShaderStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// Provides SPIR-V code for pipeline variants.
pub trait ShaderLoader {
    /// Load the code for one stage of the variant `id` of `technique`.
    /// # Errors
    /// Fails with [`Error::ShaderNotFound`] if the variant has no shader, or [`Error::InvalidSpirv`] if the code is malformed.
    fn load(&self, technique: &str, id: PipelineId, stage: ShaderStage) -> Result<Vec<u32>>;
}

/// Check the SPIR-V magic number and convert raw bytes to words.
/// # Errors
/// Fails with [`Error::InvalidSpirv`] if the length is not a multiple of 4 or the magic number is missing.
pub fn spirv_from_bytes(name: &str, bytes: &[u8]) -> Result<Vec<u32>> {
    if bytes.len() % 4 != 0 || bytes.len() < 20 {
        return Err(Error::InvalidSpirv(name.to_owned()).into());
    }
    let code: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|word| u32::from_le_bytes([word[0], word[1], word[2], word[3]]))
        .collect();
    match code.first() {
        Some(&SPIRV_MAGIC) => Ok(code),
        Some(magic) if magic.swap_bytes() == SPIRV_MAGIC => Ok(code.into_iter().map(u32::swap_bytes).collect()),
        _ => Err(Error::InvalidSpirv(name.to_owned()).into()),
    }
}

/// Loads `<root>/<technique>/<id>.<vert|frag>.spv`, where `<id>` is the pipeline id as 8 hex digits.
#[derive(Debug, Clone)]
pub struct SpirvDirectory {
    root: PathBuf,
}

impl SpirvDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, technique: &str, id: PipelineId, stage: ShaderStage) -> PathBuf {
        self.root.join(technique).join(format!("{id}.{stage}.spv"))
    }
}

impl ShaderLoader for SpirvDirectory {
    fn load(&self, technique: &str, id: PipelineId, stage: ShaderStage) -> Result<Vec<u32>> {
        let path = self.path(technique, id, stage);
        let name = path.display().to_string();
        let bytes = std::fs::read(&path).map_err(|e| {
            warn!("Could not read shader {}: {}", name, e);
            Error::ShaderNotFound(name.clone())
        })?;
        spirv_from_bytes(&name, &bytes)
    }
}
