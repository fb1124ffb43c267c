//! SPIR-V shader modules
//!
//! Modules are build-time artifacts: the pipeline builder creates one per
//! stage, links, and lets them drop. Nothing on the session retains them.

use std::ffi::CStr;
use std::fmt;
use std::io::Cursor;
use std::path::Path;

use ash::vk;

use crate::core::config::ShaderConfig;
use crate::foundation::tracking::ResourceKind;
use crate::platform::PlatformSurface;
use crate::render::vulkan::initialization::device::DeviceContext;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// First word of every SPIR-V module
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Programmable stages the builder links
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    /// Vertex stage
    Vertex,
    /// Fragment stage
    Fragment,
    /// Geometry stage
    Geometry,
}

impl ShaderStage {
    /// Vulkan stage bit
    pub fn to_vk(self) -> vk::ShaderStageFlags {
        match self {
            Self::Vertex => vk::ShaderStageFlags::VERTEX,
            Self::Fragment => vk::ShaderStageFlags::FRAGMENT,
            Self::Geometry => vk::ShaderStageFlags::GEOMETRY,
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Vertex => "vertex",
            Self::Fragment => "fragment",
            Self::Geometry => "geometry",
        })
    }
}

/// Decode a SPIR-V blob into words, rejecting anything that is not SPIR-V
pub fn parse_spirv(stage: ShaderStage, bytes: &[u8]) -> VulkanResult<Vec<u32>> {
    if bytes.is_empty() {
        return Err(VulkanError::ShaderModule { stage, reason: "empty bytecode".to_string() });
    }
    let words = ash::util::read_spv(&mut Cursor::new(bytes))
        .map_err(|e| VulkanError::ShaderModule { stage, reason: e.to_string() })?;
    // read_spv byte-swaps big-endian input, so the magic is checked afterwards
    match words.first() {
        Some(&SPIRV_MAGIC) => Ok(words),
        Some(other) => Err(VulkanError::ShaderModule {
            stage,
            reason: format!("bad SPIR-V magic number {other:#010x}"),
        }),
        None => Err(VulkanError::ShaderModule { stage, reason: "empty bytecode".to_string() }),
    }
}

/// One compiled stage
pub struct ShaderModule {
    ctx: DeviceContext,
    module: vk::ShaderModule,
    stage: ShaderStage,
}

impl ShaderModule {
    /// Create shader module from SPIR-V bytecode
    pub fn from_bytes(ctx: &DeviceContext, stage: ShaderStage, bytes: &[u8]) -> VulkanResult<Self> {
        let words = parse_spirv(stage, bytes)?;
        log::debug!("creating {stage} shader module from {} words", words.len());

        let create_info = vk::ShaderModuleCreateInfo::builder().code(&words);
        let module = unsafe { ctx.device().create_shader_module(&create_info, None) }.map_err(|result| {
            log::error!("vkCreateShaderModule failed for {stage} stage: {result:?}");
            VulkanError::ShaderModule { stage, reason: result.to_string() }
        })?;
        ctx.ledger().record_create(ResourceKind::ShaderModule);

        Ok(Self { ctx: ctx.clone(), module, stage })
    }

    /// Module handle
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    /// Stage this module was compiled for
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// Shader stage create info using `entry_point`
    pub fn stage_info(&self, entry_point: &CStr) -> vk::PipelineShaderStageCreateInfo {
        vk::PipelineShaderStageCreateInfo::builder()
            .stage(self.stage.to_vk())
            .module(self.module)
            .name(entry_point)
            .build()
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        log::trace!("destroying {} shader module {:?}", self.stage, self.module);
        unsafe {
            self.ctx.device().destroy_shader_module(self.module, None);
        }
        self.ctx.ledger().record_destroy(ResourceKind::ShaderModule);
    }
}

/// Raw bytecode for each stage, read through the platform
#[derive(Debug, Clone, Default)]
pub struct ShaderBlobs {
    /// Vertex stage bytecode
    pub vertex: Vec<u8>,
    /// Fragment stage bytecode
    pub fragment: Vec<u8>,
    /// Optional geometry stage bytecode
    pub geometry: Option<Vec<u8>>,
}

impl ShaderBlobs {
    /// Read every configured stage; the first unreadable path fails the load
    pub fn load(platform: &dyn PlatformSurface, config: &ShaderConfig) -> VulkanResult<Self> {
        let vertex = platform.read_file(Path::new(&config.vertex_shader_path))?;
        let fragment = platform.read_file(Path::new(&config.fragment_shader_path))?;
        let geometry = config
            .geometry_shader_path
            .as_ref()
            .map(|path| platform.read_file(Path::new(path)))
            .transpose()?;
        Ok(Self { vertex, fragment, geometry })
    }

    /// Stages paired with their bytes, in pipeline order
    pub fn stages(&self) -> Vec<(ShaderStage, &[u8])> {
        let mut stages = vec![(ShaderStage::Vertex, self.vertex.as_slice())];
        if let Some(geometry) = &self.geometry {
            stages.push((ShaderStage::Geometry, geometry.as_slice()));
        }
        stages.push((ShaderStage::Fragment, self.fragment.as_slice()));
        stages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spirv_bytes(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn test_parse_spirv_accepts_magic() {
        let bytes = spirv_bytes(&[SPIRV_MAGIC, 0x0001_0000, 0, 1, 0]);
        let words = parse_spirv(ShaderStage::Vertex, &bytes).unwrap();
        assert_eq!(words.len(), 5);
        assert_eq!(words[0], SPIRV_MAGIC);
    }

    #[test]
    fn test_parse_spirv_rejects_bad_input() {
        let err = parse_spirv(ShaderStage::Fragment, &[]).unwrap_err();
        assert!(err.to_string().contains("fragment"));

        let err = parse_spirv(ShaderStage::Vertex, &[1, 2, 3]).unwrap_err();
        assert!(matches!(err, VulkanError::ShaderModule { stage: ShaderStage::Vertex, .. }));

        let err = parse_spirv(ShaderStage::Geometry, &spirv_bytes(&[0xdead_beef, 0])).unwrap_err();
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn test_stage_order_includes_geometry() {
        let blobs = ShaderBlobs { vertex: vec![1], fragment: vec![2], geometry: Some(vec![3]) };
        let order: Vec<ShaderStage> = blobs.stages().into_iter().map(|(s, _)| s).collect();
        assert_eq!(order, vec![ShaderStage::Vertex, ShaderStage::Geometry, ShaderStage::Fragment]);
        assert_eq!(ShaderStage::Geometry.to_vk(), vk::ShaderStageFlags::GEOMETRY);
    }
}
