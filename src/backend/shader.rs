// Shader module loading
//
// Vulkan consumes SPIR-V bytecode. The triangle shaders are compiled by
// build.rs and read from disk at startup; the modules only live until the
// pipeline is linked.

use super::VulkanDevice;
use crate::error::ResourceError;
use ash::vk;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

/// Read a whole file, tagging failures with the path
pub fn read_binary_file(path: &Path) -> Result<Vec<u8>, ResourceError> {
    std::fs::read(path).map_err(|source| ResourceError::ShaderLoad {
        path: path.to_path_buf(),
        source,
    })
}

/// Reinterpret raw bytes as SPIR-V words.
///
/// `read_spv` handles alignment and byte order, and rejects lengths that are
/// not a multiple of four.
pub fn decode_spirv(path: &Path, bytes: &[u8]) -> Result<Vec<u32>, ResourceError> {
    ash::util::read_spv(&mut Cursor::new(bytes)).map_err(|source| ResourceError::InvalidShader {
        path: path.to_path_buf(),
        source,
    })
}

pub struct ShaderModule {
    pub module: vk::ShaderModule,
    device: Arc<VulkanDevice>,
}

impl ShaderModule {
    pub fn load(device: Arc<VulkanDevice>, path: &Path) -> Result<Self, ResourceError> {
        let bytes = read_binary_file(path)?;
        let code = decode_spirv(path, &bytes)?;

        let create_info = vk::ShaderModuleCreateInfo::builder().code(&code);

        let module = unsafe { device.device.create_shader_module(&create_info, None) }
            .map_err(ResourceError::ShaderModule)?;

        log::debug!("Loaded shader {} ({} bytes)", path.display(), bytes.len());

        Ok(Self { module, device })
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_shader_module(self.module, None);
        }
    }
}
