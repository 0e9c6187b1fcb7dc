use std::io::Cursor;
use std::path::{Path, PathBuf};

use ash::vk;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShaderError {
    #[error("Failed to read shader {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Shader {path} is not valid SPIR-V: {source}")]
    InvalidSpirv {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to create shader module for {path}: {result}")]
    CreateModuleFailed { path: PathBuf, result: String },
}

/// Loads a compiled SPIR-V file and wraps it in a shader module.
pub fn load_shader_module(
    device: &ash::Device,
    path: &Path,
) -> Result<vk::ShaderModule, ShaderError> {
    let code = std::fs::read(path).map_err(|source| ShaderError::ReadFailed {
        path: path.to_path_buf(),
        source,
    })?;

    let code_u32 =
        ash::util::read_spv(&mut Cursor::new(&code)).map_err(|source| ShaderError::InvalidSpirv {
            path: path.to_path_buf(),
            source,
        })?;

    let create_info = vk::ShaderModuleCreateInfo::default().code(&code_u32);

    unsafe {
        device
            .create_shader_module(&create_info, None)
            .map_err(|e| ShaderError::CreateModuleFailed {
                path: path.to_path_buf(),
                result: e.to_string(),
            })
    }
}
