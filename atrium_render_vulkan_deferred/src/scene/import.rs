use ash::vk;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("Failed to load scene: {0}")]
    SceneLoadFailed(String),

    #[error("Failed to load texture '{name}': {reason}")]
    TextureLoadFailed { name: String, reason: String },

    #[error("Failed to upload geometry: {0}")]
    GeometryUploadFailed(String),
}

/// One mesh as handed over by the model importer: flat attribute arrays plus
/// triangle indices local to this mesh. Positions and faces are mandatory,
/// the rest may be empty and falls back to defaults on merge.
#[derive(Debug, Clone, Default)]
pub struct ImportedMesh {
    pub positions: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    pub colors: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub tangents: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
    pub material: usize,
}

/// Per-material data from the importer. Texture fields name files relative
/// to the scene's texture directory; `None` means the channel is unassigned.
#[derive(Debug, Clone, Default)]
pub struct ImportedMaterial {
    pub name: String,
    pub diffuse: Option<String>,
    pub roughness: Option<String>,
    pub bump: Option<String>,
    pub metallic: Option<String>,
    pub opacity_mask: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ImportedScene {
    pub meshes: Vec<ImportedMesh>,
    pub materials: Vec<ImportedMaterial>,
}

/// A texture on the GPU. Plain handles; the owning cache destroys them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GpuTexture {
    pub image: vk::Image,
    pub memory: vk::DeviceMemory,
    pub view: vk::ImageView,
    pub sampler: vk::Sampler,
}

impl GpuTexture {
    pub fn descriptor(&self) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo::default()
            .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
            .image_view(self.view)
            .sampler(self.sampler)
    }

    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_sampler(self.sampler, None);
            device.destroy_image_view(self.view, None);
            device.destroy_image(self.image, None);
            device.free_memory(self.memory, None);
        }
    }
}

/// Texture decoding collaborator. Implementations read and upload one file;
/// deduplication happens in the cache in front of them.
pub trait TextureSource {
    fn load(&mut self, file_name: &str) -> Result<GpuTexture, AssetError>;
}
