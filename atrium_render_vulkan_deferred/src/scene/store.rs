use ash::vk;
use thiserror::Error;

use atrium_render_vulkan_core::vulkan::memory::MemoryError;

use crate::meshes::MeshBuffer;
use crate::scene::geometry::{MergedGeometry, SubmeshRange, merge_submeshes};
use crate::scene::import::{AssetError, ImportedScene, TextureSource};
use crate::scene::material::{
    DummyTextures, MaterialFlags, SceneMaterial, TextureCache, resolve_materials,
};
use crate::uniforms::UniformBuffer;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error("Failed to create scene descriptor pool: {0}")]
    CreateDescriptorPoolFailed(String),

    #[error("Failed to allocate scene descriptor sets: {0}")]
    AllocateDescriptorSetsFailed(String),
}

/// One drawable window into the merged buffers, with its material bound as
/// a descriptor set. Immutable after load.
#[derive(Debug, Clone, Copy)]
pub struct Submesh {
    pub index_base: u32,
    pub index_count: u32,
    pub flags: MaterialFlags,
    pub descriptor_set: vk::DescriptorSet,
}

/// Pairs every submesh range with its material's flags. A range pointing at
/// a missing material gets default flags so it still draws as solid.
pub fn pair_ranges_with_materials(
    ranges: &[SubmeshRange],
    materials: &[SceneMaterial],
) -> Vec<(SubmeshRange, MaterialFlags)> {
    ranges
        .iter()
        .map(|&range| {
            let flags = match materials.get(range.material) {
                Some(material) => material.flags,
                None => {
                    log::warn!(
                        "Submesh references missing material {}, treating as solid",
                        range.material
                    );
                    MaterialFlags::default()
                }
            };
            (range, flags)
        })
        .collect()
}

/// The scene on the GPU: one global vertex/index buffer pair, the texture
/// cache, and one descriptor set per submesh. An unloadable scene produces
/// an empty store that draws nothing.
pub struct GeometryStore {
    device: ash::Device,
    geometry: Option<MeshBuffer>,
    pub submeshes: Vec<Submesh>,
    textures: TextureCache,
    descriptor_pool: vk::DescriptorPool,
}

impl GeometryStore {
    #[allow(clippy::too_many_arguments)]
    pub fn load(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: &ash::Device,
        pool: vk::CommandPool,
        queue: vk::Queue,
        submesh_layout: vk::DescriptorSetLayout,
        scene_matrices: &UniformBuffer,
        scene: Result<ImportedScene, AssetError>,
        source: &mut dyn TextureSource,
    ) -> Result<Self, StoreError> {
        let scene = match scene {
            Ok(scene) if !scene.meshes.is_empty() => scene,
            Ok(_) => {
                log::error!("Scene import produced no meshes, rendering empty scene");
                return Ok(Self::empty(device));
            }
            Err(e) => {
                log::error!("Scene import failed: {}, rendering empty scene", e);
                return Ok(Self::empty(device));
            }
        };

        let mut textures = TextureCache::new();
        let dummies = match DummyTextures::load(&mut textures, source) {
            Ok(dummies) => dummies,
            Err(e) => {
                log::error!("Fallback textures unavailable: {}, rendering empty scene", e);
                textures.destroy_all(device);
                return Ok(Self::empty(device));
            }
        };

        let materials = resolve_materials(&scene.materials, &mut textures, source, &dummies);
        let merged: MergedGeometry = merge_submeshes(&scene.meshes);
        log::info!(
            "Scene: {} submeshes, {} vertices, {} indices, {} textures",
            merged.ranges.len(),
            merged.vertices.len(),
            merged.indices.len(),
            textures.len()
        );

        let geometry = MeshBuffer::upload(
            instance,
            physical_device,
            device,
            pool,
            queue,
            &merged.vertices,
            &merged.indices,
        )?;

        let paired = pair_ranges_with_materials(&merged.ranges, &materials);

        let submesh_count = paired.len() as u32;
        let pool_sizes = [
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::UNIFORM_BUFFER)
                .descriptor_count(submesh_count),
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .descriptor_count(submesh_count * 4),
        ];
        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .pool_sizes(&pool_sizes)
            .max_sets(submesh_count);
        let descriptor_pool = unsafe {
            device
                .create_descriptor_pool(&pool_info, None)
                .map_err(|e| StoreError::CreateDescriptorPoolFailed(e.to_string()))?
        };

        let matrices_info = [scene_matrices.descriptor()];
        let mut submeshes = Vec::with_capacity(paired.len());
        for (range, flags) in paired {
            let layouts = [submesh_layout];
            let alloc_info = vk::DescriptorSetAllocateInfo::default()
                .descriptor_pool(descriptor_pool)
                .set_layouts(&layouts);
            let descriptor_set = unsafe {
                device
                    .allocate_descriptor_sets(&alloc_info)
                    .map_err(|e| StoreError::AllocateDescriptorSetsFailed(e.to_string()))?[0]
            };

            let material = materials.get(range.material);
            let texture_of = |pick: fn(&SceneMaterial) -> crate::scene::import::GpuTexture,
                              fallback| {
                material.map(pick).unwrap_or(fallback)
            };
            let image_infos = [
                [texture_of(|m| m.diffuse, dummies.diffuse).descriptor()],
                [texture_of(|m| m.roughness, dummies.roughness).descriptor()],
                [texture_of(|m| m.bump, dummies.bump).descriptor()],
                [texture_of(|m| m.metallic, dummies.metallic).descriptor()],
            ];

            let mut writes = vec![
                vk::WriteDescriptorSet::default()
                    .dst_set(descriptor_set)
                    .dst_binding(0)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(&matrices_info),
            ];
            for (binding, info) in image_infos.iter().enumerate() {
                writes.push(
                    vk::WriteDescriptorSet::default()
                        .dst_set(descriptor_set)
                        .dst_binding(binding as u32 + 1)
                        .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                        .image_info(info),
                );
            }
            unsafe {
                device.update_descriptor_sets(&writes, &[]);
            }

            submeshes.push(Submesh {
                index_base: range.index_base,
                index_count: range.index_count,
                flags,
                descriptor_set,
            });
        }

        Ok(Self {
            device: device.clone(),
            geometry: Some(geometry),
            submeshes,
            textures,
            descriptor_pool,
        })
    }

    pub fn empty(device: &ash::Device) -> Self {
        Self {
            device: device.clone(),
            geometry: None,
            submeshes: Vec::new(),
            textures: TextureCache::new(),
            descriptor_pool: vk::DescriptorPool::null(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.geometry.is_none()
    }

    pub fn buffers(&self) -> Option<(vk::Buffer, vk::Buffer)> {
        self.geometry
            .as_ref()
            .map(|g| (g.vertex_buffer, g.index_buffer))
    }
}

impl Drop for GeometryStore {
    fn drop(&mut self) {
        unsafe {
            if self.descriptor_pool != vk::DescriptorPool::null() {
                self.device
                    .destroy_descriptor_pool(self.descriptor_pool, None);
            }
        }
        if let Some(geometry) = &self.geometry {
            geometry.destroy(&self.device);
        }
        self.textures.destroy_all(&self.device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::import::GpuTexture;

    fn material(name: &str, has_alpha: bool) -> SceneMaterial {
        SceneMaterial {
            name: name.into(),
            diffuse: GpuTexture::default(),
            roughness: GpuTexture::default(),
            bump: GpuTexture::default(),
            metallic: GpuTexture::default(),
            flags: MaterialFlags {
                has_alpha,
                ..Default::default()
            },
            pipeline: if has_alpha { "scene.blend" } else { "scene.solid" },
        }
    }

    #[test]
    fn ranges_pick_up_their_material_flags() {
        let ranges = [
            SubmeshRange {
                index_base: 0,
                index_count: 3,
                material: 1,
            },
            SubmeshRange {
                index_base: 3,
                index_count: 6,
                material: 0,
            },
        ];
        let materials = [material("solid", false), material("leaves", true)];
        let paired = pair_ranges_with_materials(&ranges, &materials);
        assert!(paired[0].1.has_alpha);
        assert!(!paired[1].1.has_alpha);
    }

    #[test]
    fn missing_material_defaults_to_solid() {
        let ranges = [SubmeshRange {
            index_base: 0,
            index_count: 3,
            material: 7,
        }];
        let paired = pair_ranges_with_materials(&ranges, &[]);
        assert_eq!(paired[0].1, MaterialFlags::default());
    }
}
