use std::collections::HashMap;

use ash::vk;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Failed to create pipeline layout '{name}': {result}")]
    CreatePipelineLayoutFailed { name: String, result: String },

    #[error("Failed to create pipeline '{name}': {result}")]
    CreatePipelineFailed { name: String, result: String },

    #[error("Failed to create descriptor set layout '{name}': {result}")]
    CreateDescriptorSetLayoutFailed { name: String, result: String },

    #[error("Failed to create descriptor pool: {0}")]
    CreateDescriptorPoolFailed(String),

    #[error("Failed to allocate descriptor set '{name}': {result}")]
    AllocateDescriptorSetFailed { name: String, result: String },
}

/// Name-keyed handle map. `get` hands back the null handle for unknown names
/// so lookups never panic; callers that must distinguish use `present`.
/// Inserting an existing name overwrites without releasing, so names must be
/// unique per registry.
#[derive(Debug, Default)]
pub struct ResourceMap<T> {
    entries: HashMap<String, T>,
}

impl<T: Copy + Default> ResourceMap<T> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> T {
        self.entries.get(name).copied().unwrap_or_default()
    }

    pub fn present(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn insert(&mut self, name: &str, value: T) {
        self.entries.insert(name.to_owned(), value);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.values()
    }
}

pub struct PipelineLayoutRegistry {
    device: ash::Device,
    map: ResourceMap<vk::PipelineLayout>,
}

impl PipelineLayoutRegistry {
    pub fn new(device: ash::Device) -> Self {
        Self {
            device,
            map: ResourceMap::new(),
        }
    }

    pub fn add(
        &mut self,
        name: &str,
        info: &vk::PipelineLayoutCreateInfo,
    ) -> Result<vk::PipelineLayout, RegistryError> {
        let layout = unsafe {
            self.device.create_pipeline_layout(info, None).map_err(|e| {
                RegistryError::CreatePipelineLayoutFailed {
                    name: name.to_owned(),
                    result: e.to_string(),
                }
            })?
        };
        self.map.insert(name, layout);
        Ok(layout)
    }

    pub fn get(&self, name: &str) -> vk::PipelineLayout {
        self.map.get(name)
    }
}

impl Drop for PipelineLayoutRegistry {
    fn drop(&mut self) {
        unsafe {
            for &layout in self.map.values() {
                self.device.destroy_pipeline_layout(layout, None);
            }
        }
    }
}

pub struct PipelineRegistry {
    device: ash::Device,
    map: ResourceMap<vk::Pipeline>,
}

impl PipelineRegistry {
    pub fn new(device: ash::Device) -> Self {
        Self {
            device,
            map: ResourceMap::new(),
        }
    }

    pub fn add_graphics(
        &mut self,
        name: &str,
        cache: vk::PipelineCache,
        info: &vk::GraphicsPipelineCreateInfo,
    ) -> Result<vk::Pipeline, RegistryError> {
        let pipelines = unsafe {
            self.device
                .create_graphics_pipelines(cache, std::slice::from_ref(info), None)
                .map_err(|(_, e)| RegistryError::CreatePipelineFailed {
                    name: name.to_owned(),
                    result: e.to_string(),
                })?
        };
        let pipeline = pipelines[0];
        // Rebuilding under an existing name happens after a drain, so the old
        // pipeline is no longer in flight.
        if self.map.present(name) {
            unsafe {
                self.device.destroy_pipeline(self.map.get(name), None);
            }
        }
        self.map.insert(name, pipeline);
        Ok(pipeline)
    }

    pub fn get(&self, name: &str) -> vk::Pipeline {
        self.map.get(name)
    }
}

impl Drop for PipelineRegistry {
    fn drop(&mut self) {
        unsafe {
            for &pipeline in self.map.values() {
                self.device.destroy_pipeline(pipeline, None);
            }
        }
    }
}

pub struct DescriptorSetLayoutRegistry {
    device: ash::Device,
    map: ResourceMap<vk::DescriptorSetLayout>,
}

impl DescriptorSetLayoutRegistry {
    pub fn new(device: ash::Device) -> Self {
        Self {
            device,
            map: ResourceMap::new(),
        }
    }

    pub fn add(
        &mut self,
        name: &str,
        bindings: &[vk::DescriptorSetLayoutBinding],
    ) -> Result<vk::DescriptorSetLayout, RegistryError> {
        let info = vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings);
        let layout = unsafe {
            self.device
                .create_descriptor_set_layout(&info, None)
                .map_err(|e| RegistryError::CreateDescriptorSetLayoutFailed {
                    name: name.to_owned(),
                    result: e.to_string(),
                })?
        };
        self.map.insert(name, layout);
        Ok(layout)
    }

    pub fn get(&self, name: &str) -> vk::DescriptorSetLayout {
        self.map.get(name)
    }
}

impl Drop for DescriptorSetLayoutRegistry {
    fn drop(&mut self) {
        unsafe {
            for &layout in self.map.values() {
                self.device.destroy_descriptor_set_layout(layout, None);
            }
        }
    }
}

/// Owns the descriptor pool; every set allocated through it is returned to
/// the pool when the registry drops.
pub struct DescriptorSetRegistry {
    device: ash::Device,
    pool: vk::DescriptorPool,
    map: ResourceMap<vk::DescriptorSet>,
}

impl DescriptorSetRegistry {
    pub fn new(
        device: ash::Device,
        pool_sizes: &[vk::DescriptorPoolSize],
        max_sets: u32,
    ) -> Result<Self, RegistryError> {
        let info = vk::DescriptorPoolCreateInfo::default()
            .pool_sizes(pool_sizes)
            .max_sets(max_sets);
        let pool = unsafe {
            device
                .create_descriptor_pool(&info, None)
                .map_err(|e| RegistryError::CreateDescriptorPoolFailed(e.to_string()))?
        };
        Ok(Self {
            device,
            pool,
            map: ResourceMap::new(),
        })
    }

    pub fn allocate(
        &mut self,
        name: &str,
        layout: vk::DescriptorSetLayout,
    ) -> Result<vk::DescriptorSet, RegistryError> {
        let layouts = [layout];
        let info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);
        let sets = unsafe {
            self.device.allocate_descriptor_sets(&info).map_err(|e| {
                RegistryError::AllocateDescriptorSetFailed {
                    name: name.to_owned(),
                    result: e.to_string(),
                }
            })?
        };
        let set = sets[0];
        self.map.insert(name, set);
        Ok(set)
    }

    pub fn get(&self, name: &str) -> vk::DescriptorSet {
        self.map.get(name)
    }
}

impl Drop for DescriptorSetRegistry {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_pool(self.pool, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_name_yields_null_handle() {
        let map: ResourceMap<vk::Pipeline> = ResourceMap::new();
        assert_eq!(map.get("nope"), vk::Pipeline::null());
        assert!(!map.present("nope"));
    }

    #[test]
    fn insert_then_get_round_trips() {
        let mut map: ResourceMap<u64> = ResourceMap::new();
        map.insert("solid", 7);
        assert!(map.present("solid"));
        assert_eq!(map.get("solid"), 7);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn insert_same_name_overwrites() {
        let mut map: ResourceMap<u64> = ResourceMap::new();
        map.insert("a", 1);
        map.insert("a", 2);
        assert_eq!(map.get("a"), 2);
        assert_eq!(map.len(), 1);
    }
}
