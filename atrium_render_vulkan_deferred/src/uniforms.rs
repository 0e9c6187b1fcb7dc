use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec4};

use atrium_render_vulkan_core::vulkan::memory::{
    MemoryError, create_buffer_with_memory, write_mapped,
};

use crate::config::LIGHT_COUNT;
use crate::lights::Light;

/// Projection for the composition vertex shader. Debug display draws into
/// a 2x2 ortho space so the preview quads land in the corners.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CompositionViewBlock {
    pub projection: Mat4,
    pub model: Mat4,
}

pub fn composition_view_block(debug_display: bool) -> CompositionViewBlock {
    let extent = if debug_display { 2.0 } else { 1.0 };
    CompositionViewBlock {
        projection: Mat4::orthographic_rh(0.0, extent, 0.0, extent, -1.0, 1.0),
        model: Mat4::IDENTITY,
    }
}

/// Camera matrices for the geometry pass.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SceneMatricesBlock {
    pub projection: Mat4,
    pub model: Mat4,
    pub view: Mat4,
    pub viewport_dim: Vec2,
    _pad: [f32; 2],
}

pub fn scene_matrices_block(
    projection: Mat4,
    view: Mat4,
    model: Mat4,
    viewport_dim: (f32, f32),
) -> SceneMatricesBlock {
    SceneMatricesBlock {
        projection,
        model,
        view,
        viewport_dim: Vec2::new(viewport_dim.0, viewport_dim.1),
        _pad: [0.0; 2],
    }
}

/// Light-space matrices consumed by the shadow vertex shader, indexed by the
/// per-pass push constant.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ShadowMatricesBlock {
    pub light_space: [Mat4; LIGHT_COUNT],
}

pub fn shadow_matrices_block(lights: &[Light; LIGHT_COUNT]) -> ShadowMatricesBlock {
    ShadowMatricesBlock {
        light_space: lights.map(|light| light.light_space),
    }
}

/// Lights block for the composition fragment shader.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LightsBlock {
    pub lights: [Light; LIGHT_COUNT],
    pub view_pos: Vec4,
    pub view: Mat4,
    pub model: Mat4,
}

pub fn lights_block(lights: &[Light; LIGHT_COUNT], view_pos: Vec4, view: Mat4) -> LightsBlock {
    LightsBlock {
        lights: *lights,
        view_pos,
        view,
        model: Mat4::IDENTITY,
    }
}

/// Host-visible uniform buffer. Updates always rewrite the whole block.
pub struct UniformBuffer {
    pub buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
}

impl UniformBuffer {
    pub fn new<T: Pod>(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: &ash::Device,
    ) -> Result<Self, MemoryError> {
        let size = std::mem::size_of::<T>() as vk::DeviceSize;
        let (buffer, memory) = create_buffer_with_memory(
            instance,
            physical_device,
            device,
            size,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        Ok(Self {
            buffer,
            memory,
            size,
        })
    }

    pub fn write<T: Pod>(&self, device: &ash::Device, block: &T) -> Result<(), MemoryError> {
        debug_assert_eq!(std::mem::size_of::<T>() as vk::DeviceSize, self.size);
        write_mapped(device, self.memory, std::slice::from_ref(block))
    }

    pub fn descriptor(&self) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo::default()
            .buffer(self.buffer)
            .offset(0)
            .range(self.size)
    }

    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_buffer(self.buffer, None);
            device.free_memory(self.memory, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lights::default_lights;
    use glam::Vec3;

    #[test]
    fn composition_view_block_is_idempotent() {
        let a = composition_view_block(false);
        let b = composition_view_block(false);
        assert_eq!(bytemuck::bytes_of(&a), bytemuck::bytes_of(&b));
    }

    #[test]
    fn debug_display_switches_the_ortho_extent() {
        let normal = composition_view_block(false);
        let debug = composition_view_block(true);
        assert_ne!(normal.projection, debug.projection);
        assert_eq!(normal.model, debug.model);
    }

    #[test]
    fn shadow_block_mirrors_light_space_matrices() {
        let lights = default_lights();
        let block = shadow_matrices_block(&lights);
        for (matrix, light) in block.light_space.iter().zip(&lights) {
            assert_eq!(*matrix, light.light_space);
        }
    }

    #[test]
    fn lights_block_carries_view_state() {
        let lights = default_lights();
        let view = Mat4::look_at_rh(Vec3::new(0.0, -5.0, 10.0), Vec3::ZERO, Vec3::Y);
        let block = lights_block(&lights, Vec4::new(0.0, 5.0, -10.0, 0.0), view);
        assert_eq!(block.view, view);
        assert_eq!(block.lights[1], lights[1]);
        // Same inputs, same bytes: safe to compare uploads across frames.
        let again = lights_block(&lights, Vec4::new(0.0, 5.0, -10.0, 0.0), view);
        assert_eq!(bytemuck::bytes_of(&block), bytemuck::bytes_of(&again));
    }

    #[test]
    fn block_sizes_match_std140_layout() {
        assert_eq!(std::mem::size_of::<CompositionViewBlock>(), 128);
        assert_eq!(std::mem::size_of::<SceneMatricesBlock>(), 208);
        assert_eq!(std::mem::size_of::<ShadowMatricesBlock>(), 192);
        assert_eq!(std::mem::size_of::<LightsBlock>(), 3 * 128 + 16 + 128);
    }
}
