use ash::vk;

use atrium_render_vulkan_core::vulkan::memory::{MemoryError, upload_device_local_buffer};

use crate::scene::geometry::SceneVertex;

/// Device-local vertex/index pair for a standalone mesh (sky sphere, screen
/// quads). The owner destroys it before the device goes away.
pub struct MeshBuffer {
    pub vertex_buffer: vk::Buffer,
    vertex_memory: vk::DeviceMemory,
    pub index_buffer: vk::Buffer,
    index_memory: vk::DeviceMemory,
    pub index_count: u32,
}

impl MeshBuffer {
    pub fn upload(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: &ash::Device,
        pool: vk::CommandPool,
        queue: vk::Queue,
        vertices: &[SceneVertex],
        indices: &[u32],
    ) -> Result<Self, MemoryError> {
        let (vertex_buffer, vertex_memory) = upload_device_local_buffer(
            instance,
            physical_device,
            device,
            pool,
            queue,
            vertices,
            vk::BufferUsageFlags::VERTEX_BUFFER,
        )?;
        let upload_indices = upload_device_local_buffer(
            instance,
            physical_device,
            device,
            pool,
            queue,
            indices,
            vk::BufferUsageFlags::INDEX_BUFFER,
        );
        let (index_buffer, index_memory) = match upload_indices {
            Ok(pair) => pair,
            Err(e) => {
                unsafe {
                    device.destroy_buffer(vertex_buffer, None);
                    device.free_memory(vertex_memory, None);
                }
                return Err(e);
            }
        };

        Ok(Self {
            vertex_buffer,
            vertex_memory,
            index_buffer,
            index_memory,
            index_count: indices.len() as u32,
        })
    }

    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_buffer(self.vertex_buffer, None);
            device.free_memory(self.vertex_memory, None);
            device.destroy_buffer(self.index_buffer, None);
            device.free_memory(self.index_memory, None);
        }
    }
}

/// Index count of the full-screen quad at the front of the quad mesh.
pub const FULL_SCREEN_INDEX_COUNT: u32 = 6;

/// Screen-aligned quads: one full-screen quad followed by three unit quads
/// stepping across a 2x2 grid for the attachment previews. `normal.z`
/// carries the G-buffer sampler index for the debug shader.
pub fn generate_screen_quads() -> (Vec<SceneVertex>, Vec<u32>) {
    let mut vertices = Vec::with_capacity(12);
    let mut x = 0.0f32;
    let mut y = 0.0f32;

    for i in 0..3 {
        let corners = [
            ([x + 1.0, y + 1.0, 0.0], [1.0, 1.0]),
            ([x, y + 1.0, 0.0], [0.0, 1.0]),
            ([x, y, 0.0], [0.0, 0.0]),
            ([x + 1.0, y, 0.0], [1.0, 0.0]),
        ];
        for (position, uv) in corners {
            vertices.push(SceneVertex {
                position,
                uv,
                color: [1.0, 1.0, 1.0],
                normal: [0.0, 0.0, i as f32],
                tangent: [0.0, 0.0, 0.0],
            });
        }
        x += 1.0;
        if x > 1.0 {
            x = 0.0;
            y += 1.0;
        }
    }

    let mut indices: Vec<u32> = vec![0, 1, 2, 2, 3, 0];
    for quad in 0..3u32 {
        indices.extend([0, 1, 2, 2, 3, 0].map(|i| quad * 4 + i));
    }

    (vertices, indices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quads_cover_three_preview_slots() {
        let (vertices, indices) = generate_screen_quads();
        assert_eq!(vertices.len(), 12);
        assert_eq!(indices.len(), 24);
        assert!(indices.iter().all(|&i| (i as usize) < vertices.len()));
    }

    #[test]
    fn full_screen_quad_uses_the_first_quad() {
        let (_, indices) = generate_screen_quads();
        assert_eq!(&indices[..FULL_SCREEN_INDEX_COUNT as usize], &[0, 1, 2, 2, 3, 0]);
    }

    #[test]
    fn normals_carry_the_sampler_index() {
        let (vertices, _) = generate_screen_quads();
        for (i, chunk) in vertices.chunks(4).enumerate() {
            assert!(chunk.iter().all(|v| v.normal[2] == i as f32));
        }
    }

    #[test]
    fn quads_step_across_the_grid() {
        let (vertices, _) = generate_screen_quads();
        // Quad 0 at (0,0), quad 1 at (1,0), quad 2 at (0,1).
        assert_eq!(vertices[2].position, [0.0, 0.0, 0.0]);
        assert_eq!(vertices[6].position, [1.0, 0.0, 0.0]);
        assert_eq!(vertices[10].position, [0.0, 1.0, 0.0]);
    }
}
