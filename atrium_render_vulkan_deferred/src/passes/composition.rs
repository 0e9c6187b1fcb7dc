use ash::vk;

use crate::meshes::{FULL_SCREEN_INDEX_COUNT, MeshBuffer};
use crate::passes::{CommandState, PassError, allocate_command_buffers, full_scissor};
use crate::targets::PresentTargets;

/// Everything the composition pass binds besides the swapchain framebuffer.
pub struct CompositionBinding<'a> {
    pub pipeline: vk::Pipeline,
    pub pipeline_layout: vk::PipelineLayout,
    pub descriptor_set: vk::DescriptorSet,
    pub quads: &'a MeshBuffer,
    /// Draws the G-buffer inspection quads and shrinks the lit output to the
    /// lower right quadrant when set.
    pub debug_pipeline: Option<vk::Pipeline>,
}

/// The final pass: one prerecorded command buffer per swapchain image,
/// resolving the G-buffer and shadow maps into the presented frame.
pub struct CompositionPass {
    device: ash::Device,
    pub command_buffers: Vec<vk::CommandBuffer>,
    pub state: CommandState,
}

impl CompositionPass {
    pub fn new(
        device: &ash::Device,
        pool: vk::CommandPool,
        image_count: u32,
    ) -> Result<Self, PassError> {
        let command_buffers = allocate_command_buffers(device, pool, image_count)?;
        Ok(Self {
            device: device.clone(),
            command_buffers,
            state: CommandState::default(),
        })
    }

    pub fn record(
        &mut self,
        targets: &PresentTargets,
        binding: &CompositionBinding,
    ) -> Result<(), PassError> {
        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: [0.0, 0.0, 0.2, 0.0],
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        ];
        let extent = targets.extent;

        for (index, &command_buffer) in self.command_buffers.iter().enumerate() {
            let begin_info = vk::CommandBufferBeginInfo::default();
            unsafe {
                self.device
                    .begin_command_buffer(command_buffer, &begin_info)
                    .map_err(|e| PassError::RecordFailed(e.to_string()))?;

                let render_pass_begin = vk::RenderPassBeginInfo::default()
                    .render_pass(targets.render_pass)
                    .framebuffer(targets.framebuffers[index])
                    .render_area(vk::Rect2D::default().extent(extent))
                    .clear_values(&clear_values);
                let subpass_begin =
                    vk::SubpassBeginInfo::default().contents(vk::SubpassContents::INLINE);
                self.device.cmd_begin_render_pass2(
                    command_buffer,
                    &render_pass_begin,
                    &subpass_begin,
                );

                let mut viewport = vk::Viewport {
                    x: 0.0,
                    y: 0.0,
                    width: extent.width as f32,
                    height: extent.height as f32,
                    min_depth: 0.0,
                    max_depth: 1.0,
                };
                self.device.cmd_set_viewport(
                    command_buffer,
                    0,
                    std::slice::from_ref(&viewport),
                );
                self.device.cmd_set_scissor(
                    command_buffer,
                    0,
                    std::slice::from_ref(&full_scissor(extent)),
                );

                self.device.cmd_bind_descriptor_sets(
                    command_buffer,
                    vk::PipelineBindPoint::GRAPHICS,
                    binding.pipeline_layout,
                    0,
                    std::slice::from_ref(&binding.descriptor_set),
                    &[],
                );
                self.device.cmd_bind_vertex_buffers(
                    command_buffer,
                    0,
                    &[binding.quads.vertex_buffer],
                    &[0],
                );
                self.device.cmd_bind_index_buffer(
                    command_buffer,
                    binding.quads.index_buffer,
                    0,
                    vk::IndexType::UINT32,
                );

                if let Some(debug_pipeline) = binding.debug_pipeline {
                    self.device.cmd_bind_pipeline(
                        command_buffer,
                        vk::PipelineBindPoint::GRAPHICS,
                        debug_pipeline,
                    );
                    self.device.cmd_draw_indexed(
                        command_buffer,
                        binding.quads.index_count,
                        1,
                        0,
                        0,
                        0,
                    );

                    viewport.x = extent.width as f32 * 0.5;
                    viewport.y = extent.height as f32 * 0.5;
                    self.device.cmd_set_viewport(
                        command_buffer,
                        0,
                        std::slice::from_ref(&viewport),
                    );
                }

                self.device.cmd_bind_pipeline(
                    command_buffer,
                    vk::PipelineBindPoint::GRAPHICS,
                    binding.pipeline,
                );
                self.device.cmd_draw_indexed(
                    command_buffer,
                    FULL_SCREEN_INDEX_COUNT,
                    1,
                    0,
                    0,
                    0,
                );

                let subpass_end = vk::SubpassEndInfo::default();
                self.device
                    .cmd_end_render_pass2(command_buffer, &subpass_end);
                self.device
                    .end_command_buffer(command_buffer)
                    .map_err(|e| PassError::RecordFailed(e.to_string()))?;
            }
        }

        self.state.advance(CommandState::Recorded);
        Ok(())
    }
}
