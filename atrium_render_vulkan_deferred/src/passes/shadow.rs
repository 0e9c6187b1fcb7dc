use ash::vk;

use crate::config::{DEPTH_BIAS_CONSTANT, DEPTH_BIAS_SLOPE, LIGHT_COUNT};
use crate::passes::{
    CommandState, PassError, allocate_command_buffers, full_scissor, full_viewport,
};
use crate::passes::draw_plan::{DrawOp, PassKind, build_draw_list};
use crate::scene::store::GeometryStore;
use crate::targets::ShadowTargets;

/// Depth-only passes, one prerecorded command buffer per light. The light
/// index reaches the vertex shader as a push constant selecting its
/// light-space matrix.
pub struct ShadowPass {
    device: ash::Device,
    pub command_buffers: Vec<vk::CommandBuffer>,
    pub state: CommandState,
}

impl ShadowPass {
    pub fn new(device: &ash::Device, pool: vk::CommandPool) -> Result<Self, PassError> {
        let command_buffers = allocate_command_buffers(device, pool, LIGHT_COUNT as u32)?;
        Ok(Self {
            device: device.clone(),
            command_buffers,
            state: CommandState::default(),
        })
    }

    pub fn record(
        &mut self,
        targets: &ShadowTargets,
        pipeline: vk::Pipeline,
        pipeline_layout: vk::PipelineLayout,
        descriptor_set: vk::DescriptorSet,
        store: &GeometryStore,
    ) -> Result<(), PassError> {
        let draws: Vec<DrawOp> = build_draw_list(PassKind::Shadow, &store.submeshes);
        let extent = vk::Extent2D {
            width: targets.dim,
            height: targets.dim,
        };
        let clear_value = vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: 1.0,
                stencil: 0,
            },
        };

        for (light_index, (&command_buffer, target)) in self
            .command_buffers
            .iter()
            .zip(&targets.targets)
            .enumerate()
        {
            let begin_info = vk::CommandBufferBeginInfo::default();
            unsafe {
                self.device
                    .begin_command_buffer(command_buffer, &begin_info)
                    .map_err(|e| PassError::RecordFailed(e.to_string()))?;

                self.device.cmd_set_viewport(
                    command_buffer,
                    0,
                    std::slice::from_ref(&full_viewport(extent)),
                );
                self.device.cmd_set_scissor(
                    command_buffer,
                    0,
                    std::slice::from_ref(&full_scissor(extent)),
                );
                self.device.cmd_set_depth_bias(
                    command_buffer,
                    DEPTH_BIAS_CONSTANT,
                    0.0,
                    DEPTH_BIAS_SLOPE,
                );

                let render_pass_begin = vk::RenderPassBeginInfo::default()
                    .render_pass(targets.render_pass)
                    .framebuffer(target.framebuffer)
                    .render_area(vk::Rect2D::default().extent(extent))
                    .clear_values(std::slice::from_ref(&clear_value));
                let subpass_begin =
                    vk::SubpassBeginInfo::default().contents(vk::SubpassContents::INLINE);
                self.device.cmd_begin_render_pass2(
                    command_buffer,
                    &render_pass_begin,
                    &subpass_begin,
                );

                self.device.cmd_bind_pipeline(
                    command_buffer,
                    vk::PipelineBindPoint::GRAPHICS,
                    pipeline,
                );
                self.device.cmd_bind_descriptor_sets(
                    command_buffer,
                    vk::PipelineBindPoint::GRAPHICS,
                    pipeline_layout,
                    0,
                    std::slice::from_ref(&descriptor_set),
                    &[],
                );
                self.device.cmd_push_constants(
                    command_buffer,
                    pipeline_layout,
                    vk::ShaderStageFlags::VERTEX,
                    0,
                    &(light_index as u32).to_ne_bytes(),
                );

                if let Some((vertex_buffer, index_buffer)) = store.buffers() {
                    self.device.cmd_bind_vertex_buffers(
                        command_buffer,
                        0,
                        &[vertex_buffer],
                        &[0],
                    );
                    self.device.cmd_bind_index_buffer(
                        command_buffer,
                        index_buffer,
                        0,
                        vk::IndexType::UINT32,
                    );
                    for draw in &draws {
                        self.device.cmd_draw_indexed(
                            command_buffer,
                            draw.index_count,
                            1,
                            draw.index_base,
                            0,
                            0,
                        );
                    }
                }

                let subpass_end = vk::SubpassEndInfo::default();
                self.device.cmd_end_render_pass2(command_buffer, &subpass_end);
                self.device
                    .end_command_buffer(command_buffer)
                    .map_err(|e| PassError::RecordFailed(e.to_string()))?;
            }
        }

        self.state.advance(CommandState::Recorded);
        Ok(())
    }
}
