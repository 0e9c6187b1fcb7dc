use ash::vk;

use crate::meshes::MeshBuffer;
use crate::passes::{
    CommandState, PassError, allocate_command_buffers, full_scissor, full_viewport,
};
use crate::passes::draw_plan::{PassKind, build_draw_list};
use crate::scene::store::GeometryStore;
use crate::targets::GeometryTarget;

/// Background sphere drawn before the scene fills the G-buffer.
pub struct SkyBinding<'a> {
    pub pipeline: vk::Pipeline,
    pub pipeline_layout: vk::PipelineLayout,
    pub descriptor_set: vk::DescriptorSet,
    pub mesh: &'a MeshBuffer,
}

/// The MRT pass: one prerecorded command buffer writing position, normal and
/// packed color into the G-buffer. Sky sphere first, then opaque submeshes,
/// then alpha-masked ones with the blend pipeline.
pub struct GeometryPass {
    device: ash::Device,
    pub command_buffer: vk::CommandBuffer,
    pub state: CommandState,
}

impl GeometryPass {
    pub fn new(device: &ash::Device, pool: vk::CommandPool) -> Result<Self, PassError> {
        let command_buffer = allocate_command_buffers(device, pool, 1)?[0];
        Ok(Self {
            device: device.clone(),
            command_buffer,
            state: CommandState::default(),
        })
    }

    pub fn record(
        &mut self,
        target: &GeometryTarget,
        sky: Option<&SkyBinding>,
        solid_pipeline: vk::Pipeline,
        blend_pipeline: vk::Pipeline,
        scene_layout: vk::PipelineLayout,
        store: &GeometryStore,
    ) -> Result<(), PassError> {
        let opaque = build_draw_list(PassKind::GeometryOpaque, &store.submeshes);
        let blend = build_draw_list(PassKind::GeometryBlend, &store.submeshes);

        // The packed color attachment is an integer format and clears as one.
        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: [0.0; 4],
                },
            },
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: [0.0; 4],
                },
            },
            vk::ClearValue {
                color: vk::ClearColorValue { uint32: [0; 4] },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        ];

        let command_buffer = self.command_buffer;
        let begin_info = vk::CommandBufferBeginInfo::default();
        unsafe {
            self.device
                .begin_command_buffer(command_buffer, &begin_info)
                .map_err(|e| PassError::RecordFailed(e.to_string()))?;

            let render_pass_begin = vk::RenderPassBeginInfo::default()
                .render_pass(target.render_pass)
                .framebuffer(target.framebuffer)
                .render_area(vk::Rect2D::default().extent(target.extent))
                .clear_values(&clear_values);
            let subpass_begin =
                vk::SubpassBeginInfo::default().contents(vk::SubpassContents::INLINE);
            self.device
                .cmd_begin_render_pass2(command_buffer, &render_pass_begin, &subpass_begin);

            self.device.cmd_set_viewport(
                command_buffer,
                0,
                std::slice::from_ref(&full_viewport(target.extent)),
            );
            self.device.cmd_set_scissor(
                command_buffer,
                0,
                std::slice::from_ref(&full_scissor(target.extent)),
            );

            if let Some(sky) = sky {
                self.device.cmd_bind_pipeline(
                    command_buffer,
                    vk::PipelineBindPoint::GRAPHICS,
                    sky.pipeline,
                );
                self.device.cmd_bind_descriptor_sets(
                    command_buffer,
                    vk::PipelineBindPoint::GRAPHICS,
                    sky.pipeline_layout,
                    0,
                    std::slice::from_ref(&sky.descriptor_set),
                    &[],
                );
                self.device.cmd_bind_vertex_buffers(
                    command_buffer,
                    0,
                    &[sky.mesh.vertex_buffer],
                    &[0],
                );
                self.device.cmd_bind_index_buffer(
                    command_buffer,
                    sky.mesh.index_buffer,
                    0,
                    vk::IndexType::UINT32,
                );
                self.device
                    .cmd_draw_indexed(command_buffer, sky.mesh.index_count, 1, 0, 0, 0);
            }

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

                self.device.cmd_bind_pipeline(
                    command_buffer,
                    vk::PipelineBindPoint::GRAPHICS,
                    solid_pipeline,
                );
                for draw in &opaque {
                    self.device.cmd_bind_descriptor_sets(
                        command_buffer,
                        vk::PipelineBindPoint::GRAPHICS,
                        scene_layout,
                        0,
                        std::slice::from_ref(&draw.descriptor_set),
                        &[],
                    );
                    self.device.cmd_draw_indexed(
                        command_buffer,
                        draw.index_count,
                        1,
                        draw.index_base,
                        0,
                        0,
                    );
                }

                self.device.cmd_bind_pipeline(
                    command_buffer,
                    vk::PipelineBindPoint::GRAPHICS,
                    blend_pipeline,
                );
                for draw in &blend {
                    self.device.cmd_bind_descriptor_sets(
                        command_buffer,
                        vk::PipelineBindPoint::GRAPHICS,
                        scene_layout,
                        0,
                        std::slice::from_ref(&draw.descriptor_set),
                        &[],
                    );
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

        self.state.advance(CommandState::Recorded);
        Ok(())
    }
}
