use ash::vk;
use thiserror::Error;

use atrium_render_vulkan_core::vulkan::memory::{MemoryError, create_image_with_memory};

use crate::config::LIGHT_COUNT;

pub const SHADOW_FORMAT: vk::Format = vk::Format::D16_UNORM;
pub const POSITION_FORMAT: vk::Format = vk::Format::R32G32B32A32_SFLOAT;
pub const NORMAL_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;
pub const ALBEDO_FORMAT: vk::Format = vk::Format::R32G32B32A32_UINT;

#[derive(Debug, Error)]
pub enum TargetError {
    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error("Failed to create image view: {0}")]
    CreateImageViewFailed(String),

    #[error("Failed to create render pass: {0}")]
    CreateRenderPassFailed(String),

    #[error("Failed to create framebuffer: {0}")]
    CreateFramebufferFailed(String),

    #[error("Failed to create sampler: {0}")]
    CreateSamplerFailed(String),
}

/// One render target image. Owned by its target struct; handles copy freely.
#[derive(Debug, Clone, Copy)]
pub struct FrameBufferAttachment {
    pub image: vk::Image,
    pub memory: vk::DeviceMemory,
    pub view: vk::ImageView,
    pub format: vk::Format,
}

impl FrameBufferAttachment {
    fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_image_view(self.view, None);
            device.destroy_image(self.image, None);
            device.free_memory(self.memory, None);
        }
    }
}

/// Creates an optimal-tiling attachment image that can also be sampled.
/// `dedicated_allocation` requests an NV dedicated allocation when the
/// device enabled that extension.
pub fn create_attachment(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    device: &ash::Device,
    format: vk::Format,
    usage: vk::ImageUsageFlags,
    extent: vk::Extent2D,
    dedicated_allocation: bool,
) -> Result<FrameBufferAttachment, TargetError> {
    let aspect_mask = if usage.contains(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT) {
        vk::ImageAspectFlags::DEPTH
    } else {
        vk::ImageAspectFlags::COLOR
    };

    let image_info = vk::ImageCreateInfo::default()
        .image_type(vk::ImageType::TYPE_2D)
        .format(format)
        .extent(vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        })
        .mip_levels(1)
        .array_layers(1)
        .samples(vk::SampleCountFlags::TYPE_1)
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(usage | vk::ImageUsageFlags::SAMPLED);

    let (image, memory) = create_image_with_memory(
        instance,
        physical_device,
        device,
        &image_info,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
        dedicated_allocation,
    )?;

    let view_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(aspect_mask)
                .base_mip_level(0)
                .level_count(1)
                .base_array_layer(0)
                .layer_count(1),
        );

    let view = unsafe {
        device
            .create_image_view(&view_info, None)
            .map_err(|e| TargetError::CreateImageViewFailed(e.to_string()))?
    };

    Ok(FrameBufferAttachment {
        image,
        memory,
        view,
        format,
    })
}

fn create_attachment_sampler(
    device: &ash::Device,
    max_anisotropy: f32,
) -> Result<vk::Sampler, TargetError> {
    let info = vk::SamplerCreateInfo::default()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_EDGE)
        .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
        .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE)
        .mip_lod_bias(0.0)
        .max_anisotropy(max_anisotropy)
        .min_lod(0.0)
        .max_lod(1.0)
        .border_color(vk::BorderColor::FLOAT_OPAQUE_WHITE);
    unsafe {
        device
            .create_sampler(&info, None)
            .map_err(|e| TargetError::CreateSamplerFailed(e.to_string()))
    }
}

/// Per-light depth-only target.
pub struct ShadowTarget {
    pub attachment: FrameBufferAttachment,
    pub framebuffer: vk::Framebuffer,
}

/// The shadow render pass plus one framebuffer per light. The render pass
/// leaves the depth attachment in DEPTH_STENCIL_READ_ONLY_OPTIMAL so the
/// composition pass can sample it without an explicit barrier.
pub struct ShadowTargets {
    device: ash::Device,
    pub render_pass: vk::RenderPass,
    pub sampler: vk::Sampler,
    pub targets: Vec<ShadowTarget>,
    pub dim: u32,
}

impl ShadowTargets {
    pub fn new(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: &ash::Device,
        dim: u32,
        dedicated_allocation: bool,
    ) -> Result<Self, TargetError> {
        let attachment_description = vk::AttachmentDescription2::default()
            .format(SHADOW_FORMAT)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL);

        let depth_reference = vk::AttachmentReference2::default()
            .attachment(0)
            .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
            .aspect_mask(vk::ImageAspectFlags::DEPTH);

        let subpass = vk::SubpassDescription2::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .depth_stencil_attachment(&depth_reference);

        let dependencies = [
            vk::SubpassDependency2::default()
                .src_subpass(vk::SUBPASS_EXTERNAL)
                .dst_subpass(0)
                .src_stage_mask(vk::PipelineStageFlags::FRAGMENT_SHADER)
                .dst_stage_mask(vk::PipelineStageFlags::LATE_FRAGMENT_TESTS)
                .src_access_mask(vk::AccessFlags::SHADER_READ)
                .dst_access_mask(
                    vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                        | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                )
                .dependency_flags(vk::DependencyFlags::BY_REGION),
            vk::SubpassDependency2::default()
                .src_subpass(0)
                .dst_subpass(vk::SUBPASS_EXTERNAL)
                .src_stage_mask(vk::PipelineStageFlags::LATE_FRAGMENT_TESTS)
                .dst_stage_mask(vk::PipelineStageFlags::FRAGMENT_SHADER)
                .src_access_mask(
                    vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                        | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                )
                .dst_access_mask(vk::AccessFlags::SHADER_READ)
                .dependency_flags(vk::DependencyFlags::BY_REGION),
        ];

        let render_pass_info = vk::RenderPassCreateInfo2::default()
            .attachments(std::slice::from_ref(&attachment_description))
            .subpasses(std::slice::from_ref(&subpass))
            .dependencies(&dependencies);

        let render_pass = unsafe {
            device
                .create_render_pass2(&render_pass_info, None)
                .map_err(|e| TargetError::CreateRenderPassFailed(e.to_string()))?
        };

        let sampler = create_attachment_sampler(device, 1.0)?;

        let extent = vk::Extent2D {
            width: dim,
            height: dim,
        };
        let mut targets = Vec::with_capacity(LIGHT_COUNT);
        for _ in 0..LIGHT_COUNT {
            let attachment = create_attachment(
                instance,
                physical_device,
                device,
                SHADOW_FORMAT,
                vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                extent,
                dedicated_allocation,
            )?;

            let framebuffer_info = vk::FramebufferCreateInfo::default()
                .render_pass(render_pass)
                .attachments(std::slice::from_ref(&attachment.view))
                .width(dim)
                .height(dim)
                .layers(1);
            let framebuffer = unsafe {
                device
                    .create_framebuffer(&framebuffer_info, None)
                    .map_err(|e| TargetError::CreateFramebufferFailed(e.to_string()))?
            };

            targets.push(ShadowTarget {
                attachment,
                framebuffer,
            });
        }

        Ok(Self {
            device: device.clone(),
            render_pass,
            sampler,
            targets,
            dim,
        })
    }

    pub fn depth_descriptors(&self) -> Vec<vk::DescriptorImageInfo> {
        self.targets
            .iter()
            .map(|target| {
                vk::DescriptorImageInfo::default()
                    .sampler(self.sampler)
                    .image_view(target.attachment.view)
                    .image_layout(vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL)
            })
            .collect()
    }
}

impl Drop for ShadowTargets {
    fn drop(&mut self) {
        unsafe {
            for target in &self.targets {
                self.device.destroy_framebuffer(target.framebuffer, None);
                target.attachment.destroy(&self.device);
            }
            self.device.destroy_sampler(self.sampler, None);
            self.device.destroy_render_pass(self.render_pass, None);
        }
    }
}

/// The G-buffer: three color attachments plus depth, written by the geometry
/// pass and sampled by composition. Color attachments end the pass in
/// SHADER_READ_ONLY_OPTIMAL through the subpass dependencies.
pub struct GeometryTarget {
    device: ash::Device,
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub position: FrameBufferAttachment,
    pub normal: FrameBufferAttachment,
    pub albedo: FrameBufferAttachment,
    pub depth: FrameBufferAttachment,
    pub sampler: vk::Sampler,
    pub extent: vk::Extent2D,
}

impl GeometryTarget {
    pub fn new(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: &ash::Device,
        depth_format: vk::Format,
        extent: vk::Extent2D,
        dedicated_allocation: bool,
    ) -> Result<Self, TargetError> {
        let position = create_attachment(
            instance,
            physical_device,
            device,
            POSITION_FORMAT,
            vk::ImageUsageFlags::COLOR_ATTACHMENT,
            extent,
            dedicated_allocation,
        )?;
        let normal = create_attachment(
            instance,
            physical_device,
            device,
            NORMAL_FORMAT,
            vk::ImageUsageFlags::COLOR_ATTACHMENT,
            extent,
            dedicated_allocation,
        )?;
        let albedo = create_attachment(
            instance,
            physical_device,
            device,
            ALBEDO_FORMAT,
            vk::ImageUsageFlags::COLOR_ATTACHMENT,
            extent,
            dedicated_allocation,
        )?;
        let depth = create_attachment(
            instance,
            physical_device,
            device,
            depth_format,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            extent,
            dedicated_allocation,
        )?;

        let attachment_descriptions: Vec<vk::AttachmentDescription2> =
            [&position, &normal, &albedo, &depth]
                .iter()
                .enumerate()
                .map(|(i, attachment)| {
                    let final_layout = if i == 3 {
                        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
                    } else {
                        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
                    };
                    vk::AttachmentDescription2::default()
                        .format(attachment.format)
                        .samples(vk::SampleCountFlags::TYPE_1)
                        .load_op(vk::AttachmentLoadOp::CLEAR)
                        .store_op(vk::AttachmentStoreOp::STORE)
                        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                        .initial_layout(vk::ImageLayout::UNDEFINED)
                        .final_layout(final_layout)
                })
                .collect();

        let color_references = [
            vk::AttachmentReference2::default()
                .attachment(0)
                .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .aspect_mask(vk::ImageAspectFlags::COLOR),
            vk::AttachmentReference2::default()
                .attachment(1)
                .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .aspect_mask(vk::ImageAspectFlags::COLOR),
            vk::AttachmentReference2::default()
                .attachment(2)
                .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .aspect_mask(vk::ImageAspectFlags::COLOR),
        ];
        let depth_reference = vk::AttachmentReference2::default()
            .attachment(3)
            .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
            .aspect_mask(vk::ImageAspectFlags::DEPTH);

        let subpass = vk::SubpassDescription2::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_references)
            .depth_stencil_attachment(&depth_reference);

        let dependencies = [
            vk::SubpassDependency2::default()
                .src_subpass(vk::SUBPASS_EXTERNAL)
                .dst_subpass(0)
                .src_stage_mask(vk::PipelineStageFlags::BOTTOM_OF_PIPE)
                .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
                .src_access_mask(vk::AccessFlags::MEMORY_READ)
                .dst_access_mask(
                    vk::AccessFlags::COLOR_ATTACHMENT_READ
                        | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                )
                .dependency_flags(vk::DependencyFlags::BY_REGION),
            vk::SubpassDependency2::default()
                .src_subpass(0)
                .dst_subpass(vk::SUBPASS_EXTERNAL)
                .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
                .dst_stage_mask(vk::PipelineStageFlags::BOTTOM_OF_PIPE)
                .src_access_mask(
                    vk::AccessFlags::COLOR_ATTACHMENT_READ
                        | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                )
                .dst_access_mask(vk::AccessFlags::MEMORY_READ)
                .dependency_flags(vk::DependencyFlags::BY_REGION),
        ];

        let render_pass_info = vk::RenderPassCreateInfo2::default()
            .attachments(&attachment_descriptions)
            .subpasses(std::slice::from_ref(&subpass))
            .dependencies(&dependencies);

        let render_pass = unsafe {
            device
                .create_render_pass2(&render_pass_info, None)
                .map_err(|e| TargetError::CreateRenderPassFailed(e.to_string()))?
        };

        let attachment_views = [position.view, normal.view, albedo.view, depth.view];
        let framebuffer_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass)
            .attachments(&attachment_views)
            .width(extent.width)
            .height(extent.height)
            .layers(1);
        let framebuffer = unsafe {
            device
                .create_framebuffer(&framebuffer_info, None)
                .map_err(|e| TargetError::CreateFramebufferFailed(e.to_string()))?
        };

        let sampler = create_attachment_sampler(device, 1.0)?;

        Ok(Self {
            device: device.clone(),
            render_pass,
            framebuffer,
            position,
            normal,
            albedo,
            depth,
            sampler,
            extent,
        })
    }

    pub fn color_descriptor(&self, attachment: &FrameBufferAttachment) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo::default()
            .sampler(self.sampler)
            .image_view(attachment.view)
            .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
    }
}

impl Drop for GeometryTarget {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_framebuffer(self.framebuffer, None);
            self.device.destroy_sampler(self.sampler, None);
            self.device.destroy_render_pass(self.render_pass, None);
        }
        self.position.destroy(&self.device);
        self.normal.destroy(&self.device);
        self.albedo.destroy(&self.device);
        self.depth.destroy(&self.device);
    }
}

/// Per-swapchain-image framebuffers for the composition pass. The pass draws
/// straight to the swapchain with its own depth buffer for the debug quads.
pub struct PresentTargets {
    device: ash::Device,
    pub render_pass: vk::RenderPass,
    pub framebuffers: Vec<vk::Framebuffer>,
    pub depth: FrameBufferAttachment,
    pub extent: vk::Extent2D,
}

impl PresentTargets {
    pub fn new(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: &ash::Device,
        surface_format: vk::Format,
        depth_format: vk::Format,
        image_views: &[vk::ImageView],
        extent: vk::Extent2D,
        dedicated_allocation: bool,
    ) -> Result<Self, TargetError> {
        let attachment_descriptions = [
            vk::AttachmentDescription2::default()
                .format(surface_format)
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::STORE)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(vk::ImageLayout::PRESENT_SRC_KHR),
            vk::AttachmentDescription2::default()
                .format(depth_format)
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::DONT_CARE)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
        ];

        let color_reference = vk::AttachmentReference2::default()
            .attachment(0)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .aspect_mask(vk::ImageAspectFlags::COLOR);
        let depth_reference = vk::AttachmentReference2::default()
            .attachment(1)
            .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
            .aspect_mask(vk::ImageAspectFlags::DEPTH);

        let subpass = vk::SubpassDescription2::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(std::slice::from_ref(&color_reference))
            .depth_stencil_attachment(&depth_reference);

        let dependency = vk::SubpassDependency2::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                    | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            )
            .dst_stage_mask(
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                    | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            )
            .src_access_mask(vk::AccessFlags::empty())
            .dst_access_mask(
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            );

        let render_pass_info = vk::RenderPassCreateInfo2::default()
            .attachments(&attachment_descriptions)
            .subpasses(std::slice::from_ref(&subpass))
            .dependencies(std::slice::from_ref(&dependency));

        let render_pass = unsafe {
            device
                .create_render_pass2(&render_pass_info, None)
                .map_err(|e| TargetError::CreateRenderPassFailed(e.to_string()))?
        };

        let depth = create_attachment(
            instance,
            physical_device,
            device,
            depth_format,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            extent,
            dedicated_allocation,
        )?;

        let mut framebuffers = Vec::with_capacity(image_views.len());
        for &view in image_views {
            let attachments = [view, depth.view];
            let framebuffer_info = vk::FramebufferCreateInfo::default()
                .render_pass(render_pass)
                .attachments(&attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);
            let framebuffer = unsafe {
                device
                    .create_framebuffer(&framebuffer_info, None)
                    .map_err(|e| TargetError::CreateFramebufferFailed(e.to_string()))?
            };
            framebuffers.push(framebuffer);
        }

        Ok(Self {
            device: device.clone(),
            render_pass,
            framebuffers,
            depth,
            extent,
        })
    }
}

impl Drop for PresentTargets {
    fn drop(&mut self) {
        unsafe {
            for &framebuffer in &self.framebuffers {
                self.device.destroy_framebuffer(framebuffer, None);
            }
            self.device.destroy_render_pass(self.render_pass, None);
        }
        self.depth.destroy(&self.device);
    }
}
