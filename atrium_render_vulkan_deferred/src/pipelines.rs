use std::path::Path;

use ash::vk;
use bytemuck::{Pod, Zeroable};
use thiserror::Error;

use crate::config::{LIGHT_COUNT, Z_FAR, Z_NEAR};
use crate::registry::{
    DescriptorSetLayoutRegistry, PipelineLayoutRegistry, PipelineRegistry, RegistryError,
};
use crate::scene::geometry::SceneVertex;
use crate::shader::{ShaderError, load_shader_module};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Shader(#[from] ShaderError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Render passes the graphics pipelines are compiled against.
#[derive(Clone, Copy)]
pub struct PipelineTargets {
    pub shadow_pass: vk::RenderPass,
    pub geometry_pass: vk::RenderPass,
    pub present_pass: vk::RenderPass,
}

/// Values baked into the shaders at pipeline build time.
#[derive(Clone, Copy)]
pub struct PipelineOptions {
    pub enable_ssao: bool,
    pub ambient_factor: f32,
    /// Attaches VK_AMD_rasterization_order relaxed ordering when the device
    /// reported the extension.
    pub relaxed_rasterization_order: bool,
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct CompositionSpecData {
    enable_ssao: i32,
    ambient_factor: f32,
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct GeometrySpecData {
    znear: f32,
    zfar: f32,
    enable_discard: i32,
}

/// Creates the four descriptor set layouts. The composition layout grows one
/// shadow map sampler binding per light after the fixed bindings.
pub fn create_descriptor_set_layouts(
    layouts: &mut DescriptorSetLayoutRegistry,
) -> Result<(), RegistryError> {
    let uniform = |binding: u32, stages: vk::ShaderStageFlags| {
        vk::DescriptorSetLayoutBinding::default()
            .binding(binding)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(1)
            .stage_flags(stages)
    };
    let sampler = |binding: u32| {
        vk::DescriptorSetLayoutBinding::default()
            .binding(binding)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::FRAGMENT)
    };

    let mut composition = vec![
        uniform(0, vk::ShaderStageFlags::VERTEX),
        sampler(1),
        sampler(2),
        sampler(3),
        uniform(4, vk::ShaderStageFlags::FRAGMENT),
    ];
    for i in 0..LIGHT_COUNT as u32 {
        composition.push(sampler(5 + i));
    }
    layouts.add("composition", &composition)?;

    layouts.add("shadowmap", &[uniform(0, vk::ShaderStageFlags::VERTEX)])?;

    layouts.add(
        "scene",
        &[
            uniform(0, vk::ShaderStageFlags::VERTEX),
            sampler(1),
            sampler(2),
            sampler(3),
            sampler(4),
        ],
    )?;

    layouts.add(
        "skysphere",
        &[uniform(0, vk::ShaderStageFlags::VERTEX), sampler(1)],
    )?;

    Ok(())
}

/// Creates one pipeline layout per descriptor set layout. The shadow layout
/// carries a single push constant word selecting the light.
pub fn create_pipeline_layouts(
    set_layouts: &DescriptorSetLayoutRegistry,
    layouts: &mut PipelineLayoutRegistry,
) -> Result<(), RegistryError> {
    for name in ["composition", "scene", "skysphere"] {
        let set_layout = set_layouts.get(name);
        let info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(std::slice::from_ref(&set_layout));
        layouts.add(name, &info)?;
    }

    let push_constant_range = vk::PushConstantRange::default()
        .stage_flags(vk::ShaderStageFlags::VERTEX)
        .size(std::mem::size_of::<u32>() as u32);
    let set_layout = set_layouts.get("shadowmap");
    let info = vk::PipelineLayoutCreateInfo::default()
        .set_layouts(std::slice::from_ref(&set_layout))
        .push_constant_ranges(std::slice::from_ref(&push_constant_range));
    layouts.add("shadowmap", &info)?;

    Ok(())
}

fn vertex_attributes() -> [vk::VertexInputAttributeDescription; 5] {
    let attribute = |location: u32, format: vk::Format, offset: u32| {
        vk::VertexInputAttributeDescription {
            location,
            binding: 0,
            format,
            offset,
        }
    };
    [
        attribute(0, vk::Format::R32G32B32_SFLOAT, 0),
        attribute(1, vk::Format::R32G32_SFLOAT, 12),
        attribute(2, vk::Format::R32G32B32_SFLOAT, 20),
        attribute(3, vk::Format::R32G32B32_SFLOAT, 32),
        attribute(4, vk::Format::R32G32B32_SFLOAT, 44),
    ]
}

/// Builds the composition and debug display pipelines. Called again after an
/// SSAO toggle since the flag is a specialization constant.
pub fn build_composition_pipelines(
    device: &ash::Device,
    shader_dir: &Path,
    cache: vk::PipelineCache,
    pipelines: &mut PipelineRegistry,
    layouts: &PipelineLayoutRegistry,
    targets: PipelineTargets,
    options: PipelineOptions,
) -> Result<(), PipelineError> {
    let composition_vert = load_shader_module(device, &shader_dir.join("composition.vert.spv"))?;
    let composition_frag = load_shader_module(device, &shader_dir.join("composition.frag.spv"))?;
    let debug_vert = load_shader_module(device, &shader_dir.join("debug.vert.spv"))?;
    let debug_frag = load_shader_module(device, &shader_dir.join("debug.frag.spv"))?;
    let modules = [composition_vert, composition_frag, debug_vert, debug_frag];

    let result =
        build_composition_pipelines_inner(cache, pipelines, layouts, targets, options, &modules);

    unsafe {
        for module in modules {
            device.destroy_shader_module(module, None);
        }
    }
    result
}

fn build_composition_pipelines_inner(
    cache: vk::PipelineCache,
    pipelines: &mut PipelineRegistry,
    layouts: &PipelineLayoutRegistry,
    targets: PipelineTargets,
    options: PipelineOptions,
    modules: &[vk::ShaderModule; 4],
) -> Result<(), PipelineError> {
    let entry_point = c"main";

    let binding = vk::VertexInputBindingDescription::default()
        .binding(0)
        .stride(SceneVertex::STRIDE)
        .input_rate(vk::VertexInputRate::VERTEX);
    let attributes = vertex_attributes();
    let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
        .vertex_binding_descriptions(std::slice::from_ref(&binding))
        .vertex_attribute_descriptions(&attributes);

    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(vk::PrimitiveTopology::TRIANGLE_LIST);

    let mut raster_order_amd = vk::PipelineRasterizationStateRasterizationOrderAMD::default()
        .rasterization_order(vk::RasterizationOrderAMD::RELAXED);
    let mut rasterization = vk::PipelineRasterizationStateCreateInfo::default()
        .polygon_mode(vk::PolygonMode::FILL)
        .cull_mode(vk::CullModeFlags::BACK)
        .front_face(vk::FrontFace::CLOCKWISE)
        .line_width(1.0);
    if options.relaxed_rasterization_order {
        rasterization = rasterization.push_next(&mut raster_order_amd);
    }

    let blend_attachment = vk::PipelineColorBlendAttachmentState::default()
        .color_write_mask(vk::ColorComponentFlags::RGBA);
    let color_blend = vk::PipelineColorBlendStateCreateInfo::default()
        .attachments(std::slice::from_ref(&blend_attachment));

    let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
        .depth_test_enable(true)
        .depth_write_enable(true)
        .depth_compare_op(vk::CompareOp::LESS_OR_EQUAL);

    let viewport_state = vk::PipelineViewportStateCreateInfo::default()
        .viewport_count(1)
        .scissor_count(1);
    let multisample = vk::PipelineMultisampleStateCreateInfo::default()
        .rasterization_samples(vk::SampleCountFlags::TYPE_1);
    let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

    let spec_data = CompositionSpecData {
        enable_ssao: options.enable_ssao as i32,
        ambient_factor: options.ambient_factor,
    };
    let spec_entries = [
        vk::SpecializationMapEntry {
            constant_id: 0,
            offset: 0,
            size: std::mem::size_of::<i32>(),
        },
        vk::SpecializationMapEntry {
            constant_id: 1,
            offset: 4,
            size: std::mem::size_of::<f32>(),
        },
    ];
    let spec_info = vk::SpecializationInfo::default()
        .map_entries(&spec_entries)
        .data(bytemuck::bytes_of(&spec_data));

    let composition_stages = [
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(modules[0])
            .name(entry_point),
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(modules[1])
            .name(entry_point)
            .specialization_info(&spec_info),
    ];

    let layout = layouts.get("composition");
    let composition_info = vk::GraphicsPipelineCreateInfo::default()
        .flags(vk::PipelineCreateFlags::ALLOW_DERIVATIVES)
        .stages(&composition_stages)
        .vertex_input_state(&vertex_input)
        .input_assembly_state(&input_assembly)
        .rasterization_state(&rasterization)
        .color_blend_state(&color_blend)
        .depth_stencil_state(&depth_stencil)
        .viewport_state(&viewport_state)
        .multisample_state(&multisample)
        .dynamic_state(&dynamic)
        .layout(layout)
        .render_pass(targets.present_pass);
    let composition = pipelines.add_graphics("composition", cache, &composition_info)?;

    let debug_stages = [
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(modules[2])
            .name(entry_point),
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(modules[3])
            .name(entry_point),
    ];
    let debug_info = vk::GraphicsPipelineCreateInfo::default()
        .flags(vk::PipelineCreateFlags::DERIVATIVE)
        .stages(&debug_stages)
        .vertex_input_state(&vertex_input)
        .input_assembly_state(&input_assembly)
        .rasterization_state(&rasterization)
        .color_blend_state(&color_blend)
        .depth_stencil_state(&depth_stencil)
        .viewport_state(&viewport_state)
        .multisample_state(&multisample)
        .dynamic_state(&dynamic)
        .layout(layout)
        .render_pass(targets.present_pass)
        .base_pipeline_handle(composition)
        .base_pipeline_index(-1);
    pipelines.add_graphics("debugdisplay", cache, &debug_info)?;

    Ok(())
}

/// Builds the G-buffer, skysphere and shadow map pipelines. These survive the
/// runtime toggles and are only built once.
pub fn build_scene_pipelines(
    device: &ash::Device,
    shader_dir: &Path,
    cache: vk::PipelineCache,
    pipelines: &mut PipelineRegistry,
    layouts: &PipelineLayoutRegistry,
    targets: PipelineTargets,
    options: PipelineOptions,
) -> Result<(), PipelineError> {
    let mrt_vert = load_shader_module(device, &shader_dir.join("mrt.vert.spv"))?;
    let mrt_frag = load_shader_module(device, &shader_dir.join("mrt.frag.spv"))?;
    let sky_vert = load_shader_module(device, &shader_dir.join("skysphere.vert.spv"))?;
    let sky_frag = load_shader_module(device, &shader_dir.join("skysphere.frag.spv"))?;
    let shadow_vert = load_shader_module(device, &shader_dir.join("shadow.vert.spv"))?;
    let shadow_frag = load_shader_module(device, &shader_dir.join("shadow.frag.spv"))?;
    let modules = [
        mrt_vert,
        mrt_frag,
        sky_vert,
        sky_frag,
        shadow_vert,
        shadow_frag,
    ];

    let result =
        build_scene_pipelines_inner(cache, pipelines, layouts, targets, options, &modules);

    unsafe {
        for module in modules {
            device.destroy_shader_module(module, None);
        }
    }
    result
}

fn build_scene_pipelines_inner(
    cache: vk::PipelineCache,
    pipelines: &mut PipelineRegistry,
    layouts: &PipelineLayoutRegistry,
    targets: PipelineTargets,
    options: PipelineOptions,
    modules: &[vk::ShaderModule; 6],
) -> Result<(), PipelineError> {
    let entry_point = c"main";

    let binding = vk::VertexInputBindingDescription::default()
        .binding(0)
        .stride(SceneVertex::STRIDE)
        .input_rate(vk::VertexInputRate::VERTEX);
    let attributes = vertex_attributes();
    let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
        .vertex_binding_descriptions(std::slice::from_ref(&binding))
        .vertex_attribute_descriptions(&attributes);

    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(vk::PrimitiveTopology::TRIANGLE_LIST);

    let viewport_state = vk::PipelineViewportStateCreateInfo::default()
        .viewport_count(1)
        .scissor_count(1);
    let multisample = vk::PipelineMultisampleStateCreateInfo::default()
        .rasterization_samples(vk::SampleCountFlags::TYPE_1);
    let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

    let mut raster_order_amd = vk::PipelineRasterizationStateRasterizationOrderAMD::default()
        .rasterization_order(vk::RasterizationOrderAMD::RELAXED);
    let rasterization_base = vk::PipelineRasterizationStateCreateInfo::default()
        .polygon_mode(vk::PolygonMode::FILL)
        .front_face(vk::FrontFace::CLOCKWISE)
        .line_width(1.0);

    let mrt_blend_attachments = [vk::PipelineColorBlendAttachmentState::default()
        .color_write_mask(vk::ColorComponentFlags::RGBA); 3];
    let mrt_color_blend =
        vk::PipelineColorBlendStateCreateInfo::default().attachments(&mrt_blend_attachments);

    let spec_entries = [
        vk::SpecializationMapEntry {
            constant_id: 0,
            offset: 0,
            size: std::mem::size_of::<f32>(),
        },
        vk::SpecializationMapEntry {
            constant_id: 1,
            offset: 4,
            size: std::mem::size_of::<f32>(),
        },
        vk::SpecializationMapEntry {
            constant_id: 2,
            offset: 8,
            size: std::mem::size_of::<i32>(),
        },
    ];
    let solid_spec_data = GeometrySpecData {
        znear: Z_NEAR,
        zfar: Z_FAR,
        enable_discard: 0,
    };
    let blend_spec_data = GeometrySpecData {
        enable_discard: 1,
        ..solid_spec_data
    };
    let solid_spec = vk::SpecializationInfo::default()
        .map_entries(&spec_entries)
        .data(bytemuck::bytes_of(&solid_spec_data));
    let blend_spec = vk::SpecializationInfo::default()
        .map_entries(&spec_entries)
        .data(bytemuck::bytes_of(&blend_spec_data));

    // Opaque G-buffer fill
    {
        let mut rasterization = rasterization_base.cull_mode(vk::CullModeFlags::BACK);
        if options.relaxed_rasterization_order {
            rasterization = rasterization.push_next(&mut raster_order_amd);
        }
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(true)
            .depth_write_enable(true)
            .depth_compare_op(vk::CompareOp::LESS_OR_EQUAL);
        let stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(modules[0])
                .name(entry_point),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(modules[1])
                .name(entry_point)
                .specialization_info(&solid_spec),
        ];
        let info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .rasterization_state(&rasterization)
            .color_blend_state(&mrt_color_blend)
            .depth_stencil_state(&depth_stencil)
            .viewport_state(&viewport_state)
            .multisample_state(&multisample)
            .dynamic_state(&dynamic)
            .layout(layouts.get("scene"))
            .render_pass(targets.geometry_pass);
        pipelines.add_graphics("scene.solid", cache, &info)?;
    }

    // Alpha-masked submeshes discard in the fragment shader and keep both
    // faces, with depth writes off.
    {
        let mut rasterization = rasterization_base.cull_mode(vk::CullModeFlags::NONE);
        if options.relaxed_rasterization_order {
            rasterization = rasterization.push_next(&mut raster_order_amd);
        }
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(true)
            .depth_compare_op(vk::CompareOp::LESS_OR_EQUAL);
        let stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(modules[0])
                .name(entry_point),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(modules[1])
                .name(entry_point)
                .specialization_info(&blend_spec),
        ];
        let info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .rasterization_state(&rasterization)
            .color_blend_state(&mrt_color_blend)
            .depth_stencil_state(&depth_stencil)
            .viewport_state(&viewport_state)
            .multisample_state(&multisample)
            .dynamic_state(&dynamic)
            .layout(layouts.get("scene"))
            .render_pass(targets.geometry_pass);
        pipelines.add_graphics("scene.blend", cache, &info)?;
    }

    // Skysphere draws behind everything, so no depth writes.
    {
        let mut rasterization = rasterization_base.cull_mode(vk::CullModeFlags::NONE);
        if options.relaxed_rasterization_order {
            rasterization = rasterization.push_next(&mut raster_order_amd);
        }
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(true)
            .depth_compare_op(vk::CompareOp::LESS_OR_EQUAL);
        let stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(modules[2])
                .name(entry_point),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(modules[3])
                .name(entry_point),
        ];
        let info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .rasterization_state(&rasterization)
            .color_blend_state(&mrt_color_blend)
            .depth_stencil_state(&depth_stencil)
            .viewport_state(&viewport_state)
            .multisample_state(&multisample)
            .dynamic_state(&dynamic)
            .layout(layouts.get("skysphere"))
            .render_pass(targets.geometry_pass);
        pipelines.add_graphics("skysphere", cache, &info)?;
    }

    // Shadow map pipeline: depth only, dynamic depth bias.
    {
        let mut rasterization = rasterization_base
            .cull_mode(vk::CullModeFlags::BACK)
            .depth_bias_enable(true);
        if options.relaxed_rasterization_order {
            rasterization = rasterization.push_next(&mut raster_order_amd);
        }
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(true)
            .depth_write_enable(true)
            .depth_compare_op(vk::CompareOp::LESS_OR_EQUAL);
        let color_blend = vk::PipelineColorBlendStateCreateInfo::default();
        let shadow_dynamic_states = [
            vk::DynamicState::VIEWPORT,
            vk::DynamicState::SCISSOR,
            vk::DynamicState::DEPTH_BIAS,
        ];
        let shadow_dynamic =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&shadow_dynamic_states);
        let stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(modules[4])
                .name(entry_point),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(modules[5])
                .name(entry_point),
        ];
        let info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .rasterization_state(&rasterization)
            .color_blend_state(&color_blend)
            .depth_stencil_state(&depth_stencil)
            .viewport_state(&viewport_state)
            .multisample_state(&multisample)
            .dynamic_state(&shadow_dynamic)
            .layout(layouts.get("shadowmap"))
            .render_pass(targets.shadow_pass);
        pipelines.add_graphics("shadowmap", cache, &info)?;
    }

    Ok(())
}
