use ash::vk;
use glam::{Mat4, Vec4};
use log::{info, warn};
use thiserror::Error;

use atrium_render_vulkan_core::context::GraphicsContext;
use atrium_render_vulkan_core::vulkan::memory::MemoryError;
use atrium_render_vulkan_core::vulkan::physical_device::PhysicalDeviceManagerError;

use crate::config::{LIGHT_COUNT, RendererSettings};
use crate::lights::{Light, default_lights, spot_light_space};
use crate::meshes::{MeshBuffer, generate_screen_quads};
use crate::passes::composition::{CompositionBinding, CompositionPass};
use crate::passes::geometry::{GeometryPass, SkyBinding};
use crate::passes::shadow::ShadowPass;
use crate::passes::{CommandState, PassError};
use crate::pipelines::{
    PipelineError, PipelineOptions, PipelineTargets, build_composition_pipelines,
    build_scene_pipelines, create_descriptor_set_layouts, create_pipeline_layouts,
};
use crate::registry::{
    DescriptorSetLayoutRegistry, DescriptorSetRegistry, PipelineLayoutRegistry, PipelineRegistry,
    RegistryError,
};
use crate::scene::geometry::merge_submeshes;
use crate::scene::import::{AssetError, GpuTexture, ImportedMesh, ImportedScene, TextureSource};
use crate::scene::store::{GeometryStore, StoreError};
use crate::scheduler::{FrameScheduler, FrameWork, SchedulerError};
use crate::targets::{GeometryTarget, PresentTargets, ShadowTargets, TargetError};
use crate::uniforms::{
    UniformBuffer, composition_view_block, lights_block, scene_matrices_block,
    shadow_matrices_block,
};

#[derive(Debug, Error)]
pub enum RendererError {
    #[error(transparent)]
    Target(#[from] TargetError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error(transparent)]
    Pass(#[from] PassError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    PhysicalDevice(#[from] PhysicalDeviceManagerError),

    #[error("Failed to create pipeline cache: {0}")]
    CreatePipelineCacheFailed(String),

    #[error("Failed to wait for device idle: {0}")]
    WaitIdleFailed(String),
}

/// View state pushed in by the caller each frame.
#[derive(Debug, Clone, Copy)]
pub struct Camera {
    pub projection: Mat4,
    pub view: Mat4,
    pub position: Vec4,
}

/// Sky sphere geometry plus the texture file drawn behind the scene.
pub struct SkyAssets {
    pub mesh: ImportedMesh,
    pub texture: String,
}

/// Everything the renderer consumes from the import collaborators.
pub struct SceneAssets<'a> {
    pub scene: Result<ImportedScene, AssetError>,
    pub sky: Option<SkyAssets>,
    pub source: &'a mut dyn TextureSource,
}

/// Name-keyed GPU object containers shared by pipeline build and pass
/// recording. Passed by reference, never global.
pub struct RenderResources {
    pub descriptor_set_layouts: DescriptorSetLayoutRegistry,
    pub pipeline_layouts: PipelineLayoutRegistry,
    pub pipelines: PipelineRegistry,
    pub descriptor_sets: DescriptorSetRegistry,
}

struct SkySphere {
    mesh: MeshBuffer,
    texture: GpuTexture,
}

/// The deferred renderer: owns targets, pipelines, uniform state, the scene
/// store and the prerecorded passes for a fixed startup resolution.
pub struct DeferredRenderer {
    device: ash::Device,
    settings: RendererSettings,
    lights: [Light; LIGHT_COUNT],
    pipeline_cache: vk::PipelineCache,
    pipeline_targets: PipelineTargets,
    relaxed_rasterization_order: bool,

    shadow_targets: ShadowTargets,
    geometry_target: GeometryTarget,
    present_targets: PresentTargets,

    composition_view: UniformBuffer,
    scene_matrices: UniformBuffer,
    shadow_matrices: UniformBuffer,
    lights_uniform: UniformBuffer,

    resources: RenderResources,
    store: GeometryStore,
    quads: MeshBuffer,
    sky: Option<SkySphere>,

    shadow_pass: ShadowPass,
    geometry_pass: GeometryPass,
    composition_pass: CompositionPass,
    scheduler: FrameScheduler,
}

impl DeferredRenderer {
    pub fn new(
        context: &GraphicsContext,
        settings: RendererSettings,
        assets: SceneAssets,
    ) -> Result<Self, RendererError> {
        let device = context.device().clone();
        let instance = context.instance();
        let physical_device = context.physical_device();
        let pool = context.command_pool;
        let queue = context.device_manager.graphics_queue;
        let extent = context.swapchain_manager.image_extent;

        let depth_format = context
            .physical_device_manager
            .find_supported_depth_format(instance)?;
        let capabilities = context.physical_device_manager.capabilities;
        let relaxed_rasterization_order = capabilities.relaxed_rasterization_order;

        let shadow_targets = ShadowTargets::new(
            instance,
            physical_device,
            &device,
            settings.shadow_map_dim,
            capabilities.dedicated_allocation,
        )?;
        let geometry_target = GeometryTarget::new(
            instance,
            physical_device,
            &device,
            depth_format,
            extent,
            capabilities.dedicated_allocation,
        )?;
        let present_targets = PresentTargets::new(
            instance,
            physical_device,
            &device,
            context.swapchain_manager.surface_format,
            depth_format,
            &context.swapchain_manager.swapchain_image_views,
            extent,
            capabilities.dedicated_allocation,
        )?;
        let pipeline_targets = PipelineTargets {
            shadow_pass: shadow_targets.render_pass,
            geometry_pass: geometry_target.render_pass,
            present_pass: present_targets.render_pass,
        };

        let composition_view =
            UniformBuffer::new::<crate::uniforms::CompositionViewBlock>(
                instance,
                physical_device,
                &device,
            )?;
        let scene_matrices = UniformBuffer::new::<crate::uniforms::SceneMatricesBlock>(
            instance,
            physical_device,
            &device,
        )?;
        let shadow_matrices = UniformBuffer::new::<crate::uniforms::ShadowMatricesBlock>(
            instance,
            physical_device,
            &device,
        )?;
        let lights_uniform =
            UniformBuffer::new::<crate::uniforms::LightsBlock>(instance, physical_device, &device)?;

        let mut descriptor_set_layouts = DescriptorSetLayoutRegistry::new(device.clone());
        create_descriptor_set_layouts(&mut descriptor_set_layouts)?;
        let mut pipeline_layouts = PipelineLayoutRegistry::new(device.clone());
        create_pipeline_layouts(&descriptor_set_layouts, &mut pipeline_layouts)?;

        let pool_sizes = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: 8,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: 8 + LIGHT_COUNT as u32,
            },
        ];
        let mut descriptor_sets = DescriptorSetRegistry::new(device.clone(), &pool_sizes, 4)?;

        let composition_set =
            descriptor_sets.allocate("composition", descriptor_set_layouts.get("composition"))?;
        let shadow_set =
            descriptor_sets.allocate("shadowmap", descriptor_set_layouts.get("shadowmap"))?;

        write_composition_set(
            &device,
            composition_set,
            &geometry_target,
            &shadow_targets,
            &composition_view,
            &lights_uniform,
        );
        let buffer_info = shadow_matrices.descriptor();
        let write = vk::WriteDescriptorSet::default()
            .dst_set(shadow_set)
            .dst_binding(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .buffer_info(std::slice::from_ref(&buffer_info));
        unsafe {
            device.update_descriptor_sets(std::slice::from_ref(&write), &[]);
        }

        let cache_info = vk::PipelineCacheCreateInfo::default();
        let pipeline_cache = unsafe {
            device
                .create_pipeline_cache(&cache_info, None)
                .map_err(|e| RendererError::CreatePipelineCacheFailed(e.to_string()))?
        };

        let options = PipelineOptions {
            enable_ssao: settings.enable_ssao,
            ambient_factor: settings.ambient_factor,
            relaxed_rasterization_order,
        };
        let mut pipelines = PipelineRegistry::new(device.clone());
        build_scene_pipelines(
            &device,
            &settings.shader_dir,
            pipeline_cache,
            &mut pipelines,
            &pipeline_layouts,
            pipeline_targets,
            options,
        )?;
        build_composition_pipelines(
            &device,
            &settings.shader_dir,
            pipeline_cache,
            &mut pipelines,
            &pipeline_layouts,
            pipeline_targets,
            options,
        )?;

        let SceneAssets { scene, sky, source } = assets;
        let store = GeometryStore::load(
            instance,
            physical_device,
            &device,
            pool,
            queue,
            descriptor_set_layouts.get("scene"),
            &scene_matrices,
            scene,
            source,
        )?;

        let (quad_vertices, quad_indices) = generate_screen_quads();
        let quads = MeshBuffer::upload(
            instance,
            physical_device,
            &device,
            pool,
            queue,
            &quad_vertices,
            &quad_indices,
        )?;

        let sky = match sky {
            Some(assets) => load_sky_sphere(
                instance,
                physical_device,
                &device,
                pool,
                queue,
                &mut descriptor_sets,
                &descriptor_set_layouts,
                &scene_matrices,
                assets,
                source,
            )?,
            None => None,
        };

        let shadow_pass = ShadowPass::new(&device, pool)?;
        let geometry_pass = GeometryPass::new(&device, pool)?;
        let composition_pass = CompositionPass::new(
            &device,
            pool,
            context.swapchain_manager.image_count() as u32,
        )?;
        let scheduler = FrameScheduler::new(&device)?;

        let mut renderer = Self {
            device,
            settings,
            lights: default_lights(),
            pipeline_cache,
            pipeline_targets,
            relaxed_rasterization_order,
            shadow_targets,
            geometry_target,
            present_targets,
            composition_view,
            scene_matrices,
            shadow_matrices,
            lights_uniform,
            resources: RenderResources {
                descriptor_set_layouts,
                pipeline_layouts,
                pipelines,
                descriptor_sets,
            },
            store,
            quads,
            sky,
            shadow_pass,
            geometry_pass,
            composition_pass,
            scheduler,
        };

        renderer
            .composition_view
            .write(
                &renderer.device,
                &composition_view_block(renderer.settings.debug_display),
            )?;
        renderer.record_all()?;
        info!(
            "Deferred renderer ready: {} lights, {}x{} shadow maps",
            LIGHT_COUNT, renderer.settings.shadow_map_dim, renderer.settings.shadow_map_dim
        );
        Ok(renderer)
    }

    fn record_shadow(&mut self) -> Result<(), PassError> {
        self.shadow_pass.record(
            &self.shadow_targets,
            self.resources.pipelines.get("shadowmap"),
            self.resources.pipeline_layouts.get("shadowmap"),
            self.resources.descriptor_sets.get("shadowmap"),
            &self.store,
        )
    }

    fn record_geometry(&mut self) -> Result<(), PassError> {
        let sky_binding = self.sky.as_ref().map(|sky| SkyBinding {
            pipeline: self.resources.pipelines.get("skysphere"),
            pipeline_layout: self.resources.pipeline_layouts.get("skysphere"),
            descriptor_set: self.resources.descriptor_sets.get("skysphere"),
            mesh: &sky.mesh,
        });
        self.geometry_pass.record(
            &self.geometry_target,
            sky_binding.as_ref(),
            self.resources.pipelines.get("scene.solid"),
            self.resources.pipelines.get("scene.blend"),
            self.resources.pipeline_layouts.get("scene"),
            &self.store,
        )
    }

    fn record_composition(&mut self) -> Result<(), PassError> {
        let binding = CompositionBinding {
            pipeline: self.resources.pipelines.get("composition"),
            pipeline_layout: self.resources.pipeline_layouts.get("composition"),
            descriptor_set: self.resources.descriptor_sets.get("composition"),
            quads: &self.quads,
            debug_pipeline: self
                .settings
                .debug_display
                .then(|| self.resources.pipelines.get("debugdisplay")),
        };
        self.composition_pass.record(&self.present_targets, &binding)
    }

    fn record_all(&mut self) -> Result<(), PassError> {
        self.record_shadow()?;
        self.record_geometry()?;
        self.record_composition()
    }

    /// Drains the device so stale command buffers can be rerecorded.
    fn drain(states: &mut [&mut CommandState], device: &ash::Device) -> Result<(), RendererError> {
        for state in states.iter_mut() {
            state.advance(CommandState::Draining);
        }
        unsafe {
            device
                .device_wait_idle()
                .map_err(|e| RendererError::WaitIdleFailed(e.to_string()))?;
        }
        for state in states.iter_mut() {
            state.advance(CommandState::Stale);
        }
        Ok(())
    }

    /// Flips the G-buffer preview quads. The composition pass and its view
    /// projection are rebuilt.
    pub fn toggle_debug_display(&mut self) -> Result<(), RendererError> {
        self.settings.debug_display = !self.settings.debug_display;
        let device = self.device.clone();
        Self::drain(&mut [&mut self.composition_pass.state], &device)?;
        self.composition_view
            .write(&device, &composition_view_block(self.settings.debug_display))?;
        self.record_composition()?;
        Ok(())
    }

    /// Flips the ambient occlusion term. The flag is a specialization
    /// constant, so the composition pipelines are recompiled before the
    /// affected passes rerecord.
    pub fn toggle_ssao(&mut self) -> Result<(), RendererError> {
        self.settings.enable_ssao = !self.settings.enable_ssao;
        let device = self.device.clone();
        Self::drain(
            &mut [
                &mut self.geometry_pass.state,
                &mut self.composition_pass.state,
            ],
            &device,
        )?;
        let options = PipelineOptions {
            enable_ssao: self.settings.enable_ssao,
            ambient_factor: self.settings.ambient_factor,
            relaxed_rasterization_order: self.relaxed_rasterization_order,
        };
        build_composition_pipelines(
            &device,
            &self.settings.shader_dir,
            self.pipeline_cache,
            &mut self.resources.pipelines,
            &self.resources.pipeline_layouts,
            self.pipeline_targets,
            options,
        )?;
        self.record_geometry()?;
        self.record_composition()?;
        Ok(())
    }

    /// Pins or releases light 0 at the camera position.
    pub fn toggle_attach_light(&mut self) {
        self.settings.attach_light = !self.settings.attach_light;
    }

    /// Updates per-frame uniform state and runs the submission chain.
    pub fn render(
        &mut self,
        context: &GraphicsContext,
        camera: &Camera,
    ) -> Result<(), RendererError> {
        debug_assert!(self.shadow_pass.state.is_submittable());
        debug_assert!(self.geometry_pass.state.is_submittable());
        debug_assert!(self.composition_pass.state.is_submittable());

        // The previous frame reads the host-visible uniform blocks until its
        // composition submit retires; wait before touching them.
        self.scheduler.wait_frame()?;

        let mirrored = camera.position * Vec4::new(-1.0, -1.0, -1.0, 1.0);
        if self.settings.attach_light {
            let light = &mut self.lights[0];
            light.position = mirrored;
            light.light_space = spot_light_space(
                light.position.truncate(),
                light.dir.truncate(),
                45.0f32.to_radians(),
            );
        }

        self.shadow_matrices
            .write(&self.device, &shadow_matrices_block(&self.lights))?;
        self.lights_uniform
            .write(&self.device, &lights_block(&self.lights, mirrored, camera.view))?;
        let extent = context.swapchain_manager.image_extent;
        self.scene_matrices.write(
            &self.device,
            &scene_matrices_block(
                camera.projection,
                camera.view,
                Mat4::IDENTITY,
                (extent.width as f32, extent.height as f32),
            ),
        )?;

        let work = FrameWork {
            shadow: &self.shadow_pass.command_buffers,
            geometry: self.geometry_pass.command_buffer,
            composition: &self.composition_pass.command_buffers,
        };
        self.scheduler.draw(
            context.device_manager.graphics_queue,
            &context.swapchain_manager.swapchain_loader,
            context.swapchain_manager.swapchain,
            &work,
        )?;
        Ok(())
    }
}

impl Drop for DeferredRenderer {
    fn drop(&mut self) {
        unsafe {
            if self.device.device_wait_idle().is_err() {
                warn!("Device wait failed during renderer teardown");
            }
            self.device.destroy_pipeline_cache(self.pipeline_cache, None);
        }
        self.composition_view.destroy(&self.device);
        self.scene_matrices.destroy(&self.device);
        self.shadow_matrices.destroy(&self.device);
        self.lights_uniform.destroy(&self.device);
        self.quads.destroy(&self.device);
        if let Some(sky) = &self.sky {
            sky.mesh.destroy(&self.device);
            sky.texture.destroy(&self.device);
        }
    }
}

/// Writes the composition set: view uniform, three G-buffer samplers, the
/// lights uniform and one shadow map sampler per light.
fn write_composition_set(
    device: &ash::Device,
    set: vk::DescriptorSet,
    geometry: &GeometryTarget,
    shadows: &ShadowTargets,
    view: &UniformBuffer,
    lights: &UniformBuffer,
) {
    let view_info = view.descriptor();
    let lights_info = lights.descriptor();
    let position_info = geometry.color_descriptor(&geometry.position);
    let normal_info = geometry.color_descriptor(&geometry.normal);
    let albedo_info = geometry.color_descriptor(&geometry.albedo);
    let shadow_infos = shadows.depth_descriptors();

    let mut writes = vec![
        vk::WriteDescriptorSet::default()
            .dst_set(set)
            .dst_binding(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .buffer_info(std::slice::from_ref(&view_info)),
        vk::WriteDescriptorSet::default()
            .dst_set(set)
            .dst_binding(1)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .image_info(std::slice::from_ref(&position_info)),
        vk::WriteDescriptorSet::default()
            .dst_set(set)
            .dst_binding(2)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .image_info(std::slice::from_ref(&normal_info)),
        vk::WriteDescriptorSet::default()
            .dst_set(set)
            .dst_binding(3)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .image_info(std::slice::from_ref(&albedo_info)),
        vk::WriteDescriptorSet::default()
            .dst_set(set)
            .dst_binding(4)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .buffer_info(std::slice::from_ref(&lights_info)),
    ];
    for (i, info) in shadow_infos.iter().enumerate() {
        writes.push(
            vk::WriteDescriptorSet::default()
                .dst_set(set)
                .dst_binding(5 + i as u32)
                .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .image_info(std::slice::from_ref(info)),
        );
    }
    unsafe {
        device.update_descriptor_sets(&writes, &[]);
    }
}

#[allow(clippy::too_many_arguments)]
fn load_sky_sphere(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    device: &ash::Device,
    pool: vk::CommandPool,
    queue: vk::Queue,
    descriptor_sets: &mut DescriptorSetRegistry,
    layouts: &DescriptorSetLayoutRegistry,
    scene_matrices: &UniformBuffer,
    assets: SkyAssets,
    source: &mut dyn TextureSource,
) -> Result<Option<SkySphere>, RendererError> {
    let texture = match source.load(&assets.texture) {
        Ok(texture) => texture,
        Err(e) => {
            warn!("Sky texture unavailable: {}, skipping sky sphere", e);
            return Ok(None);
        }
    };

    let merged = merge_submeshes(std::slice::from_ref(&assets.mesh));
    let mesh = match MeshBuffer::upload(
        instance,
        physical_device,
        device,
        pool,
        queue,
        &merged.vertices,
        &merged.indices,
    ) {
        Ok(mesh) => mesh,
        Err(e) => {
            texture.destroy(device);
            return Err(e.into());
        }
    };

    let set = match descriptor_sets.allocate("skysphere", layouts.get("skysphere")) {
        Ok(set) => set,
        Err(e) => {
            mesh.destroy(device);
            texture.destroy(device);
            return Err(e.into());
        }
    };
    let buffer_info = scene_matrices.descriptor();
    let image_info = texture.descriptor();
    let writes = [
        vk::WriteDescriptorSet::default()
            .dst_set(set)
            .dst_binding(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .buffer_info(std::slice::from_ref(&buffer_info)),
        vk::WriteDescriptorSet::default()
            .dst_set(set)
            .dst_binding(1)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .image_info(std::slice::from_ref(&image_info)),
    ];
    unsafe {
        device.update_descriptor_sets(&writes, &[]);
    }

    Ok(Some(SkySphere { mesh, texture }))
}
