use ash::vk;
use thiserror::Error;
use winit::window::Window;

use crate::vulkan::{
    device::{DeviceManager, DeviceManagerError},
    instance::{InstanceManager, InstanceManagerError},
    physical_device::{PhysicalDeviceManager, PhysicalDeviceManagerError},
    surface::{SurfaceManager, SurfaceManagerError},
    swapchain::{
        SwapchainManager, SwapchainManagerError, SwapchainSupportError,
        get_swapchain_support_details,
    },
};

#[derive(Debug, Error)]
pub enum GraphicsContextError {
    #[error("Failed to load Vulkan entry: {0}")]
    LoadEntryFailed(String),

    #[error(transparent)]
    Instance(#[from] InstanceManagerError),

    #[error(transparent)]
    Surface(#[from] SurfaceManagerError),

    #[error(transparent)]
    PhysicalDevice(#[from] PhysicalDeviceManagerError),

    #[error(transparent)]
    Device(#[from] DeviceManagerError),

    #[error(transparent)]
    SwapchainSupport(#[from] SwapchainSupportError),

    #[error(transparent)]
    Swapchain(#[from] SwapchainManagerError),

    #[error("Failed to create command pool: {0}")]
    CreateCommandPoolFailed(String),
}

/// Owns the device-side plumbing every renderer needs: instance, surface,
/// device, queues, swapchain and a graphics command pool. Fields drop in
/// declaration order, so the swapchain goes before the device and the device
/// before the instance.
pub struct GraphicsContext {
    pub swapchain_manager: SwapchainManager,
    pub command_pool: vk::CommandPool,
    pub device_manager: DeviceManager,
    pub physical_device_manager: PhysicalDeviceManager,
    pub surface_manager: SurfaceManager,
    pub instance_manager: InstanceManager,
    pub entry: ash::Entry,
}

impl GraphicsContext {
    pub fn new(window: &Window, enable_validation: bool) -> Result<Self, GraphicsContextError> {
        let entry = unsafe {
            ash::Entry::load().map_err(|e| GraphicsContextError::LoadEntryFailed(e.to_string()))?
        };

        let instance_manager = InstanceManager::new(&entry, window, enable_validation)?;
        let surface_manager = SurfaceManager::new(&entry, &instance_manager, window)?;
        let physical_device_manager =
            PhysicalDeviceManager::new(&instance_manager, &surface_manager)?;
        let device_manager = DeviceManager::new(
            &instance_manager.instance,
            physical_device_manager.physical_device,
            physical_device_manager.queue_families,
            physical_device_manager.capabilities,
        )?;

        let support_details = get_swapchain_support_details(
            &surface_manager.surface_loader,
            surface_manager.surface,
            physical_device_manager.physical_device,
        )?;
        let swapchain_manager = SwapchainManager::new(
            window,
            &instance_manager.instance,
            surface_manager.surface,
            physical_device_manager.queue_families,
            &support_details,
            &device_manager.device,
        )?;

        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(physical_device_manager.queue_families.graphics)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let command_pool = unsafe {
            device_manager
                .device
                .create_command_pool(&pool_info, None)
                .map_err(|e| GraphicsContextError::CreateCommandPoolFailed(e.to_string()))?
        };

        Ok(Self {
            swapchain_manager,
            command_pool,
            device_manager,
            physical_device_manager,
            surface_manager,
            instance_manager,
            entry,
        })
    }

    pub fn device(&self) -> &ash::Device {
        &self.device_manager.device
    }

    pub fn instance(&self) -> &ash::Instance {
        &self.instance_manager.instance
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device_manager.physical_device
    }
}

impl Drop for GraphicsContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device_manager.device.device_wait_idle();
            self.device_manager
                .device
                .destroy_command_pool(self.command_pool, None);
        }
    }
}
