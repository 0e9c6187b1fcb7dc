use ash::{khr, vk};
use thiserror::Error;
use winit::{
    raw_window_handle::{HasDisplayHandle, HasWindowHandle},
    window::Window,
};

use crate::vulkan::instance::InstanceManager;

#[derive(Debug, Error)]
pub enum SurfaceManagerError {
    #[error("Failed to query window handles: {0}")]
    WindowHandleFailed(String),

    #[error("Failed to create window surface: {0}")]
    CreateSurfaceFailed(String),
}

pub struct SurfaceManager {
    pub surface_loader: khr::surface::Instance,
    pub surface: vk::SurfaceKHR,
}

impl SurfaceManager {
    pub fn new(
        entry: &ash::Entry,
        instance_manager: &InstanceManager,
        window: &Window,
    ) -> Result<Self, SurfaceManagerError> {
        let surface_loader = khr::surface::Instance::new(entry, &instance_manager.instance);
        let display_handle = window
            .display_handle()
            .map_err(|e| SurfaceManagerError::WindowHandleFailed(e.to_string()))?;
        let window_handle = window
            .window_handle()
            .map_err(|e| SurfaceManagerError::WindowHandleFailed(e.to_string()))?;
        let surface = unsafe {
            ash_window::create_surface(
                entry,
                &instance_manager.instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
            .map_err(|e| SurfaceManagerError::CreateSurfaceFailed(e.to_string()))?
        };
        Ok(Self {
            surface_loader,
            surface,
        })
    }
}

impl Drop for SurfaceManager {
    fn drop(&mut self) {
        unsafe {
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}
