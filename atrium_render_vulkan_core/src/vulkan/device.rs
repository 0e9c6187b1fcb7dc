use ash::vk;
use thiserror::Error;

use crate::vulkan::{
    physical_device::{
        DeviceCapabilities, get_required_device_extensions, get_required_device_features,
    },
    queue::ResolvedQueueFamilies,
};

#[derive(Debug, Error)]
pub enum DeviceManagerError {
    #[error("Failed to create device: {0}")]
    CreateDeviceFailed(String),
}

pub struct DeviceManager {
    pub device: ash::Device,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub queue_families: ResolvedQueueFamilies,
}

impl DeviceManager {
    pub fn new(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        queue_families: ResolvedQueueFamilies,
        capabilities: DeviceCapabilities,
    ) -> Result<Self, DeviceManagerError> {
        let mut queue_infos = Vec::new();
        let queue_priority = [1.0f32];

        queue_infos.push(
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(queue_families.graphics)
                .queue_priorities(&queue_priority),
        );
        if queue_families.present != queue_families.graphics {
            queue_infos.push(
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(queue_families.present)
                    .queue_priorities(&queue_priority),
            );
        }

        let required_device_features = get_required_device_features();
        let raw_required_device_extensions: Vec<*const i8> =
            get_required_device_extensions(capabilities)
                .iter()
                .map(|s| s.as_ptr())
                .collect();

        let device_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_infos)
            .enabled_features(&required_device_features)
            .enabled_extension_names(&raw_required_device_extensions);

        let device = unsafe {
            instance
                .create_device(physical_device, &device_info, None)
                .map_err(|e| DeviceManagerError::CreateDeviceFailed(e.to_string()))?
        };

        let graphics_queue = unsafe { device.get_device_queue(queue_families.graphics, 0) };
        let present_queue = unsafe { device.get_device_queue(queue_families.present, 0) };

        Ok(Self {
            device,
            graphics_queue,
            present_queue,
            queue_families,
        })
    }
}

impl Drop for DeviceManager {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_device(None);
        }
    }
}
