use std::ffi::CStr;

use ash::{khr, vk};
use thiserror::Error;

use crate::vulkan::{
    instance::InstanceManager,
    queue::{ResolvedQueueFamilies, find_queue_family_indices},
    surface::SurfaceManager,
    swapchain::get_swapchain_support_details,
};

#[derive(Debug, Error)]
pub enum PhysicalDeviceManagerError {
    #[error("Failed to enumerate physical devices: {0}")]
    EnumeratePhysicalDevicesFailed(String),

    #[error("Failed to find a suitable GPU")]
    FindSuitableGpuFailed,

    #[error("Failed to find a supported depth attachment format")]
    NoSupportedDepthFormat,
}

/// Optional device abilities. Absence disables the optimization, never the renderer.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceCapabilities {
    pub dedicated_allocation: bool,
    pub relaxed_rasterization_order: bool,
}

pub struct PhysicalDeviceManager {
    pub physical_device: vk::PhysicalDevice,
    pub queue_families: ResolvedQueueFamilies,
    pub capabilities: DeviceCapabilities,
}

impl PhysicalDeviceManager {
    pub fn new(
        instance_manager: &InstanceManager,
        surface_manager: &SurfaceManager,
    ) -> Result<Self, PhysicalDeviceManagerError> {
        let instance = &instance_manager.instance;
        let physical_devices = unsafe {
            instance.enumerate_physical_devices().map_err(|e| {
                PhysicalDeviceManagerError::EnumeratePhysicalDevicesFailed(e.to_string())
            })?
        };

        let (physical_device, queue_families) = physical_devices
            .into_iter()
            .find_map(|physical_device| {
                let indices = find_queue_family_indices(
                    instance,
                    &surface_manager.surface_loader,
                    surface_manager.surface,
                    physical_device,
                );
                let extensions_supported =
                    check_device_extension_support(instance, physical_device);
                let swapchain_adequate = extensions_supported
                    && get_swapchain_support_details(
                        &surface_manager.surface_loader,
                        surface_manager.surface,
                        physical_device,
                    )
                    .map(|support| {
                        !support.formats.is_empty() && !support.present_modes.is_empty()
                    })
                    .unwrap_or(false);

                let features = unsafe { instance.get_physical_device_features(physical_device) };
                let features_supported = features.sampler_anisotropy == vk::TRUE;

                if extensions_supported && swapchain_adequate && features_supported {
                    indices.resolve().map(|resolved| (physical_device, resolved))
                } else {
                    None
                }
            })
            .ok_or(PhysicalDeviceManagerError::FindSuitableGpuFailed)?;

        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let device_name = properties
            .device_name_as_c_str()
            .unwrap_or(c"unknown")
            .to_string_lossy();
        log::info!("Using GPU: {}", device_name);

        let capabilities = probe_capabilities(instance, physical_device);
        if capabilities.dedicated_allocation {
            log::info!("Dedicated allocation extension available");
        }
        if capabilities.relaxed_rasterization_order {
            log::info!("Relaxed rasterization order extension available");
        }

        Ok(Self {
            physical_device,
            queue_families,
            capabilities,
        })
    }

    /// First depth format usable as an optimal-tiling depth attachment, highest
    /// precision first.
    pub fn find_supported_depth_format(
        &self,
        instance: &ash::Instance,
    ) -> Result<vk::Format, PhysicalDeviceManagerError> {
        let candidates = [
            vk::Format::D32_SFLOAT_S8_UINT,
            vk::Format::D32_SFLOAT,
            vk::Format::D24_UNORM_S8_UINT,
            vk::Format::D16_UNORM_S8_UINT,
            vk::Format::D16_UNORM,
        ];
        candidates
            .into_iter()
            .find(|&format| {
                let props = unsafe {
                    instance.get_physical_device_format_properties(self.physical_device, format)
                };
                props
                    .optimal_tiling_features
                    .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
            })
            .ok_or(PhysicalDeviceManagerError::NoSupportedDepthFormat)
    }
}

/// Extensions to enable on the logical device: the mandatory set plus every
/// probed vendor optimization, which is only valid to use once enabled here.
pub fn get_required_device_extensions(capabilities: DeviceCapabilities) -> Vec<&'static CStr> {
    let mut extensions = vec![khr::swapchain::NAME];
    #[cfg(any(target_os = "macos", target_os = "ios"))]
    extensions.push(ash::khr::portability_subset::NAME);
    if capabilities.dedicated_allocation {
        extensions.push(ash::nv::dedicated_allocation::NAME);
    }
    if capabilities.relaxed_rasterization_order {
        extensions.push(ash::amd::rasterization_order::NAME);
    }
    extensions
}

pub fn get_required_device_features() -> vk::PhysicalDeviceFeatures {
    vk::PhysicalDeviceFeatures::default().sampler_anisotropy(true)
}

fn check_device_extension_support(instance: &ash::Instance, device: vk::PhysicalDevice) -> bool {
    let available_extensions = unsafe {
        instance
            .enumerate_device_extension_properties(device)
            .unwrap_or_default()
    };

    // Suitability only demands the mandatory set; vendor extensions are
    // probed separately and merely disable their optimization when absent.
    get_required_device_extensions(DeviceCapabilities::default())
        .iter()
        .all(|required| {
            available_extensions.iter().any(|ext| {
                ext.extension_name_as_c_str()
                    .map(|name| name == *required)
                    .unwrap_or(false)
            })
        })
}

fn probe_capabilities(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
) -> DeviceCapabilities {
    let available_extensions = unsafe {
        instance
            .enumerate_device_extension_properties(device)
            .unwrap_or_default()
    };
    let has = |name: &CStr| {
        available_extensions.iter().any(|ext| {
            ext.extension_name_as_c_str()
                .map(|avail| avail == name)
                .unwrap_or(false)
        })
    };

    DeviceCapabilities {
        dedicated_allocation: has(ash::nv::dedicated_allocation::NAME),
        relaxed_rasterization_order: has(ash::amd::rasterization_order::NAME),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mandatory_extensions_never_include_vendor_ones() {
        let extensions = get_required_device_extensions(DeviceCapabilities::default());
        assert!(extensions.contains(&khr::swapchain::NAME));
        assert!(!extensions.contains(&ash::nv::dedicated_allocation::NAME));
        assert!(!extensions.contains(&ash::amd::rasterization_order::NAME));
    }

    #[test]
    fn probed_vendor_extensions_are_enabled_on_the_device() {
        let extensions = get_required_device_extensions(DeviceCapabilities {
            dedicated_allocation: true,
            relaxed_rasterization_order: true,
        });
        assert!(extensions.contains(&ash::nv::dedicated_allocation::NAME));
        assert!(extensions.contains(&ash::amd::rasterization_order::NAME));
    }
}
