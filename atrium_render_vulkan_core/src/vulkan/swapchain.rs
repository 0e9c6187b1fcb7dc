use ash::{khr::swapchain, vk};
use thiserror::Error;
use winit::window::Window;

use crate::vulkan::queue::ResolvedQueueFamilies;

#[derive(Debug, Error)]
pub enum SwapchainSupportError {
    #[error("Failed to enumerate swapchain support: {0}")]
    EnumerateSwapchainSupportFailed(String),

    #[error("Failed to enumerate swapchain formats: {0}")]
    EnumerateSwapchainFormatsFailed(String),

    #[error("Failed to enumerate swapchain present modes: {0}")]
    EnumerateSwapchainPresentModesFailed(String),
}

pub struct SwapchainSupportDetails {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

pub fn get_swapchain_support_details(
    surface_loader: &ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
    device: vk::PhysicalDevice,
) -> Result<SwapchainSupportDetails, SwapchainSupportError> {
    Ok(unsafe {
        SwapchainSupportDetails {
            capabilities: surface_loader
                .get_physical_device_surface_capabilities(device, surface)
                .map_err(|e| {
                    SwapchainSupportError::EnumerateSwapchainSupportFailed(e.to_string())
                })?,
            formats: surface_loader
                .get_physical_device_surface_formats(device, surface)
                .map_err(|e| {
                    SwapchainSupportError::EnumerateSwapchainFormatsFailed(e.to_string())
                })?,
            present_modes: surface_loader
                .get_physical_device_surface_present_modes(device, surface)
                .map_err(|e| {
                    SwapchainSupportError::EnumerateSwapchainPresentModesFailed(e.to_string())
                })?,
        }
    })
}

#[derive(Debug, Error)]
pub enum SwapchainManagerError {
    #[error("Failed to create swapchain: {0}")]
    CreateSwapchainFailed(String),

    #[error("Failed to get swapchain images: {0}")]
    GetSwapchainImagesFailed(String),

    #[error("Failed to create swapchain image view: {0}")]
    CreateImageViewFailed(String),
}

pub struct SwapchainManager {
    device: ash::Device,
    pub swapchain_loader: swapchain::Device,
    pub swapchain: vk::SwapchainKHR,
    pub swapchain_images: Vec<vk::Image>,
    pub swapchain_image_views: Vec<vk::ImageView>,
    pub surface_format: vk::Format,
    pub image_extent: vk::Extent2D,
}

impl SwapchainManager {
    pub fn new(
        window: &Window,
        instance: &ash::Instance,
        surface: vk::SurfaceKHR,
        queue_families: ResolvedQueueFamilies,
        support_details: &SwapchainSupportDetails,
        logical_device: &ash::Device,
    ) -> Result<Self, SwapchainManagerError> {
        let mut min_image_count = support_details.capabilities.min_image_count + 1;
        if support_details.capabilities.max_image_count > 0
            && min_image_count > support_details.capabilities.max_image_count
        {
            min_image_count = support_details.capabilities.max_image_count;
        }

        let surface_format = select_preferred_surface_format(&support_details.formats);
        let image_extent = determine_swapchain_extent(window, &support_details.capabilities);
        let present_mode = select_preferred_present_mode(&support_details.present_modes);

        let mut swapchain_create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(min_image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(image_extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(support_details.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        let indices = [queue_families.graphics, queue_families.present];
        if queue_families.graphics != queue_families.present {
            swapchain_create_info = swapchain_create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&indices);
        } else {
            swapchain_create_info =
                swapchain_create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE);
        }

        let swapchain_loader = swapchain::Device::new(instance, logical_device);

        let swapchain = unsafe {
            swapchain_loader
                .create_swapchain(&swapchain_create_info, None)
                .map_err(|e| SwapchainManagerError::CreateSwapchainFailed(e.to_string()))
        }?;

        let swapchain_images = unsafe {
            swapchain_loader
                .get_swapchain_images(swapchain)
                .map_err(|e| SwapchainManagerError::GetSwapchainImagesFailed(e.to_string()))?
        };

        let mut swapchain_image_views = Vec::with_capacity(swapchain_images.len());
        for &image in &swapchain_images {
            let view_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(surface_format.format)
                .subresource_range(
                    vk::ImageSubresourceRange::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .base_mip_level(0)
                        .level_count(1)
                        .base_array_layer(0)
                        .layer_count(1),
                );
            let view = unsafe {
                logical_device
                    .create_image_view(&view_info, None)
                    .map_err(|e| SwapchainManagerError::CreateImageViewFailed(e.to_string()))?
            };
            swapchain_image_views.push(view);
        }

        log::info!(
            "Swapchain: {} images, {:?}, {}x{}, {:?}",
            swapchain_images.len(),
            surface_format.format,
            image_extent.width,
            image_extent.height,
            present_mode
        );

        Ok(Self {
            device: logical_device.clone(),
            swapchain_loader,
            swapchain,
            swapchain_images,
            swapchain_image_views,
            surface_format: surface_format.format,
            image_extent,
        })
    }

    pub fn image_count(&self) -> usize {
        self.swapchain_images.len()
    }
}

impl Drop for SwapchainManager {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.swapchain_image_views {
                self.device.destroy_image_view(view, None);
            }
            self.swapchain_loader
                .destroy_swapchain(self.swapchain, None);
        }
    }
}

fn select_preferred_surface_format(formats: &[vk::SurfaceFormatKHR]) -> &vk::SurfaceFormatKHR {
    formats
        .iter()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .unwrap_or(&formats[0])
}

fn determine_swapchain_extent(
    window: &Window,
    capabilities: &vk::SurfaceCapabilitiesKHR,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    let window_size = window.inner_size();
    let width = window_size.width.clamp(
        capabilities.min_image_extent.width,
        capabilities.max_image_extent.width,
    );
    let height = window_size.height.clamp(
        capabilities.min_image_extent.height,
        capabilities.max_image_extent.height,
    );
    vk::Extent2D { width, height }
}

fn select_preferred_present_mode(
    available_present_modes: &[vk::PresentModeKHR],
) -> vk::PresentModeKHR {
    // MAILBOX for latency when the driver offers it, FIFO is always there
    if available_present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}
