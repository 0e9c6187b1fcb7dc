use ash::vk;

#[derive(Debug, Default)]
pub struct QueueFamilyIndices {
    pub graphics_queue_family_index: Option<u32>,
    pub present_queue_family_index: Option<u32>,
}

impl QueueFamilyIndices {
    pub fn is_complete(&self) -> bool {
        self.graphics_queue_family_index.is_some() && self.present_queue_family_index.is_some()
    }

    pub fn resolve(&self) -> Option<ResolvedQueueFamilies> {
        Some(ResolvedQueueFamilies {
            graphics: self.graphics_queue_family_index?,
            present: self.present_queue_family_index?,
        })
    }
}

/// Queue family indices of a device that passed the suitability check.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedQueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

pub fn find_queue_family_indices(
    instance: &ash::Instance,
    surface_loader: &ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
    physical_device: vk::PhysicalDevice,
) -> QueueFamilyIndices {
    let mut indices = QueueFamilyIndices::default();

    let queue_families =
        unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

    for (i, queue_family) in queue_families.iter().enumerate() {
        if queue_family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            indices.graphics_queue_family_index = Some(i as u32);
        }

        let present_support = unsafe {
            surface_loader
                .get_physical_device_surface_support(physical_device, i as u32, surface)
                .unwrap_or(false)
        };

        if present_support {
            indices.present_queue_family_index = Some(i as u32);
        }

        if indices.is_complete() {
            break;
        }
    }

    indices
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incomplete_indices_do_not_resolve() {
        let indices = QueueFamilyIndices {
            graphics_queue_family_index: Some(0),
            present_queue_family_index: None,
        };
        assert!(!indices.is_complete());
        assert!(indices.resolve().is_none());
    }

    #[test]
    fn complete_indices_resolve() {
        let indices = QueueFamilyIndices {
            graphics_queue_family_index: Some(1),
            present_queue_family_index: Some(2),
        };
        let resolved = indices.resolve().unwrap();
        assert_eq!(resolved.graphics, 1);
        assert_eq!(resolved.present, 2);
    }
}
