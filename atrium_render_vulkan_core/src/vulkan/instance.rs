use ash::vk;
use thiserror::Error;
use winit::{raw_window_handle::HasDisplayHandle, window::Window};

#[derive(Debug, Error)]
pub enum InstanceManagerError {
    #[error("Failed to query window display handle: {0}")]
    DisplayHandleFailed(String),

    #[error("Failed to enumerate required extensions: {0}")]
    ExtensionEnumerationFailed(String),

    #[error("Failed to create instance: {0}")]
    CreateInstanceFailed(String),

    #[error("Failed to create debug utils messenger: {0}")]
    CreateDebugUtilsMessengerFailed(String),
}

pub struct InstanceManager {
    pub instance: ash::Instance,
    debug_utils: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
}

impl InstanceManager {
    pub fn new(
        entry: &ash::Entry,
        window: &Window,
        enable_validation: bool,
    ) -> Result<Self, InstanceManagerError> {
        let app_name = std::ffi::CString::new(window.title()).unwrap_or_default();
        let engine_name = std::ffi::CString::new("Atrium").unwrap_or_default();

        let app_info = vk::ApplicationInfo::default()
            .api_version(vk::API_VERSION_1_3)
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 1, 0, 0));

        let layer_names: Vec<std::ffi::CString> = if enable_validation {
            vec![std::ffi::CString::new("VK_LAYER_KHRONOS_validation").unwrap_or_default()]
        } else {
            Vec::new()
        };

        let layer_name_pointers: Vec<*const i8> = layer_names
            .iter()
            .map(|layer_name| layer_name.as_ptr())
            .collect();

        let display_handle = window
            .display_handle()
            .map_err(|e| InstanceManagerError::DisplayHandleFailed(e.to_string()))?;

        let mut extension_name_pointers: Vec<*const i8> =
            ash_window::enumerate_required_extensions(display_handle.as_raw())
                .map_err(|e| InstanceManagerError::ExtensionEnumerationFailed(e.to_string()))?
                .to_vec();

        if enable_validation {
            extension_name_pointers.push(ash::ext::debug_utils::NAME.as_ptr());
        }

        #[cfg(any(target_os = "macos", target_os = "ios"))]
        let instance_create_flags = {
            use ash::khr::{get_physical_device_properties2, portability_enumeration};

            extension_name_pointers.push(portability_enumeration::NAME.as_ptr());
            extension_name_pointers.push(get_physical_device_properties2::NAME.as_ptr());
            vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR
        };
        #[cfg(not(any(target_os = "macos", target_os = "ios")))]
        let instance_create_flags = vk::InstanceCreateFlags::empty();

        let mut debug_create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION,
            )
            .pfn_user_callback(Some(vulkan_debug_utils_callback));

        let mut instance_create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_layer_names(&layer_name_pointers)
            .enabled_extension_names(&extension_name_pointers)
            .flags(instance_create_flags);

        if enable_validation {
            instance_create_info = instance_create_info.push_next(&mut debug_create_info);
        }

        let instance = unsafe {
            entry
                .create_instance(&instance_create_info, None)
                .map_err(|e| InstanceManagerError::CreateInstanceFailed(e.to_string()))?
        };

        let debug_utils = if enable_validation {
            let debug_utils_loader = ash::ext::debug_utils::Instance::new(entry, &instance);
            let debug_utils_messenger = unsafe {
                debug_utils_loader
                    .create_debug_utils_messenger(&debug_create_info, None)
                    .map_err(|e| {
                        InstanceManagerError::CreateDebugUtilsMessengerFailed(e.to_string())
                    })?
            };
            Some((debug_utils_loader, debug_utils_messenger))
        } else {
            None
        };

        Ok(Self {
            instance,
            debug_utils,
        })
    }
}

impl Drop for InstanceManager {
    fn drop(&mut self) {
        unsafe {
            if let Some((loader, messenger)) = self.debug_utils.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

unsafe extern "system" fn vulkan_debug_utils_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = unsafe { std::ffi::CStr::from_ptr((*p_callback_data).p_message) };
    let ty = format!("{:?}", message_type).to_lowercase();
    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[{}] {:?}", ty, message)
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[{}] {:?}", ty, message)
        }
        _ => log::debug!("[{}] {:?}", ty, message),
    }
    vk::FALSE
}
