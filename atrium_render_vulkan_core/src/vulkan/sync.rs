use ash::vk;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Failed to create semaphore: {0}")]
    CreateSemaphoreFailed(String),

    #[error("Failed to create fence: {0}")]
    CreateFenceFailed(String),
}

pub fn create_semaphore(device: &ash::Device) -> Result<vk::Semaphore, SyncError> {
    let info = vk::SemaphoreCreateInfo::default();
    unsafe {
        device
            .create_semaphore(&info, None)
            .map_err(|e| SyncError::CreateSemaphoreFailed(e.to_string()))
    }
}

pub fn create_fence(device: &ash::Device, signaled: bool) -> Result<vk::Fence, SyncError> {
    let flags = if signaled {
        vk::FenceCreateFlags::SIGNALED
    } else {
        vk::FenceCreateFlags::empty()
    };
    let info = vk::FenceCreateInfo::default().flags(flags);
    unsafe {
        device
            .create_fence(&info, None)
            .map_err(|e| SyncError::CreateFenceFailed(e.to_string()))
    }
}
