pub mod device;
pub mod instance;
pub mod memory;
pub mod physical_device;
pub mod queue;
pub mod surface;
pub mod swapchain;
pub mod sync;
