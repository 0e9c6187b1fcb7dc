pub mod context;
pub mod vulkan;
