// Backend module - Vulkan object wrappers
//
// Each wrapper owns one kind of Vulkan object and holds an Arc to whatever
// it was created from, so parents always outlive children.

pub mod commands;
pub mod device;
pub mod framebuffer;
pub mod instance;
pub mod pipeline;
pub mod selection;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use device::VulkanDevice;
pub use instance::Instance;
pub use surface::{Surface, SwapchainSupport};
pub use swapchain::Swapchain;
