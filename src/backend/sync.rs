// Synchronization primitives
//
// One frame in flight: the CPU never records frame N+1 while frame N is
// still executing, so a single set of primitives is enough.

use super::VulkanDevice;
use crate::error::ResourceError;
use ash::vk;
use std::sync::Arc;

/// Per-frame semaphores and the frame-complete fence
pub struct FrameSync {
    /// Signaled by acquire, waited on by submit
    pub image_available: vk::Semaphore,
    /// Signaled by submit, waited on by present
    pub render_finished: vk::Semaphore,
    pub in_flight_fence: vk::Fence,
    device: Arc<VulkanDevice>,
}

impl FrameSync {
    pub fn new(device: Arc<VulkanDevice>) -> Result<Self, ResourceError> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        // Start signaled so the first wait returns immediately
        let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);

        let mut this = Self {
            image_available: vk::Semaphore::null(),
            render_finished: vk::Semaphore::null(),
            in_flight_fence: vk::Fence::null(),
            device,
        };

        unsafe {
            this.image_available = this
                .device
                .device
                .create_semaphore(&semaphore_info, None)
                .map_err(ResourceError::SyncObject)?;
            this.render_finished = this
                .device
                .device
                .create_semaphore(&semaphore_info, None)
                .map_err(ResourceError::SyncObject)?;
            this.in_flight_fence = this
                .device
                .device
                .create_fence(&fence_info, None)
                .map_err(ResourceError::SyncObject)?;
        }

        Ok(this)
    }
}

impl Drop for FrameSync {
    fn drop(&mut self) {
        // Destroying a null handle is a no-op
        unsafe {
            self.device.device.destroy_semaphore(self.image_available, None);
            self.device.device.destroy_semaphore(self.render_finished, None);
            self.device.device.destroy_fence(self.in_flight_fence, None);
        }
    }
}
