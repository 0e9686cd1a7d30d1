// One framebuffer per swapchain image view

use super::pipeline::RenderPass;
use super::{Swapchain, VulkanDevice};
use crate::error::ResourceError;
use ash::vk;
use std::sync::Arc;

pub struct Framebuffers {
    pub framebuffers: Vec<vk::Framebuffer>,
    device: Arc<VulkanDevice>,
}

impl Framebuffers {
    pub fn new(
        device: Arc<VulkanDevice>,
        render_pass: &RenderPass,
        swapchain: &Swapchain,
    ) -> Result<Self, ResourceError> {
        let mut this = Self {
            framebuffers: Vec::with_capacity(swapchain.image_views.len()),
            device,
        };

        for &image_view in &swapchain.image_views {
            let attachments = [image_view];
            let framebuffer_info = vk::FramebufferCreateInfo::builder()
                .render_pass(render_pass.render_pass)
                .attachments(&attachments)
                .width(swapchain.extent.width)
                .height(swapchain.extent.height)
                .layers(1);

            let framebuffer = unsafe { this.device.device.create_framebuffer(&framebuffer_info, None) }
                .map_err(ResourceError::Framebuffer)?;
            this.framebuffers.push(framebuffer);
        }

        Ok(this)
    }

    pub fn get(&self, image_index: u32) -> Option<vk::Framebuffer> {
        self.framebuffers.get(image_index as usize).copied()
    }
}

impl Drop for Framebuffers {
    fn drop(&mut self) {
        unsafe {
            for &framebuffer in &self.framebuffers {
                self.device.device.destroy_framebuffer(framebuffer, None);
            }
        }
    }
}
