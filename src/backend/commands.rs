// Command pool and the single reusable command buffer
//
// The buffer is reset and re-recorded every frame. That is only safe because
// the frame fence guarantees the previous submission has finished.

use super::pipeline::{full_scissor, full_viewport};
use super::VulkanDevice;
use crate::error::ResourceError;
use ash::prelude::VkResult;
use ash::vk;
use std::sync::Arc;

/// What one triangle draw needs from the rest of the renderer
pub struct DrawTarget {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub pipeline: vk::Pipeline,
    pub extent: vk::Extent2D,
    pub clear_color: [f32; 4],
}

pub struct CommandContext {
    pub pool: vk::CommandPool,
    pub buffer: vk::CommandBuffer,
    device: Arc<VulkanDevice>,
}

impl CommandContext {
    pub fn new(device: Arc<VulkanDevice>) -> Result<Self, ResourceError> {
        // Individual buffers may be reset
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(device.graphics_queue_family);

        let pool = unsafe { device.device.create_command_pool(&pool_info, None) }
            .map_err(ResourceError::CommandPool)?;

        let mut this = Self {
            pool,
            buffer: vk::CommandBuffer::null(),
            device,
        };

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(this.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let buffers = unsafe { this.device.device.allocate_command_buffers(&alloc_info) }
            .map_err(ResourceError::CommandBuffer)?;
        this.buffer = buffers
            .into_iter()
            .next()
            .ok_or(ResourceError::CommandBuffer(vk::Result::ERROR_UNKNOWN))?;

        Ok(this)
    }

    /// Reset the buffer and record one render pass drawing three vertices
    pub fn record_triangle(&self, target: &DrawTarget) -> VkResult<()> {
        let device = &self.device.device;
        let cmd = self.buffer;

        unsafe {
            device.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?;

            let begin_info = vk::CommandBufferBeginInfo::builder();
            device.begin_command_buffer(cmd, &begin_info)?;

            let clear_values = [vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: target.clear_color,
                },
            }];

            let render_pass_info = vk::RenderPassBeginInfo::builder()
                .render_pass(target.render_pass)
                .framebuffer(target.framebuffer)
                .render_area(full_scissor(target.extent))
                .clear_values(&clear_values);

            device.cmd_begin_render_pass(cmd, &render_pass_info, vk::SubpassContents::INLINE);
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, target.pipeline);
            device.cmd_set_viewport(cmd, 0, &[full_viewport(target.extent)]);
            device.cmd_set_scissor(cmd, 0, &[full_scissor(target.extent)]);
            device.cmd_draw(cmd, 3, 1, 0, 0);
            device.cmd_end_render_pass(cmd);

            device.end_command_buffer(cmd)
        }
    }
}

impl Drop for CommandContext {
    fn drop(&mut self) {
        // Frees the buffer with it
        unsafe {
            self.device.device.destroy_command_pool(self.pool, None);
        }
    }
}
