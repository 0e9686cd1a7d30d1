// Triangle renderer
//
// Owns every Vulkan object, built in dependency order:
//   instance -> surface -> device -> swapchain -> render pass -> pipeline
//   -> framebuffers -> command buffer -> sync objects
//
// Field order matters for Drop: fields drop top to bottom, which is the
// reverse of creation. The Arc parents inside each wrapper keep that true
// even if a handle is cloned out.

use crate::backend::commands::{CommandContext, DrawTarget};
use crate::backend::framebuffer::Framebuffers;
use crate::backend::instance::InstanceOptions;
use crate::backend::pipeline::{GraphicsPipeline, RenderPass};
use crate::backend::selection::{select_device, DeviceRequirements, VulkanDeviceSource};
use crate::backend::shader::ShaderModule;
use crate::backend::sync::FrameSync;
use crate::backend::{Instance, Surface, Swapchain, VulkanDevice};
use crate::config::Config;
use crate::error::RendererError;
use crate::frame::FrameBackend;
use crate::platform::SurfaceProvider;
use ash::prelude::VkResult;
use ash::vk;
use std::sync::Arc;

pub struct Renderer {
    sync: FrameSync,
    commands: CommandContext,
    framebuffers: Framebuffers,
    pipeline: GraphicsPipeline,
    render_pass: RenderPass,
    swapchain: Swapchain,
    device: Arc<VulkanDevice>,
    _surface: Arc<Surface>,
    _instance: Arc<Instance>,
    clear_color: [f32; 4],
}

impl Renderer {
    /// Bring up everything needed to draw into `window`.
    ///
    /// Any failure is fatal; objects created before it are released in
    /// reverse order as their owners drop.
    pub fn new(window: &dyn SurfaceProvider, config: &Config) -> Result<Self, RendererError> {
        let options = InstanceOptions {
            validation_layers: config.debug.validation_layers,
            log_extensions: config.debug.log_extensions,
        };
        let instance = Instance::new(&config.window.title, window, options)?;
        let surface = Surface::new(instance.clone(), window)?;

        let requirements = DeviceRequirements::from_config(&config.device);
        let source = VulkanDeviceSource {
            instance: &instance.instance,
            surface: &surface,
        };
        let selected = select_device(&source, &requirements)?;

        let device = VulkanDevice::new(instance.clone(), &selected, &requirements.extensions)?;

        let swapchain = Swapchain::new(
            device.clone(),
            surface.clone(),
            window.framebuffer_size(),
            config.present_mode(),
        )?;

        let render_pass = RenderPass::new(device.clone(), swapchain.format)?;

        // Modules are only needed until the pipeline is linked
        let pipeline = {
            let vertex = ShaderModule::load(device.clone(), &config.assets.vertex_shader_path())?;
            let fragment = ShaderModule::load(device.clone(), &config.assets.fragment_shader_path())?;
            GraphicsPipeline::new(device.clone(), &render_pass, &vertex, &fragment)?
        };

        let framebuffers = Framebuffers::new(device.clone(), &render_pass, &swapchain)?;
        let commands = CommandContext::new(device.clone())?;
        let sync = FrameSync::new(device.clone())?;

        log::info!(
            "Renderer ready on {} ({}x{}, {} swapchain images, {:?})",
            device.name,
            swapchain.extent.width,
            swapchain.extent.height,
            swapchain.image_count(),
            swapchain.present_mode
        );

        Ok(Self {
            sync,
            commands,
            framebuffers,
            pipeline,
            render_pass,
            swapchain,
            device,
            _surface: surface,
            _instance: instance,
            clear_color: config.graphics.clear_color,
        })
    }
}

impl FrameBackend for Renderer {
    fn image_count(&self) -> u32 {
        self.swapchain.image_count()
    }

    fn wait_frame_fence(&mut self) -> VkResult<()> {
        unsafe {
            self.device
                .device
                .wait_for_fences(&[self.sync.in_flight_fence], true, u64::MAX)
        }
    }

    fn reset_frame_fence(&mut self) -> VkResult<()> {
        unsafe { self.device.device.reset_fences(&[self.sync.in_flight_fence]) }
    }

    fn acquire_next_image(&mut self) -> VkResult<(u32, bool)> {
        self.swapchain
            .acquire_next_image(u64::MAX, self.sync.image_available)
    }

    fn record_draw(&mut self, image_index: u32) -> VkResult<()> {
        let framebuffer = self
            .framebuffers
            .get(image_index)
            .ok_or(vk::Result::ERROR_UNKNOWN)?;

        self.commands.record_triangle(&DrawTarget {
            render_pass: self.render_pass.render_pass,
            framebuffer,
            pipeline: self.pipeline.pipeline,
            extent: self.swapchain.extent,
            clear_color: self.clear_color,
        })
    }

    fn submit(&mut self) -> VkResult<()> {
        let wait_semaphores = [self.sync.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [self.commands.buffer];
        let signal_semaphores = [self.sync.render_finished];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device.device.queue_submit(
                self.device.graphics_queue,
                &[submit_info.build()],
                self.sync.in_flight_fence,
            )
        }
    }

    fn present(&mut self, image_index: u32) -> VkResult<bool> {
        self.swapchain
            .present(self.device.present_queue, image_index, &[self.sync.render_finished])
    }

    fn rearm_frame_fence(&mut self) -> VkResult<()> {
        // An empty batch still signals the fence once prior work completes
        unsafe {
            self.device
                .device
                .queue_submit(self.device.graphics_queue, &[], self.sync.in_flight_fence)
        }
    }

    fn wait_idle(&mut self) -> VkResult<()> {
        self.device.wait_idle()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");

        // Nothing may be destroyed while the GPU still uses it
        if let Err(e) = self.device.wait_idle() {
            log::warn!("device_wait_idle failed during teardown: {}", e);
        }
    }
}
