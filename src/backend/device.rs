// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Logical device creation on the selected physical device
// - One queue per distinct queue family (graphics, present)
// - Keep the instance alive until the device is gone

use super::selection::{QueueFamilyIndices, SelectedDevice};
use super::Instance;
use crate::error::InitError;
use ash::prelude::VkResult;
use ash::vk;
use std::ffi::{c_char, CString};
use std::sync::Arc;

static QUEUE_PRIORITIES: [f32; 1] = [1.0];

/// One create info per distinct family, each with a single queue at priority 1.0
pub fn queue_create_infos(indices: &QueueFamilyIndices) -> Vec<vk::DeviceQueueCreateInfo> {
    indices
        .unique_families()
        .into_iter()
        .map(|family| {
            vk::DeviceQueueCreateInfo::builder()
                .queue_family_index(family)
                .queue_priorities(&QUEUE_PRIORITIES)
                .build()
        })
        .collect()
}

/// Vulkan device wrapper with automatic cleanup
pub struct VulkanDevice {
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub instance: Arc<Instance>,

    // Queue handles
    pub graphics_queue: vk::Queue,
    pub graphics_queue_family: u32,
    pub present_queue: vk::Queue,
    pub present_queue_family: u32,

    pub name: String,
}

impl VulkanDevice {
    /// Create the logical device.
    ///
    /// # Arguments
    /// * `selected` - Physical device and queue families from selection
    /// * `extensions` - Device extensions to enable (already verified present)
    pub fn new(
        instance: Arc<Instance>,
        selected: &SelectedDevice,
        extensions: &[String],
    ) -> Result<Arc<Self>, InitError> {
        let physical_device = selected.handle();
        let indices = selected.queue_families();

        let queue_infos = queue_create_infos(&indices);

        let extension_names = extensions
            .iter()
            .map(|ext| CString::new(ext.as_str()))
            .collect::<Result<Vec<_>, _>>()?;
        let extension_ptrs: Vec<*const c_char> = extension_names.iter().map(|ext| ext.as_ptr()).collect();

        // Nothing beyond the checked capabilities is switched on
        let features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_ptrs)
            .enabled_features(&features);

        let device = unsafe {
            instance
                .instance
                .create_device(physical_device, &create_info, None)
        }
        .map_err(InitError::DeviceCreation)?;

        let graphics_queue = unsafe { device.get_device_queue(selected.graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(selected.present_family, 0) };

        log::info!(
            "Created logical device on {} with {} queue(s)",
            selected.candidate.name,
            queue_infos.len()
        );

        Ok(Arc::new(Self {
            device,
            physical_device,
            instance,
            graphics_queue,
            graphics_queue_family: selected.graphics_family,
            present_queue,
            present_queue_family: selected.present_family,
            name: selected.candidate.name.clone(),
        }))
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> VkResult<()> {
        unsafe { self.device.device_wait_idle() }
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");

        if let Err(e) = self.wait_idle() {
            log::warn!("device_wait_idle failed during teardown: {}", e);
        }

        unsafe {
            self.device.destroy_device(None);
        }
    }
}
