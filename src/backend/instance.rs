// Vulkan Instance - the process-wide API connection
//
// Responsibilities:
// - Load the Vulkan library
// - Instance creation with the window system's surface extensions
// - Optional validation layer + debug messenger
//
// Created first, destroyed last. Everything else holds an Arc to it.

use crate::error::InitError;
use crate::platform::SurfaceProvider;
use ash::extensions::ext::DebugUtils;
use ash::{vk, Entry};
use std::ffi::{c_char, CStr, CString};
use std::sync::Arc;

pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Diagnostics switches passed in at startup
#[derive(Debug, Clone, Copy, Default)]
pub struct InstanceOptions {
    pub validation_layers: bool,
    pub log_extensions: bool,
}

pub struct Instance {
    pub instance: ash::Instance,
    pub entry: Entry,
    debug_utils: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
}

impl Instance {
    /// Create the instance for presenting to `window`.
    ///
    /// Validation is silently downgraded to off (with a warning) when the
    /// layer is not installed.
    pub fn new(
        app_name: &str,
        window: &dyn SurfaceProvider,
        options: InstanceOptions,
    ) -> Result<Arc<Self>, InitError> {
        log::info!("Creating Vulkan instance: {}", app_name);

        let entry = unsafe { Entry::load() }?;

        let enable_validation = options.validation_layers && Self::validation_layer_available(&entry);
        if options.validation_layers && !enable_validation {
            log::warn!("Validation layers requested but not available, continuing without them");
        }

        let mut extensions = window.required_instance_extensions()?;
        if enable_validation {
            extensions.push(DebugUtils::name());
        }

        if options.log_extensions {
            log::info!("Enabled instance extensions:");
            for extension in &extensions {
                log::info!("\t{}", extension.to_string_lossy());
            }
        }

        let instance = Self::create_instance(&entry, app_name, &extensions, enable_validation)?;

        // From here on a failure must still destroy the instance
        let mut this = Self {
            instance,
            entry,
            debug_utils: None,
        };

        if enable_validation {
            this.debug_utils = Some(this.setup_debug_messenger()?);
            log::info!("Validation layers enabled");
        }

        Ok(Arc::new(this))
    }

    fn validation_layer_available(entry: &Entry) -> bool {
        let layers = match entry.enumerate_instance_layer_properties() {
            Ok(layers) => layers,
            Err(e) => {
                log::warn!("Failed to enumerate instance layers: {}", e);
                return false;
            }
        };

        layers
            .iter()
            .any(|layer| unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) } == VALIDATION_LAYER)
    }

    fn create_instance(
        entry: &Entry,
        app_name: &str,
        extensions: &[&CStr],
        enable_validation: bool,
    ) -> Result<ash::Instance, InitError> {
        let app_name_cstr = CString::new(app_name)?;

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(c"No Engine")
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        let extension_names: Vec<*const c_char> = extensions.iter().map(|ext| ext.as_ptr()).collect();

        let layer_names = if enable_validation {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            vec![]
        };

        // Chained so instance creation and destruction are validated too
        let mut debug_info = debug_messenger_info().build();

        let mut create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extension_names)
            .enabled_layer_names(&layer_names);

        if enable_validation {
            create_info = create_info.push_next(&mut debug_info);
        }

        unsafe { entry.create_instance(&create_info, None) }.map_err(InitError::InstanceCreation)
    }

    fn setup_debug_messenger(&self) -> Result<(DebugUtils, vk::DebugUtilsMessengerEXT), InitError> {
        let debug_utils = DebugUtils::new(&self.entry, &self.instance);
        let create_info = debug_messenger_info();

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
            .map_err(InitError::DebugMessenger)?;

        Ok((debug_utils, messenger))
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan instance...");

        unsafe {
            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }

            self.instance.destroy_instance(None);
        }
    }
}

fn debug_messenger_info() -> vk::DebugUtilsMessengerCreateInfoEXTBuilder<'static> {
    vk::DebugUtilsMessengerCreateInfoEXT::builder()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback))
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*p_callback_data).p_message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan] {}", message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan] {}", message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => {
            log::debug!("[Vulkan] {}", message.to_string_lossy());
        }
        _ => {
            log::trace!("[Vulkan] {}", message.to_string_lossy());
        }
    }

    vk::FALSE
}
