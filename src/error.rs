//! Error types for renderer startup and the frame loop.
//!
//! Construction failures are fatal and abort startup. Frame failures are
//! classified so an out-of-date surface can be told apart from a lost device.

use ash::vk;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Startup failures before any per-swapchain resource exists
#[derive(Error, Debug)]
pub enum InitError {
    #[error("failed to load the Vulkan library: {0}")]
    Loader(#[from] ash::LoadingError),

    #[error("failed to create window: {0}")]
    Window(String),

    #[error("unsupported window system: {0}")]
    UnsupportedPlatform(String),

    #[error("failed to create Vulkan instance: {0}")]
    InstanceCreation(vk::Result),

    #[error("failed to create debug messenger: {0}")]
    DebugMessenger(vk::Result),

    #[error("failed to create window surface: {0}")]
    SurfaceCreation(vk::Result),

    #[error("no Vulkan physical device found")]
    NoPhysicalDevice,

    #[error("no physical device satisfies the renderer's requirements")]
    NoSuitableDevice,

    #[error("physical device query failed: {0}")]
    DeviceQuery(vk::Result),

    #[error("failed to create logical device: {0}")]
    DeviceCreation(vk::Result),

    #[error("name contains an interior nul byte: {0}")]
    InvalidName(#[from] std::ffi::NulError),
}

/// A resource owned by the logical device could not be created
#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("failed to query swapchain support: {0}")]
    SupportQuery(vk::Result),

    #[error("surface reports no formats")]
    NoSurfaceFormat,

    #[error("failed to create swapchain: {0}")]
    Swapchain(vk::Result),

    #[error("failed to get swapchain images: {0}")]
    SwapchainImages(vk::Result),

    #[error("failed to create swapchain image view: {0}")]
    ImageView(vk::Result),

    #[error("failed to read shader {path:?}")]
    ShaderLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("shader {path:?} is not valid SPIR-V")]
    InvalidShader {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create shader module: {0}")]
    ShaderModule(vk::Result),

    #[error("failed to create render pass: {0}")]
    RenderPass(vk::Result),

    #[error("failed to create pipeline layout: {0}")]
    PipelineLayout(vk::Result),

    #[error("failed to create graphics pipeline: {0}")]
    Pipeline(vk::Result),

    #[error("failed to create framebuffer: {0}")]
    Framebuffer(vk::Result),

    #[error("failed to create command pool: {0}")]
    CommandPool(vk::Result),

    #[error("failed to allocate command buffer: {0}")]
    CommandBuffer(vk::Result),

    #[error("failed to create sync objects: {0}")]
    SyncObject(vk::Result),
}

/// Which step of the frame cycle produced a status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStage {
    Wait,
    Reset,
    Acquire,
    Record,
    Submit,
    Present,
    Idle,
}

impl fmt::Display for FrameStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FrameStage::Wait => "fence wait",
            FrameStage::Reset => "fence reset",
            FrameStage::Acquire => "image acquire",
            FrameStage::Record => "command recording",
            FrameStage::Submit => "queue submit",
            FrameStage::Present => "present",
            FrameStage::Idle => "device idle wait",
        };
        f.write_str(name)
    }
}

/// A frame could not be completed
#[derive(Error, Debug)]
pub enum FrameError {
    /// The surface changed under the swapchain; recreating it would recover
    #[error("surface out of date during {stage}")]
    OutOfDate { stage: FrameStage },

    #[error("device lost during {stage}")]
    DeviceLost { stage: FrameStage },

    #[error("{stage} failed: {result}")]
    Vulkan { stage: FrameStage, result: vk::Result },

    #[error("swapchain returned image index {index} but holds {count} images")]
    ImageIndexOutOfRange { index: u32, count: u32 },
}

impl FrameError {
    pub fn from_vk(stage: FrameStage, result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_OUT_OF_DATE_KHR => FrameError::OutOfDate { stage },
            vk::Result::ERROR_DEVICE_LOST => FrameError::DeviceLost { stage },
            result => FrameError::Vulkan { stage, result },
        }
    }

    /// Whether the loop may continue after skipping this frame
    pub fn is_recoverable(&self) -> bool {
        matches!(self, FrameError::OutOfDate { .. })
    }
}

/// Any failure the renderer surfaces to its caller
#[derive(Error, Debug)]
pub enum RendererError {
    #[error(transparent)]
    Init(#[from] InitError),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    Frame(#[from] FrameError),
}
