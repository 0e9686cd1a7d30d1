//! Minimal Vulkan triangle renderer.
//!
//! Device negotiation, swapchain and pipeline construction, and a
//! single-frame-in-flight draw loop presenting one triangle to a window.

pub mod backend;
pub mod config;
pub mod error;
pub mod frame;
pub mod platform;
pub mod renderer;

pub use config::Config;
pub use error::{FrameError, InitError, RendererError, ResourceError};
pub use frame::{FrameBackend, FrameExecutor, FrameStats, FrameStatus};
pub use renderer::Renderer;
