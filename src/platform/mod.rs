// Platform module - window system collaborators
//
// The renderer only talks to the window through SurfaceProvider, so the
// frame loop and surface negotiation can run against a stand-in in tests.

pub mod surface;
pub mod window;

pub use window::NativeWindow;

use crate::error::InitError;
use ash::{vk, Entry};
use std::ffi::CStr;

/// What the renderer needs from a native window
pub trait SurfaceProvider {
    /// Current drawable size in pixels
    fn framebuffer_size(&self) -> (u32, u32);

    fn should_close(&self) -> bool;

    /// Drain pending window events without blocking
    fn poll_events(&mut self);

    /// Instance extensions needed to present to this window
    fn required_instance_extensions(&self) -> Result<Vec<&'static CStr>, InitError>;

    /// Create a surface bound to `instance`. The caller owns the handle.
    fn create_surface(
        &self,
        entry: &Entry,
        instance: &ash::Instance,
    ) -> Result<vk::SurfaceKHR, InitError>;

    fn set_title(&self, _title: &str) {}
}
