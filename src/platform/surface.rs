// Native surface creation from raw window handles
//
// ash-window picks the platform surface extension and constructor. Window
// systems it does not know come back as ERROR_EXTENSION_NOT_PRESENT.

use crate::error::InitError;
use ash::{vk, Entry};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::ffi::CStr;

fn unsupported(result: vk::Result, what: impl std::fmt::Debug) -> Option<InitError> {
    (result == vk::Result::ERROR_EXTENSION_NOT_PRESENT)
        .then(|| InitError::UnsupportedPlatform(format!("{:?}", what)))
}

/// VK_KHR_surface plus the platform extension for `display`
pub fn required_extensions(display: RawDisplayHandle) -> Result<Vec<&'static CStr>, InitError> {
    let names = ash_window::enumerate_required_extensions(display)
        .map_err(|e| unsupported(e, display).unwrap_or(InitError::SurfaceCreation(e)))?;

    // The pointers come from ash's static extension name constants
    Ok(names.iter().map(|&name| unsafe { CStr::from_ptr(name) }).collect())
}

/// Create a surface for the given native handles.
///
/// # Safety
/// `display` and `window` must refer to a live window that outlives the
/// returned surface.
pub unsafe fn create_surface(
    entry: &Entry,
    instance: &ash::Instance,
    display: RawDisplayHandle,
    window: RawWindowHandle,
) -> Result<vk::SurfaceKHR, InitError> {
    ash_window::create_surface(entry, instance, display, window, None)
        .map_err(|e| unsupported(e, (display, window)).unwrap_or(InitError::SurfaceCreation(e)))
}
