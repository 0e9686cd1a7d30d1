// Native window backed by winit
//
// The frame loop owns the cadence: it polls this window once per cycle
// instead of handing control to winit's run loop, so events are pumped
// with a zero timeout.

use super::{surface, SurfaceProvider};
use crate::config::WindowConfig;
use crate::error::InitError;
use ash::{vk, Entry};
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use std::ffi::CStr;
use std::time::Duration;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    platform::pump_events::{EventLoopExtPumpEvents, PumpStatus},
    window::{Window, WindowAttributes, WindowId},
};

/// How many times to pump while waiting for the platform to hand us a window
const CREATE_ATTEMPTS: usize = 100;
const CREATE_POLL: Duration = Duration::from_millis(10);

/// Event handler state. Holds the window so it drops before the event loop.
struct WindowState {
    attributes: Option<WindowAttributes>,
    window: Option<Window>,
    close_requested: bool,
    create_error: Option<String>,
}

impl ApplicationHandler for WindowState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let Some(attributes) = self.attributes.take() else {
            return;
        };

        match event_loop.create_window(attributes) {
            Ok(window) => self.window = Some(window),
            Err(e) => {
                log::error!("Failed to create window: {:?}", e);
                self.create_error = Some(e.to_string());
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                self.close_requested = true;
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state.is_pressed() && event.physical_key == PhysicalKey::Code(KeyCode::Escape) {
                    log::info!("ESC pressed, exiting...");
                    self.close_requested = true;
                }
            }
            _ => {}
        }
    }
}

/// A non-resizable window plus the event loop that feeds it
pub struct NativeWindow {
    state: WindowState,
    event_loop: EventLoop<()>,
}

impl NativeWindow {
    pub fn new(config: &WindowConfig) -> Result<Self, InitError> {
        log::info!("Creating window: {}x{} \"{}\"", config.width, config.height, config.title);

        let event_loop = EventLoop::new().map_err(|e| InitError::Window(e.to_string()))?;

        let attributes = WindowAttributes::default()
            .with_title(&config.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(config.width, config.height))
            .with_resizable(false);

        let mut native = Self {
            state: WindowState {
                attributes: Some(attributes),
                window: None,
                close_requested: false,
                create_error: None,
            },
            event_loop,
        };

        for _ in 0..CREATE_ATTEMPTS {
            native.pump(Some(CREATE_POLL));
            if let Some(err) = native.state.create_error.take() {
                return Err(InitError::Window(err));
            }
            if native.state.window.is_some() {
                return Ok(native);
            }
        }

        Err(InitError::Window("platform never delivered a window".to_string()))
    }

    fn pump(&mut self, timeout: Option<Duration>) {
        if let PumpStatus::Exit(code) = self.event_loop.pump_app_events(timeout, &mut self.state) {
            log::debug!("Event loop exited with code {}", code);
            self.state.close_requested = true;
        }
    }

    fn window(&self) -> Result<&Window, InitError> {
        self.state
            .window
            .as_ref()
            .ok_or_else(|| InitError::Window("window already destroyed".to_string()))
    }
}

impl SurfaceProvider for NativeWindow {
    fn framebuffer_size(&self) -> (u32, u32) {
        self.state
            .window
            .as_ref()
            .map(|window| {
                let size = window.inner_size();
                (size.width, size.height)
            })
            .unwrap_or((0, 0))
    }

    fn should_close(&self) -> bool {
        self.state.close_requested
    }

    fn poll_events(&mut self) {
        self.pump(Some(Duration::ZERO));
    }

    fn required_instance_extensions(&self) -> Result<Vec<&'static CStr>, InitError> {
        surface::required_extensions(self.window()?.raw_display_handle())
    }

    fn create_surface(
        &self,
        entry: &Entry,
        instance: &ash::Instance,
    ) -> Result<vk::SurfaceKHR, InitError> {
        let window = self.window()?;

        // The window lives in self and the renderer is torn down before it
        unsafe {
            surface::create_surface(
                entry,
                instance,
                window.raw_display_handle(),
                window.raw_window_handle(),
            )
        }
    }

    fn set_title(&self, title: &str) {
        if let Some(window) = &self.state.window {
            window.set_title(title);
        }
    }
}
