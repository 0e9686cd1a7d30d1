// =============================================================================
// VULKAN TRIANGLE
// =============================================================================
//
// FRAME FLOW (one frame in flight):
// 1. Wait for the previous frame's fence, then reset it
// 2. Acquire a swapchain image (signals image_available)
// 3. Re-record the command buffer for that image
// 4. Submit (waits image_available, signals render_finished + fence)
// 5. Present (waits render_finished)
//
// =============================================================================

use anyhow::{Context, Result};
use vk_triangle::platform::NativeWindow;
use vk_triangle::{Config, FrameExecutor, Renderer};

fn main() -> Result<()> {
    // Load configuration from config.toml
    let config = Config::load();

    init_logging(&config);
    log::info!("Starting Vulkan triangle");
    log::info!(
        "Window: {}x{} ({})",
        config.window.width,
        config.window.height,
        config.window.title
    );
    log::info!("Present mode: {}", config.graphics.present_mode);

    let mut window = NativeWindow::new(&config.window).context("Failed to create window")?;
    let renderer = Renderer::new(&window, &config).context("Failed to initialize Vulkan")?;

    let mut executor = FrameExecutor::new(renderer);
    if config.debug.show_fps {
        executor = executor.with_fps_title(config.window.title.clone());
    }

    let stats = executor.run(&mut window).context("Frame loop failed")?;
    log::info!(
        "Frame loop finished: {} frame(s) presented, {} skipped",
        stats.presented,
        stats.skipped
    );

    // Renderer before window: the surface must go before its native window
    drop(executor);
    drop(window);

    log::info!("Cleanup complete");
    Ok(())
}

/// Config level first; RUST_LOG overrides it when set
fn init_logging(config: &Config) {
    use env_logger::Builder;

    let mut builder = Builder::new();
    builder.filter_level(config.log_level());
    builder.parse_default_env();
    builder.init();
}
