// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// Every switch the renderer reads at startup lives here and is passed into
// initialization explicitly. A missing or broken config file falls back to
// defaults.

use anyhow::{Context, Result};
use ash::vk;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub device: DeviceConfig,
    pub debug: DebugConfig,
    pub assets: AssetsConfig,
}

/// Window settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Vulkan".to_string(),
            width: 1280,
            height: 720,
        }
    }
}

/// Graphics settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    /// `mailbox` (default) or `fifo`; FIFO is used when the surface lacks MAILBOX
    pub present_mode: String,
    pub clear_color: [f32; 4],
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            present_mode: "mailbox".to_string(),
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

/// Physical device requirements
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub require_discrete_gpu: bool,
    pub require_geometry_shader: bool,
    /// Device extensions required on top of VK_KHR_swapchain
    pub extra_extensions: Vec<String>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            require_discrete_gpu: true,
            require_geometry_shader: true,
            extra_extensions: Vec::new(),
        }
    }
}

/// Debug settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    /// Log every enabled instance extension at startup
    pub log_extensions: bool,
    pub show_fps: bool,
    pub log_level: String,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: cfg!(debug_assertions),
            log_extensions: false,
            show_fps: true,
            log_level: "info".to_string(),
        }
    }
}

/// Where the precompiled shaders live
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AssetsConfig {
    pub shader_dir: PathBuf,
    pub vertex_shader: String,
    pub fragment_shader: String,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            shader_dir: PathBuf::from("shaders"),
            vertex_shader: "triangle.vert.spv".to_string(),
            fragment_shader: "triangle.frag.spv".to_string(),
        }
    }
}

impl AssetsConfig {
    pub fn vertex_shader_path(&self) -> PathBuf {
        self.shader_dir.join(&self.vertex_shader)
    }

    pub fn fragment_shader_path(&self) -> PathBuf {
        self.shader_dir.join(&self.fragment_shader)
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults if not found
    pub fn load() -> Self {
        Self::load_from_path("config.toml").unwrap_or_else(|e| {
            log::warn!("Failed to load config.toml: {:#}. Using defaults.", e);
            Config::default()
        })
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Preferred present mode: MAILBOX unless `fifo` is asked for.
    ///
    /// Only MAILBOX and FIFO are ever used; any other name falls back to MAILBOX.
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        match self.graphics.present_mode.to_lowercase().as_str() {
            "mailbox" => vk::PresentModeKHR::MAILBOX,
            "fifo" => vk::PresentModeKHR::FIFO,
            _ => {
                log::warn!(
                    "Unsupported present mode '{}' (expected mailbox or fifo), defaulting to MAILBOX",
                    self.graphics.present_mode
                );
                vk::PresentModeKHR::MAILBOX
            }
        }
    }

    /// Log level filter, `info` if the configured name is not recognized
    pub fn log_level(&self) -> log::LevelFilter {
        self.debug
            .log_level
            .parse()
            .unwrap_or(log::LevelFilter::Info)
    }
}
