/// Configuration for the MemeForge gateway.
/// Reads config.json from ~/.config/memeforge/config.json (or platform
/// equivalent); environment variables override individual fields.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForgeConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Token signing secret. Required; MEMEFORGE_TOKEN_SECRET overrides.
    #[serde(default)]
    pub token_secret: Option<String>,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    /// Path to an ffmpeg binary. Absent means the video backend is
    /// disabled and /api/generate/video answers 501.
    #[serde(default)]
    pub ffmpeg_path: Option<String>,
    /// When true, a quota-store read failure admits the request as if the
    /// key had never been seen instead of failing the request.
    #[serde(default)]
    pub fail_open_on_store_error: bool,
    /// Caption appearance overrides for the raster backend.
    #[serde(default)]
    pub caption_style: crate::render::CaptionStyle,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

fn default_port() -> u16 {
    8787
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_limit() -> usize {
    10
}

fn default_window_secs() -> u64 {
    60
}

fn default_max_upload_bytes() -> usize {
    MAX_UPLOAD_BYTES
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            window_secs: default_window_secs(),
        }
    }
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_bind_address(),
            token_secret: None,
            rate_limit: RateLimitConfig::default(),
            max_upload_bytes: default_max_upload_bytes(),
            ffmpeg_path: None,
            fail_open_on_store_error: false,
            caption_style: crate::render::CaptionStyle::default(),
        }
    }
}

/// Default config path: ~/.config/memeforge/config.json
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("memeforge")
        .join("config.json")
}

/// Load config from path. Returns default if file doesn't exist.
pub fn load_config(path: &PathBuf) -> ForgeConfig {
    let mut config = match fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
            log::warn!("Failed to parse config {}: {}", path.display(), e);
            ForgeConfig::default()
        }),
        Err(_) => {
            log::info!("No config at {}, using defaults", path.display());
            ForgeConfig::default()
        }
    };
    apply_env_overrides(&mut config);
    config
}

fn apply_env_overrides(config: &mut ForgeConfig) {
    if let Ok(secret) = std::env::var("MEMEFORGE_TOKEN_SECRET") {
        if !secret.is_empty() {
            config.token_secret = Some(secret);
        }
    }
    if let Ok(port) = std::env::var("MEMEFORGE_PORT") {
        match port.parse() {
            Ok(p) => config.port = p,
            Err(e) => log::warn!("Ignoring invalid MEMEFORGE_PORT {}: {}", port, e),
        }
    }
    if let Ok(bind) = std::env::var("MEMEFORGE_BIND") {
        if !bind.is_empty() {
            config.bind_address = bind;
        }
    }
    if let Ok(ffmpeg) = std::env::var("MEMEFORGE_FFMPEG") {
        if !ffmpeg.is_empty() {
            config.ffmpeg_path = Some(ffmpeg);
        }
    }
}
