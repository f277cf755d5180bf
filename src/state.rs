/// Shared application state passed to axum handlers.
use std::sync::Arc;

use crate::config::ForgeConfig;
use crate::rate_limit::{MemoryQuotaStore, QuotaStore, RateLimiter};
use crate::render::video::{FfmpegEncoder, VideoOverlayEncoder};
use crate::render::CaptionStyle;
use crate::token::TokenService;
use crate::users::{InMemoryUsers, UserDirectory};

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserDirectory>,
    pub tokens: Arc<TokenService>,
    pub limiter: Arc<RateLimiter>,
    /// None when no encoder collaborator is configured; the video route
    /// then answers 501.
    pub video: Option<Arc<dyn VideoOverlayEncoder>>,
    pub caption_style: CaptionStyle,
    pub max_upload_bytes: usize,
}

impl AppState {
    /// Wire up the default collaborators: in-memory user directory,
    /// in-process quota store, ffmpeg video encoder when configured.
    pub fn from_config(config: &ForgeConfig, token_secret: &str) -> Self {
        let store: Arc<dyn QuotaStore> = Arc::new(MemoryQuotaStore::new());
        let video: Option<Arc<dyn VideoOverlayEncoder>> =
            config.ffmpeg_path.as_ref().map(|path| {
                log::info!("[render] Video encoder enabled: {}", path);
                Arc::new(FfmpegEncoder::new(path, config.max_upload_bytes))
                    as Arc<dyn VideoOverlayEncoder>
            });
        if video.is_none() {
            log::info!("[render] No video encoder configured; video route will answer 501");
        }

        Self {
            users: Arc::new(InMemoryUsers::new()),
            tokens: Arc::new(TokenService::new(token_secret.as_bytes())),
            limiter: Arc::new(RateLimiter::new(
                store,
                &config.rate_limit,
                config.fail_open_on_store_error,
            )),
            video,
            caption_style: config.caption_style.clone(),
            max_upload_bytes: config.max_upload_bytes,
        }
    }
}
