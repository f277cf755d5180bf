/// Video backend: delegates caption burning to an external encoder.
///
/// The gateway never composites video frames itself; a deployment either
/// configures an ffmpeg binary or the video route answers "not
/// implemented". Captions follow the same horizontal-centering and
/// top/bottom-anchoring convention as the raster path, and the audio
/// track is copied unchanged.
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;

use super::{check_source, non_blank, RenderError};

/// External frame-accurate text-overlay encoder collaborator.
#[async_trait]
pub trait VideoOverlayEncoder: Send + Sync {
    async fn overlay(
        &self,
        source: &[u8],
        top: Option<&str>,
        bottom: Option<&str>,
    ) -> Result<Vec<u8>, RenderError>;
}

/// ffmpeg-backed encoder using drawtext filters.
pub struct FfmpegEncoder {
    binary: PathBuf,
    max_bytes: usize,
}

impl FfmpegEncoder {
    pub fn new(binary: impl Into<PathBuf>, max_bytes: usize) -> Self {
        Self {
            binary: binary.into(),
            max_bytes,
        }
    }
}

#[async_trait]
impl VideoOverlayEncoder for FfmpegEncoder {
    async fn overlay(
        &self,
        source: &[u8],
        top: Option<&str>,
        bottom: Option<&str>,
    ) -> Result<Vec<u8>, RenderError> {
        check_source(source, self.max_bytes, top, bottom)?;

        let dir = tempfile::tempdir()
            .map_err(|e| RenderError::Encode(format!("temp dir: {}", e)))?;
        let input = dir.path().join("input");
        let output = dir.path().join("output.mp4");
        tokio::fs::write(&input, source)
            .await
            .map_err(|e| RenderError::Encode(format!("staging upload: {}", e)))?;

        let mut filters = Vec::new();
        if let Some(text) = non_blank(top) {
            filters.push(drawtext_filter(text, true));
        }
        if let Some(text) = non_blank(bottom) {
            filters.push(drawtext_filter(text, false));
        }

        let run = Command::new(&self.binary)
            .arg("-y")
            .arg("-i")
            .arg(&input)
            .arg("-vf")
            .arg(filters.join(","))
            .arg("-c:a")
            .arg("copy")
            .arg(&output)
            .output()
            .await
            .map_err(|e| RenderError::Encode(format!("launching ffmpeg: {}", e)))?;

        if !run.status.success() {
            let stderr = String::from_utf8_lossy(&run.stderr);
            log::error!(
                target: "memeforge.render.video",
                "ffmpeg exited with {}: {}",
                run.status,
                stderr.lines().last().unwrap_or("")
            );
            return Err(RenderError::Encode("video processing failed".to_string()));
        }

        tokio::fs::read(&output)
            .await
            .map_err(|e| RenderError::Encode(format!("reading encoder output: {}", e)))
    }
}

/// One drawtext filter: white fill, black 2px border, horizontally
/// centered, anchored 20px from the top or bottom edge.
fn drawtext_filter(text: &str, top: bool) -> String {
    let escaped = escape_drawtext(text);
    let y = if top { "20" } else { "h-th-20" };
    format!(
        "drawtext=text='{}':fontcolor=white:fontsize=48:x=(w-text_w)/2:y={}:borderw=2:bordercolor=black",
        escaped, y
    )
}

/// Escape characters that are meaningful inside a drawtext argument.
fn escape_drawtext(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('\'', "\\'")
        .replace(':', "\\:")
}
