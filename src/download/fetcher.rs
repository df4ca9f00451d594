//! The media extraction boundary.
//!
//! Everything the bot knows about actually talking to video platforms is
//! behind the [`MediaFetcher`] trait: fetch metadata for a URL, or produce
//! exactly one media file in a directory. The production implementation
//! shells out to yt-dlp; tests substitute a scripted mock.

use crate::core::config;
use crate::core::error::AppError;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use tokio::process::Command as TokioCommand;
use tokio::time::timeout;

/// One format entry from the extractor's JSON output
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawFormat {
    pub format_id: Option<String>,
    pub ext: Option<String>,
    pub height: Option<i64>,
    pub width: Option<i64>,
    pub fps: Option<f64>,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    pub filesize: Option<i64>,
    /// Total bitrate in kbit/s; used to estimate byte size when the
    /// extractor does not report one directly
    pub tbr: Option<f64>,
}

/// Video metadata as reported by the extractor
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VideoMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub duration: Option<f64>,
    pub view_count: Option<i64>,
    pub like_count: Option<i64>,
    pub uploader: Option<String>,
    pub channel: Option<String>,
    pub channel_id: Option<String>,
    /// Upload date as a YYYYMMDD string
    pub upload_date: Option<String>,
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub formats: Vec<RawFormat>,
}

/// Capability interface for metadata and media fetching
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Fetches metadata for a URL without downloading anything
    async fn fetch_metadata(&self, url: &str) -> Result<VideoMetadata, AppError>;

    /// Downloads media for a URL into `output_dir` according to
    /// `format_selector`. Exactly one file is expected to appear in the
    /// directory on success.
    async fn fetch_media(
        &self,
        url: &str,
        format_selector: &str,
        output_dir: &Path,
        extract_audio: bool,
        max_filesize: Option<u64>,
    ) -> Result<(), AppError>;
}

/// Production fetcher shelling out to the yt-dlp binary
pub struct YtDlpFetcher {
    ytdl_bin: String,
}

impl YtDlpFetcher {
    pub fn new() -> Self {
        Self {
            ytdl_bin: config::YTDL_BIN.clone(),
        }
    }

    pub fn with_binary(ytdl_bin: impl Into<String>) -> Self {
        Self {
            ytdl_bin: ytdl_bin.into(),
        }
    }
}

impl Default for YtDlpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaFetcher for YtDlpFetcher {
    async fn fetch_metadata(&self, url: &str) -> Result<VideoMetadata, AppError> {
        let output = timeout(
            config::ytdlp::metadata_timeout(),
            TokioCommand::new(&self.ytdl_bin)
                .args(["--dump-json", "--no-playlist", "--quiet", "--no-warnings", url])
                .output(),
        )
        .await
        .map_err(|_| AppError::Download("yt-dlp metadata fetch timed out".to_string()))?
        .map_err(|e| AppError::Download(format!("Failed to execute yt-dlp: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::Download(format!(
                "yt-dlp metadata fetch failed (exit code: {:?}): {}",
                output.status.code(),
                stderr.trim()
            )));
        }

        let metadata: VideoMetadata = serde_json::from_slice(&output.stdout)?;
        Ok(metadata)
    }

    async fn fetch_media(
        &self,
        url: &str,
        format_selector: &str,
        output_dir: &Path,
        extract_audio: bool,
        max_filesize: Option<u64>,
    ) -> Result<(), AppError> {
        let output_template = output_dir.join("%(title)s.%(ext)s");
        let template = output_template.to_string_lossy().to_string();

        let mut args: Vec<String> = vec![
            "-f".to_string(),
            format_selector.to_string(),
            "-o".to_string(),
            template,
            "--no-playlist".to_string(),
            "--quiet".to_string(),
            "--no-warnings".to_string(),
        ];

        if extract_audio {
            args.push("-x".to_string());
            args.push("--audio-format".to_string());
            args.push("mp3".to_string());
            args.push("--audio-quality".to_string());
            args.push("192K".to_string());
        } else if let Some(max) = max_filesize {
            args.push("--max-filesize".to_string());
            args.push(max.to_string());
        }

        args.push(url.to_string());

        let output = timeout(
            config::ytdlp::download_timeout(),
            TokioCommand::new(&self.ytdl_bin).args(&args).output(),
        )
        .await
        .map_err(|_| AppError::Download("yt-dlp download timed out".to_string()))?
        .map_err(|e| AppError::Download(format!("Failed to execute yt-dlp: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::Download(format!(
                "yt-dlp download failed (exit code: {:?}): {}",
                output.status.code(),
                stderr.trim()
            )));
        }

        Ok(())
    }
}
