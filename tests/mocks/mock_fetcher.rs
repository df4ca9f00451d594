//! Scripted media fetcher for integration tests.
//!
//! Counts calls and either succeeds with canned metadata / a canned file,
//! or fails on request, so tests can assert exactly how many times the
//! external capability was invoked.

#![allow(dead_code)] // Not every test binary uses every constructor

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use vidra::core::AppError;
use vidra::download::fetcher::RawFormat;
use vidra::download::{MediaFetcher, VideoMetadata};

pub struct MockFetcher {
    pub metadata_calls: AtomicUsize,
    pub media_calls: AtomicUsize,
    metadata: VideoMetadata,
    fail_metadata: bool,
    fail_media: bool,
    /// When false, fetch_media "succeeds" without producing any file
    produce_file: bool,
    media_bytes: usize,
}

impl MockFetcher {
    /// A fetcher returning a plain 2-minute video with one 720p format
    pub fn new() -> Self {
        Self::with_metadata(Self::default_metadata(120.0))
    }

    pub fn with_metadata(metadata: VideoMetadata) -> Self {
        Self {
            metadata_calls: AtomicUsize::new(0),
            media_calls: AtomicUsize::new(0),
            metadata,
            fail_metadata: false,
            fail_media: false,
            produce_file: true,
            media_bytes: 1024,
        }
    }

    pub fn failing_metadata() -> Self {
        let mut fetcher = Self::new();
        fetcher.fail_metadata = true;
        fetcher
    }

    pub fn failing_media() -> Self {
        let mut fetcher = Self::new();
        fetcher.fail_media = true;
        fetcher
    }

    pub fn producing_no_file() -> Self {
        let mut fetcher = Self::new();
        fetcher.produce_file = false;
        fetcher
    }

    pub fn with_media_bytes(mut self, media_bytes: usize) -> Self {
        self.media_bytes = media_bytes;
        self
    }

    pub fn default_metadata(duration: f64) -> VideoMetadata {
        VideoMetadata {
            title: Some("Test Video".to_string()),
            description: Some("A test".to_string()),
            duration: Some(duration),
            view_count: Some(12345),
            like_count: Some(678),
            uploader: Some("Test Channel".to_string()),
            channel: None,
            channel_id: Some("UC123".to_string()),
            upload_date: Some("20240301".to_string()),
            thumbnail: Some("https://example.com/thumb.jpg".to_string()),
            formats: vec![
                RawFormat {
                    format_id: Some("140".to_string()),
                    ext: Some("m4a".to_string()),
                    vcodec: Some("none".to_string()),
                    acodec: Some("mp4a.40.2".to_string()),
                    ..Default::default()
                },
                RawFormat {
                    format_id: Some("136".to_string()),
                    ext: Some("mp4".to_string()),
                    height: Some(720),
                    width: Some(1280),
                    fps: Some(30.0),
                    vcodec: Some("avc1.4d401f".to_string()),
                    acodec: Some("none".to_string()),
                    filesize: Some(2_000_000),
                    ..Default::default()
                },
            ],
        }
    }

    pub fn metadata_call_count(&self) -> usize {
        self.metadata_calls.load(Ordering::SeqCst)
    }

    pub fn media_call_count(&self) -> usize {
        self.media_calls.load(Ordering::SeqCst)
    }
}

impl Default for MockFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaFetcher for MockFetcher {
    async fn fetch_metadata(&self, _url: &str) -> Result<VideoMetadata, AppError> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_metadata {
            return Err(AppError::Download("simulated extractor error".to_string()));
        }
        Ok(self.metadata.clone())
    }

    async fn fetch_media(
        &self,
        _url: &str,
        _format_selector: &str,
        output_dir: &Path,
        extract_audio: bool,
        _max_filesize: Option<u64>,
    ) -> Result<(), AppError> {
        self.media_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_media {
            return Err(AppError::Download("simulated download error".to_string()));
        }

        if self.produce_file {
            let name = if extract_audio { "media.mp3" } else { "media.mp4" };
            std::fs::write(output_dir.join(name), vec![0u8; self.media_bytes])?;
        }
        Ok(())
    }
}
