//! The video catalog: get-or-create semantics over canonical video ids.
//!
//! Exactly one `VideoRecord` is ever created per distinct video id. Metadata
//! is captured once and treated as immutable afterwards — a later request
//! for a known id returns the stored record without re-fetching.

use crate::core::resolver::extract_video_id;
use crate::core::{config, AppResult};
use crate::download::fetcher::{MediaFetcher, VideoMetadata};
use crate::storage::db::{self, DbPool, FormatDescriptor, NewVideo, VideoRecord};
use chrono::NaiveDate;
use std::sync::Arc;

pub struct VideoCatalog {
    fetcher: Arc<dyn MediaFetcher>,
    db_pool: Arc<DbPool>,
    max_duration_secs: i64,
}

impl VideoCatalog {
    pub fn new(fetcher: Arc<dyn MediaFetcher>, db_pool: Arc<DbPool>) -> Self {
        Self::with_max_duration(fetcher, db_pool, *config::limits::MAX_VIDEO_DURATION_SECS)
    }

    pub fn with_max_duration(fetcher: Arc<dyn MediaFetcher>, db_pool: Arc<DbPool>, max_duration_secs: i64) -> Self {
        Self {
            fetcher,
            db_pool,
            max_duration_secs,
        }
    }

    /// Looks up or creates the catalog entry for a URL.
    ///
    /// Returns `Ok(None)` when the URL does not resolve to a supported
    /// platform id, when the metadata fetch fails, or when the video exceeds
    /// the configured duration ceiling. Fetch failures never surface as
    /// errors — only infrastructure (database) problems do.
    pub async fn get_or_create(&self, url: &str) -> AppResult<Option<VideoRecord>> {
        let video_id = match extract_video_id(url) {
            Some(id) => id,
            None => return Ok(None),
        };

        let conn = db::get_connection(&self.db_pool)?;
        if let Some(video) = db::get_video_by_video_id(&conn, &video_id)? {
            return Ok(Some(video));
        }
        drop(conn);

        let metadata = match self.fetcher.fetch_metadata(url).await {
            Ok(metadata) => metadata,
            Err(e) => {
                log::error!("Metadata fetch failed for {}: {}", url, e);
                return Ok(None);
            }
        };

        let duration = metadata.duration.unwrap_or(0.0) as i64;
        if duration > self.max_duration_secs {
            log::warn!(
                "Video {} is too long: {}s (limit {}s)",
                video_id,
                duration,
                self.max_duration_secs
            );
            return Ok(None);
        }

        let new_video = NewVideo {
            video_id: video_id.clone(),
            url: url.to_string(),
            title: metadata.title.clone().unwrap_or_else(|| "Без названия".to_string()),
            description: metadata.description.clone(),
            duration,
            view_count: metadata.view_count,
            like_count: metadata.like_count,
            channel_name: metadata.uploader.clone().or_else(|| metadata.channel.clone()),
            channel_id: metadata.channel_id.clone(),
            upload_date: parse_upload_date(metadata.upload_date.as_deref()),
            thumbnail_url: metadata.thumbnail.clone(),
            available_formats: extract_formats(&metadata),
        };

        let conn = db::get_connection(&self.db_pool)?;
        let video = db::insert_video(&conn, &new_video)?;
        log::info!("Created new video record: {} ({})", video.title, video.video_id);
        Ok(Some(video))
    }
}

/// Parses the extractor's YYYYMMDD upload date. Unparsable dates become
/// `None` rather than aborting catalog creation.
fn parse_upload_date(raw: Option<&str>) -> Option<String> {
    let raw = raw?;
    NaiveDate::parse_from_str(raw, "%Y%m%d")
        .ok()
        .map(|date| date.format("%Y-%m-%d").to_string())
}

/// Extracts the video-format list from metadata.
///
/// Pure-audio source formats (no video codec) are excluded. Byte sizes the
/// extractor omits are estimated from the total bitrate:
/// `tbr (kbit/s) × 1000 × duration / 8`.
fn extract_formats(metadata: &VideoMetadata) -> Vec<FormatDescriptor> {
    let duration = metadata.duration.unwrap_or(0.0);

    metadata
        .formats
        .iter()
        .filter(|fmt| fmt.vcodec.as_deref().is_some_and(|codec| codec != "none"))
        .map(|fmt| {
            let filesize = fmt.filesize.filter(|&size| size > 0).or_else(|| {
                match (fmt.tbr, duration > 0.0) {
                    (Some(tbr), true) => Some((tbr * 1000.0 * duration / 8.0) as i64),
                    _ => None,
                }
            });

            FormatDescriptor {
                format_id: fmt.format_id.clone(),
                ext: fmt.ext.clone(),
                height: fmt.height,
                width: fmt.width,
                fps: fmt.fps,
                vcodec: fmt.vcodec.clone(),
                acodec: fmt.acodec.clone(),
                filesize,
            }
        })
        .collect()
}

/// Groups a video's stored formats into selectable qualities, highest first.
/// Each height is listed once, with the first descriptor seen for it.
pub fn available_qualities(video: &VideoRecord) -> Vec<(String, FormatDescriptor)> {
    let mut qualities: Vec<(i64, String, FormatDescriptor)> = Vec::new();

    for fmt in &video.available_formats {
        if let Some(height) = fmt.height {
            let name = format!("{}p", height);
            if !qualities.iter().any(|(h, _, _)| *h == height) {
                qualities.push((height, name, fmt.clone()));
            }
        }
    }

    qualities.sort_by(|a, b| b.0.cmp(&a.0));
    qualities.into_iter().map(|(_, name, fmt)| (name, fmt)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::fetcher::RawFormat;

    #[test]
    fn test_parse_upload_date() {
        assert_eq!(parse_upload_date(Some("20240301")).as_deref(), Some("2024-03-01"));
        assert_eq!(parse_upload_date(Some("not-a-date")), None);
        assert_eq!(parse_upload_date(Some("2024-03-01")), None);
        assert_eq!(parse_upload_date(None), None);
    }

    #[test]
    fn test_extract_formats_drops_audio_only() {
        let metadata = VideoMetadata {
            duration: Some(100.0),
            formats: vec![
                RawFormat {
                    format_id: Some("140".to_string()),
                    vcodec: Some("none".to_string()),
                    acodec: Some("mp4a.40.2".to_string()),
                    ..Default::default()
                },
                RawFormat {
                    format_id: Some("136".to_string()),
                    vcodec: Some("avc1.4d401f".to_string()),
                    height: Some(720),
                    filesize: Some(1_000_000),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };

        let formats = extract_formats(&metadata);
        assert_eq!(formats.len(), 1);
        assert_eq!(formats[0].format_id.as_deref(), Some("136"));
        assert_eq!(formats[0].filesize, Some(1_000_000));
    }

    #[test]
    fn test_extract_formats_backfills_filesize_from_bitrate() {
        let metadata = VideoMetadata {
            duration: Some(60.0),
            formats: vec![RawFormat {
                format_id: Some("134".to_string()),
                vcodec: Some("avc1".to_string()),
                height: Some(360),
                tbr: Some(800.0),
                ..Default::default()
            }],
            ..Default::default()
        };

        let formats = extract_formats(&metadata);
        // 800 kbit/s * 1000 * 60 s / 8 = 6_000_000 bytes
        assert_eq!(formats[0].filesize, Some(6_000_000));
    }

    #[test]
    fn test_extract_formats_no_backfill_without_duration() {
        let metadata = VideoMetadata {
            duration: None,
            formats: vec![RawFormat {
                vcodec: Some("avc1".to_string()),
                tbr: Some(800.0),
                ..Default::default()
            }],
            ..Default::default()
        };

        assert_eq!(extract_formats(&metadata)[0].filesize, None);
    }

    #[test]
    fn test_available_qualities_sorted_and_deduped() {
        let video = VideoRecord {
            id: 1,
            video_id: "x".to_string(),
            url: String::new(),
            title: String::new(),
            description: None,
            duration: 0,
            view_count: None,
            like_count: None,
            channel_name: None,
            channel_id: None,
            upload_date: None,
            thumbnail_url: None,
            available_formats: vec![
                FormatDescriptor {
                    format_id: Some("a".to_string()),
                    ext: None,
                    height: Some(360),
                    width: None,
                    fps: None,
                    vcodec: Some("avc1".to_string()),
                    acodec: None,
                    filesize: None,
                },
                FormatDescriptor {
                    format_id: Some("b".to_string()),
                    ext: None,
                    height: Some(720),
                    width: None,
                    fps: None,
                    vcodec: Some("avc1".to_string()),
                    acodec: None,
                    filesize: None,
                },
                FormatDescriptor {
                    format_id: Some("c".to_string()),
                    ext: None,
                    height: Some(720),
                    width: None,
                    fps: None,
                    vcodec: Some("vp9".to_string()),
                    acodec: None,
                    filesize: None,
                },
            ],
            file_size: None,
            quality: None,
            format_id: None,
            download_count: 0,
        };

        let qualities = available_qualities(&video);
        assert_eq!(qualities.len(), 2);
        assert_eq!(qualities[0].0, "720p");
        assert_eq!(qualities[0].1.format_id.as_deref(), Some("b"));
        assert_eq!(qualities[1].0, "360p");
    }
}
