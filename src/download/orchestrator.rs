//! The download state machine and dedup engine.
//!
//! Every attempt moves strictly forward: `pending` → `downloading` →
//! {`completed` | `failed`}. Failures never cross this boundary — they are
//! captured into the record's `error_message`. A per-`(video, quality,
//! format)` keyed mutex serializes the dedup check with the fetch it
//! guards, so at most one actual media fetch happens per tuple system-wide
//! no matter how many users ask concurrently.

use crate::core::utils::format_file_size;
use crate::core::{config, AppError, AppResult};
use crate::download::fetcher::MediaFetcher;
use crate::storage::db::{self, DbPool, DownloadRecord, FormatType, UserRecord, VideoRecord};
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct DownloadOrchestrator {
    fetcher: Arc<dyn MediaFetcher>,
    db_pool: Arc<DbPool>,
    download_root: PathBuf,
    max_file_size: u64,
    tuple_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl DownloadOrchestrator {
    pub fn new(fetcher: Arc<dyn MediaFetcher>, db_pool: Arc<DbPool>) -> Self {
        Self::with_settings(
            fetcher,
            db_pool,
            PathBuf::from(config::DOWNLOAD_FOLDER.as_str()),
            *config::limits::MAX_FILE_SIZE_BYTES,
        )
    }

    pub fn with_settings(
        fetcher: Arc<dyn MediaFetcher>,
        db_pool: Arc<DbPool>,
        download_root: PathBuf,
        max_file_size: u64,
    ) -> Self {
        Self {
            fetcher,
            db_pool,
            download_root,
            max_file_size,
            tuple_locks: DashMap::new(),
        }
    }

    /// Runs one download request through the state machine.
    ///
    /// A fresh audit record is always created for the requesting user. When
    /// a prior completed attempt for the same `(video, quality, format)`
    /// tuple still carries a durable pointer, the audit record inherits its
    /// terminal state, statistics are updated as if a fresh download had
    /// happened, and the *existing* record is returned — no fetch occurs.
    /// Otherwise a new fetch runs into an isolated per-attempt directory.
    pub async fn download(
        &self,
        video: &VideoRecord,
        user: &UserRecord,
        quality: Option<&str>,
        format_type: FormatType,
        requested_size: u64,
    ) -> AppResult<DownloadRecord> {
        let conn = db::get_connection(&self.db_pool)?;
        let record = db::insert_download(&conn, user.telegram_id, video.id, quality, format_type)?;
        drop(conn);

        // Serialize check-then-fetch per tuple so concurrent requests for
        // the same tuple cannot both miss the dedup lookup.
        let lock_key = format!("{}|{}|{}", video.id, quality.unwrap_or("auto"), format_type);
        let tuple_lock = self
            .tuple_locks
            .entry(lock_key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = tuple_lock.lock().await;

        let conn = db::get_connection(&self.db_pool)?;
        if let Some(existing) = db::find_reusable_download(&conn, video.id, quality, format_type)? {
            db::apply_reused_download(&conn, record.id, &existing)?;
            self.update_statistics(&conn, video, user, existing.file_size.unwrap_or(0))?;

            log::info!(
                "Reusing earlier download of \"{}\" ({:?}/{}) for user {}",
                video.title,
                quality,
                format_type,
                user.telegram_id
            );
            return Ok(existing);
        }
        drop(conn);

        self.start_new_download(record, video, user, quality, format_type, requested_size)
            .await
    }

    /// Performs a fresh fetch for an already-created pending record.
    ///
    /// All fetch failures terminate the record in `failed` with a readable
    /// cause; the returned record reflects the terminal state either way.
    async fn start_new_download(
        &self,
        record: DownloadRecord,
        video: &VideoRecord,
        user: &UserRecord,
        quality: Option<&str>,
        format_type: FormatType,
        requested_size: u64,
    ) -> AppResult<DownloadRecord> {
        let conn = db::get_connection(&self.db_pool)?;
        db::mark_download_started(&conn, record.id)?;
        drop(conn);

        let attempt_dir = self.download_root.join(uuid::Uuid::new_v4().to_string());

        let fetched = self
            .fetch_into(video, quality, format_type, requested_size, &attempt_dir)
            .await;

        let conn = db::get_connection(&self.db_pool)?;
        match fetched {
            Ok((file_path, file_size)) => {
                db::mark_download_completed(&conn, record.id, &file_path.to_string_lossy(), file_size as i64)?;
                db::cache_video_file_info(&conn, video.id, file_size as i64, quality, &format_type.to_string())?;
                self.update_statistics(&conn, video, user, file_size as i64)?;

                log::info!(
                    "Downloaded \"{}\" ({}) for user {}",
                    video.title,
                    format_file_size(file_size as i64),
                    user.telegram_id
                );
            }
            Err(e) => {
                let error_msg = e.to_string();
                log::error!("Download of video {} failed: {}", video.video_id, error_msg);
                db::mark_download_failed(&conn, record.id, &error_msg)?;

                // Drop whatever partial state the attempt left behind
                if attempt_dir.exists() {
                    if let Err(e) = std::fs::remove_dir_all(&attempt_dir) {
                        log::warn!("Failed to remove attempt directory {}: {}", attempt_dir.display(), e);
                    }
                }
            }
        }

        db::get_download(&conn, record.id)?.ok_or(AppError::Download("download record vanished".to_string()))
    }

    /// The fallible part of a fresh fetch: size gate, temp dir, extractor
    /// invocation, locating the produced file.
    async fn fetch_into(
        &self,
        video: &VideoRecord,
        quality: Option<&str>,
        format_type: FormatType,
        requested_size: u64,
        attempt_dir: &Path,
    ) -> AppResult<(PathBuf, u64)> {
        // Fail fast before spending bandwidth on an oversized request
        if requested_size > self.max_file_size {
            return Err(AppError::Download(format!(
                "Файл слишком большой: {}",
                format_file_size(requested_size as i64)
            )));
        }

        std::fs::create_dir_all(attempt_dir)?;

        let selector = build_format_selector(quality, format_type);
        let max_filesize = (!format_type.is_audio()).then_some(self.max_file_size);

        self.fetcher
            .fetch_media(&video.url, &selector, attempt_dir, format_type.is_audio(), max_filesize)
            .await?;

        let file_path = first_file_in(attempt_dir)?
            .ok_or_else(|| AppError::Download("Файл не был скачан".to_string()))?;
        let file_size = std::fs::metadata(&file_path)?.len();

        Ok((file_path, file_size))
    }

    /// Dedup-transparent counters: every terminal success bumps the video's
    /// popularity counter and the user's aggregates.
    fn update_statistics(
        &self,
        conn: &db::DbConnection,
        video: &VideoRecord,
        user: &UserRecord,
        file_size: i64,
    ) -> AppResult<()> {
        db::increment_video_download_count(conn, video.id)?;
        db::record_user_download(conn, user.telegram_id, file_size)?;
        Ok(())
    }
}

/// Builds the extractor's format selector string.
///
/// Audio requests take the best available audio stream. Video requests take
/// the best H.264 stream at or below the requested height merged with best
/// audio, falling back to best-overall when the constrained selector yields
/// nothing.
fn build_format_selector(quality: Option<&str>, format_type: FormatType) -> String {
    if format_type.is_audio() {
        return "bestaudio/best".to_string();
    }

    match quality.and_then(parse_height) {
        Some(height) => format!(
            "bestvideo[height<={h}][vcodec^=avc1]+bestaudio/best[height<={h}]/best",
            h = height
        ),
        None => "bestvideo[vcodec^=avc1]+bestaudio/best".to_string(),
    }
}

/// Parses the numeric height out of a quality label like "720p"
fn parse_height(quality: &str) -> Option<u32> {
    quality.trim_end_matches('p').parse().ok()
}

/// Returns the first regular file in a directory, if any. A successful
/// attempt is expected to produce exactly one.
fn first_file_in(dir: &Path) -> std::io::Result<Option<PathBuf>> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            return Ok(Some(entry.path()));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_selector_audio() {
        assert_eq!(build_format_selector(Some("720p"), FormatType::Mp3), "bestaudio/best");
        assert_eq!(build_format_selector(None, FormatType::Mp3), "bestaudio/best");
    }

    #[test]
    fn test_format_selector_video_with_height() {
        assert_eq!(
            build_format_selector(Some("720p"), FormatType::Mp4),
            "bestvideo[height<=720][vcodec^=avc1]+bestaudio/best[height<=720]/best"
        );
        assert_eq!(
            build_format_selector(Some("1080p"), FormatType::Mp4),
            "bestvideo[height<=1080][vcodec^=avc1]+bestaudio/best[height<=1080]/best"
        );
    }

    #[test]
    fn test_format_selector_video_auto() {
        assert_eq!(
            build_format_selector(None, FormatType::Mp4),
            "bestvideo[vcodec^=avc1]+bestaudio/best"
        );
        // Unparsable labels degrade to the unconstrained selector
        assert_eq!(
            build_format_selector(Some("best"), FormatType::Mp4),
            "bestvideo[vcodec^=avc1]+bestaudio/best"
        );
    }

    #[test]
    fn test_parse_height() {
        assert_eq!(parse_height("720p"), Some(720));
        assert_eq!(parse_height("144"), Some(144));
        assert_eq!(parse_height("auto"), None);
    }
}
