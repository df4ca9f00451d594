//! Disk retention: eviction of completed downloads' local files.
//!
//! Local storage is a cache of already-fetched media. A record whose
//! `telegram_file_id` was stored can always be re-served without the local
//! file; evicting a record that never got one genuinely loses the content,
//! which is logged as a warning-level anomaly rather than silently done.
//!
//! Two policies operate over completed records with a local file:
//! an unconditional sweep triggered by admins, and a threshold-driven
//! scheduler that frees space oldest-completion-first whenever disk usage
//! crosses the configured threshold.

use crate::core::disk::{self, DiskUsage};
use crate::core::utils::format_file_size;
use crate::core::{config, AppResult};
use crate::storage::db::{self, DbConnection, DbPool, DownloadRecord};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Settings for the threshold-driven sweep
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    /// Directory whose filesystem is measured (the download root)
    pub download_root: String,
    /// Usage percentage above which eviction starts
    pub usage_threshold_percent: f64,
    /// Usage fraction (0.0 - 1.0) the sweep frees down to
    pub usage_target_fraction: f64,
    /// Pause between scheduler passes
    pub interval: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            download_root: config::DOWNLOAD_FOLDER.clone(),
            usage_threshold_percent: *config::cleanup::USAGE_THRESHOLD_PERCENT,
            usage_target_fraction: *config::cleanup::USAGE_TARGET_FRACTION,
            interval: config::cleanup::interval(),
        }
    }
}

/// Result of one threshold sweep pass
#[derive(Debug, Clone, Default)]
pub struct SweepOutcome {
    pub files_removed: usize,
    pub bytes_freed: u64,
}

/// Deletes every locally stored completed file and nulls its `file_path`.
/// Per-file failures are logged and the sweep continues. Returns the number
/// of files actually removed.
pub async fn cleanup_all(pool: &DbPool) -> AppResult<usize> {
    let conn = db::get_connection(pool)?;
    let downloads = db::completed_downloads_with_files(&conn)?;

    let mut cleaned_count = 0;
    for download in &downloads {
        if evict_local_file(&conn, download) {
            cleaned_count += 1;
        }
    }

    log::info!("Cleaned up {} downloaded files", cleaned_count);
    Ok(cleaned_count)
}

/// One threshold-driven pass: no-op below the usage threshold, otherwise
/// evicts oldest-completed-first until the byte target is met or records
/// run out.
pub async fn run_threshold_sweep(pool: &DbPool, policy: &RetentionPolicy) -> AppResult<SweepOutcome> {
    let usage = disk::disk_usage(&policy.download_root)?;

    if usage.used_percent < policy.usage_threshold_percent {
        log::debug!(
            "Disk usage {:.1}% below threshold {:.1}%, nothing to do",
            usage.used_percent,
            policy.usage_threshold_percent
        );
        return Ok(SweepOutcome::default());
    }

    let bytes_to_free = bytes_to_free(&usage, policy.usage_target_fraction);
    log::info!(
        "Disk usage {:.1}% over threshold, freeing {}",
        usage.used_percent,
        format_file_size(bytes_to_free as i64)
    );

    let conn = db::get_connection(pool)?;
    let downloads = db::completed_downloads_with_files(&conn)?;

    let mut outcome = SweepOutcome::default();
    for download in &downloads {
        if outcome.bytes_freed >= bytes_to_free {
            break;
        }

        let size = download
            .file_path
            .as_deref()
            .and_then(|path| std::fs::metadata(path).ok().map(|m| m.len()))
            .or(download.file_size.map(|s| s as u64))
            .unwrap_or(0);

        if evict_local_file(&conn, download) {
            outcome.files_removed += 1;
            outcome.bytes_freed += size;
        }
    }

    log::info!(
        "Threshold sweep removed {} files ({})",
        outcome.files_removed,
        format_file_size(outcome.bytes_freed as i64)
    );
    Ok(outcome)
}

/// Bytes that must be freed to bring usage down to the target fraction
fn bytes_to_free(usage: &DiskUsage, target_fraction: f64) -> u64 {
    let target_bytes = (usage.total_bytes as f64 * target_fraction) as u64;
    usage.used_bytes.saturating_sub(target_bytes)
}

/// Removes one record's local file and nulls its pointer.
///
/// Returns true when a file was actually deleted. A vanished file still has
/// its stale pointer nulled but is not counted. Failures are logged and
/// swallowed so the surrounding sweep keeps going.
fn evict_local_file(conn: &DbConnection, download: &DownloadRecord) -> bool {
    let Some(file_path) = download.file_path.as_deref() else {
        return false;
    };

    if download.telegram_file_id.is_none() {
        log::warn!(
            "Evicting download {} without a remote file reference; content will be unrecoverable",
            download.id
        );
    }

    let path = Path::new(file_path);
    if !path.exists() {
        log::warn!("Download {} file already gone: {}", download.id, file_path);
        if let Err(e) = db::clear_download_file_path(conn, download.id) {
            log::error!("Failed to clear stale file path for download {}: {}", download.id, e);
        }
        return false;
    }

    if let Err(e) = std::fs::remove_file(path) {
        log::error!("Failed to remove file {}: {}", file_path, e);
        return false;
    }

    // The per-attempt directory is empty once its single file is gone
    if let Some(parent) = path.parent() {
        match std::fs::read_dir(parent) {
            Ok(mut entries) => {
                if entries.next().is_none() {
                    if let Err(e) = std::fs::remove_dir(parent) {
                        log::warn!("Failed to remove empty directory {}: {}", parent.display(), e);
                    }
                }
            }
            Err(e) => log::warn!("Failed to inspect directory {}: {}", parent.display(), e),
        }
    }

    if let Err(e) = db::clear_download_file_path(conn, download.id) {
        log::error!("Failed to clear file path for download {}: {}", download.id, e);
        return false;
    }

    true
}

/// Spawns the immortal retention scheduler.
///
/// Every iteration runs one threshold sweep and then sleeps the fixed
/// interval, regardless of outcome. Errors are logged and swallowed — a
/// single failed pass never terminates the task.
pub fn spawn_cleanup_scheduler(pool: Arc<DbPool>, policy: RetentionPolicy) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        log::info!(
            "Retention scheduler started (threshold: {:.0}%, target: {:.0}%, interval: {}s)",
            policy.usage_threshold_percent,
            policy.usage_target_fraction * 100.0,
            policy.interval.as_secs()
        );

        loop {
            if let Err(e) = run_threshold_sweep(&pool, &policy).await {
                log::error!("Retention sweep failed: {}", e);
            }

            tokio::time::sleep(policy.interval).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_to_free() {
        let usage = DiskUsage {
            total_bytes: 1000,
            used_bytes: 900,
            available_bytes: 100,
            used_percent: 90.0,
            path: "/".to_string(),
        };

        // Freeing down to 60% of 1000 bytes means releasing 300
        assert_eq!(bytes_to_free(&usage, 0.6), 300);

        // Already below target: nothing to free
        let usage = DiskUsage {
            total_bytes: 1000,
            used_bytes: 500,
            available_bytes: 500,
            used_percent: 50.0,
            path: "/".to_string(),
        };
        assert_eq!(bytes_to_free(&usage, 0.6), 0);
    }
}
