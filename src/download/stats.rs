//! Read-side statistics projections.
//!
//! Everything here is recomputed on demand from the download history; the
//! only cached aggregate in the system is the per-video `download_count`.
//! All summaries tolerate an empty history — division is guarded and
//! zero-row inputs produce zero-valued results.

use crate::core::AppResult;
use crate::storage::db::{self, DbConnection, DownloadStatus, UserRecord, VideoRecord, WindowedDownloadRow};

/// Global download statistics for the admin panel
#[derive(Debug, Clone, Default)]
pub struct DownloadStats {
    pub total: i64,
    pub completed: i64,
    pub failed: i64,
    /// completed / total × 100, 0 when there are no downloads
    pub success_rate: f64,
    pub today: i64,
}

/// Computes the global counters and success rate
pub fn get_download_stats(conn: &DbConnection) -> AppResult<DownloadStats> {
    let counts = db::global_download_counts(conn)?;

    let success_rate = if counts.total > 0 {
        counts.completed as f64 / counts.total as f64 * 100.0
    } else {
        0.0
    };

    Ok(DownloadStats {
        total: counts.total,
        completed: counts.completed,
        failed: counts.failed,
        success_rate,
        today: counts.today,
    })
}

/// Most downloaded videos, descending by popularity counter
pub fn get_popular_videos(conn: &DbConnection, limit: i64) -> AppResult<Vec<VideoRecord>> {
    Ok(db::get_popular_videos(conn, limit)?)
}

/// Per-user statistics for /stats
#[derive(Debug, Clone)]
pub struct UserStats {
    pub total_downloads: i64,
    pub total_download_size: i64,
    pub today: i64,
    pub week: i64,
    pub last_download_at: Option<String>,
}

/// Computes one user's summary from their aggregate row plus windowed counts
pub fn get_user_stats(conn: &DbConnection, user: &UserRecord) -> AppResult<UserStats> {
    let counts = db::user_download_counts(conn, user.telegram_id)?;

    Ok(UserStats {
        total_downloads: user.total_downloads,
        total_download_size: user.total_download_size,
        today: counts.today,
        week: counts.week,
        last_download_at: user.last_download_at.clone(),
    })
}

/// One per-user line of the windowed report
#[derive(Debug, Clone)]
pub struct ReportBucket {
    pub label: String,
    pub total: i64,
    pub completed: i64,
    pub failed: i64,
}

impl ReportBucket {
    pub fn success_rate(&self) -> f64 {
        if self.total > 0 {
            self.completed as f64 / self.total as f64 * 100.0
        } else {
            0.0
        }
    }
}

/// Per-user report over a trailing window, with a grand-total section
#[derive(Debug, Clone)]
pub struct WindowReport {
    pub days: i64,
    pub buckets: Vec<ReportBucket>,
    pub total: i64,
    pub completed: i64,
    pub failed: i64,
}

impl WindowReport {
    pub fn success_rate(&self) -> f64 {
        if self.total > 0 {
            self.completed as f64 / self.total as f64 * 100.0
        } else {
            0.0
        }
    }

    /// Renders the report as plain text for the exported document
    pub fn render(&self) -> String {
        let mut text = format!("Статистика скачиваний за последние {} дней\n", self.days);
        text.push_str("=".repeat(50).as_str());
        text.push('\n');

        for (idx, bucket) in self.buckets.iter().enumerate() {
            text.push_str(&format!(
                "{}. {} — всего: {}, успешно: {}, ошибок: {}, успешность: {:.1}%\n",
                idx + 1,
                bucket.label,
                bucket.total,
                bucket.completed,
                bucket.failed,
                bucket.success_rate()
            ));
        }

        if self.buckets.is_empty() {
            text.push_str("Нет скачиваний за этот период\n");
        }

        text.push_str("=".repeat(50).as_str());
        text.push('\n');
        text.push_str(&format!(
            "Итого: всего {}, успешно {}, ошибок {}, успешность {:.1}%\n",
            self.total,
            self.completed,
            self.failed,
            self.success_rate()
        ));

        text
    }
}

/// Builds the trailing-window report grouped by owning user. Downloads with
/// no resolvable user land in an anonymous bucket. Buckets are sorted by
/// total, descending.
pub fn build_window_report(conn: &DbConnection, days: i64) -> AppResult<WindowReport> {
    let rows = db::downloads_in_window(conn, days)?;
    Ok(aggregate_window(rows, days))
}

fn aggregate_window(rows: Vec<WindowedDownloadRow>, days: i64) -> WindowReport {
    // Keyed by user id; None groups the unattributable downloads
    let mut buckets: Vec<(Option<i64>, ReportBucket)> = Vec::new();
    let mut total = 0i64;
    let mut completed = 0i64;
    let mut failed = 0i64;

    for row in rows {
        let key = row.user_id;
        let idx = match buckets.iter().position(|(k, _)| *k == key) {
            Some(idx) => idx,
            None => {
                let label = match (row.user_id, row.full_name.as_deref()) {
                    (Some(id), Some(name)) if !name.is_empty() => format!("{} ({})", name, id),
                    (Some(id), _) => format!("id {}", id),
                    (None, _) => "аноним".to_string(),
                };
                buckets.push((
                    key,
                    ReportBucket {
                        label,
                        total: 0,
                        completed: 0,
                        failed: 0,
                    },
                ));
                buckets.len() - 1
            }
        };
        let bucket = &mut buckets[idx].1;

        bucket.total += 1;
        total += 1;
        match row.status {
            DownloadStatus::Completed => {
                bucket.completed += 1;
                completed += 1;
            }
            DownloadStatus::Failed => {
                bucket.failed += 1;
                failed += 1;
            }
            _ => {}
        }
    }

    let mut buckets: Vec<ReportBucket> = buckets.into_iter().map(|(_, bucket)| bucket).collect();
    buckets.sort_by(|a, b| b.total.cmp(&a.total));

    WindowReport {
        days,
        buckets,
        total,
        completed,
        failed,
    }
}
