use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Result;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum::{Display, EnumString};

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

/// Lifecycle state of a download attempt.
///
/// Transitions are strictly forward: `Pending` → `Downloading` →
/// {`Completed` | `Failed`}. A retry is always a brand-new record.
/// `Cancelled` exists in the data model but is not reachable through any
/// operation; it is reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum DownloadStatus {
    Pending,
    Downloading,
    Completed,
    Failed,
    Cancelled,
}

/// Requested container/codec family: full video or audio-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum FormatType {
    #[strum(serialize = "mp4")]
    Mp4,
    #[strum(serialize = "mp3")]
    Mp3,
}

impl FormatType {
    pub fn is_audio(self) -> bool {
        matches!(self, FormatType::Mp3)
    }
}

/// A user known to the bot. Created on first interaction, never hard-deleted.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub telegram_id: i64,
    pub full_name: String,
    pub username: Option<String>,
    pub is_admin: bool,
    pub is_blocked: bool,
    pub total_downloads: i64,
    pub total_download_size: i64,
    pub created_at: String,
    pub last_download_at: Option<String>,
}

/// One entry of a video's `available_formats` list, as extracted from the
/// metadata fetch. Audio-only source formats are excluded at extraction time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatDescriptor {
    pub format_id: Option<String>,
    pub ext: Option<String>,
    pub height: Option<i64>,
    pub width: Option<i64>,
    pub fps: Option<f64>,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    pub filesize: Option<i64>,
}

/// A catalogued video. Exactly one record exists per canonical `video_id`;
/// metadata is immutable once captured. The `file_size`/`quality`/`format_id`
/// trio is a denormalized cache set by the first completed download.
#[derive(Debug, Clone)]
pub struct VideoRecord {
    pub id: i64,
    pub video_id: String,
    pub url: String,
    pub title: String,
    pub description: Option<String>,
    pub duration: i64,
    pub view_count: Option<i64>,
    pub like_count: Option<i64>,
    pub channel_name: Option<String>,
    pub channel_id: Option<String>,
    pub upload_date: Option<String>,
    pub thumbnail_url: Option<String>,
    pub available_formats: Vec<FormatDescriptor>,
    pub file_size: Option<i64>,
    pub quality: Option<String>,
    pub format_id: Option<String>,
    pub download_count: i64,
}

/// Field set for inserting a new video into the catalog
#[derive(Debug, Clone)]
pub struct NewVideo {
    pub video_id: String,
    pub url: String,
    pub title: String,
    pub description: Option<String>,
    pub duration: i64,
    pub view_count: Option<i64>,
    pub like_count: Option<i64>,
    pub channel_name: Option<String>,
    pub channel_id: Option<String>,
    pub upload_date: Option<String>,
    pub thumbnail_url: Option<String>,
    pub available_formats: Vec<FormatDescriptor>,
}

/// One download attempt. Owned by the orchestrator; statistics and cleanup
/// only read these rows (cleanup additionally nulls `file_path`).
#[derive(Debug, Clone)]
pub struct DownloadRecord {
    pub id: i64,
    pub user_id: Option<i64>,
    pub video_id: i64,
    pub quality: Option<String>,
    pub format_type: FormatType,
    pub status: DownloadStatus,
    pub file_path: Option<String>,
    pub telegram_file_id: Option<String>,
    pub file_size: Option<i64>,
    pub error_message: Option<String>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

/// History line shown to users: download attempt joined with its video title
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub id: i64,
    pub title: String,
    pub quality: Option<String>,
    pub format_type: FormatType,
    pub status: DownloadStatus,
    pub created_at: String,
}

/// Global download counters for the admin panel
#[derive(Debug, Clone, Default)]
pub struct GlobalDownloadCounts {
    pub total: i64,
    pub completed: i64,
    pub failed: i64,
    pub today: i64,
}

/// Per-user download counters for /stats
#[derive(Debug, Clone)]
pub struct UserDownloadCounts {
    pub today: i64,
    pub week: i64,
}

/// One row of the windowed report query: owning user (if still resolvable)
/// and the attempt's status.
#[derive(Debug, Clone)]
pub struct WindowedDownloadRow {
    pub user_id: Option<i64>,
    pub full_name: Option<String>,
    pub status: DownloadStatus,
}

/// Create a new database connection pool
///
/// Initializes a connection pool with up to 10 connections and ensures the
/// schema exists on the first connection.
pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path);
    let pool = Pool::builder().max_size(10).build(manager)?;

    let conn = pool.get()?;
    if let Err(e) = migrate_schema(&conn) {
        log::warn!("Failed to migrate schema: {}", e);
    }

    Ok(pool)
}

/// Get a connection from the pool. The connection is returned to the pool
/// when dropped.
pub fn get_connection(pool: &DbPool) -> Result<DbConnection, r2d2::Error> {
    pool.get()
}

/// Creates all tables and indexes if they do not exist yet. Idempotent.
pub fn migrate_schema(conn: &rusqlite::Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (
            telegram_id INTEGER PRIMARY KEY,
            full_name TEXT NOT NULL DEFAULT '',
            username TEXT,
            is_admin INTEGER NOT NULL DEFAULT 0,
            is_blocked INTEGER NOT NULL DEFAULT 0,
            total_downloads INTEGER NOT NULL DEFAULT 0,
            total_download_size INTEGER NOT NULL DEFAULT 0,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            last_download_at DATETIME
        );

        CREATE TABLE IF NOT EXISTS videos (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            video_id TEXT NOT NULL UNIQUE,
            url TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT,
            duration INTEGER NOT NULL DEFAULT 0,
            view_count INTEGER,
            like_count INTEGER,
            channel_name TEXT,
            channel_id TEXT,
            upload_date TEXT,
            thumbnail_url TEXT,
            available_formats TEXT NOT NULL DEFAULT '[]',
            file_size INTEGER,
            quality TEXT,
            format_id TEXT,
            download_count INTEGER NOT NULL DEFAULT 0,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS download_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER REFERENCES users(telegram_id),
            video_id INTEGER NOT NULL REFERENCES videos(id),
            quality TEXT,
            format_type TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            file_path TEXT,
            telegram_file_id TEXT,
            file_size INTEGER,
            error_message TEXT,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            started_at DATETIME,
            completed_at DATETIME
        );

        CREATE INDEX IF NOT EXISTS idx_history_dedup
            ON download_history(video_id, quality, format_type, status);
        CREATE INDEX IF NOT EXISTS idx_history_user_created
            ON download_history(user_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_history_retention
            ON download_history(status, completed_at);",
    )
}

fn parse_status(idx: usize, raw: &str) -> Result<DownloadStatus> {
    DownloadStatus::from_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e)))
}

fn parse_format(idx: usize, raw: &str) -> Result<FormatType> {
    FormatType::from_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e)))
}

// ==================== users ====================

fn map_user(row: &rusqlite::Row<'_>) -> Result<UserRecord> {
    Ok(UserRecord {
        telegram_id: row.get(0)?,
        full_name: row.get(1)?,
        username: row.get(2)?,
        is_admin: row.get::<_, i64>(3)? != 0,
        is_blocked: row.get::<_, i64>(4)? != 0,
        total_downloads: row.get(5)?,
        total_download_size: row.get(6)?,
        created_at: row.get(7)?,
        last_download_at: row.get(8)?,
    })
}

const USER_COLUMNS: &str = "telegram_id, full_name, username, is_admin, is_blocked, \
                            total_downloads, total_download_size, created_at, last_download_at";

/// Fetches a user by Telegram ID
pub fn get_user(conn: &DbConnection, telegram_id: i64) -> Result<Option<UserRecord>> {
    let mut stmt = conn.prepare(&format!("SELECT {} FROM users WHERE telegram_id = ?1", USER_COLUMNS))?;
    let mut rows = stmt.query_map([telegram_id], map_user)?;
    rows.next().transpose()
}

/// Creates a user on first interaction, or refreshes their display name and
/// username on subsequent ones. Returns the stored record.
pub fn get_or_create_user(
    conn: &DbConnection,
    telegram_id: i64,
    full_name: &str,
    username: Option<&str>,
    is_admin: bool,
) -> Result<UserRecord> {
    conn.execute(
        "INSERT INTO users (telegram_id, full_name, username, is_admin)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(telegram_id) DO UPDATE SET
             full_name = excluded.full_name,
             username = excluded.username,
             is_admin = excluded.is_admin",
        rusqlite::params![telegram_id, full_name, username, is_admin as i64],
    )?;

    get_user(conn, telegram_id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
}

/// Sets or clears the blocked flag. Returns false when the user is unknown.
pub fn set_user_blocked(conn: &DbConnection, telegram_id: i64, blocked: bool) -> Result<bool> {
    let rows = conn.execute(
        "UPDATE users SET is_blocked = ?1 WHERE telegram_id = ?2",
        rusqlite::params![blocked as i64, telegram_id],
    )?;
    Ok(rows > 0)
}

/// Attributes one finished download to a user: bumps the counter, adds the
/// byte size and stamps `last_download_at`.
pub fn record_user_download(conn: &DbConnection, telegram_id: i64, file_size: i64) -> Result<()> {
    conn.execute(
        "UPDATE users SET
             total_downloads = total_downloads + 1,
             total_download_size = total_download_size + ?1,
             last_download_at = CURRENT_TIMESTAMP
         WHERE telegram_id = ?2",
        rusqlite::params![file_size, telegram_id],
    )?;
    Ok(())
}

/// Lists users, newest first
pub fn get_all_users(conn: &DbConnection, limit: i64) -> Result<Vec<UserRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM users ORDER BY created_at DESC LIMIT ?1",
        USER_COLUMNS
    ))?;
    let rows = stmt.query_map([limit], map_user)?;
    rows.collect()
}

pub fn get_users_count(conn: &DbConnection) -> Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
}

/// Users with at least one download in the trailing week
pub fn get_active_users_count(conn: &DbConnection) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM users WHERE last_download_at >= datetime('now', '-7 days')",
        [],
        |row| row.get(0),
    )
}

/// All known Telegram IDs, for the admin export
pub fn get_all_user_ids(conn: &DbConnection) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare("SELECT telegram_id FROM users ORDER BY created_at")?;
    let rows = stmt.query_map([], |row| row.get(0))?;
    rows.collect()
}

// ==================== videos ====================

const VIDEO_COLUMNS: &str = "id, video_id, url, title, description, duration, view_count, like_count, \
                             channel_name, channel_id, upload_date, thumbnail_url, available_formats, \
                             file_size, quality, format_id, download_count";

fn map_video(row: &rusqlite::Row<'_>) -> Result<VideoRecord> {
    let formats_json: String = row.get(12)?;
    let available_formats: Vec<FormatDescriptor> = serde_json::from_str(&formats_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(12, rusqlite::types::Type::Text, Box::new(e)))?;

    Ok(VideoRecord {
        id: row.get(0)?,
        video_id: row.get(1)?,
        url: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        duration: row.get(5)?,
        view_count: row.get(6)?,
        like_count: row.get(7)?,
        channel_name: row.get(8)?,
        channel_id: row.get(9)?,
        upload_date: row.get(10)?,
        thumbnail_url: row.get(11)?,
        available_formats,
        file_size: row.get(13)?,
        quality: row.get(14)?,
        format_id: row.get(15)?,
        download_count: row.get(16)?,
    })
}

/// Fetches a video by its canonical platform id
pub fn get_video_by_video_id(conn: &DbConnection, video_id: &str) -> Result<Option<VideoRecord>> {
    let mut stmt = conn.prepare(&format!("SELECT {} FROM videos WHERE video_id = ?1", VIDEO_COLUMNS))?;
    let mut rows = stmt.query_map([video_id], map_video)?;
    rows.next().transpose()
}

/// Fetches a video by its row id
pub fn get_video(conn: &DbConnection, id: i64) -> Result<Option<VideoRecord>> {
    let mut stmt = conn.prepare(&format!("SELECT {} FROM videos WHERE id = ?1", VIDEO_COLUMNS))?;
    let mut rows = stmt.query_map([id], map_video)?;
    rows.next().transpose()
}

/// Inserts a new catalog entry and returns the stored record
pub fn insert_video(conn: &DbConnection, video: &NewVideo) -> Result<VideoRecord> {
    let formats_json = serde_json::to_string(&video.available_formats)
        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;

    conn.execute(
        "INSERT INTO videos (video_id, url, title, description, duration, view_count, like_count,
                             channel_name, channel_id, upload_date, thumbnail_url, available_formats)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        rusqlite::params![
            video.video_id,
            video.url,
            video.title,
            video.description,
            video.duration,
            video.view_count,
            video.like_count,
            video.channel_name,
            video.channel_id,
            video.upload_date,
            video.thumbnail_url,
            formats_json,
        ],
    )?;

    let id = conn.last_insert_rowid();
    get_video(conn, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
}

/// Increments the per-video popularity counter
pub fn increment_video_download_count(conn: &DbConnection, id: i64) -> Result<()> {
    conn.execute(
        "UPDATE videos SET download_count = download_count + 1 WHERE id = ?1",
        [id],
    )?;
    Ok(())
}

/// Caches the first completed download's size/quality/format on the video.
/// A later download never overwrites an already-set cache.
pub fn cache_video_file_info(
    conn: &DbConnection,
    id: i64,
    file_size: i64,
    quality: Option<&str>,
    format_id: &str,
) -> Result<()> {
    conn.execute(
        "UPDATE videos SET file_size = ?1, quality = ?2, format_id = ?3
         WHERE id = ?4 AND file_size IS NULL",
        rusqlite::params![file_size, quality, format_id, id],
    )?;
    Ok(())
}

/// Most downloaded videos, descending
pub fn get_popular_videos(conn: &DbConnection, limit: i64) -> Result<Vec<VideoRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM videos ORDER BY download_count DESC LIMIT ?1",
        VIDEO_COLUMNS
    ))?;
    let rows = stmt.query_map([limit], map_video)?;
    rows.collect()
}

// ==================== download history ====================

const DOWNLOAD_COLUMNS: &str = "id, user_id, video_id, quality, format_type, status, file_path, \
                                telegram_file_id, file_size, error_message, created_at, started_at, completed_at";

fn map_download(row: &rusqlite::Row<'_>) -> Result<DownloadRecord> {
    let format_raw: String = row.get(4)?;
    let status_raw: String = row.get(5)?;

    Ok(DownloadRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        video_id: row.get(2)?,
        quality: row.get(3)?,
        format_type: parse_format(4, &format_raw)?,
        status: parse_status(5, &status_raw)?,
        file_path: row.get(6)?,
        telegram_file_id: row.get(7)?,
        file_size: row.get(8)?,
        error_message: row.get(9)?,
        created_at: row.get(10)?,
        started_at: row.get(11)?,
        completed_at: row.get(12)?,
    })
}

/// Fetches a download attempt by id
pub fn get_download(conn: &DbConnection, id: i64) -> Result<Option<DownloadRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM download_history WHERE id = ?1",
        DOWNLOAD_COLUMNS
    ))?;
    let mut rows = stmt.query_map([id], map_download)?;
    rows.next().transpose()
}

/// Creates a new attempt in `pending` and returns the stored record
pub fn insert_download(
    conn: &DbConnection,
    user_id: i64,
    video_id: i64,
    quality: Option<&str>,
    format_type: FormatType,
) -> Result<DownloadRecord> {
    conn.execute(
        "INSERT INTO download_history (user_id, video_id, quality, format_type, status)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            user_id,
            video_id,
            quality,
            format_type.to_string(),
            DownloadStatus::Pending.to_string()
        ],
    )?;

    let id = conn.last_insert_rowid();
    get_download(conn, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
}

/// Looks up a prior completed attempt for the same `(video, quality, format)`
/// tuple that still carries a durable pointer (local file or remote file id).
pub fn find_reusable_download(
    conn: &DbConnection,
    video_id: i64,
    quality: Option<&str>,
    format_type: FormatType,
) -> Result<Option<DownloadRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM download_history
         WHERE video_id = ?1 AND quality IS ?2 AND format_type = ?3
           AND status = ?4
           AND (file_path IS NOT NULL OR telegram_file_id IS NOT NULL)
         ORDER BY completed_at ASC LIMIT 1",
        DOWNLOAD_COLUMNS
    ))?;
    let mut rows = stmt.query_map(
        rusqlite::params![
            video_id,
            quality,
            format_type.to_string(),
            DownloadStatus::Completed.to_string()
        ],
        map_download,
    )?;
    rows.next().transpose()
}

/// `pending` → `downloading`, stamping the start time
pub fn mark_download_started(conn: &DbConnection, id: i64) -> Result<()> {
    conn.execute(
        "UPDATE download_history SET status = ?1, started_at = CURRENT_TIMESTAMP WHERE id = ?2",
        rusqlite::params![DownloadStatus::Downloading.to_string(), id],
    )?;
    Ok(())
}

/// Terminal success: records the produced file and its size
pub fn mark_download_completed(conn: &DbConnection, id: i64, file_path: &str, file_size: i64) -> Result<()> {
    conn.execute(
        "UPDATE download_history SET status = ?1, file_path = ?2, file_size = ?3,
             completed_at = CURRENT_TIMESTAMP
         WHERE id = ?4",
        rusqlite::params![DownloadStatus::Completed.to_string(), file_path, file_size, id],
    )?;
    Ok(())
}

/// Terminal failure: stores the human-readable cause, leaves no file pointer
pub fn mark_download_failed(conn: &DbConnection, id: i64, error_message: &str) -> Result<()> {
    conn.execute(
        "UPDATE download_history SET status = ?1, error_message = ?2, file_path = NULL,
             completed_at = CURRENT_TIMESTAMP
         WHERE id = ?3",
        rusqlite::params![DownloadStatus::Failed.to_string(), error_message, id],
    )?;
    Ok(())
}

/// Copies a reusable attempt's terminal state onto a fresh audit record
/// (dedup hit: the new record inherits completion without any fetch).
pub fn apply_reused_download(conn: &DbConnection, id: i64, existing: &DownloadRecord) -> Result<()> {
    conn.execute(
        "UPDATE download_history SET status = ?1, file_size = ?2, telegram_file_id = ?3,
             completed_at = CURRENT_TIMESTAMP
         WHERE id = ?4",
        rusqlite::params![
            existing.status.to_string(),
            existing.file_size,
            existing.telegram_file_id,
            id
        ],
    )?;
    Ok(())
}

/// Stores the remote file reference after the first successful upload
pub fn set_telegram_file_id(conn: &DbConnection, id: i64, file_id: &str) -> Result<()> {
    conn.execute(
        "UPDATE download_history SET telegram_file_id = ?1 WHERE id = ?2",
        rusqlite::params![file_id, id],
    )?;
    Ok(())
}

/// Nulls the local file pointer after eviction
pub fn clear_download_file_path(conn: &DbConnection, id: i64) -> Result<()> {
    conn.execute("UPDATE download_history SET file_path = NULL WHERE id = ?1", [id])?;
    Ok(())
}

/// Completed attempts that still hold a local file, oldest completion first.
/// This is the eviction ordering of the retention manager.
pub fn completed_downloads_with_files(conn: &DbConnection) -> Result<Vec<DownloadRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM download_history
         WHERE status = ?1 AND file_path IS NOT NULL
         ORDER BY completed_at ASC",
        DOWNLOAD_COLUMNS
    ))?;
    let rows = stmt.query_map([DownloadStatus::Completed.to_string()], map_download)?;
    rows.collect()
}

/// A user's most recent download attempts joined with video titles
pub fn get_user_history(conn: &DbConnection, user_id: i64, limit: i64) -> Result<Vec<HistoryEntry>> {
    let mut stmt = conn.prepare(
        "SELECT d.id, v.title, d.quality, d.format_type, d.status, d.created_at
         FROM download_history d
         JOIN videos v ON v.id = d.video_id
         WHERE d.user_id = ?1
         ORDER BY d.created_at DESC LIMIT ?2",
    )?;
    let rows = stmt.query_map(rusqlite::params![user_id, limit], |row| {
        let format_raw: String = row.get(3)?;
        let status_raw: String = row.get(4)?;
        Ok(HistoryEntry {
            id: row.get(0)?,
            title: row.get(1)?,
            quality: row.get(2)?,
            format_type: parse_format(3, &format_raw)?,
            status: parse_status(4, &status_raw)?,
            created_at: row.get(5)?,
        })
    })?;
    rows.collect()
}

// ==================== aggregate queries ====================

/// Global attempt counters. "Today" is measured from local midnight.
pub fn global_download_counts(conn: &DbConnection) -> Result<GlobalDownloadCounts> {
    let total: i64 = conn.query_row("SELECT COUNT(*) FROM download_history", [], |row| row.get(0))?;
    let completed: i64 = conn.query_row(
        "SELECT COUNT(*) FROM download_history WHERE status = ?1",
        [DownloadStatus::Completed.to_string()],
        |row| row.get(0),
    )?;
    let failed: i64 = conn.query_row(
        "SELECT COUNT(*) FROM download_history WHERE status = ?1",
        [DownloadStatus::Failed.to_string()],
        |row| row.get(0),
    )?;
    let today: i64 = conn.query_row(
        "SELECT COUNT(*) FROM download_history
         WHERE DATE(created_at, 'localtime') = DATE('now', 'localtime')",
        [],
        |row| row.get(0),
    )?;

    Ok(GlobalDownloadCounts {
        total,
        completed,
        failed,
        today,
    })
}

/// Today/this-week counters for one user
pub fn user_download_counts(conn: &DbConnection, user_id: i64) -> Result<UserDownloadCounts> {
    let today: i64 = conn.query_row(
        "SELECT COUNT(*) FROM download_history
         WHERE user_id = ?1 AND DATE(created_at, 'localtime') = DATE('now', 'localtime')",
        [user_id],
        |row| row.get(0),
    )?;
    let week: i64 = conn.query_row(
        "SELECT COUNT(*) FROM download_history
         WHERE user_id = ?1 AND created_at >= datetime('now', '-7 days')",
        [user_id],
        |row| row.get(0),
    )?;

    Ok(UserDownloadCounts { today, week })
}

/// Attempts within the trailing window, with owner attribution when the user
/// row still resolves. Feeds the per-user windowed report.
pub fn downloads_in_window(conn: &DbConnection, days: i64) -> Result<Vec<WindowedDownloadRow>> {
    let cutoff = format!("-{} days", days);
    let mut stmt = conn.prepare(
        "SELECT d.user_id, u.full_name, d.status
         FROM download_history d
         LEFT JOIN users u ON u.telegram_id = d.user_id
         WHERE d.created_at >= datetime('now', ?1)",
    )?;
    let rows = stmt.query_map([cutoff], |row| {
        let status_raw: String = row.get(2)?;
        Ok(WindowedDownloadRow {
            user_id: row.get(0)?,
            full_name: row.get(1)?,
            status: parse_status(2, &status_raw)?,
        })
    })?;
    rows.collect()
}
