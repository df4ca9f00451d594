use once_cell::sync::Lazy;
use std::env;
use std::time::Duration;

/// Cached yt-dlp binary path
/// Read once at startup from YTDL_BIN environment variable or defaults to "yt-dlp"
pub static YTDL_BIN: Lazy<String> = Lazy::new(|| env::var("YTDL_BIN").unwrap_or_else(|_| "yt-dlp".to_string()));

/// Download folder path
/// Read from DOWNLOAD_FOLDER environment variable
/// Every download attempt gets its own subdirectory under this root.
pub static DOWNLOAD_FOLDER: Lazy<String> =
    Lazy::new(|| env::var("DOWNLOAD_FOLDER").unwrap_or_else(|_| "./downloads".to_string()));

/// Database file path
/// Read from DATABASE_PATH environment variable
/// Default: database.sqlite
pub static DATABASE_PATH: Lazy<String> =
    Lazy::new(|| env::var("DATABASE_PATH").unwrap_or_else(|_| "database.sqlite".to_string()));

/// Bot token
/// Read from BOT_TOKEN or TELOXIDE_TOKEN environment variable
pub static BOT_TOKEN: Lazy<String> = Lazy::new(|| {
    env::var("BOT_TOKEN")
        .or_else(|_| env::var("TELOXIDE_TOKEN"))
        .unwrap_or_else(|_| String::new())
});

/// Administrator Telegram IDs
/// Read from ADMIN_IDS environment variable as a comma-separated list.
/// Unparsable entries are skipped.
pub static ADMIN_IDS: Lazy<Vec<i64>> = Lazy::new(|| {
    env::var("ADMIN_IDS")
        .unwrap_or_default()
        .split(',')
        .filter_map(|part| part.trim().parse::<i64>().ok())
        .collect()
});

/// Checks whether a Telegram ID belongs to a configured administrator
pub fn is_admin_id(telegram_id: i64) -> bool {
    ADMIN_IDS.contains(&telegram_id)
}

/// Download limit configuration
pub mod limits {
    use once_cell::sync::Lazy;
    use std::env;

    /// Maximum video duration accepted into the catalog (in seconds)
    /// Read from MAX_VIDEO_DURATION, default 1 hour
    pub static MAX_VIDEO_DURATION_SECS: Lazy<i64> = Lazy::new(|| {
        env::var("MAX_VIDEO_DURATION")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3600)
    });

    /// Maximum downloaded file size (in bytes)
    /// Read from MAX_FILE_SIZE, default 50 MB (Bot API upload ceiling)
    pub static MAX_FILE_SIZE_BYTES: Lazy<u64> = Lazy::new(|| {
        env::var("MAX_FILE_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(50 * 1024 * 1024)
    });
}

/// Retention / cleanup configuration
pub mod cleanup {
    use super::Duration;
    use once_cell::sync::Lazy;
    use std::env;

    /// Disk usage percentage above which the threshold sweep starts evicting
    pub static USAGE_THRESHOLD_PERCENT: Lazy<f64> = Lazy::new(|| {
        env::var("CLEANUP_THRESHOLD_PERCENT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(80.0)
    });

    /// Target disk usage fraction the sweep frees down to (0.0 - 1.0)
    pub static USAGE_TARGET_FRACTION: Lazy<f64> = Lazy::new(|| {
        env::var("CLEANUP_TARGET_FRACTION")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0.6)
    });

    /// Interval between scheduler passes (in seconds)
    pub const INTERVAL_SECS: u64 = 3600;

    /// Scheduler pass interval duration
    pub fn interval() -> Duration {
        Duration::from_secs(INTERVAL_SECS)
    }
}

/// yt-dlp invocation configuration
pub mod ytdlp {
    use super::Duration;

    /// Timeout for metadata fetches (in seconds)
    pub const METADATA_TIMEOUT_SECS: u64 = 60;

    /// Timeout for media downloads (in seconds)
    pub const DOWNLOAD_TIMEOUT_SECS: u64 = 600;

    /// Metadata fetch timeout duration
    pub fn metadata_timeout() -> Duration {
        Duration::from_secs(METADATA_TIMEOUT_SECS)
    }

    /// Media download timeout duration
    pub fn download_timeout() -> Duration {
        Duration::from_secs(DOWNLOAD_TIMEOUT_SECS)
    }
}

/// Broadcast configuration
pub mod broadcast {
    use super::Duration;

    /// Delay between outbound sends during a broadcast (milliseconds)
    /// Keeps the bot under Telegram's per-second send limits.
    pub const INTER_SEND_DELAY_MS: u64 = 50;

    /// Inter-send delay duration
    pub fn inter_send_delay() -> Duration {
        Duration::from_millis(INTER_SEND_DELAY_MS)
    }
}
