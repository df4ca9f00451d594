//! Filesystem usage probing for the retention manager.
//!
//! Uses the `df` command, which works on both Linux and macOS.

use crate::core::error::AppError;
use std::path::Path;

/// Result of a filesystem usage probe
#[derive(Debug, Clone)]
pub struct DiskUsage {
    /// Total space in bytes
    pub total_bytes: u64,
    /// Used space in bytes
    pub used_bytes: u64,
    /// Available space in bytes
    pub available_bytes: u64,
    /// Used percentage (0-100)
    pub used_percent: f64,
    /// Path that was checked
    pub path: String,
}

impl DiskUsage {
    /// Returns used space in GB
    pub fn used_gb(&self) -> f64 {
        self.used_bytes as f64 / (1024.0 * 1024.0 * 1024.0)
    }

    /// Returns total space in GB
    pub fn total_gb(&self) -> f64 {
        self.total_bytes as f64 / (1024.0 * 1024.0 * 1024.0)
    }
}

/// Probes disk usage for a path using the df command.
///
/// If the path does not exist yet, its parent directory is probed instead
/// (the download root may not have been created on first run).
pub fn disk_usage(path: &str) -> Result<DiskUsage, AppError> {
    let check_path = if Path::new(path).exists() {
        path.to_string()
    } else {
        Path::new(path)
            .parent()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_else(|| "/".to_string())
    };

    let output = std::process::Command::new("df")
        .args(["-k", &check_path]) // -k for 1K blocks
        .output()
        .map_err(|e| AppError::Download(format!("Failed to run df command: {}", e)))?;

    if !output.status.success() {
        return Err(AppError::Download(format!(
            "df command failed for {}: {}",
            check_path,
            String::from_utf8_lossy(&output.stderr)
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_df_output(&stdout, &check_path)
}

/// Parses `df -k` output: Filesystem 1K-blocks Used Available Use% Mounted
fn parse_df_output(stdout: &str, path: &str) -> Result<DiskUsage, AppError> {
    let lines: Vec<&str> = stdout.lines().collect();

    // Skip header line, parse data line
    if lines.len() < 2 {
        return Err(AppError::Download("Unexpected df output format".to_string()));
    }

    let parts: Vec<&str> = lines[1].split_whitespace().collect();
    if parts.len() < 4 {
        return Err(AppError::Download("Unexpected df output format".to_string()));
    }

    let total_kb: u64 = parts[1]
        .parse()
        .map_err(|_| AppError::Download("Failed to parse total blocks".to_string()))?;
    let available_kb: u64 = parts[3]
        .parse()
        .map_err(|_| AppError::Download("Failed to parse available blocks".to_string()))?;

    let total_bytes = total_kb * 1024;
    let available_bytes = available_kb * 1024;
    let used_bytes = total_bytes.saturating_sub(available_bytes);
    let used_percent = if total_bytes > 0 {
        (used_bytes as f64 / total_bytes as f64) * 100.0
    } else {
        0.0
    };

    Ok(DiskUsage {
        total_bytes,
        used_bytes,
        available_bytes,
        used_percent,
        path: path.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disk_usage_probe() {
        let result = disk_usage("/tmp");
        assert!(result.is_ok(), "Failed to probe disk usage: {:?}", result.err());

        let usage = result.unwrap();
        assert!(usage.total_bytes > 0);
        assert!(usage.used_percent >= 0.0);
        assert!(usage.used_percent <= 100.0);
        assert_eq!(
            usage.used_bytes,
            usage.total_bytes.saturating_sub(usage.available_bytes)
        );
    }

    #[test]
    fn test_parse_df_output() {
        let out = "Filesystem     1K-blocks    Used Available Use% Mounted on\n\
                   /dev/sda1       10485760 8388608   2097152  80% /\n";
        let usage = parse_df_output(out, "/").unwrap();
        assert_eq!(usage.total_bytes, 10 * 1024 * 1024 * 1024);
        assert_eq!(usage.available_bytes, 2 * 1024 * 1024 * 1024);
        assert_eq!(usage.used_bytes, 8 * 1024 * 1024 * 1024);
        assert!((usage.used_percent - 80.0).abs() < 0.01);
    }

    #[test]
    fn test_parse_df_output_malformed() {
        assert!(parse_df_output("", "/").is_err());
        assert!(parse_df_output("only a header line\n", "/").is_err());
        assert!(parse_df_output("header\n/dev/sda1 garbage\n", "/").is_err());
    }
}
