//! Vidra - Telegram bot for downloading videos from YouTube, TikTok, RuTube and VK
//!
//! This library provides all the core functionality for the Vidra bot:
//! URL resolution, the video catalog, download orchestration, statistics
//! and disk retention, plus the Telegram integration layer.
//!
//! # Module Structure
//!
//! - `core`: Configuration, errors, URL resolution, disk probing
//! - `storage`: Database pool, schema and queries
//! - `download`: Catalog, orchestrator, statistics and cleanup
//! - `telegram`: Bot integration and handlers

pub mod core;
pub mod download;
pub mod storage;
pub mod telegram;

// Re-export commonly used types for convenience
pub use core::{config, AppError, AppResult};
pub use download::{DownloadOrchestrator, VideoCatalog};
pub use storage::{create_pool, get_connection, DbConnection, DbPool};
