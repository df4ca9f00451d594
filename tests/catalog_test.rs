//! Integration tests for the video catalog: get-or-create semantics,
//! duration ceiling, defensive metadata handling.

mod mocks;

use mocks::mock_fetcher::MockFetcher;
use pretty_assertions::assert_eq;
use r2d2_sqlite::SqliteConnectionManager;
use std::sync::Arc;
use tempfile::TempDir;
use vidra::download::fetcher::RawFormat;
use vidra::download::{VideoCatalog, VideoMetadata};
use vidra::storage::db::{self, DbPool};

fn test_pool(dir: &TempDir) -> Arc<DbPool> {
    let manager = SqliteConnectionManager::file(dir.path().join("test.sqlite"));
    let pool = r2d2::Pool::builder().max_size(4).build(manager).unwrap();
    db::migrate_schema(&pool.get().unwrap()).unwrap();
    Arc::new(pool)
}

#[tokio::test]
async fn get_or_create_fetches_metadata_at_most_once() {
    let dir = TempDir::new().unwrap();
    let pool = test_pool(&dir);
    let fetcher = Arc::new(MockFetcher::new());
    let catalog = VideoCatalog::with_max_duration(fetcher.clone(), pool.clone(), 3600);

    let first = catalog
        .get_or_create("https://youtu.be/abc123XYZ_-")
        .await
        .unwrap()
        .expect("video should be created");
    assert_eq!(first.video_id, "abc123XYZ_-");
    assert_eq!(first.title, "Test Video");
    assert_eq!(fetcher.metadata_call_count(), 1);

    // Different URL shape, same canonical id: no re-fetch, same record
    let second = catalog
        .get_or_create("https://www.youtube.com/watch?v=abc123XYZ_-")
        .await
        .unwrap()
        .expect("existing video should be returned");
    assert_eq!(second.id, first.id);
    assert_eq!(fetcher.metadata_call_count(), 1);
}

#[tokio::test]
async fn unresolvable_url_is_rejected_without_fetching() {
    let dir = TempDir::new().unwrap();
    let pool = test_pool(&dir);
    let fetcher = Arc::new(MockFetcher::new());
    let catalog = VideoCatalog::with_max_duration(fetcher.clone(), pool, 3600);

    let result = catalog.get_or_create("https://example.com/notavideo").await.unwrap();
    assert!(result.is_none());
    assert_eq!(fetcher.metadata_call_count(), 0);
}

#[tokio::test]
async fn metadata_failure_creates_no_record() {
    let dir = TempDir::new().unwrap();
    let pool = test_pool(&dir);
    let fetcher = Arc::new(MockFetcher::failing_metadata());
    let catalog = VideoCatalog::with_max_duration(fetcher.clone(), pool.clone(), 3600);

    let result = catalog.get_or_create("https://youtu.be/failing0001").await.unwrap();
    assert!(result.is_none());

    let conn = pool.get().unwrap();
    assert!(db::get_video_by_video_id(&conn, "failing0001").unwrap().is_none());
}

#[tokio::test]
async fn over_duration_video_is_never_persisted() {
    let dir = TempDir::new().unwrap();
    let pool = test_pool(&dir);
    let fetcher = Arc::new(MockFetcher::with_metadata(MockFetcher::default_metadata(7200.0)));
    let catalog = VideoCatalog::with_max_duration(fetcher.clone(), pool.clone(), 3600);

    let result = catalog.get_or_create("https://youtu.be/toolong0001").await.unwrap();
    assert!(result.is_none());
    assert_eq!(fetcher.metadata_call_count(), 1);

    let conn = pool.get().unwrap();
    assert!(db::get_video_by_video_id(&conn, "toolong0001").unwrap().is_none());
}

#[tokio::test]
async fn stored_formats_exclude_audio_only_entries() {
    let dir = TempDir::new().unwrap();
    let pool = test_pool(&dir);
    let fetcher = Arc::new(MockFetcher::new());
    let catalog = VideoCatalog::with_max_duration(fetcher, pool, 3600);

    let video = catalog
        .get_or_create("https://youtu.be/formats0001")
        .await
        .unwrap()
        .unwrap();

    // The canned metadata has one audio-only and one 720p video format
    assert_eq!(video.available_formats.len(), 1);
    assert_eq!(video.available_formats[0].height, Some(720));
    assert_eq!(video.available_formats[0].filesize, Some(2_000_000));
}

#[tokio::test]
async fn unparsable_upload_date_becomes_null() {
    let dir = TempDir::new().unwrap();
    let pool = test_pool(&dir);

    let metadata = VideoMetadata {
        title: Some("Bad date".to_string()),
        duration: Some(10.0),
        upload_date: Some("March 1st".to_string()),
        formats: vec![RawFormat {
            vcodec: Some("avc1".to_string()),
            height: Some(360),
            ..Default::default()
        }],
        ..Default::default()
    };
    let fetcher = Arc::new(MockFetcher::with_metadata(metadata));
    let catalog = VideoCatalog::with_max_duration(fetcher, pool, 3600);

    let video = catalog
        .get_or_create("https://youtu.be/baddate0001")
        .await
        .unwrap()
        .expect("record is still created");
    assert_eq!(video.upload_date, None);
}

#[tokio::test]
async fn parsable_upload_date_is_normalized() {
    let dir = TempDir::new().unwrap();
    let pool = test_pool(&dir);
    let fetcher = Arc::new(MockFetcher::new());
    let catalog = VideoCatalog::with_max_duration(fetcher, pool, 3600);

    let video = catalog
        .get_or_create("https://youtu.be/gooddate001")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(video.upload_date.as_deref(), Some("2024-03-01"));
}
