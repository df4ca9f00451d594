//! Integration tests for the download orchestrator: the state machine,
//! dedup, failure capture and statistics attribution.

mod mocks;

use mocks::mock_fetcher::MockFetcher;
use pretty_assertions::assert_eq;
use r2d2_sqlite::SqliteConnectionManager;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use vidra::download::stats;
use vidra::download::{DownloadOrchestrator, VideoCatalog};
use vidra::storage::db::{self, DbPool, DownloadStatus, FormatType, UserRecord, VideoRecord};

const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

struct TestEnv {
    pool: Arc<DbPool>,
    fetcher: Arc<MockFetcher>,
    orchestrator: DownloadOrchestrator,
    #[allow(dead_code)]
    dir: TempDir,
}

fn test_env(fetcher: MockFetcher) -> TestEnv {
    let dir = TempDir::new().unwrap();
    let manager = SqliteConnectionManager::file(dir.path().join("test.sqlite"));
    let pool = Arc::new(r2d2::Pool::builder().max_size(4).build(manager).unwrap());
    db::migrate_schema(&pool.get().unwrap()).unwrap();

    let fetcher = Arc::new(fetcher);
    let orchestrator = DownloadOrchestrator::with_settings(
        fetcher.clone(),
        pool.clone(),
        dir.path().join("downloads"),
        MAX_FILE_SIZE,
    );

    TestEnv {
        pool,
        fetcher,
        orchestrator,
        dir,
    }
}

async fn catalogued_video(env: &TestEnv, url: &str) -> VideoRecord {
    let catalog = VideoCatalog::with_max_duration(env.fetcher.clone(), env.pool.clone(), 3600);
    catalog.get_or_create(url).await.unwrap().expect("video created")
}

fn test_user(env: &TestEnv, telegram_id: i64) -> UserRecord {
    let conn = env.pool.get().unwrap();
    db::get_or_create_user(&conn, telegram_id, "Test User", Some("tester"), false).unwrap()
}

#[tokio::test]
async fn fresh_download_completes_and_updates_statistics() {
    let env = test_env(MockFetcher::new().with_media_bytes(4096));
    let video = catalogued_video(&env, "https://youtu.be/abc123XYZ_-").await;
    let user = test_user(&env, 100);

    let record = env
        .orchestrator
        .download(&video, &user, Some("720p"), FormatType::Mp4, 2_000_000)
        .await
        .unwrap();

    assert_eq!(record.status, DownloadStatus::Completed);
    assert_eq!(record.file_size, Some(4096));
    assert!(record.started_at.is_some());
    assert!(record.completed_at.is_some());
    assert_eq!(env.fetcher.media_call_count(), 1);

    // The file really exists inside a per-attempt directory
    let file_path = record.file_path.expect("local file pointer");
    assert!(Path::new(&file_path).exists());
    assert_eq!(std::fs::metadata(&file_path).unwrap().len(), 4096);

    let conn = env.pool.get().unwrap();

    // Per-video and per-user aggregates moved
    let video = db::get_video(&conn, video.id).unwrap().unwrap();
    assert_eq!(video.download_count, 1);
    assert_eq!(video.file_size, Some(4096));
    assert_eq!(video.quality.as_deref(), Some("720p"));

    let user = db::get_user(&conn, 100).unwrap().unwrap();
    assert_eq!(user.total_downloads, 1);
    assert_eq!(user.total_download_size, 4096);
    assert!(user.last_download_at.is_some());
}

#[tokio::test]
async fn second_request_reuses_completed_download() {
    let env = test_env(MockFetcher::new());
    let video = catalogued_video(&env, "https://youtu.be/abc123XYZ_-").await;
    let alice = test_user(&env, 1);
    let bob = test_user(&env, 2);

    let first = env
        .orchestrator
        .download(&video, &alice, Some("720p"), FormatType::Mp4, 0)
        .await
        .unwrap();
    assert_eq!(first.status, DownloadStatus::Completed);
    assert_eq!(env.fetcher.media_call_count(), 1);

    let second = env
        .orchestrator
        .download(&video, &bob, Some("720p"), FormatType::Mp4, 0)
        .await
        .unwrap();

    // The existing record comes back and no second fetch happened
    assert_eq!(second.id, first.id);
    assert_eq!(second.status, DownloadStatus::Completed);
    assert_eq!(env.fetcher.media_call_count(), 1);

    let conn = env.pool.get().unwrap();

    // Dedup is transparent to the counters: two attempts on record,
    // both terminal, global total up by 2
    let counts = stats::get_download_stats(&conn).unwrap();
    assert_eq!(counts.total, 2);
    assert_eq!(counts.completed, 2);
    assert_eq!(counts.failed, 0);
    assert_eq!(counts.success_rate, 100.0);

    let video = db::get_video(&conn, video.id).unwrap().unwrap();
    assert_eq!(video.download_count, 2);

    assert_eq!(db::get_user(&conn, 1).unwrap().unwrap().total_downloads, 1);
    assert_eq!(db::get_user(&conn, 2).unwrap().unwrap().total_downloads, 1);
}

#[tokio::test]
async fn different_tuple_is_not_deduplicated() {
    let env = test_env(MockFetcher::new());
    let video = catalogued_video(&env, "https://youtu.be/abc123XYZ_-").await;
    let user = test_user(&env, 1);

    env.orchestrator
        .download(&video, &user, Some("720p"), FormatType::Mp4, 0)
        .await
        .unwrap();
    env.orchestrator
        .download(&video, &user, Some("480p"), FormatType::Mp4, 0)
        .await
        .unwrap();
    env.orchestrator
        .download(&video, &user, None, FormatType::Mp3, 0)
        .await
        .unwrap();

    assert_eq!(env.fetcher.media_call_count(), 3);
}

#[tokio::test]
async fn concurrent_same_tuple_requests_fetch_once() {
    let env = test_env(MockFetcher::new());
    let video = catalogued_video(&env, "https://youtu.be/abc123XYZ_-").await;
    let alice = test_user(&env, 1);
    let bob = test_user(&env, 2);

    let (first, second) = tokio::join!(
        env.orchestrator.download(&video, &alice, Some("720p"), FormatType::Mp4, 0),
        env.orchestrator.download(&video, &bob, Some("720p"), FormatType::Mp4, 0),
    );

    assert_eq!(first.unwrap().status, DownloadStatus::Completed);
    assert_eq!(second.unwrap().status, DownloadStatus::Completed);

    // The keyed lock serializes the check-then-fetch: one real fetch
    assert_eq!(env.fetcher.media_call_count(), 1);
}

#[tokio::test]
async fn failed_fetch_terminates_in_failed_with_message() {
    let env = test_env(MockFetcher::failing_media());
    let video = catalogued_video(&env, "https://youtu.be/abc123XYZ_-").await;
    let user = test_user(&env, 1);

    let record = env
        .orchestrator
        .download(&video, &user, Some("720p"), FormatType::Mp4, 0)
        .await
        .unwrap();

    assert_eq!(record.status, DownloadStatus::Failed);
    assert!(record.error_message.as_deref().unwrap().contains("simulated download error"));
    assert!(record.file_path.is_none());
    assert!(record.telegram_file_id.is_none());

    // A failed attempt is never reused
    let conn = env.pool.get().unwrap();
    assert!(db::find_reusable_download(&conn, video.id, Some("720p"), FormatType::Mp4)
        .unwrap()
        .is_none());

    // And it never counts as a completed download
    let user = db::get_user(&conn, 1).unwrap().unwrap();
    assert_eq!(user.total_downloads, 0);
}

#[tokio::test]
async fn oversize_request_fails_fast_without_fetching() {
    let env = test_env(MockFetcher::new());
    let video = catalogued_video(&env, "https://youtu.be/abc123XYZ_-").await;
    let user = test_user(&env, 1);

    let record = env
        .orchestrator
        .download(&video, &user, Some("720p"), FormatType::Mp4, MAX_FILE_SIZE + 1)
        .await
        .unwrap();

    assert_eq!(record.status, DownloadStatus::Failed);
    assert!(record.error_message.is_some());
    assert_eq!(env.fetcher.media_call_count(), 0);
}

#[tokio::test]
async fn fetch_producing_no_file_fails() {
    let env = test_env(MockFetcher::producing_no_file());
    let video = catalogued_video(&env, "https://youtu.be/abc123XYZ_-").await;
    let user = test_user(&env, 1);

    let record = env
        .orchestrator
        .download(&video, &user, Some("720p"), FormatType::Mp4, 0)
        .await
        .unwrap();

    assert_eq!(record.status, DownloadStatus::Failed);
    assert_eq!(env.fetcher.media_call_count(), 1);
    assert!(record.file_path.is_none());
}

#[tokio::test]
async fn retry_after_failure_is_a_new_record() {
    let env = test_env(MockFetcher::failing_media());
    let video = catalogued_video(&env, "https://youtu.be/abc123XYZ_-").await;
    let user = test_user(&env, 1);

    let first = env
        .orchestrator
        .download(&video, &user, Some("720p"), FormatType::Mp4, 0)
        .await
        .unwrap();
    let second = env
        .orchestrator
        .download(&video, &user, Some("720p"), FormatType::Mp4, 0)
        .await
        .unwrap();

    // No automatic re-entry into pending: each retry is its own attempt
    assert_ne!(first.id, second.id);
    assert_eq!(first.status, DownloadStatus::Failed);
    assert_eq!(second.status, DownloadStatus::Failed);
}
