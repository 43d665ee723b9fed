mod common;

use common::*;
use std::io::{Seek, SeekFrom, Write};
use std::sync::Arc;
use upload_ingest::api::error::AppError;
use upload_ingest::config::DeploymentMode;
use upload_ingest::services::intake::ValidatedUpload;
use upload_ingest::services::pipeline::{IngestPipeline, IngestState, StateTracker};
use upload_ingest::services::presence::MemoryPresenceCache;

fn validated(content: &[u8]) -> ValidatedUpload {
    let mut spooled = tempfile::tempfile().unwrap();
    spooled.write_all(content).unwrap();
    spooled.seek(SeekFrom::Start(0)).unwrap();
    let file = tokio::fs::File::from_std(spooled);

    ValidatedUpload {
        origin: "albums".to_string(),
        key: "abc123".to_string(),
        file_name: "photo.jpg".to_string(),
        file,
        size: content.len() as u64,
    }
}

fn validated_tracker() -> StateTracker {
    let mut tracker = StateTracker::default();
    tracker.advance(IngestState::Authenticated);
    tracker.advance(IngestState::Validated);
    tracker
}

#[tokio::test]
async fn test_happy_path_visits_every_state() {
    let root = tempfile::tempdir().unwrap();
    let spool = tempfile::tempdir().unwrap();
    let config = Arc::new(test_config(root.path(), spool.path()));
    let cache = MemoryPresenceCache::new();
    let notifier = Arc::new(RecordingNotifier::default());
    let pipeline = IngestPipeline::new(config, Arc::new(cache.clone()), notifier.clone());

    let mut tracker = validated_tracker();
    let outcome = pipeline
        .ingest(validated(b"hello"), &mut tracker)
        .await
        .unwrap();

    assert_eq!(outcome.composite_key, "abc123/photo.jpg");
    assert_eq!(outcome.bytes_written, 5);
    assert!(outcome.presence_marked && outcome.notified);
    assert_eq!(
        tracker.history(),
        &[
            IngestState::Received,
            IngestState::Authenticated,
            IngestState::Validated,
            IngestState::Staged,
            IngestState::CachePending,
            IngestState::Notified,
            IngestState::Responded,
        ]
    );
}

#[tokio::test]
async fn test_external_platform_skips_cache_state() {
    let root = tempfile::tempdir().unwrap();
    let spool = tempfile::tempdir().unwrap();
    let mut config = test_config(root.path(), spool.path());
    config.deployment_mode = DeploymentMode::ExternalPlatform;
    let notifier = Arc::new(RecordingNotifier::default());
    let pipeline = IngestPipeline::new(
        Arc::new(config),
        Arc::new(MemoryPresenceCache::new()),
        notifier.clone(),
    );

    let mut tracker = validated_tracker();
    let outcome = pipeline
        .ingest(validated(b"hello"), &mut tracker)
        .await
        .unwrap();

    assert!(!outcome.presence_marked);
    assert!(!tracker.history().contains(&IngestState::CachePending));
    assert_eq!(tracker.state(), IngestState::Responded);
}

#[tokio::test]
async fn test_cache_failure_is_terminal() {
    let root = tempfile::tempdir().unwrap();
    let spool = tempfile::tempdir().unwrap();
    let config = Arc::new(test_config(root.path(), spool.path()));
    let notifier = Arc::new(RecordingNotifier::default());
    let pipeline = IngestPipeline::new(config, Arc::new(BrokenCache), notifier.clone());

    let mut tracker = validated_tracker();
    let err = pipeline
        .ingest(validated(b"hello"), &mut tracker)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Cache(_)));
    assert_eq!(tracker.state(), IngestState::Failed);
    assert!(notifier.sent().is_empty());
}
