#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, Response, StatusCode},
};
use http_body_util::BodyExt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;
use upload_ingest::config::{AppConfig, DeploymentMode};
use upload_ingest::services::notifier::{NotificationMessage, PublishError, UploadNotifier};
use upload_ingest::services::pipeline::IngestPipeline;
use upload_ingest::services::presence::{CacheError, MemoryPresenceCache, PresenceCache};
use upload_ingest::utils::auth::issue_token;
use upload_ingest::{AppState, create_app};

pub const SECRET: &str = "integration_secret";
pub const BOUNDARY: &str = "---------------------------123456789012345678901234567";

#[derive(Default)]
pub struct RecordingNotifier {
    pub messages: Mutex<Vec<NotificationMessage>>,
    pub fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        let notifier = Self::default();
        notifier.fail.store(true, Ordering::SeqCst);
        notifier
    }

    pub fn sent(&self) -> Vec<NotificationMessage> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl UploadNotifier for RecordingNotifier {
    async fn notify(&self, message: &NotificationMessage) -> Result<(), PublishError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PublishError::NotConnected);
        }
        self.messages.lock().unwrap().push(message.clone());
        Ok(())
    }

    async fn is_healthy(&self) -> bool {
        !self.fail.load(Ordering::SeqCst)
    }
}

/// Cache whose writes always fail.
pub struct BrokenCache;

#[async_trait]
impl PresenceCache for BrokenCache {
    async fn mark_present(&self, _key: &str, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError::Set("connection refused".to_string()))
    }

    async fn ping(&self) -> bool {
        false
    }
}

pub struct TestApp {
    pub app: Router,
    pub root: TempDir,
    pub spool: TempDir,
    pub config: Arc<AppConfig>,
    pub cache: MemoryPresenceCache,
    pub notifier: Arc<RecordingNotifier>,
}

impl TestApp {
    pub fn namespace(&self) -> std::path::PathBuf {
        self.config.namespace_root()
    }

    pub fn staged(&self, origin: &str, key: &str, file_name: &str) -> std::path::PathBuf {
        self.namespace().join(origin).join(key).join(file_name)
    }
}

pub fn test_config(root: &Path, spool: &Path) -> AppConfig {
    AppConfig {
        jwt_secret: SECRET.to_string(),
        app_env: "test".to_string(),
        upload_root: root.to_path_buf(),
        spool_dir: Some(spool.to_path_buf()),
        redis_url: "memory".to_string(),
        ..AppConfig::default()
    }
}

pub struct Setup {
    pub mode: DeploymentMode,
    pub presence: Option<Arc<dyn PresenceCache>>,
    pub notifier: Arc<RecordingNotifier>,
    pub tweak: fn(&mut AppConfig),
}

impl Default for Setup {
    fn default() -> Self {
        Self {
            mode: DeploymentMode::Default,
            presence: None,
            notifier: Arc::new(RecordingNotifier::default()),
            tweak: |_| {},
        }
    }
}

pub fn spawn_app(setup: Setup) -> TestApp {
    let root = tempfile::tempdir().unwrap();
    let spool = tempfile::tempdir().unwrap();

    let mut config = test_config(root.path(), spool.path());
    config.deployment_mode = setup.mode;
    (setup.tweak)(&mut config);
    let config = Arc::new(config);

    let cache = MemoryPresenceCache::new();
    let presence = setup
        .presence
        .unwrap_or_else(|| Arc::new(cache.clone()) as Arc<dyn PresenceCache>);

    let pipeline = IngestPipeline::new(config.clone(), presence, setup.notifier.clone());
    let app = create_app(AppState::new(config.clone(), pipeline));

    TestApp {
        app,
        root,
        spool,
        config,
        cache,
        notifier: setup.notifier,
    }
}

pub fn token() -> String {
    issue_token("tester", SECRET, chrono::Duration::hours(1)).unwrap()
}

pub enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a [u8]),
}

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File(name, content) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"blob\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(content);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn upload_parts<'a>(origin: &'a str, key: &'a str, file_name: &'a str, content: &'a [u8]) -> Vec<Part<'a>> {
    vec![
        Part::Text("key", key),
        Part::Text("origin", origin),
        Part::Text("fileName", file_name),
        Part::File("file", content),
    ]
}

pub fn upload_request(token: Option<&str>, body: Vec<u8>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    builder.body(Body::from(body)).unwrap()
}

pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, String) {
    let response: Response<Body> = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8_lossy(&body).into_owned())
}
