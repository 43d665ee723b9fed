use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// `APP_ENV` value under which the built-in defaults are acceptable.
pub const DEVELOPMENT_ENV: &str = "development";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("JWT_SECRET_KEY must be set when APP_ENV is '{0}'")]
    MissingSecret(String),
}

/// Where presence bookkeeping lives for this deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentMode {
    /// Presence markers are written to the shared cache.
    Default,
    /// The hosting platform tracks presence itself; markers are skipped.
    ExternalPlatform,
}

impl DeploymentMode {
    pub fn from_flag(flag: &str) -> Self {
        if flag.trim().eq_ignore_ascii_case("gae") {
            DeploymentMode::ExternalPlatform
        } else {
            DeploymentMode::Default
        }
    }

    pub fn writes_presence_markers(self) -> bool {
        self == DeploymentMode::Default
    }
}

/// Runtime configuration for the upload service
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Shared HMAC secret used to verify bearer tokens
    pub jwt_secret: String,

    /// Environment namespace, first directory under `upload_root` (default: "development")
    pub app_env: String,

    /// Root of the staging area (default: "./uploads")
    pub upload_root: PathBuf,

    /// Deployment mode flag (`LINK_SERVICE_MODE=gae` selects external platform)
    pub deployment_mode: DeploymentMode,

    /// Maximum accepted size of the file part in bytes (default: 1 MiB)
    pub max_upload_size: usize,

    /// Buffer size used when copying into the staging area (default: 64 KiB)
    pub copy_buffer_size: usize,

    /// Directory for spooled multipart file parts (default: OS temp dir)
    pub spool_dir: Option<PathBuf>,

    /// Cache URL; `memory` selects the in-process cache
    pub redis_url: String,

    /// Lifetime of a presence marker (default: 5 minutes)
    pub presence_ttl: Duration,

    pub rabbitmq_user: String,
    pub rabbitmq_pass: String,
    pub rabbitmq_host: String,
    pub rabbitmq_port: u16,

    /// Queue receiving upload notifications (default: "upload_s3")
    pub upload_queue: String,

    /// Deadline for each cache/broker call (default: 5s)
    pub backend_timeout: Duration,

    pub reconnect_initial_backoff: Duration,
    pub reconnect_max_backoff: Duration,

    /// Return underlying error text in 500 bodies (default: true)
    pub expose_internal_errors: bool,

    /// HTTP listen port (default: 7008)
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "secret".to_string(),
            app_env: DEVELOPMENT_ENV.to_string(),
            upload_root: PathBuf::from("./uploads"),
            deployment_mode: DeploymentMode::Default,
            max_upload_size: 1 << 20, // 1 MiB
            copy_buffer_size: 64 * 1024,
            spool_dir: None,
            redis_url: "redis://vigbo-gallery-redis:6379/2".to_string(),
            presence_ttl: Duration::from_secs(5 * 60),
            rabbitmq_user: String::new(),
            rabbitmq_pass: String::new(),
            rabbitmq_host: "vigbo-gallery-rabbit".to_string(),
            rabbitmq_port: 5672,
            upload_queue: "upload_s3".to_string(),
            backend_timeout: Duration::from_secs(5),
            reconnect_initial_backoff: Duration::from_millis(500),
            reconnect_max_backoff: Duration::from_secs(30),
            expose_internal_errors: true,
            port: 7008,
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn parse_millis(name: &str) -> Option<Duration> {
    parse_var::<u64>(name).map(Duration::from_millis)
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            jwt_secret: env::var("JWT_SECRET_KEY").unwrap_or(default.jwt_secret),
            app_env: env::var("APP_ENV").unwrap_or(default.app_env),
            upload_root: env::var("UPLOAD_ROOT")
                .map(PathBuf::from)
                .unwrap_or(default.upload_root),
            deployment_mode: env::var("LINK_SERVICE_MODE")
                .map(|v| DeploymentMode::from_flag(&v))
                .unwrap_or(default.deployment_mode),
            max_upload_size: parse_var("MAX_UPLOAD_SIZE").unwrap_or(default.max_upload_size),
            copy_buffer_size: parse_var("COPY_BUFFER_SIZE").unwrap_or(default.copy_buffer_size),
            spool_dir: env::var("SPOOL_DIR").ok().map(PathBuf::from),
            redis_url: env::var("REDIS_URL").unwrap_or(default.redis_url),
            presence_ttl: parse_var::<u64>("PRESENCE_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(default.presence_ttl),
            rabbitmq_user: env::var("RABBITMQ_USER").unwrap_or(default.rabbitmq_user),
            rabbitmq_pass: env::var("RABBITMQ_PASS").unwrap_or(default.rabbitmq_pass),
            rabbitmq_host: env::var("RABBITMQ_HOST").unwrap_or(default.rabbitmq_host),
            rabbitmq_port: parse_var("RABBITMQ_PORT").unwrap_or(default.rabbitmq_port),
            upload_queue: env::var("UPLOAD_QUEUE").unwrap_or(default.upload_queue),
            backend_timeout: parse_millis("BACKEND_TIMEOUT_MS").unwrap_or(default.backend_timeout),
            reconnect_initial_backoff: parse_millis("RECONNECT_INITIAL_BACKOFF_MS")
                .unwrap_or(default.reconnect_initial_backoff),
            reconnect_max_backoff: parse_millis("RECONNECT_MAX_BACKOFF_MS")
                .unwrap_or(default.reconnect_max_backoff),
            expose_internal_errors: env::var("EXPOSE_INTERNAL_ERRORS")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(default.expose_internal_errors),
            port: parse_var("PORT").unwrap_or(default.port),
        }
    }

    /// Like `from_env`, but refuses to fall back to the built-in signing secret.
    pub fn production() -> Result<Self, ConfigError> {
        let config = Self::from_env();
        match env::var("JWT_SECRET_KEY") {
            Ok(secret) if !secret.trim().is_empty() => Ok(config),
            _ => Err(ConfigError::MissingSecret(config.app_env)),
        }
    }

    /// `from_env` for development namespaces, `production` everywhere else.
    pub fn load() -> Result<Self, ConfigError> {
        let app_env = env::var("APP_ENV").unwrap_or_else(|_| DEVELOPMENT_ENV.to_string());
        if app_env == DEVELOPMENT_ENV {
            Ok(Self::from_env())
        } else {
            Self::production()
        }
    }

    /// Config for local runs: in-process cache, relaxed upload limit
    pub fn development() -> Self {
        Self {
            redis_url: "memory".to_string(),
            rabbitmq_host: "localhost".to_string(),
            rabbitmq_user: "guest".to_string(),
            rabbitmq_pass: "guest".to_string(),
            max_upload_size: 16 * 1024 * 1024,
            ..Self::default()
        }
    }

    /// `<upload_root>/<app_env>`, the root every staging path hangs off
    pub fn namespace_root(&self) -> PathBuf {
        self.upload_root.join(&self.app_env)
    }

    pub fn amqp_url(&self) -> String {
        format!(
            "amqp://{}:{}@{}:{}/",
            self.rabbitmq_user, self.rabbitmq_pass, self.rabbitmq_host, self.rabbitmq_port
        )
    }
}
