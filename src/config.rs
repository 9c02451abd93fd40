//! Configuration for roomscribe.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (ROOMSCRIBE_HOME, LIVEKIT_*, AWS_*, ...)
//! 2. Config file (.roomscribe/config.yaml)
//! 3. Defaults (~/.roomscribe)
//!
//! Config file discovery:
//! - Searches the start directory and its parents for .roomscribe/config.yaml
//! - Relative paths in the config file resolve against the .roomscribe/ directory
//!
//! The configuration is loaded once at start-up and handed to the components
//! that need it.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::queue::{Retention, RetryPolicy};

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub home: Option<String>,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseFileConfig,
    #[serde(default)]
    pub livekit: LiveKitConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
    #[serde(default)]
    pub queue: QueueConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP server binds to
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "0.0.0.0:3000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatabaseFileConfig {
    /// SQLite file (relative to .roomscribe/)
    pub path: Option<String>,
}

/// Media platform server API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveKitConfig {
    #[serde(default = "default_livekit_url")]
    pub url: String,

    #[serde(default)]
    pub api_key: String,

    #[serde(default)]
    pub api_secret: String,

    /// Lifetime of participant access tokens
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,

    /// Rooms close after this long without participants
    #[serde(default = "default_empty_timeout")]
    pub empty_timeout_secs: u32,

    #[serde(default = "default_max_participants")]
    pub max_participants: u32,
}

fn default_livekit_url() -> String {
    "http://localhost:7880".to_string()
}
fn default_token_ttl() -> u64 {
    10 * 60 * 60
}
fn default_empty_timeout() -> u32 {
    300
}
fn default_max_participants() -> u32 {
    100
}

impl Default for LiveKitConfig {
    fn default() -> Self {
        Self {
            url: default_livekit_url(),
            api_key: String::new(),
            api_secret: String::new(),
            token_ttl_secs: default_token_ttl(),
            empty_timeout_secs: default_empty_timeout(),
            max_participants: default_max_participants(),
        }
    }
}

/// S3-compatible object storage holding the recordings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub bucket: String,

    #[serde(default = "default_region")]
    pub region: String,

    #[serde(default)]
    pub access_key_id: String,

    #[serde(default)]
    pub secret_access_key: String,

    /// Custom endpoint host (path-style addressing); virtual-hosted AWS otherwise
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_signed_url_expiry")]
    pub signed_url_expiry_secs: u64,
}

fn default_region() -> String {
    "us-east-1".to_string()
}
fn default_signed_url_expiry() -> u64 {
    3600
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            region: default_region(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
            endpoint: None,
            signed_url_expiry_secs: default_signed_url_expiry(),
        }
    }
}

/// Speech recognition service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_speech_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_language")]
    pub language_code: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Expected number of speakers for diarization
    #[serde(default = "default_speaker_count")]
    pub speaker_count: u32,

    /// Interval between long-running operation polls
    #[serde(default = "default_speech_poll")]
    pub poll_interval_ms: u64,

    /// Give up on an operation after this long
    #[serde(default = "default_speech_timeout")]
    pub timeout_secs: u64,
}

fn default_speech_endpoint() -> String {
    "https://speech.googleapis.com".to_string()
}
fn default_language() -> String {
    "en-US".to_string()
}
fn default_model() -> String {
    "latest_long".to_string()
}
fn default_speaker_count() -> u32 {
    2
}
fn default_speech_poll() -> u64 {
    5000
}
fn default_speech_timeout() -> u64 {
    3600
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: default_speech_endpoint(),
            language_code: default_language(),
            model: default_model(),
            speaker_count: default_speaker_count(),
            poll_interval_ms: default_speech_poll(),
            timeout_secs: default_speech_timeout(),
        }
    }
}

/// Job queue behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Default delay before a transcription job runs
    #[serde(default = "default_transcription_delay")]
    pub transcription_delay_ms: u64,

    #[serde(default)]
    pub retention: Retention,

    /// Idle workers re-check for due jobs at this interval
    #[serde(default = "default_queue_poll")]
    pub poll_interval_ms: u64,
}

fn default_transcription_delay() -> u64 {
    1000
}
fn default_queue_poll() -> u64 {
    1000
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            transcription_delay_ms: default_transcription_delay(),
            retention: Retention::default(),
            poll_interval_ms: default_queue_poll(),
        }
    }
}

/// Resolved configuration with absolute paths and env overrides applied
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// State directory
    pub home: PathBuf,
    /// SQLite database file
    pub database_path: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub server: ServerConfig,
    pub livekit: LiveKitConfig,
    pub storage: StorageConfig,
    pub speech: SpeechConfig,
    pub queue: QueueConfig,
}

/// Find config file by searching `start` and its parents
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(".roomscribe").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config directory
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Overwrite `target` when the variable is set and non-empty
fn override_from(env: &impl Fn(&str) -> Option<String>, key: &str, target: &mut String) {
    if let Some(value) = env(key).filter(|v| !v.is_empty()) {
        *target = value;
    }
}

/// Load configuration, searching from `start_dir` and reading variables via `env`
pub fn load_config_with(
    start_dir: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".roomscribe");

    let config_file = find_config_file(start_dir);
    let file = match config_file {
        Some(ref path) => load_config_file(path)?,
        None => ConfigFile::default(),
    };
    let config_dir = config_file
        .as_deref()
        .and_then(Path::parent)
        .map(Path::to_path_buf);

    let home = if let Some(env_home) = env("ROOMSCRIBE_HOME") {
        PathBuf::from(env_home)
    } else if let (Some(dir), Some(home)) = (&config_dir, &file.home) {
        resolve_path(dir, home)
    } else if let Some(dir) = &config_dir {
        dir.clone()
    } else {
        default_home
    };

    let database_path = if let Some(env_db) = env("ROOMSCRIBE_DATABASE") {
        PathBuf::from(env_db)
    } else if let (Some(dir), Some(path)) = (&config_dir, &file.database.path) {
        resolve_path(dir, path)
    } else {
        home.join("roomscribe.db")
    };

    let mut server = file.server;
    override_from(&env, "ROOMSCRIBE_BIND", &mut server.bind);

    let mut livekit = file.livekit;
    override_from(&env, "LIVEKIT_URL", &mut livekit.url);
    override_from(&env, "LIVEKIT_API_KEY", &mut livekit.api_key);
    override_from(&env, "LIVEKIT_API_SECRET", &mut livekit.api_secret);

    let mut storage = file.storage;
    override_from(&env, "AWS_S3_BUCKET", &mut storage.bucket);
    override_from(&env, "AWS_REGION", &mut storage.region);
    override_from(&env, "AWS_ACCESS_KEY_ID", &mut storage.access_key_id);
    override_from(&env, "AWS_SECRET_ACCESS_KEY", &mut storage.secret_access_key);
    if let Some(endpoint) = env("AWS_S3_ENDPOINT").filter(|v| !v.is_empty()) {
        storage.endpoint = Some(endpoint);
    }

    let mut speech = file.speech;
    override_from(&env, "GOOGLE_SPEECH_API_KEY", &mut speech.api_key);

    Ok(ResolvedConfig {
        home,
        database_path,
        config_file,
        server,
        livekit,
        storage,
        speech,
        queue: file.queue,
    })
}

/// Load configuration from the current directory and process environment
pub fn load_config() -> Result<ResolvedConfig> {
    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    load_config_with(&cwd, |key| std::env::var(key).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::TempDir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_default_config_without_file() {
        let temp = TempDir::new().unwrap();
        let config = load_config_with(temp.path(), no_env).unwrap();

        let expected_home = dirs::home_dir().unwrap().join(".roomscribe");
        assert_eq!(config.home, expected_home);
        assert_eq!(config.database_path, expected_home.join("roomscribe.db"));
        assert!(config.config_file.is_none());
        assert_eq!(config.server.bind, "0.0.0.0:3000");
        assert_eq!(config.queue.retry.max_attempts, 3);
        assert_eq!(config.queue.retry.initial_delay_ms, 2000);
        assert_eq!(config.queue.transcription_delay_ms, 1000);
        assert_eq!(config.queue.retention.keep_completed, 100);
        assert_eq!(config.queue.retention.keep_failed, 500);
        assert_eq!(config.storage.signed_url_expiry_secs, 3600);
        assert_eq!(config.speech.language_code, "en-US");
    }

    #[test]
    fn test_config_file_discovered_from_subdirectory() {
        let temp = TempDir::new().unwrap();
        let config_dir = temp.path().join(".roomscribe");
        std::fs::create_dir_all(&config_dir).unwrap();
        let nested = temp.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        let mut file = std::fs::File::create(config_dir.join("config.yaml")).unwrap();
        writeln!(
            file,
            r#"
version: "1.0"
database:
  path: data/state.db
server:
  bind: 127.0.0.1:8080
livekit:
  url: https://lk.example.com
  api_key: APIkey
queue:
  retry:
    max_attempts: 5
  transcription_delay_ms: 250
"#
        )
        .unwrap();

        let config = load_config_with(&nested, no_env).unwrap();
        assert!(config.config_file.is_some());
        assert_eq!(config.server.bind, "127.0.0.1:8080");
        assert_eq!(config.livekit.url, "https://lk.example.com");
        assert_eq!(config.livekit.token_ttl_secs, 36_000);
        assert_eq!(config.queue.retry.max_attempts, 5);
        assert_eq!(config.queue.retry.initial_delay_ms, 2000);
        assert_eq!(config.queue.transcription_delay_ms, 250);
        assert!(config.database_path.ends_with("data/state.db"));
    }

    #[test]
    fn test_env_overrides_file() {
        let temp = TempDir::new().unwrap();
        let env: HashMap<&str, &str> = [
            ("ROOMSCRIBE_HOME", "/srv/roomscribe"),
            ("LIVEKIT_API_SECRET", "s3cret"),
            ("AWS_S3_BUCKET", "recordings"),
            ("AWS_S3_ENDPOINT", "minio.local:9000"),
        ]
        .into_iter()
        .collect();

        let config =
            load_config_with(temp.path(), |key| env.get(key).map(|v| v.to_string())).unwrap();
        assert_eq!(config.home, PathBuf::from("/srv/roomscribe"));
        assert_eq!(config.database_path, PathBuf::from("/srv/roomscribe/roomscribe.db"));
        assert_eq!(config.livekit.api_secret, "s3cret");
        assert_eq!(config.storage.bucket, "recordings");
        assert_eq!(config.storage.endpoint.as_deref(), Some("minio.local:9000"));
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project");

        assert_eq!(
            resolve_path(&base, "./subdir"),
            PathBuf::from("/home/user/project/subdir")
        );
        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }
}
