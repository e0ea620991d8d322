//! Configuration loading for the conveyor delivery service.
//!
//! A configuration file (TOML, YAML or JSON, inferred from the extension) is
//! parsed into optional sections, merged over built-in defaults, then
//! overridden by `CONVEYOR_*` environment variables and validated.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use url::Url;

/// Raw, fully optional view of a configuration file.
#[derive(Debug, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub server: Option<ServerSection>,
    #[serde(default)]
    pub logging: Option<LoggingSection>,
    #[serde(default)]
    pub target: Option<TargetSection>,
    #[serde(default)]
    pub persistence: Option<PersistenceSection>,
}

#[derive(Debug, Deserialize)]
pub struct ServerSection {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub json: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct TargetSection {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub endpoints: Option<EndpointsSection>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub auth: Option<AuthSettings>,
    #[serde(default)]
    pub min_workers: Option<usize>,
    #[serde(default)]
    pub max_workers: Option<usize>,
    #[serde(default)]
    pub repetitions: Option<u32>,
    #[serde(default)]
    pub queue_capacity: Option<usize>,
    #[serde(default)]
    pub backoff: Option<BackoffKind>,
}

#[derive(Debug, Deserialize)]
pub struct EndpointsSection {
    #[serde(default)]
    pub check: Option<String>,
    #[serde(default)]
    pub write: Option<String>,
    #[serde(default)]
    pub revision: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PersistenceSection {
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Load a `RawConfigFile` from a path. The format is inferred from the
/// extension: .toml, .yaml/.yml, .json
pub fn load_raw_from_file<P: AsRef<Path>>(path: P) -> Result<RawConfigFile, ConfigError> {
    let path = path.as_ref();
    let s = fs::read_to_string(path)?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_ascii_lowercase());
    parse_config_str(&s, ext.as_deref())
}

#[inline]
fn parse_config_str(s: &str, ext: Option<&str>) -> Result<RawConfigFile, ConfigError> {
    match ext {
        #[cfg(feature = "toml")]
        Some("toml") => toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string())),
        #[cfg(feature = "yaml")]
        Some("yaml" | "yml") => {
            serde_yaml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))
        }
        #[cfg(feature = "json")]
        Some("json") => serde_json::from_str(s).map_err(|e| ConfigError::Parse(e.to_string())),
        _ => parse_config_auto(s),
    }
}

/// Try each enabled format in turn for files without a recognized extension.
#[inline]
fn parse_config_auto(s: &str) -> Result<RawConfigFile, ConfigError> {
    #[cfg(feature = "yaml")]
    if let Ok(cfg) = serde_yaml::from_str(s) {
        return Ok(cfg);
    }

    #[cfg(feature = "toml")]
    if let Ok(cfg) = toml::from_str(s) {
        return Ok(cfg);
    }

    #[cfg(feature = "json")]
    if let Ok(cfg) = serde_json::from_str(s) {
        return Ok(cfg);
    }

    Err(ConfigError::Parse(
        "failed to parse config as any supported format".into(),
    ))
}

/// Concrete application configuration with defaults applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub target: TargetConfig,
    pub persistence: PersistenceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

/// Per-target delivery configuration. Immutable after startup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetConfig {
    pub name: String,
    pub base_url: String,
    pub endpoints: EndpointsConfig,
    pub content_type: Option<String>,
    pub auth: AuthSettings,
    pub min_workers: usize,
    pub max_workers: usize,
    pub repetitions: u32,
    pub queue_capacity: usize,
    pub backoff: BackoffKind,
}

/// URL templates relative to `base_url`, interpolated with job fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointsConfig {
    pub check: String,
    pub write: String,
    pub revision: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersistenceConfig {
    pub path: String,
}

/// Outbound authentication settings for the target system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSettings {
    #[serde(rename = "type", default)]
    pub kind: AuthKind,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub token_url: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            kind: AuthKind::None,
            username: None,
            password: None,
            token: None,
            client_id: None,
            client_secret: None,
            token_url: None,
            refresh_token: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuthKind {
    #[default]
    None,
    Basic,
    Bearer,
    OAuth2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    Exponential,
    #[default]
    Sinusoidal,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 4224,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                json: false,
            },
            target: TargetConfig {
                name: "default".to_string(),
                base_url: String::new(),
                endpoints: EndpointsConfig {
                    check: String::new(),
                    write: String::new(),
                    revision: None,
                },
                content_type: None,
                auth: AuthSettings::default(),
                min_workers: 5,
                max_workers: 10,
                repetitions: 1,
                queue_capacity: 100,
                backoff: BackoffKind::Sinusoidal,
            },
            persistence: PersistenceConfig {
                path: "pending_jobs.json".to_string(),
            },
        }
    }
}

/// Apply an optional value if present.
macro_rules! apply_opt {
    ($target:expr, $source:expr) => {
        if let Some(v) = $source {
            $target = v;
        }
    };
    ($target:expr, $source:expr, wrap) => {
        if let Some(v) = $source {
            $target = Some(v);
        }
    };
}

/// Load concrete `Config` from an optional file and environment variables.
/// Environment variables take precedence over file values and defaults.
/// The result is validated; a missing base URL or incomplete auth block is a
/// startup failure, not something the retry engine papers over.
pub fn load_config<P: AsRef<Path>>(path: Option<P>) -> Result<Config, ConfigError> {
    let mut cfg = Config::default();

    if let Some(p) = path {
        let raw = load_raw_from_file(p)?;
        if let Some(server) = raw.server {
            apply_opt!(cfg.server.host, server.host);
            apply_opt!(cfg.server.port, server.port);
        }
        if let Some(logging) = raw.logging {
            apply_opt!(cfg.logging.level, logging.level);
            apply_opt!(cfg.logging.json, logging.json);
        }
        if let Some(target) = raw.target {
            apply_opt!(cfg.target.name, target.name);
            apply_opt!(cfg.target.base_url, target.base_url);
            if let Some(ep) = target.endpoints {
                apply_opt!(cfg.target.endpoints.check, ep.check);
                apply_opt!(cfg.target.endpoints.write, ep.write);
                apply_opt!(cfg.target.endpoints.revision, ep.revision, wrap);
            }
            apply_opt!(cfg.target.content_type, target.content_type, wrap);
            apply_opt!(cfg.target.auth, target.auth);
            apply_opt!(cfg.target.min_workers, target.min_workers);
            apply_opt!(cfg.target.max_workers, target.max_workers);
            apply_opt!(cfg.target.repetitions, target.repetitions);
            apply_opt!(cfg.target.queue_capacity, target.queue_capacity);
            apply_opt!(cfg.target.backoff, target.backoff);
        }
        if let Some(persistence) = raw.persistence {
            apply_opt!(cfg.persistence.path, persistence.path);
        }
    }

    apply_env_overrides(&mut cfg)?;
    validate(&cfg)?;

    Ok(cfg)
}

/// Parse an env var as a specific type.
#[inline]
fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(v) => v
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::Parse(format!("invalid {}: {}", key, e))),
        Err(_) => Ok(None),
    }
}

#[inline]
fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn apply_env_overrides(cfg: &mut Config) -> Result<(), ConfigError> {
    if let Some(v) = env_str("CONVEYOR_SERVER_HOST") {
        cfg.server.host = v;
    }
    if let Some(v) = env_parse::<u16>("CONVEYOR_SERVER_PORT")? {
        cfg.server.port = v;
    }

    if let Some(v) = env_str("CONVEYOR_LOG_LEVEL") {
        cfg.logging.level = v;
    }
    if let Some(v) = env_parse::<bool>("CONVEYOR_LOG_JSON")? {
        cfg.logging.json = v;
    }

    if let Some(v) = env_str("CONVEYOR_BASE_URL") {
        cfg.target.base_url = v;
    }
    if let Some(v) = env_parse::<usize>("CONVEYOR_MIN_WORKERS")? {
        cfg.target.min_workers = v;
    }
    if let Some(v) = env_parse::<usize>("CONVEYOR_MAX_WORKERS")? {
        cfg.target.max_workers = v;
    }
    if let Some(v) = env_parse::<usize>("CONVEYOR_QUEUE_CAPACITY")? {
        cfg.target.queue_capacity = v;
    }

    if let Some(v) = env_str("CONVEYOR_PERSISTENCE_PATH") {
        cfg.persistence.path = v;
    }

    Ok(())
}

/// Reject configurations the delivery engine cannot run with.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.target.base_url.is_empty() {
        return Err(ConfigError::Validation(
            "target.base_url is required".into(),
        ));
    }
    Url::parse(&cfg.target.base_url)
        .map_err(|e| ConfigError::Validation(format!("target.base_url is not a valid URL: {e}")))?;

    if cfg.target.endpoints.check.is_empty() {
        return Err(ConfigError::Validation(
            "target.endpoints.check is required".into(),
        ));
    }
    if cfg.target.endpoints.write.is_empty() {
        return Err(ConfigError::Validation(
            "target.endpoints.write is required".into(),
        ));
    }

    if cfg.target.min_workers == 0 || cfg.target.min_workers > cfg.target.max_workers {
        return Err(ConfigError::Validation(format!(
            "worker bounds must satisfy 1 <= min_workers <= max_workers (got {}..{})",
            cfg.target.min_workers, cfg.target.max_workers
        )));
    }
    if cfg.target.queue_capacity == 0 {
        return Err(ConfigError::Validation(
            "target.queue_capacity must be at least 1".into(),
        ));
    }

    if let Some(ct) = cfg.target.content_type.as_deref() {
        if ct != "json" && ct != "xml" {
            return Err(ConfigError::Validation(format!(
                "target.content_type must be \"json\" or \"xml\" (got {ct:?})"
            )));
        }
    }

    validate_auth(&cfg.target.auth)
}

fn validate_auth(auth: &AuthSettings) -> Result<(), ConfigError> {
    let missing = |field: &str| {
        ConfigError::Validation(format!("target.auth.{field} is required for this auth type"))
    };
    match auth.kind {
        AuthKind::None => Ok(()),
        AuthKind::Basic => {
            auth.username.as_ref().ok_or_else(|| missing("username"))?;
            auth.password.as_ref().ok_or_else(|| missing("password"))?;
            Ok(())
        }
        AuthKind::Bearer => {
            auth.token.as_ref().ok_or_else(|| missing("token"))?;
            Ok(())
        }
        AuthKind::OAuth2 => {
            auth.client_id.as_ref().ok_or_else(|| missing("client_id"))?;
            auth.client_secret
                .as_ref()
                .ok_or_else(|| missing("client_secret"))?;
            auth.token_url.as_ref().ok_or_else(|| missing("token_url"))?;
            auth.refresh_token
                .as_ref()
                .ok_or_else(|| missing("refresh_token"))?;
            Ok(())
        }
    }
}
