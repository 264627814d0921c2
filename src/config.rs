use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_DATABASE_URL: &str = "sqlite://fulfillment.db?mode=rwc";
const CONFIG_DIR: &str = "config";

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL (postgres or sqlite)
    #[validate(length(min = 1))]
    pub database_url: String,

    /// Server host address
    #[validate(length(min = 1))]
    pub host: String,

    #[serde(default = "default_port")]
    #[validate(range(min = 1))]
    pub port: u16,

    /// Application environment
    #[validate(length(min = 1))]
    pub environment: String,

    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,

    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,

    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Capacity of the in-process event channel
    #[serde(default = "default_event_channel_capacity")]
    #[validate(custom = "validate_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Where activity entries go: "database" or "log"
    #[serde(default = "default_activity_sink")]
    #[validate(custom = "validate_activity_sink")]
    pub activity_sink: String,

    /// CORS: comma-separated list of allowed origins
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Grant every action to every authenticated actor
    #[serde(default = "default_true_bool")]
    pub permissions_allow_all: bool,

    /// Explicit grants, `<actor_type>:<actor_id>:<action>:<resource>`, `*` matches anything
    #[serde(default)]
    pub permission_grants: Vec<String>,
}

impl AppConfig {
    /// Config with built-in defaults for the given database; used by tests and tooling.
    pub fn with_database_url(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            environment: DEFAULT_ENV.to_string(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_json: false,
            auto_migrate: true,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            event_channel_capacity: default_event_channel_capacity(),
            activity_sink: default_activity_sink(),
            cors_allowed_origins: None,
            permissions_allow_all: true,
            permission_grants: Vec::new(),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Parsed list of allowed CORS origins; empty means permissive (development only).
    pub fn cors_origins(&self) -> Vec<String> {
        self.cors_allowed_origins
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(str::to_string)
            .collect()
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.is_production() && self.cors_origins().is_empty() {
            let mut err = ValidationError::new("cors_allowed_origins_required");
            err.message = Some("Set APP__CORS_ALLOWED_ORIGINS in production".into());
            errors.add("cors_allowed_origins", err);
        }

        if self.is_production() && self.permissions_allow_all {
            let mut err = ValidationError::new("permissions_allow_all_in_production");
            err.message = Some(
                "APP__PERMISSIONS_ALLOW_ALL must be false in production; configure permission_grants"
                    .into(),
            );
            errors.add("permissions_allow_all", err);
        }

        if self.db_min_connections > self.db_max_connections {
            errors.add(
                "db_min_connections",
                ValidationError::new("db_min_exceeds_max"),
            );
        }

        for grant in &self.permission_grants {
            if grant.split(':').count() != 4 {
                let mut err = ValidationError::new("permission_grant_format");
                err.message = Some(
                    format!(
                        "'{}' must look like <actor_type>:<actor_id>:<action>:<resource>",
                        grant
                    )
                    .into(),
                );
                errors.add("permission_grants", err);
            }
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_true_bool() -> bool {
    true
}
fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}
fn default_event_channel_capacity() -> usize {
    1024
}
fn default_activity_sink() -> String {
    "database".to_string()
}

fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_event_channel_capacity(capacity: usize) -> Result<(), ValidationError> {
    if capacity == 0 || capacity > 100_000 {
        let mut err = ValidationError::new("event_channel_capacity");
        err.message = Some("event_channel_capacity must be between 1 and 100000".into());
        return Err(err);
    }
    Ok(())
}

fn validate_activity_sink(value: &str) -> Result<(), ValidationError> {
    match value.to_ascii_lowercase().as_str() {
        "database" | "log" => Ok(()),
        _ => {
            let mut err = ValidationError::new("activity_sink");
            err.message = Some("Must be one of: database, log".into());
            Err(err)
        }
    }
}

/// Initializes tracing using the provided log level as the default filter.
/// `RUST_LOG` wins when set.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("fulfillment_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .json()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .try_init();
    }
}

/// Loads application configuration from `./config` and `APP__*` variables.
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    load_config_from(Path::new(CONFIG_DIR), &run_env)
}

/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. `<dir>/default.toml`
/// 3. `<dir>/<run_env>.toml`
/// 4. Environment variables (`APP__*`)
pub fn load_config_from(dir: &Path, run_env: &str) -> Result<AppConfig, AppConfigError> {
    if !dir.exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            dir.display()
        );
    }

    let config = Config::builder()
        .set_default("database_url", DEFAULT_DATABASE_URL)?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", run_env)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::from(dir.join("default")).required(false))
        .add_source(File::from(dir.join(run_env)).required(false))
        .add_source(
            Environment::with_prefix("APP")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("permission_grants")
                .try_parsing(true),
        )
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration security validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File as FsFile;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, filename: &str, content: &str) {
        let mut file = FsFile::create(dir.path().join(filename)).unwrap();
        writeln!(file, "{}", content).unwrap();
    }

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::with_database_url("sqlite::memory:");
        assert!(config.validate().is_ok());
        assert!(config.validate_additional_constraints().is_ok());
    }

    #[test]
    fn files_are_layered_by_environment() {
        let dir = TempDir::new().unwrap();
        write_config(
            &dir,
            "default.toml",
            r#"
                database_url = "sqlite://default.db"
                port = 9000
                activity_sink = "log"
            "#,
        );
        write_config(
            &dir,
            "staging.toml",
            r#"
                database_url = "postgres://staging/fulfillment"
            "#,
        );

        let config = load_config_from(dir.path(), "staging").unwrap();
        assert_eq!(config.database_url, "postgres://staging/fulfillment");
        assert_eq!(config.port, 9000);
        assert_eq!(config.environment, "staging");
        assert_eq!(config.activity_sink, "log");
    }

    #[test]
    fn event_channel_capacity_is_bounded() {
        let mut config = AppConfig::with_database_url("sqlite::memory:");
        config.event_channel_capacity = 100_000;
        assert!(config.validate().is_ok());

        config.event_channel_capacity = 100_001;
        let errors = config.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("event_channel_capacity"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let dir = TempDir::new().unwrap();
        write_config(
            &dir,
            "default.toml",
            r#"
                log_level = "loud"
                activity_sink = "kafka"
                event_channel_capacity = 0
            "#,
        );

        let result = load_config_from(dir.path(), "development");
        match result {
            Err(AppConfigError::Validation(errors)) => {
                let fields = errors.field_errors();
                assert!(fields.contains_key("log_level"));
                assert!(fields.contains_key("activity_sink"));
                assert!(fields.contains_key("event_channel_capacity"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn production_requires_cors_and_explicit_permissions() {
        let mut config = AppConfig::with_database_url("postgres://prod/db");
        config.environment = "production".into();

        let errors = config.validate_additional_constraints().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("cors_allowed_origins"));
        assert!(fields.contains_key("permissions_allow_all"));

        config.cors_allowed_origins = Some("https://ops.example.com".into());
        config.permissions_allow_all = false;
        config.permission_grants = vec!["user:*:orders:*".into()];
        assert!(config.validate_additional_constraints().is_ok());
    }

    #[test]
    fn malformed_grants_are_rejected() {
        let mut config = AppConfig::with_database_url("sqlite::memory:");
        config.permission_grants = vec!["user:orders".into()];
        let errors = config.validate_additional_constraints().unwrap_err();
        assert!(errors.field_errors().contains_key("permission_grants"));
    }

    #[test]
    fn cors_origins_are_trimmed() {
        let mut config = AppConfig::with_database_url("sqlite::memory:");
        config.cors_allowed_origins = Some(" https://a.example , ,https://b.example".into());
        assert_eq!(
            config.cors_origins(),
            vec!["https://a.example", "https://b.example"]
        );
    }
}
