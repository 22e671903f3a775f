use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration build error: {0}")]
    Build(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Fallback SMTP relay used when no default delivery configuration exists in
/// the database. Optional: a deployment may manage relays purely through the
/// `mail_config` table.
#[derive(Clone, Debug, Deserialize)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Sender address; defaults to `username` when unset.
    #[serde(default)]
    pub from: Option<String>,
    /// STARTTLS upgrade after a plaintext connect.
    #[serde(default = "default_true")]
    pub use_tls: bool,
    /// Implicit TLS on connect (takes precedence over `use_tls`).
    #[serde(default)]
    pub use_ssl: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct DriverConfig {
    /// How often the driver scans for due recurring campaigns, in seconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    #[serde(default)]
    pub smtp: Option<SmtpSettings>,
    #[serde(default)]
    pub driver: DriverConfig,
}

fn default_true() -> bool {
    true
}

fn default_poll_interval() -> u64 {
    60
}

/// Load application configuration from `config.yaml` + environment overrides.
///
/// Any environment variable matching the key path separated by double
/// underscores (e.g. `SMTP__PORT`) overrides the file value.
///
/// Returns a `ConfigError` instead of panicking so the caller can decide how
/// to fail.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    use config::{Config, Environment, File};
    let cfg = Config::builder()
        .add_source(File::with_name("config.yaml"))
        .add_source(Environment::default().separator("__"))
        .build()?;

    let app: AppConfig = cfg.try_deserialize()?;
    validate(&app)?;
    Ok(app)
}

fn validate(app: &AppConfig) -> Result<(), ConfigError> {
    if app.database_url.is_empty() {
        return Err(ConfigError::Validation(
            "database_url must not be empty".into(),
        ));
    }
    if let Some(smtp) = &app.smtp {
        if smtp.port == 0 {
            return Err(ConfigError::Validation("smtp.port must be > 0".into()));
        }
        if smtp.host.is_empty() {
            return Err(ConfigError::Validation(
                "smtp.host must not be empty".into(),
            ));
        }
    }
    if app.driver.poll_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "driver.poll_interval_secs must be > 0".into(),
        ));
    }
    Ok(())
}

/// Convenience helper for binaries wanting panic-on-error behaviour.
pub fn load_config_or_panic() -> AppConfig {
    match load_config() {
        Ok(c) => c,
        Err(e) => panic!("Failed to load configuration: {e}"),
    }
}
