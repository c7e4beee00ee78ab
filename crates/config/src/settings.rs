//! Gateway settings: defaults, `config/{default,<env>}.{yaml,toml}`,
//! `GATEWAY__`-prefixed environment variables, then the flat top-level
//! environment overrides the wire contract names explicitly (`PORT`,
//! `ADMIN_API_KEY`, `DATABASE_URL`, …).

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Plain,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    #[default]
    Development,
    Staging,
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Production | Self::Staging)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub persistence: PersistenceConfig,

    #[serde(default)]
    pub embedded: EmbeddedConfig,

    #[serde(default)]
    pub features: FeatureFlags,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// `LOG_FORMAT=json|plain` (SPEC_FULL.md §10.1). `None` defers to
    /// `RuntimeEnvironment::is_strict()` (json in staging/production,
    /// plain in development) — the same default `init_tracing` always
    /// used before this flag existed.
    #[serde(default)]
    pub log_format: Option<LogFormat>,

    #[serde(default = "default_max_request_size")]
    pub max_request_size: usize,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_request_size() -> usize {
    2 * 1024 * 1024
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    #[serde(default)]
    pub cors_origins: Vec<String>,
    #[serde(default)]
    pub trust_proxy: bool,
    #[serde(default)]
    pub allowed_ips: Vec<String>,
    #[serde(default)]
    pub blocked_ips: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_max_connections() -> usize {
    1000
}

fn default_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_connections: default_max_connections(),
            timeout_seconds: default_timeout(),
            cors_enabled: true,
            cors_origins: Vec::new(),
            trust_proxy: false,
            allowed_ips: Vec::new(),
            blocked_ips: Vec::new(),
        }
    }
}

/// The master bootstrap admin key (spec §4.B).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub admin_api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_rate_limit_requests")]
    pub default_requests: u32,
    #[serde(default = "default_rate_limit_window_ms")]
    pub default_window_ms: i64,
}

fn default_rate_limit_requests() -> u32 {
    60
}

fn default_rate_limit_window_ms() -> i64 {
    60_000
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            default_requests: default_rate_limit_requests(),
            default_window_ms: default_rate_limit_window_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

fn default_data_dir() -> String {
    "./data".to_string()
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            data_dir: default_data_dir(),
        }
    }
}

/// Defaults applied to the compact embedded-device REST surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddedConfig {
    #[serde(default = "default_esp32_max_text_length")]
    pub max_text_length: usize,
    #[serde(default = "default_esp32_engine")]
    pub default_engine: String,
    #[serde(default = "default_esp32_voice")]
    pub default_voice: String,
    #[serde(default = "default_esp32_sample_rate")]
    pub default_sample_rate: u32,
}

fn default_esp32_max_text_length() -> usize {
    500
}

fn default_esp32_engine() -> String {
    "espeak".to_string()
}

fn default_esp32_voice() -> String {
    "espeak-en".to_string()
}

fn default_esp32_sample_rate() -> u32 {
    16000
}

impl Default for EmbeddedConfig {
    fn default() -> Self {
        Self {
            max_text_length: default_esp32_max_text_length(),
            default_engine: default_esp32_engine(),
            default_voice: default_esp32_voice(),
            default_sample_rate: default_esp32_sample_rate(),
        }
    }
}

/// Product-decision toggles (spec §7, §9) that aren't part of the
/// external wire contract but still need a knob.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FeatureFlags {
    /// spec §7: "`ProviderFailed` on the non-timestamped path MAY respond
    /// with a tiny silent MP3 fallback (legacy behavior for continuity of
    /// AAC clients) — this is a deliberate product decision, configurable
    /// off." `None` defers to the environment: on in development/staging,
    /// off in production unless explicitly set to `Some(true)`.
    #[serde(default)]
    pub legacy_mp3_fallback: Option<bool>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves the `legacy_mp3_fallback` flag against the environment
    /// default when it hasn't been set explicitly.
    pub fn legacy_mp3_fallback_enabled(&self) -> bool {
        self.features
            .legacy_mp3_fallback
            .unwrap_or(!self.environment.is_production())
    }

    /// Resolves `LOG_FORMAT` against the environment default (json in
    /// staging/production, plain otherwise) when it hasn't been set
    /// explicitly.
    pub fn effective_log_format(&self) -> LogFormat {
        self.log_format.unwrap_or(if self.environment.is_strict() {
            LogFormat::Json
        } else {
            LogFormat::Plain
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.port".to_string(),
                message: "port cannot be 0".to_string(),
            });
        }
        if self.server.max_connections == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.max_connections".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.rate_limit.default_requests == 0 {
            return Err(ConfigError::InvalidValue {
                field: "rate_limit.default_requests".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.environment.is_production()
            && self.auth.admin_api_key.as_deref().unwrap_or("").is_empty()
        {
            return Err(ConfigError::InvalidValue {
                field: "auth.admin_api_key".to_string(),
                message: "ADMIN_API_KEY must be set in production".to_string(),
            });
        }
        Ok(())
    }

    /// Applies the flat, wire-contract-named environment overrides on
    /// top of whatever `GATEWAY__`-prefixed / file-based config already
    /// produced. These names are part of the external interface (spec
    /// §6's configuration inputs table) and are honored regardless of
    /// the layered `config` crate prefix.
    fn apply_flat_env_overrides(&mut self) {
        use std::env::var;

        if let Ok(v) = var("PORT") {
            if let Ok(p) = v.parse() {
                self.server.port = p;
            }
        }
        if let Ok(v) = var("HOST") {
            self.server.host = v;
        }
        if let Ok(v) = var("ADMIN_API_KEY") {
            self.auth.admin_api_key = Some(v);
        }
        if let Ok(v) = var("DATABASE_URL") {
            self.persistence.database_url = Some(v);
        }
        if let Ok(v) = var("DATA_DIR").or_else(|_| var("OPENVOICEPROXY_DATA_DIR")) {
            self.persistence.data_dir = v;
        }
        if let Ok(v) = var("LOG_LEVEL") {
            self.log_level = v;
        }
        if let Ok(v) = var("LOG_FORMAT") {
            self.log_format = match v.to_ascii_lowercase().as_str() {
                "json" => Some(LogFormat::Json),
                "plain" | "text" => Some(LogFormat::Plain),
                _ => self.log_format,
            };
        }
        if let Ok(v) = var("RATE_LIMIT_REQUESTS") {
            if let Ok(n) = v.parse() {
                self.rate_limit.default_requests = n;
            }
        }
        if let Ok(v) = var("RATE_LIMIT_WINDOW_MS") {
            if let Ok(n) = v.parse() {
                self.rate_limit.default_window_ms = n;
            }
        }
        if let Ok(v) = var("MAX_REQUEST_SIZE") {
            if let Ok(n) = v.parse() {
                self.max_request_size = n;
            }
        }
        if let Ok(v) = var("ESP32_MAX_TEXT_LENGTH") {
            if let Ok(n) = v.parse() {
                self.embedded.max_text_length = n;
            }
        }
        if let Ok(v) = var("ESP32_DEFAULT_ENGINE") {
            self.embedded.default_engine = v;
        }
        if let Ok(v) = var("ESP32_DEFAULT_VOICE") {
            self.embedded.default_voice = v;
        }
        if let Ok(v) = var("ESP32_DEFAULT_SAMPLE_RATE") {
            if let Ok(n) = v.parse() {
                self.embedded.default_sample_rate = n;
            }
        }
        if let Ok(v) = var("CORS_ORIGIN") {
            self.server.cors_origins = v.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Ok(v) = var("TRUST_PROXY") {
            self.server.trust_proxy = matches!(v.as_str(), "1" | "true" | "yes");
        }
        if let Ok(v) = var("ALLOWED_IPS") {
            self.server.allowed_ips = v.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Ok(v) = var("BLOCKED_IPS") {
            self.server.blocked_ips = v.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Ok(v) = var("LEGACY_MP3_FALLBACK") {
            self.features.legacy_mp3_fallback = Some(matches!(v.as_str(), "1" | "true" | "yes"));
        }
    }
}

/// Loads settings from, in order of increasing precedence: code
/// defaults, `config/default.{yaml,toml}`, `config/{env}.{yaml,toml}`,
/// `GATEWAY__`-prefixed environment variables, then the flat overrides
/// named in the external interface table.
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("GATEWAY")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let mut settings: Settings = config.try_deserialize()?;

    settings.apply_flat_env_overrides();
    settings.validate()?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_pass_validation() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn zero_port_fails_validation() {
        let mut settings = Settings::default();
        settings.server.port = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn production_requires_admin_key() {
        let mut settings = Settings::default();
        settings.environment = RuntimeEnvironment::Production;
        assert!(settings.validate().is_err());
        settings.auth.admin_api_key = Some("tts_abc".to_string());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn embedded_defaults_match_wire_contract() {
        let embedded = EmbeddedConfig::default();
        assert_eq!(embedded.max_text_length, 500);
    }

    #[test]
    fn legacy_mp3_fallback_defaults_on_outside_production() {
        let settings = Settings::default();
        assert!(settings.legacy_mp3_fallback_enabled());
    }

    #[test]
    fn legacy_mp3_fallback_defaults_off_in_production() {
        let mut settings = Settings::default();
        settings.environment = RuntimeEnvironment::Production;
        assert!(!settings.legacy_mp3_fallback_enabled());
    }

    #[test]
    fn log_format_defaults_follow_environment_strictness() {
        let dev = Settings::default();
        assert_eq!(dev.effective_log_format(), LogFormat::Plain);

        let mut prod = Settings::default();
        prod.environment = RuntimeEnvironment::Production;
        assert_eq!(prod.effective_log_format(), LogFormat::Json);
    }

    #[test]
    fn explicit_log_format_overrides_environment_default() {
        let mut settings = Settings::default();
        settings.log_format = Some(LogFormat::Json);
        assert_eq!(settings.effective_log_format(), LogFormat::Json);
    }

    #[test]
    fn legacy_mp3_fallback_can_be_explicitly_re_enabled_in_production() {
        let mut settings = Settings::default();
        settings.environment = RuntimeEnvironment::Production;
        settings.features.legacy_mp3_fallback = Some(true);
        assert!(settings.legacy_mp3_fallback_enabled());
    }
}
