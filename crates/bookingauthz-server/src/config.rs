use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use bookingauthz_core::ObjectTypeRegistry;
use bookingauthz_core::expression::AuthorizationExpression;
use bookingauthz_core::object_type::{ObjectTypeDef, booking_types};

use crate::authorization::AuthorizationSettings;
use crate::cache::CacheExpiration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub security: SecurityConfig,
    pub object_types: Option<Vec<ObjectTypeDef>>,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub expiration: ExpirationConfig,
    pub authorization: AuthorizationConfig,
}

/// Cache expirations in seconds; 0 never expires.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExpirationConfig {
    pub user_id: u64,
    pub user_information: u64,
    pub acl: u64,
    pub group: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthorizationConfig {
    pub administrator: Option<String>,
    pub operator: Option<String>,
    pub reservation: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub format: LogFormat,
    pub level: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl Default for ExpirationConfig {
    fn default() -> Self {
        Self {
            user_id: 300,
            user_information: 600,
            acl: 300,
            group: 600,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e.to_string()))?;
            toml::from_str::<AppConfig>(&contents)
                .map_err(|e| ConfigError::ParseToml(e.to_string()))?
        } else {
            AppConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        let expiration = &mut self.security.expiration;
        for (name, target) in [
            ("BOOKINGAUTHZ_EXPIRATION_USER_ID", &mut expiration.user_id),
            (
                "BOOKINGAUTHZ_EXPIRATION_USER_INFORMATION",
                &mut expiration.user_information,
            ),
            ("BOOKINGAUTHZ_EXPIRATION_ACL", &mut expiration.acl),
            ("BOOKINGAUTHZ_EXPIRATION_GROUP", &mut expiration.group),
        ] {
            if let Ok(v) = std::env::var(name)
                && let Ok(seconds) = v.parse()
            {
                *target = seconds;
            }
        }

        let authorization = &mut self.security.authorization;
        if let Ok(v) = std::env::var("BOOKINGAUTHZ_AUTHORIZATION_ADMINISTRATOR") {
            authorization.administrator = Some(v);
        }
        if let Ok(v) = std::env::var("BOOKINGAUTHZ_AUTHORIZATION_OPERATOR") {
            authorization.operator = Some(v);
        }
        if let Ok(v) = std::env::var("BOOKINGAUTHZ_AUTHORIZATION_RESERVATION") {
            authorization.reservation = Some(v);
        }

        if let Ok(v) = std::env::var("BOOKINGAUTHZ_LOG_LEVEL") {
            self.log.level = v;
        }
        if let Ok(v) = std::env::var("BOOKINGAUTHZ_LOG_FORMAT") {
            match v.as_str() {
                "json" => self.log.format = LogFormat::Json,
                "pretty" => self.log.format = LogFormat::Pretty,
                _ => {}
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.log.level.trim().is_empty() {
            return Err(ConfigError::Validation(
                "log.level must not be empty".to_string(),
            ));
        }
        self.to_registry()?;

        let authorization = &self.security.authorization;
        for (name, source) in [
            ("administrator", &authorization.administrator),
            ("operator", &authorization.operator),
            ("reservation", &authorization.reservation),
        ] {
            AuthorizationExpression::compile(source.as_deref()).map_err(|e| {
                ConfigError::Validation(format!("security.authorization.{name}: {e}"))
            })?;
        }
        Ok(())
    }

    pub fn to_expiration(&self) -> CacheExpiration {
        let expiration = &self.security.expiration;
        CacheExpiration {
            user_id: Duration::from_secs(expiration.user_id),
            user_information: Duration::from_secs(expiration.user_information),
            acl: Duration::from_secs(expiration.acl),
            group: Duration::from_secs(expiration.group),
        }
    }

    /// The configured object types, or the booking types when none are given.
    pub fn to_registry(&self) -> Result<ObjectTypeRegistry, ConfigError> {
        let types = self.object_types.clone().unwrap_or_else(booking_types);
        ObjectTypeRegistry::new(types)
            .map_err(|e| ConfigError::Validation(format!("object_types: {e}")))
    }

    pub fn to_settings(&self) -> AuthorizationSettings {
        let authorization = &self.security.authorization;
        AuthorizationSettings {
            expiration: self.to_expiration(),
            administrator: authorization.administrator.clone(),
            operator: authorization.operator.clone(),
            reservation: authorization.reservation.clone(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file '{0}': {1}")]
    ReadFile(String, String),

    #[error("failed to parse TOML config: {0}")]
    ParseToml(String),

    #[error("config validation failed: {0}")]
    Validation(String),
}
