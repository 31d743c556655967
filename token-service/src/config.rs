use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bounds from the external-interfaces configuration table: token
/// expiration is clamped to 1 second .. 1 hour at construction time.
const MIN_TOKEN_TTL: Duration = Duration::from_secs(1);
const MAX_TOKEN_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenServiceConfig {
    #[serde(with = "duration_millis", default = "default_token_ttl")]
    pub token_ttl: Duration,

    #[serde(with = "duration_millis", default = "default_delete_interval")]
    pub delete_interval: Duration,

    #[serde(with = "option_duration_millis", default)]
    pub delete_timeout: Option<Duration>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_token_ttl() -> Duration {
    Duration::from_secs(20 * 60)
}

fn default_delete_interval() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_enabled() -> bool {
    true
}

impl Default for TokenServiceConfig {
    fn default() -> Self {
        Self {
            token_ttl: default_token_ttl(),
            delete_interval: default_delete_interval(),
            delete_timeout: None,
            enabled: default_enabled(),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("token_ttl must be between {min:?} and {max:?}, got {got:?}")]
    TokenTtlOutOfRange {
        min: Duration,
        max: Duration,
        got: Duration,
    },
}

impl TokenServiceConfig {
    /// Load configuration from the process environment layered over
    /// defaults, the way the rest of the workspace loads its config, and
    /// validate the documented bounds.
    pub fn load() -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?)
            .add_source(config::Environment::with_prefix("TOKEN_SERVICE").separator("__"))
            .build()?;
        settings.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token_ttl < MIN_TOKEN_TTL || self.token_ttl > MAX_TOKEN_TTL {
            return Err(ConfigError::TokenTtlOutOfRange {
                min: MIN_TOKEN_TTL,
                max: MAX_TOKEN_TTL,
                got: self.token_ttl,
            });
        }
        Ok(())
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

mod option_duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}
