//! Runtime configuration read from the environment.

use std::{str::FromStr, time::Duration};

use thiserror::Error;

use super::ai_provider::AiProviderKind;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub ai: AiConfig,
    pub generation: GenerationConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Clone)]
pub struct AiConfig {
    pub provider: AiProviderKind,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub max_retries: usize,
}

#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub titles_per_product: usize,
    /// Products picked by a batch started without explicit ids
    pub batch_limit: i64,
    /// Extra scorer-picked products linked from each generated article
    pub related_products: usize,
    pub queue_worker_enabled: bool,
    pub queue_poll_interval: Duration,
    pub queue_stale_minutes: i64,
}

#[derive(Debug, Clone, Default)]
pub struct SyncConfig {
    pub feed_url: Option<String>,
    pub cron_secret: Option<String>,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: AiProviderKind::default(),
            api_key: None,
            model: None,
            base_url: None,
            max_retries: 3,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            titles_per_product: 5,
            batch_limit: 20,
            related_products: 3,
            queue_worker_enabled: false,
            queue_poll_interval: Duration::from_secs(30),
            queue_stale_minutes: 30,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://ipshopy.db".to_string(),
            host: "127.0.0.1".to_string(),
            port: 3001,
            ai: AiConfig::default(),
            generation: GenerationConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Config::default();

        let provider = match get("AI_PROVIDER") {
            Some(value) => AiProviderKind::from_str(&value.to_lowercase()).map_err(|_| {
                ConfigError::InvalidValue {
                    key: "AI_PROVIDER",
                    value,
                }
            })?,
            None => AiProviderKind::default(),
        };
        let api_key = get("AI_API_KEY").or_else(|| get(provider.api_key_env()));

        Ok(Self {
            database_url: get("DATABASE_URL").unwrap_or(defaults.database_url),
            host: get("HOST").unwrap_or(defaults.host),
            port: parse(&get, "PORT", defaults.port)?,
            ai: AiConfig {
                provider,
                api_key,
                model: get("AI_MODEL"),
                base_url: get("AI_BASE_URL"),
                max_retries: parse(&get, "AI_MAX_RETRIES", defaults.ai.max_retries)?,
            },
            generation: GenerationConfig {
                titles_per_product: parse(
                    &get,
                    "TITLES_PER_PRODUCT",
                    defaults.generation.titles_per_product,
                )?
                .clamp(1, 20),
                batch_limit: parse(&get, "BATCH_LIMIT", defaults.generation.batch_limit)?,
                related_products: parse(
                    &get,
                    "RELATED_PRODUCTS",
                    defaults.generation.related_products,
                )?,
                queue_worker_enabled: parse(
                    &get,
                    "QUEUE_WORKER_ENABLED",
                    defaults.generation.queue_worker_enabled,
                )?,
                queue_poll_interval: Duration::from_secs(parse_nonzero(
                    &get,
                    "QUEUE_POLL_SECONDS",
                    defaults.generation.queue_poll_interval.as_secs(),
                )?),
                queue_stale_minutes: parse(
                    &get,
                    "QUEUE_STALE_MINUTES",
                    defaults.generation.queue_stale_minutes,
                )?,
            },
            sync: SyncConfig {
                feed_url: get("PRODUCT_FEED_URL"),
                cron_secret: get("CRON_SECRET"),
            },
        })
    }
}

fn parse<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match get(key) {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value }),
        None => Ok(default),
    }
}

/// Like [`parse`], but zero is rejected. Used for intervals handed to
/// `tokio::time::interval`, which panics on a zero period.
fn parse_nonzero(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: u64,
) -> Result<u64, ConfigError> {
    match parse(get, key, default)? {
        0 => Err(ConfigError::InvalidValue {
            key,
            value: "0".to_string(),
        }),
        value => Ok(value),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.port, 3001);
        assert_eq!(config.ai.provider, AiProviderKind::Anthropic);
        assert_eq!(config.generation.titles_per_product, 5);
        assert!(config.sync.cron_secret.is_none());
    }

    #[test]
    fn test_provider_specific_key_fallback() {
        let config = Config::from_lookup(lookup(&[
            ("AI_PROVIDER", "OpenAI"),
            ("OPENAI_API_KEY", "sk-test"),
            ("TITLES_PER_PRODUCT", "50"),
        ]))
        .unwrap();
        assert_eq!(config.ai.provider, AiProviderKind::OpenAi);
        assert_eq!(config.ai.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.generation.titles_per_product, 20);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(Config::from_lookup(lookup(&[("PORT", "http")])).is_err());
        assert!(Config::from_lookup(lookup(&[("AI_PROVIDER", "parrot")])).is_err());
    }

    #[test]
    fn test_zero_poll_interval_is_rejected() {
        for value in ["0", "00", "-5"] {
            assert!(matches!(
                Config::from_lookup(lookup(&[("QUEUE_POLL_SECONDS", value)])),
                Err(ConfigError::InvalidValue {
                    key: "QUEUE_POLL_SECONDS",
                    ..
                })
            ));
        }
        let config = Config::from_lookup(lookup(&[("QUEUE_POLL_SECONDS", "5")])).unwrap();
        assert_eq!(config.generation.queue_poll_interval, Duration::from_secs(5));
    }
}
