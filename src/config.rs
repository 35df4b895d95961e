//! Runtime configuration, layered from defaults, an optional TOML file, and the environment.

use custom_debug_derive::Debug;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Optional configuration file read from the working directory.
pub const CONFIG_FILE: &str = "enrollment.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// ScraperAPI key. When absent, requests go straight to the target site.
    #[debug(with = crate::fmt::redacted)]
    pub scraper_api_key: Option<String>,
    /// Limit every site to a small slice of its terms and units.
    pub test_mode: bool,
    pub log_level: String,
    /// Append plain-text logs to this file in addition to stdout.
    #[debug(skip_if = Option::is_none)]
    #[debug(with = crate::fmt::opt)]
    pub log_file: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub proxy_endpoint: String,
    pub country_code: String,
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_secs")]
    pub request_timeout: Duration,
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_secs")]
    pub proxy_timeout: Duration,
    pub max_retries: u32,
    /// Wait applied after a 429 from the proxy before retrying.
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_secs")]
    pub rate_limit_delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scraper_api_key: None,
            test_mode: false,
            log_level: "info".to_string(),
            log_file: None,
            output_dir: PathBuf::from("data"),
            proxy_endpoint: "http://api.scraperapi.com".to_string(),
            country_code: "us".to_string(),
            request_timeout: Duration::from_secs(30),
            proxy_timeout: Duration::from_secs(60),
            max_retries: 3,
            rate_limit_delay: Duration::from_secs(10),
        }
    }
}

impl Config {
    /// Build the layered figment: defaults, then `enrollment.toml`, then raw environment keys.
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::raw().only(&[
                "SCRAPER_API_KEY",
                "TEST_MODE",
                "LOG_LEVEL",
                "LOG_FILE",
                "OUTPUT_DIR",
                "PROXY_ENDPOINT",
                "COUNTRY_CODE",
                "REQUEST_TIMEOUT",
                "PROXY_TIMEOUT",
                "MAX_RETRIES",
                "RATE_LIMIT_DELAY",
            ]))
    }

    pub fn load() -> Result<Self, figment::Error> {
        let mut config: Config = Self::figment().extract()?;
        // An empty key in .env means "not configured".
        if config.scraper_api_key.as_deref().is_some_and(|k| k.trim().is_empty()) {
            config.scraper_api_key = None;
        }
        Ok(config)
    }
}

fn serialize_secs<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u64(value.as_secs())
}

/// Accepts either an integer number of seconds or a duration string such as `"1m 30s"`.
fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
        Raw::Text(text) => parse_duration(&text).map_err(D::Error::custom),
    }
}

fn parse_duration(text: &str) -> Result<Duration, String> {
    let parser = fundu::DurationParser::with_all_time_units();
    let parsed = parser
        .parse(text.trim())
        .map_err(|e| format!("invalid duration {text:?}: {e}"))?;
    Duration::try_from(parsed).map_err(|e| format!("duration {text:?} out of range: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.rate_limit_delay, Duration::from_secs(10));
        assert_eq!(config.max_retries, 3);
        assert!(config.scraper_api_key.is_none());
    }

    #[test]
    fn test_env_overrides() {
        Jail::expect_with(|jail| {
            jail.set_env("SCRAPER_API_KEY", "abc123");
            jail.set_env("TEST_MODE", "true");
            jail.set_env("RATE_LIMIT_DELAY", "1m 30s");
            jail.set_env("PROXY_TIMEOUT", "90");

            let config = Config::load()?;
            assert_eq!(config.scraper_api_key.as_deref(), Some("abc123"));
            assert!(config.test_mode);
            assert_eq!(config.rate_limit_delay, Duration::from_secs(90));
            assert_eq!(config.proxy_timeout, Duration::from_secs(90));
            Ok(())
        });
    }

    #[test]
    fn test_toml_file_layer() {
        Jail::expect_with(|jail| {
            jail.create_file(CONFIG_FILE, "output_dir = \"out\"\nmax_retries = 5\n")?;
            let config = Config::load()?;
            assert_eq!(config.output_dir, PathBuf::from("out"));
            assert_eq!(config.max_retries, 5);
            Ok(())
        });
    }

    #[test]
    fn test_blank_api_key_is_unset() {
        Jail::expect_with(|jail| {
            jail.set_env("SCRAPER_API_KEY", "  ");
            let config = Config::load()?;
            assert!(config.scraper_api_key.is_none());
            Ok(())
        });
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = Config {
            scraper_api_key: Some("secret".to_string()),
            ..Config::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("<redacted>"));
    }
}
