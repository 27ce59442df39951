use std::fmt;
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub const DEFAULT_ENDPOINT: &str = "https://picsum.photos/";

/// Easing applied to the crossfade progress scalar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FadeCurve {
    #[default]
    Linear,
    Smoothstep,
    EaseInOut,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WallConfig {
    pub version: u32,
    #[serde(default)]
    pub wallpaper: WallpaperOptions,
    #[serde(default)]
    pub fetch: FetchOptions,
    #[serde(default)]
    pub retry: RetryOptions,
}

/// Options the compositor side watches for changes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WallpaperOptions {
    pub cycle: bool,
    #[serde(deserialize_with = "deserialize_duration")]
    pub cycle_time: Duration,
    #[serde(deserialize_with = "deserialize_duration")]
    pub fade_duration: Duration,
    pub fade_curve: FadeCurve,
}

impl Default for WallpaperOptions {
    fn default() -> Self {
        Self {
            cycle: true,
            cycle_time: Duration::from_secs(300),
            fade_duration: Duration::from_secs(1),
            fade_curve: FadeCurve::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FetchOptions {
    pub endpoint: String,
    #[serde(deserialize_with = "deserialize_duration")]
    pub connect_timeout: Duration,
    #[serde(deserialize_with = "deserialize_duration")]
    pub request_timeout: Duration,
    /// Read iterations a worker may still perform after shutdown was requested.
    pub shutdown_grace_iterations: u32,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            connect_timeout: Duration::from_secs(1),
            request_timeout: Duration::from_secs(30),
            shutdown_grace_iterations: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryOptions {
    pub threshold: u32,
    #[serde(deserialize_with = "deserialize_duration")]
    pub backoff: Duration,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            threshold: 3,
            backoff: Duration::from_millis(1000),
        }
    }
}

impl Default for WallConfig {
    fn default() -> Self {
        Self {
            version: 1,
            wallpaper: WallpaperOptions::default(),
            fetch: FetchOptions::default(),
            retry: RetryOptions::default(),
        }
    }
}

/// Sections that differ between two configurations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfigChanges {
    pub cycle: bool,
    pub cycle_time: bool,
    pub fade: bool,
    pub fetch: bool,
    pub retry: bool,
}

impl ConfigChanges {
    pub fn any(&self) -> bool {
        self.cycle || self.cycle_time || self.fade || self.fetch || self.retry
    }
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    deserialize_duration_opt(deserializer)?
        .ok_or_else(|| de::Error::custom("duration must not be empty"))
}

fn deserialize_duration_opt<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Option<Duration>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map(Some)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(Duration::from_secs(v)))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Some(Duration::from_secs(v as u64)))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v.is_nan() || v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Some(Duration::from_secs_f64(v)))
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }
    }

    deserializer.deserialize_any(Visitor)
}

/// Parses a `humantime` duration as used by command line overrides.
pub fn parse_duration(raw: &str) -> Result<Duration, ConfigError> {
    let trimmed = raw.trim();
    if let Ok(seconds) = trimmed.parse::<u64>() {
        return Ok(Duration::from_secs(seconds));
    }
    humantime::parse_duration(trimmed)
        .map_err(|err| ConfigError::Invalid(format!("invalid duration '{trimmed}': {err}")))
}

impl WallConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: WallConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected 1",
                self.version
            )));
        }

        if self.wallpaper.cycle && self.wallpaper.cycle_time.is_zero() {
            return Err(ConfigError::Invalid(
                "wallpaper.cycle_time must be greater than zero when cycling".into(),
            ));
        }

        let endpoint = self.fetch.endpoint.trim();
        if endpoint.is_empty() {
            return Err(ConfigError::Invalid("fetch.endpoint may not be empty".into()));
        }
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "fetch.endpoint '{endpoint}' must be an http or https url"
            )));
        }

        if self.fetch.connect_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "fetch.connect_timeout must be greater than zero".into(),
            ));
        }

        if self.fetch.request_timeout < self.fetch.connect_timeout {
            return Err(ConfigError::Invalid(
                "fetch.request_timeout must not be shorter than fetch.connect_timeout".into(),
            ));
        }

        if self.retry.backoff.is_zero() {
            return Err(ConfigError::Invalid(
                "retry.backoff must be greater than zero".into(),
            ));
        }

        Ok(())
    }

    pub fn changes_from(&self, previous: &WallConfig) -> ConfigChanges {
        ConfigChanges {
            cycle: self.wallpaper.cycle != previous.wallpaper.cycle,
            cycle_time: self.wallpaper.cycle_time != previous.wallpaper.cycle_time,
            fade: self.wallpaper.fade_duration != previous.wallpaper.fade_duration
                || self.wallpaper.fade_curve != previous.wallpaper.fade_curve,
            fetch: self.fetch != previous.fetch,
            retry: self.retry != previous.retry,
        }
    }
}
