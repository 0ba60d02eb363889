//! Configuration for locators and deferred resolvers.
//!
//! Values come from code, from environment variables, or (with the `config`
//! feature) from JSON.

use std::env;
use std::time::Duration;

#[cfg(feature = "config")]
use serde::{Deserialize, Serialize};

use crate::safety::Safety;

/// Tunables shared by [`ServiceLocator`](crate::ServiceLocator) and
/// [`DeferredResolver`](crate::DeferredResolver).
///
/// # Examples
///
/// ```rust
/// use ferrous_locator::{LocatorConfig, Safety};
/// use std::time::Duration;
///
/// let config = LocatorConfig::default()
///     .default_safety(Safety::Recursive)
///     .first_consumption_timeout(Some(Duration::from_secs(5)));
///
/// assert_eq!(config.default_safety, Safety::Recursive);
/// assert_eq!(config.first_consumption_timeout, Some(Duration::from_secs(5)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(default))]
pub struct LocatorConfig {
    /// Safety used for providers the locator builds in `add_factory`
    pub default_safety: Safety,
    /// Deadline applied by `register_for_first_consumption_default`; `None` never expires
    #[cfg_attr(feature = "config", serde(with = "duration_ms"))]
    pub first_consumption_timeout: Option<Duration>,
    /// Attach a `LoggingObserver` to new locators
    pub observe_resolutions: bool,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            default_safety: Safety::Exclusive,
            first_consumption_timeout: None,
            observe_resolutions: false,
        }
    }
}

/// Invalid configuration value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    Invalid { key: String, message: String },
    #[cfg(feature = "config")]
    #[error("invalid configuration document: {0}")]
    Document(String),
}

impl LocatorConfig {
    pub fn default_safety(mut self, safety: Safety) -> Self {
        self.default_safety = safety;
        self
    }

    pub fn first_consumption_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.first_consumption_timeout = timeout;
        self
    }

    pub fn observe_resolutions(mut self, observe: bool) -> Self {
        self.observe_resolutions = observe;
        self
    }

    /// Reads overrides from `<PREFIX>_DEFAULT_SAFETY`,
    /// `<PREFIX>_FIRST_CONSUMPTION_TIMEOUT_MS` and
    /// `<PREFIX>_OBSERVE_RESOLUTIONS` on top of the defaults.
    ///
    /// A timeout of `0` means no timeout.
    pub fn from_env(prefix: &str) -> Result<Self, ConfigError> {
        Self::from_lookup(prefix, |key| env::var(key).ok())
    }

    fn from_lookup<F>(prefix: &str, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| format!("{}_{}", prefix.to_uppercase(), name);
        let invalid = |key: String, message: String| ConfigError::Invalid { key, message };
        let mut config = Self::default();

        let key = var("DEFAULT_SAFETY");
        if let Some(value) = lookup(&key) {
            config.default_safety = value.parse().map_err(|message| invalid(key, message))?;
        }

        let key = var("FIRST_CONSUMPTION_TIMEOUT_MS");
        if let Some(value) = lookup(&key) {
            let ms: u64 = value
                .trim()
                .parse()
                .map_err(|e: std::num::ParseIntError| invalid(key, e.to_string()))?;
            config.first_consumption_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }

        let key = var("OBSERVE_RESOLUTIONS");
        if let Some(value) = lookup(&key) {
            config.observe_resolutions = value
                .trim()
                .parse()
                .map_err(|e: std::str::ParseBoolError| invalid(key, e.to_string()))?;
        }

        Ok(config)
    }

    /// Parses a JSON document; missing fields keep their defaults.
    #[cfg(feature = "config")]
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Document(e.to_string()))
    }
}

#[cfg(feature = "config")]
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        let ms = Option::<u64>::deserialize(deserializer)?;
        Ok(ms.filter(|&ms| ms > 0).map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn reads_prefixed_overrides() {
        let config = LocatorConfig::from_lookup(
            "notes",
            lookup(&[
                ("NOTES_DEFAULT_SAFETY", "recursive"),
                ("NOTES_FIRST_CONSUMPTION_TIMEOUT_MS", "5000"),
                ("NOTES_OBSERVE_RESOLUTIONS", "true"),
            ]),
        )
        .unwrap();

        assert_eq!(config.default_safety, Safety::Recursive);
        assert_eq!(config.first_consumption_timeout, Some(Duration::from_secs(5)));
        assert!(config.observe_resolutions);
    }

    #[test]
    fn zero_timeout_means_none() {
        let config = LocatorConfig::from_lookup(
            "app",
            lookup(&[("APP_FIRST_CONSUMPTION_TIMEOUT_MS", "0")]),
        )
        .unwrap();
        assert_eq!(config.first_consumption_timeout, None);
    }

    #[test]
    fn rejects_bad_values() {
        let err = LocatorConfig::from_lookup("app", lookup(&[("APP_DEFAULT_SAFETY", "spin")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "APP_DEFAULT_SAFETY"));
    }

    #[cfg(feature = "config")]
    #[test]
    fn parses_json_with_defaults() {
        let config = LocatorConfig::from_json_str(
            r#"{ "default_safety": "unsafe", "first_consumption_timeout": 250 }"#,
        )
        .unwrap();
        assert_eq!(config.default_safety, Safety::Unsafe);
        assert_eq!(config.first_consumption_timeout, Some(Duration::from_millis(250)));
        assert!(!config.observe_resolutions);
    }
}
