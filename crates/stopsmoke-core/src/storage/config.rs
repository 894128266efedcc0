//! TOML-based application configuration.
//!
//! Stores user preferences including:
//! - Taper settings (initial daily allowance, weekly reduction)
//! - Notification preferences
//!
//! Configuration is stored at `<data dir>/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::data_dir;
use crate::allowance::{AllowanceConfig, DEFAULT_DAILY_ALLOWANCE, DEFAULT_WEEKLY_REDUCTION};
use crate::error::{ConfigError, Result};

/// Taper settings as written by the user.
///
/// Kept signed so a bad hand-edited value still parses and can be coerced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllowanceSettings {
    #[serde(default = "default_daily_allowance_base")]
    pub daily_allowance_base: i64,
    #[serde(default = "default_weekly_reduction")]
    pub weekly_reduction: i64,
}

/// Notification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Application configuration.
///
/// Serialized to/from TOML at `<data dir>/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub allowance: AllowanceSettings,
    #[serde(default)]
    pub notifications: NotificationsConfig,
}

fn default_daily_allowance_base() -> i64 {
    i64::from(DEFAULT_DAILY_ALLOWANCE)
}
fn default_weekly_reduction() -> i64 {
    i64::from(DEFAULT_WEEKLY_REDUCTION)
}
fn default_true() -> bool {
    true
}

impl Default for AllowanceSettings {
    fn default() -> Self {
        Self {
            daily_allowance_base: default_daily_allowance_base(),
            weekly_reduction: default_weekly_reduction(),
        }
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().map_or(true, |p| p.is_empty()) {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value
                            .parse::<bool>()
                            .map_err(|_| invalid(format!("cannot parse '{value}' as bool")))?,
                    ),
                    serde_json::Value::Number(_) => {
                        let n = value
                            .parse::<i64>()
                            .map_err(|_| invalid(format!("cannot parse '{value}' as integer")))?;
                        serde_json::Value::Number(n.into())
                    }
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        return Err(invalid("cannot set a whole section".into()));
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    /// Default location of the config file.
    ///
    /// # Errors
    /// Returns an error if the data directory cannot be created.
    pub fn path() -> Result<PathBuf> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk or create the default file.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::path()?)
    }

    /// Load from an explicit path, writing defaults there if it is missing.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or created.
    pub fn load_from(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content)
                    .map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
                Ok(cfg)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }
            .into()),
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path()?)
    }

    /// Persist to an explicit path.
    ///
    /// # Errors
    /// Returns an error if the config cannot be serialized or written.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))?;
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key without saving.
    ///
    /// Allowance keys only accept positive integers.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value is invalid.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        let mut json = serde_json::to_value(&*self)?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config = serde_json::from_value(json)?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Set a config value by key and save to the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value is invalid,
    /// or the config cannot be saved.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.apply(key, value)?;
        self.save()
    }

    /// Reject non-positive taper settings.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidValue` for the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let base = u32::try_from(self.allowance.daily_allowance_base).unwrap_or(0);
        let reduction = u32::try_from(self.allowance.weekly_reduction).unwrap_or(0);
        AllowanceConfig::new(base, reduction).map(|_| ())
    }

    /// Taper settings for the schedule, with non-positive values replaced
    /// by defaults.
    pub fn allowance(&self) -> AllowanceConfig {
        AllowanceConfig::coerced(
            self.allowance.daily_allowance_base,
            self.allowance.weekly_reduction,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.allowance.daily_allowance_base, 20);
        assert_eq!(parsed.allowance.weekly_reduction, 1);
        assert!(parsed.notifications.enabled);
    }

    #[test]
    fn missing_sections_use_defaults() {
        let parsed: Config = toml::from_str("[allowance]\nweekly_reduction = 3\n").unwrap();
        assert_eq!(parsed.allowance.daily_allowance_base, 20);
        assert_eq!(parsed.allowance.weekly_reduction, 3);
        assert!(parsed.notifications.enabled);
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("allowance.daily_allowance_base").as_deref(), Some("20"));
        assert_eq!(cfg.get("notifications.enabled").as_deref(), Some("true"));
        assert!(cfg.get("allowance.missing_key").is_none());
    }

    #[test]
    fn apply_updates_number_and_bool() {
        let mut cfg = Config::default();
        cfg.apply("allowance.weekly_reduction", "3").unwrap();
        cfg.apply("notifications.enabled", "false").unwrap();
        assert_eq!(cfg.allowance.weekly_reduction, 3);
        assert!(!cfg.notifications.enabled);
    }

    #[test]
    fn apply_rejects_non_positive_allowance() {
        let mut cfg = Config::default();
        let err = cfg.apply("allowance.daily_allowance_base", "0").unwrap_err();
        assert!(matches!(err, CoreError::Config(ConfigError::InvalidValue { .. })));
        assert!(cfg.apply("allowance.weekly_reduction", "-2").is_err());
        assert_eq!(cfg.allowance.daily_allowance_base, 20);
        assert_eq!(cfg.allowance.weekly_reduction, 1);
    }

    #[test]
    fn apply_rejects_unknown_key_and_bad_type() {
        let mut cfg = Config::default();
        assert!(matches!(
            cfg.apply("allowance.nonexistent", "1"),
            Err(CoreError::Config(ConfigError::UnknownKey(_)))
        ));
        assert!(cfg.apply("notifications.enabled", "not_a_bool").is_err());
        assert!(cfg.apply("allowance", "5").is_err());
        assert!(cfg.apply("", "5").is_err());
    }

    #[test]
    fn allowance_coerces_bad_file_values() {
        let parsed: Config =
            toml::from_str("[allowance]\ndaily_allowance_base = -5\nweekly_reduction = 2\n")
                .unwrap();
        assert!(parsed.validate().is_err());
        let allowance = parsed.allowance();
        assert_eq!(allowance.daily_allowance_base(), 20);
        assert_eq!(allowance.weekly_reduction(), 2);
    }

    #[test]
    fn load_from_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let cfg = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(cfg.allowance.daily_allowance_base, 20);

        let mut cfg = cfg;
        cfg.apply("allowance.daily_allowance_base", "12").unwrap();
        cfg.save_to(&path).unwrap();
        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.allowance.daily_allowance_base, 12);
    }

    #[test]
    fn load_from_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[allowance\n").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(CoreError::Config(ConfigError::ParseFailed(_)))
        ));
    }
}
