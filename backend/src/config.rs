//! Runtime configuration from the environment.
//!
//! `.env` is loaded first (if present), then each variable is read with a
//! default. A variable that is set but malformed is an error, never silently
//! replaced by the default.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::ConfigError;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_DATA_DIR: &str = ".spendscore/reports";
pub const DEFAULT_MIN_TRANSACTIONS: usize = 3;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;
pub const DEFAULT_AI_MODEL: &str = "claude-sonnet-4-20250514";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// `SPENDSCORE_PORT`
    pub port: u16,
    /// `SPENDSCORE_DATA_DIR`: one JSON file per stored report
    pub data_dir: PathBuf,
    /// `SPENDSCORE_MIN_TRANSACTIONS`
    pub min_transactions: usize,
    /// `SPENDSCORE_AI_INSIGHTS`
    pub ai_insights: bool,
    /// `SPENDSCORE_MAX_UPLOAD_BYTES`
    pub max_upload_bytes: usize,
    /// `ANTHROPIC_API_KEY`
    pub anthropic_api_key: Option<String>,
    /// `SPENDSCORE_AI_MODEL`
    pub ai_model: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            min_transactions: DEFAULT_MIN_TRANSACTIONS,
            ai_insights: true,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            anthropic_api_key: None,
            ai_model: DEFAULT_AI_MODEL.to_string(),
        }
    }
}

impl Settings {
    /// Load `.env`, then read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            port: parse_or(&get, "SPENDSCORE_PORT", defaults.port)?,
            data_dir: get("SPENDSCORE_DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            min_transactions: parse_or(&get, "SPENDSCORE_MIN_TRANSACTIONS", defaults.min_transactions)?,
            ai_insights: match get("SPENDSCORE_AI_INSIGHTS") {
                Some(value) => parse_bool("SPENDSCORE_AI_INSIGHTS", &value)?,
                None => defaults.ai_insights,
            },
            max_upload_bytes: parse_or(&get, "SPENDSCORE_MAX_UPLOAD_BYTES", defaults.max_upload_bytes)?,
            anthropic_api_key: get("ANTHROPIC_API_KEY"),
            ai_model: get("SPENDSCORE_AI_MODEL").unwrap_or(defaults.ai_model),
        })
    }

    /// Whether the hosted insight provider should be used.
    pub fn insights_enabled(&self) -> bool {
        self.ai_insights && self.anthropic_api_key.is_some()
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(value) => value.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value,
        }),
        None => Ok(default),
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let s = settings(&[]).unwrap();
        assert_eq!(s, Settings::default());
        assert_eq!(s.port, 3000);
        assert_eq!(s.min_transactions, 3);
        assert!(!s.insights_enabled());
    }

    #[test]
    fn test_overrides() {
        let s = settings(&[
            ("SPENDSCORE_PORT", "8080"),
            ("SPENDSCORE_DATA_DIR", "/tmp/reports"),
            ("SPENDSCORE_MIN_TRANSACTIONS", "10"),
            ("SPENDSCORE_AI_INSIGHTS", "off"),
            ("ANTHROPIC_API_KEY", "sk-test"),
        ])
        .unwrap();
        assert_eq!(s.port, 8080);
        assert_eq!(s.data_dir, PathBuf::from("/tmp/reports"));
        assert_eq!(s.min_transactions, 10);
        assert!(!s.ai_insights);
        assert!(!s.insights_enabled());
    }

    #[test]
    fn test_key_enables_insights() {
        let s = settings(&[("ANTHROPIC_API_KEY", "sk-test")]).unwrap();
        assert!(s.insights_enabled());
    }

    #[test]
    fn test_invalid_value() {
        let err = settings(&[("SPENDSCORE_PORT", "eighty")]).unwrap_err();
        assert_eq!(err.to_string(), "Invalid value for SPENDSCORE_PORT: 'eighty'");
        assert!(settings(&[("SPENDSCORE_AI_INSIGHTS", "maybe")]).is_err());
    }

    #[test]
    fn test_blank_values_use_defaults() {
        let s = settings(&[("SPENDSCORE_PORT", "  "), ("ANTHROPIC_API_KEY", "")]).unwrap();
        assert_eq!(s.port, DEFAULT_PORT);
        assert_eq!(s.anthropic_api_key, None);
    }
}
