//! Konfiguration
//!
//! Defaults können per JSON oder Umgebungsvariablen überschrieben werden:
//! `CALL_RINGTONE`, `CALL_FRAME_RATE`, `CALL_FRONT_CAMERA`, `CALL_MEDIA_MODE`.

use crate::call_session::MediaMode;
use crate::media::DEFAULT_FRAME_RATE;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Standard-Klingelton des Systems
pub const DEFAULT_RINGTONE: &str = "_BUNDLE_";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },

    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionConfig {
    /// Klingelton-ID für ausgehende Anrufe
    pub ringtone: String,
    /// Framerate für Videoanrufe
    pub frame_rate: u32,
    /// Startet mit der Frontkamera
    pub front_camera: bool,
    pub media_mode: MediaMode,
    /// Kapazität des Event-Channels
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ringtone: DEFAULT_RINGTONE.to_string(),
            frame_rate: DEFAULT_FRAME_RATE,
            front_camera: true,
            media_mode: MediaMode::Video,
            event_capacity: 100,
        }
    }
}

impl SessionConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Liest die Konfiguration aus Umgebungsvariablen
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let ringtone = lookup("CALL_RINGTONE").unwrap_or(defaults.ringtone);
        let frame_rate = match lookup("CALL_FRAME_RATE") {
            Some(value) => value.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "CALL_FRAME_RATE",
                value,
            })?,
            None => defaults.frame_rate,
        };
        let front_camera = match lookup("CALL_FRONT_CAMERA") {
            Some(value) => parse_bool(&value).ok_or(ConfigError::InvalidValue {
                key: "CALL_FRONT_CAMERA",
                value,
            })?,
            None => defaults.front_camera,
        };
        let media_mode = match lookup("CALL_MEDIA_MODE") {
            Some(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
                key: "CALL_MEDIA_MODE",
                value,
            })?,
            None => defaults.media_mode,
        };

        let config = Self {
            ringtone,
            frame_rate,
            front_camera,
            media_mode,
            event_capacity: defaults.event_capacity,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.frame_rate == 0 {
            return Err(ConfigError::InvalidValue {
                key: "frameRate",
                value: self.frame_rate.to_string(),
            });
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "eventCapacity",
                value: self.event_capacity.to_string(),
            });
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = SessionConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, SessionConfig::default());
        assert_eq!(config.ringtone, "_BUNDLE_");
        assert_eq!(config.frame_rate, 30);
    }

    #[test]
    fn test_env_overrides() {
        let config = SessionConfig::from_lookup(lookup_from(&[
            ("CALL_RINGTONE", "_DEFAULT_"),
            ("CALL_FRAME_RATE", "15"),
            ("CALL_FRONT_CAMERA", "no"),
            ("CALL_MEDIA_MODE", "audio"),
        ]))
        .unwrap();

        assert_eq!(config.ringtone, "_DEFAULT_");
        assert_eq!(config.frame_rate, 15);
        assert!(!config.front_camera);
        assert_eq!(config.media_mode, MediaMode::Audio);
    }

    #[test]
    fn test_invalid_env_value() {
        let err = SessionConfig::from_lookup(lookup_from(&[("CALL_FRAME_RATE", "fast")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "CALL_FRAME_RATE",
                ..
            }
        ));
    }

    #[test]
    fn test_from_json_partial() {
        let config = SessionConfig::from_json(r#"{"mediaMode": "audio", "frameRate": 24}"#).unwrap();
        assert_eq!(config.media_mode, MediaMode::Audio);
        assert_eq!(config.frame_rate, 24);
        assert_eq!(config.ringtone, DEFAULT_RINGTONE);

        assert!(SessionConfig::from_json(r#"{"eventCapacity": 0}"#).is_err());
    }
}
