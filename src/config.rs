//
// config.rs
// CMR-Curate-rs
//
// Runtime settings loaded from an optional TOML file, with defaults for every field.
//
// Thales Matheus Mendonça Santos - October 2026

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::catalogue;
use crate::error::ConfigError;

pub const DEFAULT_MAPPING_STORE: &str = "record_linkage.jsonl";
pub const DEFAULT_PSEUDONYM_PREFIX: &str = "CMR";
pub const DEFAULT_MAX_DATE_SHIFT_DAYS: u32 = 365;
pub const DEFAULT_DEIDENTIFICATION_METHOD: &str = "cmr-curate basic profile";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Location of the identity mapping store, relative to the working root.
    pub mapping_store: PathBuf,
    /// Optional JSON rule table replacing the embedded cardiac rules.
    pub rules: Option<PathBuf>,
    pub pseudonym_prefix: String,
    pub max_date_shift_days: u32,
    pub deidentification_method: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mapping_store: PathBuf::from(DEFAULT_MAPPING_STORE),
            rules: None,
            pseudonym_prefix: DEFAULT_PSEUDONYM_PREFIX.to_string(),
            max_date_shift_days: DEFAULT_MAX_DATE_SHIFT_DAYS,
            deidentification_method: DEFAULT_DEIDENTIFICATION_METHOD.to_string(),
        }
    }
}

impl Config {
    /// Load from `path`, or fall back to defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                let config = Self::from_toml(&text).map_err(|source| ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?;
                debug!(?path, "loaded configuration");
                config
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_date_shift_days == 0 {
            return Err(ConfigError::Invalid {
                field: "max_date_shift_days",
                reason: "must be at least 1".to_string(),
            });
        }
        // The prefix becomes part of directory names and PatientID values.
        if self.pseudonym_prefix.is_empty()
            || !self
                .pseudonym_prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric())
        {
            return Err(ConfigError::Invalid {
                field: "pseudonym_prefix",
                reason: format!(
                    "{:?} must be non-empty ASCII letters or digits",
                    self.pseudonym_prefix
                ),
            });
        }
        // Patient folders must never be mistaken for series folders by the cataloguer.
        if catalogue::series_number_of(&format!("{}000001", self.pseudonym_prefix)).is_some() {
            return Err(ConfigError::Invalid {
                field: "pseudonym_prefix",
                reason: format!(
                    "{:?} would name patient folders like series folders",
                    self.pseudonym_prefix
                ),
            });
        }
        if self.mapping_store.as_os_str().is_empty() {
            return Err(ConfigError::Invalid {
                field: "mapping_store",
                reason: "path must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = Config::from_toml("").expect("parse");
        assert_eq!(config, Config::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_file_overrides_only_given_fields() {
        let config = Config::from_toml(
            r#"
            mapping_store = "state/linkage.jsonl"
            max_date_shift_days = 30
            "#,
        )
        .expect("parse");
        assert_eq!(config.mapping_store, PathBuf::from("state/linkage.jsonl"));
        assert_eq!(config.max_date_shift_days, 30);
        assert_eq!(config.pseudonym_prefix, DEFAULT_PSEUDONYM_PREFIX);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(Config::from_toml("mapping_stor = \"typo.jsonl\"").is_err());
    }

    #[test]
    fn zero_shift_window_is_invalid() {
        let config = Config {
            max_date_shift_days: 0,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "max_date_shift_days",
                ..
            })
        ));
    }

    #[test]
    fn prefix_must_be_path_safe() {
        let config = Config {
            pseudonym_prefix: "../x".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn prefix_must_not_look_like_a_series_folder() {
        for prefix in ["Series", "Series2"] {
            let config = Config {
                pseudonym_prefix: prefix.to_string(),
                ..Config::default()
            };
            assert!(
                matches!(
                    config.validate(),
                    Err(ConfigError::Invalid {
                        field: "pseudonym_prefix",
                        ..
                    })
                ),
                "{prefix} accepted"
            );
        }
        let config = Config {
            pseudonym_prefix: "SER".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_ok());
    }
}
