use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::i18n::Language;
use crate::{DEFAULT_TOAST_DURATION_MS, MAX_MESSAGE_LENGTH};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config json: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid value for {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub toast_duration_ms: u64,
    /// Fixed UI language. When unset, `locale` decides.
    pub language: Option<Language>,
    pub locale: Option<String>,
    pub max_message_length: usize,
    /// Show a toast when an operation is rejected locally.
    pub toast_on_rejection: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            toast_duration_ms: DEFAULT_TOAST_DURATION_MS,
            language: None,
            locale: None,
            max_message_length: MAX_MESSAGE_LENGTH,
            toast_on_rejection: true,
        }
    }
}

impl Config {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.toast_duration_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "toast_duration_ms",
                reason: "must be greater than zero",
            });
        }
        if self.max_message_length == 0 {
            return Err(ConfigError::Invalid {
                field: "max_message_length",
                reason: "must be greater than zero",
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn toast_duration(&self) -> Duration {
        Duration::from_millis(self.toast_duration_ms)
    }

    #[must_use]
    pub fn initial_language(&self) -> Language {
        self.language.unwrap_or_else(|| {
            self.locale
                .as_deref()
                .map(Language::from_locale)
                .unwrap_or_default()
        })
    }
}
