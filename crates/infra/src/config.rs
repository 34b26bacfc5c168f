//! Configuration loading and representation.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// Runtime knobs for a ledger deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Cap on the size of one account's recipient set (`None` = unlimited).
    pub max_recipients: Option<usize>,
    /// Whether committed events are published to the notification bus.
    pub publish_notifications: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_recipients: None,
            publish_notifications: true,
        }
    }
}

impl LedgerConfig {
    pub const MAX_RECIPIENTS_VAR: &'static str = "SPLITTER_MAX_RECIPIENTS";
    pub const BUS_PUBLISH_VAR: &'static str = "SPLITTER_BUS_PUBLISH";

    /// Load from the process environment, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load from an arbitrary variable source (tests, embedded hosts).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(raw) = lookup(Self::MAX_RECIPIENTS_VAR) {
            let raw = raw.trim();
            if !raw.is_empty() {
                let limit = raw.parse::<usize>().map_err(|_| ConfigError::Invalid {
                    var: Self::MAX_RECIPIENTS_VAR,
                    value: raw.to_string(),
                    reason: "expected a positive integer",
                })?;
                if limit == 0 {
                    return Err(ConfigError::Invalid {
                        var: Self::MAX_RECIPIENTS_VAR,
                        value: raw.to_string(),
                        reason: "limit must be at least 1",
                    });
                }
                config.max_recipients = Some(limit);
            }
        }

        if let Some(raw) = lookup(Self::BUS_PUBLISH_VAR) {
            config.publish_notifications = match raw.trim().to_ascii_lowercase().as_str() {
                "" | "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                _ => {
                    return Err(ConfigError::Invalid {
                        var: Self::BUS_PUBLISH_VAR,
                        value: raw,
                        reason: "expected true or false",
                    });
                }
            };
        }

        Ok(config)
    }
}
