//! Error taxonomy for config validation and topology reconciliation.
//! Grounded on `app/conf.go`'s `checkAndFillConfig`, which returns a plain
//! `error` built from `fmt.Errorf` at each validation failure site.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    ConfigInvalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigInvalid(msg) => write!(f, "config invalid: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}
