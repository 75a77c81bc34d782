//! Listener configuration.
//!
//! Read from an optional TOML file; every key may be omitted. IDs of `0` mean
//! "don't care", as they do on the command line.
//!
//! ```toml
//! usage_page = 0xFF31
//! usage = 0x74
//! read_timeout_ms = 200
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::matching::MatchCriteria;
use crate::{DEBUG_USAGE, DEBUG_USAGE_PAGE, DEFAULT_REPORT_SIZE};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ListenConfig {
    pub vendor_id: u16,
    pub product_id: u16,
    pub usage_page: u16,
    pub usage: u16,
    /// Upper bound for each read, in milliseconds.
    pub read_timeout_ms: u64,
    /// Delay between open attempts while no device is present.
    pub poll_interval_ms: u64,
    /// Buffer capacity handed to each read.
    pub report_size: usize,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            vendor_id: 0,
            product_id: 0,
            usage_page: DEBUG_USAGE_PAGE,
            usage: DEBUG_USAGE,
            read_timeout_ms: 200,
            poll_interval_ms: 1000,
            report_size: DEFAULT_REPORT_SIZE,
        }
    }
}

impl ListenConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn criteria(&self) -> MatchCriteria {
        MatchCriteria::new(self.vendor_id, self.product_id, self.usage_page, self.usage)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_listen_for_debug_interface() {
        let config = ListenConfig::from_toml_str("").unwrap();
        assert_eq!(config, ListenConfig::default());
        assert_eq!(
            config.criteria(),
            MatchCriteria::any().usage_page(0xff31).usage(0x74)
        );
        assert_eq!(config.read_timeout(), Duration::from_millis(200));
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.report_size, 64);
    }

    #[test]
    fn partial_file() {
        let config = ListenConfig::from_toml_str(
            r#"
            vendor_id = 0x16C0
            usage = 0
            read_timeout_ms = 50
            "#,
        )
        .unwrap();
        assert_eq!(config.vendor_id, 0x16c0);
        assert_eq!(config.read_timeout_ms, 50);
        assert_eq!(
            config.criteria(),
            MatchCriteria::any().vendor_id(0x16c0).usage_page(0xff31)
        );
    }

    #[test]
    fn unknown_key_is_an_error() {
        let err = ListenConfig::from_toml_str("vendorid = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn out_of_range_id_is_an_error() {
        assert!(ListenConfig::from_toml_str("usage_page = 0x10000").is_err());
    }

    #[test]
    fn missing_file() {
        let err = ListenConfig::load(Path::new("/nonexistent/hid_listen.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
