//! Configuration for the tail binary.
//!
//! Settings come from an optional YAML file named by `GEOFEED_CONFIG`,
//! then environment overrides are applied on top:
//!
//! | Variable                    | Field               |
//! |-----------------------------|---------------------|
//! | `GEOFEED_URL`               | `address`           |
//! | `GEOFEED_TYPE`              | `type`              |
//! | `GEOFEED_MAX_RETRIES`       | `max_retries`       |
//! | `GEOFEED_RETRY_INTERVAL_MS` | `retry_interval_ms` |
//! | `GEOFEED_BOUNDING_BOX`      | `bounding_box`      |
//! | `GEOFEED_FILTER`            | `filter`            |
//!
//! The bounding box is validated while loading, so a bad box fails at
//! startup rather than after the first connection.

use std::path::Path;

use geofeed_socket::SocketOptions;
use geofeed_types::{BadFormat, BoundingBox, Filter, normalize_filter};
use serde::Deserialize;
use serde_json::Value;

/// Variable holding the path of the YAML file.
pub const CONFIG_PATH_VAR: &str = "GEOFEED_CONFIG";

/// Variable holding the server address.
pub const URL_VAR: &str = "GEOFEED_URL";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// No server address was configured.
    #[error("no server address configured (set `address` or GEOFEED_URL)")]
    MissingAddress,

    /// An environment variable held an unusable value.
    #[error("invalid {name}: {reason}")]
    Invalid {
        /// The offending variable.
        name: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// The configured bounding box failed validation.
    #[error("invalid bounding box: {source}")]
    BoundingBox {
        /// The validation failure.
        #[from]
        source: BadFormat,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Everything the tail binary needs to open and subscribe.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TailConfig {
    /// Server address, with or without the `ws://` scheme.
    #[serde(default)]
    pub address: String,

    /// Retry policy, type tag and initial filter.
    #[serde(flatten)]
    pub socket: SocketOptions,

    /// Box to subscribe to; without one the client just listens.
    #[serde(default)]
    pub bounding_box: Option<BoundingBox>,
}

impl TailConfig {
    /// Load from the process environment.
    ///
    /// # Errors
    ///
    /// See [`TailConfig::load_with`].
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|name| std::env::var(name).ok())
    }

    /// Load using `lookup` to read environment variables.
    ///
    /// Reads the file named by [`CONFIG_PATH_VAR`] if set, applies the
    /// overrides, then checks that an address is present.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed, an
    /// override is malformed, or no address is configured.
    pub fn load_with<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup(CONFIG_PATH_VAR) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_overrides(lookup)?;
        if config.address.trim().is_empty() {
            return Err(ConfigError::MissingAddress);
        }
        Ok(config)
    }

    /// Load configuration from a YAML file on disk.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if it does not parse.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML or the
    /// bounding box is invalid.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Apply `GEOFEED_*` overrides read through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] or [`ConfigError::BoundingBox`] when
    /// a variable is set but unusable.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup(URL_VAR) {
            self.address = val;
        }
        if let Some(val) = lookup("GEOFEED_TYPE") {
            self.socket.type_tag = val;
        }
        if let Some(val) = lookup("GEOFEED_MAX_RETRIES") {
            self.socket.max_retries =
                val.trim().parse().map_err(|e| ConfigError::Invalid {
                    name: "GEOFEED_MAX_RETRIES",
                    reason: format!("{e}"),
                })?;
        }
        if let Some(val) = lookup("GEOFEED_RETRY_INTERVAL_MS") {
            self.socket.retry_interval_ms =
                val.trim().parse().map_err(|e| ConfigError::Invalid {
                    name: "GEOFEED_RETRY_INTERVAL_MS",
                    reason: format!("{e}"),
                })?;
        }
        if let Some(val) = lookup("GEOFEED_BOUNDING_BOX") {
            self.bounding_box = Some(parse_bounding_box(&val)?);
        }
        if let Some(val) = lookup("GEOFEED_FILTER") {
            let filter: Filter =
                serde_json::from_str(&val).map_err(|e| ConfigError::Invalid {
                    name: "GEOFEED_FILTER",
                    reason: format!("{e}"),
                })?;
            self.socket.filter = normalize_filter(filter);
        }
        Ok(())
    }
}

/// Parse `"sw_lon,sw_lat,ne_lon,ne_lat"`.
fn parse_bounding_box(raw: &str) -> Result<BoundingBox, ConfigError> {
    let parts = raw
        .split(',')
        .map(|part| Value::String(part.trim().to_owned()))
        .collect();
    Ok(geofeed_types::check(&Value::Array(parts))?)
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r"
address: ws://localhost:3000/items
type: station
max_retries: 5
retry_interval_ms: 250
filter:
  linked_item: 48
bounding_box: [3.78, 43.55, 4.04, 43.65]
";
        let config = TailConfig::parse(yaml).unwrap();
        assert_eq!(config.address, "ws://localhost:3000/items");
        assert_eq!(config.socket.type_tag, "station");
        assert_eq!(config.socket.max_retries, 5);
        assert_eq!(config.socket.retry_interval_ms, 250);
        assert_eq!(
            config.socket.filter.unwrap().get("linked_item"),
            Some(&serde_json::json!(48))
        );
        assert_eq!(
            config.bounding_box.unwrap().as_array(),
            [3.78, 43.55, 4.04, 43.65]
        );
    }

    #[test]
    fn empty_yaml_uses_socket_defaults() {
        let config = TailConfig::parse("{}").unwrap();
        assert_eq!(config.socket, SocketOptions::default());
        assert!(config.address.is_empty());
        assert!(config.bounding_box.is_none());
    }

    #[test]
    fn yaml_with_invalid_box_is_rejected() {
        let yaml = "bounding_box: [3.78, 43.65, 4.04, 43.55]";
        assert!(matches!(
            TailConfig::parse(yaml),
            Err(ConfigError::Yaml { .. })
        ));
    }

    #[test]
    fn env_only_configuration() {
        let config = TailConfig::load_with(env(&[
            ("GEOFEED_URL", "localhost:3000"),
            ("GEOFEED_TYPE", "sensor"),
            ("GEOFEED_MAX_RETRIES", "3"),
            ("GEOFEED_RETRY_INTERVAL_MS", "40"),
            ("GEOFEED_BOUNDING_BOX", "3.78, 43.55, 4.04, 43.65"),
            ("GEOFEED_FILTER", r#"{"linked_item": 34}"#),
        ]))
        .unwrap();
        assert_eq!(config.address, "localhost:3000");
        assert_eq!(config.socket.type_tag, "sensor");
        assert_eq!(config.socket.max_retries, 3);
        assert_eq!(config.socket.retry_interval_ms, 40);
        assert_eq!(
            config.bounding_box.unwrap().as_array(),
            [3.78, 43.55, 4.04, 43.65]
        );
        assert!(config.socket.filter.is_some());
    }

    #[test]
    fn overrides_replace_file_values() {
        let mut config = TailConfig::parse("address: ws://a\ntype: station\n").unwrap();
        config
            .apply_overrides(env(&[("GEOFEED_URL", "ws://b")]))
            .unwrap();
        assert_eq!(config.address, "ws://b");
        assert_eq!(config.socket.type_tag, "station");
    }

    #[test]
    fn missing_address_is_an_error() {
        assert!(matches!(
            TailConfig::load_with(env(&[])),
            Err(ConfigError::MissingAddress)
        ));
    }

    #[test]
    fn unreadable_file_is_an_io_error() {
        let result = TailConfig::load_with(env(&[
            ("GEOFEED_CONFIG", "/nonexistent/geofeed.yaml"),
            ("GEOFEED_URL", "ws://localhost"),
        ]));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn malformed_numbers_name_the_variable() {
        let err = TailConfig::load_with(env(&[
            ("GEOFEED_URL", "ws://localhost"),
            ("GEOFEED_MAX_RETRIES", "many"),
        ]))
        .unwrap_err();
        assert!(err.to_string().starts_with("invalid GEOFEED_MAX_RETRIES"));
    }

    #[test]
    fn malformed_env_box_reports_the_problem() {
        let err = TailConfig::load_with(env(&[
            ("GEOFEED_URL", "ws://localhost"),
            ("GEOFEED_BOUNDING_BOX", "1,2,3"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::BoundingBox { .. }));
    }

    #[test]
    fn empty_filter_clears_the_configured_one() {
        let mut config = TailConfig::parse("filter:\n  linked_item: 48\n").unwrap();
        assert!(config.socket.filter.is_some());
        config
            .apply_overrides(env(&[("GEOFEED_FILTER", "{}")]))
            .unwrap();
        assert_eq!(config.socket.filter, None);
    }

    #[test]
    fn empty_yaml_filter_reads_as_none() {
        let config = TailConfig::parse("filter: {}\n").unwrap();
        assert_eq!(config.socket.filter, None);
    }

    #[test]
    fn malformed_filter_is_rejected() {
        let err = TailConfig::load_with(env(&[
            ("GEOFEED_URL", "ws://localhost"),
            ("GEOFEED_FILTER", "[1, 2]"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                name: "GEOFEED_FILTER",
                ..
            }
        ));
    }
}
