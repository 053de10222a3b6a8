//! Connection target and retry configuration.
//!
//! [`SocketOptions`] mirrors the options a caller (or a YAML file) can set.
//! Every field is defaulted so an empty mapping is a valid configuration.
//! At construction the options are frozen into an [`Endpoint`], which never
//! changes for the lifetime of the socket.

use std::time::Duration;

use geofeed_types::{Filter, normalize_filter};
use serde::{Deserialize, Deserializer};

/// `max_retries` value meaning "retry forever".
pub const INFINITE_RETRIES: u32 = 0;

/// Default delay between reconnect attempts, in milliseconds.
pub const DEFAULT_RETRY_INTERVAL_MS: u64 = 1000;

/// Caller-facing socket options.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SocketOptions {
    /// Maximum reconnect attempts before giving up (0 = infinite).
    #[serde(default)]
    pub max_retries: u32,

    /// Fixed delay between reconnect attempts, in milliseconds.
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,

    /// Initial content filter. An empty mapping reads as no filter.
    #[serde(default, deserialize_with = "deserialize_filter")]
    pub filter: Option<Filter>,

    /// Free-form type tag forwarded on every protocol message.
    #[serde(default, rename = "type")]
    pub type_tag: String,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            max_retries: INFINITE_RETRIES,
            retry_interval_ms: DEFAULT_RETRY_INTERVAL_MS,
            filter: None,
            type_tag: String::new(),
        }
    }
}

impl SocketOptions {
    /// Set the maximum number of reconnect attempts (0 = infinite).
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the delay between reconnect attempts.
    #[must_use]
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the initial content filter.
    #[must_use]
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = normalize_filter(filter);
        self
    }

    /// Set the type tag forwarded on every message.
    #[must_use]
    pub fn with_type(mut self, type_tag: impl Into<String>) -> Self {
        self.type_tag = type_tag.into();
        self
    }

    /// The retry policy described by these options.
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            retry_interval: Duration::from_millis(self.retry_interval_ms),
        }
    }
}

fn default_retry_interval_ms() -> u64 {
    DEFAULT_RETRY_INTERVAL_MS
}

fn deserialize_filter<'de, D>(deserializer: D) -> Result<Option<Filter>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Filter>::deserialize(deserializer)?.and_then(normalize_filter))
}

/// Fixed-delay retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum reconnect attempts (0 = infinite).
    pub max_retries: u32,
    /// Delay before each reconnect attempt.
    pub retry_interval: Duration,
}

impl RetryPolicy {
    /// Whether another attempt is allowed after `retries_done` attempts.
    pub const fn allows(&self, retries_done: u32) -> bool {
        self.max_retries == INFINITE_RETRIES || retries_done < self.max_retries
    }

    /// Whether this policy never gives up.
    pub const fn is_infinite(&self) -> bool {
        self.max_retries == INFINITE_RETRIES
    }
}

/// Immutable connection target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    address: String,
    type_tag: String,
    retry: RetryPolicy,
}

impl Endpoint {
    /// Freeze an address and options into an endpoint.
    pub fn new(address: impl Into<String>, options: &SocketOptions) -> Self {
        Self {
            address: address.into(),
            type_tag: options.type_tag.clone(),
            retry: options.retry_policy(),
        }
    }

    /// The URL the transport connects to.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// The type tag forwarded on every message.
    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    /// The retry policy.
    pub const fn retry(&self) -> RetryPolicy {
        self.retry
    }
}
