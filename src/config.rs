//! Configuration types for ordered-loader

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};

/// Placeholder replaced by the URL-encoded item id in [`ResourceConfig::item_template`]
pub const ITEM_ID_PLACEHOLDER: &str = "{id}";

/// Transport settings (where and how resources are requested)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Base URL that resource names are resolved against (default: "http://localhost:8080/")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout: default_request_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// Resource naming
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Resource name of the container (default: "story")
    #[serde(default = "default_container")]
    pub container: String,

    /// Resource name template for items (default: "chapter?id={id}")
    #[serde(default = "default_item_template")]
    pub item_template: String,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            container: default_container(),
            item_template: default_item_template(),
        }
    }
}

impl ResourceConfig {
    /// Resource name for one item, with the id URL-encoded
    ///
    /// # Example
    ///
    /// ```
    /// use ordered_loader::config::ResourceConfig;
    ///
    /// let resources = ResourceConfig::default();
    /// assert_eq!(resources.item_resource("chapter 1"), "chapter?id=chapter%201");
    /// ```
    pub fn item_resource(&self, id: &str) -> String {
        self.item_template
            .replace(ITEM_ID_PLACEHOLDER, &urlencoding::encode(id))
    }
}

/// Loading indicator settings
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Minimum time in milliseconds the loading indicator stays visible once shown (default: 1000 ms)
    #[serde(default = "default_min_visible", with = "duration_millis_serde")]
    pub min_visible: Duration,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            min_visible: default_min_visible(),
        }
    }
}

/// Event channel settings
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventConfig {
    /// Broadcast channel capacity (default: 1000)
    ///
    /// Subscribers that fall further behind than this miss events.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Main configuration for ordered-loader
///
/// Fields are organized into logical sub-configs:
/// - [`transport`](TransportConfig) - base URL, timeout, user agent
/// - [`resources`](ResourceConfig) - container name and item name template
/// - [`loader`](LoaderConfig) - minimum visible duration of the loading indicator
/// - [`events`](EventConfig) - event channel sizing
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Transport settings
    #[serde(default)]
    pub transport: TransportConfig,

    /// Resource naming
    #[serde(default)]
    pub resources: ResourceConfig,

    /// Loading indicator settings
    #[serde(default)]
    pub loader: LoaderConfig,

    /// Event channel settings
    #[serde(default)]
    pub events: EventConfig,
}

impl Config {
    /// Parse a configuration document, filling omitted fields with defaults
    ///
    /// The result is validated before it is returned.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values that cannot work
    pub fn validate(&self) -> Result<()> {
        let base_url = url::Url::parse(&self.transport.base_url).map_err(|e| {
            Error::config(
                "transport.base_url",
                format!("invalid base URL '{}': {}", self.transport.base_url, e),
            )
        })?;

        // Resource names are joined onto the base; without the slash the last segment is replaced
        if !base_url.path().ends_with('/') {
            return Err(Error::config(
                "transport.base_url",
                format!(
                    "base URL '{}' must end with '/'",
                    self.transport.base_url
                ),
            ));
        }

        if self.transport.request_timeout.is_zero() {
            return Err(Error::config(
                "transport.request_timeout",
                "request timeout must be greater than zero",
            ));
        }

        if self.resources.container.trim().is_empty() {
            return Err(Error::config(
                "resources.container",
                "container resource name must not be empty",
            ));
        }

        if !self.resources.item_template.contains(ITEM_ID_PLACEHOLDER) {
            return Err(Error::config(
                "resources.item_template",
                format!(
                    "item template '{}' must contain {}",
                    self.resources.item_template, ITEM_ID_PLACEHOLDER
                ),
            ));
        }

        if self.events.channel_capacity == 0 {
            return Err(Error::config(
                "events.channel_capacity",
                "event channel capacity must be greater than zero",
            ));
        }

        Ok(())
    }
}

fn default_base_url() -> String {
    "http://localhost:8080/".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    concat!("ordered-loader/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_container() -> String {
    "story".to_string()
}

fn default_item_template() -> String {
    "chapter?id={id}".to_string()
}

fn default_min_visible() -> Duration {
    Duration::from_millis(1000)
}

fn default_channel_capacity() -> usize {
    1000
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Millisecond Duration serialization helper
mod duration_millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
