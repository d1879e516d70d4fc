//! Centralized server configuration.
//!
//! Loaded via the `config` crate from environment variables, with `__`
//! separating nested sections (`NATS__URL`, `RETRY__MAX_ATTEMPTS`, ...).

use flowhook_flow::nats::NatsConfig;
use flowhook_flow::{BusConfig, RetryPolicy};
use serde::Deserialize;
use std::time::Duration;

/// Server configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// PostgreSQL database connection URL.
    pub database_url: String,

    /// NATS connection and stream settings.
    #[serde(default)]
    pub nats: NatsSettings,

    /// Event metadata attached to derived events.
    #[serde(default)]
    pub bus: BusConfig,

    /// Outbound HTTP settings.
    #[serde(default)]
    pub http: HttpConfig,

    /// Retry policy for provider calls and publishes.
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Action consumer settings.
    #[serde(default)]
    pub actions: ActionsConfig,
}

fn default_listen_addr() -> String {
    "0.0.0.0:3000".to_string()
}

/// NATS settings.
#[derive(Debug, Clone, Deserialize)]
pub struct NatsSettings {
    /// NATS server URL.
    #[serde(default = "default_nats_url")]
    pub url: String,

    /// Stream name; defaults to the event bus name.
    #[serde(default)]
    pub stream_name: Option<String>,

    /// Subject prefix for derived events.
    #[serde(default)]
    pub subject_prefix: Option<String>,

    /// Durable consumer name for the action consumer.
    #[serde(default = "default_consumer_name")]
    pub consumer_name: String,
}

fn default_nats_url() -> String {
    "nats://localhost:4222".to_string()
}

fn default_consumer_name() -> String {
    "flowhook-actions".to_string()
}

impl Default for NatsSettings {
    fn default() -> Self {
        Self {
            url: default_nats_url(),
            stream_name: None,
            subject_prefix: None,
            consumer_name: default_consumer_name(),
        }
    }
}

impl NatsSettings {
    /// Connection settings for the event bus.
    #[must_use]
    pub fn bus_config(&self) -> NatsConfig {
        NatsConfig {
            url: self.url.clone(),
            subject_prefix: self.subject_prefix.clone(),
        }
    }

    /// The stream to publish to, falling back to `event_bus_name`.
    #[must_use]
    pub fn stream_name<'a>(&'a self, bus: &'a BusConfig) -> &'a str {
        self.stream_name
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(&bus.event_bus_name)
    }
}

/// Outbound HTTP settings.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Timeout applied to every provider and token call, in seconds.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_timeout_seconds() -> u64 {
    10
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl HttpConfig {
    /// The timeout as a duration.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Settings of the consumer that feeds derived events back into the action
/// entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ActionsConfig {
    /// Whether the consumer runs.
    #[serde(default = "default_actions_enabled")]
    pub enabled: bool,

    /// Consumer API this service answers to.
    #[serde(default = "default_consumer_api")]
    pub consumer_api: String,

    /// How long the bus waits for an ack before redelivering, in seconds.
    /// Handling extends it while a message is still being worked on.
    #[serde(default = "default_ack_wait_seconds")]
    pub ack_wait_seconds: u64,
}

fn default_actions_enabled() -> bool {
    true
}

fn default_consumer_api() -> String {
    "gitlabV4Handler".to_string()
}

fn default_ack_wait_seconds() -> u64 {
    30
}

impl Default for ActionsConfig {
    fn default() -> Self {
        Self {
            enabled: default_actions_enabled(),
            consumer_api: default_consumer_api(),
            ack_wait_seconds: default_ack_wait_seconds(),
        }
    }
}

impl ActionsConfig {
    /// The ack wait as a duration; never below one second.
    #[must_use]
    pub fn ack_wait(&self) -> Duration {
        Duration::from_secs(self.ack_wait_seconds.max(1))
    }
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sections_have_defaults() {
        let http = HttpConfig::default();
        assert_eq!(http.timeout(), Duration::from_secs(10));

        let actions = ActionsConfig::default();
        assert!(actions.enabled);
        assert_eq!(actions.consumer_api, "gitlabV4Handler");
        assert_eq!(actions.ack_wait(), Duration::from_secs(30));

        let nats = NatsSettings::default();
        assert_eq!(nats.url, "nats://localhost:4222");
        assert_eq!(nats.consumer_name, "flowhook-actions");
    }

    #[test]
    fn stream_name_falls_back_to_bus_name() {
        let bus = BusConfig::default();
        let mut nats = NatsSettings::default();
        assert_eq!(nats.stream_name(&bus), "FLOWHOOK_EVENTS");

        nats.stream_name = Some("CUSTOM".to_string());
        assert_eq!(nats.stream_name(&bus), "CUSTOM");
    }

    #[test]
    fn loads_nested_sections_from_a_source() {
        let config: ServerConfig = config::Config::builder()
            .set_override("database_url", "postgres://localhost/flowhook")
            .and_then(|b| b.set_override("retry.max_attempts", 3))
            .and_then(|b| b.set_override("actions.consumer_api", "customHandler"))
            .and_then(|b| b.set_override("actions.ack_wait_seconds", 0))
            .expect("overrides")
            .build()
            .expect("build")
            .try_deserialize()
            .expect("deserialize");

        assert_eq!(config.listen_addr, "0.0.0.0:3000");
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.backoff_millis, 200);
        assert_eq!(config.actions.consumer_api, "customHandler");
        assert_eq!(config.actions.ack_wait(), Duration::from_secs(1));
        assert_eq!(config.bus, BusConfig::default());
    }
}
