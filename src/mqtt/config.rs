//! Broker connection configuration

use std::time::Duration;

/// Default MQTT port
pub const DEFAULT_BROKER_PORT: u16 = 1883;

/// Topics the feeder listens on
pub const DEFAULT_TOPICS: [&str; 2] = ["$feeder/feed", "$feeder/topic"];

/// MQTT broker configuration
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Broker host name or address
    pub host: String,

    /// Broker port
    pub port: u16,

    /// Keepalive interval (zero disables pings)
    pub keep_alive: Duration,

    /// Client identifier sent in CONNECT
    pub client_id: String,

    /// Topics subscribed after every connect
    pub topics: Vec<String>,

    /// TCP connect and CONNACK must complete within this time
    pub connect_timeout: Duration,

    /// First delay before reconnecting
    pub reconnect_delay: Duration,

    /// Upper bound for the doubling reconnect delay
    pub max_reconnect_delay: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "192.168.0.5".to_string(),
            port: DEFAULT_BROKER_PORT,
            keep_alive: Duration::from_secs(60),
            client_id: format!("feeder-cam-{}", std::process::id()),
            topics: DEFAULT_TOPICS.iter().map(|t| t.to_string()).collect(),
            connect_timeout: Duration::from_secs(10),
            reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(30),
        }
    }
}

impl BrokerConfig {
    /// Create a config for `host:port` with default settings
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Set keepalive interval
    ///
    /// MQTT carries keepalive as whole seconds; sub-second values round up.
    pub fn keep_alive(mut self, interval: Duration) -> Self {
        self.keep_alive = interval;
        self
    }

    /// Set the client identifier
    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = id.into();
        self
    }

    /// Replace the subscribed topics
    pub fn topics<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.topics = topics.into_iter().map(Into::into).collect();
        self
    }

    /// Set connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the reconnect backoff bounds
    pub fn reconnect_delay(mut self, initial: Duration, max: Duration) -> Self {
        self.reconnect_delay = initial;
        self.max_reconnect_delay = max.max(initial);
        self
    }

    /// Keepalive in whole seconds, as sent in CONNECT
    pub fn keep_alive_secs(&self) -> u16 {
        let secs = self.keep_alive.as_secs() + u64::from(self.keep_alive.subsec_nanos() > 0);
        secs.min(u64::from(u16::MAX)) as u16
    }
}
