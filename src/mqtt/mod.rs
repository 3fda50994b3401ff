//! MQTT 3.1.1 client
//!
//! Just enough of the protocol to receive commands: connect, subscribe,
//! receive PUBLISH (QoS 0 and 1) and keep the connection alive. Publishing,
//! QoS 2, TLS and persistent sessions are not supported.

pub mod client;
pub mod config;
pub mod packet;

pub use client::MqttClient;
pub use config::BrokerConfig;
pub use packet::{Packet, Publish, QoS};
