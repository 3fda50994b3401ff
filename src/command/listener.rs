//! Broker command listener
//!
//! Keeps an MQTT connection open for the life of the process, re-subscribing
//! after every (re)connect, and turns matching messages into [`Actuator`]
//! calls. Failures only ever delay command delivery; the video path is never
//! touched.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{MqttError, Result};
use crate::mqtt::{BrokerConfig, MqttClient, Packet, QoS};

use super::actuator::Actuator;
use super::event::{Command, CommandEvent};

/// Long-running MQTT command consumer
pub struct CommandListener<A> {
    config: BrokerConfig,
    actuator: Arc<A>,
}

impl<A: Actuator> CommandListener<A> {
    pub fn new(config: BrokerConfig, actuator: Arc<A>) -> Self {
        Self { config, actuator }
    }

    /// Connect, serve and reconnect forever
    pub async fn run(&self) {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Connect, serve and reconnect until `shutdown` resolves
    ///
    /// A live broker connection is closed with DISCONNECT on shutdown.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: std::future::Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut backoff = Backoff::new(self.config.reconnect_delay, self.config.max_reconnect_delay);

        loop {
            let connected = tokio::select! {
                result = MqttClient::connect(&self.config) => Some(result),
                _ = &mut shutdown => None,
            };

            match connected {
                None => break,
                Some(Ok(mut client)) => {
                    backoff.reset();

                    let served = tokio::select! {
                        result = self.serve(&mut client) => Some(result),
                        _ = &mut shutdown => None,
                    };

                    match served {
                        None => {
                            if let Err(e) = client.disconnect().await {
                                tracing::debug!(error = %e, "Failed to send DISCONNECT");
                            }
                            break;
                        }
                        Some(Err(e)) => {
                            tracing::warn!(
                                host = %self.config.host,
                                port = self.config.port,
                                error = %e,
                                "Broker connection lost"
                            );
                        }
                        Some(Ok(())) => {}
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!(
                        host = %self.config.host,
                        port = self.config.port,
                        error = %e,
                        "Failed to connect to broker"
                    );
                }
            }

            let delay = backoff.next_delay();
            tracing::debug!(delay_ms = delay.as_millis() as u64, "Reconnecting to broker");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = &mut shutdown => break,
            }
        }

        tracing::debug!("Command listener stopped");
    }

    /// Subscribe and process messages until the connection fails
    async fn serve(&self, client: &mut MqttClient) -> Result<()> {
        // Subscriptions do not survive a reconnect (clean session)
        let subscribe_id = client.subscribe(&self.config.topics, QoS::AtMostOnce).await?;

        loop {
            match client.poll().await? {
                Packet::Publish(publish) => {
                    if let (QoS::AtLeastOnce, Some(id)) = (publish.qos, publish.packet_id) {
                        client.ack(id).await?;
                    }
                    self.dispatch(&CommandEvent::from(publish)).await;
                }
                Packet::SubAck(ack) => {
                    if ack.is_rejected() {
                        return Err(MqttError::SubscriptionRejected(ack.packet_id).into());
                    }
                    if ack.packet_id == subscribe_id {
                        tracing::info!(topics = ?self.config.topics, "Subscribed to command topics");
                    }
                }
                other => {
                    tracing::debug!(packet_type = other.packet_type(), "Ignoring packet");
                }
            }
        }
    }

    /// Apply the payload rule to one event and invoke the matching hook
    pub async fn dispatch(&self, event: &CommandEvent) -> Option<Command> {
        tracing::info!(
            topic = %event.topic,
            payload = %String::from_utf8_lossy(&event.payload),
            "Command message received"
        );

        let command = event.command();
        match command {
            Some(Command::Feed) => self.actuator.feed().await,
            Some(Command::Secondary) => self.actuator.secondary().await,
            None => tracing::debug!(topic = %event.topic, "Payload is not a command"),
        }
        command
    }
}

/// Doubling reconnect delay
#[derive(Debug)]
struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    fn reset(&mut self) {
        self.current = self.initial;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Default)]
    struct Counter {
        feeds: AtomicUsize,
        secondary: AtomicUsize,
    }

    impl Actuator for Counter {
        async fn feed(&self) {
            self.feeds.fetch_add(1, Ordering::SeqCst);
        }

        async fn secondary(&self) {
            self.secondary.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_dispatch_counts() {
        let actuator = Arc::new(Counter::default());
        let listener = CommandListener::new(BrokerConfig::default(), Arc::clone(&actuator));

        let events = [
            ("$feeder/feed", "hi"),
            ("$feeder/topic", "yes!"),
            ("$feeder/feed", "hi"),
            ("$feeder/feed", "hello"),
            ("$feeder/topic", "yes"),
        ];
        for (topic, payload) in events {
            listener.dispatch(&CommandEvent::new(topic, payload)).await;
        }

        assert_eq!(actuator.feeds.load(Ordering::SeqCst), 2);
        assert_eq!(actuator.secondary.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dispatch_ignores_topic() {
        let actuator = Arc::new(Counter::default());
        let listener = CommandListener::new(BrokerConfig::default(), Arc::clone(&actuator));

        let command = listener.dispatch(&CommandEvent::new("anything", "hi")).await;
        assert_eq!(command, Some(Command::Feed));
        assert_eq!(actuator.feeds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(5));

        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
        assert_eq!(backoff.next_delay(), Duration::from_secs(4));
        assert_eq!(backoff.next_delay(), Duration::from_secs(5));
        assert_eq!(backoff.next_delay(), Duration::from_secs(5));

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }
}
