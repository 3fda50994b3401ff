//! Minimal MQTT client connection
//!
//! One TCP connection to the broker: CONNECT/CONNACK on open, SUBSCRIBE on
//! request, then a receive loop that keeps the session alive with PINGREQ
//! whenever nothing has been sent for the keepalive interval.

use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::Instant;

use crate::error::{Error, MqttError, Result};

use super::config::BrokerConfig;
use super::packet::{Connect, Packet, QoS, Subscribe};

/// Connected MQTT client
pub struct MqttClient {
    stream: TcpStream,
    read_buf: BytesMut,
    write_buf: BytesMut,
    next_packet_id: u16,
    keep_alive: Duration,
    last_sent: Instant,
    ping_outstanding: bool,
}

impl MqttClient {
    /// Connect to the broker and complete the CONNECT/CONNACK exchange
    pub async fn connect(config: &BrokerConfig) -> Result<Self> {
        let addr = (config.host.as_str(), config.port);
        let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::Timeout("broker connect"))??;
        stream.set_nodelay(true)?;

        let keep_alive_secs = config.keep_alive_secs();
        let mut client = Self {
            stream,
            read_buf: BytesMut::with_capacity(4096),
            write_buf: BytesMut::with_capacity(256),
            next_packet_id: 1,
            keep_alive: Duration::from_secs(u64::from(keep_alive_secs)),
            last_sent: Instant::now(),
            ping_outstanding: false,
        };

        client
            .send(&Packet::Connect(Connect {
                client_id: config.client_id.clone(),
                keep_alive: keep_alive_secs,
                clean_session: true,
            }))
            .await?;

        let reply = tokio::time::timeout(config.connect_timeout, client.read_packet())
            .await
            .map_err(|_| Error::Timeout("broker CONNACK"))??;

        match reply {
            Packet::ConnAck { return_code: 0, .. } => {
                tracing::info!(
                    host = %config.host,
                    port = config.port,
                    client_id = %config.client_id,
                    "Connected to broker"
                );
                Ok(client)
            }
            Packet::ConnAck { return_code, .. } => {
                Err(MqttError::ConnectionRefused(return_code).into())
            }
            other => Err(MqttError::UnexpectedPacket(other.packet_type()).into()),
        }
    }

    /// Send SUBSCRIBE for `topics`
    ///
    /// Returns the packet ID; the matching SUBACK arrives through
    /// [`poll`](Self::poll).
    pub async fn subscribe(&mut self, topics: &[String], qos: QoS) -> Result<u16> {
        let packet_id = self.allocate_packet_id();
        let subscribe = Subscribe {
            packet_id,
            topics: topics.iter().map(|t| (t.clone(), qos)).collect(),
        };
        self.send(&Packet::Subscribe(subscribe)).await?;

        tracing::debug!(packet_id = packet_id, topics = ?topics, "Subscribe sent");
        Ok(packet_id)
    }

    /// Acknowledge a QoS 1 message
    pub async fn ack(&mut self, packet_id: u16) -> Result<()> {
        self.send(&Packet::PubAck { packet_id }).await
    }

    /// Wait for the next packet from the broker, handling keepalive
    ///
    /// PINGRESP is consumed here and never returned.
    pub async fn poll(&mut self) -> Result<Packet> {
        loop {
            if self.keep_alive.is_zero() {
                return self.read_packet().await;
            }

            let deadline = self.last_sent + self.keep_alive;
            match tokio::time::timeout_at(deadline, self.read_packet()).await {
                Ok(packet) => match packet? {
                    Packet::PingResp => {
                        self.ping_outstanding = false;
                        tracing::trace!("PINGRESP received");
                    }
                    packet => return Ok(packet),
                },
                Err(_) => {
                    if self.ping_outstanding {
                        return Err(MqttError::KeepAliveTimeout.into());
                    }
                    self.send(&Packet::PingReq).await?;
                    self.ping_outstanding = true;
                    tracing::trace!("PINGREQ sent");
                }
            }
        }
    }

    /// Send DISCONNECT and close the connection
    pub async fn disconnect(mut self) -> Result<()> {
        self.send(&Packet::Disconnect).await?;
        self.stream.shutdown().await?;
        Ok(())
    }

    /// Encode and write one packet
    pub async fn send(&mut self, packet: &Packet) -> Result<()> {
        self.write_buf.clear();
        packet.encode(&mut self.write_buf);
        self.stream.write_all(&self.write_buf).await?;
        self.last_sent = Instant::now();
        Ok(())
    }

    /// Read one packet
    ///
    /// Cancel-safe: partial data stays in the read buffer.
    pub async fn read_packet(&mut self) -> Result<Packet> {
        loop {
            if let Some(packet) = Packet::decode(&mut self.read_buf)? {
                return Ok(packet);
            }

            let n = self.stream.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                return Err(MqttError::ConnectionClosed.into());
            }
        }
    }

    fn allocate_packet_id(&mut self) -> u16 {
        let id = self.next_packet_id;
        // Packet ID 0 is not allowed
        self.next_packet_id = self.next_packet_id.checked_add(1).unwrap_or(1);
        id
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;
    use crate::mqtt::packet::Publish;

    async fn read_one(socket: &mut TcpStream, buf: &mut BytesMut) -> Packet {
        loop {
            if let Some(packet) = Packet::decode(buf).unwrap() {
                return packet;
            }
            let n = socket.read_buf(buf).await.unwrap();
            assert!(n > 0, "client closed the connection");
        }
    }

    async fn send(socket: &mut TcpStream, packet: Packet) {
        let mut buf = BytesMut::new();
        packet.encode(&mut buf);
        socket.write_all(&buf).await.unwrap();
    }

    async fn broker() -> (TcpListener, BrokerConfig) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let config = BrokerConfig::new("127.0.0.1", port).client_id("unit");
        (listener, config)
    }

    #[tokio::test]
    async fn test_connect_refused_by_broker() {
        let (listener, config) = broker().await;

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = BytesMut::new();
            let _ = read_one(&mut socket, &mut buf).await;
            send(
                &mut socket,
                Packet::ConnAck {
                    session_present: false,
                    return_code: 5,
                },
            )
            .await;
        });

        let result = MqttClient::connect(&config).await;
        assert!(matches!(
            result,
            Err(Error::Mqtt(MqttError::ConnectionRefused(5)))
        ));
    }

    #[tokio::test]
    async fn test_keepalive_ping() {
        let (listener, config) = broker().await;
        let config = config.keep_alive(Duration::from_secs(1));

        let broker = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = BytesMut::new();

            match read_one(&mut socket, &mut buf).await {
                Packet::Connect(connect) => {
                    assert_eq!(connect.client_id, "unit");
                    assert_eq!(connect.keep_alive, 1);
                    assert!(connect.clean_session);
                }
                other => panic!("expected CONNECT, got {:?}", other),
            }
            send(
                &mut socket,
                Packet::ConnAck {
                    session_present: false,
                    return_code: 0,
                },
            )
            .await;

            assert_eq!(read_one(&mut socket, &mut buf).await, Packet::PingReq);
            send(&mut socket, Packet::PingResp).await;
            send(&mut socket, Packet::Publish(Publish::new("t", "hi"))).await;
        });

        let mut client = MqttClient::connect(&config).await.unwrap();
        let packet = tokio::time::timeout(Duration::from_secs(5), client.poll())
            .await
            .unwrap()
            .unwrap();

        match packet {
            Packet::Publish(publish) => assert_eq!(&publish.payload[..], b"hi"),
            other => panic!("expected PUBLISH, got {:?}", other),
        }
        broker.await.unwrap();
    }

    #[tokio::test]
    async fn test_broker_close_is_error() {
        let (listener, config) = broker().await;

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = BytesMut::new();
            let _ = read_one(&mut socket, &mut buf).await;
            send(
                &mut socket,
                Packet::ConnAck {
                    session_present: false,
                    return_code: 0,
                },
            )
            .await;
            // Dropping the socket closes the connection
        });

        let mut client = MqttClient::connect(&config).await.unwrap();
        assert!(matches!(
            client.poll().await,
            Err(Error::Mqtt(MqttError::ConnectionClosed))
        ));
    }
}
