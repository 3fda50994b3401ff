//! MQTT 3.1.1 packet codec
//!
//! Covers the control packets a subscribe-only client exchanges with a
//! broker. Every packet starts with a fixed header:
//!
//! ```text
//! +-------------+-------------+--------------------+
//! | type (4 bit)| flags(4 bit)| remaining length   |  1-4 bytes, 7 bits each,
//! +-------------+-------------+--------------------+  MSB = continuation
//! | variable header + payload (remaining length bytes)
//! +------------------------------------------------
//! ```
//!
//! Reference: MQTT Version 3.1.1, Section 2

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::MqttError;

/// Largest packet accepted from the broker (1MB)
pub const MAX_PACKET_SIZE: usize = 1024 * 1024;

const PROTOCOL_NAME: &str = "MQTT";
const PROTOCOL_LEVEL: u8 = 4;

/// Control packet type codes (upper nibble of the first byte)
pub mod packet_type {
    pub const CONNECT: u8 = 1;
    pub const CONNACK: u8 = 2;
    pub const PUBLISH: u8 = 3;
    pub const PUBACK: u8 = 4;
    pub const SUBSCRIBE: u8 = 8;
    pub const SUBACK: u8 = 9;
    pub const PINGREQ: u8 = 12;
    pub const PINGRESP: u8 = 13;
    pub const DISCONNECT: u8 = 14;
}

/// SUBACK return code for a rejected subscription
pub const SUBACK_FAILURE: u8 = 0x80;

/// Delivery guarantee
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QoS {
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl QoS {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(QoS::AtMostOnce),
            1 => Some(QoS::AtLeastOnce),
            2 => Some(QoS::ExactlyOnce),
            _ => None,
        }
    }
}

/// CONNECT packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connect {
    pub client_id: String,
    /// Keepalive in seconds (0 = disabled)
    pub keep_alive: u16,
    pub clean_session: bool,
}

/// PUBLISH packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publish {
    pub topic: String,
    pub payload: Bytes,
    pub qos: QoS,
    /// Present for QoS 1 and 2
    pub packet_id: Option<u16>,
    pub retain: bool,
    pub dup: bool,
}

impl Publish {
    /// QoS 0 message
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos: QoS::AtMostOnce,
            packet_id: None,
            retain: false,
            dup: false,
        }
    }
}

/// SUBSCRIBE packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscribe {
    pub packet_id: u16,
    pub topics: Vec<(String, QoS)>,
}

/// SUBACK packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubAck {
    pub packet_id: u16,
    /// Granted QoS per topic, or [`SUBACK_FAILURE`]
    pub return_codes: Vec<u8>,
}

impl SubAck {
    pub fn is_rejected(&self) -> bool {
        self.return_codes.contains(&SUBACK_FAILURE)
    }
}

/// MQTT control packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Connect(Connect),
    ConnAck { session_present: bool, return_code: u8 },
    Publish(Publish),
    PubAck { packet_id: u16 },
    Subscribe(Subscribe),
    SubAck(SubAck),
    PingReq,
    PingResp,
    Disconnect,
}

impl Packet {
    /// Control packet type code
    pub fn packet_type(&self) -> u8 {
        match self {
            Packet::Connect(_) => packet_type::CONNECT,
            Packet::ConnAck { .. } => packet_type::CONNACK,
            Packet::Publish(_) => packet_type::PUBLISH,
            Packet::PubAck { .. } => packet_type::PUBACK,
            Packet::Subscribe(_) => packet_type::SUBSCRIBE,
            Packet::SubAck(_) => packet_type::SUBACK,
            Packet::PingReq => packet_type::PINGREQ,
            Packet::PingResp => packet_type::PINGRESP,
            Packet::Disconnect => packet_type::DISCONNECT,
        }
    }

    /// Append the encoded packet to `buf`
    pub fn encode(&self, buf: &mut BytesMut) {
        let mut body = BytesMut::new();

        let header = match self {
            Packet::Connect(connect) => {
                put_string(&mut body, PROTOCOL_NAME);
                body.put_u8(PROTOCOL_LEVEL);
                body.put_u8(if connect.clean_session { 0x02 } else { 0x00 });
                body.put_u16(connect.keep_alive);
                put_string(&mut body, &connect.client_id);
                packet_type::CONNECT << 4
            }
            Packet::ConnAck {
                session_present,
                return_code,
            } => {
                body.put_u8(u8::from(*session_present));
                body.put_u8(*return_code);
                packet_type::CONNACK << 4
            }
            Packet::Publish(publish) => {
                put_string(&mut body, &publish.topic);
                if let Some(id) = publish.packet_id {
                    body.put_u16(id);
                }
                body.put_slice(&publish.payload);
                (packet_type::PUBLISH << 4)
                    | (u8::from(publish.dup) << 3)
                    | ((publish.qos as u8) << 1)
                    | u8::from(publish.retain)
            }
            Packet::PubAck { packet_id } => {
                body.put_u16(*packet_id);
                packet_type::PUBACK << 4
            }
            Packet::Subscribe(subscribe) => {
                body.put_u16(subscribe.packet_id);
                for (topic, qos) in &subscribe.topics {
                    put_string(&mut body, topic);
                    body.put_u8(*qos as u8);
                }
                // SUBSCRIBE requires flags 0b0010
                (packet_type::SUBSCRIBE << 4) | 0x02
            }
            Packet::SubAck(ack) => {
                body.put_u16(ack.packet_id);
                body.put_slice(&ack.return_codes);
                packet_type::SUBACK << 4
            }
            Packet::PingReq => packet_type::PINGREQ << 4,
            Packet::PingResp => packet_type::PINGRESP << 4,
            Packet::Disconnect => packet_type::DISCONNECT << 4,
        };

        buf.reserve(5 + body.len());
        buf.put_u8(header);
        put_remaining_length(buf, body.len());
        buf.put_slice(&body);
    }

    /// Decode one packet from the front of `buf`
    ///
    /// Returns `Ok(None)` and leaves `buf` untouched if the packet is not
    /// complete yet.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Packet>, MqttError> {
        let Some((len, header_len)) = parse_remaining_length(buf)? else {
            return Ok(None);
        };

        if len > MAX_PACKET_SIZE {
            return Err(MqttError::MalformedPacket("packet too large"));
        }
        if buf.len() < header_len + len {
            return Ok(None);
        }

        let header = buf[0];
        buf.advance(header_len);
        let mut body = buf.split_to(len).freeze();

        let kind = header >> 4;
        let flags = header & 0x0F;

        let packet = match kind {
            packet_type::CONNECT => {
                let name = get_string(&mut body)?;
                if name != PROTOCOL_NAME {
                    return Err(MqttError::MalformedPacket("unknown protocol name"));
                }
                let _level = get_u8(&mut body)?;
                let connect_flags = get_u8(&mut body)?;
                let keep_alive = get_u16(&mut body)?;
                let client_id = get_string(&mut body)?;
                Packet::Connect(Connect {
                    client_id,
                    keep_alive,
                    clean_session: connect_flags & 0x02 != 0,
                })
            }
            packet_type::CONNACK => {
                let ack_flags = get_u8(&mut body)?;
                let return_code = get_u8(&mut body)?;
                Packet::ConnAck {
                    session_present: ack_flags & 0x01 != 0,
                    return_code,
                }
            }
            packet_type::PUBLISH => {
                let qos = QoS::from_u8((flags >> 1) & 0x03)
                    .ok_or(MqttError::MalformedPacket("invalid QoS"))?;
                let topic = get_string(&mut body)?;
                let packet_id = match qos {
                    QoS::AtMostOnce => None,
                    _ => Some(get_u16(&mut body)?),
                };
                Packet::Publish(Publish {
                    topic,
                    payload: body,
                    qos,
                    packet_id,
                    retain: flags & 0x01 != 0,
                    dup: flags & 0x08 != 0,
                })
            }
            packet_type::PUBACK => Packet::PubAck {
                packet_id: get_u16(&mut body)?,
            },
            packet_type::SUBSCRIBE => {
                let packet_id = get_u16(&mut body)?;
                let mut topics = Vec::new();
                while body.has_remaining() {
                    let topic = get_string(&mut body)?;
                    let qos = QoS::from_u8(get_u8(&mut body)? & 0x03)
                        .ok_or(MqttError::MalformedPacket("invalid QoS"))?;
                    topics.push((topic, qos));
                }
                if topics.is_empty() {
                    return Err(MqttError::MalformedPacket("SUBSCRIBE without topics"));
                }
                Packet::Subscribe(Subscribe { packet_id, topics })
            }
            packet_type::SUBACK => {
                let packet_id = get_u16(&mut body)?;
                Packet::SubAck(SubAck {
                    packet_id,
                    return_codes: body.to_vec(),
                })
            }
            packet_type::PINGREQ => Packet::PingReq,
            packet_type::PINGRESP => Packet::PingResp,
            packet_type::DISCONNECT => Packet::Disconnect,
            other => return Err(MqttError::UnexpectedPacket(other)),
        };

        Ok(Some(packet))
    }
}

/// Parse the remaining length field
///
/// Returns (remaining length, fixed header length), or `None` if incomplete.
fn parse_remaining_length(buf: &[u8]) -> Result<Option<(usize, usize)>, MqttError> {
    let mut len = 0usize;
    let mut shift = 0;
    let mut pos = 1;

    loop {
        if pos > 4 {
            return Err(MqttError::InvalidRemainingLength);
        }
        let Some(&byte) = buf.get(pos) else {
            return Ok(None);
        };

        len |= ((byte & 0x7F) as usize) << shift;
        shift += 7;
        pos += 1;

        if byte & 0x80 == 0 {
            return Ok(Some((len, pos)));
        }
    }
}

fn put_remaining_length(buf: &mut BytesMut, mut len: usize) {
    loop {
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        buf.put_u8(byte);
        if len == 0 {
            break;
        }
    }
}

fn put_string(buf: &mut BytesMut, value: &str) {
    buf.put_u16(value.len() as u16);
    buf.put_slice(value.as_bytes());
}

fn get_u8(body: &mut Bytes) -> Result<u8, MqttError> {
    if body.remaining() < 1 {
        return Err(MqttError::MalformedPacket("truncated packet"));
    }
    Ok(body.get_u8())
}

fn get_u16(body: &mut Bytes) -> Result<u16, MqttError> {
    if body.remaining() < 2 {
        return Err(MqttError::MalformedPacket("truncated packet"));
    }
    Ok(body.get_u16())
}

fn get_string(body: &mut Bytes) -> Result<String, MqttError> {
    let len = get_u16(body)? as usize;
    if body.remaining() < len {
        return Err(MqttError::MalformedPacket("truncated string"));
    }
    let raw = body.split_to(len);
    String::from_utf8(raw.to_vec()).map_err(|_| MqttError::MalformedPacket("invalid UTF-8 string"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(packet: &Packet) -> Vec<u8> {
        let mut buf = BytesMut::new();
        packet.encode(&mut buf);
        buf.to_vec()
    }

    #[test]
    fn test_encode_connect() {
        let packet = Packet::Connect(Connect {
            client_id: "c".into(),
            keep_alive: 60,
            clean_session: true,
        });

        assert_eq!(
            encoded(&packet),
            vec![
                0x10, 0x0D, // CONNECT, remaining length 13
                0x00, 0x04, b'M', b'Q', b'T', b'T', // protocol name
                0x04, // level
                0x02, // clean session
                0x00, 0x3C, // keepalive 60s
                0x00, 0x01, b'c', // client id
            ]
        );
    }

    #[test]
    fn test_encode_subscribe() {
        let packet = Packet::Subscribe(Subscribe {
            packet_id: 1,
            topics: vec![("a/b".into(), QoS::AtMostOnce)],
        });

        assert_eq!(
            encoded(&packet),
            vec![0x82, 0x08, 0x00, 0x01, 0x00, 0x03, b'a', b'/', b'b', 0x00]
        );
    }

    #[test]
    fn test_decode_publish_qos0() {
        let mut buf = BytesMut::from(&[0x30, 0x06, 0x00, 0x02, b'f', b'd', b'h', b'i'][..]);

        let packet = Packet::decode(&mut buf).unwrap().unwrap();
        assert_eq!(packet, Packet::Publish(Publish::new("fd", Bytes::from_static(b"hi"))));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_publish_qos1_has_packet_id() {
        let mut buf = BytesMut::from(&[0x32, 0x07, 0x00, 0x01, b't', 0x00, 0x2A, b'o', b'k'][..]);

        match Packet::decode(&mut buf).unwrap().unwrap() {
            Packet::Publish(publish) => {
                assert_eq!(publish.qos, QoS::AtLeastOnce);
                assert_eq!(publish.packet_id, Some(42));
                assert_eq!(&publish.payload[..], b"ok");
            }
            other => panic!("unexpected packet: {:?}", other),
        }
    }

    #[test]
    fn test_decode_incomplete_leaves_buffer() {
        let mut buf = BytesMut::from(&[0x30, 0x06, 0x00, 0x02, b'f'][..]);
        assert!(Packet::decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 5);

        let mut header_only = BytesMut::from(&[0x30][..]);
        assert!(Packet::decode(&mut header_only).unwrap().is_none());
    }

    #[test]
    fn test_remaining_length_multi_byte() {
        let payload = vec![b'x'; 317];
        let packet = Packet::Publish(Publish::new("ab", payload));
        let bytes = encoded(&packet);

        // 2 + 2 + 317 = 321 = 0xC1 0x02
        assert_eq!(&bytes[..3], &[0x30, 0xC1, 0x02]);

        let mut buf = BytesMut::from(&bytes[..]);
        assert_eq!(Packet::decode(&mut buf).unwrap().unwrap(), packet);
    }

    #[test]
    fn test_remaining_length_too_long() {
        let mut buf = BytesMut::from(&[0x30, 0xFF, 0xFF, 0xFF, 0xFF, 0x01][..]);
        assert_eq!(
            Packet::decode(&mut buf),
            Err(MqttError::InvalidRemainingLength)
        );
    }

    #[test]
    fn test_decode_back_to_back_packets() {
        let mut buf = BytesMut::new();
        Packet::ConnAck {
            session_present: false,
            return_code: 0,
        }
        .encode(&mut buf);
        Packet::SubAck(SubAck {
            packet_id: 1,
            return_codes: vec![0x00, SUBACK_FAILURE],
        })
        .encode(&mut buf);
        Packet::PingResp.encode(&mut buf);

        assert!(matches!(
            Packet::decode(&mut buf).unwrap(),
            Some(Packet::ConnAck { return_code: 0, .. })
        ));
        match Packet::decode(&mut buf).unwrap() {
            Some(Packet::SubAck(ack)) => assert!(ack.is_rejected()),
            other => panic!("unexpected packet: {:?}", other),
        }
        assert_eq!(Packet::decode(&mut buf).unwrap(), Some(Packet::PingResp));
        assert_eq!(Packet::decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_truncated_string() {
        let mut buf = BytesMut::from(&[0x30, 0x03, 0x00, 0x05, b'a'][..]);
        assert!(matches!(
            Packet::decode(&mut buf),
            Err(MqttError::MalformedPacket(_))
        ));
    }
}
