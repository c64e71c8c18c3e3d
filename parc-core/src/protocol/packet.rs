//! Byte-level packet framing and validation.
//!
//! A packet is `<type:1><magic:2><command code:2><payload:0..N><term:1>`,
//! 6–256 bytes total. `Packet` is an immutable byte buffer; it is built
//! either by parsing received bytes or by synthesis from a command code
//! and payload.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::ParcError;
use crate::protocol::constants::{END_OF_PACKET, MAX_PACKET_LEN, MIN_PACKET_LEN, PACKET_MAGIC};

// ── PacketType ───────────────────────────────────────────────────

/// The four packet kinds, identified by the first byte on the wire.
///
/// "Advanced" commands receive a second response packet carrying a data
/// payload; "basic" commands are acknowledged with an empty response.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    /// Client → receiver, acknowledgement only.
    BasicCommand = 0x21,
    /// Client → receiver, expects an additional data response.
    AdvancedCommand = 0x3F,
    /// Receiver → client acknowledgement.
    BasicResponse = 0x06,
    /// Receiver → client data response.
    AdvancedResponse = 0x40,
}

impl TryFrom<u8> for PacketType {
    type Error = ParcError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x21 => Ok(PacketType::BasicCommand),
            0x3F => Ok(PacketType::AdvancedCommand),
            0x06 => Ok(PacketType::BasicResponse),
            0x40 => Ok(PacketType::AdvancedResponse),
            _ => Err(ParcError::UnknownVariant {
                type_name: "PacketType",
                value: value as u64,
            }),
        }
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl PacketType {
    /// Returns `true` for the two receiver → client packet kinds.
    pub fn is_response(&self) -> bool {
        matches!(self, PacketType::BasicResponse | PacketType::AdvancedResponse)
    }

    /// Returns `true` for the two advanced packet kinds.
    pub fn is_advanced(&self) -> bool {
        matches!(
            self,
            PacketType::AdvancedCommand | PacketType::AdvancedResponse
        )
    }
}

// ── Packet ───────────────────────────────────────────────────────

/// One validated wire packet.
#[derive(Clone, PartialEq, Eq)]
pub struct Packet {
    raw: Bytes,
}

impl Packet {
    /// Parse and validate received bytes.
    ///
    /// Checks, in order: minimum length, maximum length, magic bytes,
    /// terminator byte, known type byte.
    pub fn parse(raw: Bytes) -> Result<Self, ParcError> {
        if raw.len() < MIN_PACKET_LEN {
            return Err(ParcError::PacketTooShort {
                len: raw.len(),
                min: MIN_PACKET_LEN,
            });
        }
        if raw.len() > MAX_PACKET_LEN {
            return Err(ParcError::PacketTooLong {
                len: raw.len(),
                max: MAX_PACKET_LEN,
            });
        }
        if raw[1..3] != PACKET_MAGIC {
            return Err(ParcError::InvalidMagic);
        }
        if raw[raw.len() - 1] != END_OF_PACKET {
            return Err(ParcError::MissingTerminator);
        }
        PacketType::try_from(raw[0])?;
        Ok(Self { raw })
    }

    /// Synthesize a packet from its parts.
    pub fn synthesize(
        packet_type: PacketType,
        command_code: [u8; 2],
        payload: &[u8],
    ) -> Result<Self, ParcError> {
        let len = MIN_PACKET_LEN + payload.len();
        if len > MAX_PACKET_LEN {
            return Err(ParcError::PacketTooLong {
                len,
                max: MAX_PACKET_LEN,
            });
        }
        let mut buf = BytesMut::with_capacity(len);
        buf.put_u8(packet_type as u8);
        buf.put_slice(&PACKET_MAGIC);
        buf.put_slice(&command_code);
        buf.put_slice(payload);
        buf.put_u8(END_OF_PACKET);
        Ok(Self { raw: buf.freeze() })
    }

    /// The packet type byte. Always valid after construction.
    pub fn packet_type(&self) -> PacketType {
        // Parse/synthesize guarantee a known type byte.
        match PacketType::try_from(self.raw[0]) {
            Ok(t) => t,
            Err(_) => unreachable!("packet constructed with unknown type byte"),
        }
    }

    /// The 2-byte command code.
    pub fn command_code(&self) -> [u8; 2] {
        [self.raw[3], self.raw[4]]
    }

    /// The payload bytes (everything between command code and terminator).
    pub fn payload(&self) -> &[u8] {
        &self.raw[5..self.raw.len() - 1]
    }

    /// The full wire representation.
    pub fn raw_bytes(&self) -> &Bytes {
        &self.raw
    }

    pub fn is_response(&self) -> bool {
        self.packet_type().is_response()
    }

    pub fn is_advanced(&self) -> bool {
        self.packet_type().is_advanced()
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Packet({}, code=", self.packet_type())?;
        for b in self.command_code() {
            write!(f, "{b:02X}")?;
        }
        write!(f, ", payload=[")?;
        for b in self.payload() {
            write!(f, "{b:02X}")?;
        }
        write!(f, "])")
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn power_on_bytes() -> Bytes {
        Bytes::from_static(&[0x21, 0x89, 0x01, b'P', b'W', b'1', 0x0A])
    }

    #[test]
    fn packet_type_roundtrip() {
        for t in [
            PacketType::BasicCommand,
            PacketType::AdvancedCommand,
            PacketType::BasicResponse,
            PacketType::AdvancedResponse,
        ] {
            assert_eq!(PacketType::try_from(t as u8).unwrap(), t);
        }
    }

    #[test]
    fn packet_type_invalid() {
        assert!(PacketType::try_from(0x00).is_err());
        assert!(PacketType::try_from(0xFF).is_err());
    }

    #[test]
    fn parse_valid_packet() {
        let pkt = Packet::parse(power_on_bytes()).unwrap();
        assert_eq!(pkt.packet_type(), PacketType::BasicCommand);
        assert_eq!(pkt.command_code(), [b'P', b'W']);
        assert_eq!(pkt.payload(), b"1");
        assert!(!pkt.is_response());
        assert!(!pkt.is_advanced());
    }

    #[test]
    fn parse_rejects_too_short() {
        let raw = Bytes::from_static(&[0x21, 0x89, 0x01, b'P', 0x0A]);
        assert!(matches!(
            Packet::parse(raw),
            Err(ParcError::PacketTooShort { len: 5, .. })
        ));
    }

    #[test]
    fn parse_rejects_too_long() {
        let mut raw = vec![0x21, 0x89, 0x01, b'P', b'W'];
        raw.extend(std::iter::repeat_n(b'x', 300));
        raw.push(0x0A);
        assert!(matches!(
            Packet::parse(Bytes::from(raw)),
            Err(ParcError::PacketTooLong { .. })
        ));
    }

    #[test]
    fn parse_rejects_bad_magic() {
        let raw = Bytes::from_static(&[0x21, 0x88, 0x01, b'P', b'W', 0x0A]);
        assert!(matches!(Packet::parse(raw), Err(ParcError::InvalidMagic)));
    }

    #[test]
    fn parse_rejects_missing_terminator() {
        let raw = Bytes::from_static(&[0x21, 0x89, 0x01, b'P', b'W', 0x0B]);
        assert!(matches!(
            Packet::parse(raw),
            Err(ParcError::MissingTerminator)
        ));
    }

    #[test]
    fn parse_rejects_unknown_type() {
        let raw = Bytes::from_static(&[0x22, 0x89, 0x01, b'P', b'W', 0x0A]);
        assert!(matches!(
            Packet::parse(raw),
            Err(ParcError::UnknownVariant { .. })
        ));
    }

    #[test]
    fn boundary_lengths_accepted() {
        // Exactly 6 bytes.
        let raw = Bytes::from_static(&[0x21, 0x89, 0x01, b'P', b'W', 0x0A]);
        assert!(Packet::parse(raw).is_ok());

        // Exactly 256 bytes.
        let pkt = Packet::synthesize(
            PacketType::AdvancedResponse,
            [b'M', b'D'],
            &vec![b'x'; MAX_PACKET_LEN - MIN_PACKET_LEN],
        )
        .unwrap();
        assert_eq!(pkt.raw_bytes().len(), MAX_PACKET_LEN);
        assert!(Packet::parse(pkt.raw_bytes().clone()).is_ok());
    }

    #[test]
    fn synthesize_roundtrip() {
        let pkt = Packet::synthesize(PacketType::BasicCommand, [b'P', b'W'], b"1").unwrap();
        assert_eq!(pkt.raw_bytes(), &power_on_bytes());
        let parsed = Packet::parse(pkt.raw_bytes().clone()).unwrap();
        assert_eq!(parsed, pkt);
    }

    #[test]
    fn synthesize_rejects_oversized_payload() {
        let payload = vec![0u8; MAX_PACKET_LEN];
        assert!(Packet::synthesize(PacketType::BasicCommand, [b'P', b'W'], &payload).is_err());
    }
}
