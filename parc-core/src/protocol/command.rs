//! Command and response pairing.
//!
//! `Command` couples a command packet with its resolved catalog
//! metadata; `Response` couples the originating command with the
//! basic-response packet and, for advanced commands, the data-response
//! packet. Both validate shape consistency at construction so that
//! everything downstream can trust them.

use std::fmt;

use crate::error::ParcError;
use crate::protocol::catalog::{name_to_meta, CommandMeta};
use crate::protocol::packet::{Packet, PacketType};

// ── Command ──────────────────────────────────────────────────────

/// A command ready to be sent, with its catalog metadata.
#[derive(Debug, Clone)]
pub struct Command {
    pub meta: CommandMeta,
    pub packet: Packet,
}

impl Command {
    /// Build a command from its full `"{group}.{name}"` catalog name.
    pub fn from_name(full_name: &str) -> Result<Self, ParcError> {
        let meta = name_to_meta(full_name)?;
        Self::from_meta(meta)
    }

    /// Build a command from already-resolved metadata.
    pub fn from_meta(meta: CommandMeta) -> Result<Self, ParcError> {
        let packet = meta.command_packet()?;
        Ok(Self { meta, packet })
    }

    pub fn name(&self) -> String {
        self.meta.full_name()
    }

    pub fn is_advanced(&self) -> bool {
        self.meta.is_advanced()
    }

    /// Pair this command with its response packets, validating shape.
    pub fn response_from_packets(
        &self,
        basic: Packet,
        advanced: Option<Packet>,
    ) -> Result<Response, ParcError> {
        Response::new(self.clone(), basic, advanced)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Command({})", self.meta.full_name())
    }
}

// ── Response ─────────────────────────────────────────────────────

/// A complete response to one command.
#[derive(Debug, Clone)]
pub struct Response {
    pub command: Command,
    pub basic: Packet,
    pub advanced: Option<Packet>,
}

impl Response {
    /// Validate and pair response packets with their command.
    ///
    /// Checks: the basic packet is a basic response with the command's
    /// code; an advanced command has an advanced packet (and a basic
    /// command has none) with the command's code and the statically
    /// known payload length.
    pub fn new(command: Command, basic: Packet, advanced: Option<Packet>) -> Result<Self, ParcError> {
        if basic.packet_type() != PacketType::BasicResponse {
            return Err(ParcError::ResponseMismatch(
                "first response packet is not a basic response",
            ));
        }
        if basic.command_code() != command.meta.command_code() {
            return Err(ParcError::ResponseMismatch(
                "basic response command code does not match command",
            ));
        }
        match (&advanced, command.is_advanced()) {
            (None, true) => {
                return Err(ParcError::ResponseMismatch(
                    "advanced command without advanced response",
                ));
            }
            (Some(_), false) => {
                return Err(ParcError::ResponseMismatch(
                    "basic command with unexpected advanced response",
                ));
            }
            _ => {}
        }
        if let Some(adv) = &advanced {
            if adv.packet_type() != PacketType::AdvancedResponse {
                return Err(ParcError::ResponseMismatch(
                    "second response packet is not an advanced response",
                ));
            }
            if adv.command_code() != command.meta.command_code() {
                return Err(ParcError::ResponseMismatch(
                    "advanced response command code does not match command",
                ));
            }
            let expected = command.meta.response_payload_length();
            if adv.payload().len() != expected {
                return Err(ParcError::ResponsePayloadLength {
                    command: command.meta.group.name,
                    expected,
                    actual: adv.payload().len(),
                });
            }
        }
        Ok(Self {
            command,
            basic,
            advanced,
        })
    }

    /// The data payload: the advanced packet's payload, or empty for
    /// basic commands.
    pub fn payload(&self) -> &[u8] {
        self.advanced.as_ref().map(|p| p.payload()).unwrap_or(b"")
    }

    /// Friendly string form of the payload, through the command's
    /// response mapper.
    pub fn response_str(&self) -> Result<String, ParcError> {
        self.command
            .meta
            .mapper()
            .payload_to_str(self.payload())
            .ok_or(ParcError::UnknownResponsePayload(
                self.command.meta.group.name,
            ))
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Response({}", self.command.meta.full_name())?;
        if let Some(adv) = &self.advanced {
            write!(f, ", payload={:02X?}", adv.payload())?;
        }
        write!(f, ")")
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn basic_response(code: [u8; 2]) -> Packet {
        Packet::synthesize(PacketType::BasicResponse, code, b"").unwrap()
    }

    fn advanced_response(code: [u8; 2], payload: &[u8]) -> Packet {
        Packet::synthesize(PacketType::AdvancedResponse, code, payload).unwrap()
    }

    #[test]
    fn from_name_builds_packet() {
        let cmd = Command::from_name("power.on").unwrap();
        assert_eq!(
            cmd.packet.raw_bytes().as_ref(),
            &[0x21, 0x89, 0x01, 0x50, 0x57, 0x31, 0x0A]
        );
        assert!(!cmd.is_advanced());
    }

    #[test]
    fn basic_command_response() {
        let cmd = Command::from_name("power.on").unwrap();
        let resp = cmd
            .response_from_packets(basic_response([0x50, 0x57]), None)
            .unwrap();
        assert_eq!(resp.payload(), b"");
    }

    #[test]
    fn advanced_command_response_decodes() {
        let cmd = Command::from_name("power_status.query").unwrap();
        let resp = cmd
            .response_from_packets(
                basic_response([0x50, 0x57]),
                Some(advanced_response([0x50, 0x57], b"\x30")),
            )
            .unwrap();
        assert_eq!(resp.response_str().unwrap(), "Standby");
    }

    #[test]
    fn rejects_code_mismatch() {
        let cmd = Command::from_name("power.on").unwrap();
        let err = cmd
            .response_from_packets(basic_response([0x49, 0x50]), None)
            .unwrap_err();
        assert!(matches!(err, ParcError::ResponseMismatch(_)));
    }

    #[test]
    fn rejects_missing_advanced_packet() {
        let cmd = Command::from_name("power_status.query").unwrap();
        let err = cmd
            .response_from_packets(basic_response([0x50, 0x57]), None)
            .unwrap_err();
        assert!(matches!(err, ParcError::ResponseMismatch(_)));
    }

    #[test]
    fn rejects_unexpected_advanced_packet() {
        let cmd = Command::from_name("power.on").unwrap();
        let err = cmd
            .response_from_packets(
                basic_response([0x50, 0x57]),
                Some(advanced_response([0x50, 0x57], b"\x30")),
            )
            .unwrap_err();
        assert!(matches!(err, ParcError::ResponseMismatch(_)));
    }

    #[test]
    fn rejects_wrong_payload_length() {
        let cmd = Command::from_name("power_status.query").unwrap();
        let err = cmd
            .response_from_packets(
                basic_response([0x50, 0x57]),
                Some(advanced_response([0x50, 0x57], b"\x30\x30")),
            )
            .unwrap_err();
        assert!(matches!(err, ParcError::ResponsePayloadLength { .. }));
    }

    #[test]
    fn rejects_advanced_first() {
        let cmd = Command::from_name("power_status.query").unwrap();
        let err = cmd
            .response_from_packets(advanced_response([0x50, 0x57], b"\x30"), None)
            .unwrap_err();
        assert!(matches!(err, ParcError::ResponseMismatch(_)));
    }

    #[test]
    fn unknown_payload_surfaces_typed_error() {
        let cmd = Command::from_name("power_status.query").unwrap();
        let resp = cmd
            .response_from_packets(
                basic_response([0x50, 0x57]),
                Some(advanced_response([0x50, 0x57], b"\x39")),
            )
            .unwrap();
        assert!(matches!(
            resp.response_str(),
            Err(ParcError::UnknownResponsePayload(_))
        ));
    }
}
