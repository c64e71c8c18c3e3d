//! Discovery protocol datagram.
//!
//! Every discovery datagram is exactly 64 bytes:
//!
//! ```text
//! "PARC\0\0" | announce_request | is_off | version | tcp_port | device_name | model_name | serial_number
//!   6 bytes  |      1 byte      | 1 byte | 4 bytes | 4 bytes  |  16 bytes   |  16 bytes  |    16 bytes
//! ```
//!
//! Integers are big-endian. A search query has `announce_request` set
//! and every descriptive field zeroed. Hardware pads the device name
//! with spaces, the model name with spaces to seven bytes then NULs,
//! and the serial number with NULs; parsing strips trailing NULs and
//! spaces so all three forms read back the same.

use bytes::Bytes;

use crate::error::{ParcError, Result};

/// Leading magic of every discovery datagram.
pub const DP_HEADER: &[u8; 6] = b"PARC\0\0";

/// Total datagram size on the wire.
pub const DP_DATAGRAM_LEN: usize = 64;

/// Current discovery protocol version.
pub const DP_VERSION: u32 = 1;

const NAME_FIELD_LEN: usize = 16;

const ANNOUNCE_REQUEST_OFFSET: usize = 6;
const IS_OFF_OFFSET: usize = 7;
const VERSION_OFFSET: usize = 8;
const TCP_PORT_OFFSET: usize = 12;
const DEVICE_NAME_OFFSET: usize = 16;
const MODEL_NAME_OFFSET: usize = 32;
const SERIAL_NUMBER_OFFSET: usize = 48;

/// One parsed discovery datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DpDatagram {
    /// Asks every listening device to announce itself.
    pub announce_request: bool,
    /// The sending device is going offline.
    pub is_off: bool,
    pub version: u32,
    /// Control port the device listens on; zero in queries.
    pub tcp_port: u16,
    pub device_name: String,
    pub model_name: String,
    pub serial_number: String,
}

impl DpDatagram {
    /// A search query: announce request with all fields zeroed.
    pub fn new_query() -> Self {
        Self {
            announce_request: true,
            is_off: false,
            version: DP_VERSION,
            tcp_port: 0,
            device_name: String::new(),
            model_name: String::new(),
            serial_number: String::new(),
        }
    }

    /// An advertisement describing a live device.
    pub fn new_advertisement(
        tcp_port: u16,
        device_name: &str,
        model_name: &str,
        serial_number: &str,
    ) -> Self {
        Self {
            announce_request: false,
            is_off: false,
            version: DP_VERSION,
            tcp_port,
            device_name: device_name.to_string(),
            model_name: model_name.to_string(),
            serial_number: serial_number.to_string(),
        }
    }

    pub fn parse(raw: &[u8]) -> Result<Self> {
        if raw.len() != DP_DATAGRAM_LEN {
            return Err(ParcError::BadDatagram("wrong length"));
        }
        if &raw[..DP_HEADER.len()] != DP_HEADER {
            return Err(ParcError::BadDatagram("bad header"));
        }
        let version = u32::from_be_bytes(
            raw[VERSION_OFFSET..VERSION_OFFSET + 4]
                .try_into()
                .map_err(|_| ParcError::BadDatagram("bad version field"))?,
        );
        let tcp_port = u32::from_be_bytes(
            raw[TCP_PORT_OFFSET..TCP_PORT_OFFSET + 4]
                .try_into()
                .map_err(|_| ParcError::BadDatagram("bad port field"))?,
        );
        let tcp_port =
            u16::try_from(tcp_port).map_err(|_| ParcError::BadDatagram("port out of range"))?;
        Ok(Self {
            announce_request: raw[ANNOUNCE_REQUEST_OFFSET] != 0,
            is_off: raw[IS_OFF_OFFSET] != 0,
            version,
            tcp_port,
            device_name: parse_name(&raw[DEVICE_NAME_OFFSET..DEVICE_NAME_OFFSET + NAME_FIELD_LEN])?,
            model_name: parse_name(&raw[MODEL_NAME_OFFSET..MODEL_NAME_OFFSET + NAME_FIELD_LEN])?,
            serial_number: parse_name(
                &raw[SERIAL_NUMBER_OFFSET..SERIAL_NUMBER_OFFSET + NAME_FIELD_LEN],
            )?,
        })
    }

    pub fn encode(&self) -> Result<Bytes> {
        let mut raw = [0u8; DP_DATAGRAM_LEN];
        raw[..DP_HEADER.len()].copy_from_slice(DP_HEADER);
        raw[ANNOUNCE_REQUEST_OFFSET] = u8::from(self.announce_request);
        raw[IS_OFF_OFFSET] = u8::from(self.is_off);
        raw[VERSION_OFFSET..VERSION_OFFSET + 4].copy_from_slice(&self.version.to_be_bytes());
        raw[TCP_PORT_OFFSET..TCP_PORT_OFFSET + 4]
            .copy_from_slice(&u32::from(self.tcp_port).to_be_bytes());
        encode_name(
            &self.device_name,
            Pad::Spaces,
            &mut raw[DEVICE_NAME_OFFSET..DEVICE_NAME_OFFSET + NAME_FIELD_LEN],
        )?;
        encode_name(
            &self.model_name,
            Pad::SpacesToSevenThenNuls,
            &mut raw[MODEL_NAME_OFFSET..MODEL_NAME_OFFSET + NAME_FIELD_LEN],
        )?;
        encode_name(
            &self.serial_number,
            Pad::Nuls,
            &mut raw[SERIAL_NUMBER_OFFSET..SERIAL_NUMBER_OFFSET + NAME_FIELD_LEN],
        )?;
        Ok(Bytes::copy_from_slice(&raw))
    }
}

enum Pad {
    Spaces,
    Nuls,
    /// The quirk hardware uses for the model name field.
    SpacesToSevenThenNuls,
}

fn encode_name(name: &str, pad: Pad, out: &mut [u8]) -> Result<()> {
    let trimmed = name.trim_end();
    let bytes = trimmed.as_bytes();
    if bytes.len() > out.len() {
        return Err(ParcError::BadDatagram("name field too long"));
    }
    out[..bytes.len()].copy_from_slice(bytes);
    // The query form of each field is all NULs, so an empty name pads
    // with NULs no matter the rule.
    if bytes.is_empty() {
        return Ok(());
    }
    match pad {
        Pad::Spaces => out[bytes.len()..].fill(b' '),
        Pad::Nuls => {}
        Pad::SpacesToSevenThenNuls => {
            let space_end = bytes.len().max(7).min(out.len());
            out[bytes.len()..space_end].fill(b' ');
        }
    }
    Ok(())
}

fn parse_name(raw: &[u8]) -> Result<String> {
    let s = std::str::from_utf8(raw).map_err(|_| ParcError::BadDatagram("name not utf-8"))?;
    Ok(s.trim_end_matches('\0').trim_end().to_string())
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_is_all_zeros_after_flags() {
        let raw = DpDatagram::new_query().encode().unwrap();
        assert_eq!(raw.len(), DP_DATAGRAM_LEN);
        assert_eq!(&raw[..6], DP_HEADER);
        assert_eq!(raw[ANNOUNCE_REQUEST_OFFSET], 1);
        assert_eq!(&raw[VERSION_OFFSET..VERSION_OFFSET + 4], &[0, 0, 0, 1]);
        assert!(raw[TCP_PORT_OFFSET..].iter().all(|&b| b == 0));
    }

    #[test]
    fn advertisement_pads_like_hardware() {
        // The reference capture from a real device: device name is
        // space-padded, model name space-padded to 7 then NUL-padded,
        // serial NUL-padded.
        let dg = DpDatagram::new_advertisement(14999, "AVM 60", "AVM 60", "7CB77B03960A");
        let raw = dg.encode().unwrap();
        assert_eq!(
            &raw[DEVICE_NAME_OFFSET..DEVICE_NAME_OFFSET + 16],
            b"AVM 60          "
        );
        assert_eq!(
            &raw[MODEL_NAME_OFFSET..MODEL_NAME_OFFSET + 16],
            b"AVM 60 \0\0\0\0\0\0\0\0\0"
        );
        assert_eq!(
            &raw[SERIAL_NUMBER_OFFSET..SERIAL_NUMBER_OFFSET + 16],
            b"7CB77B03960A\0\0\0\0"
        );
        assert_eq!(&raw[TCP_PORT_OFFSET..TCP_PORT_OFFSET + 4], &[0, 0, 0x3a, 0x97]);
    }

    #[test]
    fn roundtrip_strips_padding() {
        let dg = DpDatagram::new_advertisement(14999, "Living Room", "DLA-NZ8", "SN0001");
        let parsed = DpDatagram::parse(&dg.encode().unwrap()).unwrap();
        assert_eq!(parsed, dg);
    }

    #[test]
    fn rejects_bad_length_and_header() {
        assert!(matches!(
            DpDatagram::parse(&[0u8; 10]),
            Err(ParcError::BadDatagram("wrong length"))
        ));
        let mut raw = DpDatagram::new_query().encode().unwrap().to_vec();
        raw[0] = b'X';
        assert!(matches!(
            DpDatagram::parse(&raw),
            Err(ParcError::BadDatagram("bad header"))
        ));
    }

    #[test]
    fn rejects_oversized_name() {
        let dg = DpDatagram::new_advertisement(1, "a name that is far too long to fit", "m", "s");
        assert!(dg.encode().is_err());
    }

    #[test]
    fn port_out_of_range_rejected() {
        let mut raw = DpDatagram::new_query().encode().unwrap().to_vec();
        raw[TCP_PORT_OFFSET] = 1;
        assert!(matches!(
            DpDatagram::parse(&raw),
            Err(ParcError::BadDatagram("port out of range"))
        ));
    }
}
