//! `tokio_util` codec for the terminator-delimited packet stream.
//!
//! Frames are split on the end-of-packet byte; each frame is then run
//! through full `Packet` validation. A buffer that grows past the
//! maximum packet length without a terminator is a protocol error, not
//! a wait-for-more-data condition.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ParcError;
use crate::protocol::constants::{END_OF_PACKET, MAX_PACKET_LEN};
use crate::protocol::packet::Packet;

#[derive(Debug, Default)]
pub struct PacketCodec;

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = ParcError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match src.iter().position(|&b| b == END_OF_PACKET) {
            Some(i) => {
                let frame = src.split_to(i + 1);
                Ok(Some(Packet::parse(frame.freeze())?))
            }
            None if src.len() > MAX_PACKET_LEN => Err(ParcError::PacketTooLong {
                len: src.len(),
                max: MAX_PACKET_LEN,
            }),
            None => Ok(None),
        }
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = ParcError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(item.raw_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::packet::PacketType;

    #[test]
    fn decode_single_frame() {
        let mut codec = PacketCodec;
        let mut buf = BytesMut::from(&[0x21, 0x89, 0x01, b'P', b'W', b'1', 0x0A][..]);
        let pkt = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(pkt.command_code(), [b'P', b'W']);
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_split_delivery() {
        let mut codec = PacketCodec;
        let mut buf = BytesMut::from(&[0x21, 0x89, 0x01][..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&[b'P', b'W', b'1', 0x0A]);
        let pkt = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(pkt.payload(), b"1");
    }

    #[test]
    fn decode_back_to_back_frames() {
        let mut codec = PacketCodec;
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[0x21, 0x89, 0x01, b'P', b'W', b'1', 0x0A]);
        buf.extend_from_slice(&[0x06, 0x89, 0x01, b'P', b'W', 0x0A]);

        let first = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(first.packet_type(), PacketType::BasicCommand);
        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(second.packet_type(), PacketType::BasicResponse);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn decode_unterminated_overflow_is_error() {
        let mut codec = PacketCodec;
        let mut buf = BytesMut::from(&vec![b'x'; MAX_PACKET_LEN + 1][..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(ParcError::PacketTooLong { .. })
        ));
    }

    #[test]
    fn decode_invalid_frame_is_error() {
        let mut codec = PacketCodec;
        // Terminated frame with bad magic.
        let mut buf = BytesMut::from(&[0x21, 0x00, 0x00, b'P', b'W', 0x0A][..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(ParcError::InvalidMagic)
        ));
    }

    #[test]
    fn encode_then_decode() {
        let mut codec = PacketCodec;
        let pkt = Packet::synthesize(PacketType::AdvancedCommand, [b'M', b'D'], b"").unwrap();
        let mut buf = BytesMut::new();
        codec.encode(pkt.clone(), &mut buf).unwrap();
        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, pkt);
    }
}
