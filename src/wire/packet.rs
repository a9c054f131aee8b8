//! Packet framing: `[u32 LE length][u8 opcode][payload]` on the wire, with
//! the length prefix handled exclusively by the session read loop (see
//! [`crate::session`]).

use crate::errors::ProtocolError;
use crate::wire::buffer::{ByteBuffer, MAX_BUFFER_SIZE};
use bytes::{BufMut, BytesMut};

/// A single decoded message: an opcode and its raw payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub opcode: u8,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(opcode: u8, payload: Vec<u8>) -> Self {
        Packet { opcode, payload }
    }

    pub fn empty(opcode: u8) -> Self {
        Packet::new(opcode, Vec::new())
    }

    pub fn from_buffer(opcode: u8, buf: ByteBuffer) -> Self {
        Packet::new(opcode, buf.as_slice().to_vec())
    }

    /// A cursor over this packet's payload, for handlers to read fields from.
    pub fn reader(&self) -> ByteBuffer {
        ByteBuffer::from_vec(self.payload.clone())
    }

    /// Serialises into a full wire frame: `length LE u32 | opcode | payload`,
    /// where `length = 1 + payload.len()`.
    pub fn serialize(&self) -> Vec<u8> {
        let len = 1 + self.payload.len();
        let mut out = BytesMut::with_capacity(4 + len);
        out.put_u32_le(len as u32);
        out.put_u8(self.opcode);
        out.put_slice(&self.payload);
        out.to_vec()
    }

    /// Decodes a packet from exactly the `[opcode][payload]` slice — the
    /// 4-byte length prefix must already have been consumed by the caller.
    pub fn deserialize(body: &[u8]) -> Result<Self, ProtocolError> {
        if body.is_empty() {
            return Err(ProtocolError::EmptyPacket);
        }
        Ok(Packet {
            opcode: body[0],
            payload: body[1..].to_vec(),
        })
    }

    /// Validates a length prefix read off the wire before the body is
    /// fetched, so oversize frames never cause the body to be read at all.
    pub fn check_frame_length(length: u32) -> Result<(), ProtocolError> {
        if length as usize > MAX_BUFFER_SIZE {
            return Err(ProtocolError::OversizeFrame(length));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let p = Packet::new(0x50, vec![1, 2, 3, 4]);
        let wire = p.serialize();
        assert_eq!(&wire[0..4], &5u32.to_le_bytes());
        let decoded = Packet::deserialize(&wire[4..]).unwrap();
        assert_eq!(decoded, p);
    }

    #[test]
    fn empty_payload_round_trip() {
        let p = Packet::empty(0x25);
        let wire = p.serialize();
        assert_eq!(&wire[0..4], &1u32.to_le_bytes());
        assert_eq!(Packet::deserialize(&wire[4..]).unwrap(), p);
    }

    #[test]
    fn deserialize_rejects_empty_body() {
        assert_eq!(Packet::deserialize(&[]), Err(ProtocolError::EmptyPacket));
    }

    #[test]
    fn oversize_frame_rejected_before_body_read() {
        assert!(Packet::check_frame_length(0x0010_0001).is_err());
        assert!(Packet::check_frame_length(1024).is_ok());
    }
}
