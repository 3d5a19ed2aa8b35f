//! Wire envelope framing
//!
//! Every message on the wire, discovery datagrams included, is wrapped in a
//! fixed 8-byte envelope: protocol version, bitwise-inverse version, a
//! 16-bit payload type and a 32-bit big-endian payload length, followed by
//! the payload itself. The `PacketBuffer` below assembles one inbound
//! envelope from an untrusted byte stream without heap allocation: the
//! caller asks how many bytes the buffer still wants, reads at most that
//! many from the socket, and feeds the count back in. This keeps a read
//! from ever crossing a message boundary.

use thiserror::Error;

/// Wire protocol version marker.
pub const PROTOCOL_VERSION: u8 = 0x01;
/// Bitwise inverse of the version, the second marker byte.
pub const INVERSE_PROTOCOL_VERSION: u8 = 0xFE;
/// Size of the fixed envelope header.
pub const HEADER_SIZE: usize = 8;
/// Physical capacity of the reassembly buffer, header included.
pub const PACKET_CAPACITY: usize = 2048;
/// Largest payload the buffer accepts.
pub const MAX_PAYLOAD_SIZE: usize = PACKET_CAPACITY - HEADER_SIZE;

/// Payload type codes carried in the envelope.
pub mod payload_type {
    /// Protocol handshake messages, any generation.
    pub const SAP: u16 = 0x8001;
    /// Mainstream messages of the DC charging generation.
    pub const MAINSTREAM_DC: u16 = 0x8002;
    /// Link discovery request.
    pub const SDP_REQUEST: u16 = 0x9000;
    /// Link discovery response.
    pub const SDP_RESPONSE: u16 = 0x9001;
}

/// Terminal framing failures.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FramingError {
    #[error("invalid envelope marker bytes")]
    InvalidHeader,

    #[error("declared payload length {0} exceeds buffer capacity")]
    PayloadTooLong(u32),
}

/// Assembly state of one inbound envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramingState {
    /// Still collecting the fixed header.
    Empty,
    /// Header validated, collecting the payload.
    HeaderRead,
    /// One complete envelope is in the buffer.
    Complete,
    /// Marker bytes did not match; terminal.
    InvalidHeader,
    /// Declared length does not fit the buffer; terminal.
    PayloadTooLong,
}

impl FramingState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            FramingState::Complete | FramingState::InvalidHeader | FramingState::PayloadTooLong
        )
    }
}

/// Fixed-capacity reassembly buffer for one wire envelope.
///
/// A fresh buffer is constructed per inbound message; it never resets.
pub struct PacketBuffer {
    buf: [u8; PACKET_CAPACITY],
    bytes_read: usize,
    /// Header plus declared payload length, valid from `HeaderRead` on.
    total_len: usize,
    state: FramingState,
}

impl Default for PacketBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketBuffer {
    pub fn new() -> Self {
        Self {
            buf: [0u8; PACKET_CAPACITY],
            bytes_read: 0,
            total_len: 0,
            state: FramingState::Empty,
        }
    }

    pub fn state(&self) -> FramingState {
        self.state
    }

    /// How many bytes the next physical read should request.
    pub fn remaining_to_read(&self) -> usize {
        match self.state {
            FramingState::Empty => HEADER_SIZE - self.bytes_read,
            FramingState::HeaderRead => self.total_len - self.bytes_read,
            _ => 0,
        }
    }

    /// The region the next read must land in.
    pub fn read_target(&mut self) -> &mut [u8] {
        let start = self.bytes_read;
        let end = start + self.remaining_to_read();
        &mut self.buf[start..end]
    }

    /// Account for `n` bytes having arrived in the read target and advance
    /// the state machine. `n` must not exceed `remaining_to_read()`.
    pub fn update_read_bytes(&mut self, n: usize) {
        assert!(
            n <= self.remaining_to_read(),
            "read past the requested byte count"
        );
        self.bytes_read += n;
        match self.state {
            FramingState::Empty if self.bytes_read == HEADER_SIZE => self.parse_header(),
            FramingState::HeaderRead if self.bytes_read == self.total_len => {
                self.state = FramingState::Complete;
            }
            _ => {}
        }
    }

    fn parse_header(&mut self) {
        if self.buf[0] != PROTOCOL_VERSION || self.buf[1] != INVERSE_PROTOCOL_VERSION {
            self.state = FramingState::InvalidHeader;
            return;
        }
        let declared = u32::from_be_bytes([self.buf[4], self.buf[5], self.buf[6], self.buf[7]]);
        let Some(total) = (declared as usize).checked_add(HEADER_SIZE) else {
            self.state = FramingState::PayloadTooLong;
            return;
        };
        if total > PACKET_CAPACITY {
            self.state = FramingState::PayloadTooLong;
            return;
        }
        self.total_len = total;
        self.state = if total == HEADER_SIZE {
            FramingState::Complete
        } else {
            FramingState::HeaderRead
        };
    }

    /// Payload type field, valid from `HeaderRead` on.
    pub fn payload_type(&self) -> Option<u16> {
        match self.state {
            FramingState::HeaderRead | FramingState::Complete => {
                Some(u16::from_be_bytes([self.buf[2], self.buf[3]]))
            }
            _ => None,
        }
    }

    /// The assembled payload of a `Complete` envelope.
    pub fn payload(&self) -> &[u8] {
        debug_assert_eq!(self.state, FramingState::Complete);
        &self.buf[HEADER_SIZE..self.total_len]
    }

    /// The terminal failure, if the buffer ended in one.
    pub fn error(&self) -> Option<FramingError> {
        match self.state {
            FramingState::InvalidHeader => Some(FramingError::InvalidHeader),
            FramingState::PayloadTooLong => {
                let declared =
                    u32::from_be_bytes([self.buf[4], self.buf[5], self.buf[6], self.buf[7]]);
                Some(FramingError::PayloadTooLong(declared))
            }
            _ => None,
        }
    }
}

/// Write the fixed envelope header into `dst`.
pub fn write_header(dst: &mut [u8], payload_type: u16, payload_len: u32) {
    dst[0] = PROTOCOL_VERSION;
    dst[1] = INVERSE_PROTOCOL_VERSION;
    dst[2..4].copy_from_slice(&payload_type.to_be_bytes());
    dst[4..8].copy_from_slice(&payload_len.to_be_bytes());
}

/// Build a complete envelope around `payload` in a fresh vector.
///
/// Used by the discovery server, where datagrams are small and not on the
/// session hot path.
pub fn wrap(payload_type: u16, payload: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; HEADER_SIZE + payload.len()];
    write_header(&mut out, payload_type, payload.len() as u32);
    out[HEADER_SIZE..].copy_from_slice(payload);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn feed(packet: &mut PacketBuffer, mut bytes: &[u8], chunk: usize) {
        while !bytes.is_empty() && !packet.state().is_terminal() {
            let want = packet.remaining_to_read();
            let n = want.min(chunk).min(bytes.len());
            packet.read_target()[..n].copy_from_slice(&bytes[..n]);
            packet.update_read_bytes(n);
            bytes = &bytes[n..];
        }
    }

    #[rstest]
    #[case(1)]
    #[case(2)]
    #[case(3)]
    #[case(7)]
    #[case(usize::MAX)]
    fn chunk_size_does_not_change_the_outcome(#[case] chunk: usize) {
        let frame = wrap(payload_type::MAINSTREAM_DC, b"hello vehicle");
        let mut packet = PacketBuffer::new();
        feed(&mut packet, &frame, chunk);
        assert_eq!(packet.state(), FramingState::Complete);
        assert_eq!(packet.payload_type(), Some(payload_type::MAINSTREAM_DC));
        assert_eq!(packet.payload(), b"hello vehicle");
    }

    #[test]
    fn zero_length_payload_completes_at_header() {
        let frame = wrap(payload_type::SDP_REQUEST, b"");
        let mut packet = PacketBuffer::new();
        feed(&mut packet, &frame, usize::MAX);
        assert_eq!(packet.state(), FramingState::Complete);
        assert_eq!(packet.payload(), b"");
    }

    #[test]
    fn bad_marker_bytes_are_terminal() {
        let mut frame = wrap(payload_type::SAP, b"x");
        frame[1] = 0x00;
        let mut packet = PacketBuffer::new();
        feed(&mut packet, &frame, usize::MAX);
        assert_eq!(packet.state(), FramingState::InvalidHeader);
        assert_eq!(packet.error(), Some(FramingError::InvalidHeader));
        assert_eq!(packet.remaining_to_read(), 0);
    }

    #[test]
    fn oversized_declared_length_is_terminal() {
        let mut frame = [0u8; HEADER_SIZE];
        write_header(&mut frame, payload_type::SAP, (MAX_PAYLOAD_SIZE as u32) + 1);
        let mut packet = PacketBuffer::new();
        feed(&mut packet, &frame, usize::MAX);
        assert_eq!(packet.state(), FramingState::PayloadTooLong);
        assert_eq!(
            packet.error(),
            Some(FramingError::PayloadTooLong((MAX_PAYLOAD_SIZE as u32) + 1))
        );
        assert_eq!(packet.remaining_to_read(), 0);
    }

    #[test]
    fn largest_accepted_payload_still_fits() {
        let payload = vec![0xAB; MAX_PAYLOAD_SIZE];
        let frame = wrap(payload_type::MAINSTREAM_DC, &payload);
        let mut packet = PacketBuffer::new();
        feed(&mut packet, &frame, 512);
        assert_eq!(packet.state(), FramingState::Complete);
        assert_eq!(packet.payload().len(), MAX_PAYLOAD_SIZE);
    }

    #[test]
    #[should_panic(expected = "read past the requested byte count")]
    fn overfeeding_is_a_contract_violation() {
        let mut packet = PacketBuffer::new();
        packet.update_read_bytes(HEADER_SIZE + 1);
    }
}
