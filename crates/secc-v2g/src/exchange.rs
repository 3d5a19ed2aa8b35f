//! Message exchange between the wire and the state machine
//!
//! Owns the single inbound request slot and the outbound response buffer of
//! a session. The wire protocol is strictly half-duplex per session: at
//! most one decoded request may be pending, and a second one arriving
//! before the state machine consumed the first is a flow-control violation
//! surfaced as a hard error, never queued. The response buffer is a fixed
//! region with the envelope header reserved up front; a response that does
//! not fit is a hard failure and nothing is marked ready.

use thiserror::Error;

use crate::codec::{CodecError, MessageCodec};
use crate::framing::{self, HEADER_SIZE, PACKET_CAPACITY};
use crate::message::V2gMessage;

/// Capacity of the outbound response region, envelope header included.
pub const RESPONSE_CAPACITY: usize = PACKET_CAPACITY;

#[derive(Debug, Error)]
pub enum ExchangeError {
    /// A request is already pending and not yet consumed.
    #[error("previous request has not been consumed by the state machine")]
    RequestNotConsumed,

    /// `take_request` without a pending request.
    #[error("no request is pending")]
    NoPendingRequest,

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// One serialized response ready for the connection, delivered exactly once.
pub struct OutboundFrame<'a> {
    pub bytes: &'a [u8],
    pub payload_type: u16,
}

/// Per-session bridge between the framing layer and the state machine.
pub struct MessageExchange {
    pending: Option<V2gMessage>,
    response: Box<[u8; RESPONSE_CAPACITY]>,
    response_len: usize,
    response_payload_type: u16,
    response_ready: bool,
}

impl Default for MessageExchange {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageExchange {
    pub fn new() -> Self {
        Self {
            pending: None,
            response: Box::new([0u8; RESPONSE_CAPACITY]),
            response_len: 0,
            response_payload_type: 0,
            response_ready: false,
        }
    }

    /// Hand a decoded request to the state machine's slot.
    pub fn set_request(&mut self, message: V2gMessage) -> Result<(), ExchangeError> {
        if self.pending.is_some() {
            return Err(ExchangeError::RequestNotConsumed);
        }
        self.pending = Some(message);
        Ok(())
    }

    /// Move the pending request out for consumption.
    pub fn take_request(&mut self) -> Result<V2gMessage, ExchangeError> {
        self.pending.take().ok_or(ExchangeError::NoPendingRequest)
    }

    pub fn has_pending_request(&self) -> bool {
        self.pending.is_some()
    }

    /// Serialize a response into the reserved region and mark it ready.
    ///
    /// On failure the region is left razed; no partial bytes become ready.
    pub fn respond(
        &mut self,
        codec: &dyn MessageCodec,
        message: &V2gMessage,
    ) -> Result<(), ExchangeError> {
        self.response_ready = false;
        self.response_len = 0;
        let payload_len = codec.encode(message, &mut self.response[HEADER_SIZE..])?;
        let payload_type = codec.payload_type(message);
        framing::write_header(
            &mut self.response[..HEADER_SIZE],
            payload_type,
            payload_len as u32,
        );
        self.response_len = HEADER_SIZE + payload_len;
        self.response_payload_type = payload_type;
        self.response_ready = true;
        Ok(())
    }

    /// Return the ready response once, clearing readiness.
    pub fn check_and_clear_response(&mut self) -> Option<OutboundFrame<'_>> {
        if !self.response_ready {
            return None;
        }
        self.response_ready = false;
        Some(OutboundFrame {
            bytes: &self.response[..self.response_len],
            payload_type: self.response_payload_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;
    use crate::message::{DcCableCheckReq, DcCableCheckRes, EvseProcessing, ResponseCode};
    use secc_core::Header;

    fn request() -> V2gMessage {
        V2gMessage::DcCableCheckReq(DcCableCheckReq {
            header: Header::anonymous(),
        })
    }

    fn response() -> V2gMessage {
        V2gMessage::DcCableCheckRes(DcCableCheckRes {
            header: Header::anonymous(),
            response_code: ResponseCode::Ok,
            processing: EvseProcessing::Ongoing,
        })
    }

    #[test]
    fn second_request_is_rejected_and_first_survives() {
        let mut exchange = MessageExchange::new();
        exchange.set_request(request()).unwrap();
        assert!(matches!(
            exchange.set_request(request()),
            Err(ExchangeError::RequestNotConsumed)
        ));
        // The first request is intact and consumable.
        assert_eq!(exchange.take_request().unwrap(), request());
        assert!(matches!(
            exchange.take_request(),
            Err(ExchangeError::NoPendingRequest)
        ));
    }

    #[test]
    fn response_is_delivered_exactly_once() {
        let mut exchange = MessageExchange::new();
        exchange.respond(&JsonCodec, &response()).unwrap();
        let frame = exchange.check_and_clear_response().expect("ready frame");
        assert_eq!(frame.payload_type, crate::framing::payload_type::MAINSTREAM_DC);
        assert!(frame.bytes.len() > HEADER_SIZE);
        assert!(exchange.check_and_clear_response().is_none());
    }

    #[test]
    fn framed_response_round_trips_through_the_packet_buffer() {
        use crate::framing::{FramingState, PacketBuffer};

        let mut exchange = MessageExchange::new();
        exchange.respond(&JsonCodec, &response()).unwrap();
        let frame_bytes: Vec<u8> = {
            let frame = exchange.check_and_clear_response().unwrap();
            frame.bytes.to_vec()
        };

        let mut packet = PacketBuffer::new();
        let mut fed = 0;
        while fed < frame_bytes.len() {
            let want = packet.remaining_to_read();
            packet.read_target()[..want].copy_from_slice(&frame_bytes[fed..fed + want]);
            packet.update_read_bytes(want);
            fed += want;
        }
        assert_eq!(packet.state(), FramingState::Complete);
        let decoded = JsonCodec
            .decode(
                Some(crate::codec::ProtocolGeneration::Iso20Dc),
                packet.payload_type().unwrap(),
                packet.payload(),
            )
            .unwrap();
        assert_eq!(decoded, response());
    }

    #[test]
    fn oversized_response_is_a_hard_failure_with_nothing_ready() {
        struct HugeCodec;
        impl MessageCodec for HugeCodec {
            fn decode(
                &self,
                _negotiated: Option<crate::codec::ProtocolGeneration>,
                _payload_type: u16,
                _payload: &[u8],
            ) -> Result<V2gMessage, CodecError> {
                unreachable!()
            }
            fn encode(&self, _message: &V2gMessage, dst: &mut [u8]) -> Result<usize, CodecError> {
                // Claims to need one byte more than the region offers.
                let _ = dst;
                Err(CodecError::BufferOverflow)
            }
        }

        let mut exchange = MessageExchange::new();
        assert!(matches!(
            exchange.respond(&HugeCodec, &response()),
            Err(ExchangeError::Codec(CodecError::BufferOverflow))
        ));
        assert!(exchange.check_and_clear_response().is_none());
    }
}
