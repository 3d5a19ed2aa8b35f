//! Codec boundary
//!
//! The engine never touches bit-level encoding itself: a `MessageCodec`
//! turns a complete envelope payload into a [`V2gMessage`] and serializes a
//! response into the reserved region of the exchange buffer. The production
//! schema codec plugs in behind this trait; `JsonCodec` below serves
//! development and tests.
//!
//! Dispatch is two-level: handshake messages ride the handshake payload
//! type for every protocol generation, mainstream messages ride the payload
//! type of the generation negotiated during the handshake. Only the DC
//! charging generation carries a mainstream catalog here; the legacy
//! generation is negotiable but decodes to an unsupported-generation error,
//! which ends the session before any mainstream message is interpreted.

use std::io;

use thiserror::Error;

use crate::framing::payload_type;
use crate::message::V2gMessage;

/// Protocol generations the handshake can select.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolGeneration {
    /// Legacy generation; dispatch seam only, no mainstream catalog.
    Iso2,
    /// DC charging generation.
    Iso20Dc,
}

impl ProtocolGeneration {
    /// The namespace string vehicles offer in the handshake.
    pub fn namespace(self) -> &'static str {
        match self {
            ProtocolGeneration::Iso2 => "urn:iso:15118:2:2013:MsgDef",
            ProtocolGeneration::Iso20Dc => "urn:iso:std:iso:15118:-20:DC",
        }
    }

    pub fn from_namespace(namespace: &str) -> Option<Self> {
        match namespace {
            "urn:iso:15118:2:2013:MsgDef" => Some(ProtocolGeneration::Iso2),
            "urn:iso:std:iso:15118:-20:DC" => Some(ProtocolGeneration::Iso20Dc),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("serialized message does not fit the reserved response region")]
    BufferOverflow,

    #[error("unexpected payload type {0:#06x}")]
    UnexpectedPayloadType(u16),

    #[error("mainstream message before protocol negotiation")]
    NoNegotiatedGeneration,

    #[error("no mainstream catalog for the {0:?} generation")]
    UnsupportedGeneration(ProtocolGeneration),
}

/// (De)serialization entry points invoked by the message exchange.
pub trait MessageCodec: Send + Sync {
    /// Decode one envelope payload into a message.
    fn decode(
        &self,
        negotiated: Option<ProtocolGeneration>,
        payload_type: u16,
        payload: &[u8],
    ) -> Result<V2gMessage, CodecError>;

    /// Serialize `message` into `dst`, returning the payload length.
    fn encode(&self, message: &V2gMessage, dst: &mut [u8]) -> Result<usize, CodecError>;

    /// The envelope payload type `message` rides on.
    fn payload_type(&self, message: &V2gMessage) -> u16 {
        if message.is_handshake() {
            payload_type::SAP
        } else {
            payload_type::MAINSTREAM_DC
        }
    }
}

/// Check the (generation, payload type, message class) triple of a decoded
/// message. Shared by codec implementations.
fn check_dispatch(
    negotiated: Option<ProtocolGeneration>,
    wire_payload_type: u16,
    message: &V2gMessage,
) -> Result<(), CodecError> {
    match wire_payload_type {
        payload_type::SAP => {
            if message.is_handshake() {
                Ok(())
            } else {
                Err(CodecError::Malformed(
                    "mainstream message on the handshake payload type".into(),
                ))
            }
        }
        payload_type::MAINSTREAM_DC => match negotiated {
            None => Err(CodecError::NoNegotiatedGeneration),
            Some(ProtocolGeneration::Iso2) => {
                Err(CodecError::UnsupportedGeneration(ProtocolGeneration::Iso2))
            }
            Some(ProtocolGeneration::Iso20Dc) => {
                if message.is_handshake() {
                    Err(CodecError::Malformed(
                        "handshake message on the mainstream payload type".into(),
                    ))
                } else {
                    Ok(())
                }
            }
        },
        other => Err(CodecError::UnexpectedPayloadType(other)),
    }
}

/// Development/test codec over the same wire structures.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl MessageCodec for JsonCodec {
    fn decode(
        &self,
        negotiated: Option<ProtocolGeneration>,
        wire_payload_type: u16,
        payload: &[u8],
    ) -> Result<V2gMessage, CodecError> {
        let message: V2gMessage = serde_json::from_slice(payload)
            .map_err(|e| CodecError::Malformed(e.to_string()))?;
        check_dispatch(negotiated, wire_payload_type, &message)?;
        Ok(message)
    }

    fn encode(&self, message: &V2gMessage, dst: &mut [u8]) -> Result<usize, CodecError> {
        let mut writer = SliceWriter { dst, len: 0 };
        match serde_json::to_writer(&mut writer, message) {
            Ok(()) => Ok(writer.len),
            Err(e) if e.is_io() => Err(CodecError::BufferOverflow),
            Err(e) => Err(CodecError::Malformed(e.to_string())),
        }
    }
}

/// `io::Write` over a fixed region; refuses to spill past the end.
struct SliceWriter<'a> {
    dst: &'a mut [u8],
    len: usize,
}

impl io::Write for SliceWriter<'_> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let end = self.len + data.len();
        if end > self.dst.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "reserved response region exhausted",
            ));
        }
        self.dst[self.len..end].copy_from_slice(data);
        self.len = end;
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
