//! secc-v2g - Vehicle-facing charging-session protocol engine
//!
//! The station-side engine that discovers a vehicle on the local link,
//! establishes a stream connection and drives the charging negotiation
//! to completion.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Controller                            │
//! │  run(): one cooperative loop, never returns until abort      │
//! │                                                              │
//! │  ┌────────────┐   ┌───────────────────────────────────────┐  │
//! │  │ SdpServer  │   │ Session (at most one)                 │  │
//! │  │ (UDP       │   │  ┌────────────┐  ┌─────────────────┐  │  │
//! │  │ discovery) │   │  │SessionState│  │ TimeoutSet      │  │  │
//! │  └────────────┘   │  └─────┬──────┘  └─────────────────┘  │  │
//! │                   │        │                              │  │
//! │                   │  ┌─────┴──────────┐  ┌─────────────┐  │  │
//! │                   │  │MessageExchange │  │ControlEvent │  │  │
//! │                   │  │(codec boundary)│  │queue        │  │  │
//! │                   │  └─────┬──────────┘  └─────────────┘  │  │
//! │                   │        │                              │  │
//! │                   │  ┌─────┴───────┐                      │  │
//! │                   │  │PacketBuffer │                      │  │
//! │                   │  │+ Connection │                      │  │
//! │                   │  └─────────────┘                      │  │
//! │                   └───────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod codec;
pub mod config;
pub mod connection;
pub mod controller;
pub mod exchange;
pub mod framing;
pub mod message;
pub mod sdp;
pub mod session;

pub use codec::{CodecError, JsonCodec, MessageCodec, ProtocolGeneration};
pub use config::{ConfigError, EngineConfig, SdpConfig, TimeoutConfig, TlsPolicy};
pub use connection::{Connection, SecurityBackend, SecuredStream};
pub use controller::{Controller, ControllerHandle};
pub use exchange::{ExchangeError, MessageExchange, OutboundFrame, RESPONSE_CAPACITY};
pub use framing::{FramingError, FramingState, PacketBuffer, HEADER_SIZE, PACKET_CAPACITY};
pub use message::{MessageKind, ResponseCode, V2gMessage};
pub use sdp::{SdpServer, SecurityMode};
pub use session::{AuthStatus, Session, SessionContext, SessionEnd, SessionState};

// Re-export for convenience
pub use secc_core::{
    ControlEvent, DcTransferLimits, Feedback, Header, NullFeedback, RationalNumber, SessionId,
    SignalEvent, TransportError,
};
