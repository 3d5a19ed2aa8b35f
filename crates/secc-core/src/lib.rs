//! secc-core - Core types for the SECC charging-session engine
//!
//! This crate provides the types shared between the protocol engine and the
//! surrounding charging-station application: session identity, physical
//! values, out-of-band control events, the per-session timeout set, and the
//! feedback interface through which the engine reports session lifecycle
//! and measurement information.

pub mod error;
pub mod event;
pub mod feedback;
pub mod id;
pub mod physical;
pub mod timeout;

pub use error::TransportError;
pub use event::{
    control_event_channel, ContactorState, ControlEvent, ControlEventReceiver,
    ControlEventSender, EventQueueError, IsolationLevel, CONTROL_EVENT_CAPACITY,
};
pub use feedback::{
    DcChargeTarget, DcTransferLimits, DisplayParameters, Feedback, NullFeedback, SignalEvent,
};
pub use id::{Header, Notification, SessionId};
pub use physical::RationalNumber;
pub use timeout::{TimeoutError, TimeoutKind, TimeoutSet};
