//! The per-charging-session aggregate
//!
//! A session owns the state machine, the message exchange, the timeout set
//! and the live physical picture fed in through control events. It is
//! created when link discovery hands a vehicle over to the session endpoint
//! and destroyed when the terminal flag is set. All of it runs on the
//! protocol thread; the only outside contact points are the control-event
//! queue and the connection itself.

mod state;

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use secc_core::{
    ContactorState, ControlEvent, ControlEventReceiver, DcTransferLimits, Feedback,
    IsolationLevel, SessionId, SignalEvent, TimeoutKind, TimeoutSet,
};

use crate::codec::{MessageCodec, ProtocolGeneration};
use crate::config::TimeoutConfig;
use crate::connection::Connection;
use crate::exchange::{ExchangeError, MessageExchange};
use crate::framing::{FramingState, PacketBuffer};
use crate::message::{AppProtocol, AuthorizationKind, V2gMessage};

pub use state::SessionState;

/// Poll cadence of the timeout set.
const TIMER_TICK_MS: u64 = 50;

/// Authorization verdict shared with the surrounding application.
#[derive(Debug, Clone)]
pub struct AuthStatus {
    pub services: Vec<AuthorizationKind>,
    pub authorized: bool,
}

impl Default for AuthStatus {
    fn default() -> Self {
        Self {
            services: vec![AuthorizationKind::Eim],
            authorized: false,
        }
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Orderly termination requested by the vehicle.
    Terminated,
    /// Paused for a later resume; the session id stays valid.
    Paused,
    /// Protocol, framing, transport or timeout failure.
    Failed,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Exchange(#[from] ExchangeError),
}

/// Everything a session borrows from its surroundings.
pub struct SessionContext {
    pub evse_id: String,
    pub supported_protocols: Vec<AppProtocol>,
    pub timeouts: TimeoutConfig,
    pub limits: Arc<Mutex<DcTransferLimits>>,
    pub auth: Arc<Mutex<AuthStatus>>,
    pub feedback: Arc<dyn Feedback>,
    pub codec: Arc<dyn MessageCodec>,
    /// Session id retained from a paused session, if any.
    pub paused_session: Option<SessionId>,
}

/// One charging session.
pub struct Session {
    ctx: SessionContext,
    session_id: SessionId,
    generation: Option<ProtocolGeneration>,
    state: SessionState,
    exchange: MessageExchange,
    timeouts: TimeoutSet,
    // Live physical picture, updated by control events.
    present_voltage: f32,
    present_current: f32,
    contactor: ContactorState,
    charge_permission: bool,
    isolation: IsolationLevel,
    cable_check_done: Option<bool>,
    stop_requested: bool,
    fault: Option<String>,
    finished: Option<SessionEnd>,
}

impl Session {
    pub fn new(ctx: SessionContext) -> Self {
        let mut timeouts = TimeoutSet::new();
        // The first request must arrive within the sequence window.
        let _ = timeouts.start(TimeoutKind::Sequence, ctx.timeouts.sequence());
        Self {
            ctx,
            session_id: SessionId::ZERO,
            generation: None,
            state: SessionState::default(),
            exchange: MessageExchange::new(),
            timeouts,
            present_voltage: 0.0,
            present_current: 0.0,
            contactor: ContactorState::Open,
            charge_permission: false,
            isolation: IsolationLevel::Invalid,
            cable_check_done: None,
            stop_requested: false,
            fault: None,
            finished: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished.is_some()
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Mark the session terminal and report the link outcome.
    fn finish(&mut self, end: SessionEnd) {
        if self.finished.is_some() {
            return;
        }
        if end == SessionEnd::Failed && self.state.power_path_engaged() {
            self.ctx.feedback.signal(SignalEvent::DcOpenContactor);
        }
        self.ctx.feedback.signal(match end {
            SessionEnd::Terminated => SignalEvent::DlinkTerminate,
            SessionEnd::Paused => SignalEvent::DlinkPause,
            SessionEnd::Failed => SignalEvent::DlinkError,
        });
        self.finished = Some(end);
    }

    /// One activation for a decoded inbound message.
    pub(crate) fn on_wire_message(&mut self, message: V2gMessage) -> Result<(), SessionError> {
        self.exchange.set_request(message)?;
        let message = self.exchange.take_request()?;
        // An inbound request supersedes the running sequence window; it is
        // re-armed once the response is out and the session continues.
        self.timeouts.stop(TimeoutKind::Sequence);
        self.dispatch(message);
        if self.finished.is_none() {
            self.timeouts
                .restart(TimeoutKind::Sequence, self.ctx.timeouts.sequence());
        }
        Ok(())
    }

    /// One activation for a drained control event.
    pub(crate) fn on_control_event(&mut self, event: ControlEvent) {
        debug!(?event, "control event");
        match event {
            ControlEvent::Contactor(position) => self.contactor = position,
            ControlEvent::ChargePermission(granted) => self.charge_permission = granted,
            ControlEvent::PresentVoltageCurrent { voltage, current } => {
                self.present_voltage = voltage;
                self.present_current = current;
            }
            ControlEvent::AvailableLimits {
                max_voltage,
                max_current,
            } => {
                let mut limits = self.ctx.limits.lock();
                limits.max_voltage = max_voltage;
                limits.max_current = max_current;
            }
            ControlEvent::Isolation(level) => {
                self.isolation = level;
                if level == IsolationLevel::Fault {
                    self.fault = Some("isolation fault".to_string());
                }
            }
            ControlEvent::CableCheckFinished(ok) => self.cable_check_done = Some(ok),
            ControlEvent::StopRequested => self.stop_requested = true,
            ControlEvent::Fault(reason) => {
                warn!(%reason, "hardware fault reported");
                self.fault = Some(reason);
            }
        }
    }

    /// One activation for an expired timeout. The vehicle is presumed gone
    /// or the hardware too slow; no response is attempted.
    pub(crate) fn on_timeout(&mut self, kind: TimeoutKind) {
        warn!(?kind, state = ?self.state, "session timeout");
        self.finish(SessionEnd::Failed);
    }

    /// Serialize a response, converting failure into a terminal session.
    fn send(&mut self, message: V2gMessage) {
        if let Err(e) = self.exchange.respond(self.ctx.codec.as_ref(), &message) {
            error!(error = %e, kind = ?message.kind(), "response serialization failed");
            self.finish(SessionEnd::Failed);
        }
    }

    /// Run the session until terminal: multiplex the connection, the
    /// control-event queue and the timeout tick, one activation per
    /// iteration. The `biased` arm order makes an inbound message win over
    /// an expired timeout observed in the same iteration.
    ///
    /// Returns the session id to retain when the vehicle paused.
    pub async fn drive(
        mut self,
        mut connection: Connection,
        mut events: ControlEventReceiver,
    ) -> Option<SessionId> {
        let mut tick = time::interval(time::Duration::from_millis(TIMER_TICK_MS));
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut packet = PacketBuffer::new();

        let end = loop {
            let mut write_failed = false;
            if let Some(frame) = self.exchange.check_and_clear_response() {
                if let Err(e) = connection.write_all(frame.bytes).await {
                    warn!(error = %e, "response write failed");
                    write_failed = true;
                }
            }
            if write_failed {
                self.finish(SessionEnd::Failed);
            }
            if let Some(end) = self.finished {
                break end;
            }

            tokio::select! {
                biased;
                read = connection.read_some(packet.read_target()) => match read {
                    Ok(n) => {
                        packet.update_read_bytes(n);
                        match packet.state() {
                            FramingState::Complete => {
                                self.on_complete_packet(&packet);
                                packet = PacketBuffer::new();
                            }
                            FramingState::InvalidHeader | FramingState::PayloadTooLong => {
                                // Framing failures never reach the state
                                // machine; the connection dies here.
                                warn!(error = ?packet.error(), "framing failure");
                                self.finish(SessionEnd::Failed);
                            }
                            _ => {}
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "transport failure");
                        self.finish(SessionEnd::Failed);
                    }
                },
                Some(event) = events.next() => self.on_control_event(event),
                _ = tick.tick() => {
                    for kind in self.timeouts.check() {
                        self.on_timeout(kind);
                    }
                }
            }
        };

        connection.shutdown().await;
        info!(session = %self.session_id, ?end, "session ended");
        match end {
            SessionEnd::Paused => Some(self.session_id),
            _ => None,
        }
    }

    fn on_complete_packet(&mut self, packet: &PacketBuffer) {
        let payload_type = packet.payload_type().unwrap_or_default();
        let decoded = self
            .ctx
            .codec
            .decode(self.generation, payload_type, packet.payload());
        match decoded {
            Ok(message) => {
                if let Err(e) = self.on_wire_message(message) {
                    error!(error = %e, "message exchange violation");
                    self.finish(SessionEnd::Failed);
                }
            }
            Err(e) => {
                warn!(error = %e, "undecodable message");
                self.finish(SessionEnd::Failed);
            }
        }
    }
}
