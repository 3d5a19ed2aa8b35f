//! The session state machine
//!
//! One flat closed set of states; a transition replaces the active value.
//! Each activation consumes exactly one inbound request and produces at
//! most one response plus at most one transition. Anything arriving in the
//! wrong state is answered with a sequence-error response echoing the
//! offending message type, and the session becomes terminal.

use tracing::{info, warn};

use secc_core::{Header, Notification, RationalNumber, SessionId, SignalEvent, TimeoutKind};

use crate::codec::ProtocolGeneration;
use crate::message::{
    failed_response, AuthorizationRes, ChargeProgress, ChargingSessionKind, DcCableCheckRes,
    DcChargeLoopReq, DcChargeLoopRes, DcChargeParameterDiscoveryReq,
    DcChargeParameterDiscoveryRes, DcPreChargeRes, DcWeldingDetectionRes, EnergyService,
    EvseProcessing, MessageKind, PowerDeliveryReq, PowerDeliveryRes, ResponseCode,
    SapResponseCode, ServiceDiscoveryRes, ServiceSelectionReq, ServiceSelectionRes,
    SessionSetupReq, SessionSetupRes, SessionStopReq, SessionStopRes, SupportedAppProtocolReq,
    SupportedAppProtocolRes, V2gMessage, SERVICE_ID_DC,
};

use super::{Session, SessionEnd};

/// Charging negotiation phases.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Protocol handshake.
    #[default]
    SupportedAppProtocol,
    /// Session id establishment.
    SessionSetup,
    ServiceDiscovery,
    ServiceSelection,
    Authorization {
        /// The application has been asked for EIM authorization.
        prompted: bool,
    },
    ChargeParameterDiscovery,
    CableCheck {
        /// The hardware routine has been kicked off.
        started: bool,
    },
    PreCharge,
    ChargeLoop,
    WeldingDetection,
    SessionStop,
}

impl SessionState {
    /// True while the DC power path may be energized.
    pub(crate) fn power_path_engaged(&self) -> bool {
        matches!(
            self,
            SessionState::CableCheck { .. } | SessionState::PreCharge | SessionState::ChargeLoop
        )
    }
}

impl Session {
    /// Route one inbound request through the state machine.
    pub(super) fn dispatch(&mut self, message: V2gMessage) {
        let kind = message.kind();
        if !kind.is_request() {
            warn!(?kind, "response-typed message from the vehicle");
            self.sequence_error(kind);
            return;
        }
        if let Some(header) = message.header() {
            if let Some(notification) = &header.notification {
                info!(
                    fault_code = notification.fault_code,
                    text = %notification.message,
                    "vehicle notification"
                );
            }
            // The session id gates every other field. SessionSetup adopts
            // or validates the id itself.
            if self.state != SessionState::SessionSetup && header.session_id != self.session_id {
                warn!(
                    presented = %header.session_id,
                    established = %self.session_id,
                    "session id mismatch"
                );
                if let Some(response) =
                    failed_response(kind, self.session_id, ResponseCode::FailedUnknownSession)
                {
                    self.send(response);
                }
                self.finish(SessionEnd::Failed);
                return;
            }
        }

        let state = std::mem::take(&mut self.state);
        let next = match (state, message) {
            (SessionState::SupportedAppProtocol, V2gMessage::SupportedAppProtocolReq(req)) => {
                self.on_supported_app_protocol(req)
            }
            (SessionState::SessionSetup, V2gMessage::SessionSetupReq(req)) => {
                self.on_session_setup(req)
            }
            (SessionState::ServiceDiscovery, V2gMessage::ServiceDiscoveryReq(_)) => {
                self.on_service_discovery()
            }
            (SessionState::ServiceSelection, V2gMessage::ServiceSelectionReq(req)) => {
                self.on_service_selection(req)
            }
            (SessionState::Authorization { prompted }, V2gMessage::AuthorizationReq(_)) => {
                self.on_authorization(prompted)
            }
            (
                SessionState::ChargeParameterDiscovery,
                V2gMessage::DcChargeParameterDiscoveryReq(req),
            ) => self.on_charge_parameter_discovery(req),
            (SessionState::CableCheck { started }, V2gMessage::DcCableCheckReq(_)) => {
                self.on_cable_check(started)
            }
            (SessionState::PreCharge, V2gMessage::DcPreChargeReq(_)) => self.on_pre_charge(),
            (SessionState::PreCharge, V2gMessage::PowerDeliveryReq(req)) => {
                self.on_power_delivery(req, false)
            }
            (SessionState::ChargeLoop, V2gMessage::DcChargeLoopReq(req)) => {
                self.on_charge_loop(req)
            }
            (SessionState::ChargeLoop, V2gMessage::PowerDeliveryReq(req)) => {
                self.on_power_delivery(req, true)
            }
            (SessionState::WeldingDetection, V2gMessage::DcWeldingDetectionReq(_)) => {
                self.on_welding_detection()
            }
            (SessionState::WeldingDetection, V2gMessage::SessionStopReq(req)) => {
                self.on_session_stop(req)
            }
            (SessionState::SessionStop, V2gMessage::SessionStopReq(req)) => {
                self.on_session_stop(req)
            }
            (state, message) => {
                warn!(?state, kind = ?message.kind(), "message not expected in this state");
                // Put the state back before terminating so the power-path
                // bookkeeping sees the phase the violation happened in.
                self.state = state;
                self.sequence_error(message.kind());
                return;
            }
        };
        self.state = next;
    }

    /// Respond with the offending type echoed and a sequence-error code,
    /// then mark the session terminal.
    fn sequence_error(&mut self, kind: MessageKind) {
        if let Some(response) =
            failed_response(kind, self.session_id, ResponseCode::FailedSequenceError)
        {
            self.send(response);
        }
        self.finish(SessionEnd::Failed);
    }

    fn header(&self) -> Header {
        let header = Header::new(self.session_id);
        if self.stop_requested {
            header.with_notification(Notification {
                fault_code: 0,
                message: "station requests charge stop".to_string(),
            })
        } else {
            header
        }
    }

    fn on_supported_app_protocol(&mut self, req: SupportedAppProtocolReq) -> SessionState {
        let mut offers: Vec<_> = req.app_protocols.iter().collect();
        offers.sort_by_key(|offer| offer.priority);
        let selected = offers.into_iter().find_map(|offer| {
            let generation = ProtocolGeneration::from_namespace(&offer.protocol_namespace)?;
            self.ctx
                .supported_protocols
                .iter()
                .find(|supported| {
                    supported.protocol_namespace == offer.protocol_namespace
                        && supported.version_major == offer.version_major
                })
                .map(|_| (generation, offer.schema_id))
        });

        match selected {
            Some((generation, schema_id)) => {
                info!(namespace = generation.namespace(), "protocol negotiated");
                self.generation = Some(generation);
                self.ctx.feedback.selected_protocol(generation.namespace());
                self.send(V2gMessage::SupportedAppProtocolRes(SupportedAppProtocolRes {
                    response_code: SapResponseCode::OkSuccessfulNegotiation,
                    schema_id: Some(schema_id),
                }));
                SessionState::SessionSetup
            }
            None => {
                warn!("no mutually supported protocol, vehicle may retry");
                self.send(V2gMessage::SupportedAppProtocolRes(SupportedAppProtocolRes {
                    response_code: SapResponseCode::FailedNoNegotiation,
                    schema_id: None,
                }));
                SessionState::SupportedAppProtocol
            }
        }
    }

    fn on_session_setup(&mut self, req: SessionSetupReq) -> SessionState {
        let presented = req.header.session_id;
        let response_code = if presented.is_zero() {
            self.session_id = SessionId::random();
            ResponseCode::OkNewSessionEstablished
        } else if Some(presented) == self.ctx.paused_session {
            self.session_id = presented;
            ResponseCode::OkOldSessionJoined
        } else {
            warn!(presented = %presented, "vehicle presented a session this station does not hold");
            self.send(V2gMessage::SessionSetupRes(SessionSetupRes {
                header: Header::new(self.session_id),
                response_code: ResponseCode::FailedUnknownSession,
                evse_id: self.ctx.evse_id.clone(),
            }));
            self.finish(SessionEnd::Failed);
            return SessionState::SessionSetup;
        };

        self.ctx.feedback.evcc_id(&req.evcc_id);
        self.ctx.feedback.signal(SignalEvent::SetupFinished);
        info!(
            session = %self.session_id,
            evcc_id = %req.evcc_id,
            ?response_code,
            "session established"
        );
        self.send(V2gMessage::SessionSetupRes(SessionSetupRes {
            header: Header::new(self.session_id),
            response_code,
            evse_id: self.ctx.evse_id.clone(),
        }));
        SessionState::ServiceDiscovery
    }

    fn on_service_discovery(&mut self) -> SessionState {
        self.send(V2gMessage::ServiceDiscoveryRes(ServiceDiscoveryRes {
            header: self.header(),
            response_code: ResponseCode::Ok,
            service_renegotiation_supported: false,
            energy_transfer_services: vec![EnergyService {
                service_id: SERVICE_ID_DC,
                free_service: false,
            }],
        }));
        SessionState::ServiceSelection
    }

    fn on_service_selection(&mut self, req: ServiceSelectionReq) -> SessionState {
        if req.selected_energy_service != SERVICE_ID_DC {
            warn!(
                service = req.selected_energy_service,
                "unsupported energy service, vehicle may retry"
            );
            self.send(V2gMessage::ServiceSelectionRes(ServiceSelectionRes {
                header: self.header(),
                response_code: ResponseCode::FailedServiceSelectionInvalid,
            }));
            return SessionState::ServiceSelection;
        }
        self.send(V2gMessage::ServiceSelectionRes(ServiceSelectionRes {
            header: self.header(),
            response_code: ResponseCode::Ok,
        }));
        SessionState::Authorization { prompted: false }
    }

    fn on_authorization(&mut self, prompted: bool) -> SessionState {
        if !prompted {
            self.ctx.feedback.signal(SignalEvent::RequireAuthEim);
        }
        let authorized = self.ctx.auth.lock().authorized;
        if authorized {
            self.send(V2gMessage::AuthorizationRes(AuthorizationRes {
                header: self.header(),
                response_code: ResponseCode::Ok,
                processing: EvseProcessing::Finished,
            }));
            SessionState::ChargeParameterDiscovery
        } else {
            self.send(V2gMessage::AuthorizationRes(AuthorizationRes {
                header: self.header(),
                response_code: ResponseCode::Ok,
                processing: EvseProcessing::Ongoing,
            }));
            SessionState::Authorization { prompted: true }
        }
    }

    fn on_charge_parameter_discovery(
        &mut self,
        req: DcChargeParameterDiscoveryReq,
    ) -> SessionState {
        let limits = *self.ctx.limits.lock();
        if req.ev_limits.max_voltage.to_f32() < limits.min_voltage {
            warn!(
                ev_max_voltage = req.ev_limits.max_voltage.to_f32(),
                evse_min_voltage = limits.min_voltage,
                "vehicle envelope below the station minimum, vehicle may retry"
            );
            self.send(V2gMessage::DcChargeParameterDiscoveryRes(
                DcChargeParameterDiscoveryRes {
                    header: self.header(),
                    response_code: ResponseCode::FailedWrongChargeParameter,
                    max_voltage: RationalNumber::ZERO,
                    max_current: RationalNumber::ZERO,
                    max_power: RationalNumber::ZERO,
                    min_voltage: RationalNumber::ZERO,
                    min_current: RationalNumber::ZERO,
                },
            ));
            return SessionState::ChargeParameterDiscovery;
        }

        self.ctx.feedback.dc_max_limits(limits);
        self.send(V2gMessage::DcChargeParameterDiscoveryRes(
            DcChargeParameterDiscoveryRes {
                header: self.header(),
                response_code: ResponseCode::Ok,
                max_voltage: RationalNumber::from_f32(limits.max_voltage),
                max_current: RationalNumber::from_f32(limits.max_current),
                max_power: RationalNumber::from_f32(limits.max_power),
                min_voltage: RationalNumber::from_f32(limits.min_voltage),
                min_current: RationalNumber::from_f32(limits.min_current),
            },
        ));
        SessionState::CableCheck { started: false }
    }

    fn on_cable_check(&mut self, started: bool) -> SessionState {
        if self.fault.is_some() || self.cable_check_done == Some(false) {
            self.send(V2gMessage::DcCableCheckRes(DcCableCheckRes {
                header: self.header(),
                response_code: ResponseCode::Failed,
                processing: EvseProcessing::Finished,
            }));
            self.finish(SessionEnd::Failed);
            return SessionState::CableCheck { started };
        }

        let started = if started {
            started
        } else {
            self.ctx.feedback.signal(SignalEvent::StartCableCheck);
            if let Err(e) = self
                .timeouts
                .start(TimeoutKind::CableCheck, self.ctx.timeouts.cable_check())
            {
                warn!(error = %e, "cable check window not re-armed");
            }
            true
        };

        if self.cable_check_done == Some(true) {
            self.timeouts.stop(TimeoutKind::CableCheck);
            if let Err(e) = self
                .timeouts
                .start(TimeoutKind::PreCharge, self.ctx.timeouts.pre_charge())
            {
                warn!(error = %e, "pre-charge window not armed");
            }
            self.send(V2gMessage::DcCableCheckRes(DcCableCheckRes {
                header: self.header(),
                response_code: ResponseCode::Ok,
                processing: EvseProcessing::Finished,
            }));
            SessionState::PreCharge
        } else {
            self.send(V2gMessage::DcCableCheckRes(DcCableCheckRes {
                header: self.header(),
                response_code: ResponseCode::Ok,
                processing: EvseProcessing::Ongoing,
            }));
            SessionState::CableCheck { started }
        }
    }

    fn on_pre_charge(&mut self) -> SessionState {
        self.send(V2gMessage::DcPreChargeRes(DcPreChargeRes {
            header: self.header(),
            response_code: ResponseCode::Ok,
            present_voltage: RationalNumber::from_f32(self.present_voltage),
        }));
        SessionState::PreCharge
    }

    fn on_power_delivery(&mut self, req: PowerDeliveryReq, in_loop: bool) -> SessionState {
        self.timeouts.stop(TimeoutKind::PreCharge);
        match req.charge_progress {
            ChargeProgress::Start => {
                if !self.charge_permission {
                    warn!("power delivery start without charge permission from the pilot");
                }
                if !in_loop {
                    self.ctx.feedback.signal(SignalEvent::ChargeLoopStarted);
                }
                self.send(V2gMessage::PowerDeliveryRes(PowerDeliveryRes {
                    header: self.header(),
                    response_code: ResponseCode::Ok,
                }));
                SessionState::ChargeLoop
            }
            ChargeProgress::Stop => {
                if in_loop {
                    self.ctx.feedback.signal(SignalEvent::ChargeLoopFinished);
                }
                tracing::debug!(contactor = ?self.contactor, "stopping power delivery");
                self.ctx.feedback.signal(SignalEvent::DcOpenContactor);
                self.send(V2gMessage::PowerDeliveryRes(PowerDeliveryRes {
                    header: self.header(),
                    response_code: ResponseCode::Ok,
                }));
                SessionState::WeldingDetection
            }
        }
    }

    fn on_charge_loop(&mut self, req: DcChargeLoopReq) -> SessionState {
        if let Some(reason) = self.fault.clone() {
            warn!(%reason, "fault during energy transfer");
            self.ctx.feedback.signal(SignalEvent::ChargeLoopFinished);
            self.ctx.feedback.signal(SignalEvent::DcOpenContactor);
            self.send(V2gMessage::DcChargeLoopRes(DcChargeLoopRes {
                header: self.header(),
                response_code: ResponseCode::Failed,
                present_voltage: RationalNumber::from_f32(self.present_voltage),
                present_current: RationalNumber::from_f32(self.present_current),
            }));
            return SessionState::SessionStop;
        }

        self.ctx.feedback.dc_charge_target(secc_core::DcChargeTarget {
            voltage: req.target_voltage.to_f32(),
            current: req.target_current.to_f32(),
        });
        if let Some(display) = req.display_parameters {
            self.ctx.feedback.display_parameters(display);
        }
        self.send(V2gMessage::DcChargeLoopRes(DcChargeLoopRes {
            header: self.header(),
            response_code: ResponseCode::Ok,
            present_voltage: RationalNumber::from_f32(self.present_voltage),
            present_current: RationalNumber::from_f32(self.present_current),
        }));
        SessionState::ChargeLoop
    }

    fn on_welding_detection(&mut self) -> SessionState {
        self.send(V2gMessage::DcWeldingDetectionRes(DcWeldingDetectionRes {
            header: self.header(),
            response_code: ResponseCode::Ok,
            present_voltage: RationalNumber::from_f32(self.present_voltage),
        }));
        SessionState::WeldingDetection
    }

    fn on_session_stop(&mut self, req: SessionStopReq) -> SessionState {
        self.send(V2gMessage::SessionStopRes(SessionStopRes {
            header: Header::new(self.session_id),
            response_code: ResponseCode::Ok,
        }));
        let end = match req.termination {
            ChargingSessionKind::Terminate => SessionEnd::Terminated,
            ChargingSessionKind::Pause => SessionEnd::Paused,
        };
        self.finish(end);
        SessionState::SessionStop
    }
}
