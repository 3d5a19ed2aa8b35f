//! Application message catalog
//!
//! One closed variant over every request/response the engine exchanges with
//! a vehicle: the protocol handshake pair plus the DC charging catalog.
//! Instances are produced only by a codec decoding a complete envelope and
//! are consumed exactly once by the state being executed.

use serde::{Deserialize, Serialize};

use secc_core::{DisplayParameters, Header, RationalNumber, SessionId};

/// Response codes of the mainstream catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseCode {
    Ok,
    OkNewSessionEstablished,
    OkOldSessionJoined,
    Failed,
    FailedUnknownSession,
    FailedSequenceError,
    FailedServiceSelectionInvalid,
    FailedWrongChargeParameter,
}

impl ResponseCode {
    pub fn is_ok(self) -> bool {
        matches!(
            self,
            ResponseCode::Ok
                | ResponseCode::OkNewSessionEstablished
                | ResponseCode::OkOldSessionJoined
        )
    }
}

/// Station-side processing indication for slow operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvseProcessing {
    Finished,
    Ongoing,
}

/// Outcome of the protocol handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SapResponseCode {
    OkSuccessfulNegotiation,
    OkSuccessfulNegotiationWithMinorDeviation,
    FailedNoNegotiation,
}

/// One protocol offer in the handshake request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppProtocol {
    pub protocol_namespace: String,
    pub version_major: u32,
    pub version_minor: u32,
    pub schema_id: u8,
    pub priority: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupportedAppProtocolReq {
    pub app_protocols: Vec<AppProtocol>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupportedAppProtocolRes {
    pub response_code: SapResponseCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_id: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSetupReq {
    pub header: Header,
    pub evcc_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSetupRes {
    pub header: Header,
    pub response_code: ResponseCode,
    pub evse_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDiscoveryReq {
    pub header: Header,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supported_service_ids: Option<Vec<u16>>,
}

/// An energy transfer service offered by the station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnergyService {
    pub service_id: u16,
    pub free_service: bool,
}

/// Service id of DC energy transfer with external payment.
pub const SERVICE_ID_DC: u16 = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDiscoveryRes {
    pub header: Header,
    pub response_code: ResponseCode,
    pub service_renegotiation_supported: bool,
    pub energy_transfer_services: Vec<EnergyService>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSelectionReq {
    pub header: Header,
    pub selected_energy_service: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSelectionRes {
    pub header: Header,
    pub response_code: ResponseCode,
}

/// Authorization flavors. Contract-based payment is out of scope; external
/// identification is the only member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthorizationKind {
    Eim,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationReq {
    pub header: Header,
    pub kind: AuthorizationKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationRes {
    pub header: Header,
    pub response_code: ResponseCode,
    pub processing: EvseProcessing,
}

/// Vehicle-side DC charging envelope.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DcEvLimits {
    pub max_voltage: RationalNumber,
    pub max_current: RationalNumber,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy_request: Option<RationalNumber>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DcChargeParameterDiscoveryReq {
    pub header: Header,
    pub ev_limits: DcEvLimits,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DcChargeParameterDiscoveryRes {
    pub header: Header,
    pub response_code: ResponseCode,
    pub max_voltage: RationalNumber,
    pub max_current: RationalNumber,
    pub max_power: RationalNumber,
    pub min_voltage: RationalNumber,
    pub min_current: RationalNumber,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DcCableCheckReq {
    pub header: Header,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DcCableCheckRes {
    pub header: Header,
    pub response_code: ResponseCode,
    pub processing: EvseProcessing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DcPreChargeReq {
    pub header: Header,
    pub target_voltage: RationalNumber,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DcPreChargeRes {
    pub header: Header,
    pub response_code: ResponseCode,
    pub present_voltage: RationalNumber,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChargeProgress {
    Start,
    Stop,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerDeliveryReq {
    pub header: Header,
    pub charge_progress: ChargeProgress,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerDeliveryRes {
    pub header: Header,
    pub response_code: ResponseCode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DcChargeLoopReq {
    pub header: Header,
    pub target_voltage: RationalNumber,
    pub target_current: RationalNumber,
    pub charging_complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_parameters: Option<DisplayParameters>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DcChargeLoopRes {
    pub header: Header,
    pub response_code: ResponseCode,
    pub present_voltage: RationalNumber,
    pub present_current: RationalNumber,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DcWeldingDetectionReq {
    pub header: Header,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DcWeldingDetectionRes {
    pub header: Header,
    pub response_code: ResponseCode,
    pub present_voltage: RationalNumber,
}

/// How the vehicle ends the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChargingSessionKind {
    Terminate,
    Pause,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStopReq {
    pub header: Header,
    pub termination: ChargingSessionKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStopRes {
    pub header: Header,
    pub response_code: ResponseCode,
}

/// Closed variant over every wire message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body")]
pub enum V2gMessage {
    SupportedAppProtocolReq(SupportedAppProtocolReq),
    SupportedAppProtocolRes(SupportedAppProtocolRes),
    SessionSetupReq(SessionSetupReq),
    SessionSetupRes(SessionSetupRes),
    ServiceDiscoveryReq(ServiceDiscoveryReq),
    ServiceDiscoveryRes(ServiceDiscoveryRes),
    ServiceSelectionReq(ServiceSelectionReq),
    ServiceSelectionRes(ServiceSelectionRes),
    AuthorizationReq(AuthorizationReq),
    AuthorizationRes(AuthorizationRes),
    DcChargeParameterDiscoveryReq(DcChargeParameterDiscoveryReq),
    DcChargeParameterDiscoveryRes(DcChargeParameterDiscoveryRes),
    DcCableCheckReq(DcCableCheckReq),
    DcCableCheckRes(DcCableCheckRes),
    DcPreChargeReq(DcPreChargeReq),
    DcPreChargeRes(DcPreChargeRes),
    PowerDeliveryReq(PowerDeliveryReq),
    PowerDeliveryRes(PowerDeliveryRes),
    DcChargeLoopReq(DcChargeLoopReq),
    DcChargeLoopRes(DcChargeLoopRes),
    DcWeldingDetectionReq(DcWeldingDetectionReq),
    DcWeldingDetectionRes(DcWeldingDetectionRes),
    SessionStopReq(SessionStopReq),
    SessionStopRes(SessionStopRes),
}

/// Message type tag, used for logging and for echoing the offending type in
/// a sequence-error response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    SupportedAppProtocolReq,
    SupportedAppProtocolRes,
    SessionSetupReq,
    SessionSetupRes,
    ServiceDiscoveryReq,
    ServiceDiscoveryRes,
    ServiceSelectionReq,
    ServiceSelectionRes,
    AuthorizationReq,
    AuthorizationRes,
    DcChargeParameterDiscoveryReq,
    DcChargeParameterDiscoveryRes,
    DcCableCheckReq,
    DcCableCheckRes,
    DcPreChargeReq,
    DcPreChargeRes,
    PowerDeliveryReq,
    PowerDeliveryRes,
    DcChargeLoopReq,
    DcChargeLoopRes,
    DcWeldingDetectionReq,
    DcWeldingDetectionRes,
    SessionStopReq,
    SessionStopRes,
}

impl MessageKind {
    pub fn is_request(self) -> bool {
        matches!(
            self,
            MessageKind::SupportedAppProtocolReq
                | MessageKind::SessionSetupReq
                | MessageKind::ServiceDiscoveryReq
                | MessageKind::ServiceSelectionReq
                | MessageKind::AuthorizationReq
                | MessageKind::DcChargeParameterDiscoveryReq
                | MessageKind::DcCableCheckReq
                | MessageKind::DcPreChargeReq
                | MessageKind::PowerDeliveryReq
                | MessageKind::DcChargeLoopReq
                | MessageKind::DcWeldingDetectionReq
                | MessageKind::SessionStopReq
        )
    }

    /// Response kind paired with a request kind.
    pub fn response_counterpart(self) -> Option<MessageKind> {
        Some(match self {
            MessageKind::SupportedAppProtocolReq => MessageKind::SupportedAppProtocolRes,
            MessageKind::SessionSetupReq => MessageKind::SessionSetupRes,
            MessageKind::ServiceDiscoveryReq => MessageKind::ServiceDiscoveryRes,
            MessageKind::ServiceSelectionReq => MessageKind::ServiceSelectionRes,
            MessageKind::AuthorizationReq => MessageKind::AuthorizationRes,
            MessageKind::DcChargeParameterDiscoveryReq => {
                MessageKind::DcChargeParameterDiscoveryRes
            }
            MessageKind::DcCableCheckReq => MessageKind::DcCableCheckRes,
            MessageKind::DcPreChargeReq => MessageKind::DcPreChargeRes,
            MessageKind::PowerDeliveryReq => MessageKind::PowerDeliveryRes,
            MessageKind::DcChargeLoopReq => MessageKind::DcChargeLoopRes,
            MessageKind::DcWeldingDetectionReq => MessageKind::DcWeldingDetectionRes,
            MessageKind::SessionStopReq => MessageKind::SessionStopRes,
            _ => return None,
        })
    }
}

impl V2gMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            V2gMessage::SupportedAppProtocolReq(_) => MessageKind::SupportedAppProtocolReq,
            V2gMessage::SupportedAppProtocolRes(_) => MessageKind::SupportedAppProtocolRes,
            V2gMessage::SessionSetupReq(_) => MessageKind::SessionSetupReq,
            V2gMessage::SessionSetupRes(_) => MessageKind::SessionSetupRes,
            V2gMessage::ServiceDiscoveryReq(_) => MessageKind::ServiceDiscoveryReq,
            V2gMessage::ServiceDiscoveryRes(_) => MessageKind::ServiceDiscoveryRes,
            V2gMessage::ServiceSelectionReq(_) => MessageKind::ServiceSelectionReq,
            V2gMessage::ServiceSelectionRes(_) => MessageKind::ServiceSelectionRes,
            V2gMessage::AuthorizationReq(_) => MessageKind::AuthorizationReq,
            V2gMessage::AuthorizationRes(_) => MessageKind::AuthorizationRes,
            V2gMessage::DcChargeParameterDiscoveryReq(_) => {
                MessageKind::DcChargeParameterDiscoveryReq
            }
            V2gMessage::DcChargeParameterDiscoveryRes(_) => {
                MessageKind::DcChargeParameterDiscoveryRes
            }
            V2gMessage::DcCableCheckReq(_) => MessageKind::DcCableCheckReq,
            V2gMessage::DcCableCheckRes(_) => MessageKind::DcCableCheckRes,
            V2gMessage::DcPreChargeReq(_) => MessageKind::DcPreChargeReq,
            V2gMessage::DcPreChargeRes(_) => MessageKind::DcPreChargeRes,
            V2gMessage::PowerDeliveryReq(_) => MessageKind::PowerDeliveryReq,
            V2gMessage::PowerDeliveryRes(_) => MessageKind::PowerDeliveryRes,
            V2gMessage::DcChargeLoopReq(_) => MessageKind::DcChargeLoopReq,
            V2gMessage::DcChargeLoopRes(_) => MessageKind::DcChargeLoopRes,
            V2gMessage::DcWeldingDetectionReq(_) => MessageKind::DcWeldingDetectionReq,
            V2gMessage::DcWeldingDetectionRes(_) => MessageKind::DcWeldingDetectionRes,
            V2gMessage::SessionStopReq(_) => MessageKind::SessionStopReq,
            V2gMessage::SessionStopRes(_) => MessageKind::SessionStopRes,
        }
    }

    /// The message header, absent on the handshake pair.
    pub fn header(&self) -> Option<&Header> {
        match self {
            V2gMessage::SupportedAppProtocolReq(_) | V2gMessage::SupportedAppProtocolRes(_) => {
                None
            }
            V2gMessage::SessionSetupReq(m) => Some(&m.header),
            V2gMessage::SessionSetupRes(m) => Some(&m.header),
            V2gMessage::ServiceDiscoveryReq(m) => Some(&m.header),
            V2gMessage::ServiceDiscoveryRes(m) => Some(&m.header),
            V2gMessage::ServiceSelectionReq(m) => Some(&m.header),
            V2gMessage::ServiceSelectionRes(m) => Some(&m.header),
            V2gMessage::AuthorizationReq(m) => Some(&m.header),
            V2gMessage::AuthorizationRes(m) => Some(&m.header),
            V2gMessage::DcChargeParameterDiscoveryReq(m) => Some(&m.header),
            V2gMessage::DcChargeParameterDiscoveryRes(m) => Some(&m.header),
            V2gMessage::DcCableCheckReq(m) => Some(&m.header),
            V2gMessage::DcCableCheckRes(m) => Some(&m.header),
            V2gMessage::DcPreChargeReq(m) => Some(&m.header),
            V2gMessage::DcPreChargeRes(m) => Some(&m.header),
            V2gMessage::PowerDeliveryReq(m) => Some(&m.header),
            V2gMessage::PowerDeliveryRes(m) => Some(&m.header),
            V2gMessage::DcChargeLoopReq(m) => Some(&m.header),
            V2gMessage::DcChargeLoopRes(m) => Some(&m.header),
            V2gMessage::DcWeldingDetectionReq(m) => Some(&m.header),
            V2gMessage::DcWeldingDetectionRes(m) => Some(&m.header),
            V2gMessage::SessionStopReq(m) => Some(&m.header),
            V2gMessage::SessionStopRes(m) => Some(&m.header),
        }
    }

    /// True for the handshake pair, which rides its own payload type.
    pub fn is_handshake(&self) -> bool {
        matches!(
            self,
            V2gMessage::SupportedAppProtocolReq(_) | V2gMessage::SupportedAppProtocolRes(_)
        )
    }
}

/// Build the error response echoing an unexpected request's type.
///
/// Returns `None` when the offending message has no response counterpart
/// (a vehicle sending response-typed messages gets nothing back).
pub fn failed_response(
    kind: MessageKind,
    session_id: SessionId,
    code: ResponseCode,
) -> Option<V2gMessage> {
    let header = Header::new(session_id);
    let counterpart = kind.response_counterpart()?;
    Some(match counterpart {
        MessageKind::SupportedAppProtocolRes => {
            V2gMessage::SupportedAppProtocolRes(SupportedAppProtocolRes {
                response_code: SapResponseCode::FailedNoNegotiation,
                schema_id: None,
            })
        }
        MessageKind::SessionSetupRes => V2gMessage::SessionSetupRes(SessionSetupRes {
            header,
            response_code: code,
            evse_id: String::new(),
        }),
        MessageKind::ServiceDiscoveryRes => V2gMessage::ServiceDiscoveryRes(ServiceDiscoveryRes {
            header,
            response_code: code,
            service_renegotiation_supported: false,
            energy_transfer_services: Vec::new(),
        }),
        MessageKind::ServiceSelectionRes => {
            V2gMessage::ServiceSelectionRes(ServiceSelectionRes {
                header,
                response_code: code,
            })
        }
        MessageKind::AuthorizationRes => V2gMessage::AuthorizationRes(AuthorizationRes {
            header,
            response_code: code,
            processing: EvseProcessing::Finished,
        }),
        MessageKind::DcChargeParameterDiscoveryRes => {
            V2gMessage::DcChargeParameterDiscoveryRes(DcChargeParameterDiscoveryRes {
                header,
                response_code: code,
                max_voltage: RationalNumber::ZERO,
                max_current: RationalNumber::ZERO,
                max_power: RationalNumber::ZERO,
                min_voltage: RationalNumber::ZERO,
                min_current: RationalNumber::ZERO,
            })
        }
        MessageKind::DcCableCheckRes => V2gMessage::DcCableCheckRes(DcCableCheckRes {
            header,
            response_code: code,
            processing: EvseProcessing::Finished,
        }),
        MessageKind::DcPreChargeRes => V2gMessage::DcPreChargeRes(DcPreChargeRes {
            header,
            response_code: code,
            present_voltage: RationalNumber::ZERO,
        }),
        MessageKind::PowerDeliveryRes => V2gMessage::PowerDeliveryRes(PowerDeliveryRes {
            header,
            response_code: code,
        }),
        MessageKind::DcChargeLoopRes => V2gMessage::DcChargeLoopRes(DcChargeLoopRes {
            header,
            response_code: code,
            present_voltage: RationalNumber::ZERO,
            present_current: RationalNumber::ZERO,
        }),
        MessageKind::DcWeldingDetectionRes => {
            V2gMessage::DcWeldingDetectionRes(DcWeldingDetectionRes {
                header,
                response_code: code,
                present_voltage: RationalNumber::ZERO,
            })
        }
        MessageKind::SessionStopRes => V2gMessage::SessionStopRes(SessionStopRes {
            header,
            response_code: code,
        }),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_request_has_a_response_counterpart() {
        let requests = [
            MessageKind::SupportedAppProtocolReq,
            MessageKind::SessionSetupReq,
            MessageKind::ServiceDiscoveryReq,
            MessageKind::ServiceSelectionReq,
            MessageKind::AuthorizationReq,
            MessageKind::DcChargeParameterDiscoveryReq,
            MessageKind::DcCableCheckReq,
            MessageKind::DcPreChargeReq,
            MessageKind::PowerDeliveryReq,
            MessageKind::DcChargeLoopReq,
            MessageKind::DcWeldingDetectionReq,
            MessageKind::SessionStopReq,
        ];
        for kind in requests {
            assert!(kind.is_request());
            assert!(kind.response_counterpart().is_some(), "{kind:?}");
        }
        assert!(MessageKind::SessionStopRes.response_counterpart().is_none());
    }

    #[test]
    fn sequence_error_echo_carries_the_offending_kind() {
        let echoed = failed_response(
            MessageKind::DcPreChargeReq,
            SessionId::ZERO,
            ResponseCode::FailedSequenceError,
        )
        .unwrap();
        assert_eq!(echoed.kind(), MessageKind::DcPreChargeRes);
        match echoed {
            V2gMessage::DcPreChargeRes(res) => {
                assert_eq!(res.response_code, ResponseCode::FailedSequenceError);
            }
            other => panic!("unexpected echo {other:?}"),
        }
    }

    #[test]
    fn response_typed_inbound_has_no_echo() {
        assert!(failed_response(
            MessageKind::DcChargeLoopRes,
            SessionId::ZERO,
            ResponseCode::FailedSequenceError,
        )
        .is_none());
    }
}
