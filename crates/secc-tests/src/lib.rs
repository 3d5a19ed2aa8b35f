//! Test harness for driving the engine as a vehicle would
//!
//! A minimal vehicle-side client over a real TCP connection: it frames and
//! serializes requests with the same development codec the engine uses and
//! unwraps the responses. Only for tests; failures panic.

use std::net::{Ipv6Addr, SocketAddr};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use secc_core::Header;
use secc_v2g::codec::{JsonCodec, MessageCodec, ProtocolGeneration};
use secc_v2g::framing::{self, HEADER_SIZE, PACKET_CAPACITY};
use secc_v2g::message::{
    AppProtocol, AuthorizationKind, AuthorizationReq, DcCableCheckReq, DcChargeLoopReq,
    DcChargeParameterDiscoveryReq, DcEvLimits, DcPreChargeReq, DcWeldingDetectionReq,
    PowerDeliveryReq, ChargeProgress, ChargingSessionKind, ServiceDiscoveryReq,
    ServiceSelectionReq, SessionSetupReq, SessionStopReq, SupportedAppProtocolReq, V2gMessage,
    SERVICE_ID_DC,
};
use secc_v2g::{EngineConfig, RationalNumber, SessionId};

/// Serialize and frame one message the way the engine's codec does.
pub fn frame(message: &V2gMessage) -> Vec<u8> {
    let codec = JsonCodec;
    let mut buf = vec![0u8; PACKET_CAPACITY];
    let len = codec.encode(message, &mut buf).expect("encode");
    framing::wrap(codec.payload_type(message), &buf[..len])
}

/// Engine configuration suitable for loopback tests.
pub fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.tcp_port = 0;
    config.sdp.enabled = false;
    config
}

/// A vehicle-side test client.
pub struct TestEv {
    stream: TcpStream,
}

impl TestEv {
    /// Connect to the engine's session endpoint on loopback.
    pub async fn connect(addr: SocketAddr) -> std::io::Result<Self> {
        let stream = TcpStream::connect((Ipv6Addr::LOCALHOST, addr.port())).await?;
        Ok(Self { stream })
    }

    pub async fn send(&mut self, message: &V2gMessage) {
        self.stream.write_all(&frame(message)).await.expect("send");
    }

    pub async fn recv(&mut self) -> V2gMessage {
        let mut header = [0u8; HEADER_SIZE];
        self.stream.read_exact(&mut header).await.expect("header");
        let payload_type = u16::from_be_bytes([header[2], header[3]]);
        let len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;
        let mut payload = vec![0u8; len];
        self.stream.read_exact(&mut payload).await.expect("payload");
        JsonCodec
            .decode(Some(ProtocolGeneration::Iso20Dc), payload_type, &payload)
            .expect("decode")
    }

    pub async fn request(&mut self, message: &V2gMessage) -> V2gMessage {
        self.send(message).await;
        self.recv().await
    }

    /// Assert the station tore the connection down.
    pub async fn expect_closed(&mut self) {
        let mut buf = [0u8; 1];
        assert_eq!(self.stream.read(&mut buf).await.expect("read"), 0);
    }
}

/// Request builders with sensible test defaults.
pub mod requests {
    use super::*;

    pub fn supported_app_protocol() -> V2gMessage {
        V2gMessage::SupportedAppProtocolReq(SupportedAppProtocolReq {
            app_protocols: vec![AppProtocol {
                protocol_namespace: ProtocolGeneration::Iso20Dc.namespace().to_string(),
                version_major: 1,
                version_minor: 0,
                schema_id: 3,
                priority: 1,
            }],
        })
    }

    pub fn session_setup(session_id: SessionId) -> V2gMessage {
        V2gMessage::SessionSetupReq(SessionSetupReq {
            header: Header::new(session_id),
            evcc_id: "WMIEV0TEST01".to_string(),
        })
    }

    pub fn service_discovery(session_id: SessionId) -> V2gMessage {
        V2gMessage::ServiceDiscoveryReq(ServiceDiscoveryReq {
            header: Header::new(session_id),
            supported_service_ids: None,
        })
    }

    pub fn service_selection(session_id: SessionId) -> V2gMessage {
        V2gMessage::ServiceSelectionReq(ServiceSelectionReq {
            header: Header::new(session_id),
            selected_energy_service: SERVICE_ID_DC,
        })
    }

    pub fn authorization(session_id: SessionId) -> V2gMessage {
        V2gMessage::AuthorizationReq(AuthorizationReq {
            header: Header::new(session_id),
            kind: AuthorizationKind::Eim,
        })
    }

    pub fn charge_parameter_discovery(session_id: SessionId) -> V2gMessage {
        V2gMessage::DcChargeParameterDiscoveryReq(DcChargeParameterDiscoveryReq {
            header: Header::new(session_id),
            ev_limits: DcEvLimits {
                max_voltage: RationalNumber::from_f32(410.0),
                max_current: RationalNumber::from_f32(125.0),
                energy_request: None,
            },
        })
    }

    pub fn cable_check(session_id: SessionId) -> V2gMessage {
        V2gMessage::DcCableCheckReq(DcCableCheckReq {
            header: Header::new(session_id),
        })
    }

    pub fn pre_charge(session_id: SessionId, target_voltage: f32) -> V2gMessage {
        V2gMessage::DcPreChargeReq(DcPreChargeReq {
            header: Header::new(session_id),
            target_voltage: RationalNumber::from_f32(target_voltage),
        })
    }

    pub fn power_delivery(session_id: SessionId, progress: ChargeProgress) -> V2gMessage {
        V2gMessage::PowerDeliveryReq(PowerDeliveryReq {
            header: Header::new(session_id),
            charge_progress: progress,
        })
    }

    pub fn charge_loop(session_id: SessionId, voltage: f32, current: f32) -> V2gMessage {
        V2gMessage::DcChargeLoopReq(DcChargeLoopReq {
            header: Header::new(session_id),
            target_voltage: RationalNumber::from_f32(voltage),
            target_current: RationalNumber::from_f32(current),
            charging_complete: false,
            display_parameters: None,
        })
    }

    pub fn welding_detection(session_id: SessionId) -> V2gMessage {
        V2gMessage::DcWeldingDetectionReq(DcWeldingDetectionReq {
            header: Header::new(session_id),
        })
    }

    pub fn session_stop(session_id: SessionId, termination: ChargingSessionKind) -> V2gMessage {
        V2gMessage::SessionStopReq(SessionStopReq {
            header: Header::new(session_id),
            termination,
        })
    }
}
