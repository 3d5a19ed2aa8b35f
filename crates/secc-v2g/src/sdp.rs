//! Link discovery server
//!
//! Vehicles find the station by multicasting a discovery request on the
//! local link. The server answers with the station's session endpoint and
//! the transport-security mode selected by policy. Nothing is ever sent
//! back for a malformed request: no vehicle identity exists at this layer,
//! so an unauthenticated sender gets silence, not an error.
//!
//! Discovery runs continuously across sessions; an active charging session
//! does not pause it.

use std::net::{Ipv6Addr, SocketAddr, SocketAddrV6};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use secc_core::TransportError;

use crate::config::TlsPolicy;
use crate::framing::{self, payload_type, HEADER_SIZE};

/// Multicast group the discovery endpoint joins.
pub const SDP_MULTICAST_GROUP: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 1);

/// Discovery request payload length.
const REQUEST_PAYLOAD_LEN: usize = 2;
/// Discovery response payload length: address, port, security, transport.
const RESPONSE_PAYLOAD_LEN: usize = 20;

/// Transport-security mode bytes on the wire.
const SECURITY_TLS: u8 = 0x00;
const SECURITY_PLAIN: u8 = 0x10;
/// Stream transport marker (the only one served).
const TRANSPORT_TCP: u8 = 0x00;

/// Security mode carried in discovery messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityMode {
    Tls,
    Plain,
}

impl SecurityMode {
    fn from_wire(byte: u8) -> Option<Self> {
        match byte {
            SECURITY_TLS => Some(SecurityMode::Tls),
            SECURITY_PLAIN => Some(SecurityMode::Plain),
            _ => None,
        }
    }

    fn to_wire(self) -> u8 {
        match self {
            SecurityMode::Tls => SECURITY_TLS,
            SecurityMode::Plain => SECURITY_PLAIN,
        }
    }
}

/// A validated discovery request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SdpRequest {
    pub security: SecurityMode,
}

/// Parse one discovery datagram. `None` means drop it.
fn parse_request(data: &[u8]) -> Option<SdpRequest> {
    if data.len() != HEADER_SIZE + REQUEST_PAYLOAD_LEN {
        return None;
    }
    if data[0] != framing::PROTOCOL_VERSION || data[1] != framing::INVERSE_PROTOCOL_VERSION {
        return None;
    }
    if u16::from_be_bytes([data[2], data[3]]) != payload_type::SDP_REQUEST {
        return None;
    }
    if u32::from_be_bytes([data[4], data[5], data[6], data[7]]) != REQUEST_PAYLOAD_LEN as u32 {
        return None;
    }
    let security = SecurityMode::from_wire(data[8])?;
    if data[9] != TRANSPORT_TCP {
        return None;
    }
    Some(SdpRequest { security })
}

/// Select the advertised security mode, or refuse to answer.
fn select_security(
    policy: TlsPolicy,
    requested: SecurityMode,
    tls_available: bool,
) -> Option<SecurityMode> {
    match policy {
        TlsPolicy::RequireTls => tls_available.then_some(SecurityMode::Tls),
        TlsPolicy::ForbidTls => Some(SecurityMode::Plain),
        TlsPolicy::AcceptClientOffer => match requested {
            SecurityMode::Tls if tls_available => Some(SecurityMode::Tls),
            // Counter-offer the plaintext endpoint; the vehicle decides.
            _ => Some(SecurityMode::Plain),
        },
    }
}

/// Build the discovery response envelope.
fn build_response(endpoint: SocketAddrV6, security: SecurityMode) -> Vec<u8> {
    let mut payload = [0u8; RESPONSE_PAYLOAD_LEN];
    payload[..16].copy_from_slice(&endpoint.ip().octets());
    payload[16..18].copy_from_slice(&endpoint.port().to_be_bytes());
    payload[18] = security.to_wire();
    payload[19] = TRANSPORT_TCP;
    framing::wrap(payload_type::SDP_RESPONSE, &payload)
}

/// UDP responder advertising the station's session endpoint.
pub struct SdpServer {
    socket: UdpSocket,
    endpoint: SocketAddrV6,
    policy: TlsPolicy,
    tls_available: bool,
}

impl SdpServer {
    /// Bind the discovery socket and, unless bound to loopback, join the
    /// discovery multicast group on `interface`.
    pub async fn bind(
        bind: SocketAddr,
        interface: &str,
        endpoint: SocketAddrV6,
        policy: TlsPolicy,
        tls_available: bool,
    ) -> Result<Self, TransportError> {
        let socket = Socket::new(Domain::IPV6, Type::DGRAM, Some(Protocol::UDP))
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        socket
            .set_reuse_address(true)
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        socket
            .bind(&bind.into())
            .map_err(|e| TransportError::ConnectionFailed(format!("bind {bind}: {e}")))?;

        let loopback = match bind {
            SocketAddr::V6(v6) => v6.ip().is_loopback(),
            SocketAddr::V4(v4) => v4.ip().is_loopback(),
        };
        if !loopback {
            let index = interface_index(interface).ok_or_else(|| {
                TransportError::InvalidConfig(format!("unknown interface {interface}"))
            })?;
            socket
                .join_multicast_v6(&SDP_MULTICAST_GROUP, index)
                .map_err(|e| TransportError::ConnectionFailed(format!("multicast join: {e}")))?;
        }

        let socket = UdpSocket::from_std(socket.into())
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        info!(%bind, %endpoint, ?policy, "discovery server listening");
        Ok(Self {
            socket,
            endpoint,
            policy,
            tls_available,
        })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.local_addr().ok()
    }

    /// Advertise the secured endpoint once a security backend exists.
    pub fn set_tls_available(&mut self, available: bool) {
        self.tls_available = available;
    }

    /// Receive and answer one discovery datagram.
    pub async fn process_one(&self) -> Result<(), TransportError> {
        let mut buf = [0u8; 64];
        let (n, peer) = self
            .socket
            .recv_from(&mut buf)
            .await
            .map_err(|e| TransportError::ReceiveFailed(e.to_string()))?;
        let Some(request) = parse_request(&buf[..n]) else {
            debug!(%peer, len = n, "dropping malformed discovery datagram");
            return Ok(());
        };
        let Some(security) = select_security(self.policy, request.security, self.tls_available)
        else {
            warn!(%peer, "no transport-security mode satisfies the policy");
            return Ok(());
        };
        let response = build_response(self.endpoint, security);
        self.socket
            .send_to(&response, peer)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        debug!(%peer, ?security, "answered discovery request");
        Ok(())
    }
}

#[cfg(unix)]
fn interface_index(name: &str) -> Option<u32> {
    let c_name = std::ffi::CString::new(name).ok()?;
    // SAFETY: if_nametoindex reads a NUL-terminated string and returns 0 on
    // failure; no memory is retained.
    match unsafe { libc::if_nametoindex(c_name.as_ptr()) } {
        0 => None,
        index => Some(index),
    }
}

#[cfg(not(unix))]
fn interface_index(_name: &str) -> Option<u32> {
    None
}

/// Build a discovery request datagram. Used by clients and tests.
pub fn build_request(security: SecurityMode) -> Vec<u8> {
    framing::wrap(
        payload_type::SDP_REQUEST,
        &[security.to_wire(), TRANSPORT_TCP],
    )
}

/// Parse a discovery response datagram. Used by clients and tests.
pub fn parse_response(data: &[u8]) -> Option<(SocketAddrV6, SecurityMode)> {
    if data.len() != HEADER_SIZE + RESPONSE_PAYLOAD_LEN {
        return None;
    }
    if u16::from_be_bytes([data[2], data[3]]) != payload_type::SDP_RESPONSE {
        return None;
    }
    let mut octets = [0u8; 16];
    octets.copy_from_slice(&data[8..24]);
    let port = u16::from_be_bytes([data[24], data[25]]);
    let security = SecurityMode::from_wire(data[26])?;
    Some((SocketAddrV6::new(Ipv6Addr::from(octets), port, 0, 0), security))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn endpoint() -> SocketAddrV6 {
        SocketAddrV6::new(Ipv6Addr::LOCALHOST, 61851, 0, 0)
    }

    #[test]
    fn request_round_trip() {
        let datagram = build_request(SecurityMode::Plain);
        assert_eq!(
            parse_request(&datagram),
            Some(SdpRequest {
                security: SecurityMode::Plain
            })
        );
    }

    #[test]
    fn malformed_requests_are_dropped() {
        // Too short, bad markers, wrong payload type, bad security byte.
        assert_eq!(parse_request(b"\x01\xfe"), None);
        let mut bad_marker = build_request(SecurityMode::Tls);
        bad_marker[1] = 0xFD;
        assert_eq!(parse_request(&bad_marker), None);
        let mut bad_type = build_request(SecurityMode::Tls);
        bad_type[3] = 0x01;
        assert_eq!(parse_request(&bad_type), None);
        let mut bad_security = build_request(SecurityMode::Tls);
        bad_security[8] = 0x42;
        assert_eq!(parse_request(&bad_security), None);
    }

    #[test]
    fn response_round_trip() {
        let datagram = build_response(endpoint(), SecurityMode::Tls);
        assert_eq!(datagram.len(), HEADER_SIZE + RESPONSE_PAYLOAD_LEN);
        let (addr, security) = parse_response(&datagram).unwrap();
        assert_eq!(addr, endpoint());
        assert_eq!(security, SecurityMode::Tls);
    }

    #[test]
    fn policy_selects_the_advertised_mode() {
        use TlsPolicy::*;
        // (policy, requested, tls available) -> selected
        let cases = [
            (AcceptClientOffer, SecurityMode::Tls, true, Some(SecurityMode::Tls)),
            (AcceptClientOffer, SecurityMode::Tls, false, Some(SecurityMode::Plain)),
            (AcceptClientOffer, SecurityMode::Plain, true, Some(SecurityMode::Plain)),
            (RequireTls, SecurityMode::Plain, true, Some(SecurityMode::Tls)),
            (RequireTls, SecurityMode::Tls, false, None),
            (ForbidTls, SecurityMode::Tls, true, Some(SecurityMode::Plain)),
        ];
        for (policy, requested, tls_available, expected) in cases {
            assert_eq!(
                select_security(policy, requested, tls_available),
                expected,
                "{policy:?} {requested:?} tls={tls_available}"
            );
        }
    }

    #[tokio::test]
    async fn answers_over_loopback_udp() {
        let server = SdpServer::bind(
            "[::1]:0".parse().unwrap(),
            "lo",
            endpoint(),
            TlsPolicy::ForbidTls,
            false,
        )
        .await
        .unwrap();
        let server_addr = server.local_addr().unwrap();

        let client = UdpSocket::bind("[::1]:0").await.unwrap();
        client
            .send_to(&build_request(SecurityMode::Tls), server_addr)
            .await
            .unwrap();

        server.process_one().await.unwrap();

        let mut buf = [0u8; 64];
        let (n, _) = client.recv_from(&mut buf).await.unwrap();
        let (addr, security) = parse_response(&buf[..n]).unwrap();
        assert_eq!(addr, endpoint());
        assert_eq!(security, SecurityMode::Plain);
    }
}
