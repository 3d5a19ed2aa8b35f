//! Engine configuration
//!
//! Loaded from a TOML file by the daemon; every field carries a default so
//! a bare `[engine]` table (or no file at all) yields a working plaintext
//! setup.

use std::net::Ipv6Addr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use secc_core::DcTransferLimits;

use crate::codec::ProtocolGeneration;
use crate::message::AppProtocol;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("cannot parse {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

/// Transport-security negotiation strategy for link discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TlsPolicy {
    /// Answer with whichever mode the vehicle offered, if available.
    AcceptClientOffer,
    /// Always advertise the secured endpoint.
    RequireTls,
    /// Always advertise the plaintext endpoint.
    ForbidTls,
}

impl Default for TlsPolicy {
    fn default() -> Self {
        TlsPolicy::AcceptClientOffer
    }
}

/// Link discovery server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SdpConfig {
    /// Serve discovery requests at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// UDP port of the discovery endpoint.
    #[serde(default = "default_sdp_port")]
    pub port: u16,
}

impl Default for SdpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_sdp_port(),
        }
    }
}

/// Session timeout windows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// The vehicle must send its next request within this window.
    #[serde(default = "default_sequence_ms")]
    pub sequence_ms: u64,
    /// The cable check must finish within this window.
    #[serde(default = "default_cable_check_ms")]
    pub cable_check_ms: u64,
    /// The pre-charge ramp must converge within this window.
    #[serde(default = "default_pre_charge_ms")]
    pub pre_charge_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            sequence_ms: default_sequence_ms(),
            cable_check_ms: default_cable_check_ms(),
            pre_charge_ms: default_pre_charge_ms(),
        }
    }
}

impl TimeoutConfig {
    pub fn sequence(&self) -> Duration {
        Duration::from_millis(self.sequence_ms)
    }

    pub fn cable_check(&self) -> Duration {
        Duration::from_millis(self.cable_check_ms)
    }

    pub fn pre_charge(&self) -> Duration {
        Duration::from_millis(self.pre_charge_ms)
    }
}

/// Configuration of the whole engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Network interface the station faces the vehicle on.
    #[serde(default = "default_interface")]
    pub interface: String,
    /// Identifier reported to the vehicle during session setup.
    #[serde(default = "default_evse_id")]
    pub evse_id: String,
    /// TCP port of the session endpoint; 0 picks an ephemeral port.
    #[serde(default)]
    pub tcp_port: u16,
    /// Address advertised in discovery responses.
    #[serde(default = "default_advertised_address")]
    pub advertised_address: Ipv6Addr,
    #[serde(default)]
    pub sdp: SdpConfig,
    #[serde(default)]
    pub tls_policy: TlsPolicy,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// Initial DC operating envelope, updatable at runtime.
    #[serde(default)]
    pub limits: DcTransferLimits,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            interface: default_interface(),
            evse_id: default_evse_id(),
            tcp_port: 0,
            advertised_address: default_advertised_address(),
            sdp: SdpConfig::default(),
            tls_policy: TlsPolicy::default(),
            timeouts: TimeoutConfig::default(),
            limits: DcTransferLimits::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Protocol offers the station accepts during the handshake.
    pub fn supported_app_protocols(&self) -> Vec<AppProtocol> {
        vec![AppProtocol {
            protocol_namespace: ProtocolGeneration::Iso20Dc.namespace().to_string(),
            version_major: 1,
            version_minor: 0,
            schema_id: 1,
            priority: 1,
        }]
    }
}

fn default_true() -> bool {
    true
}

fn default_sdp_port() -> u16 {
    15118
}

fn default_interface() -> String {
    "eth0".to_string()
}

fn default_evse_id() -> String {
    "DE*SEC*E1*1".to_string()
}

fn default_advertised_address() -> Ipv6Addr {
    Ipv6Addr::LOCALHOST
}

fn default_sequence_ms() -> u64 {
    60_000
}

fn default_cable_check_ms() -> u64 {
    40_000
}

fn default_pre_charge_ms() -> u64 {
    7_000
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn empty_document_yields_defaults() {
        let config: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(config.interface, "eth0");
        assert_eq!(config.sdp.port, 15118);
        assert!(config.sdp.enabled);
        assert_eq!(config.tls_policy, TlsPolicy::AcceptClientOffer);
        assert_eq!(config.timeouts.sequence(), Duration::from_secs(60));
    }

    #[test]
    fn partial_tables_keep_remaining_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            evse_id = "SE*XYZ*E99"
            tls_policy = "require_tls"

            [sdp]
            port = 25118

            [timeouts]
            sequence_ms = 30000
            "#,
        )
        .unwrap();
        assert_eq!(config.evse_id, "SE*XYZ*E99");
        assert_eq!(config.tls_policy, TlsPolicy::RequireTls);
        assert_eq!(config.sdp.port, 25118);
        assert!(config.sdp.enabled);
        assert_eq!(config.timeouts.sequence_ms, 30_000);
        assert_eq!(config.timeouts.cable_check_ms, 40_000);
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "tcp_port = 61341").unwrap();
        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.tcp_port, 61341);
    }

    #[test]
    fn bad_file_reports_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "tcp_port = \"not a port\"").unwrap();
        assert!(matches!(
            EngineConfig::from_file(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }
}
