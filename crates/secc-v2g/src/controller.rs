//! Top-level orchestrator
//!
//! Owns the link discovery server, the session TCP endpoint and at most one
//! active session. `run` is the single entry point; it multiplexes
//! discovery datagrams, incoming connections and the abort signal on one
//! cooperative loop and never returns until aborted. The control surface
//! for the surrounding application is the cloneable [`ControllerHandle`]:
//! pushing control events and signalling abort are the only two operations
//! safe to call from other threads, and both are.

use std::net::{Ipv6Addr, SocketAddr, SocketAddrV6};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use secc_core::{
    control_event_channel, ControlEvent, DcTransferLimits, EventQueueError, Feedback, SessionId,
    TransportError,
};

use crate::codec::MessageCodec;
use crate::config::{EngineConfig, TlsPolicy};
use crate::connection::{Connection, SecurityBackend};
use crate::message::AuthorizationKind;
use crate::sdp::SdpServer;
use crate::session::{AuthStatus, Session, SessionContext};

/// State shared between the controller loop, the active session and the
/// application-facing handle.
struct SharedState {
    limits: Arc<Mutex<DcTransferLimits>>,
    auth: Arc<Mutex<AuthStatus>>,
    /// Ingress of the active session's control event queue.
    active_events: Mutex<Option<secc_core::ControlEventSender>>,
    /// Session id retained from a paused session.
    paused_session: Mutex<Option<SessionId>>,
}

/// Application-facing control surface. Cloneable and thread-safe.
#[derive(Clone)]
pub struct ControllerHandle {
    shared: Arc<SharedState>,
    shutdown: Arc<Notify>,
}

impl ControllerHandle {
    /// Enqueue a control event into the active session. A no-op when no
    /// session is active; queue overflow is the caller's error.
    pub fn send_control_event(&self, event: ControlEvent) -> Result<(), EventQueueError> {
        match self.shared.active_events.lock().as_ref() {
            Some(sender) => sender.push(event),
            None => {
                debug!(?event, "no active session, control event dropped");
                Ok(())
            }
        }
    }

    /// Replace the DC operating envelope read by parameter discovery and
    /// the charge loop.
    pub fn update_dc_limits(&self, limits: DcTransferLimits) {
        *self.shared.limits.lock() = limits;
    }

    /// Update the offered authorization services and the verdict.
    pub fn update_authorization_services(
        &self,
        services: Vec<AuthorizationKind>,
        authorized: bool,
    ) {
        let mut auth = self.shared.auth.lock();
        auth.services = services;
        auth.authorized = authorized;
    }

    /// Interrupt the controller loop from any thread. Performs no teardown
    /// itself; `run` returns promptly and the caller tears down.
    pub fn abort(&self) {
        self.shutdown.notify_one();
    }
}

/// The engine's top-level component.
pub struct Controller {
    config: EngineConfig,
    codec: Arc<dyn MessageCodec>,
    feedback: Arc<dyn Feedback>,
    security: Option<Arc<dyn SecurityBackend>>,
    listener: TcpListener,
    sdp: Option<SdpServer>,
    shared: Arc<SharedState>,
    shutdown: Arc<Notify>,
}

impl Controller {
    /// Bind the session endpoint and, if enabled, the discovery server.
    pub async fn bind(
        config: EngineConfig,
        codec: Arc<dyn MessageCodec>,
        feedback: Arc<dyn Feedback>,
    ) -> Result<Self, TransportError> {
        let listener = TcpListener::bind((Ipv6Addr::UNSPECIFIED, config.tcp_port))
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("session endpoint: {e}")))?;
        let tcp_port = listener
            .local_addr()
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?
            .port();

        let sdp = if config.sdp.enabled {
            let endpoint = SocketAddrV6::new(config.advertised_address, tcp_port, 0, 0);
            let bind = SocketAddr::from((Ipv6Addr::UNSPECIFIED, config.sdp.port));
            Some(
                SdpServer::bind(
                    bind,
                    &config.interface,
                    endpoint,
                    config.tls_policy,
                    false,
                )
                .await?,
            )
        } else {
            None
        };

        Ok(Self {
            config,
            codec,
            feedback,
            security: None,
            listener,
            sdp,
            shared: Arc::new(SharedState {
                limits: Arc::new(Mutex::new(DcTransferLimits::default())),
                auth: Arc::new(Mutex::new(AuthStatus::default())),
                active_events: Mutex::new(None),
                paused_session: Mutex::new(None),
            }),
            shutdown: Arc::new(Notify::new()),
        })
    }

    /// Install the secured-stream factory. Required for `RequireTls`.
    pub fn with_security_backend(mut self, backend: Arc<dyn SecurityBackend>) -> Self {
        if let Some(sdp) = &mut self.sdp {
            sdp.set_tls_available(true);
        }
        self.security = Some(backend);
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.listener
            .local_addr()
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))
    }

    pub fn handle(&self) -> ControllerHandle {
        ControllerHandle {
            shared: Arc::clone(&self.shared),
            shutdown: Arc::clone(&self.shutdown),
        }
    }

    /// Run until aborted. Discovery keeps serving while a session runs;
    /// a second connection during an active session is turned away.
    pub async fn run(self) -> Result<(), TransportError> {
        let Controller {
            config,
            codec,
            feedback,
            security,
            listener,
            sdp,
            shared,
            shutdown,
        } = self;

        // Seed the shared envelope from configuration once.
        *shared.limits.lock() = config.limits;

        let mut active: Option<JoinHandle<()>> = None;
        let local = listener
            .local_addr()
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        info!(addr = %local, "session endpoint listening");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.notified() => {
                    info!("abort requested");
                    if let Some(handle) = active.take() {
                        handle.abort();
                        *shared.active_events.lock() = None;
                    }
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        if shared.active_events.lock().is_some() {
                            info!(%peer, "turning away connection while a session is active");
                            drop(stream);
                            continue;
                        }
                        match establish_connection(stream, config.tls_policy, security.as_deref())
                            .await
                        {
                            Ok(connection) => {
                                info!(%peer, secured = connection.is_secured(), "vehicle connected");
                                active = Some(spawn_session(
                                    connection,
                                    &config,
                                    Arc::clone(&codec),
                                    Arc::clone(&feedback),
                                    Arc::clone(&shared),
                                ));
                            }
                            Err(e) => warn!(%peer, error = %e, "connection setup failed"),
                        }
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                },
                result = async { sdp.as_ref().expect("guarded by condition").process_one().await },
                    if sdp.is_some() =>
                {
                    if let Err(e) = result {
                        warn!(error = %e, "discovery processing failed");
                    }
                }
            }
        }
        Ok(())
    }
}

/// Wrap a fresh TCP stream per the security policy.
async fn establish_connection(
    stream: TcpStream,
    policy: TlsPolicy,
    security: Option<&dyn SecurityBackend>,
) -> Result<Connection, TransportError> {
    match (policy, security) {
        (TlsPolicy::RequireTls, Some(backend)) => {
            Ok(Connection::Secured(backend.accept(stream).await?))
        }
        (TlsPolicy::RequireTls, None) => Err(TransportError::Security(
            "TLS required but no security backend installed".to_string(),
        )),
        // With a client-offer policy the selected mode was advertised per
        // endpoint during discovery; this endpoint is the plaintext one.
        _ => Ok(Connection::Plain(stream)),
    }
}

/// Start the session task and wire its queue into the shared state.
fn spawn_session(
    connection: Connection,
    config: &EngineConfig,
    codec: Arc<dyn MessageCodec>,
    feedback: Arc<dyn Feedback>,
    shared: Arc<SharedState>,
) -> JoinHandle<()> {
    let (events_tx, events_rx) = control_event_channel();
    *shared.active_events.lock() = Some(events_tx);
    let ctx = SessionContext {
        evse_id: config.evse_id.clone(),
        supported_protocols: config.supported_app_protocols(),
        timeouts: config.timeouts.clone(),
        limits: Arc::clone(&shared.limits),
        auth: Arc::clone(&shared.auth),
        feedback,
        codec,
        paused_session: *shared.paused_session.lock(),
    };
    let session = Session::new(ctx);
    tokio::spawn(async move {
        let paused = session.drive(connection, events_rx).await;
        *shared.paused_session.lock() = paused;
        *shared.active_events.lock() = None;
    })
}
