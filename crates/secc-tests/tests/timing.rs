//! Precedence between inbound messages and expired timeouts
//!
//! When a complete message and an expired sequence window are both pending
//! in the same loop iteration, the message is processed and the window is
//! re-armed: protocol liveness wins over timeout strictness. Mocked time
//! makes the race deterministic.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

use secc_core::{control_event_channel, DcTransferLimits, NullFeedback};
use secc_tests::{frame, requests};
use secc_v2g::codec::{JsonCodec, MessageCodec};
use secc_v2g::framing::HEADER_SIZE;
use secc_v2g::message::{SapResponseCode, V2gMessage};
use secc_v2g::{
    AuthStatus, Connection, EngineConfig, Session, SessionContext, TimeoutConfig,
};

fn context() -> SessionContext {
    let config = EngineConfig::default();
    SessionContext {
        evse_id: config.evse_id.clone(),
        supported_protocols: config.supported_app_protocols(),
        timeouts: TimeoutConfig::default(),
        limits: Arc::new(Mutex::new(DcTransferLimits::default())),
        auth: Arc::new(Mutex::new(AuthStatus::default())),
        feedback: Arc::new(NullFeedback),
        codec: Arc::new(JsonCodec),
        paused_session: None,
    }
}

#[tokio::test(start_paused = true)]
async fn inbound_message_wins_over_an_expired_timeout() {
    let (near, mut far) = duplex(16 * 1024);
    let (_events_tx, events_rx) = control_event_channel();
    let session = Session::new(context());
    let task = tokio::spawn(session.drive(Connection::Secured(Box::new(near)), events_rx));

    // A complete handshake request is already buffered when the sequence
    // deadline passes; both select arms are ready in the same iteration.
    far.write_all(&frame(&requests::supported_app_protocol()))
        .await
        .unwrap();
    tokio::time::advance(Duration::from_secs(61)).await;

    // The message is answered, so it won over the expired window.
    let mut header = [0u8; HEADER_SIZE];
    far.read_exact(&mut header).await.unwrap();
    let payload_type = u16::from_be_bytes([header[2], header[3]]);
    let len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;
    let mut payload = vec![0u8; len];
    far.read_exact(&mut payload).await.unwrap();
    match JsonCodec.decode(None, payload_type, &payload).unwrap() {
        V2gMessage::SupportedAppProtocolRes(res) => {
            assert_eq!(res.response_code, SapResponseCode::OkSuccessfulNegotiation);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(!task.is_finished());

    // Nothing else arrives: the re-armed window expires and the session
    // ends without any response on the wire.
    tokio::time::advance(Duration::from_secs(61)).await;
    let mut buf = [0u8; 1];
    assert_eq!(far.read(&mut buf).await.unwrap(), 0);
    task.await.unwrap();
}
