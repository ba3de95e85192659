//! Per-peer connection task (§4.3)
//!
//! Drives one TCP connection's state machine: `NEW -> ESTABLISHED ->
//! AUTHENTICATED -> DISCONNECTED`, guarding every transition against the
//! frame type that triggered it. Anything outside the legal table is a
//! protocol violation and disconnects the peer unconditionally; transport
//! and decode errors instead count against the peer's error budget (§4.3,
//! §7) and only disconnect once it is exhausted.
//!
//! The slot's `Mutex` is never held across an `.await`: reads land in a
//! scratch buffer owned by this task, and the slot is only locked for the
//! synchronous `commit`/`decode_next`/state-transition steps.

use crate::auth::Authenticator;
use crate::codec::frame::{ClientFrame, ServerFrame, Version, HDR_LEN, MAX_PAYLOAD};
use crate::codec::parser::Parser;
use crate::crypto::Block;
use crate::engine::router::Router;
use crate::engine::slot::{PeerState, SlotPool};
use crate::error::EngineError;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Protocol version triplets advertised in `SRV_BANNER`.
#[derive(Debug, Clone, Copy)]
pub struct ProtocolVersions {
    pub cur: Version,
    pub min: Version,
    pub max: Version,
}

impl Default for ProtocolVersions {
    fn default() -> Self {
        let v = Version::new(0, 0, 1);
        Self { cur: v, min: v, max: v }
    }
}

/// Capacity of a peer's outbound queue (server frames waiting to be written).
const OUTBOUND_QUEUE_LEN: usize = 64;

/// Scratch read buffer: one maximum frame's worth of bytes per `read()` call.
const READ_CAP: usize = HDR_LEN + MAX_PAYLOAD;

/// Runs one peer's connection to completion, releasing its slot on return.
///
/// `stream` is assumed already `TCP_NODELAY` (set by the listener, §4.5).
pub async fn run(
    mut stream: TcpStream,
    idx: u16,
    pool: Arc<SlotPool>,
    router: Arc<Router>,
    authenticator: Arc<dyn Authenticator>,
    block: Arc<dyn Block>,
    versions: ProtocolVersions,
    cancel: CancellationToken,
) {
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<ServerFrame>(OUTBOUND_QUEUE_LEN);
    let mut authenticated = false;
    let mut read_buf = [0u8; READ_CAP];

    let result = run_loop(
        &mut stream,
        idx,
        &pool,
        &router,
        authenticator.as_ref(),
        block.as_ref(),
        versions,
        &cancel,
        &outbound_tx,
        &mut outbound_rx,
        &mut read_buf,
        &mut authenticated,
    )
    .await;

    if let Err(e) = result {
        tracing::debug!(peer = idx, "connection closed: {}", e);
    }
    if authenticated {
        router.unregister(idx);
    }
    pool.release(idx);
}

#[allow(clippy::too_many_arguments)]
async fn run_loop(
    stream: &mut TcpStream,
    idx: u16,
    pool: &SlotPool,
    router: &Router,
    authenticator: &dyn Authenticator,
    block: &dyn Block,
    versions: ProtocolVersions,
    cancel: &CancellationToken,
    outbound_tx: &mpsc::Sender<ServerFrame>,
    outbound_rx: &mut mpsc::Receiver<ServerFrame>,
    read_buf: &mut [u8; READ_CAP],
    authenticated: &mut bool,
) -> crate::Result<()> {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            out = outbound_rx.recv() => {
                if let Some(frame) = out {
                    let bytes = Parser::encode_server(&frame, block)?;
                    match stream.write_all(&bytes).await {
                        Ok(()) => record_send(idx, pool, bytes.len()),
                        Err(e) => {
                            if let Some(err) = record_transport_error(idx, pool, e) {
                                return Err(err);
                            }
                        }
                    }
                }
            }
            n = stream.read(read_buf.as_mut_slice()) => {
                let n = match n {
                    Ok(n) => n,
                    Err(e) => {
                        if let Some(err) = record_transport_error(idx, pool, e) {
                            return Err(err);
                        }
                        continue;
                    }
                };
                if n == 0 {
                    return Ok(());
                }
                {
                    let mut slot = pool.lock(idx);
                    let dest = slot.decoder.write_slot();
                    dest[..n].copy_from_slice(&read_buf[..n]);
                    slot.decoder.commit(n);
                }
                loop {
                    let decoded = pool.lock(idx).decoder.decode_next(block);
                    match decoded {
                        Ok(Some(frame)) => {
                            {
                                let mut slot = pool.lock(idx);
                                slot.recv_count = slot.recv_count.saturating_add(1);
                            }
                            let action =
                                dispatch(idx, pool, router, authenticator, &frame, versions).await?;
                            if let Some(reply) = action.reply {
                                let bytes = Parser::encode_server(&reply, block)?;
                                match stream.write_all(&bytes).await {
                                    Ok(()) => record_send(idx, pool, bytes.len()),
                                    Err(e) => {
                                        if let Some(err) = record_transport_error(idx, pool, e) {
                                            return Err(err);
                                        }
                                    }
                                }
                            }
                            if action.register {
                                router.register_tcp(idx, outbound_tx.clone());
                                *authenticated = true;
                            }
                            if action.disconnect {
                                return Ok(());
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            if e.is_protocol_fatal() {
                                return Err(Box::new(EngineError::Protocol(e.to_string())) as crate::Error);
                            }
                            let exhausted = pool.lock(idx).bump_err_count();
                            if exhausted {
                                return Err(Box::new(EngineError::Protocol(e.to_string())) as crate::Error);
                            }
                            break;
                        }
                    }
                }
            }
        }
    }
}

/// Records a real (non-`EAGAIN`, already-filtered-out-by-Tokio) transport
/// error against the peer's error budget (§4.3, §7). Returns the error to
/// propagate once the budget is exhausted, `None` if the peer should keep
/// running.
pub(crate) fn record_transport_error(idx: u16, pool: &SlotPool, err: std::io::Error) -> Option<crate::Error> {
    tracing::warn!(peer = idx, "transport error: {}", err);
    let exhausted = pool.lock(idx).bump_err_count();
    if exhausted {
        Some(Box::new(EngineError::Transport(err)) as crate::Error)
    } else {
        None
    }
}

/// Bumps `send_count` and emits the §4.4 per-send accounting trace line.
pub(crate) fn record_send(idx: u16, pool: &SlotPool, bytes: usize) {
    let send_count = {
        let mut slot = pool.lock(idx);
        slot.send_count = slot.send_count.saturating_add(1);
        slot.send_count
    };
    tracing::trace!(peer = idx, send_count, bytes, "frame transmitted");
}

/// Outcome of applying one frame to the state machine; shared between the
/// TCP (`run_loop`) and UDP (`crate::net::udp`) dispatch paths.
pub(crate) struct Action {
    pub(crate) reply: Option<ServerFrame>,
    pub(crate) register: bool,
    pub(crate) disconnect: bool,
}

impl Action {
    fn none() -> Self {
        Self { reply: None, register: false, disconnect: false }
    }
    fn reply(frame: ServerFrame) -> Self {
        Self { reply: Some(frame), register: false, disconnect: false }
    }
    fn reply_and_register(frame: ServerFrame) -> Self {
        Self { reply: Some(frame), register: true, disconnect: false }
    }
    fn reply_and_disconnect(frame: ServerFrame) -> Self {
        Self { reply: Some(frame), register: false, disconnect: true }
    }
    fn disconnect() -> Self {
        Self { reply: None, register: false, disconnect: true }
    }
}

/// Applies one inbound frame to the state machine (§4.3's guard table).
pub(crate) async fn dispatch(
    idx: u16,
    pool: &SlotPool,
    router: &Router,
    authenticator: &dyn Authenticator,
    frame: &ClientFrame,
    versions: ProtocolVersions,
) -> crate::Result<Action> {
    let state = pool.lock(idx).state;

    let action = match (state, frame) {
        (PeerState::New, ClientFrame::Hello) => {
            pool.lock(idx).state = PeerState::Established;
            Action::reply(ServerFrame::Banner {
                cur: versions.cur,
                min: versions.min,
                max: versions.max,
            })
        }
        (PeerState::Established, ClientFrame::Auth { username, password }) => {
            match authenticator.authenticate(username, password) {
                Some(iface) => {
                    let mut slot = pool.lock(idx);
                    slot.state = PeerState::Authenticated;
                    slot.username = username.clone();
                    drop(slot);
                    Action::reply_and_register(ServerFrame::AuthOk(iface))
                }
                None => Action::reply_and_disconnect(ServerFrame::AuthReject),
            }
        }
        (PeerState::Authenticated, ClientFrame::Data(payload)) => {
            router.to_tun(payload.clone()).await?;
            Action::none()
        }
        (_, ClientFrame::Close) => Action::disconnect(),
        _ => Action::disconnect(),
    };

    Ok(action)
}
