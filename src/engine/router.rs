//! TUN ↔ peer router (§4.4)
//!
//! TUN-to-peer is a broadcast fan-out: every packet read from the TUN
//! device is sent to every AUTHENTICATED peer, with no destination
//! routing (§4.4 explicitly calls this out as an open question the source
//! leaves unresolved; this port implements the broadcast as specified).
//! Peer-to-TUN is a single channel send to the TUN actor's inbound queue.
//!
//! TCP peers each own a connection task with its own outbound queue, so
//! fan-out to them is a channel send; UDP has no such task, so the router
//! holds the shared socket and the peer's address and encodes/sends the
//! frame itself, crediting `send_count` on the peer's slot exactly as the
//! TCP path does in `engine::peer::record_send`.

use crate::codec::frame::ServerFrame;
use crate::codec::parser::Parser;
use crate::crypto::Block;
use crate::engine::slot::SlotPool;
use std::collections::HashMap;
use std::net::{SocketAddr, SocketAddrV4};
use std::sync::{Arc, Mutex};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

/// One registered peer's outbound path, keyed by slot index.
#[derive(Clone)]
enum PeerSink {
    Tcp(mpsc::Sender<ServerFrame>),
    Udp(Arc<UdpSocket>, SocketAddrV4),
}

/// Registry of authenticated peers' outbound paths, plus the channel
/// feeding the TUN device's write side.
pub struct Router {
    peers: Mutex<HashMap<u16, PeerSink>>,
    tun_tx: mpsc::Sender<Vec<u8>>,
    block: Arc<dyn Block>,
    pool: Arc<SlotPool>,
}

impl Router {
    pub fn new(tun_tx: mpsc::Sender<Vec<u8>>, block: Arc<dyn Block>, pool: Arc<SlotPool>) -> Self {
        Self {
            peers: Mutex::new(HashMap::new()),
            tun_tx,
            block,
            pool,
        }
    }

    /// Registers a newly AUTHENTICATED TCP peer so it starts receiving TUN fan-out.
    pub fn register_tcp(&self, idx: u16, outbound_tx: mpsc::Sender<ServerFrame>) {
        self.peers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(idx, PeerSink::Tcp(outbound_tx));
    }

    /// Registers a newly AUTHENTICATED UDP peer, identified by its source
    /// address, so it starts receiving TUN fan-out over the shared socket.
    pub fn register_udp(&self, idx: u16, socket: Arc<UdpSocket>, addr: SocketAddrV4) {
        self.peers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(idx, PeerSink::Udp(socket, addr));
    }

    /// Removes a peer from the fan-out set; called on disconnect (§4.1 release).
    pub fn unregister(&self, idx: u16) {
        self.peers.lock().unwrap_or_else(|e| e.into_inner()).remove(&idx);
    }

    /// Sends one TUN-read packet to every registered (AUTHENTICATED) peer,
    /// regardless of transport.
    ///
    /// Fan-out is not atomic across peers (§5): a slow peer's full channel
    /// or busy socket is skipped rather than blocking delivery to the rest.
    pub async fn broadcast_data(&self, payload: Vec<u8>) {
        let targets: Vec<(u16, PeerSink)> = self
            .peers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(idx, sink)| (*idx, sink.clone()))
            .collect();

        for (idx, sink) in targets {
            match sink {
                PeerSink::Tcp(tx) => {
                    let _ = tx.try_send(ServerFrame::Data(payload.clone()));
                }
                PeerSink::Udp(socket, addr) => {
                    match Parser::encode_server(&ServerFrame::Data(payload.clone()), self.block.as_ref()) {
                        Ok(bytes) => match socket.try_send_to(&bytes, SocketAddr::V4(addr)) {
                            Ok(n) => crate::engine::peer::record_send(idx, &self.pool, n),
                            Err(e) => tracing::debug!(peer = idx, "udp fan-out send skipped: {}", e),
                        },
                        Err(e) => tracing::warn!(peer = idx, "failed to encode udp fan-out frame: {}", e),
                    }
                }
            }
        }
    }

    /// Writes one peer DATA frame's payload to the TUN device (§4.4 peer-to-TUN path).
    pub async fn to_tun(&self, payload: Vec<u8>) -> crate::Result<()> {
        self.tun_tx.send(payload).await.map_err(|e| e.to_string().into())
    }

    pub fn peer_count(&self) -> usize {
        self.peers.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
