//! UDP dispatch loop (§4.6)
//!
//! Unlike TCP, a datagram has no stream to feed through the stateful
//! `FrameDecoder`: each packet already is exactly one frame, so it goes
//! straight to `Parser::decode_client`. The session table maps `(src_ip,
//! src_port)` to a slot index; an unseen address acquires a fresh slot the
//! same way the TCP accept loop does, then the resulting frame runs through
//! the same `peer::dispatch` state machine TCP connections use.

use crate::auth::Authenticator;
use crate::codec::frame::{HDR_LEN, MAX_PAYLOAD};
use crate::codec::parser::Parser;
use crate::crypto::Block;
use crate::engine::peer::{self, ProtocolVersions};
use crate::engine::router::Router;
use crate::engine::slot::SlotPool;
use crate::engine::udp_table::UdpSessionTable;
use crate::error::EngineError;
use socket2::{Domain, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

/// Binds a non-blocking UDP socket with `SO_REUSEADDR` set (§4.5).
pub fn bind(addr: Ipv4Addr, port: u16) -> crate::Result<UdpSocket> {
    let sys = |r: std::io::Result<()>, what: &str| -> crate::Result<()> {
        r.map_err(|e| Box::new(EngineError::System(format!("{}: {}", what, e))) as crate::Error)
    };

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, None)
        .map_err(|e| Box::new(EngineError::System(format!("create UDP socket: {}", e))) as crate::Error)?;
    sys(socket.set_reuse_address(true), "SO_REUSEADDR")?;
    sys(socket.set_nonblocking(true), "set non-blocking")?;
    sys(socket.bind(&SocketAddr::new(addr.into(), port).into()), "bind")?;
    UdpSocket::from_std(socket.into())
        .map_err(|e| Box::new(EngineError::System(format!("convert to tokio socket: {}", e))) as crate::Error)
}

#[allow(clippy::too_many_arguments)]
pub async fn dispatch_loop(
    socket: UdpSocket,
    pool: Arc<SlotPool>,
    router: Arc<Router>,
    table: Arc<UdpSessionTable>,
    authenticator: Arc<dyn Authenticator>,
    block: Arc<dyn Block>,
    versions: ProtocolVersions,
    cancel: CancellationToken,
) {
    let socket = Arc::new(socket);
    let mut buf = vec![0u8; HDR_LEN + MAX_PAYLOAD];
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            recvd = socket.recv_from(&mut buf) => {
                let (n, from) = match recvd {
                    Ok(v) => v,
                    Err(e) => {
                        tracing::warn!("udp recv failed: {}", e);
                        continue;
                    }
                };
                let SocketAddr::V4(from) = from else {
                    continue; // IPv4 only, per the configured TUN/bind address family
                };
                handle_datagram(&buf[..n], from, &pool, &router, &table, authenticator.as_ref(), block.as_ref(), &socket, versions).await;
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_datagram(
    datagram: &[u8],
    from: SocketAddrV4,
    pool: &SlotPool,
    router: &Router,
    table: &UdpSessionTable,
    authenticator: &dyn Authenticator,
    block: &dyn Block,
    socket: &Arc<UdpSocket>,
    versions: ProtocolVersions,
) {
    let ip = from.ip().octets();
    let port = from.port();

    let idx = match table.find(ip, port) {
        Some(idx) => idx,
        None => match pool.acquire() {
            Some(idx) => {
                {
                    let mut slot = pool.lock(idx);
                    slot.src_ip = ip;
                    slot.src_port = port;
                }
                table.insert(ip, port, idx);
                idx
            }
            None => {
                let err = EngineError::ResourceExhausted(format!("free-slot stack empty, dropping datagram from {}", from));
                tracing::warn!("{}", err);
                return;
            }
        },
    };

    match Parser::decode_client(datagram, block) {
        Ok((frame, _consumed)) => {
            {
                let mut slot = pool.lock(idx);
                slot.recv_count = slot.recv_count.saturating_add(1);
            }
            match peer::dispatch(idx, pool, router, authenticator, &frame, versions).await {
                Ok(action) => {
                    if let Some(reply) = action.reply {
                        if let Ok(bytes) = Parser::encode_server(&reply, block) {
                            match socket.send_to(&bytes, SocketAddr::V4(from)).await {
                                Ok(n) => peer::record_send(idx, pool, n),
                                Err(e) => {
                                    if let Some(_err) = peer::record_transport_error(idx, pool, e) {
                                        table.remove(ip, port);
                                        pool.release(idx);
                                        return;
                                    }
                                }
                            }
                        }
                    }
                    if action.register {
                        router.register_udp(idx, socket.clone(), from);
                    }
                    if action.disconnect {
                        table.remove(ip, port);
                        pool.release(idx);
                    }
                }
                Err(_) => {
                    table.remove(ip, port);
                    pool.release(idx);
                }
            }
        }
        Err(e) => {
            if e.is_protocol_fatal() {
                table.remove(ip, port);
                pool.release(idx);
            } else {
                let exhausted = pool.lock(idx).bump_err_count();
                if exhausted {
                    table.remove(ip, port);
                    pool.release(idx);
                }
            }
        }
    }
}
