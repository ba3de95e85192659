//! TCP listener and accept loop (§4.5)
//!
//! Socket setup: `SO_REUSEADDR` and non-blocking mode on the listen socket,
//! `TCP_NODELAY` on every accepted socket (§4.5, "Socket setup"). Transient
//! accept errors back off exponentially instead of spinning; this mirrors
//! the readiness engine's "`EAGAIN` returns cleanly" behavior one level up,
//! at the accept-loop boundary Tokio exposes instead of a raw multiplexer.

use crate::auth::Authenticator;
use crate::crypto::Block;
use crate::engine::peer::{self, ProtocolVersions};
use crate::engine::router::Router;
use crate::engine::slot::SlotPool;
use crate::error::EngineError;
use socket2::{Domain, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Binds and listens on `addr:port` with `SO_REUSEADDR` set, `backlog` deep.
pub fn bind(addr: Ipv4Addr, port: u16, backlog: i32) -> crate::Result<TcpListener> {
    let sys = |r: std::io::Result<()>, what: &str| -> crate::Result<()> {
        r.map_err(|e| Box::new(EngineError::System(format!("{}: {}", what, e))) as crate::Error)
    };

    let socket = Socket::new(Domain::IPV4, Type::STREAM, None)
        .map_err(|e| Box::new(EngineError::System(format!("create TCP socket: {}", e))) as crate::Error)?;
    sys(socket.set_reuse_address(true), "SO_REUSEADDR")?;
    sys(socket.set_nonblocking(true), "set non-blocking")?;
    sys(socket.bind(&SocketAddr::new(addr.into(), port).into()), "bind")?;
    sys(socket.listen(backlog), "listen")?;
    TcpListener::from_std(socket.into())
        .map_err(|e| Box::new(EngineError::System(format!("convert to tokio listener: {}", e))) as crate::Error)
}

/// Longest backoff between accept retries (§4.5 treats accept failures as
/// transient; this caps how long a worker waits before trying again).
const MAX_BACKOFF: Duration = Duration::from_secs(1);

#[allow(clippy::too_many_arguments)]
pub async fn accept_loop(
    listener: TcpListener,
    pool: Arc<SlotPool>,
    router: Arc<Router>,
    authenticator: Arc<dyn Authenticator>,
    block: Arc<dyn Block>,
    versions: ProtocolVersions,
    cancel: CancellationToken,
) {
    let mut backoff = Duration::from_millis(5);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, addr)) => {
                        backoff = Duration::from_millis(5);
                        if let Err(e) = stream.set_nodelay(true) {
                            tracing::warn!("failed to set TCP_NODELAY for {}: {}", addr, e);
                        }
                        match pool.acquire() {
                            Some(idx) => {
                                tracing::debug!(peer = idx, %addr, "accepted connection");
                                let pool = pool.clone();
                                let router = router.clone();
                                let authenticator = authenticator.clone();
                                let block = block.clone();
                                let cancel = cancel.clone();
                                tokio::spawn(async move {
                                    peer::run(stream, idx, pool, router, authenticator, block, versions, cancel).await;
                                });
                            }
                            None => {
                                let err = EngineError::ResourceExhausted(format!("free-slot stack empty, dropping connection from {}", addr));
                                tracing::warn!("{}", err);
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!("accept failed: {}", e);
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(MAX_BACKOFF);
                    }
                }
            }
        }
    }
}
