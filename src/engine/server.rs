//! I/O engine (§4.5)
//!
//! The source offers a readiness-based baseline and an optional
//! completion-based engine, both realized with OS-thread worker pools and a
//! per-worker multiplexer/submission-queue wait as the single suspension
//! point. Tokio's multi-threaded scheduler already provides a fixed
//! work-stealing-free... no, it does steal, but the distinction the source
//! draws (fixed threads, each blocked on exactly one wait primitive) has no
//! safe-Rust-idiomatic equivalent that doesn't reimplement half of Tokio;
//! both implementations collapse onto a single async reactor here, with
//! `--thread` sizing the runtime's worker pool instead of raw OS threads.

use crate::auth::{Authenticator, FileAuthenticator};
use crate::config::{ServerConfig, SockType};
use crate::crypto;
use crate::engine::peer::ProtocolVersions;
use crate::engine::router::Router;
use crate::engine::slot::SlotPool;
use crate::engine::udp_table::UdpSessionTable;
use crate::{iface, net, shutdown, tun_dev};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Depth of the channel carrying peer `DATA` payloads to the TUN writer.
const TUN_QUEUE_LEN: usize = 1024;

/// Brings the whole server up and runs until a shutdown signal fires.
pub async fn run(cfg: ServerConfig) -> crate::Result<()> {
    let cancel = shutdown::install()?;

    let pool = Arc::new(SlotPool::new(cfg.max_conn));
    let authenticator: Arc<dyn Authenticator> =
        Arc::new(FileAuthenticator::load(cfg.data_dir.as_deref(), cfg.iface_assignment())?);
    let block: Arc<dyn crypto::Block> = Arc::from(crypto::new_block(&cfg.crypto));
    let versions = ProtocolVersions::default();

    let (tun_tx, tun_rx) = mpsc::channel(TUN_QUEUE_LEN);
    let router = Arc::new(Router::new(tun_tx, block.clone(), pool.clone()));

    let tun_cfg = tun_dev::device::TunConfig {
        dev: cfg.dev.clone(),
        ipv4: cfg.ipv4.to_string(),
        netmask: cfg.ipv4_netmask.to_string(),
        mtu: cfg.mtu,
    };
    let tun_task = tokio::spawn(tun_dev::device::run(tun_cfg, router.clone(), tun_rx, cancel.clone()));

    // The tun crate already brings the link up as part of device creation;
    // this only forces MTU/link-state via `ip` in case that step no-ops.
    if let Err(e) = iface::bring_up(&cfg.dev, cfg.mtu) {
        tracing::warn!("interface bring-up via ip failed: {}", e);
    }

    tracing::info!(
        "teavpn2-server listening on {}:{} ({:?}), dev={}, max_conn={}, threads={}",
        cfg.bind_addr,
        cfg.bind_port,
        cfg.sock_type,
        cfg.dev,
        cfg.max_conn,
        cfg.thread,
    );

    match cfg.sock_type {
        SockType::Tcp => {
            let listener = net::tcp::bind(cfg.bind_addr, cfg.bind_port, cfg.backlog)?;
            net::tcp::accept_loop(listener, pool.clone(), router.clone(), authenticator, block, versions, cancel.clone())
                .await;
        }
        SockType::Udp => {
            let socket = net::udp::bind(cfg.bind_addr, cfg.bind_port)?;
            let table = Arc::new(UdpSessionTable::new());
            net::udp::dispatch_loop(socket, pool.clone(), router.clone(), table, authenticator, block, versions, cancel.clone())
                .await;
        }
    }

    iface::bring_down(&cfg.dev);
    tun_task.abort();
    tracing::info!("shutdown complete, {} peer(s) were connected", pool.in_use_count());
    Ok(())
}
