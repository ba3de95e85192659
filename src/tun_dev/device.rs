//! TUN device actor (§4.4)
//!
//! Owns the kernel TUN file descriptor. Packets read from it are fanned out
//! to every AUTHENTICATED peer via `Router::broadcast_data`; packets handed
//! in from peers via `Router::to_tun` are written back out. Ported from the
//! teacher's single-peer `Device`/`DeviceHandler` pair, generalized from a
//! one-to-one NAT device into the server's one-to-N broadcast source.

use crate::engine::router::Router;
use crate::error::EngineError;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Interface parameters used to bring the TUN device up (§6).
#[derive(Clone, Debug)]
pub struct TunConfig {
    pub dev: String,
    pub ipv4: String,
    pub netmask: String,
    pub mtu: u16,
}

/// One read from the TUN device can be at most one maximum frame's payload (§6).
const READ_CAP: usize = 4096;

/// Creates the TUN device and runs its read/write loop until `cancel` fires.
pub async fn run(cfg: TunConfig, router: Arc<Router>, mut to_tun_rx: mpsc::Receiver<Vec<u8>>, cancel: CancellationToken) -> crate::Result<()> {
    let mut config = tun::Configuration::default();
    config
        .address(cfg.ipv4.clone())
        .netmask(cfg.netmask.clone())
        .mtu(cfg.mtu)
        .up();

    #[cfg(target_os = "linux")]
    config.platform_config(|platform| {
        platform.ensure_root_privileges(true);
    });

    let dev = tun::create_as_async(&config)
        .map_err(|e| Box::new(EngineError::System(format!("failed to create TUN device: {}", e))) as crate::Error)?;
    let (mut reader, mut writer) = tokio::io::split(dev);

    let mut buf = vec![0u8; READ_CAP];
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            n = reader.read(&mut buf) => {
                match n {
                    Ok(n) => router.broadcast_data(buf[..n].to_vec()).await,
                    Err(e) => tracing::error!("tun read failed: {}", e),
                }
            }
            packet = to_tun_rx.recv() => {
                match packet {
                    Some(packet) => {
                        if let Err(e) = writer.write_all(&packet).await {
                            tracing::error!("tun write failed: {}", e);
                        }
                    }
                    None => return Ok(()),
                }
            }
        }
    }
}
