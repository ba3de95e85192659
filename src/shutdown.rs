//! Graceful shutdown (§6, §9)
//!
//! The source wakes a readiness-based multiplexer out of a blocking wait by
//! writing to a self-pipe from the signal handler; the completion-based
//! engine uses an event fd for the same purpose. Tokio already turns a
//! signal into an ordinary awaitable event (`tokio::signal::unix::signal`),
//! so both collapse onto one mechanism here: a `CancellationToken` cloned
//! into every task, cancelled once any of `SIGINT`/`SIGTERM`/`SIGHUP`/
//! `SIGQUIT` arrives (§6), raced against the task's own work via
//! `tokio::select!` the way each module in `engine`/`tun_dev` already does.

use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

/// Spawns the signal-listening task and returns the token it will cancel.
///
/// Firing on any of `SIGINT`, `SIGTERM`, `SIGHUP`, `SIGQUIT` is a deliberate
/// divergence from the baseline Tokio pattern of only handling `SIGINT`/
/// `SIGTERM` — §6 names all four explicitly.
pub fn install() -> crate::Result<CancellationToken> {
    let token = CancellationToken::new();
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sighup = signal(SignalKind::hangup())?;
    let mut sigquit = signal(SignalKind::quit())?;

    let child = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = sigint.recv() => tracing::info!("received SIGINT, shutting down"),
            _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
            _ = sighup.recv() => tracing::info!("received SIGHUP, shutting down"),
            _ = sigquit.recv() => tracing::info!("received SIGQUIT, shutting down"),
        }
        child.cancel();
    });

    Ok(token)
}
