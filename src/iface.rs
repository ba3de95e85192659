//! Interface bring-up/bring-down collaborator (§6)
//!
//! The TUN device itself is created and configured by the `tun` crate
//! ([`crate::tun_dev::device`]); this module covers the supplementary `ip`
//! invocations the specification calls out separately — forcing the link
//! state and MTU so they match what was requested even if the `tun` crate's
//! own configuration step silently no-ops on a given platform. Grounded on
//! the teacher's `SysRoute`, which shells out to the platform's routing
//! tool rather than using a netlink crate.

use std::process::Command;

/// Brings `dev` up with the given MTU via the `ip` utility (Linux only; a
/// no-op elsewhere, since the `tun` crate already configured the interface
/// through its own platform path on non-Linux targets).
pub fn bring_up(dev: &str, mtu: u16) -> crate::Result<()> {
    #[cfg(target_os = "linux")]
    {
        run_ip(&["link", "set", "dev", dev, "mtu", &mtu.to_string()])?;
        run_ip(&["link", "set", "dev", dev, "up"])?;
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = (dev, mtu);
    }
    Ok(())
}

/// Brings `dev` down. Best-effort: failures are logged, not propagated,
/// since this normally runs during shutdown after the TUN fd is already gone.
pub fn bring_down(dev: &str) {
    #[cfg(target_os = "linux")]
    {
        if let Err(e) = run_ip(&["link", "set", "dev", dev, "down"]) {
            tracing::warn!("failed to bring {} down: {}", dev, e);
        }
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = dev;
    }
}

#[cfg(target_os = "linux")]
fn run_ip(args: &[&str]) -> crate::Result<()> {
    let output = Command::new("ip")
        .args(args)
        .output()
        .map_err(|e| format!("failed to execute ip command: {}", e))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("ip {:?} failed: {}", args, stderr).into());
    }
    Ok(())
}
