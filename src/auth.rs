//! Credential lookup collaborator (§1: `authenticate(user, pass) -> Option<IfaceAssignment>`)
//!
//! Out of scope per the specification ("credential lookup... treated as an
//! opaque collaborator"); this module supplies the simplest implementation
//! that satisfies the trait so the dispatch core has something real to run
//! against, grounded in the teacher's `ClientManager` (an in-memory,
//! lock-guarded lookup table loaded once at startup).

use crate::codec::frame::IfaceAssignment;
use std::collections::HashMap;
use std::sync::RwLock;

/// Opaque credential-lookup collaborator (§1, §4.3).
pub trait Authenticator: Send + Sync {
    /// Returns the interface to assign this peer if `user`/`pass` are valid.
    fn authenticate(&self, user: &str, pass: &str) -> Option<IfaceAssignment>;
}

/// Credentials file backed authenticator.
///
/// Reads `<data-dir>/users`, one `username:password` pair per line
/// (`#`-prefixed lines and blank lines are ignored). Every valid user is
/// granted the server's single configured interface — this core has one
/// TUN device, so per-user address pools are out of scope; a real
/// deployment with multiple subnets would replace this with a collaborator
/// that hands back distinct `IfaceAssignment`s per user.
pub struct FileAuthenticator {
    credentials: RwLock<HashMap<String, String>>,
    iface: IfaceAssignment,
}

impl FileAuthenticator {
    /// Loads `users` from `data_dir`. A missing or empty `data_dir` yields an
    /// authenticator that rejects everyone, which is a valid (if useless)
    /// configuration rather than a startup error.
    pub fn load(data_dir: Option<&std::path::Path>, iface: IfaceAssignment) -> crate::Result<Self> {
        let mut credentials = HashMap::new();
        if let Some(dir) = data_dir {
            let path = dir.join("users");
            match std::fs::read_to_string(&path) {
                Ok(contents) => {
                    for line in contents.lines() {
                        let line = line.trim();
                        if line.is_empty() || line.starts_with('#') {
                            continue;
                        }
                        if let Some((user, pass)) = line.split_once(':') {
                            credentials.insert(user.to_string(), pass.to_string());
                        } else {
                            tracing::warn!("skipping malformed credentials line in {:?}", path);
                        }
                    }
                    tracing::info!("loaded {} credential(s) from {:?}", credentials.len(), path);
                }
                Err(e) => {
                    tracing::warn!("could not read credentials file {:?}: {}", path, e);
                }
            }
        }
        Ok(Self {
            credentials: RwLock::new(credentials),
            iface,
        })
    }
}

impl Authenticator for FileAuthenticator {
    fn authenticate(&self, user: &str, pass: &str) -> Option<IfaceAssignment> {
        let credentials = self.credentials.read().unwrap_or_else(|e| e.into_inner());
        match credentials.get(user) {
            Some(expected) if expected == pass => Some(self.iface.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iface() -> IfaceAssignment {
        IfaceAssignment {
            dev: "teavpn2-srv".to_string(),
            ipv4: [10, 8, 8, 1],
            netmask: [255, 255, 255, 0],
            mtu: 1480,
        }
    }

    #[test]
    fn no_data_dir_rejects_everyone() {
        let auth = FileAuthenticator::load(None, iface()).unwrap();
        assert!(auth.authenticate("alice", "passw").is_none());
    }

    #[test]
    fn valid_and_invalid_credentials() {
        let dir = std::env::temp_dir().join(format!("teavpn2-test-{:p}", &dir_marker()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("users"), "alice:passw\n# comment\nbob:secret\n").unwrap();

        let auth = FileAuthenticator::load(Some(&dir), iface()).unwrap();
        assert!(auth.authenticate("alice", "passw").is_some());
        assert!(auth.authenticate("alice", "wrong").is_none());
        assert!(auth.authenticate("bob", "secret").is_some());
        assert!(auth.authenticate("carol", "anything").is_none());

        let _ = std::fs::remove_dir_all(&dir);
    }

    fn dir_marker() -> u8 {
        0
    }
}
