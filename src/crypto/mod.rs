//! Cryptographic module providing encryption/decryption capabilities
//!
//! This module supports multiple cipher algorithms including:
//! - AES-256-GCM: Industry-standard symmetric AEAD encryption
//! - ChaCha20-Poly1305: Modern AEAD cipher (fast, secure)
//! - Plain: No encryption (passthrough mode, `--disable-encryption`)

pub mod aes256;
pub mod chacha20;
pub mod plain;

use crate::crypto::aes256::Aes256Block;
use crate::crypto::chacha20::ChaCha20Poly1305Block;
use crate::crypto::plain::PlainBlock;

/// Core encryption/decryption trait
///
/// All cipher implementations must implement this trait to provide
/// consistent encryption and decryption interfaces. The trait is
/// marked as `Send + Sync` to enable safe concurrent usage across threads.
pub trait Block: Send + Sync {
    /// Encrypts data in-place
    fn encrypt(&self, data: &mut Vec<u8>) -> crate::Result<()>;

    /// Decrypts data in-place
    fn decrypt(&self, data: &mut Vec<u8>) -> crate::Result<()>;
}

/// Factory function to create cipher blocks from configuration
///
/// # Examples
/// ```
/// use teavpn2_server::crypto::new_block;
/// use teavpn2_server::crypto::CryptoConfig;
/// let config = CryptoConfig::ChaCha20Poly1305("secret_key".to_string());
/// let cipher = new_block(&config);
/// ```
pub fn new_block(cfg: &CryptoConfig) -> Box<dyn Block> {
    match cfg {
        CryptoConfig::Aes256(key) => Box::new(Aes256Block::from_string(key.as_str())),
        CryptoConfig::ChaCha20Poly1305(key) => {
            Box::new(ChaCha20Poly1305Block::from_string(key.as_str()))
        }
        CryptoConfig::Plain => Box::new(PlainBlock::new()),
    }
}

/// Cryptographic configuration, derived from `--disable-encryption` and the data-dir key material.
///
/// The on-wire frame format (§6) treats crypto as an opaque byte-in/byte-out filter; the
/// algorithm choice itself is not part of the wire protocol, only whether a filter runs at all.
#[derive(Debug, Clone)]
pub enum CryptoConfig {
    /// AES-256-GCM authenticated encryption
    Aes256(String),

    /// ChaCha20-Poly1305 authenticated encryption (default when encryption is enabled)
    ChaCha20Poly1305(String),

    /// No encryption (`--disable-encryption`)
    Plain,
}
