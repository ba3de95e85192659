//! Frame definitions for the VPN protocol
//!
//! All frames share a common 4-byte header followed by a type-specific payload.
//!
//! # Frame Header Format (4 bytes)
//! ```text
//! +--------+--------+--------+--------+
//! |  Type  |  Pad   |   Length (2B)   |
//! +--------+--------+--------+--------+
//! ```
//!
//! - Type: frame type identifier (1 byte), meaning depends on direction (client vs server)
//! - Pad: reserved, always zero on the wire
//! - Length: payload length in bytes, big-endian (2 bytes), must be <= 4096

use std::fmt::Display;

pub(crate) use crate::codec::errors::FrameError;

/// Frame header length in bytes: type(1) + pad(1) + length(2).
pub const HDR_LEN: usize = 4;

/// Maximum payload length in bytes.
pub const MAX_PAYLOAD: usize = 4096;

/// Fixed width of each NUL-padded ASCII field in the AUTH payload.
pub const AUTH_FIELD_LEN: usize = 255;

/// Fixed width of the NUL-padded device name field in the AUTH_OK payload.
pub const DEV_NAME_LEN: usize = 16;

/// Frame type identifiers sent by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientFrameType {
    Hello = 0,
    Auth = 1,
    IfaceAck = 2,
    IfaceFail = 3,
    Data = 4,
    ReqSync = 5,
    Close = 6,
}

impl TryFrom<u8> for ClientFrameType {
    type Error = FrameError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(ClientFrameType::Hello),
            1 => Ok(ClientFrameType::Auth),
            2 => Ok(ClientFrameType::IfaceAck),
            3 => Ok(ClientFrameType::IfaceFail),
            4 => Ok(ClientFrameType::Data),
            5 => Ok(ClientFrameType::ReqSync),
            6 => Ok(ClientFrameType::Close),
            other => Err(FrameError::UnknownType(other)),
        }
    }
}

/// Frame type identifiers sent by the server.
///
/// Numeric values are this implementation's own assignment (see DESIGN.md):
/// the retrieved original source uses these identifiers only symbolically
/// (`SRV_PKT_BANNER` etc.) and never carries the enum's numeric literals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerFrameType {
    Banner = 0,
    AuthOk = 1,
    AuthReject = 2,
    Data = 3,
}

impl TryFrom<u8> for ServerFrameType {
    type Error = FrameError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(ServerFrameType::Banner),
            1 => Ok(ServerFrameType::AuthOk),
            2 => Ok(ServerFrameType::AuthReject),
            3 => Ok(ServerFrameType::Data),
            other => Err(FrameError::UnknownType(other)),
        }
    }
}

/// A `major.minor.patch` protocol version triplet, as carried by `SRV_BANNER`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

impl Version {
    pub const fn new(major: u8, minor: u8, patch: u8) -> Self {
        Self { major, minor, patch }
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Frames received from a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    /// `CLI_HELLO`: sent once, immediately after connecting.
    Hello,
    /// `CLI_AUTH`: username/password, each a 255-byte NUL-padded ASCII field.
    Auth { username: String, password: String },
    /// `CLI_IFACE_ACK`: reserved, no legal trigger in the core (§4.3).
    IfaceAck,
    /// `CLI_IFACE_FAIL`: reserved, no legal trigger in the core (§4.3).
    IfaceFail,
    /// `CLI_DATA`: raw L3 packet bound for the TUN device.
    Data(Vec<u8>),
    /// `CLI_REQSYNC`: reserved, no legal trigger in the core (§4.3).
    ReqSync,
    /// `CLI_CLOSE`: peer requests graceful disconnect.
    Close,
}

impl Display for ClientFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientFrame::Hello => write!(f, "hello"),
            ClientFrame::Auth { username, .. } => write!(f, "auth from {}", username),
            ClientFrame::IfaceAck => write!(f, "iface ack"),
            ClientFrame::IfaceFail => write!(f, "iface fail"),
            ClientFrame::Data(payload) => write!(f, "data ({} bytes)", payload.len()),
            ClientFrame::ReqSync => write!(f, "reqsync"),
            ClientFrame::Close => write!(f, "close"),
        }
    }
}

/// Interface configuration assigned to an authenticated peer, carried in `SRV_AUTH_OK`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfaceAssignment {
    pub dev: String,
    pub ipv4: [u8; 4],
    pub netmask: [u8; 4],
    pub mtu: u16,
}

/// Frames sent by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerFrame {
    /// `SRV_BANNER`: supported protocol version range (cur/min/max triplets).
    Banner { cur: Version, min: Version, max: Version },
    /// `SRV_AUTH_OK`: credentials accepted, carries the assigned interface.
    AuthOk(IfaceAssignment),
    /// `SRV_AUTH_REJECT`: credentials rejected, empty payload.
    AuthReject,
    /// `SRV_DATA`: raw L3 packet read from TUN, fanned out to peers.
    Data(Vec<u8>),
}

impl Display for ServerFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerFrame::Banner { cur, .. } => write!(f, "banner (cur {})", cur),
            ServerFrame::AuthOk(iface) => write!(f, "auth ok ({})", iface.dev),
            ServerFrame::AuthReject => write!(f, "auth reject"),
            ServerFrame::Data(payload) => write!(f, "data ({} bytes)", payload.len()),
        }
    }
}

/// Writes `s` into `field`, NUL-padding or truncating to fit exactly.
pub(crate) fn write_fixed_ascii(field: &mut [u8], s: &str) {
    let bytes = s.as_bytes();
    let n = bytes.len().min(field.len());
    field[..n].copy_from_slice(&bytes[..n]);
    for b in &mut field[n..] {
        *b = 0;
    }
}

/// Reads a NUL-padded ASCII field back into a `String`, stopping at the first NUL.
pub(crate) fn read_fixed_ascii(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}
