//! Frame parser and serializer
//!
//! Handles marshaling/unmarshaling of VPN protocol frames: header parsing,
//! payload encryption/decryption, and the fixed-width binary payload layouts
//! from §6 (no JSON on the wire — the protocol is a small closed set of
//! fixed-layout binary frames, not an open object format).
//!
//! The crypto filter (§1, "treated as an optional framing filter with
//! byte-in/byte-out semantics") only wraps the payloads that carry
//! confidential content: `AUTH` (credentials) and `DATA` (tunneled traffic).
//! `HELLO`/`BANNER`/`AUTH_REJECT`/`CLOSE` and the reserved frames carry no
//! secret material, so the filter is not applied to them.

use crate::codec::frame::*;
use crate::crypto::Block;

pub struct Parser;

impl Parser {
    /// Unmarshals one client frame from `buf`.
    ///
    /// `buf` must already contain at least a complete header; if it contains
    /// a complete frame, returns the frame and the number of bytes consumed.
    pub fn decode_client(buf: &[u8], block: &dyn Block) -> Result<(ClientFrame, usize), FrameError> {
        let (frame_type, _length, total_len) = Self::parse_header(buf)?;
        let mut payload = buf[HDR_LEN..total_len].to_vec();

        let frame_type = ClientFrameType::try_from(frame_type)?;
        match frame_type {
            ClientFrameType::Hello => Ok((ClientFrame::Hello, total_len)),
            ClientFrameType::Auth => {
                Self::decrypt(&mut payload, block)?;
                if payload.len() != 2 * AUTH_FIELD_LEN {
                    return Err(FrameError::Invalid);
                }
                let username = read_fixed_ascii(&payload[..AUTH_FIELD_LEN]);
                let password = read_fixed_ascii(&payload[AUTH_FIELD_LEN..]);
                Ok((ClientFrame::Auth { username, password }, total_len))
            }
            ClientFrameType::IfaceAck => Ok((ClientFrame::IfaceAck, total_len)),
            ClientFrameType::IfaceFail => Ok((ClientFrame::IfaceFail, total_len)),
            ClientFrameType::Data => {
                Self::decrypt(&mut payload, block)?;
                Ok((ClientFrame::Data(payload), total_len))
            }
            ClientFrameType::ReqSync => Ok((ClientFrame::ReqSync, total_len)),
            ClientFrameType::Close => Ok((ClientFrame::Close, total_len)),
        }
    }

    /// Marshals a client frame into raw bytes (used by test harnesses driving the server).
    pub fn encode_client(frame: &ClientFrame, block: &dyn Block) -> crate::Result<Vec<u8>> {
        Ok(match frame {
            ClientFrame::Hello => Self::build_header(ClientFrameType::Hello as u8, &[]),
            ClientFrame::Auth { username, password } => {
                let mut payload = vec![0u8; 2 * AUTH_FIELD_LEN];
                write_fixed_ascii(&mut payload[..AUTH_FIELD_LEN], username);
                write_fixed_ascii(&mut payload[AUTH_FIELD_LEN..], password);
                Self::encrypt(&mut payload, block)?;
                let mut buf = Self::build_header(ClientFrameType::Auth as u8, &payload);
                buf.extend_from_slice(&payload);
                buf
            }
            ClientFrame::IfaceAck => Self::build_header(ClientFrameType::IfaceAck as u8, &[]),
            ClientFrame::IfaceFail => Self::build_header(ClientFrameType::IfaceFail as u8, &[]),
            ClientFrame::Data(data) => {
                let mut payload = data.clone();
                Self::encrypt(&mut payload, block)?;
                let mut buf = Self::build_header(ClientFrameType::Data as u8, &payload);
                buf.extend_from_slice(&payload);
                buf
            }
            ClientFrame::ReqSync => Self::build_header(ClientFrameType::ReqSync as u8, &[]),
            ClientFrame::Close => Self::build_header(ClientFrameType::Close as u8, &[]),
        })
    }

    /// Unmarshals one server frame from `buf`.
    pub fn decode_server(buf: &[u8], block: &dyn Block) -> Result<(ServerFrame, usize), FrameError> {
        let (frame_type, _length, total_len) = Self::parse_header(buf)?;
        let mut payload = buf[HDR_LEN..total_len].to_vec();

        let frame_type = ServerFrameType::try_from(frame_type)?;
        match frame_type {
            ServerFrameType::Banner => {
                if payload.len() != 9 {
                    return Err(FrameError::Invalid);
                }
                let cur = Version::new(payload[0], payload[1], payload[2]);
                let min = Version::new(payload[3], payload[4], payload[5]);
                let max = Version::new(payload[6], payload[7], payload[8]);
                Ok((ServerFrame::Banner { cur, min, max }, total_len))
            }
            ServerFrameType::AuthOk => {
                let iface = Self::decode_iface_assignment(&payload)?;
                Ok((ServerFrame::AuthOk(iface), total_len))
            }
            ServerFrameType::AuthReject => Ok((ServerFrame::AuthReject, total_len)),
            ServerFrameType::Data => {
                Self::decrypt(&mut payload, block)?;
                Ok((ServerFrame::Data(payload), total_len))
            }
        }
    }

    /// Marshals a server frame into raw bytes.
    pub fn encode_server(frame: &ServerFrame, block: &dyn Block) -> crate::Result<Vec<u8>> {
        Ok(match frame {
            ServerFrame::Banner { cur, min, max } => {
                let payload = [cur.major, cur.minor, cur.patch, min.major, min.minor, min.patch, max.major, max.minor, max.patch];
                let mut buf = Self::build_header(ServerFrameType::Banner as u8, &payload);
                buf.extend_from_slice(&payload);
                buf
            }
            ServerFrame::AuthOk(iface) => {
                let payload = Self::encode_iface_assignment(iface);
                let mut buf = Self::build_header(ServerFrameType::AuthOk as u8, &payload);
                buf.extend_from_slice(&payload);
                buf
            }
            ServerFrame::AuthReject => Self::build_header(ServerFrameType::AuthReject as u8, &[]),
            ServerFrame::Data(data) => {
                let mut payload = data.clone();
                Self::encrypt(&mut payload, block)?;
                let mut buf = Self::build_header(ServerFrameType::Data as u8, &payload);
                buf.extend_from_slice(&payload);
                buf
            }
        })
    }

    fn decode_iface_assignment(payload: &[u8]) -> Result<IfaceAssignment, FrameError> {
        if payload.len() != DEV_NAME_LEN + 4 + 4 + 2 {
            return Err(FrameError::Invalid);
        }
        let dev = read_fixed_ascii(&payload[0..DEV_NAME_LEN]);
        let mut ipv4 = [0u8; 4];
        ipv4.copy_from_slice(&payload[DEV_NAME_LEN..DEV_NAME_LEN + 4]);
        let mut netmask = [0u8; 4];
        netmask.copy_from_slice(&payload[DEV_NAME_LEN + 4..DEV_NAME_LEN + 8]);
        let mtu = u16::from_be_bytes([payload[DEV_NAME_LEN + 8], payload[DEV_NAME_LEN + 9]]);
        Ok(IfaceAssignment { dev, ipv4, netmask, mtu })
    }

    fn encode_iface_assignment(iface: &IfaceAssignment) -> Vec<u8> {
        let mut payload = vec![0u8; DEV_NAME_LEN + 4 + 4 + 2];
        write_fixed_ascii(&mut payload[0..DEV_NAME_LEN], &iface.dev);
        payload[DEV_NAME_LEN..DEV_NAME_LEN + 4].copy_from_slice(&iface.ipv4);
        payload[DEV_NAME_LEN + 4..DEV_NAME_LEN + 8].copy_from_slice(&iface.netmask);
        payload[DEV_NAME_LEN + 8..DEV_NAME_LEN + 10].copy_from_slice(&iface.mtu.to_be_bytes());
        payload
    }

    /// Parses and validates the 4-byte header, returning `(type, length, total_len)`.
    fn parse_header(buf: &[u8]) -> Result<(u8, u16, usize), FrameError> {
        if buf.len() < HDR_LEN {
            return Err(FrameError::TooShort);
        }
        let frame_type = buf[0];
        let length = u16::from_be_bytes([buf[2], buf[3]]);
        if length as usize > MAX_PAYLOAD {
            return Err(FrameError::OverLength);
        }
        let total_len = HDR_LEN + length as usize;
        if buf.len() < total_len {
            return Err(FrameError::TooShort);
        }
        Ok((frame_type, length, total_len))
    }

    /// Builds the 4-byte header for a frame whose payload is `payload`.
    fn build_header(frame_type: u8, payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HDR_LEN + payload.len());
        buf.push(frame_type);
        buf.push(0); // pad, reserved
        buf.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        buf
    }

    fn encrypt(payload: &mut Vec<u8>, block: &dyn Block) -> Result<(), FrameError> {
        block.encrypt(payload).map_err(FrameError::DecryptionFailed)
    }

    fn decrypt(payload: &mut Vec<u8>, block: &dyn Block) -> Result<(), FrameError> {
        block.decrypt(payload).map_err(FrameError::DecryptionFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::plain::PlainBlock;

    fn block() -> PlainBlock {
        PlainBlock::new()
    }

    #[test]
    fn hello_round_trips() {
        let block = block();
        let buf = Parser::encode_client(&ClientFrame::Hello, &block).unwrap();
        assert_eq!(buf, vec![0, 0, 0, 0]);
        let (frame, consumed) = Parser::decode_client(&buf, &block).unwrap();
        assert_eq!(frame, ClientFrame::Hello);
        assert_eq!(consumed, 4);
    }

    #[test]
    fn auth_round_trips() {
        let block = block();
        let frame = ClientFrame::Auth {
            username: "alice".to_string(),
            password: "passw".to_string(),
        };
        let buf = Parser::encode_client(&frame, &block).unwrap();
        assert_eq!(buf.len(), HDR_LEN + 2 * AUTH_FIELD_LEN);
        let (decoded, consumed) = Parser::decode_client(&buf, &block).unwrap();
        assert_eq!(decoded, frame);
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn banner_matches_scenario_1_bytes() {
        let block = block();
        let frame = ServerFrame::Banner {
            cur: Version::new(0, 0, 1),
            min: Version::new(0, 0, 1),
            max: Version::new(0, 0, 1),
        };
        let buf = Parser::encode_server(&frame, &block).unwrap();
        assert_eq!(
            buf,
            vec![0, 0, 0x00, 0x09, 0, 0, 1, 0, 0, 1, 0, 0, 1]
        );
        let (decoded, consumed) = Parser::decode_server(&buf, &block).unwrap();
        assert_eq!(decoded, frame);
        assert_eq!(consumed, 13);
    }

    #[test]
    fn auth_ok_round_trips() {
        let block = block();
        let frame = ServerFrame::AuthOk(IfaceAssignment {
            dev: "teavpn2-srv".to_string(),
            ipv4: [10, 8, 8, 1],
            netmask: [255, 255, 255, 0],
            mtu: 1480,
        });
        let buf = Parser::encode_server(&frame, &block).unwrap();
        let (decoded, consumed) = Parser::decode_server(&buf, &block).unwrap();
        assert_eq!(decoded, frame);
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn auth_reject_is_empty_payload() {
        let block = block();
        let buf = Parser::encode_server(&ServerFrame::AuthReject, &block).unwrap();
        assert_eq!(buf, vec![2, 0, 0, 0]);
    }

    #[test]
    fn zero_length_data_frame_parses() {
        let block = block();
        let buf = Parser::encode_client(&ClientFrame::Data(vec![]), &block).unwrap();
        let (frame, consumed) = Parser::decode_client(&buf, &block).unwrap();
        assert_eq!(frame, ClientFrame::Data(vec![]));
        assert_eq!(consumed, HDR_LEN);
    }

    #[test]
    fn max_length_data_frame_parses() {
        let block = block();
        let payload = vec![0xABu8; MAX_PAYLOAD];
        let buf = Parser::encode_client(&ClientFrame::Data(payload.clone()), &block).unwrap();
        let (frame, consumed) = Parser::decode_client(&buf, &block).unwrap();
        assert_eq!(frame, ClientFrame::Data(payload));
        assert_eq!(consumed, HDR_LEN + MAX_PAYLOAD);
    }

    #[test]
    fn over_length_header_is_rejected() {
        let mut buf = vec![4u8, 0, 0x10, 0x01]; // DATA, length 4097
        buf.extend(std::iter::repeat_n(0u8, 4097));
        let err = Parser::decode_client(&buf, &block()).unwrap_err();
        assert!(matches!(err, FrameError::OverLength));
        assert!(err.is_protocol_fatal());
    }

    #[test]
    fn incomplete_frame_is_too_short() {
        let buf = vec![0u8, 0, 0, 5, 1, 2]; // header claims 5-byte payload, only 2 present
        let err = Parser::decode_client(&buf, &block()).unwrap_err();
        assert!(matches!(err, FrameError::TooShort));
    }

    #[test]
    fn unknown_client_type_is_rejected() {
        let buf = vec![200u8, 0, 0, 0];
        let err = Parser::decode_client(&buf, &block()).unwrap_err();
        assert!(matches!(err, FrameError::UnknownType(200)));
    }
}
