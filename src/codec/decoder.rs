//! Stateful frame codec (§4.2)
//!
//! Fed incremental bytes from `recv`, emits zero or more complete client
//! frames per call. Implements the buffer-compaction algorithm literally:
//! the backing buffer is sized for exactly one maximum frame, and any bytes
//! trailing a parsed frame are copied down to offset 0 rather than kept in a
//! ring — frames must stay contiguous for zero-copy hand-off into the TUN
//! write path (§4.2, §4.4).

use crate::codec::frame::{ClientFrame, FrameError, HDR_LEN, MAX_PAYLOAD};
use crate::codec::parser::Parser;
use crate::crypto::Block;

/// Capacity of the backing buffer: one maximum frame (header + payload).
const BUF_CAP: usize = HDR_LEN + MAX_PAYLOAD;

/// Per-peer incremental frame decoder.
pub struct FrameDecoder {
    buf: Vec<u8>,
    filled: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            buf: vec![0u8; BUF_CAP],
            filled: 0,
        }
    }

    /// The unfilled suffix of the buffer, to `read()` more bytes into.
    pub fn write_slot(&mut self) -> &mut [u8] {
        &mut self.buf[self.filled..]
    }

    /// Records that `n` freshly-read bytes now occupy the front of `write_slot()`.
    pub fn commit(&mut self, n: usize) {
        self.filled += n;
    }

    /// Attempts to decode the next whole frame out of the buffered bytes.
    ///
    /// Returns `Ok(None)` when more bytes are needed (header or payload
    /// incomplete); the caller should `read()` into `write_slot()` again.
    /// On success, compacts any trailing partial frame to offset 0 so the
    /// next call has a clean run of capacity to read into.
    pub fn decode_next(&mut self, block: &dyn Block) -> Result<Option<ClientFrame>, FrameError> {
        if self.filled < HDR_LEN {
            return Ok(None);
        }

        match Parser::decode_client(&self.buf[..self.filled], block) {
            Ok((frame, consumed)) => {
                if self.filled > consumed {
                    self.buf.copy_within(consumed..self.filled, 0);
                }
                self.filled -= consumed;
                Ok(Some(frame))
            }
            Err(FrameError::TooShort) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Bytes currently buffered, for tests and accounting.
    pub fn filled(&self) -> usize {
        self.filled
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::plain::PlainBlock;

    fn feed(decoder: &mut FrameDecoder, bytes: &[u8]) {
        let slot = decoder.write_slot();
        slot[..bytes.len()].copy_from_slice(bytes);
        decoder.commit(bytes.len());
    }

    #[test]
    fn coalesced_frames_in_one_read_both_decode() {
        let block = PlainBlock::new();
        let auth = Parser::encode_client(
            &ClientFrame::Auth {
                username: "alice".into(),
                password: "passw".into(),
            },
            &block,
        )
        .unwrap();
        let data = Parser::encode_client(&ClientFrame::Data(vec![1, 2, 3]), &block).unwrap();

        let mut combined = auth.clone();
        combined.extend_from_slice(&data);

        let mut decoder = FrameDecoder::new();
        feed(&mut decoder, &combined);

        let first = decoder.decode_next(&block).unwrap().unwrap();
        assert_eq!(
            first,
            ClientFrame::Auth {
                username: "alice".into(),
                password: "passw".into()
            }
        );
        let second = decoder.decode_next(&block).unwrap().unwrap();
        assert_eq!(second, ClientFrame::Data(vec![1, 2, 3]));
        assert_eq!(decoder.filled(), 0);
    }

    #[test]
    fn arbitrary_chunk_split_yields_same_frames_as_one_shot() {
        let block = PlainBlock::new();
        let hello = Parser::encode_client(&ClientFrame::Hello, &block).unwrap();
        let data = Parser::encode_client(&ClientFrame::Data(vec![9; 200]), &block).unwrap();
        let mut stream = hello.clone();
        stream.extend_from_slice(&data);

        for split in 0..stream.len() {
            let (a, b) = stream.split_at(split);
            let mut decoder = FrameDecoder::new();
            let mut frames = Vec::new();

            feed(&mut decoder, a);
            while let Some(frame) = decoder.decode_next(&block).unwrap() {
                frames.push(frame);
            }
            feed(&mut decoder, b);
            while let Some(frame) = decoder.decode_next(&block).unwrap() {
                frames.push(frame);
            }

            assert_eq!(
                frames,
                vec![ClientFrame::Hello, ClientFrame::Data(vec![9; 200])],
                "split at {split} produced different frames"
            );
        }
    }

    #[test]
    fn over_length_header_is_fatal() {
        let block = PlainBlock::new();
        let mut decoder = FrameDecoder::new();
        feed(&mut decoder, &[4, 0, 0x10, 0x01]); // DATA, length 4097
        let err = decoder.decode_next(&block).unwrap_err();
        assert!(matches!(err, FrameError::OverLength));
    }

    #[test]
    fn partial_header_waits_for_more_bytes() {
        let block = PlainBlock::new();
        let mut decoder = FrameDecoder::new();
        feed(&mut decoder, &[0, 0, 0]);
        assert_eq!(decoder.decode_next(&block).unwrap(), None);
    }
}
