//! Stream framing
//!
//! Serial reads arrive in arbitrary chunks. [`FrameAssembler`] cuts the
//! stream into whole frames according to the active protocol's
//! [`FrameShape`], keeping partial frames buffered between chunks.

use super::protocol::newton;
use super::protocol::FrameShape;
use bytes::{Buf, Bytes, BytesMut};
use std::io;
use tokio_util::codec::Decoder;
use tracing::{trace, warn};

/// Longest line kept before the buffer is dropped
pub const MAX_LINE_LEN: usize = 4096;

fn is_terminator(byte: u8) -> bool {
    byte == b'\r' || byte == b'\n'
}

/// Splits a byte stream into frames
#[derive(Debug, Clone)]
pub struct FrameAssembler {
    shape: FrameShape,
    max_line_len: usize,
    skipped: usize,
    overflow: usize,
}

impl FrameAssembler {
    /// Assembler for a frame shape
    pub fn new(shape: FrameShape) -> Self {
        Self {
            shape,
            max_line_len: MAX_LINE_LEN,
            skipped: 0,
            overflow: 0,
        }
    }

    /// Override the line length cap
    pub fn with_max_line_len(mut self, max_line_len: usize) -> Self {
        self.max_line_len = max_line_len.max(1);
        self
    }

    /// Current frame shape
    pub fn shape(&self) -> FrameShape {
        self.shape
    }

    /// Bytes dropped while hunting for a binary header since the last call
    pub fn take_skipped(&mut self) -> usize {
        std::mem::take(&mut self.skipped)
    }

    /// Bytes dropped because a line exceeded the cap since the last call
    pub fn take_overflow(&mut self) -> usize {
        std::mem::take(&mut self.overflow)
    }

    fn decode_line(&mut self, src: &mut BytesMut) -> Option<Bytes> {
        let start = src.iter().position(|b| !is_terminator(*b)).unwrap_or(src.len());
        src.advance(start);

        match src.iter().position(|b| is_terminator(*b)) {
            Some(end) => {
                let line = src.split_to(end).freeze();
                src.advance(1);
                Some(line)
            }
            None => {
                if src.len() > self.max_line_len {
                    warn!(len = src.len(), "line exceeds {} bytes, dropped", self.max_line_len);
                    self.overflow += src.len();
                    src.clear();
                }
                None
            }
        }
    }

    fn decode_counted(&mut self, src: &mut BytesMut) -> Option<Bytes> {
        let start = src.iter().position(|b| b & newton::HEAD != 0).unwrap_or(src.len());
        if start > 0 {
            trace!(skipped = start, "bytes before frame header");
            self.skipped += start;
            src.advance(start);
        }

        let len = newton::frame_len(*src.first()?)?;
        if src.len() < len {
            src.reserve(len - src.len());
            return None;
        }
        Some(src.split_to(len).freeze())
    }

    fn decode_fixed(src: &mut BytesMut, len: usize) -> Option<Bytes> {
        let len = len.max(1);
        if src.len() < len {
            src.reserve(len - src.len());
            return None;
        }
        Some(src.split_to(len).freeze())
    }
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new(FrameShape::Line)
    }
}

impl Decoder for FrameAssembler {
    type Item = Bytes;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Ok(match self.shape {
            FrameShape::Line => self.decode_line(src),
            FrameShape::HeaderCounted => self.decode_counted(src),
            FrameShape::Fixed(len) => Self::decode_fixed(src, len),
        })
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if src.is_empty() {
            return Ok(None);
        }
        match self.shape {
            // unterminated last line
            FrameShape::Line => Ok(Some(src.split().freeze())),
            FrameShape::HeaderCounted | FrameShape::Fixed(_) => {
                self.skipped += src.len();
                src.clear();
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(assembler: &mut FrameAssembler, src: &mut BytesMut) -> Vec<Bytes> {
        let mut frames = Vec::new();
        while let Some(frame) = assembler.decode(src).unwrap() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn test_lines_across_chunks() {
        let mut assembler = FrameAssembler::default();
        let mut buf = BytesMut::from(&b"W +1.0"[..]);
        assert!(drain(&mut assembler, &mut buf).is_empty());

        buf.extend_from_slice(b"00 kg\r\nW +2.000 kg\r\n\r\n");
        let frames = drain(&mut assembler, &mut buf);
        assert_eq!(frames, vec![&b"W +1.000 kg"[..], &b"W +2.000 kg"[..]]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_lf_only_and_cr_only() {
        let mut assembler = FrameAssembler::default();
        let mut buf = BytesMut::from(&b"a\nb\rc"[..]);
        assert_eq!(drain(&mut assembler, &mut buf), vec![&b"a"[..], &b"b"[..]]);
        assert_eq!(&buf[..], b"c");
    }

    #[test]
    fn test_eof_emits_unterminated_line() {
        let mut assembler = FrameAssembler::default();
        let mut buf = BytesMut::from(&b"+0012345"[..]);
        assert_eq!(assembler.decode(&mut buf).unwrap(), None);
        assert_eq!(
            assembler.decode_eof(&mut buf).unwrap().as_deref(),
            Some(&b"+0012345"[..])
        );
        assert_eq!(assembler.decode_eof(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_line_overflow() {
        let mut assembler = FrameAssembler::default().with_max_line_len(8);
        let mut buf = BytesMut::from(&b"0123456789"[..]);
        assert_eq!(assembler.decode(&mut buf).unwrap(), None);
        assert!(buf.is_empty());
        assert_eq!(assembler.take_overflow(), 10);
        assert_eq!(assembler.take_overflow(), 0);
    }

    #[test]
    fn test_header_counted() {
        let mut assembler = FrameAssembler::new(FrameShape::HeaderCounted);
        // echo noise, then a two-channel frame split across chunks
        let mut buf = BytesMut::from(&b"P\r\n\xc1\x01\x00"[..]);
        assert!(drain(&mut assembler, &mut buf).is_empty());
        assert_eq!(assembler.take_skipped(), 3);

        buf.extend_from_slice(&[0x00, 0x02, 0x00, 0x00, 0xc0, 0x05]);
        let frames = drain(&mut assembler, &mut buf);
        assert_eq!(frames, vec![&[0xc1, 0x01, 0x00, 0x00, 0x02, 0x00, 0x00][..]]);
        assert_eq!(&buf[..], &[0xc0, 0x05]);
    }

    #[test]
    fn test_fixed() {
        let mut assembler = FrameAssembler::new(FrameShape::Fixed(4));
        let mut buf = BytesMut::from(&[1u8, 2, 3, 4, 5, 6][..]);
        assert_eq!(drain(&mut assembler, &mut buf), vec![&[1u8, 2, 3, 4][..]]);
        assert_eq!(assembler.decode_eof(&mut buf).unwrap(), None);
        assert_eq!(assembler.take_skipped(), 2);
    }
}
