//! Byte stream to line framing
//!
//! Panels write newline-delimited text, but a single socket read can end in
//! the middle of a line or carry several lines at once. `LineFramer` buffers
//! raw bytes and hands out complete lines as they become available.

use bytes::{Buf, BytesMut};

use crate::error::{ProtocolError, ProtocolResult};

/// Default upper bound for a single line
pub const DEFAULT_MAX_LINE_LEN: usize = 64 * 1024;

/// Accumulates raw bytes and yields complete, line-feed terminated lines.
///
/// One framer belongs to one connection. A reconnect starts a fresh framer,
/// so a partial line left over from a dropped connection is never glued onto
/// the next one.
#[derive(Debug)]
pub struct LineFramer {
    buf: BytesMut,
    max_line_len: usize,
}

impl LineFramer {
    /// Create a framer with the default line limit
    pub fn new() -> Self {
        Self::with_max_line_len(DEFAULT_MAX_LINE_LEN)
    }

    /// Create a framer that rejects lines longer than `max_line_len` bytes
    pub fn with_max_line_len(max_line_len: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(1024),
            max_line_len,
        }
    }

    /// Append bytes read from the socket
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Mutable access to the receive buffer, for `AsyncReadExt::read_buf`
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    /// Number of buffered bytes not yet returned as a line
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Take the next complete line out of the buffer.
    ///
    /// The terminating `\n` (and a preceding `\r`, if any) is stripped.
    /// Invalid UTF-8 is replaced rather than rejected. Returns `Ok(None)` when
    /// no complete line is buffered yet.
    ///
    /// If the buffer grows past the line limit without a terminator, the
    /// buffered bytes are discarded and `LineTooLong` is returned; framing
    /// resumes with the next bytes pushed.
    pub fn next_line(&mut self) -> ProtocolResult<Option<String>> {
        match self.buf.iter().position(|b| *b == b'\n') {
            Some(pos) => {
                let raw = self.buf.split_to(pos);
                self.buf.advance(1);

                let mut line = raw.as_ref();
                if let Some(stripped) = line.strip_suffix(b"\r") {
                    line = stripped;
                }
                Ok(Some(String::from_utf8_lossy(line).into_owned()))
            }
            None if self.buf.len() > self.max_line_len => {
                self.buf.clear();
                Err(ProtocolError::LineTooLong {
                    limit: self.max_line_len,
                })
            }
            None => Ok(None),
        }
    }
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(framer: &mut LineFramer) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(line) = framer.next_line().unwrap() {
            lines.push(line);
        }
        lines
    }

    #[test]
    fn test_splits_multiple_lines_in_one_read() {
        let mut framer = LineFramer::new();
        framer.push(b"# hello\n{\"a\":1}\nled=#FFFFFF\n");

        assert_eq!(drain(&mut framer), vec!["# hello", "{\"a\":1}", "led=#FFFFFF"]);
        assert_eq!(framer.pending(), 0);
    }

    #[test]
    fn test_partial_line_spans_reads() {
        let mut framer = LineFramer::new();
        framer.push(b"{\"events\":[{\"la");
        assert!(framer.next_line().unwrap().is_none());

        framer.push(b"bel\":\"Key1\",\"state\":\"1\"}]}\n{\"ne");
        assert_eq!(
            drain(&mut framer),
            vec!["{\"events\":[{\"label\":\"Key1\",\"state\":\"1\"}]}"]
        );
        assert_eq!(framer.pending(), 4);
    }

    #[test]
    fn test_strips_carriage_return() {
        let mut framer = LineFramer::new();
        framer.push(b"led=?\r\n");
        assert_eq!(framer.next_line().unwrap().as_deref(), Some("led=?"));
    }

    #[test]
    fn test_empty_lines_are_returned() {
        let mut framer = LineFramer::new();
        framer.push(b"\n\nx\n");
        assert_eq!(drain(&mut framer), vec!["", "", "x"]);
    }

    #[test]
    fn test_overlong_line_is_discarded() {
        let mut framer = LineFramer::with_max_line_len(8);
        framer.push(b"0123456789");
        assert!(matches!(
            framer.next_line(),
            Err(ProtocolError::LineTooLong { limit: 8 })
        ));
        assert_eq!(framer.pending(), 0);

        framer.push(b"ok\n");
        assert_eq!(framer.next_line().unwrap().as_deref(), Some("ok"));
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut framer = LineFramer::new();
        framer.push(&[b'#', 0xff, b'\n']);
        let line = framer.next_line().unwrap().unwrap();
        assert!(line.starts_with('#'));
    }
}
