//! Byte-level newline framing.

use bytes::{Buf, BytesMut};

/// Buffers raw bytes and yields complete `\n`-terminated lines.
///
/// Framing happens before UTF-8 decoding. `\n` never occurs inside a
/// multi-byte UTF-8 sequence, so a character split across two reads simply
/// waits in the buffer until its line is complete.
#[derive(Debug, Default)]
pub struct LineFramer {
  buf: BytesMut,
}

impl LineFramer {
  pub fn new() -> Self { Self::default() }

  /// Append a chunk read from the connection.
  pub fn push(&mut self, chunk: &[u8]) { self.buf.extend_from_slice(chunk); }

  /// Pop the next complete line, without its terminator (`\n` or `\r\n`).
  pub fn next_line(&mut self) -> Option<BytesMut> {
    let pos = self.buf.iter().position(|b| *b == b'\n')?;
    let mut line = self.buf.split_to(pos);
    self.buf.advance(1);
    if line.last() == Some(&b'\r') {
      line.truncate(line.len() - 1);
    }
    Some(line)
  }

  /// Take whatever is left once the connection has ended.
  pub fn finish(&mut self) -> Option<BytesMut> {
    if self.buf.is_empty() {
      None
    } else {
      Some(self.buf.split())
    }
  }

  /// Bytes held back waiting for a newline.
  pub fn pending(&self) -> usize { self.buf.len() }
}
