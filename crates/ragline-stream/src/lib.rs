//! Demultiplexer for the line-delimited JSON query stream.
//!
//! Turns the raw byte stream of a `POST /query/stream` response into a
//! forward-only sequence of [`StreamEvent`]s:
//!
//! - bytes are framed on `\n` at the byte level, so multi-byte characters
//!   split across reads are reassembled before any decoding happens;
//! - blank lines are skipped and malformed lines are logged and skipped;
//! - an `error` field ends the sequence, and anything after it is ignored;
//! - a trailing line without a newline is decoded at end of stream.

mod decode;
mod demux;
mod framer;

pub mod error;

pub use decode::decode_line;
pub use demux::demux;
pub use error::{Result, StreamError};
pub use framer::LineFramer;
pub use ragline_core::event::StreamEvent;
