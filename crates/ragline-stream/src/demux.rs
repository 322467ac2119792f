//! The byte stream → event stream adapter.

use futures::{Stream, StreamExt};

use crate::{LineFramer, Result, StreamError, StreamEvent, decode_line};

/// Demultiplex a response body into events.
///
/// The returned stream is lazy and tied to `body`; it cannot be restarted.
/// It ends after the first [`StreamEvent::Error`], after a read failure
/// (yielded as [`StreamError::Read`]), or when `body` ends.
pub fn demux<S, B, E>(body: S) -> impl Stream<Item = Result<StreamEvent>> + Send + 'static
where
  S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
  B: AsRef<[u8]> + Send + 'static,
  E: std::error::Error + Send + Sync + 'static,
{
  async_stream::stream! {
    let mut body = std::pin::pin!(body);
    let mut framer = LineFramer::new();

    while let Some(chunk) = body.next().await {
      let chunk = match chunk {
        Ok(chunk) => chunk,
        Err(e) => {
          yield Err(StreamError::Read(Box::new(e)));
          return;
        }
      };
      framer.push(chunk.as_ref());

      while let Some(line) = framer.next_line() {
        for event in events_from(&line) {
          let terminal = event.is_error();
          yield Ok(event);
          if terminal {
            return;
          }
        }
      }
    }

    if let Some(line) = framer.finish() {
      for event in events_from(&line) {
        let terminal = event.is_error();
        yield Ok(event);
        if terminal {
          return;
        }
      }
    }
  }
}

/// Decode a line, logging and skipping anything that is not an event.
fn events_from(line: &[u8]) -> Vec<StreamEvent> {
  match decode_line(line) {
    Ok(Some(events)) => {
      if events.is_empty() {
        tracing::debug!("stream line carried no known fields");
      }
      events
    }
    Ok(None) => Vec::new(),
    Err(e) => {
      tracing::warn!(
        "skipping stream line ({e}): {}",
        String::from_utf8_lossy(line)
      );
      Vec::new()
    }
  }
}
