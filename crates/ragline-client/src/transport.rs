//! The query transport: one streaming request, one byte stream.

use std::{future::Future, io, path::Path};

use bytes::Bytes;
use futures::{StreamExt, TryStreamExt, stream::BoxStream};
use ragline_core::{conversation::FileMetadata, query::QueryRequest};
use reqwest::{
  Method, StatusCode,
  header::{ACCEPT, HeaderValue},
  multipart::{Form, Part},
};

use crate::{ApiClient, ClientError, Result, client::check};

/// Path of the streaming query endpoint.
pub const QUERY_PATH: &str = "/query/stream";

/// Raw response body of a streaming query.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

// ─── Attachments ─────────────────────────────────────────────────────────────

/// A file sent along with a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
  pub file_name:    String,
  pub content_type: String,
  pub data:         Bytes,
}

impl Attachment {
  pub fn new(
    file_name: impl Into<String>,
    content_type: impl Into<String>,
    data: impl Into<Bytes>,
  ) -> Self {
    Self {
      file_name:    file_name.into(),
      content_type: content_type.into(),
      data:         data.into(),
    }
  }

  /// Read a file from disk, guessing its content type from the extension.
  pub async fn from_path(path: &Path) -> Result<Self> {
    let data = tokio::fs::read(path)
      .await
      .map_err(|source| ClientError::Attachment { path: path.to_path_buf(), source })?;
    let file_name = path
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_else(|| "attachment".to_string());
    Ok(Self::new(file_name, content_type_for(path), data))
  }

  /// The descriptor recorded on the message this file was sent with.
  pub fn metadata(&self) -> FileMetadata {
    FileMetadata {
      name:         self.file_name.clone(),
      content_type: self.content_type.clone(),
      size:         Some(self.data.len() as u64),
    }
  }

  fn to_part(&self) -> Result<Part> {
    Ok(
      Part::bytes(self.data.to_vec())
        .file_name(self.file_name.clone())
        .mime_str(&self.content_type)?,
    )
  }
}

/// Content type for the kinds of file the backend accepts.
pub fn content_type_for(path: &Path) -> &'static str {
  let ext = path
    .extension()
    .map(|e| e.to_string_lossy().to_ascii_lowercase())
    .unwrap_or_default();
  match ext.as_str() {
    "png" => "image/png",
    "jpg" | "jpeg" => "image/jpeg",
    "gif" => "image/gif",
    "webp" => "image/webp",
    "pdf" => "application/pdf",
    "txt" => "text/plain",
    "md" => "text/markdown",
    "csv" => "text/csv",
    "json" => "application/json",
    "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    _ => "application/octet-stream",
  }
}

// ─── Transport ───────────────────────────────────────────────────────────────

/// Sends a query and exposes the response body as bytes.
///
/// Implementations fail before yielding a stream when the response is not
/// usable (non-success status, no body). They never retry.
pub trait QueryTransport: Send + Sync {
  fn send<'a>(
    &'a self,
    request: &'a QueryRequest,
    attachments: &'a [Attachment],
  ) -> impl Future<Output = Result<ByteStream>> + Send + 'a;
}

impl QueryTransport for ApiClient {
  /// `POST /query/stream`
  ///
  /// JSON body without attachments; otherwise a multipart form with the
  /// request in a `query_params` field and one `files` part per attachment.
  async fn send(&self, request: &QueryRequest, attachments: &[Attachment]) -> Result<ByteStream> {
    let endpoint = format!("POST {QUERY_PATH}");
    let builder = self.request(Method::POST, QUERY_PATH).header(
      ACCEPT,
      HeaderValue::from_static("application/x-ndjson, text/event-stream"),
    );

    let builder = if attachments.is_empty() {
      builder.json(request)
    } else {
      let mut form = Form::new().text("query_params", serde_json::to_string(request)?);
      for attachment in attachments {
        form = form.part("files", attachment.to_part()?);
      }
      builder.multipart(form)
    };

    tracing::debug!(
      mode = %request.mode,
      attachments = attachments.len(),
      "sending query"
    );
    let resp = check(builder.send().await?, &endpoint)?;
    if resp.status() == StatusCode::NO_CONTENT {
      return Err(ClientError::NoBody { endpoint });
    }
    Ok(resp.bytes_stream().map_err(io::Error::other).boxed())
  }
}
