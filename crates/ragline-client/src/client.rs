//! Async HTTP client wrapping the RAG backend's JSON API.

use std::sync::Arc;

use ragline_core::{
  api::{ConversationApi, Page},
  conversation::{
    Conversation, ConversationId, ConversationPatch, Message, MessageId,
    NewConversation, NewMessage,
  },
};
use reqwest::{Client, RequestBuilder, Response, StatusCode, header::HeaderMap};
use serde::{Deserialize, de::DeserializeOwned};

use crate::{ClientConfig, ClientError, Result};

/// Async HTTP client for the backend's REST and streaming endpoints.
///
/// Cheap to clone: the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct ApiClient {
  pub(crate) client:   Client,
  pub(crate) config:   Arc<ClientConfig>,
  pub(crate) identity: HeaderMap,
}

impl ApiClient {
  pub fn new(config: ClientConfig) -> Result<Self> {
    let identity = config.identity_headers()?;
    // No client-wide timeout: it would also cut off long-running streams.
    // CRUD calls set a per-request timeout instead.
    let client = Client::builder()
      .connect_timeout(config.request_timeout())
      .build()?;
    Ok(Self { client, config: Arc::new(config), identity })
  }

  pub fn config(&self) -> &ClientConfig { &self.config }

  pub(crate) fn url(&self, path: &str) -> String {
    format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
  }

  /// A request carrying the identity headers.
  pub(crate) fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
    self
      .client
      .request(method, self.url(path))
      .headers(self.identity.clone())
  }

  fn crud(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
    self.request(method, path).timeout(self.config.request_timeout())
  }

  // ── Files ─────────────────────────────────────────────────────────────────

  /// `GET /files/signed-url?gcs_path=<path>&expiration_minutes=<n>`
  ///
  /// Returns a temporary download URL for a stored document.
  pub async fn signed_url(&self, storage_path: &str, expiration_minutes: u32) -> Result<String> {
    #[derive(Deserialize)]
    struct SignedUrl {
      url: String,
    }

    let endpoint = "GET /files/signed-url";
    let resp = self
      .crud(reqwest::Method::GET, "/files/signed-url")
      .query(&[
        ("gcs_path", storage_path.to_string()),
        ("expiration_minutes", expiration_minutes.to_string()),
      ])
      .send()
      .await?;
    let body: SignedUrl = json(check(resp, endpoint)?).await?;
    Ok(body.url)
  }
}

/// Map a response to an error unless its status is a success.
pub(crate) fn check(resp: Response, endpoint: &str) -> Result<Response> {
  let status = resp.status();
  if status.is_success() {
    return Ok(resp);
  }
  let endpoint = endpoint.to_string();
  if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
    return Err(ClientError::Unauthorized { endpoint, status });
  }
  Err(ClientError::Status { endpoint, status })
}

async fn json<T: DeserializeOwned>(resp: Response) -> Result<T> {
  let bytes = resp.bytes().await?;
  Ok(serde_json::from_slice(&bytes)?)
}

// ─── ConversationApi ─────────────────────────────────────────────────────────

impl ConversationApi for ApiClient {
  type Error = ClientError;

  // ── Conversations ─────────────────────────────────────────────────────────

  /// `GET /conversations/?skip=<n>&limit=<n>`
  async fn list_conversations(&self, page: Page) -> Result<Vec<Conversation>> {
    let resp = self
      .crud(reqwest::Method::GET, "/conversations/")
      .query(&[("skip", page.skip), ("limit", page.limit)])
      .send()
      .await?;
    json(check(resp, "GET /conversations/")?).await
  }

  /// `POST /conversations/`
  async fn create_conversation(&self, input: NewConversation) -> Result<Conversation> {
    let resp = self
      .crud(reqwest::Method::POST, "/conversations/")
      .json(&input)
      .send()
      .await?;
    json(check(resp, "POST /conversations/")?).await
  }

  /// `GET /conversations/<id>`
  async fn get_conversation(&self, id: ConversationId) -> Result<Conversation> {
    let path = format!("/conversations/{id}");
    let resp = self.crud(reqwest::Method::GET, &path).send().await?;
    json(check(resp, &format!("GET {path}"))?).await
  }

  /// `PATCH /conversations/<id>`
  async fn update_conversation(
    &self,
    id: ConversationId,
    patch: ConversationPatch,
  ) -> Result<Conversation> {
    let path = format!("/conversations/{id}");
    let resp = self
      .crud(reqwest::Method::PATCH, &path)
      .json(&patch)
      .send()
      .await?;
    json(check(resp, &format!("PATCH {path}"))?).await
  }

  /// `DELETE /conversations/<id>`
  async fn delete_conversation(&self, id: ConversationId) -> Result<()> {
    let path = format!("/conversations/{id}");
    let resp = self.crud(reqwest::Method::DELETE, &path).send().await?;
    check(resp, &format!("DELETE {path}"))?;
    Ok(())
  }

  // ── Messages ──────────────────────────────────────────────────────────────

  /// `GET /conversations/<id>/messages?skip=<n>&limit=<n>`
  async fn list_messages(
    &self,
    conversation_id: ConversationId,
    page: Page,
  ) -> Result<Vec<Message>> {
    let path = format!("/conversations/{conversation_id}/messages");
    let resp = self
      .crud(reqwest::Method::GET, &path)
      .query(&[("skip", page.skip), ("limit", page.limit)])
      .send()
      .await?;
    json(check(resp, &format!("GET {path}"))?).await
  }

  /// `POST /conversations/<id>/messages`
  async fn create_message(
    &self,
    conversation_id: ConversationId,
    input: NewMessage,
  ) -> Result<Message> {
    let path = format!("/conversations/{conversation_id}/messages");
    let resp = self
      .crud(reqwest::Method::POST, &path)
      .json(&input)
      .send()
      .await?;
    json(check(resp, &format!("POST {path}"))?).await
  }

  /// `DELETE /conversations/<id>/messages/<message_id>`
  async fn delete_message(
    &self,
    conversation_id: ConversationId,
    message_id: MessageId,
  ) -> Result<()> {
    let path = format!("/conversations/{conversation_id}/messages/{message_id}");
    let resp = self.crud(reqwest::Method::DELETE, &path).send().await?;
    check(resp, &format!("DELETE {path}"))?;
    Ok(())
  }
}
