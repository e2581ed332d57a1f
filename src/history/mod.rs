//! Message history over the REST API

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use serde::Deserialize;
use url::Url;

use crate::auth::AuthToken;
use crate::chat::{ChatMessage, RoomId};
use crate::error::{ChatError, Result};

/// Source of recent messages for a room
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Fetch up to `limit` recent messages of `room_id`
    async fn fetch(&self, room_id: &RoomId, token: &AuthToken, limit: usize)
        -> Result<Vec<ChatMessage>>;
}

/// Response bodies the messages endpoint is known to return
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HistoryResponse {
    List(Vec<ChatMessage>),
    Data { data: Vec<ChatMessage> },
    Nested { data: MessagesEnvelope },
    Messages { messages: Vec<ChatMessage> },
}

#[derive(Debug, Deserialize)]
struct MessagesEnvelope {
    messages: Vec<ChatMessage>,
}

impl HistoryResponse {
    fn into_messages(self) -> Vec<ChatMessage> {
        match self {
            HistoryResponse::List(messages)
            | HistoryResponse::Data { data: messages }
            | HistoryResponse::Nested {
                data: MessagesEnvelope { messages },
            }
            | HistoryResponse::Messages { messages } => messages,
        }
    }
}

/// `GET {api}/reports/{room}/messages?limit=N`
#[derive(Debug, Clone)]
pub struct HttpHistoryClient {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpHistoryClient {
    pub fn new(api_url: &str) -> Result<Self> {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    pub fn with_client(http: reqwest::Client, api_url: &str) -> Result<Self> {
        let base_url = Url::parse(api_url)?;
        if base_url.cannot_be_a_base() {
            return Err(ChatError::invalid_argument(format!(
                "API URL '{api_url}' cannot be used as a base"
            )));
        }
        Ok(Self { http, base_url })
    }

    fn messages_url(&self, room_id: &RoomId, limit: usize) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ChatError::invalid_argument("API URL cannot be used as a base"))?
            .pop_if_empty()
            .extend(["reports", room_id.as_str(), "messages"]);
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string());
        Ok(url)
    }
}

#[async_trait]
impl HistorySource for HttpHistoryClient {
    async fn fetch(
        &self,
        room_id: &RoomId,
        token: &AuthToken,
        limit: usize,
    ) -> Result<Vec<ChatMessage>> {
        let url = self.messages_url(room_id, limit)?;
        tracing::debug!(room_id = %room_id, limit, "Fetching message history");

        let response = self
            .http
            .get(url)
            .header(AUTHORIZATION, token.bearer())
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            tracing::warn!(room_id = %room_id, status = status.as_u16(), "History request rejected");
            return Err(ChatError::Auth(format!(
                "history request rejected with status {}",
                status.as_u16()
            )));
        }
        if !status.is_success() {
            tracing::warn!(room_id = %room_id, status = status.as_u16(), "History request failed");
            return Err(ChatError::HistoryStatus {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        let messages = serde_json::from_slice::<HistoryResponse>(&body)?.into_messages();

        tracing::debug!(room_id = %room_id, count = messages.len(), "Message history loaded");
        Ok(messages)
    }
}
