//! HTTP client for the assistant backend. Thin wrappers only: every method
//! maps to one endpoint and bails with the status and body text on a non-2xx
//! response.

mod auth;
mod catalog;
mod conversations;
mod files;
mod users;

pub use auth::{LoginOutcome, UserInfo, UserRole, UserStatus};
pub use catalog::{AgentEntry, SkillEntry};
pub use conversations::{Conversation, ConversationList, ConversationSummary, HistoryMessage};
pub use files::{FilePreview, UploadedFile};
pub use users::UserUpdate;

use anyhow::Result;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use reqwest::{Client, Response};
use serde::Serialize;

pub struct ApiClient {
    base_url: String,
    http: Client,
}

/// Body for `POST /api/chat`. The response is an SSE stream.
#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
    pub thread_id: &'a str,
    pub message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skill: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub file_ids: Vec<String>,
}

impl ApiClient {
    /// Client with a fresh in-memory cookie jar (used for login itself).
    pub fn new(base_url: &str) -> Result<Self> {
        Self::build(base_url, None)
    }

    /// Client that presents a persisted session cookie on every request.
    pub fn with_session(base_url: &str, session_cookie: Option<&str>) -> Result<Self> {
        Self::build(base_url, session_cookie)
    }

    fn build(base_url: &str, session_cookie: Option<&str>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(cookie) = session_cookie {
            if !cookie.is_empty() {
                headers.insert(COOKIE, HeaderValue::from_str(cookie)?);
            }
        }
        let http = Client::builder()
            .cookie_store(true)
            .default_headers(headers)
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn http(&self) -> &Client {
        &self.http
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Turn a non-2xx response into an error carrying status and body text.
    pub(crate) async fn check(resp: Response) -> Result<Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        if status == reqwest::StatusCode::UNAUTHORIZED {
            anyhow::bail!("Not authenticated (401) — run `deepchat login`");
        }
        let text = resp.text().await.unwrap_or_default();
        anyhow::bail!("Request failed ({}): {}", status, text);
    }

    pub async fn health_check(&self) -> bool {
        self.http
            .get(self.url("/api/agents"))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    /// Send a chat message; returns the raw streaming response. A non-2xx
    /// status fails here, before any events are read.
    pub async fn chat_request(&self, req: &ChatRequest<'_>) -> Result<Response> {
        let resp = self
            .http
            .post(self.url("/api/chat"))
            .json(req)
            .send()
            .await?;
        Self::check(resp).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_stripped() {
        let client = ApiClient::new("http://localhost:8000/").unwrap();
        assert_eq!(client.url("/api/chat"), "http://localhost:8000/api/chat");
    }

    #[test]
    fn test_chat_request_omits_empty_optionals() {
        let req = ChatRequest {
            thread_id: "t1",
            message: "hi",
            agent: None,
            skill: None,
            file_ids: Vec::new(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"thread_id": "t1", "message": "hi"})
        );
    }

    #[test]
    fn test_chat_request_includes_set_fields() {
        let req = ChatRequest {
            thread_id: "t1",
            message: "hi",
            agent: Some("research"),
            skill: Some("summarize"),
            file_ids: vec!["f1".into()],
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["agent"], "research");
        assert_eq!(json["skill"], "summarize");
        assert_eq!(json["file_ids"][0], "f1");
    }
}
