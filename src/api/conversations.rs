use super::ApiClient;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: String,
    pub title: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub thread_id: String,
    pub title: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
pub struct ConversationList {
    pub conversations: Vec<ConversationSummary>,
    pub total: u64,
}

/// One persisted turn, as reconstructed history: role and text only.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    messages: Vec<HistoryMessage>,
}

#[derive(Debug, Deserialize)]
struct ThreadCreated {
    thread_id: String,
}

impl ApiClient {
    pub async fn list_conversations(&self, limit: u32, offset: u32) -> Result<ConversationList> {
        let resp = self
            .http()
            .get(self.url(&format!(
                "/api/conversations?limit={limit}&offset={offset}"
            )))
            .send()
            .await?;
        let resp = Self::check(resp).await?;
        Ok(resp.json().await?)
    }

    pub async fn create_conversation(&self, title: Option<&str>) -> Result<Conversation> {
        let resp = self
            .http()
            .post(self.url("/api/conversations"))
            .json(&json!({ "title": title.unwrap_or("New Conversation") }))
            .send()
            .await?;
        let resp = Self::check(resp).await?;
        Ok(resp.json().await?)
    }

    pub async fn get_conversation(&self, id: &str) -> Result<Conversation> {
        let resp = self
            .http()
            .get(self.url(&format!(
                "/api/conversations/{}",
                urlencoding::encode(id)
            )))
            .send()
            .await?;
        let resp = Self::check(resp).await?;
        Ok(resp.json().await?)
    }

    pub async fn rename_conversation(&self, id: &str, title: &str) -> Result<Conversation> {
        let resp = self
            .http()
            .patch(self.url(&format!(
                "/api/conversations/{}",
                urlencoding::encode(id)
            )))
            .json(&json!({ "title": title }))
            .send()
            .await?;
        let resp = Self::check(resp).await?;
        Ok(resp.json().await?)
    }

    pub async fn delete_conversation(&self, id: &str) -> Result<()> {
        let resp = self
            .http()
            .delete(self.url(&format!(
                "/api/conversations/{}",
                urlencoding::encode(id)
            )))
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    /// Create a server-side thread; the conversation record itself appears
    /// when the first message is sent.
    pub async fn create_thread(&self) -> Result<String> {
        let resp = self.http().post(self.url("/api/threads")).send().await?;
        let resp = Self::check(resp).await?;
        let created: ThreadCreated = resp.json().await?;
        Ok(created.thread_id)
    }

    pub async fn thread_history(&self, thread_id: &str) -> Result<Vec<HistoryMessage>> {
        let resp = self
            .http()
            .get(self.url(&format!(
                "/api/threads/{}/history",
                urlencoding::encode(thread_id)
            )))
            .send()
            .await?;
        let resp = Self::check(resp).await?;
        let body: HistoryResponse = resp.json().await?;
        Ok(body.messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_response_defaults_empty() {
        let body: HistoryResponse = serde_json::from_str("{}").unwrap();
        assert!(body.messages.is_empty());
    }

    #[test]
    fn test_history_message_parse() {
        let body: HistoryResponse = serde_json::from_str(
            r#"{"messages":[{"role":"user","content":"hi"},{"role":"assistant","content":"hello"}]}"#,
        )
        .unwrap();
        assert_eq!(body.messages.len(), 2);
        assert_eq!(body.messages[1].role, "assistant");
    }
}
