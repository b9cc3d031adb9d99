//! Static capability lists: which agents can be addressed explicitly and
//! which skills can be invoked. Consumed by the input surface, not the
//! streaming reducer.

use super::ApiClient;
use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AgentEntry {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub icon: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SkillEntry {
    pub name: String,
    pub description: String,
}

impl ApiClient {
    pub async fn list_agents(&self) -> Result<Vec<AgentEntry>> {
        let resp = self.http().get(self.url("/api/agents")).send().await?;
        let resp = Self::check(resp).await?;
        Ok(resp.json().await?)
    }

    pub async fn list_skills(&self) -> Result<Vec<SkillEntry>> {
        let resp = self.http().get(self.url("/api/skills")).send().await?;
        let resp = Self::check(resp).await?;
        Ok(resp.json().await?)
    }
}
