//! Admin-only user management. The backend enforces the role check; these
//! calls simply surface its 403 as an error.

use super::auth::{UserInfo, UserRole, UserStatus};
use super::ApiClient;
use anyhow::Result;
use serde::Serialize;
use serde_json::json;

/// Partial update for `PATCH /api/users/{id}`; only set fields are sent.
#[derive(Debug, Default, Serialize)]
pub struct UserUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<UserRole>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<UserStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl ApiClient {
    pub async fn list_users(&self) -> Result<Vec<UserInfo>> {
        let resp = self.http().get(self.url("/api/users")).send().await?;
        let resp = Self::check(resp).await?;
        Ok(resp.json().await?)
    }

    pub async fn create_user(
        &self,
        username: &str,
        password: &str,
        role: UserRole,
    ) -> Result<UserInfo> {
        let resp = self
            .http()
            .post(self.url("/api/users"))
            .json(&json!({
                "username": username,
                "password": password,
                "role": role,
            }))
            .send()
            .await?;
        let resp = Self::check(resp).await?;
        Ok(resp.json().await?)
    }

    pub async fn update_user(&self, id: &str, update: &UserUpdate) -> Result<UserInfo> {
        let resp = self
            .http()
            .patch(self.url(&format!("/api/users/{}", urlencoding::encode(id))))
            .json(update)
            .send()
            .await?;
        let resp = Self::check(resp).await?;
        Ok(resp.json().await?)
    }

    pub async fn delete_user(&self, id: &str) -> Result<()> {
        let resp = self
            .http()
            .delete(self.url(&format!("/api/users/{}", urlencoding::encode(id))))
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_update_skips_unset_fields() {
        let update = UserUpdate {
            status: Some(UserStatus::Disabled),
            ..Default::default()
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json, serde_json::json!({"status": "disabled"}));
    }

    #[test]
    fn test_user_update_full() {
        let update = UserUpdate {
            role: Some(UserRole::Admin),
            status: Some(UserStatus::Active),
            password: Some("pw".into()),
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["role"], "admin");
        assert_eq!(json["status"], "active");
        assert_eq!(json["password"], "pw");
    }
}
