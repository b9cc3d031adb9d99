use super::ApiClient;
use anyhow::Result;
use reqwest::header::SET_COOKIE;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: String,
    pub username: String,
    pub role: UserRole,
    pub status: UserStatus,
    pub created_at: String,
}

impl UserInfo {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    user: UserInfo,
    #[allow(dead_code)]
    #[serde(default)]
    message: String,
}

/// Result of a successful login: the authenticated user plus the session
/// cookie (`name=value`) to persist for later runs.
#[derive(Debug)]
pub struct LoginOutcome {
    pub user: UserInfo,
    pub session_cookie: Option<String>,
}

impl ApiClient {
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginOutcome> {
        let resp = self
            .http()
            .post(self.url("/api/auth/login"))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await?;
        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            anyhow::bail!("Invalid username or password");
        }
        let resp = Self::check(resp).await?;

        // Capture the session cookie before the body is consumed so it can be
        // persisted across runs.
        let session_cookie = resp
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|raw| raw.split(';').next())
            .map(|pair| pair.trim().to_string())
            .find(|pair| pair.contains('='));

        let body: LoginResponse = resp.json().await?;
        Ok(LoginOutcome {
            user: body.user,
            session_cookie,
        })
    }

    pub async fn logout(&self) -> Result<()> {
        let resp = self
            .http()
            .post(self.url("/api/auth/logout"))
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    /// Current authenticated user, or an error when the session is missing
    /// or expired.
    pub async fn current_user(&self) -> Result<UserInfo> {
        let resp = self.http().get(self.url("/api/auth/me")).send().await?;
        let resp = Self::check(resp).await?;
        Ok(resp.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_info_deserialize() {
        let user: UserInfo = serde_json::from_str(
            r#"{"id":"u1","username":"alice","role":"admin","status":"active","created_at":"2025-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert!(user.is_admin());
        assert_eq!(user.status, UserStatus::Active);
    }

    #[test]
    fn test_non_admin_role() {
        let user: UserInfo = serde_json::from_str(
            r#"{"id":"u2","username":"bob","role":"user","status":"disabled","created_at":""}"#,
        )
        .unwrap();
        assert!(!user.is_admin());
    }
}
