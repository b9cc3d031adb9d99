use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

// ---------------------------------------------------------------------------
// Persisted format: ~/.deepchat/session.json
// ---------------------------------------------------------------------------

/// A stored login session. The backend issues a cookie-style session token on
/// login; persisting it lets the TUI reconnect without prompting again.
#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct StoredSession {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl StoredSession {
    /// Load from disk. Returns empty if missing or invalid.
    pub fn load(file: &Path) -> Self {
        if !file.exists() {
            return Self::default();
        }
        match std::fs::read_to_string(file) {
            Ok(content) => match serde_json::from_str::<StoredSession>(&content) {
                Ok(session) => session,
                Err(e) => {
                    warn!("Failed to parse session.json: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                warn!("Failed to read session.json: {}", e);
                Self::default()
            }
        }
    }

    /// Save to disk. Creates parent directories if needed.
    pub fn save(&self, file: &Path) -> anyhow::Result<()> {
        if let Some(parent) = file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(file, json)?;
        Ok(())
    }

    /// Remove the persisted session (logout).
    pub fn clear(file: &Path) -> anyhow::Result<()> {
        if file.exists() {
            std::fs::remove_file(file)?;
        }
        Ok(())
    }

    pub fn is_logged_in(&self) -> bool {
        self.token.as_deref().map(|t| !t.is_empty()).unwrap_or(false)
    }

    /// Return a copy with the token redacted (for display).
    pub fn redacted(&self) -> Self {
        Self {
            token: self.token.as_ref().map(|_| "***".to_string()),
            username: self.username.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("session.json");

        let session = StoredSession {
            token: Some("abc123".to_string()),
            username: Some("alice".to_string()),
        };
        session.save(&file).unwrap();

        let loaded = StoredSession::load(&file);
        assert_eq!(loaded.token.as_deref(), Some("abc123"));
        assert_eq!(loaded.username.as_deref(), Some("alice"));
        assert!(loaded.is_logged_in());
    }

    #[test]
    fn test_load_missing_file() {
        let session = StoredSession::load(Path::new("/nonexistent/session.json"));
        assert!(!session.is_logged_in());
    }

    #[test]
    fn test_load_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("session.json");
        std::fs::write(&file, "{not json").unwrap();
        let session = StoredSession::load(&file);
        assert!(!session.is_logged_in());
    }

    #[test]
    fn test_clear_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("session.json");
        StoredSession {
            token: Some("t".into()),
            username: None,
        }
        .save(&file)
        .unwrap();
        StoredSession::clear(&file).unwrap();
        assert!(!file.exists());
    }

    #[test]
    fn test_redacted_hides_token() {
        let session = StoredSession {
            token: Some("secret".into()),
            username: Some("bob".into()),
        };
        let redacted = session.redacted();
        assert_eq!(redacted.token.as_deref(), Some("***"));
        assert_eq!(redacted.username.as_deref(), Some("bob"));
    }
}
