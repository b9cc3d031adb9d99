use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

// ---------------------------------------------------------------------------
// Persisted format: ~/.deepchat/prefs.json
// ---------------------------------------------------------------------------

/// Small client-side UI preferences that survive restarts.
#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct UiPrefs {
    /// Conversation selected when the client last exited.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_conversation_id: Option<String>,
    #[serde(default)]
    pub sidebar_collapsed: bool,
}

impl UiPrefs {
    /// Load from disk. Returns defaults if missing or invalid.
    pub fn load(file: &Path) -> Self {
        if !file.exists() {
            return Self::default();
        }
        match std::fs::read_to_string(file) {
            Ok(content) => match serde_json::from_str::<UiPrefs>(&content) {
                Ok(prefs) => prefs,
                Err(e) => {
                    warn!("Failed to parse prefs.json: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                warn!("Failed to read prefs.json: {}", e);
                Self::default()
            }
        }
    }

    /// Save to disk. Creates parent directories if needed. Errors are the
    /// caller's to log; losing a pref is never fatal.
    pub fn save(&self, file: &Path) -> anyhow::Result<()> {
        if let Some(parent) = file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(file, json)?;
        Ok(())
    }
}
