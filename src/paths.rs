use std::path::PathBuf;
use std::sync::OnceLock;

static DEEPCHAT_HOME: OnceLock<PathBuf> = OnceLock::new();

/// Returns the Deepchat home directory (`~/.deepchat/`).
/// Supports `$DEEPCHAT_HOME` env override. Cached via `OnceLock`.
pub fn deepchat_home() -> &'static PathBuf {
    DEEPCHAT_HOME.get_or_init(|| {
        if let Ok(val) = std::env::var("DEEPCHAT_HOME") {
            let p = PathBuf::from(val);
            if !p.as_os_str().is_empty() {
                return p;
            }
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".deepchat")
    })
}

/// `~/.deepchat/session.json`
pub fn session_file() -> PathBuf {
    deepchat_home().join("session.json")
}

/// `~/.deepchat/prefs.json`
pub fn prefs_file() -> PathBuf {
    deepchat_home().join("prefs.json")
}
