//! Read-only view of the launcher's application list. The launcher owns
//! `applications.json`; the engine only needs each entry's name and target.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

/// One configured application. `name` is the only join key into usage and
/// goal data.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct AppEntry {
    pub name: String,
    pub exe: String,
}

/// Targets that can never appear in a process list: URLs and `.url` shortcut
/// files. The tracker excludes them from polling.
pub fn is_link_target(exe: &str) -> bool {
    let lower = exe.to_lowercase();
    lower.ends_with(".url") || lower.starts_with("http://") || lower.starts_with("https://")
}

/// Provider of the configured application list. The poll loop re-reads it on
/// every scan so launcher-side edits take effect without a restart.
pub trait AppSource: Send + Sync + 'static {
    fn applications(&self) -> Vec<AppEntry>;
}

impl AppSource for Vec<AppEntry> {
    fn applications(&self) -> Vec<AppEntry> {
        self.clone()
    }
}

#[derive(Deserialize)]
struct ApplicationsDocument {
    #[serde(default)]
    applications: Vec<AppEntry>,
}

/// [AppSource] backed by the launcher's `applications.json`.
pub struct ConfigFileSource {
    path: PathBuf,
}

impl ConfigFileSource {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join("applications.json"),
        }
    }

    fn read(&self) -> Vec<AppEntry> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(v) => v,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return vec![],
            Err(e) => {
                warn!("Failed to read application list {:?}: {e}", self.path);
                return vec![];
            }
        };

        match serde_json::from_str::<ApplicationsDocument>(&content) {
            Ok(doc) => doc.applications,
            Err(e) => {
                warn!("Malformed application list {:?}: {e}", self.path);
                vec![]
            }
        }
    }
}

impl AppSource for ConfigFileSource {
    fn applications(&self) -> Vec<AppEntry> {
        self.read()
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::{is_link_target, AppSource, ConfigFileSource};

    #[test]
    fn link_targets_are_detected() {
        assert!(is_link_target("https://example.com"));
        assert!(is_link_target("HTTP://example.com"));
        assert!(is_link_target("C:\\links\\site.URL"));
        assert!(!is_link_target("c:\\program files\\app\\app.exe"));
    }

    #[test]
    fn missing_and_malformed_files_yield_empty_lists() {
        let dir = tempfile::tempdir().unwrap();
        let source = ConfigFileSource::new(dir.path());
        assert!(source.applications().is_empty());

        fs::write(dir.path().join("applications.json"), "{ not json").unwrap();
        assert!(source.applications().is_empty());
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("applications.json"),
            r#"{
                "applications": [
                    { "name": "Chrome", "exe": "C:\\chrome.exe", "group_id": "browsers", "order": 3 }
                ],
                "groups": { "browsers": { "name": "Browsers" } }
            }"#,
        )
        .unwrap();

        let apps = ConfigFileSource::new(dir.path()).applications();
        assert_eq!(apps.len(), 1);
        assert_eq!(apps[0].name, "Chrome");
    }
}
