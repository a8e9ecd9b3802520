use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Host settings, persisted to `~/.config/appshell/settings.json`.
///
/// Missing fields fall back to their `Default` values, so older files keep
/// loading as fields are added.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // ── Window ───────────────────────────────────────────────────────────
    pub window_width: i32,
    pub window_height: i32,
    pub window_maximized: bool,
    pub zoom_level: f64,

    // ── App ──────────────────────────────────────────────────────────────
    /// Directory holding the app's `index.html`. Empty means search.
    pub app_root: String,
    pub remote_debugging_port: u16,
    /// Chrome profile for the live preview browser. Empty means a temp dir.
    pub live_browser_profile: String,

    // ── Node helper ──────────────────────────────────────────────────────
    /// Empty means `node` on `PATH`.
    pub node_executable: String,
    /// Empty means `node/index.js` beside the app root.
    pub node_script: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            window_width: 1200,
            window_height: 800,
            window_maximized: false,
            zoom_level: 1.0,

            app_root: String::new(),
            remote_debugging_port: 9234,
            live_browser_profile: String::new(),

            node_executable: String::new(),
            node_script: String::new(),
        }
    }
}

impl Settings {
    pub fn non_empty(value: &str) -> Option<PathBuf> {
        if value.is_empty() {
            None
        } else {
            Some(PathBuf::from(value))
        }
    }
}

fn settings_path() -> PathBuf {
    let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("/tmp"));
    let appshell_dir = config_dir.join("appshell");
    let _ = std::fs::create_dir_all(&appshell_dir);
    appshell_dir.join("settings.json")
}

pub fn load() -> Settings {
    load_from(&settings_path())
}

pub fn save(settings: &Settings) {
    if let Err(e) = save_to(settings, &settings_path()) {
        log::warn!("Failed to save settings: {}", e);
    }
}

fn load_from(path: &Path) -> Settings {
    match std::fs::read_to_string(path) {
        Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
            log::warn!("Ignoring malformed settings {:?}: {}", path, e);
            Settings::default()
        }),
        Err(_) => Settings::default(),
    }
}

fn save_to(settings: &Settings, path: &Path) -> Result<(), String> {
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| format!("Failed to serialize settings: {}", e))?;
    std::fs::write(path, json).map_err(|e| format!("Failed to write {:?}: {}", path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_use_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"window_width": 900, "window_maximized": true}"#).unwrap();

        let settings = load_from(&path);
        assert_eq!(settings.window_width, 900);
        assert!(settings.window_maximized);
        assert_eq!(settings.window_height, 800);
        assert_eq!(settings.remote_debugging_port, 9234);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(load_from(&path), Settings::default());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let settings = Settings {
            zoom_level: 1.5,
            node_script: "/opt/brackets/node/index.js".to_string(),
            ..Settings::default()
        };
        save_to(&settings, &path).unwrap();
        assert_eq!(load_from(&path), settings);
    }

    #[test]
    fn empty_paths_are_unset() {
        assert_eq!(Settings::non_empty(""), None);
        assert_eq!(Settings::non_empty("/a"), Some(PathBuf::from("/a")));
    }
}
