use std::path::{Path, PathBuf};

use serde::Serialize;

/// Shim installed into every page at document start.
pub const BRIDGE_JS: &str = include_str!("../web/appshell.js");

/// Global the startup script assigns before the shim runs.
pub const STARTUP_GLOBAL: &str = "appshellStartup";

/// Values the shim's getters return synchronously.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartupValues {
    /// Empty when the platform has no config directory.
    pub application_support_directory: String,
    pub user_documents_directory: String,
    pub remote_debugging_port: u16,
    /// Wall-clock launch time in milliseconds since the Unix epoch.
    pub launched_at_ms: f64,
}

/// Script that publishes `values` to the page. Installed ahead of the shim.
pub fn startup_script(values: &StartupValues) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string(values)?;
    Ok(format!("window.{} = {};", STARTUP_GLOBAL, json))
}

const INDEX_HTML: &str = "index.html";

/// Find the hosted app's `index.html`.
///
/// Tries, in order: the explicit app root, `www/` and `../www/` next to the
/// executable, then the per-user data directory
/// (e.g. `~/.local/share/appshell/www/`).
pub fn locate_index_html(app_root: Option<&Path>) -> Result<PathBuf, String> {
    if let Some(root) = app_root {
        let index = if root.is_file() {
            root.to_path_buf()
        } else {
            root.join(INDEX_HTML)
        };
        return if index.is_file() {
            Ok(index)
        } else {
            Err(format!("No {} in app root {:?}", INDEX_HTML, root))
        };
    }

    let mut candidates = Vec::new();
    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        candidates.push(exe_dir.join("www"));
        candidates.push(exe_dir.join("..").join("www"));
    }
    if let Some(data_dir) = dirs::data_dir() {
        candidates.push(data_dir.join("appshell").join("www"));
    }

    candidates
        .iter()
        .map(|dir| dir.join(INDEX_HTML))
        .find(|index| index.is_file())
        .ok_or_else(|| {
            format!(
                "Cannot find {} (searched {:?}); pass --app-root",
                INDEX_HTML, candidates
            )
        })
}

/// Inline page shown when the app cannot be loaded.
pub fn error_page_html(message: &str) -> String {
    let escaped = message
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;");
    format!(
        "<html><body style='background:#1a1b26;color:#a9b1d6;font-family:monospace;padding:2em'>\
         <h3>Brackets failed to load</h3><p>{}</p></body></html>",
        escaped
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shim_posts_to_the_named_handler() {
        assert!(BRIDGE_JS.contains("messageHandlers.appshell"));
        assert!(BRIDGE_JS.contains("window.appshellReceive"));
    }

    #[test]
    fn startup_script_assigns_the_global() {
        let values = StartupValues {
            application_support_directory: "/home/u/.config/Brackets".to_string(),
            user_documents_directory: "/home/u/Documents \"x\"".to_string(),
            remote_debugging_port: 9234,
            launched_at_ms: 1_700_000_000_000.0,
        };
        let script = startup_script(&values).unwrap();
        let json = script
            .strip_prefix("window.appshellStartup = ")
            .and_then(|rest| rest.strip_suffix(';'))
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(json).unwrap();
        assert_eq!(parsed["applicationSupportDirectory"], "/home/u/.config/Brackets");
        assert_eq!(parsed["userDocumentsDirectory"], "/home/u/Documents \"x\"");
        assert_eq!(parsed["remoteDebuggingPort"], 9234);
        assert!(BRIDGE_JS.contains(STARTUP_GLOBAL));
    }

    #[test]
    fn explicit_root_is_used() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<html></html>").unwrap();
        assert_eq!(
            locate_index_html(Some(dir.path())).unwrap(),
            dir.path().join("index.html")
        );
    }

    #[test]
    fn explicit_root_without_index_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(locate_index_html(Some(dir.path())).is_err());
    }

    #[test]
    fn error_page_escapes_markup() {
        let html = error_page_html("<script>");
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>"));
    }
}
