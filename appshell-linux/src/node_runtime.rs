use std::path::{Path, PathBuf};

use appshell_core::node::{self, NodeConfig, NodeHandle};
use appshell_core::util::find_command_in_path;

use crate::settings::Settings;

/// Resolve the helper's executable and script from settings.
///
/// Falls back to `node` on `PATH` and `node/index.js` beside the app root.
fn resolve_config(settings: &Settings, app_root: Option<&Path>) -> Option<NodeConfig> {
    let executable = Settings::non_empty(&settings.node_executable)
        .or_else(|| find_command_in_path("node"))?;

    let script = Settings::non_empty(&settings.node_script).or_else(|| {
        app_root
            .and_then(Path::parent)
            .map(|parent| parent.join("node").join("index.js"))
    })?;
    if !script.is_file() {
        log::warn!("Node helper script {:?} not found", script);
        return None;
    }

    Some(NodeConfig::new(executable, script.to_string_lossy()))
}

/// Start the Node helper supervisor on its own tokio runtime.
///
/// The runtime lives on a background thread until the supervisor exits. A
/// helper that cannot be configured or started reports the failed state.
pub fn start(settings: &Settings, app_root: Option<PathBuf>) -> NodeHandle {
    let Some(config) = resolve_config(settings, app_root.as_deref()) else {
        log::warn!("Node helper unavailable; reporting failed state");
        return NodeHandle::failed();
    };
    log::info!(
        "Starting Node helper: {:?} {:?}",
        config.executable,
        config.args
    );

    let (handle_tx, handle_rx) = std::sync::mpsc::channel::<NodeHandle>();
    let spawned = std::thread::Builder::new()
        .name("node-supervisor".to_string())
        .spawn(move || {
            let rt = match tokio::runtime::Builder::new_multi_thread()
                .worker_threads(1)
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    log::error!("Failed to create tokio runtime for Node helper: {}", e);
                    return;
                }
            };

            rt.block_on(async move {
                let (handle, task) = node::spawn_supervisor(config);
                let _ = handle_tx.send(handle);
                if let Err(e) = task.await {
                    log::error!("Node supervisor task ended abnormally: {}", e);
                }
            });
        });

    if let Err(e) = spawned {
        log::error!("Failed to spawn Node supervisor thread: {}", e);
        return NodeHandle::failed();
    }
    handle_rx.recv().unwrap_or_else(|_| NodeHandle::failed())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_script_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            node_executable: "/bin/sh".to_string(),
            node_script: dir.path().join("nope.js").to_string_lossy().to_string(),
            ..Settings::default()
        };
        assert!(resolve_config(&settings, None).is_none());
    }

    #[test]
    fn script_defaults_beside_app_root() {
        let dir = tempfile::tempdir().unwrap();
        let www = dir.path().join("www");
        let node_dir = dir.path().join("node");
        std::fs::create_dir_all(&www).unwrap();
        std::fs::create_dir_all(&node_dir).unwrap();
        std::fs::write(node_dir.join("index.js"), "").unwrap();

        let settings = Settings {
            node_executable: "/usr/bin/node".to_string(),
            ..Settings::default()
        };
        let config = resolve_config(&settings, Some(&www)).unwrap();
        assert_eq!(config.executable, PathBuf::from("/usr/bin/node"));
        assert_eq!(
            config.args,
            vec![node_dir.join("index.js").to_string_lossy().to_string()]
        );
    }
}
