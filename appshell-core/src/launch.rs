use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

use crate::error::ErrorCode;
use crate::util::find_command_in_path;

/// Port the live-development browser exposes its debugger on.
pub const LIVE_BROWSER_DEBUG_PORT: u16 = 9222;

const CHROME_COMMANDS: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
];

/// A Chrome/Chromium instance launched for live preview.
pub struct LiveBrowser {
    child: Option<Child>,
    profile_dir: Option<PathBuf>,
}

impl LiveBrowser {
    /// `None` uses a profile under the temp dir.
    pub fn new(profile_dir: Option<PathBuf>) -> Self {
        Self {
            child: None,
            profile_dir: Some(
                profile_dir.unwrap_or_else(|| std::env::temp_dir().join("appshell-live-browser")),
            ),
        }
    }

    fn find_browser() -> Option<PathBuf> {
        CHROME_COMMANDS
            .iter()
            .find_map(|command| find_command_in_path(command))
    }

    /// Open `url` in the live browser, launching it if needed.
    pub fn open(&mut self, url: &str, enable_remote_debugging: bool) -> Result<(), ErrorCode> {
        let browser = Self::find_browser().ok_or(ErrorCode::BrowserNotInstalled)?;

        let mut command = Command::new(&browser);
        if enable_remote_debugging {
            command.arg(format!("--remote-debugging-port={}", LIVE_BROWSER_DEBUG_PORT));
        }
        if let Some(profile) = &self.profile_dir {
            if let Err(e) = std::fs::create_dir_all(profile) {
                log::warn!("Failed to create live browser profile {:?}: {}", profile, e);
            }
            command.arg(format!("--user-data-dir={}", profile.display()));
        }
        command
            .args(["--no-first-run", "--no-default-browser-check", "--allow-file-access-from-files"])
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let child = command.spawn().map_err(|e| {
            log::error!("Failed to launch live browser {:?}: {}", browser, e);
            ErrorCode::BrowserNotInstalled
        })?;
        log::info!("Live browser {:?} started (pid {})", browser, child.id());

        // A second launch hands the url to the running instance and exits;
        // keep the first child so close() still targets the real process.
        if let Some(previous) = self.child.as_mut() {
            if matches!(previous.try_wait(), Ok(None)) {
                let mut handoff = child;
                std::thread::spawn(move || {
                    let _ = handoff.wait();
                });
                return Ok(());
            }
        }
        self.child = Some(child);
        Ok(())
    }

    /// Terminate the live browser. Closing when none is running is not an error.
    pub fn close(&mut self) -> Result<(), ErrorCode> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        if let Ok(Some(_)) = child.try_wait() {
            return Ok(());
        }
        child.kill().map_err(|e| {
            log::warn!("Failed to stop live browser: {}", e);
            ErrorCode::PidNotFound
        })?;
        let _ = child.wait();
        Ok(())
    }

    pub fn is_running(&mut self) -> bool {
        self.child
            .as_mut()
            .map(|c| matches!(c.try_wait(), Ok(None)))
            .unwrap_or(false)
    }
}

impl Drop for LiveBrowser {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::debug!("Live browser cleanup failed: {}", e);
        }
    }
}

/// Per-user directory where the app keeps settings and extensions.
pub fn application_support_directory(app_name: &str) -> Result<PathBuf, ErrorCode> {
    dirs::config_dir()
        .map(|dir| dir.join(app_name))
        .ok_or(ErrorCode::NotFound)
}

/// The user's documents folder, falling back to home.
pub fn user_documents_directory() -> Result<PathBuf, ErrorCode> {
    dirs::document_dir()
        .or_else(dirs::home_dir)
        .ok_or(ErrorCode::NotFound)
}
