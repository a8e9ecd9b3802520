mod host;
mod menu_bar;
mod node_runtime;
mod settings;
mod window;

use std::path::{Path, PathBuf};

use libadwaita as adw;
use libadwaita::prelude::*;

const APP_ID: &str = "io.brackets.Appshell";

/// Options taken from the command line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LaunchOptions {
    /// Overrides the `app_root` setting.
    pub app_root: Option<PathBuf>,
    /// Absolute paths handed to the page through `GetPendingFilesToOpen`.
    pub files: Vec<String>,
}

impl LaunchOptions {
    /// Parse `--app-root <dir>` / `--app-root=<dir>` and file arguments.
    /// Unknown flags are logged and skipped.
    pub fn parse<I: IntoIterator<Item = String>>(args: I, cwd: &Path) -> Self {
        let mut options = LaunchOptions::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            if let Some(value) = arg.strip_prefix("--app-root=") {
                options.app_root = Some(absolutize(value, cwd));
            } else if arg == "--app-root" {
                match args.next() {
                    Some(value) => options.app_root = Some(absolutize(&value, cwd)),
                    None => log::warn!("--app-root needs a directory"),
                }
            } else if arg.starts_with('-') {
                log::warn!("Ignoring unknown argument {}", arg);
            } else {
                options
                    .files
                    .push(absolutize(&arg, cwd).to_string_lossy().to_string());
            }
        }
        options
    }
}

fn absolutize(path: &str, cwd: &Path) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}

fn main() {
    env_logger::init();

    let mut argv = std::env::args();
    let program = argv.next().unwrap_or_else(|| "appshell".to_string());
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
    let launch = LaunchOptions::parse(argv, &cwd);
    log::info!("Launch options: {:?}", launch);

    let app = adw::Application::builder().application_id(APP_ID).build();

    app.connect_activate(move |app| {
        window::build_window(app, &launch);
    });

    // Arguments are handled above; GApplication only sees the program name
    app.run_with_args(&[program]);
}
