use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde_json::{json, Value};

use appshell_core::launch::{self, LiveBrowser};
use appshell_core::menu::{MenuModel, Position};
use appshell_core::node::NodeHandle;
use appshell_core::{fs, ErrorCode};

use crate::args::Args;
use crate::assets::StartupValues;
use crate::callbacks::ContextId;
use crate::protocol::ShellMessage;

/// Delivers a message into the page.
pub type MessageSink = Rc<dyn Fn(ShellMessage)>;

/// The page currently loaded in the view. Advanced on every page load.
pub type PageContext = Rc<Cell<ContextId>>;

/// The one-shot answer to a `Call`.
///
/// Consuming `respond` sends the response; dropping an unanswered responder
/// sends `ErrorCode::Unknown` so the JS callback never hangs. Calls with
/// `id <= 0` are fire-and-forget and never answered. A responder belongs to
/// the page that made the call: once another page has loaded, its answer is
/// discarded instead of resolving an unrelated call with the same id.
pub struct Responder {
    id: i64,
    context: ContextId,
    page: PageContext,
    sink: Option<MessageSink>,
}

impl Responder {
    pub fn new(id: i64, page: &PageContext, sink: MessageSink) -> Self {
        Self {
            id,
            context: page.get(),
            page: page.clone(),
            sink: Some(sink),
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    /// The page that made the call is still loaded.
    pub fn is_current(&self) -> bool {
        self.page.get() == self.context
    }

    pub fn respond(mut self, result: Result<Vec<Value>, ErrorCode>) {
        if let Some(sink) = self.sink.take() {
            self.deliver(&sink, result);
        }
    }

    fn deliver(&self, sink: &MessageSink, result: Result<Vec<Value>, ErrorCode>) {
        if self.id <= 0 {
            return;
        }
        if !self.is_current() {
            log::debug!(
                "Discarding response to call {} from released context {:?}",
                self.id,
                self.context
            );
            return;
        }
        sink(ShellMessage::response(self.id, result));
    }
}

impl Drop for Responder {
    fn drop(&mut self) {
        if let Some(sink) = self.sink.take() {
            if self.id > 0 && self.is_current() {
                log::warn!("Call {} dropped without a response", self.id);
            }
            self.deliver(&sink, Err(ErrorCode::Unknown));
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenDialogOptions {
    pub allow_multiple: bool,
    pub choose_directory: bool,
    pub title: String,
    pub initial_path: String,
    /// Extensions without the leading dot; empty means any file.
    pub file_types: Vec<String>,
}

impl OpenDialogOptions {
    fn from_args(args: &Args) -> Result<Self, ErrorCode> {
        args.expect_len(5)?;
        Ok(Self {
            allow_multiple: args.bool(0)?,
            choose_directory: args.bool(1)?,
            title: args.string_or_empty(2)?.to_string(),
            initial_path: args.string_or_empty(3)?.to_string(),
            file_types: args
                .string_list(4)?
                .into_iter()
                .map(|ext| ext.trim_start_matches("*.").trim_start_matches('.').to_string())
                .filter(|ext| !ext.is_empty() && ext != "*")
                .collect(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveDialogOptions {
    pub title: String,
    pub initial_path: String,
    pub proposed_name: String,
}

impl SaveDialogOptions {
    fn from_args(args: &Args) -> Result<Self, ErrorCode> {
        args.expect_len(3)?;
        Ok(Self {
            title: args.string_or_empty(0)?.to_string(),
            initial_path: args.string_or_empty(1)?.to_string(),
            proposed_name: args.string_or_empty(2)?.to_string(),
        })
    }
}

/// Services only the windowing toolkit can provide.
///
/// Methods take `&self`: toolkit objects are reference-counted handles and
/// the host is called while the bridge is mutably borrowed, so a host must
/// never call back into the bridge synchronously.
pub trait ShellHost {
    /// Answer with `[paths]`; a cancelled dialog answers with an empty list.
    fn show_open_dialog(&self, options: OpenDialogOptions, responder: Responder);
    /// Answer with `[path]`; a cancelled dialog answers with `[""]`.
    fn show_save_dialog(&self, options: SaveDialogOptions, responder: Responder);
    fn move_to_trash(&self, path: &str) -> Result<(), ErrorCode>;
    fn open_url(&self, url: &str) -> Result<(), ErrorCode>;
    fn show_os_folder(&self, path: &str) -> Result<(), ErrorCode>;
    fn show_developer_tools(&self);
    fn quit(&self);
    fn abort_quit(&self);
    fn zoom_level(&self) -> f64;
    fn set_zoom_level(&self, level: f64);
    /// The menu registry changed; rebuild the native menu bar from it.
    fn menus_changed(&self, menus: &MenuModel);
    /// Only the enabled or checked state of `command` changed.
    fn menu_item_state_changed(&self, menus: &MenuModel, command: &str) {
        let _ = command;
        self.menus_changed(menus);
    }
}

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Directory name used under the platform config dir.
    pub app_name: String,
    pub remote_debugging_port: u16,
    pub live_browser_profile: Option<PathBuf>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            app_name: "Brackets".to_string(),
            remote_debugging_port: 9234,
            live_browser_profile: None,
        }
    }
}

/// Native side of the bridge for one window.
pub struct Bridge {
    config: BridgeConfig,
    menus: MenuModel,
    page: PageContext,
    started: Instant,
    launched_at: SystemTime,
    pending_files: Vec<String>,
    node: NodeHandle,
    live_browser: LiveBrowser,
}

impl Bridge {
    pub fn new(config: BridgeConfig, node: NodeHandle) -> Self {
        let live_browser = LiveBrowser::new(config.live_browser_profile.clone());
        Self {
            config,
            menus: MenuModel::new(),
            page: Rc::new(Cell::new(ContextId(0))),
            started: Instant::now(),
            launched_at: SystemTime::now(),
            pending_files: Vec::new(),
            node,
            live_browser,
        }
    }

    pub fn menus(&self) -> &MenuModel {
        &self.menus
    }

    /// The page currently loaded.
    pub fn context(&self) -> ContextId {
        self.page.get()
    }

    /// A responder for call `id` made by the current page.
    pub fn responder(&self, id: i64, sink: MessageSink) -> Responder {
        Responder::new(id, &self.page, sink)
    }

    /// A new page is loading: its script rebuilds the menus from scratch.
    /// Returns the released context; answers still owed to it are dropped.
    pub fn reset_page(&mut self, host: &dyn ShellHost) -> ContextId {
        let released = self.page.get();
        self.page.set(released.next());
        self.menus.clear();
        host.menus_changed(&self.menus);
        released
    }

    /// Values the page can read synchronously from its first script on.
    pub fn startup_values(&self) -> StartupValues {
        let launched_at_ms = self
            .launched_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64() * 1000.0)
            .unwrap_or_default();
        StartupValues {
            application_support_directory: launch::application_support_directory(
                &self.config.app_name,
            )
            .map(|dir| dir.to_string_lossy().to_string())
            .unwrap_or_default(),
            user_documents_directory: launch::user_documents_directory()
                .map(|dir| dir.to_string_lossy().to_string())
                .unwrap_or_default(),
            remote_debugging_port: self.config.remote_debugging_port,
            launched_at_ms,
        }
    }

    pub fn queue_files_to_open<I: IntoIterator<Item = String>>(&mut self, paths: I) {
        self.pending_files.extend(paths);
    }

    pub fn node(&self) -> &NodeHandle {
        &self.node
    }

    /// Validate and run one named operation, answering through `responder`.
    pub fn handle_call(
        &mut self,
        host: &dyn ShellHost,
        name: &str,
        values: &[Value],
        responder: Responder,
    ) {
        log::debug!("call {} #{} ({} args)", name, responder.id(), values.len());
        let args = Args::new(name, values);

        let result = match name {
            "ShowOpenDialog" => match OpenDialogOptions::from_args(&args) {
                Ok(options) => return host.show_open_dialog(options, responder),
                Err(e) => Err(e),
            },
            "ShowSaveDialog" => match SaveDialogOptions::from_args(&args) {
                Ok(options) => return host.show_save_dialog(options, responder),
                Err(e) => Err(e),
            },
            _ => self.call(host, name, &args),
        };

        if let Err(code) = &result {
            log::warn!("{} failed: {}", name, code);
        }
        responder.respond(result);
    }

    fn call(
        &mut self,
        host: &dyn ShellHost,
        name: &str,
        args: &Args,
    ) -> Result<Vec<Value>, ErrorCode> {
        match name {
            // ── File system ──────────────────────────────────────────────
            "ReadDir" => {
                args.expect_len(1)?;
                let names = fs::read_dir(args.string(0)?)?;
                Ok(vec![json!(names)])
            }
            "MakeDir" => {
                args.expect_len(2)?;
                fs::make_dir(args.string(0)?, args.u32(1)?)?;
                Ok(vec![])
            }
            "Rename" => {
                args.expect_len(2)?;
                fs::rename(args.string(0)?, args.string(1)?)?;
                Ok(vec![])
            }
            "GetFileInfo" => {
                args.expect_len(1)?;
                let info = fs::file_info(args.string(0)?)?;
                Ok(vec![
                    json!(info.modified),
                    json!(info.is_dir),
                    json!(info.size),
                    json!(info.real_path),
                ])
            }
            "ReadFile" => {
                args.expect_len(2)?;
                let file = fs::read_file(args.string(0)?, args.string(1)?)?;
                Ok(vec![
                    json!(file.contents),
                    json!(file.encoding),
                    json!(file.preserve_bom),
                ])
            }
            "WriteFile" => {
                args.expect_len(4)?;
                fs::write_file(
                    args.string(0)?,
                    args.string(1)?,
                    args.string(2)?,
                    args.bool(3)?,
                )?;
                Ok(vec![])
            }
            "SetPosixPermissions" => {
                args.expect_len(2)?;
                fs::set_posix_permissions(args.string(0)?, args.u32(1)?)?;
                Ok(vec![])
            }
            "DeleteFileOrDirectory" => {
                args.expect_len(1)?;
                fs::delete_file_or_directory(args.string(0)?)?;
                Ok(vec![])
            }
            "MoveFileOrDirectoryToTrash" => {
                args.expect_len(1)?;
                host.move_to_trash(args.string(0)?)?;
                Ok(vec![])
            }
            "CopyFile" => {
                args.expect_len(2)?;
                fs::copy_file(args.string(0)?, args.string(1)?)?;
                Ok(vec![])
            }
            "IsNetworkDrive" => {
                args.expect_len(1)?;
                Ok(vec![json!(fs::is_network_drive(args.string(0)?)?)])
            }

            // ── App ──────────────────────────────────────────────────────
            "GetElapsedMilliseconds" => {
                args.expect_len(0)?;
                let elapsed = self.started.elapsed().as_secs_f64() * 1000.0;
                Ok(vec![json!(elapsed)])
            }
            "GetRemoteDebuggingPort" => {
                args.expect_len(0)?;
                Ok(vec![json!(self.config.remote_debugging_port)])
            }
            "GetPendingFilesToOpen" => {
                args.expect_len(0)?;
                let files = std::mem::take(&mut self.pending_files);
                Ok(vec![json!(files)])
            }
            "GetNodeState" => {
                args.expect_len(0)?;
                Ok(vec![json!(self.node.state().code())])
            }
            "GetApplicationSupportDirectory" => {
                args.expect_len(0)?;
                let dir = launch::application_support_directory(&self.config.app_name)?;
                Ok(vec![json!(dir.to_string_lossy())])
            }
            "GetUserDocumentsDirectory" => {
                args.expect_len(0)?;
                let dir = launch::user_documents_directory()?;
                Ok(vec![json!(dir.to_string_lossy())])
            }
            "OpenURLInDefaultBrowser" => {
                args.expect_len(1)?;
                host.open_url(args.string(0)?)?;
                Ok(vec![])
            }
            "ShowOSFolder" => {
                args.expect_len(1)?;
                host.show_os_folder(args.string(0)?)?;
                Ok(vec![])
            }
            "OpenLiveBrowser" => {
                args.expect_len(2)?;
                self.live_browser.open(args.string(0)?, args.bool(1)?)?;
                Ok(vec![])
            }
            "CloseLiveBrowser" => {
                args.expect_len(0)?;
                self.live_browser.close()?;
                Ok(vec![])
            }
            "ShowDeveloperTools" => {
                args.expect_len(0)?;
                host.show_developer_tools();
                Ok(vec![])
            }
            "QuitApplication" => {
                args.expect_len(0)?;
                host.quit();
                Ok(vec![])
            }
            "AbortQuit" => {
                args.expect_len(0)?;
                host.abort_quit();
                Ok(vec![])
            }
            "GetZoomLevel" => {
                args.expect_len(0)?;
                Ok(vec![json!(host.zoom_level())])
            }
            "SetZoomLevel" => {
                args.expect_len(1)?;
                let level = args.number(0)?;
                if !level.is_finite() || level <= 0.0 {
                    return Err(ErrorCode::InvalidParams);
                }
                host.set_zoom_level(level);
                Ok(vec![])
            }

            // ── Menus ────────────────────────────────────────────────────
            "AddMenu" => {
                args.expect_len(4)?;
                let title = args.string(0)?;
                let id = args.string(1)?;
                let position = Position::parse(args.string(2)?)?;
                let insertion = self
                    .menus
                    .add_menu(id, title, position, args.string(3)?)?;
                host.menus_changed(&self.menus);
                status_result(insertion.status())
            }
            "AddMenuItem" => {
                args.expect_len(7)?;
                let position = Position::parse(args.string(5)?)?;
                let insertion = self.menus.add_menu_item(
                    args.string(0)?,
                    args.string(2)?,
                    args.string(1)?,
                    args.string(3)?,
                    args.string(4)?,
                    position,
                    args.string(6)?,
                )?;
                host.menus_changed(&self.menus);
                status_result(insertion.status())
            }
            "RemoveMenu" => {
                args.expect_len(1)?;
                self.menus.remove_menu(args.string(0)?)?;
                host.menus_changed(&self.menus);
                Ok(vec![])
            }
            "RemoveMenuItem" => {
                args.expect_len(1)?;
                self.menus.remove_menu_item(args.string(0)?)?;
                host.menus_changed(&self.menus);
                Ok(vec![])
            }
            "GetMenuItemState" => {
                args.expect_len(1)?;
                let (enabled, checked) = self.menus.item_state(args.string(0)?)?;
                Ok(vec![json!(enabled), json!(checked)])
            }
            "SetMenuItemState" => {
                args.expect_len(3)?;
                let command = args.string(0)?;
                self.menus
                    .set_item_state(command, args.bool(1)?, args.bool(2)?)?;
                host.menu_item_state_changed(&self.menus, command);
                Ok(vec![])
            }
            "SetMenuItemShortcut" => {
                args.expect_len(3)?;
                self.menus
                    .set_item_shortcut(args.string(0)?, args.string(1)?, args.string(2)?)?;
                host.menus_changed(&self.menus);
                Ok(vec![])
            }
            "GetMenuTitle" => {
                args.expect_len(1)?;
                Ok(vec![json!(self.menus.title(args.string(0)?)?)])
            }
            "SetMenuTitle" => {
                args.expect_len(2)?;
                self.menus.set_title(args.string(0)?, args.string(1)?)?;
                host.menus_changed(&self.menus);
                Ok(vec![])
            }
            "GetMenuPosition" => {
                args.expect_len(1)?;
                let (parent, index) = self.menus.position(args.string(0)?)?;
                Ok(vec![json!(parent), json!(index)])
            }

            _ => {
                log::warn!("Unknown bridge call: {}", name);
                Err(ErrorCode::Unknown)
            }
        }
    }
}

/// A call that succeeded only partially still answers with its status code.
fn status_result(status: ErrorCode) -> Result<Vec<Value>, ErrorCode> {
    if status.is_ok() {
        Ok(vec![])
    } else {
        Err(status)
    }
}
