use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::{Rc, Weak};

use gtk4::prelude::*;
use libadwaita as adw;
use libadwaita::prelude::*;
use webkit6::prelude::*;

use appshell_bridge::assets::{self, StartupValues};
use appshell_bridge::dispatch::MessageSink;
use appshell_bridge::protocol::{self, ClientMessage, ShellMessage};
use appshell_bridge::{Bridge, BridgeConfig, CallbackRegistry};
use appshell_core::menu::Tag;
use appshell_core::ErrorCode;
use appshell_core::util::{file_path_to_uri, uri_to_file_path};

use crate::host::{CloseState, GtkHost};
use crate::menu_bar::MenuBar;
use crate::settings::{self, Settings};
use crate::LaunchOptions;

/// JS command that asks the page whether the window may close.
const CLOSE_WINDOW_COMMAND: &str = "file.close_window";

/// Resolution of a native → JS command, called with `handled`, or with
/// `None` when the page went away before answering.
type CommandCallback = Box<dyn FnOnce(Option<bool>)>;

/// WebKit editing command run when the page leaves a menu command unhandled.
fn native_edit_command(command: &str) -> Option<&'static str> {
    match command {
        "edit.cut" => Some("Cut"),
        "edit.copy" => Some("Copy"),
        "edit.paste" => Some("Paste"),
        "edit.selectAll" => Some("SelectAll"),
        "edit.undo" => Some("Undo"),
        "edit.redo" => Some("Redo"),
        _ => None,
    }
}

/// Per-window state behind the bridge.
struct Shell {
    bridge: RefCell<Bridge>,
    host: GtkHost,
    callbacks: RefCell<CallbackRegistry<CommandCallback>>,
    settings: RefCell<Settings>,
}

impl Shell {
    fn sink(&self) -> MessageSink {
        let webview = self.host.webview.clone();
        Rc::new(move |message| send_message(&webview, &message))
    }

    fn send(&self, message: &ShellMessage) {
        send_message(&self.host.webview, message);
    }

    fn on_client_message(self: &Rc<Self>, json: &str) {
        let message = match protocol::parse_client_message(json) {
            Ok(m) => m,
            Err(e) => {
                log::warn!("Failed to parse ClientMessage: {} (json: {})", e, json);
                if let Some(id) = protocol::malformed_call_id(json) {
                    self.send(&ShellMessage::response(id, Err(ErrorCode::InvalidParams)));
                }
                return;
            }
        };
        log::trace!("JS -> native: {:?}", message);

        match message {
            ClientMessage::Ready => {
                log::info!("Bridge ready in context {:?}", self.bridge.borrow().context());
                self.host.close.page_ready.set(true);
            }
            ClientMessage::Call { id, name, args } => {
                let responder = self.bridge.borrow().responder(id, self.sink());
                self.bridge
                    .borrow_mut()
                    .handle_call(&self.host, &name, &args, responder);
            }
            ClientMessage::CommandResult {
                callback_id,
                handled,
            } => {
                let callback = self.callbacks.borrow_mut().take(callback_id);
                match callback {
                    Some(callback) => callback(Some(handled)),
                    None => log::debug!("No pending command callback {}", callback_id),
                }
            }
        }
    }

    /// A new page is loading: purge the old context and its menus.
    fn on_load_started(&self) {
        self.host.close.page_ready.set(false);

        let old = self.bridge.borrow_mut().reset_page(&self.host);
        let purged = self.callbacks.borrow_mut().release_context(old);
        log::debug!(
            "Page load started; released context {:?} ({} pending callbacks)",
            old,
            purged.len()
        );
        // Nothing can answer them any more
        for callback in purged {
            callback(None);
        }
    }

    /// Run the JS command bound to a menu item. Returns `false` when no
    /// command was sent.
    fn execute_menu_tag(&self, tag: Tag) -> bool {
        let (command, context) = {
            let bridge = self.bridge.borrow();
            match bridge.menus().item_for_tag(tag) {
                Some(item) if item.enabled => (item.command.clone(), bridge.context()),
                Some(_) => return false,
                None => {
                    log::debug!("Menu tag {} has no item", tag);
                    return false;
                }
            }
        };
        log::debug!("Menu command: {}", command);

        let webview = self.host.webview.clone();
        let fallback = native_edit_command(&command);
        let callback_id = self.callbacks.borrow_mut().register(
            context,
            Box::new(move |handled| {
                if let (Some(false), Some(edit)) = (handled, fallback) {
                    log::debug!("Page left the command unhandled; running {}", edit);
                    webview.execute_editing_command(edit);
                }
            }),
        );
        self.send(&ShellMessage::ExecuteCommand {
            callback_id,
            command,
        });
        true
    }

    /// Ask the page to close the window. Returns `false` when the window
    /// should close right away.
    fn request_close(self: &Rc<Self>) -> bool {
        let close = &self.host.close;
        if close.force_close.get() || !close.page_ready.get() {
            return false;
        }
        if close.close_pending.get() {
            return true;
        }
        close.close_pending.set(true);

        let shell = Rc::downgrade(self);
        let context = self.bridge.borrow().context();
        let callback_id = self.callbacks.borrow_mut().register(
            context,
            Box::new(move |handled| on_close_answer(&shell, handled)),
        );
        self.send(&ShellMessage::ExecuteCommand {
            callback_id,
            command: CLOSE_WINDOW_COMMAND.to_string(),
        });
        true
    }

    fn files_dropped(&self, paths: Vec<String>) {
        if paths.is_empty() {
            return;
        }
        log::info!("{} file(s) dropped", paths.len());
        self.bridge
            .borrow_mut()
            .queue_files_to_open(paths.iter().cloned());
        self.send(&ShellMessage::FilesDropped { paths });
    }

    fn save_window_state(&self) {
        let window = &self.host.window;
        let mut s = self.settings.borrow_mut();
        s.window_maximized = window.is_maximized();
        if !s.window_maximized {
            let (width, height) = window.default_size();
            if width > 0 && height > 0 {
                s.window_width = width;
                s.window_height = height;
            }
        }
        s.zoom_level = self.host.webview.zoom_level();
        settings::save(&s);
    }
}

/// A page that went away without answering cannot veto the close.
fn on_close_answer(shell: &Weak<Shell>, handled: Option<bool>) {
    let Some(shell) = shell.upgrade() else {
        return;
    };
    shell.host.close.close_pending.set(false);
    if handled == Some(true) {
        log::debug!("Page handled {}", CLOSE_WINDOW_COMMAND);
        return;
    }
    shell.host.close.force_close.set(true);
    let window = shell.host.window.clone();
    gtk4::glib::idle_add_local_once(move || window.close());
}

fn send_message(webview: &webkit6::WebView, message: &ShellMessage) {
    let script = match protocol::delivery_script(message) {
        Ok(s) => s,
        Err(e) => {
            log::error!("Failed to serialize ShellMessage: {}", e);
            return;
        }
    };
    log::trace!("native -> JS: {:?}", message);
    webview.evaluate_javascript(
        &script,
        None,
        None,
        None::<&gtk4::gio::Cancellable>,
        |_| {},
    );
}

fn run_guarded_ui<F: FnOnce()>(label: &str, f: F) {
    if let Err(payload) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)) {
        let msg = if let Some(s) = payload.downcast_ref::<&str>() {
            *s
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.as_str()
        } else {
            "non-string panic payload"
        };
        log::error!("UI callback panic in '{}': {}", label, msg);
    }
}

fn build_webview(startup: &StartupValues) -> (webkit6::WebView, webkit6::UserContentManager) {
    let user_content_manager = webkit6::UserContentManager::new();
    match assets::startup_script(startup) {
        Ok(source) => {
            let script = webkit6::UserScript::new(
                &source,
                webkit6::UserContentInjectedFrames::TopFrame,
                webkit6::UserScriptInjectionTime::Start,
                &[],
                &[],
            );
            user_content_manager.add_script(&script);
        }
        Err(e) => log::error!("Failed to serialize startup values: {}", e),
    }
    let shim = webkit6::UserScript::new(
        assets::BRIDGE_JS,
        webkit6::UserContentInjectedFrames::TopFrame,
        webkit6::UserScriptInjectionTime::Start,
        &[],
        &[],
    );
    user_content_manager.add_script(&shim);

    let webview = webkit6::WebView::builder()
        .user_content_manager(&user_content_manager)
        .hexpand(true)
        .vexpand(true)
        .build();

    if let Some(wk_settings) = webkit6::prelude::WebViewExt::settings(&webview) {
        wk_settings.set_enable_javascript(true);
        wk_settings.set_enable_developer_extras(true);
        wk_settings.set_allow_file_access_from_file_urls(true);
        wk_settings.set_allow_universal_access_from_file_urls(true);
        wk_settings.set_javascript_can_access_clipboard(true);
    }
    (webview, user_content_manager)
}

fn load_app(webview: &webkit6::WebView, app_root: Option<&std::path::Path>) {
    let index = match assets::locate_index_html(app_root) {
        Ok(index) => index,
        Err(e) => {
            log::error!("Failed to locate app: {}", e);
            webview.load_html(&assets::error_page_html(&e), None);
            return;
        }
    };
    match file_path_to_uri(&index) {
        Some(uri) => {
            log::info!("Loading {}", uri);
            webview.load_uri(&uri);
        }
        None => {
            let e = format!("Cannot build a file URI for {:?}", index);
            log::error!("{}", e);
            webview.load_html(&assets::error_page_html(&e), None);
        }
    }
}

fn dropped_paths(files: &gtk4::gdk::FileList) -> Vec<String> {
    files
        .files()
        .iter()
        .map(|file| match file.path() {
            Some(path) => path.to_string_lossy().to_string(),
            None => uri_to_file_path(file.uri().as_str()),
        })
        .collect()
}

pub fn build_window(app: &adw::Application, launch: &LaunchOptions) {
    let settings = settings::load();

    let window = adw::ApplicationWindow::builder()
        .application(app)
        .title("Brackets")
        .default_width(settings.window_width)
        .default_height(settings.window_height)
        .maximized(settings.window_maximized)
        .build();

    let app_root: Option<PathBuf> = launch
        .app_root
        .clone()
        .or_else(|| Settings::non_empty(&settings.app_root));

    let node = crate::node_runtime::start(&settings, app_root.clone());
    let config = BridgeConfig {
        remote_debugging_port: settings.remote_debugging_port,
        live_browser_profile: Settings::non_empty(&settings.live_browser_profile),
        ..BridgeConfig::default()
    };
    let mut bridge = Bridge::new(config, node);
    bridge.queue_files_to_open(launch.files.iter().cloned());

    let (webview, user_content_manager) = build_webview(&bridge.startup_values());
    webview.set_zoom_level(settings.zoom_level);

    // The menu bar reports activations through a weak handle to the shell
    let shell_slot: Rc<RefCell<Weak<Shell>>> = Rc::new(RefCell::new(Weak::new()));
    let menu_bar = {
        let shell_slot = shell_slot.clone();
        MenuBar::new(&window, move |tag| {
            if let Some(shell) = shell_slot.borrow().upgrade() {
                run_guarded_ui("menu-activate", || {
                    shell.execute_menu_tag(tag);
                });
            }
        })
    };

    let shell = Rc::new(Shell {
        bridge: RefCell::new(bridge),
        host: GtkHost {
            window: window.clone(),
            webview: webview.clone(),
            menu_bar: menu_bar.clone(),
            close: Rc::new(CloseState::default()),
        },
        callbacks: RefCell::new(CallbackRegistry::new()),
        settings: RefCell::new(settings),
    });
    *shell_slot.borrow_mut() = Rc::downgrade(&shell);

    // Layout: header, menu bar, web view
    let main_box = gtk4::Box::new(gtk4::Orientation::Vertical, 0);
    let header = adw::HeaderBar::new();
    main_box.append(&header);
    main_box.append(&menu_bar.widget);
    main_box.append(&webview);
    window.set_content(Some(&main_box));

    // JS -> native
    user_content_manager.register_script_message_handler(protocol::MESSAGE_HANDLER_NAME, None);
    {
        let shell = Rc::downgrade(&shell);
        user_content_manager.connect_script_message_received(
            Some(protocol::MESSAGE_HANDLER_NAME),
            move |_ucm, value| {
                let Some(shell) = shell.upgrade() else {
                    return;
                };
                let json = value.to_str().to_string();
                run_guarded_ui("script-message", || shell.on_client_message(&json));
            },
        );
    }

    // Page lifecycle
    {
        let shell = Rc::downgrade(&shell);
        webview.connect_load_changed(move |_wv, event| {
            if event != webkit6::LoadEvent::Started {
                return;
            }
            if let Some(shell) = shell.upgrade() {
                run_guarded_ui("load-started", || shell.on_load_started());
            }
        });
    }
    {
        let window = window.clone();
        webview.connect_title_notify(move |wv| {
            let title = wv.title().map(|t| t.to_string()).unwrap_or_default();
            window.set_title(Some(if title.is_empty() { "Brackets" } else { title.as_str() }));
        });
    }

    // Menu shortcuts run before the page sees the key
    {
        let key_controller = gtk4::EventControllerKey::new();
        key_controller.set_propagation_phase(gtk4::PropagationPhase::Capture);
        let shell = Rc::downgrade(&shell);
        key_controller.connect_key_pressed(move |_, key, _keycode, modifiers| {
            let Some(shell) = shell.upgrade() else {
                return gtk4::glib::Propagation::Proceed;
            };
            let Some(tag) = shell.host.menu_bar.tag_for_key(key, modifiers) else {
                return gtk4::glib::Propagation::Proceed;
            };
            let mut sent = false;
            run_guarded_ui("menu-shortcut", || sent = shell.execute_menu_tag(tag));
            if sent {
                gtk4::glib::Propagation::Stop
            } else {
                gtk4::glib::Propagation::Proceed
            }
        });
        window.add_controller(key_controller);
    }

    // Files dropped from file managers
    {
        let drop_target = gtk4::DropTarget::new(
            gtk4::gdk::FileList::static_type(),
            gtk4::gdk::DragAction::COPY,
        );
        drop_target.set_propagation_phase(gtk4::PropagationPhase::Capture);
        let shell = Rc::downgrade(&shell);
        drop_target.connect_drop(move |_target, value, _x, _y| {
            let Some(shell) = shell.upgrade() else {
                return false;
            };
            let Ok(files) = value.get::<gtk4::gdk::FileList>() else {
                return false;
            };
            let paths = dropped_paths(&files);
            let accepted = !paths.is_empty();
            run_guarded_ui("files-dropped", || shell.files_dropped(paths));
            accepted
        });
        webview.add_controller(drop_target);
    }

    // Close handshake with the page
    {
        let shell = Rc::downgrade(&shell);
        window.connect_close_request(move |_window| {
            let Some(shell) = shell.upgrade() else {
                return gtk4::glib::Propagation::Proceed;
            };
            if shell.request_close() {
                return gtk4::glib::Propagation::Stop;
            }
            log::info!("Closing window");
            shell.save_window_state();
            shell.bridge.borrow().node().shutdown();
            gtk4::glib::Propagation::Proceed
        });
    }

    // The window owns the shell until it is destroyed
    {
        let owner = RefCell::new(Some(shell.clone()));
        window.connect_destroy(move |_| {
            if let Some(shell) = owner.borrow_mut().take() {
                let context = shell.bridge.borrow().context();
                let purged = shell.callbacks.borrow_mut().release_context(context);
                log::debug!("Window destroyed ({} pending callbacks dropped)", purged.len());
            }
        });
    }

    load_app(&webview, app_root.as_deref());
    window.present();
}
