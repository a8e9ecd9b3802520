use std::cell::Cell;
use std::path::Path;
use std::rc::Rc;

use gtk4::gio;
use gtk4::prelude::*;
use libadwaita as adw;
use serde_json::json;
use webkit6::prelude::*;

use appshell_bridge::dispatch::{OpenDialogOptions, SaveDialogOptions};
use appshell_bridge::{Responder, ShellHost};
use appshell_core::menu::MenuModel;
use appshell_core::util::containing_folder;
use appshell_core::ErrorCode;

use crate::menu_bar::MenuBar;

/// Close handshake state shared by the window and the host.
#[derive(Default)]
pub struct CloseState {
    /// The page installed the bridge and can answer `file.close_window`.
    pub page_ready: Cell<bool>,
    /// Skip the handshake on the next close request.
    pub force_close: Cell<bool>,
    /// A `file.close_window` is in flight.
    pub close_pending: Cell<bool>,
}

/// GTK services for the bridge.
pub struct GtkHost {
    pub window: adw::ApplicationWindow,
    pub webview: webkit6::WebView,
    pub menu_bar: Rc<MenuBar>,
    pub close: Rc<CloseState>,
}

fn dialog_failed(e: &gtk4::glib::Error) -> bool {
    if e.matches(gtk4::DialogError::Dismissed) || e.matches(gtk4::DialogError::Cancelled) {
        return false;
    }
    log::warn!("File dialog failed: {}", e);
    true
}

fn file_path_string(file: &gio::File) -> Option<String> {
    file.path().map(|p| p.to_string_lossy().to_string())
}

fn list_model_paths(model: &gio::ListModel) -> Vec<String> {
    (0..model.n_items())
        .filter_map(|i| model.item(i))
        .filter_map(|obj| obj.downcast::<gio::File>().ok())
        .filter_map(|file| file_path_string(&file))
        .collect()
}

impl ShellHost for GtkHost {
    fn show_open_dialog(&self, options: OpenDialogOptions, responder: Responder) {
        let dialog = gtk4::FileDialog::builder().modal(true).build();
        if !options.title.is_empty() {
            dialog.set_title(&options.title);
        }
        if !options.initial_path.is_empty() {
            dialog.set_initial_folder(Some(&gio::File::for_path(&options.initial_path)));
        }
        if !options.file_types.is_empty() && !options.choose_directory {
            let filter = gtk4::FileFilter::new();
            for ext in &options.file_types {
                filter.add_suffix(ext);
            }
            filter.set_name(Some(&options.file_types.join(", ")));
            let filters = gio::ListStore::new::<gtk4::FileFilter>();
            filters.append(&filter);
            dialog.set_filters(Some(&filters));
            dialog.set_default_filter(Some(&filter));
        }

        let cancellable = None::<&gio::Cancellable>;
        let single = move |responder: Responder, result: Result<gio::File, gtk4::glib::Error>| {
            match result {
                Ok(file) => {
                    let paths: Vec<String> = file_path_string(&file).into_iter().collect();
                    responder.respond(Ok(vec![json!(paths)]));
                }
                Err(e) if dialog_failed(&e) => responder.respond(Err(ErrorCode::Unknown)),
                Err(_) => responder.respond(Ok(vec![json!([])])),
            }
        };
        let multiple =
            move |responder: Responder, result: Result<gio::ListModel, gtk4::glib::Error>| {
                match result {
                    Ok(model) => responder.respond(Ok(vec![json!(list_model_paths(&model))])),
                    Err(e) if dialog_failed(&e) => responder.respond(Err(ErrorCode::Unknown)),
                    Err(_) => responder.respond(Ok(vec![json!([])])),
                }
            };

        match (options.choose_directory, options.allow_multiple) {
            (true, true) => dialog.select_multiple_folders(Some(&self.window), cancellable, move |r| {
                multiple(responder, r)
            }),
            (true, false) => dialog.select_folder(Some(&self.window), cancellable, move |r| {
                single(responder, r)
            }),
            (false, true) => dialog.open_multiple(Some(&self.window), cancellable, move |r| {
                multiple(responder, r)
            }),
            (false, false) => dialog.open(Some(&self.window), cancellable, move |r| {
                single(responder, r)
            }),
        }
    }

    fn show_save_dialog(&self, options: SaveDialogOptions, responder: Responder) {
        let dialog = gtk4::FileDialog::builder().modal(true).build();
        if !options.title.is_empty() {
            dialog.set_title(&options.title);
        }
        if !options.initial_path.is_empty() {
            dialog.set_initial_folder(Some(&gio::File::for_path(&options.initial_path)));
        }
        if !options.proposed_name.is_empty() {
            dialog.set_initial_name(Some(&options.proposed_name));
        }
        dialog.save(Some(&self.window), None::<&gio::Cancellable>, move |result| {
            match result {
                Ok(file) => {
                    let path = file_path_string(&file).unwrap_or_default();
                    responder.respond(Ok(vec![json!(path)]));
                }
                Err(e) if dialog_failed(&e) => responder.respond(Err(ErrorCode::Unknown)),
                Err(_) => responder.respond(Ok(vec![json!("")])),
            }
        });
    }

    fn move_to_trash(&self, path: &str) -> Result<(), ErrorCode> {
        if !Path::new(path).exists() {
            return Err(ErrorCode::NotFound);
        }
        gio::File::for_path(path)
            .trash(None::<&gio::Cancellable>)
            .map_err(|e| {
                log::warn!("Failed to trash {}: {}", path, e);
                if e.matches(gio::IOErrorEnum::NotFound) {
                    ErrorCode::NotFound
                } else {
                    ErrorCode::Unknown
                }
            })
    }

    fn open_url(&self, url: &str) -> Result<(), ErrorCode> {
        open::that(url).map_err(|e| {
            log::warn!("Failed to open {}: {}", url, e);
            ErrorCode::Unknown
        })
    }

    fn show_os_folder(&self, path: &str) -> Result<(), ErrorCode> {
        let path = Path::new(path);
        if !path.exists() {
            return Err(ErrorCode::NotFound);
        }
        let folder = containing_folder(path);
        let uri = gio::File::for_path(&folder).uri();
        gio::AppInfo::launch_default_for_uri(uri.as_str(), None::<&gio::AppLaunchContext>).map_err(
            |e| {
                log::warn!("Failed to show folder {:?}: {}", folder, e);
                ErrorCode::Unknown
            },
        )
    }

    fn show_developer_tools(&self) {
        match self.webview.inspector() {
            Some(inspector) => inspector.show(),
            None => log::warn!("Web inspector unavailable"),
        }
    }

    fn quit(&self) {
        log::info!("Quit requested by the page");
        self.close.force_close.set(true);
        self.close.close_pending.set(false);
        // Deferred so the close handler never runs inside a bridge call
        let window = self.window.clone();
        gtk4::glib::idle_add_local_once(move || window.close());
    }

    fn abort_quit(&self) {
        log::info!("Quit aborted by the page");
        self.close.close_pending.set(false);
        self.close.force_close.set(false);
    }

    fn zoom_level(&self) -> f64 {
        self.webview.zoom_level()
    }

    fn set_zoom_level(&self, level: f64) {
        self.webview.set_zoom_level(level);
    }

    fn menus_changed(&self, menus: &MenuModel) {
        self.menu_bar.rebuild(menus);
    }

    fn menu_item_state_changed(&self, menus: &MenuModel, command: &str) {
        self.menu_bar.update_item_state(menus, command);
    }
}
