use std::cell::RefCell;
use std::rc::Rc;

use gtk4::gio;
use gtk4::prelude::*;

use appshell_core::menu::{MenuModel, Tag};

/// Action group prefix inserted on the window.
const ACTION_PREFIX: &str = "menu";

fn action_name(tag: Tag) -> String {
    format!("item-{}", tag)
}

/// Native menu bar mirroring the page's menu registry.
///
/// Every item is bound to an action named after its tag; activating it
/// reports the tag, which the window resolves back to the command string.
pub struct MenuBar {
    pub widget: gtk4::PopoverMenuBar,
    actions: gio::SimpleActionGroup,
    action_names: RefCell<Vec<String>>,
    shortcuts: RefCell<Vec<(ParsedAccel, Tag)>>,
    on_activate: Rc<dyn Fn(Tag)>,
}

impl MenuBar {
    pub fn new(window: &impl IsA<gtk4::Widget>, on_activate: impl Fn(Tag) + 'static) -> Rc<Self> {
        let widget = gtk4::PopoverMenuBar::from_model(None::<&gio::MenuModel>);
        let actions = gio::SimpleActionGroup::new();
        window.insert_action_group(ACTION_PREFIX, Some(&actions));
        Rc::new(Self {
            widget,
            actions,
            action_names: RefCell::new(Vec::new()),
            shortcuts: RefCell::new(Vec::new()),
            on_activate: Rc::new(on_activate),
        })
    }

    /// Rebuild menus, actions and shortcuts from `model`.
    pub fn rebuild(&self, model: &MenuModel) {
        for name in self.action_names.borrow_mut().drain(..) {
            self.actions.remove_action(&name);
        }
        let root = gio::Menu::new();

        for menu in model.menus() {
            let submenu = gio::Menu::new();
            let mut section = gio::Menu::new();

            for item in model.items_of(menu) {
                if item.is_separator() {
                    if section.n_items() > 0 {
                        submenu.append_section(None, &section);
                        section = gio::Menu::new();
                    }
                    continue;
                }

                let name = action_name(item.tag);
                let action = if item.checked {
                    gio::SimpleAction::new_stateful(&name, None, &true.to_variant())
                } else {
                    gio::SimpleAction::new(&name, None)
                };
                action.set_enabled(item.enabled);
                {
                    let on_activate = self.on_activate.clone();
                    let tag = item.tag;
                    action.connect_activate(move |_, _| on_activate(tag));
                }
                self.actions.add_action(&action);
                self.action_names.borrow_mut().push(name.clone());

                let entry = gio::MenuItem::new(
                    Some(&item.title),
                    Some(&format!("{}.{}", ACTION_PREFIX, name)),
                );
                if let Some(accel) = brackets_key_to_accel(&item.key) {
                    entry.set_attribute_value("accel", Some(&accel.to_variant()));
                }
                section.append_item(&entry);
            }
            if section.n_items() > 0 {
                submenu.append_section(None, &section);
            }
            root.append_submenu(Some(&menu.title), &submenu);
        }

        self.widget.set_menu_model(Some(&root));
        self.set_shortcuts(model);
        log::debug!(
            "Menu bar rebuilt: {} menus, {} actions",
            model.menus().len(),
            self.action_names.borrow().len()
        );
    }

    /// Apply a changed enabled or checked state to the item's action alone.
    pub fn update_item_state(&self, model: &MenuModel, command: &str) {
        let Some(item) = model.item(command) else {
            return;
        };
        let action = self
            .actions
            .lookup_action(&action_name(item.tag))
            .and_then(|action| action.downcast::<gio::SimpleAction>().ok());
        let Some(action) = action else {
            self.rebuild(model);
            return;
        };
        // A plain action has no check mark to show
        if item.checked && action.state().is_none() {
            self.rebuild(model);
            return;
        }
        action.set_enabled(item.enabled);
        if action.state().is_some() {
            action.set_state(&item.checked.to_variant());
        }
        self.set_shortcuts(model);
    }

    fn set_shortcuts(&self, model: &MenuModel) {
        *self.shortcuts.borrow_mut() = shortcut_bindings(model)
            .into_iter()
            .filter_map(|(accel, tag)| parse_accel(&accel).map(|parsed| (parsed, tag)))
            .collect();
    }

    /// Tag of the enabled menu item whose shortcut matches a key press.
    pub fn tag_for_key(&self, key: gtk4::gdk::Key, modifiers: gtk4::gdk::ModifierType) -> Option<Tag> {
        self.shortcuts
            .borrow()
            .iter()
            .find(|(parsed, _)| matches_key(parsed, key, modifiers))
            .map(|(_, tag)| *tag)
    }
}

/// Accelerators of the enabled items in `model`, in display order. Disabled
/// items leave their keys to the page.
pub fn shortcut_bindings(model: &MenuModel) -> Vec<(String, Tag)> {
    model
        .menus()
        .iter()
        .flat_map(|menu| model.items_of(menu))
        .filter(|item| item.enabled && !item.is_separator())
        .filter_map(|item| brackets_key_to_accel(&item.key).map(|accel| (accel, item.tag)))
        .collect()
}

/// Converts a Brackets key string like `"Ctrl-Shift-O"` or `"Cmd--"` into a
/// GTK accelerator string like `"<Ctrl><Shift>o"`.
pub fn brackets_key_to_accel(key: &str) -> Option<String> {
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    let (modifiers, base) = if let Some(prefix) = key.strip_suffix("--") {
        (prefix, "-")
    } else {
        match key.rsplit_once('-') {
            Some((prefix, base)) if !base.is_empty() => (prefix, base),
            _ => ("", key),
        }
    };

    let mut accel = String::new();
    for part in modifiers.split('-').filter(|p| !p.is_empty()) {
        match part.to_lowercase().as_str() {
            "ctrl" | "cmd" | "control" => accel.push_str("<Ctrl>"),
            "shift" => accel.push_str("<Shift>"),
            "alt" | "opt" | "option" => accel.push_str("<Alt>"),
            "meta" | "super" => accel.push_str("<Super>"),
            other => {
                log::debug!("Unsupported modifier '{}' in key '{}'", other, key);
                return None;
            }
        }
    }
    accel.push_str(&gdk_key_name(base)?);
    Some(accel)
}

fn gdk_key_name(base: &str) -> Option<String> {
    let mut chars = base.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        let name = match c {
            '=' => "equal",
            '-' => "minus",
            '+' => "plus",
            ',' => "comma",
            '.' => "period",
            '/' => "slash",
            '\\' => "backslash",
            '[' => "bracketleft",
            ']' => "bracketright",
            ';' => "semicolon",
            '\'' => "apostrophe",
            '`' => "grave",
            c if c.is_ascii_alphanumeric() => return Some(c.to_ascii_lowercase().to_string()),
            _ => return None,
        };
        return Some(name.to_string());
    }

    let name = match base.to_lowercase().as_str() {
        "up" => "Up",
        "down" => "Down",
        "left" => "Left",
        "right" => "Right",
        "tab" => "Tab",
        "enter" | "return" => "Return",
        "space" => "space",
        "backspace" => "BackSpace",
        "delete" | "del" => "Delete",
        "esc" | "escape" => "Escape",
        "home" => "Home",
        "end" => "End",
        "pageup" => "Page_Up",
        "pagedown" => "Page_Down",
        "insert" => "Insert",
        f if f.starts_with('f') && f[1..].parse::<u8>().is_ok_and(|n| (1..=24).contains(&n)) => {
            return Some(f.to_uppercase());
        }
        _ => return None,
    };
    Some(name.to_string())
}

/// Parsed representation of an accelerator for matching in key handlers.
pub struct ParsedAccel {
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
    pub super_: bool,
    /// The lowercase key name (e.g. "o", "tab", "f11")
    pub key_lower: String,
}

/// Parse a GTK accel string like `"<Ctrl><Shift>g"` into a `ParsedAccel`.
pub fn parse_accel(accel: &str) -> Option<ParsedAccel> {
    let mut parsed = ParsedAccel {
        ctrl: false,
        shift: false,
        alt: false,
        super_: false,
        key_lower: String::new(),
    };
    let mut remaining = accel;

    while remaining.starts_with('<') {
        let end = remaining.find('>')?;
        match remaining[1..end].to_lowercase().as_str() {
            "ctrl" | "control" => parsed.ctrl = true,
            "shift" => parsed.shift = true,
            "alt" => parsed.alt = true,
            "super" => parsed.super_ = true,
            _ => {}
        }
        remaining = &remaining[end + 1..];
    }

    if remaining.is_empty() {
        return None;
    }
    parsed.key_lower = remaining.to_lowercase();
    Some(parsed)
}

/// Check if a pressed key + modifiers matches a `ParsedAccel`.
pub fn matches_key(
    parsed: &ParsedAccel,
    key: gtk4::gdk::Key,
    modifiers: gtk4::gdk::ModifierType,
) -> bool {
    let ctrl = modifiers.contains(gtk4::gdk::ModifierType::CONTROL_MASK);
    let shift = modifiers.contains(gtk4::gdk::ModifierType::SHIFT_MASK);
    let alt = modifiers.contains(gtk4::gdk::ModifierType::ALT_MASK);
    let super_ = modifiers.contains(gtk4::gdk::ModifierType::SUPER_MASK);

    if ctrl != parsed.ctrl || shift != parsed.shift || alt != parsed.alt || super_ != parsed.super_
    {
        return false;
    }

    // Shifted letters report uppercase names
    let key_name = key
        .to_lower()
        .name()
        .map(|n| n.to_string().to_lowercase())
        .unwrap_or_default();
    key_name == parsed.key_lower
}

#[cfg(test)]
mod tests {
    use super::*;
    use appshell_core::menu::Position;

    #[test]
    fn modifiers_and_letters() {
        assert_eq!(brackets_key_to_accel("Ctrl-O").as_deref(), Some("<Ctrl>o"));
        assert_eq!(
            brackets_key_to_accel("Ctrl-Shift-O").as_deref(),
            Some("<Ctrl><Shift>o")
        );
        assert_eq!(brackets_key_to_accel("Cmd-Alt-1").as_deref(), Some("<Ctrl><Alt>1"));
    }

    #[test]
    fn punctuation_keys() {
        assert_eq!(brackets_key_to_accel("Ctrl--").as_deref(), Some("<Ctrl>minus"));
        assert_eq!(brackets_key_to_accel("Ctrl-=").as_deref(), Some("<Ctrl>equal"));
        assert_eq!(
            brackets_key_to_accel("Ctrl-\\").as_deref(),
            Some("<Ctrl>backslash")
        );
        assert_eq!(
            brackets_key_to_accel("Ctrl-[").as_deref(),
            Some("<Ctrl>bracketleft")
        );
    }

    #[test]
    fn named_keys() {
        assert_eq!(brackets_key_to_accel("F11").as_deref(), Some("F11"));
        assert_eq!(brackets_key_to_accel("Alt-Up").as_deref(), Some("<Alt>Up"));
        assert_eq!(
            brackets_key_to_accel("Ctrl-PageDown").as_deref(),
            Some("<Ctrl>Page_Down")
        );
        assert_eq!(brackets_key_to_accel("Shift-Tab").as_deref(), Some("<Shift>Tab"));
    }

    #[test]
    fn unsupported_keys() {
        assert_eq!(brackets_key_to_accel(""), None);
        assert_eq!(brackets_key_to_accel("Hyper-X"), None);
        assert_eq!(brackets_key_to_accel("Ctrl-F99"), None);
        assert_eq!(brackets_key_to_accel("Ctrl-Wat"), None);
    }

    #[test]
    fn parsed_accel_fields() {
        let parsed = parse_accel("<Ctrl><Shift>Page_Down").unwrap();
        assert!(parsed.ctrl && parsed.shift && !parsed.alt && !parsed.super_);
        assert_eq!(parsed.key_lower, "page_down");
        assert!(parse_accel("<Ctrl>").is_none());
    }

    #[test]
    fn disabled_items_have_no_shortcut() {
        let mut model = MenuModel::new();
        model
            .add_menu("edit-menu", "Edit", Position::parse("").unwrap(), "")
            .unwrap();
        for (command, key) in [("edit.undo", "Ctrl-Z"), ("edit.copy", "Ctrl-C"), ("edit.find", "")] {
            model
                .add_menu_item(
                    "edit-menu",
                    command,
                    command,
                    key,
                    "",
                    Position::parse("last").unwrap(),
                    "",
                )
                .unwrap();
        }
        let undo = model.tag("edit.undo").unwrap();
        let copy = model.tag("edit.copy").unwrap();
        assert_eq!(
            shortcut_bindings(&model),
            vec![("<Ctrl>z".to_string(), undo), ("<Ctrl>c".to_string(), copy)]
        );

        model.set_item_state("edit.undo", false, false).unwrap();
        assert_eq!(shortcut_bindings(&model), vec![("<Ctrl>c".to_string(), copy)]);
    }
}
