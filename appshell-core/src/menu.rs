use std::collections::HashMap;

use crate::error::ErrorCode;

/// Native menu-item identifier handed to the platform toolkit.
pub type Tag = i32;

/// Title the JS layer uses for separator items.
pub const SEPARATOR_TITLE: &str = "---";

/// First tag handed out; keeps clear of ids toolkits reserve for themselves.
pub const FIRST_TAG: Tag = 1000;

/// Where a new menu or menu item goes relative to its siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Last,
    First,
    Before,
    After,
    FirstInSection,
    LastInSection,
}

impl Position {
    pub fn parse(position: &str) -> Result<Self, ErrorCode> {
        match position {
            "" | "last" => Ok(Position::Last),
            "first" => Ok(Position::First),
            "before" => Ok(Position::Before),
            "after" => Ok(Position::After),
            "firstInSection" => Ok(Position::FirstInSection),
            "lastInSection" => Ok(Position::LastInSection),
            _ => Err(ErrorCode::InvalidParams),
        }
    }

    fn needs_relative(self) -> bool {
        !matches!(self, Position::Last | Position::First)
    }
}

/// A top-level menu in the menu bar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Menu {
    pub id: String,
    pub title: String,
    pub tag: Tag,
    items: Vec<String>,
}

impl Menu {
    /// Command ids of this menu's items, in display order.
    pub fn item_commands(&self) -> &[String] {
        &self.items
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuItem {
    pub command: String,
    pub parent: String,
    pub tag: Tag,
    pub title: String,
    pub enabled: bool,
    pub checked: bool,
    /// Key binding in the JS layer's notation, e.g. `Ctrl-Shift-S`.
    pub key: String,
    pub display_str: String,
}

impl MenuItem {
    pub fn is_separator(&self) -> bool {
        self.title == SEPARATOR_TITLE
    }
}

/// Result of an insertion. The entry is always added once this is returned;
/// `relative_found == false` means it was appended because the anchor
/// was missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Insertion {
    pub tag: Tag,
    pub relative_found: bool,
}

impl Insertion {
    /// Code reported back to the caller for this insertion.
    pub fn status(&self) -> ErrorCode {
        if self.relative_found {
            ErrorCode::NoError
        } else {
            ErrorCode::NotFound
        }
    }
}

/// Registry of the menus and items owned by one window.
///
/// Menus and items share one id namespace and one tag space. A tag, once
/// assigned to an id, is never reused for another id and survives removal,
/// so the toolkit can keep stale references without misrouting clicks.
#[derive(Debug)]
pub struct MenuModel {
    menus: Vec<Menu>,
    items: HashMap<String, MenuItem>,
    tags: HashMap<String, Tag>,
    ids_by_tag: HashMap<Tag, String>,
    next_tag: Tag,
}

impl Default for MenuModel {
    fn default() -> Self {
        Self::new()
    }
}

impl MenuModel {
    pub fn new() -> Self {
        Self {
            menus: Vec::new(),
            items: HashMap::new(),
            tags: HashMap::new(),
            ids_by_tag: HashMap::new(),
            next_tag: FIRST_TAG,
        }
    }

    fn tag_for(&mut self, id: &str) -> Tag {
        if let Some(tag) = self.tags.get(id) {
            return *tag;
        }
        let tag = self.next_tag;
        self.next_tag += 1;
        self.tags.insert(id.to_string(), tag);
        self.ids_by_tag.insert(tag, id.to_string());
        tag
    }

    /// Tag assigned to a menu id or command, if one was ever assigned.
    pub fn tag(&self, id: &str) -> Option<Tag> {
        self.tags.get(id).copied()
    }

    /// Reverse lookup used when the toolkit reports an activated item.
    pub fn id_for_tag(&self, tag: Tag) -> Option<&str> {
        self.ids_by_tag.get(&tag).map(String::as_str)
    }

    /// Live item for a tag; `None` when the tag belongs to a menu or a removed item.
    pub fn item_for_tag(&self, tag: Tag) -> Option<&MenuItem> {
        self.id_for_tag(tag).and_then(|id| self.items.get(id))
    }

    pub fn menus(&self) -> &[Menu] {
        &self.menus
    }

    pub fn menu(&self, id: &str) -> Option<&Menu> {
        self.menus.iter().find(|m| m.id == id)
    }

    pub fn item(&self, command: &str) -> Option<&MenuItem> {
        self.items.get(command)
    }

    /// Items of a menu in display order.
    pub fn items_of<'a>(&'a self, menu: &'a Menu) -> impl Iterator<Item = &'a MenuItem> + 'a {
        menu.items.iter().filter_map(move |c| self.items.get(c))
    }

    /// All live items, in no particular order.
    pub fn items(&self) -> impl Iterator<Item = &MenuItem> {
        self.items.values()
    }

    fn menu_index(&self, id: &str) -> Option<usize> {
        self.menus.iter().position(|m| m.id == id)
    }

    fn menu_mut(&mut self, id: &str) -> Option<&mut Menu> {
        self.menus.iter_mut().find(|m| m.id == id)
    }

    fn contains_id(&self, id: &str) -> bool {
        self.items.contains_key(id) || self.menu_index(id).is_some()
    }

    pub fn add_menu(
        &mut self,
        id: &str,
        title: &str,
        position: Position,
        relative_id: &str,
    ) -> Result<Insertion, ErrorCode> {
        if id.is_empty() {
            return Err(ErrorCode::InvalidParams);
        }
        if matches!(
            position,
            Position::FirstInSection | Position::LastInSection
        ) {
            return Err(ErrorCode::InvalidParams);
        }
        if self.contains_id(id) {
            log::warn!("Menu '{}' already exists", id);
            return Err(ErrorCode::Unknown);
        }

        let anchor = self.menu_index(relative_id);
        let (index, relative_found) = match (position, anchor) {
            (Position::Last, _) => (self.menus.len(), true),
            (Position::First, _) => (0, true),
            (Position::Before, Some(i)) => (i, true),
            (Position::After, Some(i)) => (i + 1, true),
            _ => (self.menus.len(), false),
        };

        let tag = self.tag_for(id);
        self.menus.insert(
            index,
            Menu {
                id: id.to_string(),
                title: title.to_string(),
                tag,
                items: Vec::new(),
            },
        );
        Ok(Insertion {
            tag,
            relative_found,
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_menu_item(
        &mut self,
        parent_id: &str,
        command: &str,
        title: &str,
        key: &str,
        display_str: &str,
        position: Position,
        relative_id: &str,
    ) -> Result<Insertion, ErrorCode> {
        if command.is_empty() {
            return Err(ErrorCode::InvalidParams);
        }
        if self.contains_id(command) {
            log::warn!("Menu item '{}' already exists", command);
            return Err(ErrorCode::Unknown);
        }
        let Some(menu) = self.menus.iter().find(|m| m.id == parent_id) else {
            return Err(ErrorCode::NotFound);
        };

        let (index, relative_found) = if position.needs_relative() {
            match menu.items.iter().position(|c| c == relative_id) {
                Some(anchor) => (self.resolve_item_index(menu, position, anchor), true),
                None => (menu.items.len(), false),
            }
        } else if position == Position::First {
            (0, true)
        } else {
            (menu.items.len(), true)
        };

        let tag = self.tag_for(command);
        self.items.insert(
            command.to_string(),
            MenuItem {
                command: command.to_string(),
                parent: parent_id.to_string(),
                tag,
                title: title.to_string(),
                enabled: true,
                checked: false,
                key: key.to_string(),
                display_str: display_str.to_string(),
            },
        );
        if let Some(menu) = self.menu_mut(parent_id) {
            menu.items.insert(index, command.to_string());
        }
        Ok(Insertion {
            tag,
            relative_found,
        })
    }

    fn resolve_item_index(&self, menu: &Menu, position: Position, anchor: usize) -> usize {
        let is_separator = |command: &String| {
            self.items
                .get(command)
                .map(MenuItem::is_separator)
                .unwrap_or(false)
        };
        match position {
            Position::Before => anchor,
            Position::After => anchor + 1,
            Position::FirstInSection => menu.items[..anchor]
                .iter()
                .rposition(is_separator)
                .map(|sep| sep + 1)
                .unwrap_or(0),
            Position::LastInSection => menu.items[anchor + 1..]
                .iter()
                .position(is_separator)
                .map(|offset| anchor + 1 + offset)
                .unwrap_or(menu.items.len()),
            Position::First => 0,
            Position::Last => menu.items.len(),
        }
    }

    /// Remove a menu together with all of its items.
    pub fn remove_menu(&mut self, id: &str) -> Result<(), ErrorCode> {
        let index = self.menu_index(id).ok_or(ErrorCode::NotFound)?;
        let menu = self.menus.remove(index);
        for command in &menu.items {
            self.items.remove(command);
        }
        Ok(())
    }

    pub fn remove_menu_item(&mut self, command: &str) -> Result<(), ErrorCode> {
        let item = self.items.remove(command).ok_or(ErrorCode::NotFound)?;
        if let Some(menu) = self.menu_mut(&item.parent) {
            menu.items.retain(|c| c != command);
        }
        Ok(())
    }

    pub fn item_state(&self, command: &str) -> Result<(bool, bool), ErrorCode> {
        self.items
            .get(command)
            .map(|item| (item.enabled, item.checked))
            .ok_or(ErrorCode::NotFound)
    }

    pub fn set_item_state(
        &mut self,
        command: &str,
        enabled: bool,
        checked: bool,
    ) -> Result<(), ErrorCode> {
        let item = self.items.get_mut(command).ok_or(ErrorCode::NotFound)?;
        item.enabled = enabled;
        item.checked = checked;
        Ok(())
    }

    pub fn set_item_shortcut(
        &mut self,
        command: &str,
        key: &str,
        display_str: &str,
    ) -> Result<(), ErrorCode> {
        let item = self.items.get_mut(command).ok_or(ErrorCode::NotFound)?;
        item.key = key.to_string();
        item.display_str = display_str.to_string();
        Ok(())
    }

    /// Title of a menu or menu item.
    pub fn title(&self, id: &str) -> Result<&str, ErrorCode> {
        if let Some(menu) = self.menu(id) {
            return Ok(&menu.title);
        }
        self.items
            .get(id)
            .map(|item| item.title.as_str())
            .ok_or(ErrorCode::NotFound)
    }

    pub fn set_title(&mut self, id: &str, title: &str) -> Result<(), ErrorCode> {
        if let Some(menu) = self.menu_mut(id) {
            menu.title = title.to_string();
            return Ok(());
        }
        let item = self.items.get_mut(id).ok_or(ErrorCode::NotFound)?;
        item.title = title.to_string();
        Ok(())
    }

    /// Parent id and index among siblings. Top-level menus report an empty parent.
    pub fn position(&self, id: &str) -> Result<(String, usize), ErrorCode> {
        if let Some(index) = self.menu_index(id) {
            return Ok((String::new(), index));
        }
        let item = self.items.get(id).ok_or(ErrorCode::NotFound)?;
        let menu = self.menu(&item.parent).ok_or(ErrorCode::NotFound)?;
        let index = menu
            .items
            .iter()
            .position(|c| c == id)
            .ok_or(ErrorCode::NotFound)?;
        Ok((item.parent.clone(), index))
    }

    /// Drop all menus and items but keep the tag table, so ids added again
    /// after a page reload map to the same tags.
    pub fn clear(&mut self) {
        self.menus.clear();
        self.items.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.menus.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model_with_file_menu() -> MenuModel {
        let mut model = MenuModel::new();
        model
            .add_menu("file-menu", "File", Position::Last, "")
            .unwrap();
        for command in ["file.new", "file.open", "file.save"] {
            model
                .add_menu_item("file-menu", command, command, "", "", Position::Last, "")
                .unwrap();
        }
        model
    }

    fn commands(model: &MenuModel, menu: &str) -> Vec<String> {
        model.menu(menu).unwrap().item_commands().to_vec()
    }

    fn add_separator(model: &mut MenuModel, id: &str, position: Position, relative: &str) {
        model
            .add_menu_item("file-menu", id, SEPARATOR_TITLE, "", "", position, relative)
            .unwrap();
    }

    #[test]
    fn tags_are_unique_and_reverse_lookup_works() {
        let model = model_with_file_menu();
        let open = model.tag("file.open").unwrap();
        let save = model.tag("file.save").unwrap();
        assert_ne!(open, save);
        assert!(open >= FIRST_TAG);
        assert_eq!(model.id_for_tag(open), Some("file.open"));
        assert_eq!(model.item_for_tag(save).unwrap().command, "file.save");
        assert!(model.item_for_tag(model.tag("file-menu").unwrap()).is_none());
    }

    #[test]
    fn tag_survives_remove_and_readd() {
        let mut model = model_with_file_menu();
        let tag = model.tag("file.open").unwrap();
        model.remove_menu_item("file.open").unwrap();
        assert!(model.item_for_tag(tag).is_none());

        let insertion = model
            .add_menu_item("file-menu", "file.open", "Open", "", "", Position::Last, "")
            .unwrap();
        assert_eq!(insertion.tag, tag);
    }

    #[test]
    fn clear_keeps_tags() {
        let mut model = model_with_file_menu();
        let tag = model.tag("file.save").unwrap();
        model.clear();
        assert!(model.is_empty());
        model
            .add_menu("file-menu", "File", Position::Last, "")
            .unwrap();
        let insertion = model
            .add_menu_item("file-menu", "file.save", "Save", "", "", Position::First, "")
            .unwrap();
        assert_eq!(insertion.tag, tag);
    }

    #[test]
    fn menus_honor_relative_positions() {
        let mut model = MenuModel::new();
        model.add_menu("file", "File", Position::Last, "").unwrap();
        model.add_menu("help", "Help", Position::Last, "").unwrap();
        model.add_menu("edit", "Edit", Position::After, "file").unwrap();
        model.add_menu("app", "App", Position::First, "").unwrap();
        model.add_menu("view", "View", Position::Before, "help").unwrap();

        let order: Vec<&str> = model.menus().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(order, vec!["app", "file", "edit", "view", "help"]);
        assert_eq!(model.position("view").unwrap(), (String::new(), 3));
    }

    #[test]
    fn unknown_relative_appends_and_reports_not_found() {
        let mut model = model_with_file_menu();
        let insertion = model
            .add_menu_item(
                "file-menu",
                "file.close",
                "Close",
                "",
                "",
                Position::Before,
                "file.missing",
            )
            .unwrap();
        assert!(!insertion.relative_found);
        assert_eq!(insertion.status(), ErrorCode::NotFound);
        assert_eq!(commands(&model, "file-menu").last().unwrap(), "file.close");
    }

    #[test]
    fn item_before_and_after() {
        let mut model = model_with_file_menu();
        model
            .add_menu_item("file-menu", "a", "A", "", "", Position::Before, "file.open")
            .unwrap();
        model
            .add_menu_item("file-menu", "b", "B", "", "", Position::After, "file.open")
            .unwrap();
        assert_eq!(
            commands(&model, "file-menu"),
            vec!["file.new", "a", "file.open", "b", "file.save"]
        );
    }

    #[test]
    fn section_positions_stop_at_separators() {
        let mut model = model_with_file_menu();
        add_separator(&mut model, "sep-1", Position::After, "file.new");
        // file.new | sep-1 | file.open | file.save
        model
            .add_menu_item(
                "file-menu",
                "first",
                "First",
                "",
                "",
                Position::FirstInSection,
                "file.save",
            )
            .unwrap();
        model
            .add_menu_item(
                "file-menu",
                "last",
                "Last",
                "",
                "",
                Position::LastInSection,
                "file.new",
            )
            .unwrap();
        assert_eq!(
            commands(&model, "file-menu"),
            vec!["file.new", "last", "sep-1", "first", "file.open", "file.save"]
        );
    }

    #[test]
    fn last_in_section_without_trailing_separator_appends() {
        let mut model = model_with_file_menu();
        model
            .add_menu_item(
                "file-menu",
                "tail",
                "Tail",
                "",
                "",
                Position::LastInSection,
                "file.open",
            )
            .unwrap();
        assert_eq!(commands(&model, "file-menu").last().unwrap(), "tail");
    }

    #[test]
    fn removing_menu_removes_items() {
        let mut model = model_with_file_menu();
        model.remove_menu("file-menu").unwrap();
        assert!(model.item("file.open").is_none());
        assert_eq!(model.remove_menu_item("file.open"), Err(ErrorCode::NotFound));
        assert_eq!(model.remove_menu("file-menu"), Err(ErrorCode::NotFound));
    }

    #[test]
    fn duplicates_are_rejected() {
        let mut model = model_with_file_menu();
        assert_eq!(
            model.add_menu("file-menu", "File", Position::Last, ""),
            Err(ErrorCode::Unknown)
        );
        assert_eq!(
            model.add_menu_item("file-menu", "file.open", "Open", "", "", Position::Last, ""),
            Err(ErrorCode::Unknown)
        );
        assert_eq!(commands(&model, "file-menu").len(), 3);
    }

    #[test]
    fn item_into_missing_menu_is_not_found() {
        let mut model = MenuModel::new();
        assert_eq!(
            model.add_menu_item("nope", "x", "X", "", "", Position::Last, ""),
            Err(ErrorCode::NotFound)
        );
        assert!(model.tag("x").is_none());
    }

    #[test]
    fn state_shortcut_and_titles() {
        let mut model = model_with_file_menu();
        model.set_item_state("file.save", false, true).unwrap();
        assert_eq!(model.item_state("file.save").unwrap(), (false, true));

        model
            .set_item_shortcut("file.save", "Ctrl-S", "Ctrl+S")
            .unwrap();
        assert_eq!(model.item("file.save").unwrap().key, "Ctrl-S");

        model.set_title("file-menu", "Fichier").unwrap();
        model.set_title("file.open", "Ouvrir").unwrap();
        assert_eq!(model.title("file-menu").unwrap(), "Fichier");
        assert_eq!(model.title("file.open").unwrap(), "Ouvrir");
        assert_eq!(model.title("missing"), Err(ErrorCode::NotFound));
        assert_eq!(
            model.position("file.save").unwrap(),
            ("file-menu".to_string(), 2)
        );
    }

    #[test]
    fn position_parsing() {
        assert_eq!(Position::parse("").unwrap(), Position::Last);
        assert_eq!(
            Position::parse("firstInSection").unwrap(),
            Position::FirstInSection
        );
        assert_eq!(Position::parse("sideways"), Err(ErrorCode::InvalidParams));
    }

    #[test]
    fn menus_reject_section_positions() {
        let mut model = MenuModel::new();
        assert_eq!(
            model.add_menu("m", "M", Position::LastInSection, ""),
            Err(ErrorCode::InvalidParams)
        );
    }
}
