extern crate alloc;

use alloc::{format, string::{String, ToString}, vec::Vec};

use crate::{
    config::LibraryConfig,
    cover_cache::{BookGrid, GRID_COLUMNS, GRID_PAGE_SIZE},
    display::RefreshMode,
    document::LIST_EXTENSIONS,
    fs::{self, Filesystem},
    input::{ButtonState, Buttons},
    recent::RecentEntryStore,
    ui::{RedrawPlan, library_view::list_rows},
};

const RESERVED_NAME: &str = "System Volume Information";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tab {
    Recent,
    Files,
    Books,
}

impl Tab {
    pub fn next(self) -> Self {
        match self {
            Tab::Recent => Tab::Files,
            Tab::Files => Tab::Books,
            Tab::Books => Tab::Recent,
        }
    }

    pub fn prev(self) -> Self {
        match self {
            Tab::Recent => Tab::Books,
            Tab::Files => Tab::Recent,
            Tab::Books => Tab::Files,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Tab::Recent => "Recent",
            Tab::Files => "Files",
            Tab::Books => "Books",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecentRow {
    pub path: String,
    pub title: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BrowserAction {
    None,
    /// Something visible changed.
    Dirty,
    /// Visible change on the Books grid; covers for this page are wanted.
    EnsurePage(usize),
    Open { path: String, tab: Tab },
    GoHome,
}

/// Selection, pagination and listings of the three library tabs.
pub struct LibraryBrowserController {
    tab: Tab,
    selected: usize,
    list_page_size: usize,
    files_root: String,
    base_path: String,
    files: Vec<String>,
    recent_rows: Vec<RecentRow>,
    full_redraw: bool,
    hard_refresh: bool,
    last_rendered: Option<(usize, usize)>,
    skip_page_ms: u32,
    go_root_ms: u32,
    max_recent_rows: usize,
}

impl LibraryBrowserController {
    pub fn new(config: &LibraryConfig, screen_height: u32, tab: Tab) -> Self {
        Self {
            tab,
            selected: 0,
            list_page_size: list_rows(screen_height),
            files_root: config.files_root.clone(),
            base_path: config.files_root.clone(),
            files: Vec::new(),
            recent_rows: Vec::new(),
            full_redraw: true,
            hard_refresh: true,
            last_rendered: None,
            skip_page_ms: config.skip_page_ms,
            go_root_ms: config.go_root_ms,
            max_recent_rows: config.max_recent_rows,
        }
    }

    pub fn tab(&self) -> Tab {
        self.tab
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Starts the Files tab in `path` instead of the root. Takes effect on the
    /// next [`LibraryBrowserController::load_files`].
    pub fn set_base_path(&mut self, path: &str) {
        self.base_path = if path.is_empty() {
            self.files_root.clone()
        } else {
            path.trim_end_matches('/').to_string()
        };
        if self.base_path.is_empty() {
            self.base_path = String::from("/");
        }
        self.selected = 0;
    }

    pub fn files(&self) -> &[String] {
        &self.files
    }

    pub fn recent_rows(&self) -> &[RecentRow] {
        &self.recent_rows
    }

    pub fn page_size(&self) -> usize {
        match self.tab {
            Tab::Books => GRID_PAGE_SIZE,
            Tab::Recent | Tab::Files => self.list_page_size,
        }
    }

    pub fn item_count(&self, grid: &BookGrid) -> usize {
        match self.tab {
            Tab::Recent => self.recent_rows.len(),
            Tab::Files => self.files.len(),
            Tab::Books => grid.len(),
        }
    }

    /// 1-based.
    pub fn current_page(&self) -> usize {
        self.selected / self.page_size() + 1
    }

    pub fn total_pages(&self, grid: &BookGrid) -> usize {
        self.item_count(grid).div_ceil(self.page_size()).max(1)
    }

    pub fn page_start(&self) -> usize {
        self.selected / self.page_size() * self.page_size()
    }

    pub fn selected_index(&self, grid: &BookGrid) -> Option<usize> {
        (self.item_count(grid) > 0).then_some(self.selected)
    }

    pub fn find_entry(&self, name: &str) -> Option<usize> {
        self.files.iter().position(|entry| entry == name)
    }

    pub fn load_files<F: Filesystem>(&mut self, fs: &F) {
        self.files = match fs.list_dir(&self.base_path) {
            Ok(entries) => {
                let mut files: Vec<String> = entries
                    .into_iter()
                    .filter(|entry| !entry.is_hidden() && entry.name != RESERVED_NAME)
                    .filter_map(|entry| {
                        if entry.is_directory {
                            Some(format!("{}/", entry.name))
                        } else if fs::has_extension(&entry.name, LIST_EXTENSIONS) {
                            Some(entry.name)
                        } else {
                            None
                        }
                    })
                    .collect();
                files.sort_by(|a, b| {
                    b.ends_with('/').cmp(&a.ends_with('/')).then_with(|| {
                        a.bytes()
                            .map(|c| c.to_ascii_lowercase())
                            .cmp(b.bytes().map(|c| c.to_ascii_lowercase()))
                    })
                });
                files
            }
            Err(_) => {
                log::warn!("Could not list {}", self.base_path);
                Vec::new()
            }
        };
        self.full_redraw = true;
    }

    pub fn load_recent<F: Filesystem>(&mut self, fs: &F, recent: &RecentEntryStore) {
        self.recent_rows = recent
            .books()
            .iter()
            .filter(|entry| fs::exists_or_false(fs, &entry.path))
            .take(self.max_recent_rows)
            .map(|entry| RecentRow {
                path: entry.path.clone(),
                title: if entry.title.is_empty() {
                    fs::basename(&entry.path).to_string()
                } else {
                    entry.title.clone()
                },
            })
            .collect();
        self.full_redraw = true;
    }

    /// Pulls the selection back onto the last item after the current tab's
    /// items were reloaded.
    pub fn clamp_selection(&mut self, grid: &BookGrid) {
        let count = self.item_count(grid);
        if self.selected >= count {
            self.selected = count.saturating_sub(1);
            self.full_redraw = true;
        }
    }

    pub fn switch_tab<F: Filesystem>(
        &mut self,
        tab: Tab,
        fs: &F,
        recent: &RecentEntryStore,
    ) -> BrowserAction {
        self.tab = tab;
        self.selected = 0;
        self.full_redraw = true;
        self.hard_refresh = true;
        if tab == Tab::Recent {
            self.load_recent(fs, recent);
        }
        log::debug!("Library tab {}", tab.title());
        match tab {
            Tab::Books => BrowserAction::EnsurePage(1),
            Tab::Recent | Tab::Files => BrowserAction::Dirty,
        }
    }

    pub fn handle_input<F: Filesystem>(
        &mut self,
        buttons: &ButtonState,
        fs: &F,
        recent: &RecentEntryStore,
        grid: &BookGrid,
    ) -> BrowserAction {
        if self.tab == Tab::Files
            && buttons.is_held(Buttons::Back)
            && buttons.held_ms() >= self.go_root_ms
        {
            if self.base_path != self.files_root {
                self.base_path = self.files_root.clone();
                self.load_files(fs);
                self.selected = 0;
                return BrowserAction::Dirty;
            }
            return BrowserAction::None;
        }

        if buttons.is_released(Buttons::Power) {
            return self.switch_tab(self.tab.next(), fs, recent);
        }

        if buttons.is_released(Buttons::Confirm) {
            return self.confirm(fs, grid);
        }

        if buttons.is_released(Buttons::Back) {
            if buttons.held_ms() >= self.go_root_ms {
                return BrowserAction::None;
            }
            if self.tab == Tab::Files && self.base_path != self.files_root {
                self.ascend(fs);
                return BrowserAction::Dirty;
            }
            return BrowserAction::GoHome;
        }

        match self.tab {
            Tab::Books => self.navigate_grid(buttons, grid.len()),
            Tab::Recent | Tab::Files => {
                if buttons.is_released(Buttons::Left) {
                    return self.switch_tab(self.tab.prev(), fs, recent);
                }
                if buttons.is_released(Buttons::Right) {
                    return self.switch_tab(self.tab.next(), fs, recent);
                }
                self.navigate_list(buttons, self.item_count(grid))
            }
        }
    }

    fn confirm<F: Filesystem>(&mut self, fs: &F, grid: &BookGrid) -> BrowserAction {
        let tab = self.tab;
        match tab {
            Tab::Recent => self
                .recent_rows
                .get(self.selected)
                .map(|row| BrowserAction::Open {
                    path: row.path.clone(),
                    tab,
                })
                .unwrap_or(BrowserAction::None),
            Tab::Books => grid
                .get(self.selected)
                .map(|item| BrowserAction::Open {
                    path: item.path.clone(),
                    tab,
                })
                .unwrap_or(BrowserAction::None),
            Tab::Files => {
                let Some(name) = self.files.get(self.selected).cloned() else {
                    return BrowserAction::None;
                };
                match name.strip_suffix('/') {
                    Some(dir) => {
                        self.base_path = fs::join_path(&self.base_path, dir);
                        self.load_files(fs);
                        self.selected = 0;
                        BrowserAction::Dirty
                    }
                    None => BrowserAction::Open {
                        path: fs::join_path(&self.base_path, &name),
                        tab,
                    },
                }
            }
        }
    }

    fn ascend<F: Filesystem>(&mut self, fs: &F) {
        let exited = format!("{}/", fs::basename(&self.base_path));
        self.base_path = fs::parent_dir(&self.base_path).to_string();
        self.load_files(fs);
        self.selected = match self.find_entry(&exited) {
            Some(index) => index,
            None => {
                log::debug!("{} not found in {}, selecting first entry", exited, self.base_path);
                0
            }
        };
    }

    fn navigate_list(&mut self, buttons: &ButtonState, count: usize) -> BrowserAction {
        if count == 0 {
            return BrowserAction::None;
        }
        let page = self.page_size();
        let skip = buttons.held_ms() > self.skip_page_ms;
        let before = self.selected;

        if buttons.is_released(Buttons::Up) {
            self.selected = if skip {
                let target = (self.selected / page) as isize - 1;
                (target * page as isize).rem_euclid(count as isize) as usize
            } else {
                (self.selected + count - 1) % count
            };
        } else if buttons.is_released(Buttons::Down) {
            self.selected = if skip {
                ((self.selected / page + 1) * page) % count
            } else {
                (self.selected + 1) % count
            };
        }

        if self.selected == before {
            BrowserAction::None
        } else {
            BrowserAction::Dirty
        }
    }

    fn navigate_grid(&mut self, buttons: &ButtonState, count: usize) -> BrowserAction {
        let before = self.selected;
        let before_page = self.current_page();

        if buttons.is_released(Buttons::Left) {
            if self.selected % GRID_COLUMNS != 0 {
                self.selected -= 1;
            }
        } else if buttons.is_released(Buttons::Right) {
            if self.selected % GRID_COLUMNS == 0 && self.selected + 1 < count {
                self.selected += 1;
            }
        } else if buttons.is_released(Buttons::Up) {
            if self.selected >= GRID_COLUMNS {
                self.selected -= GRID_COLUMNS;
            }
        } else if buttons.is_released(Buttons::Down) && self.selected + GRID_COLUMNS < count {
            self.selected += GRID_COLUMNS;
        }

        if self.selected == before {
            BrowserAction::None
        } else if self.current_page() != before_page {
            BrowserAction::EnsurePage(self.current_page())
        } else {
            BrowserAction::Dirty
        }
    }

    /// Forces the next render to redraw the whole screen.
    pub fn mark_full_redraw(&mut self) {
        self.full_redraw = true;
    }

    pub fn plan_redraw(&self, generating: bool) -> RedrawPlan {
        let refresh = if self.hard_refresh {
            RefreshMode::Full
        } else {
            RefreshMode::Fast
        };
        match self.last_rendered {
            Some((page, selection)) if !self.full_redraw && !generating => {
                if page != self.current_page() {
                    RedrawPlan::Full { refresh }
                } else if selection != self.selected {
                    RedrawPlan::Partial {
                        previous: selection,
                        current: self.selected,
                    }
                } else {
                    RedrawPlan::None
                }
            }
            _ => RedrawPlan::Full { refresh },
        }
    }

    pub fn mark_rendered(&mut self) {
        self.last_rendered = Some((self.current_page(), self.selected));
        self.full_redraw = false;
        self.hard_refresh = false;
    }
}
