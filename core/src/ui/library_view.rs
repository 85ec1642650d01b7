extern crate alloc;

use alloc::{format, string::String};

use embedded_graphics::{
    Drawable,
    mono_font::{MonoTextStyle, ascii::FONT_10X20},
    pixelcolor::BinaryColor,
    prelude::{OriginDimensions, Point, Primitive, Size},
    primitives::{PrimitiveStyle, Rectangle},
    text::{Baseline, Text},
};

use crate::{
    app::browser::{LibraryBrowserController, Tab},
    bitmap::Bitmap,
    cover_cache::{BookGrid, CoverState, GRID_COLUMNS, GRID_PAGE_SIZE},
    display::RefreshMode,
    framebuffer::DisplayBuffers,
    fs::{self, Filesystem},
    ui::Rect,
};

const TAB_BAR_Y: i32 = 15;
const HEADER_RULE_Y: i32 = 45;
const CONTENT_START_Y: i32 = 60;
const BOTTOM_BAR_HEIGHT: i32 = 60;
const LINE_HEIGHT: i32 = 30;
const LEFT_MARGIN: i32 = 20;
const RIGHT_MARGIN: i32 = 40;
const CELL_PADDING: i32 = 10;
const CHAR_WIDTH: i32 = 10;
const CHAR_HEIGHT: i32 = 20;

/// What the next render has to touch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RedrawPlan {
    None,
    Full { refresh: RefreshMode },
    /// Only the highlight moved, within one page.
    Partial { previous: usize, current: usize },
}

/// Rows that fit between the header and the button hints.
pub fn list_rows(screen_height: u32) -> usize {
    let available = screen_height as i32 - CONTENT_START_Y - BOTTOM_BAR_HEIGHT;
    (available / LINE_HEIGHT).max(1) as usize
}

pub struct LibraryView<'a, F: Filesystem> {
    pub browser: &'a LibraryBrowserController,
    pub grid: &'a BookGrid,
    pub fs: &'a F,
    pub books_dir: &'a str,
    pub generating: Option<usize>,
}

impl<F: Filesystem> LibraryView<'_, F> {
    /// Draws `plan` into the active buffer and returns the refresh the panel
    /// needs, if any.
    pub fn render(&self, plan: RedrawPlan, buffers: &mut DisplayBuffers) -> Option<RefreshMode> {
        match plan {
            RedrawPlan::None => None,
            RedrawPlan::Full { refresh } => {
                self.draw_full(buffers);
                Some(refresh)
            }
            RedrawPlan::Partial { previous, current } => {
                match self.browser.tab() {
                    Tab::Books => {
                        self.draw_grid_selector(buffers, previous, BinaryColor::On);
                        self.draw_grid_selector(buffers, current, BinaryColor::Off);
                    }
                    Tab::Recent | Tab::Files => {
                        self.draw_list_row(buffers, previous, false);
                        self.draw_list_row(buffers, current, true);
                    }
                }
                Some(RefreshMode::Fast)
            }
        }
    }

    fn draw_full(&self, buffers: &mut DisplayBuffers) {
        buffers.clear_screen(BinaryColor::On);
        let width = buffers.size().width as i32;

        let title = self.browser.tab().title();
        let title_x = (width - title.len() as i32 * CHAR_WIDTH) / 2;
        draw_text(buffers, title, title_x, TAB_BAR_Y, BinaryColor::Off);
        buffers.fill_rect(Rect::new(0, HEADER_RULE_Y, width, 2), BinaryColor::Off);

        match self.browser.tab() {
            Tab::Books => self.draw_grid(buffers),
            Tab::Recent | Tab::Files => self.draw_list(buffers),
        }
        self.draw_page_indicator(buffers);
        self.draw_hints(buffers);
    }

    fn label(&self, index: usize) -> Option<&str> {
        match self.browser.tab() {
            Tab::Recent => self
                .browser
                .recent_rows()
                .get(index)
                .map(|row| row.title.as_str()),
            Tab::Files => self.browser.files().get(index).map(String::as_str),
            Tab::Books => self.grid.get(index).map(|item| item.title.as_str()),
        }
    }

    fn draw_list(&self, buffers: &mut DisplayBuffers) {
        let count = self.browser.item_count(self.grid);
        if count == 0 {
            let empty = match self.browser.tab() {
                Tab::Recent => "No books yet",
                _ => "No books found",
            };
            draw_text(buffers, empty, LEFT_MARGIN, CONTENT_START_Y, BinaryColor::Off);
            return;
        }
        let start = self.browser.page_start();
        let end = (start + self.browser.page_size()).min(count);
        for index in start..end {
            self.draw_list_row(buffers, index, index == self.browser.selected());
        }
    }

    fn draw_list_row(&self, buffers: &mut DisplayBuffers, index: usize, selected: bool) {
        let Some(label) = self.label(index) else {
            return;
        };
        let width = buffers.size().width as i32;
        let row = (index % self.browser.page_size()) as i32;
        let line_y = CONTENT_START_Y + row * LINE_HEIGHT;
        let band = Rect::new(0, line_y - 2, width - RIGHT_MARGIN, LINE_HEIGHT);
        let (background, foreground) = if selected {
            (BinaryColor::Off, BinaryColor::On)
        } else {
            (BinaryColor::On, BinaryColor::Off)
        };
        buffers.fill_rect(band, background);
        let max_chars = ((width - LEFT_MARGIN - RIGHT_MARGIN) / CHAR_WIDTH) as usize;
        draw_text(
            buffers,
            &truncate(label, max_chars),
            LEFT_MARGIN,
            line_y + 3,
            foreground,
        );
    }

    /// Cell rectangle of grid slot `index` on its page, padding excluded.
    fn cell(&self, buffers: &DisplayBuffers, index: usize) -> Rect {
        let size = buffers.size();
        let cell_w = (size.width as i32 - LEFT_MARGIN - RIGHT_MARGIN) / GRID_COLUMNS as i32;
        let cell_h = (size.height as i32 - CONTENT_START_Y - BOTTOM_BAR_HEIGHT) / 2;
        let slot = index % GRID_PAGE_SIZE;
        let row = (slot / GRID_COLUMNS) as i32;
        let col = (slot % GRID_COLUMNS) as i32;
        Rect::new(
            LEFT_MARGIN + col * cell_w,
            CONTENT_START_Y + row * cell_h,
            cell_w - CELL_PADDING,
            cell_h - CELL_PADDING,
        )
    }

    fn draw_grid(&self, buffers: &mut DisplayBuffers) {
        if self.grid.is_empty() {
            let empty = format!("{} is empty", self.books_dir);
            draw_text(buffers, &empty, LEFT_MARGIN, CONTENT_START_Y, BinaryColor::Off);
            return;
        }
        let start = self.browser.page_start();
        let end = (start + GRID_PAGE_SIZE).min(self.grid.len());
        for index in start..end {
            if index == self.browser.selected() {
                self.draw_grid_selector(buffers, index, BinaryColor::Off);
            }
            self.draw_grid_cell(buffers, index);
        }
    }

    fn draw_grid_cell(&self, buffers: &mut DisplayBuffers, index: usize) {
        let Some(item) = self.grid.get(index) else {
            return;
        };
        let cell = self.cell(buffers, index);

        if self.generating == Some(index) {
            draw_box(buffers, cell);
            draw_text(
                buffers,
                "Loading...",
                cell.x + 20,
                cell.y + cell.h / 2 - CHAR_HEIGHT / 2,
                BinaryColor::Off,
            );
            return;
        }

        if item.state == CoverState::HasCover {
            match fs::read_all(self.fs, &item.cover_path) {
                Ok(data) => match Bitmap::parse(&data) {
                    Ok(bitmap) => {
                        bitmap
                            .draw(buffers, cell.x, cell.y, cell.w as u32, cell.h as u32)
                            .ok();
                        return;
                    }
                    Err(err) => log::warn!("Cover {} unreadable: {}", item.cover_path, err),
                },
                Err(_) => log::warn!("Cover {} could not be opened", item.cover_path),
            }
        }

        draw_box(buffers, cell);
        let max_chars = ((cell.w - 20) / CHAR_WIDTH).max(1) as usize;
        let title = truncate(&item.title, max_chars);
        let title_w = title.chars().count() as i32 * CHAR_WIDTH;
        draw_text(
            buffers,
            &title,
            cell.x + (cell.w - title_w) / 2,
            cell.y + cell.h / 2 - CHAR_HEIGHT / 2,
            BinaryColor::Off,
        );
    }

    /// Three-pixel border around the cell; drawn white to erase it.
    fn draw_grid_selector(&self, buffers: &mut DisplayBuffers, index: usize, color: BinaryColor) {
        if index >= self.grid.len() {
            return;
        }
        let cell = self.cell(buffers, index);
        for by in 4..=6 {
            stroke(buffers, cell.inset(-by), color);
        }
    }

    fn draw_page_indicator(&self, buffers: &mut DisplayBuffers) {
        let total = self.browser.total_pages(self.grid) as i32;
        if total <= 1 {
            return;
        }
        let size = buffers.size();
        let height = size.height as i32 - CONTENT_START_Y - BOTTOM_BAR_HEIGHT;
        let x = size.width as i32 - RIGHT_MARGIN + 20;
        stroke(buffers, Rect::new(x, CONTENT_START_Y, 8, height), BinaryColor::Off);
        let thumb_h = (height / total).max(4);
        let page = self.browser.current_page() as i32 - 1;
        let thumb_y = CONTENT_START_Y + (page * height / total).min(height - thumb_h);
        buffers.fill_rect(Rect::new(x, thumb_y, 8, thumb_h), BinaryColor::Off);
    }

    fn draw_hints(&self, buffers: &mut DisplayBuffers) {
        let size = buffers.size();
        let y = size.height as i32 - BOTTOM_BAR_HEIGHT + (BOTTOM_BAR_HEIGHT - CHAR_HEIGHT) / 2;
        let hints = match self.browser.tab() {
            Tab::Books => "Back  Open  Power: tab",
            Tab::Recent | Tab::Files => "Back  Open  < tab >",
        };
        draw_text(buffers, hints, LEFT_MARGIN, y, BinaryColor::Off);
    }
}

fn draw_text(buffers: &mut DisplayBuffers, text: &str, x: i32, y: i32, color: BinaryColor) {
    let style = MonoTextStyle::new(&FONT_10X20, color);
    Text::with_baseline(text, Point::new(x, y), style, Baseline::Top)
        .draw(buffers)
        .ok();
}

fn stroke(buffers: &mut DisplayBuffers, rect: Rect, color: BinaryColor) {
    if rect.w <= 0 || rect.h <= 0 {
        return;
    }
    Rectangle::new(Point::new(rect.x, rect.y), Size::new(rect.w as u32, rect.h as u32))
        .into_styled(PrimitiveStyle::with_stroke(color, 1))
        .draw(buffers)
        .ok();
}

/// Placeholder frame with a doubled border.
fn draw_box(buffers: &mut DisplayBuffers, cell: Rect) {
    stroke(buffers, cell, BinaryColor::Off);
    stroke(buffers, cell.inset(1), BinaryColor::Off);
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return String::from(text);
    }
    let keep = max_chars.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}
