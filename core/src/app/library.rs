//! The library screen: one lock-guarded [`LibraryState`] shared by the input
//! loop, the render loop and the cover worker.

extern crate alloc;

use core::ops::Range;

use alloc::boxed::Box;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_graphics::prelude::OriginDimensions;
use embedded_hal::delay::DelayNs;

use crate::{
    app::browser::{BrowserAction, LibraryBrowserController, Tab},
    config::LibraryConfig,
    cover_cache::{
        self, BookGrid, ClearReport, CoverCacheEngine, CoverState, CoverWorkspace, ItemCheck,
        PassOutcome,
    },
    display::Display,
    document::{DocumentInfo, DocumentSource},
    framebuffer::DisplayBuffers,
    fs::{self, Filesystem},
    input::ButtonState,
    recent::RecentEntryStore,
    render_sync::RenderSync,
    ui::LibraryView,
};

/// Everything behind the render lock.
pub struct LibraryState<F: Filesystem, S: DocumentSource> {
    pub fs: F,
    pub documents: S,
    pub recent: RecentEntryStore,
    pub grid: BookGrid,
    pub browser: LibraryBrowserController,
    pub buffers: Box<DisplayBuffers>,
    pub config: LibraryConfig,
}

impl<F: Filesystem, S: DocumentSource> CoverWorkspace for LibraryState<F, S> {
    fn page_range(&self, page: usize) -> Range<usize> {
        self.grid.page_range(page)
    }

    fn prepare(&mut self, index: usize) -> ItemCheck {
        let Some(item) = self.grid.get_mut(index) else {
            return ItemCheck::Settled;
        };
        if item.state.is_terminal() {
            ItemCheck::Settled
        } else if fs::exists_or_false(&self.fs, &item.cover_path) {
            item.state = CoverState::HasCover;
            ItemCheck::Reconciled
        } else {
            ItemCheck::NeedsWork
        }
    }

    fn generate(&mut self, index: usize) -> CoverState {
        match self.grid.get_mut(index) {
            Some(item) => cover_cache::generate(item, &self.fs, &mut self.documents),
            None => CoverState::Unchecked,
        }
    }

    fn covers_changed(&mut self) {
        self.browser.mark_full_redraw();
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScreenOutcome {
    Stay,
    GoHome,
}

pub struct LibraryScreen<M: RawMutex, F: Filesystem, S: DocumentSource> {
    sync: RenderSync<M, LibraryState<F, S>>,
    covers: CoverCacheEngine<M>,
}

impl<M: RawMutex, F: Filesystem, S: DocumentSource> LibraryScreen<M, F, S> {
    pub fn new(fs: F, documents: S, config: LibraryConfig, tab: Tab) -> Self {
        let buffers: Box<DisplayBuffers> = Box::default();
        let browser = LibraryBrowserController::new(&config, buffers.size().height, tab);
        let recent = RecentEntryStore::new(&config.recent_file, &config.legacy_recent_file);
        let covers = CoverCacheEngine::new(config.placeholder_delay_ms, config.item_delay_ms);
        Self {
            sync: RenderSync::new(LibraryState {
                fs,
                documents,
                recent,
                grid: BookGrid::default(),
                browser,
                buffers,
                config,
            }),
            covers,
        }
    }

    pub fn sync(&self) -> &RenderSync<M, LibraryState<F, S>> {
        &self.sync
    }

    pub fn covers(&self) -> &CoverCacheEngine<M> {
        &self.covers
    }

    /// Loads the recent list, the Files listing and the Books grid.
    pub fn on_enter(&self) {
        let (tab, page) = self.sync.lock(|state| {
            if let Err(err) = state.recent.load(&state.fs) {
                log::warn!("Recent entries unavailable: {}", err);
            }
            state.browser.load_recent(&state.fs, &state.recent);
            state.browser.load_files(&state.fs);
            state.grid = BookGrid::scan(
                &state.fs,
                &state.documents,
                &state.config.books_dir,
                &state.config.cover_dir,
            );
            state.browser.clamp_selection(&state.grid);
            (state.browser.tab(), state.browser.current_page())
        });
        if tab == Tab::Books {
            self.covers.ensure_page(page);
        }
        self.sync.request_redraw();
    }

    /// Handles one input sample. Confirming an item records it as recently
    /// opened and then calls `on_select`.
    pub fn handle_input(
        &self,
        buttons: &ButtonState,
        on_select: &mut impl FnMut(&str, Tab),
    ) -> ScreenOutcome {
        let action = self.sync.lock(|state| {
            state
                .browser
                .handle_input(buttons, &state.fs, &state.recent, &state.grid)
        });
        match action {
            BrowserAction::None => {}
            BrowserAction::Dirty => self.sync.request_redraw(),
            BrowserAction::EnsurePage(page) => {
                self.covers.ensure_page(page);
                self.sync.request_redraw();
            }
            BrowserAction::Open { path, tab } => {
                self.record_open(&path);
                on_select(&path, tab);
            }
            BrowserAction::GoHome => return ScreenOutcome::GoHome,
        }
        ScreenOutcome::Stay
    }

    pub fn record_open(&self, path: &str) {
        self.sync.lock(|state| {
            let info = state.documents.load(&state.fs, path).unwrap_or_else(|err| {
                log::warn!("Could not read {}: {}", path, err);
                DocumentInfo::default()
            });
            if let Err(err) = state
                .recent
                .add_book(&state.fs, path, &info.title, &info.author)
            {
                log::warn!("Recent entry for {} not saved: {}", path, err);
            }
            state.browser.load_recent(&state.fs, &state.recent);
            state.browser.clamp_selection(&state.grid);
        });
    }

    /// Draws whatever changed since the last frame and presents it. Holds the
    /// lock throughout.
    pub fn render<D: Display>(&self, display: &mut D) {
        self.sync.lock(|state| {
            let generating = self.covers.generating();
            let plan = state.browser.plan_redraw(generating.is_some());
            let view = LibraryView {
                browser: &state.browser,
                grid: &state.grid,
                fs: &state.fs,
                books_dir: &state.config.books_dir,
                generating,
            };
            if let Some(mode) = view.render(plan, &mut state.buffers) {
                display.display(&mut state.buffers, mode);
                state.browser.mark_rendered();
            }
        });
    }

    /// Polling form of the render loop: renders only when a redraw was
    /// requested since the last call.
    pub fn render_pending<D: Display>(&self, display: &mut D) -> bool {
        if !self.sync.take_redraw() || self.sync.is_shut_down() {
            return false;
        }
        self.render(display);
        true
    }

    /// Waits for the next redraw request and serves it. Returns `false` once
    /// the screen is shutting down.
    pub async fn render_when_requested<D: Display>(&self, display: &mut D) -> bool {
        self.sync.wait_redraw().await;
        if self.sync.is_shut_down() {
            return false;
        }
        self.render(display);
        true
    }

    pub async fn run_render_loop<D: Display>(&self, display: &mut D) {
        while self.render_when_requested(display).await {}
        log::info!("Library render loop stopped");
    }

    pub fn run_cover_pass<D: DelayNs>(&self, page: usize, delay: &mut D) -> PassOutcome {
        self.covers.run_pass(&self.sync, page, delay)
    }

    pub async fn run_cover_worker<D: DelayNs>(&self, delay: &mut D) {
        self.covers.run(&self.sync, delay).await
    }

    /// Deletes every cached cover and forgets the recent list, then rescans.
    pub fn clear_cache(&self) -> ClearReport {
        let (report, tab, page) = self.sync.lock(|state| {
            let report = cover_cache::clear_cover_cache(&state.fs, &state.config.cover_dir);
            state.recent.clear();
            if let Err(err) = state.recent.save(&state.fs) {
                log::warn!("Recent entries not cleared on storage: {}", err);
            }
            state.grid = BookGrid::scan(
                &state.fs,
                &state.documents,
                &state.config.books_dir,
                &state.config.cover_dir,
            );
            state.browser.load_recent(&state.fs, &state.recent);
            state.browser.clamp_selection(&state.grid);
            state.browser.mark_full_redraw();
            (report, state.browser.tab(), state.browser.current_page())
        });
        if tab == Tab::Books {
            self.covers.ensure_page(page);
        }
        self.sync.request_redraw();
        report
    }

    /// Waits for the lock, raises the shutdown flag and wakes both loops.
    /// Join the loops before calling [`LibraryScreen::into_state`].
    pub fn on_exit(&self) {
        self.sync.shut_down();
        self.covers.wake();
    }

    pub fn into_state(self) -> LibraryState<F, S> {
        self.sync.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::display::RefreshMode;
    use crate::input::Buttons;
    use crate::testing::{MemFs, MockDocuments, Script};
    use alloc::{format, string::{String, ToString}, vec::Vec};
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

    type Screen = LibraryScreen<CriticalSectionRawMutex, MemFs, MockDocuments>;

    #[derive(Default)]
    struct RecordingDisplay {
        frames: Vec<RefreshMode>,
    }

    impl Display for RecordingDisplay {
        fn display(&mut self, buffers: &mut DisplayBuffers, mode: RefreshMode) {
            self.frames.push(mode);
            buffers.swap_buffers();
        }
    }

    struct NoDelay;

    impl DelayNs for NoDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }

    struct SleepDelay;

    impl DelayNs for SleepDelay {
        fn delay_ns(&mut self, ns: u32) {
            std::thread::sleep(Duration::from_nanos(ns as u64));
        }
    }

    fn tap(button: Buttons) -> ButtonState {
        let mut state = ButtonState::new();
        state.update(ButtonState::mask(button), 10);
        state.update(0, 10);
        state
    }

    fn screen_with_books(count: usize, tab: Tab) -> Screen {
        let fs = MemFs::new();
        let mut docs = MockDocuments::new();
        for i in 0..count {
            let path = format!("/books/{i}.epub");
            fs.add_file(&path, b"");
            let script = if i % 2 == 0 { Script::Cover } else { Script::NoCover };
            docs = docs.script(&path, script);
        }
        let screen = Screen::new(fs, docs, LibraryConfig::default(), tab);
        screen.on_enter();
        screen
    }

    #[test]
    fn enter_on_books_requests_first_page() {
        let screen = screen_with_books(6, Tab::Books);
        assert_eq!(screen.covers().take_request(), Some(1));
        let mut display = RecordingDisplay::default();
        assert!(screen.render_pending(&mut display));
        assert!(!screen.render_pending(&mut display));
        assert_eq!(display.frames, [RefreshMode::Full]);
    }

    #[test]
    fn confirm_records_recent_and_reports_selection() {
        let screen = screen_with_books(3, Tab::Books);
        let mut opened: Vec<(String, Tab)> = Vec::new();
        let outcome = screen.handle_input(&tap(Buttons::Right), &mut |_, _| {});
        assert_eq!(outcome, ScreenOutcome::Stay);
        screen.handle_input(&tap(Buttons::Confirm), &mut |path, tab| {
            opened.push((path.to_string(), tab));
        });
        assert_eq!(opened, [("/books/1.epub".to_string(), Tab::Books)]);

        let state = screen.into_state();
        let books = state.recent.books();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].path, "/books/1.epub");
        assert_eq!(books[0].title, "1.epub");
        assert!(state.fs.contents(&state.config.recent_file).is_some());
    }

    #[test]
    fn back_on_recent_goes_home() {
        let screen = screen_with_books(0, Tab::Recent);
        assert_eq!(
            screen.handle_input(&tap(Buttons::Back), &mut |_, _| {}),
            ScreenOutcome::GoHome
        );
    }

    #[test]
    fn partial_frames_between_full_ones() {
        let screen = screen_with_books(0, Tab::Files);
        screen.sync().lock(|state| {
            for i in 0..3 {
                state.fs.add_file(&format!("/{i}.txt"), b"");
            }
            state.browser.load_files(&state.fs);
        });
        let mut display = RecordingDisplay::default();
        screen.render_pending(&mut display);
        screen.handle_input(&tap(Buttons::Down), &mut |_, _| {});
        screen.render_pending(&mut display);
        screen.handle_input(&tap(Buttons::Right), &mut |_, _| {});
        screen.render_pending(&mut display);
        assert_eq!(
            display.frames,
            [RefreshMode::Full, RefreshMode::Fast, RefreshMode::Full]
        );
    }

    #[test]
    fn clear_cache_drops_covers_and_recent_entries() {
        let screen = screen_with_books(2, Tab::Books);
        screen.record_open("/books/0.epub");
        let page = screen.covers().take_request().unwrap();
        assert_eq!(
            screen.run_cover_pass(page, &mut NoDelay),
            PassOutcome::Completed { generated: 2 }
        );
        let report = screen.clear_cache();
        assert_eq!(report.removed, 2);
        assert_eq!(report.failed, 0);

        let state = screen.into_state();
        assert!(state.recent.is_empty());
        assert!(state.browser.recent_rows().is_empty());
        assert!(
            state
                .grid
                .items()
                .iter()
                .all(|item| item.state == CoverState::Unchecked)
        );
        let mut reloaded = RecentEntryStore::new(
            &state.config.recent_file,
            &state.config.legacy_recent_file,
        );
        reloaded.load(&state.fs).unwrap();
        assert!(reloaded.is_empty());
    }

    #[test]
    fn clear_cache_keeps_selection_in_range_and_refills_visible_page() {
        let screen = screen_with_books(6, Tab::Books);
        assert_eq!(screen.covers().take_request(), Some(1));
        screen.handle_input(&tap(Buttons::Right), &mut |_, _| {});
        screen.handle_input(&tap(Buttons::Down), &mut |_, _| {});
        screen.handle_input(&tap(Buttons::Down), &mut |_, _| {});
        assert_eq!(screen.covers().take_request(), Some(2));
        screen.sync().lock(|state| {
            assert_eq!(state.browser.selected(), 5);
            state.fs.remove("/books/4.epub").unwrap();
            state.fs.remove("/books/5.epub").unwrap();
        });

        screen.clear_cache();

        screen.sync().lock(|state| {
            assert_eq!(state.grid.len(), 4);
            assert_eq!(state.browser.selected_index(&state.grid), Some(3));
            assert_eq!(state.browser.current_page(), 1);
        });
        assert_eq!(screen.covers().take_request(), Some(1));
    }

    #[test]
    fn enter_clamps_a_selection_left_past_the_end() {
        let screen = screen_with_books(3, Tab::Books);
        screen.handle_input(&tap(Buttons::Down), &mut |_, _| {});
        screen.sync().lock(|state| {
            assert_eq!(state.browser.selected(), 2);
            state.fs.remove("/books/2.epub").unwrap();
        });
        screen.on_enter();
        screen.sync().lock(|state| {
            assert_eq!(state.browser.selected_index(&state.grid), Some(1));
        });
    }

    #[test]
    fn opening_refreshes_recent_rows() {
        let screen = screen_with_books(2, Tab::Recent);
        screen.record_open("/books/0.epub");
        screen.record_open("/books/1.epub");
        let rows: Vec<String> = screen.sync().lock(|state| {
            state
                .browser
                .recent_rows()
                .iter()
                .map(|row| row.path.clone())
                .collect()
        });
        assert_eq!(rows, ["/books/1.epub", "/books/0.epub"]);
    }

    #[test]
    fn worker_and_render_threads_cooperate_and_stop() {
        let screen = screen_with_books(6, Tab::Books);
        let mut display = RecordingDisplay::default();

        std::thread::scope(|scope| {
            let worker = scope.spawn(|| {
                futures::executor::block_on(screen.run_cover_worker(&mut SleepDelay))
            });
            let renderer = scope.spawn(|| {
                futures::executor::block_on(screen.run_render_loop(&mut display))
            });

            let deadline = Instant::now() + Duration::from_secs(10);
            let page_done = || {
                screen.sync().lock(|state| {
                    state.grid.items()[..4]
                        .iter()
                        .all(|item| item.state.is_terminal())
                })
            };
            while !page_done() && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(10));
            }

            screen.on_exit();
            worker.join().unwrap();
            renderer.join().unwrap();
        });

        assert!(screen.sync().is_shut_down());
        assert!(!display.frames.is_empty());
        assert_eq!(screen.covers().generating(), None);
        let state = screen.into_state();
        let states: Vec<CoverState> = state.grid.items().iter().map(|item| item.state).collect();
        assert_eq!(
            &states[..4],
            [
                CoverState::HasCover,
                CoverState::NoCoverMarked,
                CoverState::HasCover,
                CoverState::NoCoverMarked,
            ]
        );
        assert!(states[4..].iter().all(|state| *state == CoverState::Unchecked));
    }
}
