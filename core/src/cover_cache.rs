//! Cover thumbnails for the Books grid, generated one at a time by a
//! background worker for whichever grid page was asked for last.

extern crate alloc;

use core::ops::Range;
use core::sync::atomic::{AtomicUsize, Ordering};

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::signal::Signal;
use embedded_hal::delay::DelayNs;

use crate::document::{DocumentError, DocumentSource, GRID_EXTENSIONS};
use crate::fs::{self, Filesystem};
use crate::render_sync::RenderSync;

pub const GRID_PAGE_SIZE: usize = 4;
pub const GRID_COLUMNS: usize = 2;
pub const NO_COVER_SUFFIX: &str = ".no";

const NOT_GENERATING: usize = usize::MAX;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoverState {
    Unchecked,
    /// A `.no` marker exists; never retried.
    NoCoverMarked,
    HasCover,
}

impl CoverState {
    pub fn is_terminal(self) -> bool {
        self != CoverState::Unchecked
    }
}

#[derive(Clone, Debug)]
pub struct BookGridItem {
    pub path: String,
    pub title: String,
    pub cover_path: String,
    pub state: CoverState,
}

impl BookGridItem {
    pub fn marker_path(&self) -> String {
        format!("{}{}", self.cover_path, NO_COVER_SUFFIX)
    }
}

#[derive(Default)]
pub struct BookGrid {
    items: Vec<BookGridItem>,
}

impl BookGrid {
    pub fn new(items: Vec<BookGridItem>) -> Self {
        Self { items }
    }

    /// Lists the documents in `books_dir` and seeds each item's state from
    /// what previous sessions left in the cover directory. Nothing is
    /// generated here.
    pub fn scan<F: Filesystem, S: DocumentSource>(
        fs: &F,
        documents: &S,
        books_dir: &str,
        cover_dir: &str,
    ) -> Self {
        for dir in [books_dir, cover_dir] {
            if !fs::exists_or_false(fs, dir) && fs.create_dir_all(dir).is_err() {
                log::warn!("Could not create {}", dir);
            }
        }

        let Ok(entries) = fs.list_dir(books_dir) else {
            log::warn!("Could not list {}", books_dir);
            return Self::default();
        };

        let mut items: Vec<BookGridItem> = entries
            .into_iter()
            .filter(|entry| !entry.is_directory && !entry.is_hidden())
            .filter(|entry| fs::has_extension(&entry.name, GRID_EXTENSIONS))
            .map(|entry| {
                let path = fs::join_path(books_dir, &entry.name);
                let cover_path = documents.thumbnail_path(&path);
                let mut item = BookGridItem {
                    path,
                    title: entry.name,
                    cover_path,
                    state: CoverState::Unchecked,
                };
                if fs::exists_or_false(fs, &item.marker_path()) {
                    item.state = CoverState::NoCoverMarked;
                } else if fs::exists_or_false(fs, &item.cover_path) {
                    item.state = CoverState::HasCover;
                }
                item
            })
            .collect();
        items.sort_by(|a, b| a.title.cmp(&b.title));

        log::info!("Scanned {} books in {}", items.len(), books_dir);
        Self { items }
    }

    pub fn items(&self) -> &[BookGridItem] {
        &self.items
    }

    pub fn get(&self, index: usize) -> Option<&BookGridItem> {
        self.items.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut BookGridItem> {
        self.items.get_mut(index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Item indices shown on 1-based `page`.
    pub fn page_range(&self, page: usize) -> Range<usize> {
        if page == 0 {
            return 0..0;
        }
        let start = ((page - 1) * GRID_PAGE_SIZE).min(self.items.len());
        let end = (page * GRID_PAGE_SIZE).min(self.items.len());
        start..end
    }
}

/// Drives one item towards a terminal state. No decoding happens when the
/// cover or the marker is already on disk.
pub fn generate<F: Filesystem, S: DocumentSource>(
    item: &mut BookGridItem,
    fs: &F,
    documents: &mut S,
) -> CoverState {
    if item.state.is_terminal() {
        return item.state;
    }
    if fs::exists_or_false(fs, &item.cover_path) {
        item.state = CoverState::HasCover;
        return item.state;
    }
    let marker = item.marker_path();
    if fs::exists_or_false(fs, &marker) {
        item.state = CoverState::NoCoverMarked;
        return item.state;
    }

    log::info!("Generating cover for {}", item.title);
    let result = documents
        .load(fs, &item.path)
        .and_then(|_| documents.generate_thumbnail(fs, &item.path))
        .and_then(|()| {
            if fs::exists_or_false(fs, &item.cover_path) {
                Ok(())
            } else {
                Err(DocumentError::Storage)
            }
        });

    item.state = match result {
        Ok(()) => CoverState::HasCover,
        Err(err) => {
            log::info!("No cover for {}: {}", item.path, err);
            fs.create_dir_all(fs::parent_dir(&marker)).ok();
            if fs::write_all(fs, &marker, &[]).is_err() {
                log::warn!("Could not write cover marker {}", marker);
            }
            CoverState::NoCoverMarked
        }
    };
    item.state
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ItemCheck {
    /// Already terminal.
    Settled,
    /// A cover from an earlier session was found on disk.
    Reconciled,
    NeedsWork,
}

/// The part of the shared library state the cover worker touches. Every call
/// happens with the render lock held.
pub trait CoverWorkspace {
    fn page_range(&self, page: usize) -> Range<usize>;
    fn prepare(&mut self, index: usize) -> ItemCheck;
    fn generate(&mut self, index: usize) -> CoverState;
    /// Item states changed; the next render must redraw everything.
    fn covers_changed(&mut self);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassOutcome {
    Idle,
    Completed { generated: usize },
    /// A newer page was requested before the pass reached its end.
    Superseded { generated: usize },
    ShutDown,
}

/// Holds the latest page request and the "generating" indicator.
pub struct CoverCacheEngine<M: RawMutex> {
    request: Signal<M, usize>,
    generating: AtomicUsize,
    placeholder_delay_ms: u32,
    item_delay_ms: u32,
}

impl<M: RawMutex> CoverCacheEngine<M> {
    pub const fn new(placeholder_delay_ms: u32, item_delay_ms: u32) -> Self {
        Self {
            request: Signal::new(),
            generating: AtomicUsize::new(NOT_GENERATING),
            placeholder_delay_ms,
            item_delay_ms,
        }
    }

    /// Asks the worker to make 1-based `page` ready, replacing any request it
    /// has not picked up yet.
    pub fn ensure_page(&self, page: usize) {
        if page < 1 {
            log::debug!("Ignoring cover request for page {}", page);
            return;
        }
        self.request.signal(page);
    }

    /// Wakes the worker without asking for work; used on teardown.
    pub fn wake(&self) {
        self.request.signal(0);
    }

    pub fn take_request(&self) -> Option<usize> {
        self.request.try_take().filter(|page| *page >= 1)
    }

    pub async fn wait_request(&self) -> usize {
        self.request.wait().await
    }

    pub fn request_superseded(&self) -> bool {
        self.request.signaled()
    }

    /// Index of the item whose cover is being generated right now.
    pub fn generating(&self) -> Option<usize> {
        match self.generating.load(Ordering::Acquire) {
            NOT_GENERATING => None,
            index => Some(index),
        }
    }

    pub fn run_pass<T: CoverWorkspace, D: DelayNs>(
        &self,
        sync: &RenderSync<M, T>,
        page: usize,
        delay: &mut D,
    ) -> PassOutcome {
        if page < 1 {
            return PassOutcome::Idle;
        }
        let range = sync.lock(|workspace| workspace.page_range(page));
        let mut generated = 0;

        for index in range {
            if sync.is_shut_down() {
                return PassOutcome::ShutDown;
            }
            if self.request_superseded() {
                log::debug!("Cover pass for page {} superseded at item {}", page, index);
                return PassOutcome::Superseded { generated };
            }

            match sync.lock(|workspace| workspace.prepare(index)) {
                ItemCheck::Settled => continue,
                ItemCheck::Reconciled => {
                    sync.lock(|workspace| workspace.covers_changed());
                    sync.request_redraw();
                    continue;
                }
                ItemCheck::NeedsWork => {}
            }

            self.generating.store(index, Ordering::Release);
            sync.request_redraw();
            delay.delay_ms(self.placeholder_delay_ms);

            if sync.is_shut_down() {
                self.generating.store(NOT_GENERATING, Ordering::Release);
                return PassOutcome::ShutDown;
            }
            // Cleared under the lock so no render sees a settled item as pending.
            let state = sync.lock(|workspace| {
                let state = workspace.generate(index);
                self.generating.store(NOT_GENERATING, Ordering::Release);
                workspace.covers_changed();
                state
            });
            sync.request_redraw();
            log::debug!("Cover {} finished as {:?}", index, state);
            generated += 1;

            delay.delay_ms(self.item_delay_ms);
        }

        PassOutcome::Completed { generated }
    }

    /// Worker loop: sleeps until a page is requested, then runs a pass for the
    /// latest request. Returns once the screen shuts down.
    pub async fn run<T: CoverWorkspace, D: DelayNs>(&self, sync: &RenderSync<M, T>, delay: &mut D) {
        log::info!("Cover worker started");
        loop {
            let page = self.wait_request().await;
            if sync.is_shut_down() {
                break;
            }
            if self.run_pass(sync, page, delay) == PassOutcome::ShutDown {
                break;
            }
        }
        log::info!("Cover worker stopped");
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClearReport {
    pub removed: usize,
    pub failed: usize,
}

/// Removes every thumbnail and marker from `cover_dir`.
pub fn clear_cover_cache<F: Filesystem>(fs: &F, cover_dir: &str) -> ClearReport {
    let mut report = ClearReport::default();
    let Ok(entries) = fs.list_dir(cover_dir) else {
        log::warn!("Could not list {}", cover_dir);
        return report;
    };
    for entry in entries.iter().filter(|entry| !entry.is_directory) {
        let path = fs::join_path(cover_dir, &entry.name);
        match fs.remove(&path) {
            Ok(()) => report.removed += 1,
            Err(_) => {
                log::warn!("Could not remove {}", path);
                report.failed += 1;
            }
        }
    }
    log::info!(
        "Cover cache cleared: {} removed, {} failed",
        report.removed,
        report.failed
    );
    report
}
