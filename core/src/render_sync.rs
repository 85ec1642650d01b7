use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::signal::Signal;

/// The lock around everything the render loop and the cover worker share,
/// plus the "redraw requested" signal between them.
///
/// `M` picks the raw lock: a critical section on firmware and in tests.
pub struct RenderSync<M: RawMutex, T> {
    state: Mutex<M, RefCell<T>>,
    redraw: Signal<M, ()>,
    shutdown: AtomicBool,
}

impl<M: RawMutex, T> RenderSync<M, T> {
    pub const fn new(state: T) -> Self {
        Self {
            state: Mutex::new(RefCell::new(state)),
            redraw: Signal::new(),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Runs `f` with exclusive access to the shared state. Blocks until the
    /// other side releases the lock; must not be nested.
    pub fn lock<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        self.state.lock(|cell| f(&mut cell.borrow_mut()))
    }

    /// Any number of requests before the next render collapse into one.
    pub fn request_redraw(&self) {
        self.redraw.signal(());
    }

    pub fn take_redraw(&self) -> bool {
        self.redraw.try_take().is_some()
    }

    pub async fn wait_redraw(&self) {
        self.redraw.wait().await
    }

    /// Waits for any in-progress render or generation step to release the lock,
    /// then raises the shutdown flag and wakes the render side.
    pub fn shut_down(&self) {
        self.lock(|_| self.shutdown.store(true, Ordering::Release));
        self.redraw.signal(());
        log::info!("Library screen shutting down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Hands the state back once both loops have returned.
    pub fn into_inner(self) -> T {
        self.state.into_inner().into_inner()
    }
}
