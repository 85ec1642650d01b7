pub mod browser;
pub mod library;

pub use browser::{BrowserAction, LibraryBrowserController, RecentRow, Tab};
pub use library::{LibraryScreen, LibraryState, ScreenOutcome};
