extern crate alloc;

use alloc::string::String;

/// Paths and timings of the library screen. Paths are volume-absolute.
#[derive(Clone, Debug)]
pub struct LibraryConfig {
    pub books_dir: String,
    pub cover_dir: String,
    pub files_root: String,
    pub recent_file: String,
    pub legacy_recent_file: String,
    /// Holding Up/Down longer than this skips whole pages.
    pub skip_page_ms: u32,
    /// Holding Back longer than this jumps to the filesystem root.
    pub go_root_ms: u32,
    /// Pause after publishing the "generating" placeholder.
    pub placeholder_delay_ms: u32,
    /// Pause between two generated covers.
    pub item_delay_ms: u32,
    pub max_recent_rows: usize,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            books_dir: String::from("/books"),
            cover_dir: String::from("/cover"),
            files_root: String::from("/"),
            recent_file: String::from("/.library/recent_v2.bin"),
            legacy_recent_file: String::from("/.library/recent.bin"),
            skip_page_ms: 700,
            go_root_ms: 1000,
            placeholder_delay_ms: 100,
            item_delay_ms: 50,
            max_recent_rows: 20,
        }
    }
}
