extern crate alloc;

use alloc::format;
use alloc::string::String;

use thiserror::Error;

use crate::fs::Filesystem;

/// Extensions shown in the Files tab.
pub const LIST_EXTENSIONS: &[&str] = &["epub", "xtch", "xtc", "txt", "md"];
/// Extensions picked up by the Books grid scan.
pub const GRID_EXTENSIONS: &[&str] = &["epub", "xtc", "xtch", "txt"];

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DocumentInfo {
    pub title: String,
    pub author: String,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DocumentError {
    #[error("unsupported document format")]
    Unsupported,
    #[error("document is corrupt: {0}")]
    Corrupt(String),
    #[error("document has no cover image")]
    NoCover,
    #[error("cover image could not be decoded")]
    Decode,
    #[error("storage error")]
    Storage,
}

/// Format-specific parsing lives behind this trait. Storage is handed in so
/// every read and write goes through the one shared volume.
pub trait DocumentSource {
    fn load<F: Filesystem>(&mut self, fs: &F, path: &str) -> Result<DocumentInfo, DocumentError>;

    /// Where the cover thumbnail for `path` lives, whether or not it exists yet.
    fn thumbnail_path(&self, path: &str) -> String;

    /// Renders the cover of `path` to [`DocumentSource::thumbnail_path`].
    fn generate_thumbnail<F: Filesystem>(
        &mut self,
        fs: &F,
        path: &str,
    ) -> Result<(), DocumentError>;
}

pub fn thumbnail_path_in(cover_dir: &str, path: &str) -> String {
    format!(
        "{}/thumb_{}.bmp",
        cover_dir.trim_end_matches('/'),
        thumb_hash_hex(path)
    )
}

fn thumb_hash_hex(key: &str) -> String {
    let mut hash: u32 = 0x811c9dc5;
    for b in key.as_bytes() {
        hash ^= *b as u32;
        hash = hash.wrapping_mul(0x01000193);
    }
    format!("{:08x}", hash)
}
