//! Most-recently-opened documents, persisted on every change.
//!
//! File layout (little endian), current version:
//!
//! ```text
//! [version:u8 = 2][count:u8] count × { path, title, author, progress:i32 }
//! ```
//!
//! Strings are a `u32` byte length followed by UTF-8. The legacy version 1 file
//! stores only paths and is read once when the current file is missing.

extern crate alloc;

use alloc::string::{String, ToString};
use alloc::vec::Vec;

use thiserror::Error;

use crate::fs::{self, Filesystem};

pub const RECENT_CAPACITY: usize = 10;
pub const RECENT_FILE_VERSION: u8 = 2;
pub const LEGACY_FILE_VERSION: u8 = 1;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecentEntry {
    pub path: String,
    pub title: String,
    pub author: String,
    /// Percent read, 0..=100.
    pub progress: u8,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RecentStoreError {
    #[error("storage unavailable")]
    StorageUnavailable,
    #[error("unknown recent entries version {0}")]
    VersionMismatch(u8),
    #[error("recent entries file is truncated")]
    Truncated,
    #[error("recent entries file holds invalid text")]
    InvalidText,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOrigin {
    Current,
    /// Migrated in memory from the version 1 file.
    Legacy,
    /// Neither file exists yet.
    Empty,
}

pub struct RecentEntryStore {
    entries: Vec<RecentEntry>,
    file_path: String,
    legacy_path: String,
}

impl RecentEntryStore {
    pub fn new(file_path: &str, legacy_path: &str) -> Self {
        Self {
            entries: Vec::new(),
            file_path: file_path.to_string(),
            legacy_path: legacy_path.to_string(),
        }
    }

    /// Most recent first.
    pub fn books(&self) -> &[RecentEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forgets every entry in memory; call [`RecentEntryStore::save`] to persist.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Moves `path` to the front, creating it when new. An existing entry keeps
    /// its stored metadata and progress.
    pub fn add_book<F: Filesystem>(
        &mut self,
        fs: &F,
        path: &str,
        title: &str,
        author: &str,
    ) -> Result<(), RecentStoreError> {
        let entry = match self.entries.iter().position(|entry| entry.path == path) {
            Some(index) => self.entries.remove(index),
            None => RecentEntry {
                path: path.to_string(),
                title: title.to_string(),
                author: author.to_string(),
                progress: 0,
            },
        };
        self.entries.insert(0, entry);
        self.entries.truncate(RECENT_CAPACITY);
        self.save(fs)
    }

    /// Updates progress in place, or inserts a new front entry when `path` is
    /// unknown. Empty or missing metadata never overwrites what is stored.
    pub fn update_progress<F: Filesystem>(
        &mut self,
        fs: &F,
        path: &str,
        progress: i32,
        title: Option<&str>,
        author: Option<&str>,
    ) -> Result<(), RecentStoreError> {
        let progress = progress.clamp(0, 100) as u8;
        let title = title.filter(|title| !title.is_empty());
        let author = author.filter(|author| !author.is_empty());
        if let Some(entry) = self.entries.iter_mut().find(|entry| entry.path == path) {
            entry.progress = progress;
            if let Some(title) = title {
                entry.title = title.to_string();
            }
            if let Some(author) = author {
                entry.author = author.to_string();
            }
        } else {
            self.entries.insert(
                0,
                RecentEntry {
                    path: path.to_string(),
                    title: title.unwrap_or_default().to_string(),
                    author: author.unwrap_or_default().to_string(),
                    progress,
                },
            );
            self.entries.truncate(RECENT_CAPACITY);
        }
        self.save(fs)
    }

    pub fn save<F: Filesystem>(&self, fs: &F) -> Result<(), RecentStoreError> {
        fs.create_dir_all(fs::parent_dir(&self.file_path)).ok();
        let data = encode(&self.entries);
        fs::write_all(fs, &self.file_path, &data).map_err(|_| {
            log::warn!("Recent entries not saved to {}", self.file_path);
            RecentStoreError::StorageUnavailable
        })?;
        log::info!("Recent entries saved ({} entries)", self.entries.len());
        Ok(())
    }

    /// Replaces the in-memory list with what is on storage. On any error the
    /// store is left empty.
    pub fn load<F: Filesystem>(&mut self, fs: &F) -> Result<LoadOrigin, RecentStoreError> {
        self.entries.clear();
        let current = fs
            .exists(&self.file_path)
            .map_err(|_| RecentStoreError::StorageUnavailable)?;
        if current {
            let data = fs::read_all(fs, &self.file_path)
                .map_err(|_| RecentStoreError::StorageUnavailable)?;
            self.entries = decode(&data).inspect_err(|err| {
                log::warn!("Recent entries discarded: {}", err);
            })?;
            log::info!("Recent entries loaded ({} entries)", self.entries.len());
            return Ok(LoadOrigin::Current);
        }

        if !fs::exists_or_false(fs, &self.legacy_path) {
            return Ok(LoadOrigin::Empty);
        }
        let data = fs::read_all(fs, &self.legacy_path)
            .map_err(|_| RecentStoreError::StorageUnavailable)?;
        self.entries = decode_legacy(&data)?;
        log::info!(
            "Recent entries migrated from legacy file ({} entries)",
            self.entries.len()
        );
        Ok(LoadOrigin::Legacy)
    }
}

pub fn encode(entries: &[RecentEntry]) -> Vec<u8> {
    let entries = &entries[..entries.len().min(RECENT_CAPACITY)];
    let mut out = Vec::new();
    out.push(RECENT_FILE_VERSION);
    out.push(entries.len() as u8);
    for entry in entries {
        write_string(&mut out, &entry.path);
        write_string(&mut out, &entry.title);
        write_string(&mut out, &entry.author);
        out.extend_from_slice(&(entry.progress as i32).to_le_bytes());
    }
    out
}

pub fn decode(data: &[u8]) -> Result<Vec<RecentEntry>, RecentStoreError> {
    let mut reader = Reader::new(data);
    let version = reader.u8()?;
    if version != RECENT_FILE_VERSION {
        return Err(RecentStoreError::VersionMismatch(version));
    }
    let count = reader.u8()?;
    let mut entries: Vec<RecentEntry> = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let path = reader.string()?;
        let title = reader.string()?;
        let author = reader.string()?;
        let progress = reader.i32()?.clamp(0, 100) as u8;
        push_unique(
            &mut entries,
            RecentEntry {
                path,
                title,
                author,
                progress,
            },
        );
    }
    entries.truncate(RECENT_CAPACITY);
    Ok(entries)
}

fn decode_legacy(data: &[u8]) -> Result<Vec<RecentEntry>, RecentStoreError> {
    let mut reader = Reader::new(data);
    let version = reader.u8()?;
    if version != LEGACY_FILE_VERSION {
        return Err(RecentStoreError::VersionMismatch(version));
    }
    let count = reader.u8()?;
    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let path = reader.string()?;
        push_unique(
            &mut entries,
            RecentEntry {
                path,
                ..RecentEntry::default()
            },
        );
    }
    entries.truncate(RECENT_CAPACITY);
    Ok(entries)
}

fn push_unique(entries: &mut Vec<RecentEntry>, entry: RecentEntry) {
    if !entries.iter().any(|existing| existing.path == entry.path) {
        entries.push(entry);
    }
}

fn write_string(out: &mut Vec<u8>, value: &str) {
    out.extend_from_slice(&(value.len() as u32).to_le_bytes());
    out.extend_from_slice(value.as_bytes());
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], RecentStoreError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or(RecentStoreError::Truncated)?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn u8(&mut self) -> Result<u8, RecentStoreError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, RecentStoreError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn i32(&mut self) -> Result<i32, RecentStoreError> {
        Ok(self.u32()? as i32)
    }

    fn string(&mut self) -> Result<String, RecentStoreError> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        core::str::from_utf8(bytes)
            .map(|text| text.to_string())
            .map_err(|_| RecentStoreError::InvalidText)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemFs;
    use alloc::format;

    const FILE: &str = "/.library/recent_v2.bin";
    const LEGACY: &str = "/.library/recent.bin";

    fn store() -> RecentEntryStore {
        RecentEntryStore::new(FILE, LEGACY)
    }

    fn reloaded(fs: &MemFs) -> Vec<RecentEntry> {
        let mut fresh = store();
        assert_eq!(fresh.load(fs), Ok(LoadOrigin::Current));
        fresh.books().to_vec()
    }

    #[test]
    fn eleven_distinct_books_keep_ten_newest_first() {
        let fs = MemFs::new();
        let mut recent = store();
        for i in 0..11 {
            recent
                .add_book(&fs, &format!("/books/{i}.epub"), "", "")
                .unwrap();
        }
        assert_eq!(recent.len(), 10);
        assert_eq!(recent.books()[0].path, "/books/10.epub");
        assert!(!recent.books().iter().any(|e| e.path == "/books/0.epub"));
        assert_eq!(reloaded(&fs), recent.books());
    }

    #[test]
    fn re_adding_moves_to_front_and_keeps_progress() {
        let fs = MemFs::new();
        let mut recent = store();
        recent.add_book(&fs, "/a.epub", "A", "Ann").unwrap();
        recent.update_progress(&fs, "/a.epub", 42, None, None).unwrap();
        recent.add_book(&fs, "/b.epub", "B", "Bob").unwrap();
        recent.add_book(&fs, "/a.epub", "Other", "Other").unwrap();

        let books = recent.books();
        assert_eq!(books.len(), 2);
        assert_eq!(books[0].path, "/a.epub");
        assert_eq!(books[0].title, "A");
        assert_eq!(books[0].progress, 42);
        assert_eq!(books[1].path, "/b.epub");
    }

    #[test]
    fn update_progress_overrides_only_non_empty_metadata() {
        let fs = MemFs::new();
        let mut recent = store();
        recent.add_book(&fs, "/a.epub", "A", "Ann").unwrap();
        recent
            .update_progress(&fs, "/a.epub", 150, Some(""), Some("Anna"))
            .unwrap();
        assert_eq!(recent.books()[0].title, "A");
        assert_eq!(recent.books()[0].author, "Anna");
        assert_eq!(recent.books()[0].progress, 100);

        recent
            .update_progress(&fs, "/new.txt", -3, Some("New"), None)
            .unwrap();
        assert_eq!(recent.books()[0].path, "/new.txt");
        assert_eq!(recent.books()[0].progress, 0);
        assert_eq!(recent.books()[0].title, "New");
        assert_eq!(reloaded(&fs), recent.books());
    }

    #[test]
    fn every_mutation_writes_through() {
        let fs = MemFs::new();
        let mut recent = store();
        recent.add_book(&fs, "/a.epub", "", "").unwrap();
        recent.update_progress(&fs, "/a.epub", 5, None, None).unwrap();
        recent.add_book(&fs, "/b.epub", "", "").unwrap();
        assert_eq!(fs.writes.get(), 3);
    }

    #[test]
    fn write_failure_keeps_memory_and_reports() {
        let fs = MemFs::new();
        let mut recent = store();
        fs.fail_writes.set(true);
        assert_eq!(
            recent.add_book(&fs, "/a.epub", "A", ""),
            Err(RecentStoreError::StorageUnavailable)
        );
        assert_eq!(recent.len(), 1);
        assert_eq!(recent.books()[0].title, "A");
    }

    #[test]
    fn mixed_operations_stay_bounded_and_unique_after_reload() {
        let fs = MemFs::new();
        let mut recent = store();
        for step in 0..40u32 {
            let path = format!("/books/{}.epub", (step * 7) % 13);
            if step % 3 == 0 {
                recent
                    .update_progress(&fs, &path, step as i32, Some("t"), None)
                    .unwrap();
            } else {
                recent.add_book(&fs, &path, "", "").unwrap();
            }
            let books = recent.books();
            assert!(books.len() <= RECENT_CAPACITY);
            for (i, entry) in books.iter().enumerate() {
                assert!(books[i + 1..].iter().all(|other| other.path != entry.path));
            }
        }
        assert_eq!(reloaded(&fs), recent.books());
    }

    #[test]
    fn encoding_round_trips_arbitrary_lists() {
        for count in [0usize, 1, 4, 10] {
            let entries: Vec<RecentEntry> = (0..count)
                .map(|i| RecentEntry {
                    path: format!("/books/é{i}.epub"),
                    title: format!("Title {i}"),
                    author: if i % 2 == 0 { String::new() } else { format!("Author {i}") },
                    progress: (i * 11) as u8,
                })
                .collect();
            assert_eq!(decode(&encode(&entries)), Ok(entries));
        }
    }

    #[test]
    fn version_mismatch_leaves_store_empty() {
        let fs = MemFs::new();
        let mut data = encode(&[RecentEntry {
            path: "/a.epub".into(),
            ..RecentEntry::default()
        }]);
        data[0] = 3;
        fs.add_file(FILE, &data);
        let mut recent = store();
        assert_eq!(recent.load(&fs), Err(RecentStoreError::VersionMismatch(3)));
        assert!(recent.is_empty());
    }

    #[test]
    fn truncated_file_is_rejected() {
        let fs = MemFs::new();
        let data = encode(&[RecentEntry {
            path: "/a.epub".into(),
            ..RecentEntry::default()
        }]);
        fs.add_file(FILE, &data[..data.len() - 2]);
        let mut recent = store();
        assert_eq!(recent.load(&fs), Err(RecentStoreError::Truncated));
        assert!(recent.is_empty());
    }

    #[test]
    fn legacy_file_migrates_without_rewriting() {
        let fs = MemFs::new();
        let mut data = vec![LEGACY_FILE_VERSION, 2];
        write_string(&mut data, "/books/one.epub");
        write_string(&mut data, "/books/two.txt");
        fs.add_file(LEGACY, &data);

        let mut recent = store();
        assert_eq!(recent.load(&fs), Ok(LoadOrigin::Legacy));
        assert_eq!(recent.len(), 2);
        for entry in recent.books() {
            assert!(entry.title.is_empty());
            assert!(entry.author.is_empty());
            assert_eq!(entry.progress, 0);
        }
        assert_eq!(recent.books()[0].path, "/books/one.epub");
        assert!(fs.contents(FILE).is_none());
        assert_eq!(fs.writes.get(), 0);
    }

    #[test]
    fn missing_files_mean_empty_store() {
        let fs = MemFs::new();
        let mut recent = store();
        assert_eq!(recent.load(&fs), Ok(LoadOrigin::Empty));
        assert!(recent.is_empty());
    }
}
