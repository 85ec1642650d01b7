//! In-memory storage and a scripted document source for unit tests.

use core::cell::{Cell, RefCell};

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use embedded_io::{ErrorKind, ErrorType, Read, Write};

use crate::document::{DocumentError, DocumentInfo, DocumentSource, thumbnail_path_in};
use crate::fs::{self, DirEntry, File, Filesystem, Mode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemFsError {
    NotFound,
    Unavailable,
}

impl embedded_io::Error for MemFsError {
    fn kind(&self) -> ErrorKind {
        match self {
            MemFsError::NotFound => ErrorKind::NotFound,
            MemFsError::Unavailable => ErrorKind::Other,
        }
    }
}

#[derive(Default)]
pub struct MemFs {
    files: RefCell<BTreeMap<String, Vec<u8>>>,
    dirs: RefCell<BTreeSet<String>>,
    pub fail_writes: Cell<bool>,
    pub writes: Cell<usize>,
}

impl MemFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&self, path: &str, data: &[u8]) {
        self.create_dir_all(fs::parent_dir(path)).ok();
        self.files.borrow_mut().insert(path.to_string(), data.to_vec());
    }

    pub fn add_dir(&self, path: &str) {
        self.create_dir_all(path).ok();
    }

    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        self.files.borrow().get(path).cloned()
    }

    fn dir_exists(&self, path: &str) -> bool {
        path == "/" || self.dirs.borrow().contains(path)
    }
}

pub struct MemFile<'a> {
    fs: &'a MemFs,
    path: String,
    data: Vec<u8>,
    pos: usize,
}

impl ErrorType for MemFs {
    type Error = MemFsError;
}

impl ErrorType for MemFile<'_> {
    type Error = MemFsError;
}

impl Read for MemFile<'_> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let remaining = &self.data[self.pos.min(self.data.len())..];
        let len = remaining.len().min(buf.len());
        buf[..len].copy_from_slice(&remaining[..len]);
        self.pos += len;
        Ok(len)
    }
}

impl Write for MemFile<'_> {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.data.extend_from_slice(buf);
        self.fs
            .files
            .borrow_mut()
            .insert(self.path.clone(), self.data.clone());
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl File for MemFile<'_> {
    fn size(&self) -> usize {
        self.data.len()
    }
}

impl Filesystem for MemFs {
    type File<'a> = MemFile<'a>;

    fn open_file(&self, path: &str, mode: Mode) -> Result<Self::File<'_>, Self::Error> {
        match mode {
            Mode::Read => {
                let data = self
                    .files
                    .borrow()
                    .get(path)
                    .cloned()
                    .ok_or(MemFsError::NotFound)?;
                Ok(MemFile {
                    fs: self,
                    path: path.to_string(),
                    data,
                    pos: 0,
                })
            }
            Mode::Write => {
                if self.fail_writes.get() {
                    return Err(MemFsError::Unavailable);
                }
                if !self.dir_exists(fs::parent_dir(path)) {
                    return Err(MemFsError::NotFound);
                }
                self.writes.set(self.writes.get() + 1);
                self.files.borrow_mut().insert(path.to_string(), Vec::new());
                Ok(MemFile {
                    fs: self,
                    path: path.to_string(),
                    data: Vec::new(),
                    pos: 0,
                })
            }
        }
    }

    fn exists(&self, path: &str) -> Result<bool, Self::Error> {
        Ok(self.files.borrow().contains_key(path) || self.dir_exists(path))
    }

    fn create_dir_all(&self, path: &str) -> Result<(), Self::Error> {
        let mut dirs = self.dirs.borrow_mut();
        let mut current = String::new();
        for part in path.split('/').filter(|part| !part.is_empty()) {
            current.push('/');
            current.push_str(part);
            dirs.insert(current.clone());
        }
        Ok(())
    }

    fn remove(&self, path: &str) -> Result<(), Self::Error> {
        self.files
            .borrow_mut()
            .remove(path)
            .map(|_| ())
            .ok_or(MemFsError::NotFound)
    }

    fn list_dir(&self, path: &str) -> Result<Vec<DirEntry>, Self::Error> {
        if !self.dir_exists(path) {
            return Err(MemFsError::NotFound);
        }
        let prefix = if path == "/" {
            String::from("/")
        } else {
            let mut prefix = path.to_string();
            prefix.push('/');
            prefix
        };
        let mut entries = Vec::new();
        for dir in self.dirs.borrow().iter() {
            if let Some(name) = dir.strip_prefix(prefix.as_str()) {
                if !name.is_empty() && !name.contains('/') {
                    entries.push(DirEntry {
                        name: name.to_string(),
                        is_directory: true,
                        size: 0,
                    });
                }
            }
        }
        for (file, data) in self.files.borrow().iter() {
            if let Some(name) = file.strip_prefix(prefix.as_str()) {
                if !name.contains('/') {
                    entries.push(DirEntry {
                        name: name.to_string(),
                        is_directory: false,
                        size: data.len(),
                    });
                }
            }
        }
        Ok(entries)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Script {
    Cover,
    NoCover,
    Corrupt,
    /// Reports success without writing anything.
    Phantom,
}

/// Document source whose per-path behaviour is scripted up front and whose
/// calls are counted.
pub struct MockDocuments {
    pub scripts: BTreeMap<String, Script>,
    pub loads: usize,
    pub generations: Vec<String>,
}

impl MockDocuments {
    pub fn new() -> Self {
        Self {
            scripts: BTreeMap::new(),
            loads: 0,
            generations: Vec::new(),
        }
    }

    pub fn script(mut self, path: &str, script: Script) -> Self {
        self.scripts.insert(path.to_string(), script);
        self
    }
}

impl DocumentSource for MockDocuments {
    fn load<F: Filesystem>(&mut self, _fs: &F, path: &str) -> Result<DocumentInfo, DocumentError> {
        self.loads += 1;
        match self.scripts.get(path) {
            Some(Script::Corrupt) => Err(DocumentError::Corrupt("bad zip".to_string())),
            _ => Ok(DocumentInfo {
                title: fs::basename(path).to_string(),
                author: "Author".to_string(),
            }),
        }
    }

    fn thumbnail_path(&self, path: &str) -> String {
        thumbnail_path_in("/cover", path)
    }

    fn generate_thumbnail<F: Filesystem>(
        &mut self,
        fs: &F,
        path: &str,
    ) -> Result<(), DocumentError> {
        self.generations.push(path.to_string());
        match self.scripts.get(path).copied().unwrap_or(Script::NoCover) {
            Script::Cover => {
                let data = bmp_24(4, 4, |x, y| if (x + y) % 2 == 0 { 0 } else { 255 });
                fs::write_all(fs, &self.thumbnail_path(path), &data)
                    .map_err(|_| DocumentError::Storage)
            }
            Script::Phantom => Ok(()),
            Script::NoCover => Err(DocumentError::NoCover),
            Script::Corrupt => Err(DocumentError::Decode),
        }
    }
}

/// Bottom-up 24 bpp BMP with a gray value per pixel.
pub fn bmp_24(width: u32, height: u32, gray: impl Fn(u32, u32) -> u8) -> Vec<u8> {
    let stride = ((width * 24 + 31) / 32 * 4) as usize;
    let pixel_len = stride * height as usize;
    let mut data = Vec::with_capacity(54 + pixel_len);
    data.extend_from_slice(b"BM");
    data.extend_from_slice(&((54 + pixel_len) as u32).to_le_bytes());
    data.extend_from_slice(&[0u8; 4]);
    data.extend_from_slice(&54u32.to_le_bytes());
    data.extend_from_slice(&40u32.to_le_bytes());
    data.extend_from_slice(&(width as i32).to_le_bytes());
    data.extend_from_slice(&(height as i32).to_le_bytes());
    data.extend_from_slice(&1u16.to_le_bytes());
    data.extend_from_slice(&24u16.to_le_bytes());
    data.extend_from_slice(&[0u8; 24]);
    for row in (0..height).rev() {
        let mut line = Vec::with_capacity(stride);
        for x in 0..width {
            let value = gray(x, row);
            line.extend_from_slice(&[value, value, value]);
        }
        line.resize(stride, 0);
        data.extend_from_slice(&line);
    }
    data
}
