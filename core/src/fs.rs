use core::result::Result;

use alloc::string::String;
use alloc::vec::Vec;
use embedded_io::{ErrorType, Read, Write};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Read,
    /// Create the file if needed and truncate it.
    Write,
}

/// The single storage volume. Every method blocks the calling thread.
pub trait Filesystem: ErrorType {
    type File<'a>: File<Error = Self::Error>
    where
        Self: 'a;

    fn open_file(&self, path: &str, mode: Mode) -> Result<Self::File<'_>, Self::Error>;
    fn exists(&self, path: &str) -> Result<bool, Self::Error>;
    fn create_dir_all(&self, path: &str) -> Result<(), Self::Error>;
    fn remove(&self, path: &str) -> Result<(), Self::Error>;
    fn list_dir(&self, path: &str) -> Result<Vec<DirEntry>, Self::Error>;
}

pub trait File: Read + Write {
    fn size(&self) -> usize;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub is_directory: bool,
    pub size: usize,
}

impl DirEntry {
    pub fn is_hidden(&self) -> bool {
        self.name.starts_with('.')
    }
}

pub fn read_all<F: Filesystem>(fs: &F, path: &str) -> Result<Vec<u8>, F::Error> {
    let mut file = fs.open_file(path, Mode::Read)?;
    let mut out = Vec::with_capacity(file.size());
    let mut chunk = [0u8; 512];
    loop {
        let read = file.read(&mut chunk)?;
        if read == 0 {
            break;
        }
        out.extend_from_slice(&chunk[..read]);
    }
    Ok(out)
}

pub fn write_all<F: Filesystem>(fs: &F, path: &str, data: &[u8]) -> Result<(), F::Error> {
    let mut file = fs.open_file(path, Mode::Write)?;
    if !data.is_empty() {
        file.write_all(data)?;
    }
    file.flush()?;
    Ok(())
}

/// Missing existence answers count as "absent".
pub fn exists_or_false<F: Filesystem>(fs: &F, path: &str) -> bool {
    fs.exists(path).unwrap_or(false)
}

pub fn join_path(base: &str, name: &str) -> String {
    let mut path = String::from(base);
    if !path.ends_with('/') {
        path.push('/');
    }
    path.push_str(name.trim_start_matches('/'));
    path
}

pub fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(pos) => &path[..pos],
    }
}

pub fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

pub fn has_extension(name: &str, extensions: &[&str]) -> bool {
    let Some((_, ext)) = name.rsplit_once('.') else {
        return false;
    };
    extensions.iter().any(|known| ext.eq_ignore_ascii_case(known))
}
