use std::fs::{self, OpenOptions};
use std::io::{self, Read as _, Write as _};
use std::path::{Component, Path, PathBuf};

use embedded_io::{ErrorKind, ErrorType, Read, Write};
use tern_library_core::fs::{DirEntry, File, Filesystem, Mode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DesktopFsError {
    #[error("path leaves the library root: {0}")]
    OutsideRoot(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl embedded_io::Error for DesktopFsError {
    fn kind(&self) -> ErrorKind {
        match self {
            DesktopFsError::OutsideRoot(_) => ErrorKind::InvalidInput,
            DesktopFsError::Io(err) => match err.kind() {
                io::ErrorKind::NotFound => ErrorKind::NotFound,
                io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
                io::ErrorKind::AlreadyExists => ErrorKind::AlreadyExists,
                _ => ErrorKind::Other,
            },
        }
    }
}

/// A host directory standing in for the SD card. Volume paths such as
/// `/books/a.epub` resolve below `root`.
pub struct DesktopFs {
    root: PathBuf,
}

impl DesktopFs {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, DesktopFsError> {
        let relative = Path::new(path.trim_start_matches('/'));
        if relative
            .components()
            .any(|part| !matches!(part, Component::Normal(_) | Component::CurDir))
        {
            return Err(DesktopFsError::OutsideRoot(path.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

pub struct DesktopFile {
    file: fs::File,
    size: usize,
}

impl ErrorType for DesktopFs {
    type Error = DesktopFsError;
}

impl ErrorType for DesktopFile {
    type Error = DesktopFsError;
}

impl Read for DesktopFile {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        Ok(self.file.read(buf)?)
    }
}

impl Write for DesktopFile {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        let written = self.file.write(buf)?;
        self.size += written;
        Ok(written)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(self.file.flush()?)
    }
}

impl File for DesktopFile {
    fn size(&self) -> usize {
        self.size
    }
}

impl Filesystem for DesktopFs {
    type File<'a> = DesktopFile;

    fn open_file(&self, path: &str, mode: Mode) -> Result<Self::File<'_>, Self::Error> {
        let full = self.resolve(path)?;
        let file = match mode {
            Mode::Read => fs::File::open(&full)?,
            Mode::Write => OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&full)?,
        };
        let size = match mode {
            Mode::Read => file.metadata()?.len() as usize,
            Mode::Write => 0,
        };
        Ok(DesktopFile { file, size })
    }

    fn exists(&self, path: &str) -> Result<bool, Self::Error> {
        Ok(self.resolve(path)?.try_exists()?)
    }

    fn create_dir_all(&self, path: &str) -> Result<(), Self::Error> {
        Ok(fs::create_dir_all(self.resolve(path)?)?)
    }

    fn remove(&self, path: &str) -> Result<(), Self::Error> {
        Ok(fs::remove_file(self.resolve(path)?)?)
    }

    fn list_dir(&self, path: &str) -> Result<Vec<DirEntry>, Self::Error> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(self.resolve(path)?)? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().to_string(),
                is_directory: metadata.is_dir(),
                size: metadata.len() as usize,
            });
        }
        Ok(entries)
    }
}
