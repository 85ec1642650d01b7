use std::io::{Cursor, Read};

use image::{DynamicImage, ImageFormat};
use log::debug;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tern_library_core::document::{
    DocumentError, DocumentInfo, DocumentSource, thumbnail_path_in,
};
use tern_library_core::fs::{self, Filesystem};
use zip::ZipArchive;

const THUMB_WIDTH: u32 = 200;
const THUMB_HEIGHT: u32 = 330;

/// EPUB metadata and cover rendering for the desktop host. Other formats get
/// their file stem as a title and no cover.
pub struct DesktopDocuments {
    cover_dir: String,
}

impl DesktopDocuments {
    pub fn new(cover_dir: &str) -> Self {
        Self {
            cover_dir: cover_dir.to_string(),
        }
    }
}

impl DocumentSource for DesktopDocuments {
    fn load<F: Filesystem>(&mut self, fs: &F, path: &str) -> Result<DocumentInfo, DocumentError> {
        if !fs::has_extension(path, &["epub"]) {
            return Ok(DocumentInfo {
                title: file_stem(path).to_string(),
                author: String::new(),
            });
        }
        let mut epub = Epub::open(fs, path)?;
        let mut info = epub.package()?.info;
        if info.title.is_empty() {
            info.title = file_stem(path).to_string();
        }
        Ok(info)
    }

    fn thumbnail_path(&self, path: &str) -> String {
        thumbnail_path_in(&self.cover_dir, path)
    }

    fn generate_thumbnail<F: Filesystem>(
        &mut self,
        fs: &F,
        path: &str,
    ) -> Result<(), DocumentError> {
        if !fs::has_extension(path, &["epub"]) {
            return Err(DocumentError::Unsupported);
        }
        let mut epub = Epub::open(fs, path)?;
        let package = epub.package()?;
        let cover = package.cover_href.ok_or(DocumentError::NoCover)?;
        let data = epub.entry(&cover)?;

        let image = image::load_from_memory(&data).map_err(|_| DocumentError::Decode)?;
        let thumb = DynamicImage::ImageRgb8(image.thumbnail(THUMB_WIDTH, THUMB_HEIGHT).to_rgb8());
        let mut bmp = Vec::new();
        thumb
            .write_to(&mut Cursor::new(&mut bmp), ImageFormat::Bmp)
            .map_err(|_| DocumentError::Decode)?;

        let target = self.thumbnail_path(path);
        fs.create_dir_all(fs::parent_dir(&target))
            .map_err(|_| DocumentError::Storage)?;
        fs::write_all(fs, &target, &bmp).map_err(|_| DocumentError::Storage)?;
        debug!(
            "Cover for {} written to {} ({}x{})",
            path,
            target,
            thumb.width(),
            thumb.height()
        );
        Ok(())
    }
}

fn file_stem(path: &str) -> &str {
    let name = fs::basename(path);
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}

struct Epub {
    archive: ZipArchive<Cursor<Vec<u8>>>,
}

struct Package {
    info: DocumentInfo,
    cover_href: Option<String>,
}

impl Epub {
    fn open<F: Filesystem>(fs: &F, path: &str) -> Result<Self, DocumentError> {
        let data = fs::read_all(fs, path).map_err(|_| DocumentError::Storage)?;
        let archive = ZipArchive::new(Cursor::new(data))
            .map_err(|err| DocumentError::Corrupt(err.to_string()))?;
        Ok(Self { archive })
    }

    fn entry(&mut self, name: &str) -> Result<Vec<u8>, DocumentError> {
        let mut file = self
            .archive
            .by_name(name)
            .map_err(|err| DocumentError::Corrupt(format!("{}: {}", name, err)))?;
        let mut out = Vec::new();
        file.read_to_end(&mut out)
            .map_err(|err| DocumentError::Corrupt(format!("{}: {}", name, err)))?;
        Ok(out)
    }

    fn text_entry(&mut self, name: &str) -> Result<String, DocumentError> {
        let data = self.entry(name)?;
        Ok(String::from_utf8_lossy(&data).into_owned())
    }

    fn package(&mut self) -> Result<Package, DocumentError> {
        let container = self.text_entry("META-INF/container.xml")?;
        let opf_path = rootfile_path(&container)
            .ok_or_else(|| DocumentError::Corrupt("container has no rootfile".to_string()))?;
        let opf = self.text_entry(&opf_path)?;
        let parsed = parse_opf(&opf)?;
        let base = match opf_path.rfind('/') {
            Some(pos) => &opf_path[..pos],
            None => "",
        };
        Ok(Package {
            info: parsed.info,
            cover_href: parsed.cover_href.map(|href| resolve_href(base, &href)),
        })
    }
}

fn attribute(element: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == name)
        .map(|attr| String::from_utf8_lossy(&attr.value).into_owned())
}

fn rootfile_path(container: &str) -> Option<String> {
    let mut reader = Reader::from_str(container);
    reader.config_mut().trim_text(true);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"rootfile" {
                    if let Some(path) = attribute(&e, b"full-path") {
                        return Some(path);
                    }
                }
            }
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
    }
}

#[derive(Default)]
struct ManifestItem {
    id: String,
    href: String,
    properties: String,
}

#[derive(Default)]
struct OpfMetadata {
    info: DocumentInfo,
    cover_href: Option<String>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum TextField {
    None,
    Title,
    Creator,
}

fn parse_opf(opf: &str) -> Result<OpfMetadata, DocumentError> {
    let mut reader = Reader::from_str(opf);

    let mut out = OpfMetadata::default();
    let mut manifest = Vec::new();
    let mut cover_id = None;
    let mut field = TextField::None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"title" if out.info.title.is_empty() => field = TextField::Title,
                b"creator" if out.info.author.is_empty() => field = TextField::Creator,
                b"meta" => read_cover_meta(&e, &mut cover_id),
                b"item" => manifest.push(manifest_item(&e)),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"meta" => read_cover_meta(&e, &mut cover_id),
                b"item" => manifest.push(manifest_item(&e)),
                _ => {}
            },
            Ok(Event::Text(text)) => {
                let value = String::from_utf8_lossy(&text);
                match field {
                    TextField::Title => out.info.title.push_str(&value),
                    TextField::Creator => out.info.author.push_str(&value),
                    TextField::None => {}
                }
            }
            Ok(Event::End(_)) => field = TextField::None,
            Ok(Event::Eof) => break,
            Err(err) => return Err(DocumentError::Corrupt(err.to_string())),
            _ => {}
        }
    }

    // EPUB 2 meta pointer first, then the EPUB 3 property, then the common id.
    let cover = cover_id
        .as_deref()
        .and_then(|id| manifest.iter().find(|item| item.id == id))
        .or_else(|| {
            manifest.iter().find(|item| {
                item.properties
                    .split_whitespace()
                    .any(|prop| prop == "cover-image")
            })
        })
        .or_else(|| manifest.iter().find(|item| item.id == "cover"));
    out.cover_href = cover.map(|item| item.href.clone());
    out.info.title = out.info.title.trim().to_string();
    out.info.author = out.info.author.trim().to_string();
    Ok(out)
}

fn read_cover_meta(element: &BytesStart<'_>, cover_id: &mut Option<String>) {
    if cover_id.is_some() {
        return;
    }
    if attribute(element, b"name").as_deref() == Some("cover") {
        *cover_id = attribute(element, b"content");
    }
}

fn manifest_item(element: &BytesStart<'_>) -> ManifestItem {
    ManifestItem {
        id: attribute(element, b"id").unwrap_or_default(),
        href: attribute(element, b"href").unwrap_or_default(),
        properties: attribute(element, b"properties").unwrap_or_default(),
    }
}

/// Resolves a manifest href against the OPF directory, folding `.` and `..`.
fn resolve_href(base: &str, href: &str) -> String {
    let href = href.split('#').next().unwrap_or(href);
    let mut parts: Vec<&str> = base.split('/').filter(|part| !part.is_empty()).collect();
    for part in href.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}
