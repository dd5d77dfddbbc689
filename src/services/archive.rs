use crate::error::{EpubChapterError, Result};
use crate::services::xml::{self, decode_text};
use percent_encoding::percent_decode_str;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;
use tracing::debug;
use zip::result::ZipError;
use zip::ZipArchive;

const CONTAINER_PATH: &str = "META-INF/container.xml";
const FALLBACK_PACKAGE_PATHS: &[&str] = &["content.opf", "OEBPS/content.opf", "OPS/content.opf"];

/// An opened EPUB container. Dropping it releases the underlying file.
pub struct EpubArchive<R: Read + Seek> {
    source: String,
    archive: ZipArchive<R>,
    names: Vec<String>,
    // raw and normalised entry names -> stored name
    lookup: HashMap<String, String>,
}

impl EpubArchive<File> {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| EpubChapterError::Archive {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_reader(file, path.display().to_string())
    }
}

impl<R: Read + Seek> EpubArchive<R> {
    pub fn from_reader(reader: R, source: impl Into<String>) -> Result<Self> {
        let source = source.into();
        let archive = ZipArchive::new(reader).map_err(|e| EpubChapterError::Archive {
            path: source.clone(),
            reason: e.to_string(),
        })?;

        let names: Vec<String> = archive.file_names().map(str::to_string).collect();
        let mut lookup = HashMap::with_capacity(names.len() * 2);
        for name in &names {
            lookup.insert(name.clone(), name.clone());
            lookup
                .entry(normalize_path(&percent_decode(name)))
                .or_insert_with(|| name.clone());
        }

        debug!("Opened {} with {} entries", source, names.len());
        Ok(Self {
            source,
            archive,
            names,
            lookup,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Stored name of the entry matching `path`, tolerating leading slashes
    /// and percent-encoding differences.
    pub fn entry_name(&self, path: &str) -> Option<&str> {
        self.lookup
            .get(path)
            .or_else(|| self.lookup.get(&normalize_path(&percent_decode(path))))
            .map(String::as_str)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entry_name(path).is_some()
    }

    pub fn read_bytes(&mut self, path: &str) -> Result<Vec<u8>> {
        let name = self
            .entry_name(path)
            .ok_or_else(|| EpubChapterError::Archive {
                path: self.source.clone(),
                reason: format!("entry {} not found", path),
            })?
            .to_string();

        let source = self.source.clone();
        let mut entry = self
            .archive
            .by_name(&name)
            .map_err(|e| zip_error(&source, e))?;
        let mut buf = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut buf).map_err(|e| EpubChapterError::Archive {
            path: source.clone(),
            reason: format!("cannot read {}: {}", name, e),
        })?;
        Ok(buf)
    }

    pub fn read_text(&mut self, path: &str) -> Result<String> {
        Ok(decode_text(&self.read_bytes(path)?))
    }

    /// Resolve the package document path: the container descriptor first,
    /// then the well-known locations, then any `.opf` entry.
    pub fn locate_package(&mut self) -> Result<String> {
        if self.contains(CONTAINER_PATH) {
            let container = self.read_bytes(CONTAINER_PATH)?;
            match parse_container_xml(&container) {
                Ok(Some(path)) => match self.entry_name(&path) {
                    Some(name) => return Ok(name.to_string()),
                    None => debug!("container.xml points to missing entry {}", path),
                },
                Ok(None) => debug!("container.xml has no rootfile"),
                Err(e) => debug!("Ignoring unreadable container.xml: {}", e),
            }
        }

        for candidate in FALLBACK_PACKAGE_PATHS {
            if let Some(name) = self.entry_name(candidate) {
                return Ok(name.to_string());
            }
        }

        self.names
            .iter()
            .find(|name| name.to_ascii_lowercase().ends_with(".opf"))
            .cloned()
            .ok_or_else(|| EpubChapterError::PackageNotFound {
                path: self.source.clone(),
            })
    }
}

fn zip_error(source: &str, err: ZipError) -> EpubChapterError {
    EpubChapterError::Archive {
        path: source.to_string(),
        reason: err.to_string(),
    }
}

/// `full-path` of the first `rootfile` in `META-INF/container.xml`.
pub fn parse_container_xml(bytes: &[u8]) -> Result<Option<String>> {
    let content = decode_text(bytes);
    let mut reader = Reader::from_str(&content);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event() {
            Ok(Event::Empty(e)) | Ok(Event::Start(e))
                if xml::local_name(e.name().as_ref()) == b"rootfile" =>
            {
                if let Some(path) = xml::attribute(&e, b"full-path") {
                    if !path.is_empty() {
                        return Ok(Some(path));
                    }
                }
            }
            Ok(Event::Eof) => return Ok(None),
            Err(e) => return Err(xml::malformed(CONTAINER_PATH, e)),
            _ => {}
        }
    }
}

/// Directory part of an archive path, empty at the root.
pub fn parent_dir(path: &str) -> &str {
    path.rfind('/').map(|i| &path[..i]).unwrap_or("")
}

pub fn percent_decode(value: &str) -> String {
    percent_decode_str(value).decode_utf8_lossy().into_owned()
}

/// Collapse `.`/`..`/empty segments and backslashes into a plain archive path.
pub fn normalize_path(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let mut parts: Vec<&str> = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    parts.join("/")
}

/// Resolve the file part of an href against the directory of the document containing it.
pub fn resolve_href(base_dir: &str, href: &str) -> String {
    let href = percent_decode(href).replace('\\', "/");
    if href.starts_with('/') || base_dir.is_empty() {
        normalize_path(&href)
    } else {
        normalize_path(&format!("{}/{}", base_dir, href))
    }
}

/// Split `file#anchor`; an empty fragment counts as no anchor.
pub fn split_href(href: &str) -> (&str, Option<String>) {
    match href.split_once('#') {
        Some((file, fragment)) if !fragment.is_empty() => (file, Some(percent_decode(fragment))),
        Some((file, _)) => (file, None),
        None => (href, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{stored_epub as archive_with, zip_bytes};
    use std::io::Cursor;

    const CONTAINER: &str = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="book/package.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

    #[test]
    fn test_parse_container_xml() {
        let path = parse_container_xml(CONTAINER.as_bytes()).unwrap();
        assert_eq!(path.as_deref(), Some("book/package.opf"));

        let mut with_bom = vec![0xEF, 0xBB, 0xBF];
        with_bom.extend_from_slice(CONTAINER.as_bytes());
        assert_eq!(
            parse_container_xml(&with_bom).unwrap().as_deref(),
            Some("book/package.opf")
        );
    }

    #[test]
    fn test_locate_package_via_container() {
        let mut archive = archive_with(&[
            ("META-INF/container.xml", CONTAINER),
            ("book/package.opf", "<package/>"),
        ]);
        assert_eq!(archive.locate_package().unwrap(), "book/package.opf");
    }

    #[test]
    fn test_locate_package_fallbacks() {
        let mut archive = archive_with(&[("OEBPS/content.opf", "<package/>")]);
        assert_eq!(archive.locate_package().unwrap(), "OEBPS/content.opf");

        // container points nowhere, falls through to the .opf scan
        let mut archive = archive_with(&[
            ("META-INF/container.xml", CONTAINER),
            ("data/Book.OPF", "<package/>"),
        ]);
        assert_eq!(archive.locate_package().unwrap(), "data/Book.OPF");
    }

    #[test]
    fn test_locate_package_missing() {
        let mut archive = archive_with(&[("mimetype", "application/epub+zip")]);
        assert!(matches!(
            archive.locate_package(),
            Err(EpubChapterError::PackageNotFound { .. })
        ));
    }

    #[test]
    fn test_not_a_zip() {
        let result = EpubArchive::from_reader(Cursor::new(b"plain text".to_vec()), "bad.epub");
        assert!(matches!(result, Err(EpubChapterError::Archive { .. })));

        let truncated = zip_bytes(&[("mimetype", "application/epub+zip")]);
        let result = EpubArchive::from_reader(Cursor::new(truncated[..10].to_vec()), "cut.epub");
        assert!(matches!(result, Err(EpubChapterError::Archive { .. })));
    }

    #[test]
    fn test_read_entry_tolerates_encoding() {
        let mut archive = archive_with(&[("OEBPS/Text/wow!.xhtml", "<p>hi</p>")]);
        assert_eq!(archive.read_text("OEBPS/Text/wow%21.xhtml").unwrap(), "<p>hi</p>");
        assert_eq!(archive.read_text("/OEBPS/Text/wow!.xhtml").unwrap(), "<p>hi</p>");
        assert!(archive.read_text("OEBPS/Text/missing.xhtml").is_err());
    }

    #[test]
    fn test_path_helpers() {
        assert_eq!(parent_dir("OEBPS/content.opf"), "OEBPS");
        assert_eq!(parent_dir("content.opf"), "");
        assert_eq!(normalize_path("OEBPS/./Text/../Text//ch1.xhtml"), "OEBPS/Text/ch1.xhtml");
        assert_eq!(resolve_href("OEBPS", "Text\\ch%201.xhtml"), "OEBPS/Text/ch 1.xhtml");
        assert_eq!(resolve_href("OEBPS/nav", "../Text/ch1.xhtml"), "OEBPS/Text/ch1.xhtml");
        assert_eq!(resolve_href("", "ch1.xhtml"), "ch1.xhtml");
        assert_eq!(split_href("ch1.xhtml#sec%202"), ("ch1.xhtml", Some("sec 2".to_string())));
        assert_eq!(split_href("ch1.xhtml#"), ("ch1.xhtml", None));
        assert_eq!(split_href("ch1.xhtml"), ("ch1.xhtml", None));
    }
}
