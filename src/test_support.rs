//! In-memory EPUB fixtures shared by the unit tests.

use crate::services::archive::EpubArchive;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const CONTAINER_XML: &str = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

pub fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, body) in entries {
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        writer.start_file(*name, options).unwrap();
        writer.write_all(body.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

pub fn stored_epub(entries: &[(&str, &str)]) -> EpubArchive<Cursor<Vec<u8>>> {
    EpubArchive::from_reader(Cursor::new(zip_bytes(entries)), "fixture.epub").unwrap()
}

/// XHTML page with one `<p>` per paragraph.
pub fn xhtml(paragraphs: &[&str]) -> String {
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<p>{}</p>\n", p))
        .collect();
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<html xmlns=\"http://www.w3.org/1999/xhtml\">\n<head><title>t</title></head>\n<body>\n{}</body>\n</html>",
        body
    )
}

/// Package document listing `files` (relative to OEBPS/) in the spine and
/// `toc` as the navigation resource.
pub fn opf(files: &[&str], toc: &str, is_nav: bool) -> String {
    let mut manifest = String::new();
    let mut spine = String::new();
    for (i, file) in files.iter().enumerate() {
        manifest.push_str(&format!(
            "    <item id=\"f{}\" href=\"{}\" media-type=\"application/xhtml+xml\"/>\n",
            i, file
        ));
        spine.push_str(&format!("    <itemref idref=\"f{}\"/>\n", i));
    }
    let (toc_item, spine_attr) = if is_nav {
        (
            format!(
                "    <item id=\"toc\" href=\"{}\" media-type=\"application/xhtml+xml\" properties=\"nav\"/>\n",
                toc
            ),
            String::new(),
        )
    } else {
        (
            format!(
                "    <item id=\"toc\" href=\"{}\" media-type=\"application/x-dtbncx+xml\"/>\n",
                toc
            ),
            " toc=\"toc\"".to_string(),
        )
    };
    format!(
        "<?xml version=\"1.0\"?>\n<package xmlns=\"http://www.idpf.org/2007/opf\" version=\"3.0\">\n  <manifest>\n{}{}  </manifest>\n  <spine{}>\n{}  </spine>\n</package>",
        toc_item, manifest, spine_attr, spine
    )
}

/// Navigation document with a flat list of `(title, href)` links.
pub fn nav(links: &[(&str, &str)]) -> String {
    let items: String = links
        .iter()
        .map(|(title, href)| format!("      <li><a href=\"{}\">{}</a></li>\n", href, title))
        .collect();
    format!(
        "<?xml version=\"1.0\"?>\n<html xmlns=\"http://www.w3.org/1999/xhtml\" xmlns:epub=\"http://www.idpf.org/2007/ops\">\n<body>\n  <nav epub:type=\"toc\">\n    <ol>\n{}    </ol>\n  </nav>\n</body>\n</html>",
        items
    )
}

/// A paragraph of roughly `chars` characters.
pub fn filler(word: &str, chars: usize) -> String {
    let mut text = String::new();
    while text.len() < chars {
        if !text.is_empty() {
            text.push(' ');
        }
        text.push_str(word);
    }
    text
}
