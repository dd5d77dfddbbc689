use crate::error::EpubChapterError;
use quick_xml::escape::{resolve_predefined_entity, unescape_with};
use quick_xml::events::BytesStart;
use regex::{Captures, Regex};
use scraper::Html;
use std::sync::LazyLock;

/// Matches self-closed tags such as `<title/>` or `<script src="a.js" />`.
static SELF_CLOSING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<([A-Za-z][A-Za-z0-9:_.-]*)(\s[^<>]*?)?\s*/>").unwrap()
});

/// HTML elements that never have content, so `<br/>` may stay as written.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

/// Strip a UTF-8 byte order mark if present.
pub fn strip_bom(data: &[u8]) -> &[u8] {
    if data.starts_with(&[0xEF, 0xBB, 0xBF]) {
        &data[3..]
    } else {
        data
    }
}

pub fn decode_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(strip_bom(bytes)).into_owned()
}

/// Local part of a possibly prefixed XML name (`opf:item` -> `item`).
pub fn local_name(name: &[u8]) -> &[u8] {
    name.iter()
        .rposition(|&b| b == b':')
        .map(|i| &name[i + 1..])
        .unwrap_or(name)
}

/// Value of the attribute whose local name is `key`, with entities resolved.
/// A value that does not unescape cleanly is returned as written.
pub fn attribute(element: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|attr| local_name(attr.key.as_ref()) == key)
        .map(|attr| match attr.unescape_value_with(named_entity) {
            Ok(value) => value.into_owned(),
            Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
        })
}

/// The predefined XML entities plus the HTML ones books put in XML files.
fn named_entity(entity: &str) -> Option<&'static str> {
    match entity {
        "nbsp" => Some(" "),
        _ => resolve_predefined_entity(entity),
    }
}

/// Resolve the body of a `&...;` reference met in text content.
pub fn resolve_entity(entity: &str) -> Option<String> {
    unescape_with(&format!("&{};", entity), named_entity)
        .ok()
        .map(|resolved| resolved.into_owned())
}

/// Parse an XHTML document with the HTML parser. Self-closed non-void elements
/// are rewritten as open/close pairs first; the HTML parser would otherwise
/// treat `<title/>` as an open tag and swallow the rest of the document.
pub fn parse_xhtml(content: &str) -> Html {
    let expanded = SELF_CLOSING_RE.replace_all(content, |caps: &Captures| {
        let name = &caps[1];
        if VOID_ELEMENTS.contains(&name.to_ascii_lowercase().as_str()) {
            caps[0].to_string()
        } else {
            let attrs = caps.get(2).map_or("", |m| m.as_str());
            format!("<{}{}></{}>", name, attrs, name)
        }
    });
    Html::parse_document(&expanded)
}

/// Collapse runs of whitespace to single spaces and trim.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn malformed(path: &str, err: impl std::fmt::Display) -> EpubChapterError {
    EpubChapterError::MalformedXml {
        path: path.to_string(),
        reason: err.to_string(),
    }
}
