use crate::services::archive::EpubArchive;
use crate::services::slicer::SpineSlicer;
use crate::services::xml::{collapse_whitespace, parse_xhtml};
use crate::types::{ExtractionWarning, SpineEntry, SpineRange};
use scraper::{ElementRef, Node};
use std::collections::{HashMap, HashSet};
use std::io::{Read, Seek};
use tracing::debug;

const CONTENT_ELEMENTS: &[&str] = &["p", "li", "blockquote", "div"];
const SKIPPED_ELEMENTS: &[&str] = &["head", "script", "style", "title"];

/// Reads spine files once and cuts their text by range.
pub struct TextExtractor {
    contents: HashMap<usize, Option<String>>,
    /// (path, anchor) pairs already reported missing.
    missing_anchors: HashSet<(String, String)>,
}

impl TextExtractor {
    pub fn new() -> Self {
        Self {
            contents: HashMap::new(),
            missing_anchors: HashSet::new(),
        }
    }

    /// Text of every file in `range`, joined with blank lines.
    pub fn extract<R: Read + Seek>(
        &mut self,
        archive: &mut EpubArchive<R>,
        spine: &[SpineEntry],
        range: &SpineRange,
        warnings: &mut Vec<ExtractionWarning>,
    ) -> String {
        let mut parts = Vec::new();
        for segment in SpineSlicer::segments(range, spine.len()) {
            let path = &spine[segment.spine_index].href;
            let content = self
                .contents
                .entry(segment.spine_index)
                .or_insert_with(|| match archive.read_text(path) {
                    Ok(content) => Some(content),
                    Err(e) => {
                        ExtractionWarning::UnreadableSpineFile {
                            path: path.clone(),
                            reason: e.to_string(),
                        }
                        .record(warnings);
                        None
                    }
                });

            if let Some(content) = content.as_deref() {
                let text = extract_blocks(
                    path,
                    content,
                    segment.start_anchor.as_deref(),
                    segment.end_anchor.as_deref(),
                    &mut self.missing_anchors,
                    warnings,
                );
                if !text.is_empty() {
                    parts.push(text);
                }
            }
        }
        parts.join("\n\n")
    }
}

impl Default for TextExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Text blocks of one XHTML document between two optional anchors.
pub fn extract_text(
    path: &str,
    content: &str,
    start_anchor: Option<&str>,
    end_anchor: Option<&str>,
    warnings: &mut Vec<ExtractionWarning>,
) -> String {
    extract_blocks(
        path,
        content,
        start_anchor,
        end_anchor,
        &mut HashSet::new(),
        warnings,
    )
}

fn extract_blocks(
    path: &str,
    content: &str,
    start_anchor: Option<&str>,
    end_anchor: Option<&str>,
    missing_anchors: &mut HashSet<(String, String)>,
    warnings: &mut Vec<ExtractionWarning>,
) -> String {
    let document = parse_xhtml(content);
    let root = document.root_element();

    let start = checked_anchor(root, path, start_anchor, missing_anchors, warnings);
    let end = checked_anchor(root, path, end_anchor, missing_anchors, warnings);

    let mut collector = BlockCollector {
        start,
        end,
        active: start.is_none(),
        done: false,
        content_depth: 0,
        run: String::new(),
        blocks: Vec::new(),
    };
    collector.visit(root);
    collector.flush();

    debug!("{}: {} text blocks", path, collector.blocks.len());
    collector.blocks.join("\n\n")
}

/// `anchor` if some element carries it as id, otherwise drop it. Each missing
/// (path, anchor) pair is warned about once.
fn checked_anchor<'a>(
    root: ElementRef<'_>,
    path: &str,
    anchor: Option<&'a str>,
    missing_anchors: &mut HashSet<(String, String)>,
    warnings: &mut Vec<ExtractionWarning>,
) -> Option<&'a str> {
    let anchor = anchor?;
    let found = root
        .descendants()
        .filter_map(ElementRef::wrap)
        .any(|e| e.value().id() == Some(anchor));
    if found {
        Some(anchor)
    } else {
        if missing_anchors.insert((path.to_string(), anchor.to_string())) {
            ExtractionWarning::MissingAnchor {
                path: path.to_string(),
                anchor: anchor.to_string(),
            }
            .record(warnings);
        }
        None
    }
}

struct BlockCollector<'s> {
    start: Option<&'s str>,
    end: Option<&'s str>,
    active: bool,
    done: bool,
    /// Number of open content-bearing elements around the cursor.
    content_depth: usize,
    run: String,
    blocks: Vec<String>,
}

impl BlockCollector<'_> {
    fn visit(&mut self, element: ElementRef<'_>) {
        let name = element.value().name();
        if SKIPPED_ELEMENTS.contains(&name) {
            return;
        }

        if let Some(id) = element.value().id() {
            if Some(id) == self.end {
                self.flush();
                self.done = true;
                return;
            }
            if Some(id) == self.start {
                self.flush();
                self.active = true;
            }
        }

        let is_content = CONTENT_ELEMENTS.contains(&name);
        if is_content {
            self.flush();
            self.content_depth += 1;
        }
        if name == "br" {
            self.run.push(' ');
        }

        for child in element.children() {
            match child.value() {
                Node::Text(text) => {
                    if self.active && self.content_depth > 0 {
                        self.run.push_str(text);
                    }
                }
                Node::Element(_) => {
                    if let Some(child) = ElementRef::wrap(child) {
                        self.visit(child);
                    }
                }
                _ => {}
            }
            if self.done {
                break;
            }
        }

        if is_content {
            self.flush();
            self.content_depth -= 1;
        }
    }

    fn flush(&mut self) {
        if self.active {
            let block = collapse_whitespace(&self.run);
            if !block.is_empty() {
                self.blocks.push(block);
            }
        }
        self.run.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{stored_epub, xhtml};
    use crate::types::SpinePosition;

    fn text(content: &str, start: Option<&str>, end: Option<&str>) -> (String, Vec<ExtractionWarning>) {
        let mut warnings = Vec::new();
        let text = extract_text("OEBPS/ch.xhtml", content, start, end, &mut warnings);
        (text, warnings)
    }

    const ANCHORED: &str = r#"<html><head><title>Book</title><style>p { color: red }</style></head>
<body>
  <h1 id="one">Chapter One</h1>
  <p>First   chapter
     text.</p>
  <h1 id="two">Chapter Two</h1>
  <p>Second <em>chapter</em> text.</p>
  <ul><li>item a</li><li>item b</li></ul>
  <script>var ignored = 1;</script>
</body></html>"#;

    #[test]
    fn test_whole_document() {
        let (text, warnings) = text(ANCHORED, None, None);
        assert_eq!(
            text,
            "First chapter text.\n\nSecond chapter text.\n\nitem a\n\nitem b"
        );
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_anchor_bounds() {
        let (first, _) = text(ANCHORED, Some("one"), Some("two"));
        assert_eq!(first, "First chapter text.");

        let (second, _) = text(ANCHORED, Some("two"), None);
        assert_eq!(second, "Second chapter text.\n\nitem a\n\nitem b");
    }

    #[test]
    fn test_nested_blocks_not_duplicated() {
        let content = r#"<html><body><div class="chapter">Opening line
  <div><p>Inner paragraph.</p></div>
  <blockquote><p>Quoted.</p></blockquote>
  Closing line</div></body></html>"#;
        let (text, _) = text(content, None, None);
        assert_eq!(
            text,
            "Opening line\n\nInner paragraph.\n\nQuoted.\n\nClosing line"
        );
    }

    #[test]
    fn test_missing_anchor_uses_whole_file() {
        let (text, warnings) = text(ANCHORED, Some("nowhere"), None);
        assert!(text.starts_with("First chapter text."));
        assert_eq!(
            warnings,
            vec![ExtractionWarning::MissingAnchor {
                path: "OEBPS/ch.xhtml".to_string(),
                anchor: "nowhere".to_string(),
            }]
        );
    }

    #[test]
    fn test_self_closed_title() {
        let content = r#"<?xml version="1.0" encoding="utf-8"?>
<html xmlns="http://www.w3.org/1999/xhtml"><head><title/></head>
<body><p>First paragraph of the chapter.</p></body></html>"#;
        let (text, warnings) = text(content, None, None);
        assert_eq!(text, "First paragraph of the chapter.");
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_self_closed_script_in_head() {
        let content = r#"<html xmlns="http://www.w3.org/1999/xhtml"><head><title>Chapter</title>
<script type="text/javascript" src="a.js"/>
<link rel="stylesheet" type="text/css" href="style.css"/></head>
<body><a id="start"/><p>First paragraph of the chapter.</p></body></html>"#;
        let (whole, _) = text(content, None, None);
        assert_eq!(whole, "First paragraph of the chapter.");

        let (anchored, warnings) = text(content, Some("start"), None);
        assert_eq!(anchored, "First paragraph of the chapter.");
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_anchor_inside_paragraph() {
        let content = r#"<html><body><p>Before.</p><p id="start">Starts here.</p><p>After.</p></body></html>"#;
        let (text, _) = text(content, Some("start"), None);
        assert_eq!(text, "Starts here.\n\nAfter.");
    }

    #[test]
    fn test_extract_range_across_files() {
        let a = xhtml(&["Alpha one.", "Alpha two."]);
        let b = xhtml(&["Beta."]);
        let mut archive = stored_epub(&[("OEBPS/a.xhtml", a.as_str()), ("OEBPS/b.xhtml", b.as_str())]);
        let spine: Vec<SpineEntry> = ["a", "missing", "b"]
            .iter()
            .map(|name| SpineEntry {
                idref: name.to_string(),
                href: format!("OEBPS/{}.xhtml", name),
                linear: true,
            })
            .collect();
        let range = SpineRange {
            start: SpinePosition {
                spine_index: 0,
                anchor: None,
            },
            end: None,
        };

        let mut extractor = TextExtractor::new();
        let mut warnings = Vec::new();
        let text = extractor.extract(&mut archive, &spine, &range, &mut warnings);

        assert_eq!(text, "Alpha one.\n\nAlpha two.\n\nBeta.");
        assert_eq!(warnings.len(), 1);
        assert!(matches!(
            &warnings[0],
            ExtractionWarning::UnreadableSpineFile { path, .. } if path == "OEBPS/missing.xhtml"
        ));

        // cached: the unreadable file is reported once
        extractor.extract(&mut archive, &spine, &range, &mut warnings);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_missing_anchor_reported_once() {
        let a = xhtml(&["Alpha one.", "Alpha two."]);
        let mut archive = stored_epub(&[("OEBPS/a.xhtml", a.as_str())]);
        let spine = vec![SpineEntry {
            idref: "a".to_string(),
            href: "OEBPS/a.xhtml".to_string(),
            linear: true,
        }];
        let range = |anchor: &str| SpineRange {
            start: SpinePosition {
                spine_index: 0,
                anchor: Some(anchor.to_string()),
            },
            end: None,
        };

        let mut extractor = TextExtractor::new();
        let mut warnings = Vec::new();
        let first = extractor.extract(&mut archive, &spine, &range("gone"), &mut warnings);
        let second = extractor.extract(&mut archive, &spine, &range("gone"), &mut warnings);
        assert_eq!(first, "Alpha one.\n\nAlpha two.");
        assert_eq!(second, first);
        assert_eq!(
            warnings,
            vec![ExtractionWarning::MissingAnchor {
                path: "OEBPS/a.xhtml".to_string(),
                anchor: "gone".to_string(),
            }]
        );

        extractor.extract(&mut archive, &spine, &range("elsewhere"), &mut warnings);
        assert_eq!(warnings.len(), 2);
    }
}
