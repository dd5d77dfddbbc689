use crate::error::{EpubChapterError, Result};
use crate::services::archive::{parent_dir, resolve_href, split_href, EpubArchive};
use crate::services::xml::{self, collapse_whitespace};
use crate::types::{
    ExtractionWarning, Package, RawTocEntry, SpineEntry, TocEntry, TocFormat, TocSource,
};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use scraper::ElementRef;
use std::collections::HashMap;
use std::io::{Read, Seek};
use tracing::{debug, info};

/// TOC entries resolved against the spine, in spine order.
#[derive(Debug, Clone)]
pub struct ParsedToc {
    pub format: TocFormat,
    pub entries: Vec<TocEntry>,
    /// Entries dropped because their target is not in the spine.
    pub unresolved: usize,
}

pub struct TocParser;

impl TocParser {
    pub fn read<R: Read + Seek>(
        archive: &mut EpubArchive<R>,
        package: &Package,
        warnings: &mut Vec<ExtractionWarning>,
    ) -> Result<ParsedToc> {
        let parsed = match &package.toc {
            TocSource::Navigation { href, ncx_fallback } => {
                let nav = match archive.read_text(href) {
                    Ok(content) => {
                        let raw = Self::parse_navigation(href, &content, warnings);
                        Some(Self::resolve(raw, &package.spine, warnings))
                    }
                    Err(e) => {
                        debug!("Navigation document unreadable: {}", e);
                        None
                    }
                };

                match (nav, ncx_fallback) {
                    (Some((entries, unresolved)), _) if !entries.is_empty() => ParsedToc {
                        format: TocFormat::Navigation,
                        entries,
                        unresolved,
                    },
                    (nav, Some(ncx)) => {
                        ExtractionWarning::NavigationFallback {
                            reason: format!("{} yielded no usable entries", href),
                        }
                        .record(warnings);
                        let mut parsed = Self::read_ncx(
                            archive,
                            &package.path,
                            ncx,
                            &package.spine,
                            warnings,
                        )?;
                        parsed.unresolved += nav.map_or(0, |(_, unresolved)| unresolved);
                        parsed
                    }
                    (Some((entries, unresolved)), None) => ParsedToc {
                        format: TocFormat::Navigation,
                        entries,
                        unresolved,
                    },
                    (None, None) => {
                        return Err(EpubChapterError::MissingToc {
                            path: package.path.clone(),
                        })
                    }
                }
            }
            TocSource::Ncx { href } => {
                Self::read_ncx(archive, &package.path, href, &package.spine, warnings)?
            }
        };

        info!(
            "TOC ({}): {} entries resolved, {} unresolved",
            parsed.format,
            parsed.entries.len(),
            parsed.unresolved
        );
        Ok(parsed)
    }

    fn read_ncx<R: Read + Seek>(
        archive: &mut EpubArchive<R>,
        package_path: &str,
        href: &str,
        spine: &[SpineEntry],
        warnings: &mut Vec<ExtractionWarning>,
    ) -> Result<ParsedToc> {
        let content = archive.read_text(href).map_err(|e| {
            debug!("NCX unreadable: {}", e);
            EpubChapterError::MissingToc {
                path: package_path.to_string(),
            }
        })?;
        let raw = Self::parse_ncx(href, &content)?;
        let (entries, unresolved) = Self::resolve(raw, spine, warnings);
        Ok(ParsedToc {
            format: TocFormat::Ncx,
            entries,
            unresolved,
        })
    }

    /// Entries of the navigation document's `toc` nav, in document order.
    pub fn parse_navigation(
        nav_path: &str,
        content: &str,
        warnings: &mut Vec<ExtractionWarning>,
    ) -> Vec<RawTocEntry> {
        let document = xml::parse_xhtml(content);
        let navs: Vec<ElementRef> = document
            .root_element()
            .descendants()
            .filter_map(ElementRef::wrap)
            .filter(|e| e.value().name() == "nav")
            .collect();

        let toc_nav = match navs.iter().find(|nav| is_toc_nav(nav)) {
            Some(nav) => Some(*nav),
            None => {
                let first = navs.first().copied();
                if first.is_some() {
                    ExtractionWarning::UntypedNavigation.record(warnings);
                }
                first
            }
        };

        let mut entries = Vec::new();
        if let Some(nav) = toc_nav {
            let walker = NavWalker {
                nav_path,
                base_dir: parent_dir(nav_path),
            };
            walker.collect_lists(nav, 0, &mut entries);
        }
        entries
    }

    /// `navPoint`s of an NCX file in pre-order, depth = nesting level.
    pub fn parse_ncx(ncx_path: &str, content: &str) -> Result<Vec<RawTocEntry>> {
        struct PendingPoint {
            title: String,
            src: Option<String>,
            depth: usize,
            play_order: Option<u32>,
            label_done: bool,
        }

        fn set_src(points: &mut [PendingPoint], stack: &[usize], e: &BytesStart<'_>) {
            if let Some(&idx) = stack.last() {
                if points[idx].src.is_none() {
                    points[idx].src = xml::attribute(e, b"src");
                }
            }
        }

        let mut reader = Reader::from_str(content);
        reader.config_mut().trim_text(false);

        let mut points: Vec<PendingPoint> = Vec::new();
        let mut stack: Vec<usize> = Vec::new();
        let mut in_text = false;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => match xml::local_name(e.name().as_ref()) {
                    b"navPoint" => {
                        points.push(PendingPoint {
                            title: String::new(),
                            src: None,
                            depth: stack.len(),
                            play_order: xml::attribute(&e, b"playOrder")
                                .and_then(|v| v.trim().parse().ok()),
                            label_done: false,
                        });
                        stack.push(points.len() - 1);
                    }
                    b"text" => in_text = true,
                    b"content" => set_src(&mut points, &stack, &e),
                    _ => {}
                },
                Ok(Event::Empty(e)) => {
                    if xml::local_name(e.name().as_ref()) == b"content" {
                        set_src(&mut points, &stack, &e);
                    }
                }
                Ok(Event::Text(e)) => {
                    if let (true, Some(&idx)) = (in_text, stack.last()) {
                        if !points[idx].label_done {
                            points[idx].title.push_str(&String::from_utf8_lossy(e.as_ref()));
                        }
                    }
                }
                Ok(Event::GeneralRef(e)) => {
                    if let (true, Some(&idx)) = (in_text, stack.last()) {
                        let entity = String::from_utf8_lossy(e.as_ref());
                        if let (false, Some(resolved)) =
                            (points[idx].label_done, xml::resolve_entity(&entity))
                        {
                            points[idx].title.push_str(&resolved);
                        }
                    }
                }
                Ok(Event::CData(e)) => {
                    if let (true, Some(&idx)) = (in_text, stack.last()) {
                        if !points[idx].label_done {
                            points[idx].title.push_str(&String::from_utf8_lossy(&e.into_inner()));
                        }
                    }
                }
                Ok(Event::End(e)) => match xml::local_name(e.name().as_ref()) {
                    b"text" => in_text = false,
                    b"navLabel" => {
                        if let Some(&idx) = stack.last() {
                            points[idx].label_done = true;
                        }
                    }
                    b"navPoint" => {
                        stack.pop();
                    }
                    _ => {}
                },
                Ok(Event::Eof) => break,
                Err(e) => return Err(xml::malformed(ncx_path, e)),
                _ => {}
            }
        }

        let base_dir = parent_dir(ncx_path);
        Ok(points
            .into_iter()
            .filter_map(|point| {
                let src = point.src.filter(|s| !s.trim().is_empty())?;
                let (target_file, anchor) = target_of(ncx_path, base_dir, src.trim());
                Some(RawTocEntry {
                    title: collapse_whitespace(&point.title),
                    target_file,
                    anchor,
                    depth: point.depth,
                    play_order: point.play_order,
                })
            })
            .collect())
    }

    /// Attach spine positions, drop what cannot be placed, and order by spine.
    pub fn resolve(
        raw: Vec<RawTocEntry>,
        spine: &[SpineEntry],
        warnings: &mut Vec<ExtractionWarning>,
    ) -> (Vec<TocEntry>, usize) {
        let mut by_path: HashMap<&str, usize> = HashMap::new();
        let mut by_file_name: HashMap<&str, Vec<usize>> = HashMap::new();
        for (idx, item) in spine.iter().enumerate() {
            by_path.entry(item.href.as_str()).or_insert(idx);
            by_file_name.entry(file_name(&item.href)).or_default().push(idx);
        }

        let mut entries = Vec::with_capacity(raw.len());
        let mut unresolved = 0;
        for item in raw {
            let spine_index = by_path.get(item.target_file.as_str()).copied().or_else(|| {
                match by_file_name.get(file_name(&item.target_file)) {
                    Some(candidates) if candidates.len() == 1 => Some(candidates[0]),
                    _ => None,
                }
            });

            match spine_index {
                Some(spine_index) => {
                    debug!("TOC '{}' -> spine {}", item.title, spine_index);
                    entries.push(TocEntry {
                        title: item.title,
                        target_file: spine[spine_index].href.clone(),
                        anchor: item.anchor,
                        depth: item.depth,
                        spine_index,
                        play_order: item.play_order,
                    });
                }
                None => {
                    unresolved += 1;
                    let href = match &item.anchor {
                        Some(anchor) => format!("{}#{}", item.target_file, anchor),
                        None => item.target_file.clone(),
                    };
                    ExtractionWarning::UnresolvedTocEntry {
                        title: item.title,
                        href,
                    }
                    .record(warnings);
                }
            }
        }

        entries.sort_by_key(|e| e.spine_index);
        (entries, unresolved)
    }
}

struct NavWalker<'a> {
    nav_path: &'a str,
    base_dir: &'a str,
}

impl NavWalker<'_> {
    /// Find list elements below `element` (possibly wrapped in other markup).
    fn collect_lists(&self, element: ElementRef<'_>, depth: usize, out: &mut Vec<RawTocEntry>) {
        for child in element.children().filter_map(ElementRef::wrap) {
            match child.value().name() {
                "ol" | "ul" => self.walk_list(child, depth, out),
                "li" => {}
                _ => self.collect_lists(child, depth, out),
            }
        }
    }

    fn walk_list(&self, list: ElementRef<'_>, depth: usize, out: &mut Vec<RawTocEntry>) {
        for item in list.children().filter_map(ElementRef::wrap) {
            if item.value().name() != "li" {
                continue;
            }

            let mut link: Option<ElementRef> = None;
            let mut nested: Vec<ElementRef> = Vec::new();
            for child in item.children().filter_map(ElementRef::wrap) {
                match child.value().name() {
                    "ol" | "ul" => nested.push(child),
                    "a" if link.is_none() => link = Some(child),
                    _ if link.is_none() => {
                        link = child
                            .descendants()
                            .filter_map(ElementRef::wrap)
                            .find(|e| e.value().name() == "a");
                    }
                    _ => {}
                }
            }

            if let Some(link) = link {
                if let Some(href) = link.value().attr("href").map(str::trim).filter(|h| !h.is_empty()) {
                    let mut title = collapse_whitespace(&link.text().collect::<String>());
                    if title.is_empty() {
                        title = link.value().attr("title").map(collapse_whitespace).unwrap_or_default();
                    }
                    let (target_file, anchor) = target_of(self.nav_path, self.base_dir, href);
                    out.push(RawTocEntry {
                        title,
                        target_file,
                        anchor,
                        depth,
                        play_order: None,
                    });
                }
            }

            for list in nested {
                self.walk_list(list, depth + 1, out);
            }
        }
    }
}

fn is_toc_nav(nav: &ElementRef<'_>) -> bool {
    nav.value().attrs().any(|(name, value)| {
        let typed = name.ends_with("type") && value.split_whitespace().any(|t| t == "toc");
        typed || (name == "role" && value.trim() == "doc-toc")
    })
}

/// Archive path and anchor of an href found in the TOC document at `doc_path`.
fn target_of(doc_path: &str, base_dir: &str, href: &str) -> (String, Option<String>) {
    let (file, anchor) = split_href(href);
    if file.is_empty() {
        (doc_path.to_string(), anchor)
    } else {
        (resolve_href(base_dir, file), anchor)
    }
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
