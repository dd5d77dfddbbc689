use crate::error::{EpubChapterError, Result};
use crate::services::archive::{parent_dir, resolve_href, EpubArchive};
use crate::services::xml;
use crate::types::{ExtractionWarning, Package, PackageResource, SpineEntry, TocSource};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::{Read, Seek};
use tracing::{debug, info};

const NCX_MEDIA_TYPE: &str = "application/x-dtbncx+xml";

pub struct PackageReader;

impl PackageReader {
    /// Locate and parse the package document of an opened book.
    pub fn read<R: Read + Seek>(
        archive: &mut EpubArchive<R>,
        include_non_linear: bool,
        warnings: &mut Vec<ExtractionWarning>,
    ) -> Result<Package> {
        let path = archive.locate_package()?;
        let content = archive.read_text(&path)?;
        let package = Self::parse(&path, &content, include_non_linear, warnings)?;

        info!(
            "Package {}: {} resources, {} spine items, TOC from {} ({})",
            package.path,
            package.resources.len(),
            package.spine.len(),
            package.toc.href(),
            package.toc.format()
        );
        Ok(package)
    }

    pub fn parse(
        path: &str,
        content: &str,
        include_non_linear: bool,
        warnings: &mut Vec<ExtractionWarning>,
    ) -> Result<Package> {
        let base_dir = parent_dir(path);
        let mut reader = Reader::from_str(content);
        reader.config_mut().trim_text(true);

        let mut resources: Vec<PackageResource> = Vec::new();
        let mut itemrefs: Vec<(String, bool)> = Vec::new();
        let mut toc_id: Option<String> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                    match xml::local_name(e.name().as_ref()) {
                        b"item" => {
                            let id = xml::attribute(&e, b"id").unwrap_or_default();
                            let href = xml::attribute(&e, b"href").unwrap_or_default();
                            if id.is_empty() || href.is_empty() {
                                debug!("Skipping manifest item without id or href");
                                continue;
                            }
                            resources.push(PackageResource {
                                id,
                                href: resolve_href(base_dir, &href),
                                media_type: xml::attribute(&e, b"media-type").unwrap_or_default(),
                                properties: xml::attribute(&e, b"properties")
                                    .map(|p| p.split_whitespace().map(str::to_string).collect())
                                    .unwrap_or_default(),
                            });
                        }
                        b"itemref" => {
                            if let Some(idref) = xml::attribute(&e, b"idref") {
                                let linear = xml::attribute(&e, b"linear")
                                    .map_or(true, |v| v.trim() != "no");
                                itemrefs.push((idref, linear));
                            }
                        }
                        b"spine" => toc_id = xml::attribute(&e, b"toc"),
                        _ => {}
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(xml::malformed(path, e)),
                _ => {}
            }
        }

        let mut by_id: HashMap<&str, &PackageResource> = HashMap::new();
        for resource in &resources {
            by_id.entry(resource.id.as_str()).or_insert(resource);
        }

        let mut spine = Vec::with_capacity(itemrefs.len());
        for (idref, linear) in itemrefs {
            if !linear && !include_non_linear {
                debug!("Leaving non-linear item {} out of the spine", idref);
                continue;
            }
            match by_id.get(idref.as_str()) {
                Some(resource) => spine.push(SpineEntry {
                    href: resource.href.clone(),
                    idref,
                    linear,
                }),
                None => ExtractionWarning::UnknownSpineItem { idref }.record(warnings),
            }
        }

        if spine.is_empty() {
            return Err(EpubChapterError::MissingSpine {
                path: path.to_string(),
            });
        }

        let ncx = toc_id
            .as_deref()
            .and_then(|id| by_id.get(id).copied())
            .or_else(|| resources.iter().find(|r| r.media_type == NCX_MEDIA_TYPE))
            .map(|r| r.href.clone());
        let nav = resources
            .iter()
            .find(|r| r.has_property("nav"))
            .map(|r| r.href.clone());

        let toc = match (nav, ncx) {
            (Some(href), ncx_fallback) => TocSource::Navigation { href, ncx_fallback },
            (None, Some(href)) => TocSource::Ncx { href },
            (None, None) => {
                return Err(EpubChapterError::MissingToc {
                    path: path.to_string(),
                })
            }
        };

        Ok(Package {
            path: path.to_string(),
            resources,
            spine,
            toc,
        })
    }
}
