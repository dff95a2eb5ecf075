use crate::error::IngestError;
use crate::links::LinkScraper;
use crate::models::{Document, DocumentMetadata, DOCUMENT_TYPE_STATEMENT};
use crate::tables::{extract_page_tables, format_tables, table_shape, Table, TableSettings};
use lopdf::{Dictionary, Object, ObjectId};
use std::path::Path;
use tracing::{debug, info, warn};

pub trait PdfExtractor {
    /// One document per page, in page order.
    fn extract(&self, path: &Path) -> Result<Vec<Document>, IngestError>;
}

/// Link annotations found on one page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageLinks {
    pub count: usize,
    pub uris: Vec<String>,
}

pub struct LopdfExtractor<S> {
    scraper: S,
    tables: TableSettings,
}

impl<S: LinkScraper> LopdfExtractor<S> {
    pub fn new(scraper: S) -> Self {
        Self {
            scraper,
            tables: TableSettings::default(),
        }
    }

    pub fn with_table_settings(mut self, tables: TableSettings) -> Self {
        self.tables = tables;
        self
    }

    fn page_document(
        &self,
        pdf: &lopdf::Document,
        source: &str,
        page_no: u32,
        page_id: ObjectId,
    ) -> Document {
        let text = pdf.extract_text(&[page_no]).unwrap_or_else(|error| {
            warn!(path = %source, page = page_no, %error, "page text unreadable, continuing without it");
            String::new()
        });

        let tables = extract_page_tables(pdf, page_id, &self.tables).unwrap_or_else(|error| {
            warn!(path = %source, page = page_no, %error, "table detection failed, page indexed without tables");
            Vec::new()
        });

        let links = page_links(pdf, page_id);
        let link_texts = links
            .uris
            .iter()
            .map(|uri| match self.scraper.scrape(uri) {
                Ok(text) => text,
                Err(error) => {
                    warn!(path = %source, page = page_no, %uri, %error, "link scrape failed");
                    String::new()
                }
            })
            .collect::<Vec<_>>();

        debug!(
            path = %source,
            page = page_no,
            tables = tables.len(),
            links = links.count,
            "page extracted"
        );

        Document {
            content: compose_content(&text, &tables, &link_texts),
            metadata: DocumentMetadata {
                source: source.to_string(),
                // Stored zero-based; lopdf numbers pages from 1.
                page: page_no.saturating_sub(1),
                kind: DOCUMENT_TYPE_STATEMENT.to_string(),
                has_tables: !tables.is_empty(),
                table_count: tables.len(),
                link_count: links.count,
                tables: tables.iter().map(table_shape).collect(),
                chunk: None,
            },
        }
    }
}

impl<S: LinkScraper> PdfExtractor for LopdfExtractor<S> {
    fn extract(&self, path: &Path) -> Result<Vec<Document>, IngestError> {
        let source = path.to_string_lossy().to_string();
        info!(path = %source, "processing pdf");

        let pdf = lopdf::Document::load(path).map_err(|error| IngestError::Extraction {
            path: source.clone(),
            reason: error.to_string(),
        })?;

        let documents = pdf
            .get_pages()
            .into_iter()
            .map(|(page_no, page_id)| self.page_document(&pdf, &source, page_no, page_id))
            .collect::<Vec<_>>();

        info!(path = %source, pages = documents.len(), "processed pdf");
        Ok(documents)
    }
}

pub fn compose_content(text: &str, tables: &[Table], link_texts: &[String]) -> String {
    format!(
        "{text}\n\nTABLES:\n{}\n\nLINKED CONTENT:\n{}",
        format_tables(tables),
        link_texts.join("\n")
    )
}

fn resolve<'a>(pdf: &'a lopdf::Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => pdf.get_object(*id).ok(),
        other => Some(other),
    }
}

fn as_dictionary<'a>(pdf: &'a lopdf::Document, object: &'a Object) -> Option<&'a Dictionary> {
    match resolve(pdf, object)? {
        Object::Dictionary(dictionary) => Some(dictionary),
        _ => None,
    }
}

fn has_name(dictionary: &Dictionary, key: &[u8], expected: &[u8]) -> bool {
    matches!(dictionary.get(key), Ok(Object::Name(name)) if name.as_slice() == expected)
}

/// Counts `/Link` annotations and collects the targets of their `/URI` actions.
pub fn page_links(pdf: &lopdf::Document, page_id: ObjectId) -> PageLinks {
    let Ok(page) = pdf.get_dictionary(page_id) else {
        return PageLinks::default();
    };
    let annotations = match page.get(b"Annots").ok().and_then(|value| resolve(pdf, value)) {
        Some(Object::Array(items)) => items,
        _ => return PageLinks::default(),
    };

    let mut links = PageLinks::default();
    for annotation in annotations.iter().filter_map(|item| as_dictionary(pdf, item)) {
        if !has_name(annotation, b"Subtype", b"Link") {
            continue;
        }
        links.count += 1;

        let Some(action) = annotation
            .get(b"A")
            .ok()
            .and_then(|value| as_dictionary(pdf, value))
        else {
            continue;
        };
        if !has_name(action, b"S", b"URI") {
            continue;
        }
        if let Some(Object::String(bytes, _)) = action.get(b"URI").ok().and_then(|value| resolve(pdf, value)) {
            links.uris.push(String::from_utf8_lossy(bytes).trim().to_string());
        }
    }
    links
}
