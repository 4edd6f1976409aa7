//! Document loaders.
//!
//! A [`Loader`] turns one file into raw pages ([`SourceDocument`]s with
//! 1-based page numbers and `cleaned = false`). Cleaning and filtering
//! happen afterwards in the ingestion pipeline.
//!
//! | Extension | Loader | Pages |
//! |-----------|--------|-------|
//! | `.pdf` | [`PdfLoader`] | one per PDF page |
//! | `.txt`, `.md` | [`TextLoader`] | the whole file as page 1 |

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use medirag_core::models::SourceDocument;

pub trait Loader: Send + Sync {
    /// Extensions (lowercase, without the dot) this loader accepts.
    fn extensions(&self) -> &[&'static str];

    fn load(&self, path: &Path) -> Result<Vec<SourceDocument>>;
}

/// Per-page PDF text extraction.
#[derive(Debug, Default)]
pub struct PdfLoader;

impl Loader for PdfLoader {
    fn extensions(&self) -> &[&'static str] {
        &["pdf"]
    }

    fn load(&self, path: &Path) -> Result<Vec<SourceDocument>> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let pages = pdf_extract::extract_text_from_mem_by_pages(&bytes)
            .map_err(|e| anyhow::anyhow!("PDF extraction failed for {}: {}", path.display(), e))?;

        let source = path.display().to_string();
        Ok(pages
            .into_iter()
            .enumerate()
            .map(|(i, text)| SourceDocument::new(text, source.clone(), i as u32 + 1))
            .collect())
    }
}

/// Plain text and Markdown files, read as a single page.
#[derive(Debug, Default)]
pub struct TextLoader;

impl Loader for TextLoader {
    fn extensions(&self) -> &[&'static str] {
        &["txt", "md"]
    }

    fn load(&self, path: &Path) -> Result<Vec<SourceDocument>> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(vec![SourceDocument::new(text, path.display().to_string(), 1)])
    }
}

/// The loaders used by `ingest`, in dispatch order.
pub fn default_loaders() -> Vec<Box<dyn Loader>> {
    vec![Box::new(PdfLoader), Box::new(TextLoader)]
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

fn loader_for<'a>(loaders: &'a [Box<dyn Loader>], path: &Path) -> Option<&'a dyn Loader> {
    let ext = extension_of(path)?;
    loaders
        .iter()
        .find(|l| l.extensions().contains(&ext.as_str()))
        .map(|l| l.as_ref())
}

/// Load every supported file under `path`.
///
/// A single file must be supported and readable; its errors propagate. In
/// a directory (walked recursively, sorted by path) unsupported files are
/// ignored and unreadable ones are skipped with a warning.
pub fn load_path(path: &Path, loaders: &[Box<dyn Loader>]) -> Result<Vec<SourceDocument>> {
    if !path.exists() {
        bail!("Path not found: {}", path.display());
    }

    if path.is_file() {
        let loader = loader_for(loaders, path).ok_or_else(|| {
            anyhow::anyhow!("Unsupported file type: {}", path.display())
        })?;
        return loader.load(path);
    }

    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| loader_for(loaders, p).is_some())
        .collect();
    files.sort();

    let mut docs = Vec::new();
    for file in files {
        let Some(loader) = loader_for(loaders, &file) else {
            continue;
        };
        match loader.load(&file) {
            Ok(pages) => {
                debug!(file = %file.display(), pages = pages.len(), "loaded");
                docs.extend(pages);
            }
            Err(e) => warn!(file = %file.display(), error = %e, "skipping unreadable file"),
        }
    }
    Ok(docs)
}
