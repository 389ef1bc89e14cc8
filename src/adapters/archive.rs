//! Filings already on disk.
//!
//! Two layouts are read: an EDGAR mirror (`<root>/edgar/data/...`, listed
//! by a master index) and the download cache layout
//! `<root>/<form>_filings/<YYYY_MM>/<cik>_<date>_<accession>.txt`, which
//! `discover` walks without an index.

use crate::domain::model::{Cik, FilingReference, FilingType};
use crate::domain::ports::DocumentFetcher;
use crate::utils::error::{MappingError, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ArchiveFetcher {
    root: PathBuf,
}

impl ArchiveFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl DocumentFetcher for ArchiveFetcher {
    async fn fetch(&self, reference: &FilingReference) -> Result<Vec<u8>> {
        let path = self.root.join(reference.locator.trim_start_matches('/'));
        tokio::fs::read(&path)
            .await
            .map_err(|e| MappingError::FetchError {
                document: path.display().to_string(),
                message: e.to_string(),
            })
    }
}

/// Lists the cached filings of the selected types, sorted by locator.
pub fn discover(root: &Path, filing_types: &[FilingType]) -> Result<Vec<FilingReference>> {
    let mut bases: Vec<FilingType> = filing_types.iter().map(|t| t.base()).collect();
    bases.sort();
    bases.dedup();

    let mut references = Vec::new();
    for filing_type in bases {
        let type_dir = root.join(format!("{}_filings", filing_type.as_str()));
        if !type_dir.is_dir() {
            tracing::debug!("No archive directory {}", type_dir.display());
            continue;
        }
        for month in std::fs::read_dir(&type_dir)? {
            let month = month?;
            if !month.file_type()?.is_dir() {
                continue;
            }
            for file in std::fs::read_dir(month.path())? {
                let path = file?.path();
                if path.extension().and_then(|e| e.to_str()) != Some("txt") {
                    continue;
                }
                let Ok(relative) = path.strip_prefix(root) else {
                    continue;
                };
                let locator = relative.to_string_lossy().replace('\\', "/");
                match parse_file_name(&path, filing_type, locator) {
                    Some(reference) => references.push(reference),
                    None => tracing::debug!("Skipping unrecognised file {}", path.display()),
                }
            }
        }
    }

    references.sort_by(|a, b| a.locator.cmp(&b.locator));
    tracing::info!(
        "📂 Found {} cached filings under {}",
        references.len(),
        root.display()
    );
    Ok(references)
}

/// Where the download cache keeps `reference`, relative to the archive root:
/// `<form>_filings/<YYYY_MM>/<cik>_<YYYY-MM-DD>_<accession>.txt`.
pub fn cache_locator(reference: &FilingReference) -> String {
    let accession = reference
        .locator
        .rsplit('/')
        .next()
        .and_then(|name| name.split('.').next())
        .unwrap_or_default();
    format!(
        "{}_filings/{}/{}_{}_{}.txt",
        reference.filing_type.base().as_str(),
        reference.filing_date.format("%Y_%m"),
        reference.cik,
        reference.filing_date.format("%Y-%m-%d"),
        accession
    )
}

/// `<cik>_<YYYY-MM-DD>_<accession>.txt`
fn parse_file_name(path: &Path, filing_type: FilingType, locator: String) -> Option<FilingReference> {
    let stem = path.file_stem()?.to_str()?;
    let mut parts = stem.splitn(3, '_');
    let cik: Cik = parts.next()?.parse().ok()?;
    let filing_date = NaiveDate::parse_from_str(parts.next()?, "%Y-%m-%d").ok()?;
    parts.next()?;
    Some(FilingReference::new(cik, filing_type, filing_date, locator))
}
