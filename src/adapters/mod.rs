pub mod archive;
pub mod edgar;
pub mod master_index;
pub mod storage;

use crate::config::toml_config::{SourceConfig, SourceType};
use crate::domain::model::FilingReference;
use crate::utils::error::{MappingError, Result};
use edgar::EdgarFetcher;
use std::path::Path;

/// Lists the filings a run will process.
///
/// An edgar source with `index_start_year` downloads the quarterly indexes
/// through `edgar`. Otherwise a configured master index wins, and the
/// archive's cache layout is walked as the last resort.
pub async fn list_filings(
    source: &SourceConfig,
    edgar: Option<&EdgarFetcher>,
) -> Result<Vec<FilingReference>> {
    if let (SourceType::Edgar, Some(year), Some(fetcher)) =
        (source.r#type, source.index_start_year, edgar)
    {
        let today = chrono::Utc::now().date_naive();
        return master_index::download(
            fetcher,
            year,
            source.index_start_quarter,
            today,
            source.master_index.as_deref().map(Path::new),
            &source.filing_types,
        )
        .await;
    }

    if let Some(index) = &source.master_index {
        return master_index::parse_file(Path::new(index), &source.filing_types);
    }

    match source.r#type {
        SourceType::Archive => archive::discover(Path::new(&source.archive_path), &source.filing_types),
        SourceType::Edgar => Err(MappingError::MissingConfigError {
            field: "source.master_index".to_string(),
        }),
    }
}
