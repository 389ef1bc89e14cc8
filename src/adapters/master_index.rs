//! EDGAR `master.idx` listings.
//!
//! Rows look like `CIK|Company Name|Form Type|Date Filed|Filename`. Quarterly
//! files are often concatenated, so header blocks can appear anywhere; only
//! rows naming a `.txt` filing are considered.

use crate::adapters::edgar::EdgarFetcher;
use crate::domain::model::{Cik, FilingReference, FilingType};
use crate::utils::error::Result;
use chrono::{Datelike, NaiveDate};
use std::path::Path;

/// Keeps the rows whose form is one of `filing_types`, in file order.
pub fn parse(text: &str, filing_types: &[FilingType]) -> Vec<FilingReference> {
    let mut references = Vec::new();
    let mut skipped = 0usize;

    for line in text.lines() {
        if !line.contains(".txt") {
            continue;
        }
        match parse_row(line) {
            Some(reference) if filing_types.contains(&reference.filing_type) => {
                references.push(reference)
            }
            Some(_) => {}
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        tracing::debug!("Skipped {} unparseable master index rows", skipped);
    }
    references
}

/// EDGAR serves index files as Latin-1.
fn decode(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Reads an index file from disk.
pub fn parse_file(path: &Path, filing_types: &[FilingType]) -> Result<Vec<FilingReference>> {
    let bytes = std::fs::read(path)?;
    let references = parse(&decode(&bytes), filing_types);
    tracing::info!(
        "📑 Master index {} lists {} matching filings",
        path.display(),
        references.len()
    );
    Ok(references)
}

/// Every `(year, quarter)` from the starting quarter through the quarter containing `today`.
pub fn quarters(start_year: i32, start_quarter: u32, today: NaiveDate) -> Vec<(i32, u32)> {
    let current = (today.year(), today.month0() / 3 + 1);
    let mut quarters = Vec::new();
    let (mut year, mut quarter) = (start_year, start_quarter.clamp(1, 4));
    while (year, quarter) <= current {
        quarters.push((year, quarter));
        if quarter == 4 {
            year += 1;
            quarter = 1;
        } else {
            quarter += 1;
        }
    }
    quarters
}

/// Downloads the quarterly indexes from `start_year`/`start_quarter` up to
/// `today` through `fetcher`, so index requests share its rate limit.
///
/// The concatenated index is written to `save_to` when given.
pub async fn download(
    fetcher: &EdgarFetcher,
    start_year: i32,
    start_quarter: u32,
    today: NaiveDate,
    save_to: Option<&Path>,
    filing_types: &[FilingType],
) -> Result<Vec<FilingReference>> {
    let mut combined = Vec::new();
    for (year, quarter) in quarters(start_year, start_quarter, today) {
        let url = fetcher.index_url(year, quarter);
        tracing::info!("📑 Downloading master index {} Q{}", year, quarter);
        combined.extend(fetcher.get(&url).await?);
    }

    if let Some(path) = save_to {
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(path, &combined).await?;
        tracing::debug!("Saved master index to {}", path.display());
    }

    let references = parse(&decode(&combined), filing_types);
    tracing::info!(
        "📑 Downloaded indexes list {} matching filings",
        references.len()
    );
    Ok(references)
}

fn parse_row(line: &str) -> Option<FilingReference> {
    let fields: Vec<&str> = line.trim().split('|').collect();
    if fields.len() != 5 {
        return None;
    }
    let cik: Cik = fields[0].trim().parse().ok()?;
    let filing_type: FilingType = fields[2].parse().ok()?;
    let filing_date = NaiveDate::parse_from_str(fields[3].trim(), "%Y-%m-%d").ok()?;
    Some(FilingReference::new(
        cik,
        filing_type,
        filing_date,
        fields[4].trim(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::toml_config::SourceConfig;
    use httpmock::prelude::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    const SAMPLE: &str = "\
Description:           Master Index of EDGAR Dissemination Feed
Last Data Received:    September 30, 2024

CIK|Company Name|Form Type|Date Filed|Filename
--------------------------------------------------------------------------------
1000045|NICHOLAS FINANCIAL INC|SC 13G/A|2024-08-09|edgar/data/1000045/0000950170-24-093911.txt
1000097|KINGDON CAPITAL MANAGEMENT, L.L.C.|13F-HR|2024-08-14|edgar/data/1000097/0001000097-24-000006.txt
1000694|NOVAVAX INC|SC 13D|2024-07-01|edgar/data/1000694/0000093751-24-000650.txt
1000694|NOVAVAX INC|SC 13D|not-a-date|edgar/data/1000694/0000093751-24-000651.txt
";

    #[test]
    fn test_parse_filters_forms() {
        let references = parse(SAMPLE, &FilingType::ALL);
        assert_eq!(references.len(), 2);
        assert_eq!(references[0].cik, Cik::new(1000045));
        assert_eq!(references[0].filing_type, FilingType::Schedule13GAmendment);
        assert_eq!(
            references[1].locator,
            "edgar/data/1000694/0000093751-24-000650.txt"
        );

        let only_13d = parse(SAMPLE, &[FilingType::Schedule13D]);
        assert_eq!(only_13d.len(), 1);
        assert_eq!(only_13d[0].cik, Cik::new(1000694));
    }

    #[test]
    fn test_parse_file_decodes_latin1() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"7|SOCI\xc9T\xc9 G\xc9N\xc9RALE|SC 13G|2020-01-02|edgar/data/7/0001.txt\n")
            .unwrap();

        let references = parse_file(temp_file.path(), &FilingType::ALL).unwrap();
        assert_eq!(references.len(), 1);
        assert_eq!(references[0].filing_type, FilingType::Schedule13G);
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_quarters_run_through_current_quarter() {
        assert_eq!(
            quarters(2023, 3, date(2024, 5, 20)),
            vec![(2023, 3), (2023, 4), (2024, 1), (2024, 2)]
        );
        assert_eq!(quarters(2024, 4, date(2024, 12, 31)), vec![(2024, 4)]);
        assert!(quarters(2025, 1, date(2024, 12, 31)).is_empty());
    }

    #[tokio::test]
    async fn test_download_concatenates_quarters() {
        let server = MockServer::start();
        let q3 = server.mock(|when, then| {
            when.method(GET).path("/edgar/full-index/2024/QTR3/master.idx");
            then.status(200).body(
                "CIK|Company Name|Form Type|Date Filed|Filename\n\
                 1000694|NOVAVAX INC|SC 13D|2024-07-01|edgar/data/1000694/0000093751-24-000650.txt\n",
            );
        });
        let q4 = server.mock(|when, then| {
            when.method(GET).path("/edgar/full-index/2024/QTR4/master.idx");
            then.status(200).body(
                "7|ACME|SC 13G|2024-10-02|edgar/data/7/0001.txt\n\
                 8|ACME|10-K|2024-10-03|edgar/data/8/0002.txt\n",
            );
        });

        let fetcher = EdgarFetcher::new(&SourceConfig {
            base_url: server.base_url(),
            user_agent: Some("Test Co test@example.com".to_string()),
            ..SourceConfig::default()
        })
        .unwrap();
        let temp_dir = TempDir::new().unwrap();
        let saved = temp_dir.path().join("index/master.idx");

        let references = download(
            &fetcher,
            2024,
            3,
            date(2024, 11, 1),
            Some(&saved),
            &FilingType::ALL,
        )
        .await
        .unwrap();

        q3.assert();
        q4.assert();
        assert_eq!(references.len(), 2);
        assert_eq!(references[1].cik, Cik::new(7));
        assert_eq!(parse_file(&saved, &FilingType::ALL).unwrap(), references);
    }
}
