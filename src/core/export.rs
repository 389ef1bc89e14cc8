//! Serializes a resolved mapping into the output archive.
//!
//! Every member is sorted and zip timestamps are pinned, so the same input
//! produces the same bytes on every run.

use crate::config::toml_config::LoadConfig;
use crate::domain::model::{CanonicalMapping, Cik, RawPair};
use crate::domain::ports::ResolveOutput;
use crate::utils::error::{MappingError, Result};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use zip::write::{FileOptions, SimpleFileOptions, ZipWriter};

pub const MAPPING_CSV: &str = "mapping.csv";
pub const HISTORY_CSV: &str = "history.csv";
pub const MAPPING_JSON: &str = "mapping.json";
pub const RAW_PAIRS_CSV: &str = "raw_pairs.csv";

#[derive(Serialize)]
struct MappingRow<'a> {
    cik: Cik,
    primary_cusip: &'a str,
    cusip6: &'a str,
    cusip8: Option<&'a str>,
    first_seen: NaiveDate,
    last_seen: NaiveDate,
    observations: u32,
    conflicts: u32,
}

#[derive(Serialize)]
struct HistoryRow<'a> {
    cik: Cik,
    cusip: &'a str,
    cusip6: &'a str,
    cusip8: Option<&'a str>,
    first_seen: NaiveDate,
    last_seen: NaiveDate,
    observations: u32,
    role: &'static str,
    conflicting: bool,
}

#[derive(Serialize)]
struct RawPairRow<'a> {
    cik: Cik,
    cusip: &'a str,
    filing_date: NaiveDate,
    filing_type: &'static str,
    filer_cik: Cik,
    locator: &'a str,
}

fn finish_csv(writer: csv::Writer<Vec<u8>>) -> Result<Vec<u8>> {
    writer
        .into_inner()
        .map_err(|e| MappingError::IoError(e.into_error()))
}

/// One row per CIK with its primary CUSIP.
pub fn mapping_csv(mappings: &BTreeMap<Cik, CanonicalMapping>) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for mapping in mappings.values() {
        writer.serialize(MappingRow {
            cik: mapping.cik,
            primary_cusip: mapping.primary_cusip.as_str(),
            cusip6: mapping.primary_cusip.issuer(),
            cusip8: mapping.primary_cusip.issue(),
            first_seen: mapping.primary_observed.first_seen,
            last_seen: mapping.primary_observed.last_seen,
            observations: mapping.confidence.corroborating,
            conflicts: mapping.confidence.conflicting,
        })?;
    }
    finish_csv(writer)
}

/// Every CUSIP of every CIK, oldest first within a CIK.
pub fn history_csv(mappings: &BTreeMap<Cik, CanonicalMapping>) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for mapping in mappings.values() {
        let mut rows = Vec::with_capacity(mapping.historical_cusips.len() + 1);
        rows.push(HistoryRow {
            cik: mapping.cik,
            cusip: mapping.primary_cusip.as_str(),
            cusip6: mapping.primary_cusip.issuer(),
            cusip8: mapping.primary_cusip.issue(),
            first_seen: mapping.primary_observed.first_seen,
            last_seen: mapping.primary_observed.last_seen,
            observations: mapping.confidence.corroborating,
            role: "primary",
            conflicting: false,
        });
        for entry in &mapping.historical_cusips {
            rows.push(HistoryRow {
                cik: mapping.cik,
                cusip: entry.cusip.as_str(),
                cusip6: entry.cusip.issuer(),
                cusip8: entry.cusip.issue(),
                first_seen: entry.observed.first_seen,
                last_seen: entry.observed.last_seen,
                observations: entry.observations,
                role: "historical",
                conflicting: entry.conflicting,
            });
        }
        rows.sort_by(|a, b| {
            (a.first_seen, a.last_seen, a.cusip).cmp(&(b.first_seen, b.last_seen, b.cusip))
        });
        for row in rows {
            writer.serialize(row)?;
        }
    }
    finish_csv(writer)
}

/// The extraction audit trail, sorted by CIK, date, CUSIP and document.
pub fn raw_pairs_csv(pairs: &[RawPair]) -> Result<Vec<u8>> {
    let mut sorted: Vec<&RawPair> = pairs.iter().collect();
    sorted.sort_by(|a, b| {
        (a.cik(), a.filing_date(), a.cusip(), &a.source_ref().locator).cmp(&(
            b.cik(),
            b.filing_date(),
            b.cusip(),
            &b.source_ref().locator,
        ))
    });

    let mut writer = csv::Writer::from_writer(Vec::new());
    for pair in sorted {
        let source = pair.source_ref();
        writer.serialize(RawPairRow {
            cik: pair.cik(),
            cusip: pair.cusip().as_str(),
            filing_date: pair.filing_date(),
            filing_type: source.filing_type.as_str(),
            filer_cik: source.cik,
            locator: &source.locator,
        })?;
    }
    finish_csv(writer)
}

pub fn mapping_json(mappings: &BTreeMap<Cik, CanonicalMapping>) -> Result<Vec<u8>> {
    let list: Vec<&CanonicalMapping> = mappings.values().collect();
    Ok(serde_json::to_vec_pretty(&list)?)
}

/// Builds the zip archive with the members `config` asks for.
pub fn build_archive(output: &ResolveOutput, config: &LoadConfig) -> Result<Vec<u8>> {
    let writes = |format: &str| config.output_formats.iter().any(|f| f == format);
    let options: SimpleFileOptions =
        FileOptions::default().last_modified_time(zip::DateTime::default());

    let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));

    if writes("csv") {
        zip.start_file(MAPPING_CSV, options)?;
        zip.write_all(&mapping_csv(&output.mappings)?)?;

        zip.start_file(HISTORY_CSV, options)?;
        zip.write_all(&history_csv(&output.mappings)?)?;
    }

    if writes("json") {
        zip.start_file(MAPPING_JSON, options)?;
        zip.write_all(&mapping_json(&output.mappings)?)?;
    }

    if config.include_raw_pairs {
        zip.start_file(RAW_PAIRS_CSV, options)?;
        zip.write_all(&raw_pairs_csv(&output.raw_pairs)?)?;
    }

    let cursor = zip.finish()?;
    Ok(cursor.into_inner())
}
