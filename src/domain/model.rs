use crate::domain::cusip::Cusip;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Central Index Key assigned by EDGAR. `Cik::UNSET` (0) is never a valid filer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cik(u64);

impl Cik {
    pub const UNSET: Cik = Cik(0);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }

    pub fn is_unset(self) -> bool {
        self.0 == 0
    }
}

impl FromStr for Cik {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!("'{}' is not a CIK", s));
        }
        trimmed
            .parse::<u64>()
            .map(Cik)
            .map_err(|e| format!("'{}' is not a CIK: {}", s, e))
    }
}

impl fmt::Display for Cik {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ownership-disclosure schedules the mapper reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FilingType {
    #[serde(rename = "13D")]
    Schedule13D,
    #[serde(rename = "13D/A")]
    Schedule13DAmendment,
    #[serde(rename = "13G")]
    Schedule13G,
    #[serde(rename = "13G/A")]
    Schedule13GAmendment,
}

impl FilingType {
    pub const ALL: [FilingType; 4] = [
        FilingType::Schedule13D,
        FilingType::Schedule13DAmendment,
        FilingType::Schedule13G,
        FilingType::Schedule13GAmendment,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FilingType::Schedule13D => "13D",
            FilingType::Schedule13DAmendment => "13D/A",
            FilingType::Schedule13G => "13G",
            FilingType::Schedule13GAmendment => "13G/A",
        }
    }

    /// The schedule without the amendment marker, used for archive directory names.
    pub fn base(self) -> FilingType {
        match self {
            FilingType::Schedule13DAmendment => FilingType::Schedule13D,
            FilingType::Schedule13GAmendment => FilingType::Schedule13G,
            other => other,
        }
    }
}

impl FromStr for FilingType {
    type Err = String;

    /// Accepts EDGAR form strings such as `SC 13D`, `SC 13G/A` or `SCHEDULE 13D`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let form = upper
            .strip_prefix("SCHEDULE")
            .or_else(|| upper.strip_prefix("SC"))
            .unwrap_or(&upper)
            .trim();
        let (base, amendment) = match form.strip_suffix("/A") {
            Some(base) => (base.trim(), true),
            None => (form, false),
        };
        match (base, amendment) {
            ("13D", false) => Ok(FilingType::Schedule13D),
            ("13D", true) => Ok(FilingType::Schedule13DAmendment),
            ("13G", false) => Ok(FilingType::Schedule13G),
            ("13G", true) => Ok(FilingType::Schedule13GAmendment),
            _ => Err(format!("unsupported filing type '{}'", s)),
        }
    }
}

impl fmt::Display for FilingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one source document in the filing archive.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FilingReference {
    pub cik: Cik,
    pub filing_type: FilingType,
    pub filing_date: NaiveDate,
    /// Archive-relative path, e.g. `edgar/data/1000694/0000093751-24-000650.txt`.
    pub locator: String,
}

impl FilingReference {
    pub fn new(
        cik: Cik,
        filing_type: FilingType,
        filing_date: NaiveDate,
        locator: impl Into<String>,
    ) -> Self {
        Self {
            cik,
            filing_type,
            filing_date,
            locator: locator.into(),
        }
    }

    /// Accession number, the file stem of the locator.
    pub fn accession(&self) -> &str {
        let file = self.locator.rsplit('/').next().unwrap_or(&self.locator);
        file.split('.').next().unwrap_or(file)
    }
}

/// One extracted, not yet reconciled observation of a CIK quoting a CUSIP.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RawPair {
    cik: Cik,
    cusip: Cusip,
    filing_date: NaiveDate,
    source_ref: FilingReference,
}

impl RawPair {
    pub fn new(cik: Cik, cusip: Cusip, filing_date: NaiveDate, source_ref: FilingReference) -> Self {
        Self {
            cik,
            cusip,
            filing_date,
            source_ref,
        }
    }

    pub fn cik(&self) -> Cik {
        self.cik
    }

    pub fn cusip(&self) -> &Cusip {
        &self.cusip
    }

    pub fn filing_date(&self) -> NaiveDate {
        self.filing_date
    }

    pub fn source_ref(&self) -> &FilingReference {
        &self.source_ref
    }
}

/// Closed interval of filing dates on which a CUSIP was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub first_seen: NaiveDate,
    pub last_seen: NaiveDate,
}

impl DateRange {
    pub fn at(date: NaiveDate) -> Self {
        Self {
            first_seen: date,
            last_seen: date,
        }
    }

    pub fn include(&mut self, date: NaiveDate) {
        self.first_seen = self.first_seen.min(date);
        self.last_seen = self.last_seen.max(date);
    }

    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.first_seen <= other.last_seen && other.first_seen <= self.last_seen
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.first_seen <= date && date <= self.last_seen
    }
}

/// A CUSIP the CIK used besides its primary one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricalCusip {
    pub cusip: Cusip,
    pub observed: DateRange,
    pub observations: u32,
    /// Set when the range overlaps another CUSIP of the same CIK, or when the
    /// entry was seen after the primary and overruled.
    pub conflicting: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confidence {
    /// Observations supporting the primary CUSIP.
    pub corroborating: u32,
    /// Distinct historical CUSIPs flagged as conflicting.
    pub conflicting: u32,
    pub total_observations: u32,
}

/// The resolved mapping of one CIK.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalMapping {
    pub cik: Cik,
    pub primary_cusip: Cusip,
    pub primary_observed: DateRange,
    pub historical_cusips: Vec<HistoricalCusip>,
    pub confidence: Confidence,
}

impl CanonicalMapping {
    /// Every CUSIP this CIK is known by, primary first.
    pub fn all_cusips(&self) -> impl Iterator<Item = &Cusip> {
        std::iter::once(&self.primary_cusip).chain(self.historical_cusips.iter().map(|h| &h.cusip))
    }

    pub fn has_conflicts(&self) -> bool {
        self.confidence.conflicting > 0
    }
}
