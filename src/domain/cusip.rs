use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Structural rules a token must satisfy to be accepted as a CUSIP.
///
/// Check digits are not verified; only the shape is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CusipShape {
    /// Accepted lengths after normalization. Full CUSIPs have 9 characters,
    /// filings also quote the 8-character issue code or the 6-character issuer code.
    pub allowed_lengths: Vec<usize>,
    /// Issuer codes (first 6 characters) that are placeholders rather than identifiers.
    pub rejected_issuer_prefixes: Vec<String>,
    pub require_digit: bool,
}

impl Default for CusipShape {
    fn default() -> Self {
        Self {
            allowed_lengths: vec![6, 8, 9],
            rejected_issuer_prefixes: vec!["000000".to_string(), "0001PT".to_string()],
            require_digit: true,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShapeViolation {
    #[error("length {0} is not an accepted CUSIP length")]
    Length(usize),

    #[error("contains no digit")]
    NoDigit,

    #[error("all characters are identical")]
    Repeated,

    #[error("issuer code {0} is a placeholder")]
    RejectedIssuer(String),
}

/// A structurally valid CUSIP, stored normalized (uppercase alphanumerics only).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cusip(String);

impl Cusip {
    pub fn parse(raw: &str, shape: &CusipShape) -> Result<Self, ShapeViolation> {
        let normalized = normalize(raw);
        shape.check(&normalized)?;
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The 6-character issuer code.
    pub fn issuer(&self) -> &str {
        &self.0[..6]
    }

    /// The 8-character issue code, when the value is long enough to carry one.
    pub fn issue(&self) -> Option<&str> {
        (self.0.len() >= 8).then(|| &self.0[..8])
    }
}

impl CusipShape {
    pub fn check(&self, normalized: &str) -> Result<(), ShapeViolation> {
        let len = normalized.len();
        // Lengths below 6 cannot carry an issuer code, whatever the configuration says.
        if len < 6 || !self.allowed_lengths.contains(&len) {
            return Err(ShapeViolation::Length(len));
        }
        if self.require_digit && !normalized.bytes().any(|b| b.is_ascii_digit()) {
            return Err(ShapeViolation::NoDigit);
        }
        let first = normalized.as_bytes()[0];
        if normalized.bytes().all(|b| b == first) {
            return Err(ShapeViolation::Repeated);
        }
        let issuer = &normalized[..6];
        if self
            .rejected_issuer_prefixes
            .iter()
            .any(|prefix| prefix.eq_ignore_ascii_case(issuer))
        {
            return Err(ShapeViolation::RejectedIssuer(issuer.to_string()));
        }
        Ok(())
    }
}

/// Uppercase ASCII alphanumerics of `raw`, dropping separators such as `-`, `.` and spaces.
pub fn normalize(raw: &str) -> String {
    raw.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

impl fmt::Display for Cusip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Cusip {
    type Error = ShapeViolation;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Cusip::parse(&value, &CusipShape::default())
    }
}

impl From<Cusip> for String {
    fn from(value: Cusip) -> Self {
        value.0
    }
}
