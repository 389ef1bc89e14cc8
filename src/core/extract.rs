//! Extraction of CIK/CUSIP observations from the free text of one filing.
//!
//! Filings are plain text or loosely tagged HTML. A CUSIP is recognised by
//! a caption ("CUSIP No.", "(CUSIP Number)", "Item 2(e). CUSIP Number:")
//! next to a token of CUSIP shape. The value usually follows the caption,
//! except on cover pages where it sits on the line above a parenthesized
//! caption.

use crate::domain::cusip::{self, Cusip, CusipShape};
use crate::domain::model::{Cik, FilingReference, RawPair};
use crate::utils::error::{MappingError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Where the CIK of an emitted pair comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CikSource {
    /// The CIK of the filing reference.
    #[default]
    Reference,
    /// The `SUBJECT COMPANY` CIK of the SEC header, falling back to the reference.
    SubjectCompany,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionRules {
    pub caption_patterns: Vec<String>,
    /// Instructional template phrases; captions and values inside a match are ignored.
    pub boilerplate_patterns: Vec<String>,
    /// Tokens that end a value window (tax identifiers share the CUSIP shape).
    pub stop_words: Vec<String>,
    pub lookahead_tokens: usize,
    pub lookbehind_tokens: usize,
    pub cik_source: CikSource,
    pub cusip: CusipShape,
}

impl Default for ExtractionRules {
    fn default() -> Self {
        Self {
            caption_patterns: vec![
                r"(?i)\bCUSIP\b(?:\s*(?:NUMBERS?\b|NOS?\b|NUM\b|#)(?:\s*\(S\))?)?(?:\s*[.:#\-])*"
                    .to_string(),
            ],
            boilerplate_patterns: vec![
                r"(?i)\bthe\s+CUSIP\s+numbers?\s+(?:of|for)\s+the\s+(?:class|classes|security|securities|issuer)\b[^.;]{0,200}".to_string(),
                r"(?i)\b(?:enter|insert|provide|state|list)\s+(?:the\s+)?CUSIP\b[^.;]{0,200}".to_string(),
                r"(?i)\bif\s+(?:a\s+|the\s+)?CUSIP\s+(?:numbers?\s+)?(?:is|has|are)\b[^.;]{0,200}".to_string(),
                r"(?i)\bpersons\s+who\s+respond\s+to\s+the\s+collection\s+of\s+information[^.]{0,300}".to_string(),
                r"(?i)\bOMB\s+(?:number|approval|control\s+number)\b[:\s]*[0-9\-]*".to_string(),
            ],
            stop_words: ["IRS", "EIN", "FEIN", "SSN", "TAXPAYER"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            lookahead_tokens: 8,
            lookbehind_tokens: 8,
            cik_source: CikSource::Reference,
            cusip: CusipShape::default(),
        }
    }
}

/// Result of scanning one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub pairs: Vec<RawPair>,
    /// Caption occurrences outside boilerplate.
    pub captions: usize,
    /// Captions whose value windows held no CUSIP-shaped token.
    pub ambiguous: usize,
}

/// Stateless once built; share it between workers behind an `Arc`.
#[derive(Debug, Clone)]
pub struct Extractor {
    captions: Vec<Regex>,
    boilerplate: Vec<Regex>,
    stop_words: HashSet<String>,
    lookahead: usize,
    lookbehind: usize,
    cik_source: CikSource,
    shape: CusipShape,
    document_marker: Regex,
    tag: Regex,
    entity: Regex,
    whitespace: Regex,
    token: Regex,
    non_identifier: Regex,
}

struct Token<'a> {
    start: usize,
    end: usize,
    text: &'a str,
}

#[derive(Clone, Copy)]
struct Span {
    start: usize,
    end: usize,
}

impl Span {
    fn overlaps(&self, start: usize, end: usize) -> bool {
        start < self.end && self.start < end
    }

    fn contains(&self, pos: usize) -> bool {
        self.start <= pos && pos < self.end
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| MappingError::pattern(pattern, e))
}

impl Extractor {
    pub fn new(rules: &ExtractionRules) -> Result<Self> {
        if rules.caption_patterns.is_empty() {
            return Err(MappingError::MissingConfigError {
                field: "extract.caption_patterns".to_string(),
            });
        }

        Ok(Self {
            captions: rules
                .caption_patterns
                .iter()
                .map(|p| compile(p))
                .collect::<Result<_>>()?,
            boilerplate: rules
                .boilerplate_patterns
                .iter()
                .map(|p| compile(p))
                .collect::<Result<_>>()?,
            stop_words: rules.stop_words.iter().map(|w| cusip::normalize(w)).collect(),
            lookahead: rules.lookahead_tokens,
            lookbehind: rules.lookbehind_tokens,
            cik_source: rules.cik_source,
            shape: rules.cusip.clone(),
            document_marker: compile(r"(?i)<DOCUMENT>")?,
            tag: compile(r"<[/!?]?[A-Za-z][^>]*>")?,
            entity: compile(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z]+);")?,
            whitespace: compile(r"\s+")?,
            token: compile(r"\S+")?,
            // Dates, ZIP+4 codes, phone numbers, tax identifiers, thousands-grouped
            // share counts and currency amounts.
            non_identifier: compile(
                r"^\(?(?:\d{1,4}[/.\-]\d{1,2}[/.\-]\d{1,4}|\d{5}-\d{4}|\d{3}[.\-]\d{3}[.\-]\d{4}|\d{2}-\d{7}|\d{1,3}(?:,\d{3})+(?:\.\d+)?|(?:US)?\$\S*)\)?[.,;:]?$",
            )?,
        })
    }

    /// Decodes raw document bytes and extracts from them.
    ///
    /// Empty or binary content is a [`MappingError::MalformedDocument`]; text
    /// that is not valid UTF-8 is decoded lossily.
    pub fn extract_document(&self, bytes: &[u8], reference: &FilingReference) -> Result<Extraction> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(MappingError::MalformedDocument {
                document: reference.locator.clone(),
                reason: "document is empty".to_string(),
            });
        }
        let head = &bytes[..bytes.len().min(8192)];
        if head.contains(&0) {
            return Err(MappingError::MalformedDocument {
                document: reference.locator.clone(),
                reason: "document is binary, not text".to_string(),
            });
        }

        let text = String::from_utf8_lossy(bytes);
        Ok(self.extract_detailed(&text, reference))
    }

    /// Pairs found in `text`, one per distinct CUSIP, in order of appearance.
    pub fn extract(&self, text: &str, reference: &FilingReference) -> Vec<RawPair> {
        self.extract_detailed(text, reference).pairs
    }

    pub fn extract_detailed(&self, text: &str, reference: &FilingReference) -> Extraction {
        let (header, body) = match self.document_marker.find(text) {
            Some(m) => (&text[..m.start()], &text[m.end()..]),
            None => ("", text),
        };

        let cik = match self.cik_source {
            CikSource::Reference => reference.cik,
            CikSource::SubjectCompany => subject_company_cik(header).unwrap_or(reference.cik),
        };

        let normalized = self.normalize(body);
        let tokens: Vec<Token> = self
            .token
            .find_iter(&normalized)
            .map(|m| Token {
                start: m.start(),
                end: m.end(),
                text: m.as_str(),
            })
            .collect();

        let denied: Vec<Span> = self
            .boilerplate
            .iter()
            .flat_map(|rx| rx.find_iter(&normalized))
            .map(|m| Span {
                start: m.start(),
                end: m.end(),
            })
            .collect();

        let mut captions: Vec<Span> = self
            .captions
            .iter()
            .flat_map(|rx| rx.find_iter(&normalized))
            .map(|m| Span {
                start: m.start(),
                end: m.end(),
            })
            .collect();
        captions.sort_by_key(|s| (s.start, std::cmp::Reverse(s.end)));
        captions.dedup_by(|next, kept| kept.overlaps(next.start, next.end));

        let blocked: Vec<bool> = tokens
            .iter()
            .map(|t| {
                captions.iter().any(|c| c.overlaps(t.start, t.end))
                    || self.stop_words.contains(&cusip::normalize(t.text))
            })
            .collect();
        let boilerplate: Vec<bool> = tokens
            .iter()
            .map(|t| denied.iter().any(|d| d.overlaps(t.start, t.end)))
            .collect();

        let mut extraction = Extraction::default();
        let mut seen = HashSet::new();

        for caption in &captions {
            if denied.iter().any(|d| d.contains(caption.start)) {
                continue;
            }
            extraction.captions += 1;

            let after = tokens.partition_point(|t| t.start < caption.end);
            let before = tokens.partition_point(|t| t.end <= caption.start);
            let scan = Window {
                tokens: &tokens,
                blocked: &blocked,
                boilerplate: &boilerplate,
            };

            let value_above = normalized[..caption.start].trim_end().ends_with('(');
            let found = if value_above {
                self.scan_backward(&scan, before)
                    .or_else(|| self.scan_forward(&scan, after))
            } else {
                self.scan_forward(&scan, after)
                    .or_else(|| self.scan_backward(&scan, before))
            };

            match found {
                Some(cusip) => {
                    if seen.insert(cusip.clone()) {
                        extraction.pairs.push(RawPair::new(
                            cik,
                            cusip,
                            reference.filing_date,
                            reference.clone(),
                        ));
                    }
                }
                None => extraction.ambiguous += 1,
            }
        }

        extraction
    }

    /// Strips markup and entities and collapses whitespace to single spaces.
    fn normalize(&self, body: &str) -> String {
        let untagged = self.tag.replace_all(body, " ");
        let decoded = self.entity.replace_all(&untagged, |caps: &regex::Captures| {
            decode_entity(&caps[1])
        });
        self.whitespace.replace_all(&decoded, " ").into_owned()
    }

    fn scan_forward(&self, window: &Window, from: usize) -> Option<Cusip> {
        let end = window.tokens.len().min(from.saturating_add(self.lookahead));
        for i in from..end {
            if window.blocked[i] {
                break;
            }
            if let Some(cusip) = self.candidate_at(window, i) {
                return Some(cusip);
            }
        }
        None
    }

    /// `before` is the number of tokens preceding the caption.
    fn scan_backward(&self, window: &Window, before: usize) -> Option<Cusip> {
        let start = before.saturating_sub(self.lookbehind);
        for i in (start..before).rev() {
            if window.blocked[i] {
                break;
            }
            if let Some(cusip) = self.candidate_at(window, i) {
                return Some(cusip);
            }
        }
        None
    }

    /// A CUSIP starting at token `i`, joining `123456 10 7` style pieces when present.
    fn candidate_at(&self, window: &Window, i: usize) -> Option<Cusip> {
        if window.boilerplate[i] || self.non_identifier.is_match(window.tokens[i].text) {
            return None;
        }
        let head = cusip::normalize(window.tokens[i].text);

        if head.len() == 6 {
            let pieces: Vec<String> = (i + 1..window.tokens.len().min(i + 3))
                .take_while(|&j| {
                    !window.blocked[j]
                        && !window.boilerplate[j]
                        && !self.non_identifier.is_match(window.tokens[j].text)
                })
                .map(|j| cusip::normalize(window.tokens[j].text))
                .collect();
            let mut joined = Vec::new();
            match pieces.as_slice() {
                [issue, check, ..]
                    if issue.len() == 2
                        && has_digit(issue)
                        && check.len() == 1
                        && ends_in_digit(check) =>
                {
                    joined.push(format!("{}{}{}", head, issue, check));
                    joined.push(format!("{}{}", head, issue));
                }
                // Issue code and check digit written together; `13G` page markers end in a letter.
                [rest, ..] if rest.len() == 3 && has_digit(&rest[..2]) && ends_in_digit(rest) => {
                    joined.push(format!("{}{}", head, rest));
                }
                [issue, ..] if issue.len() == 2 && has_digit(issue) => {
                    joined.push(format!("{}{}", head, issue));
                }
                _ => {}
            }
            if let Some(cusip) = joined
                .iter()
                .find_map(|candidate| Cusip::parse(candidate, &self.shape).ok())
            {
                return Some(cusip);
            }
        }

        Cusip::parse(&head, &self.shape).ok()
    }
}

struct Window<'a, 'b> {
    tokens: &'b [Token<'a>],
    blocked: &'b [bool],
    boilerplate: &'b [bool],
}

fn has_digit(s: &str) -> bool {
    s.bytes().any(|b| b.is_ascii_digit())
}

fn ends_in_digit(s: &str) -> bool {
    s.bytes().last().is_some_and(|b| b.is_ascii_digit())
}

fn decode_entity(name: &str) -> String {
    let decoded = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
        u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
    } else if let Some(dec) = name.strip_prefix('#') {
        dec.parse::<u32>().ok().and_then(char::from_u32)
    } else {
        match name.to_ascii_lowercase().as_str() {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "ndash" | "mdash" => Some('-'),
            _ => None,
        }
    };
    match decoded {
        Some(c) if !c.is_whitespace() => c.to_string(),
        _ => " ".to_string(),
    }
}

/// The `CENTRAL INDEX KEY` following the `SUBJECT COMPANY` block of an SEC header.
fn subject_company_cik(header: &str) -> Option<Cik> {
    let mut in_subject = false;
    for line in header.lines() {
        if line.contains("SUBJECT COMPANY") {
            in_subject = true;
        } else if line.contains("FILED BY") {
            in_subject = false;
        }
        if in_subject && line.contains("CENTRAL INDEX KEY") {
            return line.rsplit(':').next()?.trim().parse().ok();
        }
    }
    None
}
