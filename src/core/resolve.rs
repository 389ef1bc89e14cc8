//! Reconciliation of all raw observations into one mapping per CIK.
//!
//! The most recently observed CUSIP wins, except when it is a lone
//! observation contradicting a well attested alternative. Filings carry
//! operator typos that appear exactly once. Every other CUSIP is kept as
//! history so lookups by a superseded CUSIP still reach the CIK.

use crate::domain::cusip::Cusip;
use crate::domain::model::{CanonicalMapping, Cik, Confidence, DateRange, HistoricalCusip, RawPair};
use crate::utils::error::{MappingError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Tie-break thresholds for the singleton rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolutionPolicy {
    /// A most-recent CUSIP with at most this many observations may be overruled.
    pub singleton_max_observations: u32,
    /// A challenger needs at least this many observations...
    pub min_corroborating_observations: u32,
    /// ...and at least this multiple of the most-recent CUSIP's observations.
    pub corroboration_ratio: f64,
    /// When set, a challenger last seen more than this many days before the
    /// most-recent CUSIP cannot overrule it.
    pub max_challenger_gap_days: Option<i64>,
}

impl Default for ResolutionPolicy {
    fn default() -> Self {
        Self {
            singleton_max_observations: 1,
            min_corroborating_observations: 3,
            corroboration_ratio: 3.0,
            max_challenger_gap_days: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Tally {
    observed: DateRange,
    observations: u32,
}

#[derive(Debug, Clone, Default)]
pub struct Resolver {
    policy: ResolutionPolicy,
}

impl Resolver {
    pub fn new(policy: ResolutionPolicy) -> Self {
        Self { policy }
    }

    /// Resolves the complete pair set. The output depends only on the set of
    /// distinct observations, never on their order.
    pub fn resolve(&self, pairs: &[RawPair]) -> Result<BTreeMap<Cik, CanonicalMapping>> {
        if let Some(bad) = pairs.iter().find(|p| p.cik().is_unset()) {
            return Err(MappingError::ContractViolation {
                message: format!(
                    "raw pair for CUSIP {} from {} carries no CIK",
                    bad.cusip(),
                    bad.source_ref().locator
                ),
            });
        }

        let mut known: BTreeMap<Cik, BTreeSet<&Cusip>> = BTreeMap::new();
        for pair in pairs {
            known.entry(pair.cik()).or_default().insert(pair.cusip());
        }

        // One observation per (CIK, CUSIP, date, document), with issuer and
        // issue codes counted under the full CUSIP they abbreviate.
        let unique: BTreeSet<(Cik, &Cusip, NaiveDate, &str)> = pairs
            .iter()
            .map(|p| {
                let cusips = &known[&p.cik()];
                (
                    p.cik(),
                    widest_extension(p.cusip(), cusips),
                    p.filing_date(),
                    p.source_ref().locator.as_str(),
                )
            })
            .collect();

        let mut groups: BTreeMap<Cik, BTreeMap<&Cusip, Tally>> = BTreeMap::new();
        for (cik, cusip, date, _) in unique {
            groups
                .entry(cik)
                .or_default()
                .entry(cusip)
                .and_modify(|tally| {
                    tally.observed.include(date);
                    tally.observations += 1;
                })
                .or_insert(Tally {
                    observed: DateRange::at(date),
                    observations: 1,
                });
        }

        let mappings: BTreeMap<Cik, CanonicalMapping> = groups
            .into_iter()
            .map(|(cik, tallies)| (cik, self.resolve_cik(cik, tallies)))
            .collect();

        tracing::debug!(
            "Resolved {} raw pairs into {} mappings ({} with conflicts)",
            pairs.len(),
            mappings.len(),
            mappings.values().filter(|m| m.has_conflicts()).count()
        );

        Ok(mappings)
    }

    fn resolve_cik(&self, cik: Cik, tallies: BTreeMap<&Cusip, Tally>) -> CanonicalMapping {
        let mut ranked: Vec<(&Cusip, Tally)> = tallies.into_iter().collect();
        ranked.sort_by(|(a_cusip, a), (b_cusip, b)| {
            b.observed
                .last_seen
                .cmp(&a.observed.last_seen)
                .then(b.observations.cmp(&a.observations))
                .then(b.observed.first_seen.cmp(&a.observed.first_seen))
                .then(a_cusip.cmp(b_cusip))
        });

        let (primary, primary_tally) = ranked.remove(self.select_primary(&ranked));
        let total_observations =
            primary_tally.observations + ranked.iter().map(|(_, t)| t.observations).sum::<u32>();

        let mut historical: Vec<HistoricalCusip> = ranked
            .iter()
            .enumerate()
            .map(|(i, (cusip, tally))| {
                let overlaps = tally.observed.overlaps(&primary_tally.observed)
                    || ranked
                        .iter()
                        .enumerate()
                        .any(|(j, (_, other))| j != i && tally.observed.overlaps(&other.observed));
                let overruled = tally.observed.last_seen > primary_tally.observed.last_seen;
                HistoricalCusip {
                    cusip: (*cusip).clone(),
                    observed: tally.observed,
                    observations: tally.observations,
                    conflicting: overlaps || overruled,
                }
            })
            .collect();
        historical.sort_by(|a, b| {
            a.observed
                .cmp(&b.observed)
                .then_with(|| a.cusip.cmp(&b.cusip))
        });

        let conflicting = historical.iter().filter(|h| h.conflicting).count() as u32;

        CanonicalMapping {
            cik,
            primary_cusip: primary.clone(),
            primary_observed: primary_tally.observed,
            historical_cusips: historical,
            confidence: Confidence {
                corroborating: primary_tally.observations,
                conflicting,
                total_observations,
            },
        }
    }

    /// Index into `ranked` (most recent first) of the CUSIP to promote.
    fn select_primary(&self, ranked: &[(&Cusip, Tally)]) -> usize {
        let Some((_, top)) = ranked.first() else {
            return 0;
        };
        if top.observations > self.policy.singleton_max_observations {
            return 0;
        }

        let required = ((self.policy.corroboration_ratio * f64::from(top.observations)).ceil()
            as u32)
            .max(self.policy.min_corroborating_observations);

        ranked
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, (_, challenger))| {
                challenger.observations >= required
                    && self.policy.max_challenger_gap_days.map_or(true, |days| {
                        (top.observed.last_seen - challenger.observed.last_seen).num_days() <= days
                    })
            })
            .map(|(i, _)| i)
            .unwrap_or(0)
    }
}

/// The longest CUSIP of `known` that `cusip` abbreviates, or `cusip` itself.
///
/// `38259P` and `38259P50` resolve to `38259P508` when that is the only
/// longer form they prefix. When the longer forms diverge (two share
/// classes) the short form is ambiguous and stays as observed.
fn widest_extension<'a>(cusip: &'a Cusip, known: &BTreeSet<&'a Cusip>) -> &'a Cusip {
    let short = cusip.as_str();
    let longer: Vec<&'a Cusip> = known
        .iter()
        .copied()
        .filter(|c| c.as_str().len() > short.len() && c.as_str().starts_with(short))
        .collect();

    let Some(widest) = longer.iter().copied().max_by_key(|c| c.as_str().len()) else {
        return cusip;
    };
    if longer.iter().all(|c| widest.as_str().starts_with(c.as_str())) {
        widest
    } else {
        cusip
    }
}

/// Reverse lookup from CUSIP (current or superseded) to CIK.
#[derive(Debug, Clone, Default)]
pub struct MappingIndex {
    by_cusip: BTreeMap<Cusip, BTreeSet<Cik>>,
    by_issuer: BTreeMap<String, BTreeSet<Cik>>,
}

impl MappingIndex {
    pub fn build(mappings: &BTreeMap<Cik, CanonicalMapping>) -> Self {
        let mut index = Self::default();
        for mapping in mappings.values() {
            for cusip in mapping.all_cusips() {
                index
                    .by_cusip
                    .entry(cusip.clone())
                    .or_default()
                    .insert(mapping.cik);
                index
                    .by_issuer
                    .entry(cusip.issuer().to_string())
                    .or_default()
                    .insert(mapping.cik);
            }
        }
        index
    }

    pub fn lookup_cusip(&self, cusip: &Cusip) -> Vec<Cik> {
        self.by_cusip
            .get(cusip)
            .map(|ciks| ciks.iter().copied().collect())
            .unwrap_or_default()
    }

    /// CIKs whose primary or historical CUSIPs share the 6-character issuer code.
    pub fn lookup_issuer(&self, issuer: &str) -> Vec<Cik> {
        self.by_issuer
            .get(&issuer.to_ascii_uppercase())
            .map(|ciks| ciks.iter().copied().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cusip::CusipShape;
    use crate::domain::model::{FilingReference, FilingType};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn pair(cik: u64, cusip: &str, filed: NaiveDate, accession: &str) -> RawPair {
        let reference = FilingReference::new(
            Cik::new(cik),
            FilingType::Schedule13G,
            filed,
            format!("edgar/data/{}/{}.txt", cik, accession),
        );
        RawPair::new(
            Cik::new(cik),
            Cusip::parse(cusip, &CusipShape::default()).unwrap(),
            filed,
            reference,
        )
    }

    #[test]
    fn test_single_cusip() {
        let pairs = vec![
            pair(7, "38259P508", date(2010, 1, 4), "a"),
            pair(7, "38259P508", date(2012, 3, 1), "b"),
        ];
        let mappings = Resolver::default().resolve(&pairs).unwrap();
        let mapping = &mappings[&Cik::new(7)];
        assert_eq!(mapping.primary_cusip.as_str(), "38259P508");
        assert_eq!(mapping.primary_observed.first_seen, date(2010, 1, 4));
        assert_eq!(mapping.primary_observed.last_seen, date(2012, 3, 1));
        assert!(mapping.historical_cusips.is_empty());
        assert_eq!(mapping.confidence.corroborating, 2);
        assert_eq!(mapping.confidence.conflicting, 0);
    }

    #[test]
    fn test_duplicate_observations_count_once() {
        let p = pair(7, "38259P508", date(2010, 1, 4), "a");
        let mappings = Resolver::default()
            .resolve(&[p.clone(), p.clone(), p])
            .unwrap();
        assert_eq!(mappings[&Cik::new(7)].confidence.total_observations, 1);
    }

    #[test]
    fn test_same_date_conflict_reduces_confidence() {
        let pairs = vec![
            pair(9, "38259P508", date(2015, 5, 5), "a"),
            pair(9, "38259P706", date(2015, 5, 5), "b"),
        ];
        let mapping = &Resolver::default().resolve(&pairs).unwrap()[&Cik::new(9)];
        // Equal recency and count fall back to CUSIP order.
        assert_eq!(mapping.primary_cusip.as_str(), "38259P508");
        assert_eq!(mapping.historical_cusips.len(), 1);
        assert!(mapping.historical_cusips[0].conflicting);
        assert_eq!(mapping.confidence.conflicting, 1);
    }

    #[test]
    fn test_singleton_without_strong_challenger_wins() {
        let pairs = vec![
            pair(3, "38259P508", date(2001, 1, 1), "a"),
            pair(3, "38259P508", date(2002, 1, 1), "b"),
            pair(3, "38259P706", date(2020, 1, 1), "c"),
        ];
        let mapping = &Resolver::default().resolve(&pairs).unwrap()[&Cik::new(3)];
        assert_eq!(mapping.primary_cusip.as_str(), "38259P706");
        assert!(!mapping.historical_cusips[0].conflicting);
    }

    #[test]
    fn test_challenger_gap_limit() {
        let mut pairs: Vec<RawPair> = (0..10)
            .map(|i| pair(4, "38259P508", date(2000 + i, 1, 1), &format!("a{}", i)))
            .collect();
        pairs.push(pair(4, "38259P706", date(2020, 1, 1), "b"));

        let lenient = Resolver::default().resolve(&pairs).unwrap();
        assert_eq!(lenient[&Cik::new(4)].primary_cusip.as_str(), "38259P508");

        let strict = Resolver::new(ResolutionPolicy {
            max_challenger_gap_days: Some(365),
            ..ResolutionPolicy::default()
        })
        .resolve(&pairs)
        .unwrap();
        assert_eq!(strict[&Cik::new(4)].primary_cusip.as_str(), "38259P706");
    }

    #[test]
    fn test_unset_cik_halts_resolution() {
        let pairs = vec![pair(0, "38259P508", date(2010, 1, 4), "a")];
        let err = Resolver::default().resolve(&pairs).unwrap_err();
        assert!(matches!(err, MappingError::ContractViolation { .. }));
    }

    #[test]
    fn test_history_is_chronological() {
        let pairs = vec![
            pair(5, "38259P300", date(2008, 1, 1), "c"),
            pair(5, "38259P100", date(1999, 1, 1), "a"),
            pair(5, "38259P200", date(2003, 1, 1), "b"),
            pair(5, "38259P400", date(2014, 1, 1), "d"),
        ];
        let mapping = &Resolver::default().resolve(&pairs).unwrap()[&Cik::new(5)];
        assert_eq!(mapping.primary_cusip.as_str(), "38259P400");
        let history: Vec<&str> = mapping
            .historical_cusips
            .iter()
            .map(|h| h.cusip.as_str())
            .collect();
        assert_eq!(history, vec!["38259P100", "38259P200", "38259P300"]);
        for window in mapping.historical_cusips.windows(2) {
            assert!(!window[0].observed.overlaps(&window[1].observed));
        }
    }

    #[test]
    fn test_index_finds_superseded_cusip() {
        let pairs = vec![
            pair(1, "AAA111111", date(2001, 1, 1), "a"),
            pair(1, "BBB222222", date(2010, 1, 1), "b"),
            pair(2, "AAA111999", date(2011, 1, 1), "c"),
        ];
        let mappings = Resolver::default().resolve(&pairs).unwrap();
        let index = MappingIndex::build(&mappings);
        let old = Cusip::parse("AAA111111", &CusipShape::default()).unwrap();
        assert_eq!(index.lookup_cusip(&old), vec![Cik::new(1)]);
        assert_eq!(index.lookup_issuer("aaa111"), vec![Cik::new(1), Cik::new(2)]);
        assert!(index.lookup_issuer("ZZZ999").is_empty());
    }

    #[test]
    fn test_issuer_code_folds_into_full_cusip() {
        let mut pairs: Vec<RawPair> = (2005..=2015)
            .map(|y| pair(6, "38259P508", date(y, 2, 14), &format!("full{}", y)))
            .collect();
        pairs.push(pair(6, "38259P", date(2016, 2, 14), "short2016"));
        pairs.push(pair(6, "38259P50", date(2017, 2, 14), "short2017"));

        let mapping = &Resolver::default().resolve(&pairs).unwrap()[&Cik::new(6)];
        assert_eq!(mapping.primary_cusip.as_str(), "38259P508");
        assert_eq!(mapping.primary_observed.first_seen, date(2005, 2, 14));
        assert_eq!(mapping.primary_observed.last_seen, date(2017, 2, 14));
        assert!(mapping.historical_cusips.is_empty());
        assert_eq!(mapping.confidence.corroborating, 13);
    }

    #[test]
    fn test_issuer_code_shared_by_two_classes_stays_separate() {
        let pairs = vec![
            pair(8, "38259P508", date(2010, 1, 1), "a"),
            pair(8, "38259P706", date(2011, 1, 1), "b"),
            pair(8, "38259P", date(2012, 1, 1), "c"),
            pair(9, "38259P", date(2012, 1, 1), "d"),
        ];
        let mappings = Resolver::default().resolve(&pairs).unwrap();
        assert_eq!(mappings[&Cik::new(8)].historical_cusips.len(), 2);
        assert_eq!(mappings[&Cik::new(8)].primary_cusip.as_str(), "38259P");
        // Another CIK's full CUSIP never absorbs a short form.
        assert_eq!(mappings[&Cik::new(9)].primary_cusip.as_str(), "38259P");
    }

    #[test]
    fn test_folding_is_order_independent() {
        let mut pairs = vec![
            pair(6, "38259P", date(2016, 1, 1), "a"),
            pair(6, "38259P508", date(2015, 1, 1), "b"),
            pair(6, "38259P508", date(2014, 1, 1), "c"),
        ];
        let forward = Resolver::default().resolve(&pairs).unwrap();
        pairs.reverse();
        assert_eq!(forward, Resolver::default().resolve(&pairs).unwrap());
        assert_eq!(forward[&Cik::new(6)].primary_cusip.as_str(), "38259P508");
    }
}
