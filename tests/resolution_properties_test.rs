use chrono::{Duration, NaiveDate};
use cik_cusip::core::extract::{ExtractionRules, Extractor};
use cik_cusip::domain::cusip::{CusipShape, ShapeViolation};
use cik_cusip::{Cik, Cusip, FilingReference, FilingType, MappingIndex, RawPair, ResolutionPolicy, Resolver};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn pair(cik: u64, cusip: &str, filed: NaiveDate, n: usize) -> RawPair {
    let reference = FilingReference::new(
        Cik::new(cik),
        FilingType::Schedule13G,
        filed,
        format!("edgar/data/{}/{:04}.txt", cik, n),
    );
    RawPair::new(
        Cik::new(cik),
        Cusip::parse(cusip, &CusipShape::default()).unwrap(),
        filed,
        reference,
    )
}

/// Several CIKs with renames, typos and same-day conflicts.
fn corpus() -> Vec<RawPair> {
    let mut pairs = Vec::new();
    let mut n = 0;
    let mut next = || {
        n += 1;
        n
    };

    for year in 2005..=2012 {
        pairs.push(pair(1, "AAA111111", date(year, 2, 14), next()));
    }
    for year in 2013..=2020 {
        pairs.push(pair(1, "BBB222222", date(year, 2, 14), next()));
    }

    let start = date(2000, 1, 3);
    for week in 0..50 {
        pairs.push(pair(2, "XXX000000", start + Duration::weeks(week * 8), next()));
    }
    pairs.push(pair(2, "XXX000001", date(2020, 1, 1), next()));

    pairs.push(pair(3, "38259P508", date(2018, 6, 1), next()));
    pairs.push(pair(3, "38259P706", date(2018, 6, 1), next()));
    pairs.push(pair(3, "38259P508", date(2018, 6, 1), next()));

    pairs
}

fn resolver() -> Resolver {
    Resolver::new(ResolutionPolicy::default())
}

#[test]
fn test_resolution_is_idempotent() {
    let pairs = corpus();
    let first = resolver().resolve(&pairs).unwrap();
    let second = resolver().resolve(&pairs).unwrap();
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[test]
fn test_resolution_is_order_independent() {
    let pairs = corpus();
    let expected = resolver().resolve(&pairs).unwrap();

    let mut reversed = pairs.clone();
    reversed.reverse();
    assert_eq!(resolver().resolve(&reversed).unwrap(), expected);

    for shift in [1, 7, 31] {
        let mut rotated = pairs.clone();
        rotated.rotate_left(shift);
        assert_eq!(resolver().resolve(&rotated).unwrap(), expected);
    }

    let (even, odd): (Vec<_>, Vec<_>) = pairs.iter().cloned().enumerate().partition(|(i, _)| i % 2 == 0);
    let interleaved: Vec<RawPair> = odd.into_iter().chain(even).map(|(_, p)| p).collect();
    assert_eq!(resolver().resolve(&interleaved).unwrap(), expected);
}

#[test]
fn test_backward_fill_keeps_old_cusip_reachable() {
    let mappings = resolver().resolve(&corpus()).unwrap();
    let renamed = &mappings[&Cik::new(1)];

    assert_eq!(renamed.primary_cusip.as_str(), "BBB222222");
    assert_eq!(renamed.historical_cusips.len(), 1);
    let old = &renamed.historical_cusips[0];
    assert_eq!(old.cusip.as_str(), "AAA111111");
    assert!(!old.conflicting);
    assert!(old.observed.last_seen < renamed.primary_observed.first_seen);

    let index = MappingIndex::build(&mappings);
    let old_cusip = Cusip::parse("AAA111111", &CusipShape::default()).unwrap();
    assert_eq!(index.lookup_cusip(&old_cusip), vec![Cik::new(1)]);
    assert_eq!(index.lookup_issuer("bbb222"), vec![Cik::new(1)]);
}

#[test]
fn test_singleton_typo_is_overruled() {
    let mappings = resolver().resolve(&corpus()).unwrap();
    let typo = &mappings[&Cik::new(2)];

    assert_eq!(typo.primary_cusip.as_str(), "XXX000000");
    assert_eq!(typo.confidence.corroborating, 50);
    assert_eq!(typo.historical_cusips.len(), 1);
    assert_eq!(typo.historical_cusips[0].cusip.as_str(), "XXX000001");
    assert!(typo.historical_cusips[0].conflicting);
    assert!(typo.has_conflicts());
}

#[test]
fn test_same_day_conflict_is_flagged() {
    let mappings = resolver().resolve(&corpus()).unwrap();
    let conflicted = &mappings[&Cik::new(3)];

    assert_eq!(conflicted.primary_cusip.as_str(), "38259P508");
    assert_eq!(conflicted.confidence.corroborating, 2);
    assert_eq!(conflicted.confidence.total_observations, 3);
    assert!(conflicted.historical_cusips[0].conflicting);
}

#[test]
fn test_non_conflicting_history_never_overlaps_primary() {
    let mappings = resolver().resolve(&corpus()).unwrap();
    for mapping in mappings.values() {
        for entry in mapping.historical_cusips.iter().filter(|h| !h.conflicting) {
            assert!(!entry.observed.overlaps(&mapping.primary_observed));
        }
    }
}

#[test]
fn test_short_value_is_rejected_by_shape() {
    assert_eq!(
        Cusip::parse("123", &CusipShape::default()),
        Err(ShapeViolation::Length(3))
    );

    let extractor = Extractor::new(&ExtractionRules::default()).unwrap();
    let reference = FilingReference::new(
        Cik::new(9),
        FilingType::Schedule13D,
        date(2020, 5, 5),
        "edgar/data/9/0001.txt",
    );
    assert!(extractor.extract("CUSIP No. 123", &reference).is_empty());
}

#[test]
fn test_boilerplate_only_document_yields_nothing() {
    let extractor = Extractor::new(&ExtractionRules::default()).unwrap();
    let reference = FilingReference::new(
        Cik::new(9),
        FilingType::Schedule13G,
        date(2020, 5, 5),
        "edgar/data/9/0002.txt",
    );
    let text = "\
<DOCUMENT>
Instructions: Enter the CUSIP number of the class of securities 38259P508.
Persons who respond to the collection of information contained in this form are
not required to respond unless the form displays a currently valid OMB control
number. OMB Number: 3235-0145
";
    assert!(extractor.extract(text, &reference).is_empty());

    // The value has a valid shape; only the instruction phrasing suppresses it.
    let permissive = Extractor::new(&ExtractionRules {
        boilerplate_patterns: vec![],
        ..ExtractionRules::default()
    })
    .unwrap();
    let pairs = permissive.extract(text, &reference);
    assert_eq!(pairs.len(), 1);
    assert_eq!(pairs[0].cusip().as_str(), "38259P508");
}

#[test]
fn test_extraction_is_pure() {
    let extractor = Extractor::new(&ExtractionRules::default()).unwrap();
    let reference = FilingReference::new(
        Cik::new(320193),
        FilingType::Schedule13GAmendment,
        date(2024, 2, 14),
        "edgar/data/320193/0001.txt",
    );
    let text = "<DOCUMENT>\nCUSIP No. 037833100\nCUSIP No. 037833209\n";

    let first = extractor.extract(text, &reference);
    let second = extractor.extract(text, &reference);
    assert_eq!(first, second);
    assert_eq!(first.len(), 2);
    assert!(first.iter().all(|p| p.cik() == Cik::new(320193)));
    assert!(first.iter().all(|p| p.filing_date() == date(2024, 2, 14)));
}
