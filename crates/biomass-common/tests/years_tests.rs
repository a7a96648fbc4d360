//! Tests for YearRange parsing and iteration.

use biomass_common::{YearRange, YearRangeParseError};

#[test]
fn test_parse_canopy_range() {
    let range: YearRange = "2000-2015".parse().unwrap();
    assert_eq!(range.start, 2000);
    assert_eq!(range.end, 2015);
    assert_eq!(range.to_string(), "2000-2015");
}

#[test]
fn test_parse_with_spaces() {
    let range: YearRange = " 1984 - 1990".parse().unwrap();
    assert_eq!(range, YearRange::new(1984, 1990).unwrap());
}

#[test]
fn test_single_year_range() {
    let range = YearRange::new(1990, 1990).unwrap();
    assert_eq!(range.years().collect::<Vec<_>>(), vec![1990]);
}

#[test]
fn test_reversed_range_rejected() {
    assert!(matches!(
        "2015-2000".parse::<YearRange>(),
        Err(YearRangeParseError::Reversed { start: 2015, end: 2000 })
    ));
}

#[test]
fn test_garbage_rejected() {
    assert!(matches!(
        "2015".parse::<YearRange>(),
        Err(YearRangeParseError::InvalidFormat(_))
    ));
    assert!(matches!(
        "abcd-2000".parse::<YearRange>(),
        Err(YearRangeParseError::InvalidFormat(_))
    ));
}

#[test]
fn test_contains() {
    let range = YearRange::new(1984, 2017).unwrap();
    assert!(range.contains(1984));
    assert!(range.contains(2017));
    assert!(!range.contains(1983));
    assert!(!range.contains(2018));
}
