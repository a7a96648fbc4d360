//! Inclusive year spans.

use serde::{Deserialize, Serialize};

/// Inclusive range of calendar years, written "2000-2015".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct YearRange {
    pub start: u16,
    pub end: u16,
}

impl YearRange {
    pub fn new(start: u16, end: u16) -> Result<Self, YearRangeParseError> {
        if start > end {
            return Err(YearRangeParseError::Reversed { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, year: u16) -> bool {
        year >= self.start && year <= self.end
    }

    pub fn years(&self) -> impl Iterator<Item = u16> {
        self.start..=self.end
    }
}

impl std::fmt::Display for YearRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

impl std::str::FromStr for YearRange {
    type Err = YearRangeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| YearRangeParseError::InvalidFormat(s.to_string()))?;
        let parse = |part: &str| {
            part.trim()
                .parse::<u16>()
                .map_err(|_| YearRangeParseError::InvalidFormat(s.to_string()))
        };
        Self::new(parse(start)?, parse(end)?)
    }
}

impl TryFrom<String> for YearRange {
    type Error = YearRangeParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<YearRange> for String {
    fn from(range: YearRange) -> Self {
        range.to_string()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum YearRangeParseError {
    #[error("Invalid year range: {0}. Expected 'YYYY-YYYY'")]
    InvalidFormat(String),

    #[error("Year range starts after it ends: {start}-{end}")]
    Reversed { start: u16, end: u16 },
}
