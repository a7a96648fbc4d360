//! Summary rows and their CSV encoding.
//!
//! A summary table is a header row of key field names followed by
//! `count,sum,min,max,mean,std`, then one line per group. Missing values
//! are written as empty fields.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StatsError};

/// Statistic columns, in output order.
pub const STAT_FIELDS: [&str; 6] = ["count", "sum", "min", "max", "mean", "std"];

/// An integer statistic that may have no value.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct NullableInt(pub Option<i64>);

impl NullableInt {
    pub const NULL: NullableInt = NullableInt(None);

    pub fn value(&self) -> Option<i64> {
        self.0
    }

    pub fn is_null(&self) -> bool {
        self.0.is_none()
    }

    /// Truncate a float toward zero; non-finite input has no value.
    pub fn truncate(v: f64) -> Self {
        if v.is_finite() {
            Self(Some(v.trunc() as i64))
        } else {
            Self::NULL
        }
    }
}

impl From<i64> for NullableInt {
    fn from(v: i64) -> Self {
        Self(Some(v))
    }
}

impl From<Option<i64>> for NullableInt {
    fn from(v: Option<i64>) -> Self {
        Self(v)
    }
}

/// Empty for no value, so it can be written straight into a CSV field.
impl fmt::Display for NullableInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(v) => write!(f, "{}", v),
            None => Ok(()),
        }
    }
}

/// Statistics of one aggregation group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    /// Group key, one entry per key field.
    pub key: Vec<i64>,
    /// Number of non-missing measurements.
    pub count: u64,
    pub sum: NullableInt,
    pub min: NullableInt,
    pub max: NullableInt,
    /// Rounded to one decimal.
    pub mean: Option<f64>,
    /// Sample standard deviation, rounded to one decimal.
    pub std: Option<f64>,
}

impl SummaryRow {
    /// Row for a group without any measurement.
    pub fn empty(key: Vec<i64>) -> Self {
        Self {
            key,
            count: 0,
            sum: NullableInt::NULL,
            min: NullableInt::NULL,
            max: NullableInt::NULL,
            mean: None,
            std: None,
        }
    }

    /// CSV fields of this row (keys first).
    pub fn csv_fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = self.key.iter().map(i64::to_string).collect();
        fields.push(self.count.to_string());
        fields.push(self.sum.to_string());
        fields.push(self.min.to_string());
        fields.push(self.max.to_string());
        fields.push(format_decimal(self.mean));
        fields.push(format_decimal(self.std));
        fields
    }
}

fn format_decimal(v: Option<f64>) -> String {
    match v {
        Some(v) => format!("{:.1}", v),
        None => String::new(),
    }
}

/// A summary table with named key columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryTable {
    pub key_fields: Vec<String>,
    pub rows: Vec<SummaryRow>,
}

impl SummaryTable {
    pub fn new(key_fields: &[&str], rows: Vec<SummaryRow>) -> Self {
        Self {
            key_fields: key_fields.iter().map(|s| s.to_string()).collect(),
            rows,
        }
    }

    /// Header fields: key names then [`STAT_FIELDS`].
    pub fn header(&self) -> Vec<String> {
        self.key_fields
            .iter()
            .cloned()
            .chain(STAT_FIELDS.iter().map(|s| s.to_string()))
            .collect()
    }

    /// Encode as CSV text with a header row.
    pub fn to_csv(&self) -> String {
        let mut output = self.header().join(",");
        output.push('\n');
        for row in &self.rows {
            output.push_str(&row.csv_fields().join(","));
            output.push('\n');
        }
        output
    }

    /// Parse CSV text produced by [`SummaryTable::to_csv`].
    ///
    /// Line numbers in errors are 1-based.
    pub fn from_csv(text: &str) -> Result<Self> {
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(i, l)| (i + 1, l.trim_end_matches('\r')))
            .filter(|(_, l)| !l.trim().is_empty());

        let (_, header) = lines
            .next()
            .ok_or_else(|| StatsError::parse(1, "missing header row"))?;
        let columns: Vec<&str> = header.split(',').map(str::trim).collect();

        if columns.len() < STAT_FIELDS.len()
            || columns[columns.len() - STAT_FIELDS.len()..] != STAT_FIELDS
        {
            return Err(StatsError::parse(
                1,
                format!("header must end with {}", STAT_FIELDS.join(",")),
            ));
        }
        let key_count = columns.len() - STAT_FIELDS.len();
        let key_fields: Vec<String> = columns[..key_count].iter().map(|s| s.to_string()).collect();

        let mut rows = Vec::new();
        for (line_no, line) in lines {
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            if fields.len() != columns.len() {
                return Err(StatsError::parse(
                    line_no,
                    format!("expected {} fields, found {}", columns.len(), fields.len()),
                ));
            }

            let key = fields[..key_count]
                .iter()
                .map(|f| parse_key(f))
                .collect::<std::result::Result<Vec<i64>, String>>()
                .map_err(|m| StatsError::parse(line_no, m))?;
            let stats = &fields[key_count..];

            let row = SummaryRow {
                key,
                count: stats[0]
                    .parse()
                    .map_err(|_| StatsError::parse(line_no, format!("invalid count '{}'", stats[0])))?,
                sum: parse_nullable_int(stats[1]).map_err(|m| StatsError::parse(line_no, m))?,
                min: parse_nullable_int(stats[2]).map_err(|m| StatsError::parse(line_no, m))?,
                max: parse_nullable_int(stats[3]).map_err(|m| StatsError::parse(line_no, m))?,
                mean: parse_optional_f64(stats[4]).map_err(|m| StatsError::parse(line_no, m))?,
                std: parse_optional_f64(stats[5]).map_err(|m| StatsError::parse(line_no, m))?,
            };
            rows.push(row);
        }

        Ok(Self { key_fields, rows })
    }
}

/// Keys may have been written as floats ("10.0") by other tools.
fn parse_key(s: &str) -> std::result::Result<i64, String> {
    if let Ok(v) = s.parse::<i64>() {
        return Ok(v);
    }
    match s.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v.trunc() as i64),
        _ => Err(format!("invalid key '{}'", s)),
    }
}

fn parse_nullable_int(s: &str) -> std::result::Result<NullableInt, String> {
    if s.is_empty() {
        return Ok(NullableInt::NULL);
    }
    s.parse::<i64>()
        .map(NullableInt::from)
        .map_err(|_| format!("invalid integer '{}'", s))
}

fn parse_optional_f64(s: &str) -> std::result::Result<Option<f64>, String> {
    if s.is_empty() {
        return Ok(None);
    }
    s.parse::<f64>()
        .map(Some)
        .map_err(|_| format!("invalid number '{}'", s))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SummaryTable {
        SummaryTable::new(
            &["owner", "county"],
            vec![
                SummaryRow {
                    key: vec![1, 10],
                    count: 2,
                    sum: 20.into(),
                    min: 5.into(),
                    max: 15.into(),
                    mean: Some(10.0),
                    std: Some(7.1),
                },
                SummaryRow::empty(vec![2, 10]),
            ],
        )
    }

    #[test]
    fn test_to_csv_layout() {
        let csv = sample().to_csv();
        assert_eq!(
            csv,
            "owner,county,count,sum,min,max,mean,std\n\
             1,10,2,20,5,15,10.0,7.1\n\
             2,10,0,,,,,\n"
        );
    }

    #[test]
    fn test_from_csv_reads_back() {
        let table = SummaryTable::from_csv(&sample().to_csv()).unwrap();
        assert_eq!(table, sample());
    }

    #[test]
    fn test_from_csv_accepts_float_keys_and_crlf() {
        let text = "owner,county,count,sum,min,max,mean,std\r\n1.0,41001.0,1,7,7,7,7.0,\r\n";
        let table = SummaryTable::from_csv(text).unwrap();
        assert_eq!(table.rows[0].key, vec![1, 41001]);
        assert_eq!(table.rows[0].std, None);
    }

    #[test]
    fn test_from_csv_errors_carry_line() {
        let bad_header = SummaryTable::from_csv("owner,county,total\n").unwrap_err();
        assert!(matches!(bad_header, StatsError::Parse { line: 1, .. }));

        let text = "owner,count,sum,min,max,mean,std\n1,2,3,1,2,1.5,0.7\n1,x,3,1,2,1.5,0.7\n";
        let err = SummaryTable::from_csv(text).unwrap_err();
        assert!(matches!(err, StatsError::Parse { line: 3, .. }));

        let short = "owner,count,sum,min,max,mean,std\n1,2,3\n";
        assert!(matches!(
            SummaryTable::from_csv(short),
            Err(StatsError::Parse { line: 2, .. })
        ));

        assert!(SummaryTable::from_csv("").is_err());
    }

    #[test]
    fn test_nullable_int() {
        assert_eq!(NullableInt::truncate(-2.9), NullableInt(Some(-2)));
        assert!(NullableInt::truncate(f64::NAN).is_null());
        assert_eq!(NullableInt::NULL.to_string(), "");
        assert_eq!(
            serde_json::to_string(&NullableInt::from(3)).unwrap(),
            "3"
        );
        assert_eq!(serde_json::to_string(&NullableInt::NULL).unwrap(), "null");
    }
}
