//! Grouped summary statistics over a [`CellTable`].

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::Result;
use crate::joiner::CellTable;
use crate::summary::{NullableInt, SummaryRow};

/// Running statistics for one group (Welford's online algorithm).
#[derive(Debug, Clone, Default)]
struct Accumulator {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    mean: f64,
    m2: f64,
}

impl Accumulator {
    fn push(&mut self, x: f64) {
        if self.count == 0 {
            self.min = x;
            self.max = x;
        } else {
            self.min = self.min.min(x);
            self.max = self.max.max(x);
        }
        self.count += 1;
        self.sum += x;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
    }

    fn finish(self, key: Vec<i64>) -> SummaryRow {
        if self.count == 0 {
            return SummaryRow::empty(key);
        }

        // Sample standard deviation (N - 1)
        let std = if self.count > 1 {
            Some(round1((self.m2 / (self.count - 1) as f64).sqrt()))
        } else {
            None
        };

        SummaryRow {
            key,
            count: self.count,
            sum: NullableInt::truncate(self.sum),
            min: NullableInt::truncate(self.min),
            max: NullableInt::truncate(self.max),
            mean: Some(round1(self.mean)),
            std,
        }
    }
}

/// Round to one decimal place, ties to even.
pub fn round1(v: f64) -> f64 {
    (v * 10.0).round_ties_even() / 10.0
}

/// Group rows by `key_fields` and summarize `measure_field` per group.
///
/// Rows with any key field missing belong to no group. A group whose rows
/// all lack the measurement gets a count of zero and no other statistics.
/// Output is sorted by key.
pub fn aggregate(
    table: &CellTable,
    key_fields: &[&str],
    measure_field: &str,
) -> Result<Vec<SummaryRow>> {
    let key_columns = key_fields
        .iter()
        .map(|name| table.column(name))
        .collect::<Result<Vec<_>>>()?;
    let measure = table.column(measure_field)?;

    let mut groups: BTreeMap<Vec<i64>, Accumulator> = BTreeMap::new();

    'rows: for row in 0..table.len() {
        let mut key = Vec::with_capacity(key_columns.len());
        for column in &key_columns {
            match column[row] {
                Some(v) => key.push(v.trunc() as i64),
                None => continue 'rows,
            }
        }

        let acc = groups.entry(key).or_default();
        if let Some(x) = measure[row] {
            acc.push(x as f64);
        }
    }

    debug!(
        keys = ?key_fields,
        measure = measure_field,
        rows = table.len(),
        groups = groups.len(),
        "Aggregated cell table"
    );

    Ok(groups
        .into_iter()
        .map(|(key, acc)| acc.finish(key))
        .collect())
}
