//! Path templates with `{region}`, `{year}`, `{year1}`, `{year2}` and
//! `{year_range}` placeholders.
//!
//! Templates are rendered to build output paths and matched against
//! existing files to recover the region and year they belong to.

use std::fmt;
use std::path::PathBuf;

use biomass_common::YearRange;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum TemplateError {
    #[error("unknown placeholder {{{0}}} in template '{1}'")]
    UnknownPlaceholder(String, String),

    #[error("unclosed placeholder in template '{0}'")]
    Unclosed(String),

    #[error("template '{template}' needs a value for {{{placeholder}}}")]
    MissingValue {
        template: String,
        placeholder: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placeholder {
    Region,
    Year,
    Year1,
    Year2,
    YearRange,
}

impl Placeholder {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "region" => Some(Self::Region),
            "year" => Some(Self::Year),
            "year1" => Some(Self::Year1),
            "year2" => Some(Self::Year2),
            "year_range" => Some(Self::YearRange),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Region => "region",
            Self::Year => "year",
            Self::Year1 => "year1",
            Self::Year2 => "year2",
            Self::YearRange => "year_range",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Var(Placeholder),
}

/// Values substituted into a template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateVars {
    pub region: Option<String>,
    pub year: Option<u16>,
    pub year1: Option<u16>,
    pub year2: Option<u16>,
    pub year_range: Option<YearRange>,
}

impl TemplateVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn year(mut self, year: u16) -> Self {
        self.year = Some(year);
        self
    }

    pub fn pair(mut self, year1: u16, year2: u16) -> Self {
        self.year1 = Some(year1);
        self.year2 = Some(year2);
        self
    }

    pub fn year_range(mut self, range: YearRange) -> Self {
        self.year_range = Some(range);
        self
    }
}

/// A relative path pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PathTemplate {
    raw: String,
}

impl PathTemplate {
    pub fn new(raw: impl Into<String>) -> Result<Self, TemplateError> {
        let raw = raw.into();
        parse_segments(&raw)?;
        Ok(Self { raw })
    }

    /// Template known to be well formed at compile time.
    pub(crate) fn from_static(raw: &'static str) -> Self {
        Self {
            raw: raw.to_string(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    fn segments(&self) -> Vec<Segment> {
        // Validated in `new`
        parse_segments(&self.raw).unwrap_or_default()
    }

    /// Whether the template uses `{region}`.
    pub fn has_region(&self) -> bool {
        self.segments()
            .iter()
            .any(|s| *s == Segment::Var(Placeholder::Region))
    }

    /// Substitute placeholders, failing when a needed value is absent.
    pub fn render(&self, vars: &TemplateVars) -> Result<PathBuf, TemplateError> {
        let mut out = String::with_capacity(self.raw.len() + 16);
        for segment in self.segments() {
            match segment {
                Segment::Literal(text) => out.push_str(&text),
                Segment::Var(p) => {
                    let value = match p {
                        Placeholder::Region => vars.region.clone(),
                        Placeholder::Year => vars.year.map(|y| y.to_string()),
                        Placeholder::Year1 => vars.year1.map(|y| y.to_string()),
                        Placeholder::Year2 => vars.year2.map(|y| y.to_string()),
                        Placeholder::YearRange => vars.year_range.map(|r| r.to_string()),
                    };
                    let value = value.ok_or_else(|| TemplateError::MissingValue {
                        template: self.raw.clone(),
                        placeholder: p.name(),
                    })?;
                    out.push_str(&value);
                }
            }
        }
        Ok(PathBuf::from(out))
    }

    /// Match a `/`-separated relative path, returning the placeholder
    /// values on success.
    ///
    /// Years match exactly four digits, year ranges `YYYY-YYYY`, and a
    /// region any non-empty run without `/`. A placeholder used twice must
    /// match the same text both times.
    pub fn match_path(&self, path: &str) -> Option<TemplateVars> {
        let segments = self.segments();
        let mut vars = TemplateVars::default();
        if match_segments(&segments, path, &mut vars) {
            Some(vars)
        } else {
            None
        }
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl TryFrom<String> for PathTemplate {
    type Error = TemplateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PathTemplate> for String {
    fn from(value: PathTemplate) -> Self {
        value.raw
    }
}

fn parse_segments(raw: &str) -> Result<Vec<Segment>, TemplateError> {
    let mut segments = Vec::new();
    let mut rest = raw;
    while let Some(open) = rest.find('{') {
        if open > 0 {
            segments.push(Segment::Literal(rest[..open].to_string()));
        }
        let close = rest[open..]
            .find('}')
            .ok_or_else(|| TemplateError::Unclosed(raw.to_string()))?;
        let name = &rest[open + 1..open + close];
        let p = Placeholder::parse(name)
            .ok_or_else(|| TemplateError::UnknownPlaceholder(name.to_string(), raw.to_string()))?;
        segments.push(Segment::Var(p));
        rest = &rest[open + close + 1..];
    }
    if !rest.is_empty() {
        segments.push(Segment::Literal(rest.to_string()));
    }
    Ok(segments)
}

fn match_segments(segments: &[Segment], input: &str, vars: &mut TemplateVars) -> bool {
    let Some((first, rest)) = segments.split_first() else {
        return input.is_empty();
    };

    match first {
        Segment::Literal(text) => match input.strip_prefix(text.as_str()) {
            Some(remaining) => match_segments(rest, remaining, vars),
            None => false,
        },
        Segment::Var(Placeholder::Region) => {
            let limit = input.find('/').unwrap_or(input.len());
            // Shortest region first so literal separators bind early.
            for end in (1..=limit).filter(|&e| input.is_char_boundary(e)) {
                let candidate = &input[..end];
                if let Some(existing) = &vars.region {
                    if existing != candidate {
                        continue;
                    }
                }
                let saved = vars.region.replace(candidate.to_string());
                if match_segments(rest, &input[end..], vars) {
                    return true;
                }
                vars.region = saved;
            }
            false
        }
        Segment::Var(Placeholder::YearRange) => {
            let Some(text) = input.get(..9) else {
                return false;
            };
            let Ok(range) = text.parse::<YearRange>() else {
                return false;
            };
            if !is_year(&text[..4]) || !is_year(&text[5..]) {
                return false;
            }
            if vars.year_range.is_some_and(|r| r != range) {
                return false;
            }
            let saved = vars.year_range.replace(range);
            if match_segments(rest, &input[9..], vars) {
                return true;
            }
            vars.year_range = saved;
            false
        }
        Segment::Var(p) => {
            let Some(text) = input.get(..4) else {
                return false;
            };
            if !is_year(text) {
                return false;
            }
            let Ok(year) = text.parse::<u16>() else {
                return false;
            };
            let slot = match p {
                Placeholder::Year => &mut vars.year,
                Placeholder::Year1 => &mut vars.year1,
                _ => &mut vars.year2,
            };
            if slot.is_some_and(|y| y != year) {
                return false;
            }
            let saved = slot.replace(year);
            if match_segments(rest, &input[4..], vars) {
                return true;
            }
            match p {
                Placeholder::Year => vars.year = saved,
                Placeholder::Year1 => vars.year1 = saved,
                _ => vars.year2 = saved,
            }
            false
        }
    }
}

fn is_year(text: &str) -> bool {
    text.len() == 4 && text.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render() {
        let t = PathTemplate::new("interim/{region}_biomass_{year}.tif").unwrap();
        let path = t
            .render(&TemplateVars::new().region("oregon").year(1990))
            .unwrap();
        assert_eq!(path, PathBuf::from("interim/oregon_biomass_1990.tif"));
    }

    #[test]
    fn test_render_missing_value() {
        let t = PathTemplate::new("{region}_diff_{year1}-{year2}.tif").unwrap();
        let err = t
            .render(&TemplateVars::new().region("oregon").year(1990))
            .unwrap_err();
        assert!(matches!(err, TemplateError::MissingValue { placeholder: "year1", .. }));
    }

    #[test]
    fn test_invalid_templates() {
        assert!(matches!(
            PathTemplate::new("{state}_biomass.tif"),
            Err(TemplateError::UnknownPlaceholder(..))
        ));
        assert!(matches!(
            PathTemplate::new("{region_biomass.tif"),
            Err(TemplateError::Unclosed(_))
        ));
    }

    #[test]
    fn test_match_region_and_year() {
        let t = PathTemplate::new("interim/{region}_biomass_{year}.tif").unwrap();
        let vars = t.match_path("interim/oregon_biomass_1990.tif").unwrap();
        assert_eq!(vars.region.as_deref(), Some("oregon"));
        assert_eq!(vars.year, Some(1990));

        assert!(t.match_path("interim/oregon_biomass_199.tif").is_none());
        assert!(t.match_path("interim/oregon_biomass_1990.tif.aux.xml").is_none());
        assert!(t.match_path("other/oregon_biomass_1990.tif").is_none());
    }

    #[test]
    fn test_match_region_with_underscore() {
        let t = PathTemplate::new("{region}_biomass_{year}.tif").unwrap();
        let vars = t.match_path("north_coast_biomass_2001.tif").unwrap();
        assert_eq!(vars.region.as_deref(), Some("north_coast"));
    }

    #[test]
    fn test_match_pair_and_range() {
        let diff = PathTemplate::new("{region}_diff_{year1}-{year2}.tif").unwrap();
        let vars = diff.match_path("washington_diff_1990-1991.tif").unwrap();
        assert_eq!((vars.year1, vars.year2), (Some(1990), Some(1991)));

        let canopy = PathTemplate::new("canopy/{region}_canopy_mask_{year_range}.tif").unwrap();
        let vars = canopy
            .match_path("canopy/oregon_canopy_mask_2000-2015.tif")
            .unwrap();
        assert_eq!(vars.year_range, Some(YearRange::new(2000, 2015).unwrap()));
    }

    #[test]
    fn test_repeated_placeholder_must_agree() {
        let t = PathTemplate::new("{region}/{region}_{year}.csv").unwrap();
        assert!(t.match_path("oregon/oregon_1990.csv").is_some());
        assert!(t.match_path("oregon/washington_1990.csv").is_none());
    }

    #[test]
    fn test_serde_validates() {
        let ok: PathTemplate = serde_yaml::from_str("\"{region}_counties.tif\"").unwrap();
        assert!(ok.has_region());
        assert!(serde_yaml::from_str::<PathTemplate>("\"{county}.tif\"").is_err());
    }
}
