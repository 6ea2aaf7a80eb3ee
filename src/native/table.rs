//! Plain-text range table backend.
//!
//! File layout:
//!
//! ```text
//! # ipi-table v1
//! # published 2025-06-23
//! 185.28.167.0|185.28.167.255|RegisteredCountry=GB|Areas=London@0.25|Areas=Reading@0.75
//! ```
//!
//! Values carry an optional `@weight` suffix (default 1.0). `IpRangeStart` and
//! `IpRangeEnd` are synthesized from the range columns.

use std::net::IpAddr;
use std::path::Path;

use chrono::NaiveDate;

use super::{Dataset, IpResults, IpiConfig, MatchingBackend, NativeError, PropertySet};

pub const TABLE_HEADER: &str = "# ipi-table";
pub const TABLE_VERSION: &str = "v1";

const PUBLISHED_PREFIX: &str = "# published";

/// Backend that parses range tables into memory.
#[derive(Debug, Clone, Copy, Default)]
pub struct TableBackend;

impl TableBackend {
    pub fn new() -> Self {
        Self
    }
}

impl MatchingBackend for TableBackend {
    fn initialize(
        &self,
        config: &IpiConfig,
        properties: &PropertySet,
        path: &Path,
    ) -> Result<Box<dyn Dataset>, NativeError> {
        let dataset = TableDataset::load(config.clone(), properties.clone(), path)?;
        tracing::debug!(
            path = %path.display(),
            ranges = dataset.range_count(),
            "range table parsed"
        );
        Ok(Box::new(dataset))
    }
}

#[derive(Debug)]
struct Range {
    start: u128,
    end: u128,
    start_text: String,
    end_text: String,
    values: Vec<(String, String, f32)>,
}

/// One parsed range table.
#[derive(Debug)]
pub struct TableDataset {
    config: IpiConfig,
    properties: PropertySet,
    published: Option<NaiveDate>,
    v4: Vec<Range>,
    v6: Vec<Range>,
}

impl TableDataset {
    pub fn load(config: IpiConfig, properties: PropertySet, path: &Path) -> Result<Self, NativeError> {
        let bytes = std::fs::read(path).map_err(|e| NativeError::from_io(path, e))?;
        let text = String::from_utf8(bytes).map_err(|_| corrupt(path, "data file is not UTF-8"))?;
        Self::parse(config, properties, path, &text)
    }

    fn parse(
        config: IpiConfig,
        properties: PropertySet,
        path: &Path,
        text: &str,
    ) -> Result<Self, NativeError> {
        let mut lines = text.lines().enumerate();

        let header = lines.next().map(|(_, l)| l.trim()).unwrap_or_default();
        let version = header
            .strip_prefix(TABLE_HEADER)
            .map(str::trim)
            .ok_or_else(|| corrupt(path, "missing table header"))?;
        if version != TABLE_VERSION {
            return Err(NativeError::IncorrectVersion {
                path: path.to_path_buf(),
                found: version.to_string(),
            });
        }

        let mut published = None;
        let mut v4 = Vec::new();
        let mut v6 = Vec::new();

        for (idx, line) in lines {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(date) = line.strip_prefix(PUBLISHED_PREFIX) {
                let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
                    .map_err(|e| corrupt(path, format!("line {}: published date: {e}", idx + 1)))?;
                published = Some(date);
                continue;
            }
            if line.starts_with('#') {
                continue;
            }
            let (family_v4, range) = parse_range(line).map_err(|d| corrupt(path, format!("line {}: {d}", idx + 1)))?;
            if family_v4 {
                v4.push(range);
            } else {
                v6.push(range);
            }
        }

        v4.sort_by_key(|r| r.start);
        v6.sort_by_key(|r| r.start);

        Ok(Self { config, properties, published, v4, v6 })
    }

    pub fn range_count(&self) -> usize {
        self.v4.len() + self.v6.len()
    }

    fn find(&self, addr: IpAddr) -> Option<&Range> {
        let (ranges, key) = match addr {
            IpAddr::V4(a) => (&self.v4, u128::from(u32::from(a))),
            IpAddr::V6(a) => (&self.v6, u128::from(a)),
        };
        let idx = ranges.partition_point(|r| r.start <= key);
        let candidate = ranges.get(idx.checked_sub(1)?)?;
        (candidate.end >= key).then_some(candidate)
    }
}

impl Dataset for TableDataset {
    fn process(&self, addr: IpAddr) -> Result<IpResults, NativeError> {
        let mut results = IpResults::new();
        let Some(range) = self.find(addr) else {
            return Ok(results);
        };

        if self.properties.includes("IpRangeStart") {
            results.push("IpRangeStart", range.start_text.as_str(), 1.0);
        }
        if self.properties.includes("IpRangeEnd") {
            results.push("IpRangeEnd", range.end_text.as_str(), 1.0);
        }
        for (property, value, weight) in &range.values {
            if self.properties.includes(property) {
                results.push(property, value.as_str(), *weight);
            }
        }
        Ok(results)
    }

    fn config(&self) -> &IpiConfig {
        &self.config
    }

    fn properties(&self) -> &PropertySet {
        &self.properties
    }

    fn published(&self) -> Option<NaiveDate> {
        self.published
    }
}

fn parse_range(line: &str) -> Result<(bool, Range), String> {
    let mut columns = line.split('|');
    let start_text = columns.next().unwrap_or_default().trim();
    let end_text = columns.next().ok_or("missing range end")?.trim();

    let start: IpAddr = start_text.parse().map_err(|_| format!("bad range start '{start_text}'"))?;
    let end: IpAddr = end_text.parse().map_err(|_| format!("bad range end '{end_text}'"))?;

    let (is_v4, start_key, end_key) = match (start, end) {
        (IpAddr::V4(s), IpAddr::V4(e)) => (true, u128::from(u32::from(s)), u128::from(u32::from(e))),
        (IpAddr::V6(s), IpAddr::V6(e)) => (false, u128::from(s), u128::from(e)),
        _ => return Err("range mixes address families".to_string()),
    };
    if start_key > end_key {
        return Err(format!("range start {start_text} is after end {end_text}"));
    }

    let mut values = Vec::new();
    for column in columns {
        let (property, raw) = column
            .split_once('=')
            .ok_or_else(|| format!("expected Property=value, got '{column}'"))?;
        let property = property.trim();
        if property.is_empty() {
            return Err("empty property name".to_string());
        }
        let (value, weight) = split_weight(raw.trim());
        values.push((property.to_string(), value.to_string(), weight));
    }

    Ok((
        is_v4,
        Range {
            start: start_key,
            end: end_key,
            start_text: start_text.to_string(),
            end_text: end_text.to_string(),
            values,
        },
    ))
}

fn split_weight(raw: &str) -> (&str, f32) {
    if let Some((value, weight)) = raw.rsplit_once('@') {
        if let Ok(w) = weight.trim().parse::<f32>() {
            if (0.0..=1.0).contains(&w) {
                return (value.trim(), w);
            }
        }
    }
    (raw, 1.0)
}

fn corrupt(path: &Path, detail: impl Into<String>) -> NativeError {
    NativeError::CorruptData { path: path.to_path_buf(), detail: detail.into() }
}
