//! Event panel loading
//!
//! Reads one record per CSV row: user id, event timestamp, binary label and
//! the declared feature columns. Categorical columns are integer-encoded by
//! sorted distinct value; empty cells become missing values (NaN).

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use churn_core::{ChurnError, PipelineConfig};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::io::Read;
use std::path::Path;

use crate::errors::Result;

/// One event row of the panel
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    pub label: u8,
    /// Feature values ordered like `Dataset::feature_names`
    pub features: Vec<f64>,
}

/// In-memory event panel
#[derive(Clone, Debug)]
pub struct Dataset {
    pub feature_names: Vec<String>,
    pub records: Vec<Record>,
    /// Original levels of each categorical column, indexed by code
    pub category_levels: BTreeMap<String, Vec<String>>,
}

impl Dataset {
    /// Build a dataset from already materialized records
    pub fn new(feature_names: Vec<String>, records: Vec<Record>) -> Result<Self> {
        for (row, record) in records.iter().enumerate() {
            if record.features.len() != feature_names.len() {
                return Err(ChurnError::data(format!(
                    "record {} has {} features, expected {}",
                    row,
                    record.features.len(),
                    feature_names.len()
                ))
                .into());
            }
            if record.label > 1 {
                return Err(ChurnError::data(format!(
                    "record {} has non-binary label {}",
                    row, record.label
                ))
                .into());
            }
        }

        Ok(Self {
            feature_names,
            records,
            category_levels: BTreeMap::new(),
        })
    }

    /// Load dataset from a CSV file with a header row
    pub fn from_csv<P: AsRef<Path>>(path: P, config: &PipelineConfig) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref()).map_err(ChurnError::from)?;
        Self::from_reader(file, config)
    }

    /// Load dataset from any CSV source with a header row
    pub fn from_reader<R: Read>(reader: R, config: &PipelineConfig) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let headers = reader.headers()?.clone();

        let column = |name: &str| -> Result<usize> {
            headers
                .iter()
                .position(|header| header == name)
                .ok_or_else(|| ChurnError::data(format!("missing required column `{name}`")).into())
        };

        let user_idx = column(&config.data.user_column)?;
        let timestamp_idx = column(&config.data.timestamp_column)?;
        let label_idx = column(&config.data.label_column)?;

        let feature_names = config.features.all_features();
        let categorical: HashSet<&str> = config
            .features
            .categorical
            .iter()
            .map(String::as_str)
            .collect();

        let mut feature_columns = Vec::with_capacity(feature_names.len());
        for name in &feature_names {
            feature_columns.push((column(name)?, categorical.contains(name.as_str())));
        }

        let mut records = Vec::new();
        // (feature position, raw cell per row) for every categorical column
        let mut raw_categories: Vec<(usize, Vec<Option<String>>)> = feature_columns
            .iter()
            .enumerate()
            .filter(|(_, (_, is_cat))| *is_cat)
            .map(|(pos, _)| (pos, Vec::new()))
            .collect();

        for row in reader.records() {
            let row = row?;
            let line = row.position().map(|p| p.line()).unwrap_or_default();
            let cell = |idx: usize| row.get(idx).unwrap_or("");

            let user_id = cell(user_idx);
            if user_id.is_empty() {
                return Err(ChurnError::data(format!("line {line}: empty user id")).into());
            }

            let timestamp = parse_timestamp(cell(timestamp_idx)).ok_or_else(|| {
                ChurnError::data(format!(
                    "line {}: invalid timestamp `{}`",
                    line,
                    cell(timestamp_idx)
                ))
            })?;

            let label = parse_label(cell(label_idx)).ok_or_else(|| {
                ChurnError::data(format!(
                    "line {}: label `{}` is not binary",
                    line,
                    cell(label_idx)
                ))
            })?;

            let mut features = Vec::with_capacity(feature_columns.len());
            for (pos, &(idx, is_cat)) in feature_columns.iter().enumerate() {
                if is_cat {
                    let value = cell(idx);
                    let slot = raw_categories
                        .iter_mut()
                        .find(|(p, _)| *p == pos)
                        .map(|(_, cells)| cells);
                    if let Some(cells) = slot {
                        cells.push((!is_missing(value)).then(|| value.to_string()));
                    }
                    features.push(f64::NAN);
                } else {
                    features.push(parse_numeric(cell(idx)).ok_or_else(|| {
                        ChurnError::data(format!(
                            "line {}: column `{}` has non-numeric value `{}`",
                            line,
                            feature_names[pos],
                            cell(idx)
                        ))
                    })?);
                }
            }

            records.push(Record {
                user_id: user_id.to_string(),
                timestamp,
                label,
                features,
            });
        }

        if records.is_empty() {
            return Err(ChurnError::data("dataset is empty").into());
        }

        let mut category_levels = BTreeMap::new();
        for (pos, cells) in raw_categories {
            let levels: Vec<String> = cells
                .iter()
                .flatten()
                .cloned()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            let codes: BTreeMap<&str, usize> = levels
                .iter()
                .enumerate()
                .map(|(code, level)| (level.as_str(), code))
                .collect();

            for (record, value) in records.iter_mut().zip(&cells) {
                if let Some(value) = value {
                    record.features[pos] = codes[value.as_str()] as f64;
                }
            }
            category_levels.insert(feature_names[pos].clone(), levels);
        }

        Ok(Self {
            feature_names,
            records,
            category_levels,
        })
    }

    /// Get number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of distinct users
    pub fn user_count(&self) -> usize {
        self.records
            .iter()
            .map(|r| r.user_id.as_str())
            .collect::<HashSet<_>>()
            .len()
    }

    pub fn labels(&self) -> Vec<u8> {
        self.records.iter().map(|r| r.label).collect()
    }

    /// Feature rows and labels of the records selected by `mask`
    pub fn select(&self, mask: &[bool]) -> (Vec<Vec<f64>>, Vec<u8>) {
        self.records
            .iter()
            .zip(mask)
            .filter(|(_, &keep)| keep)
            .map(|(record, _)| (record.features.clone(), record.label))
            .unzip()
    }

    /// Per-feature (min, max) over non-missing values
    pub fn feature_stats(&self) -> Vec<(f64, f64)> {
        let mut stats = vec![(f64::INFINITY, f64::NEG_INFINITY); self.feature_names.len()];

        for record in &self.records {
            for (i, &val) in record.features.iter().enumerate() {
                if val.is_nan() {
                    continue;
                }
                stats[i].0 = stats[i].0.min(val);
                stats[i].1 = stats[i].1.max(val);
            }
        }

        stats
    }
}

fn is_missing(value: &str) -> bool {
    value.is_empty()
        || value.eq_ignore_ascii_case("na")
        || value.eq_ignore_ascii_case("nan")
        || value.eq_ignore_ascii_case("null")
}

fn parse_numeric(value: &str) -> Option<f64> {
    if is_missing(value) {
        return Some(f64::NAN);
    }
    value.parse::<f64>().ok()
}

fn parse_label(value: &str) -> Option<u8> {
    match value.to_ascii_lowercase().as_str() {
        "0" | "0.0" | "false" => Some(0),
        "1" | "1.0" | "true" => Some(1),
        _ => None,
    }
}

/// Parse RFC 3339, `YYYY-MM-DD[ HH:MM:SS[.f]][ UTC]`, or epoch seconds
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }

    let naive = value.strip_suffix(" UTC").unwrap_or(value);
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(naive, format) {
            return Some(Utc.from_utc_datetime(&ts));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(naive, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|ts| Utc.from_utc_datetime(&ts));
    }

    value
        .parse::<i64>()
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
}
