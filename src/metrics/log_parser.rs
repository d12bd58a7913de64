//! Extract evaluation metrics from the trainer's stdout
//!
//! The training script prints one structured line per cutoff:
//!
//! ```text
//! METRIC|k=10|precision=0.123|recall=0.456|map=0.789|ndcg=0.012|coverage=0.345|hitRate=0.567
//! ```
//!
//! Older scripts only print a validation line such as `NDCG@10 = 0.8523`,
//! which is still honoured for NDCG@10.

use std::collections::BTreeMap;

use super::{MetricKind, MetricName, MetricRecord};

const METRIC_TAG: &str = "METRIC|";
const LEGACY_NDCG: &str = "NDCG@10";

/// Accumulates metric values across trainer output lines.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TrainingLogParser {
    values: BTreeMap<u32, BTreeMap<MetricKind, f64>>,
    legacy_ndcg: Option<f64>,
}

impl TrainingLogParser {
    /// Create an empty parser.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one output line. Returns true if the line carried metrics.
    pub fn feed_line(&mut self, line: &str) -> bool {
        if let Some((k, values)) = parse_metric_line(line) {
            self.values.entry(k).or_default().extend(values);
            return true;
        }
        if let Some(ndcg) = parse_legacy_ndcg(line) {
            self.legacy_ndcg = Some(ndcg);
            self.values
                .entry(10)
                .or_default()
                .entry(MetricKind::Ndcg)
                .or_insert(ndcg);
            return true;
        }
        false
    }

    /// True when nothing has been extracted yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value of the last `NDCG@10 = x` validation line, if one was seen.
    #[must_use]
    pub const fn validation_ndcg(&self) -> Option<f64> {
        self.legacy_ndcg
    }

    /// Extracted value for `kind` at cutoff `k`.
    #[must_use]
    pub fn get(&self, kind: MetricKind, k: u32) -> Option<f64> {
        self.values.get(&k)?.get(&kind).copied()
    }

    /// Convert everything extracted into records for `model_version_id`,
    /// named canonically (`Precision@10`, `Hitrate@20`, ...).
    #[must_use]
    pub fn into_records(self, model_version_id: i64) -> Vec<MetricRecord> {
        self.values
            .into_iter()
            .flat_map(|(k, values)| {
                values.into_iter().map(move |(kind, value)| {
                    MetricRecord::new(model_version_id, MetricName::new(kind, k).to_string(), value)
                })
            })
            .collect()
    }
}

/// Parse a structured `METRIC|k=..|...` line.
///
/// All six values must be present and numeric, otherwise the line is ignored.
#[must_use]
pub fn parse_metric_line(line: &str) -> Option<(u32, Vec<(MetricKind, f64)>)> {
    let start = line.find(METRIC_TAG)?;
    let mut fields = line[start + METRIC_TAG.len()..].trim_end().split('|');

    let k = fields.next()?.strip_prefix("k=")?.parse().ok()?;

    let mut values = Vec::with_capacity(MetricKind::ALL.len());
    for kind in MetricKind::ALL {
        let (key, raw) = fields.next()?.split_once('=')?;
        if !key.eq_ignore_ascii_case(kind.prefix()) {
            return None;
        }
        let value = parse_unsigned_decimal(raw)?;
        values.push((kind, value));
    }

    Some((k, values))
}

fn parse_legacy_ndcg(line: &str) -> Option<f64> {
    line.match_indices(LEGACY_NDCG).find_map(|(start, tag)| {
        let rest = line[start + tag.len()..].trim_start();
        let rest = rest.strip_prefix('=')?.trim_start();
        let end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        parse_unsigned_decimal(&rest[..end])
    })
}

fn parse_unsigned_decimal(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit() || b == b'.') {
        return None;
    }
    raw.parse().ok()
}
