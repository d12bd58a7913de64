//! Metric aggregation: raw records to fixed-shape dashboard arrays

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::{MetricKind, MetricRecord, CUTOFFS, CUTOFF_COUNT};

/// Per-cutoff values for the single-K summary view (no NDCG).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    /// Precision, percent
    pub precision: f64,
    /// Recall, percent
    pub recall: f64,
    /// MAP, unscaled
    pub map: f64,
    /// Coverage, percent
    pub coverage: f64,
    /// Hit rate, percent
    #[serde(rename = "hitRate")]
    pub hit_rate: f64,
}

/// Aggregated metrics for one model version.
///
/// Every array has one slot per entry of [`CUTOFFS`], in that order. Slots
/// with no matching record hold `0.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsData {
    /// Precision@K, percent
    pub precision: [f64; CUTOFF_COUNT],
    /// Recall@K, percent
    pub recall: [f64; CUTOFF_COUNT],
    /// MAP@K, unscaled
    pub map: [f64; CUTOFF_COUNT],
    /// NDCG@K, unscaled
    pub ndcg: [f64; CUTOFF_COUNT],
    /// Coverage@K, percent
    pub coverage: [f64; CUTOFF_COUNT],
    /// HitRate@K, percent
    #[serde(rename = "hitRate")]
    pub hit_rate: [f64; CUTOFF_COUNT],
    /// Summary per recognized cutoff
    pub summaries: BTreeMap<u32, MetricSummary>,
}

impl Default for MetricsData {
    fn default() -> Self {
        Self {
            precision: [0.0; CUTOFF_COUNT],
            recall: [0.0; CUTOFF_COUNT],
            map: [0.0; CUTOFF_COUNT],
            ndcg: [0.0; CUTOFF_COUNT],
            coverage: [0.0; CUTOFF_COUNT],
            hit_rate: [0.0; CUTOFF_COUNT],
            summaries: CUTOFFS
                .iter()
                .map(|&k| (k, MetricSummary::default()))
                .collect(),
        }
    }
}

impl MetricsData {
    /// Series for one metric kind.
    #[must_use]
    pub const fn series(&self, kind: MetricKind) -> &[f64; CUTOFF_COUNT] {
        match kind {
            MetricKind::Precision => &self.precision,
            MetricKind::Recall => &self.recall,
            MetricKind::Map => &self.map,
            MetricKind::Ndcg => &self.ndcg,
            MetricKind::Coverage => &self.coverage,
            MetricKind::HitRate => &self.hit_rate,
        }
    }

    fn series_mut(&mut self, kind: MetricKind) -> &mut [f64; CUTOFF_COUNT] {
        match kind {
            MetricKind::Precision => &mut self.precision,
            MetricKind::Recall => &mut self.recall,
            MetricKind::Map => &mut self.map,
            MetricKind::Ndcg => &mut self.ndcg,
            MetricKind::Coverage => &mut self.coverage,
            MetricKind::HitRate => &mut self.hit_rate,
        }
    }

    /// Scaled value for `kind` at cutoff `k`, or `None` if `k` is not recognized.
    #[must_use]
    pub fn value(&self, kind: MetricKind, k: u32) -> Option<f64> {
        super::cutoff_index(k).map(|idx| self.series(kind)[idx])
    }

    /// Summary at cutoff `k`, or `None` if `k` is not recognized.
    #[must_use]
    pub fn summary(&self, k: u32) -> Option<&MetricSummary> {
        self.summaries.get(&k)
    }

    /// True when no slot holds a non-zero value.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        MetricKind::ALL
            .iter()
            .all(|&kind| self.series(kind).iter().all(|v| *v == 0.0))
    }
}

/// Aggregate the records of one model version into [`MetricsData`].
///
/// Records whose name has no trailing `@<K>`, whose kind is unknown, or whose
/// `K` is outside [`CUTOFFS`] are skipped. When several records share the
/// same kind and cutoff, the one with the newest timestamp wins; on equal
/// timestamps the later record in iteration order wins.
///
/// ```rust
/// use als_ops::metrics::{aggregate, MetricRecord};
///
/// let data = aggregate(&[
///     MetricRecord::new(1, "Precision@10", 0.42),
///     MetricRecord::new(1, "NDCG@20", 0.75),
///     MetricRecord::new(1, "Precision@999", 0.99),
/// ]);
/// assert!((data.precision[0] - 42.0).abs() < 1e-9);
/// assert!((data.ndcg[2] - 0.75).abs() < 1e-9);
/// ```
#[must_use]
pub fn aggregate(records: &[MetricRecord]) -> MetricsData {
    let mut chosen: [[Option<(DateTime<Utc>, f64)>; CUTOFF_COUNT]; MetricKind::ALL.len()] =
        [[None; CUTOFF_COUNT]; MetricKind::ALL.len()];

    for record in records {
        let Some(name) = record.parsed_name() else {
            trace!(metric_name = record.metric_name(), "skipping unparseable metric name");
            continue;
        };
        let Some(idx) = name.cutoff_index() else {
            trace!(metric_name = record.metric_name(), k = name.k, "skipping unrecognized cutoff");
            continue;
        };

        let slot = &mut chosen[name.kind as usize][idx];
        let newer = slot.is_none_or(|(ts, _)| record.timestamp() >= ts);
        if newer {
            *slot = Some((record.timestamp(), record.metric_value()));
        }
    }

    let mut data = MetricsData::default();
    for kind in MetricKind::ALL {
        let series = data.series_mut(kind);
        for (idx, slot) in chosen[kind as usize].iter().enumerate() {
            if let Some((_, raw)) = slot {
                series[idx] = kind.scale(*raw);
            }
        }
    }

    for (idx, &k) in CUTOFFS.iter().enumerate() {
        data.summaries.insert(
            k,
            MetricSummary {
                precision: data.precision[idx],
                recall: data.recall[idx],
                map: data.map[idx],
                coverage: data.coverage[idx],
                hit_rate: data.hit_rate[idx],
            },
        );
    }

    data
}
