//! Metric kinds and the `<Kind>@<K>` name format

use std::fmt;

use serde::{Deserialize, Serialize};

/// Recognized cutoffs, in the order every aggregated array is indexed by.
pub const CUTOFFS: [u32; 7] = [10, 15, 20, 25, 30, 35, 40];

/// Number of recognized cutoffs.
pub const CUTOFF_COUNT: usize = CUTOFFS.len();

/// Position of `k` in [`CUTOFFS`], or `None` if `k` is not recognized.
#[must_use]
pub fn cutoff_index(k: u32) -> Option<usize> {
    CUTOFFS.iter().position(|&c| c == k)
}

/// Ranking-quality metric reported by the trainer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MetricKind {
    /// Precision@K
    Precision,
    /// Recall@K
    Recall,
    /// Mean Average Precision@K
    Map,
    /// Normalized Discounted Cumulative Gain@K
    Ndcg,
    /// Catalogue coverage@K
    Coverage,
    /// Hit rate@K
    HitRate,
}

impl MetricKind {
    /// All kinds, in prefix-matching priority order.
    pub const ALL: [Self; 6] = [
        Self::Precision,
        Self::Recall,
        Self::Map,
        Self::Ndcg,
        Self::Coverage,
        Self::HitRate,
    ];

    /// Lower-case prefix a metric name must start with to be this kind.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Precision => "precision",
            Self::Recall => "recall",
            Self::Map => "map",
            Self::Ndcg => "ndcg",
            Self::Coverage => "coverage",
            Self::HitRate => "hitrate",
        }
    }

    /// Name written by the trainer, e.g. `Precision` in `Precision@10`.
    #[must_use]
    pub const fn canonical(self) -> &'static str {
        match self {
            Self::Precision => "Precision",
            Self::Recall => "Recall",
            Self::Map => "Map",
            Self::Ndcg => "Ndcg",
            Self::Coverage => "Coverage",
            Self::HitRate => "Hitrate",
        }
    }

    /// Fractions that the dashboard shows as percentages.
    #[must_use]
    pub const fn is_percentage(self) -> bool {
        matches!(
            self,
            Self::Precision | Self::Recall | Self::Coverage | Self::HitRate
        )
    }

    /// Scale a raw value for display.
    #[must_use]
    pub fn scale(self, raw: f64) -> f64 {
        if self.is_percentage() {
            raw * 100.0
        } else {
            raw
        }
    }

    /// Match a metric-type token by case-insensitive prefix.
    ///
    /// Returns `None` if no kind matches or if more than one does.
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        let token = token.trim().to_ascii_lowercase();
        let mut matched = Self::ALL
            .into_iter()
            .filter(|kind| token.starts_with(kind.prefix()));
        let kind = matched.next()?;
        if matched.next().is_some() {
            return None;
        }
        Some(kind)
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical())
    }
}

/// A parsed `<Kind>@<K>` metric name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MetricName {
    /// Metric kind
    pub kind: MetricKind,
    /// Cutoff
    pub k: u32,
}

impl MetricName {
    /// Create a metric name.
    #[must_use]
    pub const fn new(kind: MetricKind, k: u32) -> Self {
        Self { kind, k }
    }

    /// Parse a raw metric name.
    ///
    /// The name must end in `@<digits>`; the part before the last `@` is
    /// matched with [`MetricKind::from_token`]. The cutoff is not checked
    /// against [`CUTOFFS`] here.
    ///
    /// ```rust
    /// use als_ops::metrics::{MetricKind, MetricName};
    ///
    /// let name = MetricName::parse("Precision@10").unwrap();
    /// assert_eq!(name.kind, MetricKind::Precision);
    /// assert_eq!(name.k, 10);
    ///
    /// assert!(MetricName::parse("RMSE").is_none());
    /// assert!(MetricName::parse("Recall@ten").is_none());
    /// ```
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let (token, k) = raw.trim().rsplit_once('@')?;
        if k.is_empty() || !k.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let k = k.parse().ok()?;
        Some(Self::new(MetricKind::from_token(token)?, k))
    }

    /// Index into the fixed cutoff arrays, if `k` is recognized.
    #[must_use]
    pub fn cutoff_index(self) -> Option<usize> {
        cutoff_index(self.k)
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.kind, self.k)
    }
}
