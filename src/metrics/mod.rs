//! Ranking metrics for trained model versions
//!
//! Each successful training run produces one model version and a set of
//! metric records named `<Kind>@<K>`. This module owns the record type, the
//! name grammar, the parser for the trainer's log output, and the aggregation
//! that turns a version's records into the fixed-shape arrays the dashboard
//! charts.
//!
//! ```text
//! trainer stdout ──> TrainingLogParser ──> MetricRecord (N) ──> aggregate() ──> MetricsData
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use als_ops::metrics::{aggregate, MetricKind, TrainingLogParser, CUTOFFS};
//!
//! let mut parser = TrainingLogParser::new();
//! parser.feed_line(
//!     "METRIC|k=10|precision=0.12|recall=0.4|map=0.3|ndcg=0.5|coverage=0.2|hitRate=0.6",
//! );
//!
//! let records = parser.into_records(1);
//! let data = aggregate(&records);
//!
//! assert_eq!(data.precision.len(), CUTOFFS.len());
//! assert!((data.value(MetricKind::HitRate, 10).unwrap() - 60.0).abs() < 1e-9);
//! ```

mod aggregate;
mod kind;
mod log_parser;
mod record;

pub use aggregate::{aggregate, MetricSummary, MetricsData};
pub use kind::{cutoff_index, MetricKind, MetricName, CUTOFFS, CUTOFF_COUNT};
pub use log_parser::{parse_metric_line, TrainingLogParser};
pub use record::{MetricRecord, MetricRecordBuilder};
