//! Metric Record - one evaluation value stored for a model version

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::MetricName;

/// Metric Record represents a single evaluation data point.
///
/// Records are append-only and scoped to one model version. The
/// `metric_name` is free text on the wire; aggregation only picks up names
/// of the form `<Kind>@<K>` (see [`MetricName`]).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricRecord {
    model_version_id: i64,
    metric_name: String,
    metric_value: f64,
    timestamp: DateTime<Utc>,
}

impl MetricRecord {
    /// Create a new metric record.
    ///
    /// # Arguments
    ///
    /// * `model_version_id` - ID of the model version the value belongs to
    /// * `metric_name` - Metric name (e.g., "Precision@10")
    /// * `metric_value` - Raw metric value (fractions are not pre-scaled)
    ///
    /// # Returns
    ///
    /// A new `MetricRecord` with the current timestamp.
    #[must_use]
    pub fn new(model_version_id: i64, metric_name: impl Into<String>, metric_value: f64) -> Self {
        Self {
            model_version_id,
            metric_name: metric_name.into(),
            metric_value,
            timestamp: Utc::now(),
        }
    }

    /// Create a builder for constructing a metric record with optional fields.
    #[must_use]
    pub fn builder(
        model_version_id: i64,
        metric_name: impl Into<String>,
        metric_value: f64,
    ) -> MetricRecordBuilder {
        MetricRecordBuilder::new(model_version_id, metric_name, metric_value)
    }

    /// Get the model version ID.
    #[must_use]
    pub const fn model_version_id(&self) -> i64 {
        self.model_version_id
    }

    /// Get the raw metric name.
    #[must_use]
    pub fn metric_name(&self) -> &str {
        &self.metric_name
    }

    /// Get the metric value.
    #[must_use]
    pub const fn metric_value(&self) -> f64 {
        self.metric_value
    }

    /// Get the timestamp when the metric was recorded.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Parse the name into kind and cutoff, if it has that shape.
    #[must_use]
    pub fn parsed_name(&self) -> Option<MetricName> {
        MetricName::parse(&self.metric_name)
    }
}

/// Builder for `MetricRecord`.
#[derive(Debug)]
pub struct MetricRecordBuilder {
    model_version_id: i64,
    metric_name: String,
    metric_value: f64,
    timestamp: DateTime<Utc>,
}

impl MetricRecordBuilder {
    /// Create a new builder with required fields.
    #[must_use]
    pub fn new(model_version_id: i64, metric_name: impl Into<String>, metric_value: f64) -> Self {
        Self {
            model_version_id,
            metric_name: metric_name.into(),
            metric_value,
            timestamp: Utc::now(),
        }
    }

    /// Set a custom timestamp.
    #[must_use]
    pub const fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Build the `MetricRecord`.
    #[must_use]
    pub fn build(self) -> MetricRecord {
        MetricRecord {
            model_version_id: self.model_version_id,
            metric_name: self.metric_name,
            metric_value: self.metric_value,
            timestamp: self.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricKind;

    #[test]
    fn test_metric_record_new() {
        let metric = MetricRecord::new(3, "Precision@10", 0.5);
        assert_eq!(metric.model_version_id(), 3);
        assert_eq!(metric.metric_name(), "Precision@10");
        assert!((metric.metric_value() - 0.5).abs() < f64::EPSILON);
        assert_eq!(metric.parsed_name().unwrap().kind, MetricKind::Precision);
    }

    #[test]
    fn test_metric_record_builder_timestamp() {
        let ts = chrono::DateTime::parse_from_rfc3339("2025-11-12T12:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let metric = MetricRecord::builder(1, "Recall@20", 0.25).timestamp(ts).build();
        assert_eq!(metric.timestamp(), ts);
    }
}
