//! Model Version - artifact produced by a successful run

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Model Version represents a trained model artifact.
///
/// Versions are immutable once registered, except for the active flag. The
/// store keeps at most one version active at a time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelVersion {
    id: i64,
    version_tag: String,
    artifact_path: String,
    created_at: DateTime<Utc>,
    #[serde(rename = "isActive")]
    is_active: bool,
}

impl ModelVersion {
    /// Create a new, inactive model version.
    ///
    /// # Arguments
    ///
    /// * `id` - Numeric ID assigned by the store
    /// * `version_tag` - Tag such as "2025-11-12_12-30-00"
    /// * `artifact_path` - Where the trained model was written
    #[must_use]
    pub fn new(id: i64, version_tag: impl Into<String>, artifact_path: impl Into<String>) -> Self {
        Self {
            id,
            version_tag: version_tag.into(),
            artifact_path: artifact_path.into(),
            created_at: Utc::now(),
            is_active: false,
        }
    }

    /// Get the numeric ID.
    #[must_use]
    pub const fn id(&self) -> i64 {
        self.id
    }

    /// Get the version tag.
    #[must_use]
    pub fn version_tag(&self) -> &str {
        &self.version_tag
    }

    /// Get the artifact path.
    #[must_use]
    pub fn artifact_path(&self) -> &str {
        &self.artifact_path
    }

    /// Get the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Whether this version is the one being served.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.is_active
    }

    pub(crate) fn set_active(&mut self, active: bool) {
        self.is_active = active;
    }

    /// Set a custom creation timestamp (useful for testing).
    #[must_use]
    pub const fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

/// Tag for a version trained now, e.g. `2025-11-12_12-30-00`.
#[must_use]
pub fn version_tag_at(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d_%H-%M-%S").to_string()
}
