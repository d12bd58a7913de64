//! # als-ops: Training Operations for an ALS Recommender
//!
//! **Version**: 0.1.0
//!
//! als-ops tracks the training lifecycle of an ALS collaborative-filtering
//! recommender: the runs that train it, the model versions those runs
//! produce, the ranking metrics recorded for each version, and the schedule
//! that drives periodic retraining. State is served over HTTP/JSON for a
//! dashboard.
//!
//! ## Components
//!
//! - [`metrics`]: `Kind@K` metric records, the trainer-log parser, and the
//!   aggregation into fixed-shape chart arrays
//! - [`registry`]: run lifecycle, filtering, pagination, statistics, logs and
//!   the model version catalogue
//! - [`schedule`]: the singleton cron schedule with pause/resume
//! - [`store`]: persistence trait and the in-memory backend
//! - [`runner`]: optional in-process worker executing the training command
//! - [`api`]: axum router and server
//! - [`config`]: layered configuration
//!
//! ## Example Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use als_ops::registry::{RunRegistry, TriggerRequest, TriggerSource, VersionCatalog};
//! use als_ops::metrics::MetricRecord;
//! use als_ops::store::MemoryStore;
//!
//! # async fn example() -> als_ops::Result<()> {
//! let store = Arc::new(MemoryStore::default());
//! let registry = RunRegistry::new(Arc::clone(&store));
//! let catalog = VersionCatalog::new(store);
//!
//! let run = registry.trigger(TriggerRequest::new(TriggerSource::Manual)).await?;
//! registry.start(run.run_id()).await?;
//!
//! let version = catalog
//!     .register(
//!         "2025-11-12_12-30-00",
//!         "models/als_model_2025-11-12_12-30-00",
//!         vec![MetricRecord::new(0, "Precision@10", 0.12)],
//!     )
//!     .await?;
//! registry.complete(run.run_id(), als_ops::registry::RunStatus::Success).await?;
//!
//! let summary = catalog.summary(version.id()).await?;
//! assert_eq!(summary.data.precision[0], 12.0);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod api;
pub mod config;
pub mod error;
pub mod metrics;
pub mod registry;
pub mod runner;
pub mod schedule;
pub mod store;

pub use error::{Error, Result};
