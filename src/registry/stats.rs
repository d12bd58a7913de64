//! Aggregate statistics over training runs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ModelRun, RunStatus};

/// Dashboard summary of all runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingStatistics {
    /// Number of runs
    pub total_runs: usize,
    /// Runs that succeeded
    pub success_count: usize,
    /// Runs that failed
    pub failed_count: usize,
    /// Runs currently executing
    pub running_count: usize,
    /// Runs waiting for a worker
    pub queued_count: usize,
    /// `success / (total - queued) * 100`, 0 when no run has left the queue
    pub success_rate: f64,
    /// Mean wall-clock minutes of completed runs
    pub average_duration_minutes: Option<f64>,
    /// Run with the latest start time
    pub last_run: Option<ModelRun>,
    /// Next fire time of the schedule, when not paused
    pub next_scheduled_run: Option<DateTime<Utc>>,
}

impl TrainingStatistics {
    /// Compute statistics over `runs`.
    ///
    /// `next_scheduled_run` is left empty; see
    /// [`with_next_scheduled_run`](Self::with_next_scheduled_run).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn compute(runs: &[ModelRun]) -> Self {
        let count = |status: RunStatus| runs.iter().filter(|r| r.status() == status).count();

        let total_runs = runs.len();
        let success_count = count(RunStatus::Success);
        let failed_count = count(RunStatus::Failed);
        let running_count = count(RunStatus::Running);
        let queued_count = count(RunStatus::Queued);

        let dequeued = total_runs - queued_count;
        let success_rate = if dequeued == 0 {
            0.0
        } else {
            round2(success_count as f64 / dequeued as f64 * 100.0)
        };

        let durations: Vec<f64> = runs
            .iter()
            .filter(|r| r.status().is_terminal())
            .filter_map(ModelRun::duration_minutes)
            .collect();
        let average_duration_minutes = if durations.is_empty() {
            None
        } else {
            Some(round2(durations.iter().sum::<f64>() / durations.len() as f64))
        };

        let last_run = runs.iter().max_by_key(|r| r.start_time()).cloned();

        Self {
            total_runs,
            success_count,
            failed_count,
            running_count,
            queued_count,
            success_rate,
            average_duration_minutes,
            last_run,
            next_scheduled_run: None,
        }
    }

    /// Attach the schedule's next fire time.
    #[must_use]
    pub const fn with_next_scheduled_run(mut self, next: Option<DateTime<Utc>>) -> Self {
        self.next_scheduled_run = next;
        self
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{HyperParameters, TriggerSource};
    use chrono::Duration;

    fn run_with(status: RunStatus, minutes: i64, offset: i64) -> ModelRun {
        let start = Utc::now() + Duration::hours(offset);
        let mut run = ModelRun::builder(format!("manual__{offset}"), TriggerSource::Manual)
            .hyper_parameters(HyperParameters::default())
            .start_time(start)
            .build();
        if status != RunStatus::Queued {
            run.start().unwrap();
        }
        if status.is_terminal() {
            run.complete_at(status, start + Duration::minutes(minutes)).unwrap();
        }
        run
    }

    #[test]
    fn test_success_rate_excludes_queued() {
        let runs = vec![
            run_with(RunStatus::Success, 10, 0),
            run_with(RunStatus::Failed, 20, 1),
            run_with(RunStatus::Queued, 0, 2),
        ];
        let stats = TrainingStatistics::compute(&runs);
        assert_eq!(stats.total_runs, 3);
        assert_eq!(stats.queued_count, 1);
        assert!((stats.success_rate - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_success_rate_all_queued_is_zero() {
        let runs = vec![run_with(RunStatus::Queued, 0, 0), run_with(RunStatus::Queued, 0, 1)];
        let stats = TrainingStatistics::compute(&runs);
        assert_eq!(stats.success_rate, 0.0);
        assert!(stats.average_duration_minutes.is_none());
    }

    #[test]
    fn test_empty() {
        let stats = TrainingStatistics::compute(&[]);
        assert_eq!(stats.total_runs, 0);
        assert_eq!(stats.success_rate, 0.0);
        assert!(stats.last_run.is_none());
    }

    #[test]
    fn test_average_duration_and_last_run() {
        let runs = vec![
            run_with(RunStatus::Success, 10, 0),
            run_with(RunStatus::Failed, 21, 1),
            run_with(RunStatus::Running, 0, 5),
        ];
        let stats = TrainingStatistics::compute(&runs);
        assert!((stats.average_duration_minutes.unwrap() - 15.5).abs() < 1e-9);
        assert_eq!(stats.last_run.unwrap().run_id(), "manual__5");
        assert!((stats.success_rate - 33.33).abs() < 1e-9);
    }
}
