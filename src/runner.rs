//! In-process training worker
//!
//! When a training command is configured, every queued run is handed to the
//! [`TrainingRunner`] through a [`RunnerHandle`]. The runner executes the
//! command with the run's hyper-parameters appended, streams stdout and
//! stderr into the run's logs, and on exit code 0 registers a model version
//! with the metrics parsed from the output.
//!
//! ```text
//! trigger ──RunnerHandle──> TrainingRunner ──spawn──> <command> --rank .. --versionTag <tag>
//!                                 │                         │
//!                                 │<──── stdout/stderr ─────┘
//!                                 ├──> RunRegistry::append_logs
//!                                 └──> TrainingLogParser ──> VersionCatalog::register
//! ```

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use chrono::Utc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::metrics::TrainingLogParser;
use crate::registry::{version_tag_at, RunRegistry, RunStatus, VersionCatalog};
use crate::store::TrainingStore;
use crate::{Error, Result};

/// Sends queued run IDs to a [`TrainingRunner`].
#[derive(Debug, Clone)]
pub struct RunnerHandle {
    tx: mpsc::UnboundedSender<String>,
}

impl RunnerHandle {
    /// Hand a queued run to the runner.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] if the runner has shut down.
    pub fn submit(&self, run_id: impl Into<String>) -> Result<()> {
        self.tx
            .send(run_id.into())
            .map_err(|e| Error::Internal(format!("Training runner is not accepting runs: {e}")))
    }
}

/// Executes the external training command for queued runs.
#[derive(Debug)]
pub struct TrainingRunner<S> {
    registry: RunRegistry<S>,
    catalog: VersionCatalog<S>,
    program: String,
    base_args: Vec<String>,
    working_dir: Option<PathBuf>,
    artifact_dir: String,
    timeout: Duration,
}

impl<S> Clone for TrainingRunner<S> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            catalog: self.catalog.clone(),
            program: self.program.clone(),
            base_args: self.base_args.clone(),
            working_dir: self.working_dir.clone(),
            artifact_dir: self.artifact_dir.clone(),
            timeout: self.timeout,
        }
    }
}

impl<S: TrainingStore + 'static> TrainingRunner<S> {
    /// Create a runner for `command` (program followed by fixed arguments).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `command` is empty.
    pub fn new(
        registry: RunRegistry<S>,
        catalog: VersionCatalog<S>,
        command: &[String],
    ) -> Result<Self> {
        let (program, base_args) = command
            .split_first()
            .ok_or_else(|| Error::Config("training.command must not be empty".into()))?;
        Ok(Self {
            registry,
            catalog,
            program: program.clone(),
            base_args: base_args.to_vec(),
            working_dir: None,
            artifact_dir: "models".into(),
            timeout: Duration::from_secs(3600),
        })
    }

    /// Run the command from this directory.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Prefix of registered artifact paths.
    #[must_use]
    pub fn with_artifact_dir(mut self, dir: impl Into<String>) -> Self {
        self.artifact_dir = dir.into();
        self
    }

    /// Kill the command and fail the run after this long.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Start the dispatch loop on the current runtime.
    ///
    /// Each submitted run executes on its own task. The loop ends when every
    /// handle has been dropped.
    #[must_use]
    pub fn spawn(self) -> RunnerHandle {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        tokio::spawn(async move {
            while let Some(run_id) = rx.recv().await {
                let runner = self.clone();
                tokio::spawn(async move { runner.execute(&run_id).await });
            }
            debug!("Training runner stopped");
        });
        RunnerHandle { tx }
    }

    /// Execute one queued run to completion.
    ///
    /// Failures of the training command end the run as `failed`; they are not
    /// returned as errors.
    pub async fn execute(&self, run_id: &str) {
        let run = match self.registry.start(run_id).await {
            Ok(run) => run,
            Err(e) => {
                warn!(run_id, error = %e, "Could not start training run");
                return;
            }
        };

        let hyper_parameters = run
            .hyper_parameters()
            .copied()
            .unwrap_or_else(|| self.registry.defaults());
        let version_tag = version_tag_at(Utc::now());

        let mut args = self.base_args.clone();
        args.extend(hyper_parameters.to_args());
        args.push("--versionTag".into());
        args.push(version_tag.clone());

        self.log(
            run_id,
            &format!(
                "Training started...\nHyperparameters: {hyper_parameters}\nExecuting command:\n{} {}\n",
                self.program,
                args.join(" ")
            ),
        )
        .await;

        let status = match self.run_command(run_id, &args).await {
            Ok((status, parser)) if status.success() => {
                self.register(run_id, &version_tag, parser).await;
                RunStatus::Success
            }
            Ok((status, _)) => {
                let code = status
                    .code()
                    .map_or_else(|| "signal".to_string(), |c| c.to_string());
                self.log(run_id, &format!("Training failed with exit code {code}\n"))
                    .await;
                RunStatus::Failed
            }
            Err(e) => {
                self.log(run_id, &format!("Training error: {e}\n")).await;
                RunStatus::Failed
            }
        };

        if let Err(e) = self.registry.complete(run_id, status).await {
            error!(run_id, error = %e, "Could not complete training run");
        }
    }

    async fn run_command(
        &self,
        run_id: &str,
        args: &[String],
    ) -> Result<(ExitStatus, TrainingLogParser)> {
        let mut command = Command::new(&self.program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn()?;
        info!(run_id, program = %self.program, "Training process spawned");

        let (tx, mut rx) = mpsc::unbounded_channel();
        if let Some(pipe) = child.stdout.take() {
            forward_lines(pipe, tx.clone());
        }
        if let Some(pipe) = child.stderr.take() {
            forward_lines(pipe, tx);
        }

        let mut parser = TrainingLogParser::new();
        let collect = async {
            while let Some(line) = rx.recv().await {
                parser.feed_line(&line);
                self.log(run_id, &format!("{line}\n")).await;
            }
            child.wait().await
        };

        let outcome = tokio::time::timeout(self.timeout, collect).await;
        match outcome {
            Ok(status) => Ok((status?, parser)),
            Err(_) => {
                if let Err(e) = child.kill().await {
                    warn!(run_id, error = %e, "Could not kill timed-out training process");
                }
                Err(Error::Internal(format!(
                    "training timed out after {}s",
                    self.timeout.as_secs()
                )))
            }
        }
    }

    async fn register(&self, run_id: &str, version_tag: &str, parser: TrainingLogParser) {
        if parser.is_empty() {
            self.log(run_id, "Warning: No metrics extracted from training logs\n")
                .await;
        }
        let validation_ndcg = parser.validation_ndcg();
        let records = parser.into_records(0);
        let metric_count = records.len();
        let artifact_path = format!("{}/als_model_{version_tag}", self.artifact_dir);

        let mut summary = String::from("\nModel training completed successfully.\n");
        if let Some(ndcg) = validation_ndcg {
            summary.push_str(&format!("Validation NDCG@10: {ndcg:.4}\n"));
        }
        match self.catalog.register(version_tag, &artifact_path, records).await {
            Ok(version) => {
                summary.push_str(&format!(
                    "Model version saved: {} (id {})\n  Model path: {artifact_path}\nSaved {metric_count} metrics\n",
                    version.version_tag(),
                    version.id()
                ));
            }
            Err(e) => {
                warn!(run_id, error = %e, "Could not register model version");
                summary.push_str(&format!("Warning: Failed to save model version: {e}\n"));
            }
        }
        self.log(run_id, &summary).await;
    }

    async fn log(&self, run_id: &str, text: &str) {
        if let Err(e) = self.registry.append_logs(run_id, text).await {
            warn!(run_id, error = %e, "Could not append training logs");
        }
    }
}

fn forward_lines<R>(pipe: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut segments = BufReader::new(pipe).split(b'\n');
        loop {
            match segments.next_segment().await {
                Ok(Some(mut bytes)) => {
                    if bytes.last() == Some(&b'\r') {
                        bytes.pop();
                    }
                    let line = String::from_utf8_lossy(&bytes).into_owned();
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Training output stream failed");
                    break;
                }
            }
        }
    });
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::metrics::MetricKind;
    use crate::registry::{TriggerRequest, TriggerSource};
    use crate::store::MemoryStore;
    use std::sync::Arc;

    type Fixture = (
        TrainingRunner<MemoryStore>,
        RunRegistry<MemoryStore>,
        VersionCatalog<MemoryStore>,
    );

    fn runner(script: &str) -> Fixture {
        let store = Arc::new(MemoryStore::default());
        let registry = RunRegistry::new(Arc::clone(&store));
        let catalog = VersionCatalog::new(store);
        let command: Vec<String> = ["sh", "-c", script, "train"]
            .iter()
            .map(ToString::to_string)
            .collect();
        let runner = TrainingRunner::new(registry.clone(), catalog.clone(), &command).unwrap();
        (runner, registry, catalog)
    }

    async fn queued(registry: &RunRegistry<MemoryStore>) -> String {
        registry
            .trigger(TriggerRequest::new(TriggerSource::Manual))
            .await
            .unwrap()
            .run_id()
            .to_string()
    }

    #[test]
    fn test_empty_command_is_config_error() {
        let store = Arc::new(MemoryStore::default());
        let result = TrainingRunner::new(
            RunRegistry::new(Arc::clone(&store)),
            VersionCatalog::new(store),
            &[],
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_successful_run_registers_version_and_metrics() {
        let (runner, registry, catalog) = runner(
            "echo 'METRIC|k=10|precision=0.12|recall=0.4|map=0.3|ndcg=0.5|coverage=0.2|hitRate=0.6'; echo \"args: $@\"",
        );
        let run_id = queued(&registry).await;

        runner.execute(&run_id).await;

        let run = registry.get(&run_id).await.unwrap();
        assert_eq!(run.status(), RunStatus::Success);
        assert!(run.duration().is_some());
        let logs = run.logs().unwrap();
        assert!(logs.contains("--rank 10"));
        assert!(logs.contains("--versionTag"));

        let versions = catalog.list().await.unwrap();
        assert_eq!(versions.len(), 1);
        assert!(versions[0].artifact_path().starts_with("models/als_model_"));
        assert!(!versions[0].is_active());

        let summary = catalog.summary(versions[0].id()).await.unwrap();
        assert!((summary.data.value(MetricKind::HitRate, 10).unwrap() - 60.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_invalid_utf8_output_is_kept_and_run_succeeds() {
        let (runner, registry, catalog) = runner(
            "printf 'Spark warn caf\\351\\n'; \
             echo 'METRIC|k=10|precision=0.12|recall=0.4|map=0.3|ndcg=0.5|coverage=0.2|hitRate=0.6'; \
             echo done",
        );
        let run_id = queued(&registry).await;

        runner.execute(&run_id).await;

        let run = registry.get(&run_id).await.unwrap();
        assert_eq!(run.status(), RunStatus::Success);
        let logs = run.logs().unwrap();
        assert!(logs.contains("Spark warn caf\u{FFFD}"));
        assert!(logs.contains("done"));

        let versions = catalog.list().await.unwrap();
        assert_eq!(versions.len(), 1);
        let summary = catalog.summary(versions[0].id()).await.unwrap();
        assert!((summary.data.value(MetricKind::Precision, 10).unwrap() - 12.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_non_zero_exit_fails_run() {
        let (runner, registry, catalog) = runner("echo boom >&2; exit 3");
        let run_id = queued(&registry).await;

        runner.execute(&run_id).await;

        let run = registry.get(&run_id).await.unwrap();
        assert_eq!(run.status(), RunStatus::Failed);
        let logs = run.logs().unwrap();
        assert!(logs.contains("boom"));
        assert!(logs.contains("exit code 3"));
        assert!(catalog.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_timeout_fails_run() {
        let (runner, registry, _) = runner("sleep 5");
        let runner = runner.with_timeout(Duration::from_millis(100));
        let run_id = queued(&registry).await;

        runner.execute(&run_id).await;

        let run = registry.get(&run_id).await.unwrap();
        assert_eq!(run.status(), RunStatus::Failed);
        assert!(run.logs().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_missing_program_fails_run() {
        let store = Arc::new(MemoryStore::default());
        let registry = RunRegistry::new(Arc::clone(&store));
        let runner = TrainingRunner::new(
            registry.clone(),
            VersionCatalog::new(store),
            &["/nonexistent/train-als".to_string()],
        )
        .unwrap();
        let run_id = queued(&registry).await;

        runner.execute(&run_id).await;

        assert_eq!(registry.get(&run_id).await.unwrap().status(), RunStatus::Failed);
    }

    #[tokio::test]
    async fn test_handle_dispatches_runs() {
        let (runner, registry, _) = runner("exit 0");
        let handle = runner.spawn();
        let run_id = queued(&registry).await;
        handle.submit(run_id.clone()).unwrap();

        for _ in 0..100 {
            if registry.get(&run_id).await.unwrap().status().is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(registry.get(&run_id).await.unwrap().status(), RunStatus::Success);
    }
}
