//! Bounded-concurrency execution of work units.
//!
//! Each phase expands into independent units whose outputs are disjoint
//! files. A unit whose output already exists is skipped without running.
//! Failures and panics are contained to their unit and reported.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::phases::Phase;

/// Lifecycle of a unit.
///
/// Every unit starts `Pending`. A unit that runs passes through `Running`
/// before its terminal state. Reports hold terminal states only; the
/// transitions are logged and passed to the driver's [`StateHook`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "message", rename_all = "snake_case")]
pub enum UnitState {
    Pending,
    Skipped,
    Running,
    Succeeded,
    Failed(String),
}

impl UnitState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Skipped => "skipped",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed(_) => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Skipped | Self::Succeeded | Self::Failed(_))
    }
}

/// One unit of work producing a single output.
///
/// `run` is blocking and is executed on the blocking thread pool.
pub trait WorkUnit: Send + Sync + 'static {
    /// Stable identifier, e.g. `summarize/oregon/1990`.
    fn id(&self) -> String;

    /// Output whose existence marks the unit complete.
    fn output_path(&self) -> &Path;

    fn run(&self) -> anyhow::Result<()>;
}

/// Final state of one unit.
#[derive(Debug, Clone, Serialize)]
pub struct UnitReport {
    pub id: String,
    pub output_path: PathBuf,
    #[serde(flatten)]
    pub state: UnitState,
    pub elapsed_ms: u64,
}

/// Outcome of running one phase.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseReport {
    pub phase: Phase,
    /// Sorted by unit id.
    pub units: Vec<UnitReport>,
    pub elapsed_ms: u64,
}

impl PhaseReport {
    fn count(&self, label: &str) -> usize {
        self.units.iter().filter(|u| u.state.label() == label).count()
    }

    pub fn skipped(&self) -> usize {
        self.count("skipped")
    }

    pub fn succeeded(&self) -> usize {
        self.count("succeeded")
    }

    pub fn failed(&self) -> usize {
        self.count("failed")
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &str)> {
        self.units.iter().filter_map(|u| match &u.state {
            UnitState::Failed(msg) => Some((u.id.as_str(), msg.as_str())),
            _ => None,
        })
    }
}

/// Called with the unit id on every state change.
pub type StateHook = Arc<dyn Fn(&str, &UnitState) + Send + Sync>;

fn transition(hook: &Option<StateHook>, phase: Phase, id: &str, state: &UnitState) {
    debug!(phase = %phase, unit = %id, state = state.label(), "Unit state changed");
    if let Some(hook) = hook {
        hook(id, state);
    }
}

/// Runs the units of a phase with at most `concurrency` in flight.
#[derive(Clone)]
pub struct BatchDriver {
    concurrency: usize,
    hook: Option<StateHook>,
}

impl std::fmt::Debug for BatchDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchDriver")
            .field("concurrency", &self.concurrency)
            .field("hook", &self.hook.is_some())
            .finish()
    }
}

impl BatchDriver {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            hook: None,
        }
    }

    /// Observe unit state changes.
    pub fn with_hook(mut self, hook: StateHook) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run every unit and collect a report once all have finished.
    pub async fn run_phase(&self, phase: Phase, units: Vec<Arc<dyn WorkUnit>>) -> PhaseReport {
        let start = Instant::now();
        let total = units.len();

        info!(
            phase = %phase,
            units = total,
            concurrency = self.concurrency,
            "Starting phase"
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut reports = Vec::with_capacity(total);
        let mut handles = Vec::new();

        for unit in units {
            let id = unit.id();
            let output_path = unit.output_path().to_path_buf();
            transition(&self.hook, phase, &id, &UnitState::Pending);

            if output_path.exists() {
                info!(phase = %phase, unit = %id, "Output exists, skipping");
                transition(&self.hook, phase, &id, &UnitState::Skipped);
                reports.push(UnitReport {
                    id,
                    output_path,
                    state: UnitState::Skipped,
                    elapsed_ms: 0,
                });
                continue;
            }

            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    let state = UnitState::Failed(format!("scheduler closed: {}", e));
                    transition(&self.hook, phase, &id, &state);
                    reports.push(UnitReport {
                        id,
                        output_path,
                        state,
                        elapsed_ms: 0,
                    });
                    continue;
                }
            };

            let hook = self.hook.clone();
            let task_id = id.clone();
            let handle = tokio::spawn(async move {
                let unit_start = Instant::now();
                let result = tokio::task::spawn_blocking(move || {
                    transition(&hook, phase, &task_id, &UnitState::Running);
                    unit.run()
                })
                .await;
                drop(permit);
                (result, unit_start.elapsed().as_millis() as u64)
            });
            handles.push((id, output_path, handle));
        }

        for (id, output_path, handle) in handles {
            let (state, elapsed_ms) = match handle.await {
                Ok((Ok(Ok(())), elapsed)) => {
                    info!(phase = %phase, unit = %id, elapsed_ms = elapsed, "Unit succeeded");
                    (UnitState::Succeeded, elapsed)
                }
                Ok((Ok(Err(e)), elapsed)) => {
                    let message = format!("{:#}", e);
                    error!(phase = %phase, unit = %id, error = %message, "Unit failed");
                    (UnitState::Failed(message), elapsed)
                }
                Ok((Err(join_error), elapsed)) => {
                    warn!(phase = %phase, unit = %id, error = %join_error, "Unit panicked");
                    (UnitState::Failed(format!("panicked: {}", join_error)), elapsed)
                }
                Err(join_error) => {
                    warn!(phase = %phase, unit = %id, error = %join_error, "Unit task panicked");
                    (UnitState::Failed(format!("panicked: {}", join_error)), 0)
                }
            };
            transition(&self.hook, phase, &id, &state);
            reports.push(UnitReport {
                id,
                output_path,
                state,
                elapsed_ms,
            });
        }

        reports.sort_by(|a, b| a.id.cmp(&b.id));

        let report = PhaseReport {
            phase,
            units: reports,
            elapsed_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            phase = %phase,
            skipped = report.skipped(),
            succeeded = report.succeeded(),
            failed = report.failed(),
            elapsed_ms = report.elapsed_ms,
            "Phase complete"
        );

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FileUnit {
        id: String,
        output: PathBuf,
        runs: Arc<AtomicUsize>,
        behaviour: Behaviour,
    }

    #[derive(Clone, Copy)]
    enum Behaviour {
        Write,
        Fail,
        Panic,
    }

    impl WorkUnit for FileUnit {
        fn id(&self) -> String {
            self.id.clone()
        }

        fn output_path(&self) -> &Path {
            &self.output
        }

        fn run(&self) -> anyhow::Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            match self.behaviour {
                Behaviour::Write => {
                    std::fs::write(&self.output, self.id.as_bytes())?;
                    Ok(())
                }
                Behaviour::Fail => anyhow::bail!("no input for {}", self.id),
                Behaviour::Panic => panic!("unit blew up"),
            }
        }
    }

    fn unit(dir: &Path, id: &str, behaviour: Behaviour, runs: &Arc<AtomicUsize>) -> Arc<dyn WorkUnit> {
        Arc::new(FileUnit {
            id: id.to_string(),
            output: dir.join(format!("{}.out", id)),
            runs: runs.clone(),
            behaviour,
        })
    }

    #[tokio::test]
    async fn test_failures_and_panics_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let runs = Arc::new(AtomicUsize::new(0));
        let units = vec![
            unit(dir.path(), "c", Behaviour::Write, &runs),
            unit(dir.path(), "a", Behaviour::Panic, &runs),
            unit(dir.path(), "b", Behaviour::Fail, &runs),
            unit(dir.path(), "d", Behaviour::Write, &runs),
        ];

        let report = BatchDriver::new(2).run_phase(Phase::Mask, units).await;

        let ids: Vec<&str> = report.units.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 2);
        assert!(report.has_failures());
        assert!(matches!(&report.units[0].state, UnitState::Failed(m) if m.contains("panicked")));
        assert!(matches!(&report.units[1].state, UnitState::Failed(m) if m.contains("no input for b")));
        assert!(dir.path().join("c.out").exists());
        assert!(dir.path().join("d.out").exists());
        assert_eq!(runs.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_existing_output_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let runs = Arc::new(AtomicUsize::new(0));
        std::fs::write(dir.path().join("done.out"), b"previous").unwrap();

        let units = vec![
            unit(dir.path(), "done", Behaviour::Write, &runs),
            unit(dir.path(), "new", Behaviour::Write, &runs),
        ];
        let report = BatchDriver::new(4).run_phase(Phase::Summarize, units).await;

        assert_eq!(report.skipped(), 1);
        assert_eq!(report.succeeded(), 1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(std::fs::read(dir.path().join("done.out")).unwrap(), b"previous");
    }

    #[tokio::test]
    async fn test_zero_concurrency_still_runs() {
        let dir = tempfile::tempdir().unwrap();
        let runs = Arc::new(AtomicUsize::new(0));
        let driver = BatchDriver::new(0);
        assert_eq!(driver.concurrency(), 1);

        let units = (0..5)
            .map(|i| unit(dir.path(), &format!("u{}", i), Behaviour::Write, &runs))
            .collect();
        let report = driver.run_phase(Phase::Difference, units).await;
        assert_eq!(report.succeeded(), 5);
    }

    #[tokio::test]
    async fn test_hook_sees_every_transition() {
        use std::sync::Mutex;

        let dir = tempfile::tempdir().unwrap();
        let runs = Arc::new(AtomicUsize::new(0));
        std::fs::write(dir.path().join("done.out"), b"previous").unwrap();

        let seen: Arc<Mutex<Vec<(String, &'static str)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let driver = BatchDriver::new(2).with_hook(Arc::new(move |id: &str, state: &UnitState| {
            sink.lock().unwrap().push((id.to_string(), state.label()));
        }));

        let units = vec![
            unit(dir.path(), "done", Behaviour::Write, &runs),
            unit(dir.path(), "new", Behaviour::Write, &runs),
            unit(dir.path(), "bad", Behaviour::Fail, &runs),
        ];
        driver.run_phase(Phase::Mask, units).await;

        let seen = seen.lock().unwrap();
        let states = |id: &str| -> Vec<&str> {
            seen.iter().filter(|(u, _)| u == id).map(|(_, s)| *s).collect()
        };
        assert_eq!(states("done"), vec!["pending", "skipped"]);
        assert_eq!(states("new"), vec!["pending", "running", "succeeded"]);
        assert_eq!(states("bad"), vec!["pending", "running", "failed"]);
    }

    #[test]
    fn test_unit_state_serializes_with_message() {
        let json = serde_json::to_value(UnitState::Failed("boom".into())).unwrap();
        assert_eq!(json, serde_json::json!({"state": "failed", "message": "boom"}));
        let json = serde_json::to_value(UnitState::Skipped).unwrap();
        assert_eq!(json, serde_json::json!({"state": "skipped"}));
        assert!(UnitState::Skipped.is_terminal());
        assert!(!UnitState::Running.is_terminal());
    }
}
