//! Named boolean health probes with run history and degradation detection.
//!
//! Probes are zero-argument closures registered under a unique name.
//! Each run executes every probe inside a panic boundary: a panicking
//! probe counts as a failure and is recorded, never propagated. Recent
//! outcomes are kept per probe so persistent failure can be told apart
//! from a single bad run.

use std::collections::{BTreeMap, VecDeque};
use std::panic::{AssertUnwindSafe, catch_unwind};

use tracing::{debug, warn};

/// Number of recent outcomes retained per health check.
const HISTORY_WINDOW: usize = 10;

/// Consecutive failing runs that count as degradation.
const DEGRADATION_RUNS: usize = 3;

/// A zero-argument boolean probe.
type Probe = Box<dyn Fn() -> bool + Send + Sync>;

/// One registered health check and its rolling outcome history.
struct HealthCheck {
    name: String,
    probe: Probe,
    history: VecDeque<bool>,
}

impl core::fmt::Debug for HealthCheck {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HealthCheck")
            .field("name", &self.name)
            .field("history", &self.history)
            .finish_non_exhaustive()
    }
}

/// Registry of named health probes with run history.
#[derive(Debug, Default)]
pub struct HealthMonitor {
    checks: Vec<HealthCheck>,
    last_run: BTreeMap<String, bool>,
    runs_completed: u64,
}

impl HealthMonitor {
    /// Create an empty monitor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a probe under a unique name. Re-registering a name
    /// replaces the probe but keeps its recorded history.
    pub fn register_health_check(
        &mut self,
        name: impl Into<String>,
        probe: impl Fn() -> bool + Send + Sync + 'static,
    ) {
        let name = name.into();
        if let Some(existing) = self.checks.iter_mut().find(|c| c.name == name) {
            debug!(check = %name, "Replacing existing health check probe");
            existing.probe = Box::new(probe);
            return;
        }
        self.checks.push(HealthCheck {
            name,
            probe: Box::new(probe),
            history: VecDeque::new(),
        });
    }

    /// Execute every registered probe and return the outcome per check.
    ///
    /// A panic inside a probe is caught and recorded as `false` for that
    /// probe; it never propagates to the caller.
    pub fn run_health_checks(&mut self) -> BTreeMap<String, bool> {
        let mut results = BTreeMap::new();

        for check in &mut self.checks {
            let passed = match catch_unwind(AssertUnwindSafe(|| (check.probe)())) {
                Ok(outcome) => outcome,
                Err(_panic) => {
                    warn!(check = %check.name, "Health probe panicked; recording failure");
                    false
                }
            };

            check.history.push_back(passed);
            while check.history.len() > HISTORY_WINDOW {
                check.history.pop_front();
            }
            results.insert(check.name.clone(), passed);
        }

        self.last_run = results.clone();
        self.runs_completed = self.runs_completed.saturating_add(1);
        debug!(
            checks = results.len(),
            passing = results.values().filter(|p| **p).count(),
            "Health checks completed"
        );
        results
    }

    /// Fraction of probes that passed on the most recent run.
    ///
    /// Well-defined as `0.0` when no checks are registered or no run has
    /// completed yet.
    pub fn get_system_health_score(&self) -> f64 {
        let total = self.last_run.len();
        if total == 0 {
            return 0.0;
        }
        let passing = self.last_run.values().filter(|p| **p).count();
        let passing = u32::try_from(passing).unwrap_or(u32::MAX);
        let total = u32::try_from(total).unwrap_or(u32::MAX);
        f64::from(passing) / f64::from(total)
    }

    /// Checks that have failed every one of the last
    /// [`DEGRADATION_RUNS`] runs, independent of any single reported
    /// error. Checks with fewer recorded runs are never reported.
    pub fn detect_degradation(&self) -> Vec<String> {
        self.checks
            .iter()
            .filter(|check| {
                check.history.len() >= DEGRADATION_RUNS
                    && check
                        .history
                        .iter()
                        .rev()
                        .take(DEGRADATION_RUNS)
                        .all(|passed| !passed)
            })
            .map(|check| {
                format!(
                    "health check '{}' has failed the last {DEGRADATION_RUNS} runs",
                    check.name
                )
            })
            .collect()
    }

    /// Number of registered checks.
    pub fn check_count(&self) -> usize {
        self.checks.len()
    }

    /// Total completed runs since construction.
    pub const fn runs_completed(&self) -> u64 {
        self.runs_completed
    }

    /// Outcome of the most recent run, keyed by check name.
    pub const fn last_run(&self) -> &BTreeMap<String, bool> {
        &self.last_run
    }
}
