//! Trial Execution
//!
//! Runs the configured operations of one trial inside a provisioned
//! workspace and times each one. The workspace is owned by the runner for the
//! duration of the trial and removed before `run_trial` returns.
//!
//! ## Timeout
//!
//! ```text
//! spawn ──► wait for exit (unreaped) ──► stop watchdog ──► reap
//!   │
//!   └─ watchdog: timeout elapsed, still running ─► SIGTERM ─► grace (500ms) ─► SIGKILL
//! ```
//!
//! Each operation runs in its own process group so the signals reach
//! anything the operation started.

use crate::measure::{Timer, nanos_to_millis};
use crate::variant::VariantConfig;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, warn};

/// Time between SIGTERM and SIGKILL for a timed-out operation
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_millis(500);

/// One external operation timed in every trial
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationSpec {
    /// Name of the duration this operation produces
    pub name: String,
    pub program: String,
    /// Arguments; `{trial}`, `{variant}` and `{workspace}` are substituted
    pub args: Vec<String>,
    /// Capability that must be enabled for the operation to run
    pub requires: Option<String>,
}

impl OperationSpec {
    pub fn new(name: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            requires: None,
        }
    }

    /// `/bin/sh -c <script>`
    pub fn shell(name: impl Into<String>, script: impl Into<String>) -> Self {
        Self::new(name, "/bin/sh").args(["-c".to_string(), script.into()])
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn requires(mut self, capability: impl Into<String>) -> Self {
        self.requires = Some(capability.into());
        self
    }

    /// Whether `variant` disables the capability this operation needs
    pub fn is_disabled_for(&self, variant: &VariantConfig) -> bool {
        self.requires
            .as_deref()
            .is_some_and(|capability| !variant.is_enabled(capability))
    }
}

/// Why an operation did not complete successfully
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrialFailure {
    #[error("failed to launch '{program}': {message}")]
    Spawn { program: String, message: String },

    #[error("exit status {}", describe_exit(.code))]
    Exit { code: Option<i32> },

    #[error("timed out after {timeout_ms} ms")]
    TimedOut { timeout_ms: u64 },

    #[error("failed to wait for process: {0}")]
    Wait(String),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "none (killed by signal)".to_string(),
    }
}

/// Timing of one named operation
#[derive(Debug, Clone, PartialEq)]
pub struct NamedDuration {
    pub name: String,
    pub elapsed_nanos: u64,
    pub success: bool,
    /// False when the operation was disabled for the variant
    pub launched: bool,
    pub failure: Option<TrialFailure>,
}

impl NamedDuration {
    pub fn duration_ms(&self) -> f64 {
        nanos_to_millis(self.elapsed_nanos)
    }

    fn disabled(name: &str) -> Self {
        Self {
            name: name.to_string(),
            elapsed_nanos: 0,
            success: true,
            launched: false,
            failure: None,
        }
    }
}

/// One executed trial
#[derive(Debug, Clone, PartialEq)]
pub struct TrialRecord {
    pub variant: String,
    pub trial_index: usize,
    pub is_warmup: bool,
    /// In operation order; failed operations keep their partial timing
    pub durations: Vec<NamedDuration>,
    /// Every operation succeeded
    pub success: bool,
}

impl TrialRecord {
    pub fn duration(&self, name: &str) -> Option<&NamedDuration> {
        self.durations.iter().find(|d| d.name == name)
    }

    /// First failure in operation order
    pub fn failure(&self) -> Option<&TrialFailure> {
        self.durations.iter().find_map(|d| d.failure.as_ref())
    }
}

/// Executes trials against provisioned workspaces
#[derive(Debug, Clone)]
pub struct TrialRunner {
    operations: Vec<OperationSpec>,
    timeout: Option<Duration>,
    grace: Duration,
    verbose: bool,
}

impl TrialRunner {
    pub fn new(operations: Vec<OperationSpec>) -> Self {
        Self {
            operations,
            timeout: None,
            grace: DEFAULT_GRACE_PERIOD,
            verbose: false,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Let operations write to stderr
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn operations(&self) -> &[OperationSpec] {
        &self.operations
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Run every operation once in `workspace`, then remove it.
    ///
    /// All operations run even after a failure; the record is successful
    /// only if each of them is.
    pub fn run_trial(
        &self,
        workspace: TempDir,
        variant: &VariantConfig,
        trial_index: usize,
        is_warmup: bool,
    ) -> TrialRecord {
        let durations: Vec<NamedDuration> = self
            .operations
            .iter()
            .map(|op| {
                if op.is_disabled_for(variant) {
                    NamedDuration::disabled(&op.name)
                } else {
                    self.run_operation(op, workspace.path(), variant, trial_index)
                }
            })
            .collect();

        let path = workspace.path().to_path_buf();
        if let Err(e) = workspace.close() {
            warn!(workspace = %path.display(), error = %e, "failed to remove trial workspace");
        }

        let success = durations.iter().all(|d| d.success);
        debug!(
            variant = variant.name(),
            trial = trial_index,
            warmup = is_warmup,
            success,
            "trial complete"
        );

        TrialRecord {
            variant: variant.name().to_string(),
            trial_index,
            is_warmup,
            durations,
            success,
        }
    }

    fn run_operation(
        &self,
        op: &OperationSpec,
        workspace: &Path,
        variant: &VariantConfig,
        trial_index: usize,
    ) -> NamedDuration {
        let expand = |s: &str| {
            s.replace("{trial}", &trial_index.to_string())
                .replace("{variant}", variant.name())
                .replace("{workspace}", &workspace.display().to_string())
        };

        let program = expand(&op.program);
        let mut command = Command::new(&program);
        command
            .args(op.args.iter().map(|a| expand(a)))
            .current_dir(workspace)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(if self.verbose {
                Stdio::inherit()
            } else {
                Stdio::null()
            })
            .process_group(0);

        let timer = Timer::start();
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                let elapsed_nanos = timer.stop();
                return self.failed(
                    op,
                    elapsed_nanos,
                    TrialFailure::Spawn {
                        program,
                        message: e.to_string(),
                    },
                );
            }
        };
        let watchdog = self
            .timeout
            .map(|timeout| Watchdog::arm(child.id(), timeout, self.grace));
        let exited = wait_exited(child.id());
        let elapsed_nanos = timer.stop();

        // The child stays unreaped until the watchdog has stopped, so its
        // process group id cannot be reused while a signal may still be sent.
        let timed_out = watchdog.is_some_and(Watchdog::disarm);
        let reaped = child.wait();
        let status = exited.and(reaped);
        if timed_out {
            let timeout_ms = self.timeout.map_or(0, |t| t.as_millis() as u64);
            return self.failed(op, elapsed_nanos, TrialFailure::TimedOut { timeout_ms });
        }

        match status {
            Ok(status) if status.success() => NamedDuration {
                name: op.name.clone(),
                elapsed_nanos,
                success: true,
                launched: true,
                failure: None,
            },
            Ok(status) => self.failed(op, elapsed_nanos, TrialFailure::Exit {
                code: status.code(),
            }),
            Err(e) => self.failed(op, elapsed_nanos, TrialFailure::Wait(e.to_string())),
        }
    }

    fn failed(
        &self,
        op: &OperationSpec,
        elapsed_nanos: u64,
        failure: TrialFailure,
    ) -> NamedDuration {
        warn!(operation = %op.name, error = %failure, "operation failed");
        NamedDuration {
            name: op.name.clone(),
            elapsed_nanos,
            success: false,
            launched: !matches!(failure, TrialFailure::Spawn { .. }),
            failure: Some(failure),
        }
    }
}

/// Background thread that terminates a process group once a timeout elapses
struct Watchdog {
    done: mpsc::Sender<()>,
    handle: JoinHandle<bool>,
}

impl Watchdog {
    fn arm(pid: u32, timeout: Duration, grace: Duration) -> Self {
        let (done, finished) = mpsc::channel::<()>();
        let handle = thread::spawn(move || {
            if !matches!(finished.recv_timeout(timeout), Err(RecvTimeoutError::Timeout)) {
                return false;
            }
            if has_exited(pid) {
                return false;
            }
            signal_group(pid, libc::SIGTERM);
            if matches!(finished.recv_timeout(grace), Err(RecvTimeoutError::Timeout)) {
                signal_group(pid, libc::SIGKILL);
            }
            true
        });
        Self { done, handle }
    }

    /// Stop the watchdog; returns whether it fired
    fn disarm(self) -> bool {
        let _ = self.done.send(());
        self.handle.join().unwrap_or(false)
    }
}

/// Block until child `pid` has exited, leaving it unreaped
fn wait_exited(pid: u32) -> std::io::Result<()> {
    loop {
        // SAFETY: siginfo_t is plain data and is only written by waitid
        let mut info: libc::siginfo_t = unsafe { std::mem::zeroed() };
        let ret = unsafe {
            libc::waitid(
                libc::P_PID,
                pid as libc::id_t,
                &mut info,
                libc::WEXITED | libc::WNOWAIT,
            )
        };
        if ret == 0 {
            return Ok(());
        }
        let err = std::io::Error::last_os_error();
        if err.kind() != std::io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

/// Whether child `pid` has already exited, without reaping it
fn has_exited(pid: u32) -> bool {
    // SAFETY: as in `wait_exited`; WNOHANG leaves `info` zeroed if still running
    let mut info: libc::siginfo_t = unsafe { std::mem::zeroed() };
    let ret = unsafe {
        libc::waitid(
            libc::P_PID,
            pid as libc::id_t,
            &mut info,
            libc::WEXITED | libc::WNOWAIT | libc::WNOHANG,
        )
    };
    ret == 0 && unsafe { info.si_pid() } != 0
}

/// Signal every process in the group led by `pid`
fn signal_group(pid: u32, signal: libc::c_int) {
    let ret = unsafe { libc::kill(-(pid as libc::pid_t), signal) };
    if ret == -1 {
        // Group already gone; try the leader alone
        unsafe {
            libc::kill(pid as libc::pid_t, signal);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variant::CapabilityTable;
    use std::time::Instant;

    fn scratch(root: &TempDir) -> TempDir {
        tempfile::Builder::new()
            .prefix("trial-")
            .tempdir_in(root.path())
            .unwrap()
    }

    fn full() -> VariantConfig {
        VariantConfig::full(&CapabilityTable::standard())
    }

    #[test]
    fn test_successful_trial() {
        let root = TempDir::new().unwrap();
        let runner = TrialRunner::new(vec![
            OperationSpec::shell("setup", "exit 0"),
            OperationSpec::shell("recovery", "sleep 0.01"),
        ]);

        let record = runner.run_trial(scratch(&root), &full(), 3, false);

        assert!(record.success);
        assert_eq!(record.trial_index, 3);
        assert_eq!(record.variant, "full");
        assert!(!record.is_warmup);
        assert_eq!(record.durations.len(), 2);
        assert!(record.duration("recovery").unwrap().duration_ms() >= 10.0);
        assert!(record.durations.iter().all(|d| d.launched));
    }

    #[test]
    fn test_disabled_capability_is_zero_and_successful() {
        let root = TempDir::new().unwrap();
        let marker_dir = TempDir::new().unwrap();
        let marker = marker_dir.path().join("ran");
        let runner = TrialRunner::new(vec![
            OperationSpec::shell("checkpoint", format!("touch {}", marker.display()))
                .requires("checkpoint_logging"),
        ]);

        let record = runner.run_trial(scratch(&root), &VariantConfig::minimal(), 0, false);
        let checkpoint = record.duration("checkpoint").unwrap();

        assert_eq!(checkpoint.duration_ms(), 0.0);
        assert!(checkpoint.success);
        assert!(!checkpoint.launched);
        assert!(record.success);
        assert!(!marker.exists());

        let record = runner.run_trial(scratch(&root), &full(), 1, false);
        assert!(record.duration("checkpoint").unwrap().launched);
        assert!(marker.exists());
    }

    #[test]
    fn test_failure_keeps_timing_and_continues() {
        let root = TempDir::new().unwrap();
        let runner = TrialRunner::new(vec![
            OperationSpec::shell("setup", "sleep 0.01; exit 3"),
            OperationSpec::shell("recovery", "exit 0"),
        ]);

        let record = runner.run_trial(scratch(&root), &full(), 0, false);
        let setup = record.duration("setup").unwrap();

        assert!(!record.success);
        assert!(!setup.success);
        assert!(setup.duration_ms() >= 10.0);
        assert_eq!(setup.failure, Some(TrialFailure::Exit { code: Some(3) }));
        assert!(record.duration("recovery").unwrap().success);
        assert_eq!(record.failure(), Some(&TrialFailure::Exit { code: Some(3) }));
    }

    #[test]
    fn test_timeout_is_failure_with_bounded_duration() {
        let root = TempDir::new().unwrap();
        let runner = TrialRunner::new(vec![OperationSpec::shell("setup", "sleep 5")])
            .with_timeout(Some(Duration::from_millis(200)));

        let started = Instant::now();
        let record = runner.run_trial(scratch(&root), &full(), 0, false);
        let setup = record.duration("setup").unwrap();

        assert!(!record.success);
        assert_eq!(setup.failure, Some(TrialFailure::TimedOut { timeout_ms: 200 }));
        assert!(setup.duration_ms() >= 200.0);
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_exited_child_stays_unreaped_until_wait() {
        let mut child = Command::new("/bin/sh").args(["-c", "exit 4"]).spawn().unwrap();

        wait_exited(child.id()).unwrap();
        assert!(has_exited(child.id()));
        // Still reapable, so the pid was held
        assert_eq!(child.wait().unwrap().code(), Some(4));
    }

    #[test]
    fn test_running_child_has_not_exited() {
        let mut child = Command::new("/bin/sh").args(["-c", "sleep 5"]).spawn().unwrap();
        assert!(!has_exited(child.id()));
        child.kill().unwrap();
        child.wait().unwrap();
    }

    #[test]
    fn test_watchdog_ignores_child_that_already_exited() {
        let mut child = Command::new("/bin/sh")
            .args(["-c", "exit 0"])
            .process_group(0)
            .spawn()
            .unwrap();
        wait_exited(child.id()).unwrap();

        // Timeout expires while the exited child waits to be reaped
        let watchdog = Watchdog::arm(child.id(), Duration::from_millis(10), DEFAULT_GRACE_PERIOD);
        thread::sleep(Duration::from_millis(100));

        assert!(!watchdog.disarm());
        assert!(child.wait().unwrap().success());
    }

    #[test]
    fn test_spawn_failure() {
        let root = TempDir::new().unwrap();
        let runner = TrialRunner::new(vec![OperationSpec::new(
            "setup",
            "/nonexistent/trialbench-operation",
        )]);

        let record = runner.run_trial(scratch(&root), &full(), 0, false);
        let setup = record.duration("setup").unwrap();

        assert!(!record.success);
        assert!(!setup.launched);
        assert!(matches!(setup.failure, Some(TrialFailure::Spawn { .. })));
    }

    #[test]
    fn test_workspace_removed_on_success_and_failure() {
        let root = TempDir::new().unwrap();
        for script in ["exit 0", "exit 1"] {
            let runner = TrialRunner::new(vec![OperationSpec::shell("setup", script)]);
            let workspace = scratch(&root);
            let path = workspace.path().to_path_buf();

            runner.run_trial(workspace, &full(), 0, false);
            assert!(!path.exists());
        }
    }

    #[test]
    fn test_placeholders_and_working_directory() {
        let root = TempDir::new().unwrap();
        let runner = TrialRunner::new(vec![OperationSpec::shell(
            "setup",
            "test \"$(pwd -P)\" = \"$(cd {workspace} && pwd -P)\" && touch ../out-{trial}-{variant}",
        )]);

        let record = runner.run_trial(scratch(&root), &full(), 7, true);

        assert!(record.success);
        assert!(record.is_warmup);
        assert!(root.path().join("out-7-full").exists());
    }
}
