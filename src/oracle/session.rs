/// Oracle process session
///
/// One session owns one child process started as
/// `<executable> <policy> <batch_size>` with piped stdin/stdout. Queries are
/// newline-terminated passwords; each is answered by exactly one line, where
/// `true` (any case) accepts and anything else rejects.
use crate::config::types::{FilterError, OracleSettings, Result};
use crate::oracle::retry::RetryPolicy;
use log::{debug, info, warn};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Poll interval while waiting for a child to exit.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Liveness of an oracle process as last observed
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Liveness {
    /// Spawned, grace period not yet elapsed
    Starting,
    /// Survived its grace period and has not been seen to exit
    Alive,
    /// Exited, killed, or unreadable
    Dead,
}

/// Everything needed to (re)start the same oracle.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LaunchCommand {
    pub executable: PathBuf,
    pub policy: String,
    pub batch_size: usize,
}

impl LaunchCommand {
    pub fn new(executable: impl Into<PathBuf>, policy: impl Into<String>, batch_size: usize) -> Self {
        Self {
            executable: executable.into(),
            policy: policy.into(),
            batch_size,
        }
    }

    pub fn from_settings(settings: &OracleSettings) -> Result<Self> {
        let executable = settings.executable.clone().ok_or_else(|| {
            FilterError::Config("no oracle executable configured".to_string())
        })?;
        Ok(Self::new(executable, settings.policy.clone(), settings.batch_size))
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.executable);
        cmd.arg(&self.policy)
            .arg(self.batch_size.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        cmd
    }

    fn display(&self) -> String {
        self.executable.display().to_string()
    }
}

/// Signal escalation report for session shutdown.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ShutdownReport {
    pub already_exited: bool,
    pub term_sent: bool,
    pub kill_sent: bool,
    pub exit_code: Option<i32>,
    pub waited_ms: u64,
}

/// Live connection to one oracle process.
pub struct OracleSession {
    id: Uuid,
    launch: LaunchCommand,
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    state: Liveness,
    shutdown_grace: Duration,
    queries: u64,
    reaped: bool,
}

impl std::fmt::Debug for OracleSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OracleSession")
            .field("id", &self.id)
            .field("launch", &self.launch)
            .field("pid", &self.child.id())
            .field("state", &self.state)
            .field("queries", &self.queries)
            .finish()
    }
}

impl OracleSession {
    /// Start the oracle, retrying with escalating grace periods until the
    /// process survives one or the budget is spent.
    pub fn launch(
        launch: &LaunchCommand,
        retry: &RetryPolicy,
        shutdown_grace: Duration,
    ) -> Result<Self> {
        let mut last_reason = "retry budget is zero".to_string();

        for attempt in retry.attempts() {
            let grace = retry.grace_period(attempt);
            match Self::try_launch(launch, grace, shutdown_grace) {
                Ok(session) => {
                    info!(
                        "Oracle session {} started: {} {} {} (pid {}, attempt {})",
                        session.id,
                        launch.display(),
                        launch.policy,
                        launch.batch_size,
                        session.child.id(),
                        attempt
                    );
                    return Ok(session);
                }
                Err(reason) => {
                    warn!(
                        "Oracle launch attempt {}/{} for '{}' failed: {}",
                        attempt,
                        retry.max_attempts,
                        launch.display(),
                        reason
                    );
                    last_reason = reason;
                }
            }
        }

        Err(FilterError::LaunchFailed {
            executable: launch.display(),
            attempts: retry.max_attempts,
            reason: last_reason,
        })
    }

    fn try_launch(
        launch: &LaunchCommand,
        grace: Duration,
        shutdown_grace: Duration,
    ) -> std::result::Result<Self, String> {
        let mut child = launch
            .command()
            .spawn()
            .map_err(|e| format!("spawn: {}", e))?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err("child pipes unavailable".to_string());
            }
        };

        let mut session = Self {
            id: Uuid::new_v4(),
            launch: launch.clone(),
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
            state: Liveness::Starting,
            shutdown_grace,
            queries: 0,
            reaped: false,
        };

        // Bad arguments usually make the oracle exit straight away.
        std::thread::sleep(grace);
        match session.child.try_wait() {
            Ok(None) => {
                session.state = Liveness::Alive;
                Ok(session)
            }
            Ok(Some(status)) => {
                session.reaped = true;
                session.state = Liveness::Dead;
                Err(format!("exited during {:?} grace period ({})", grace, status))
            }
            Err(e) => {
                session.terminate();
                Err(format!("wait: {}", e))
            }
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    pub fn launch_command(&self) -> &LaunchCommand {
        &self.launch
    }

    pub fn state(&self) -> Liveness {
        self.state
    }

    pub fn queries(&self) -> u64 {
        self.queries
    }

    /// Refresh and report liveness without blocking.
    pub fn is_alive(&mut self) -> bool {
        if self.state == Liveness::Dead {
            return false;
        }
        match self.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                debug!("Oracle session {} exited: {}", self.id, status);
                self.reaped = true;
                self.state = Liveness::Dead;
                false
            }
            Err(e) => {
                warn!("Oracle session {} liveness check failed: {}", self.id, e);
                self.state = Liveness::Dead;
                false
            }
        }
    }

    /// Send one password and block for its verdict.
    ///
    /// A broken pipe or end of stream marks the session dead and returns
    /// [`FilterError::OracleUnavailable`]; the caller decides whether to
    /// relaunch.
    pub fn query(&mut self, password: &str) -> Result<bool> {
        if password.contains(['\n', '\r']) {
            return Err(FilterError::Protocol(format!(
                "password {:?} contains a line break",
                password
            )));
        }
        if self.state == Liveness::Dead {
            return Err(FilterError::OracleUnavailable(format!(
                "session {} is dead",
                self.id
            )));
        }

        let Some(stdin) = self.stdin.as_mut() else {
            self.state = Liveness::Dead;
            return Err(FilterError::OracleUnavailable(format!(
                "session {} input is closed",
                self.id
            )));
        };

        let sent = stdin
            .write_all(password.as_bytes())
            .and_then(|_| stdin.write_all(b"\n"))
            .and_then(|_| stdin.flush());
        if let Err(e) = sent {
            self.state = Liveness::Dead;
            return Err(FilterError::OracleUnavailable(format!(
                "write to session {}: {}",
                self.id, e
            )));
        }

        let mut line = Vec::new();
        match self.stdout.read_until(b'\n', &mut line) {
            Ok(0) => {
                self.state = Liveness::Dead;
                return Err(FilterError::OracleUnavailable(format!(
                    "session {} closed its output",
                    self.id
                )));
            }
            Ok(_) => {}
            Err(e) => {
                self.state = Liveness::Dead;
                return Err(FilterError::OracleUnavailable(format!(
                    "read from session {}: {}",
                    self.id, e
                )));
            }
        }

        self.queries += 1;
        let verdict = parse_verdict(&line);
        debug!("Oracle session {}: {:?} -> {}", self.id, password, verdict);
        Ok(verdict)
    }

    /// Close the oracle's input, then escalate SIGTERM -> SIGKILL until it
    /// has been reaped. Safe to call more than once.
    pub fn terminate(&mut self) -> ShutdownReport {
        let mut report = ShutdownReport::default();
        let started = Instant::now();
        self.state = Liveness::Dead;
        self.stdin = None;

        if self.reaped {
            report.already_exited = true;
            return report;
        }

        if let Ok(Some(status)) = self.child.try_wait() {
            self.reaped = true;
            report.already_exited = true;
            report.exit_code = status.code();
            return report;
        }

        let pid = Pid::from_raw(self.child.id() as i32);
        if kill(pid, Signal::SIGTERM).is_ok() {
            report.term_sent = true;
        }

        if let Some(status) = self.wait_for_exit(self.shutdown_grace) {
            report.exit_code = status.code();
        } else {
            if self.child.kill().is_ok() {
                report.kill_sent = true;
            }
            if let Ok(status) = self.child.wait() {
                report.exit_code = status.code();
            }
        }

        self.reaped = true;
        report.waited_ms = started.elapsed().as_millis() as u64;
        debug!("Oracle session {} shut down: {:?}", self.id, report);
        report
    }

    fn wait_for_exit(&mut self, limit: Duration) -> Option<std::process::ExitStatus> {
        let started = Instant::now();
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => return Some(status),
                Ok(None) if started.elapsed() < limit => std::thread::sleep(EXIT_POLL_INTERVAL),
                _ => return None,
            }
        }
    }
}

impl Drop for OracleSession {
    fn drop(&mut self) {
        if !self.reaped {
            self.terminate();
        }
    }
}

/// `true` in any case, surrounding whitespace ignored, accepts.
pub fn parse_verdict(line: &[u8]) -> bool {
    String::from_utf8_lossy(line).trim().eq_ignore_ascii_case("true")
}
