//! Oracle client
//!
//! Owns at most one [`OracleSession`] and replaces it wholesale when the
//! process dies. Each `ask` relaunches at most once: a query that fails on a
//! freshly relaunched session surfaces as `OracleUnavailable`.

use crate::config::types::{FilterError, OracleSettings, Result};
use crate::oracle::retry::RetryPolicy;
use crate::oracle::session::{LaunchCommand, Liveness, OracleSession, ShutdownReport};
use crate::oracle::DecisionOracle;
use log::{info, warn};
use std::path::Path;
use std::time::Duration;

#[derive(Debug)]
pub struct OracleClient {
    launch: LaunchCommand,
    retry: RetryPolicy,
    shutdown_grace: Duration,
    session: Option<OracleSession>,
    relaunches: u32,
    queries: u64,
}

impl OracleClient {
    /// Start an oracle session for `policy`.
    pub fn launch(
        executable: impl AsRef<Path>,
        policy: &str,
        batch_size: usize,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let launch = LaunchCommand::new(executable.as_ref(), policy, batch_size);
        Self::with_launch(launch, retry, Duration::from_millis(200))
    }

    pub fn from_settings(settings: &OracleSettings) -> Result<Self> {
        let launch = LaunchCommand::from_settings(settings)?;
        Self::with_launch(
            launch,
            settings.retry.clone(),
            Duration::from_millis(settings.shutdown_grace_ms),
        )
    }

    pub fn with_launch(
        launch: LaunchCommand,
        retry: RetryPolicy,
        shutdown_grace: Duration,
    ) -> Result<Self> {
        let session = OracleSession::launch(&launch, &retry, shutdown_grace)?;
        Ok(Self {
            launch,
            retry,
            shutdown_grace,
            session: Some(session),
            relaunches: 0,
            queries: 0,
        })
    }

    /// Ask the oracle whether `password` is accepted.
    pub fn ask(&mut self, password: &str) -> Result<bool> {
        let alive = match self.session.as_mut() {
            Some(session) => session.is_alive(),
            None => {
                return Err(FilterError::OracleUnavailable(
                    "oracle client has been terminated".to_string(),
                ))
            }
        };
        let relaunched = !alive;
        if relaunched {
            self.relaunch("process exited between queries")?;
        }

        let verdict = match self.query(password) {
            Err(FilterError::OracleUnavailable(reason)) if !relaunched => {
                self.relaunch(&reason)?;
                self.query(password)
            }
            other => other,
        }?;

        self.queries += 1;
        Ok(verdict)
    }

    fn query(&mut self, password: &str) -> Result<bool> {
        match self.session.as_mut() {
            Some(session) => session.query(password),
            None => Err(FilterError::OracleUnavailable(
                "no active oracle session".to_string(),
            )),
        }
    }

    fn relaunch(&mut self, reason: &str) -> Result<()> {
        if let Some(mut dead) = self.session.take() {
            warn!(
                "Oracle session {} lost after {} queries ({}); relaunching",
                dead.id(),
                dead.queries(),
                reason
            );
            dead.terminate();
        }

        let session = OracleSession::launch(&self.launch, &self.retry, self.shutdown_grace)
            .map_err(|e| FilterError::OracleUnavailable(format!("relaunch failed: {}", e)))?;
        self.relaunches += 1;
        info!(
            "Oracle relaunched as session {} (relaunch #{})",
            session.id(),
            self.relaunches
        );
        self.session = Some(session);
        Ok(())
    }

    /// End the oracle process. Safe to call more than once.
    pub fn terminate(&mut self) -> Option<ShutdownReport> {
        self.session.take().map(|mut session| session.terminate())
    }

    pub fn state(&self) -> Liveness {
        self.session
            .as_ref()
            .map_or(Liveness::Dead, |session| session.state())
    }

    pub fn relaunches(&self) -> u32 {
        self.relaunches
    }

    pub fn queries(&self) -> u64 {
        self.queries
    }

    pub fn launch_command(&self) -> &LaunchCommand {
        &self.launch
    }
}

impl DecisionOracle for OracleClient {
    fn decide(&mut self, password: &str) -> Result<bool> {
        self.ask(password)
    }

    fn finish(&mut self) {
        self.terminate();
    }

    fn relaunch_count(&self) -> u32 {
        self.relaunches
    }
}

impl Drop for OracleClient {
    fn drop(&mut self) {
        self.terminate();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn client(script: &str, batch_size: usize) -> (tempfile::TempDir, OracleClient) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("oracle.sh");
        std::fs::write(&path, script).expect("write script");
        let launch = LaunchCommand::new("/bin/sh", path.to_string_lossy(), batch_size);
        let client = OracleClient::with_launch(
            launch,
            RetryPolicy::new(3, Duration::from_millis(20)),
            Duration::from_millis(100),
        )
        .expect("launch");
        (dir, client)
    }

    const EXIT_AFTER_BATCH: &str = "n=0\nwhile IFS= read -r pw; do\n  echo true\n  n=$((n+1))\n  [ \"$n\" -ge \"$1\" ] && exit 0\ndone\n";

    #[test]
    fn death_after_batch_is_recovered_with_one_relaunch() {
        let (_dir, mut client) = client(EXIT_AFTER_BATCH, 2);
        assert!(client.ask("one").unwrap());
        assert!(client.ask("two").unwrap());
        assert!(client.ask("three").unwrap());
        assert_eq!(client.relaunches(), 1);
        assert_eq!(client.queries(), 3);
    }

    #[test]
    fn each_death_costs_one_relaunch() {
        let (_dir, mut client) = client(EXIT_AFTER_BATCH, 1);
        for pw in ["a", "b", "c", "d"] {
            assert!(client.ask(pw).unwrap());
        }
        assert_eq!(client.relaunches(), 3);
    }

    #[test]
    fn ask_after_terminate_is_unavailable() {
        let (_dir, mut client) = client("while read pw; do echo true; done\n", 10);
        assert!(client.terminate().is_some());
        assert!(client.terminate().is_none());
        assert_eq!(client.state(), Liveness::Dead);
        assert!(matches!(
            client.ask("x"),
            Err(FilterError::OracleUnavailable(_))
        ));
    }

    #[test]
    fn failed_relaunch_surfaces_as_unavailable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("oracle.sh");
        std::fs::write(&path, EXIT_AFTER_BATCH).expect("write script");
        let launch = LaunchCommand::new("/bin/sh", path.to_string_lossy(), 1);
        let mut client = OracleClient::with_launch(
            launch,
            RetryPolicy::new(2, Duration::from_millis(10)),
            Duration::from_millis(50),
        )
        .expect("launch");

        assert!(client.ask("first").unwrap());
        std::fs::remove_file(&path).expect("remove script");
        // sh exits immediately when the script is missing, so every relaunch
        // attempt dies inside its grace period.
        let err = client.ask("second").unwrap_err();
        assert!(matches!(err, FilterError::OracleUnavailable(_)), "{err:?}");
    }
}
