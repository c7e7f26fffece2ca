//! Tracker child process.
//!
//! The tracker reads requests on its stdin and answers on its stdout.
//! Its stderr is inherited so tracker diagnostics reach the terminal.

use std::process::{Child, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::config::TrackerConfig;
use crate::error::{Result, TraxError};

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Handle to a running tracker
///
/// Dropping the handle kills the tracker if it is still running. Call
/// [`TrackerProcess::shutdown`] after QUIT to let it exit on its own.
#[derive(Debug)]
pub struct TrackerProcess {
    child: Option<Child>,
}

impl TrackerProcess {
    /// Start the tracker and take its stdout and stdin.
    pub fn spawn(config: &TrackerConfig) -> Result<(Self, ChildStdout, ChildStdin)> {
        let program = config
            .command
            .as_deref()
            .ok_or_else(|| TraxError::Config("No tracker command configured".to_string()))?;

        let mut command = Command::new(program);
        command
            .args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        if let Some(ref dir) = config.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|e| {
            TraxError::Config(format!("Failed to start tracker {:?}: {}", program, e))
        })?;

        let pipes = child.stdout.take().zip(child.stdin.take());
        let process = Self { child: Some(child) };
        let (stdout, stdin) = pipes.ok_or_else(|| {
            TraxError::Config("Tracker started without piped stdio".to_string())
        })?;

        tracing::debug!(program, pid = ?process.id(), "started tracker");
        Ok((process, stdout, stdin))
    }

    /// OS process id
    pub fn id(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    /// Whether the tracker has not exited yet
    pub fn is_running(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Wait for the tracker to exit.
    pub fn wait(&mut self) -> Result<Option<ExitStatus>> {
        match self.child.take() {
            Some(mut child) => {
                let status = child.wait()?;
                tracing::debug!(%status, "tracker exited");
                Ok(Some(status))
            },
            None => Ok(None),
        }
    }

    /// Give the tracker up to `grace` to exit, then kill it.
    ///
    /// Returns the exit status when the tracker exited by itself, `None`
    /// when it had to be killed or was already reaped. Close the tracker's
    /// stdin first, or a tracker waiting for input will never exit.
    pub fn shutdown(&mut self, grace: Duration) -> Result<Option<ExitStatus>> {
        let Some(child) = self.child.as_mut() else {
            return Ok(None);
        };

        let deadline = Instant::now() + grace;
        loop {
            if let Some(status) = child.try_wait()? {
                tracing::debug!(%status, "tracker exited");
                self.child = None;
                return Ok(Some(status));
            }
            if Instant::now() >= deadline {
                break;
            }
            thread::sleep(EXIT_POLL_INTERVAL);
        }

        tracing::warn!(pid = child.id(), ?grace, "tracker did not exit after QUIT, killing");
        self.kill()?;
        Ok(None)
    }

    /// Kill the tracker and reap it.
    pub fn kill(&mut self) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        if let Ok(None) = child.try_wait() {
            child.kill()?;
            tracing::debug!(pid = child.id(), "killed tracker");
        }
        child.wait()?;
        Ok(())
    }
}

impl Drop for TrackerProcess {
    fn drop(&mut self) {
        if let Err(e) = self.kill() {
            tracing::warn!(error = %e, "failed to stop tracker");
        }
    }
}
