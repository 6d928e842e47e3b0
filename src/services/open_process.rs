//! Scoped ownership of a spawned child process.
//!
//! An [`OpenProcess`] is handed out by the process manager right after the
//! child was spawned and registered. Whatever happens to the caller, the
//! child ends up exited (or killed), reaped, and released from the registry
//! exactly once.

use crate::state::process_state::ProcessRegistry;
use log::{debug, warn};
use std::io::{self, Read};
use std::process::{Child, ChildStderr, ChildStdout, ExitStatus};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

pub const DEFAULT_KILL_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

pub struct OpenProcess {
    child: Child,
    pid: u32,
    registry: Arc<ProcessRegistry>,
    kill_timeout: Duration,
    poll_interval: Duration,
    released: bool,
    status: Option<ExitStatus>,
}

impl OpenProcess {
    pub fn new(child: Child, registry: Arc<ProcessRegistry>) -> Self {
        let pid = child.id();
        Self {
            child,
            pid,
            registry,
            kill_timeout: DEFAULT_KILL_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            released: false,
            status: None,
        }
    }

    pub fn with_kill_timeout(mut self, kill_timeout: Duration) -> Self {
        self.kill_timeout = kill_timeout;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn status(&self) -> Option<ExitStatus> {
        self.status
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    /// Runs `body` with this process and closes it afterwards.
    ///
    /// An `Err` from `body` counts as a caller side failure: a still running
    /// child is terminated (and killed after the kill timeout). On success a
    /// still running child is waited for. If closing fails too, the close
    /// error is returned and the body error is logged.
    pub fn scope<T, E, F>(mut self, body: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut OpenProcess) -> std::result::Result<T, E>,
        E: From<io::Error> + std::fmt::Display,
    {
        let result = body(&mut self);
        let failed = result.is_err();
        match (result, self.close(failed)) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(close_error)) => Err(close_error.into()),
            (Err(error), Ok(())) => Err(error),
            (Err(error), Err(close_error)) => {
                warn!("Process {} failed ({error}) and could not be closed", self.pid);
                Err(close_error.into())
            }
        }
    }

    /// Leaves the scope. `failed` selects the termination path for a child
    /// that is still running.
    pub fn close(&mut self, failed: bool) -> io::Result<()> {
        if self.released {
            return Ok(());
        }

        // Child has completed and has not been released yet
        if self.poll()?.is_some() {
            return Ok(());
        }

        if failed {
            self.terminate()?;

            let deadline = Instant::now() + self.kill_timeout;
            while Instant::now() < deadline && self.child.try_wait()?.is_none() {
                thread::sleep(self.poll_interval);
            }

            if self.poll()?.is_none() {
                debug!("Process {} ignored SIGTERM, killing it", self.pid);
                self.kill()?;
                self.wait()?;
            }
            return Ok(());
        }

        self.wait()?;
        Ok(())
    }

    /// Deregisters the process. Only the first call has any effect.
    pub fn release(&mut self) {
        if !self.released {
            self.registry.release(self.pid);
            self.released = true;
        }
    }

    pub fn poll(&mut self) -> io::Result<Option<ExitStatus>> {
        let status = self.child.try_wait()?;
        if let Some(status) = status {
            self.status = Some(status);
            self.release();
        }
        Ok(status)
    }

    pub fn wait(&mut self) -> io::Result<ExitStatus> {
        let status = self.child.wait()?;
        self.status = Some(status);
        self.release();
        Ok(status)
    }

    /// Reads whatever is left on stdout and stderr, then waits for the child.
    pub fn communicate(&mut self) -> io::Result<(String, String)> {
        let stderr_reader = self.take_stderr().map(|mut stderr| {
            thread::spawn(move || {
                let mut buffer = Vec::new();
                stderr.read_to_end(&mut buffer).map(|_| buffer)
            })
        });

        let mut stdout = Vec::new();
        if let Some(mut pipe) = self.take_stdout() {
            pipe.read_to_end(&mut stdout)?;
        }

        let stderr = match stderr_reader {
            Some(handle) => handle
                .join()
                .map_err(|_| io::Error::other("stderr reader panicked"))??,
            None => Vec::new(),
        };

        self.wait()?;
        Ok((
            String::from_utf8_lossy(&stdout).to_string(),
            String::from_utf8_lossy(&stderr).to_string(),
        ))
    }

    #[cfg(unix)]
    fn terminate(&mut self) -> io::Result<()> {
        let Ok(pid) = libc::pid_t::try_from(self.pid) else {
            return Err(io::Error::other(format!("pid {} out of range", self.pid)));
        };
        // SAFETY: plain syscall on our own unreaped child.
        if unsafe { libc::kill(pid, libc::SIGTERM) } == 0 {
            return Ok(());
        }
        ignore_missing_process(io::Error::last_os_error())
    }

    #[cfg(not(unix))]
    fn terminate(&mut self) -> io::Result<()> {
        self.kill()
    }

    fn kill(&mut self) -> io::Result<()> {
        match self.child.kill() {
            Ok(()) => Ok(()),
            Err(e) => ignore_missing_process(e),
        }
    }
}

/// The child may die between checking on it and signalling it.
fn ignore_missing_process(error: io::Error) -> io::Result<()> {
    // std reports an already reaped child as InvalidInput
    if is_missing_process(&error) || error.kind() == io::ErrorKind::InvalidInput {
        return Ok(());
    }
    Err(error)
}

#[cfg(unix)]
fn is_missing_process(error: &io::Error) -> bool {
    error.raw_os_error() == Some(libc::ESRCH)
}

#[cfg(not(unix))]
fn is_missing_process(_error: &io::Error) -> bool {
    false
}

impl Drop for OpenProcess {
    // Dropped without being closed means the owner bailed out early
    // (an early return or a panic), which is the failure path.
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = self.close(true) {
                warn!("Failed to clean up process {}: {e}", self.pid);
                self.release();
            }
        }
    }
}
