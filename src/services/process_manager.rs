use crate::config::ProcessConfig;
use crate::error::{Error, Result};
use crate::services::open_process::{OpenProcess, DEFAULT_KILL_TIMEOUT, DEFAULT_POLL_INTERVAL};
use crate::state::process_state::ProcessRegistry;
use log::{error, info, warn};
use std::ffi::OsStr;
use std::io::{self, BufRead, BufReader, Read};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use sysinfo::System;

/// Output captured from a finished process.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    /// Exit code of the process. A process killed by a signal reports the
    /// negated signal number.
    pub fn code(&self) -> i32 {
        match self.status.code() {
            Some(code) => code,
            None => signal_code(&self.status),
        }
    }

    pub fn success(&self) -> bool {
        self.status.success()
    }
}

#[cfg(unix)]
fn signal_code(status: &ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status.signal().map(|signal| -signal).unwrap_or(-1)
}

#[cfg(not(unix))]
fn signal_code(_status: &ExitStatus) -> i32 {
    -1
}

/// Runs external commands and keeps track of every process it started.
///
/// Clones share the same registry, so any clone can lock spawning or ask how
/// many processes are in flight.
#[derive(Debug, Clone)]
pub struct ProcessManager {
    registry: Arc<ProcessRegistry>,
    kill_timeout: Duration,
    poll_interval: Duration,
}

impl Default for ProcessManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessManager {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(ProcessRegistry::new()),
            kill_timeout: DEFAULT_KILL_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Manager using the `[process]` timeouts of the config.
    pub fn from_config(config: &ProcessConfig) -> Self {
        Self::new().with_timeouts(config.kill_timeout, config.poll_interval)
    }

    pub fn with_timeouts(mut self, kill_timeout: Duration, poll_interval: Duration) -> Self {
        self.kill_timeout = kill_timeout;
        self.poll_interval = poll_interval;
        self
    }

    pub fn registry(&self) -> &Arc<ProcessRegistry> {
        &self.registry
    }

    /// Executes `program` with `args`, returning its exit status together
    /// with everything it wrote to stdout and stderr.
    ///
    /// Every stdout line is handed to `sink` as soon as it is read, in the
    /// order the child wrote them. Returning from `sink` is what lets the
    /// next line be read.
    pub fn call<S: AsRef<OsStr>>(
        &self,
        program: &str,
        args: &[S],
        sink: Option<&mut dyn FnMut(&str)>,
    ) -> Result<ProcessOutput> {
        let process = self.open_process(program, args)?;
        let command_line = command_line(program, args);
        info!("Executing {command_line}");

        process.scope(|pipe| -> Result<ProcessOutput> {
            let stderr_reader = pipe.take_stderr().map(|mut stderr| {
                thread::spawn(move || {
                    let mut buffer = Vec::new();
                    stderr.read_to_end(&mut buffer).map(|_| buffer)
                })
            });

            let mut lines: Vec<String> = Vec::new();
            let mut sink = sink;
            if let Some(stdout) = pipe.take_stdout() {
                let mut reader = BufReader::new(stdout);
                let mut buffer = Vec::new();
                loop {
                    buffer.clear();
                    if reader.read_until(b'\n', &mut buffer)? == 0 {
                        break;
                    }
                    let line = String::from_utf8_lossy(&buffer);
                    let line = line.trim_end_matches(['\n', '\r']).to_string();
                    if let Some(sink) = sink.as_mut() {
                        sink(&line);
                    }
                    lines.push(line);
                }
            }

            let (remaining, stderr) = pipe.communicate()?;
            let stderr = match stderr_reader {
                Some(handle) => handle
                    .join()
                    .map_err(|_| io::Error::other("stderr reader panicked"))??,
                None => stderr.into_bytes(),
            };

            let mut stdout = lines.join("\n");
            let remaining = remaining.trim();
            if !remaining.is_empty() {
                stdout.push('\n');
                stdout.push_str(remaining);
            }

            let status = pipe
                .status()
                .ok_or_else(|| io::Error::other("process finished without a status"))?;
            Ok(ProcessOutput {
                status,
                stdout,
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            })
        })
    }

    /// Spawns `program` with piped stdout and stderr and registers its pid.
    pub fn open_process<S: AsRef<OsStr>>(&self, program: &str, args: &[S]) -> Result<OpenProcess> {
        let child = self.registry.spawn_tracked(|| {
            let path = which::which(program).map_err(|_| missing_tool(program))?;
            let child = Command::new(path)
                .args(args)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn()
                .map_err(|e| match e.kind() {
                    io::ErrorKind::NotFound => missing_tool(program),
                    _ => Error::Io(e),
                })?;
            Ok((child.id(), child))
        })?;

        Ok(OpenProcess::new(child, self.registry.clone())
            .with_kill_timeout(self.kill_timeout)
            .with_poll_interval(self.poll_interval))
    }

    pub fn lock_spawning(&self) {
        self.registry.lock_spawning();
    }

    pub fn unlock_spawning(&self) {
        self.registry.unlock_spawning();
    }

    pub fn is_spawning_locked(&self) -> bool {
        self.registry.is_spawning_locked()
    }

    pub fn in_flight(&self) -> usize {
        self.registry.in_flight()
    }

    pub fn in_flight_pids(&self) -> Vec<u32> {
        self.registry.pids()
    }

    /// Locks spawning and waits for every in-flight process to be released.
    /// Returns false when `timeout` passed first; spawning stays locked
    /// either way.
    pub fn drain(&self, timeout: Duration) -> bool {
        self.lock_spawning();
        let deadline = Instant::now() + timeout;
        while self.in_flight() > 0 {
            if Instant::now() >= deadline {
                warn!(
                    "{} processes still running after {}",
                    self.in_flight(),
                    humantime::format_duration(timeout)
                );
                return false;
            }
            thread::sleep(self.poll_interval);
        }
        true
    }

    /// Kills every process still registered. Meant for application exit,
    /// after [`drain`](Self::drain) gave up. Returns the number of processes
    /// that were killed.
    pub fn kill_in_flight(&self) -> usize {
        let pids = self.in_flight_pids();
        if pids.is_empty() {
            return 0;
        }
        let system = System::new_all();
        let mut killed = 0;
        for pid in pids {
            match system.process(sysinfo::Pid::from_u32(pid)) {
                Some(process) if process.kill() => {
                    info!("Killed {pid}");
                    killed += 1;
                }
                Some(_) => warn!("Failed to kill process with PID {pid}"),
                None => warn!("Process with PID {pid} not found"),
            }
        }
        killed
    }
}

fn missing_tool(program: &str) -> Error {
    error!("{program} could not be found. Is it installed?");
    Error::tool_not_found(program)
}

fn command_line<S: AsRef<OsStr>>(program: &str, args: &[S]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(&arg.as_ref().to_string_lossy());
    }
    line
}
