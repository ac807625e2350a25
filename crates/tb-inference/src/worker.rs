//! Disposable worker processes.
//!
//! Each unit runs in a fresh child process: the request goes in as JSON on stdin and
//! the [`ToyBatch`] comes back as JSON on stdout. A process that exits non-zero,
//! hangs past its timeout, or answers for the wrong unit fails only that unit.

use crate::adapter::{UnitExecutor, WorkUnit, WorkerRequest, validate_batch};
use crate::pool::CancelToken;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tb_core::{Error, ModelRef, Result, TestSpec, ToyBatch};

const POLL_INTERVAL: Duration = Duration::from_millis(20);
const STDERR_TAIL_CHARS: usize = 500;

/// Runs each unit in a new child process.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    program: PathBuf,
    args: Vec<String>,
    model: ModelRef,
    spec: TestSpec,
    timeout: Option<Duration>,
}

impl ProcessExecutor {
    /// Executor invoking `program args...` per unit.
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, model: ModelRef, spec: TestSpec) -> Self {
        Self { program: program.into(), args, model, spec, timeout: None }
    }

    /// Kill workers that run longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn request_bytes(&self, unit: &WorkUnit) -> Result<Vec<u8>> {
        let request =
            WorkerRequest { model: self.model.clone(), spec: self.spec, unit: unit.clone() };
        Ok(serde_json::to_vec(&request)?)
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

fn join_output(handle: JoinHandle<Vec<u8>>) -> Vec<u8> {
    handle.join().unwrap_or_default()
}

fn stderr_tail(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim_end();
    let n = text.chars().count();
    text.chars().skip(n.saturating_sub(STDERR_TAIL_CHARS)).collect()
}

fn kill(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

impl UnitExecutor for ProcessExecutor {
    fn execute(&self, unit: &WorkUnit, cancel: &CancelToken) -> Result<ToyBatch> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled(format!("unit {} not started", unit.index)));
        }
        let input = self.request_bytes(unit)?;
        let start = Instant::now();

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                Error::Worker(format!("failed to spawn {}: {}", self.program.display(), e))
            })?;

        // Readers start before stdin is written so a chatty worker cannot fill a pipe.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        if let Some(mut stdin) = child.stdin.take() {
            match stdin.write_all(&input) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                Err(e) => {
                    kill(&mut child);
                    return Err(Error::Worker(format!("failed to write request: {}", e)));
                }
            }
        }

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if cancel.is_cancelled() {
                        kill(&mut child);
                        return Err(Error::Cancelled(format!(
                            "unit {} killed after {:.1}s",
                            unit.index,
                            start.elapsed().as_secs_f64()
                        )));
                    }
                    if let Some(timeout) = self.timeout
                        && start.elapsed() > timeout
                    {
                        kill(&mut child);
                        return Err(Error::Worker(format!(
                            "unit {} timed out after {:.1}s",
                            unit.index,
                            timeout.as_secs_f64()
                        )));
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(e) => {
                    kill(&mut child);
                    return Err(Error::Worker(format!("wait failed: {}", e)));
                }
            }
        };

        let out = join_output(stdout);
        let err = join_output(stderr);
        if !status.success() {
            let code = status.code().map_or_else(|| "signal".to_string(), |c| c.to_string());
            return Err(Error::Worker(format!(
                "unit {} worker exited with {}: {}",
                unit.index,
                code,
                stderr_tail(&err)
            )));
        }

        let batch: ToyBatch = serde_json::from_slice(&out).map_err(|e| {
            Error::Worker(format!("unit {} worker returned unreadable output: {}", unit.index, e))
        })?;
        validate_batch(unit, &batch)?;
        log::debug!(
            "unit {} done in {:.2}s ({} + {} toys)",
            unit.index,
            start.elapsed().as_secs_f64(),
            batch.null.len(),
            batch.alt.len()
        );
        Ok(batch)
    }
}
