//! Interactive login through a supervised browser-automation helper.
//!
//! `SessionBridge::acquire_session` spawns the helper, watches its stdout for
//! a definitive status object and races four completion signals (stdout data,
//! process exit, spawn error, ceiling timeout) into one `CompletionLatch`.
//! Whatever wins, teardown terminates the helper and joins every task.

pub mod errors;
pub mod latch;
pub mod parser;

pub use errors::SessionError;
pub use latch::CompletionLatch;
pub use parser::{parse_status_line, LineBuffer, OutputScanner, StatusLine};

use crate::accounts::Credential;
use crate::config::LoginConfig;
use crate::event_log::EventLog;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// How long to keep draining stdout after the helper has exited.
pub const OUTPUT_DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Delay between SIGTERM and SIGKILL during teardown.
pub const TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// Cap on captured stderr kept for diagnostics.
const MAX_DIAGNOSTIC_BYTES: usize = 64 * 1024;

const READ_CHUNK_SIZE: usize = 4096;

type LoginOutcome = Result<Credential, SessionError>;

/// Launches the login helper and turns its output into one `Credential`.
pub struct SessionBridge {
    config: LoginConfig,
    event_log: Option<Arc<EventLog>>,
}

impl SessionBridge {
    pub fn new(config: LoginConfig) -> Self {
        Self {
            config,
            event_log: None,
        }
    }

    pub fn with_event_log(mut self, event_log: Arc<EventLog>) -> Self {
        self.event_log = Some(event_log);
        self
    }

    /// Full argument list passed to the helper.
    pub fn helper_args(&self) -> Vec<String> {
        let mut args = self.config.args.clone();
        args.push("--login-url".to_string());
        args.push(self.config.login_url.clone());
        if self.config.disable_sandbox {
            args.push("--no-sandbox".to_string());
            args.push("--disable-gpu".to_string());
        }
        args
    }

    /// Runs one login attempt. Resolves exactly once, with a credential or a failure.
    pub async fn acquire_session(&self, timeout: Duration) -> LoginOutcome {
        tracing::info!(command = %self.config.command, timeout_secs = timeout.as_secs(), "Starting login helper");
        if let Some(log) = &self.event_log {
            log.log_login_started(&self.config.command, timeout.as_secs());
        }

        let (latch, result_rx) = CompletionLatch::new();
        let tasks = match self.spawn_helper() {
            Ok(child) => HelperTasks::start(child, latch.clone(), timeout),
            Err(err) => {
                latch.complete(Err(err));
                HelperTasks::default()
            }
        };

        let outcome = match result_rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(SessionError::NoCredential {
                diagnostics: String::new(),
            }),
        };

        tasks.shutdown().await;
        self.record_outcome(&outcome);
        outcome
    }

    fn spawn_helper(&self) -> Result<Child, SessionError> {
        let program = which::which(&self.config.command).map_err(|e| SessionError::SpawnFailure {
            message: format!("'{}' not found on PATH: {}", self.config.command, e),
        })?;

        let mut command = Command::new(&program);
        command
            .args(self.helper_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = command.spawn().map_err(|e| SessionError::SpawnFailure {
            message: format!("{}: {}", program.display(), e),
        })?;
        tracing::debug!(pid = ?child.id(), program = %program.display(), "Login helper spawned");
        Ok(child)
    }

    fn record_outcome(&self, outcome: &LoginOutcome) {
        match outcome {
            Ok(credential) => {
                tracing::info!(org_id = %credential.org_id, "Login succeeded");
                if let Some(log) = &self.event_log {
                    log.log_login_finished("success", Some(&credential.org_id));
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "Login failed");
                if let Some(diagnostics) = err.diagnostics() {
                    tracing::debug!(stderr = %diagnostics, "Login helper diagnostics");
                }
                if let Some(log) = &self.event_log {
                    log.log_login_finished(err.kind(), None);
                }
            }
        }
    }
}

/// Handles to the helper's supervision tasks.
#[derive(Default)]
struct HelperTasks {
    terminate_tx: Option<oneshot::Sender<()>>,
    exit_watcher: Option<JoinHandle<()>>,
    others: Vec<JoinHandle<()>>,
}

impl HelperTasks {
    fn start(mut child: Child, latch: Arc<CompletionLatch<LoginOutcome>>, timeout: Duration) -> Self {
        let scanner = Arc::new(Mutex::new(OutputScanner::default()));
        let stderr_buf = Arc::new(Mutex::new(Vec::new()));
        let (stdout_done_tx, stdout_done_rx) = oneshot::channel();
        let (stderr_done_tx, stderr_done_rx) = oneshot::channel();
        let (terminate_tx, terminate_rx) = oneshot::channel();

        let mut others = Vec::new();

        if let Some(stdout) = child.stdout.take() {
            others.push(tokio::spawn(read_stdout(
                stdout,
                scanner.clone(),
                latch.clone(),
                stdout_done_tx,
            )));
        }
        if let Some(stderr) = child.stderr.take() {
            others.push(tokio::spawn(collect_stderr(
                stderr,
                stderr_buf.clone(),
                stderr_done_tx,
            )));
        }

        let timeout_latch = latch.clone();
        let timeout_stderr = stderr_buf.clone();
        others.push(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let diagnostics = captured_diagnostics(&timeout_stderr);
            if timeout_latch.complete(Err(SessionError::Timeout {
                after: timeout,
                diagnostics,
            })) {
                tracing::warn!(timeout_secs = timeout.as_secs(), "Login helper timed out");
            }
        }));

        let exit_watcher = tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => {
                    tracing::debug!(status = ?status, "Login helper exited");
                    let _ = tokio::time::timeout(OUTPUT_DRAIN_GRACE, stdout_done_rx).await;
                    let _ = tokio::time::timeout(OUTPUT_DRAIN_GRACE, stderr_done_rx).await;
                    latch.complete(exit_outcome(&scanner, &stderr_buf));
                }
                _ = terminate_rx => {
                    terminate(&mut child).await;
                }
            }
        });

        Self {
            terminate_tx: Some(terminate_tx),
            exit_watcher: Some(exit_watcher),
            others,
        }
    }

    /// Stops the helper if it is still running and joins every task.
    async fn shutdown(mut self) {
        if let Some(tx) = self.terminate_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.exit_watcher.take() {
            let _ = handle.await;
        }
        for handle in &self.others {
            handle.abort();
        }
        for handle in self.others.drain(..) {
            let _ = handle.await;
        }
    }
}

/// Result once the helper has exited: rescan everything it printed.
fn exit_outcome(scanner: &Mutex<OutputScanner>, stderr_buf: &Mutex<Vec<u8>>) -> LoginOutcome {
    let mut scanner = lock(scanner);
    if let Some(credential) = scanner.finish() {
        return Ok(credential);
    }

    let diagnostics = captured_diagnostics(stderr_buf);
    tracing::debug!(stdout_bytes = scanner.bytes_seen(), "No credential in helper output");
    match scanner.reported_failure() {
        Some(reason) => Err(SessionError::UpstreamReportedFailure {
            reason: reason.to_string(),
            diagnostics,
        }),
        None => Err(SessionError::NoCredential { diagnostics }),
    }
}

fn captured_diagnostics(stderr_buf: &Mutex<Vec<u8>>) -> String {
    String::from_utf8_lossy(&lock(stderr_buf)).trim().to_string()
}

async fn read_stdout<R: AsyncRead + Unpin>(
    mut stdout: R,
    scanner: Arc<Mutex<OutputScanner>>,
    latch: Arc<CompletionLatch<LoginOutcome>>,
    _done: oneshot::Sender<()>,
) {
    let mut chunk = [0u8; READ_CHUNK_SIZE];
    loop {
        let n = match stdout.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                tracing::debug!(error = %e, "Failed to read login helper stdout");
                break;
            }
        };
        let found = lock(&scanner).feed(&chunk[..n]);
        if let Some(credential) = found {
            latch.complete(Ok(credential));
            break;
        }
    }
}

async fn collect_stderr<R: AsyncRead + Unpin>(
    mut stderr: R,
    buffer: Arc<Mutex<Vec<u8>>>,
    _done: oneshot::Sender<()>,
) {
    let mut chunk = [0u8; READ_CHUNK_SIZE];
    loop {
        match stderr.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let mut buffer = lock(&buffer);
                let room = MAX_DIAGNOSTIC_BYTES.saturating_sub(buffer.len());
                buffer.extend_from_slice(&chunk[..n.min(room)]);
            }
        }
    }
}

/// SIGTERM, then SIGKILL once `TERMINATE_GRACE` has passed.
async fn terminate(child: &mut Child) {
    if let Ok(Some(_)) = child.try_wait() {
        return;
    }

    #[cfg(unix)]
    if let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if kill(Pid::from_raw(pid), Signal::SIGTERM).is_ok()
            && matches!(
                tokio::time::timeout(TERMINATE_GRACE, child.wait()).await,
                Ok(Ok(_))
            )
        {
            tracing::debug!(pid, "Login helper terminated");
            return;
        }
    }

    if let Err(e) = child.kill().await {
        tracing::warn!(error = %e, "Failed to kill login helper");
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
#[path = "tests/bridge_tests.rs"]
mod tests;
