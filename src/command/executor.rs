//! Action executor - runs the external controller for a whitelisted action

use crate::config::ControllerConfig;
use homelink_shared::codec::{self, ProcessExit};
use homelink_shared::{now_ms, Action, DeviceRegistry, ExecutionFailure, ExecutionOutcome};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

/// How long to keep reading controller pipes after it exits
const PIPE_DRAIN: Duration = Duration::from_millis(250);

/// Runs the controller process, one invocation per call
pub struct ActionExecutor {
    registry: Arc<DeviceRegistry>,
    program: String,
    prefix_args: Vec<String>,
    timeout: Duration,
}

impl ActionExecutor {
    /// Create a new executor
    pub fn new(registry: Arc<DeviceRegistry>, config: &ControllerConfig) -> Self {
        Self {
            registry,
            program: config.program.clone(),
            prefix_args: config.prefix_args.clone(),
            timeout: config.timeout,
        }
    }

    /// Full argument list for one invocation
    fn args(&self, device: &str, action: Action) -> Vec<String> {
        let mut args = self.prefix_args.clone();
        args.extend([
            "--device".to_string(),
            device.to_string(),
            "--action".to_string(),
            action.as_str().to_string(),
        ]);
        args
    }

    /// Execute an action on a device and return the normalized outcome
    ///
    /// Never retries. The timeout bounds the controller's own exit; whatever
    /// is left of its process group afterwards is killed. Dropping the
    /// returned future kills the child and its group.
    pub async fn execute(&self, device: &str, action: Action) -> ExecutionOutcome {
        // Callers are expected to go through the dispatch gate first
        if action.is_none() || !self.registry.permits(device, action) {
            warn!("Refusing non-whitelisted action {} on {}", action, device);
            return ExecutionFailure::disallowed(device, action).into();
        }

        let start_time = now_ms();
        let args = self.args(device, action);
        debug!("Executing: {} {:?}", self.program, args);

        let mut command = Command::new(&self.program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                error!("Failed to start controller {}: {}", self.program, e);
                return ExecutionFailure::spawn_failed(format!(
                    "Failed to start controller '{}': {}",
                    self.program, e
                ))
                .into();
            }
        };

        // Armed until the run is over; a dropped future kills the group too
        let mut group = ProcessGroup::new(child.id());
        let mut stdout = Capture::new(child.stdout.take());
        let mut stderr = Capture::new(child.stderr.take());

        let deadline = Instant::now() + self.timeout;
        let exited = loop {
            tokio::select! {
                status = child.wait() => break Some(status),
                _ = sleep_until(deadline) => break None,
                _ = stdout.read_chunk(), if stdout.is_open() => {}
                _ = stderr.read_chunk(), if stderr.is_open() => {}
            }
        };

        // Nothing the controller started may outlive it
        group.kill();

        if exited.is_none() {
            warn!(
                "Controller timed out after {}ms ({} {}), killing",
                self.timeout.as_millis(),
                device,
                action
            );
            // kill() also reaps the child
            if let Err(e) = child.kill().await {
                error!("Failed to kill timed out controller: {}", e);
            }
        }

        drain(&mut stdout, &mut stderr, PIPE_DRAIN).await;
        let processing_time = now_ms().saturating_sub(start_time);

        let outcome = match exited {
            Some(Ok(status)) => codec::interpret(
                process_exit(status),
                &stdout.into_string(),
                &stderr.into_string(),
            ),
            Some(Err(e)) => {
                error!("Waiting on controller failed for {}: {}", device, e);
                ExecutionFailure::spawn_failed(format!("Controller I/O failed: {}", e)).into()
            }
            None => ExecutionFailure::timeout(self.timeout.as_millis() as u64).into(),
        };

        match &outcome {
            ExecutionOutcome::Success { .. } => {
                info!("{} {} completed in {}ms", device, action, processing_time)
            }
            ExecutionOutcome::Failure(f) => warn!(
                "{} {} failed in {}ms: {} {}",
                device, action, processing_time, f.category, f.message
            ),
        }

        outcome
    }
}

/// Output collected from one pipe
struct Capture<R> {
    pipe: Option<R>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> Capture<R> {
    fn new(pipe: Option<R>) -> Self {
        Self {
            pipe,
            buf: Vec::new(),
        }
    }

    fn is_open(&self) -> bool {
        self.pipe.is_some()
    }

    /// Read one chunk; closes the capture on EOF or error
    ///
    /// Cancel safe, so it can race the child in `select!`.
    async fn read_chunk(&mut self) {
        let Some(pipe) = self.pipe.as_mut() else {
            return;
        };
        let mut chunk = [0u8; 4096];
        match pipe.read(&mut chunk).await {
            Ok(0) | Err(_) => self.pipe = None,
            Ok(n) => self.buf.extend_from_slice(&chunk[..n]),
        }
    }

    fn into_string(self) -> String {
        String::from_utf8_lossy(&self.buf).into_owned()
    }
}

/// Read what is left in both pipes, giving up after `budget`
async fn drain<A, B>(stdout: &mut Capture<A>, stderr: &mut Capture<B>, budget: Duration)
where
    A: AsyncRead + Unpin,
    B: AsyncRead + Unpin,
{
    let deadline = Instant::now() + budget;
    while stdout.is_open() || stderr.is_open() {
        tokio::select! {
            _ = sleep_until(deadline) => {
                debug!("Controller pipes still open after exit, dropping them");
                break;
            }
            _ = stdout.read_chunk(), if stdout.is_open() => {}
            _ = stderr.read_chunk(), if stderr.is_open() => {}
        }
    }
}

/// The controller's process group, killed once on `kill()` or drop
struct ProcessGroup {
    pgid: Option<u32>,
}

impl ProcessGroup {
    fn new(pgid: Option<u32>) -> Self {
        Self { pgid }
    }

    #[cfg(unix)]
    fn kill(&mut self) {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        if let Some(pgid) = self.pgid.take() {
            // ESRCH just means the group is already gone
            if let Err(e) = killpg(Pid::from_raw(pgid as i32), Signal::SIGKILL) {
                if e != nix::errno::Errno::ESRCH {
                    warn!("Failed to kill controller process group {}: {}", pgid, e);
                }
            }
        }
    }

    #[cfg(not(unix))]
    fn kill(&mut self) {
        self.pgid = None;
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(unix)]
fn process_exit(status: ExitStatus) -> ProcessExit {
    use std::os::unix::process::ExitStatusExt;
    ProcessExit {
        code: status.code(),
        signal: status.signal(),
    }
}

#[cfg(not(unix))]
fn process_exit(status: ExitStatus) -> ProcessExit {
    ProcessExit {
        code: status.code(),
        signal: None,
    }
}
