//! Python interpreter bootstrap and I/O glue.

use std::{
    process::Stdio,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt},
    process::Command,
    task::JoinHandle,
    time::{timeout, timeout_at, Instant},
};
use tracing::{debug, warn};

use super::{CappedBuffer, InterpreterOptions, ProcessError, ProcessOutput, ResourceLimits};

/// Host variables that survive the cleared environment.
const PASSTHROUGH_ENV: &[&str] = &["PATH", "LANG", "LC_ALL", "PYTHONPATH", "VIRTUAL_ENV", "CONDA_PREFIX"];

/// How long stream readers may keep draining once the child is gone.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

const READ_CHUNK: usize = 8 * 1024;

type SharedCapture = Arc<Mutex<CappedBuffer>>;

/// Run `bootstrap` with `-c`, feeding `stdin_payload` and capturing both streams.
///
/// The child gets a cleared environment, its own process group, and the
/// configured rlimits. Each stream is read as it is produced and capped at
/// `opts.output_limit` bytes. On timeout the whole group is killed and the
/// output captured so far travels with the error.
pub async fn run_bootstrap(
    opts: &InterpreterOptions,
    bootstrap: &str,
    args: &[String],
    stdin_payload: &str,
) -> Result<ProcessOutput, ProcessError> {
    let mut cmd = Command::new(&opts.program);
    cmd.arg("-u") // unbuffered
        .arg("-c")
        .arg(bootstrap)
        .args(args)
        .current_dir(&opts.cwd)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .env_clear();

    for key in PASSTHROUGH_ENV {
        if let Ok(v) = std::env::var(key) {
            cmd.env(key, v);
        }
    }
    for (k, v) in &opts.env {
        cmd.env(k, v);
    }

    #[cfg(unix)]
    apply_isolation(&mut cmd, opts.limits, opts.isolate_network);

    let program = opts.program.display().to_string();
    let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
        program: program.clone(),
        source,
    })?;
    let pid = child.id();
    debug!(%program, ?pid, "interpreter started");

    let stdout: SharedCapture = Arc::new(Mutex::new(CappedBuffer::new(opts.output_limit)));
    let stderr: SharedCapture = Arc::new(Mutex::new(CappedBuffer::new(opts.output_limit)));
    let readers = [
        spawn_reader(child.stdout.take(), Arc::clone(&stdout)),
        spawn_reader(child.stderr.take(), Arc::clone(&stderr)),
    ];

    let stdin = child.stdin.take();
    let run = async {
        if let Some(mut stdin) = stdin {
            // The child may exit before draining stdin; its exit status tells the story.
            if let Err(e) = stdin.write_all(stdin_payload.as_bytes()).await {
                debug!(error = %e, "failed to write snippet to interpreter stdin");
            }
        }
        child.wait().await
    };
    let waited = timeout(opts.timeout, run).await;
    if waited.is_err() {
        if let Some(pid) = pid {
            kill_group(pid);
        }
        if let Err(e) = child.start_kill() {
            debug!(error = %e, "interpreter already gone");
        }
    }
    drain(readers).await;

    let stdout = lock(&stdout).to_text();
    let stderr = lock(&stderr).to_text();
    match waited {
        Ok(status) => Ok(ProcessOutput { status: status?, stdout, stderr }),
        Err(_) => {
            warn!(%program, ?pid, "interpreter exceeded {:?}; killed", opts.timeout);
            Err(ProcessError::Timeout { timeout: opts.timeout, stdout, stderr })
        }
    }
}

/// Copy `stream` into `sink` chunk by chunk until EOF; bytes past the cap are discarded.
fn spawn_reader<R>(stream: Option<R>, sink: SharedCapture) -> Option<JoinHandle<()>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut stream = stream?;
    Some(tokio::spawn(async move {
        let mut chunk = vec![0u8; READ_CHUNK];
        loop {
            match stream.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => lock(&sink).push(&chunk[..n]),
                Err(e) => {
                    debug!(error = %e, "interpreter stream read failed");
                    break;
                }
            }
        }
    }))
}

/// Wait for the readers to hit EOF; a descendant still holding a pipe open
/// gets [`DRAIN_GRACE`] before its reader is aborted.
async fn drain(readers: [Option<JoinHandle<()>>; 2]) {
    let deadline = Instant::now() + DRAIN_GRACE;
    for handle in readers.into_iter().flatten() {
        let abort = handle.abort_handle();
        if timeout_at(deadline, handle).await.is_err() {
            debug!("stream reader still busy after the child exited; aborting");
            abort.abort();
        }
    }
}

fn lock(capture: &SharedCapture) -> MutexGuard<'_, CappedBuffer> {
    capture.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(unix)]
fn apply_isolation(cmd: &mut Command, limits: ResourceLimits, isolate_network: bool) {
    const MIB: u64 = 1024 * 1024;
    let cpu = limits.cpu_seconds;
    let memory = limits.memory_mb.saturating_mul(MIB);
    let fsize = limits.file_size_mb.saturating_mul(MIB);

    // SAFETY: the hook only calls async-signal-safe libc functions.
    unsafe {
        cmd.pre_exec(move || {
            if libc::setpgid(0, 0) == -1 {
                return Err(std::io::Error::last_os_error());
            }

            macro_rules! cap {
                ($res:expr, $value:expr) => {
                    if $value > 0 {
                        let mut cur = libc::rlimit { rlim_cur: 0, rlim_max: 0 };
                        if libc::getrlimit($res, &mut cur) == 0 {
                            let value = ($value as libc::rlim_t).min(cur.rlim_max);
                            let lim = libc::rlimit { rlim_cur: value, rlim_max: value };
                            if libc::setrlimit($res, &lim) != 0 {
                                return Err(std::io::Error::last_os_error());
                            }
                        }
                    }
                };
            }
            cap!(libc::RLIMIT_CPU, cpu);
            cap!(libc::RLIMIT_AS, memory);
            cap!(libc::RLIMIT_FSIZE, fsize);

            let no_core = libc::rlimit { rlim_cur: 0, rlim_max: 0 };
            libc::setrlimit(libc::RLIMIT_CORE, &no_core);

            #[cfg(target_os = "linux")]
            {
                if isolate_network && libc::unshare(libc::CLONE_NEWUSER | libc::CLONE_NEWNET) != 0 {
                    return Err(std::io::Error::last_os_error());
                }
            }
            #[cfg(not(target_os = "linux"))]
            let _ = isolate_network;

            Ok(())
        });
    }
}

#[cfg(unix)]
fn kill_group(pid: u32) {
    // The child leads its own group (setpgid in pre_exec).
    // SAFETY: killpg takes plain integers and touches no memory owned by us.
    let rc = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
    if rc == -1 {
        debug!(pid, error = %std::io::Error::last_os_error(), "killpg failed");
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: u32) {}
