//! One-shot subprocess execution for the external indexer
//!
//! Every indexer invocation (`add`, `query`, `status`) runs a subprocess to
//! completion while enforcing a time budget, an output size cap and a
//! cancellation scope. Subprocesses are spawned with `kill_on_drop` so no
//! indexer process can outlive its owning operation or the host process.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{info, trace, warn};

use crate::indexer::error::IndexerError;

/// Cap on captured stderr; stderr is diagnostic only and never parsed
const STDERR_CAP_BYTES: u64 = 64 * 1024;

/// A fully described indexer invocation
#[derive(Debug)]
pub struct IndexerInvocation {
    /// Indexer executable path
    pub program: String,

    /// Command-line arguments
    pub args: Vec<String>,

    /// Extra environment variables (the parent environment is inherited)
    pub envs: Vec<(String, String)>,

    /// Time budget; the subprocess is killed when it is exceeded
    pub timeout: Duration,

    /// Cap on captured stdout size
    pub max_output_bytes: u64,

    /// Operation name for timeout diagnostics ("build", "query", "status")
    pub operation: &'static str,
}

/// Captured output of a completed indexer subprocess
#[derive(Debug)]
pub struct IndexerOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

/// Run an indexer invocation to completion
///
/// Returns the captured output once the subprocess exits within budget.
/// Cancellation and timeout both kill the subprocess before returning the
/// corresponding error; output overflow is reported after exit.
pub async fn run(
    invocation: IndexerInvocation,
    cancel: &CancellationToken,
) -> Result<IndexerOutput, IndexerError> {
    info!(
        "Running indexer {}: {} {:?}",
        invocation.operation, invocation.program, invocation.args
    );

    let mut command = Command::new(&invocation.program);
    command
        .args(&invocation.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    for (key, value) in &invocation.envs {
        command.env(key, value);
    }

    let mut child = command.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            IndexerError::BinaryNotFound {
                path: invocation.program.clone(),
            }
        } else {
            IndexerError::Io(e)
        }
    })?;

    trace!(
        "Indexer {} subprocess started with PID {:?}",
        invocation.operation,
        child.id()
    );

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| IndexerError::Io(std::io::Error::other("stdout not available")))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| IndexerError::Io(std::io::Error::other("stderr not available")))?;

    // Drain both pipes concurrently with the wait so a chatty subprocess
    // cannot block on a full pipe buffer.
    let stdout_task = tokio::spawn(read_capped(stdout, invocation.max_output_bytes));
    let stderr_task = tokio::spawn(read_capped(stderr, STDERR_CAP_BYTES));

    let status = tokio::select! {
        _ = cancel.cancelled() => {
            info!("Indexer {} cancelled, killing subprocess", invocation.operation);
            kill_and_reap(&mut child).await;
            stdout_task.abort();
            stderr_task.abort();
            return Err(IndexerError::Cancelled);
        }
        waited = tokio::time::timeout(invocation.timeout, child.wait()) => match waited {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => return Err(IndexerError::Io(e)),
            Err(_) => {
                warn!(
                    "Indexer {} exceeded its {:?} budget, killing subprocess",
                    invocation.operation, invocation.timeout
                );
                kill_and_reap(&mut child).await;
                stdout_task.abort();
                stderr_task.abort();
                return Err(IndexerError::timeout(invocation.operation, invocation.timeout));
            }
        }
    };

    let (stdout, stdout_overflow) = stdout_task
        .await
        .map_err(|e| IndexerError::Io(std::io::Error::other(e)))??;
    let (stderr, _) = stderr_task
        .await
        .map_err(|e| IndexerError::Io(std::io::Error::other(e)))??;

    if stdout_overflow {
        return Err(IndexerError::OutputLimitExceeded {
            limit: invocation.max_output_bytes,
        });
    }

    trace!(
        "Indexer {} subprocess exited with status {}",
        invocation.operation, status
    );

    Ok(IndexerOutput {
        status,
        stdout,
        stderr,
    })
}

/// Kill the subprocess and wait for it so no zombie is left behind
async fn kill_and_reap(child: &mut tokio::process::Child) {
    if let Err(e) = child.start_kill() {
        warn!("Failed to kill indexer subprocess: {}", e);
    }
    let _ = child.wait().await;
}

/// Read a pipe to EOF, keeping at most `limit` bytes
///
/// Past the limit the pipe is still drained (so the subprocess never blocks
/// writing) but the excess is discarded and the overflow flag is set.
async fn read_capped<R: AsyncRead + Unpin>(
    mut reader: R,
    limit: u64,
) -> Result<(String, bool), std::io::Error> {
    let mut buf: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 8192];
    let mut overflow = false;

    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        if overflow {
            continue;
        }
        if (buf.len() + n) as u64 > limit {
            overflow = true;
            let keep = (limit as usize).saturating_sub(buf.len());
            buf.extend_from_slice(&chunk[..keep]);
        } else {
            buf.extend_from_slice(&chunk[..n]);
        }
    }

    Ok((String::from_utf8_lossy(&buf).into_owned(), overflow))
}

// ============================================================================
// Tests
// ============================================================================
