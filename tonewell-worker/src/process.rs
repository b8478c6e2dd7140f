//! External process helpers
//!
//! Locating tools, draining their output without blocking the caller,
//! and stopping them politely before resorting to a kill.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Lines of output kept per process stream
const MAX_OUTPUT_LINES: usize = 200;

/// Finds `tool` the way a shell would
///
/// Names containing a slash are taken as paths; anything else is looked up
/// in `PATH`.
pub fn find_tool(tool: &str) -> Option<PathBuf> {
    if tool.contains('/') {
        let path = PathBuf::from(tool);
        return is_executable(&path).then_some(path);
    }

    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(tool))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// A spawned process whose stdout and stderr are collected in the background
pub struct Monitored {
    pub name: &'static str,
    pub child: Child,
    stdout: Option<JoinHandle<Vec<String>>>,
    stderr: Option<JoinHandle<Vec<String>>>,
}

impl Monitored {
    /// Spawns `command`; the child is killed if this value is dropped
    pub fn spawn(name: &'static str, command: &mut Command) -> std::io::Result<Self> {
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn()?;
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);
        debug!("Spawned {} (pid {:?})", name, child.id());

        Ok(Self {
            name,
            child,
            stdout,
            stderr,
        })
    }

    /// Exit status if the process has finished, without waiting
    pub fn poll(&mut self) -> std::io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }

    /// Sends SIGTERM and waits up to `grace` before killing outright
    pub async fn terminate(&mut self, grace: Duration) -> std::io::Result<ExitStatus> {
        if let Some(status) = self.child.try_wait()? {
            return Ok(status);
        }

        if let Some(pid) = self.child.id() {
            debug!("Sending SIGTERM to {} (pid {})", self.name, pid);
            send_terminate_best_effort(pid).await;
        }

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(status) => status,
            Err(_) => {
                warn!("{} ignored SIGTERM for {:?}, killing it", self.name, grace);
                self.child.kill().await?;
                self.child.wait().await
            }
        }
    }

    /// Logs whatever the process printed; call once it has exited
    pub async fn log_output(&mut self) {
        for (stream, handle) in [("stdout", self.stdout.take()), ("stderr", self.stderr.take())] {
            let Some(handle) = handle else { continue };
            match handle.await {
                Ok(lines) => {
                    for line in lines {
                        debug!("{} {}: {}", self.name, stream, line);
                    }
                }
                Err(e) => debug!("Lost {} {}: {}", self.name, stream, e),
            }
        }
    }
}

/// Reads a stream to its end, keeping the first lines
fn drain<R>(stream: R) -> JoinHandle<Vec<String>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        let mut kept = Vec::new();
        while let Ok(Some(line)) = lines.next_line().await {
            if kept.len() < MAX_OUTPUT_LINES {
                kept.push(line);
            }
        }
        kept
    })
}

fn sanitize_process_pid(pid: u32) -> Option<u32> {
    if pid == 0 || pid > i32::MAX as u32 {
        None
    } else {
        Some(pid)
    }
}

#[cfg(unix)]
async fn send_terminate_best_effort(pid: u32) {
    match sanitize_process_pid(pid) {
        Some(safe_pid) => {
            let _ = Command::new("kill")
                .args(["-TERM", &safe_pid.to_string()])
                .output()
                .await;
        }
        None => {
            warn!(pid = pid, "skipping SIGTERM for invalid/out-of-range pid");
        }
    }
}

#[cfg(not(unix))]
async fn send_terminate_best_effort(pid: u32) {
    let _ = pid;
}

/// Runs `command` to completion and returns its stdout
pub async fn output(command: &mut Command) -> std::io::Result<(ExitStatus, String)> {
    let output = command.stdin(Stdio::null()).kill_on_drop(true).output().await?;
    if !output.stderr.is_empty() {
        debug!("stderr: {}", String::from_utf8_lossy(&output.stderr).trim_end());
    }
    Ok((
        output.status,
        String::from_utf8_lossy(&output.stdout).into_owned(),
    ))
}

/// Sequencer output ports in a playback tool's `-l` listing, as `(address, "client:port")`
///
/// The listing is fixed-width: a `client:port` address, a 32 byte client
/// name column, then the port name.
pub fn parse_port_listing(listing: &str) -> Vec<(String, String)> {
    listing
        .lines()
        .filter_map(|line| {
            let line = line.trim_end();
            let address = line.get(..7)?.trim();
            let (client, port) = address.split_once(':')?;
            if client.parse::<u32>().is_err() || port.parse::<u32>().is_err() {
                return None;
            }
            // The client column is cut by bytes, so it may end inside a character
            let mut end = line.len().min(41);
            while !line.is_char_boundary(end) {
                end -= 1;
            }
            let client_name = line.get(9..end).unwrap_or("");
            let rest = &line[end..];
            let port_name = rest.find(' ').map_or("", |i| &rest[i + 1..]);
            Some((
                address.to_string(),
                format!("{}:{}", client_name.trim(), port_name.trim()),
            ))
        })
        .collect()
}
