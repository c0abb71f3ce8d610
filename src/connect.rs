//! Getting a stream to an editor and attaching a session to it.
//!
//! An address is either `host:port` (TCP) or a filesystem path (unix
//! socket). [`default_address`] follows the environment the editor exports
//! to its child processes, and [`discover_sockets`] finds listening
//! instances in the usual runtime directories.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::rpc::{attach_with, Session};

/// Environment variable set by Neovim 0.9+ in its terminals and jobs.
pub const NVIM_ENV: &str = "NVIM";

/// Older name for the same address.
pub const LISTEN_ADDRESS_ENV: &str = "NVIM_LISTEN_ADDRESS";

/// True for `host:port` addresses; everything else is treated as a path.
pub fn is_tcp_address(addr: &str) -> bool {
    if addr.contains('/') || addr.contains('\\') {
        return false;
    }
    match addr.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    }
}

/// Connect to a listening editor.
///
/// # Errors
///
/// Returns `Error::Connection` if the socket does not exist, the
/// connection is refused, or permission is denied.
pub async fn connect(addr: &str, config: SessionConfig) -> Result<Session> {
    if is_tcp_address(addr) {
        let stream = TcpStream::connect(addr).await.map_err(Error::Connection)?;
        stream.set_nodelay(true).map_err(Error::Connection)?;
        let (reader, writer) = stream.into_split();
        info!("Connected to {} over TCP", addr);
        return attach_with(writer, reader, config);
    }
    connect_unix(Path::new(addr), config).await
}

#[cfg(unix)]
async fn connect_unix(path: &Path, config: SessionConfig) -> Result<Session> {
    let stream = tokio::net::UnixStream::connect(path)
        .await
        .map_err(Error::Connection)?;
    let (reader, writer) = stream.into_split();
    info!("Connected to {}", path.display());
    attach_with(writer, reader, config)
}

#[cfg(not(unix))]
async fn connect_unix(path: &Path, _config: SessionConfig) -> Result<Session> {
    Err(Error::Connection(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        format!("Socket paths are not supported on this platform: {}", path.display()),
    )))
}

/// Connect, retrying with exponential backoff: 100ms, 200ms, 400ms, ...
///
/// Useful right after starting an editor, before it has created its socket.
pub async fn connect_with_retry(addr: &str, config: SessionConfig, max_attempts: u32) -> Result<Session> {
    let mut attempt = 1;
    loop {
        match connect(addr, config.clone()).await {
            Ok(session) => return Ok(session),
            Err(err) if attempt < max_attempts => {
                let delay = Duration::from_millis(100 * (1 << (attempt - 1).min(10)));
                debug!("Connect attempt {} to {} failed ({}); retrying in {:?}", attempt, addr, err, delay);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Start `program --embed` and attach to its stdio.
///
/// The child is killed when the returned [`Child`] is dropped.
pub async fn spawn_embedded(program: &str, args: &[&str], config: SessionConfig) -> Result<(Session, Child)> {
    let mut child = Command::new(program)
        .arg("--embed")
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(Error::Connection)?;

    let missing = |what: &str| {
        Error::Connection(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            format!("Embedded process has no {}", what),
        ))
    };
    let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
    let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;

    info!("Started embedded {} (pid {:?})", program, child.id());
    let session = attach_with(stdin, stdout, config)?;
    Ok((session, child))
}

/// Address of the editor this process runs under, if any.
///
/// Resolution order:
/// 1. `$NVIM`
/// 2. `$NVIM_LISTEN_ADDRESS`
pub fn default_address() -> Option<String> {
    resolve_address(std::env::var(NVIM_ENV).ok(), std::env::var(LISTEN_ADDRESS_ENV).ok())
}

fn resolve_address(nvim: Option<String>, listen: Option<String>) -> Option<String> {
    [nvim, listen]
        .into_iter()
        .flatten()
        .map(|addr| addr.trim().to_string())
        .find(|addr| !addr.is_empty())
}

/// Sockets of running editors in the runtime dir (or the temp dir).
pub fn discover_sockets() -> Vec<PathBuf> {
    let mut roots = Vec::new();
    if let Some(runtime) = dirs::runtime_dir() {
        roots.push(runtime);
    }
    roots.push(std::env::temp_dir());
    discover_in(&roots)
}

/// Entries named `nvim.*` in `roots`, plus the contents of `nvim*`
/// directories (the layout older versions use).
fn discover_in(roots: &[PathBuf]) -> Vec<PathBuf> {
    let mut found = Vec::new();
    for root in roots {
        let entries = match std::fs::read_dir(root) {
            Ok(entries) => entries,
            Err(err) => {
                debug!("Skipping {}: {}", root.display(), err);
                continue;
            }
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.starts_with("nvim") {
                continue;
            }
            let path = entry.path();
            match entry.file_type() {
                Ok(kind) if kind.is_dir() => match std::fs::read_dir(&path) {
                    Ok(children) => found.extend(children.flatten().map(|child| child.path())),
                    Err(err) => warn!("Cannot read {}: {}", path.display(), err),
                },
                Ok(_) if name.starts_with("nvim.") => found.push(path),
                _ => {}
            }
        }
    }
    found.sort();
    found.dedup();
    found
}
