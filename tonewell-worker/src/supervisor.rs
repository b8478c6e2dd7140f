//! Supervisor liveness
//!
//! The worker runs under a service manager speaking the systemd notify
//! protocol. It reports readiness once and then pets the watchdog every
//! time the fetch loop comes around; a wedged worker stops petting and gets
//! restarted. Without `NOTIFY_SOCKET` every call is a no-op.

use std::path::PathBuf;
use tracing::{debug, info};

#[cfg(unix)]
use std::os::unix::net::UnixDatagram;

pub struct Supervisor {
    #[cfg(unix)]
    socket: Option<(UnixDatagram, PathBuf)>,
}

impl Supervisor {
    /// Connects to the socket named by `NOTIFY_SOCKET`, if any
    pub fn from_env() -> Self {
        match std::env::var_os("NOTIFY_SOCKET") {
            Some(path) => Self::with_socket(PathBuf::from(path)),
            None => {
                debug!("NOTIFY_SOCKET not set, supervisor notifications disabled");
                Self::disabled()
            }
        }
    }

    pub fn disabled() -> Self {
        Self {
            #[cfg(unix)]
            socket: None,
        }
    }

    #[cfg(unix)]
    pub fn with_socket(path: PathBuf) -> Self {
        match UnixDatagram::unbound() {
            Ok(socket) => {
                info!("Reporting liveness to {}", path.display());
                Self {
                    socket: Some((socket, path)),
                }
            }
            Err(e) => {
                tracing::warn!("Failed to create notify socket: {}", e);
                Self::disabled()
            }
        }
    }

    #[cfg(not(unix))]
    pub fn with_socket(_path: PathBuf) -> Self {
        Self::disabled()
    }

    /// Startup finished
    pub fn ready(&self) {
        self.send("READY=1");
    }

    /// Still alive
    pub fn watchdog(&self) {
        self.send("WATCHDOG=1");
    }

    /// Shutting down on purpose
    pub fn stopping(&self) {
        self.send("STOPPING=1");
    }

    #[cfg(unix)]
    fn send(&self, state: &str) {
        let Some((socket, path)) = &self.socket else {
            return;
        };

        let sent = match path.to_str().and_then(|p| p.strip_prefix('@')) {
            Some(name) => send_abstract(socket, name, state),
            None => socket.send_to(state.as_bytes(), path).map(|_| ()),
        };
        if let Err(e) = sent {
            debug!("Failed to notify supervisor of {}: {}", state, e);
        }
    }

    #[cfg(not(unix))]
    fn send(&self, _state: &str) {}
}

/// Linux abstract-namespace sockets are written `@name`
#[cfg(target_os = "linux")]
fn send_abstract(socket: &UnixDatagram, name: &str, state: &str) -> std::io::Result<()> {
    use std::os::linux::net::SocketAddrExt;
    use std::os::unix::net::SocketAddr;

    let addr = SocketAddr::from_abstract_name(name.as_bytes())?;
    socket.send_to_addr(state.as_bytes(), &addr).map(|_| ())
}

#[cfg(all(unix, not(target_os = "linux")))]
fn send_abstract(_socket: &UnixDatagram, name: &str, _state: &str) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        format!("abstract socket @{} not supported here", name),
    ))
}
