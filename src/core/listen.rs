//! Listen-address union and the bound listening socket.
//!
//! The address syntax is produced upstream; this module only needs the
//! discriminant (Unix vs network) to decide whether filesystem permission
//! bits apply, plus enough parsing to round-trip the two forms
//! `unix:<absolute-path>` and `<host>:<port>`.

use std::fmt;
use std::net::TcpListener;
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::net::UnixListener;
use std::path::PathBuf;
use std::str::FromStr;

use crate::core::errors::{Result, TaError};

/// A parsed listen address. Only the discriminant matters to the bootstrap
/// core: Unix addresses get filesystem permission bits, network addresses
/// do not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenAddress {
    /// `unix:<absolute-path>` — a Unix-domain socket on the filesystem.
    Unix(PathBuf),
    /// `<host>:<port>` — a TCP listening socket.
    Network(String, u16),
}

impl ListenAddress {
    /// Bind a non-blocking listening socket at this address.
    ///
    /// For Unix addresses a stale socket file from a previous run is
    /// unlinked first; permission bits are the caller's responsibility
    /// (they apply only after a successful bind).
    pub fn bind(&self) -> Result<Listener> {
        let inner = match self {
            Self::Unix(path) => {
                if path.exists() {
                    std::fs::remove_file(path).map_err(|source| TaError::SocketBind {
                        address: self.to_string(),
                        source,
                    })?;
                }
                let listener = UnixListener::bind(path).map_err(|source| TaError::SocketBind {
                    address: self.to_string(),
                    source,
                })?;
                ListenerInner::Unix(listener)
            }
            Self::Network(host, port) => {
                let listener =
                    TcpListener::bind((host.as_str(), *port)).map_err(|source| {
                        TaError::SocketBind {
                            address: self.to_string(),
                            source,
                        }
                    })?;
                ListenerInner::Tcp(listener)
            }
        };
        inner
            .set_nonblocking()
            .map_err(|source| TaError::SocketBind {
                address: self.to_string(),
                source,
            })?;
        Ok(Listener {
            address: self.clone(),
            inner,
        })
    }

    /// Whether filesystem permission bits apply to this address.
    #[must_use]
    pub const fn is_filesystem(&self) -> bool {
        matches!(self, Self::Unix(_))
    }
}

impl FromStr for ListenAddress {
    type Err = TaError;

    fn from_str(s: &str) -> Result<Self> {
        if let Some(path) = s.strip_prefix("unix:") {
            let path = PathBuf::from(path);
            if !path.is_absolute() {
                return Err(TaError::InvalidConfig {
                    details: format!("unix listen address must be absolute, got {s:?}"),
                });
            }
            return Ok(Self::Unix(path));
        }
        let Some((host, port)) = s.rsplit_once(':') else {
            return Err(TaError::InvalidConfig {
                details: format!("listen address must be `unix:<path>` or `<host>:<port>`, got {s:?}"),
            });
        };
        if host.is_empty() {
            return Err(TaError::InvalidConfig {
                details: format!("listen address has an empty host: {s:?}"),
            });
        }
        let port = port.parse::<u16>().map_err(|_| TaError::InvalidConfig {
            details: format!("listen address has an invalid port: {s:?}"),
        })?;
        Ok(Self::Network(host.to_string(), port))
    }
}

impl fmt::Display for ListenAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix(path) => write!(f, "unix:{}", path.display()),
            Self::Network(host, port) => write!(f, "{host}:{port}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Bound socket
// ---------------------------------------------------------------------------

enum ListenerInner {
    Unix(UnixListener),
    Tcp(TcpListener),
}

impl ListenerInner {
    fn set_nonblocking(&self) -> std::io::Result<()> {
        match self {
            Self::Unix(l) => l.set_nonblocking(true),
            Self::Tcp(l) => l.set_nonblocking(true),
        }
    }
}

/// A bound, non-blocking OS listening handle, created exactly once per run.
pub struct Listener {
    address: ListenAddress,
    inner: ListenerInner,
}

impl Listener {
    /// The address this socket is bound to.
    #[must_use]
    pub const fn address(&self) -> &ListenAddress {
        &self.address
    }

    /// Accept one pending connection without blocking.
    ///
    /// Returns `Ok(true)` if a connection was accepted (and immediately
    /// handed off/closed by the caller), `Ok(false)` if none is pending.
    pub fn try_accept(&self) -> std::io::Result<bool> {
        let result = match &self.inner {
            ListenerInner::Unix(l) => l.accept().map(|_| true),
            ListenerInner::Tcp(l) => l.accept().map(|_| true),
        };
        match result {
            Ok(accepted) => Ok(accepted),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(false),
            Err(e) => Err(e),
        }
    }
}

impl AsFd for Listener {
    fn as_fd(&self) -> BorrowedFd<'_> {
        match &self.inner {
            ListenerInner::Unix(l) => l.as_fd(),
            ListenerInner::Tcp(l) => l.as_fd(),
        }
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::ListenAddress;
    use crate::core::errors::TaError;
    use std::path::Path;

    #[test]
    fn parses_unix_address() {
        let addr: ListenAddress = "unix:/tmp/t.sock".parse().expect("should parse");
        assert_eq!(addr, ListenAddress::Unix("/tmp/t.sock".into()));
        assert!(addr.is_filesystem());
        assert_eq!(addr.to_string(), "unix:/tmp/t.sock");
    }

    #[test]
    fn parses_network_address() {
        let addr: ListenAddress = "127.0.0.1:7510".parse().expect("should parse");
        assert_eq!(addr, ListenAddress::Network("127.0.0.1".to_string(), 7510));
        assert!(!addr.is_filesystem());
        assert_eq!(addr.to_string(), "127.0.0.1:7510");
    }

    #[test]
    fn rejects_relative_unix_path() {
        let err = "unix:relative/path.sock"
            .parse::<ListenAddress>()
            .expect_err("relative path must be rejected");
        assert!(matches!(err, TaError::InvalidConfig { .. }));
    }

    #[test]
    fn rejects_missing_port() {
        assert!("localhost".parse::<ListenAddress>().is_err());
        assert!("localhost:notaport".parse::<ListenAddress>().is_err());
        assert!(":7510".parse::<ListenAddress>().is_err());
    }

    #[test]
    fn bind_unix_replaces_stale_socket_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("agent.sock");
        let addr = ListenAddress::Unix(path.clone());

        let first = addr.bind().expect("first bind");
        drop(first);
        // The socket file is left behind; a second bind must unlink it.
        assert!(path.exists());
        let second = addr.bind().expect("rebinding over a stale socket file");
        assert_eq!(second.address(), &addr);
        assert!(Path::new(&path).exists());
    }

    #[test]
    fn try_accept_returns_false_when_idle() {
        let dir = tempfile::tempdir().expect("tempdir");
        let addr = ListenAddress::Unix(dir.path().join("idle.sock"));
        let listener = addr.bind().expect("bind");
        assert!(!listener.try_accept().expect("no pending connection"));
    }
}
