//! Connectivity pre-check.

use std::net::{TcpStream, ToSocketAddrs};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Decides whether the remote can be reached before any network step.
pub trait RemoteProbe: Send + Sync {
    /// Returns true if `url` looks reachable right now.
    fn is_reachable(&self, url: &str) -> bool;
}

/// Probes by opening a TCP connection to the remote host.
///
/// Local paths and `file://` URLs are reachable when they exist.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    timeout: Duration,
}

impl TcpProbe {
    /// Creates a probe with the given connect timeout.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl RemoteProbe for TcpProbe {
    fn is_reachable(&self, url: &str) -> bool {
        match RemoteTarget::parse(url) {
            RemoteTarget::Local(path) => path.exists(),
            RemoteTarget::Host { host, port } => {
                let addrs = match (host.as_str(), port).to_socket_addrs() {
                    Ok(addrs) => addrs,
                    Err(e) => {
                        debug!(host = %host, error = %e, "remote host does not resolve");
                        return false;
                    }
                };
                addrs
                    .into_iter()
                    .any(|addr| TcpStream::connect_timeout(&addr, self.timeout).is_ok())
            }
        }
    }
}

/// Probe that always answers the same.
#[derive(Debug, Clone, Copy)]
pub struct StaticProbe(pub bool);

impl RemoteProbe for StaticProbe {
    fn is_reachable(&self, _url: &str) -> bool {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum RemoteTarget {
    Local(PathBuf),
    Host { host: String, port: u16 },
}

impl RemoteTarget {
    fn parse(url: &str) -> Self {
        if let Some(path) = url.strip_prefix("file://") {
            return Self::Local(PathBuf::from(path));
        }
        let schemes = [
            ("https://", 443),
            ("http://", 80),
            ("ssh://", 22),
            ("git://", 9418),
        ];
        for (scheme, default_port) in schemes {
            if let Some(rest) = url.strip_prefix(scheme) {
                let authority = rest.split('/').next().unwrap_or(rest);
                let authority = authority.rsplit_once('@').map_or(authority, |(_, h)| h);
                return Self::host_port(authority, default_port);
            }
        }
        // scp-style `user@host:path`
        if let Some((user_host, _)) = url.split_once(':') {
            if let Some((_, host)) = user_host.split_once('@') {
                return Self::Host {
                    host: host.to_string(),
                    port: 22,
                };
            }
        }
        Self::Local(PathBuf::from(url))
    }

    fn host_port(authority: &str, default_port: u16) -> Self {
        if let Some(bracketed) = authority.strip_prefix('[') {
            // [v6]:port
            let (host, rest) = bracketed.split_once(']').unwrap_or((bracketed, ""));
            let port = rest.strip_prefix(':').and_then(|p| p.parse().ok());
            return Self::Host {
                host: host.to_string(),
                port: port.unwrap_or(default_port),
            };
        }
        match authority.rsplit_once(':') {
            Some((host, port)) => match port.parse::<u16>() {
                Ok(port) => Self::Host {
                    host: host.to_string(),
                    port,
                },
                Err(_) => Self::Host {
                    host: authority.to_string(),
                    port: default_port,
                },
            },
            None => Self::Host {
                host: authority.to_string(),
                port: default_port,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn host(host: &str, port: u16) -> RemoteTarget {
        RemoteTarget::Host {
            host: host.to_string(),
            port,
        }
    }

    #[test]
    fn targets() {
        let cases = [
            ("https://git.example.com/a/b.git", host("git.example.com", 443)),
            ("http://user:pw@localhost:8080/r", host("localhost", 8080)),
            ("ssh://git@example.com:2222/r.git", host("example.com", 2222)),
            ("git@example.com:team/r.git", host("example.com", 22)),
            ("https://[::1]:8443/r", host("::1", 8443)),
        ];
        for (url, expected) in cases {
            assert_eq!(RemoteTarget::parse(url), expected, "{url}");
        }
        assert_eq!(
            RemoteTarget::parse("/srv/git/r.git"),
            RemoteTarget::Local(PathBuf::from("/srv/git/r.git"))
        );
        assert_eq!(
            RemoteTarget::parse("file:///srv/git/r.git"),
            RemoteTarget::Local(PathBuf::from("/srv/git/r.git"))
        );
    }

    #[test]
    fn local_paths_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let probe = TcpProbe::new(Duration::from_millis(200));
        assert!(probe.is_reachable(dir.path().to_str().unwrap()));
        assert!(!probe.is_reachable(dir.path().join("missing").to_str().unwrap()));
    }

    #[test]
    fn listening_host_is_reachable() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let probe = TcpProbe::new(Duration::from_secs(1));
        assert!(probe.is_reachable(&format!("http://127.0.0.1:{port}/repo.git")));
    }
}
