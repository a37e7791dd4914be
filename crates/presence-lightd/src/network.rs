use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::debug;

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Basic connectivity check run before talking to any remote API.
pub trait Reachability {
    fn is_reachable(&self) -> bool;
}

/// Opens a TCP connection to a well-known host.
pub struct TcpProbe {
    host: String,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            timeout: PROBE_TIMEOUT,
        }
    }
}

impl Reachability for TcpProbe {
    fn is_reachable(&self) -> bool {
        let addrs = match self.host.to_socket_addrs() {
            Ok(addrs) => addrs,
            Err(err) => {
                debug!(host = %self.host, error = %err, "reachability probe failed to resolve");
                return false;
            }
        };
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.timeout) {
                Ok(_) => return true,
                Err(err) => debug!(%addr, error = %err, "reachability probe failed to connect"),
            }
        }
        false
    }
}
