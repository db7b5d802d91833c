//! Network addresses for the listening and target sides of a session.

use std::fmt;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use crate::error::ConfigError;

/// Stream network family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Network {
    /// Any address family.
    #[default]
    Tcp,
    /// IPv4 only.
    Tcp4,
    /// IPv6 only.
    Tcp6,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Tcp => "tcp",
            Network::Tcp4 => "tcp4",
            Network::Tcp6 => "tcp6",
        }
    }

    fn admits(&self, addr: &SocketAddr) -> bool {
        match self {
            Network::Tcp => true,
            Network::Tcp4 => addr.is_ipv4(),
            Network::Tcp6 => addr.is_ipv6(),
        }
    }
}

impl FromStr for Network {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Network::Tcp),
            "tcp4" => Ok(Network::Tcp4),
            "tcp6" => Ok(Network::Tcp6),
            _ => Err(ConfigError::UnsupportedNetwork(s.to_string())),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A network address: network family, host and port.
///
/// The host may be an IP literal or a name; names are resolved each time the
/// address is bound or dialed so that a target which changes address between
/// server restarts is still reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetAddr {
    network: Network,
    host: String,
    port: u16,
}

impl NetAddr {
    pub fn new(network: Network, host: impl Into<String>, port: u16) -> Self {
        Self {
            network,
            host: host.into(),
            port,
        }
    }

    /// TCP address of either family.
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::new(Network::Tcp, host, port)
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Resolve to socket addresses admitted by the network family.
    pub async fn resolve(&self) -> io::Result<Vec<SocketAddr>> {
        let host = self.host.trim_start_matches('[').trim_end_matches(']');
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, self.port))
            .await?
            .filter(|addr| self.network.admits(addr))
            .collect();

        if addrs.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("{} resolved to no {} addresses", self, self.network),
            ));
        }
        Ok(addrs)
    }
}

impl From<SocketAddr> for NetAddr {
    fn from(addr: SocketAddr) -> Self {
        Self::tcp(addr.ip().to_string(), addr.port())
    }
}

impl fmt::Display for NetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.parse::<IpAddr>().is_ok_and(|ip| ip.is_ipv6()) {
            write!(f, "{}://[{}]:{}", self.network, self.host, self.port)
        } else {
            write!(f, "{}://{}:{}", self.network, self.host, self.port)
        }
    }
}

impl FromStr for NetAddr {
    type Err = ConfigError;

    /// Parses `host:port` or `<network>://host:port`. IPv6 literals must be
    /// bracketed: `tcp6://[::1]:25565`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ConfigError::InvalidAddress {
            input: s.to_string(),
            reason: reason.to_string(),
        };

        let (network, rest) = match s.split_once("://") {
            Some((scheme, rest)) => (scheme.parse::<Network>()?, rest),
            None => (Network::Tcp, s),
        };

        let (host, port) = rest.rsplit_once(':').ok_or_else(|| invalid("missing port"))?;
        let port: u16 = port.parse().map_err(|_| invalid("port is not a number"))?;

        let host = if let Some(inner) = host.strip_prefix('[') {
            inner
                .strip_suffix(']')
                .ok_or_else(|| invalid("unterminated IPv6 bracket"))?
        } else if host.contains(':') {
            return Err(invalid("IPv6 hosts must be bracketed"));
        } else {
            host
        };

        let host = if host.is_empty() {
            match network {
                Network::Tcp6 => "::",
                _ => "0.0.0.0",
            }
        } else {
            host
        };

        Ok(Self::new(network, host, port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("localhost:25565", Network::Tcp, "localhost", 25565)]
    #[case("tcp4://127.0.0.1:80", Network::Tcp4, "127.0.0.1", 80)]
    #[case("tcp6://[::1]:25566", Network::Tcp6, "::1", 25566)]
    #[case(":25565", Network::Tcp, "0.0.0.0", 25565)]
    #[case("tcp6://:25565", Network::Tcp6, "::", 25565)]
    fn test_parse_addr(
        #[case] input: &str,
        #[case] network: Network,
        #[case] host: &str,
        #[case] port: u16,
    ) {
        let addr: NetAddr = input.parse().unwrap();
        assert_eq!(addr.network(), network);
        assert_eq!(addr.host(), host);
        assert_eq!(addr.port(), port);
    }

    #[rstest]
    #[case("localhost")]
    #[case("localhost:http")]
    #[case("::1:80")]
    #[case("[::1:80")]
    fn test_parse_addr_invalid(#[case] input: &str) {
        let err = input.parse::<NetAddr>().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAddress { .. }));
    }

    #[test]
    fn test_udp_is_rejected() {
        let err = "udp://0.0.0.0:19132".parse::<NetAddr>().unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedNetwork(n) if n == "udp"));
    }

    #[test]
    fn test_display_brackets_ipv6() {
        let addr = NetAddr::new(Network::Tcp6, "::1", 25565);
        assert_eq!(addr.to_string(), "tcp6://[::1]:25565");
        assert_eq!(NetAddr::tcp("localhost", 1).to_string(), "tcp://localhost:1");
    }

    #[tokio::test]
    async fn test_resolve_filters_family() {
        let addr = NetAddr::new(Network::Tcp4, "127.0.0.1", 9);
        let resolved = addr.resolve().await.unwrap();
        assert_eq!(resolved, vec!["127.0.0.1:9".parse().unwrap()]);

        let mismatched = NetAddr::new(Network::Tcp6, "127.0.0.1", 9);
        assert!(mismatched.resolve().await.is_err());
    }
}
