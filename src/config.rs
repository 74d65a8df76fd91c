use std::{fmt, net::SocketAddr, path::PathBuf, time::Duration};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 9999;
pub const DEFAULT_MAX_PAYLOAD: usize = 1024 * 1024;
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_EXTENSION: &str = "cpp";

/// Which address families the listener may bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Transport {
    #[default]
    Tcp,
    Tcp4,
    Tcp6,
}

impl Transport {
    pub fn allows(&self, addr: &SocketAddr) -> bool {
        match self {
            Self::Tcp => true,
            Self::Tcp4 => addr.is_ipv4(),
            Self::Tcp6 => addr.is_ipv6(),
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Tcp => "tcp",
            Self::Tcp4 => "tcp4",
            Self::Tcp6 => "tcp6",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub transport: Transport,
    pub host: String,
    pub port: u16,
    /// Submissions larger than this are rejected, not truncated.
    pub max_payload: usize,
    pub read_timeout: Duration,
    /// Directory receiving the source file and `test-cases/`.
    pub root: PathBuf,
    pub extension: String,
    pub template: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            transport: Transport::default(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_payload: DEFAULT_MAX_PAYLOAD,
            read_timeout: DEFAULT_READ_TIMEOUT,
            root: PathBuf::from("."),
            extension: DEFAULT_EXTENSION.to_string(),
            template: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_families() {
        let v4: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        let v6: SocketAddr = "[::1]:9999".parse().unwrap();

        assert!(Transport::Tcp.allows(&v4) && Transport::Tcp.allows(&v6));
        assert!(Transport::Tcp4.allows(&v4) && !Transport::Tcp4.allows(&v6));
        assert!(!Transport::Tcp6.allows(&v4) && Transport::Tcp6.allows(&v6));
    }
}
