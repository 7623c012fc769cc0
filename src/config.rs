use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::jobs::runtime::DEFAULT_OUTPUT_DRAIN_TIMEOUT;

/// Header carrying the caller identity when none is configured.
pub const DEFAULT_OWNER_HEADER: &str = "x-client-cn";

/// Configuration for the job server.
///
/// The server trusts `owner_header` as the authenticated caller identity.
/// It must run behind an mTLS terminator that verifies the client
/// certificate, sets this header to the certificate's common name, and
/// strips any value supplied by the client.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    /// Directory holding one log file per job.
    pub log_dir: PathBuf,
    pub owner_header: String,
    /// Keep log files when the server shuts down. When false the log
    /// directory is removed after all jobs have been stopped.
    pub retain_logs_on_shutdown: bool,
    /// How long to keep collecting output after a process exits.
    pub output_drain_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            // SAFETY: This is a hardcoded valid address that will always parse
            listen_addr: "127.0.0.1:8080"
                .parse()
                .expect("default listen address is valid"),
            log_dir: PathBuf::from("logs"),
            owner_header: DEFAULT_OWNER_HEADER.to_string(),
            retain_logs_on_shutdown: false,
            output_drain_timeout: DEFAULT_OUTPUT_DRAIN_TIMEOUT,
        }
    }
}

impl ServerConfig {
    pub fn new(listen_addr: SocketAddr, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            listen_addr,
            log_dir: log_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_owner_header(mut self, header: impl Into<String>) -> Self {
        self.owner_header = header.into();
        self
    }

    pub fn with_retained_logs(mut self, retain: bool) -> Self {
        self.retain_logs_on_shutdown = retain;
        self
    }

    pub fn with_output_drain_timeout(mut self, timeout: Duration) -> Self {
        self.output_drain_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_config_default() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.listen_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(cfg.log_dir, PathBuf::from("logs"));
        assert_eq!(cfg.owner_header, "x-client-cn");
        assert!(!cfg.retain_logs_on_shutdown);
        assert_eq!(cfg.output_drain_timeout, Duration::from_secs(2));
    }

    #[test]
    fn server_config_new() {
        let addr: SocketAddr = "10.0.0.1:9000".parse().unwrap();
        let cfg = ServerConfig::new(addr, "/var/lib/runnable");
        assert_eq!(cfg.listen_addr, addr);
        assert_eq!(cfg.log_dir, PathBuf::from("/var/lib/runnable"));
        assert_eq!(cfg.owner_header, DEFAULT_OWNER_HEADER);
    }

    #[test]
    fn server_config_builders() {
        let cfg = ServerConfig::default()
            .with_owner_header("x-ssl-client-s-dn-cn")
            .with_retained_logs(true)
            .with_output_drain_timeout(Duration::from_millis(250));
        assert_eq!(cfg.owner_header, "x-ssl-client-s-dn-cn");
        assert!(cfg.retain_logs_on_shutdown);
        assert_eq!(cfg.output_drain_timeout, Duration::from_millis(250));
    }
}
