use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::api::{self, ApiState};
use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::jobs::{JobRuntime, JobStore};
use crate::logs::FileLogStore;
use crate::service::JobService;

/// Hosts the job engine behind the HTTP API.
pub struct Server {
    config: ServerConfig,
    service: Arc<JobService>,
    state: ApiState,
}

impl Server {
    /// Wire the log store, job store, runtime and API together.
    ///
    /// # Errors
    ///
    /// Returns an error if the log directory cannot be created or the owner
    /// header is not a valid header name.
    pub async fn new(config: ServerConfig) -> Result<Self> {
        let logs = FileLogStore::new(&config.log_dir).await?;
        let runtime = JobRuntime::default().with_drain_timeout(config.output_drain_timeout);
        let service = Arc::new(
            JobService::new(Arc::new(JobStore::new()), Arc::new(logs), runtime)
                .with_retained_logs(config.retain_logs_on_shutdown),
        );
        let state = ApiState::new(service.clone(), &config.owner_header)?;

        Ok(Self {
            config,
            service,
            state,
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn service(&self) -> Arc<JobService> {
        self.service.clone()
    }

    pub fn router(&self) -> Router {
        api::router(self.state.clone())
    }

    /// Bind the configured address and serve until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let listener = TcpListener::bind(self.config.listen_addr)
            .await
            .map_err(|e| {
                Error::internal(
                    "Server::run",
                    format!("failed to bind {}", self.config.listen_addr),
                    e,
                )
            })?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener.
    ///
    /// Once `shutdown` is cancelled the listener stops accepting, in-flight
    /// requests finish, and the job engine is torn down: running jobs are
    /// stopped and the log retention policy is applied.
    pub async fn serve(self, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(
                addr = %addr,
                log_dir = %self.config.log_dir.display(),
                owner_header = %self.config.owner_header,
                "Starting job API server"
            );
            if !is_loopback(&addr) {
                tracing::warn!(
                    addr = %addr,
                    owner_header = %self.config.owner_header,
                    "Listening beyond loopback: the owner header is trusted as-is and \
                     must be set by an mTLS terminator that strips client-supplied values"
                );
            }
        }

        let served = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await;

        if let Err(e) = self.service.shutdown().await {
            tracing::error!(error = %e, "Job engine shutdown failed");
        }

        served.map_err(|e| Error::internal("Server::serve", "HTTP server failed", e))
    }
}

/// Whether only local clients can reach `addr`.
fn is_loopback(addr: &SocketAddr) -> bool {
    addr.ip().is_loopback()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_detection() {
        assert!(is_loopback(&"127.0.0.1:8080".parse().unwrap()));
        assert!(is_loopback(&"[::1]:8080".parse().unwrap()));
        assert!(!is_loopback(&"0.0.0.0:8080".parse().unwrap()));
        assert!(!is_loopback(&"10.0.0.5:8080".parse().unwrap()));
        assert!(!is_loopback(&"[::]:8080".parse().unwrap()));
    }
}
