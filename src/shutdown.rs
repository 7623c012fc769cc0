use tokio_util::sync::CancellationToken;

/// Install the host's termination hook.
///
/// Returns a `CancellationToken` that is cancelled on SIGTERM or SIGINT.
/// The server passes it to [`Server::run`](crate::server::Server::run),
/// which tears the job engine down explicitly.
pub fn install_shutdown_handler() -> CancellationToken {
    let token = CancellationToken::new();
    tokio::spawn(cancel_on_signal(token.clone()));
    token
}

async fn cancel_on_signal(token: CancellationToken) {
    match termination_signal().await {
        Ok(signal) => {
            tracing::info!(signal, "Received termination signal, initiating graceful shutdown");
            token.cancel();
        }
        Err(e) => {
            // Without handlers the process still dies on the default action.
            tracing::error!(error = %e, "Failed to install signal handlers");
        }
    }
}

#[cfg(unix)]
async fn termination_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => Ok("SIGTERM"),
        _ = sigint.recv() => Ok("SIGINT"),
    }
}

#[cfg(not(unix))]
async fn termination_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}
