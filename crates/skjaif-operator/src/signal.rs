use snafu::{ResultExt, Snafu};
use tokio::signal::unix::{SignalKind, signal};

use crate::reconciler::Cancellation;

#[derive(Debug, Snafu)]
#[snafu(display("failed to register signal handler"))]
pub struct SignalError {
    source: std::io::Error,
}

/// Cancels `cancellation` once the process receives `SIGTERM` or `SIGINT`
/// (Ctrl-C).
///
/// The handlers are registered before this function returns, so no signal
/// arriving afterwards is missed.
pub fn cancel_on_shutdown_signal(cancellation: Cancellation) -> Result<(), SignalError> {
    let mut sigterm = signal(SignalKind::terminate()).context(SignalSnafu)?;
    let mut sigint = signal(SignalKind::interrupt()).context(SignalSnafu)?;

    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
            _ = sigint.recv() => tracing::info!("received SIGINT, shutting down"),
        }

        cancellation.cancel();
    });

    Ok(())
}
