//! TCP listeners and per-connection workers.

pub mod app;
pub mod wearable;

use std::future::Future;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Accept loop shared by every listener role. Each accepted connection gets
/// its own child token and runs in its own task; accept errors are transient
/// and never stop the loop.
pub async fn serve<F, Fut>(
    role: &'static str,
    listener: TcpListener,
    cancel: CancellationToken,
    handler: F,
) where
    F: Fn(TcpStream, String, CancellationToken) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let ip = peer.ip().to_string();
                    info!(role, %ip, "connection accepted");
                    if let Err(err) = stream.set_nodelay(true) {
                        warn!(role, %ip, error = %err, "failed to set TCP_NODELAY");
                    }
                    tokio::spawn(handler(stream, ip, cancel.child_token()));
                }
                Err(err) => {
                    warn!(role, error = %err, "accept failed");
                }
            },
        }
    }
    info!(role, "listener stopped");
}
