//! App-side connection workers.
//!
//! Apps get two unidirectional links: an egress connection that streams every
//! known sample at a fixed cadence, and an ingress connection that carries
//! commands back toward wearables.

use crate::protocol::app::AppCodec;
use crate::registry::Registry;
use crate::router::Router;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Cadence of the sample broadcast toward each app.
pub const EGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// Streams every registry sample to the app until the socket dies or the
/// server shuts down.
pub async fn handle_app_egress(
    mut stream: TcpStream,
    ip: String,
    registry: Arc<Registry>,
    cancel: CancellationToken,
) {
    let codec = AppCodec::new();
    let mut ticker = interval(EGRESS_INTERVAL);
    'outer: loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                for (source, sample) in registry.all_samples() {
                    let message = match codec.encode_sample(&sample) {
                        Ok(message) => message,
                        Err(err) => {
                            warn!(%ip, %source, error = %err, "skipping unencodable sample");
                            continue;
                        }
                    };
                    if let Err(err) = stream.write_all(message.as_bytes()).await {
                        debug!(%ip, error = %err, "app egress write failed");
                        break 'outer;
                    }
                }
            }
        }
    }
    let _ = stream.shutdown().await;
    info!(%ip, "app egress disconnected");
}

/// Reads app commands and routes each one toward its target wearable.
pub async fn handle_app_ingress(
    mut stream: TcpStream,
    ip: String,
    router: Arc<Router>,
    cancel: CancellationToken,
) {
    let mut codec = AppCodec::new();
    let mut buf = [0u8; 4096];
    loop {
        let read = tokio::select! {
            _ = cancel.cancelled() => break,
            read = stream.read(&mut buf) => read,
        };
        match read {
            Ok(0) => break,
            Ok(n) => {
                codec.push_bytes(&buf[..n]);
                while let Some(cmd) = codec.decode_command() {
                    router.route(&ip, cmd);
                }
            }
            Err(err) => {
                warn!(%ip, error = %err, "app ingress read failed");
                break;
            }
        }
    }
    info!(%ip, "app ingress disconnected");
}
