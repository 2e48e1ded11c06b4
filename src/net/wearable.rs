//! Wearable-side connection worker.
//!
//! Each wearable connection runs a reader task (telemetry frames into the
//! registry) and a writer task (queued commands back to the device). Either
//! side finishing cancels the shared token so the other side unwinds too.

use crate::protocol::data::WearableCommand;
use crate::protocol::wearable::WearableCodec;
use crate::registry::Registry;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub async fn handle_wearable(
    stream: TcpStream,
    ip: String,
    registry: Arc<Registry>,
    cancel: CancellationToken,
) {
    let rx = registry.register_outbound(&ip);
    let (read_half, write_half) = stream.into_split();

    let reader = tokio::spawn(read_loop(
        read_half,
        ip.clone(),
        Arc::clone(&registry),
        cancel.clone(),
    ));
    let writer = tokio::spawn(write_loop(write_half, ip.clone(), rx, cancel.clone()));

    let _ = reader.await;
    let _ = writer.await;

    registry.remove(&ip);
    registry.release_outbound(&ip);
    info!(%ip, "wearable disconnected");
}

async fn read_loop(
    mut read_half: OwnedReadHalf,
    ip: String,
    registry: Arc<Registry>,
    cancel: CancellationToken,
) {
    let mut codec = WearableCodec::new();
    let mut buf = [0u8; 4096];
    loop {
        let read = tokio::select! {
            _ = cancel.cancelled() => break,
            read = read_half.read(&mut buf) => read,
        };
        match read {
            Ok(0) => {
                debug!(%ip, "wearable closed the connection");
                break;
            }
            Ok(n) => {
                codec.push_bytes(&buf[..n]);
                while let Some(sample) = codec.decode_sample() {
                    if let Some(pending) = registry.upsert(&ip, &sample) {
                        // Physical wearables always have a writer while
                        // connected, so this means the socket is mid-teardown.
                        warn!(%ip, id = pending.id(), "no live queue for reconciliation command");
                    }
                }
            }
            Err(err) => {
                warn!(%ip, error = %err, "wearable read failed");
                break;
            }
        }
    }
    cancel.cancel();
}

async fn write_loop(
    mut write_half: OwnedWriteHalf,
    ip: String,
    mut rx: mpsc::UnboundedReceiver<WearableCommand>,
    cancel: CancellationToken,
) {
    let codec = WearableCodec::new();
    'outer: loop {
        let cmd = tokio::select! {
            _ = cancel.cancelled() => break,
            cmd = rx.recv() => match cmd {
                Some(cmd) => cmd,
                None => break,
            },
        };
        if !send_command(&codec, &mut write_half, &ip, cmd).await {
            break;
        }
        // Drain whatever queued up while we were writing.
        while let Ok(cmd) = rx.try_recv() {
            if !send_command(&codec, &mut write_half, &ip, cmd).await {
                break 'outer;
            }
        }
    }
    let _ = write_half.shutdown().await;
    cancel.cancel();
}

async fn send_command(
    codec: &WearableCodec,
    write_half: &mut OwnedWriteHalf,
    ip: &str,
    cmd: WearableCommand,
) -> bool {
    let frame = match codec.encode_command(&cmd) {
        Ok(frame) => frame,
        Err(err) => {
            warn!(%ip, error = %err, "skipping unencodable command");
            return true;
        }
    };
    match write_half.write_all(frame.as_bytes()).await {
        Ok(()) => {
            debug!(%ip, frame = %frame, "command sent");
            true
        }
        Err(err) => {
            warn!(%ip, error = %err, "wearable write failed");
            false
        }
    }
}
