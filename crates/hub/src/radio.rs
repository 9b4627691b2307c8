//! Radio link: UDP receiver feeding the staging slot, and the drain task that
//! moves staged readings into the room buffers.

use anyhow::{Context, Result};
use tokio::net::UdpSocket;
use tokio::time::sleep;

use homebot_core::frame::{self, FRAME_LEN};

use crate::context::HubContext;

/// Larger than a frame so oversized datagrams are seen at their true length
/// instead of being truncated into a valid-looking one.
const RECV_BUF: usize = 512;

// ---------------------------------------------------------------------------
// Receive
// ---------------------------------------------------------------------------

pub async fn bind(addr: &str) -> Result<UdpSocket> {
    let socket = UdpSocket::bind(addr)
        .await
        .with_context(|| format!("failed to bind radio socket on {addr}"))?;
    let local = socket.local_addr()?;
    tracing::info!(addr = %local, frame_len = FRAME_LEN, "radio listening");
    Ok(socket)
}

/// Decode one datagram and stage it. Returns whether it was accepted.
pub async fn accept_datagram(ctx: &HubContext, datagram: &[u8]) -> bool {
    let reading = match frame::decode(datagram) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!("radio: dropped datagram: {e}");
            ctx.status
                .write()
                .await
                .record_rejected(format!("bad frame: {e}"));
            return false;
        }
    };

    if !ctx.rooms.read().await.contains(reading.room) {
        tracing::warn!(room = %reading.room, "radio: dropped frame for unknown room");
        ctx.status
            .write()
            .await
            .record_rejected(format!("unknown room {}", reading.room));
        return false;
    }

    let replaced = ctx.staging.put(reading);
    if let Some(lost) = &replaced {
        tracing::debug!(room = %lost.room, time = lost.time, "radio: undrained frame overwritten");
    }
    tracing::debug!(room = %reading.room, time = reading.time, "radio: frame staged");
    ctx.status
        .write()
        .await
        .record_frame(reading.room, replaced.is_some());
    true
}

/// Receive task. Socket errors are logged and the loop carries on.
pub async fn receive(ctx: HubContext, socket: UdpSocket) {
    let mut buf = [0u8; RECV_BUF];
    loop {
        match socket.recv_from(&mut buf).await {
            Ok((n, peer)) => {
                tracing::trace!(%peer, len = n, "radio: datagram");
                accept_datagram(&ctx, &buf[..n]).await;
            }
            Err(e) => {
                tracing::warn!("radio: recv failed: {e}");
                ctx.status
                    .write()
                    .await
                    .record_error(format!("radio recv failed: {e}"));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Drain
// ---------------------------------------------------------------------------

/// Move the staged reading, if any, into its room buffer.
pub async fn drain_once(ctx: &HubContext) -> bool {
    let Some(reading) = ctx.staging.take() else {
        return false;
    };
    match ctx.rooms.write().await.append(reading) {
        Ok(()) => {
            tracing::info!(
                room = %ctx.room_name(reading.room),
                time = reading.time,
                temperature = reading.temperature,
                humidity = reading.humidity,
                "radio: reading stored"
            );
            true
        }
        Err(e) => {
            tracing::warn!("radio: drain dropped reading: {e}");
            false
        }
    }
}

pub async fn drain(ctx: HubContext) {
    let interval = ctx.config.timing.drain();
    loop {
        drain_once(&ctx).await;
        sleep(interval).await;
    }
}

// ===========================================================================
// Tests
// ===========================================================================
