// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The shared NDJSON connection driver.
//!
//! One connection, one task: requests are handled in arrival order, and
//! event frames are interleaved between responses whenever the
//! connection's filter wants them. Responses and pushes never fragment
//! because each is one line written by this single task.

use crate::rpc::{ConnState, Router};
use std::sync::Arc;
use ta_core::Clock;
use ta_wire::{EventFrame, RpcError, RpcRequest, RpcResponse};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::debug;

pub async fn serve_stream<R, W, C>(reader: R, mut writer: W, router: Router<C>, conn: Arc<ConnState>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    C: Clock,
{
    let mut lines = BufReader::new(reader).lines();
    let mut events = router.ctx().engine.bus.subscribe();
    let shutdown = router.ctx().engine.shutdown.clone();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,

            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        debug!(error = %e, "connection read failed");
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                let response = match serde_json::from_str::<RpcRequest>(&line) {
                    Ok(request) => router.handle(request, Some(&conn)).await,
                    Err(e) => RpcResponse::err(
                        ta_wire::RequestId::Null,
                        RpcError::parse(e.to_string()),
                    ),
                };
                if write_line(&mut writer, &response).await.is_err() {
                    break;
                }
            }

            record = events.recv() => {
                let Some(record) = record else { break };
                if !conn.wants(&record) {
                    continue;
                }
                let frame = EventFrame::new(record);
                if write_line(&mut writer, &frame).await.is_err() {
                    break;
                }
            }
        }
    }
}

async fn write_line<W: AsyncWrite + Unpin, T: serde::Serialize>(
    writer: &mut W,
    value: &T,
) -> std::io::Result<()> {
    let mut line = serde_json::to_vec(value).map_err(std::io::Error::other)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await
}
