// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP transport: `POST /rpc` plus the `GET /events` SSE stream.

use crate::rpc::Router;
use axum::extract::State;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::Json;
use futures_util::Stream;
use std::convert::Infallible;
use ta_core::Clock;
use ta_wire::{RpcRequest, RpcResponse};
use tracing::error;

fn app<C: Clock>(router: Router<C>) -> axum::Router {
    axum::Router::new()
        .route("/rpc", post(rpc_handler::<C>))
        .route("/events", get(events_handler::<C>))
        .with_state(router)
}

async fn rpc_handler<C: Clock>(
    State(router): State<Router<C>>,
    Json(request): Json<RpcRequest>,
) -> Json<RpcResponse> {
    // HTTP has no connection-scoped push; task.watch belongs on a socket.
    Json(router.handle(request, None).await)
}

async fn events_handler<C: Clock>(
    State(router): State<Router<C>>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let stream = router.ctx().engine.bus.subscribe();
    let stream = futures_util::stream::unfold(stream, |mut stream| async move {
        loop {
            let record = stream.recv().await?;
            match SseEvent::default().event(record.event.name()).json_data(&record) {
                Ok(event) => return Some((Ok(event), stream)),
                Err(e) => {
                    error!(error = %e, "event serialisation failed");
                    continue;
                }
            }
        }
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Serve `/rpc` and `/events` on the bound listener until shutdown.
pub async fn serve_http<C: Clock>(listener: tokio::net::TcpListener, router: Router<C>) {
    let shutdown = router.ctx().engine.shutdown.clone();
    let app = app(router);
    let serve = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await });
    if let Err(e) = serve.await {
        error!(error = %e, "http listener failed");
    }
}
