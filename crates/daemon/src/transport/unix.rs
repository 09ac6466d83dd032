// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Accept loops for the Unix socket and the duplex TCP socket.
//!
//! Both speak NDJSON through the shared stream driver; the difference is
//! the default push policy: the Unix socket only pushes events for
//! watched tasks, the duplex socket pushes everything.

use super::serve_stream;
use crate::rpc::{ConnState, Router};
use ta_core::Clock;
use tokio::net::{TcpListener, UnixListener};
use tracing::{debug, error};

pub async fn run_unix<C: Clock>(listener: UnixListener, router: Router<C>) {
    let shutdown = router.ctx().engine.shutdown.clone();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    debug!("unix connection accepted");
                    let router = router.clone();
                    tokio::spawn(async move {
                        let (reader, writer) = stream.into_split();
                        serve_stream(reader, writer, router, ConnState::new(false)).await;
                    });
                }
                Err(e) => error!(error = %e, "unix accept failed"),
            }
        }
    }
}

pub async fn run_duplex<C: Clock>(listener: TcpListener, router: Router<C>) {
    let shutdown = router.ctx().engine.shutdown.clone();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(%peer, "duplex connection accepted");
                    let router = router.clone();
                    tokio::spawn(async move {
                        let (reader, writer) = stream.into_split();
                        serve_stream(reader, writer, router, ConnState::new(true)).await;
                    });
                }
                Err(e) => error!(error = %e, "duplex accept failed"),
            }
        }
    }
}
