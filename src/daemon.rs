// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::FutureExt;
use futures::{pin_mut, select};
use tokio::fs;
use tokio::net::{UnixListener, UnixStream};
use tokio::signal::unix::{signal, SignalKind as UnixSignal};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::msg::{Frame, Request, Response};
use crate::registry::Registry;
use crate::Error;

/// Owns the registry and serves requests for it on a unix socket
///
/// Rules:
///   - one registry per daemon, shared by every connection
///   - every tracked server is terminated before `run` returns, whatever made it return
///   - no connection outlives `run`, so nothing can start a server after the final stop
pub struct Daemon {
    registry: Arc<Registry>,
    listener: UnixListener,
    socket: PathBuf,
}

impl Daemon {
    /// Binds the control socket, replacing a stale socket file left by a dead daemon
    pub async fn bind(socket: &Path) -> Result<Self, Error> {
        if fs::symlink_metadata(socket).await.is_ok() {
            if UnixStream::connect(socket).await.is_ok() {
                return Err(format!("a daemon is already listening on {}", socket.display()).into());
            }

            debug!("removing stale socket: {}", socket.display());
            fs::remove_file(socket).await?;
        }

        let listener = UnixListener::bind(socket)?;
        info!("listening on {}", socket.display());

        Ok(Self {
            registry: Arc::new(Registry::new()),
            listener,
            socket: socket.to_path_buf(),
        })
    }

    /// Serves until a shutdown request, SIGINT or SIGTERM; returns the final stop summary
    pub async fn run(self) -> Result<String, Error> {
        let mut connections = JoinSet::new();
        let served = self.serve(&mut connections).await;

        // abort and wait, open connections must not reach the registry past this point
        connections.shutdown().await;
        debug!("all control connections closed");

        let stopped = self.registry.shutdown().await;
        match &stopped {
            Ok(summary) => info!("daemon exiting, stopped:\n{}", summary),
            Err(e) => error!("failed to stop all domains: {}", e),
        }

        if let Err(e) = fs::remove_file(&self.socket).await {
            warn!("failed to remove socket {}: {}", self.socket.display(), e);
        }

        served?;
        stopped
    }

    async fn serve(&self, connections: &mut JoinSet<()>) -> Result<(), Error> {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let mut interrupt = signal(UnixSignal::interrupt())?;
        let mut terminate = signal(UnixSignal::terminate())?;

        loop {
            let accept = self.listener.accept().fuse();
            let shutdown = shutdown_rx.recv().fuse();
            let interrupted = interrupt.recv().fuse();
            let terminated = terminate.recv().fuse();
            pin_mut!(accept, shutdown, interrupted, terminated);

            select! {
                accepted = accept => {
                    let (stream, _) = accepted?;
                    debug!("accepted control connection");

                    // reap connections that already finished
                    while connections.try_join_next().is_some() {}

                    let registry = Arc::clone(&self.registry);
                    let shutdown_tx = shutdown_tx.clone();
                    connections.spawn(async move {
                        if let Err(e) = serve_connection(registry, stream, shutdown_tx).await {
                            warn!("control connection failed: {}", e);
                        }
                    });
                }
                _ = shutdown => {
                    info!("shutdown requested");
                    return Ok(());
                }
                _ = interrupted => {
                    info!("received SIGINT");
                    return Ok(());
                }
                _ = terminated => {
                    info!("received SIGTERM");
                    return Ok(());
                }
            }
        }
    }
}

async fn serve_connection(
    registry: Arc<Registry>,
    mut stream: UnixStream,
    shutdown: mpsc::Sender<()>,
) -> Result<(), Error> {
    while let Some(request) = Request::recv(&mut stream).await? {
        debug!("request: {:?}", request);
        let exit = request == Request::Shutdown;

        let response = handle(&registry, request).await;
        response.send(&mut stream).await?;

        if exit {
            // the daemon may already be exiting for another reason
            shutdown.send(()).await.ok();
            break;
        }
    }

    Ok(())
}

/// Applies one request to the registry; registry errors become `Response::Error`
pub async fn handle(registry: &Registry, request: Request) -> Response {
    let result = match request {
        Request::Start { domain, invocation } => registry
            .start_nonblocking(domain, &invocation)
            .await
            .map(|status| Response::Message(status.to_string())),
        Request::Run {
            domain,
            invocation,
            check_server,
        } => registry
            .run_blocking(domain, &invocation, check_server)
            .await
            .map(|output| Response::Message(output.to_string())),
        Request::Stop { domain, signal } => registry
            .stop(domain, signal)
            .await
            .map(|status| Response::Message(status.to_string())),
        Request::List => Ok(Response::Processes(registry.list().await)),
        Request::StopAll { signal } => registry.stop_all(signal).await.map(Response::Message),
        Request::Shutdown => registry.shutdown().await.map(Response::Message),
    };

    result.unwrap_or_else(|e| {
        warn!("request failed: {}", e);
        Response::Error(e.to_string())
    })
}
