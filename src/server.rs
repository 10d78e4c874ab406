//! HTTP server and graceful shutdown.
//!
//! The server is the only part of relay that touches sockets. It accepts
//! connections, lets hyper parse them, and hands every request to the
//! [`Dispatcher`]. On shutdown it:
//!
//! 1. Immediately stops `listener.accept()`, so no new connections are made.
//! 2. Lets every in-flight connection task run to completion.
//! 3. Returns from [`Server::serve`].

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::app::App;
use crate::body::{self, Body};
use crate::dispatch::Dispatcher;
use crate::error::Error;
use crate::request::RemoteAddr;

type ReadyCallback = Box<dyn FnOnce(SocketAddr) + Send + 'static>;

/// The HTTP server.
pub struct Server {
    addr: SocketAddr,
    request_timeout: Option<Duration>,
    on_ready: Option<ReadyCallback>,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// # Panics
    ///
    /// Panics if `addr` is not a valid `host:port` string.
    ///
    /// ```rust,no_run
    /// use relay::Server;
    /// let server = Server::bind("0.0.0.0:3000");
    /// ```
    pub fn bind(addr: &str) -> Self {
        let addr: SocketAddr = addr.parse().expect("invalid socket address");
        Self { addr, request_timeout: None, on_ready: None }
    }

    /// Called once with the bound address, as soon as the listener is up.
    /// Binding to port `0` and reading the real port here is how tests find
    /// the server.
    pub fn on_ready(mut self, callback: impl FnOnce(SocketAddr) + Send + 'static) -> Self {
        self.on_ready = Some(Box::new(callback));
        self
    }

    /// Answer `408 {"error":"Request timed out"}` when no reply is sent within
    /// `timeout`. The request's middleware/handler task is not cancelled; it is
    /// left to finish on its own and its late reply is discarded.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Serve `app` until SIGTERM or Ctrl-C, then drain in-flight connections.
    pub async fn serve(self, app: App) -> Result<(), Error> {
        self.serve_with_shutdown(app, shutdown_signal()).await
    }

    /// Serve `app` until `signal` resolves, then drain in-flight connections.
    pub async fn serve_with_shutdown(
        self,
        app: App,
        signal: impl Future<Output = ()> + Send,
    ) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;
        let local_addr = listener.local_addr()?;

        // Registrations end here: the dispatcher is immutable and shared by
        // every connection task.
        let dispatcher = Arc::new(app.into_dispatcher());
        let request_timeout = self.request_timeout;

        info!(addr = %local_addr, "relay listening");
        if let Some(on_ready) = self.on_ready {
            on_ready(local_addr);
        }

        let mut tasks = tokio::task::JoinSet::new();
        tokio::pin!(signal);

        loop {
            tokio::select! {
                // Check shutdown first so a signal stops accepting at once,
                // even with connections queued.
                biased;

                () = &mut signal => {
                    info!(
                        in_flight = tasks.len(),
                        "shutdown signal received, draining connections"
                    );
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let dispatcher = Arc::clone(&dispatcher);
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // Called once per request on the connection.
                        let svc = service_fn(move |mut req: hyper::Request<hyper::body::Incoming>| {
                            let dispatcher = Arc::clone(&dispatcher);
                            req.extensions_mut().insert(RemoteAddr(remote_addr));
                            async move { respond(&dispatcher, req, request_timeout).await }
                        });

                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks so the JoinSet does not grow
                // without bound.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("relay stopped");
        Ok(())
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Dispatch one request, behind the optional timeout.
///
/// An `Err` makes hyper drop the connection, which is all a client sees of a
/// request nobody answered.
async fn respond(
    dispatcher: &Dispatcher,
    req: hyper::Request<hyper::body::Incoming>,
    request_timeout: Option<Duration>,
) -> Result<http::Response<Body>, Error> {
    let Some(limit) = request_timeout else {
        return dispatcher.dispatch(req).await;
    };

    match tokio::time::timeout(limit, dispatcher.dispatch(req)).await {
        Ok(reply) => reply,
        Err(_) => {
            warn!(timeout = ?limit, "request timed out");
            Ok(timed_out())
        }
    }
}

fn timed_out() -> http::Response<Body> {
    let mut reply = http::Response::new(body::full(r#"{"error":"Request timed out"}"#));
    *reply.status_mut() = http::StatusCode::REQUEST_TIMEOUT;
    reply.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("application/json"),
    );
    reply
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first SIGTERM or SIGINT (Ctrl-C). On Windows only Ctrl-C
/// is available.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
