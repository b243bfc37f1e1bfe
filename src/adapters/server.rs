use std::{
    future::{Future, IntoFuture},
    io,
    net::SocketAddr,
    sync::Arc,
    time::Duration,
};

use axum::{
    Router,
    body::Body,
    extract::{ConnectInfo, Request},
    response::Response,
    routing::any,
    serve::{Listener, ListenerExt},
};
use futures_util::StreamExt;
use thiserror::Error;
use tls_listener::TlsListener;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpListener,
};
use tower_http::trace::TraceLayer;

use crate::{
    adapters::{http_handler::HttpHandler, tls},
    core::store::RoutingTableStore,
    utils::graceful_shutdown::{GracefulShutdown, ShutdownReason, ShutdownToken},
};

/// A listener could not start or stopped unexpectedly. Either one takes the
/// whole process down.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ServerError {
    #[error("failed to bind {listener} listener on {addr}: {source}")]
    Bind {
        listener: &'static str,
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("{listener} listener failed: {source}")]
    Serve {
        listener: &'static str,
        #[source]
        source: io::Error,
    },
}

/// Adapts any stream of accepted connections to axum's [`Listener`].
pub struct AxumListener<S> {
    stream: S,
    local_addr: SocketAddr,
}

impl<S, I, E> Listener for AxumListener<S>
where
    S: futures_util::Stream<Item = Result<(I, SocketAddr), E>> + Unpin + Send + 'static,
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    type Io = I;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        loop {
            match self.stream.next().await {
                Some(Ok((io, addr))) => return (io, addr),
                // Failed handshakes land here, including unknown server names.
                Some(Err(e)) => tracing::debug!("Accept error: {}", e),
                None => std::future::pending().await,
            }
        }
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        Ok(self.local_addr)
    }
}

/// The router shared by both listeners: every method and path goes to the
/// handler.
pub fn build_router(handler: Arc<HttpHandler>) -> Router {
    let make_request_route = |handler: Arc<HttpHandler>| {
        any(move |req: Request| {
            let handler = handler.clone();
            async move {
                let client_addr = req
                    .extensions()
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| *addr);
                match handler.handle_request(req, client_addr).await {
                    Ok(response) => response,
                    Err(e) => {
                        tracing::error!("Request handling error: {:?}", e);
                        Response::builder()
                            .status(500)
                            .body(Body::from("Internal Server Error"))
                            .unwrap_or_else(|_| Response::new(Body::from("Internal Server Error")))
                    }
                }
            }
        })
    };

    Router::new()
        .route("/", make_request_route(handler.clone()))
        .route("/{*path}", make_request_route(handler))
        .layer(TraceLayer::new_for_http())
}

/// The plain and TLS listeners, bound and ready to serve.
pub struct IngressServer {
    plain: TcpListener,
    secure: TcpListener,
    app: Router,
    tls_config: Arc<rustls::ServerConfig>,
}

impl IngressServer {
    /// Bind both listeners. Fails if either address is unavailable.
    pub async fn bind(
        plain_addr: SocketAddr,
        tls_addr: SocketAddr,
        handler: Arc<HttpHandler>,
        store: Arc<RoutingTableStore>,
    ) -> Result<Self, ServerError> {
        let plain = TcpListener::bind(plain_addr)
            .await
            .map_err(|source| ServerError::Bind {
                listener: "plain",
                addr: plain_addr,
                source,
            })?;
        let secure = TcpListener::bind(tls_addr)
            .await
            .map_err(|source| ServerError::Bind {
                listener: "tls",
                addr: tls_addr,
                source,
            })?;

        Ok(Self {
            plain,
            secure,
            app: build_router(handler),
            tls_config: tls::server_config(store),
        })
    }

    pub fn plain_addr(&self) -> io::Result<SocketAddr> {
        self.plain.local_addr()
    }

    pub fn tls_addr(&self) -> io::Result<SocketAddr> {
        self.secure.local_addr()
    }

    /// Serve until shutdown. If one listener fails the shared shutdown signal
    /// is raised so the other stops too; in-flight requests get at most the
    /// drain timeout to finish.
    pub async fn serve(self, shutdown: Arc<GracefulShutdown>) -> Result<(), ServerError> {
        let drain = shutdown.drain_timeout();
        let plain_addr = self.plain.local_addr().ok();
        let tls_addr = self.secure.local_addr().ok();
        tracing::info!(plain = ?plain_addr, tls = ?tls_addr, "Ingress gateway listening");

        let plain = {
            let token = shutdown.shutdown_token();
            let server = axum::serve(
                self.plain,
                self.app
                    .clone()
                    .into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(signalled(shutdown.shutdown_token()))
            .into_future();
            fail_fast("plain", run_bounded("plain", server, token, drain), &shutdown)
        };

        let secure = {
            let local_addr = self
                .secure
                .local_addr()
                .map_err(|source| ServerError::Serve {
                    listener: "tls",
                    source,
                })?;
            let acceptor = tokio_rustls::TlsAcceptor::from(self.tls_config);
            let listener = AxumListener {
                stream: TlsListener::new(acceptor, self.secure),
                local_addr,
            }
            .tap_io(|_io| {});
            let token = shutdown.shutdown_token();
            let server = axum::serve(
                listener,
                self.app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(signalled(shutdown.shutdown_token()))
            .into_future();
            fail_fast("tls", run_bounded("tls", server, token, drain), &shutdown)
        };

        let (plain_result, secure_result) = tokio::join!(plain, secure);
        tracing::info!("Listeners stopped");
        plain_result.and(secure_result)
    }
}

async fn signalled(mut token: ShutdownToken) {
    let reason = token.wait_for_shutdown().await;
    tracing::info!("Shutdown signal received: {:?}", reason);
}

async fn fail_fast<F>(
    listener: &'static str,
    run: F,
    shutdown: &GracefulShutdown,
) -> Result<(), ServerError>
where
    F: Future<Output = Result<(), ServerError>>,
{
    let result = run.await;
    if let Err(e) = &result {
        tracing::error!(listener, "{}", e);
        shutdown.trigger_shutdown(ShutdownReason::Fatal);
    }
    result
}

/// Drive a server future; once shutdown starts it gets `drain` to finish.
async fn run_bounded<F>(
    listener: &'static str,
    server: F,
    mut token: ShutdownToken,
    drain: Duration,
) -> Result<(), ServerError>
where
    F: Future<Output = io::Result<()>>,
{
    tokio::pin!(server);
    tokio::select! {
        result = &mut server => {
            return result.map_err(|source| ServerError::Serve { listener, source });
        }
        _ = token.wait_for_shutdown() => {}
    }

    match tokio::time::timeout(drain, server).await {
        Ok(result) => result.map_err(|source| ServerError::Serve { listener, source }),
        Err(_) => {
            tracing::warn!(listener, ?drain, "Drain timeout elapsed, dropping remaining connections");
            Ok(())
        }
    }
}
