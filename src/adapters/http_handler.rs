use std::{net::SocketAddr, sync::Arc};

use axum::{
    body::Body as AxumBody,
    http::{HeaderMap, HeaderValue, StatusCode, Uri, header, uri::PathAndQuery},
};
use eyre::{Result, WrapErr};
use hyper::{Request, Response};

use crate::{
    core::store::RoutingTableStore,
    metrics::{self, RequestTimer},
    ports::http_client::HttpClient,
};

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Routes each request by host and path through the active routing table and
/// proxies it to the selected backend.
pub struct HttpHandler {
    store: Arc<RoutingTableStore>,
    http_client: Arc<dyn HttpClient>,
}

impl HttpHandler {
    pub fn new(store: Arc<RoutingTableStore>, http_client: Arc<dyn HttpClient>) -> Self {
        Self { store, http_client }
    }

    /// Entry point for every request on both listeners.
    pub async fn handle_request(
        &self,
        req: Request<AxumBody>,
        client_addr: Option<SocketAddr>,
    ) -> Result<Response<AxumBody>, eyre::Error> {
        let method = req.method().clone();
        let _timer = RequestTimer::new(method.as_str());

        let result = self.proxy_request(req, client_addr).await;
        if let Ok(response) = &result {
            metrics::increment_request_total(method.as_str(), response.status().as_u16());
        }
        result
    }

    async fn proxy_request(
        &self,
        mut req: Request<AxumBody>,
        client_addr: Option<SocketAddr>,
    ) -> Result<Response<AxumBody>, eyre::Error> {
        let host = Self::request_host(&req).unwrap_or_default();
        let path = req.uri().path().to_string();

        let target = match self.store.current().get_backend(&host, &path) {
            Ok(target) => target.clone(),
            Err(e) => {
                tracing::debug!(host = %host, path = %path, "{}", e);
                metrics::increment_backend_not_found();
                return Response::builder()
                    .status(StatusCode::NOT_FOUND)
                    .body(AxumBody::from("upstream server not found"))
                    .wrap_err("Failed to build 404 response");
            }
        };

        let backend_uri = Self::backend_uri(&target, req.uri())?;
        tracing::debug!(host = %host, path = %path, backend = %target, "Dispatching request");
        Self::pin_host_header(&mut req)?;
        *req.uri_mut() = backend_uri;

        if let Some(addr) = client_addr {
            Self::append_forwarded_for(req.headers_mut(), addr)?;
        }

        match self.http_client.forward(req).await {
            Ok(response) => Ok(response),
            Err(e) => {
                tracing::error!(backend = %target, "Backend request failed: {}", e);
                Response::builder()
                    .status(StatusCode::BAD_GATEWAY)
                    .body(AxumBody::from("Backend request failed"))
                    .wrap_err("Failed to build bad gateway response")
            }
        }
    }

    /// The host the client asked for: the `Host` header, or the URI authority
    /// for HTTP/2 requests that carry none.
    fn request_host(req: &Request<AxumBody>) -> Option<String> {
        req.headers()
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .or_else(|| req.uri().authority().map(ToString::to_string))
    }

    /// HTTP/2 requests carry the host only in the URI authority. Copy it into
    /// `Host` before the URI is rewritten, otherwise the upstream client
    /// fills in the backend address.
    fn pin_host_header(req: &mut Request<AxumBody>) -> Result<()> {
        if req.headers().contains_key(header::HOST) {
            return Ok(());
        }
        let Some(authority) = req.uri().authority().map(|a| a.as_str().to_string()) else {
            return Ok(());
        };
        let value = HeaderValue::from_str(&authority)
            .map_err(|e| eyre::eyre!("Invalid request authority {}: {}", authority, e))?;
        req.headers_mut().insert(header::HOST, value);
        Ok(())
    }

    /// Backend scheme and authority combined with the original path and query.
    fn backend_uri(target: &Uri, original: &Uri) -> Result<Uri> {
        let mut parts = target.clone().into_parts();
        parts.path_and_query = Some(
            original
                .path_and_query()
                .cloned()
                .unwrap_or_else(|| PathAndQuery::from_static("/")),
        );
        Uri::from_parts(parts).wrap_err("Failed to build backend URI")
    }

    fn append_forwarded_for(headers: &mut HeaderMap, client_addr: SocketAddr) -> Result<()> {
        let client_ip = client_addr.ip().to_string();
        let value = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
            Some(prior) if !prior.is_empty() => format!("{prior}, {client_ip}"),
            _ => client_ip,
        };
        headers.insert(
            X_FORWARDED_FOR,
            HeaderValue::from_str(&value)
                .map_err(|e| eyre::eyre!("Failed to build X-Forwarded-For: {}", e))?,
        );
        Ok(())
    }
}

impl Clone for HttpHandler {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            http_client: self.http_client.clone(),
        }
    }
}
