use async_trait::async_trait;
use axum::body::Body as AxumBody;
use eyre::Result;
use hyper::{HeaderMap, Request, Response, Version, header};
use hyper_rustls::HttpsConnector;
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use rustls_native_certs::load_native_certs;
use tracing::Instrument;

use crate::ports::http_client::{HttpClient, HttpClientError, HttpClientResult};

/// Headers that only describe a single connection and must not be forwarded.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Upstream HTTP client using Hyper with Rustls (HTTP/1.1 + HTTP/2).
///
/// The request's `Host` header is left untouched so backends see the host the
/// client asked for; only the URI decides where the connection goes.
pub struct HttpClientAdapter {
    client: Client<HttpsConnector<HttpConnector>, AxumBody>,
}

impl HttpClientAdapter {
    /// Create a new HTTP client adapter.
    pub fn new() -> Result<Self> {
        // Install default crypto provider for rustls if not already set
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

        let mut http_connector = HttpConnector::new();
        http_connector.enforce_http(false); // Allow HTTPS URLs

        let mut root_cert_store = rustls::RootCertStore::empty();
        let native_certs = load_native_certs();

        if !native_certs.certs.is_empty() {
            for cert in native_certs.certs {
                if root_cert_store.add(cert).is_err() {
                    tracing::warn!("Failed to add native certificate to rustls RootCertStore");
                }
            }
            tracing::info!("Loaded {} native root certificates.", root_cert_store.len());
        }

        if !native_certs.errors.is_empty() {
            tracing::warn!(
                "Some native certificates failed to load: {:?}",
                native_certs.errors
            );
        }

        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(root_cert_store)
            .with_no_client_auth();

        let https_connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(tls_config)
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .wrap_connector(http_connector);

        let client = Client::builder(TokioExecutor::new()).build::<_, AxumBody>(https_connector);

        tracing::debug!("Created upstream HTTP client with HTTP/2 and HTTP/1.1 support");
        Ok(Self { client })
    }

    /// Remove hop-by-hop headers, including any named by `Connection`.
    fn strip_hop_by_hop(headers: &mut HeaderMap) {
        let listed = headers
            .get_all(header::CONNECTION)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .map(|name| name.trim().to_ascii_lowercase())
            .filter(|name| !name.is_empty())
            .collect::<Vec<_>>();

        for name in listed {
            headers.remove(name.as_str());
        }
        for name in HOP_BY_HOP_HEADERS {
            headers.remove(*name);
        }
    }
}

#[async_trait]
impl HttpClient for HttpClientAdapter {
    async fn forward(&self, req: Request<AxumBody>) -> HttpClientResult<Response<AxumBody>> {
        let Some(authority) = req.uri().authority().map(ToString::to_string) else {
            tracing::error!("Outgoing URI has no authority: {}", req.uri());
            return Err(HttpClientError::InvalidRequest(
                "Outgoing URI has no authority".to_string(),
            ));
        };
        let backend_identifier = format!(
            "{}://{}",
            req.uri().scheme_str().unwrap_or("http"),
            authority
        );

        let span = tracing::debug_span!(
            "backend_request",
            backend.url = %backend_identifier,
            http.method = %req.method(),
            http.path = %req.uri().path(),
            http.status_code = tracing::field::Empty,
        );

        let (mut parts, body) = req.into_parts();
        // ALPN negotiates the actual version with TLS backends.
        parts.version = Version::HTTP_11;
        Self::strip_hop_by_hop(&mut parts.headers);

        let method = parts.method.clone();
        let uri = parts.uri.clone();

        let result = async {
            tracing::debug!("Forwarding request: {} {}", method, uri);
            self.client.request(Request::from_parts(parts, body)).await
        }
        .instrument(span.clone())
        .await;

        match result {
            Ok(response) => {
                span.record("http.status_code", response.status().as_u16());

                let (mut parts, hyper_body) = response.into_parts();
                // The body is re-framed by the downstream server.
                Self::strip_hop_by_hop(&mut parts.headers);

                Ok(Response::from_parts(parts, AxumBody::new(hyper_body)))
            }
            Err(e) => {
                span.record("http.status_code", 599u16);
                span.in_scope(|| {
                    tracing::warn!(
                        "Error making request to backend {} ({} {}): {}",
                        backend_identifier,
                        method,
                        uri,
                        e
                    )
                });

                Err(HttpClientError::ConnectionError(format!(
                    "Request to {method} {uri} failed: {e}"
                )))
            }
        }
    }
}
