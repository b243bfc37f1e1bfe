use std::sync::Arc;

use rustls::{
    ServerConfig,
    server::{ClientHello, ResolvesServerCert},
    sign::CertifiedKey,
};

use crate::core::store::RoutingTableStore;

/// Picks the server certificate for each TLS handshake from the active
/// routing table, by SNI.
#[derive(Debug)]
pub struct SnapshotCertResolver {
    store: Arc<RoutingTableStore>,
}

impl SnapshotCertResolver {
    pub fn new(store: Arc<RoutingTableStore>) -> Self {
        Self { store }
    }
}

impl ResolvesServerCert for SnapshotCertResolver {
    fn resolve(&self, client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        let Some(server_name) = client_hello.server_name() else {
            tracing::debug!("TLS handshake without SNI, no certificate to offer");
            return None;
        };

        match self.store.current().get_certificate(server_name) {
            Ok(cert) => Some(cert),
            Err(e) => {
                tracing::debug!("TLS handshake rejected: {}", e);
                None
            }
        }
    }
}

/// Server-side TLS configuration for the secure listener: certificates come
/// from the store, ALPN offers h2 and HTTP/1.1.
pub fn server_config(store: Arc<RoutingTableStore>) -> Arc<ServerConfig> {
    // Install default crypto provider for rustls if not already set
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let mut config = ServerConfig::builder()
        .with_no_client_auth()
        .with_cert_resolver(Arc::new(SnapshotCertResolver::new(store)));
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    Arc::new(config)
}
