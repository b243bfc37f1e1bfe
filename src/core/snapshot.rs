//! Configuration snapshots and their assembly from cluster state.
//!
//! A [`ConfigurationSnapshot`] is everything the table builder needs, already
//! resolved: service port names are mapped to numbers per ingress and TLS
//! secrets are decoded into certified keys. Assembly never fails as a whole;
//! references to objects that are missing or unusable are skipped and logged so
//! that one broken ingress cannot take the rest of the routing table down.
use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::{
    config::cluster::{ClusterState, Ingress, IngressBackend},
    core::certificate::{Certificate, certified_key_from_secret_data},
};

/// Annotation selecting the scheme used to talk to the backends of an ingress.
pub const BACKEND_PROTOCOL_ANNOTATION: &str = "ingress-gateway/backend-protocol";

/// Errors raised while producing a snapshot.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SnapshotError {
    /// The provider could not enumerate the cluster state.
    #[error("failed to fetch cluster state from {origin}: {reason}")]
    FetchFailed { origin: String, reason: String },

    #[error("unknown service {namespace}/{name}")]
    UnknownService { namespace: String, name: String },

    #[error("unknown secret {namespace}/{name}")]
    UnknownSecret { namespace: String, name: String },

    #[error("invalid tls certificate in secret {namespace}/{name}: {reason}")]
    InvalidCertificate {
        namespace: String,
        name: String,
        reason: String,
    },
}

impl SnapshotError {
    pub fn fetch_failed(origin: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::FetchFailed {
            origin: origin.into(),
            reason: reason.to_string(),
        }
    }
}

/// Port of a backend service, either numeric or by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortRef {
    Number(u16),
    Name(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceBackend {
    pub service: String,
    pub port: PortRef,
}

impl From<&IngressBackend> for ServiceBackend {
    fn from(backend: &IngressBackend) -> Self {
        let port = &backend.service.port;
        let port = match (port.number, &port.name) {
            (Some(number), _) => PortRef::Number(number),
            (None, Some(name)) => PortRef::Name(name.clone()),
            (None, None) => PortRef::Name(String::new()),
        };
        Self {
            service: backend.service.name.clone(),
            port,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathRule {
    /// Regular expression; empty matches every path.
    pub path: String,
    pub backend: ServiceBackend,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostRule {
    /// Empty for rules that apply to every host.
    pub host: String,
    /// `None` when the rule has no HTTP block.
    pub paths: Option<Vec<PathRule>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsBinding {
    pub hosts: Vec<String>,
    pub secret_name: String,
}

/// One ingress worth of rules plus the service ports it references.
#[derive(Debug, Clone, Default)]
pub struct IngressRuleSet {
    /// `namespace/name`, used for diagnostics only.
    pub id: String,
    pub backend_protocol: Option<String>,
    pub default_backend: Option<ServiceBackend>,
    pub rules: Vec<HostRule>,
    pub tls: Vec<TlsBinding>,
    /// service name -> port name -> port number
    pub service_ports: HashMap<String, HashMap<String, u16>>,
}

impl IngressRuleSet {
    /// Effective upstream scheme: the backend protocol annotation lower-cased,
    /// `http` when absent.
    pub fn scheme(&self) -> String {
        match self.backend_protocol.as_deref() {
            Some(protocol) if !protocol.is_empty() => protocol.to_lowercase(),
            _ => "http".to_string(),
        }
    }
}

/// Everything needed to build one routing table.
#[derive(Debug, Clone, Default)]
pub struct ConfigurationSnapshot {
    pub ingresses: Vec<IngressRuleSet>,
    /// TLS secret name -> decoded certificate
    pub certificates: HashMap<String, Certificate>,
}

/// Assemble a snapshot from the full cluster state.
pub fn assemble(state: &ClusterState) -> ConfigurationSnapshot {
    let mut snapshot = ConfigurationSnapshot::default();

    for ingress in &state.ingresses {
        let rule_set = rule_set_for(state, ingress);
        collect_certificates(state, ingress, &mut snapshot.certificates);
        snapshot.ingresses.push(rule_set);
    }

    tracing::debug!(
        ingresses = snapshot.ingresses.len(),
        certificates = snapshot.certificates.len(),
        "Assembled configuration snapshot"
    );
    snapshot
}

fn rule_set_for(state: &ClusterState, ingress: &Ingress) -> IngressRuleSet {
    let namespace = &ingress.metadata.namespace;
    let spec = &ingress.spec;

    let rules = spec
        .rules
        .iter()
        .map(|rule| HostRule {
            host: rule.host.clone(),
            paths: rule.http.as_ref().map(|http| {
                http.paths
                    .iter()
                    .map(|p| PathRule {
                        path: p.path.clone(),
                        backend: ServiceBackend::from(&p.backend),
                    })
                    .collect()
            }),
        })
        .collect::<Vec<_>>();

    let tls = spec
        .tls
        .iter()
        .filter_map(|t| {
            t.secret_name.as_ref().filter(|s| !s.is_empty()).map(|s| TlsBinding {
                hosts: t.hosts.clone(),
                secret_name: s.clone(),
            })
        })
        .collect();

    let default_backend = spec.default_backend.as_ref().map(ServiceBackend::from);

    let mut referenced = Vec::new();
    if let Some(backend) = &default_backend {
        referenced.push(backend.service.clone());
    }
    for rule in &rules {
        for path in rule.paths.iter().flatten() {
            referenced.push(path.backend.service.clone());
        }
    }

    let mut service_ports = HashMap::new();
    let mut seen = HashSet::new();
    for name in referenced {
        if !seen.insert(name.clone()) {
            continue;
        }
        match state.find_service(namespace, &name) {
            Some(service) => {
                let ports = service
                    .spec
                    .ports
                    .iter()
                    .map(|p| (p.name.clone(), p.port))
                    .collect::<HashMap<_, _>>();
                service_ports.insert(name, ports);
            }
            None => {
                let err = SnapshotError::UnknownService {
                    namespace: namespace.clone(),
                    name,
                };
                tracing::warn!(ingress = %ingress.metadata.name, "{err}");
            }
        }
    }

    IngressRuleSet {
        id: format!("{namespace}/{}", ingress.metadata.name),
        backend_protocol: ingress
            .metadata
            .annotations
            .get(BACKEND_PROTOCOL_ANNOTATION)
            .cloned(),
        default_backend,
        rules,
        tls,
        service_ports,
    }
}

// Certificates are keyed by secret name alone, the last decoded secret wins.
fn collect_certificates(
    state: &ClusterState,
    ingress: &Ingress,
    certificates: &mut HashMap<String, Certificate>,
) {
    let namespace = &ingress.metadata.namespace;
    for tls in &ingress.spec.tls {
        let Some(secret_name) = tls.secret_name.as_deref().filter(|s| !s.is_empty()) else {
            continue;
        };

        let Some(secret) = state.find_secret(namespace, secret_name) else {
            let err = SnapshotError::UnknownSecret {
                namespace: namespace.clone(),
                name: secret_name.to_string(),
            };
            tracing::warn!(ingress = %ingress.metadata.name, "{err}");
            continue;
        };

        match certified_key_from_secret_data(|k| secret.data.get(k).map(String::as_str)) {
            Ok(cert) => {
                certificates.insert(secret_name.to_string(), cert);
            }
            Err(e) => {
                let err = SnapshotError::InvalidCertificate {
                    namespace: namespace.clone(),
                    name: secret_name.to_string(),
                    reason: e.to_string(),
                };
                tracing::warn!(ingress = %ingress.metadata.name, "{err}");
            }
        }
    }
}
