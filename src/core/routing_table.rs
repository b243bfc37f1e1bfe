//! Immutable routing tables.
//!
//! A [`RoutingTable`] answers the two questions the front-end asks on every
//! connection and request: which certificate to present for a TLS server name,
//! and which backend serves a given host and path. Tables are built in one go
//! from a [`ConfigurationSnapshot`] and never mutated afterwards, which is what
//! lets request tasks read them without any locking while a newer table is
//! being prepared.
use std::collections::HashMap;

use http::Uri;
use thiserror::Error;

use crate::core::{
    backend::BackendMatcher,
    certificate::Certificate,
    snapshot::{ConfigurationSnapshot, IngressRuleSet, PathRule, PortRef, ServiceBackend},
};

/// Port used when a named service port cannot be resolved.
pub const FALLBACK_SERVICE_PORT: u16 = 80;

/// Lookup failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RoutingError {
    #[error("certificate not found for {0}")]
    CertificateNotFound(String),

    #[error("backend not found for {host}{path}")]
    BackendNotFound { host: String, path: String },
}

/// Result type for routing lookups
pub type RoutingResult<T> = Result<T, RoutingError>;

#[derive(Debug, Default)]
pub struct RoutingTable {
    /// rule host -> (tls host pattern, certificate), in declaration order
    certificates_by_host: HashMap<String, Vec<(String, Certificate)>>,
    /// rule host -> backends, first match wins
    backends_by_host: HashMap<String, Vec<BackendMatcher>>,
}

impl RoutingTable {
    /// Build a table from a snapshot. An absent snapshot yields an empty table.
    ///
    /// Building never fails as a whole: rules that cannot be compiled are
    /// logged and skipped.
    pub fn build(snapshot: Option<&ConfigurationSnapshot>) -> Self {
        let mut table = Self::default();
        let Some(snapshot) = snapshot else {
            return table;
        };

        for rule_set in &snapshot.ingresses {
            for rule in &rule_set.rules {
                let certs = table
                    .certificates_by_host
                    .entry(rule.host.clone())
                    .or_default();
                for binding in &rule_set.tls {
                    let Some(cert) = snapshot.certificates.get(&binding.secret_name) else {
                        continue;
                    };
                    for tls_host in &binding.hosts {
                        match certs.iter_mut().find(|(pattern, _)| pattern == tls_host) {
                            Some(entry) => entry.1 = cert.clone(),
                            None => certs.push((tls_host.clone(), cert.clone())),
                        }
                    }
                }

                table.add_backends(rule_set, &rule.host, rule.paths.as_deref());
            }
        }

        tracing::debug!(
            hosts = table.host_count(),
            backends = table.backend_count(),
            certificate_hosts = table.certificate_host_count(),
            "Built routing table"
        );
        table
    }

    fn add_backends(
        &mut self,
        rule_set: &IngressRuleSet,
        host: &str,
        paths: Option<&[PathRule]>,
    ) {
        let scheme = rule_set.scheme();

        let Some(paths) = paths else {
            let Some(default_backend) = &rule_set.default_backend else {
                return;
            };
            let port = resolve_port(rule_set, default_backend);
            match BackendMatcher::new(&scheme, "", &default_backend.service, port) {
                Ok(backend) => self
                    .backends_by_host
                    .entry(host.to_string())
                    .or_default()
                    .push(backend),
                Err(e) => tracing::error!(
                    ingress = %rule_set.id,
                    host,
                    error = %e,
                    "Invalid default backend"
                ),
            }
            return;
        };

        for path in paths {
            let port = resolve_port(rule_set, &path.backend);
            match BackendMatcher::new(&scheme, &path.path, &path.backend.service, port) {
                Ok(backend) => self
                    .backends_by_host
                    .entry(host.to_string())
                    .or_default()
                    .push(backend),
                Err(e) => tracing::warn!(
                    ingress = %rule_set.id,
                    host,
                    path = %path.path,
                    error = %e,
                    "Skipping invalid ingress rule path"
                ),
            }
        }
    }

    /// Certificate for a TLS server name.
    pub fn get_certificate(&self, server_name: &str) -> RoutingResult<Certificate> {
        self.certificates_by_host
            .get(server_name)
            .and_then(|certs| {
                certs
                    .iter()
                    .find(|(pattern, _)| host_matches(server_name, pattern))
                    .map(|(_, cert)| cert.clone())
            })
            .ok_or_else(|| RoutingError::CertificateNotFound(server_name.to_string()))
    }

    /// Backend for a `Host` header value (with or without port) and a request path.
    pub fn get_backend(&self, host: &str, path: &str) -> RoutingResult<&Uri> {
        let host = match host.find(':') {
            Some(idx) if idx > 0 => &host[..idx],
            _ => host,
        };

        self.backends_by_host
            .get(host)
            .and_then(|backends| backends.iter().find(|b| b.matches(path)))
            .map(BackendMatcher::target)
            .ok_or_else(|| RoutingError::BackendNotFound {
                host: host.to_string(),
                path: path.to_string(),
            })
    }

    /// Number of hosts with at least one backend.
    pub fn host_count(&self) -> usize {
        self.backends_by_host.len()
    }

    pub fn backend_count(&self) -> usize {
        self.backends_by_host.values().map(Vec::len).sum()
    }

    /// Number of hosts with at least one certificate.
    pub fn certificate_host_count(&self) -> usize {
        self.certificates_by_host
            .values()
            .filter(|certs| !certs.is_empty())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.backends_by_host.is_empty() && self.certificate_host_count() == 0
    }

    /// Hosts and their backends, sorted by host for stable output.
    pub fn hosts(&self) -> Vec<(&str, &[BackendMatcher])> {
        let mut hosts = self
            .backends_by_host
            .iter()
            .map(|(host, backends)| (host.as_str(), backends.as_slice()))
            .collect::<Vec<_>>();
        hosts.sort_by_key(|(host, _)| *host);
        hosts
    }
}

/// Resolve a backend's port: numbers are used as is, names go through the
/// rule set's service port mapping and fall back to port 80.
fn resolve_port(rule_set: &IngressRuleSet, backend: &ServiceBackend) -> u16 {
    match &backend.port {
        PortRef::Number(port) => *port,
        PortRef::Name(name) => rule_set
            .service_ports
            .get(&backend.service)
            .and_then(|ports| ports.get(name))
            .copied()
            .unwrap_or(FALLBACK_SERVICE_PORT),
    }
}

/// Match a server name against a TLS host pattern. Each leading `*.` of the
/// pattern consumes exactly one leading label of the server name.
fn host_matches(server_name: &str, pattern: &str) -> bool {
    let mut name = server_name;
    let mut pattern = pattern;
    while let Some(rest) = pattern.strip_prefix("*.") {
        match name.split_once('.') {
            Some((_, remainder)) => name = remainder,
            None => return false,
        }
        pattern = rest;
    }
    name == pattern
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, sync::Arc};

    use super::*;
    use crate::core::{
        certificate::test_support::self_signed,
        snapshot::{HostRule, TlsBinding},
    };

    fn backend(service: &str, port: PortRef) -> ServiceBackend {
        ServiceBackend {
            service: service.to_string(),
            port,
        }
    }

    fn path_rule(path: &str, service: &str, port: u16) -> PathRule {
        PathRule {
            path: path.to_string(),
            backend: backend(service, PortRef::Number(port)),
        }
    }

    fn snapshot(rule_sets: Vec<IngressRuleSet>) -> ConfigurationSnapshot {
        ConfigurationSnapshot {
            ingresses: rule_sets,
            certificates: HashMap::new(),
        }
    }

    #[test]
    fn test_empty_table_finds_nothing() {
        for table in [
            RoutingTable::build(None),
            RoutingTable::build(Some(&ConfigurationSnapshot::default())),
        ] {
            assert!(table.is_empty());
            assert!(matches!(
                table.get_backend("www.example.com", "/"),
                Err(RoutingError::BackendNotFound { .. })
            ));
            assert!(table.get_backend("", "").is_err());
            assert_eq!(
                table.get_certificate("www.example.com").unwrap_err(),
                RoutingError::CertificateNotFound("www.example.com".to_string())
            );
        }
    }

    #[test]
    fn test_default_backend_without_http_block() {
        let rule_set = IngressRuleSet {
            id: "default/web".to_string(),
            default_backend: Some(backend("web", PortRef::Number(8080))),
            rules: vec![HostRule {
                host: "www.example.com".to_string(),
                paths: None,
            }],
            ..Default::default()
        };
        let table = RoutingTable::build(Some(&snapshot(vec![rule_set])));

        for path in ["/", "/a/b/c", ""] {
            assert_eq!(
                table.get_backend("www.example.com", path).unwrap().to_string(),
                "http://web:8080/"
            );
        }
        assert!(table.get_backend("api.example.com", "/").is_err());
    }

    #[test]
    fn test_rule_without_http_block_or_default_backend_adds_nothing() {
        let rule_set = IngressRuleSet {
            rules: vec![HostRule {
                host: "www.example.com".to_string(),
                paths: None,
            }],
            ..Default::default()
        };
        let table = RoutingTable::build(Some(&snapshot(vec![rule_set])));
        assert_eq!(table.backend_count(), 0);
        assert!(table.get_backend("www.example.com", "/").is_err());
    }

    #[test]
    fn test_hostless_default_backend_uses_empty_host_key() {
        let rule_set = IngressRuleSet {
            default_backend: Some(backend("fallback", PortRef::Number(80))),
            rules: vec![HostRule {
                host: String::new(),
                paths: None,
            }],
            ..Default::default()
        };
        let table = RoutingTable::build(Some(&snapshot(vec![rule_set])));
        assert_eq!(
            table.get_backend("", "/").unwrap().to_string(),
            "http://fallback:80/"
        );
        assert!(table.get_backend("www.example.com", "/").is_err());
    }

    #[test]
    fn test_named_port_resolution() {
        let mut service_ports = HashMap::new();
        service_ports.insert(
            "api".to_string(),
            HashMap::from([("http".to_string(), 8080)]),
        );
        service_ports.insert(
            "other".to_string(),
            HashMap::from([("grpc".to_string(), 9000)]),
        );

        let rule_set = IngressRuleSet {
            rules: vec![HostRule {
                host: "www.example.com".to_string(),
                paths: Some(vec![
                    PathRule {
                        path: "^/api".to_string(),
                        backend: backend("api", PortRef::Name("http".to_string())),
                    },
                    PathRule {
                        path: "^/missing-service".to_string(),
                        backend: backend("missing", PortRef::Name("http".to_string())),
                    },
                    PathRule {
                        path: "^/grpc".to_string(),
                        backend: backend("api", PortRef::Name("grpc".to_string())),
                    },
                ]),
            }],
            service_ports,
            ..Default::default()
        };
        let table = RoutingTable::build(Some(&snapshot(vec![rule_set])));

        assert_eq!(
            table.get_backend("www.example.com", "/api/x").unwrap().to_string(),
            "http://api:8080/"
        );
        assert_eq!(
            table
                .get_backend("www.example.com", "/missing-service")
                .unwrap()
                .to_string(),
            "http://missing:80/"
        );
        // `grpc` exists for another service only.
        assert_eq!(
            table.get_backend("www.example.com", "/grpc").unwrap().to_string(),
            "http://api:80/"
        );
    }

    #[test]
    fn test_host_port_is_stripped() {
        let rule_set = IngressRuleSet {
            rules: vec![HostRule {
                host: "www.example.com".to_string(),
                paths: Some(vec![path_rule("/api", "api", 8080)]),
            }],
            ..Default::default()
        };
        let table = RoutingTable::build(Some(&snapshot(vec![rule_set])));

        for path in ["/api", "/nope"] {
            assert_eq!(
                table.get_backend("www.example.com:8443", path).map(ToString::to_string),
                table.get_backend("www.example.com", path).map(ToString::to_string),
            );
        }
        assert!(table.get_backend("www.example.com:1", "/api").is_ok());
    }

    #[test]
    fn test_first_match_wins() {
        let rule_set = IngressRuleSet {
            rules: vec![HostRule {
                host: "www.example.com".to_string(),
                paths: Some(vec![
                    path_rule("", "catch-all", 80),
                    path_rule("/api", "api", 8080),
                ]),
            }],
            ..Default::default()
        };
        let table = RoutingTable::build(Some(&snapshot(vec![rule_set])));
        assert_eq!(
            table.get_backend("www.example.com", "/api/users").unwrap().to_string(),
            "http://catch-all:80/"
        );
    }

    #[test]
    fn test_declaration_order_across_rule_sets() {
        let first = IngressRuleSet {
            rules: vec![HostRule {
                host: "www.example.com".to_string(),
                paths: Some(vec![path_rule("/api", "first", 80)]),
            }],
            ..Default::default()
        };
        let second = IngressRuleSet {
            rules: vec![HostRule {
                host: "www.example.com".to_string(),
                paths: Some(vec![
                    path_rule("/api", "second", 80),
                    path_rule("/web", "web", 80),
                ]),
            }],
            ..Default::default()
        };
        let table = RoutingTable::build(Some(&snapshot(vec![first, second])));

        assert_eq!(table.backend_count(), 3);
        assert_eq!(
            table.get_backend("www.example.com", "/api").unwrap().to_string(),
            "http://first:80/"
        );
        assert_eq!(
            table.get_backend("www.example.com", "/web").unwrap().to_string(),
            "http://web:80/"
        );
    }

    #[test]
    fn test_invalid_path_is_skipped() {
        let rule_set = IngressRuleSet {
            rules: vec![HostRule {
                host: "www.example.com".to_string(),
                paths: Some(vec![
                    path_rule("/api/(", "broken", 80),
                    path_rule("/api", "api", 8080),
                ]),
            }],
            ..Default::default()
        };
        let table = RoutingTable::build(Some(&snapshot(vec![rule_set])));

        assert_eq!(table.backend_count(), 1);
        assert_eq!(
            table.get_backend("www.example.com", "/api/(").unwrap().to_string(),
            "http://api:8080/"
        );
    }

    #[test]
    fn test_backend_protocol_annotation() {
        let rule_set = IngressRuleSet {
            backend_protocol: Some("HTTPS".to_string()),
            rules: vec![HostRule {
                host: "secure.example.com".to_string(),
                paths: Some(vec![path_rule("", "secure", 443)]),
            }],
            ..Default::default()
        };
        let table = RoutingTable::build(Some(&snapshot(vec![rule_set])));
        assert_eq!(
            table.get_backend("secure.example.com", "/").unwrap().to_string(),
            "https://secure:443/"
        );
    }

    #[test]
    fn test_wildcard_matching() {
        assert!(host_matches("www.example.com", "*.example.com"));
        assert!(!host_matches("example.com", "*.example.com"));
        assert!(!host_matches("evil.com", "*.example.com"));
        assert!(!host_matches("a.b.example.com", "*.example.com"));
        assert!(host_matches("a.b.example.com", "*.*.example.com"));
        assert!(!host_matches("com", "*.*.com"));

        assert!(host_matches("www.example.com", "www.example.com"));
        assert!(!host_matches("api.example.com", "www.example.com"));
        assert!(!host_matches("www.example.com.", "www.example.com"));
    }

    fn tls_table(tls_hosts: &[&str], rule_host: &str) -> (RoutingTable, Certificate) {
        let cert = self_signed(&["www.example.com"]);
        let rule_set = IngressRuleSet {
            rules: vec![HostRule {
                host: rule_host.to_string(),
                paths: Some(vec![path_rule("", "web", 80)]),
            }],
            tls: vec![TlsBinding {
                hosts: tls_hosts.iter().map(|h| h.to_string()).collect(),
                secret_name: "web-tls".to_string(),
            }],
            ..Default::default()
        };
        let snapshot = ConfigurationSnapshot {
            ingresses: vec![rule_set],
            certificates: HashMap::from([("web-tls".to_string(), cert.clone())]),
        };
        (RoutingTable::build(Some(&snapshot)), cert)
    }

    #[test]
    fn test_certificate_lookup_exact() {
        let (table, cert) = tls_table(&["www.example.com"], "www.example.com");
        assert_eq!(table.certificate_host_count(), 1);
        let found = table.get_certificate("www.example.com").unwrap();
        assert!(Arc::ptr_eq(&found, &cert));
        assert!(table.get_certificate("example.com").is_err());
        assert!(table.get_certificate("api.example.com").is_err());
    }

    #[test]
    fn test_certificate_lookup_wildcard() {
        let (table, cert) = tls_table(&["*.example.com"], "www.example.com");
        let found = table.get_certificate("www.example.com").unwrap();
        assert!(Arc::ptr_eq(&found, &cert));
        // Only the rule's own host is indexed.
        assert!(table.get_certificate("api.example.com").is_err());
    }

    #[test]
    fn test_certificate_pattern_must_match_rule_host() {
        let (table, _) = tls_table(&["api.example.com"], "www.example.com");
        assert!(table.get_certificate("www.example.com").is_err());
    }

    #[test]
    fn test_missing_secret_contributes_no_certificate() {
        let rule_set = IngressRuleSet {
            rules: vec![HostRule {
                host: "www.example.com".to_string(),
                paths: None,
            }],
            tls: vec![TlsBinding {
                hosts: vec!["www.example.com".to_string()],
                secret_name: "absent".to_string(),
            }],
            ..Default::default()
        };
        let table = RoutingTable::build(Some(&snapshot(vec![rule_set])));
        assert!(table.get_certificate("www.example.com").is_err());
        assert!(table.is_empty());
    }

    #[test]
    fn test_hosts_are_sorted() {
        let rule_set = IngressRuleSet {
            rules: vec![
                HostRule {
                    host: "b.example.com".to_string(),
                    paths: Some(vec![path_rule("", "b", 80)]),
                },
                HostRule {
                    host: "a.example.com".to_string(),
                    paths: Some(vec![path_rule("", "a", 80)]),
                },
            ],
            ..Default::default()
        };
        let table = RoutingTable::build(Some(&snapshot(vec![rule_set])));
        let hosts = table.hosts();
        assert_eq!(hosts[0].0, "a.example.com");
        assert_eq!(hosts[1].0, "b.example.com");
        assert_eq!(hosts[1].1.len(), 1);
    }
}
