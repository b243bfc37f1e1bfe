// Integration tests: cluster manifest -> snapshot -> routing table lookups
use base64::{Engine, engine::general_purpose::STANDARD};
use ingress_gateway::{
    RoutingTable,
    config::cluster::ClusterState,
    core::{routing_table::RoutingError, snapshot::assemble},
};

fn tls_secret_data(names: &[&str]) -> (String, String) {
    let names = names.iter().map(|n| n.to_string()).collect::<Vec<_>>();
    let generated = rcgen::generate_simple_self_signed(names).unwrap();
    (
        STANDARD.encode(generated.cert.pem()),
        STANDARD.encode(generated.signing_key.serialize_pem()),
    )
}

fn manifest() -> String {
    let (shop_crt, shop_key) = tls_secret_data(&["shop.example.com"]);
    let (wild_crt, wild_key) = tls_secret_data(&["*.apps.example.com"]);
    format!(
        r#"
ingresses:
  - metadata:
      name: shop
      namespace: prod
    spec:
      tls:
        - hosts: ["shop.example.com"]
          secretName: shop-tls
      rules:
        - host: shop.example.com
          http:
            paths:
              - path: ^/api/v2
                backend:
                  service:
                    name: api-v2
                    port:
                      name: http
              - path: /api
                backend:
                  service:
                    name: api
                    port:
                      name: grpc
              - path: ""
                backend:
                  service:
                    name: storefront
                    port:
                      number: 3000
  - metadata:
      name: apps
      namespace: prod
      annotations:
        ingress-gateway/backend-protocol: HTTPS
    spec:
      defaultBackend:
        service:
          name: apps
          port:
            name: https
      tls:
        - hosts: ["*.apps.example.com"]
          secretName: apps-tls
      rules:
        - host: billing.apps.example.com
        - host: docs.example.com
          http:
            paths:
              - path: /api
                backend:
                  service:
                    name: docs-api
                    port:
                      number: 9000
services:
  - metadata:
      name: api-v2
      namespace: prod
    spec:
      ports:
        - name: http
          port: 8080
  - metadata:
      name: api
      namespace: prod
    spec:
      ports:
        - name: http
          port: 8081
  - metadata:
      name: apps
      namespace: prod
    spec:
      ports:
        - name: https
          port: 8443
secrets:
  - metadata:
      name: shop-tls
      namespace: prod
    type: kubernetes.io/tls
    data:
      tls.crt: {shop_crt}
      tls.key: {shop_key}
  - metadata:
      name: apps-tls
      namespace: prod
    type: kubernetes.io/tls
    data:
      tls.crt: {wild_crt}
      tls.key: {wild_key}
"#
    )
}

fn table() -> RoutingTable {
    let state = ClusterState::from_yaml(&manifest()).unwrap();
    let snapshot = assemble(&state);
    assert_eq!(snapshot.ingresses.len(), 2);
    assert_eq!(snapshot.certificates.len(), 2);
    RoutingTable::build(Some(&snapshot))
}

fn backend(table: &RoutingTable, host: &str, path: &str) -> String {
    table.get_backend(host, path).unwrap().to_string()
}

#[test]
fn test_first_matching_path_wins() {
    let table = table();
    assert_eq!(
        backend(&table, "shop.example.com", "/api/v2/orders"),
        "http://api-v2:8080/"
    );
    assert_eq!(
        backend(&table, "shop.example.com", "/api/v1/orders"),
        "http://api:80/"
    );
    assert_eq!(
        backend(&table, "shop.example.com", "/checkout"),
        "http://storefront:3000/"
    );
}

#[test]
fn test_host_header_port_is_ignored() {
    let table = table();
    assert_eq!(
        backend(&table, "shop.example.com:8443", "/checkout"),
        "http://storefront:3000/"
    );
}

#[test]
fn test_default_backend_for_rule_without_paths() {
    let table = table();
    assert_eq!(
        backend(&table, "billing.apps.example.com", "/anything"),
        "https://apps:8443/"
    );
}

#[test]
fn test_same_path_on_different_hosts() {
    let table = table();
    assert_eq!(
        backend(&table, "docs.example.com", "/api/search"),
        "https://docs-api:9000/"
    );
    assert_eq!(
        backend(&table, "shop.example.com", "/api/search"),
        "http://api:80/"
    );
    // Rules with paths do not fall back to the default backend.
    assert!(matches!(
        table.get_backend("docs.example.com", "/guide"),
        Err(RoutingError::BackendNotFound { .. })
    ));
}

#[test]
fn test_unknown_host_has_no_backend() {
    let table = table();
    assert!(table.get_backend("unknown.example.com", "/").is_err());
}

#[test]
fn test_certificates_by_server_name() {
    let table = table();
    assert!(table.get_certificate("shop.example.com").is_ok());
    assert!(table.get_certificate("billing.apps.example.com").is_ok());
    // The wildcard binding belongs to the apps ingress; docs.example.com is not covered by it.
    assert!(matches!(
        table.get_certificate("docs.example.com"),
        Err(RoutingError::CertificateNotFound(_))
    ));
    assert!(table.get_certificate("unknown.example.com").is_err());
}

#[test]
fn test_summary_helpers() {
    let table = table();
    assert_eq!(table.host_count(), 3);
    assert_eq!(table.backend_count(), 5);
    let hosts = table.hosts().into_iter().map(|(h, _)| h).collect::<Vec<_>>();
    assert_eq!(
        hosts,
        vec![
            "billing.apps.example.com",
            "docs.example.com",
            "shop.example.com"
        ]
    );
}
