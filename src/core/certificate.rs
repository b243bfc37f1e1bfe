//! Decoding of TLS secrets into rustls certified keys.
use std::{io::BufReader, sync::Arc};

use base64::{Engine, engine::general_purpose::STANDARD};
use rustls::sign::CertifiedKey;
use thiserror::Error;

/// A decoded certificate chain together with its signing key.
pub type Certificate = Arc<CertifiedKey>;

/// Data keys of a `kubernetes.io/tls` secret.
pub const TLS_CERT_KEY: &str = "tls.crt";
pub const TLS_PRIVATE_KEY_KEY: &str = "tls.key";

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CertificateError {
    #[error("secret has no '{0}' entry")]
    MissingEntry(&'static str),

    #[error("'{key}' is not valid base64: {source}")]
    Base64 {
        key: &'static str,
        #[source]
        source: base64::DecodeError,
    },

    #[error("malformed PEM data: {0}")]
    Pem(#[from] std::io::Error),

    #[error("no certificate found in PEM data")]
    NoCertificate,

    #[error("no private key found in PEM data")]
    NoPrivateKey,

    #[error("unsupported private key: {0}")]
    UnsupportedKey(#[from] rustls::Error),
}

/// Build a certified key from a PEM certificate chain and a PEM private key
/// (PKCS#8, PKCS#1 or SEC1).
pub fn certified_key_from_pem(
    cert_pem: &[u8],
    key_pem: &[u8],
) -> Result<Certificate, CertificateError> {
    let chain = rustls_pemfile::certs(&mut BufReader::new(cert_pem))
        .collect::<Result<Vec<_>, _>>()?;
    if chain.is_empty() {
        return Err(CertificateError::NoCertificate);
    }

    let key = rustls_pemfile::private_key(&mut BufReader::new(key_pem))?
        .ok_or(CertificateError::NoPrivateKey)?;
    let signing_key = rustls::crypto::aws_lc_rs::sign::any_supported_type(&key)?;

    Ok(Arc::new(CertifiedKey::new(chain, signing_key)))
}

/// Decode the base64 `tls.crt` / `tls.key` entries of a secret's data map.
pub fn certified_key_from_secret_data<'a>(
    lookup: impl Fn(&str) -> Option<&'a str>,
) -> Result<Certificate, CertificateError> {
    let decode = |key: &'static str| -> Result<Vec<u8>, CertificateError> {
        let encoded = lookup(key).ok_or(CertificateError::MissingEntry(key))?;
        STANDARD
            .decode(encoded.trim())
            .map_err(|source| CertificateError::Base64 { key, source })
    };

    let cert_pem = decode(TLS_CERT_KEY)?;
    let key_pem = decode(TLS_PRIVATE_KEY_KEY)?;
    certified_key_from_pem(&cert_pem, &key_pem)
}


#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::{test_support::self_signed_pem, *};

    #[test]
    fn test_decode_pem_pair() {
        let (cert, key) = self_signed_pem(&["www.example.com"]);
        let certified = certified_key_from_pem(cert.as_bytes(), key.as_bytes()).unwrap();
        assert_eq!(certified.cert.len(), 1);
    }

    #[test]
    fn test_missing_key_is_rejected() {
        let (cert, _) = self_signed_pem(&["www.example.com"]);
        let err = certified_key_from_pem(cert.as_bytes(), b"").unwrap_err();
        assert!(matches!(err, CertificateError::NoPrivateKey));
    }

    #[test]
    fn test_missing_certificate_is_rejected() {
        let (_, key) = self_signed_pem(&["www.example.com"]);
        let err = certified_key_from_pem(b"", key.as_bytes()).unwrap_err();
        assert!(matches!(err, CertificateError::NoCertificate));
    }

    #[test]
    fn test_decode_secret_data() {
        let (cert, key) = self_signed_pem(&["www.example.com"]);
        let data = HashMap::from([
            (TLS_CERT_KEY.to_string(), STANDARD.encode(cert)),
            (TLS_PRIVATE_KEY_KEY.to_string(), STANDARD.encode(key)),
        ]);
        assert!(certified_key_from_secret_data(|k| data.get(k).map(String::as_str)).is_ok());

        let partial = HashMap::from([(TLS_CERT_KEY.to_string(), "@@@".to_string())]);
        let err =
            certified_key_from_secret_data(|k| partial.get(k).map(String::as_str)).unwrap_err();
        assert!(matches!(err, CertificateError::Base64 { key: TLS_CERT_KEY, .. }));
    }
}
