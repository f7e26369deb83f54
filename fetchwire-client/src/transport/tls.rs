//! Default rustls configuration.
//!
//! The crypto provider and root store come from cargo features:
//!
//! - **Crypto providers** (choose one): `tls-ring` (default with `tls`),
//!   `tls-aws-lc`. Without either, a globally installed provider is used.
//! - **Root certificates** (choose one): `tls-native-roots` (default with
//!   `tls`), `tls-webpki-roots`.

use std::sync::Arc;

use rustls::ClientConfig;

/// The only application protocol the client speaks.
pub(crate) const ALPN_HTTP11: &[u8] = b"http/1.1";

/// Whether both a crypto provider and root certificates are compiled in.
#[inline]
pub const fn has_tls_support() -> bool {
    cfg!(any(feature = "tls-ring", feature = "tls-aws-lc"))
        && cfg!(any(
            feature = "tls-native-roots",
            feature = "tls-webpki-roots"
        ))
}

#[cfg(any(feature = "tls-native-roots", feature = "tls-webpki-roots"))]
fn provider_builder() -> Option<rustls::ConfigBuilder<ClientConfig, rustls::WantsVerifier>> {
    #[cfg(feature = "tls-ring")]
    let provider = Some(Arc::new(rustls::crypto::ring::default_provider()));

    #[cfg(all(feature = "tls-aws-lc", not(feature = "tls-ring")))]
    let provider = Some(Arc::new(rustls::crypto::aws_lc_rs::default_provider()));

    #[cfg(not(any(feature = "tls-ring", feature = "tls-aws-lc")))]
    let provider = rustls::crypto::CryptoProvider::get_default().cloned();

    ClientConfig::builder_with_provider(provider?)
        .with_safe_default_protocol_versions()
        .ok()
}

/// Build the default TLS configuration, offering `http/1.1` via ALPN.
///
/// Returns `None` if no crypto provider is available.
#[cfg(any(feature = "tls-native-roots", feature = "tls-webpki-roots"))]
pub fn default_tls_config() -> Option<ClientConfig> {
    let config = provider_builder()?
        .with_root_certificates(root_store())
        .with_no_client_auth();
    Some(with_http11_alpn(config))
}

#[cfg(any(feature = "tls-native-roots", feature = "tls-webpki-roots"))]
fn root_store() -> rustls::RootCertStore {
    let mut roots = rustls::RootCertStore::empty();

    // Prefer native roots when both features are enabled
    #[cfg(feature = "tls-native-roots")]
    {
        let native = rustls_native_certs::load_native_certs();
        if !native.errors.is_empty() {
            #[cfg(feature = "tracing")]
            tracing::debug!(errors = ?native.errors, "some native certificates failed to load");
        }
        roots.add_parsable_certificates(native.certs);
    }

    #[cfg(all(feature = "tls-webpki-roots", not(feature = "tls-native-roots")))]
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    roots
}

/// Replace the ALPN list of `config` with `http/1.1`.
pub(crate) fn with_http11_alpn(mut config: ClientConfig) -> ClientConfig {
    config.alpn_protocols = vec![ALPN_HTTP11.to_vec()];
    config
}

pub(crate) fn into_connector(config: ClientConfig) -> tokio_rustls::TlsConnector {
    tokio_rustls::TlsConnector::from(Arc::new(with_http11_alpn(config)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_tls_support_matches_features() {
        let expected = cfg!(any(feature = "tls-ring", feature = "tls-aws-lc"))
            && cfg!(any(feature = "tls-native-roots", feature = "tls-webpki-roots"));
        assert_eq!(has_tls_support(), expected);
    }

    #[cfg(all(feature = "tls-ring", feature = "tls-native-roots"))]
    #[test]
    fn test_default_tls_config_offers_http11() {
        let config = default_tls_config().unwrap();
        assert_eq!(config.alpn_protocols, vec![b"http/1.1".to_vec()]);
    }
}
