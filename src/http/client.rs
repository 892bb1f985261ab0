//! Intercepting outbound HTTP client.
//!
//! # Design Decisions
//! - rustls with the `ring` provider and the webpki root set; no system
//!   certificate store lookup
//! - Both `https://` and `http://` endpoints are reachable

use std::sync::Arc;

use axum::body::Body;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use tower::Layer;

use crate::http::layer::{UpdateCheckLayer, UpdateCheckService};
use crate::interceptor::UpdateInterceptor;

/// HTTPS-capable client with update-check interception in front.
pub type InterceptingClient = UpdateCheckService<Client<HttpsConnector<HttpConnector>, Body>>;

fn tls_config() -> Result<rustls::ClientConfig, rustls::Error> {
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    Ok(rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots)
        .with_no_client_auth())
}

pub fn build_client(interceptor: Arc<UpdateInterceptor>) -> Result<InterceptingClient, rustls::Error> {
    let connector = HttpsConnectorBuilder::new()
        .with_tls_config(tls_config()?)
        .https_or_http()
        .enable_http1()
        .build();
    let client = Client::builder(TokioExecutor::new()).build(connector);
    Ok(UpdateCheckLayer::new(interceptor).layer(client))
}

