//! TLS listener built on `rustls`, enabled with the `tls` feature.

use std::sync::Arc;

use axum::Router;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ferrobot_types::FerroError;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, warn};

/// DER payloads of every PEM block whose label ends with `label`.
fn pem_blocks(pem: &str, label: &str) -> Result<Vec<Vec<u8>>, FerroError> {
    let mut blocks = Vec::new();
    let mut current: Option<String> = None;
    for line in pem.lines().map(str::trim) {
        if let Some(rest) = line.strip_prefix("-----BEGIN ") {
            if rest.trim_end_matches('-').ends_with(label) {
                current = Some(String::new());
            }
        } else if line.starts_with("-----END ") {
            if let Some(body) = current.take() {
                let der = STANDARD
                    .decode(body)
                    .map_err(|e| FerroError::Config(format!("malformed PEM block: {e}")))?;
                blocks.push(der);
            }
        } else if let Some(body) = current.as_mut() {
            body.push_str(line);
        }
    }
    Ok(blocks)
}

fn read(path: &str) -> Result<String, FerroError> {
    std::fs::read_to_string(path).map_err(|e| FerroError::io(path, e.to_string()))
}

/// # Errors
///
/// Unreadable files, missing PEM blocks, or a key rustls rejects.
pub(crate) fn acceptor(cert: &str, key: &str) -> Result<TlsAcceptor, FerroError> {
    let certs: Vec<rustls::Certificate> = pem_blocks(&read(cert)?, "CERTIFICATE")?
        .into_iter()
        .map(rustls::Certificate)
        .collect();
    if certs.is_empty() {
        return Err(FerroError::Config(format!("no certificate found in '{cert}'")));
    }
    let key = pem_blocks(&read(key)?, "PRIVATE KEY")?
        .into_iter()
        .next()
        .map(rustls::PrivateKey)
        .ok_or_else(|| FerroError::Config(format!("no private key found in '{key}'")))?;
    let config = rustls::ServerConfig::builder()
        .with_safe_defaults()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| FerroError::Config(format!("invalid TLS material: {e}")))?;
    Ok(TlsAcceptor::from(Arc::new(config)))
}

pub(crate) async fn serve(
    listener: TcpListener,
    acceptor: TlsAcceptor,
    app: Router,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        let (stream, peer) = tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    continue;
                }
            },
        };
        let acceptor = acceptor.clone();
        let service = TowerToHyperService::new(app.clone());
        tokio::spawn(async move {
            let stream = match acceptor.accept(stream).await {
                Ok(stream) => stream,
                Err(e) => {
                    debug!(%peer, error = %e, "tls handshake failed");
                    return;
                }
            };
            if let Err(e) = hyper::server::conn::http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                debug!(%peer, error = %e, "connection closed with error");
            }
        });
    }
}
