// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client side of the remote-module transport.
//!
//! A `RemoteConnection` wraps one TCP (optionally TLS) connection to a
//! peer's remote-modules server. The engine is synchronous; the connection
//! owns a tokio runtime handle and bridges with `block_on`, so callers see
//! ordinary blocking request/response semantics.

use crate::error::EngineError;
use labx_core::RemoteDescriptor;
use labx_wire::{
    read_response, write_request, ProtocolError, RemoteValue, Request, Response, PROTOCOL_VERSION,
};
use parking_lot::Mutex;
use rustls::pki_types::ServerName;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

/// Round-trip timeout for remote calls.
pub(crate) const REMOTE_TIMEOUT: Duration = Duration::from_secs(30);

enum Stream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

/// One live connection to a peer.
pub struct RemoteConnection {
    rt: tokio::runtime::Handle,
    stream: Mutex<Stream>,
    peer: String,
}

impl RemoteConnection {
    /// Connect, optionally negotiate TLS, and run the Hello handshake.
    pub fn connect(
        rt: tokio::runtime::Handle,
        descriptor: &RemoteDescriptor,
    ) -> Result<Self, EngineError> {
        let peer = format!("{}:{}", descriptor.host, descriptor.port);
        let connector = tls_connector(descriptor)?;
        let host = descriptor.host.clone();
        let stream = rt
            .block_on(async {
                let tcp = tokio::time::timeout(REMOTE_TIMEOUT, TcpStream::connect(&peer))
                    .await
                    .map_err(|_| ProtocolError::Timeout)??;
                match connector {
                    None => Ok::<Stream, ProtocolError>(Stream::Plain(tcp)),
                    Some(connector) => {
                        let server_name = ServerName::try_from(host.clone()).map_err(|e| {
                            ProtocolError::Encode(format!("invalid TLS server name: {}", e))
                        })?;
                        let tls = tokio::time::timeout(
                            REMOTE_TIMEOUT,
                            connector.connect(server_name, tcp),
                        )
                        .await
                        .map_err(|_| ProtocolError::Timeout)??;
                        Ok(Stream::Tls(Box::new(tls)))
                    }
                }
            })
            .map_err(|e| EngineError::Connection(format!("connect to {} failed: {}", peer, e)))?;

        let connection = Self { rt, stream: Mutex::new(stream), peer: peer.clone() };
        match connection.request(Request::Hello { version: PROTOCOL_VERSION.to_string() })? {
            Response::Hello { version } => {
                debug!(peer = %peer, version = %version, "remote connection established");
                Ok(connection)
            }
            other => Err(EngineError::Connection(format!(
                "unexpected handshake response from {}: {:?}",
                peer, other
            ))),
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// One request/response round-trip. Peer-reported errors come back as
    /// `EngineError::Remote` with the original kind.
    pub fn request(&self, request: Request) -> Result<Response, EngineError> {
        let mut stream = self.stream.lock();
        let response = self
            .rt
            .block_on(async {
                match &mut *stream {
                    Stream::Plain(s) => {
                        write_request(s, &request, REMOTE_TIMEOUT).await?;
                        read_response(s, REMOTE_TIMEOUT).await
                    }
                    Stream::Tls(s) => {
                        write_request(s, &request, REMOTE_TIMEOUT).await?;
                        read_response(s, REMOTE_TIMEOUT).await
                    }
                }
            })
            .map_err(EngineError::Protocol)?;
        match response {
            Response::Error { kind, message } => Err(EngineError::Remote { kind, message }),
            other => Ok(other),
        }
    }

    /// Materialize a remote value, resolving reference handles with a
    /// second round-trip (and releasing them afterwards).
    pub fn materialize(&self, value: RemoteValue) -> Result<labx_core::Value, EngineError> {
        match value {
            RemoteValue::ByValue { value } => Ok(value),
            RemoteValue::Ref { id } => {
                let response = self.request(Request::GetRefValue { id })?;
                let _ = self.request(Request::DropRef { id });
                match response {
                    Response::Value { value: RemoteValue::ByValue { value } } => Ok(value),
                    other => Err(EngineError::Connection(format!(
                        "peer returned {:?} for reference {}",
                        other, id
                    ))),
                }
            }
            RemoteValue::Callable { module, method } => Err(EngineError::Runtime(format!(
                "attribute {}.{} is a method; call it instead",
                module, method
            ))),
        }
    }
}

fn load_certs(path: &Path) -> Result<Vec<rustls::pki_types::CertificateDer<'static>>, EngineError> {
    let file = std::fs::File::open(path)
        .map_err(|e| EngineError::Config(format!("cannot read certfile {}: {}", path.display(), e)))?;
    rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| EngineError::Config(format!("bad certificate in {}: {}", path.display(), e)))
}

fn load_key(path: &Path) -> Result<rustls::pki_types::PrivateKeyDer<'static>, EngineError> {
    let file = std::fs::File::open(path)
        .map_err(|e| EngineError::Config(format!("cannot read keyfile {}: {}", path.display(), e)))?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| EngineError::Config(format!("bad key in {}: {}", path.display(), e)))?
        .ok_or_else(|| EngineError::Config(format!("no private key in {}", path.display())))
}

/// Build the TLS connector from a remote descriptor. The configured
/// certificate is pinned as the trust root; when a keyfile is present the
/// same cert+key pair also authenticates this client to the peer.
fn tls_connector(descriptor: &RemoteDescriptor) -> Result<Option<TlsConnector>, EngineError> {
    let Some(certfile) = &descriptor.certfile else {
        return Ok(None);
    };
    let certs = load_certs(certfile)?;
    let mut roots = rustls::RootCertStore::empty();
    for cert in &certs {
        roots
            .add(cert.clone())
            .map_err(|e| EngineError::Config(format!("bad trust root: {}", e)))?;
    }
    let builder = rustls::ClientConfig::builder().with_root_certificates(roots);
    let config = match &descriptor.keyfile {
        Some(keyfile) => builder
            .with_client_auth_cert(certs, load_key(keyfile)?)
            .map_err(|e| EngineError::Config(format!("bad client certificate: {}", e)))?,
        None => builder.with_no_client_auth(),
    };
    Ok(Some(TlsConnector::from(Arc::new(config))))
}
