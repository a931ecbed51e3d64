// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote-modules server.
//!
//! Accepts peer connections and serves the module manager surface over
//! the length-prefixed JSON protocol, optionally behind TLS. Each
//! connection carries request/response pairs until the peer disconnects.
//! Admission is per module: only configured local modules with
//! `allow_remote` may be served, and Gui modules never are.

use labx_core::{ModuleBase, Value};
use labx_engine::{EngineError, ModuleManager};
use labx_wire::{
    read_request, write_response, ProtocolError, RemoteErrorKind, RemoteValue, Request, Response,
    PROTOCOL_VERSION, SERIALIZER_ID,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Peers may idle between requests; reads wait this long before the
/// connection is considered dead.
const IDLE_TIMEOUT: Duration = Duration::from_secs(3600);
/// Bound for writing one response.
const WRITE_TIMEOUT: Duration = Duration::from_secs(30);

/// Table of values handed out as reference handles when by-value transfer
/// is disabled.
#[derive(Default)]
struct RefTable {
    next_id: u64,
    entries: HashMap<u64, Value>,
}

impl RefTable {
    fn insert(&mut self, value: Value) -> u64 {
        self.next_id += 1;
        self.entries.insert(self.next_id, value);
        self.next_id
    }
}

/// Shared server context for all connection handlers.
pub struct ServeCtx {
    pub manager: ModuleManager,
    /// Serialize every result fully instead of handing out references.
    pub force_by_value: bool,
    refs: Mutex<RefTable>,
}

impl ServeCtx {
    pub fn new(manager: ModuleManager, force_by_value: bool) -> Self {
        Self { manager, force_by_value, refs: Mutex::new(RefTable::default()) }
    }
}

/// TLS configuration for the listener, from the configured cert+key pair.
pub fn tls_acceptor(certfile: &Path, keyfile: &Path) -> Result<TlsAcceptor, EngineError> {
    let cert_data = std::fs::File::open(certfile).map_err(|e| {
        EngineError::Config(format!("cannot read certfile {}: {}", certfile.display(), e))
    })?;
    let certs = rustls_pemfile::certs(&mut std::io::BufReader::new(cert_data))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| EngineError::Config(format!("bad certificate: {}", e)))?;
    let key_data = std::fs::File::open(keyfile).map_err(|e| {
        EngineError::Config(format!("cannot read keyfile {}: {}", keyfile.display(), e))
    })?;
    let key = rustls_pemfile::private_key(&mut std::io::BufReader::new(key_data))
        .map_err(|e| EngineError::Config(format!("bad key: {}", e)))?
        .ok_or_else(|| EngineError::Config(format!("no private key in {}", keyfile.display())))?;
    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| EngineError::Config(format!("TLS setup failed: {}", e)))?;
    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// A running remote-modules server.
pub struct RemoteModulesServer {
    shutdown: CancellationToken,
    local_addr: SocketAddr,
}

impl RemoteModulesServer {
    /// Bind and start serving on the runtime behind `rt`.
    pub fn start(
        rt: &tokio::runtime::Handle,
        address: &str,
        port: u16,
        tls: Option<TlsAcceptor>,
        ctx: Arc<ServeCtx>,
    ) -> Result<Self, EngineError> {
        let bind_addr = format!("{}:{}", address, port);
        let listener = rt
            .block_on(TcpListener::bind(&bind_addr))
            .map_err(|e| EngineError::Connection(format!("bind {} failed: {}", bind_addr, e)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| EngineError::Connection(format!("bind {} failed: {}", bind_addr, e)))?;
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        info!(addr = %local_addr, tls = tls.is_some(), "remote modules server listening");
        rt.spawn(async move {
            accept_loop(listener, tls, ctx, token).await;
        });
        Ok(Self { shutdown, local_addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections. Open connections end when their peers
    /// disconnect.
    pub fn stop(&self) {
        self.shutdown.cancel();
        info!(addr = %self.local_addr, "remote modules server stopped");
    }
}

async fn accept_loop(
    listener: TcpListener,
    tls: Option<TlsAcceptor>,
    ctx: Arc<ServeCtx>,
    shutdown: CancellationToken,
) {
    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };
        match accepted {
            Ok((stream, addr)) => {
                debug!(peer = %addr, "peer connected");
                let ctx = Arc::clone(&ctx);
                let tls = tls.clone();
                tokio::spawn(async move {
                    let result = match tls {
                        Some(acceptor) => match acceptor.accept(stream).await {
                            Ok(stream) => handle_connection(stream, &ctx).await,
                            Err(e) => {
                                warn!(peer = %addr, error = %e, "TLS handshake failed");
                                return;
                            }
                        },
                        None => handle_connection(stream, &ctx).await,
                    };
                    match result {
                        Ok(()) | Err(ProtocolError::ConnectionClosed) => {
                            debug!(peer = %addr, "peer disconnected")
                        }
                        Err(e) => warn!(peer = %addr, error = %e, "connection error"),
                    }
                });
            }
            Err(e) => error!("accept error: {}", e),
        }
    }
}

/// Serve request/response pairs until the peer goes away.
///
/// Generic over the stream so it works for plain TCP and TLS.
async fn handle_connection<S>(mut stream: S, ctx: &Arc<ServeCtx>) -> Result<(), ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    loop {
        let request = read_request(&mut stream, IDLE_TIMEOUT).await?;
        debug!(request = ?request, "received request");
        // Manager calls block on the main thread; keep them off the
        // async workers.
        let ctx_clone = Arc::clone(ctx);
        let response = tokio::task::spawn_blocking(move || handle_request(request, &ctx_clone))
            .await
            .unwrap_or_else(|e| Response::Error {
                kind: RemoteErrorKind::Runtime,
                message: format!("handler panicked: {}", e),
            });
        write_response(&mut stream, &response, WRITE_TIMEOUT).await?;
    }
}

/// Reject names that are not configured, not shareable, or Gui-based.
fn admit(ctx: &ServeCtx, name: &str) -> Result<(), Response> {
    let denied = |message: String| Response::Error {
        kind: RemoteErrorKind::PermissionDenied,
        message,
    };
    let descriptor = match ctx.manager.descriptor(name) {
        Ok(descriptor) => descriptor,
        Err(_) => return Err(denied(format!("module {:?} is not served", name))),
    };
    if descriptor.base == ModuleBase::Gui {
        return Err(denied(format!("gui module {:?} cannot be served", name)));
    }
    if !descriptor.allow_remote() {
        return Err(denied(format!("module {:?} does not allow remote access", name)));
    }
    Ok(())
}

fn engine_error(e: EngineError) -> Response {
    Response::Error { kind: e.remote_kind(), message: e.to_string() }
}

/// Wrap a result value per the transfer policy: scalars always by value,
/// containers by reference when by-value transfer is off.
fn wrap_value(ctx: &ServeCtx, value: Value) -> Response {
    if ctx.force_by_value || !value.is_container() {
        Response::Value { value: RemoteValue::ByValue { value } }
    } else {
        let id = ctx.refs.lock().insert(value);
        Response::Value { value: RemoteValue::Ref { id } }
    }
}

/// Handle a single request and return a response.
fn handle_request(request: Request, ctx: &ServeCtx) -> Response {
    if let Some(name) = request.module_name() {
        if let Err(denied) = admit(ctx, name) {
            return denied;
        }
    }
    match request {
        Request::Ping => Response::Pong,

        Request::Hello { version } => {
            debug!(peer_version = %version, "handshake");
            Response::Hello { version: PROTOCOL_VERSION.to_string() }
        }

        Request::ActivateModule { name } => match ctx.manager.activate(&name) {
            Ok(()) => Response::Ok,
            Err(e) => engine_error(e),
        },

        Request::GetModuleInstance { name } => match ctx.manager.get_instance(&name) {
            Ok(_) => Response::Instance { module: name },
            Err(e) => engine_error(e),
        },

        Request::GetModuleState { name } => match ctx.manager.get_state(&name) {
            Ok(state) => Response::State { state },
            Err(e) => engine_error(e),
        },

        Request::GetModuleInfo { name } => match ctx.manager.module_info(&name) {
            Ok(info) => Response::Info { info },
            Err(e) => engine_error(e),
        },

        Request::ClearModuleAppdata { name } => match ctx.manager.clear_appdata(&name) {
            Ok(()) => Response::Ok,
            Err(e) => engine_error(e),
        },

        Request::GetModuleAttr { name, attr } => {
            match ctx.manager.is_module_method(&name, &attr) {
                Ok(true) => Response::Value {
                    value: RemoteValue::Callable { module: name, method: attr },
                },
                Ok(false) => match ctx.manager.get_module_attr(&name, &attr) {
                    Ok(value) => wrap_value(ctx, value),
                    Err(e) => engine_error(e),
                },
                Err(e) => engine_error(e),
            }
        }

        Request::SetModuleAttr { name, attr, value } => {
            match ctx.manager.set_module_attr(&name, &attr, value) {
                Ok(()) => Response::Ok,
                Err(e) => engine_error(e),
            }
        }

        Request::DelModuleAttr { name, attr } => {
            match ctx.manager.del_module_attr(&name, &attr) {
                Ok(()) => Response::Ok,
                Err(e) => engine_error(e),
            }
        }

        Request::CallModuleMethod { name, method, args } => {
            match ctx.manager.call_module_method(&name, &method, args) {
                Ok(value) => wrap_value(ctx, value),
                Err(e) => engine_error(e),
            }
        }

        Request::GetSerializer => Response::Serializer { id: SERIALIZER_ID.to_string() },

        Request::GetRefValue { id } => match ctx.refs.lock().entries.get(&id) {
            Some(value) => Response::Value { value: RemoteValue::ByValue { value: value.clone() } },
            None => Response::Error {
                kind: RemoteErrorKind::NotFound,
                message: format!("no such reference: {}", id),
            },
        },

        Request::DropRef { id } => {
            ctx.refs.lock().entries.remove(&id);
            Response::Ok
        }
    }
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
