//! Process side of the plugin handshake.
//!
//! The host starts the provider with a magic cookie in the environment and
//! reads one line from stdout naming the address of the gRPC server. With
//! `PLUGIN_CLIENT_CERT` set the host expects TLS, and the line carries the
//! server certificate. The process runs until the host calls
//! `GRPCController.Shutdown`.

use std::future::Future;
use std::io::{self, Write};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::{Identity, Server, ServerTlsConfig};
use tonic::{Request, Response, Status};
use tracing::{debug, info};

use super::ProviderService;
use crate::proto::plugin::grpc_controller_server::{GrpcController, GrpcControllerServer};
use crate::proto::plugin::Empty;
use crate::proto::tfplugin6::provider_server::ProviderServer;

pub const MAGIC_COOKIE_KEY: &str = "TF_PLUGIN_MAGIC_COOKIE";
pub const MAGIC_COOKIE_VALUE: &str =
    "d602bf8f470bc67ca7faa0386276bbdd4330efaf76d1a219cb4d6991ca9872b2";

/// Set by the host when it wants a TLS connection.
pub const CLIENT_CERT_ENV: &str = "PLUGIN_CLIENT_CERT";

const CORE_PROTOCOL_VERSION: u32 = 1;
const PROTOCOL_VERSION: u32 = 6;
const WIRE_PROTOCOL: &str = "grpc";

/// Name the host checks through the gRPC health service.
const HEALTH_SERVICE: &str = "plugin";

const NOT_LAUNCHED_MESSAGE: &str = "This binary is a plugin. These are not meant to be executed directly.\n\
Please execute the program that consumes these plugins, which will\n\
load any plugins automatically";

#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error("{}", NOT_LAUNCHED_MESSAGE)]
    NotLaunchedByHost,
    #[error("plugin I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("gRPC server failed: {0}")]
    Transport(#[from] tonic::transport::Error),
    #[error("could not create the server certificate: {0}")]
    Certificate(#[from] rcgen::Error),
}

/// A self-signed certificate for `localhost`, made fresh for each run.
pub struct ServerCertificate {
    cert_pem: String,
    key_pem: String,
    der: Vec<u8>,
}

impl ServerCertificate {
    pub fn generate() -> Result<Self, rcgen::Error> {
        let rcgen::CertifiedKey { cert, key_pair } =
            rcgen::generate_simple_self_signed(vec!["localhost".to_string()])?;
        Ok(Self {
            cert_pem: cert.pem(),
            key_pem: key_pair.serialize_pem(),
            der: cert.der().to_vec(),
        })
    }

    /// The DER certificate as unpadded base64, the handshake's last field.
    pub fn handshake_value(&self) -> String {
        STANDARD_NO_PAD.encode(&self.der)
    }

    fn identity(&self) -> Identity {
        Identity::from_pem(&self.cert_pem, &self.key_pem)
    }
}

pub fn check_magic_cookie(value: Option<&str>) -> Result<(), ServeError> {
    match value {
        Some(MAGIC_COOKIE_VALUE) => Ok(()),
        _ => Err(ServeError::NotLaunchedByHost),
    }
}

/// The line announcing the server, e.g. `1|6|tcp|127.0.0.1:1234|grpc`.
pub fn handshake_line(addr: SocketAddr, certificate: Option<&ServerCertificate>) -> String {
    let mut line = format!("{CORE_PROTOCOL_VERSION}|{PROTOCOL_VERSION}|tcp|{addr}|{WIRE_PROTOCOL}");
    if let Some(certificate) = certificate {
        line.push('|');
        line.push_str(&certificate.handshake_value());
    }
    line
}

/// The `TF_REATTACH_PROVIDERS` value for a provider serving on `addr`.
pub fn reattach_config(registry_address: &str, addr: SocketAddr) -> Value {
    let mut config = serde_json::Map::new();
    config.insert(
        registry_address.to_string(),
        json!({
            "Protocol": WIRE_PROTOCOL,
            "ProtocolVersion": PROTOCOL_VERSION,
            "Pid": std::process::id(),
            "Test": true,
            "Addr": {
                "Network": "tcp",
                "String": addr.to_string(),
            },
        }),
    );
    Value::Object(config)
}

struct Controller {
    shutdown: Arc<Notify>,
}

#[tonic::async_trait]
impl GrpcController for Controller {
    async fn shutdown(&self, _request: Request<Empty>) -> Result<Response<Empty>, Status> {
        info!("host requested shutdown");
        self.shutdown.notify_one();
        Ok(Response::new(Empty {}))
    }
}

/// Interrupts go to the whole process group; the host decides when we stop.
async fn ignore_interrupts() {
    loop {
        if tokio::signal::ctrl_c().await.is_err() {
            return std::future::pending().await;
        }
        debug!("ignoring interrupt");
    }
}

async fn run(
    service: ProviderService,
    listener: TcpListener,
    certificate: Option<&ServerCertificate>,
    stop: impl Future<Output = ()>,
) -> Result<(), ServeError> {
    let (health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_service_status(HEALTH_SERVICE, tonic_health::ServingStatus::Serving)
        .await;

    let shutdown = Arc::new(Notify::new());
    let controller = Controller {
        shutdown: shutdown.clone(),
    };
    let signal = async move {
        tokio::select! {
            _ = shutdown.notified() => {}
            _ = stop => info!("stopping on interrupt"),
        }
    };

    let mut builder = Server::builder();
    if let Some(certificate) = certificate {
        builder = builder.tls_config(ServerTlsConfig::new().identity(certificate.identity()))?;
    }
    builder
        .add_service(health_service)
        .add_service(ProviderServer::new(service))
        .add_service(GrpcControllerServer::new(controller))
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), signal)
        .await?;
    info!("plugin server stopped");
    Ok(())
}

/// Serves a host-launched session on a fresh loopback port.
///
/// `magic_cookie` and `client_cert` are the values of [`MAGIC_COOKIE_KEY`]
/// and [`CLIENT_CERT_ENV`]. The handshake line goes to `out`.
pub async fn serve(
    service: ProviderService,
    magic_cookie: Option<&str>,
    client_cert: Option<&str>,
    mut out: impl Write,
) -> Result<(), ServeError> {
    check_magic_cookie(magic_cookie)?;

    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await?;
    let addr = listener.local_addr()?;
    let certificate = match client_cert.filter(|cert| !cert.trim().is_empty()) {
        Some(_) => Some(ServerCertificate::generate()?),
        None => None,
    };

    writeln!(out, "{}", handshake_line(addr, certificate.as_ref()))?;
    out.flush()?;
    info!(%addr, tls = certificate.is_some(), "plugin server listening");

    run(service, listener, certificate.as_ref(), ignore_interrupts()).await
}

/// Serves on `listener` for a host attached through
/// `TF_REATTACH_PROVIDERS`, which is printed to `announce`. Stops on
/// interrupt or when the host asks.
pub async fn serve_debug(
    service: ProviderService,
    listener: TcpListener,
    registry_address: &str,
    mut announce: impl Write,
) -> Result<(), ServeError> {
    let addr = listener.local_addr()?;
    let config = reattach_config(registry_address, addr);
    writeln!(
        announce,
        "Provider started. To attach Terraform CLI, set the TF_REATTACH_PROVIDERS environment variable with the following:\n"
    )?;
    writeln!(announce, "\tTF_REATTACH_PROVIDERS='{config}'")?;
    announce.flush()?;
    info!(%addr, "debug server listening");

    let interrupted = async {
        tokio::signal::ctrl_c().await.ok();
    };
    run(service, listener, None, interrupted).await
}
