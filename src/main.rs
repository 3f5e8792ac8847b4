use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;

use qrcode_provider::provider::PROVIDER_ADDRESS;
use qrcode_provider::server::{self, ServeError, CLIENT_CERT_ENV, MAGIC_COOKIE_KEY};
use qrcode_provider::{logging, ProviderService, QrCodeProvider, VERSION};

/// Terraform provider generating QR codes as ASCII art or PNG files.
#[derive(Debug, Parser)]
#[command(name = "terraform-provider-qrcode", version = VERSION, about)]
struct Cli {
    /// Run with support for debuggers like delve or lldb.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    logging::init(cli.debug);

    let service = ProviderService::new(QrCodeProvider::new(VERSION));

    if cli.debug {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("failed to bind debug listener")?;
        server::serve_debug(service, listener, PROVIDER_ADDRESS, std::io::stdout())
            .await
            .context("debug session failed")?;
        return Ok(ExitCode::SUCCESS);
    }

    let cookie = std::env::var(MAGIC_COOKIE_KEY).ok();
    let client_cert = std::env::var(CLIENT_CERT_ENV).ok();
    match server::serve(service, cookie.as_deref(), client_cert.as_deref(), std::io::stdout()).await {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(err @ ServeError::NotLaunchedByHost) => {
            eprintln!("{err}");
            Ok(ExitCode::FAILURE)
        }
        Err(err) => Err(err).context("plugin session failed"),
    }
}
