//! catui-connect: open a brokered connection and bridge it to stdio.

use std::io;
use std::process::ExitCode;

use clap::Parser;
use tracing::warn;

use catui_client::{ClientError, Connector, Encoding, bridge::bridge};
use catui_core::{SemVer, TracingConfig, init_tracing};

/// Connect to a catui protocol implementation
#[derive(Debug, Parser)]
#[command(name = "catui-connect")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Protocol name, e.g. com.example.echo
    protocol: String,

    /// Required protocol version (MAJOR.MINOR.PATCH)
    version: SemVer,

    /// Send the handshake as JSON text instead of the structured encoding
    #[arg(long)]
    text: bool,

    /// Enable debug output
    #[arg(long, short = 'v')]
    debug: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let tracing = if cli.debug {
        TracingConfig::cli_debug()
    } else {
        TracingConfig::cli()
    };
    if let Err(e) = init_tracing(tracing) {
        eprintln!("warning: {}", e);
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), ClientError> {
    let encoding = if cli.text {
        Encoding::Text
    } else {
        Encoding::Structured
    };

    let conn = Connector::from_env()
        .with_encoding(encoding)
        .connect(&cli.protocol, cli.version)?;

    let received = bridge(conn, io::stdin(), io::stdout())?;
    if received == 0 {
        warn!(protocol = %cli.protocol, "Peer closed without sending data");
    }
    Ok(())
}
