//! catuid: the catui broker daemon.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::Level;

use catui_broker::{
    Broker, BrokerConfig, BrokerResult, DEFAULT_MAX_SERVERS, PidFile, Registry, SignalHandler,
    default_socket_path,
};
use catui_core::install::{INSTALL_ROOT_ENV, parse_install_roots};
use catui_core::{LogFormat, TracingConfig, init_tracing};

/// Route catui clients to protocol servers
#[derive(Debug, Parser)]
#[command(name = "catuid")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Listening socket path (defaults to the user cache directory)
    socket: Option<PathBuf>,

    /// Install root to search for protocol servers (repeatable)
    #[arg(long = "root", value_name = "DIR", env = INSTALL_ROOT_ENV, value_delimiter = ':')]
    roots: Vec<PathBuf>,

    /// Maximum number of running servers
    #[arg(long, default_value_t = DEFAULT_MAX_SERVERS)]
    max_servers: usize,

    /// Write a PID file and refuse to start if another broker owns it
    #[arg(long)]
    pid_file: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    debug: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };
    let mut tracing = TracingConfig::daemon().with_format(format);
    if cli.debug {
        tracing = tracing.with_level(Level::DEBUG);
    }
    if let Err(e) = init_tracing(tracing) {
        eprintln!("warning: {}", e);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> BrokerResult<()> {
    let roots = if cli.roots.is_empty() {
        parse_install_roots(None)
    } else {
        cli.roots
    };
    let config = BrokerConfig::new(cli.socket.unwrap_or_else(default_socket_path))
        .with_search_roots(roots)
        .with_max_servers(cli.max_servers);

    let _pid_file = cli.pid_file.map(PidFile::create).transpose()?;

    let signals = SignalHandler::new();
    signals.spawn_listener()?;

    let registry = Registry::from_config(&config);
    let mut broker = Broker::bind(config, registry).await?;
    broker.run_until_shutdown(signals.shutdown().wait()).await
}
