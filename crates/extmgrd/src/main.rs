//! extmgrd - manages sysext images on behalf of local clients.
//!
//! All requests arrive over a Unix stream socket and are served
//! strictly one at a time; mutating methods additionally require the
//! caller to be root.

mod handlers;
mod server;
mod store;

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::Parser;
use extmgr_catalog::{SystemdDissect, SystemdPull};
use extmgr_core::{Config, ConfigGroup};
use tokio::net::UnixListener;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, reload};

use server::Daemon;

#[derive(Parser, Debug)]
#[command(name = "extmgrd")]
#[command(author, version, about = "Manage sysext images")]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<Utf8PathBuf>,

    /// Socket to listen on
    #[arg(long, default_value = extmgr_proto::SOCKET_PATH)]
    socket_path: Utf8PathBuf,

    /// Exit after this many seconds without a connection (0 = never)
    #[arg(long, default_value_t = 0)]
    exit_idle_time: u64,

    /// Debug logging
    #[arg(short, long)]
    debug: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load(ConfigGroup::Daemon, args.config.as_deref())
        .context("Couldn't load configuration file")?;

    let level = if args.debug {
        LevelFilter::DEBUG
    } else if args.verbose || config.verbose {
        LevelFilter::INFO
    } else {
        LevelFilter::WARN
    };
    let (filter, reload_handle) = reload::Layer::new(level);
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();

    info!(
        "Starting extmgrd {} on {}",
        env!("CARGO_PKG_VERSION"),
        args.socket_path
    );

    let daemon = Daemon {
        fetcher: Box::new(SystemdPull {
            verify_signature: config.verify_signature,
        }),
        extractor: Box::new(SystemdDissect),
        config,
        os_release_prefix: None,
        log_reload: Some(reload_handle),
    };

    let listener = bind_socket(&args.socket_path)?;
    let idle = (args.exit_idle_time > 0)
        .then(|| std::time::Duration::from_secs(args.exit_idle_time));

    let code = server::serve(&daemon, listener, idle).await?;

    info!("extmgrd stopped.");
    std::process::exit(code);
}

fn bind_socket(path: &Utf8PathBuf) -> Result<UnixListener> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory '{parent}'"))?;
    }
    // A previous instance may have left its socket file behind.
    if path.exists() {
        std::fs::remove_file(path)
            .with_context(|| format!("Failed to remove stale socket '{path}'"))?;
    }

    UnixListener::bind(path).with_context(|| format!("Failed to bind to socket '{path}'"))
}
