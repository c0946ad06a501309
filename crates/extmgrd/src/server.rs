//! Single-threaded request loop over the daemon socket.
//!
//! Connections are accepted and served one at a time; a request runs to
//! completion before the next one is read. Request-level failures turn
//! into structured error replies, never into a dead daemon.

use std::time::Duration;

use camino::Utf8PathBuf;
use extmgr_catalog::{Extractor, Fetcher};
use extmgr_core::Config;
use extmgr_proto::{recv_message, send_message, Request};
use tokio::io::BufReader;
use tokio::net::{UnixListener, UnixStream};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{reload, Registry};

/// Everything a request handler needs, wired up once at startup.
pub struct Daemon {
    pub config: Config,
    pub fetcher: Box<dyn Fetcher>,
    pub extractor: Box<dyn Extractor>,
    /// Alternate root for the host's os-release file; tests point this
    /// at a fixture tree.
    pub os_release_prefix: Option<Utf8PathBuf>,
    /// Lets SetLogLevel adjust the subscriber at runtime.
    pub log_reload: Option<reload::Handle<LevelFilter, Registry>>,
}

/// What the connection loop should do after a request.
pub enum Action {
    Continue,
    Quit(i32),
}

/// Accept and serve connections until a `Quit` request or, when `idle`
/// is set, until no client shows up for that long. Returns the process
/// exit code.
pub async fn serve(
    daemon: &Daemon,
    listener: UnixListener,
    idle: Option<Duration>,
) -> std::io::Result<i32> {
    loop {
        let accepted = match idle {
            Some(limit) => match timeout(limit, listener.accept()).await {
                Ok(result) => result,
                Err(_) => {
                    info!("No connections for {}s, exiting.", limit.as_secs());
                    return Ok(0);
                }
            },
            None => listener.accept().await,
        };

        let (stream, _addr) = match accepted {
            Ok(connection) => connection,
            Err(err) => {
                warn!("Accepting connection failed: {err}");
                continue;
            }
        };

        match handle_connection(daemon, stream).await {
            Ok(Some(code)) => return Ok(code),
            Ok(None) => {}
            Err(err) => warn!("Connection failed: {err}"),
        }
    }
}

async fn handle_connection(daemon: &Daemon, stream: UnixStream) -> std::io::Result<Option<i32>> {
    // Identity of the peer decides what it may call; an unreadable
    // identity only ever means "deny".
    let peer_uid = stream.peer_cred().ok().map(|cred| cred.uid());
    debug!("Connection from UID {peer_uid:?}");

    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    while let Some(request) = recv_message::<_, Request>(&mut reader).await? {
        let (reply, action) = crate::handlers::dispatch(daemon, &request, peer_uid).await;
        send_message(&mut write_half, &reply).await?;

        if let Action::Quit(code) = action {
            return Ok(Some(code));
        }
    }

    Ok(None)
}
