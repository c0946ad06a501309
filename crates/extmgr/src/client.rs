//! Socket client for talking to extmgrd.

use anyhow::{anyhow, Context, Result};
use camino::Utf8Path;
use extmgr_proto::{recv_message, send_message, Request};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::BufReader;
use tokio::net::UnixStream;
use tracing::debug;

/// Call one daemon method and read its reply.
pub async fn call<P, R>(socket: &Utf8Path, method: &str, params: P) -> Result<R>
where
    P: Serialize,
    R: DeserializeOwned,
{
    debug!("Calling {method} on '{socket}'");
    let stream = match UnixStream::connect(socket).await {
        Ok(stream) => stream,
        Err(err)
            if matches!(
                err.kind(),
                std::io::ErrorKind::NotFound | std::io::ErrorKind::ConnectionRefused
            ) =>
        {
            return Err(anyhow!("extmgrd not running!"));
        }
        Err(err) => {
            return Err(err).with_context(|| format!("Failed to connect to '{socket}'"));
        }
    };

    let (read_half, mut write_half) = stream.into_split();

    let request = Request::new(method, params).context("Failed to build the request")?;
    send_message(&mut write_half, &request)
        .await
        .with_context(|| format!("Failed to call {method} method"))?;

    let mut reader = BufReader::new(read_half);
    recv_message(&mut reader)
        .await
        .with_context(|| format!("Failed to read the {method} reply"))?
        .ok_or_else(|| anyhow!("extmgrd closed the connection"))
}
