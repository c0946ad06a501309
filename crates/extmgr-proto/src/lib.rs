//! Wire protocol between the extmgr CLI and extmgrd.
//!
//! A message is one JSON object terminated by a NUL byte, exchanged
//! over a local stream socket. Requests name a method plus a parameters
//! object; replies always carry `Success` and, on failure, `ErrorMsg`,
//! so a request-level error never tears down the connection.

use extmgr_core::types::ImageEntry;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt};

/// Directory holding the daemon's socket.
pub const SOCKET_DIR: &str = "/run/extmgr";

/// Default socket path the daemon listens on.
pub const SOCKET_PATH: &str = "/run/extmgr/socket";

/// Method names understood by the daemon.
pub mod methods {
    pub const LIST_IMAGES: &str = "ListImages";
    pub const CHECK: &str = "Check";
    pub const UPDATE: &str = "Update";
    pub const INSTALL: &str = "Install";
    pub const CLEANUP: &str = "Cleanup";
    pub const PING: &str = "Ping";
    pub const QUIT: &str = "Quit";
    pub const SET_LOG_LEVEL: &str = "SetLogLevel";
    pub const GET_ENVIRONMENT: &str = "GetEnvironment";
}

/// A method call. Parameters are kept as raw JSON; each handler parses
/// the shape it expects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub method: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub parameters: Value,
}

impl Request {
    pub fn new(method: &str, parameters: impl Serialize) -> serde_json::Result<Self> {
        Ok(Self {
            method: method.to_string(),
            parameters: serde_json::to_value(parameters)?,
        })
    }
}

/// Parameters of `ListImages`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListParams {
    #[serde(rename = "URL", default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(rename = "Verbose", default, skip_serializing_if = "Option::is_none")]
    pub verbose: Option<bool>,
}

/// Parameters of `Check` and `Update`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckParams {
    #[serde(rename = "URL", default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(rename = "Verbose", default, skip_serializing_if = "Option::is_none")]
    pub verbose: Option<bool>,
    #[serde(rename = "Prefix", default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

/// Parameters of `Install`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallParams {
    #[serde(rename = "Install")]
    pub install: String,
    #[serde(rename = "URL", default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(rename = "Verbose", default, skip_serializing_if = "Option::is_none")]
    pub verbose: Option<bool>,
}

/// Parameters of `Cleanup`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanupParams {
    #[serde(rename = "Verbose", default, skip_serializing_if = "Option::is_none")]
    pub verbose: Option<bool>,
}

/// Parameters of `Quit`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuitParams {
    #[serde(rename = "ExitCode", default)]
    pub exit_code: i32,
}

/// Parameters of `SetLogLevel`; syslog-style numeric level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetLogLevelParams {
    #[serde(rename = "Level")]
    pub level: i32,
}

/// One image in a `ListImages` reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRecord {
    #[serde(rename = "NAME")]
    pub name: String,
    #[serde(rename = "IMAGE_NAME")]
    pub image_name: String,
    #[serde(
        rename = "SYSEXT_VERSION_ID",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sysext_version_id: Option<String>,
    #[serde(rename = "SYSEXT_SCOPE", default, skip_serializing_if = "Option::is_none")]
    pub sysext_scope: Option<String>,
    #[serde(rename = "ID", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "SYSEXT_LEVEL", default, skip_serializing_if = "Option::is_none")]
    pub sysext_level: Option<String>,
    #[serde(rename = "VERSION_ID", default, skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
    #[serde(rename = "ARCHITECTURE", default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
    #[serde(rename = "REMOTE", default)]
    pub remote: bool,
    #[serde(rename = "LOCAL", default)]
    pub local: bool,
    #[serde(rename = "INSTALLED", default)]
    pub installed: bool,
    #[serde(rename = "COMPATIBLE", default)]
    pub compatible: bool,
    #[serde(rename = "REFCOUNT", default)]
    pub refcount: u32,
}

impl From<&ImageEntry> for ImageRecord {
    fn from(entry: &ImageEntry) -> Self {
        let meta = entry.metadata.clone().unwrap_or_default();
        Self {
            name: entry.logical_name.clone(),
            image_name: entry.image_name.clone(),
            sysext_version_id: meta.sysext_version_id,
            sysext_scope: meta.sysext_scope,
            id: meta.id,
            sysext_level: meta.sysext_level,
            version_id: meta.version_id,
            architecture: meta.architecture,
            remote: entry.is_remote,
            local: entry.is_local,
            installed: entry.is_installed,
            compatible: entry.is_compatible,
            refcount: entry.reference_count,
        }
    }
}

/// An installed image and, when one exists, the upgrade picked for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateRecord {
    #[serde(rename = "OldName")]
    pub old_name: String,
    #[serde(rename = "NewName", default, skip_serializing_if = "Option::is_none")]
    pub new_name: Option<String>,
}

/// An image name on its own, e.g. a broken or a removed image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageNameRecord {
    #[serde(rename = "IMAGE_NAME")]
    pub image_name: String,
}

/// Reply to `ListImages` and `Cleanup`-style methods.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListImagesReply {
    #[serde(rename = "Success")]
    pub success: bool,
    #[serde(rename = "ErrorMsg", default, skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
    #[serde(rename = "Images", default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<ImageRecord>>,
}

/// Reply to `Check`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckReply {
    #[serde(rename = "Success")]
    pub success: bool,
    #[serde(rename = "ErrorMsg", default, skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
    #[serde(rename = "Images", default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<UpdateRecord>>,
    #[serde(
        rename = "BrokenImages",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub broken_images: Option<Vec<ImageNameRecord>>,
}

/// Reply to `Update`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateReply {
    #[serde(rename = "Success")]
    pub success: bool,
    #[serde(rename = "ErrorMsg", default, skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
    #[serde(rename = "Updated", default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<Vec<UpdateRecord>>,
}

/// Reply to `Install`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstallReply {
    #[serde(rename = "Success")]
    pub success: bool,
    #[serde(rename = "ErrorMsg", default, skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
    #[serde(rename = "Installed", default, skip_serializing_if = "Option::is_none")]
    pub installed: Option<String>,
}

/// Reply to `Cleanup`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanupReply {
    #[serde(rename = "Success")]
    pub success: bool,
    #[serde(rename = "ErrorMsg", default, skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
    #[serde(rename = "Images", default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<ImageNameRecord>>,
}

/// Reply to `Ping`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PingReply {
    #[serde(rename = "Alive")]
    pub alive: bool,
}

/// Reply to `GetEnvironment`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvironmentReply {
    #[serde(rename = "Success")]
    pub success: bool,
    #[serde(rename = "ErrorMsg", default, skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
    #[serde(
        rename = "Environment",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub environment: Option<Vec<String>>,
}

/// Reply to methods with no payload (`Quit`, `SetLogLevel`), and the
/// generic error shape for unknown methods.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenericReply {
    #[serde(rename = "Success")]
    pub success: bool,
    #[serde(rename = "ErrorMsg", default, skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
}

impl GenericReply {
    pub fn ok() -> Self {
        Self {
            success: true,
            error_msg: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error_msg: Some(message.into()),
        }
    }
}

/// Write one NUL-terminated JSON message.
pub async fn send_message<W, T>(writer: &mut W, message: &T) -> std::io::Result<()>
where
    W: AsyncWriteExt + Unpin,
    T: Serialize,
{
    let mut buf = serde_json::to_vec(message)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;
    buf.push(0);
    writer.write_all(&buf).await?;
    writer.flush().await
}

/// Read one NUL-terminated JSON message; `None` on a cleanly closed
/// connection.
pub async fn recv_message<R, T>(reader: &mut R) -> std::io::Result<Option<T>>
where
    R: AsyncBufReadExt + Unpin,
    T: DeserializeOwned,
{
    let mut buf = Vec::new();
    let n = reader.read_until(0, &mut buf).await?;
    if n == 0 {
        return Ok(None);
    }
    if buf.last() == Some(&0) {
        buf.pop();
    }

    serde_json::from_slice(&buf)
        .map(Some)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn framing_round_trip() {
        let request = Request::new(
            methods::LIST_IMAGES,
            ListParams {
                url: Some("https://example.com".into()),
                verbose: None,
            },
        )
        .unwrap();

        let mut wire = Vec::new();
        send_message(&mut wire, &request).await.unwrap();
        assert_eq!(wire.last(), Some(&0));

        let mut reader = BufReader::new(wire.as_slice());
        let back: Request = recv_message(&mut reader).await.unwrap().unwrap();
        assert_eq!(back.method, "ListImages");
        let params: ListParams = serde_json::from_value(back.parameters).unwrap();
        assert_eq!(params.url.as_deref(), Some("https://example.com"));

        // The stream is exhausted afterwards.
        let eof: Option<Request> = recv_message(&mut reader).await.unwrap();
        assert!(eof.is_none());
    }

    #[tokio::test]
    async fn two_messages_on_one_stream() {
        let mut wire = Vec::new();
        send_message(&mut wire, &GenericReply::ok()).await.unwrap();
        send_message(&mut wire, &GenericReply::error("nope"))
            .await
            .unwrap();

        let mut reader = BufReader::new(wire.as_slice());
        let first: GenericReply = recv_message(&mut reader).await.unwrap().unwrap();
        let second: GenericReply = recv_message(&mut reader).await.unwrap().unwrap();
        assert!(first.success);
        assert_eq!(second.error_msg.as_deref(), Some("nope"));
    }

    #[test]
    fn image_record_uses_the_wire_key_names() {
        let mut entry = ImageEntry::new("gcc-30.3.x86-64.raw");
        entry.is_remote = true;
        entry.is_compatible = true;

        let json = serde_json::to_value(ImageRecord::from(&entry)).unwrap();
        assert_eq!(json["NAME"], "gcc");
        assert_eq!(json["IMAGE_NAME"], "gcc-30.3.x86-64.raw");
        assert_eq!(json["REMOTE"], true);
        assert_eq!(json["INSTALLED"], false);
    }

    #[test]
    fn request_without_parameters_parses() {
        let request: Request = serde_json::from_str(r#"{"method": "Ping"}"#).unwrap();
        assert_eq!(request.method, "Ping");
        assert!(request.parameters.is_null());
    }
}
