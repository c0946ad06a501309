//! Daemon and client configuration.
//!
//! Loaded once at startup and passed by reference into everything that
//! needs it; nothing mutates it afterwards. The file has a `default`
//! section plus optional `daemon`/`client` sections whose values win
//! for the respective component.

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use tracing::debug;

use crate::error::Result;

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/extmgr/extmgr.yaml";

/// Where downloaded images live
pub const DEFAULT_STORE_DIR: &str = "/var/lib/extmgr/images";

/// Where installed images are linked for the sysext machinery
pub const DEFAULT_EXTENSIONS_DIR: &str = "/etc/extensions";

/// Root of the snapshot tree consulted for reference counting
pub const DEFAULT_SNAPSHOTS_DIR: &str = "/.snapshots";

/// Which section of the configuration file wins over `default`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigGroup {
    Daemon,
    Client,
}

/// Resolved process-wide configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Verbose compatibility tracing by default
    pub verbose: bool,
    /// Ask the downloader to verify image signatures
    pub verify_signature: bool,
    /// Remote catalog base URL, if any
    pub url: Option<String>,
    /// Local image store directory
    pub sysext_store_dir: Utf8PathBuf,
    /// Directory of links marking images as installed
    pub extensions_dir: Utf8PathBuf,
    /// Snapshot tree scanned for image references
    pub snapshots_dir: Utf8PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            verbose: false,
            verify_signature: true,
            url: None,
            sysext_store_dir: DEFAULT_STORE_DIR.into(),
            extensions_dir: DEFAULT_EXTENSIONS_DIR.into(),
            snapshots_dir: DEFAULT_SNAPSHOTS_DIR.into(),
        }
    }
}

/// One section of the configuration file; unset keys fall through.
#[derive(Debug, Clone, Default, Deserialize)]
struct Section {
    verbose: Option<bool>,
    verify_signature: Option<bool>,
    url: Option<String>,
    sysext_store_dir: Option<Utf8PathBuf>,
    extensions_dir: Option<Utf8PathBuf>,
    snapshots_dir: Option<Utf8PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    default: Section,
    #[serde(default)]
    daemon: Section,
    #[serde(default)]
    client: Section,
}

impl Config {
    /// Load the configuration for `group`, reading `path` or the default
    /// location. A missing file yields the built-in defaults.
    pub fn load(group: ConfigGroup, path: Option<&Utf8Path>) -> Result<Self> {
        let path = path.unwrap_or_else(|| Utf8Path::new(DEFAULT_CONFIG_PATH));

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!("No configuration file at '{path}', using defaults");
                return Ok(Self::default());
            }
            Err(err) => return Err(err.into()),
        };

        let file: ConfigFile = serde_yaml_ng::from_str(&content)?;
        let section = match group {
            ConfigGroup::Daemon => file.daemon,
            ConfigGroup::Client => file.client,
        };

        let mut config = Self::default();
        for layer in [file.default, section] {
            if let Some(verbose) = layer.verbose {
                config.verbose = verbose;
            }
            if let Some(verify) = layer.verify_signature {
                config.verify_signature = verify;
            }
            if let Some(url) = layer.url {
                config.url = Some(url);
            }
            if let Some(dir) = layer.sysext_store_dir {
                config.sysext_store_dir = dir;
            }
            if let Some(dir) = layer.extensions_dir {
                config.extensions_dir = dir;
            }
            if let Some(dir) = layer.snapshots_dir {
                config.snapshots_dir = dir;
            }
        }

        Ok(config)
    }
}
