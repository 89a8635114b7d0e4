use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Directory holding one sub-directory per partition.
    pub data_root: PathBuf,
    /// Largest accepted request body, in bytes.
    pub max_body_size: usize,
    /// Log every stored and read article.
    pub verbose: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 9580)),
            data_root: PathBuf::from("data"),
            max_body_size: 16 * 1024 * 1024,
            verbose: false,
        }
    }
}

impl ServerConfig {
    /// Read a TOML config file. Keys left out keep their defaults.
    pub fn load(path: &Path) -> ServerResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> ServerResult<Self> {
        toml::from_str(text).map_err(|e| ServerError::Config(e.to_string()))
    }
}
