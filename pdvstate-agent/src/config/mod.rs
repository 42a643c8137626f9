//! Configuration module for pdvstate-agent.
//!
//! The terminal identity and the monitoring server address are not owned by
//! the agent: they are read from the files the point-of-sale system and the
//! monitoring agent already maintain.

pub mod file;

use crate::config::file::{
    STORE_ID_KEY, TERMINAL_ID_KEY, parse_server_address, parse_terminal_ids,
};
use pdvstate_core::config::AgentConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no Server= entry in {0}")]
    MissingServer(PathBuf),

    #[error("server address {0} is the local host")]
    LoopbackServer(String),

    #[error("{key} not found in {path}")]
    MissingId { key: &'static str, path: PathBuf },

    #[error("invalid collector address: {0}")]
    InvalidAddress(#[from] url::ParseError),
}

/// Loads the [`AgentConfig`] from the terminal's local files.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    agent_config_path: PathBuf,
    pdv_config_path: PathBuf,
}

impl ConfigLoader {
    /// Create a new config loader.
    ///
    /// * `agent_config_path` - Monitoring agent config holding `Server=`
    /// * `pdv_config_path` - Point-of-sale config holding the store and
    ///   terminal numbers
    pub fn new(agent_config_path: impl AsRef<Path>, pdv_config_path: impl AsRef<Path>) -> Self {
        Self {
            agent_config_path: agent_config_path.as_ref().to_path_buf(),
            pdv_config_path: pdv_config_path.as_ref().to_path_buf(),
        }
    }

    /// Read and validate both files.
    pub fn load(&self) -> Result<AgentConfig, ConfigError> {
        let agent_config = read(&self.agent_config_path)?;
        let server_address = parse_server_address(&agent_config)
            .ok_or_else(|| ConfigError::MissingServer(self.agent_config_path.clone()))?;
        if server_address == "127.0.0.1" {
            return Err(ConfigError::LoopbackServer(server_address));
        }

        let pdv_config = read(&self.pdv_config_path)?;
        let (store_id, terminal_id) = parse_terminal_ids(&pdv_config);
        let store_id = self.require_id(STORE_ID_KEY, store_id)?;
        let terminal_id = self.require_id(TERMINAL_ID_KEY, terminal_id)?;

        Ok(AgentConfig::new(server_address, store_id, terminal_id)?)
    }

    fn require_id(&self, key: &'static str, id: Option<u32>) -> Result<u32, ConfigError> {
        match id {
            Some(id) if id != 0 => Ok(id),
            _ => Err(ConfigError::MissingId {
                key,
                path: self.pdv_config_path.clone(),
            }),
        }
    }
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::IoError {
        path: path.to_path_buf(),
        source,
    })
}
