//! Terminal identity and collector address.
//!
//! The values are read once at startup by the agent binary (see its local
//! config loader) and shared read-only by every task.

use url::Url;

/// Immutable agent configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    /// Address of the monitoring server, as found in the local agent config.
    pub server_address: String,
    /// Store number (`loja_id` on the wire).
    pub store_id: u32,
    /// Terminal number inside the store (`pdv_id` on the wire).
    pub terminal_id: u32,
    /// Root URL of the collector API.
    pub api_base_url: Url,
}

impl AgentConfig {
    /// Build a config whose collector lives at `https://{server_address}`.
    pub fn new(
        server_address: impl Into<String>,
        store_id: u32,
        terminal_id: u32,
    ) -> Result<Self, url::ParseError> {
        let server_address = server_address.into();
        let api_base_url = Url::parse(&format!("https://{server_address}"))?;
        Ok(Self {
            server_address,
            store_id,
            terminal_id,
            api_base_url,
        })
    }

    /// Point the collector at an explicit base URL instead of the derived one.
    pub fn with_api_base_url(mut self, api_base_url: Url) -> Self {
        self.api_base_url = api_base_url;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_base_url_is_derived_from_server_address() {
        let config = AgentConfig::new("10.1.2.3", 12, 201).unwrap();
        assert_eq!(config.api_base_url.as_str(), "https://10.1.2.3/");
        assert_eq!(
            config.api_base_url.join("/pdv/event").unwrap().as_str(),
            "https://10.1.2.3/pdv/event"
        );
    }

    #[test]
    fn test_invalid_server_address_is_rejected() {
        assert!(AgentConfig::new("bad host name", 1, 1).is_err());
    }
}
