//! Endpoint configuration and defaults

use crate::error::{CallError, CallResult};
use serde::{Deserialize, Serialize};

/// Reflection or relay server handed to the transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    /// Server URLs (`stun:`, `stuns:`, `turn:` or `turns:`)
    pub urls: Vec<String>,
    /// Username for relay servers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Credential for relay servers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServer {
    /// Reflection server without credentials
    pub fn stun<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            urls: urls.into_iter().map(Into::into).collect(),
            username: None,
            credential: None,
        }
    }

    /// Relay server with credentials
    pub fn turn(url: &str, username: &str, credential: &str) -> Self {
        Self {
            urls: vec![url.to_string()],
            username: Some(username.to_string()),
            credential: Some(credential.to_string()),
        }
    }

    fn is_relay(url: &str) -> bool {
        url.starts_with("turn:") || url.starts_with("turns:")
    }
}

/// Per-endpoint connectivity configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Reflection/relay servers
    #[serde(default)]
    pub ice_servers: Vec<IceServer>,
    /// Number of candidates the transport may gather ahead of time
    #[serde(default = "default_pool_size")]
    pub ice_candidate_pool_size: u8,
}

fn default_pool_size() -> u8 {
    10
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![IceServer::stun([
                "stun:stun1.l.google.com:19302",
                "stun:stun2.l.google.com:19302",
            ])],
            ice_candidate_pool_size: default_pool_size(),
        }
    }
}

impl EndpointConfig {
    /// Host candidates only, no external servers
    pub fn local_only() -> Self {
        Self {
            ice_servers: Vec::new(),
            ice_candidate_pool_size: 0,
        }
    }

    /// All server URLs, flattened
    pub fn server_urls(&self) -> impl Iterator<Item = &str> {
        self.ice_servers
            .iter()
            .flat_map(|server| server.urls.iter().map(String::as_str))
    }

    /// Validate configuration
    pub fn validate(&self) -> CallResult<()> {
        for server in &self.ice_servers {
            if server.urls.is_empty() {
                return Err(CallError::Configuration {
                    field: "ice_servers.urls".to_string(),
                    reason: "server entry has no URLs".to_string(),
                });
            }

            for url in &server.urls {
                let known = ["stun:", "stuns:", "turn:", "turns:"]
                    .iter()
                    .any(|scheme| url.starts_with(scheme));
                if !known {
                    return Err(CallError::Configuration {
                        field: "ice_servers.urls".to_string(),
                        reason: format!("unsupported URL scheme in {}", url),
                    });
                }

                if IceServer::is_relay(url)
                    && (server.username.is_none() || server.credential.is_none())
                {
                    return Err(CallError::Configuration {
                        field: "ice_servers.credential".to_string(),
                        reason: format!("relay server {} requires username and credential", url),
                    });
                }
            }
        }

        Ok(())
    }
}
