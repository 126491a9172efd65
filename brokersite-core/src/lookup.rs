// ABOUTME: Resolving the visitor's network address for whitelist checks
// ABOUTME: Taken from the connection, or from the hop a trusted reverse proxy appended

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::net::IpAddr;

/// What the HTTP layer knows about the visitor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerContext {
    pub peer: Option<IpAddr>,
    /// Raw `X-Forwarded-For` header, only filled in when the proxy is trusted
    pub forwarded_for: Option<String>,
}

impl CallerContext {
    pub fn from_peer(peer: IpAddr) -> Self {
        Self {
            peer: Some(peer),
            forwarded_for: None,
        }
    }
}

/// Resolves the address compared against the whitelist
#[async_trait]
pub trait AddressLookup: Send + Sync {
    async fn caller_address(&self, caller: &CallerContext) -> Result<String>;
}

/// Uses the connection the request arrived on.
///
/// With a forwarded header present, the rightmost hop wins: that is the one
/// the trusted proxy appended. Everything left of it came from the client.
#[derive(Debug, Clone, Default)]
pub struct PeerAddressLookup;

#[async_trait]
impl AddressLookup for PeerAddressLookup {
    async fn caller_address(&self, caller: &CallerContext) -> Result<String> {
        if let Some(forwarded) = caller.forwarded_for.as_deref() {
            let nearest = forwarded.rsplit(',').next().unwrap_or("").trim();
            if !nearest.is_empty() {
                return Ok(nearest.to_string());
            }
        }

        caller
            .peer
            .map(|ip| ip.to_string())
            .ok_or_else(|| anyhow!("No peer address available for this request"))
    }
}
