//! Agent DID identifier.
//!
//! Format: `did:sage:<chain>:<locator>`.  The chain tag is validated at the
//! boundary; the locator is chain-specific and treated as an opaque string.
//! Everywhere past construction, DIDs are compared as plain byte strings.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const DID_PREFIX: &str = "did:sage:";

#[derive(Debug, Error)]
pub enum DidError {
    #[error("DID must start with `did:sage:`: {0}")]
    BadPrefix(String),

    #[error("Unknown chain `{0}`")]
    UnknownChain(String),

    #[error("Empty locator in DID `{0}`")]
    EmptyLocator(String),
}

/// Chains the registry understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Ethereum,
    Solana,
    Kaia,
    Local,
}

impl Chain {
    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "ethereum" => Some(Self::Ethereum),
            "solana" => Some(Self::Solana),
            "kaia" => Some(Self::Kaia),
            "local" => Some(Self::Local),
            _ => None,
        }
    }
}

/// A validated agent DID.  Ordered and hashed by its string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String")]
#[serde(into = "String")]
pub struct AgentDid(String);

impl TryFrom<String> for AgentDid {
    type Error = DidError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<AgentDid> for String {
    fn from(did: AgentDid) -> Self {
        did.0
    }
}

impl AgentDid {
    /// Parse and validate `did:sage:<chain>:<locator>`.
    pub fn parse(s: &str) -> Result<Self, DidError> {
        let rest = s
            .strip_prefix(DID_PREFIX)
            .ok_or_else(|| DidError::BadPrefix(s.to_string()))?;
        let (chain_tag, locator) = rest
            .split_once(':')
            .ok_or_else(|| DidError::EmptyLocator(s.to_string()))?;
        Chain::from_tag(chain_tag).ok_or_else(|| DidError::UnknownChain(chain_tag.to_string()))?;
        if locator.is_empty() {
            return Err(DidError::EmptyLocator(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn chain(&self) -> Chain {
        // Validated in `parse`; the tag is always present and known.
        let rest = &self.0[DID_PREFIX.len()..];
        let tag = rest.split(':').next().unwrap_or_default();
        Chain::from_tag(tag).expect("chain tag validated at construction")
    }

    pub fn locator(&self) -> &str {
        let rest = &self.0[DID_PREFIX.len()..];
        rest.split_once(':').map(|(_, l)| l).unwrap_or_default()
    }
}

impl fmt::Display for AgentDid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
