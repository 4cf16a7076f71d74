use anyhow::bail;
use serde::{Deserialize, Serialize};

/// Top-level configuration file (`config.toml`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub fetch: FetchConfig,
}

impl Config {
    /// Validate the config after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.fetch.validate()
    }
}

/// A client identity presented to the subscription server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientIdentity {
    /// Short label used in logs and results (e.g. `v2rayng`).
    pub name: String,
    /// Value sent as the `User-Agent` header.
    pub user_agent: String,
}

impl ClientIdentity {
    pub fn new(name: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            user_agent: user_agent.into(),
        }
    }
}

/// Fetch strategy: which identities and URL variants to try, and how long
/// to wait for each attempt.
///
/// Identities are the outer loop and URL variants the inner one. The base
/// URL is always tried first, followed by one variant per `url_suffixes`
/// entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// TCP connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Client identities in priority order.
    pub identities: Vec<ClientIdentity>,
    /// Query strings appended to the base URL, in priority order
    /// (e.g. `format=base64`).
    pub url_suffixes: Vec<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            connect_timeout_secs: 5,
            identities: default_identities(),
            url_suffixes: vec![
                "format=base64".into(),
                "client=v2ray".into(),
                "client=clash".into(),
            ],
        }
    }
}

impl FetchConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.timeout_secs == 0 {
            bail!("'fetch.timeout_secs' must be greater than zero");
        }
        if self.identities.is_empty() {
            bail!("'fetch.identities' must not be empty");
        }
        for identity in &self.identities {
            if identity.name.trim().is_empty() {
                bail!("every fetch identity needs a non-empty 'name'");
            }
            if identity.user_agent.trim().is_empty() {
                bail!("fetch identity '{}' has an empty 'user_agent'", identity.name);
            }
        }
        if let Some(bad) = self.url_suffixes.iter().find(|s| s.trim().is_empty()) {
            bail!("'fetch.url_suffixes' contains an empty entry: {bad:?}");
        }
        Ok(())
    }
}

fn default_identities() -> Vec<ClientIdentity> {
    vec![
        ClientIdentity::new("clash", "clash-verge/v1.3.8"),
        ClientIdentity::new("v2rayng", "v2rayNG/1.8.5"),
        ClientIdentity::new("hiddify", "Hiddify/2.0.5"),
        ClientIdentity::new("shadowrocket", "Shadowrocket/1.0"),
        ClientIdentity::new("v2rayn", "v2rayN/6.23"),
        ClientIdentity::new("generic", "clash-meta"),
    ]
}
