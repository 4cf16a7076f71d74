//! `vless://` link codec.
//!
//! Encodes a [`VlessLink`] into its canonical URI text and parses URI text
//! back. Encoding is deterministic: the same link always yields byte-identical
//! text, since downstream consumers dedupe and diff raw URIs.
//!
//! Parsing is strict about structure (scheme, `@` separator, port) and
//! permissive about vocabulary: unknown query keys are kept as extension
//! parameters and unknown security modes pass through by name.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// URI scheme prefix for VLESS links.
pub const VLESS_SCHEME: &str = "vless://";

/// Port used when a link or config entry does not declare one.
pub const DEFAULT_PORT: u16 = 443;

/// Network type used when none is declared.
pub const DEFAULT_NETWORK: &str = "tcp";

/// Errors produced while parsing a single link.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    #[error("link does not start with vless://")]
    MissingScheme,
    #[error("link has no '@' between credential and host")]
    MissingSeparator,
    #[error("link has an empty identifier")]
    EmptyIdentifier,
    #[error("link has an empty host")]
    EmptyHost,
    #[error("invalid port '{0}'")]
    InvalidPort(String),
}

/// Transport security of a link with its mode-specific parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum Security {
    #[default]
    None,
    Tls {
        #[serde(skip_serializing_if = "Option::is_none")]
        sni: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        fp: Option<String>,
    },
    Reality {
        #[serde(skip_serializing_if = "Option::is_none")]
        pbk: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        sid: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        sni: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        fp: Option<String>,
    },
    /// A mode this codec has no parameter vocabulary for. Its parameters
    /// travel in [`VlessLink::extra`].
    Other { name: String },
}

impl Security {
    /// Mode name as it appears in the `security=` parameter.
    pub fn mode(&self) -> &str {
        match self {
            Self::None => "none",
            Self::Tls { .. } => "tls",
            Self::Reality { .. } => "reality",
            Self::Other { name } => name.as_str(),
        }
    }

    /// Build an empty parameter set for a mode name.
    pub fn empty_for(mode: &str) -> Self {
        match mode {
            "" | "none" => Self::None,
            "tls" => Self::Tls { sni: None, fp: None },
            "reality" => Self::Reality {
                pbk: None,
                sid: None,
                sni: None,
                fp: None,
            },
            other => Self::Other {
                name: other.to_string(),
            },
        }
    }

    /// Mode parameters in their fixed output order, absent ones skipped.
    fn params(&self) -> Vec<(&'static str, &str)> {
        let pairs: Vec<(&'static str, Option<&String>)> = match self {
            Self::None | Self::Other { .. } => Vec::new(),
            Self::Tls { sni, fp } => vec![("sni", sni.as_ref()), ("fp", fp.as_ref())],
            Self::Reality { pbk, sid, sni, fp } => vec![
                ("pbk", pbk.as_ref()),
                ("sid", sid.as_ref()),
                ("sni", sni.as_ref()),
                ("fp", fp.as_ref()),
            ],
        };
        pairs
            .into_iter()
            .filter_map(|(k, v)| v.filter(|s| !s.is_empty()).map(|s| (k, s.as_str())))
            .collect()
    }

    /// Slot for a mode parameter key, if the key belongs to this mode.
    fn slot_mut(&mut self, key: &str) -> Option<&mut Option<String>> {
        match (self, key) {
            (Self::Tls { sni, .. } | Self::Reality { sni, .. }, "sni") => Some(sni),
            (Self::Tls { fp, .. } | Self::Reality { fp, .. }, "fp") => Some(fp),
            (Self::Reality { pbk, .. }, "pbk") => Some(pbk),
            (Self::Reality { sid, .. }, "sid") => Some(sid),
            _ => None,
        }
    }
}

/// A single VLESS connection descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VlessLink {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub network: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow: Option<String>,
    pub security: Security,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Query parameters this codec does not interpret, in input order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extra: Vec<(String, String)>,
}

impl VlessLink {
    /// Create a plain TCP link with no security.
    pub fn new(id: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            id: id.into(),
            host: host.into(),
            port,
            network: DEFAULT_NETWORK.to_string(),
            flow: None,
            security: Security::None,
            name: None,
            extra: Vec::new(),
        }
    }

    /// Parse URI text into a link.
    pub fn parse(text: &str) -> Result<Self, LinkError> {
        let rest = text.strip_prefix(VLESS_SCHEME).ok_or(LinkError::MissingScheme)?;

        let (rest, fragment) = match rest.split_once('#') {
            Some((head, frag)) => (head, Some(frag)),
            None => (rest, None),
        };
        let (authority, query) = match rest.split_once('?') {
            Some((head, q)) => (head, Some(q)),
            None => (rest, None),
        };

        let (id, server) = authority
            .split_once('@')
            .ok_or(LinkError::MissingSeparator)?;
        if id.is_empty() {
            return Err(LinkError::EmptyIdentifier);
        }

        let (host, port) = match server.rsplit_once(':') {
            Some((host, port)) => (host, parse_port(port)?),
            None => (server, DEFAULT_PORT),
        };
        if host.is_empty() {
            return Err(LinkError::EmptyHost);
        }

        let pairs = query.map(parse_query).unwrap_or_default();

        let mut network = None;
        let mut flow = None;
        let mut mode = String::new();
        for (key, value) in &pairs {
            match key.as_str() {
                "type" => network = Some(value.clone()),
                "flow" => flow = Some(value.clone()),
                "security" => mode = value.clone(),
                _ => {}
            }
        }
        let mut security = Security::empty_for(&mode);

        let mut extra = Vec::new();
        for (key, value) in pairs {
            if matches!(key.as_str(), "encryption" | "type" | "flow" | "security") {
                continue;
            }
            match security.slot_mut(&key) {
                Some(slot) => *slot = non_empty(value),
                None => extra.push((key, value)),
            }
        }

        Ok(Self {
            id: id.to_string(),
            host: host.to_string(),
            port,
            network: network
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| DEFAULT_NETWORK.to_string()),
            flow: flow.and_then(non_empty),
            security,
            name: fragment.map(percent_decode).and_then(non_empty),
            extra,
        })
    }

    /// Encode the link in canonical form.
    pub fn to_uri(&self) -> String {
        let mut params: Vec<(&str, &str)> =
            vec![("encryption", "none"), ("type", self.network.as_str())];
        if let Some(flow) = self.flow.as_deref().filter(|f| !f.is_empty()) {
            params.push(("flow", flow));
        }
        params.push(("security", self.security.mode()));
        params.extend(self.security.params());
        params.extend(self.extra.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        let query = params
            .iter()
            .map(|(k, v)| format!("{k}={}", encode_component(v)))
            .collect::<Vec<_>>()
            .join("&");
        let name = self.name.as_deref().unwrap_or_default();

        format!(
            "{VLESS_SCHEME}{}@{}:{}?{query}#{}",
            self.id,
            self.host,
            self.port,
            encode_component(name)
        )
    }
}

impl fmt::Display for VlessLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_uri())
    }
}

impl FromStr for VlessLink {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn parse_port(raw: &str) -> Result<u16, LinkError> {
    match raw.parse::<u16>() {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(LinkError::InvalidPort(raw.to_string())),
    }
}

/// Split a query string into ordered, percent-decoded pairs.
/// Segments without `=` are ignored.
fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter_map(|segment| segment.split_once('='))
        .map(|(k, v)| (k.to_string(), percent_decode(v)))
        .collect()
}

/// Percent-encode a parameter value or name. `/` stays literal so paths and
/// tags like `RU/Moscow` keep the byte form other converters emit.
fn encode_component(raw: &str) -> String {
    urlencoding::encode(raw).replace("%2F", "/")
}

fn percent_decode(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}
