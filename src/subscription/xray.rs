//! VLESS link extraction from Xray-style JSON configs.
//!
//! Walks `outbounds[] → settings.vnext[] → users[]` and builds one
//! [`VlessLink`] per (server, user) pair, sharing the outbound's
//! `streamSettings` across all of them. Outbounds, servers and users are
//! deserialized one element at a time; a malformed element is skipped with a
//! debug log and never hides its siblings.

use serde::{de, Deserialize, Deserializer};
use serde_json::Value;
use tracing::debug;

use super::link::{Security, VlessLink, DEFAULT_NETWORK, DEFAULT_PORT};

/// Display name used when an outbound has no `tag`.
const DEFAULT_TAG: &str = "Server";

/// Top-level config document, borrowed from parsed JSON. Only `outbounds`
/// is read.
#[derive(Debug, Clone, Copy)]
pub struct XrayConfig<'a> {
    /// Raw outbound entries, deserialized one by one so a malformed entry
    /// does not fail the whole document.
    pub outbounds: &'a [Value],
}

/// Outbound header. `settings.vnext` is walked separately so each server and
/// user entry stands on its own.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Outbound {
    #[serde(default)]
    protocol: String,
    tag: Option<String>,
    #[serde(default)]
    stream_settings: StreamSettings,
}

#[derive(Debug, Deserialize)]
struct ServerEntry {
    address: Option<String>,
    #[serde(default, deserialize_with = "lenient_port")]
    port: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct UserEntry {
    id: Option<String>,
    flow: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamSettings {
    network: Option<String>,
    security: Option<String>,
    #[serde(default)]
    reality_settings: RealitySettings,
    #[serde(default)]
    tls_settings: TlsSettings,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RealitySettings {
    public_key: Option<String>,
    short_id: Option<String>,
    server_name: Option<String>,
    fingerprint: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TlsSettings {
    server_name: Option<String>,
    fingerprint: Option<String>,
}

/// Accepts a port as a JSON number or a numeric string. Out-of-range values
/// are errors so the server entry gets skipped.
fn lenient_port<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawPort {
        Number(u64),
        Text(String),
    }

    let port = match Option::<RawPort>::deserialize(deserializer)? {
        None => return Ok(None),
        Some(RawPort::Number(n)) => u16::try_from(n).ok(),
        Some(RawPort::Text(text)) => text.trim().parse::<u16>().ok(),
    };
    match port {
        Some(p) if p > 0 => Ok(Some(p)),
        _ => Err(de::Error::custom("port must be between 1 and 65535")),
    }
}

impl StreamSettings {
    fn security(&self) -> Security {
        let mode = self.security.as_deref().unwrap_or("none");
        match Security::empty_for(mode) {
            Security::Tls { .. } => Security::Tls {
                sni: non_empty(&self.tls_settings.server_name),
                fp: non_empty(&self.tls_settings.fingerprint),
            },
            Security::Reality { .. } => {
                let r = &self.reality_settings;
                Security::Reality {
                    pbk: non_empty(&r.public_key),
                    sid: non_empty(&r.short_id),
                    sni: non_empty(&r.server_name),
                    fp: non_empty(&r.fingerprint),
                }
            }
            other => other,
        }
    }
}

impl<'a> XrayConfig<'a> {
    /// Interpret an already-parsed JSON value as a config document.
    /// Returns `None` when the value is not an object.
    pub fn from_value(value: &'a Value) -> Option<Self> {
        let map = value.as_object()?;
        let outbounds = map
            .get("outbounds")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        Some(Self { outbounds })
    }

    /// All VLESS links, in outbound → server → user order.
    pub fn links(&self) -> Vec<VlessLink> {
        let mut links = Vec::new();

        for (index, raw) in self.outbounds.iter().enumerate() {
            let outbound = match Outbound::deserialize(raw) {
                Ok(o) => o,
                Err(e) => {
                    debug!("skipping outbound #{index}: {e}");
                    continue;
                }
            };
            if outbound.protocol != "vless" {
                continue;
            }

            let security = outbound.stream_settings.security();
            let network = outbound
                .stream_settings
                .network
                .clone()
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| DEFAULT_NETWORK.to_string());
            let name = outbound
                .tag
                .clone()
                .unwrap_or_else(|| DEFAULT_TAG.to_string());

            for raw_server in array_at(raw, "/settings/vnext") {
                let server = match ServerEntry::deserialize(raw_server) {
                    Ok(s) => s,
                    Err(e) => {
                        debug!("skipping server in outbound #{index}: {e}");
                        continue;
                    }
                };
                let Some(address) = server.address.filter(|a| !a.is_empty()) else {
                    debug!("skipping server without address in outbound #{index}");
                    continue;
                };

                for raw_user in array_at(raw_server, "/users") {
                    let user = match UserEntry::deserialize(raw_user) {
                        Ok(u) => u,
                        Err(e) => {
                            debug!("skipping user of {address} in outbound #{index}: {e}");
                            continue;
                        }
                    };
                    let Some(id) = user.id.filter(|id| !id.is_empty()) else {
                        continue;
                    };
                    links.push(VlessLink {
                        id,
                        host: address.clone(),
                        port: server.port.unwrap_or(DEFAULT_PORT),
                        network: network.clone(),
                        flow: non_empty(&user.flow),
                        security: security.clone(),
                        name: Some(name.clone()),
                        extra: Vec::new(),
                    });
                }
            }
        }

        links
    }

    /// Links encoded as canonical URI text.
    pub fn extract_links(&self) -> Vec<String> {
        self.links().iter().map(VlessLink::to_uri).collect()
    }
}

/// Array elements at a JSON pointer; anything that is not an array is empty.
fn array_at<'v>(value: &'v Value, pointer: &str) -> &'v [Value] {
    value
        .pointer(pointer)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_deref().filter(|s| !s.is_empty()).map(str::to_string)
}
