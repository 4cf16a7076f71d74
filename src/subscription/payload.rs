//! Subscription payload format detection.
//!
//! A payload is tried as an Xray JSON config, then as a base64 blob, then as
//! free text. The first stage that yields at least one link wins and its
//! output is returned alone; stages are never mixed.

use std::fmt;
use std::sync::OnceLock;

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use super::xray::XrayConfig;

/// Standard alphabet, accepting payloads with or without `=` padding.
const SUBSCRIPTION_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Which cascade stage produced the links.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStage {
    StructuredConfig,
    EncodedText,
    PlainText,
    Empty,
}

impl fmt::Display for DecodeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StructuredConfig => write!(f, "structured-config"),
            Self::EncodedText => write!(f, "encoded-text"),
            Self::PlainText => write!(f, "plain-text"),
            Self::Empty => write!(f, "empty"),
        }
    }
}

/// Result of one decode pass over a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedPayload {
    /// Links built from an Xray config document.
    StructuredConfig(Vec<String>),
    /// Links found in the base64-decoded payload.
    EncodedText(Vec<String>),
    /// Links found in the raw payload text.
    PlainText(Vec<String>),
    /// No stage produced a link.
    Empty,
}

impl DecodedPayload {
    pub fn stage(&self) -> DecodeStage {
        match self {
            Self::StructuredConfig(_) => DecodeStage::StructuredConfig,
            Self::EncodedText(_) => DecodeStage::EncodedText,
            Self::PlainText(_) => DecodeStage::PlainText,
            Self::Empty => DecodeStage::Empty,
        }
    }

    pub fn links(&self) -> &[String] {
        match self {
            Self::StructuredConfig(links) | Self::EncodedText(links) | Self::PlainText(links) => {
                links
            }
            Self::Empty => &[],
        }
    }

    pub fn into_links(self) -> Vec<String> {
        match self {
            Self::StructuredConfig(links) | Self::EncodedText(links) | Self::PlainText(links) => {
                links
            }
            Self::Empty => Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.links().is_empty()
    }
}

/// Run the full detection cascade over `raw`.
pub fn decode_payload(raw: &str) -> DecodedPayload {
    let links = from_structured_config(raw);
    if !links.is_empty() {
        debug!("extracted {} links from JSON config", links.len());
        return DecodedPayload::StructuredConfig(links);
    }

    if let Some(text) = decode_base64_text(raw) {
        let links = scan_links(&text);
        if !links.is_empty() {
            debug!("found {} links in base64 payload", links.len());
            return DecodedPayload::EncodedText(links);
        }
    }

    let links = scan_links(raw);
    if links.is_empty() {
        debug!("payload contains no vless links");
        DecodedPayload::Empty
    } else {
        debug!("found {} links in plain text", links.len());
        DecodedPayload::PlainText(links)
    }
}

/// Find every `vless://` link embedded in free text, in order of occurrence.
pub fn scan_links(text: &str) -> Vec<String> {
    static LINK_PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern =
        LINK_PATTERN.get_or_init(|| Regex::new(r#"vless://[^\s<>"'\)]+"#).expect("regex"));
    pattern
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Stage 1: a JSON object with `outbounds`/`inbounds`, or an array of such
/// objects. Anything else yields nothing.
fn from_structured_config(raw: &str) -> Vec<String> {
    let value: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(_) => return Vec::new(),
    };

    match &value {
        Value::Object(map) if map.contains_key("outbounds") || map.contains_key("inbounds") => {
            XrayConfig::from_value(&value)
                .map(|cfg| cfg.extract_links())
                .unwrap_or_default()
        }
        Value::Array(items) => items
            .iter()
            .filter_map(XrayConfig::from_value)
            .flat_map(|cfg| cfg.extract_links())
            .collect(),
        _ => Vec::new(),
    }
}

/// Stage 2: the whole payload as one base64 blob of UTF-8 text.
fn decode_base64_text(raw: &str) -> Option<String> {
    let compact: String = raw.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = SUBSCRIPTION_BASE64.decode(compact.as_bytes()).ok()?;
    String::from_utf8(bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;

    const SAMPLE: &str =
        "vless://11111111-1111-1111-1111-111111111111@1.2.3.4:443?encryption=none#Test";

    fn xray_json() -> String {
        serde_json::json!({
            "outbounds": [{
                "tag": "json",
                "protocol": "vless",
                "settings": {"vnext": [{"address": "j.example", "port": 443, "users": [{"id": "abc"}]}]}
            }]
        })
        .to_string()
    }

    #[test]
    fn structured_config_wins() {
        let decoded = decode_payload(&xray_json());
        assert_eq!(decoded.stage(), DecodeStage::StructuredConfig);
        assert_eq!(
            decoded.links(),
            ["vless://abc@j.example:443?encryption=none&type=tcp&security=none#json"]
        );
    }

    #[test]
    fn structured_config_array_concatenates_items() {
        let item = serde_json::from_str::<Value>(&xray_json()).unwrap();
        let payload = serde_json::json!([item, "skip-me", item]).to_string();
        let decoded = decode_payload(&payload);
        assert_eq!(decoded.stage(), DecodeStage::StructuredConfig);
        assert_eq!(decoded.links().len(), 2);
    }

    #[test]
    fn json_without_links_falls_through_to_text() {
        let payload = format!(r#"{{"outbounds": [], "note": "{SAMPLE}"}}"#);
        let decoded = decode_payload(&payload);
        assert_eq!(decoded, DecodedPayload::PlainText(vec![SAMPLE.to_string()]));
    }

    #[test]
    fn encoded_text_extraction() {
        let encoded = STANDARD.encode(format!("noise {SAMPLE} noise"));
        let decoded = decode_payload(&encoded);
        assert_eq!(decoded, DecodedPayload::EncodedText(vec![SAMPLE.to_string()]));
    }

    #[test]
    fn encoded_text_tolerates_line_wrapping_and_missing_padding() {
        let encoded = STANDARD.encode(format!("{SAMPLE}\n{SAMPLE}2\n"));
        let unpadded = encoded.trim_end_matches('=');
        let (head, tail) = unpadded.split_at(20);
        let wrapped = format!("{head}\r\n{tail}\n");
        let decoded = decode_payload(&wrapped);
        assert_eq!(decoded.stage(), DecodeStage::EncodedText);
        assert_eq!(decoded.links().len(), 2);
    }

    #[test]
    fn plain_text_boundary() {
        let decoded = decode_payload("see vless://abc@host:443?x=1 and more");
        assert_eq!(
            decoded,
            DecodedPayload::PlainText(vec!["vless://abc@host:443?x=1".to_string()])
        );
    }

    #[test]
    fn scan_stops_at_quotes_and_brackets() {
        let text = r#"<a href="vless://a@b:1?x=1">link</a> 'vless://c@d:2' (vless://e@f:3)"#;
        assert_eq!(
            scan_links(text),
            vec!["vless://a@b:1?x=1", "vless://c@d:2", "vless://e@f:3"]
        );
    }

    #[test]
    fn scan_keeps_occurrence_order() {
        let text = "vless://z@z:1\nvless://a@a:1\nvless://z@z:1";
        assert_eq!(
            scan_links(text),
            vec!["vless://z@z:1", "vless://a@a:1", "vless://z@z:1"]
        );
    }

    #[test]
    fn empty_payload_is_empty() {
        assert_eq!(decode_payload(""), DecodedPayload::Empty);
        assert_eq!(decode_payload("hello world"), DecodedPayload::Empty);
        assert!(decode_payload("{}").is_empty());
        assert!(DecodedPayload::Empty.into_links().is_empty());
    }

    #[test]
    fn invalid_utf8_base64_falls_through() {
        let encoded = STANDARD.encode([0xff, 0xfe, 0xfd]);
        assert_eq!(decode_payload(&encoded), DecodedPayload::Empty);
    }
}
