//! Subscription acquisition and decoding.
//!
//! Turns a subscription URL into a list of canonical `vless://` links:
//! [`fetch`] probes the endpoint, [`payload`] detects the payload format,
//! [`xray`] reads Xray JSON configs, and [`link`] encodes and parses links.

pub mod fetch;
pub mod link;
pub mod payload;
pub mod xray;

pub use fetch::{
    convert, url_variants, ExhaustionReport, FetchError, FetchOutcome, FetchSuccess,
    SubscriptionFetcher,
};
pub use link::{LinkError, Security, VlessLink};
pub use payload::{decode_payload, scan_links, DecodeStage, DecodedPayload};
pub use xray::XrayConfig;
