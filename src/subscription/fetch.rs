//! Multi-variant subscription fetcher.
//!
//! Subscription panels answer differently depending on the client they think
//! they are talking to: some return an HTML landing page unless a known
//! client `User-Agent` is sent, some only emit links for a given `format=` or
//! `client=` query. The fetcher walks every (identity, URL variant) pair in
//! order until a payload decodes to at least one link.
//!
//! # Attempt order
//! ```text
//! for identity in identities            (outer)
//!   for url in [base, base?suffix...]   (inner)
//!     GET url with identity's User-Agent
//!       transport error / non-2xx  → next url
//!       HTML page                  → next url
//!       anything else              → payload for this identity, stop inner loop
//!   decode payload
//!     links found → return Found (no further requests)
//!     nothing     → next identity
//! exhausted → Exhausted(report)
//! ```
//!
//! Attempts are strictly sequential, so the worst case latency is
//! `timeout × identities × variants`. Dropping the returned future aborts the
//! in-flight request; no partial results are ever returned.

use std::time::Duration;

use reqwest::header::{ACCEPT, ACCEPT_ENCODING, CONTENT_TYPE, USER_AGENT};
use tracing::{debug, info, warn};

use super::payload::{decode_payload, DecodeStage};
use crate::config::{ClientIdentity, FetchConfig};

/// Errors that stop a conversion before any request is made.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("invalid subscription endpoint '{0}': expected an http(s) URL")]
    InvalidEndpoint(String),
    #[error("invalid fetch configuration: {0}")]
    InvalidConfig(String),
    #[error("failed to build subscription HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// A successful conversion.
#[derive(Debug, Clone)]
pub struct FetchSuccess {
    /// Links in payload order.
    pub links: Vec<String>,
    /// Identity whose request produced the payload.
    pub identity: ClientIdentity,
    /// URL variant that produced the payload.
    pub url: String,
    /// Cascade stage that produced the links.
    pub stage: DecodeStage,
    /// Requests issued, including the successful one.
    pub attempts: usize,
}

/// Tally of an orchestration that found no links.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExhaustionReport {
    /// Requests issued.
    pub attempts: usize,
    /// Requests that failed at the transport level or returned non-2xx.
    pub transport_errors: usize,
    /// Requests answered with an HTML page.
    pub html_pages: usize,
    /// Non-HTML payloads that contained no links.
    pub empty_payloads: usize,
}

impl ExhaustionReport {
    /// True when no request reached a usable response at all, meaning the
    /// endpoint is unreachable rather than empty.
    pub fn is_unreachable(&self) -> bool {
        self.attempts > 0 && self.transport_errors == self.attempts
    }
}

/// Outcome of [`SubscriptionFetcher::fetch`].
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Found(FetchSuccess),
    Exhausted(ExhaustionReport),
}

impl FetchOutcome {
    pub fn links(&self) -> &[String] {
        match self {
            Self::Found(success) => &success.links,
            Self::Exhausted(_) => &[],
        }
    }

    pub fn into_links(self) -> Vec<String> {
        match self {
            Self::Found(success) => success.links,
            Self::Exhausted(_) => Vec::new(),
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }
}

/// Classification of a single HTTP attempt.
enum Attempt {
    /// A non-HTML body.
    Payload(String),
    /// An HTML page, i.e. the wrong variant for this panel.
    Html,
    /// Transport failure or non-2xx status.
    Failed,
}

/// Fetches a subscription by probing identity and URL variants in order.
pub struct SubscriptionFetcher {
    client: reqwest::Client,
    config: FetchConfig,
}

impl SubscriptionFetcher {
    /// Build a fetcher with its own HTTP client.
    ///
    /// The client bypasses system proxy settings: subscription endpoints are
    /// expected to be reachable directly, and the proxy being configured may
    /// be the very thing this subscription describes.
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        config
            .validate()
            .map_err(|e| FetchError::InvalidConfig(e.to_string()))?;

        let client = reqwest::Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs.max(1)))
            .build()?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Fetch `endpoint` and return the first non-empty set of links.
    pub async fn fetch(&self, endpoint: &str) -> Result<FetchOutcome, FetchError> {
        let endpoint = endpoint.trim();
        validate_endpoint(endpoint)?;

        let variants = url_variants(endpoint, &self.config.url_suffixes);
        let mut report = ExhaustionReport::default();

        for identity in &self.config.identities {
            debug!(
                "trying client '{}' (User-Agent: {})",
                identity.name, identity.user_agent
            );

            let Some((url, body)) = self.first_payload(&variants, identity, &mut report).await
            else {
                continue;
            };

            let decoded = decode_payload(&body);
            if decoded.is_empty() {
                debug!(
                    "payload from {url} as '{}' has no vless links ({} bytes)",
                    identity.name,
                    body.len()
                );
                report.empty_payloads += 1;
                continue;
            }

            let stage = decoded.stage();
            let links = decoded.into_links();
            info!(
                "found {} links via client '{}' at {url} ({stage})",
                links.len(),
                identity.name
            );
            return Ok(FetchOutcome::Found(FetchSuccess {
                links,
                identity: identity.clone(),
                url,
                stage,
                attempts: report.attempts,
            }));
        }

        warn!(
            "no vless links found at {endpoint} after {} attempts ({} transport errors, {} HTML pages, {} empty payloads)",
            report.attempts, report.transport_errors, report.html_pages, report.empty_payloads
        );
        Ok(FetchOutcome::Exhausted(report))
    }

    /// Walk URL variants for one identity until a non-HTML body arrives.
    async fn first_payload(
        &self,
        variants: &[String],
        identity: &ClientIdentity,
        report: &mut ExhaustionReport,
    ) -> Option<(String, String)> {
        for url in variants {
            report.attempts += 1;
            match self.attempt(url, identity).await {
                Attempt::Payload(body) => return Some((url.clone(), body)),
                Attempt::Html => report.html_pages += 1,
                Attempt::Failed => report.transport_errors += 1,
            }
        }
        None
    }

    async fn attempt(&self, url: &str, identity: &ClientIdentity) -> Attempt {
        let resp = match self
            .client
            .get(url)
            .header(USER_AGENT, &identity.user_agent)
            .header(ACCEPT, "*/*")
            .header(ACCEPT_ENCODING, "identity")
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                if e.is_timeout() {
                    warn!("subscription fetch timed out: {url}");
                } else if e.is_connect() {
                    warn!("failed to connect to subscription URL: {url}: {e}");
                } else {
                    warn!("subscription fetch failed: {url}: {e}");
                }
                return Attempt::Failed;
            }
        };

        let status = resp.status();
        if !status.is_success() {
            warn!("subscription returned HTTP {status}: {url}");
            return Attempt::Failed;
        }

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        let bytes = match resp.bytes().await {
            Ok(b) => b,
            Err(e) => {
                warn!("failed to read subscription response body from {url}: {e}");
                return Attempt::Failed;
            }
        };
        let body = String::from_utf8_lossy(&bytes).into_owned();

        if is_html(&content_type, &body) {
            debug!("got an HTML page from {url}, trying next variant");
            return Attempt::Html;
        }

        debug!("received {} bytes from {url}", bytes.len());
        Attempt::Payload(body)
    }
}

/// Convert a subscription URL into `vless://` links using the default
/// fetch strategy. Any failure, including an invalid endpoint, yields an
/// empty list.
pub async fn convert(endpoint: &str) -> Vec<String> {
    let fetcher = match SubscriptionFetcher::new(FetchConfig::default()) {
        Ok(f) => f,
        Err(e) => {
            warn!("{e}");
            return Vec::new();
        }
    };
    match fetcher.fetch(endpoint).await {
        Ok(outcome) => outcome.into_links(),
        Err(e) => {
            warn!("{e}");
            Vec::new()
        }
    }
}

fn validate_endpoint(endpoint: &str) -> Result<(), FetchError> {
    match reqwest::Url::parse(endpoint) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.host().is_some() => Ok(()),
        _ => Err(FetchError::InvalidEndpoint(endpoint.to_string())),
    }
}

/// The base URL followed by one variant per suffix. A suffix is joined with
/// `&` when the base already carries a query string.
pub fn url_variants(base: &str, suffixes: &[String]) -> Vec<String> {
    let separator = if base.contains('?') { '&' } else { '?' };
    std::iter::once(base.to_string())
        .chain(suffixes.iter().map(|suffix| {
            let suffix = suffix.trim_start_matches(['?', '&']);
            format!("{base}{separator}{suffix}")
        }))
        .collect()
}

/// HTML landing pages are served as `text/html` or start with a document
/// signature regardless of the declared content type.
fn is_html(content_type: &str, body: &str) -> bool {
    if content_type.contains("text/html") {
        return true;
    }
    let head: String = body.trim_start().chars().take(9).collect();
    let head = head.to_ascii_lowercase();
    head.starts_with("<!doctype") || head.starts_with("<html")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suffixes() -> Vec<String> {
        FetchConfig::default().url_suffixes
    }

    #[test]
    fn url_variants_default_order() {
        assert_eq!(
            url_variants("https://panel.example/sub/abc", &suffixes()),
            [
                "https://panel.example/sub/abc",
                "https://panel.example/sub/abc?format=base64",
                "https://panel.example/sub/abc?client=v2ray",
                "https://panel.example/sub/abc?client=clash",
            ]
        );
    }

    #[test]
    fn url_variants_extend_existing_query() {
        let variants = url_variants("https://p.example/sub?token=x", &["?format=base64".into()]);
        assert_eq!(
            variants,
            ["https://p.example/sub?token=x", "https://p.example/sub?token=x&format=base64"]
        );
    }

    #[test]
    fn url_variants_without_suffixes() {
        assert_eq!(url_variants("http://h/s", &[]), ["http://h/s"]);
    }

    #[test]
    fn html_detected_by_content_type() {
        assert!(is_html("text/html; charset=utf-8", "dmxlc3M6Ly8="));
    }

    #[test]
    fn html_detected_by_signature() {
        assert!(is_html("text/plain", "\n  <!DOCTYPE html><html></html>"));
        assert!(is_html("", "<html lang=\"en\">"));
        assert!(is_html("", "<!doctype html>"));
        assert!(!is_html("text/plain", "vless://a@b:1"));
        assert!(!is_html("application/json", "{\"outbounds\": []}"));
    }

    #[test]
    fn endpoint_validation() {
        assert!(validate_endpoint("https://panel.example/sub/abc").is_ok());
        assert!(validate_endpoint("http://127.0.0.1:8080/s").is_ok());
        assert!(matches!(
            validate_endpoint("ftp://panel.example/sub"),
            Err(FetchError::InvalidEndpoint(_))
        ));
        assert!(validate_endpoint("not a url").is_err());
        assert!(validate_endpoint("").is_err());
    }

    #[test]
    fn exhaustion_report_unreachable() {
        let report = ExhaustionReport {
            attempts: 4,
            transport_errors: 4,
            ..Default::default()
        };
        assert!(report.is_unreachable());

        let report = ExhaustionReport {
            attempts: 4,
            transport_errors: 3,
            html_pages: 1,
            ..Default::default()
        };
        assert!(!report.is_unreachable());
        assert!(!ExhaustionReport::default().is_unreachable());
    }

    #[test]
    fn new_rejects_invalid_config() {
        let config = FetchConfig {
            identities: Vec::new(),
            ..FetchConfig::default()
        };
        assert!(matches!(
            SubscriptionFetcher::new(config),
            Err(FetchError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn fetch_rejects_non_http_endpoint() {
        let fetcher = SubscriptionFetcher::new(FetchConfig::default()).unwrap();
        let err = fetcher.fetch("vless://abc@host:443").await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidEndpoint(_)));
    }

    #[tokio::test]
    async fn convert_invalid_endpoint_is_empty() {
        assert!(convert("not-a-url").await.is_empty());
    }
}
