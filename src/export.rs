//! Saved conversion output for `convert --output`.
//!
//! The file lists every link as-is, numbered, followed by a pretty JSON
//! array of the links that parse. Links that fail to parse stay in the
//! numbered list and are left out of the JSON.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::subscription::VlessLink;

/// Marker line that precedes the JSON dump.
pub const JSON_SECTION: &str = "# Detailed JSON Format:";

/// Render the output document.
pub fn render(source: &str, links: &[String]) -> Result<String> {
    let parsed: Vec<VlessLink> = links
        .iter()
        .filter_map(|link| match VlessLink::parse(link) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                debug!("leaving unparsable link out of JSON dump: {e}");
                None
            }
        })
        .collect();

    let mut out = String::new();
    writeln!(out, "# VLESS keys from {source}")?;
    writeln!(out, "# Total: {} keys", links.len())?;
    out.push('\n');
    for (i, link) in links.iter().enumerate() {
        writeln!(out, "# Key {}", i + 1)?;
        writeln!(out, "{link}")?;
        out.push('\n');
    }
    writeln!(out, "\n{JSON_SECTION}")?;
    out.push_str(&serde_json::to_string_pretty(&parsed)?);
    out.push('\n');
    Ok(out)
}

/// Write the output document to `path`, replacing any existing file.
pub fn save(path: &Path, source: &str, links: &[String]) -> Result<()> {
    let document = render(source, links)?;
    std::fs::write(path, document)
        .with_context(|| format!("failed to write {}", path.display()))?;
    info!("saved {} links to {}", links.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use tempfile::TempDir;

    const GOOD: &str = "vless://abc@h.example:8443?encryption=none&type=tcp&security=tls&sni=s.example#RU/Moscow";

    #[test]
    fn save_writes_numbered_links_and_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("keys.txt");
        let links = vec![GOOD.to_string(), "vless://missing-separator".to_string()];

        save(&path, "https://panel.example/sub", &links).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();

        assert!(content.starts_with("# VLESS keys from https://panel.example/sub\n# Total: 2 keys\n"));
        assert!(content.contains(&format!("# Key 1\n{GOOD}\n")));
        assert!(content.contains("# Key 2\nvless://missing-separator\n"));

        let (_, json) = content.split_once(JSON_SECTION).unwrap();
        let dump: Value = serde_json::from_str(json.trim()).unwrap();
        let entries = dump.as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["host"], "h.example");
        assert_eq!(entries[0]["port"], 8443);
        assert_eq!(entries[0]["name"], "RU/Moscow");
        assert_eq!(entries[0]["security"]["mode"], "tls");
        assert_eq!(entries[0]["security"]["sni"], "s.example");
    }

    #[test]
    fn save_overwrites_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("keys.txt");
        std::fs::write(&path, "stale").unwrap();

        save(&path, "src", &[]).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(!content.contains("stale"));
        assert!(content.contains("# Total: 0 keys"));
        assert!(content.trim_end().ends_with("[]"));
    }

    #[test]
    fn save_into_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nope").join("keys.txt");
        let err = save(&path, "src", &[GOOD.to_string()]).unwrap_err();
        assert!(err.to_string().contains("failed to write"));
    }
}
