use log::{debug, info};
use regex::Regex;
use reqwest::Url;
use std::collections::HashSet;
use std::sync::LazyLock;
use thiserror::Error;

pub const DEFAULT_INDEX_URL: &str = "https://database.lichess.org/";
pub const DEFAULT_YEARS: [&str; 2] = ["2024", "2025"];

static ANCHOR_HREF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\b[^>]*?\bhref\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#)
        .expect("valid anchor href regex")
});

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("invalid index URL '{url}': {reason}")]
    InvalidBase { url: String, reason: String },

    #[error("failed to fetch index '{url}': {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// All `href` values of anchor elements, in document order.
pub fn anchor_hrefs(html: &str) -> Vec<&str> {
    ANCHOR_HREF_RE
        .captures_iter(html)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3)))
        .map(|m| m.as_str().trim())
        .collect()
}

pub fn is_standard_archive(href: &str, years: &[String]) -> bool {
    href.contains("standard/")
        && href.contains(".pgn.zst")
        && !href.contains("torrent")
        && (years.is_empty() || years.iter().any(|year| href.contains(year.as_str())))
}

/// Archive links of the index page, resolved against `base_url`, first occurrence wins.
pub fn filter_archive_links(
    html: &str,
    base_url: &str,
    years: &[String],
) -> Result<Vec<String>, LinkError> {
    let base = Url::parse(base_url).map_err(|e| LinkError::InvalidBase {
        url: base_url.to_string(),
        reason: e.to_string(),
    })?;

    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for href in anchor_hrefs(html) {
        if !is_standard_archive(href, years) {
            continue;
        }
        let absolute = match base.join(href) {
            Ok(url) => url.to_string(),
            Err(e) => {
                debug!("skipping unresolvable href '{}': {}", href, e);
                continue;
            }
        };
        if seen.insert(absolute.clone()) {
            links.push(absolute);
        }
    }
    Ok(links)
}

/// Fetches the index page once and returns the matching archive URLs.
pub fn discover_links(
    client: &reqwest::blocking::Client,
    base_url: &str,
    years: &[String],
) -> Result<Vec<String>, LinkError> {
    let fetch_err = |source: reqwest::Error| LinkError::Fetch {
        url: base_url.to_string(),
        source,
    };
    let html = client
        .get(base_url)
        .send()
        .and_then(|response| response.error_for_status())
        .and_then(|response| response.text())
        .map_err(fetch_err)?;

    let links = filter_archive_links(&html, base_url, years)?;
    info!("found {} archive link(s) at {}", links.len(), base_url);
    Ok(links)
}
