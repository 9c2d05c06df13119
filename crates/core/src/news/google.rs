use crate::news::{normalize_title, NewsItem, NewsSource};
use anyhow::{Context, Result};
use reqwest::Url;
use std::collections::HashSet;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://news.google.com/rss/search";
const DEFAULT_TIMEOUT_SECS: u64 = 20;
const DEFAULT_PER_QUERY: usize = 10;

const DEFAULT_QUERIES: [&str; 4] = [
    "\"Borsa İstanbul\" OR BIST OR \"BIST 100\"",
    "KAP OR \"Kamuyu Aydınlatma Platformu\"",
    "SPK OR \"Sermaye Piyasası Kurulu\"",
    "temettü OR bedelsiz OR \"pay geri alım\" OR \"sermaye artırımı\"",
];

const TRACKING_PARAMS: [&str; 6] = [
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "oc",
];

#[derive(Debug, Clone)]
pub struct GoogleNewsClient {
    http: reqwest::Client,
    base_url: String,
    queries: Vec<String>,
    per_query: usize,
}

impl GoogleNewsClient {
    pub fn from_env() -> Result<Self> {
        let base_url =
            std::env::var("NEWS_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let per_query = std::env::var("NEWS_PER_QUERY")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(DEFAULT_PER_QUERY);
        let timeout_secs = std::env::var("NEWS_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build news http client")?;

        Ok(Self {
            http,
            base_url,
            queries: DEFAULT_QUERIES.iter().map(|q| q.to_string()).collect(),
            per_query,
        })
    }

    async fn fetch_query(&self, query: &str) -> Result<Vec<NewsItem>> {
        let res = self
            .http
            .get(&self.base_url)
            .query(&[("q", query), ("hl", "tr"), ("gl", "TR"), ("ceid", "TR:tr")])
            .send()
            .await
            .context("news request failed")?;

        let status = res.status();
        anyhow::ensure!(status.is_success(), "news feed HTTP {status}");
        let body = res.text().await.context("failed to read news feed body")?;

        Ok(parse_rss_items(&body)
            .into_iter()
            .take(self.per_query)
            .collect())
    }
}

#[async_trait::async_trait]
impl NewsSource for GoogleNewsClient {
    fn source_name(&self) -> &'static str {
        "google_news_rss"
    }

    async fn fetch_news(&self) -> Result<Vec<NewsItem>> {
        let mut items = Vec::new();
        for query in &self.queries {
            match self.fetch_query(query).await {
                Ok(batch) => items.extend(batch),
                Err(err) => {
                    tracing::warn!(query = %query, error = %err, "news query failed; skipping");
                }
            }
        }

        let mut seen = HashSet::new();
        items.retain(|it| seen.insert(normalize_title(&it.title)));
        Ok(items)
    }
}

/// Best-effort extraction of `<item>` title/link pairs. Items missing either are dropped.
pub fn parse_rss_items(xml: &str) -> Vec<NewsItem> {
    let mut out = Vec::new();
    let mut rest = xml;
    while let Some(start) = rest.find("<item") {
        let after = &rest[start..];
        let Some(end) = after.find("</item>") else {
            break;
        };
        let block = &after[..end];
        rest = &after[end + "</item>".len()..];

        let title = tag_text(block, "title").map(|t| t.trim().to_string());
        let link = tag_text(block, "link").map(|l| normalize_url(l.trim()));
        match (title, link) {
            (Some(title), Some(link)) if !title.is_empty() && !link.is_empty() => {
                out.push(NewsItem { title, link });
            }
            _ => {}
        }
    }
    out
}

fn tag_text(block: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}");
    let close = format!("</{tag}>");
    let start = block.find(&open)?;
    let after_open = &block[start..];
    let body_start = after_open.find('>')? + 1;
    let body = &after_open[body_start..];
    let end = body.find(&close)?;
    let raw = body[..end].trim();

    let raw = raw
        .strip_prefix("<![CDATA[")
        .and_then(|s| s.strip_suffix("]]>"))
        .unwrap_or(raw);
    Some(unescape_xml(raw))
}

fn unescape_xml(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Drops tracking query parameters; unparseable links are returned unchanged.
pub fn normalize_url(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw) else {
        return raw.to_string();
    };
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !TRACKING_PARAMS.iter().any(|p| *p == *k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_items_with_cdata_and_entities() {
        let xml = r#"<?xml version="1.0"?><rss><channel><title>feed</title>
            <item><title><![CDATA[THYAO &amp; PGSUS rally]]></title><link>https://x.test/a?utm_source=g&amp;id=7</link></item>
            <item><title>No link here</title></item>
            <item><title>Second &amp; last</title><link>https://x.test/b</link></item>
            </channel></rss>"#;

        let items = parse_rss_items(xml);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "THYAO & PGSUS rally");
        assert_eq!(items[0].link, "https://x.test/a?id=7");
        assert_eq!(items[1].title, "Second & last");
    }

    #[test]
    fn channel_title_is_not_an_item() {
        let xml = "<rss><channel><title>Only channel</title></channel></rss>";
        assert!(parse_rss_items(xml).is_empty());
    }

    #[test]
    fn strips_tracking_params_only() {
        assert_eq!(
            normalize_url("https://x.test/p?utm_medium=rss&oc=5"),
            "https://x.test/p"
        );
        assert_eq!(
            normalize_url("https://x.test/p?a=1&utm_term=z&b=2"),
            "https://x.test/p?a=1&b=2"
        );
        assert_eq!(normalize_url("not a url"), "not a url");
    }
}
