use crate::domain::quote::Quote;
use crate::quotes::QuoteSource;
use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";
const DEFAULT_TIMEOUT_SECS: u64 = 20;
const DEFAULT_REQ_DELAY_MS: u64 = 100;
const AVG_VOLUME_BARS: usize = 10;
const MIN_AVG_VOLUME_BARS: usize = 4;

/// Yahoo Finance chart API, one request per symbol.
#[derive(Debug, Clone)]
pub struct YahooChartClient {
    http: reqwest::Client,
    base_url: String,
    req_delay: Duration,
}

impl YahooChartClient {
    pub fn from_env() -> Result<Self> {
        let base_url =
            std::env::var("QUOTE_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let req_delay_ms = std::env::var("QUOTE_REQ_DELAY_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_REQ_DELAY_MS);
        let timeout_secs = std::env::var("QUOTE_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("Mozilla/5.0 (bist-radar)"));

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .default_headers(headers)
            .build()
            .context("failed to build quote http client")?;

        Ok(Self {
            http,
            base_url,
            req_delay: Duration::from_millis(req_delay_ms),
        })
    }

    async fn fetch_one(&self, symbol: &str) -> Result<Option<Quote>> {
        let url = format!(
            "{}/v8/finance/chart/{}",
            self.base_url.trim_end_matches('/'),
            symbol
        );
        let res = self
            .http
            .get(url)
            .query(&[("range", "10d"), ("interval", "1d")])
            .send()
            .await
            .context("chart request failed")?;

        let status = res.status();
        let text = res.text().await.context("failed to read chart response")?;
        anyhow::ensure!(status.is_success(), "chart HTTP {status}");

        let parsed = serde_json::from_str::<ChartResponse>(&text)
            .with_context(|| format!("chart response is not valid JSON for {symbol}"))?;
        Ok(quote_from_chart(symbol, parsed))
    }
}

#[async_trait::async_trait]
impl QuoteSource for YahooChartClient {
    fn source_name(&self) -> &'static str {
        "yahoo_chart"
    }

    async fn get_quotes(&self, ids: &[String]) -> Result<HashMap<String, Quote>> {
        let mut out = HashMap::with_capacity(ids.len());
        let mut failures: usize = 0;

        for (idx, id) in ids.iter().enumerate() {
            if idx != 0 && !self.req_delay.is_zero() {
                tokio::time::sleep(self.req_delay).await;
            }

            match self.fetch_one(id).await {
                Ok(Some(q)) => {
                    out.insert(id.clone(), q);
                }
                Ok(None) => {
                    failures += 1;
                    tracing::debug!(symbol = %id, "no usable chart data");
                }
                Err(err) => {
                    failures += 1;
                    if failures <= 10 {
                        tracing::warn!(symbol = %id, error = %err, "quote fetch failed; skipping symbol");
                    }
                }
            }
        }

        tracing::info!(requested = ids.len(), priced = out.len(), failures, "quote scan finished");
        Ok(out)
    }
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    #[serde(default)]
    indicators: Option<Indicators>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    #[serde(default)]
    regular_market_price: Option<f64>,
    #[serde(default)]
    previous_close: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<IndicatorQuote>,
}

#[derive(Debug, Deserialize)]
struct IndicatorQuote {
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

/// Daily bars: price is the live market price (or last close), reference is the previous
/// bar's close, volume ratio compares the last bar against the mean of up to 10 prior bars.
fn quote_from_chart(symbol: &str, resp: ChartResponse) -> Option<Quote> {
    let result = resp.chart.result?.into_iter().next()?;

    let bars: Vec<(f64, Option<f64>)> = result
        .indicators
        .and_then(|i| i.quote.into_iter().next())
        .map(|q| {
            q.close
                .iter()
                .enumerate()
                .filter_map(|(i, c)| c.map(|c| (c, q.volume.get(i).copied().flatten())))
                .collect()
        })
        .unwrap_or_default();

    let price = result
        .meta
        .regular_market_price
        .or_else(|| bars.last().map(|b| b.0))?;
    let reference = if bars.len() >= 2 {
        Some(bars[bars.len() - 2].0)
    } else {
        result.meta.previous_close
    }?;

    let quote = Quote::new(symbol, price, reference)?;

    let volume = bars.last().and_then(|b| b.1);
    let prior: Vec<f64> = bars
        .iter()
        .rev()
        .skip(1)
        .take(AVG_VOLUME_BARS)
        .filter_map(|b| b.1)
        .collect();
    let average = (prior.len() >= MIN_AVG_VOLUME_BARS)
        .then(|| prior.iter().sum::<f64>() / prior.len() as f64);

    Some(quote.with_volume(volume, average))
}
