use std::sync::OnceLock;

use futures::future::BoxFuture;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use nexus_core::config::PerplexityConfig;
use nexus_core::error::{NexusError, Result};
use nexus_core::traits::Tool;
use nexus_core::types::{ToolContext, ToolResult};

use super::datetime::{format_date, ist_now};
use super::transport_error;

const PRICE_SYSTEM_PROMPT: &str = "\
You are a market price assistant providing structured crop pricing information.

Always give numerical prices with their unit (per kg, per quintal, per ton), the date \
of the quote and the market/mandi name. List every market you have data for separately.

Use exactly this layout:

CROP: [Crop Name]
LOCATION: [District, State] or [State]
DATE: [Date]

PRICE DETAILS:
- Market/Mandi: [Market Name]
- Minimum Price: ₹[amount] per [unit]
- Maximum Price: ₹[amount] per [unit]
- Average Price: ₹[amount] per [unit]
- Unit: [kg/quintal/ton/etc.]

If exact prices are not available, say \"Price data not available\".";

/// Current crop prices from a Perplexity-compatible search model, returned as
/// structured JSON the agent can feed into the calculator.
pub struct MarketPriceTool {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl MarketPriceTool {
    pub fn new(http: reqwest::Client, config: &PerplexityConfig) -> Self {
        Self {
            http,
            endpoint: config.base_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        }
    }
}

#[derive(Deserialize)]
struct MarketPriceInput {
    crop: String,
    state: String,
    #[serde(default)]
    district: Option<String>,
    #[serde(default)]
    market: Option<String>,
}

fn build_query(p: &MarketPriceInput, today: &str) -> String {
    let district = p.district.as_deref().filter(|d| !d.trim().is_empty());
    let market = p.market.as_deref().filter(|m| !m.trim().is_empty());
    let place = match (district, market) {
        (Some(d), Some(m)) => format!("in {d}, {} at {m} market", p.state),
        (Some(d), None) => format!("in {d}, {}", p.state),
        (None, Some(m)) => format!("in {} at {m} market", p.state),
        (None, None) => format!("in {}", p.state),
    };
    format!(
        "What is the current market price of {} {place}? Today's date is {today}.",
        p.crop
    )
}

/// One market's quote as read from the model's text.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MarketQuote {
    pub market: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub avg_price: Option<f64>,
    pub unit: Option<String>,
}

impl MarketQuote {
    fn field_count(&self) -> usize {
        [
            self.min_price.is_some(),
            self.max_price.is_some(),
            self.avg_price.is_some(),
            self.unit.is_some(),
        ]
        .into_iter()
        .filter(|x| *x)
        .count()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OverallPrices {
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub avg_price: Option<f64>,
    pub unit: Option<String>,
}

/// Structured view of a price answer. `raw_response` keeps the full text.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractedPrices {
    pub crop: Option<String>,
    pub location: Option<String>,
    pub date: Option<String>,
    pub markets: Vec<MarketQuote>,
    pub price_summary: OverallPrices,
    pub raw_response: String,
}

fn price_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"₹?\s*(\d[\d,]*(?:\.\d+)?)").ok())
        .as_ref()
}

fn parse_price(text: &str) -> Option<f64> {
    let caps = price_regex()?.captures(text)?;
    caps.get(1)?.as_str().replace(',', "").parse().ok()
}

fn value_after_colon(line: &str) -> String {
    line.split_once(':')
        .map(|(_, v)| v.trim().trim_matches('*').trim().to_string())
        .unwrap_or_default()
}

/// Close the current market block. Blocks with fewer than three of
/// min/max/avg/unit are dropped.
fn flush(markets: &mut Vec<MarketQuote>, current: &mut MarketQuote) {
    let quote = std::mem::take(current);
    if quote.field_count() >= 3 {
        markets.push(quote);
    }
}

/// Read the `CROP:` / `LOCATION:` / `DATE:` header and the per-market price
/// lines out of a price answer. A market block ends at the next
/// `Market/Mandi:` line, at a repeated field, or at the end of the text.
pub fn extract_price_data(response: &str) -> ExtractedPrices {
    let mut out = ExtractedPrices {
        raw_response: response.to_string(),
        ..Default::default()
    };
    let mut current = MarketQuote::default();

    for raw in response.lines() {
        let line = raw.trim().trim_start_matches(['-', '*', ' ']);

        if line.starts_with("CROP:") {
            out.crop = Some(value_after_colon(line));
        } else if line.starts_with("LOCATION:") {
            out.location = Some(value_after_colon(line));
        } else if line.starts_with("DATE:") || line.starts_with("SEARCH DATE:") {
            out.date = Some(value_after_colon(line));
        } else if line.contains("Market/Mandi:") {
            if current.market.is_some() || current.field_count() > 0 {
                flush(&mut out.markets, &mut current);
            }
            current.market = Some(value_after_colon(line));
        } else if line.contains("Minimum Price:") {
            if current.min_price.is_some() {
                flush(&mut out.markets, &mut current);
            }
            current.min_price = parse_price(&value_after_colon(line));
        } else if line.contains("Maximum Price:") {
            if current.max_price.is_some() {
                flush(&mut out.markets, &mut current);
            }
            current.max_price = parse_price(&value_after_colon(line));
        } else if line.contains("Average Price:") {
            if current.avg_price.is_some() {
                flush(&mut out.markets, &mut current);
            }
            current.avg_price = parse_price(&value_after_colon(line));
        } else if line.contains("Unit:") {
            if current.unit.is_some() {
                flush(&mut out.markets, &mut current);
            }
            current.unit = Some(value_after_colon(line));
        }
    }
    flush(&mut out.markets, &mut current);

    if !out.markets.is_empty() {
        let present = |f: fn(&MarketQuote) -> Option<f64>| -> Vec<f64> {
            out.markets
                .iter()
                .filter_map(f)
                .filter(|v| *v != 0.0)
                .collect()
        };
        let mins = present(|m| m.min_price);
        let maxs = present(|m| m.max_price);
        let avgs = present(|m| m.avg_price);

        out.price_summary.min_price = mins.iter().copied().reduce(f64::min);
        out.price_summary.max_price = maxs.iter().copied().reduce(f64::max);
        if !avgs.is_empty() {
            out.price_summary.avg_price = Some(avgs.iter().sum::<f64>() / avgs.len() as f64);
        }
        out.price_summary.unit = Some(
            out.markets[0]
                .unit
                .clone()
                .unwrap_or_else(|| "per quintal".to_string()),
        );
    }

    out
}

impl Tool for MarketPriceTool {
    fn name(&self) -> &str {
        "get_market_price"
    }

    fn description(&self) -> &str {
        "Get current market (mandi) prices of a crop in an Indian state, optionally narrowed \
         to a district and market. Returns structured min/max/average prices per market."
    }

    fn timeout_secs(&self) -> u64 {
        90
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "crop": { "type": "string", "description": "Crop name, e.g. onion" },
                "state": { "type": "string", "description": "Indian state" },
                "district": { "type": "string", "description": "District (optional)" },
                "market": { "type": "string", "description": "Market or mandi name (optional)" }
            },
            "required": ["crop", "state"]
        })
    }

    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let params: MarketPriceInput = serde_json::from_value(input)
                .map_err(|e| NexusError::ToolValidation(e.to_string()))?;

            let today = format_date(&ist_now());
            let query = build_query(&params, &today);
            debug!(%query, "Market price search");

            let payload = json!({
                "model": self.model,
                "messages": [
                    { "role": "system", "content": PRICE_SYSTEM_PROMPT },
                    { "role": "user", "content": query }
                ],
                "temperature": 0.3,
                "top_p": 0.9,
                "return_images": false,
                "return_related_questions": false,
                "stream": false,
                "frequency_penalty": 0.5
            });

            let resp = match self
                .http
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&payload)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => return Ok(transport_error("market price search", e)),
            };

            if resp.status().as_u16() != 200 {
                return Ok(ToolResult::error(format!(
                    "Error fetching market price data: HTTP {}",
                    resp.status().as_u16()
                )));
            }

            let body: serde_json::Value = match resp.json().await {
                Ok(body) => body,
                Err(e) => return Ok(transport_error("market price search", e)),
            };
            let Some(answer) = body["choices"][0]["message"]["content"].as_str() else {
                return Ok(transport_error(
                    "market price search",
                    "response has no message content",
                ));
            };

            let stamped = format!("SEARCH DATE: {today}\n\n{answer}");
            let extracted = extract_price_data(&stamped);
            Ok(ToolResult::success(serde_json::to_string_pretty(&extracted)?))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SAMPLE: &str = "\
SEARCH DATE: 19-10-2026

Onion prices are steady this week.

CROP: Onion
LOCATION: Nashik, Maharashtra
DATE: 18-10-2026

PRICE DETAILS:
- Market/Mandi: Lasalgaon
- Minimum Price: ₹1,800 per quintal
- Maximum Price: ₹2,450 per quintal
- Average Price: ₹2,100 per quintal
- Unit: quintal

- Market/Mandi: Pimpalgaon
- Minimum Price: ₹1,700 per quintal
- Maximum Price: ₹2,600 per quintal
- Average Price: ₹2,300 per quintal
- Unit: quintal
";

    #[test]
    fn extracts_header_and_markets() {
        let data = extract_price_data(SAMPLE);
        assert_eq!(data.crop.as_deref(), Some("Onion"));
        assert_eq!(data.location.as_deref(), Some("Nashik, Maharashtra"));
        assert_eq!(data.date.as_deref(), Some("18-10-2026"));
        assert_eq!(data.markets.len(), 2);
        assert_eq!(data.markets[0].market.as_deref(), Some("Lasalgaon"));
        assert_eq!(data.markets[0].min_price, Some(1800.0));
        assert_eq!(data.markets[0].max_price, Some(2450.0));
        assert_eq!(data.markets[0].avg_price, Some(2100.0));
        assert_eq!(data.markets[0].unit.as_deref(), Some("quintal"));
        assert_eq!(data.markets[1].market.as_deref(), Some("Pimpalgaon"));
        assert_eq!(data.markets[1].avg_price, Some(2300.0));
    }

    #[test]
    fn incomplete_blocks_are_dropped() {
        let data = extract_price_data(
            "- Market/Mandi: A\n- Minimum Price: ₹10\n- Market/Mandi: B\n- Minimum Price: ₹11\n- Maximum Price: ₹15\n- Unit: kg\n",
        );
        assert_eq!(data.markets.len(), 1);
        assert_eq!(data.markets[0].market.as_deref(), Some("B"));
    }

    #[test]
    fn summarizes_across_markets() {
        let summary = extract_price_data(SAMPLE).price_summary;
        assert_eq!(summary.min_price, Some(1700.0));
        assert_eq!(summary.max_price, Some(2600.0));
        assert_eq!(summary.avg_price, Some(2200.0));
    }

    #[test]
    fn unit_defaults_to_per_quintal() {
        let data = extract_price_data(
            "Minimum Price: ₹20 per kg\nMaximum Price: ₹30 per kg\nAverage Price: ₹25 per kg\n",
        );
        assert_eq!(data.markets.len(), 1);
        assert!(data.markets[0].unit.is_none());
        assert_eq!(data.price_summary.unit.as_deref(), Some("per quintal"));
    }

    #[test]
    fn text_without_prices_yields_no_markets() {
        let data = extract_price_data("SEARCH DATE: 01-01-2026\n\nPrice data not available.");
        assert!(data.markets.is_empty());
        assert_eq!(data.price_summary, OverallPrices::default());
        assert_eq!(data.date.as_deref(), Some("01-01-2026"));
    }

    #[test]
    fn query_mentions_every_given_location_part() {
        let p = MarketPriceInput {
            crop: "wheat".into(),
            state: "Punjab".into(),
            district: Some("Ludhiana".into()),
            market: Some("Khanna".into()),
        };
        assert_eq!(
            build_query(&p, "19-10-2026"),
            "What is the current market price of wheat in Ludhiana, Punjab at Khanna market? Today's date is 19-10-2026."
        );
        let p = MarketPriceInput {
            crop: "wheat".into(),
            state: "Punjab".into(),
            district: None,
            market: Some(" ".into()),
        };
        assert_eq!(
            build_query(&p, "19-10-2026"),
            "What is the current market price of wheat in Punjab? Today's date is 19-10-2026."
        );
    }

    #[tokio::test]
    async fn tool_returns_structured_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer pplx-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "content": SAMPLE.trim_start_matches("SEARCH DATE: 19-10-2026\n\n") } }]
            })))
            .mount(&server)
            .await;

        let tool = MarketPriceTool::new(
            reqwest::Client::new(),
            &PerplexityConfig {
                base_url: format!("{}/chat/completions", server.uri()),
                api_key: "pplx-test".into(),
                model: "sonar-pro".into(),
            },
        );
        let result = tool
            .execute(json!({ "crop": "onion", "state": "Maharashtra" }), ToolContext::default())
            .await
            .unwrap();
        assert!(!result.is_error);
        let value: serde_json::Value = serde_json::from_str(&result.content).unwrap();
        assert_eq!(value["crop"], "Onion");
        assert_eq!(value["markets"].as_array().unwrap().len(), 2);
        assert!(value["raw_response"].as_str().unwrap().starts_with("SEARCH DATE: "));
    }

    #[tokio::test]
    async fn non_200_is_reported_as_error_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;
        let tool = MarketPriceTool::new(
            reqwest::Client::new(),
            &PerplexityConfig {
                base_url: server.uri(),
                api_key: "k".into(),
                model: "sonar-pro".into(),
            },
        );
        let result = tool
            .execute(json!({ "crop": "onion", "state": "Maharashtra" }), ToolContext::default())
            .await
            .unwrap();
        assert!(result.is_error);
        assert_eq!(result.content, "Error fetching market price data: HTTP 429");
    }
}
