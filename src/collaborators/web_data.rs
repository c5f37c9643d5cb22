//! Web and social data collection over a REST data-collection API.
//!
//! Serves both the search provider (`perform_search` / `search`) and the
//! social-data provider (`search_all_platforms`). The client refuses to be
//! constructed without an API key, so the registry records it as
//! unavailable instead of producing canned data.

use super::Capability;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, info};

/// Configuration for the web-data client.
#[derive(Debug, Clone)]
pub struct WebDataConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub max_results: usize,
    pub max_results_per_platform: usize,
    pub platforms: Vec<String>,
    pub timeout_seconds: u64,
}

impl Default for WebDataConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.brightdata-mcp.ai/v1".to_string(),
            api_key: None,
            max_results: 50,
            max_results_per_platform: 15,
            platforms: vec!["youtube", "linkedin", "twitter", "instagram"]
                .into_iter()
                .map(String::from)
                .collect(),
            timeout_seconds: 45,
        }
    }
}

const OPERATIONS: &[&str] = &["perform_search", "search", "search_all_platforms"];

/// REST client for web and social data collection.
pub struct WebDataClient {
    config: WebDataConfig,
    api_key: String,
    http_client: reqwest::Client,
}

impl WebDataClient {
    pub fn new(config: WebDataConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("web-data API key not configured"))?;

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(concat!("marketscope/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        info!("Web-data client active at {}", config.base_url);

        Ok(Self {
            config,
            api_key,
            http_client,
        })
    }

    async fn post(&self, path: &str, payload: &Value) -> Result<Value> {
        let url = format!("{}{}", self.config.base_url, path);
        debug!(%url, "Posting web-data request");

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(payload)
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", url))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("web-data API error {}: {}", status, body);
        }

        response
            .json()
            .await
            .context("Failed to parse web-data response")
    }

    async fn collect_web_data(&self, query: &str) -> Result<Value> {
        let payload = json!({
            "query": query,
            "data_types": ["social_media", "news", "reviews", "forums"],
            "max_results": self.config.max_results,
            "country": "BR",
            "language": "pt",
        });

        let raw = self.post("/collect", &payload).await?;
        Ok(Value::Array(process_web_results(&raw, query)))
    }

    async fn search_social_platforms(&self, query: &str, per_platform: usize) -> Result<Value> {
        let payload = json!({
            "query": query,
            "platforms": self.config.platforms,
            "max_results_per_platform": per_platform,
            "include_engagement": true,
            "include_sentiment": true,
        });

        let raw = self.post("/social", &payload).await?;
        Ok(process_social_results(&raw, per_platform))
    }
}

#[async_trait]
impl Capability for WebDataClient {
    fn name(&self) -> &str {
        "web_data"
    }

    fn operations(&self) -> &[&'static str] {
        OPERATIONS
    }

    async fn invoke(&self, operation: &str, args: &Value) -> Result<Value> {
        let query = args
            .get("query")
            .and_then(Value::as_str)
            .filter(|q| !q.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("missing required argument: query"))?;

        match operation {
            "perform_search" | "search" => self.collect_web_data(query).await,
            "search_all_platforms" => {
                let per_platform = args
                    .get("max_results_per_platform")
                    .and_then(Value::as_u64)
                    .map(|n| n as usize)
                    .unwrap_or(self.config.max_results_per_platform);
                self.search_social_platforms(query, per_platform).await
            }
            other => anyhow::bail!("web_data does not implement {}", other),
        }
    }
}

/// Normalize raw `/collect` results into flat records.
pub fn process_web_results(raw: &Value, query: &str) -> Vec<Value> {
    let items = raw
        .get("results")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    items
        .iter()
        .map(|item| {
            let field = |key: &str, default: &str| {
                item.get(key)
                    .and_then(Value::as_str)
                    .unwrap_or(default)
                    .to_string()
            };
            json!({
                "content": field("content", ""),
                "url": field("url", ""),
                "title": field("title", ""),
                "platform": field("platform", "web"),
                "data_type": field("data_type", "general"),
                "timestamp": field("timestamp", ""),
                "engagement_metrics": item.get("engagement").cloned().unwrap_or_else(|| json!({})),
                "sentiment": field("sentiment", "neutral"),
                "language": field("language", "pt"),
                "country": field("country", "BR"),
                "query_used": query,
            })
        })
        .collect()
}

/// Group raw `/social` results by platform.
pub fn process_social_results(raw: &Value, per_platform: usize) -> Value {
    let mut platforms_data = Map::new();
    let mut all_posts = Vec::new();

    if let Some(platforms) = raw.get("platforms").and_then(Value::as_object) {
        for (platform, posts) in platforms {
            let posts: Vec<Value> = posts
                .as_array()
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .take(per_platform)
                .collect();

            let avg_engagement = if posts.is_empty() {
                0.0
            } else {
                posts
                    .iter()
                    .map(|p| p.get("engagement_score").and_then(Value::as_f64).unwrap_or(0.0))
                    .sum::<f64>()
                    / posts.len() as f64
            };

            platforms_data.insert(
                platform.clone(),
                json!({
                    "posts": posts,
                    "count": posts.len(),
                    "avg_engagement": avg_engagement,
                }),
            );
            all_posts.extend(posts);
        }
    }

    json!({
        "total_posts": all_posts.len(),
        "platforms_data": platforms_data,
        "all_posts": all_posts,
    })
}
