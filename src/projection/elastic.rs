//! Elasticsearch backend over HTTP
//!
//! Every write asks for `refresh=true` so a document is searchable as soon as
//! the call returns, trading indexing throughput for read-your-writes.

use async_trait::async_trait;
use reqwest::{Method, StatusCode, Url};
use serde_json::{json, Value as JsonValue};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info};

use super::document::IndexDocument;
use super::index::SearchIndex;
use super::mapping::plan_index_mapping;
use crate::config::ElasticArgs;
use crate::types::{PlanError, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Join-aware plan index in Elasticsearch
pub struct ElasticsearchIndex {
    base_url: Url,
    index: String,
    http_client: reqwest::Client,
    schema_ready: AtomicBool,
}

impl ElasticsearchIndex {
    pub fn new(args: &ElasticArgs) -> Result<Self> {
        let base_url = Url::parse(&args.elastic_url)
            .map_err(|e| PlanError::Config(format!("Invalid ELASTIC_SEARCH_URL: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(PlanError::Config(format!(
                "ELASTIC_SEARCH_URL '{}' is not a base URL",
                args.elastic_url
            )));
        }

        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent("plan-registry/1.0")
            .build()
            .map_err(|e| PlanError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url,
            index: args.index_name.clone(),
            http_client,
            schema_ready: AtomicBool::new(false),
        })
    }

    pub fn index_name(&self) -> &str {
        &self.index
    }

    /// `{base}/{segments...}`, plus `routing` and `refresh=true` for writes
    fn url(&self, segments: &[&str], routing: Option<&str>) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| PlanError::Config("ELASTIC_SEARCH_URL is not a base URL".into()))?
            .pop_if_empty()
            .extend(segments);

        if let Some(routing) = routing {
            url.query_pairs_mut()
                .append_pair("routing", routing)
                .append_pair("refresh", "true");
        }
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<&JsonValue>,
    ) -> Result<reqwest::Response> {
        let mut request = self.http_client.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }

    /// Cluster status (`green`, `yellow`, `red`)
    pub async fn health(&self) -> Result<String> {
        let url = self.url(&["_cluster", "health"], None)?;
        let response = self.send(Method::GET, url, None).await?;
        let body: JsonValue = response.error_for_status()?.json().await?;
        Ok(body["status"].as_str().unwrap_or("unknown").to_string())
    }
}

async fn failure(context: &str, response: reqwest::Response) -> PlanError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    PlanError::Index(format!("{} failed ({}): {}", context, status, body))
}

#[async_trait]
impl SearchIndex for ElasticsearchIndex {
    async fn ensure_schema(&self) -> Result<()> {
        if self.schema_ready.load(Ordering::Acquire) {
            return Ok(());
        }

        let url = self.url(&[self.index.as_str()], None)?;
        let exists = self.send(Method::HEAD, url.clone(), None).await?;
        match exists.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => {
                let response = self
                    .send(Method::PUT, url, Some(&plan_index_mapping()))
                    .await?;
                if response.status().is_success() {
                    info!(index = %self.index, "Created plan index");
                } else {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    // Lost a creation race with another projector
                    if !body.contains("resource_already_exists_exception") {
                        return Err(PlanError::Index(format!(
                            "Index creation failed ({}): {}",
                            status, body
                        )));
                    }
                }
            }
            _ => return Err(failure("Index lookup", exists).await),
        }

        self.schema_ready.store(true, Ordering::Release);
        Ok(())
    }

    async fn upsert(&self, document: &IndexDocument) -> Result<()> {
        let url = self.url(
            &[self.index.as_str(), "_doc", document.id.as_str()],
            Some(&document.routing),
        )?;
        let response = self.send(Method::PUT, url, Some(&document.body)).await?;
        if !response.status().is_success() {
            return Err(failure("Index document", response).await);
        }

        debug!(
            id = %document.id,
            routing = %document.routing,
            relation = %document.relation,
            "Document indexed"
        );
        Ok(())
    }

    async fn delete_tree(&self, root_id: &str) -> Result<()> {
        let url = self.url(&[self.index.as_str(), "_doc", root_id], Some(root_id))?;
        let response = self.send(Method::DELETE, url, None).await?;
        let status = response.status();
        if !status.is_success() && status != StatusCode::NOT_FOUND {
            return Err(failure("Delete document", response).await);
        }

        // Join fields do not cascade; descendants share the root's routing
        let url = self.url(&[self.index.as_str(), "_delete_by_query"], Some(root_id))?;
        let query = json!({ "query": { "term": { "_routing": root_id } } });
        let response = self.send(Method::POST, url, Some(&query)).await?;
        let status = response.status();
        if !status.is_success() && status != StatusCode::NOT_FOUND {
            return Err(failure("Delete descendants", response).await);
        }

        debug!(root = %root_id, "Plan documents deleted");
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "elasticsearch"
    }
}
