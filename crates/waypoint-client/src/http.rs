//! `reqwest` implementation of [`AssistApi`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};
use waypoint_core::RequestId;
use waypoint_core::api::{
    MatchResult, RuleCheckRequest, RuleCheckResponse, SuggestGetRequest, SuggestNextRequest,
    SuggestionsResponse,
};
use waypoint_core::rules::{RuleListItem, RuleListResponse};
use waypoint_core::suggestion::Suggestion;
use waypoint_core::text::truncate_chars;
use waypoint_settings::AssistantSettings;

use crate::api::AssistApi;
use crate::errors::{ApiError, Result};

const CONTRACT_VERSION_HEADER: &str = "X-Contract-Version";
const REQUEST_ID_HEADER: &str = "X-Request-Id";
const RULE_PATH: &str = "/rule";
const RULE_CHECK_PATH: &str = "/rule/check";
const SUGGEST_NEXT_PATH: &str = "/suggest/next";
const MAX_ERROR_BODY_CHARS: usize = 500;

/// HTTP client for the rule and suggest endpoints.
#[derive(Clone, Debug)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    suggest_path: String,
    contract_version: Option<String>,
}

impl ApiClient {
    /// Build a client from settings. Fails only if the TLS backend cannot
    /// be initialised.
    pub fn new(settings: &AssistantSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(settings.request_timeout_ms))
            .build()?;
        Ok(Self::with_client(client, settings))
    }

    /// Build a client around an existing `reqwest::Client`.
    #[must_use]
    pub fn with_client(client: reqwest::Client, settings: &AssistantSettings) -> Self {
        Self {
            client,
            base_url: settings.api_base_url.trim_end_matches('/').to_string(),
            suggest_path: settings.suggest_path.clone(),
            contract_version: settings.contract_version.clone(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn decorate(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let builder = builder.header(REQUEST_ID_HEADER, RequestId::new().to_string());
        match &self.contract_version {
            Some(version) => builder.header(CONTRACT_VERSION_HEADER, version),
            None => builder,
        }
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = self.url(path);
        debug!(url = %url, "POST");
        let request = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .json(body);
        let response = self.decorate(request).send().await?;
        read_json(response).await
    }

    async fn post_suggestions<B>(&self, path: &str, body: &B) -> Result<Vec<Suggestion>>
    where
        B: Serialize + Sync,
    {
        let resp: SuggestionsResponse = self.post_json(path, body).await?;
        Ok(parse_suggestions(resp.suggestions))
    }
}

async fn read_json<R: DeserializeOwned>(response: reqwest::Response) -> Result<R> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ApiError::Status {
            status: status.as_u16(),
            body: truncate_chars(&body, MAX_ERROR_BODY_CHARS).to_string(),
        });
    }
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Decode raw suggestion objects one by one, dropping the malformed ones.
#[must_use]
pub fn parse_suggestions(raw: Vec<Value>) -> Vec<Suggestion> {
    raw.into_iter()
        .enumerate()
        .filter_map(|(index, value)| match serde_json::from_value(value) {
            Ok(suggestion) => Some(suggestion),
            Err(e) => {
                warn!(index, error = %e, "dropping malformed suggestion");
                None
            }
        })
        .collect()
}

#[async_trait]
impl AssistApi for ApiClient {
    async fn list_rules(&self, site_id: &str) -> Result<Vec<RuleListItem>> {
        let url = self.url(RULE_PATH);
        debug!(url = %url, site_id, "GET rules");
        let request = self.client.get(&url).query(&[("siteId", site_id)]);
        let response = self.decorate(request).send().await?;
        let body: RuleListResponse = read_json(response).await?;
        Ok(body.rules)
    }

    async fn check_rule(&self, request: &RuleCheckRequest) -> Result<MatchResult> {
        let response: RuleCheckResponse = self.post_json(RULE_CHECK_PATH, request).await?;
        Ok(response.into())
    }

    async fn fetch_suggestions(&self, request: &SuggestGetRequest) -> Result<Vec<Suggestion>> {
        self.post_suggestions(&self.suggest_path, request).await
    }

    async fn next_suggestions(&self, request: &SuggestNextRequest) -> Result<Vec<Suggestion>> {
        self.post_suggestions(SUGGEST_NEXT_PATH, request).await
    }
}
