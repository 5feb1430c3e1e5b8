//! Search engine and project directory backed by the host's REST API

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};
use wmpr_core::{
    error::{WmprError, WmprResult},
    feed::RawEntry,
    query::{ProjectDirectory, QueryEngine, UserId, ValidatedQuery},
};

const PARSE_PATH: &str = "/rest/api/2/jql/parse?validation=strict";
const SEARCH_PATH: &str = "/rest/api/2/search";
const PROJECT_PATH: &str = "/rest/api/2/project/";

/// Fields requested for each issue; everything the feed record needs
pub const SEARCH_FIELDS: [&str; 4] = ["summary", "reporter", "created", "status"];

/// Basic credentials for the REST API
pub struct JiraAuth {
    username: String,
    api_token: String,
}

impl JiraAuth {
    pub fn new(username: String, api_token: String) -> Self {
        Self {
            username,
            api_token,
        }
    }

    pub fn to_basic_auth(&self) -> String {
        use base64::Engine;
        let credentials = format!("{}:{}", self.username, self.api_token);
        format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode(credentials)
        )
    }
}

pub struct JiraSearchEngine {
    http: reqwest::Client,
    base_url: String,
    authorization: Option<String>,
}

impl JiraSearchEngine {
    pub fn new(
        base_url: &str,
        auth: Option<JiraAuth>,
        connect_timeout: Duration,
    ) -> WmprResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| WmprError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            authorization: auth.map(|auth| auth.to_basic_auth()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .http
            .request(method, format!("{}{}", self.base_url, path))
            .header(ACCEPT, "application/json");
        match self.authorization {
            Some(ref value) => builder.header(AUTHORIZATION, value),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> WmprResult<Response> {
        builder
            .send()
            .await
            .map_err(|e| WmprError::search_engine(format!("request failed: {}", e)))
    }

    async fn json_body(response: Response) -> WmprResult<Value> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WmprError::search_engine(format!(
                "HTTP {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| WmprError::search_engine(format!("invalid response body: {}", e)))
    }
}

#[async_trait]
impl QueryEngine for JiraSearchEngine {
    async fn parse(&self, user: &UserId, text: &str) -> WmprResult<ValidatedQuery> {
        if text.trim().is_empty() {
            return Err(WmprError::invalid_query(text, "query is empty"));
        }

        debug!("Parsing JQL for {}: {}", user, text);
        let response = self
            .send(
                self.request(Method::POST, PARSE_PATH)
                    .json(&json!({ "queries": [text] })),
            )
            .await?;
        let body = Self::json_body(response).await?;

        let errors = parse_errors(&body)?;
        if errors.is_empty() {
            Ok(ValidatedQuery::new(text))
        } else {
            Err(WmprError::invalid_query(text, errors.join("; ")))
        }
    }

    async fn execute(
        &self,
        user: &UserId,
        query: &ValidatedQuery,
        offset: usize,
        limit: usize,
    ) -> WmprResult<Vec<RawEntry>> {
        debug!("Searching for {}: {}", user, query.text());
        let response = self
            .send(
                self.request(Method::POST, SEARCH_PATH)
                    .json(&search_request(query.text(), offset, limit)),
            )
            .await?;
        let body = Self::json_body(response).await?;
        issues_from(body)
    }
}

#[async_trait]
impl ProjectDirectory for JiraSearchEngine {
    async fn project_name(&self, project_key: &str) -> WmprResult<Option<String>> {
        let encoded: String = url::form_urlencoded::byte_serialize(project_key.as_bytes()).collect();
        let response = self
            .send(self.request(Method::GET, &format!("{}{}", PROJECT_PATH, encoded)))
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!("Project {} not found", project_key);
            return Ok(None);
        }

        let body = Self::json_body(response).await?;
        let name = body
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| {
                warn!("Project {} has no name, showing its key", project_key);
                project_key.to_string()
            });
        Ok(Some(name))
    }
}

/// Body of a search request
pub fn search_request(jql: &str, offset: usize, limit: usize) -> Value {
    json!({
        "jql": jql,
        "startAt": offset,
        "maxResults": limit,
        "fields": SEARCH_FIELDS,
    })
}

/// Errors reported for the single query of a parse response
pub fn parse_errors(body: &Value) -> WmprResult<Vec<String>> {
    let parsed = body
        .get("queries")
        .and_then(Value::as_array)
        .and_then(|queries| queries.first())
        .ok_or_else(|| WmprError::search_engine("parse response has no queries"))?;

    Ok(parsed
        .get("errors")
        .and_then(Value::as_array)
        .map(|errors| {
            errors
                .iter()
                .map(|e| e.as_str().map(str::to_string).unwrap_or_else(|| e.to_string()))
                .collect()
        })
        .unwrap_or_default())
}

/// Issues of a search response, unmapped
pub fn issues_from(body: Value) -> WmprResult<Vec<RawEntry>> {
    match body {
        Value::Object(mut map) => match map.remove("issues") {
            Some(Value::Array(issues)) => Ok(issues.into_iter().map(RawEntry::new).collect()),
            Some(Value::Null) | None => Ok(Vec::new()),
            Some(other) => Err(WmprError::search_engine(format!(
                "issues is not an array: {}",
                other
            ))),
        },
        _ => Err(WmprError::search_engine("search response is not an object")),
    }
}
