//! Agent Engine deployment management
//!
//! Lists, registers and removes hosted agent instances through the Vertex AI
//! `reasoningEngines` REST resource. Staging the code itself is out of scope;
//! `create` registers the resource with a display name and description.

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::DeployConfig;
use crate::types::{AppError, AppResult};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

const DEFAULT_DESCRIPTION: &str =
    "Research assistant for Google Scholar papers, author profiles and news";

/// Where deployments live. All three values are required before any request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployTarget {
    pub project_id: String,
    pub location: String,
    pub bucket: String,
}

impl DeployTarget {
    pub fn from_config(config: &DeployConfig) -> AppResult<Self> {
        fn required(value: &Option<String>, name: &'static str) -> AppResult<String> {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .ok_or(AppError::MissingConfig(name))
        }

        Ok(Self {
            project_id: required(&config.project_id, "GOOGLE_CLOUD_PROJECT")?,
            location: required(&config.location, "GOOGLE_CLOUD_LOCATION")?,
            bucket: required(&config.bucket, "GOOGLE_CLOUD_STORAGE_BUCKET")?,
        })
    }

    /// Staging bucket URI.
    pub fn staging_bucket(&self) -> String {
        if self.bucket.starts_with("gs://") {
            self.bucket.clone()
        } else {
            format!("gs://{}", self.bucket)
        }
    }

    fn parent(&self) -> String {
        format!("projects/{}/locations/{}", self.project_id, self.location)
    }
}

/// One hosted agent instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    /// Full resource name, `projects/.../reasoningEngines/<id>`.
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub create_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub update_time: Option<DateTime<Utc>>,
}

impl Deployment {
    /// Trailing id segment of the resource name.
    pub fn resource_id(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }
}

impl std::fmt::Display for Deployment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn time(t: &Option<DateTime<Utc>>) -> String {
            t.map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                .unwrap_or_else(|| "-".to_string())
        }
        write!(
            f,
            "{}\n  display name: {}\n  created: {}\n  updated: {}",
            self.name,
            self.display_name.as_deref().unwrap_or("-"),
            time(&self.create_time),
            time(&self.update_time)
        )
    }
}

/// Long-running operation handle returned by create and delete.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Operation {
    pub name: String,
    #[serde(default)]
    pub done: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    reasoning_engines: Vec<Deployment>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

pub struct AgentEngineClient {
    http: Client,
    target: DeployTarget,
    access_token: String,
    api_base: String,
}

impl AgentEngineClient {
    pub fn new(target: DeployTarget, access_token: impl Into<String>) -> Self {
        let api_base = format!("https://{}-aiplatform.googleapis.com", target.location);
        Self {
            http: Client::new(),
            target,
            access_token: access_token.into(),
            api_base,
        }
    }

    /// Build from configuration; a missing target value or token is fatal.
    pub fn from_config(config: &DeployConfig) -> AppResult<Self> {
        let target = DeployTarget::from_config(config)?;
        let token = config
            .access_token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .ok_or(AppError::MissingConfig("GOOGLE_CLOUD_ACCESS_TOKEN"))?;

        let client = Self::new(target, token);
        Ok(match &config.api_base {
            Some(base) => client.with_api_base(base),
            None => client,
        })
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn target(&self) -> &DeployTarget {
        &self.target
    }

    fn collection_url(&self) -> String {
        format!("{}/v1/{}/reasoningEngines", self.api_base, self.target.parent())
    }

    /// Accepts either a bare id or a full resource name.
    fn resource_url(&self, resource_id: &str) -> String {
        let resource_id = resource_id.trim().trim_matches('/');
        if resource_id.starts_with("projects/") {
            format!("{}/v1/{}", self.api_base, resource_id)
        } else {
            format!("{}/{}", self.collection_url(), resource_id)
        }
    }

    /// All deployments in the target project and location.
    pub async fn list(&self) -> AppResult<Vec<Deployment>> {
        let mut deployments = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .http
                .get(self.collection_url())
                .bearer_auth(&self.access_token)
                .timeout(REQUEST_TIMEOUT);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token)]);
            }

            let page: ListResponse = Self::check(request.send().await?).await?.json().await?;
            debug!(count = page.reasoning_engines.len(), "Fetched deployments page");
            deployments.extend(page.reasoning_engines);

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        info!(count = deployments.len(), "Listed deployments");
        Ok(deployments)
    }

    /// Register a new deployment.
    pub async fn create(&self, display_name: &str) -> AppResult<Operation> {
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(AppError::InvalidRequest("display name must not be empty".to_string()));
        }

        let body = json!({
            "displayName": display_name,
            "description": DEFAULT_DESCRIPTION,
        });

        let response = self
            .http
            .post(self.collection_url())
            .bearer_auth(&self.access_token)
            .timeout(REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .await?;
        let operation: Operation = Self::check(response).await?.json().await?;

        info!(display_name = %display_name, operation = %operation.name, "Created deployment");
        Ok(operation)
    }

    /// Delete a deployment and any child resources.
    pub async fn delete(&self, resource_id: &str) -> AppResult<Operation> {
        if resource_id.trim().is_empty() {
            return Err(AppError::InvalidRequest("resource id must not be empty".to_string()));
        }

        let response = self
            .http
            .delete(self.resource_url(resource_id))
            .bearer_auth(&self.access_token)
            .timeout(REQUEST_TIMEOUT)
            .query(&[("force", "true")])
            .send()
            .await?;
        let operation: Operation = Self::check(response).await?.json().await?;

        info!(resource_id = %resource_id, operation = %operation.name, "Deleted deployment");
        Ok(operation)
    }

    async fn check(response: reqwest::Response) -> AppResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&text)
            .map(|body| body.error.message)
            .unwrap_or(text);

        Err(AppError::DeployApi {
            status: status.as_u16(),
            message,
        })
    }
}
