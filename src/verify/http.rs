//! REST client for a v2-style threat-modeling platform API.

use super::platform::{JobHandle, JobStatus, ThreatModelPlatform};
use crate::config::RemoteConfig;
use crate::error::{RemoteErrorKind, Result, ThreatDiffError};
use crate::parsers::ValidatedArchitecture;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

/// Environment variable holding the API token.
pub const API_TOKEN_ENV: &str = "TMDIFF_API_TOKEN";

/// Upper bound on pages fetched for one collection.
const MAX_PAGES: u32 = 10_000;

/// Connection settings for [`HttpPlatform`].
#[derive(Debug, Clone)]
pub struct HttpPlatformConfig {
    pub base_url: String,
    pub api_token: String,
    pub timeout: Duration,
    pub page_size: u32,
}

impl HttpPlatformConfig {
    /// Build from the `remote` config section and an explicit token.
    pub fn from_remote(remote: &RemoteConfig, api_token: impl Into<String>) -> Result<Self> {
        let base_url = remote
            .base_url
            .clone()
            .ok_or_else(|| ThreatDiffError::config("remote.base_url is not set"))?;
        Ok(Self {
            base_url,
            api_token: api_token.into(),
            timeout: remote.request_timeout,
            page_size: remote.page_size,
        })
    }

    /// Build from the `remote` config section, reading the token from
    /// [`API_TOKEN_ENV`].
    pub fn from_env(remote: &RemoteConfig) -> Result<Self> {
        let token = std::env::var(API_TOKEN_ENV)
            .map_err(|_| ThreatDiffError::config(format!("{API_TOKEN_ENV} is not set")))?;
        Self::from_remote(remote, token)
    }
}

/// Blocking HTTP implementation of [`ThreatModelPlatform`].
pub struct HttpPlatform {
    client: Client,
    base: Url,
    config: HttpPlatformConfig,
}

#[derive(Debug, Deserialize)]
struct PagedItems {
    #[serde(rename = "_embedded", default)]
    embedded: Option<EmbeddedItems>,
    #[serde(default)]
    page: Option<PageInfo>,
}

#[derive(Debug, Deserialize)]
struct EmbeddedItems {
    #[serde(default)]
    items: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    #[serde(default)]
    total_pages: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedResource {
    #[serde(alias = "operationId")]
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationStatus {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
}

fn network_error(operation: &str, err: &reqwest::Error) -> ThreatDiffError {
    ThreatDiffError::remote(operation, RemoteErrorKind::Network(err.to_string()))
}

fn invalid_response(operation: &str, message: impl Into<String>) -> ThreatDiffError {
    ThreatDiffError::remote(operation, RemoteErrorKind::InvalidResponse(message.into()))
}

/// Whether another page follows `fetched` pages. Hitting `limit` with pages
/// left is an error rather than a silently truncated collection.
fn has_more_pages(
    operation: &str,
    last_count: usize,
    fetched: u32,
    total_pages: u32,
    limit: u32,
) -> Result<bool> {
    if last_count == 0 || fetched >= total_pages {
        return Ok(false);
    }
    if fetched >= limit {
        return Err(invalid_response(
            operation,
            format!("collection exceeds {limit} pages ({total_pages} reported)"),
        ));
    }
    Ok(true)
}

/// Map a non-success status to a remote error kind.
fn classify_status(code: u16, body: String) -> RemoteErrorKind {
    match code {
        401 | 403 => RemoteErrorKind::Auth(body),
        404 => RemoteErrorKind::NotFound(body),
        code => RemoteErrorKind::Status { code, body },
    }
}

fn parse_job_status(raw: OperationStatus) -> JobStatus {
    match raw.status.to_ascii_lowercase().as_str() {
        "finished-success" | "completed" | "success" => JobStatus::Succeeded,
        "finished-error" | "failed" | "error" => JobStatus::Failed(
            raw.error_message
                .unwrap_or_else(|| format!("operation ended with status {}", raw.status)),
        ),
        "pending" | "queued" => JobStatus::Pending,
        _ => JobStatus::Running,
    }
}

/// JSON or YAML, judged by the first meaningful character.
fn architecture_content_type(content: &str) -> &'static str {
    match content.trim_start().chars().next() {
        Some('{') => "application/json",
        _ => "application/x-yaml",
    }
}

impl HttpPlatform {
    pub fn new(config: HttpPlatformConfig) -> Result<Self> {
        let base = Url::parse(&config.base_url)
            .map_err(|e| ThreatDiffError::config(format!("invalid base URL: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(ThreatDiffError::config(format!(
                "invalid base URL: {}",
                config.base_url
            )));
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| network_error("creating HTTP client", &e))?;
        Ok(Self {
            client,
            base,
            config,
        })
    }

    /// `<base>/api/v2/<segments...>`, with each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| ThreatDiffError::config("base URL cannot hold a path"))?
            .pop_if_empty()
            .extend(["api", "v2"])
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.header("api-token", &self.config.api_token)
    }

    fn send(&self, operation: &str, request: RequestBuilder) -> Result<Response> {
        let response = self
            .authorized(request)
            .send()
            .map_err(|e| network_error(operation, &e))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        Err(ThreatDiffError::remote(
            operation,
            classify_status(status.as_u16(), body),
        ))
    }

    fn get_bytes(&self, operation: &str, segments: &[&str]) -> Result<Vec<u8>> {
        let url = self.endpoint(segments)?;
        let response = self.send(operation, self.client.get(url))?;
        response
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|e| network_error(operation, &e))
    }

    /// Fetch every page of a collection and return it as one JSON array.
    fn get_collection(&self, operation: &str, segments: &[&str]) -> Result<String> {
        let url = self.endpoint(segments)?;
        let mut items = Vec::new();
        let mut page = 0u32;
        loop {
            let request = self.client.get(url.clone()).query(&[
                ("page", page.to_string()),
                ("size", self.config.page_size.to_string()),
            ]);
            let body: PagedItems = self
                .send(operation, request)?
                .json()
                .map_err(|e| invalid_response(operation, e.to_string()))?;
            let fetched = body.embedded.map(|e| e.items).unwrap_or_default();
            let fetched_count = fetched.len();
            items.extend(fetched);
            let total_pages = body.page.map_or(1, |p| p.total_pages);
            page += 1;
            tracing::debug!(operation, page, total_pages, items = fetched_count, "Fetched page");
            if !has_more_pages(operation, fetched_count, page, total_pages, MAX_PAGES)? {
                break;
            }
        }
        serde_json::to_string(&Value::Array(items))
            .map_err(|e| invalid_response(operation, e.to_string()))
    }
}

impl ThreatModelPlatform for HttpPlatform {
    fn live_diagram(&self, project: &str) -> Result<Vec<u8>> {
        self.get_bytes("get live diagram", &["projects", project, "diagram"])
    }

    fn live_threats(&self, project: &str) -> Result<String> {
        self.get_collection("get live threats", &["projects", project, "threats"])
    }

    fn live_countermeasures(&self, project: &str) -> Result<String> {
        self.get_collection(
            "get live countermeasures",
            &["projects", project, "countermeasures"],
        )
    }

    fn version_diagram(&self, project: &str, version: &str) -> Result<Vec<u8>> {
        self.get_bytes(
            "get version diagram",
            &["projects", project, "versions", version, "diagram"],
        )
    }

    fn version_threats(&self, project: &str, version: &str) -> Result<String> {
        self.get_collection(
            "get version threats",
            &["projects", project, "versions", version, "threats"],
        )
    }

    fn version_countermeasures(&self, project: &str, version: &str) -> Result<String> {
        self.get_collection(
            "get version countermeasures",
            &["projects", project, "versions", version, "countermeasures"],
        )
    }

    fn import_architecture(
        &self,
        project: &str,
        architecture: &ValidatedArchitecture,
    ) -> Result<JobHandle> {
        const OPERATION: &str = "import architecture";
        let url = self.endpoint(&["projects", project, "import", "otm"])?;
        let request = self
            .client
            .post(url)
            .header(
                reqwest::header::CONTENT_TYPE,
                architecture_content_type(architecture.content()),
            )
            .body(architecture.content().to_string());
        let created: CreatedResource = self
            .send(OPERATION, request)?
            .json()
            .map_err(|e| invalid_response(OPERATION, e.to_string()))?;
        Ok(JobHandle(created.id))
    }

    fn job_status(&self, job: &JobHandle) -> Result<JobStatus> {
        const OPERATION: &str = "get operation status";
        let url = self.endpoint(&["async-operations", &job.0])?;
        let raw: OperationStatus = self
            .send(OPERATION, self.client.get(url))?
            .json()
            .map_err(|e| invalid_response(OPERATION, e.to_string()))?;
        Ok(parse_job_status(raw))
    }

    fn create_version(&self, project: &str, name: &str, description: &str) -> Result<String> {
        const OPERATION: &str = "create version";
        let url = self.endpoint(&["projects", project, "versions"])?;
        let request = self.client.post(url).json(&serde_json::json!({
            "name": name,
            "description": description,
        }));
        let created: CreatedResource = self
            .send(OPERATION, request)?
            .json()
            .map_err(|e| invalid_response(OPERATION, e.to_string()))?;
        Ok(created.id)
    }

    fn delete_version(&self, project: &str, version: &str) -> Result<()> {
        let url = self.endpoint(&["projects", project, "versions", version])?;
        self.send("delete version", self.client.delete(url))?;
        Ok(())
    }

    fn restore_to_version(&self, project: &str, version: &str) -> Result<()> {
        let url = self.endpoint(&["projects", project, "versions", version, "restore"])?;
        self.send("restore version", self.client.post(url))?;
        Ok(())
    }
}
