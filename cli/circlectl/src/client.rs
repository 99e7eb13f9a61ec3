//! HTTP client for the CircleCI API.
//!
//! Every public method issues one request (the `envvar` setter issues one
//! per assignment) and returns either the raw decoded body (verbose) or the
//! reduced view the formatter prints.

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;

use crate::config::Configuration;
use crate::error::ApiError;
use crate::filters::{self, Filters};
use crate::output::{ComponentStatus, Payload, Record};

/// Public status page summary.
pub const DEFAULT_STATUS_URL: &str = "https://status.circleci.com/api/v2/summary.json";

const ME_FIELDS: &[&str] = &["login", "name", "selected_email", "created_at"];
const PROJECT_FIELDS: &[&str] = &["username", "reponame", "vcs_type", "default_branch"];
const BUILD_LIST_FIELDS: &[&str] = &[
    "build_num",
    "username",
    "reponame",
    "branch",
    "status",
    "start_time",
];
const BUILD_FIELDS: &[&str] = &[
    "build_num",
    "username",
    "reponame",
    "branch",
    "status",
    "outcome",
    "subject",
    "build_url",
];
const ARTIFACT_FIELDS: &[&str] = &["path", "url"];
const CACHE_FIELDS: &[&str] = &["status"];

/// `username/project` on a VCS host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectRef {
    pub username: String,
    pub project: String,
}

impl ProjectRef {
    pub fn new(username: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            project: project.into(),
        }
    }
}

/// API client for CircleCI v1.1.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    vcs_type: String,
}

impl ApiClient {
    /// Create a new API client from the resolved configuration.
    pub fn new(config: &Configuration, vcs_type: &str) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.token))
            .map_err(|_| ApiError::InvalidToken)?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(concat!("circlectl/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: config.baseurl.trim_end_matches('/').to_string(),
            vcs_type: vcs_type.to_string(),
        })
    }

    /// Build a URL for an endpoint.
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn project_path(&self, project: &ProjectRef) -> String {
        format!(
            "/project/{}/{}/{}",
            self.vcs_type, project.username, project.project
        )
    }

    /// Current user's account info.
    pub async fn me(&self, verbose: bool) -> Result<Payload, ApiError> {
        let value = self.send(Method::GET, "/me", None).await?;
        reduce_record(value, verbose, ME_FIELDS)
    }

    /// Followed projects.
    pub async fn projects(&self, verbose: bool, filters: &Filters) -> Result<Payload, ApiError> {
        let value = self.send(Method::GET, "/projects", None).await?;
        reduce_list(value, verbose, filters, PROJECT_FIELDS)
    }

    /// One build when `build_num` is given, otherwise the project's recent builds.
    pub async fn builds(
        &self,
        project: &ProjectRef,
        build_num: Option<u64>,
        verbose: bool,
        filters: &Filters,
    ) -> Result<Payload, ApiError> {
        match build_num {
            Some(num) => {
                let path = format!("{}/{num}", self.project_path(project));
                let value = self.send(Method::GET, &path, None).await?;
                reduce_record(value, verbose, BUILD_FIELDS)
            }
            None => {
                let value = self
                    .send(Method::GET, &self.project_path(project), None)
                    .await?;
                reduce_list(value, verbose, filters, BUILD_LIST_FIELDS)
            }
        }
    }

    /// Artifacts produced by a build.
    pub async fn artifacts(
        &self,
        project: &ProjectRef,
        build_num: u64,
        verbose: bool,
        filters: &Filters,
    ) -> Result<Payload, ApiError> {
        let path = format!("{}/{build_num}/artifacts", self.project_path(project));
        let value = self.send(Method::GET, &path, None).await?;
        reduce_list(value, verbose, filters, ARTIFACT_FIELDS)
    }

    /// Retry a build.
    pub async fn retry_build(
        &self,
        project: &ProjectRef,
        build_num: u64,
        verbose: bool,
    ) -> Result<Payload, ApiError> {
        let path = format!("{}/{build_num}/retry", self.project_path(project));
        let value = self.send(Method::POST, &path, None).await?;
        reduce_record(value, verbose, BUILD_FIELDS)
    }

    /// Cancel a running build.
    pub async fn cancel_build(
        &self,
        project: &ProjectRef,
        build_num: u64,
        verbose: bool,
    ) -> Result<Payload, ApiError> {
        let path = format!("{}/{build_num}/cancel", self.project_path(project));
        let value = self.send(Method::POST, &path, None).await?;
        reduce_record(value, verbose, BUILD_FIELDS)
    }

    /// Clear the project's build cache.
    pub async fn clear_cache(&self, project: &ProjectRef, verbose: bool) -> Result<Payload, ApiError> {
        let path = format!("{}/build-cache", self.project_path(project));
        let value = self.send(Method::DELETE, &path, None).await?;
        reduce_record(value, verbose, CACHE_FIELDS)
    }

    /// List environment variable names, or set each assignment and list the
    /// variables that were written.
    pub async fn envvar(
        &self,
        project: &ProjectRef,
        verbose: bool,
        assignments: &Filters,
    ) -> Result<Payload, ApiError> {
        let path = format!("{}/envvar", self.project_path(project));

        if assignments.is_empty() {
            let value = self.send(Method::GET, &path, None).await?;
            return reduce_names(value, verbose);
        }

        let mut written = Vec::with_capacity(assignments.len());
        for (name, value) in assignments {
            let body = serde_json::json!({ "name": name, "value": value });
            written.push(self.send(Method::POST, &path, Some(&body)).await?);
        }
        reduce_names(Value::Array(written), verbose)
    }

    async fn send(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value, ApiError> {
        tracing::debug!(%method, path, "Sending API request");

        let mut request = self.client.request(method, self.url(path));
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;

        self.handle_response(response).await
    }

    /// Handle a successful or error response.
    async fn handle_response(&self, response: reqwest::Response) -> Result<Value, ApiError> {
        let status = response.status();

        if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| ApiError::Decode(e.to_string()))
        } else {
            self.handle_error(response).await
        }
    }

    /// Handle an error response.
    async fn handle_error<T>(&self, response: reqwest::Response) -> Result<T, ApiError> {
        let status = response.status();

        let message = response
            .json::<ApiErrorResponse>()
            .await
            .ok()
            .and_then(|body| body.message)
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("Unknown error")
                    .to_string()
            });

        tracing::debug!(status = status.as_u16(), %message, "API request failed");
        Err(ApiError::http(status.as_u16(), message))
    }
}

/// API error response structure.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    #[serde(default)]
    message: Option<String>,
}

fn reduce_record(value: Value, verbose: bool, fields: &[&str]) -> Result<Payload, ApiError> {
    if verbose {
        return Ok(Payload::Raw(value));
    }
    Record::pick(&value, fields)
        .map(Payload::Record)
        .ok_or(ApiError::UnexpectedShape {
            expected: "an object",
        })
}

fn reduce_list(
    value: Value,
    verbose: bool,
    filters: &Filters,
    fields: &[&str],
) -> Result<Payload, ApiError> {
    let items = match value {
        Value::Array(items) => filters::apply(items, filters),
        other if verbose => return Ok(Payload::Raw(other)),
        _ => {
            return Err(ApiError::UnexpectedShape {
                expected: "a list",
            })
        }
    };

    if verbose {
        return Ok(Payload::Raw(Value::Array(items)));
    }
    items
        .iter()
        .map(|item| Record::pick(item, fields))
        .collect::<Option<Vec<_>>>()
        .map(Payload::Records)
        .ok_or(ApiError::UnexpectedShape {
            expected: "a list of objects",
        })
}

fn reduce_names(value: Value, verbose: bool) -> Result<Payload, ApiError> {
    if verbose {
        return Ok(Payload::Raw(value));
    }
    let Value::Array(items) = value else {
        return Err(ApiError::UnexpectedShape {
            expected: "a list",
        });
    };
    items
        .iter()
        .map(|item| item.get("name").and_then(Value::as_str).map(str::to_string))
        .collect::<Option<Vec<_>>>()
        .map(Payload::Names)
        .ok_or(ApiError::UnexpectedShape {
            expected: "a list of named variables",
        })
}

#[derive(Debug, Deserialize)]
struct StatusSummary {
    status: PageStatus,
    #[serde(default)]
    components: Vec<StatusComponent>,
}

#[derive(Debug, Deserialize)]
struct PageStatus {
    description: String,
}

#[derive(Debug, Deserialize)]
struct StatusComponent {
    name: String,
    status: String,
    #[serde(default)]
    group: bool,
}

/// Fetch the public status page summary. No authentication is sent.
///
/// Any failure, including a malformed body, is reported as
/// [`ApiError::StatusUnreachable`].
pub async fn fetch_status(url: &str, verbose: bool) -> Result<Payload, ApiError> {
    tracing::debug!(url, "Fetching status page");

    let response = reqwest::Client::new()
        .get(url)
        .header(ACCEPT, "application/json")
        .send()
        .await
        .map_err(|e| {
            tracing::debug!(error = %e, "Status page request failed");
            ApiError::StatusUnreachable
        })?;

    if !response.status().is_success() {
        tracing::debug!(status = response.status().as_u16(), "Status page returned an error");
        return Err(ApiError::StatusUnreachable);
    }

    let value: Value = response
        .json()
        .await
        .map_err(|_| ApiError::StatusUnreachable)?;

    if verbose {
        return Ok(Payload::Raw(value));
    }

    let summary: StatusSummary =
        serde_json::from_value(value).map_err(|_| ApiError::StatusUnreachable)?;

    let mut lines = vec![ComponentStatus {
        name: None,
        status: summary.status.description,
    }];
    lines.extend(
        summary
            .components
            .into_iter()
            .filter(|component| !component.group)
            .map(|component| ComponentStatus {
                name: Some(component.name),
                status: component.status.replace('_', " "),
            }),
    );
    Ok(Payload::Components(lines))
}
