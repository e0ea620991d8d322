//! HTTP gateway to the remote target system.
//!
//! Implements [`TargetGateway`] over reqwest: a GET writability check, a PUT
//! write, and an optional GET revision lookup, all against endpoint templates
//! rendered relative to the configured base URL, with the outbound auth
//! header injected when one is configured.

mod endpoints;

pub use endpoints::render_endpoint;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use conveyor_auth::AuthProvider;
use conveyor_config::TargetConfig;
use conveyor_dispatch::{GatewayError, Job, TargetGateway};

/// Response shape of the revision lookup endpoint.
#[derive(Debug, Deserialize)]
struct RevisionResponse {
    latest_revision: String,
}

/// Gateway performing the remote calls for one configured target.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: Client,
    target: TargetConfig,
    auth: AuthProvider,
}

impl HttpGateway {
    pub fn new(target: TargetConfig, auth: AuthProvider) -> Self {
        Self {
            client: Client::builder()
                .user_agent(concat!("conveyor/", env!("CARGO_PKG_VERSION")))
                .build()
                .expect("failed to build HTTP client"),
            target,
            auth,
        }
    }

    fn url_for(&self, template: &str, job: &Job) -> String {
        format!(
            "{}{}",
            self.target.base_url,
            render_endpoint(template, job)
        )
    }

    /// The wire encoding for a write: the job's declared type wins, then the
    /// target's configured default, then JSON.
    fn write_content_type(&self, job: &Job) -> &str {
        match job
            .content_type
            .as_deref()
            .or(self.target.content_type.as_deref())
        {
            Some("xml") => "application/xml",
            _ => "application/json",
        }
    }

    async fn authorized(&self, builder: RequestBuilder) -> Result<RequestBuilder, GatewayError> {
        match self.auth.auth_header().await.map_err(GatewayError::auth)? {
            Some(header) => Ok(builder.header(AUTHORIZATION, header)),
            None => Ok(builder),
        }
    }

    fn get(&self, url: &str) -> RequestBuilder {
        self.client
            .request(Method::GET, url)
            .header(CONTENT_TYPE, "application/json")
    }
}

#[async_trait]
impl TargetGateway for HttpGateway {
    async fn check_writable(&self, job: &Job) -> Result<bool, GatewayError> {
        let url = self.url_for(&self.target.endpoints.check, job);
        let request = self.authorized(self.get(&url)).await?;
        let response = request.send().await.map_err(GatewayError::transport)?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => {
                // Missing and blocked both mean "retry later".
                warn!(uid = %job.uid, "target object not found");
                Ok(false)
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                debug!(uid = %job.uid, status = %status, body = %body, "object not writable");
                Ok(false)
            }
        }
    }

    async fn write_data(&self, job: &Job) -> Result<(), GatewayError> {
        let content_type = self.write_content_type(job);
        let body: Vec<u8> = match content_type {
            "application/xml" => job
                .data
                .as_str()
                .map(|s| s.as_bytes().to_vec())
                .ok_or_else(|| {
                    GatewayError::Serialization(
                        "xml payload must be a string carrying the document".into(),
                    )
                })?,
            _ => serde_json::to_vec(&job.data)
                .map_err(|e| GatewayError::Serialization(e.to_string()))?,
        };

        let url = self.url_for(&self.target.endpoints.write, job);
        let request = self
            .authorized(
                self.client
                    .request(Method::PUT, &url)
                    .header(CONTENT_TYPE, content_type)
                    .body(body),
            )
            .await?;
        let response = request.send().await.map_err(GatewayError::transport)?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(GatewayError::Rejected {
            status: status.as_u16(),
            body,
        })
    }

    async fn latest_revision(&self, job: &Job) -> Result<Option<String>, GatewayError> {
        let Some(template) = self.target.endpoints.revision.as_deref() else {
            return Ok(None);
        };

        let url = self.url_for(template, job);
        let request = self.authorized(self.get(&url)).await?;
        let response = request.send().await.map_err(GatewayError::transport)?;

        match response.status() {
            StatusCode::OK => {
                let revision: RevisionResponse = response
                    .json()
                    .await
                    .map_err(|e| GatewayError::Serialization(e.to_string()))?;
                Ok(Some(revision.latest_revision))
            }
            StatusCode::NOT_FOUND => {
                warn!(uid = %job.uid, "target object not found during revision lookup");
                Ok(None)
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                debug!(uid = %job.uid, status = %status, body = %body, "revision lookup unavailable");
                Ok(None)
            }
        }
    }

    fn has_revision_lookup(&self) -> bool {
        self.target.endpoints.revision.is_some()
    }
}
