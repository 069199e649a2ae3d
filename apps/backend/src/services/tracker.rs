//! Thin bridge to the external issue tracker.
//!
//! The tracker is never on the critical path of a room: calls happen outside
//! the room coordinator and failures are reported back to the caller in a
//! [`TrackerSync`] field instead of rolling anything back.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::story::normalize_external_key;
use crate::domain::{Role, RoleEstimates};
use crate::errors::ErrorCode;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("tracker not configured")]
    NotConfigured,
    #[error("invalid tracker base url '{0}'")]
    BaseUrl(String),
    #[error("tracker returned an unusable item key '{0}'")]
    InvalidKey(String),
    #[error("tracker request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("tracker answered {status}: {body}")]
    Status { status: u16, body: String },
}

#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Create a work item under `planning_unit` and return its key.
    async fn create_item(
        &self,
        planning_unit: &str,
        title: &str,
        roles: &[Role],
    ) -> Result<String, TrackerError>;

    async fn push_estimate(&self, key: &str, hours: &RoleEstimates) -> Result<(), TrackerError>;
}

/// Used when no tracker is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledTracker;

#[async_trait]
impl IssueTracker for DisabledTracker {
    async fn create_item(&self, _: &str, _: &str, _: &[Role]) -> Result<String, TrackerError> {
        Err(TrackerError::NotConfigured)
    }

    async fn push_estimate(&self, _: &str, _: &RoleEstimates) -> Result<(), TrackerError> {
        Err(TrackerError::NotConfigured)
    }
}

#[derive(Serialize)]
struct CreateItemBody<'a> {
    planning_unit: &'a str,
    title: &'a str,
    roles: &'a [Role],
}

#[derive(Deserialize)]
struct CreatedItem {
    key: String,
}

#[derive(Serialize)]
struct EstimateBody<'a> {
    hours: &'a RoleEstimates,
}

/// JSON-over-HTTP tracker bridge with bearer authentication.
#[derive(Debug, Clone)]
pub struct HttpTracker {
    client: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpTracker {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self, TrackerError> {
        let raw = base_url.into();
        let base_url = Url::parse(&raw)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or(TrackerError::BaseUrl(raw))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    /// Base URL with `segments` appended, each percent-encoded as one segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, TrackerError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| TrackerError::BaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        let req = self
            .client
            .request(method, url)
            .header("Accept", "application/json");
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, TrackerError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(TrackerError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl IssueTracker for HttpTracker {
    async fn create_item(
        &self,
        planning_unit: &str,
        title: &str,
        roles: &[Role],
    ) -> Result<String, TrackerError> {
        let resp = self
            .request(reqwest::Method::POST, self.endpoint(&["items"])?)
            .json(&CreateItemBody {
                planning_unit,
                title,
                roles,
            })
            .send()
            .await?;
        let created: CreatedItem = Self::check(resp).await?.json().await?;
        match normalize_external_key(Some(created.key.as_str())) {
            Ok(Some(key)) => Ok(key),
            _ => Err(TrackerError::InvalidKey(created.key)),
        }
    }

    async fn push_estimate(&self, key: &str, hours: &RoleEstimates) -> Result<(), TrackerError> {
        let url = self.endpoint(&["items", key, "estimate"])?;
        let resp = self
            .request(reqwest::Method::PUT, url)
            .json(&EstimateBody { hours })
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Ok,
    Failed,
    Skipped,
}

/// Outcome of the tracker side of a request, reported next to the local
/// result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackerSync {
    pub status: SyncStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TrackerSync {
    pub fn ok() -> Self {
        Self {
            status: SyncStatus::Ok,
            code: None,
            message: None,
        }
    }

    pub fn skipped() -> Self {
        Self {
            status: SyncStatus::Skipped,
            code: None,
            message: None,
        }
    }

    pub fn failed(err: &TrackerError) -> Self {
        let code = match err {
            TrackerError::NotConfigured => ErrorCode::TrackerNotConfigured,
            _ => ErrorCode::TrackerSyncFailed,
        };
        Self {
            status: SyncStatus::Failed,
            code: Some(code),
            message: Some(err.to_string()),
        }
    }
}
