//! reqwest-backed adapters.

use std::time::Duration;

use async_trait::async_trait;
use onair_model::{EnvelopeWindow, ScheduleItem};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, de::DeserializeOwned};
use tracing::debug;
use url::Url;

use super::{AutomationEngine, ContentSource, CreatedEntry, RemoteResult};
use crate::error::RemoteError;

/// Base URL plus optional bearer token for one remote system.
#[derive(Debug, Clone)]
pub struct HttpEndpoint {
    client: Client,
    base: Url,
    token: Option<String>,
    timeout: Duration,
}

impl HttpEndpoint {
    pub fn new(
        base: Url,
        token: Option<String>,
        timeout: Duration,
    ) -> RemoteResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| RemoteError::Transient(err.to_string()))?;
        Ok(Self::with_client(client, base, token, timeout))
    }

    pub fn with_client(
        client: Client,
        base: Url,
        token: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            base,
            token,
            timeout,
        }
    }

    fn url(&self, segments: &[&str]) -> RemoteResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| {
                RemoteError::Rejected {
                    status: 0,
                    message: format!("base url {} cannot carry a path", self.base),
                }
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> RemoteResult<Response> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|err| map_transport_error(err, self.timeout))?;
        check_status(response).await
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> RemoteResult<T> {
        let response = self.send(request).await?;
        response
            .json::<T>()
            .await
            .map_err(|err| RemoteError::Decode(err.to_string()))
    }
}

fn map_transport_error(err: reqwest::Error, timeout: Duration) -> RemoteError {
    if err.is_timeout() {
        RemoteError::Timeout(timeout)
    } else if err.is_decode() {
        RemoteError::Decode(err.to_string())
    } else {
        RemoteError::Transient(err.to_string())
    }
}

async fn check_status(response: Response) -> RemoteResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();
    debug!(%status, %url, "remote call returned error status");
    Err(classify_status(status, body))
}

pub(crate) fn classify_status(status: StatusCode, body: String) -> RemoteError {
    match status {
        StatusCode::NOT_FOUND => RemoteError::NotFound(body),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            RemoteError::Transient(format!("{status}: {body}"))
        }
        s if s.is_server_error() => RemoteError::Transient(format!("{status}: {body}")),
        s => RemoteError::Rejected {
            status: s.as_u16(),
            message: body,
        },
    }
}

#[derive(Debug, Clone)]
pub struct HttpContentSource {
    endpoint: HttpEndpoint,
}

impl HttpContentSource {
    pub fn new(endpoint: HttpEndpoint) -> Self {
        Self { endpoint }
    }
}

#[async_trait]
impl ContentSource for HttpContentSource {
    async fn list_scheduled(
        &self,
        window: &EnvelopeWindow,
    ) -> RemoteResult<Vec<ScheduleItem>> {
        let url = self.endpoint.url(&["schedule"])?;
        let request = self.endpoint.client.get(url).query(&[
            ("start", window.window_start.to_rfc3339()),
            ("end", window.window_end.to_rfc3339()),
        ]);
        self.endpoint.send_json(request).await
    }
}

#[derive(Debug, Clone)]
pub struct HttpAutomationEngine {
    endpoint: HttpEndpoint,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedBody {
    instance_ref: String,
}

impl HttpAutomationEngine {
    pub fn new(endpoint: HttpEndpoint) -> Self {
        Self { endpoint }
    }
}

#[async_trait]
impl AutomationEngine for HttpAutomationEngine {
    async fn list_entries(
        &self,
        window: &EnvelopeWindow,
    ) -> RemoteResult<Vec<ScheduleItem>> {
        let url = self.endpoint.url(&["entries"])?;
        let request = self.endpoint.client.get(url).query(&[
            ("start", window.window_start.to_rfc3339()),
            ("end", window.window_end.to_rfc3339()),
        ]);
        self.endpoint.send_json(request).await
    }

    /// `201 Created` means a new entry; any other success status means the id
    /// was already queued.
    async fn create_entry(&self, item: &ScheduleItem) -> RemoteResult<CreatedEntry> {
        let url = self.endpoint.url(&["entries"])?;
        let request = self.endpoint.client.post(url).json(item);
        let response = self.endpoint.send(request).await?;
        let reused = response.status() != StatusCode::CREATED;
        let body: CreatedBody = response
            .json()
            .await
            .map_err(|err| RemoteError::Decode(err.to_string()))?;
        Ok(CreatedEntry {
            instance_ref: body.instance_ref,
            reused,
        })
    }

    async fn update_entry(
        &self,
        instance_ref: &str,
        item: &ScheduleItem,
    ) -> RemoteResult<()> {
        let url = self.endpoint.url(&["entries", instance_ref])?;
        let request = self.endpoint.client.put(url).json(item);
        self.endpoint.send(request).await.map(|_| ())
    }

    async fn delete_entry(&self, instance_ref: &str) -> RemoteResult<()> {
        let url = self.endpoint.url(&["entries", instance_ref])?;
        let request = self.endpoint.client.delete(url);
        self.endpoint.send(request).await.map(|_| ())
    }
}
