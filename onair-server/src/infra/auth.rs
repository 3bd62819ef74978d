//! Authorization boundary. Requests are checked here before any rate limiting
//! or feed work happens.

use std::{collections::HashSet, time::Duration};

use async_trait::async_trait;
use axum::http::{HeaderMap, header};
use reqwest::{Client, StatusCode};
use tracing::warn;
use url::Url;

use super::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessScope {
    /// Read the feed.
    Feed,
    /// Diff and apply the schedule. Elevated.
    Schedule,
}

impl AccessScope {
    pub fn as_str(self) -> &'static str {
        match self {
            AccessScope::Feed => "feed",
            AccessScope::Schedule => "schedule",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthDecision {
    Allow,
    Deny,
}

#[async_trait]
pub trait Authorizer: Send + Sync + std::fmt::Debug {
    async fn authorize(&self, token: &str, scope: AccessScope) -> AuthDecision;
}

/// Fixed token lists from configuration. Admin tokens carry every scope.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenAuthorizer {
    feed: HashSet<String>,
    admin: HashSet<String>,
}

impl StaticTokenAuthorizer {
    pub fn new<I, J>(feed_tokens: I, admin_tokens: J) -> Self
    where
        I: IntoIterator<Item = String>,
        J: IntoIterator<Item = String>,
    {
        Self {
            feed: feed_tokens.into_iter().collect(),
            admin: admin_tokens.into_iter().collect(),
        }
    }
}

#[async_trait]
impl Authorizer for StaticTokenAuthorizer {
    async fn authorize(&self, token: &str, scope: AccessScope) -> AuthDecision {
        let allowed = self.admin.contains(token)
            || (scope == AccessScope::Feed && self.feed.contains(token));
        if allowed {
            AuthDecision::Allow
        } else {
            AuthDecision::Deny
        }
    }
}

/// Delegates to an external service: `GET <url>?scope=<scope>` with the
/// caller's bearer token. Anything other than a clear 2xx denies.
#[derive(Debug, Clone)]
pub struct HttpAuthorizer {
    client: Client,
    url: Url,
}

impl HttpAuthorizer {
    pub fn new(url: Url, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl Authorizer for HttpAuthorizer {
    async fn authorize(&self, token: &str, scope: AccessScope) -> AuthDecision {
        let response = self
            .client
            .get(self.url.clone())
            .query(&[("scope", scope.as_str())])
            .bearer_auth(token)
            .send()
            .await;

        match response {
            Ok(response) if response.status().is_success() => AuthDecision::Allow,
            Ok(response)
                if matches!(
                    response.status(),
                    StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
                ) =>
            {
                AuthDecision::Deny
            }
            Ok(response) => {
                warn!(
                    status = %response.status(),
                    scope = scope.as_str(),
                    "authorizer returned unexpected status; denying"
                );
                AuthDecision::Deny
            }
            Err(err) => {
                warn!(error = %err, scope = scope.as_str(), "authorizer unreachable; denying");
                AuthDecision::Deny
            }
        }
    }
}

/// The token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

pub async fn require_scope(
    authorizer: &dyn Authorizer,
    headers: &HeaderMap,
    scope: AccessScope,
) -> Result<(), AppError> {
    let Some(token) = bearer_token(headers) else {
        return Err(AppError::unauthorized("Missing bearer token"));
    };
    match authorizer.authorize(token, scope).await {
        AuthDecision::Allow => Ok(()),
        AuthDecision::Deny => Err(AppError::unauthorized(format!(
            "Token is not authorized for {}",
            scope.as_str()
        ))),
    }
}
