use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use onair_model::FeedSnapshot;
use serde::Deserialize;

use super::{FEED_STATUS_HEADER, FEED_VERSION_HEADER};
use crate::infra::{
    app_state::AppState,
    auth::{AccessScope, require_scope},
    errors::{AppError, AppResult},
    middleware::rate_limit::RateLimitDecision,
};

/// Raw query parameters. Unparseable values fall back to the defaults like
/// missing ones do; everything is clamped afterwards.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedParams {
    pub lookahead: Option<String>,
    pub max_items: Option<String>,
}

fn parse_number(raw: Option<&str>) -> Option<i64> {
    raw.and_then(|value| value.trim().parse().ok())
}

/// `GET /feed`
///
/// `X-Feed-Version` is only comparable between responses for the same
/// clamped `lookahead` and `maxItems`. Across different queries it can go
/// backwards.
pub async fn get_feed(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<FeedParams>,
) -> AppResult<Response> {
    require_scope(state.authorizer.as_ref(), &headers, AccessScope::Feed).await?;

    if let RateLimitDecision::Limited { retry_after } = state.feed_limiter.check() {
        return Err(AppError::rate_limited(retry_after));
    }

    let query = state.feed_bounds.clamp(
        parse_number(params.lookahead.as_deref()),
        parse_number(params.max_items.as_deref()),
    );
    let cancel = state.shutdown.child_token();
    let snapshot = state.feed.get(query, &cancel).await?;

    snapshot_response(&headers, snapshot)
}

fn snapshot_response(request_headers: &HeaderMap, snapshot: FeedSnapshot) -> AppResult<Response> {
    let mut headers = HeaderMap::new();
    let etag = HeaderValue::from_str(&snapshot.etag)
        .map_err(|_| AppError::internal("Feed entity tag is not a valid header value"))?;
    headers.insert(header::ETAG, etag);
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(
        FEED_VERSION_HEADER,
        HeaderValue::from(snapshot.schedule_version),
    );
    headers.insert(
        FEED_STATUS_HEADER,
        HeaderValue::from_static(snapshot.feed_status.as_str()),
    );

    if let Some(if_none_match) = request_headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        && if_none_match
            .split(',')
            .any(|tag| tag.trim() == snapshot.etag || tag.trim() == "*")
    {
        return Ok((StatusCode::NOT_MODIFIED, headers).into_response());
    }

    Ok((StatusCode::OK, headers, Json(snapshot)).into_response())
}
