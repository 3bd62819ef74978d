use axum::{Json, body::Bytes, extract::State, http::HeaderMap};
use onair_model::{ApplyReport, DiffSummary, EnvelopeWindow, FeedStatus, ReconcileMode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{info, warn};

use crate::infra::{
    app_state::AppState,
    auth::{AccessScope, require_scope},
    errors::{AppError, AppResult},
    middleware::rate_limit::RateLimitDecision,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffRequest {
    #[serde(default = "envelope_mode")]
    pub mode: ReconcileMode,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyRequest {
    #[serde(default = "envelope_mode")]
    pub mode: ReconcileMode,
    #[serde(default)]
    pub dry_run: bool,
}

fn envelope_mode() -> ReconcileMode {
    ReconcileMode::Envelope
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffResponse {
    pub summary: DiffSummary,
    pub window: EnvelopeWindow,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedState {
    pub status: FeedStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyResponse {
    pub success: bool,
    pub dry_run: bool,
    pub summary: DiffSummary,
    pub report: ApplyReport,
    pub feed: FeedState,
    /// Content hash of the feed after the apply, when one could be built.
    pub snapshot_id: Option<String>,
    pub window: EnvelopeWindow,
}

/// Bodies are parsed after authorization so a bad token is rejected before a
/// bad payload. An empty body takes the defaults.
fn parse_body<T: DeserializeOwned>(body: &Bytes) -> AppResult<T> {
    let raw: &[u8] = if body.iter().all(u8::is_ascii_whitespace) {
        b"{}"
    } else {
        body
    };
    serde_json::from_slice(raw)
        .map_err(|err| AppError::bad_request(format!("Invalid request body: {err}")))
}

async fn admit(state: &AppState, headers: &HeaderMap) -> AppResult<()> {
    require_scope(state.authorizer.as_ref(), headers, AccessScope::Schedule).await?;
    match state.schedule_limiter.check() {
        RateLimitDecision::Allowed => Ok(()),
        RateLimitDecision::Limited { retry_after } => Err(AppError::rate_limited(retry_after)),
    }
}

/// `POST /schedule/diff`
pub async fn diff_schedule(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<DiffResponse>> {
    admit(&state, &headers).await?;
    let DiffRequest { mode } = parse_body(&body)?;

    let window = match mode {
        ReconcileMode::Envelope => state.reconciler.envelope(),
    };
    let cancel = state.shutdown.child_token();
    let diff = state.reconciler.diff(&window, &cancel).await?;

    Ok(Json(DiffResponse {
        summary: diff.summary(),
        window,
    }))
}

/// `POST /schedule/apply`
pub async fn apply_schedule(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<ApplyResponse>> {
    admit(&state, &headers).await?;
    let ApplyRequest { mode, dry_run } = parse_body(&body)?;

    let window = match mode {
        ReconcileMode::Envelope => state.reconciler.envelope(),
    };
    let report = state
        .reconciler
        .reconcile(&window, dry_run, state.shutdown.child_token())
        .await?;

    let query = state.feed_bounds.default_query();
    let cancel = state.shutdown.child_token();
    let feed = if dry_run {
        state.feed.get(query, &cancel).await
    } else {
        state.feed.refresh(query, &cancel).await
    };
    let (feed_status, snapshot_id) = match feed {
        Ok(snapshot) => {
            let id = snapshot.content_hash().to_string();
            (snapshot.feed_status, Some(id))
        }
        Err(err) => {
            warn!(error = %err, "feed rebuild after apply failed");
            (FeedStatus::Error, None)
        }
    };

    info!(
        window = %window.label,
        dry_run,
        success = report.success(),
        feed_status = %feed_status,
        "schedule apply finished"
    );

    Ok(Json(ApplyResponse {
        success: report.success(),
        dry_run,
        summary: report.summary.clone(),
        report,
        feed: FeedState {
            status: feed_status,
        },
        snapshot_id,
        window,
    }))
}
