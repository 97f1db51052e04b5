use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use sitekick_core::gate::{SendOutcome, SendRequest};
use sitekick_core::types::EventType;

use crate::error::AppError;
use crate::state::AppState;

fn parse_subject(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| AppError::bad_request(format!("invalid subjectId '{raw}'")))
}

fn parse_actor(raw: Option<&str>) -> Result<Option<Uuid>, AppError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(id) => Uuid::parse_str(id)
            .map(Some)
            .map_err(|_| AppError::bad_request(format!("invalid actorId '{id}'"))),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendBody {
    pub subject_id: String,
    pub event_type: String,
    #[serde(default)]
    pub actor_id: Option<String>,
}

/// POST /api/admin/notifications/send: gate, send and record one email.
pub async fn send_notification(
    State(app): State<AppState>,
    Json(body): Json<SendBody>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let request = SendRequest {
        subject_id: parse_subject(&body.subject_id)?,
        event_type: body.event_type.parse::<EventType>()?,
        actor_id: parse_actor(body.actor_id.as_deref())?,
    };

    let outcome = app.gate.send(request).await?;
    let message = outcome.message(request.event_type);

    let response = match outcome {
        SendOutcome::Sent { record, .. } => (
            StatusCode::OK,
            serde_json::json!({
                "success": true,
                "message": message,
                "recordId": record.id,
            }),
        ),
        SendOutcome::NotEligible {
            reasons,
            current_state,
        } => (
            StatusCode::BAD_REQUEST,
            serde_json::json!({
                "error": message,
                "reasons": reasons,
                "currentState": current_state,
            }),
        ),
        SendOutcome::Duplicate {
            last_sent_at,
            current_state,
        } => (
            StatusCode::CONFLICT,
            serde_json::json!({
                "error": message,
                "currentState": current_state,
                "duplicate": true,
                "lastSent": last_sent_at,
            }),
        ),
    };

    Ok((response.0, Json(response.1)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusQuery {
    pub subject_id: String,
    pub event_type: String,
}

/// GET /api/admin/notifications/status: eligibility and duplicate check.
pub async fn notification_status(
    State(app): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let subject_id = parse_subject(&query.subject_id)?;
    let event_type = query.event_type.parse::<EventType>()?;
    let status = app.gate.status(subject_id, event_type).await?;
    Ok(Json(serde_json::to_value(status)?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    pub subject_id: String,
    #[serde(default)]
    pub event_type: Option<String>,
}

/// GET /api/admin/notifications/history: audit log, newest first.
pub async fn notification_history(
    State(app): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let subject_id = parse_subject(&query.subject_id)?;
    let event_type = query
        .event_type
        .as_deref()
        .map(str::parse::<EventType>)
        .transpose()?;

    let records = app.gate.history(subject_id, event_type).await?;
    let list: Vec<serde_json::Value> = records
        .iter()
        .map(|r| {
            serde_json::json!({
                "id": r.id,
                "eventType": r.event_type,
                "outcome": r.outcome,
                "sentAt": r.sent_at,
                "triggerSnapshot": r.trigger_snapshot,
                "actorId": r.actor_id,
                "providerMessageId": r.provider_message_id,
                "error": r.error,
            })
        })
        .collect();
    Ok(Json(serde_json::json!(list)))
}
