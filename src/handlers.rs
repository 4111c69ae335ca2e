use crate::consts::{APP_BANNER, START_PATH, STATUS_PATH};
use crate::dialog::{TurnHint, TurnInput};
use crate::engine::DialogTurn;
use crate::error::AppError;
use crate::twilio_types::{CallStatus, TwilioVoicePayload};
use crate::types::AppState;
use crate::utils::{reply_to_twiml, twiml_response};

use axum::{
    extract::{Host, RawQuery, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

fn parse_voice_payload(body: &str) -> Result<TwilioVoicePayload, AppError> {
    trace!(body=%body, "voice webhook body");
    serde_urlencoded::from_str::<TwilioVoicePayload>(body).map_err(|e| {
        error!(error=%e, "failed to deserialize Twilio voice payload");
        AppError::BadRequest("malformed voice webhook")
    })
}

#[derive(Deserialize, Debug, Default)]
struct TurnQuery {
    hint: Option<String>,
}

fn read_hint(query: Option<&str>) -> Result<TurnHint, String> {
    let query = match query {
        Some(query) => {
            serde_urlencoded::from_str::<TurnQuery>(query).map_err(|e| e.to_string())?
        }
        None => TurnQuery::default(),
    };
    match query.hint {
        Some(hint) => hint.parse::<TurnHint>().map_err(|e| e.to_string()),
        None => Ok(TurnHint::default()),
    }
}

pub async fn index() -> &'static str {
    APP_BANNER
}

/// Twilio's first request for a call.
pub async fn call_start(
    State(app_state): State<Arc<AppState>>,
    body: String,
) -> Result<(StatusCode, HeaderMap, String), AppError> {
    let payload = parse_voice_payload(&body)?;
    debug!(call_id=%payload.call_sid, status=?payload.call_status, "call start webhook");
    let caller_id = payload.from.unwrap_or_default();
    let reply = app_state
        .engine
        .call_initiated(&payload.call_sid, &caller_id)
        .await?;
    Ok(twiml_response(reply_to_twiml(&reply)))
}

/// Gather action callback: one caller answer.
pub async fn call_turn(
    State(app_state): State<Arc<AppState>>,
    RawQuery(query): RawQuery,
    body: String,
) -> Result<(StatusCode, HeaderMap, String), AppError> {
    let payload = parse_voice_payload(&body)?;
    let hint = read_hint(query.as_deref()).unwrap_or_else(|e| {
        warn!(call_id=%payload.call_sid, error=%e, "ignoring unreadable turn hint");
        TurnHint::default()
    });
    debug!(
        call_id=%payload.call_sid,
        digits=?payload.digits,
        speech=?payload.speech_result,
        confidence=?payload.confidence,
        hint=?hint,
        "dialog turn webhook"
    );

    let turn = DialogTurn {
        call_id: payload.call_sid,
        caller_id: payload.from,
        input: TurnInput::new(payload.digits, payload.speech_result),
        hint,
    };
    let reply = app_state.engine.dialog_turn(turn).await?;
    Ok(twiml_response(reply_to_twiml(&reply)))
}

/// Call status callback. Only end-of-call statuses matter here.
pub async fn call_status(
    State(app_state): State<Arc<AppState>>,
    body: String,
) -> Result<StatusCode, AppError> {
    let payload = parse_voice_payload(&body)?;
    debug!(call_id=%payload.call_sid, status=?payload.call_status, "call status webhook");
    if let Some(
        CallStatus::Completed
        | CallStatus::Busy
        | CallStatus::Failed
        | CallStatus::NoAnswer
        | CallStatus::Canceled,
    ) = payload.call_status
    {
        app_state.engine.call_ended(&payload.call_sid).await;
    }
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize, Debug)]
pub struct InitiateCall {
    pub to: String,
}

/// Place an outbound test call that lands in the same dialog.
pub async fn call_initiate(
    Host(host): Host,
    State(app_state): State<Arc<AppState>>,
    body: String,
) -> Result<impl IntoResponse, AppError> {
    let request = serde_urlencoded::from_str::<InitiateCall>(&body)
        .map_err(|_| AppError::BadRequest("expected form field 'to'"))?;
    if request.to.trim().is_empty() {
        return Err(AppError::BadRequest("expected form field 'to'"));
    }
    let client = app_state.telephony.as_ref().ok_or(AppError::ConfigurationMissing(
        "Twilio client not initialized. Check credentials.",
    ))?;

    let base = app_state
        .public_base_url
        .clone()
        .unwrap_or_else(|| format!("https://{host}"));
    let callback_url = format!("{base}{START_PATH}");
    let status_url = format!("{base}{STATUS_PATH}");
    let sid = client
        .place_call(request.to.trim(), &callback_url, &status_url)
        .await?;

    Ok((
        StatusCode::OK,
        format!("Test call initiated to {}. SID: {sid}", request.to.trim()),
    ))
}
