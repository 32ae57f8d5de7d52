//! Voice endpoints.
//!
//! Provider callbacks (`welcome`, `handle-input`, `status`) are public but
//! signature-checked and always answer with markup, never a JSON error, so
//! the caller hears an apology instead of dead air. Settings and test calls
//! are dashboard endpoints behind a bearer token.

use axum::{
    Form, Json, Router,
    extract::{Path, State, rejection::FormRejection},
    http::{StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::Value;
use tracing::{error, info, instrument};

use voice_confirm_core::{MenuChoice, PhoneNumber, VoiceSettings, VoiceSettingsPatch};

use super::current_store;
use crate::error::{AppError, Result};
use crate::middleware::{RequireUser, verify_twilio_signature};
use crate::models::Order;
use crate::services::calls::WorkflowError;
use crate::services::telephony::{CallPlacement, TEST_ORDER_NUMBER, TelephonyError};
use crate::state::AppState;

pub fn router(state: &AppState) -> Router<AppState> {
    let callbacks = Router::new()
        .route("/voice/welcome/{order_number}", get(welcome).post(welcome))
        .route("/voice/handle-input/{order_number}", post(handle_input))
        .route("/voice/status/{order_number}", post(status_callback))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            verify_twilio_signature,
        ));

    Router::new()
        .merge(callbacks)
        .route("/voice/settings", get(get_settings).put(update_settings))
        .route("/voice/test", post(test_call))
}

/// Voice markup response.
pub struct Twiml(pub String);

impl IntoResponse for Twiml {
    fn into_response(self) -> Response {
        ([(header::CONTENT_TYPE, "application/xml")], self.0).into_response()
    }
}

fn rendered(markup: std::result::Result<String, TelephonyError>) -> Result<Twiml> {
    markup
        .map(Twiml)
        .map_err(|e| AppError::Internal(e.to_string()))
}

fn is_test_call(order_number: &str) -> bool {
    order_number == TEST_ORDER_NUMBER
}

/// Parameters of the call that answered; sent as a query on GET.
#[derive(Debug, Default, Deserialize)]
pub struct CallForm {
    #[serde(rename = "CallSid")]
    pub call_sid: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GatherForm {
    #[serde(rename = "CallSid")]
    pub call_sid: Option<String>,
    #[serde(rename = "Digits")]
    pub digits: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusForm {
    #[serde(rename = "CallSid")]
    pub call_sid: String,
    #[serde(rename = "CallStatus")]
    pub call_status: String,
    #[serde(rename = "CallDuration")]
    pub call_duration: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TestCallRequest {
    pub phone_number: String,
}

/// Menu for a customer who just answered.
#[instrument(skip(state, form))]
async fn welcome(
    State(state): State<AppState>,
    Path(order_number): Path<String>,
    form: std::result::Result<Form<CallForm>, FormRejection>,
) -> Result<Twiml> {
    let ivr = state.ivr();
    if is_test_call(&order_number) {
        return rendered(ivr.render_menu(&order_number, &VoiceSettings::default()));
    }

    let call_sid = form.ok().and_then(|Form(f)| f.call_sid);
    let order = match state
        .workflow()
        .callback_order(&order_number, call_sid.as_deref())
        .await
    {
        Ok(order) => order,
        Err(e) => {
            error!(error = %e, "Order lookup failed");
            None
        }
    };
    let Some(order) = order else {
        return rendered(ivr.render_unknown_order(&VoiceSettings::default()));
    };

    let settings = settings_or_default(&state, &order).await;
    rendered(ivr.render_menu(&order_number, &settings))
}

async fn settings_or_default(state: &AppState, order: &Order) -> VoiceSettings {
    state
        .workflow()
        .voice_settings(order.store_id)
        .await
        .unwrap_or_else(|e| {
            error!(error = %e, "Voice settings unavailable");
            VoiceSettings::default()
        })
}

/// Keypad input from the menu.
#[instrument(skip(state, form))]
async fn handle_input(
    State(state): State<AppState>,
    Path(order_number): Path<String>,
    form: std::result::Result<Form<GatherForm>, FormRejection>,
) -> Result<Twiml> {
    // A gather timeout posts no digits at all
    let GatherForm { call_sid, digits } = form.map(|Form(f)| f).unwrap_or_default();
    let ivr = state.ivr();

    if is_test_call(&order_number) {
        let choice = MenuChoice::from_digits(digits.as_deref());
        return rendered(ivr.render_reply(&order_number, choice, &VoiceSettings::default()));
    }

    match state
        .workflow()
        .apply_menu_input(&order_number, call_sid.as_deref(), digits.as_deref())
        .await
    {
        Ok((order, choice)) => {
            let settings = settings_or_default(&state, &order).await;
            rendered(ivr.render_reply(&order_number, choice, &settings))
        }
        Err(WorkflowError::OrderNotFound) => {
            rendered(ivr.render_unknown_order(&VoiceSettings::default()))
        }
        Err(e) => {
            error!(error = %e, "Menu input not applied");
            rendered(ivr.render_unknown_order(&VoiceSettings::default()))
        }
    }
}

/// Terminal call outcome reported by the provider.
#[instrument(skip_all, fields(order_number = %order_number))]
async fn status_callback(
    State(state): State<AppState>,
    Path(order_number): Path<String>,
    Form(form): Form<StatusForm>,
) -> StatusCode {
    info!(call_sid = %form.call_sid, call_status = %form.call_status, "Call status received");
    if is_test_call(&order_number) {
        info!("Test call finished");
        return StatusCode::NO_CONTENT;
    }

    let duration = form
        .call_duration
        .as_deref()
        .and_then(|d| d.parse::<u32>().ok());
    // Always acknowledged
    if let Err(e) = state
        .workflow()
        .record_call_result(&order_number, &form.call_sid, &form.call_status, duration)
        .await
    {
        error!(error = %e, "Call status not recorded");
    }
    StatusCode::NO_CONTENT
}

async fn get_settings(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<Json<VoiceSettings>> {
    let store = current_store(&state, &user).await?;
    Ok(Json(store.voice_settings))
}

/// Partial update; the stored settings change only if the result is valid.
#[instrument(skip_all)]
async fn update_settings(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Json(body): Json<Value>,
) -> Result<Json<VoiceSettings>> {
    let patch: VoiceSettingsPatch =
        serde_json::from_value(body).map_err(|e| AppError::BadRequest(e.to_string()))?;
    let store = current_store(&state, &user).await?;
    let settings = store
        .voice_settings
        .merged(patch)
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let store = state
        .repos()
        .stores
        .update_voice_settings(store.id, &settings)
        .await?;
    info!(store_id = %store.id, "Voice settings updated");
    Ok(Json(store.voice_settings))
}

/// Ring a number with the menu, without touching any order.
#[instrument(skip_all)]
async fn test_call(
    State(state): State<AppState>,
    RequireUser(_user): RequireUser,
    Json(body): Json<TestCallRequest>,
) -> Result<Json<CallPlacement>> {
    let phone = PhoneNumber::parse_with_country_code(
        &body.phone_number,
        state.config().default_country_code.as_deref(),
    )
    .map_err(|e| AppError::BadRequest(format!("Invalid phone number: {e}")))?;

    let placement = state.telephony().place_call(&phone, TEST_ORDER_NUMBER).await;
    info!(status = %placement.status, "Test call placed");
    Ok(Json(placement))
}
