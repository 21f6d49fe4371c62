use std::io;
use std::net::SocketAddr;

use axum::Json;
use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, State};
use axum::http::header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use serde_json::{Value, json};

use crate::error::GatewayError;
use crate::http::client_context::note_client;
use crate::http::state::AppState;

pub async fn ping() -> Json<Value> {
    Json(json!({ "message": "pong" }))
}

pub async fn list_models(State(state): State<AppState>) -> Json<Vec<Value>> {
    let models = state
        .registry
        .list_all()
        .iter()
        .map(|model| model.metadata.clone())
        .collect();

    Json(models)
}

pub async fn chat_completions(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, GatewayError> {
    let Json(payload) =
        payload.map_err(|_| GatewayError::BadRequest("Invalid JSON request body".to_string()))?;
    validate_chat_completion_request(&state, &payload)?;

    if let Some(ConnectInfo(peer)) = connect_info {
        note_client(&state, peer.ip());
    }

    let stream = payload
        .get("stream")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    if stream {
        let upstream_stream = state.upstream.relay_completion_stream(payload).await?;
        let body_stream =
            upstream_stream.map(|item| item.map_err(|error| io::Error::other(error.to_string())));

        let mut response = Response::new(Body::from_stream(body_stream));
        *response.status_mut() = StatusCode::OK;
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
        response
            .headers_mut()
            .insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        response
            .headers_mut()
            .insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        response.headers_mut().insert(
            HeaderName::from_static("x-accel-buffering"),
            HeaderValue::from_static("no"),
        );

        return Ok(response);
    }

    let response = state.upstream.relay_completion(payload).await?;
    Ok(Json(response).into_response())
}

fn validate_chat_completion_request(state: &AppState, payload: &Value) -> Result<(), GatewayError> {
    let Some(model) = payload.get("model").and_then(Value::as_str) else {
        return Err(GatewayError::BadRequest(
            "The request body must include a model".to_string(),
        ));
    };

    if !state.registry.contains(model) {
        return Err(GatewayError::UnknownModel(model.to_string()));
    }

    if payload.get("messages").and_then(Value::as_array).is_none() {
        return Err(GatewayError::BadRequest(
            "The request body must include messages".to_string(),
        ));
    }

    Ok(())
}
