//! Api-key authentication middleware.
//!
//! Reads the `NTORQUE_API_KEY` header, validates its shape and resolves it
//! to the owning application. The middleware never rejects a request by
//! itself; it only attaches the caller so route handlers can enforce the
//! task ACL.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::warn;

use crate::queue::Application;
use crate::server::app::AppState;

pub const API_KEY_HEADER: &str = "ntorque_api_key";

lazy_static! {
    static ref VALID_API_KEY: Regex = Regex::new(r"^\w{40}$").unwrap();
}

/// Authenticated caller: the presented token and its active application.
#[derive(Clone, Debug)]
pub struct Caller {
    pub token: String,
    pub application: Application,
}

pub async fn api_key_auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string());

    if let Some(token) = token {
        if let Some(caller) = extract_caller(&state, token).await {
            request.extensions_mut().insert(caller);
        }
    }
    next.run(request).await
}

async fn extract_caller(state: &AppState, token: String) -> Option<Caller> {
    if !VALID_API_KEY.is_match(&token) {
        return None;
    }

    match state.store.lookup_application_by_key(&token).await {
        Ok(Some(application)) => Some(Caller { token, application }),
        Ok(None) => None,
        Err(e) => {
            warn!(error = %e, "api key lookup failed");
            None
        }
    }
}
