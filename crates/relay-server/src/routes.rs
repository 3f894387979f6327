//! Registration handlers.

use axum::Form;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use relay_core::IdentityKey;
use relay_settings::{Directory, DirectoryError};
use serde::Deserialize;
use tracing::{debug, info};

use crate::errors::ApiError;
use crate::health::{HealthResponse, health_check};
use crate::server::AppState;

/// Form body of `/register` and `/unregister`.
#[derive(Debug, Default, Deserialize)]
pub struct RegistrationForm {
    /// Application id, resolved through the app map.
    pub app_id: Option<String>,
    /// Upstream instance base URL.
    pub instance_url: Option<String>,
    /// Upstream credential.
    pub access_token: Option<String>,
    /// Push delivery address.
    pub device_token: Option<String>,
}

impl RegistrationForm {
    /// Validate every field and build the identity key.
    pub fn identity(&self, directory: &Directory) -> Result<IdentityKey, DirectoryError> {
        let app_key = directory.resolve_app_key(self.app_id.as_deref())?;
        let instance_url = self.instance_url.as_deref();
        let _policy = directory.resolve_instance(instance_url)?;
        let access_token = required(self.access_token.as_deref(), "access_token")?;
        let device_token = required(self.device_token.as_deref(), "device_token")?;
        Ok(IdentityKey::new(
            instance_url.unwrap_or_default(),
            access_token,
            device_token,
            app_key,
        ))
    }

    /// Build a lookup key; only the app id is validated.
    pub fn lookup_key(&self, directory: &Directory) -> Result<IdentityKey, DirectoryError> {
        let app_key = directory.resolve_app_key(self.app_id.as_deref())?;
        Ok(IdentityKey::new(
            self.instance_url.clone().unwrap_or_default(),
            self.access_token.clone().unwrap_or_default(),
            self.device_token.clone().unwrap_or_default(),
            app_key,
        ))
    }
}

fn required<'a>(value: Option<&'a str>, field: &'static str) -> Result<&'a str, DirectoryError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or(DirectoryError::MissingField(field))
}

/// GET /
pub async fn root() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health_check(state.start_time, state.manager.connection_count()))
}

/// POST /register
pub async fn register(
    State(state): State<AppState>,
    Form(form): Form<RegistrationForm>,
) -> Result<StatusCode, ApiError> {
    let key = form.identity(&state.directory)?;
    // reject unstreamable URLs before anything is stored
    let _ = relay_runtime::streaming_url(&key.instance_url, "/", &key.access_token)?;

    let found = state.store.find_or_create(&key)?;
    let mut registration = found.registration;
    let now = chrono::Utc::now().timestamp_millis();
    let _ = state.store.touch(registration.id, now)?;
    registration.last_update = now;
    debug!(key = %key, created = found.created, "registration stored");

    let _ = state.manager.ensure_connected(registration)?;
    Ok(StatusCode::CREATED)
}

/// POST /unregister
pub async fn unregister(
    State(state): State<AppState>,
    Form(form): Form<RegistrationForm>,
) -> Result<StatusCode, ApiError> {
    let key = form.lookup_key(&state.directory)?;
    match state.store.find(&key)? {
        Some(registration) => state.manager.ensure_disconnected(&registration)?,
        None => info!(key = %key, "unregister for unknown registration"),
    }
    Ok(StatusCode::CREATED)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
