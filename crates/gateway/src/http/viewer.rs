use apptshare_contracts::Viewer;
use axum::http::{HeaderMap, StatusCode};

use super::{ApiError, AppState, json_error};
use crate::config::AuthMode;

const USER_ID_HEADER: &str = "x-apptshare-user-id";
const LOCAL_AUTH_SECRET_HEADER: &str = "x-apptshare-local-auth-secret";

pub(super) async fn extract_viewer(state: &AppState, headers: &HeaderMap) -> Result<Viewer, ApiError> {
    match state.config.auth_mode {
        AuthMode::Local => {
            local_viewer(headers, state.config.local_auth_shared_secret.as_deref())
        }
        AuthMode::Oidc => {
            let Some(auth) = state.oidc.as_ref() else {
                return Err(json_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "ERR_INTERNAL",
                    "oidc authenticator is not initialized",
                    false,
                ));
            };

            auth.resolve_viewer(headers).await.map_err(|err| {
                tracing::warn!(code = err.code, "gateway.auth_rejected");
                match err.code {
                    "ERR_AUTH_UNAVAILABLE" => json_error(
                        StatusCode::SERVICE_UNAVAILABLE,
                        err.code,
                        err.message,
                        true,
                    ),
                    _ => json_error(StatusCode::UNAUTHORIZED, err.code, err.message, false),
                }
            })
        }
    }
}

/// Development identity: a plain user-id header, optionally guarded by a
/// shared secret. No header means an anonymous viewer.
pub(super) fn local_viewer(
    headers: &HeaderMap,
    expected_secret: Option<&str>,
) -> Result<Viewer, ApiError> {
    let Some(user_id) = header_value(headers, USER_ID_HEADER) else {
        return Ok(Viewer::Anonymous);
    };

    if let Some(expected_secret) = expected_secret {
        let Some(provided_secret) = header_value(headers, LOCAL_AUTH_SECRET_HEADER) else {
            return Err(json_error(
                StatusCode::UNAUTHORIZED,
                "ERR_AUTH_REQUIRED",
                "missing local auth secret",
                false,
            ));
        };

        if provided_secret != expected_secret {
            tracing::warn!(code = "ERR_AUTH_INVALID", "gateway.auth_rejected");
            return Err(json_error(
                StatusCode::UNAUTHORIZED,
                "ERR_AUTH_INVALID",
                "invalid local auth secret",
                false,
            ));
        }
    }

    Ok(Viewer::Authenticated(user_id.to_string()))
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}
