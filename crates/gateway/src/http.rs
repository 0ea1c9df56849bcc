use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use apptshare_auth::OidcAuthenticator;
use apptshare_contracts::{ProjectedAppointment, Viewer};
use apptshare_policy::{
    PermissionEntry, PermissionSet, ProjectionOptions, TokenGenerator, evaluate,
    may_manage_enrollment, parse_query_pairs, permission_query,
};
use axum::extract::{Path, RawQuery, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::config::{AuthMode, GatewayConfig, StartupError};
use crate::store::AppointmentStore;

mod query;
mod viewer;

use self::query::ViewFlags;
use self::viewer::extract_viewer;

const APPOINTMENT_ROUTE: &str = "/v1/appointments/{link}";
const HIDDEN_ROUTE: &str = "/v1/appointments/{link}/hidden";
const PERMISSION_ROUTE: &str = "/v1/appointments/{link}/enrollments/{enrollment_id}/permission";

#[derive(Clone)]
pub struct AppState {
    pub config: GatewayConfig,
    oidc: Option<OidcAuthenticator>,
    store: Arc<AppointmentStore>,
    tokens: TokenGenerator,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

pub async fn router(config: GatewayConfig) -> Result<Router, StartupError> {
    let store = AppointmentStore::load_from_path(&config.store_path).map_err(|err| {
        StartupError {
            code: "ERR_STORE_UNAVAILABLE",
            message: err.to_string(),
        }
    })?;

    router_with_store(config, store).await
}

pub async fn router_with_store(
    config: GatewayConfig,
    store: AppointmentStore,
) -> Result<Router, StartupError> {
    let oidc = if config.auth_mode == AuthMode::Oidc {
        let oidc_config = config.oidc.clone().ok_or_else(|| StartupError {
            code: "ERR_INVALID_CONFIG",
            message: "oidc auth mode requires oidc config".to_string(),
        })?;

        Some(
            OidcAuthenticator::new(oidc_config)
                .await
                .map_err(|err| StartupError {
                    code: err.code,
                    message: err.message,
                })?,
        )
    } else {
        None
    };

    tracing::info!(
        appointments = store.len(),
        token_encoding = config.token_encoding.as_str(),
        "gateway.store_loaded"
    );

    let tokens = TokenGenerator::new(config.token_secret.clone(), config.token_encoding);

    let state = AppState {
        config,
        oidc,
        store: Arc::new(store),
        tokens,
    };

    Ok(Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route(APPOINTMENT_ROUTE, get(get_appointment))
        .route(HIDDEN_ROUTE, get(get_hidden))
        .route(PERMISSION_ROUTE, get(get_enrollment_permission))
        .with_state(state))
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Serialize)]
struct ReadyzResponse {
    status: &'static str,
    checks: BTreeMap<&'static str, bool>,
}

async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let mut checks = BTreeMap::new();
    checks.insert("store", !state.store.is_empty());

    let all_ready = checks.values().all(|ok| *ok);
    let status = if all_ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadyzResponse {
            status: if all_ready { "ready" } else { "not_ready" },
            checks,
        }),
    )
}

async fn metrics(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if state.config.metrics_require_auth {
        match extract_viewer(&state, &headers).await {
            Ok(Viewer::Authenticated(_)) => {}
            Ok(Viewer::Anonymous) => {
                return json_error(
                    StatusCode::UNAUTHORIZED,
                    "ERR_AUTH_REQUIRED",
                    "metrics require an authenticated viewer",
                    false,
                )
                .into_response();
            }
            Err(err) => return err.into_response(),
        }
    }

    match crate::metrics::render() {
        Ok((body, content_type)) => {
            let mut headers = HeaderMap::new();
            if let Ok(value) = HeaderValue::from_str(content_type.as_str()) {
                headers.insert(header::CONTENT_TYPE, value);
            }
            (headers, body).into_response()
        }
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

async fn get_appointment(
    State(state): State<AppState>,
    Path(link): Path<String>,
    RawQuery(raw_query): RawQuery,
    headers: HeaderMap,
) -> Result<Json<ProjectedAppointment>, ApiError> {
    let request_started = Instant::now();

    let handler_result = (async move {
        let viewer = extract_viewer(&state, &headers).await?;
        let pairs = parse_query_pairs(raw_query.as_deref().unwrap_or_default());
        let flags = ViewFlags::from_pairs(&pairs);

        let appointment = state
            .store
            .load_by_link(&link)
            .ok_or_else(|| appointment_not_found(&link))?;

        let manages_appointment =
            viewer.is_creator_of(&appointment) || viewer.is_administrator_of(&appointment);
        let options = ProjectionOptions {
            slim: flags.slim,
            keep_enrollment_creators: flags.creator_refs && manages_appointment,
        };

        let projection = evaluate(&appointment, &viewer, &pairs, &state.tokens, options);

        let scope = if options.slim {
            "slim"
        } else {
            projection.decision.scope()
        };
        crate::metrics::observe_disclosure(scope);
        crate::metrics::observe_permission_pairs(
            projection.permissions.pairs_accepted(),
            projection.permissions.pairs_rejected(),
        );

        tracing::info!(
            link = %link,
            viewer = viewer.as_str(),
            scope,
            reason = projection.decision.reason.as_str(),
            enrollments_disclosed = projection.appointment.enrollments().len(),
            permission_pairs_presented = projection.permissions.pairs_presented(),
            permission_pairs_accepted = projection.permissions.pairs_accepted(),
            "gateway.appointment_projected"
        );

        Ok(Json(projection.appointment))
    })
    .await;

    observe(APPOINTMENT_ROUTE, &handler_result, request_started);
    handler_result
}

#[derive(Debug, Serialize)]
struct HiddenResponse {
    hidden: bool,
}

async fn get_hidden(
    State(state): State<AppState>,
    Path(link): Path<String>,
) -> Result<Json<HiddenResponse>, ApiError> {
    let request_started = Instant::now();

    let handler_result = state
        .store
        .is_hidden(&link)
        .map(|hidden| Json(HiddenResponse { hidden }))
        .ok_or_else(|| appointment_not_found(&link));

    observe(HIDDEN_ROUTE, &handler_result, request_started);
    handler_result
}

#[derive(Debug, Serialize)]
struct PermissionResponse {
    id: String,
    token: String,
    query: String,
}

async fn get_enrollment_permission(
    State(state): State<AppState>,
    Path((link, enrollment_id)): Path<(String, String)>,
    RawQuery(raw_query): RawQuery,
    headers: HeaderMap,
) -> Result<Json<PermissionResponse>, ApiError> {
    let request_started = Instant::now();

    let handler_result = (async move {
        let viewer = extract_viewer(&state, &headers).await?;
        let pairs = parse_query_pairs(raw_query.as_deref().unwrap_or_default());

        let appointment = state
            .store
            .load_by_link(&link)
            .ok_or_else(|| appointment_not_found(&link))?;

        let permissions = PermissionSet::parse(&pairs, &state.tokens);

        // Unknown and foreign enrollments answer alike so ids cannot be probed.
        if !may_manage_enrollment(
            &appointment,
            &enrollment_id,
            &viewer,
            &permissions.permitted_ids(),
        ) {
            return Err(json_error(
                StatusCode::FORBIDDEN,
                "ERR_FORBIDDEN",
                "not allowed to manage this enrollment",
                false,
            ));
        }

        let entry = PermissionEntry::issue(&state.tokens, enrollment_id.as_str());
        let query = permission_query([&entry]);

        tracing::info!(
            link = %link,
            viewer = viewer.as_str(),
            "gateway.permission_issued"
        );

        Ok(Json(PermissionResponse {
            id: entry.id().to_string(),
            token: entry.token().to_string(),
            query,
        }))
    })
    .await;

    observe(PERMISSION_ROUTE, &handler_result, request_started);
    handler_result
}

fn observe<T>(route: &str, result: &Result<T, ApiError>, started: Instant) {
    let status = match result {
        Ok(_) => StatusCode::OK,
        Err((status, _)) => *status,
    };
    crate::metrics::observe_http_request(route, "GET", status.as_u16(), started.elapsed());
}

fn appointment_not_found(link: &str) -> ApiError {
    tracing::info!(link = %link, "gateway.appointment_not_found");
    json_error(
        StatusCode::NOT_FOUND,
        "ERR_NOT_FOUND",
        "unknown appointment link",
        false,
    )
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: String,
    message: String,
    retryable: bool,
}

fn json_error(
    status: StatusCode,
    code: impl Into<String>,
    message: impl Into<String>,
    retryable: bool,
) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            code: code.into(),
            message: message.into(),
            retryable,
        }),
    )
}
