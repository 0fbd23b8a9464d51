//! Promotion HTTP Routes
//!
//! Inbound build events and gate reports, plus read-only views of
//! tracked builds.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::promotion::{
    BuildEvent, BuildId, BuildStatus, GateOutcome, GateReport, PromotionController,
    PromotionDecision, PromotionError, Registration,
};

// ==================
// Shared State
// ==================

/// State shared across handlers
pub struct AppState {
    pub controller: Arc<PromotionController>,
    /// Deployment label reported by `/health`
    pub environment: String,
}

impl AppState {
    pub fn new(controller: Arc<PromotionController>, environment: impl Into<String>) -> Self {
        Self {
            controller,
            environment: environment.into(),
        }
    }
}

// ==================
// Request/Response Types
// ==================

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
    pub kind: &'static str,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(err: PromotionError) -> ApiError {
    let code = err.status_code();
    (
        StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        Json(ErrorResponse {
            error: err.to_string(),
            code,
            kind: err.kind().as_str(),
        }),
    )
}

fn bad_body(rejection: JsonRejection) -> ApiError {
    api_error(PromotionError::InvalidEvent(rejection.body_text()))
}

#[derive(Debug, Serialize)]
pub struct RegistrationResponse {
    pub build_id: BuildId,
    /// registered | finalized | already_registered | already_finalized
    pub status: &'static str,
    pub duplicate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<PromotionDecision>,
}

impl From<Registration> for RegistrationResponse {
    fn from(registration: Registration) -> Self {
        let status = match &registration {
            Registration::Registered { .. } => "registered",
            Registration::Finalized(_) => "finalized",
            Registration::AlreadyRegistered { .. } => "already_registered",
            Registration::AlreadyFinalized(_) => "already_finalized",
        };
        Self {
            build_id: registration.build_id().clone(),
            status,
            duplicate: registration.is_duplicate(),
            decision: registration.decision().cloned(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GateReportRequest {
    /// passed | failed (pass/success and fail/failure accepted)
    pub outcome: String,
}

impl GateReportRequest {
    /// Reported outcome. A gate cannot be reported back to pending.
    pub fn parse_outcome(&self) -> Result<GateOutcome, PromotionError> {
        match self.outcome.parse::<GateOutcome>() {
            Ok(GateOutcome::Pending) => Err(PromotionError::InvalidEvent(
                "outcome must be 'passed' or 'failed'".into(),
            )),
            Ok(outcome) => Ok(outcome),
            Err(e) => Err(PromotionError::InvalidEvent(e)),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GateReportResponse {
    pub applied: &'static str,
    pub finalized: bool,
    pub decision: PromotionDecision,
}

impl From<GateReport> for GateReportResponse {
    fn from(report: GateReport) -> Self {
        Self {
            applied: report.label(),
            finalized: report.finalized_build(),
            decision: report.decision().clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BuildsListResponse {
    pub builds: Vec<BuildStatus>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct TimeoutResponse {
    /// Whether this call finalized the build
    pub finalized: bool,
    pub decision: PromotionDecision,
}

// ==================
// Promotion Routes
// ==================

/// Create promotion routes
pub fn promotion_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(list_builds_handler).post(register_build_handler))
        .route("/:build_id", get(build_status_handler))
        .route("/:build_id/gates/:gate", post(report_gate_handler))
        .route("/:build_id/decision", get(evaluate_handler))
        .route("/:build_id/timeout", post(timeout_handler))
        .with_state(state)
}

// ==================
// Handlers
// ==================

async fn register_build_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<BuildEvent>, JsonRejection>,
) -> Result<(StatusCode, Json<RegistrationResponse>), ApiError> {
    let Json(event) = body.map_err(bad_body)?;

    let registration = state.controller.register_build(event).map_err(api_error)?;

    let status = if registration.is_duplicate() {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(registration.into())))
}

async fn list_builds_handler(State(state): State<Arc<AppState>>) -> Json<BuildsListResponse> {
    let builds = state.controller.list_builds();
    let total = builds.len();
    Json(BuildsListResponse { builds, total })
}

async fn build_status_handler(
    State(state): State<Arc<AppState>>,
    Path(build_id): Path<String>,
) -> Result<Json<BuildStatus>, ApiError> {
    let status = state
        .controller
        .build_status(&BuildId::from(build_id))
        .map_err(api_error)?;
    Ok(Json(status))
}

async fn report_gate_handler(
    State(state): State<Arc<AppState>>,
    Path((build_id, gate)): Path<(String, String)>,
    body: Result<Json<GateReportRequest>, JsonRejection>,
) -> Result<Json<GateReportResponse>, ApiError> {
    let Json(request) = body.map_err(bad_body)?;

    let outcome = request.parse_outcome().map_err(api_error)?;

    let report = state
        .controller
        .report_gate(&BuildId::from(build_id), &gate, outcome)
        .map_err(api_error)?;

    Ok(Json(report.into()))
}

async fn evaluate_handler(
    State(state): State<Arc<AppState>>,
    Path(build_id): Path<String>,
) -> Result<Json<PromotionDecision>, ApiError> {
    let decision = state
        .controller
        .evaluate(&BuildId::from(build_id))
        .map_err(api_error)?;
    Ok(Json(decision))
}

async fn timeout_handler(
    State(state): State<Arc<AppState>>,
    Path(build_id): Path<String>,
) -> Result<Json<TimeoutResponse>, ApiError> {
    let build_id = BuildId::from(build_id);

    let response = match state.controller.on_timeout(&build_id).map_err(api_error)? {
        Some(decision) => TimeoutResponse {
            finalized: true,
            decision,
        },
        None => TimeoutResponse {
            finalized: false,
            decision: state.controller.evaluate(&build_id).map_err(api_error)?,
        },
    };

    Ok(Json(response))
}
