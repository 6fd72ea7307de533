//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented; failures map onto status codes by error kind.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use tracing::{info, instrument};

use crate::error::EngineError;
use crate::protocol::*;
use crate::state::{AdvanceReply, AppState};

fn err_response(e: EngineError) -> (StatusCode, Json<ErrorOut>) {
    let status = match &e {
        EngineError::InvalidDifficulty(_) | EngineError::InvalidResponse(_) => {
            StatusCode::BAD_REQUEST
        }
        EngineError::InvalidTransition { .. } => StatusCode::CONFLICT,
        EngineError::RecognitionFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
        EngineError::ContentProviderFailure(_)
        | EngineError::MalformedExercise(_)
        | EngineError::IllustrationFailure(_) => StatusCode::BAD_GATEWAY,
    };
    (status, Json(ErrorOut { message: e.to_string() }))
}

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse {
    Json(HealthOut { ok: true })
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_profile(State(state): State<AppState>) -> impl IntoResponse {
    Json(profile_out(&state.profile().await))
}

#[instrument(level = "info", skip(state), fields(level = body.level))]
pub async fn http_post_difficulty(
    State(state): State<AppState>,
    Json(body): Json<DifficultyIn>,
) -> Result<Json<ProfileOut>, (StatusCode, Json<ErrorOut>)> {
    match state.set_difficulty(body.level).await {
        Ok(profile) => Ok(Json(profile_out(&profile))),
        Err(e) => Err(err_response(e)),
    }
}

#[instrument(level = "info", skip(state), fields(kind = %body.kind))]
pub async fn http_post_mission(
    State(state): State<AppState>,
    Json(body): Json<MissionIn>,
) -> Result<Json<MissionOut>, (StatusCode, Json<ErrorOut>)> {
    match state.start_mission(body.kind, body.topic).await {
        Ok((mission_id, exercise)) => {
            info!(target: "mission", kind = %body.kind, %mission_id, "HTTP mission served");
            Ok(Json(MissionOut { mission_id, exercise: to_out(&exercise) }))
        }
        Err(e) => Err(err_response(e)),
    }
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_post_answer(
    State(state): State<AppState>,
    Json(body): Json<AnswerIn>,
) -> Result<Json<VerdictOut>, (StatusCode, Json<ErrorOut>)> {
    match state.submit(body.response).await {
        Ok(verdict) => {
            info!(target: "mission", "HTTP submission scored");
            Ok(Json(VerdictOut { verdict }))
        }
        Err(e) => Err(err_response(e)),
    }
}

#[instrument(level = "info", skip(state))]
pub async fn http_post_advance(
    State(state): State<AppState>,
) -> Result<Json<AdvanceOut>, (StatusCode, Json<ErrorOut>)> {
    match state.advance().await {
        Ok(AdvanceReply::Completed { xp, profile }) => {
            Ok(Json(AdvanceOut::Completed { xp, profile: profile_out(&profile) }))
        }
        Ok(AdvanceReply::Next { mission_id, exercise }) => {
            Ok(Json(AdvanceOut::Next { mission_id, exercise: to_out(&exercise) }))
        }
        Err(e) => Err(err_response(e)),
    }
}

#[instrument(level = "info", skip(state))]
pub async fn http_post_abort(State(state): State<AppState>) -> impl IntoResponse {
    state.abort().await;
    Json(HealthOut { ok: true })
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_illustration(State(state): State<AppState>) -> impl IntoResponse {
    Json(IllustrationOut { image_b64: state.controller.illustration().await })
}
