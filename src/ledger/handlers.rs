use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tracing::{info, instrument};

use crate::{
    audit::{self, ClientIp},
    auth::{AdminUser, AuthUser},
    error::ApiError,
    ledger::{
        dto::{
            EndorsementResponse, LeaderboardEntry, LeaderboardQuery, RecognitionResponse,
            RecognizeRequest, RedeemRequest, RedemptionResponse, ResetMonthResponse,
        },
        repo, services,
    },
    state::AppState,
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/recognize", post(recognize))
        .route("/recognitions/:id/endorse", post(endorse))
        .route("/redeem", post(redeem))
        .route("/leaderboard", get(leaderboard))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new().route("/admin/reset_month", post(reset_month))
}

#[instrument(skip(state, payload))]
pub async fn recognize(
    State(state): State<AppState>,
    auth: AuthUser,
    ClientIp(ip): ClientIp,
    Json(mut payload): Json<RecognizeRequest>,
) -> Result<(StatusCode, Json<RecognitionResponse>), ApiError> {
    payload.validate()?;

    let outcome = repo::create_recognition(
        &state.db,
        auth.id,
        payload.receiver_id,
        payload.credits,
        payload.note.as_deref(),
    )
    .await?;

    audit::repo::record(
        &state.db,
        "recognize",
        Some(auth.id),
        Some("recognition"),
        Some(outcome.recognition_id),
        json!({
            "sender_id": auth.id,
            "receiver_id": payload.receiver_id,
            "credits": payload.credits,
            "note": payload.note,
            "sender_grant_after": outcome.sender.grant_balance,
            "receiver_redeemable_after": outcome.receiver.redeemable_balance,
        }),
        ip.as_deref(),
    )
    .await;

    info!(
        sender_id = %auth.id,
        receiver_id = %payload.receiver_id,
        credits = %payload.credits,
        recognition_id = %outcome.recognition_id,
        "recognition sent"
    );
    Ok((
        StatusCode::CREATED,
        Json(RecognitionResponse {
            status: "ok",
            recognition_id: outcome.recognition_id,
        }),
    ))
}

#[instrument(skip(state))]
pub async fn endorse(
    State(state): State<AppState>,
    auth: AuthUser,
    ClientIp(ip): ClientIp,
    Path(recognition_id): Path<i64>,
) -> Result<Json<EndorsementResponse>, ApiError> {
    repo::endorse(&state.db, recognition_id, auth.id).await?;

    audit::repo::record(
        &state.db,
        "endorse",
        Some(auth.id),
        Some("recognition"),
        Some(recognition_id),
        json!({ "recognition_id": recognition_id, "endorser_id": auth.id }),
        ip.as_deref(),
    )
    .await;

    info!(endorser_id = %auth.id, recognition_id = %recognition_id, "recognition endorsed");
    Ok(Json(EndorsementResponse { status: "ok" }))
}

#[instrument(skip(state, payload))]
pub async fn redeem(
    State(state): State<AppState>,
    auth: AuthUser,
    ClientIp(ip): ClientIp,
    Json(payload): Json<RedeemRequest>,
) -> Result<Json<RedemptionResponse>, ApiError> {
    payload.validate()?;

    let outcome = repo::redeem(&state.db, auth.id, payload.credits).await?;

    audit::repo::record(
        &state.db,
        "redeem",
        Some(auth.id),
        Some("redemption"),
        Some(outcome.redemption_id),
        json!({
            "credits": payload.credits,
            "voucher_value": outcome.voucher_value,
            "balance_after": outcome.balance_after,
        }),
        ip.as_deref(),
    )
    .await;

    info!(
        user_id = %auth.id,
        credits = %payload.credits,
        voucher_value = %outcome.voucher_value,
        "credits redeemed"
    );
    Ok(Json(RedemptionResponse {
        status: "ok",
        voucher_value: outcome.voucher_value,
    }))
}

#[instrument(skip(state))]
pub async fn reset_month(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ClientIp(ip): ClientIp,
) -> Result<Json<ResetMonthResponse>, ApiError> {
    let period = services::current_period();
    let users_reset = repo::reset_month(&state.db, &period).await?;

    audit::repo::record(
        &state.db,
        "reset_month",
        Some(admin.id),
        Some("system"),
        None,
        json!({ "period": period, "users_reset": users_reset }),
        ip.as_deref(),
    )
    .await;

    info!(admin_id = %admin.id, period = %period, users_reset, "monthly reset");
    Ok(Json(ResetMonthResponse {
        status: "ok",
        period,
        users_reset,
    }))
}

#[instrument(skip(state))]
pub async fn leaderboard(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<Vec<LeaderboardEntry>>, ApiError> {
    if query.limit <= 0 {
        return Err(ApiError::Validation("limit must be positive".into()));
    }
    let entries = repo::leaderboard(&state.db, query.limit).await?;
    Ok(Json(entries))
}
