use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::{
    audit::{self, ClientIp},
    auth::{
        dto::{AuthResponse, LoginRequest, RefreshRequest, RegisterRequest},
        repo::User,
        services::{hash_password, is_valid_email, verify_password, AuthUser, JwtKeys},
    },
    error::ApiError,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    payload.name = payload.name.trim().to_string();
    payload.email = payload.email.trim().to_lowercase();

    if payload.name.is_empty() || payload.name.len() > 100 {
        warn!("invalid name");
        return Err(ApiError::Validation(
            "name must be 1-100 characters".into(),
        ));
    }

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(ApiError::Validation("invalid email".into()));
    }

    if payload.password.len() < 8 {
        warn!("password too short");
        return Err(ApiError::Validation("password too short".into()));
    }

    if User::find_by_email(&state.db, &payload.email).await?.is_some() {
        warn!(email = %payload.email, "email already registered");
        return Err(ApiError::BusinessRule("email already registered".into()));
    }

    let hash = hash_password(&payload.password)?;
    let user = User::create(&state.db, &payload.name, &payload.email, &hash)
        .await
        .map_err(crate::auth::repo::classify_create_error)?;

    let keys = JwtKeys::from_ref(&state);
    let access_token = keys.sign_access(user.id, user.role_claim())?;
    let refresh_token = keys.sign_refresh(user.id, user.role_claim())?;

    audit::repo::record(
        &state.db,
        "register",
        Some(user.id),
        Some("user"),
        Some(user.id),
        json!({ "name": user.name, "email": user.email, "role": user.role }),
        ip.as_deref(),
    )
    .await;

    info!(user_id = %user.id, email = %user.email, role = %user.role, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            access_token,
            refresh_token,
            user: user.public(),
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Json(mut payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(ApiError::Validation("invalid email".into()));
    }

    let user = match User::find_by_email(&state.db, &payload.email).await? {
        Some(u) => u,
        None => {
            warn!(email = %payload.email, "login unknown email");
            audit::repo::record(
                &state.db,
                "login_failed",
                None,
                Some("user"),
                None,
                json!({ "email": payload.email }),
                ip.as_deref(),
            )
            .await;
            return Err(ApiError::Authentication("invalid credentials".into()));
        }
    };

    if !verify_password(&payload.password, &user.password_hash)? {
        warn!(email = %payload.email, user_id = %user.id, "login invalid password");
        audit::repo::record(
            &state.db,
            "login_failed",
            Some(user.id),
            Some("user"),
            Some(user.id),
            json!({ "email": payload.email }),
            ip.as_deref(),
        )
        .await;
        return Err(ApiError::Authentication("invalid credentials".into()));
    }

    let keys = JwtKeys::from_ref(&state);
    let access_token = keys.sign_access(user.id, user.role_claim())?;
    let refresh_token = keys.sign_refresh(user.id, user.role_claim())?;

    audit::repo::record(
        &state.db,
        "login",
        Some(user.id),
        Some("user"),
        Some(user.id),
        json!({ "email": user.email }),
        ip.as_deref(),
    )
    .await;

    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(Json(AuthResponse {
        access_token,
        refresh_token,
        user: user.public(),
    }))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let keys = JwtKeys::from_ref(&state);
    let claims = keys
        .verify_refresh(&payload.refresh_token)
        .map_err(|e| ApiError::Authentication(e.to_string()))?;

    // Role is re-read from the database, not trusted from the old token
    let user = User::find_by_id(&state.db, claims.sub)
        .await?
        .ok_or_else(|| ApiError::Authentication("user not found".into()))?;

    let access_token = keys.sign_access(user.id, user.role_claim())?;
    let refresh_token = keys.sign_refresh(user.id, user.role_claim())?;

    Ok(Json(AuthResponse {
        access_token,
        refresh_token,
        user: user.public(),
    }))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<crate::auth::dto::PublicUser>, ApiError> {
    let user = User::find_by_id(&state.db, auth.id)
        .await?
        .ok_or_else(|| ApiError::Authentication("user not found".into()))?;
    Ok(Json(user.public()))
}

#[cfg(test)]
mod tests {
    use crate::auth::dto::{PublicUser, Role};

    #[test]
    fn public_user_serializes_role_lowercase() {
        let response = PublicUser {
            id: 1,
            name: "Test".into(),
            email: "test@example.com".into(),
            role: Role::Admin,
            grant_balance: 100,
            sent_this_month: 0,
            redeemable_balance: 0,
            total_received: 0,
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"role\":\"admin\""));
        assert!(json.contains("test@example.com"));
    }
}
