use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts, Query, State},
    http::request::Parts,
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::convert::Infallible;
use std::net::SocketAddr;
use tracing::instrument;

use crate::{
    audit::{dto::AuditLogQuery, repo, repo::AuditEntry},
    auth::AdminUser,
    error::ApiError,
    state::AppState,
};

pub fn admin_routes() -> Router<AppState> {
    Router::new().route("/admin/audit-logs", get(list_audit_logs))
}

/// Best-effort client address: proxy headers first, then the socket peer.
pub struct ClientIp(pub Option<String>);

#[async_trait]
impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(forwarded) = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
        {
            if let Some(first) = forwarded.split(',').next() {
                let first = first.trim();
                if !first.is_empty() {
                    return Ok(ClientIp(Some(first.to_string())));
                }
            }
        }

        if let Some(real_ip) = parts
            .headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
        {
            let real_ip = real_ip.trim();
            if !real_ip.is_empty() {
                return Ok(ClientIp(Some(real_ip.to_string())));
            }
        }

        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip().to_string());
        Ok(ClientIp(peer))
    }
}

#[instrument(skip(state))]
pub async fn list_audit_logs(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ClientIp(ip): ClientIp,
    Query(query): Query<AuditLogQuery>,
) -> Result<Json<Vec<AuditEntry>>, ApiError> {
    if query.limit <= 0 {
        return Err(ApiError::Validation("limit must be positive".into()));
    }

    let entries = repo::list(
        &state.db,
        query.action.as_deref(),
        query.user_id,
        query.entity_type.as_deref(),
        query.limit,
    )
    .await?;

    // Reading the trail is itself a security-relevant action
    repo::record(
        &state.db,
        "audit_query",
        Some(admin.id),
        Some("audit_log"),
        None,
        json!({
            "action": query.action,
            "user_id": query.user_id,
            "entity_type": query.entity_type,
            "limit": query.limit,
            "returned": entries.len(),
        }),
        ip.as_deref(),
    )
    .await;

    Ok(Json(entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract_ip(req: Request<()>) -> Option<String> {
        let (mut parts, _) = req.into_parts();
        let ClientIp(ip) = ClientIp::from_request_parts(&mut parts, &())
            .await
            .expect("infallible");
        ip
    }

    #[tokio::test]
    async fn forwarded_for_takes_first_hop() {
        let req = Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(())
            .unwrap();
        assert_eq!(extract_ip(req).await.as_deref(), Some("203.0.113.7"));
    }

    #[tokio::test]
    async fn real_ip_used_when_no_forwarded_header() {
        let req = Request::builder()
            .header("x-real-ip", "198.51.100.4")
            .body(())
            .unwrap();
        assert_eq!(extract_ip(req).await.as_deref(), Some("198.51.100.4"));
    }

    #[tokio::test]
    async fn peer_address_used_as_fallback() {
        let mut req = Request::builder().body(()).unwrap();
        req.extensions_mut()
            .insert(ConnectInfo::<SocketAddr>("192.0.2.9:55000".parse().unwrap()));
        assert_eq!(extract_ip(req).await.as_deref(), Some("192.0.2.9"));
    }

    #[tokio::test]
    async fn no_source_yields_none() {
        let req = Request::builder().body(()).unwrap();
        assert_eq!(extract_ip(req).await, None);
    }
}
