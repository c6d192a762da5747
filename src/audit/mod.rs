use crate::state::AppState;
use axum::Router;

mod dto;
pub mod handlers;
pub mod repo;

pub use handlers::ClientIp;

pub fn router() -> Router<AppState> {
    handlers::admin_routes()
}
