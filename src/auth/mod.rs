use crate::state::AppState;
use axum::Router;

pub mod dto;
pub mod handlers;
pub mod middleware;
pub mod password;
pub mod repo;
pub mod repo_types;
pub mod services;


pub use middleware::require_login;

pub fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .merge(handlers::auth_routes())
        .merge(handlers::account_routes(state))
}
