use crate::state::AppState;
use axum::Router;

mod claims;
pub mod cookies;
mod dto;
pub mod extractors;
pub mod handlers;
pub mod jwt;
pub mod services;

pub use dto::Envelope;

pub fn router() -> Router<AppState> {
    Router::new().merge(handlers::auth_routes())
}
