use crate::state::AppState;
use axum::Router;

mod dto;
pub mod handlers;
pub mod jwt;
pub mod password;
pub mod recovery;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::routes())
        .merge(recovery::routes())
}
