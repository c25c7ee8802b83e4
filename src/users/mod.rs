pub mod dto;
pub mod handlers;
pub mod memory;
pub mod model;
pub mod pg;
pub mod store;
pub mod validation;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::profile_routes())
        .merge(handlers::admin_routes())
}
