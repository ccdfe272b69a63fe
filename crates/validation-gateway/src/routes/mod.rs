pub mod admin;
pub mod validate;
pub mod ws;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Assemble the full gateway router
pub fn configure(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(ws::routes(state.clone()))
        .merge(validate::routes(state.clone()))
        .merge(admin::routes(state))
}
