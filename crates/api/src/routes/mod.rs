//! API route definitions.

use axum::{Router, middleware};

use crate::{AppState, middleware::auth_middleware};

pub mod attachments;
pub mod files;
pub mod health;
pub mod incidents;
pub mod uploads;

/// Creates the API router with protected routes that need state for middleware.
#[allow(clippy::needless_pass_by_value)]
pub fn api_routes_with_state(state: AppState) -> Router<AppState> {
    // Protected routes that require authentication
    let protected_routes = Router::new()
        .merge(attachments::routes())
        .merge(incidents::routes())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // Signed links and upload slots carry their own authorization
    let mut public_routes = Router::new().merge(health::routes()).merge(files::routes());
    if state.loopback.is_some() {
        public_routes = public_routes.merge(uploads::routes(state.policy.max_size_bytes()));
    }

    public_routes.merge(protected_routes)
}
