//! Route definitions for the `/account` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::account;
use crate::state::AppState;

/// Routes mounted at `/account`.
///
/// ```text
/// GET    /           -> get_profile
/// PUT    /           -> update_profile
/// DELETE /           -> deactivate
/// POST   /password   -> change_password
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(account::get_profile)
                .put(account::update_profile)
                .delete(account::deactivate),
        )
        .route("/password", post(account::change_password))
}
