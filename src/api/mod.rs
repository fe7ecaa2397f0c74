//! HTTP surface.
//!
//! - [`health`]: liveness probes
//! - [`diagnostics`]: smoke tests against the database and the bucket
//! - [`admin`]: operator-only schema migration
//! - [`runs`]: JSON API over the run and artifact stores

pub mod admin;
pub mod diagnostics;
pub mod health;
pub mod runs;

use axum::{Router, routing::get};

use crate::AppState;
use crate::config::RouteConfig;

/// Assemble every route, skipping the ones switched off in `routes`.
pub fn router(routes: &RouteConfig) -> Router<AppState> {
    let mut router = Router::new()
        .route("/", get(health::root))
        .route("/health", get(health::health))
        .route(
            "/__admin/migrate-artifacts",
            get(admin::migrate_artifacts),
        );

    if routes.b2_test {
        router = router.route("/b2-test", get(diagnostics::b2_test));
    }
    if routes.db_test {
        router = router.route("/db-test", get(diagnostics::db_test));
    }
    if routes.db_init {
        router = router.route("/db-init", get(diagnostics::db_init));
    }
    if routes.artifact_test {
        router = router.route("/artifact-test", get(diagnostics::artifact_test));
    }
    if routes.run_api {
        router = router.nest("/api", runs::build_router());
    }

    router
}
