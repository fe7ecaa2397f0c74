use axum::extract::State;

use crate::AppState;
use crate::error::AppError;
use crate::security::admin::AdminAccess;

/// GET /__admin/migrate-artifacts?token= - Idempotently create the
/// `artifacts` table (and `runs`, which it references).
pub async fn migrate_artifacts(
    _admin: AdminAccess,
    State(state): State<AppState>,
) -> Result<&'static str, AppError> {
    tracing::info!(name: "admin.migrate_artifacts", "Ensuring artifacts schema");
    state.persistence.ensure_artifacts_table().await?;
    Ok("ok")
}
