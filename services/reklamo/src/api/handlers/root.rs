use crate::{APP_USER_AGENT, GIT_COMMIT_HASH};
use axum::response::IntoResponse;

// Undocumented banner route, useful for a quick `curl /`.
pub async fn root() -> impl IntoResponse {
    let short_hash = if GIT_COMMIT_HASH.len() > 7 {
        &GIT_COMMIT_HASH[0..7]
    } else {
        GIT_COMMIT_HASH
    };

    format!("{APP_USER_AGENT} ({short_hash})\n")
}
