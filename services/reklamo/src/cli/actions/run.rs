use crate::cli::actions::{Action, server};
use anyhow::Result;

/// Single dispatch point for every [`Action`] variant.
/// # Errors
/// Propagates the selected action's failure.
pub async fn execute(action: Action) -> Result<()> {
    match action {
        Action::Server(args) => server::execute(args).await,
    }
}
