pub mod server;

mod run;

/// Everything the CLI can be asked to do. One variant today; the match
/// lives in `run.rs` so this file stays declaration-only as actions grow.
#[derive(Debug)]
pub enum Action {
    Server(server::Args),
}

impl Action {
    /// Run the action to completion.
    /// # Errors
    /// Propagates whatever the underlying action reports.
    pub async fn execute(self) -> anyhow::Result<()> {
        run::execute(self).await
    }
}
