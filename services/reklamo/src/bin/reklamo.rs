use anyhow::Result;
use reklamo::cli;

#[tokio::main]
async fn main() -> Result<()> {
    cli::start()?.execute().await?;

    // Flush any spans still buffered in the exporter before exiting.
    cli::telemetry::shutdown();

    Ok(())
}
