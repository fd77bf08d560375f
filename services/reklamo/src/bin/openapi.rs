use anyhow::Result;

/// Prints the OpenAPI document, so CI can diff it against the committed copy.
fn main() -> Result<()> {
    let document = serde_json::to_string_pretty(&reklamo::api::openapi())?;
    println!("{document}");
    Ok(())
}
