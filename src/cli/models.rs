use std::path::Path;

use anyhow::Result;
use serde_json::json;

pub async fn run(secrets_path: &Path) -> Result<()> {
    let orchestrator = super::bootstrap(secrets_path).await?;
    let catalog = orchestrator.catalog();
    let output = json!({
        "default_model_id": catalog.default_entry().model_id,
        "models": catalog.entries(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
