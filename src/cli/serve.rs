use std::path::Path;

use anyhow::Result;

use crate::api;

pub async fn run(secrets_path: &Path, host: String, port: String) -> Result<()> {
    api::init_tracing();
    let orchestrator = super::bootstrap(secrets_path).await?;
    api::serve(host, port, orchestrator).await
}
