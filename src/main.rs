use anyhow::Result;
use gemini_chat::cli;

#[tokio::main]
async fn main() -> Result<()> {
    cli::run().await
}
