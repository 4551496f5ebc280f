use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    cortex_cli::main_entry().await
}
