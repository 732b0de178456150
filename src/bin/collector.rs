//! Metrics collector binary.

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    vigil_lib::cli::run_collector().await?;
    Ok(())
}
