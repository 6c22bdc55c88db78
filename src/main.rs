//! sync-client - Cross-chain swap client
//!
//! Connects a wallet session, fetches quotes and follows swaps over the
//! realtime push channel.

use anyhow::Result;
use clap::Parser;

use sync_client::adapters::cli::{self, CliApp};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (SYNC_API_URL and friends)
    dotenvy::dotenv().ok();

    let app = CliApp::parse();
    cli::execute(app).await
}
