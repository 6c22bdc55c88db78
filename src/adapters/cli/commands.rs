//! CLI Command Handlers
//!
//! Implementation of all CLI commands for the sync-client binary.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::adapters::demo::DemoWallet;
use crate::adapters::http::SyncApiClient;
use crate::adapters::realtime::WsTransport;
use crate::adapters::solana::{KeypairProvider, SolanaWallet};
use crate::application::{SyncClient, WalletSessionManager};
use crate::config::{load_config, Config};
use crate::domain::{ChainRegistry, LifecycleState, ProviderKind, SwapFormState};
use crate::ports::{RealtimeEvent, SwapApiPort};

/// sync-client - Wallet sessions, cross-chain quotes and realtime swap tracking
#[derive(Parser, Debug)]
#[command(
    name = "sync-client",
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = "Cross-chain swap client for the SYNC backend",
    long_about = "sync-client connects a wallet session, keeps cross-chain quotes fresh \
                  and follows swap progress over the realtime push channel."
)]
pub struct CliApp {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,

    /// Path to configuration file (defaults are used when omitted)
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// List known chains (built-in registry merged with the backend list)
    Chains(ChainsCmd),

    /// Fetch a one-shot quote
    Quote(QuoteCmd),

    /// Quote, execute and follow a swap end to end
    Demo(DemoCmd),

    /// Print realtime events for an address
    Watch(WatchCmd),
}

/// List chains
#[derive(Parser, Debug)]
pub struct ChainsCmd {
    /// Skip the backend and print the built-in registry only
    #[arg(long)]
    pub offline: bool,
}

/// Swap pair shared by quote and demo
#[derive(Parser, Debug, Clone)]
pub struct PairArgs {
    /// Amount to swap
    #[arg(value_name = "AMOUNT")]
    pub amount: String,

    /// Source chain
    #[arg(long, value_name = "CHAIN", default_value = "ethereum")]
    pub from_chain: String,

    /// Destination chain
    #[arg(long, value_name = "CHAIN", default_value = "polygon")]
    pub to_chain: String,

    /// Source token symbol
    #[arg(long, value_name = "TOKEN", default_value = "ETH")]
    pub from_token: String,

    /// Destination token symbol
    #[arg(long, value_name = "TOKEN", default_value = "MATIC")]
    pub to_token: String,
}

impl PairArgs {
    fn form(&self) -> SwapFormState {
        SwapFormState::new(
            &self.from_chain,
            &self.to_chain,
            &self.from_token,
            &self.to_token,
            &self.amount,
        )
    }
}

/// Get a quote
#[derive(Parser, Debug)]
pub struct QuoteCmd {
    #[command(flatten)]
    pub pair: PairArgs,
}

/// Run a full swap against the backend
#[derive(Parser, Debug)]
pub struct DemoCmd {
    #[command(flatten)]
    pub pair: PairArgs,

    /// Seconds to wait for a completion event before reconciling
    #[arg(long, value_name = "SECS", default_value = "15")]
    pub wait: u64,
}

/// Follow the realtime channel
#[derive(Parser, Debug)]
pub struct WatchCmd {
    /// Address to subscribe for
    #[arg(value_name = "ADDRESS")]
    pub address: String,

    /// Stop after this many seconds (runs until Ctrl-C when omitted)
    #[arg(long, value_name = "SECS")]
    pub duration: Option<u64>,
}

/// Execute the CLI command
pub async fn execute(app: CliApp) -> Result<()> {
    let config = match &app.config {
        Some(path) => load_config(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => Config::default(),
    };

    init_logging(app.verbose, app.debug, config.logging.level.as_deref())?;

    match app.command {
        Command::Chains(cmd) => chains_command(&config, cmd).await,
        Command::Quote(cmd) => quote_command(&config, cmd).await,
        Command::Demo(cmd) => demo_command(&config, cmd).await,
        Command::Watch(cmd) => watch_command(&config, cmd).await,
    }
}

/// Initialize logging system
fn init_logging(verbose: bool, debug: bool, configured: Option<&str>) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        configured.unwrap_or("warn")
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialise logging: {}", e))?;

    Ok(())
}

fn api_client(config: &Config) -> Result<Arc<SyncApiClient>> {
    let client = SyncApiClient::with_config(config.api.client_config())
        .context("Failed to create API client")?;
    Ok(Arc::new(client))
}

/// Session manager with the wallets usable from a terminal
fn session_manager(config: &Config) -> Result<WalletSessionManager> {
    let manager = WalletSessionManager::new(ChainRegistry::builtin())
        .with_adapter(Arc::new(DemoWallet::new()));

    if let Some(path) = config.wallet.expanded_keypair_path() {
        let keypair = KeypairProvider::from_file(&path)
            .with_context(|| format!("Failed to load keypair from {}", path))?;
        manager.register_adapter(Arc::new(SolanaWallet::new(Arc::new(keypair), "Keypair")));
    }

    Ok(manager)
}

fn build_client(config: &Config) -> Result<SyncClient> {
    let api = api_client(config)?;
    let ws_url = config.ws_url()?;
    tracing::info!("Backend: {} (push: {})", api.base_url(), ws_url);

    Ok(SyncClient::new(
        session_manager(config)?,
        api,
        Arc::new(WsTransport::new(ws_url)),
        config.quotes.quote_settings(),
        config.realtime.channel_settings(),
    ))
}

async fn connect_default(client: &SyncClient, config: &Config) -> Result<()> {
    let kind = config.wallet.provider_kind()?;
    if kind == ProviderKind::Evm {
        bail!("EVM wallets need an injected provider; use the demo or a Solana keypair");
    }
    let session = client
        .connect(kind)
        .await
        .with_context(|| format!("Failed to connect {} wallet", kind))?;
    println!("Connected {} wallet {} on {}", kind, session.address, session.chain_id);
    match client.session().get_balance().await {
        Ok(balance) => println!("Balance: {}", balance),
        Err(e) => tracing::debug!(error = %e, "Wallet balance unavailable"),
    }
    Ok(())
}

/// Handle chains command
async fn chains_command(config: &Config, cmd: ChainsCmd) -> Result<()> {
    let mut registry = ChainRegistry::builtin();

    if !cmd.offline {
        let api = api_client(config)?;
        match api.chains().await {
            Ok(remote) => registry = registry.merged_with(&remote),
            Err(e) => tracing::warn!("Backend chain list unavailable: {}", e),
        }
    }

    println!("{:<8} {:<12} {:<6} RPC", "ID", "NAME", "SYMBOL");
    for chain in registry.iter() {
        println!(
            "{:<8} {:<12} {:<6} {}",
            chain.chain_id, chain.name, chain.native_currency_symbol, chain.rpc_endpoint
        );
    }

    Ok(())
}

/// Handle quote command
async fn quote_command(config: &Config, cmd: QuoteCmd) -> Result<()> {
    let client = build_client(config)?;
    connect_default(&client, config).await?;

    let form = cmd.pair.form();
    if !form.has_positive_amount() {
        bail!("Amount must be a positive number, got '{}'", form.amount);
    }

    client
        .quotes()
        .update(form.clone())
        .await
        .context("Failed to fetch quote")?;

    let Some(quote) = client.quotes().current_quote().await else {
        bail!("Quote was superseded before it arrived");
    };

    println!(
        "Quote {} {} ({}) -> {} ({})",
        form.amount, form.from_token, form.from_chain, form.to_token, form.to_chain
    );
    println!("  Receive:        {} {}", quote.to_amount, form.to_token);
    println!("  Execution time: {}s", quote.execution_time_seconds);
    println!("  Price impact:   {:.2}%", quote.price_impact_percent);
    if let Some(fee) = &quote.bridge_fee {
        println!("  Bridge fee:     {}", fee);
    }
    println!("  Expires:        {}", quote.expires_at.to_rfc3339());

    client.disconnect().await;
    Ok(())
}

/// Handle demo command
async fn demo_command(config: &Config, cmd: DemoCmd) -> Result<()> {
    let client = build_client(config)?;
    connect_default(&client, config).await?;

    let form = cmd.pair.form();
    client
        .quotes()
        .update(form)
        .await
        .context("Failed to fetch quote")?;

    let (_, mut updates) = client.executor().updates();
    let ticket = client
        .executor()
        .execute()
        .await
        .context("Swap submission failed")?;
    println!("Submitted transaction {}", ticket.transaction_id);

    let waited = tokio::time::timeout(Duration::from_secs(cmd.wait), async {
        while let Some(ticket) = updates.recv().await {
            println!("  -> {}", ticket.lifecycle_state);
            if ticket.lifecycle_state.is_terminal() {
                return Some(ticket.lifecycle_state);
            }
        }
        None
    })
    .await;

    let state = match waited {
        Ok(Some(state)) => state,
        _ => {
            tracing::info!("No terminal event received; reconciling with the backend");
            reconciled_state(&client).await?
        }
    };

    println!("Transaction {} is {}", ticket.transaction_id, state);
    client.disconnect().await;
    Ok(())
}

/// Ticket state after asking the backend, which may leave it unchanged
async fn reconciled_state(client: &SyncClient) -> Result<LifecycleState> {
    client
        .executor()
        .reconcile()
        .await
        .context("Reconciliation failed")?;
    client
        .executor()
        .ticket()
        .await
        .map(|ticket| ticket.lifecycle_state)
        .context("No swap ticket to report")
}

/// Handle watch command
async fn watch_command(config: &Config, cmd: WatchCmd) -> Result<()> {
    let client = build_client(config)?;
    let (_, mut events) = client.channel().events();
    client.channel().start(&cmd.address);
    println!("Watching {} (Ctrl-C to stop)", cmd.address);

    let print_events = async {
        while let Some(event) = events.recv().await {
            match &event {
                RealtimeEvent::PriceUpdate { token, price_usd } => match price_usd {
                    Some(price) => println!("[price] {} = ${:.4}", token, price),
                    None => println!("[price] {}", token),
                },
                other => match other.transaction_id() {
                    Some(id) => println!("[{}] {}", other.kind(), id),
                    None => println!("[{}]", other.kind()),
                },
            }
        }
    };

    let limit = cmd.duration.map(Duration::from_secs);
    tokio::select! {
        _ = print_events => {}
        _ = tokio::signal::ctrl_c() => {}
        _ = async {
            match limit {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        } => {}
    }

    client.channel().stop();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::{ChannelSettings, QuoteSettings};
    use crate::domain::ErrorKind;
    use crate::ports::mocks::{quote_payload, MockSwapApi, MockTransport};
    use crate::ports::TransactionRecord;

    #[test]
    fn test_parse_quote_defaults() {
        let app = CliApp::try_parse_from(["sync-client", "quote", "1.5"]).unwrap();
        let Command::Quote(cmd) = app.command else {
            panic!("expected quote command");
        };
        let form = cmd.pair.form();
        assert_eq!(form.amount, "1.5");
        assert_eq!(form.from_chain, "ethereum");
        assert_eq!(form.to_token, "MATIC");
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let app = CliApp::try_parse_from([
            "sync-client",
            "watch",
            "demo_address_123",
            "--duration",
            "3",
            "--config",
            "sync.toml",
            "--debug",
        ])
        .unwrap();

        assert!(app.debug);
        assert_eq!(app.config, Some(PathBuf::from("sync.toml")));
        let Command::Watch(cmd) = app.command else {
            panic!("expected watch command");
        };
        assert_eq!(cmd.address, "demo_address_123");
        assert_eq!(cmd.duration, Some(3));
    }

    #[test]
    fn test_demo_requires_amount() {
        assert!(CliApp::try_parse_from(["sync-client", "demo"]).is_err());
    }

    #[tokio::test]
    async fn test_session_manager_without_keypair_has_demo_only() {
        let manager = session_manager(&Config::default()).unwrap();
        assert_eq!(manager.registry().len(), 7);

        let err = manager.connect(ProviderKind::Solana).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProviderUnavailable);
        assert!(!manager.is_connected().await);

        let session = manager.connect(ProviderKind::Demo).await.unwrap();
        assert_eq!(session.provider_kind, ProviderKind::Demo);
    }

    async fn submitted_demo_client(api: &MockSwapApi) -> SyncClient {
        let session = WalletSessionManager::new(ChainRegistry::builtin())
            .with_adapter(Arc::new(DemoWallet::new()));
        let client = SyncClient::new(
            session,
            Arc::new(api.clone()),
            Arc::new(MockTransport::new()),
            QuoteSettings::default(),
            ChannelSettings::default(),
        );
        client.connect(ProviderKind::Demo).await.unwrap();
        client
            .quotes()
            .update(SwapFormState::new("ethereum", "polygon", "ETH", "MATIC", "1.0"))
            .await
            .unwrap();
        client.executor().execute().await.unwrap();
        client
    }

    #[tokio::test]
    async fn test_reconciled_state_reports_ticket_when_backend_is_silent() {
        let api = MockSwapApi::new()
            .with_quote(quote_payload("19.85", 12, 0.3))
            .with_swap("tx-7");
        let client = submitted_demo_client(&api).await;

        let state = reconciled_state(&client).await.unwrap();
        assert_eq!(state, LifecycleState::Submitted);
    }

    #[tokio::test]
    async fn test_reconciled_state_follows_backend_record() {
        let api = MockSwapApi::new()
            .with_quote(quote_payload("19.85", 12, 0.3))
            .with_swap("tx-7");
        let client = submitted_demo_client(&api).await;
        api.set_transactions(vec![TransactionRecord {
            id: "tx-7".to_string(),
            status: "completed".to_string(),
            tx_hash: None,
        }]);

        let state = reconciled_state(&client).await.unwrap();
        assert_eq!(state, LifecycleState::Completed);
    }
}
