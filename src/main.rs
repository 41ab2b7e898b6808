//! Hyperliquid Webhook Trader - Main Entry Point
//!
//! Paper trading unless `LIVE_TRADING=true`.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hl_webhook_trader::config::Config;
use hl_webhook_trader::exchange::{HyperliquidClient, PaperVenue, TradingVenue};
use hl_webhook_trader::server;
use hl_webhook_trader::strategy::SignalDispatcher;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// Hyperliquid Webhook Trader CLI
#[derive(Parser)]
#[command(name = "hl-webhook-trader")]
#[command(version, about = "Webhook trading signals to bracketed Hyperliquid orders")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the webhook server (default)
    Serve {
        /// Override the configured listen port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Validate configuration and venue connectivity, then exit
    Check,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TradingMode {
    Live,
    Paper,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    init_logging()?;

    let mut config = match Config::load().and_then(|c| c.validate().map(|_| c)) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {:#}", e);
            return Err(e);
        }
    };

    match cli.command {
        Some(Commands::Check) => return run_check(&config).await,
        Some(Commands::Serve { port: Some(port) }) => config.server.port = port,
        Some(Commands::Serve { port: None }) | None => {}
    }

    info!("╔════════════════════════════════════════════════════════════╗");
    info!(
        "║           Hyperliquid Webhook Trader v{}                ║",
        env!("CARGO_PKG_VERSION")
    );
    info!("╚════════════════════════════════════════════════════════════╝");

    // Determine trading mode from environment
    let trading_mode = if std::env::var("LIVE_TRADING").unwrap_or_default() == "true" {
        warn!("⚠️  LIVE TRADING MODE - Real money at risk!");
        TradingMode::Live
    } else {
        info!("📝 PAPER TRADING MODE - Orders are simulated in memory");
        TradingMode::Paper
    };

    log_config(&config);

    let venue: Arc<dyn TradingVenue> = match trading_mode {
        TradingMode::Live => Arc::new(HyperliquidClient::connect(&config).await?),
        TradingMode::Paper => Arc::new(PaperVenue::new()),
    };
    info!(venue = %venue.venue(), "Trading venue ready");

    let dispatcher = Arc::new(SignalDispatcher::new(venue, &config));

    let addr = format!("{}:{}", config.server.bind, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    server::serve(listener, dispatcher).await?;

    info!("👋 Webhook trader shutdown complete");
    Ok(())
}

/// Connect to the venue and print what a live run would trade with.
async fn run_check(config: &Config) -> Result<()> {
    let client = HyperliquidClient::connect(config).await?;
    let account = &config.credentials.sub_account_address;

    let positions = client.get_position_state(account).await?;
    let open_orders = client.list_open_orders(account).await?;

    info!("✅ Configuration and venue connectivity OK");
    info!("   Agent: {}", client.agent_address());
    info!("   Account: {}", account);
    info!("   Coin: {}", config.venue.coin);
    info!("   Open positions: {}", positions.len());
    for position in &positions {
        info!("     {} szi={}", position.symbol, position.szi);
    }
    info!("   Open orders: {}", open_orders.len());
    Ok(())
}

/// Initialize logging with console and file output.
fn init_logging() -> Result<()> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    // Create logs directory
    std::fs::create_dir_all("logs")?;

    // File appender for detailed logs
    let file_appender = tracing_appender::rolling::hourly("logs", "webhook-trader.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    // Leak the guard to keep it alive for the program duration
    Box::leak(Box::new(guard));

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("hl_webhook_trader=debug".parse()?)
                .add_directive(Level::INFO.into()),
        )
        .with_writer(std::io::stdout.and(file_writer))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .init();

    Ok(())
}

/// Log configuration on startup.
fn log_config(config: &Config) {
    let exec = &config.execution;
    info!("📋 Configuration:");
    info!("   Venue: {} (testnet: {})", config.api_url(), config.venue.testnet);
    info!("   Coin: {}", config.venue.coin);
    info!("   Account: {}", config.credentials.sub_account_address);
    info!("   Price precision: {:?}", exec.precision);
    info!("   Default notional: ${}", exec.notional_usd);
    info!("   Bracket slippage: {:.1}%", exec.bracket_slippage * dec!(100));
    info!("   Market slippage: {:.1}%", exec.market_slippage * dec!(100));
    info!("   Stop loss trigger: {:?}", exec.stop_loss_trigger);
    info!("   Take profit mode: {:?}", exec.take_profit_mode);
    info!(
        "   Refetch position before close: {}",
        exec.refetch_position_before_close
    );
}
