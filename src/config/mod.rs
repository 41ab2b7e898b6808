//! Configuration management for the webhook trader.
//!
//! Loads settings from a `.env` file, an optional `config.toml` and
//! environment variables prefixed with `HLW` (e.g. `HLW__EXECUTION__NOTIONAL_USD`).

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Hyperliquid mainnet API.
pub const MAINNET_API_URL: &str = "https://api.hyperliquid.xyz";
/// Hyperliquid testnet API.
pub const TESTNET_API_URL: &str = "https://api.hyperliquid-testnet.xyz";

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP listener
    #[serde(default)]
    pub server: ServerConfig,
    /// Venue endpoint and traded instrument
    #[serde(default)]
    pub venue: VenueConfig,
    /// Delegated trading identity
    #[serde(default)]
    pub credentials: CredentialsConfig,
    /// Order construction policies
    #[serde(default)]
    pub execution: ExecutionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueConfig {
    /// Override for the API base URL. Empty means mainnet/testnet default.
    #[serde(default)]
    pub api_url: String,
    /// Use testnet endpoint and testnet signing source
    #[serde(default)]
    pub testnet: bool,
    /// The single instrument this deployment trades
    #[serde(default = "default_coin")]
    pub coin: String,
    /// Transport timeout for venue requests
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// Hex-encoded private key of the approved agent wallet
    #[serde(default)]
    pub agent_secret_key: String,
    /// Account the agent trades for; also the account queried for state
    #[serde(default)]
    pub sub_account_address: String,
    /// Set when orders must be routed on behalf of a vault/sub-account
    #[serde(default)]
    pub vault_address: Option<String>,
}

// Keep the secret out of logs.
impl std::fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("agent_secret_key", &"<redacted>")
            .field("sub_account_address", &self.sub_account_address)
            .field("vault_address", &self.vault_address)
            .finish()
    }
}

/// How raw signal prices are made venue-legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrecisionMode {
    SignificantFigures,
    DecimalPlaces,
}

/// Trigger flavour for the protective stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopLossTrigger {
    /// Becomes a market order once triggered
    Market,
    /// Becomes an IOC limit at the bumped price once triggered
    Limit,
}

/// Execution mode for the take-profit leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TakeProfitMode {
    /// Add-liquidity-only resting limit at the exact target; fee-optimal, may never fill
    Maker,
    /// Market trigger with slippage bump; fills but pays taker fees
    MarketTrigger,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default = "default_precision")]
    pub precision: PrecisionMode,
    #[serde(default = "default_significant_figures")]
    pub significant_figures: u32,
    #[serde(default = "default_decimal_places")]
    pub decimal_places: u32,
    /// Position value used when a signal carries no size
    #[serde(default = "default_notional_usd")]
    pub notional_usd: Decimal,
    /// Base-asset decimals kept when deriving size from notional
    #[serde(default = "default_size_decimals")]
    pub size_decimals: u32,
    /// Offset between a trigger and its resting limit, and for parachute closes (0.0-1.0)
    #[serde(default = "default_bracket_slippage")]
    pub bracket_slippage: Decimal,
    /// Slippage bound for market entries (0.0-1.0)
    #[serde(default = "default_market_slippage")]
    pub market_slippage: Decimal,
    #[serde(default = "default_stop_loss_trigger")]
    pub stop_loss_trigger: StopLossTrigger,
    #[serde(default = "default_take_profit_mode")]
    pub take_profit_mode: TakeProfitMode,
    /// Apply the bracket slippage to a maker take-profit too
    #[serde(default)]
    pub bump_maker_take_profit: bool,
    /// Re-read the position after the sweep and before the close order
    #[serde(default)]
    pub refetch_position_before_close: bool,
}

// Default value functions
fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_coin() -> String {
    "HYPE".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_precision() -> PrecisionMode {
    PrecisionMode::SignificantFigures
}

fn default_significant_figures() -> u32 {
    5 // Venue limit for perp prices
}

fn default_decimal_places() -> u32 {
    4
}

fn default_notional_usd() -> Decimal {
    Decimal::new(1000, 0) // $100 margin at 10x
}

fn default_size_decimals() -> u32 {
    1
}

fn default_bracket_slippage() -> Decimal {
    Decimal::new(10, 2) // 0.10
}

fn default_market_slippage() -> Decimal {
    Decimal::new(5, 2) // 0.05
}

fn default_stop_loss_trigger() -> StopLossTrigger {
    StopLossTrigger::Market
}

fn default_take_profit_mode() -> TakeProfitMode {
    TakeProfitMode::Maker
}

impl Config {
    /// Load configuration from environment variables and config files.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let settings = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::default().separator("__").prefix("HLW"))
            .build()
            .context("Failed to build configuration")?;

        let mut config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.apply_env_fallbacks(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Fill unset fields from the plain environment names the service has always used.
    fn apply_env_fallbacks(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.credentials.agent_secret_key.is_empty() {
            if let Some(key) = lookup("AGENT_SECRET_KEY") {
                self.credentials.agent_secret_key = key;
            }
        }
        if self.credentials.sub_account_address.is_empty() {
            if let Some(addr) = lookup("SUB_ACCOUNT_ADDR") {
                self.credentials.sub_account_address = addr;
            }
        }
        if let Some(port) = lookup("PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            !self.credentials.agent_secret_key.trim().is_empty(),
            "agent secret key is required (AGENT_SECRET_KEY)"
        );
        anyhow::ensure!(
            is_address(&self.credentials.sub_account_address),
            "sub-account address is required and must be a 0x-prefixed 20-byte hex address (SUB_ACCOUNT_ADDR)"
        );
        if let Some(vault) = &self.credentials.vault_address {
            anyhow::ensure!(is_address(vault), "vault_address must be a 20-byte hex address");
        }

        anyhow::ensure!(!self.venue.coin.is_empty(), "venue coin must not be empty");

        let exec = &self.execution;
        anyhow::ensure!(
            exec.bracket_slippage > Decimal::ZERO && exec.bracket_slippage < Decimal::ONE,
            "bracket_slippage must be between 0 and 1"
        );
        anyhow::ensure!(
            exec.market_slippage > Decimal::ZERO && exec.market_slippage < Decimal::ONE,
            "market_slippage must be between 0 and 1"
        );
        anyhow::ensure!(
            exec.notional_usd > Decimal::ZERO,
            "notional_usd must be positive"
        );
        anyhow::ensure!(
            exec.significant_figures >= 1,
            "significant_figures must be at least 1"
        );

        Ok(())
    }

    /// API base URL for the configured network.
    pub fn api_url(&self) -> &str {
        if !self.venue.api_url.is_empty() {
            &self.venue.api_url
        } else if self.venue.testnet {
            TESTNET_API_URL
        } else {
            MAINNET_API_URL
        }
    }
}

fn is_address(value: &str) -> bool {
    value
        .strip_prefix("0x")
        .map(|hex| hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit()))
        .unwrap_or(false)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            venue: VenueConfig::default(),
            credentials: CredentialsConfig::default(),
            execution: ExecutionConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

impl Default for VenueConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            testnet: false,
            coin: default_coin(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            precision: default_precision(),
            significant_figures: default_significant_figures(),
            decimal_places: default_decimal_places(),
            notional_usd: default_notional_usd(),
            size_decimals: default_size_decimals(),
            bracket_slippage: default_bracket_slippage(),
            market_slippage: default_market_slippage(),
            stop_loss_trigger: default_stop_loss_trigger(),
            take_profit_mode: default_take_profit_mode(),
            bump_maker_take_profit: false,
            refetch_position_before_close: false,
        }
    }
}
