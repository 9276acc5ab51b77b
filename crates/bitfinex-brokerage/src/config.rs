/*
[INPUT]:  YAML configuration file or programmatic values
[OUTPUT]: Validated brokerage configuration
[POS]:    Configuration layer - per-connector settings (no globals)
[UPDATE]: When adding new configuration options
*/

use std::path::Path;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::auth::ApiCredentials;
use crate::http::{BitfinexError, ClientConfig, Result};
use crate::mapping::ScaleFactor;
use crate::types::AccountType;

pub const DEFAULT_REST_BASE_URL: &str = "https://api.bitfinex.com";
pub const DEFAULT_WS_URL: &str = "wss://api.bitfinex.com/ws";

/// Control codes carried by `{"event":"info","code":..}` frames.
///
/// These are an exchange contract; only the two reactions below are acted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct InfoCodes {
    /// Server restart: close and reconnect
    #[serde(default = "default_hard_reset_code")]
    pub hard_reset: i64,
    /// Channel mapping invalidated: unsubscribe and resubscribe everything
    #[serde(default = "default_resubscribe_code")]
    pub resubscribe: i64,
}

impl Default for InfoCodes {
    fn default() -> Self {
        Self {
            hard_reset: default_hard_reset_code(),
            resubscribe: default_resubscribe_code(),
        }
    }
}

/// Top-level configuration for one brokerage instance
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BrokerageConfig {
    pub api_key: String,
    pub api_secret: String,
    /// Cash trades the exchange wallet, margin the trading wallet
    pub account_type: AccountType,
    /// Legacy lot-size multiplier between engine and exchange units
    #[serde(default = "default_scale_factor", with = "rust_decimal::serde::str")]
    pub scale_factor: Decimal,
    /// Currency cash balances are valued in
    #[serde(default = "default_account_currency")]
    pub account_currency: String,
    #[serde(default = "default_rest_base_url")]
    pub rest_base_url: String,
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    /// Also subscribe the public trades channel for each pair
    #[serde(default = "default_subscribe_trades")]
    pub subscribe_trades: bool,
    #[serde(default)]
    pub info_codes: InfoCodes,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl BrokerageConfig {
    /// Configuration with defaults for everything but credentials and mode
    pub fn new(
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
        account_type: AccountType,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            account_type,
            scale_factor: default_scale_factor(),
            account_currency: default_account_currency(),
            rest_base_url: default_rest_base_url(),
            ws_url: default_ws_url(),
            subscribe_trades: default_subscribe_trades(),
            info_codes: InfoCodes::default(),
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }

    /// Load configuration from YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|err| {
            BitfinexError::Config(format!("read {}: {err}", path.display()))
        })?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)
            .map_err(|err| BitfinexError::Config(format!("parse config: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Fail fast on empty credentials or an unusable scale factor
    pub fn validate(&self) -> Result<()> {
        self.credentials()?;
        self.scale()?;
        if self.account_currency.trim().is_empty() {
            return Err(BitfinexError::Config("account currency is empty".to_string()));
        }
        if self.info_codes.hard_reset == self.info_codes.resubscribe {
            return Err(BitfinexError::Config(
                "hard reset and resubscribe info codes must differ".to_string(),
            ));
        }
        Ok(())
    }

    pub fn credentials(&self) -> Result<ApiCredentials> {
        ApiCredentials::new(self.api_key.clone(), self.api_secret.clone())
    }

    pub fn scale(&self) -> Result<ScaleFactor> {
        ScaleFactor::new(self.scale_factor)
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            timeout: Duration::from_secs(self.timeout_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
        }
    }

    /// Account currency, upper case
    pub fn account_currency(&self) -> String {
        self.account_currency.trim().to_ascii_uppercase()
    }
}

fn default_hard_reset_code() -> i64 {
    20051
}

fn default_resubscribe_code() -> i64 {
    20061
}

fn default_scale_factor() -> Decimal {
    Decimal::ONE
}

fn default_account_currency() -> String {
    "USD".to_string()
}

fn default_rest_base_url() -> String {
    DEFAULT_REST_BASE_URL.to_string()
}

fn default_ws_url() -> String {
    DEFAULT_WS_URL.to_string()
}

fn default_subscribe_trades() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}
