use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::ledger::{LedgerError, TokenLedger, TokenMetadata};
use crate::policy::TokenLimits;
use crate::units::{parse_units, UnitsError, TOKEN_DECIMALS};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("{field}: {source}")]
    Amount {
        field: &'static str,
        #[source]
        source: UnitsError,
    },
    #[error("genesis owner must be set")]
    MissingOwner,
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Deployment parameters. Amounts are decimal token strings because base-unit
/// values do not fit TOML integers.
///
/// ```toml
/// owner = "0x1111111111111111111111111111111111111111"
/// total_supply = "1000000000"
/// max_transaction_amount = "10000000"
/// max_wallet_amount = "20000000"
/// reflection_fee_percent = 2
/// ```
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct GenesisConfig {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub owner: Option<Address>,
    pub total_supply: String,
    pub max_transaction_amount: String,
    pub max_wallet_amount: String,
    pub reflection_fee_percent: u8,
}

impl Default for GenesisConfig {
    fn default() -> Self {
        let token = TokenMetadata::default();
        Self {
            name: token.name,
            symbol: token.symbol,
            decimals: TOKEN_DECIMALS,
            owner: None,
            total_supply: "1000000000".to_string(),
            max_transaction_amount: "10000000".to_string(),
            max_wallet_amount: "20000000".to_string(),
            reflection_fee_percent: 2,
        }
    }
}

impl GenesisConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn limits(&self) -> Result<TokenLimits, ConfigError> {
        Ok(TokenLimits {
            max_transaction_amount: self.amount("max_transaction_amount", &self.max_transaction_amount)?,
            max_wallet_amount: self.amount("max_wallet_amount", &self.max_wallet_amount)?,
            reflection_fee_percent: self.reflection_fee_percent,
        })
    }

    pub fn supply(&self) -> Result<u128, ConfigError> {
        self.amount("total_supply", &self.total_supply)
    }

    fn amount(&self, field: &'static str, value: &str) -> Result<u128, ConfigError> {
        parse_units(value, self.decimals).map_err(|source| ConfigError::Amount { field, source })
    }

    /// Validates the parameters and creates the genesis ledger.
    pub fn build(&self) -> Result<TokenLedger, ConfigError> {
        let owner = self.owner.ok_or(ConfigError::MissingOwner)?;
        let token = TokenMetadata {
            name: self.name.clone(),
            symbol: self.symbol.clone(),
            decimals: self.decimals,
        };
        Ok(TokenLedger::genesis(token, owner, self.supply()?, self.limits()?)?)
    }
}
