use serde::{Deserialize, Serialize};

use crate::units::Amount;

/// Highest reflection fee the owner may configure, in percent.
pub const MAX_REFLECTION_FEE_PERCENT: u8 = 10;
/// `maxTransactionAmount` may not drop below `totalSupply / 1000`.
pub const MIN_TRANSACTION_DIVISOR: Amount = 1_000;
/// `maxWalletAmount` may not drop below `totalSupply / 500`.
pub const MIN_WALLET_DIVISOR: Amount = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    #[error("max transaction amount {requested} below floor {minimum}")]
    TransactionLimitTooLow { requested: Amount, minimum: Amount },
    #[error("max wallet amount {requested} below floor {minimum}")]
    WalletLimitTooLow { requested: Amount, minimum: Amount },
    #[error("reflection fee {requested}% exceeds {MAX_REFLECTION_FEE_PERCENT}%")]
    FeeTooHigh { requested: u8 },
}

/// Anti-whale caps and the reflection fee rate.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenLimits {
    pub max_transaction_amount: Amount,
    pub max_wallet_amount: Amount,
    pub reflection_fee_percent: u8,
}

impl TokenLimits {
    /// Checks every bound against the given circulating supply.
    pub fn validate(&self, total_supply: Amount) -> Result<(), PolicyError> {
        check_transaction_limit(self.max_transaction_amount, total_supply)?;
        check_wallet_limit(self.max_wallet_amount, total_supply)?;
        check_fee_percent(self.reflection_fee_percent)
    }

    /// Fee owed on `amount` unless one side of the transfer is exempt.
    pub fn quote(&self, amount: Amount, exempt: bool) -> Option<FeeQuote> {
        if exempt {
            return Some(FeeQuote { fee: 0, net: amount });
        }
        FeeQuote::compute(amount, self.reflection_fee_percent)
    }

    /// Transfers strictly above half the transaction cap are flagged.
    pub fn triggers_anti_whale(&self, amount: Amount) -> bool {
        amount > self.max_transaction_amount / 2
    }

    /// Balances strictly above half the wallet cap are flagged.
    pub fn reaches_cloud(&self, balance: Amount) -> bool {
        balance > self.max_wallet_amount / 2
    }
}

pub fn min_transaction_amount(total_supply: Amount) -> Amount {
    total_supply / MIN_TRANSACTION_DIVISOR
}

pub fn min_wallet_amount(total_supply: Amount) -> Amount {
    total_supply / MIN_WALLET_DIVISOR
}

pub fn check_transaction_limit(requested: Amount, total_supply: Amount) -> Result<(), PolicyError> {
    let minimum = min_transaction_amount(total_supply);
    if requested < minimum {
        return Err(PolicyError::TransactionLimitTooLow { requested, minimum });
    }
    Ok(())
}

pub fn check_wallet_limit(requested: Amount, total_supply: Amount) -> Result<(), PolicyError> {
    let minimum = min_wallet_amount(total_supply);
    if requested < minimum {
        return Err(PolicyError::WalletLimitTooLow { requested, minimum });
    }
    Ok(())
}

pub fn check_fee_percent(requested: u8) -> Result<(), PolicyError> {
    if requested > MAX_REFLECTION_FEE_PERCENT {
        return Err(PolicyError::FeeTooHigh { requested });
    }
    Ok(())
}

/// Split of a transfer amount into the burned fee and the credited remainder.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeeQuote {
    pub fee: Amount,
    pub net: Amount,
}

impl FeeQuote {
    /// `fee = floor(amount * percent / 100)`. `None` only on overflow.
    pub fn compute(amount: Amount, percent: u8) -> Option<Self> {
        let fee = amount.checked_mul(percent as Amount)? / 100;
        Some(Self {
            fee,
            net: amount - fee,
        })
    }
}
