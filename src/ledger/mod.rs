use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::address::Address;
use crate::policy::{self, PolicyError, TokenLimits};
use crate::units::{Amount, TOKEN_DECIMALS};

#[cfg(test)]
mod tests;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("insufficient balance in {account}: have {balance}, need {needed}")]
    InsufficientBalance {
        account: Address,
        balance: Amount,
        needed: Amount,
    },
    #[error("transfer amount must be greater than zero")]
    ZeroAmount,
    #[error("transfer to the zero address")]
    ZeroAddressRecipient,
    #[error("transaction amount {amount} exceeds limit {limit}")]
    ExceedsTransactionLimit { amount: Amount, limit: Amount },
    #[error("wallet {account} would hold {balance}, limit {limit}")]
    ExceedsWalletLimit {
        account: Address,
        balance: Amount,
        limit: Amount,
    },
    #[error("allowance of {spender} over {owner} is {allowance}, need {needed}")]
    InsufficientAllowance {
        owner: Address,
        spender: Address,
        allowance: Amount,
        needed: Amount,
    },
    #[error("ledger is paused")]
    Paused,
    #[error("caller {caller} is not the owner")]
    Unauthorized { caller: Address },
    #[error("limit {requested} below minimum {minimum}")]
    LimitTooLow { requested: Amount, minimum: Amount },
    #[error("reflection fee {requested}% exceeds 10%")]
    FeeTooHigh { requested: u8 },
    #[error("arithmetic overflow")]
    ArithmeticOverflow,
    #[error("invalid genesis: {0}")]
    InvalidGenesis(&'static str),
}

impl From<PolicyError> for LedgerError {
    fn from(err: PolicyError) -> Self {
        match err {
            PolicyError::TransactionLimitTooLow { requested, minimum }
            | PolicyError::WalletLimitTooLow { requested, minimum } => {
                LedgerError::LimitTooLow { requested, minimum }
            }
            PolicyError::FeeTooHigh { requested } => LedgerError::FeeTooHigh { requested },
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

impl Default for TokenMetadata {
    fn default() -> Self {
        Self {
            name: "TotheNineCloud".to_string(),
            symbol: "T9C".to_string(),
            decimals: TOKEN_DECIMALS,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SnapshotMetadata {
    /// Number of committed calls since genesis.
    pub height: u64,
    #[serde(with = "crate::encoding::hex_digest_opt")]
    pub last_call: Option<[u8; 32]>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    Transfer {
        from: Address,
        to: Address,
        /// Amount credited to `to`.
        #[serde(with = "crate::encoding::amount")]
        amount: Amount,
        /// Amount removed from circulation.
        #[serde(with = "crate::encoding::amount")]
        fee: Amount,
    },
    Approval {
        owner: Address,
        spender: Address,
        #[serde(with = "crate::encoding::amount")]
        amount: Amount,
    },
    Burn {
        holder: Address,
        #[serde(with = "crate::encoding::amount")]
        amount: Amount,
    },
    AntiWhaleTriggered {
        from: Address,
        #[serde(with = "crate::encoding::amount")]
        amount: Amount,
    },
    CloudReached {
        holder: Address,
        #[serde(with = "crate::encoding::amount")]
        balance: Amount,
    },
    Paused {
        by: Address,
    },
    Unpaused {
        by: Address,
    },
    MaxTransactionAmountUpdated {
        #[serde(with = "crate::encoding::amount")]
        amount: Amount,
    },
    MaxWalletAmountUpdated {
        #[serde(with = "crate::encoding::amount")]
        amount: Amount,
    },
    ReflectionFeeUpdated {
        percent: u8,
    },
    ExcludedFromFee {
        account: Address,
    },
    IncludedInFee {
        account: Address,
    },
}

/// A state-changing request, issued by `caller`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerCall {
    Transfer {
        to: Address,
        #[serde(with = "crate::encoding::amount")]
        amount: Amount,
    },
    Approve {
        spender: Address,
        #[serde(with = "crate::encoding::amount")]
        amount: Amount,
    },
    TransferFrom {
        from: Address,
        to: Address,
        #[serde(with = "crate::encoding::amount")]
        amount: Amount,
    },
    Burn {
        #[serde(with = "crate::encoding::amount")]
        amount: Amount,
    },
    Pause,
    Unpause,
    UpdateMaxTransactionAmount {
        #[serde(with = "crate::encoding::amount")]
        amount: Amount,
    },
    UpdateMaxWalletAmount {
        #[serde(with = "crate::encoding::amount")]
        amount: Amount,
    },
    SetReflectionFeePercent {
        percent: u8,
    },
    ExcludeFromFee {
        account: Address,
    },
    IncludeInFee {
        account: Address,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub meta: SnapshotMetadata,
    pub token: TokenMetadata,
    pub owner: Address,
    pub paused: bool,
    pub limits: TokenLimits,
    pub genesis_supply: Amount,
    pub total_supply: Amount,
    pub total_fees_collected: Amount,
    pub total_burned: Amount,
    pub balances: BTreeMap<Address, Amount>,
    pub allowances: BTreeMap<Address, BTreeMap<Address, Amount>>,
    pub excluded_from_fee: BTreeSet<Address>,
    #[serde(with = "crate::encoding::hex_bytes")]
    pub state_root: [u8; 32],
}

/// Fully validated transfer, ready to be written back.
#[derive(Debug)]
struct TransferPlan {
    from: Address,
    to: Address,
    from_balance: Amount,
    to_balance: Amount,
    total_supply: Amount,
    total_fees_collected: Amount,
    total_burned: Amount,
    events: Vec<LedgerEvent>,
}

/// The token's complete accounting state.
///
/// Every mutating method either commits all of its effects or returns an
/// error with the ledger untouched: checks and arithmetic run against the
/// current state first and writes happen only once nothing can fail.
#[derive(Clone, Debug)]
pub struct TokenLedger {
    meta: SnapshotMetadata,
    token: TokenMetadata,
    owner: Address,
    paused: bool,
    limits: TokenLimits,
    genesis_supply: Amount,
    total_supply: Amount,
    total_fees_collected: Amount,
    total_burned: Amount,
    balances: BTreeMap<Address, Amount>,
    allowances: BTreeMap<Address, BTreeMap<Address, Amount>>,
    excluded: BTreeSet<Address>,
    events: Vec<LedgerEvent>,
}

impl TokenLedger {
    /// Mints the whole supply to `owner`, who starts excluded from fees.
    pub fn genesis(
        token: TokenMetadata,
        owner: Address,
        supply: Amount,
        limits: TokenLimits,
    ) -> Result<Self, LedgerError> {
        if owner.is_zero() {
            return Err(LedgerError::InvalidGenesis("owner is the zero address"));
        }
        if supply == 0 {
            return Err(LedgerError::InvalidGenesis("total supply is zero"));
        }
        limits.validate(supply)?;

        let mut balances = BTreeMap::new();
        balances.insert(owner, supply);
        let mut excluded = BTreeSet::new();
        excluded.insert(owner);
        tracing::info!(
            %owner,
            symbol = %token.symbol,
            supply = %supply,
            "ledger created at genesis"
        );
        Ok(Self {
            meta: SnapshotMetadata::default(),
            token,
            owner,
            paused: false,
            limits,
            genesis_supply: supply,
            total_supply: supply,
            total_fees_collected: 0,
            total_burned: 0,
            balances,
            allowances: BTreeMap::new(),
            excluded,
            events: Vec::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.token.name
    }

    pub fn symbol(&self) -> &str {
        &self.token.symbol
    }

    pub fn decimals(&self) -> u8 {
        self.token.decimals
    }

    pub fn token(&self) -> &TokenMetadata {
        &self.token
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn limits(&self) -> TokenLimits {
        self.limits
    }

    pub fn max_transaction_amount(&self) -> Amount {
        self.limits.max_transaction_amount
    }

    pub fn max_wallet_amount(&self) -> Amount {
        self.limits.max_wallet_amount
    }

    pub fn reflection_fee_percent(&self) -> u8 {
        self.limits.reflection_fee_percent
    }

    pub fn genesis_supply(&self) -> Amount {
        self.genesis_supply
    }

    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    pub fn total_fees_collected(&self) -> Amount {
        self.total_fees_collected
    }

    pub fn total_burned(&self) -> Amount {
        self.total_burned
    }

    pub fn height(&self) -> u64 {
        self.meta.height
    }

    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    pub fn balance_of(&self, account: &Address) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    pub fn allowance(&self, owner: &Address, spender: &Address) -> Amount {
        self.allowances
            .get(owner)
            .and_then(|spenders| spenders.get(spender))
            .copied()
            .unwrap_or(0)
    }

    pub fn is_excluded_from_fee(&self, account: &Address) -> bool {
        self.excluded.contains(account)
    }

    /// Owner and fee-excluded accounts bypass the anti-whale caps.
    fn is_limit_exempt(&self, account: &Address) -> bool {
        *account == self.owner || self.excluded.contains(account)
    }

    fn ensure_owner(&self, caller: &Address) -> Result<(), LedgerError> {
        if *caller != self.owner {
            return Err(LedgerError::Unauthorized { caller: *caller });
        }
        Ok(())
    }

    fn ensure_transferable(&self, to: &Address, amount: Amount) -> Result<(), LedgerError> {
        if self.paused {
            return Err(LedgerError::Paused);
        }
        if amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        if to.is_zero() {
            return Err(LedgerError::ZeroAddressRecipient);
        }
        Ok(())
    }

    fn plan_transfer(
        &self,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<TransferPlan, LedgerError> {
        let balance = self.balance_of(from);
        if balance < amount {
            return Err(LedgerError::InsufficientBalance {
                account: *from,
                balance,
                needed: amount,
            });
        }
        let limits = &self.limits;
        if !self.is_limit_exempt(from) && amount > limits.max_transaction_amount {
            return Err(LedgerError::ExceedsTransactionLimit {
                amount,
                limit: limits.max_transaction_amount,
            });
        }

        let exempt = self.excluded.contains(from) || self.excluded.contains(to);
        let quote = limits
            .quote(amount, exempt)
            .ok_or(LedgerError::ArithmeticOverflow)?;

        let from_balance = balance - amount;
        let to_before = if from == to {
            from_balance
        } else {
            self.balance_of(to)
        };
        let to_balance = to_before
            .checked_add(quote.net)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        if !self.is_limit_exempt(to) && to_balance > limits.max_wallet_amount {
            return Err(LedgerError::ExceedsWalletLimit {
                account: *to,
                balance: to_balance,
                limit: limits.max_wallet_amount,
            });
        }

        let total_supply = self
            .total_supply
            .checked_sub(quote.fee)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        let total_fees_collected = self
            .total_fees_collected
            .checked_add(quote.fee)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        let total_burned = self
            .total_burned
            .checked_add(quote.fee)
            .ok_or(LedgerError::ArithmeticOverflow)?;

        let mut events = Vec::with_capacity(3);
        if limits.triggers_anti_whale(amount) {
            events.push(LedgerEvent::AntiWhaleTriggered {
                from: *from,
                amount,
            });
        }
        events.push(LedgerEvent::Transfer {
            from: *from,
            to: *to,
            amount: quote.net,
            fee: quote.fee,
        });
        if limits.reaches_cloud(to_balance) {
            events.push(LedgerEvent::CloudReached {
                holder: *to,
                balance: to_balance,
            });
        }

        Ok(TransferPlan {
            from: *from,
            to: *to,
            from_balance,
            to_balance,
            total_supply,
            total_fees_collected,
            total_burned,
            events,
        })
    }

    fn commit_transfer(&mut self, plan: TransferPlan) {
        if plan
            .events
            .iter()
            .any(|e| matches!(e, LedgerEvent::AntiWhaleTriggered { .. }))
        {
            tracing::info!(from = %plan.from, to = %plan.to, "anti-whale threshold crossed");
        }
        self.balances.insert(plan.from, plan.from_balance);
        self.balances.insert(plan.to, plan.to_balance);
        self.total_supply = plan.total_supply;
        self.total_fees_collected = plan.total_fees_collected;
        self.total_burned = plan.total_burned;
        self.commit(plan.events);
    }

    fn commit(&mut self, events: Vec<LedgerEvent>) {
        self.meta.height += 1;
        self.events.extend(events);
    }

    /// Moves `amount` from `from` to `to`, burning the reflection fee.
    pub fn transfer(
        &mut self,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        self.ensure_transferable(to, amount)?;
        let plan = self.plan_transfer(from, to, amount)?;
        self.commit_transfer(plan);
        Ok(())
    }

    /// Overwrites the allowance of `spender` over `owner`'s balance.
    pub fn approve(
        &mut self,
        owner: &Address,
        spender: &Address,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        self.allowances
            .entry(*owner)
            .or_default()
            .insert(*spender, amount);
        self.commit(vec![LedgerEvent::Approval {
            owner: *owner,
            spender: *spender,
            amount,
        }]);
        Ok(())
    }

    pub fn transfer_from(
        &mut self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        self.ensure_transferable(to, amount)?;
        let allowance = self.allowance(from, spender);
        if allowance < amount {
            return Err(LedgerError::InsufficientAllowance {
                owner: *from,
                spender: *spender,
                allowance,
                needed: amount,
            });
        }
        let plan = self.plan_transfer(from, to, amount)?;
        self.allowances
            .entry(*from)
            .or_default()
            .insert(*spender, allowance - amount);
        self.commit_transfer(plan);
        Ok(())
    }

    /// Destroys `amount` of `holder`'s tokens. Caps and pause do not apply.
    pub fn burn(&mut self, holder: &Address, amount: Amount) -> Result<(), LedgerError> {
        let balance = self.balance_of(holder);
        if balance < amount {
            return Err(LedgerError::InsufficientBalance {
                account: *holder,
                balance,
                needed: amount,
            });
        }
        if amount == 0 {
            return Ok(());
        }
        let total_supply = self
            .total_supply
            .checked_sub(amount)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        let total_burned = self
            .total_burned
            .checked_add(amount)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        self.balances.insert(*holder, balance - amount);
        self.total_supply = total_supply;
        self.total_burned = total_burned;
        self.commit(vec![LedgerEvent::Burn {
            holder: *holder,
            amount,
        }]);
        Ok(())
    }

    pub fn pause(&mut self, caller: &Address) -> Result<(), LedgerError> {
        self.ensure_owner(caller)?;
        let mut events = Vec::new();
        if !self.paused {
            self.paused = true;
            events.push(LedgerEvent::Paused { by: *caller });
        }
        self.commit(events);
        Ok(())
    }

    pub fn unpause(&mut self, caller: &Address) -> Result<(), LedgerError> {
        self.ensure_owner(caller)?;
        let mut events = Vec::new();
        if self.paused {
            self.paused = false;
            events.push(LedgerEvent::Unpaused { by: *caller });
        }
        self.commit(events);
        Ok(())
    }

    pub fn update_max_transaction_amount(
        &mut self,
        caller: &Address,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        self.ensure_owner(caller)?;
        policy::check_transaction_limit(amount, self.total_supply)?;
        self.limits.max_transaction_amount = amount;
        self.commit(vec![LedgerEvent::MaxTransactionAmountUpdated { amount }]);
        Ok(())
    }

    pub fn update_max_wallet_amount(
        &mut self,
        caller: &Address,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        self.ensure_owner(caller)?;
        policy::check_wallet_limit(amount, self.total_supply)?;
        self.limits.max_wallet_amount = amount;
        self.commit(vec![LedgerEvent::MaxWalletAmountUpdated { amount }]);
        Ok(())
    }

    pub fn set_reflection_fee_percent(
        &mut self,
        caller: &Address,
        percent: u8,
    ) -> Result<(), LedgerError> {
        self.ensure_owner(caller)?;
        policy::check_fee_percent(percent)?;
        self.limits.reflection_fee_percent = percent;
        self.commit(vec![LedgerEvent::ReflectionFeeUpdated { percent }]);
        Ok(())
    }

    pub fn exclude_from_fee(
        &mut self,
        caller: &Address,
        account: &Address,
    ) -> Result<(), LedgerError> {
        self.ensure_owner(caller)?;
        self.excluded.insert(*account);
        self.commit(vec![LedgerEvent::ExcludedFromFee { account: *account }]);
        Ok(())
    }

    pub fn include_in_fee(
        &mut self,
        caller: &Address,
        account: &Address,
    ) -> Result<(), LedgerError> {
        self.ensure_owner(caller)?;
        self.excluded.remove(account);
        self.commit(vec![LedgerEvent::IncludedInFee { account: *account }]);
        Ok(())
    }

    /// Dispatches `call` on behalf of `caller` and returns the events it emitted.
    pub fn apply(
        &mut self,
        caller: &Address,
        call: &LedgerCall,
    ) -> Result<Vec<LedgerEvent>, LedgerError> {
        let start = self.events.len();
        match call {
            LedgerCall::Transfer { to, amount } => self.transfer(caller, to, *amount)?,
            LedgerCall::Approve { spender, amount } => self.approve(caller, spender, *amount)?,
            LedgerCall::TransferFrom { from, to, amount } => {
                self.transfer_from(caller, from, to, *amount)?
            }
            LedgerCall::Burn { amount } => self.burn(caller, *amount)?,
            LedgerCall::Pause => self.pause(caller)?,
            LedgerCall::Unpause => self.unpause(caller)?,
            LedgerCall::UpdateMaxTransactionAmount { amount } => {
                self.update_max_transaction_amount(caller, *amount)?
            }
            LedgerCall::UpdateMaxWalletAmount { amount } => {
                self.update_max_wallet_amount(caller, *amount)?
            }
            LedgerCall::SetReflectionFeePercent { percent } => {
                self.set_reflection_fee_percent(caller, *percent)?
            }
            LedgerCall::ExcludeFromFee { account } => self.exclude_from_fee(caller, account)?,
            LedgerCall::IncludeInFee { account } => self.include_in_fee(caller, account)?,
        }
        Ok(self.events[start..].to_vec())
    }

    /// Remembers the digest of the authenticated call that was just applied.
    pub fn record_call(&mut self, call_id: [u8; 32]) {
        self.meta.last_call = Some(call_id);
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            meta: self.meta.clone(),
            token: self.token.clone(),
            owner: self.owner,
            paused: self.paused,
            limits: self.limits,
            genesis_supply: self.genesis_supply,
            total_supply: self.total_supply,
            total_fees_collected: self.total_fees_collected,
            total_burned: self.total_burned,
            balances: self.balances.clone(),
            allowances: self.allowances.clone(),
            excluded_from_fee: self.excluded.clone(),
            state_root: self.state_root(),
        }
    }

    pub fn state_root(&self) -> [u8; 32] {
        let mut leaves: Vec<[u8; 32]> = Vec::new();

        let mut hasher = Sha256::new();
        hasher.update(b"config");
        hasher.update(self.owner.as_bytes());
        hasher.update([self.paused as u8, self.limits.reflection_fee_percent]);
        hasher.update(self.limits.max_transaction_amount.to_le_bytes());
        hasher.update(self.limits.max_wallet_amount.to_le_bytes());
        hasher.update(self.genesis_supply.to_le_bytes());
        hasher.update(self.total_supply.to_le_bytes());
        hasher.update(self.total_fees_collected.to_le_bytes());
        hasher.update(self.total_burned.to_le_bytes());
        leaves.push(hasher.finalize().into());

        for (account, balance) in &self.balances {
            let mut hasher = Sha256::new();
            hasher.update(b"acct");
            hasher.update(account.as_bytes());
            hasher.update(balance.to_le_bytes());
            leaves.push(hasher.finalize().into());
        }
        for account in &self.excluded {
            let mut hasher = Sha256::new();
            hasher.update(b"excl");
            hasher.update(account.as_bytes());
            leaves.push(hasher.finalize().into());
        }
        for (owner, spenders) in &self.allowances {
            for (spender, amount) in spenders {
                let mut hasher = Sha256::new();
                hasher.update(b"allow");
                hasher.update(owner.as_bytes());
                hasher.update(spender.as_bytes());
                hasher.update(amount.to_le_bytes());
                leaves.push(hasher.finalize().into());
            }
        }
        build_merkle(leaves)
    }
}

fn build_merkle(mut leaves: Vec<[u8; 32]>) -> [u8; 32] {
    if leaves.is_empty() {
        return Sha256::digest(b"t9c-ledger-empty").into();
    }
    while leaves.len() > 1 {
        let mut next = Vec::with_capacity(leaves.len().div_ceil(2));
        for chunk in leaves.chunks(2) {
            let mut hasher = Sha256::new();
            hasher.update(b"node");
            hasher.update(chunk[0]);
            hasher.update(chunk.get(1).unwrap_or(&chunk[0]));
            next.push(hasher.finalize().into());
        }
        leaves = next;
    }
    leaves[0]
}
