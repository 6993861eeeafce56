use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::ledger::{LedgerCall, LedgerError, LedgerEvent, LedgerSnapshot, TokenLedger};
use crate::units::Amount;

/// Result of one committed call.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallOutcome {
    pub height: u64,
    pub events: Vec<LedgerEvent>,
}

/// Cloneable handle to one ledger. Every method holds the lock for the whole
/// call, so concurrent callers are serialized and never observe a partially
/// applied operation.
#[derive(Clone)]
pub struct SharedLedger {
    inner: Arc<Mutex<TokenLedger>>,
}

impl SharedLedger {
    pub fn new(ledger: TokenLedger) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ledger)),
        }
    }

    /// Runs `call` as `caller`.
    pub fn execute(&self, caller: &Address, call: &LedgerCall) -> Result<CallOutcome, LedgerError> {
        self.execute_inner(caller, call, None)
    }

    /// Runs an authenticated call and records its digest in the snapshot metadata.
    pub fn execute_recorded(
        &self,
        caller: &Address,
        call: &LedgerCall,
        call_id: [u8; 32],
    ) -> Result<CallOutcome, LedgerError> {
        self.execute_inner(caller, call, Some(call_id))
    }

    fn execute_inner(
        &self,
        caller: &Address,
        call: &LedgerCall,
        call_id: Option<[u8; 32]>,
    ) -> Result<CallOutcome, LedgerError> {
        let mut ledger = self.inner.lock();
        match ledger.apply(caller, call) {
            Ok(events) => {
                if let Some(id) = call_id {
                    ledger.record_call(id);
                }
                let height = ledger.height();
                tracing::debug!(%caller, ?call, height, events = events.len(), "call committed");
                Ok(CallOutcome { height, events })
            }
            Err(err) => {
                tracing::warn!(%caller, ?call, error = %err, "call rejected");
                Err(err)
            }
        }
    }

    pub fn transfer(&self, from: &Address, to: &Address, amount: Amount) -> Result<(), LedgerError> {
        self.inner.lock().transfer(from, to, amount)
    }

    pub fn approve(
        &self,
        owner: &Address,
        spender: &Address,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        self.inner.lock().approve(owner, spender, amount)
    }

    pub fn transfer_from(
        &self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        self.inner.lock().transfer_from(spender, from, to, amount)
    }

    pub fn burn(&self, holder: &Address, amount: Amount) -> Result<(), LedgerError> {
        self.inner.lock().burn(holder, amount)
    }

    pub fn balance_of(&self, account: &Address) -> Amount {
        self.inner.lock().balance_of(account)
    }

    pub fn allowance(&self, owner: &Address, spender: &Address) -> Amount {
        self.inner.lock().allowance(owner, spender)
    }

    pub fn total_supply(&self) -> Amount {
        self.inner.lock().total_supply()
    }

    pub fn is_paused(&self) -> bool {
        self.inner.lock().is_paused()
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        self.inner.lock().snapshot()
    }

    /// Read access under the lock, for views not mirrored on the handle.
    pub fn with_ledger<R>(&self, f: impl FnOnce(&TokenLedger) -> R) -> R {
        f(&self.inner.lock())
    }
}
