//! TotheNineCloud (T9C) token ledger.
//!
//! An in-memory, fee-on-transfer token ledger:
//!
//! * [`ledger`] — the accounting state machine: balances, allowances, the
//!   burned reflection fee, anti-whale caps, pause and owner-only settings.
//! * [`policy`] — cap floors, fee ceiling and fee arithmetic.
//! * [`service`] — a mutex-serialized handle shared between callers.
//! * [`auth`] — ed25519-signed call envelopes that resolve a caller address.
//! * [`config`] — TOML genesis parameters.
//!
//! Hosting concerns (consensus, durable storage, wallets) live outside this
//! crate; callers hand in an already-authenticated [`Address`].

pub mod address;
pub mod auth;
pub mod config;
pub mod ledger;
pub mod policy;
pub mod service;
pub mod units;

mod encoding;

pub use address::Address;
pub use ledger::{LedgerCall, LedgerError, LedgerEvent, LedgerSnapshot, TokenLedger};
pub use service::SharedLedger;
pub use units::Amount;
