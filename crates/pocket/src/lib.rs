//! Pocket: a non-custodial ecash wallet core.
//!
//! The crate owns the proof ledger and the mint transaction engine of a
//! bearer-token wallet. Proofs are issued and invalidated by remote mints
//! that never reveal balances, so the ledger here is the sole source of
//! truth for the value the wallet holds. Every mutating operation goes
//! through the [`wallet::TransactionEngine`], which enforces amount
//! conservation and reconciles state after network round-trips that can
//! partially fail.
//!
//! The blind-signature protocol itself is out of scope and sits behind the
//! [`wallet::MintClient`] trait; local persistence of proofs sits behind
//! [`backup::ProofBackup`].

#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

pub mod amount;
pub mod backup;
pub mod balance;
pub mod counter;
pub mod error;
pub mod ledger;
pub mod mint_url;
pub mod nuts;
pub mod registry;
pub mod util;
pub mod wallet;

pub use self::amount::Amount;
pub use self::error::Error;
pub use self::ledger::ProofLedger;
pub use self::mint_url::MintUrl;
pub use self::nuts::{CurrencyUnit, KeysetId, Proof, ProofState, Proofs, Secret, Token};
pub use self::wallet::TransactionEngine;

/// Ensure the expression evaluates to true, otherwise return the error.
#[macro_export]
macro_rules! ensure_pocket {
    ($cond:expr, $err:expr) => {
        if !$cond {
            return Err($err);
        }
    };
}
