//! Errors

use thiserror::Error;

use crate::amount::{self, Amount};
use crate::mint_url::{self, MintUrl};
use crate::nuts::KeysetId;

/// Pocket Error
///
/// The taxonomy callers branch on: validation failures never mutate the
/// ledger, mint errors mutate it only per the apply-step rules of the
/// transaction engine, connection failures leave proofs untouched, and
/// storage failures are logged without rolling back the in-memory ledger.
#[derive(Debug, Error)]
pub enum Error {
    /// Not enough spendable proofs to cover the amount
    #[error("Insufficient funds")]
    InsufficientFunds,
    /// Amount overflow
    #[error("Amount overflow")]
    AmountOverflow,
    /// Amounts returned by the mint do not conserve value
    #[error("Amount mismatch: expected `{expected}`, got `{actual}`")]
    AmountMismatch {
        /// Amount the operation requested
        expected: Amount,
        /// Amount the mint returned
        actual: Amount,
    },
    /// Keyset is not known
    #[error("Keyset id not known: `{0}`")]
    UnknownKeyset(KeysetId),
    /// Keyset id is malformed
    #[error("Invalid keyset id: `{0}`")]
    InvalidKeysetId(String),
    /// Mint is not registered
    #[error("Mint not known: `{0}`")]
    UnknownMint(MintUrl),
    /// Quote is not known
    #[error("Unknown quote")]
    UnknownQuote,
    /// Quote is expired
    #[error("Expired quote: Expired: `{0}`, Time: `{1}`")]
    ExpiredQuote(u64, u64),
    /// Mint quote has not been paid yet
    #[error("Quote not paid")]
    QuoteNotPaid,
    /// Lightning payment was rejected by the mint
    #[error("Payment failed")]
    PaymentFailed,
    /// A melt for one of the input proofs is already in flight
    #[error("Melt already in flight for input proofs")]
    MeltAlreadyInFlight,
    /// Malformed input
    #[error("Validation error: {0}")]
    Validation(String),
    /// The mint rejected or errored a request
    #[error("Mint error from `{mint_url}`: {message}")]
    Mint {
        /// Url of the mint that errored
        mint_url: MintUrl,
        /// Message returned by the mint
        message: String,
    },
    /// Mint was unreachable
    #[error("Could not connect to mint `{mint_url}`: {message}")]
    Connection {
        /// Url of the unreachable mint
        mint_url: MintUrl,
        /// Underlying transport message
        message: String,
    },
    /// Mint call exceeded its deadline
    #[error("Operation timeout")]
    Timeout,
    /// Local persistence failure
    #[error("Storage error: {0}")]
    Storage(String),
    /// Json error
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Amount error
    #[error(transparent)]
    Amount(#[from] amount::Error),
    /// Url error
    #[error(transparent)]
    Url(#[from] mint_url::Error),
}

impl Error {
    /// Whether the error means the mint may have acted on the request even
    /// though no response arrived. Such outcomes must be reconciled, never
    /// treated as failures.
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Error::Timeout | Error::Connection { .. })
    }
}
