//! Wallet types

use serde::{Deserialize, Serialize};

use crate::amount::Amount;
use crate::mint_url::MintUrl;
use crate::nuts::{CurrencyUnit, Proofs, Token};

/// Quote for exchanging a paid invoice for newly issued proofs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintQuote {
    /// Quote id
    pub id: String,
    /// Mint url
    pub mint_url: MintUrl,
    /// Amount the quote is for
    pub amount: Amount,
    /// Unit of the quote
    pub unit: CurrencyUnit,
    /// Payment request to pay to fund the quote
    pub request: String,
    /// Unix expiry time
    pub expiry: u64,
}

/// Quote for redeeming proofs to pay a lightning payment request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeltQuote {
    /// Quote id
    pub id: String,
    /// Mint url
    pub mint_url: MintUrl,
    /// Amount to be paid
    pub amount: Amount,
    /// Unit of the quote
    pub unit: CurrencyUnit,
    /// Payment request being paid
    pub request: String,
    /// Fee reserve the inputs must cover on top of the amount
    pub fee_reserve: Amount,
    /// Unix expiry time
    pub expiry: u64,
}

/// Result of a mint (top-up) operation
///
/// Empty when the quote has not been paid yet; the caller retries later.
#[derive(Debug, Clone, Default)]
pub struct MintOutcome {
    /// Value of the newly issued proofs
    pub minted_amount: Amount,
    /// The newly issued proofs, already in the ledger
    pub proofs: Proofs,
}

/// Result of a melt operation
#[derive(Debug, Clone)]
pub enum MeltOutcome {
    /// The mint settled the payment
    Paid {
        /// Lightning preimage, when the mint returned one
        preimage: Option<String>,
        /// Quoted amount that was paid
        amount: Amount,
        /// Fee actually consumed from the reserve
        fee_paid: Amount,
        /// Unspent fee reserve returned to the spendable collection
        change_amount: Amount,
    },
    /// No definitive answer arrived; the inputs stay pending and the quote
    /// is recorded for reconciliation. Not an error.
    Pending {
        /// Quote id to reconcile later
        quote_id: String,
    },
}

/// Result of a send operation
#[derive(Debug, Clone)]
pub struct SendOutcome {
    /// Token to hand to the recipient
    pub token: Token,
    /// Value handed over, equal to the requested amount
    pub sent_amount: Amount,
    /// Change retained in the spendable collection
    pub change_amount: Amount,
}

/// Result of a receive operation
#[derive(Debug, Clone)]
pub struct ReceiveOutcome {
    /// Value of the accepted proofs
    pub received_amount: Amount,
    /// Difference between the token value and the accepted value
    pub swap_fee: Amount,
    /// Denominations the mint rejected, for later retry
    pub error_token: Option<Token>,
    /// Messages for the rejected denominations
    pub errors: Vec<String>,
}

/// Result of a restore over one derivation range
#[derive(Debug, Clone, Default)]
pub struct RestoreOutcome {
    /// Value of the recovered, still unspent proofs
    pub restored_amount: Amount,
    /// Proofs the mint had signatures for in the range
    pub proofs_found: usize,
    /// Of those, proofs already spent and therefore dropped
    pub spent_filtered: usize,
}
