//! Receive operation

use tracing::instrument;

use crate::amount::Amount;
use crate::ensure_pocket;
use crate::error::Error;
use crate::nuts::{ProofState, ProofsMethods, Token};
use crate::wallet::types::ReceiveOutcome;
use crate::wallet::TransactionEngine;

impl TransactionEngine {
    /// Redeem an incoming token at its issuing mint.
    ///
    /// The mint swaps the token's proofs for freshly issued ones owned by
    /// this wallet, so a sender cannot double-spend what they handed over.
    /// Denominations the mint rejects come back as a separate error token
    /// in the outcome instead of failing the receive.
    #[instrument(skip(self, token))]
    pub async fn receive(&self, token: Token) -> Result<ReceiveOutcome, Error> {
        ensure_pocket!(
            !token.proofs.is_empty(),
            Error::Validation("Token carries no proofs".to_string())
        );

        let mint_url = &token.mint_url;
        let unit = &token.unit;
        let token_total = token.total_amount()?;

        let keyset = self.registry().active_keyset(mint_url, unit).await?;
        let session = self.session(mint_url, unit, true).await?;

        let _guard = self.pair_lock(mint_url, &keyset.id).await;

        // the mint credits the token minus its swap fee, and that smaller
        // amount can split into more denominations than the token itself;
        // reserve for the widest split any credited amount could need
        let needed = u64::from(64 - u64::from(token_total).leading_zeros());
        let range = self.counters().reserve(mint_url, &keyset.id, needed).await?;

        let response = self
            .with_timeout(session.receive(token.clone(), range))
            .await?;

        let received_amount = response.proofs.total_amount()?;
        ensure_pocket!(
            received_amount <= token_total,
            Error::AmountMismatch {
                expected: token_total,
                actual: received_amount,
            }
        );

        let outcome = self
            .ledger()
            .add_proofs(response.proofs, ProofState::Spendable)
            .await?;

        let swap_fee = token_total
            .checked_sub(received_amount)
            .unwrap_or(Amount::ZERO);

        if let Some(error_token) = &response.error_token {
            tracing::warn!(
                "Mint {} rejected {} denominations of the received token",
                mint_url,
                error_token.proofs.len()
            );
        }

        tracing::debug!("Received {} from {}", outcome.added_amount, mint_url);

        Ok(ReceiveOutcome {
            received_amount: outcome.added_amount,
            swap_fee,
            error_token: response.error_token,
            errors: response.errors,
        })
    }
}
