//! Melt (pay lightning) operation

use tracing::instrument;

use crate::amount::Amount;
use crate::ensure_pocket;
use crate::error::Error;
use crate::ledger::select_proofs;
use crate::mint_url::MintUrl;
use crate::nuts::{CurrencyUnit, ProofState, Proofs, ProofsMethods};
use crate::util::unix_time;
use crate::wallet::types::{MeltOutcome, MeltQuote};
use crate::wallet::{PendingMelt, TransactionEngine};

/// Number of blank change outputs needed to return an unspent fee reserve,
/// per NUT-08: `max(ceil(log2(fee_reserve)), 1)`, none for a zero reserve.
fn blank_output_count(fee_reserve: Amount) -> u64 {
    let reserve = u64::from(fee_reserve);
    match reserve {
        0 => 0,
        1 => 1,
        n => u64::from(64 - (n - 1).leading_zeros()),
    }
}

impl TransactionEngine {
    /// Request a quote for paying a lightning payment request
    #[instrument(skip(self, request))]
    pub async fn melt_quote(
        &self,
        mint_url: &MintUrl,
        unit: &CurrencyUnit,
        request: String,
    ) -> Result<MeltQuote, Error> {
        let session = self.session(mint_url, unit, false).await?;
        self.with_timeout(session.melt_quote(request)).await
    }

    /// Pay the quoted payment request from the mint's spendable proofs.
    ///
    /// Inputs move to pending and into the in-flight-melt guard before the
    /// network call. A definitive answer settles or reverts them; no answer
    /// leaves them pending with the quote id recorded for the
    /// reconciliation sweep, since the payment may still have gone through
    /// and success is never guessed either way.
    #[instrument(skip(self, quote))]
    pub async fn melt(&self, quote: &MeltQuote) -> Result<MeltOutcome, Error> {
        let now = unix_time();
        ensure_pocket!(quote.expiry > now, Error::ExpiredQuote(quote.expiry, now));

        let mint_url = &quote.mint_url;
        let keyset = self.registry().active_keyset(mint_url, &quote.unit).await?;
        let session = self.session(mint_url, &quote.unit, true).await?;

        let _guard = self.pair_lock(mint_url, &keyset.id).await;

        let needed = quote
            .amount
            .checked_add(quote.fee_reserve)
            .ok_or(Error::AmountOverflow)?;
        let available = self
            .ledger()
            .get_by_mint(mint_url, Some(&quote.unit), false)
            .await;
        let inputs = select_proofs(needed, &available)?;
        let inputs_total = inputs.total_amount()?;

        // guard against a second submission of any input while one melt is
        // in flight
        let mut guarded: Vec<_> = Vec::with_capacity(inputs.len());
        for secret in inputs.secrets() {
            if !self.ledger().add_to_pending_by_mint(&secret).await {
                for earlier in &guarded {
                    self.ledger().remove_from_pending_by_mint(earlier).await;
                }
                return Err(Error::MeltAlreadyInFlight);
            }
            guarded.push(secret);
        }

        self.move_to_pending(&inputs).await?;

        let range = self
            .counters()
            .reserve(mint_url, &keyset.id, blank_output_count(quote.fee_reserve))
            .await?;

        let response = self
            .with_timeout(session.melt(quote, inputs.clone(), range))
            .await;

        let response = match response {
            Ok(response) => response,
            Err(err) if err.is_ambiguous() => {
                tracing::warn!(
                    "No melt answer from {} for quote {}, parking inputs for reconciliation",
                    mint_url,
                    quote.id
                );
                self.record_pending_melt(
                    quote.id.clone(),
                    PendingMelt {
                        mint_url: mint_url.clone(),
                        secrets: guarded,
                        submitted_at: unix_time(),
                    },
                )
                .await;
                return Ok(MeltOutcome::Pending {
                    quote_id: quote.id.clone(),
                });
            }
            Err(err) => {
                tracing::error!("Mint rejected melt for quote {}: {}", quote.id, err);
                self.revert_pending(&inputs, &guarded).await?;
                return Err(err);
            }
        };

        if !response.paid {
            self.revert_pending(&inputs, &guarded).await?;
            return Err(Error::PaymentFailed);
        }

        let change_amount = response.change.total_amount()?;
        if change_amount > quote.fee_reserve {
            // the mint returned more change than the reserve it quoted;
            // keep the inputs parked rather than applying a result that
            // does not conserve value
            self.record_pending_melt(
                quote.id.clone(),
                PendingMelt {
                    mint_url: mint_url.clone(),
                    secrets: guarded,
                    submitted_at: unix_time(),
                },
            )
            .await;
            return Err(Error::AmountMismatch {
                expected: quote.fee_reserve,
                actual: change_amount,
            });
        }

        // settled: inputs are spent, the unspent reserve comes back
        self.ledger().remove_proofs(&inputs, true, false).await?;
        if !response.change.is_empty() {
            self.ledger()
                .add_proofs(response.change.clone(), ProofState::Spendable)
                .await?;
        }
        for secret in &guarded {
            self.ledger().remove_from_pending_by_mint(secret).await;
        }

        let fee_paid = inputs_total
            .checked_sub(quote.amount)
            .and_then(|reserve| reserve.checked_sub(change_amount))
            .ok_or(Error::AmountOverflow)?;

        tracing::debug!(
            "Melted {} via {} (fee paid {}, change {})",
            quote.amount,
            mint_url,
            fee_paid,
            change_amount
        );

        Ok(MeltOutcome::Paid {
            preimage: response.preimage,
            amount: quote.amount,
            fee_paid,
            change_amount,
        })
    }

    /// Move spendable proofs into the pending collection
    pub(crate) async fn move_to_pending(&self, proofs: &Proofs) -> Result<(), Error> {
        let removed = self.ledger().remove_proofs(proofs, false, true).await?;
        if removed.len() != proofs.len() {
            // put back whatever was taken; the caller handed us proofs the
            // ledger does not own
            self.ledger()
                .add_proofs(removed, ProofState::Spendable)
                .await?;
            return Err(Error::Validation(
                "Input proofs are not in the spendable collection".to_string(),
            ));
        }
        self.ledger()
            .add_proofs(proofs.clone(), ProofState::Pending)
            .await?;
        Ok(())
    }

    /// Return pending proofs to the spendable collection and clear their
    /// in-flight-melt marks
    async fn revert_pending(
        &self,
        proofs: &Proofs,
        guarded: &[crate::nuts::Secret],
    ) -> Result<(), Error> {
        self.ledger().remove_proofs(proofs, true, true).await?;
        self.ledger()
            .add_proofs(proofs.clone(), ProofState::Spendable)
            .await?;
        for secret in guarded {
            self.ledger().remove_from_pending_by_mint(secret).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_output_count() {
        assert_eq!(0, blank_output_count(Amount::ZERO));
        assert_eq!(1, blank_output_count(Amount::ONE));
        assert_eq!(1, blank_output_count(Amount::from(2)));
        assert_eq!(6, blank_output_count(Amount::from(64)));
        assert_eq!(10, blank_output_count(Amount::from(1000)));
    }
}
