//! Send operation

use tracing::instrument;

use crate::amount::Amount;
use crate::ensure_pocket;
use crate::error::Error;
use crate::ledger::select_proofs;
use crate::mint_url::MintUrl;
use crate::nuts::{CurrencyUnit, ProofState, ProofsMethods, Token};
use crate::wallet::types::SendOutcome;
use crate::wallet::TransactionEngine;

impl TransactionEngine {
    /// Prepare a token worth exactly `amount` for a recipient.
    ///
    /// When the selected inputs already match the amount no mint round-trip
    /// is needed; otherwise the protocol library swaps them for an
    /// exact-amount subset plus change. Either way the sent proofs are
    /// parked as pending until check-spent sees the recipient redeem them.
    #[instrument(skip(self, memo))]
    pub async fn send(
        &self,
        mint_url: &MintUrl,
        unit: &CurrencyUnit,
        amount: Amount,
        memo: Option<String>,
    ) -> Result<SendOutcome, Error> {
        ensure_pocket!(
            amount > Amount::ZERO,
            Error::Validation("Cannot send a zero amount".to_string())
        );

        let keyset = self.registry().active_keyset(mint_url, unit).await?;
        let _guard = self.pair_lock(mint_url, &keyset.id).await;

        let available = self.ledger().get_by_mint(mint_url, Some(unit), false).await;
        let inputs = select_proofs(amount, &available)?;
        let inputs_total = inputs.total_amount()?;

        // exact match needs no swap, the inputs become the token
        if inputs_total == amount {
            self.move_to_pending(&inputs).await?;
            let token = Token::new(mint_url.clone(), unit.clone(), inputs, memo);
            return Ok(SendOutcome {
                token,
                sent_amount: amount,
                change_amount: Amount::ZERO,
            });
        }

        let change_expected = inputs_total
            .checked_sub(amount)
            .ok_or(Error::AmountOverflow)?;
        let needed = (amount.split().len() + change_expected.split().len()) as u64;
        let range = self.counters().reserve(mint_url, &keyset.id, needed).await?;

        let session = self.session(mint_url, unit, true).await?;
        let response = match self
            .with_timeout(session.swap_send(amount, inputs.clone(), range))
            .await
        {
            Ok(response) => response,
            Err(err) if err.is_ambiguous() => {
                // the swap may have invalidated the inputs mint-side; park
                // them for the sweep instead of leaving them spendable
                tracing::warn!(
                    "No swap answer from {}, parking send inputs for reconciliation",
                    mint_url
                );
                self.move_to_pending(&inputs).await?;
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        let sent_amount = response.send.total_amount()?;
        ensure_pocket!(
            sent_amount == amount,
            Error::AmountMismatch {
                expected: amount,
                actual: sent_amount,
            }
        );

        let change_amount = response.change.total_amount()?;
        let returned_total = sent_amount
            .checked_add(change_amount)
            .ok_or(Error::AmountOverflow)?;
        ensure_pocket!(
            returned_total == inputs_total,
            Error::AmountMismatch {
                expected: inputs_total,
                actual: returned_total,
            }
        );

        // apply: inputs are spent, change comes back, the sent proofs stay
        // pending until the recipient redeems them
        self.ledger().remove_proofs(&inputs, false, false).await?;
        if !response.change.is_empty() {
            self.ledger()
                .add_proofs(response.change.clone(), ProofState::Spendable)
                .await?;
        }
        self.ledger()
            .add_proofs(response.send.clone(), ProofState::Pending)
            .await?;

        tracing::debug!(
            "Prepared send of {} from {} with change {}",
            amount,
            mint_url,
            change_amount
        );

        Ok(SendOutcome {
            token: Token::new(mint_url.clone(), unit.clone(), response.send, memo),
            sent_amount,
            change_amount,
        })
    }
}
