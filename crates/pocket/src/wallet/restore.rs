//! Restore operation
//!
//! Explicit recovery mode after a reinstall: proofs are re-derived from the
//! seed over a counter range and the mint is asked which of them it has
//! signatures for, bypassing the registry's forward-only reservation.

use tracing::instrument;

use crate::error::Error;
use crate::mint_url::MintUrl;
use crate::nuts::{KeysetId, ProofState, Proofs, ProofsMethods};
use crate::wallet::types::RestoreOutcome;
use crate::wallet::TransactionEngine;

/// Indices scanned per batch by [`TransactionEngine::restore_scan`]
const RESTORE_BATCH: u64 = 100;

/// Consecutive empty batches after which a scan stops
const RESTORE_EMPTY_BATCHES: u64 = 3;

impl TransactionEngine {
    /// Recover proofs over one derivation range `[index_from, index_from + count)`.
    ///
    /// Proofs the mint reports spent are dropped; the rest enter the
    /// spendable collection. The keyset counter is raised past the scanned
    /// range afterwards so fresh derivations cannot collide with it.
    #[instrument(skip(self))]
    pub async fn restore(
        &self,
        mint_url: &MintUrl,
        keyset_id: &KeysetId,
        index_from: u64,
        count: u64,
    ) -> Result<RestoreOutcome, Error> {
        let (keyset_mint, keyset) = self.registry().keyset_by_id(keyset_id).await?;
        if &keyset_mint != mint_url {
            return Err(Error::UnknownKeyset(keyset_id.clone()));
        }
        let session = self.session(mint_url, &keyset.unit, true).await?;

        let _guard = self.pair_lock(mint_url, keyset_id).await;

        let proofs = self
            .with_timeout(session.restore(keyset_id, index_from, count))
            .await?;

        // the scanned range is burned whatever the mint answered; a mint
        // that transiently under-reports signatures must not cause these
        // indices to be derived again later
        let end = index_from
            .checked_add(count)
            .ok_or(Error::AmountOverflow)?;
        self.counters().bump_to(mint_url, keyset_id, end).await?;

        if proofs.is_empty() {
            return Ok(RestoreOutcome::default());
        }

        let proofs_found = proofs.len();

        let states = self.with_timeout(session.check_spent(&proofs)).await?;
        let unspent: Proofs = proofs
            .into_iter()
            .filter(|p| !states.spent.contains(&p.secret))
            .collect();
        let spent_filtered = proofs_found - unspent.len();

        let restored_amount = unspent.total_amount()?;

        self.ledger()
            .add_proofs(unspent, ProofState::Spendable)
            .await?;

        tracing::debug!(
            "Restored {} over counter {}..{} for mint {} keyset {}",
            restored_amount,
            index_from,
            end,
            mint_url,
            keyset_id
        );

        Ok(RestoreOutcome {
            restored_amount,
            proofs_found,
            spent_filtered,
        })
    }

    /// Scan a keyset from counter zero in batches until several consecutive
    /// batches come back empty, accumulating everything recovered.
    #[instrument(skip(self))]
    pub async fn restore_scan(
        &self,
        mint_url: &MintUrl,
        keyset_id: &KeysetId,
    ) -> Result<RestoreOutcome, Error> {
        let mut total = RestoreOutcome::default();
        let mut start = 0_u64;
        let mut empty_batches = 0_u64;

        while empty_batches < RESTORE_EMPTY_BATCHES {
            let outcome = self
                .restore(mint_url, keyset_id, start, RESTORE_BATCH)
                .await?;

            if outcome.proofs_found == 0 {
                empty_batches += 1;
            } else {
                empty_batches = 0;
                total.restored_amount = total
                    .restored_amount
                    .checked_add(outcome.restored_amount)
                    .ok_or(Error::AmountOverflow)?;
                total.proofs_found += outcome.proofs_found;
                total.spent_filtered += outcome.spent_filtered;
            }

            start += RESTORE_BATCH;
        }

        Ok(total)
    }
}
