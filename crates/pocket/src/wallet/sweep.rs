//! Reconciliation sweep
//!
//! Resolves proofs left pending by ambiguous outcomes: a melt that timed
//! out, a sent token the recipient may or may not have redeemed. Triggered
//! on app foreground, on reconnect and periodically. Idempotent: a proof
//! only leaves the pending collection on a definitive "spent" answer from
//! the mint, never on a guess.

use std::collections::{BTreeMap, BTreeSet};

use futures::future::join_all;
use tracing::instrument;

use crate::amount::Amount;
use crate::error::Error;
use crate::mint_url::MintUrl;
use crate::nuts::{Proofs, ProofsMethods};
use crate::util::unix_time;
use crate::wallet::TransactionEngine;

/// What the sweep concluded for one mint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepStatus {
    /// Every pending proof of the mint was settled
    Settled,
    /// Some proofs are still pending within the timeout window
    StillPending,
    /// Some proofs have been pending past the timeout window; their fate
    /// is unknown and they stay pending
    Indeterminate,
}

/// Per-mint result of one sweep run
#[derive(Debug, Clone)]
pub struct SweepReport {
    /// Mint the report is about
    pub mint_url: MintUrl,
    /// Value of proofs the mint confirmed spent and that were removed
    pub settled_amount: Amount,
    /// Value of proofs still pending within the timeout window
    pub still_pending_amount: Amount,
    /// Value of proofs pending past the timeout window
    pub indeterminate_amount: Amount,
    /// Overall status for the mint
    pub status: SweepStatus,
}

impl TransactionEngine {
    /// Run one reconciliation pass over every mint with pending proofs.
    ///
    /// Safe to run repeatedly and concurrently with operations against
    /// other mints; per-(mint, keyset) locks serialize it against in-flight
    /// operations on the same pair.
    #[instrument(skip(self))]
    pub async fn reconcile(&self) -> Result<Vec<SweepReport>, Error> {
        let pending = self.ledger().pending_proofs().await;

        let mut by_mint: BTreeMap<MintUrl, Proofs> = BTreeMap::new();
        for proof in pending {
            by_mint.entry(proof.mint_url.clone()).or_default().push(proof);
        }

        let sweeps = by_mint.into_iter().map(|(mint_url, proofs)| async move {
            let result = self.reconcile_mint(&mint_url, proofs).await;
            (mint_url, result)
        });

        let mut reports = Vec::new();
        for (mint_url, result) in join_all(sweeps).await {
            match result {
                Ok(report) => reports.push(report),
                Err(err) => {
                    // an unreachable mint must not stall the other sweeps
                    tracing::warn!("Sweep for mint {} failed: {}", mint_url, err);
                }
            }
        }

        Ok(reports)
    }

    async fn reconcile_mint(
        &self,
        mint_url: &MintUrl,
        proofs: Proofs,
    ) -> Result<SweepReport, Error> {
        // hold every pair lock the pending set touches, in key order
        let keysets: BTreeSet<_> = proofs.iter().map(|p| p.keyset_id.clone()).collect();
        let mut guards = Vec::with_capacity(keysets.len());
        for keyset_id in &keysets {
            guards.push(self.pair_lock(mint_url, keyset_id).await);
        }

        let response = self.check_spent(mint_url, &proofs).await?;
        let spent: BTreeSet<_> = response.spent.into_iter().collect();

        let (spent_proofs, open_proofs): (Proofs, Proofs) = proofs
            .into_iter()
            .partition(|p| spent.contains(&p.secret));

        let settled_amount = spent_proofs.total_amount()?;
        if !spent_proofs.is_empty() {
            self.ledger().remove_proofs(&spent_proofs, true, false).await?;
            for secret in spent_proofs.secrets() {
                self.ledger().remove_from_pending_by_mint(&secret).await;
            }
            self.settle_pending_melts(&spent).await;
            tracing::debug!(
                "Sweep settled {} pending at mint {}",
                settled_amount,
                mint_url
            );
        }

        let now = unix_time();
        let timeout = self.config().pending_timeout.as_secs();
        let mut still_pending_amount = Amount::ZERO;
        let mut indeterminate_amount = Amount::ZERO;

        for proof in &open_proofs {
            let since = self
                .ledger()
                .pending_since(&proof.secret)
                .await
                .unwrap_or(now);
            if now.saturating_sub(since) > timeout {
                indeterminate_amount = indeterminate_amount
                    .checked_add(proof.amount)
                    .ok_or(Error::AmountOverflow)?;
            } else {
                still_pending_amount = still_pending_amount
                    .checked_add(proof.amount)
                    .ok_or(Error::AmountOverflow)?;
            }
        }

        let status = if indeterminate_amount > Amount::ZERO {
            SweepStatus::Indeterminate
        } else if still_pending_amount > Amount::ZERO {
            SweepStatus::StillPending
        } else {
            SweepStatus::Settled
        };

        Ok(SweepReport {
            mint_url: mint_url.clone(),
            settled_amount,
            still_pending_amount,
            indeterminate_amount,
            status,
        })
    }

    /// Drop recorded melt quotes whose inputs have all been settled
    async fn settle_pending_melts(&self, spent: &BTreeSet<crate::nuts::Secret>) {
        let mut melts = self.pending_melts.write().await;
        melts.retain(|quote_id, melt| {
            let open = melt.secrets.iter().any(|s| !spent.contains(s));
            if !open {
                tracing::debug!("Melt quote {} settled by sweep", quote_id);
            }
            open
        });
    }
}
