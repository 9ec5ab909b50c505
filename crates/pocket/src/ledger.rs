//! Proof ledger
//!
//! Owns the spendable and pending proof collections. The mint never reveals
//! balances, so these collections are the only record of the value the
//! wallet holds: secrets must stay unique across both collections and value
//! may only enter through [`ProofLedger::add_proofs`] and leave through
//! [`ProofLedger::remove_proofs`].

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::instrument;

use crate::amount::Amount;
use crate::backup::ProofBackup;
use crate::error::Error;
use crate::mint_url::MintUrl;
use crate::nuts::{CurrencyUnit, KeysetId, Proof, ProofState, Proofs, ProofsMethods, Secret};
use crate::util::unix_time;

/// Result of [`ProofLedger::add_proofs`]
///
/// Duplicate secrets are tolerated as no-ops and unit/keyset mismatches are
/// rejected per proof, so the accepted subset can be smaller than the
/// request. Callers reconcile the difference.
#[derive(Debug, Clone, Default)]
pub struct AddOutcome {
    /// Total value of the accepted proofs
    pub added_amount: Amount,
    /// The accepted proofs
    pub added_proofs: Proofs,
}

#[derive(Debug, Default)]
struct LedgerInner {
    spendable: BTreeMap<Secret, Proof>,
    pending: BTreeMap<Secret, Proof>,
    /// Unix time each pending proof entered the pending collection
    pending_since: HashMap<Secret, u64>,
    /// Secrets committed to an in-flight melt awaiting mint confirmation
    pending_by_mint: BTreeSet<Secret>,
    /// Derivation-consumption bookkeeping per (mint, keyset)
    consumed: HashMap<(MintUrl, KeysetId), u64>,
}

impl LedgerInner {
    fn contains_secret(&self, secret: &Secret) -> bool {
        self.spendable.contains_key(secret) || self.pending.contains_key(secret)
    }

    fn collection(&mut self, pending: bool) -> &mut BTreeMap<Secret, Proof> {
        if pending {
            &mut self.pending
        } else {
            &mut self.spendable
        }
    }
}

/// The proof ledger
#[derive(Debug)]
pub struct ProofLedger {
    inner: RwLock<LedgerInner>,
    /// `None` when local backup is disabled in user settings
    backup: Option<Arc<dyn ProofBackup>>,
}

impl ProofLedger {
    /// Create new [`ProofLedger`]
    ///
    /// `backup` is the optional local persistence collaborator; pass `None`
    /// when the user has backup disabled.
    pub fn new(backup: Option<Arc<dyn ProofBackup>>) -> Arc<Self> {
        Arc::new(Self {
            inner: RwLock::new(LedgerInner::default()),
            backup,
        })
    }

    /// Insert proofs into the spendable or pending collection.
    ///
    /// All proofs must come from one mint operation and therefore share one
    /// unit and one keyset (the first proof sets both). A proof whose secret
    /// already exists anywhere in the ledger is skipped; a proof with a
    /// mismatched unit or keyset is rejected. Neither fails the call for the
    /// remaining proofs.
    #[instrument(skip(self, new_proofs))]
    pub async fn add_proofs(
        &self,
        new_proofs: Proofs,
        state: ProofState,
    ) -> Result<AddOutcome, Error> {
        let pending = match state {
            ProofState::Spendable => false,
            ProofState::Pending => true,
            ProofState::Removed => {
                return Err(Error::Validation(
                    "Removed is not a storable proof state".to_string(),
                ))
            }
        };

        let Some(first) = new_proofs.first() else {
            return Ok(AddOutcome::default());
        };
        let unit = first.unit.clone();
        let keyset_id = first.keyset_id.clone();
        let mint_url = first.mint_url.clone();

        let mut added_proofs: Proofs = Vec::new();

        {
            let mut inner = self.inner.write().await;
            let now = unix_time();

            for proof in new_proofs {
                if inner.contains_secret(&proof.secret) {
                    tracing::warn!(
                        "Proof with an already known secret skipped for mint {}",
                        proof.mint_url
                    );
                    continue;
                }

                if proof.unit != unit {
                    tracing::error!(
                        "Proof with unit {} rejected, batch unit is {}",
                        proof.unit,
                        unit
                    );
                    continue;
                }

                if proof.keyset_id != keyset_id {
                    tracing::error!(
                        "Proof with keyset {} rejected, batch keyset is {}",
                        proof.keyset_id,
                        keyset_id
                    );
                    continue;
                }

                if pending {
                    inner.pending_since.insert(proof.secret.clone(), now);
                }
                inner
                    .collection(pending)
                    .insert(proof.secret.clone(), proof.clone());
                added_proofs.push(proof);
            }

            if !added_proofs.is_empty() {
                *inner
                    .consumed
                    .entry((mint_url, keyset_id))
                    .or_insert(0) += added_proofs.len() as u64;
            }
        }

        let added_amount = added_proofs.total_amount()?;

        tracing::debug!(
            "Added {}{} proofs worth {}",
            added_proofs.len(),
            if pending { " pending" } else { "" },
            added_amount
        );

        if !added_proofs.is_empty() {
            self.backup_write(added_proofs.clone(), pending, false).await;
        }

        Ok(AddOutcome {
            added_amount,
            added_proofs,
        })
    }

    /// Detach proofs from the ledger. The only legal way to delete value.
    ///
    /// Proofs not found in the addressed collection are skipped, so the call
    /// is idempotent. `recovered_from_pending` marks proofs that are leaving
    /// the pending collection unspent (a reverted payment) rather than
    /// having been invalidated by the mint; the distinction only affects the
    /// spent flag written to backup.
    #[instrument(skip(self, proofs))]
    pub async fn remove_proofs(
        &self,
        proofs: &[Proof],
        from_pending: bool,
        recovered_from_pending: bool,
    ) -> Result<Proofs, Error> {
        let mut removed: Proofs = Vec::new();

        {
            let mut inner = self.inner.write().await;
            for proof in proofs {
                let found = if from_pending {
                    inner.pending.remove(&proof.secret)
                } else {
                    inner.spendable.remove(&proof.secret)
                };
                if let Some(found) = found {
                    if from_pending {
                        inner.pending_since.remove(&proof.secret);
                    }
                    removed.push(found);
                }
            }
        }

        tracing::debug!(
            "Removed {}{} proofs",
            removed.len(),
            if from_pending { " pending" } else { "" }
        );

        if !removed.is_empty() {
            self.backup_write(removed.clone(), false, !recovered_from_pending)
                .await;
        }

        Ok(removed)
    }

    /// Proofs held for a mint, optionally narrowed to one unit
    pub async fn get_by_mint(
        &self,
        mint_url: &MintUrl,
        unit: Option<&CurrencyUnit>,
        pending: bool,
    ) -> Proofs {
        let inner = self.inner.read().await;
        let collection = if pending {
            &inner.pending
        } else {
            &inner.spendable
        };
        collection
            .values()
            .filter(|p| &p.mint_url == mint_url && unit.map_or(true, |u| &p.unit == u))
            .cloned()
            .collect()
    }

    /// Look up a proof by secret
    pub async fn get_by_secret(&self, secret: &Secret, pending: bool) -> Option<Proof> {
        let inner = self.inner.read().await;
        let collection = if pending {
            &inner.pending
        } else {
            &inner.spendable
        };
        collection.get(secret).cloned()
    }

    /// Whether a proof with the same secret is already tracked
    pub async fn already_exists(&self, proof: &Proof, pending: bool) -> bool {
        self.get_by_secret(&proof.secret, pending).await.is_some()
    }

    /// All spendable proofs
    pub async fn spendable_proofs(&self) -> Proofs {
        self.inner.read().await.spendable.values().cloned().collect()
    }

    /// All pending proofs
    pub async fn pending_proofs(&self) -> Proofs {
        self.inner.read().await.pending.values().cloned().collect()
    }

    /// Unix time a proof entered the pending collection
    pub async fn pending_since(&self, secret: &Secret) -> Option<u64> {
        self.inner.read().await.pending_since.get(secret).copied()
    }

    /// Mark a secret as committed to an in-flight melt.
    ///
    /// Returns `false` without changing anything when the secret is already
    /// marked, which is what blocks double-submission of one melt.
    pub async fn add_to_pending_by_mint(&self, secret: &Secret) -> bool {
        let mut inner = self.inner.write().await;
        if inner.pending_by_mint.contains(secret) {
            return false;
        }
        inner.pending_by_mint.insert(secret.clone());
        tracing::trace!("Secret marked as pending by mint");
        true
    }

    /// Clear the in-flight-melt mark of a secret
    pub async fn remove_from_pending_by_mint(&self, secret: &Secret) -> bool {
        let mut inner = self.inner.write().await;
        let removed = inner.pending_by_mint.remove(secret);
        if removed {
            tracing::trace!("Secret removed from pending by mint");
        }
        removed
    }

    /// Whether a secret is committed to an in-flight melt
    pub async fn is_pending_by_mint(&self, secret: &Secret) -> bool {
        self.inner.read().await.pending_by_mint.contains(secret)
    }

    /// Number of derivation indices consumed through this ledger for a
    /// (mint, keyset) pair. Bookkeeping only; reservation is owned by
    /// [`crate::counter::CounterRegistry`].
    pub async fn consumed(&self, mint_url: &MintUrl, keyset_id: &KeysetId) -> u64 {
        self.inner
            .read()
            .await
            .consumed
            .get(&(mint_url.clone(), keyset_id.clone()))
            .copied()
            .unwrap_or(0)
    }

    /// Best-effort backup write. A failure is logged and never rolls back
    /// the in-memory mutation that triggered it.
    async fn backup_write(&self, proofs: Proofs, is_pending: bool, is_spent: bool) {
        if let Some(backup) = &self.backup {
            if let Err(err) = backup.add_or_update_proofs(proofs, is_pending, is_spent).await {
                tracing::warn!("Backup write failed: {}", err);
            }
        }
    }
}

/// Greedy selection of a proof subset worth at least `amount`.
///
/// Walks the pool in order, keeping each proof until the running total
/// covers the amount. Errors when the whole pool cannot cover it.
pub fn select_proofs(amount: Amount, proofs: &[Proof]) -> Result<Proofs, Error> {
    let mut selected: Proofs = Vec::new();
    let mut selected_amount = Amount::ZERO;

    for proof in proofs {
        if selected_amount >= amount {
            break;
        }
        selected_amount = selected_amount
            .checked_add(proof.amount)
            .ok_or(Error::AmountOverflow)?;
        selected.push(proof.clone());
    }

    if selected_amount < amount {
        return Err(Error::InsufficientFunds);
    }

    Ok(selected)
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use crate::backup::MemoryBackup;

    fn test_mint_url() -> MintUrl {
        MintUrl::from_str("https://mint.example.com").unwrap()
    }

    fn test_keyset_id() -> KeysetId {
        KeysetId::from_str("00916bbf7ef91a36").unwrap()
    }

    fn proof(amount: u64, secret: &str) -> Proof {
        Proof {
            amount: Amount::from(amount),
            keyset_id: test_keyset_id(),
            secret: Secret::new(secret),
            c: "02deadbeef".to_string(),
            mint_url: test_mint_url(),
            unit: CurrencyUnit::Sat,
        }
    }

    #[tokio::test]
    async fn test_duplicate_secret_is_skipped() {
        let ledger = ProofLedger::new(None);

        let outcome = ledger
            .add_proofs(vec![proof(8, "a")], ProofState::Spendable)
            .await
            .unwrap();
        assert_eq!(Amount::from(8), outcome.added_amount);

        // one duplicate, one fresh
        let outcome = ledger
            .add_proofs(vec![proof(8, "a"), proof(4, "b")], ProofState::Spendable)
            .await
            .unwrap();

        assert_eq!(Amount::from(4), outcome.added_amount);
        assert_eq!(1, outcome.added_proofs.len());
        assert_eq!(2, ledger.spendable_proofs().await.len());
    }

    #[tokio::test]
    async fn test_secret_unique_across_collections() {
        let ledger = ProofLedger::new(None);

        ledger
            .add_proofs(vec![proof(8, "a")], ProofState::Pending)
            .await
            .unwrap();

        // same secret cannot enter the spendable collection
        let outcome = ledger
            .add_proofs(vec![proof(8, "a")], ProofState::Spendable)
            .await
            .unwrap();

        assert!(outcome.added_proofs.is_empty());
        assert!(ledger.spendable_proofs().await.is_empty());
        assert_eq!(1, ledger.pending_proofs().await.len());
    }

    #[tokio::test]
    async fn test_mismatched_unit_and_keyset_rejected() {
        let ledger = ProofLedger::new(None);

        let mut wrong_unit = proof(2, "b");
        wrong_unit.unit = CurrencyUnit::Usd;

        let mut wrong_keyset = proof(1, "c");
        wrong_keyset.keyset_id = KeysetId::from_str("00916bbf7ef91a37").unwrap();

        let outcome = ledger
            .add_proofs(
                vec![proof(4, "a"), wrong_unit, wrong_keyset],
                ProofState::Spendable,
            )
            .await
            .unwrap();

        assert_eq!(Amount::from(4), outcome.added_amount);
        assert_eq!(1, outcome.added_proofs.len());
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let ledger = ProofLedger::new(None);
        ledger
            .add_proofs(vec![proof(8, "a"), proof(4, "b")], ProofState::Spendable)
            .await
            .unwrap();

        let removed = ledger
            .remove_proofs(&[proof(8, "a"), proof(2, "unknown")], false, false)
            .await
            .unwrap();
        assert_eq!(1, removed.len());

        // removing again is a no-op
        let removed = ledger
            .remove_proofs(&[proof(8, "a")], false, false)
            .await
            .unwrap();
        assert!(removed.is_empty());
        assert_eq!(1, ledger.spendable_proofs().await.len());
    }

    #[tokio::test]
    async fn test_pending_by_mint_guard() {
        let ledger = ProofLedger::new(None);
        let secret = Secret::new("in-flight");

        assert!(ledger.add_to_pending_by_mint(&secret).await);
        // second add is refused, preventing a double melt submission
        assert!(!ledger.add_to_pending_by_mint(&secret).await);
        assert!(ledger.is_pending_by_mint(&secret).await);

        assert!(ledger.remove_from_pending_by_mint(&secret).await);
        assert!(!ledger.remove_from_pending_by_mint(&secret).await);
    }

    #[tokio::test]
    async fn test_consumption_bookkeeping() {
        let ledger = ProofLedger::new(None);
        ledger
            .add_proofs(
                vec![proof(8, "a"), proof(4, "b"), proof(2, "c")],
                ProofState::Spendable,
            )
            .await
            .unwrap();
        // duplicate does not count
        ledger
            .add_proofs(vec![proof(8, "a")], ProofState::Spendable)
            .await
            .unwrap();

        assert_eq!(3, ledger.consumed(&test_mint_url(), &test_keyset_id()).await);
    }

    #[tokio::test]
    async fn test_backup_receives_spent_flag() {
        let backup = Arc::new(MemoryBackup::new());
        let ledger = ProofLedger::new(Some(backup.clone()));

        ledger
            .add_proofs(vec![proof(8, "a"), proof(4, "b")], ProofState::Pending)
            .await
            .unwrap();

        // settled as spent
        ledger
            .remove_proofs(&[proof(8, "a")], true, false)
            .await
            .unwrap();
        // reverted unspent
        ledger
            .remove_proofs(&[proof(4, "b")], true, true)
            .await
            .unwrap();

        let spent = backup.get(&Secret::new("a")).await.unwrap();
        assert!(spent.is_spent);
        let recovered = backup.get(&Secret::new("b")).await.unwrap();
        assert!(!recovered.is_spent);
    }

    #[tokio::test]
    async fn test_select_proofs_greedy() {
        let pool = vec![proof(64, "a"), proof(32, "b"), proof(8, "c")];

        let selected = select_proofs(Amount::from(70), &pool).unwrap();
        assert_eq!(2, selected.len());
        assert_eq!(Amount::from(96), selected.total_amount().unwrap());

        assert!(matches!(
            select_proofs(Amount::from(200), &pool),
            Err(Error::InsufficientFunds)
        ));
    }
}
