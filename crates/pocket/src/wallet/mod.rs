//! Mint transaction engine
//!
//! Every operation follows one template: prepare inputs, reserve derivation
//! indices, execute the single network round-trip, validate that the
//! returned amounts conserve value, and only then apply the result to the
//! ledger. An ambiguous outcome (the request may have been acted on but no
//! answer arrived) parks the inputs as pending for the reconciliation sweep
//! instead of guessing.
//!
//! Operations against the same (mint, keyset) pair are serialized through a
//! per-pair async mutex; different pairs proceed in parallel.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::counter::CounterRegistry;
use crate::error::Error;
use crate::ledger::ProofLedger;
use crate::mint_url::MintUrl;
use crate::nuts::{CurrencyUnit, KeysetId, Secret};
use crate::registry::MintRegistry;

mod check;
pub mod client;
mod issue;
mod melt;
mod receive;
mod restore;
mod send;
mod sweep;
pub mod types;

pub use client::{
    CheckResponse, MeltResponse, MintClient, MintClientFactory, ReceiveResponse, SendResponse,
    SessionKey,
};
use client::SessionRegistry;
pub use sweep::{SweepReport, SweepStatus};
pub use types::{
    MeltOutcome, MeltQuote, MintOutcome, MintQuote, ReceiveOutcome, RestoreOutcome, SendOutcome,
};

/// Engine tunables
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Deadline for a single mint round-trip
    pub operation_timeout: Duration,
    /// How long a proof may sit pending before the sweep reports it
    /// indeterminate instead of still-pending
    pub pending_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            operation_timeout: Duration::from_secs(30),
            pending_timeout: Duration::from_secs(180),
        }
    }
}

/// A melt whose outcome is unknown, awaiting reconciliation
#[derive(Debug, Clone)]
pub(crate) struct PendingMelt {
    pub(crate) mint_url: MintUrl,
    pub(crate) secrets: Vec<Secret>,
    pub(crate) submitted_at: u64,
}

/// The mint transaction engine
#[derive(Debug)]
pub struct TransactionEngine {
    ledger: Arc<ProofLedger>,
    counters: Arc<CounterRegistry>,
    registry: Arc<MintRegistry>,
    sessions: SessionRegistry,
    pair_locks: Mutex<HashMap<(MintUrl, KeysetId), Arc<Mutex<()>>>>,
    /// Melt quote id -> inputs parked for reconciliation
    pending_melts: RwLock<HashMap<String, PendingMelt>>,
    config: EngineConfig,
}

impl TransactionEngine {
    /// Create new [`TransactionEngine`]
    pub fn new(
        ledger: Arc<ProofLedger>,
        counters: Arc<CounterRegistry>,
        registry: Arc<MintRegistry>,
        factory: Arc<dyn MintClientFactory>,
        config: EngineConfig,
    ) -> Self {
        Self {
            ledger,
            counters,
            registry,
            sessions: SessionRegistry::new(factory),
            pair_locks: Mutex::new(HashMap::new()),
            pending_melts: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// The proof ledger
    pub fn ledger(&self) -> &Arc<ProofLedger> {
        &self.ledger
    }

    /// The derivation counter registry
    pub fn counters(&self) -> &Arc<CounterRegistry> {
        &self.counters
    }

    /// The mint registry
    pub fn registry(&self) -> &Arc<MintRegistry> {
        &self.registry
    }

    /// Compute all balance views from the live ledger
    pub async fn balances(&self) -> Result<crate::balance::Balances, Error> {
        let mints = self.registry.mints().await;
        let spendable = self.ledger.spendable_proofs().await;
        let pending = self.ledger.pending_proofs().await;
        crate::balance::balances(&mints, &spendable, &pending)
    }

    /// Drop all cached mint sessions. Call after seed rotation.
    pub async fn reset_sessions(&self) {
        self.sessions.reset().await;
    }

    /// Melt quote ids currently awaiting reconciliation
    pub async fn pending_melt_quotes(&self) -> Vec<String> {
        self.pending_melts.read().await.keys().cloned().collect()
    }

    pub(crate) async fn session(
        &self,
        mint_url: &MintUrl,
        unit: &CurrencyUnit,
        with_seed: bool,
    ) -> Result<Arc<dyn MintClient>, Error> {
        self.sessions.get(mint_url, unit, with_seed).await
    }

    /// Serialize ledger mutations per (mint, keyset) pair. The returned
    /// guard owns its lock, so callers can hold several (sorted by key, see
    /// the sweep) without lifetime gymnastics.
    pub(crate) async fn pair_lock(
        &self,
        mint_url: &MintUrl,
        keyset_id: &KeysetId,
    ) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.pair_locks.lock().await;
            locks
                .entry((mint_url.clone(), keyset_id.clone()))
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Bound a mint round-trip by the configured deadline
    pub(crate) async fn with_timeout<T, F>(&self, fut: F) -> Result<T, Error>
    where
        F: Future<Output = Result<T, Error>>,
    {
        match tokio::time::timeout(self.config.operation_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout),
        }
    }

    pub(crate) fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) async fn record_pending_melt(&self, quote_id: String, melt: PendingMelt) {
        self.pending_melts.write().await.insert(quote_id, melt);
    }
}
