//! Protocol library boundary
//!
//! A [`MintClient`] is a session scoped to one `(mint_url, unit)` pair. It
//! wraps the external blind-signature library and the mint's HTTP endpoint:
//! blinding, unblinding and signature verification all happen behind it.
//! Secrets are derived from the wallet seed and the counter range supplied
//! with each call; a session must derive at most `range.count` secrets
//! starting at `range.start` and never touch indices outside the range.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::amount::Amount;
use crate::counter::CounterRange;
use crate::error::Error;
use crate::mint_url::MintUrl;
use crate::nuts::{CurrencyUnit, KeysetId, Proof, Proofs, Secret, Token};
use crate::wallet::types::{MeltQuote, MintQuote};

/// Result of a melt call
#[derive(Debug, Clone)]
pub struct MeltResponse {
    /// Whether the mint reports the payment settled
    pub paid: bool,
    /// Lightning preimage when settled
    pub preimage: Option<String>,
    /// Unspent fee reserve returned as fresh proofs
    pub change: Proofs,
}

/// Result of a send split
#[derive(Debug, Clone)]
pub struct SendResponse {
    /// Proofs worth exactly the requested amount, for the recipient
    pub send: Proofs,
    /// Remainder retained by the wallet
    pub change: Proofs,
}

/// Result of redeeming an incoming token
#[derive(Debug, Clone)]
pub struct ReceiveResponse {
    /// Freshly issued proofs now owned by this wallet
    pub proofs: Proofs,
    /// Denominations the mint rejected, re-encoded for later retry
    pub error_token: Option<Token>,
    /// Messages for the rejected denominations
    pub errors: Vec<String>,
}

/// Result of a check-spent call
#[derive(Debug, Clone, Default)]
pub struct CheckResponse {
    /// Secrets the mint has seen spent
    pub spent: Vec<Secret>,
    /// Secrets that are inputs of an in-flight payment
    pub pending: Vec<Secret>,
}

/// Session with one mint for one unit
#[async_trait]
pub trait MintClient: Debug + Send + Sync {
    /// Request a quote for minting `amount` of new proofs
    async fn mint_quote(&self, amount: Amount) -> Result<MintQuote, Error>;

    /// Whether a mint quote has been paid
    async fn mint_quote_paid(&self, quote_id: &str) -> Result<bool, Error>;

    /// Exchange a paid quote for newly issued proofs
    async fn mint(
        &self,
        quote: &MintQuote,
        amount: Amount,
        counter: CounterRange,
    ) -> Result<Proofs, Error>;

    /// Request a quote for paying a lightning payment request
    async fn melt_quote(&self, request: String) -> Result<MeltQuote, Error>;

    /// Redeem `inputs` to pay the quoted payment request. The counter range
    /// covers blank change outputs for the unspent fee reserve.
    async fn melt(
        &self,
        quote: &MeltQuote,
        inputs: Proofs,
        counter: CounterRange,
    ) -> Result<MeltResponse, Error>;

    /// Split `inputs` into an exact-amount subset and change
    async fn swap_send(
        &self,
        amount: Amount,
        inputs: Proofs,
        counter: CounterRange,
    ) -> Result<SendResponse, Error>;

    /// Redeem an incoming token into locally owned proofs
    async fn receive(&self, token: Token, counter: CounterRange) -> Result<ReceiveResponse, Error>;

    /// Ask the mint which of `proofs` are spent or in-flight
    async fn check_spent(&self, proofs: &[Proof]) -> Result<CheckResponse, Error>;

    /// Recover proofs the mint has signatures for over a derivation range
    /// `[index_from, index_from + count)` of a keyset
    async fn restore(
        &self,
        keyset_id: &KeysetId,
        index_from: u64,
        count: u64,
    ) -> Result<Proofs, Error>;
}

/// Creates [`MintClient`] sessions
#[async_trait]
pub trait MintClientFactory: Debug + Send + Sync {
    /// Open a session for `(mint_url, unit)`. `with_seed` selects a session
    /// holding the wallet seed material, needed by every deriving operation.
    async fn create(
        &self,
        mint_url: &MintUrl,
        unit: &CurrencyUnit,
        with_seed: bool,
    ) -> Result<Arc<dyn MintClient>, Error>;
}

/// Key of one cached session
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    /// Mint url
    pub mint_url: MintUrl,
    /// Unit
    pub unit: CurrencyUnit,
    /// Whether the session holds seed material
    pub with_seed: bool,
}

/// Engine-owned cache of sessions, invalidated wholesale on seed rotation
#[derive(Debug)]
pub(crate) struct SessionRegistry {
    factory: Arc<dyn MintClientFactory>,
    sessions: RwLock<HashMap<SessionKey, Arc<dyn MintClient>>>,
}

impl SessionRegistry {
    pub(crate) fn new(factory: Arc<dyn MintClientFactory>) -> Self {
        Self {
            factory,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Cached session for the key, created through the factory on first use
    pub(crate) async fn get(
        &self,
        mint_url: &MintUrl,
        unit: &CurrencyUnit,
        with_seed: bool,
    ) -> Result<Arc<dyn MintClient>, Error> {
        let key = SessionKey {
            mint_url: mint_url.clone(),
            unit: unit.clone(),
            with_seed,
        };

        if let Some(session) = self.sessions.read().await.get(&key) {
            return Ok(session.clone());
        }

        let session = self.factory.create(mint_url, unit, with_seed).await?;
        self.sessions.write().await.insert(key, session.clone());
        tracing::trace!("Opened new mint session for {} {}", mint_url, unit);
        Ok(session)
    }

    /// Drop every cached session, forcing recreation with fresh seed material
    pub(crate) async fn reset(&self) {
        self.sessions.write().await.clear();
        tracing::trace!("Mint session cache cleared");
    }
}
