//! Check-spent operation

use tracing::instrument;

use crate::error::Error;
use crate::mint_url::MintUrl;
use crate::nuts::{CurrencyUnit, Proof};
use crate::wallet::client::CheckResponse;
use crate::wallet::TransactionEngine;

impl TransactionEngine {
    /// Ask a mint which of `proofs` it has seen spent or in-flight.
    ///
    /// Read-only: applying the answer to the ledger is the reconciliation
    /// sweep's job.
    #[instrument(skip(self, proofs))]
    pub async fn check_spent(
        &self,
        mint_url: &MintUrl,
        proofs: &[Proof],
    ) -> Result<CheckResponse, Error> {
        if proofs.is_empty() {
            return Ok(CheckResponse::default());
        }

        // the state check is unit-agnostic, any session for the mint will do
        let unit = proofs
            .first()
            .map(|p| p.unit.clone())
            .unwrap_or(CurrencyUnit::Sat);
        let session = self.session(mint_url, &unit, false).await?;

        self.with_timeout(session.check_spent(proofs)).await
    }
}
