//! Mint (top-up) operation

use tracing::instrument;

use crate::amount::Amount;
use crate::error::Error;
use crate::mint_url::MintUrl;
use crate::nuts::{CurrencyUnit, ProofState, ProofsMethods};
use crate::util::unix_time;
use crate::wallet::types::{MintOutcome, MintQuote};
use crate::wallet::TransactionEngine;
use crate::ensure_pocket;

impl TransactionEngine {
    /// Request a quote for minting `amount` of new proofs.
    ///
    /// The returned quote carries the payment request the user must pay
    /// before [`TransactionEngine::mint`] can succeed.
    #[instrument(skip(self))]
    pub async fn mint_quote(
        &self,
        mint_url: &MintUrl,
        unit: &CurrencyUnit,
        amount: Amount,
    ) -> Result<MintQuote, Error> {
        let session = self.session(mint_url, unit, false).await?;
        let quote = self.with_timeout(session.mint_quote(amount)).await?;
        ensure_pocket!(
            quote.amount == amount,
            Error::AmountMismatch {
                expected: amount,
                actual: quote.amount,
            }
        );
        Ok(quote)
    }

    /// Whether a mint quote has been paid
    #[instrument(skip(self, quote))]
    pub async fn mint_quote_paid(
        &self,
        unit: &CurrencyUnit,
        quote: &MintQuote,
    ) -> Result<bool, Error> {
        let session = self.session(&quote.mint_url, unit, false).await?;
        self.with_timeout(session.mint_quote_paid(&quote.id)).await
    }

    /// Exchange a paid quote for newly issued proofs.
    ///
    /// A mint that answers "quote not paid" yields an empty outcome rather
    /// than an error so the caller can simply retry once the invoice
    /// settles.
    #[instrument(skip(self, quote))]
    pub async fn mint(&self, quote: &MintQuote) -> Result<MintOutcome, Error> {
        let now = unix_time();
        ensure_pocket!(quote.expiry > now, Error::ExpiredQuote(quote.expiry, now));

        let mint_url = &quote.mint_url;
        let keyset = self.registry().active_keyset(mint_url, &quote.unit).await?;
        let session = self.session(mint_url, &quote.unit, true).await?;

        let _guard = self.pair_lock(mint_url, &keyset.id).await;

        let needed = quote.amount.split().len() as u64;
        let range = self
            .counters()
            .reserve(mint_url, &keyset.id, needed)
            .await?;

        let proofs = match self
            .with_timeout(session.mint(quote, quote.amount, range))
            .await
        {
            Ok(proofs) => proofs,
            Err(Error::QuoteNotPaid) => {
                tracing::debug!("Mint quote {} not paid yet", quote.id);
                return Ok(MintOutcome::default());
            }
            Err(err) => return Err(err),
        };

        let minted_amount = proofs.total_amount()?;
        ensure_pocket!(
            minted_amount == quote.amount,
            Error::AmountMismatch {
                expected: quote.amount,
                actual: minted_amount,
            }
        );

        let outcome = self
            .ledger()
            .add_proofs(proofs, ProofState::Spendable)
            .await?;

        tracing::debug!("Minted {} from {}", outcome.added_amount, mint_url);

        Ok(MintOutcome {
            minted_amount: outcome.added_amount,
            proofs: outcome.added_proofs,
        })
    }
}
