//! Mint registry
//!
//! The root-store collaborator: which mints the wallet knows, which units
//! they settle and which keysets they have advertised. Registration order is
//! preserved because balance queries use it as a tie-breaker.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::instrument;

use crate::error::Error;
use crate::mint_url::MintUrl;
use crate::nuts::{CurrencyUnit, KeysetId, KeysetInfo};

/// A registered mint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintEntry {
    /// Mint url
    pub mint_url: MintUrl,
    /// Units the mint supports
    pub units: Vec<CurrencyUnit>,
    /// Keysets the mint has advertised, active or not
    pub keysets: Vec<KeysetInfo>,
}

/// Registry of known mints
#[derive(Debug, Default)]
pub struct MintRegistry {
    mints: RwLock<Vec<MintEntry>>,
}

impl MintRegistry {
    /// Create new [`MintRegistry`]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a mint, replacing a previous entry for the same url
    #[instrument(skip(self, keysets))]
    pub async fn add_mint(
        &self,
        mint_url: MintUrl,
        units: Vec<CurrencyUnit>,
        keysets: Vec<KeysetInfo>,
    ) {
        let mut mints = self.mints.write().await;
        let entry = MintEntry {
            mint_url: mint_url.clone(),
            units,
            keysets,
        };
        match mints.iter_mut().find(|m| m.mint_url == mint_url) {
            Some(existing) => *existing = entry,
            None => mints.push(entry),
        }
        tracing::debug!("Mint {} registered", mint_url);
    }

    /// Forget a mint
    #[instrument(skip(self))]
    pub async fn remove_mint(&self, mint_url: &MintUrl) {
        self.mints.write().await.retain(|m| &m.mint_url != mint_url);
    }

    /// Look up a mint
    pub async fn get_mint(&self, mint_url: &MintUrl) -> Option<MintEntry> {
        self.mints
            .read()
            .await
            .iter()
            .find(|m| &m.mint_url == mint_url)
            .cloned()
    }

    /// All registered mints, in registration order
    pub async fn mints(&self) -> Vec<MintEntry> {
        self.mints.read().await.clone()
    }

    /// Active keyset of a mint for a unit
    pub async fn active_keyset(
        &self,
        mint_url: &MintUrl,
        unit: &CurrencyUnit,
    ) -> Result<KeysetInfo, Error> {
        let mints = self.mints.read().await;
        let mint = mints
            .iter()
            .find(|m| &m.mint_url == mint_url)
            .ok_or_else(|| Error::UnknownMint(mint_url.clone()))?;
        mint.keysets
            .iter()
            .find(|k| k.active && &k.unit == unit)
            .cloned()
            .ok_or_else(|| Error::Validation(format!("Mint {mint_url} has no active {unit} keyset")))
    }

    /// Look up a keyset by id across all registered mints
    pub async fn keyset_by_id(&self, keyset_id: &KeysetId) -> Result<(MintUrl, KeysetInfo), Error> {
        let mints = self.mints.read().await;
        for mint in mints.iter() {
            if let Some(keyset) = mint.keysets.iter().find(|k| &k.id == keyset_id) {
                return Ok((mint.mint_url.clone(), keyset.clone()));
            }
        }
        Err(Error::UnknownKeyset(keyset_id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn keyset(id: &str, unit: CurrencyUnit, active: bool) -> KeysetInfo {
        KeysetInfo {
            id: KeysetId::from_str(id).unwrap(),
            unit,
            active,
        }
    }

    #[tokio::test]
    async fn test_active_keyset_lookup() {
        let registry = MintRegistry::new();
        let mint_url = MintUrl::from_str("https://mint.example.com").unwrap();
        registry
            .add_mint(
                mint_url.clone(),
                vec![CurrencyUnit::Sat],
                vec![
                    keyset("00aa", CurrencyUnit::Sat, false),
                    keyset("00bb", CurrencyUnit::Sat, true),
                ],
            )
            .await;

        let active = registry
            .active_keyset(&mint_url, &CurrencyUnit::Sat)
            .await
            .unwrap();
        assert_eq!("00bb", active.id.as_str());

        assert!(registry
            .active_keyset(&mint_url, &CurrencyUnit::Usd)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_reregistration_replaces_entry() {
        let registry = MintRegistry::new();
        let mint_url = MintUrl::from_str("https://mint.example.com").unwrap();
        registry
            .add_mint(mint_url.clone(), vec![CurrencyUnit::Sat], vec![])
            .await;
        registry
            .add_mint(
                mint_url.clone(),
                vec![CurrencyUnit::Sat, CurrencyUnit::Usd],
                vec![],
            )
            .await;

        let mints = registry.mints().await;
        assert_eq!(1, mints.len());
        assert_eq!(2, mints[0].units.len());
    }
}
